//! Frame Solver Example - Simple Portal Frame

use anyhow::Result;
use frame_solver::prelude::*;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== Frame Solver Example: Portal Frame ===\n");

    let mut model = StructuralModel::new();

    model.add_material("Steel", Material::steel())?;

    // W310x39 (approximate properties), strong axis bending in the frame plane
    // A = 4.94e-3 m², Iy = 8.49e-5 m⁴, Iz = 7.2e-6 m⁴, J = 1.25e-7 m⁴
    model.add_section(
        "W310x39",
        Section::new(0.00494, 8.49e-5, 7.2e-6, 1.25e-7, 0.31).with_width(0.165),
    )?;

    // Create a simple portal frame
    //
    //     N3 -------- N4
    //     |          |
    //     |          |
    //     |          |
    //     N1        N2
    //     ^          ^
    //   Fixed     Fixed
    //
    let height = 4.0;
    let span = 6.0;

    model.add_node("N1", Node::new(0.0, 0.0, 0.0))?;
    model.add_node("N2", Node::new(span, 0.0, 0.0))?;
    model.add_node("N3", Node::new(0.0, height, 0.0))?;
    model.add_node("N4", Node::new(span, height, 0.0))?;

    // Columns bend about their strong axis under sway in X
    model.add_element(
        "Col1",
        Element::column("N1", "N3", "Steel", "W310x39").with_reference([1.0, 0.0, 0.0]),
    )?;
    model.add_element(
        "Col2",
        Element::column("N2", "N4", "Steel", "W310x39").with_reference([1.0, 0.0, 0.0]),
    )?;
    model.add_element("Beam", Element::beam("N3", "N4", "Steel", "W310x39"))?;

    model.set_boundary_condition("N1", BoundaryCondition::fixed())?;
    model.set_boundary_condition("N2", BoundaryCondition::fixed())?;

    // Dead: 20 kN/m on the beam (negative Y = downward)
    model.add_load_case("Dead", LoadCase::dead("Dead"))?;
    model.add_load(
        "Beam UDL",
        Load::uniform("Dead", "Beam", [0.0, -20e3, 0.0], LoadAxes::Global),
    )?;

    // Wind: 10 kN at roof level (positive X)
    model.add_load_case("Wind", LoadCase::wind("Wind"))?;
    model.add_load("Roof wind", Load::node_force("Wind", "N3", 10e3, 0.0, 0.0))?;

    model.add_combination(LoadCombination::new("1.4D").with_case("Dead", 1.4))?;
    for combo in CombinationRule::new("1.2D + 1.0W")
        .with_factor(LoadCategory::Dead, 1.2)
        .with_factor(LoadCategory::Wind, 1.0)
        .reversible(LoadCategory::Wind)
        .expand(&model)
    {
        model.add_combination(combo)?;
    }

    let free = model.assign_dof_numbering();
    println!("Model has {} free DOFs\n", free);

    println!("Running static and modal analysis...\n");
    let options = AnalysisOptions::static_and_modal(3).with_logging();
    let results = run(&model.snapshot(), &[], &options, &CancelToken::new())?;

    for result in &results.static_results {
        println!("=== Results for {} ===\n", result.combination);

        println!("Node Displacements:");
        for node in &result.nodes {
            let d = &node.displacement;
            println!(
                "  {}: DX={:.4}mm, DY={:.4}mm, RZ={:.6}rad",
                node.node,
                d.dx * 1000.0,
                d.dy * 1000.0,
                d.rz
            );
        }

        println!("\nSupport Reactions:");
        for node in &result.nodes {
            if let Some(r) = &node.reaction {
                println!(
                    "  {}: FX={:.2}kN, FY={:.2}kN, MZ={:.2}kN·m",
                    node.node,
                    r.fx / 1000.0,
                    r.fy / 1000.0,
                    r.mz / 1000.0
                );
            }
        }

        println!("\nElement Forces:");
        for element in &result.elements {
            let shear = element
                .diagram
                .iter()
                .map(|p| p.forces.shear_z.abs().max(p.forces.shear_y.abs()))
                .fold(0.0, f64::max);
            println!(
                "  {}: P={:.2}kN, Vmax={:.2}kN, Mmax={:.2}kN·m, σ=[{:.1}, {:.1}]MPa",
                element.element,
                element.start.axial / 1000.0,
                shear / 1000.0,
                element.max_moment() / 1000.0,
                element.stress.min / 1e6,
                element.stress.max / 1e6
            );
        }

        let summary = &result.summary;
        println!("\nSummary:");
        println!("  Max displacement: {:.4}mm at {}", summary.max_displacement * 1000.0, summary.max_disp_node);
        println!("  Max reaction: {:.2}kN at {}", summary.max_reaction / 1000.0, summary.max_reaction_node);
        println!("  Max axial: {:.2}kN in {}", summary.max_axial / 1000.0, summary.max_axial_element);
        println!("  Max moment: {:.2}kN·m in {}", summary.max_moment / 1000.0, summary.max_moment_element);
        println!("  Equilibrium residual: {:.3e}N", summary.equilibrium_residual());
        println!();
    }

    if let Some(envelope) = &results.envelope {
        println!("=== Envelope ===\n");
        for element in &envelope.elements {
            println!(
                "  {}: My [{:.2}, {:.2}]kN·m governed by {} / {}",
                element.element,
                element.moment_y.min / 1000.0,
                element.moment_y.max / 1000.0,
                element.moment_y.min_combination,
                element.moment_y.max_combination
            );
        }
        println!();
    }

    println!("=== Natural Modes ===\n");
    for mode in &results.modes {
        println!(
            "  Mode {}: f={:.3}Hz, T={:.3}s, participation X={:.2} Y={:.2} Z={:.2}",
            mode.number,
            mode.frequency,
            mode.period,
            mode.participation[0],
            mode.participation[1],
            mode.participation[2]
        );
    }

    println!("\n=== Analysis Complete ===");
    Ok(())
}

//! Benchmarks for the frame solver

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use frame_solver::prelude::*;

fn create_cantilever_model() -> StructuralModel {
    let mut model = StructuralModel::new();

    model.add_material("Steel", Material::steel()).unwrap();
    model.add_section("Section", Section::rectangular(0.3, 0.5)).unwrap();

    model.add_node("N1", Node::new(0.0, 0.0, 0.0)).unwrap();
    model.add_node("N2", Node::new(10.0, 0.0, 0.0)).unwrap();

    model.add_element("M1", Element::beam("N1", "N2", "Steel", "Section")).unwrap();
    model.set_boundary_condition("N1", BoundaryCondition::fixed()).unwrap();
    model.add_load_case("Case 1", LoadCase::dead("Case 1")).unwrap();
    model
        .add_load("P", Load::node_force("Case 1", "N2", 0.0, -10000.0, 0.0))
        .unwrap();
    model.add_combination(LoadCombination::single("C1", "Case 1")).unwrap();
    model.assign_dof_numbering();

    model
}

/// Plane frame in X-Y repeated in Z, so the model is genuinely 3D
fn create_multi_story_frame(stories: usize, bays: usize, frames: usize) -> StructuralModel {
    let mut model = StructuralModel::new();

    model.add_material("Steel", Material::steel()).unwrap();
    model.add_section("Column", Section::rectangular(0.4, 0.4)).unwrap();
    model.add_section("Beam", Section::rectangular(0.3, 0.6)).unwrap();

    let story_height = 3.5;
    let bay_width = 6.0;
    let name = |story: usize, bay: usize, frame: usize| format!("N{}_{}_{}", story, bay, frame);

    for frame in 0..frames {
        for story in 0..=stories {
            for bay in 0..=bays {
                let node = Node::new(bay as f64 * bay_width, story as f64 * story_height, frame as f64 * bay_width);
                model.add_node(&name(story, bay, frame), node).unwrap();
            }
        }
    }

    for frame in 0..frames {
        for story in 0..stories {
            for bay in 0..=bays {
                let id = format!("Col{}_{}_{}", story, bay, frame);
                let column = Element::column(&name(story, bay, frame), &name(story + 1, bay, frame), "Steel", "Column");
                model.add_element(&id, column).unwrap();
            }
        }
        for story in 1..=stories {
            for bay in 0..bays {
                let id = format!("BeamX{}_{}_{}", story, bay, frame);
                let beam = Element::beam(&name(story, bay, frame), &name(story, bay + 1, frame), "Steel", "Beam");
                model.add_element(&id, beam).unwrap();
            }
            if frame + 1 < frames {
                for bay in 0..=bays {
                    let id = format!("BeamZ{}_{}_{}", story, bay, frame);
                    let beam = Element::beam(&name(story, bay, frame), &name(story, bay, frame + 1), "Steel", "Beam");
                    model.add_element(&id, beam).unwrap();
                }
            }
        }
        for bay in 0..=bays {
            model
                .set_boundary_condition(&name(0, bay, frame), BoundaryCondition::fixed())
                .unwrap();
        }
    }

    model.add_load_case("Dead", LoadCase::dead("Dead")).unwrap();
    model.add_load_case("Wind", LoadCase::wind("Wind")).unwrap();
    for frame in 0..frames {
        for story in 1..=stories {
            for bay in 0..=bays {
                let node = name(story, bay, frame);
                model
                    .add_load(&format!("D{}", node), Load::node_force("Dead", &node, 0.0, -50000.0, 0.0))
                    .unwrap();
            }
            let node = name(story, 0, frame);
            model
                .add_load(&format!("W{}", node), Load::node_force("Wind", &node, 5000.0, 0.0, 0.0))
                .unwrap();
        }
    }

    let rule = CombinationRule::new("ULS")
        .with_factor(LoadCategory::Dead, 1.2)
        .with_factor(LoadCategory::Wind, 1.6)
        .reversible(LoadCategory::Wind);
    for combo in rule.expand(&model) {
        model.add_combination(combo).unwrap();
    }
    model.add_combination(LoadCombination::single("D", "Dead")).unwrap();
    model.assign_dof_numbering();

    model
}

fn analyze(model: &StructuralModel, options: &AnalysisOptions) -> AnalysisResults {
    run(&model.snapshot(), &[], options, &CancelToken::new()).unwrap()
}

fn benchmark_cantilever(c: &mut Criterion) {
    let model = create_cantilever_model();
    c.bench_function("cantilever_linear", |b| {
        b.iter(|| black_box(analyze(&model, &AnalysisOptions::linear())))
    });
}

fn benchmark_small_frame(c: &mut Criterion) {
    let model = create_multi_story_frame(3, 2, 2);
    c.bench_function("frame_3story_2bay_linear", |b| {
        b.iter(|| black_box(analyze(&model, &AnalysisOptions::linear())))
    });
}

fn benchmark_medium_frame(c: &mut Criterion) {
    let model = create_multi_story_frame(10, 5, 3);
    c.bench_function("frame_10story_5bay_linear", |b| {
        b.iter(|| black_box(analyze(&model, &AnalysisOptions::linear())))
    });
    c.bench_function("frame_10story_5bay_linear_no_reorder", |b| {
        let options = AnalysisOptions::linear().with_reordering(false);
        b.iter(|| black_box(analyze(&model, &options)))
    });
}

fn benchmark_modal(c: &mut Criterion) {
    let model = create_multi_story_frame(5, 3, 2);
    c.bench_function("frame_5story_3bay_modal", |b| {
        b.iter(|| black_box(analyze(&model, &AnalysisOptions::modal(6))))
    });
}

criterion_group!(
    benches,
    benchmark_cantilever,
    benchmark_small_frame,
    benchmark_medium_frame,
    benchmark_modal,
);

criterion_main!(benches);

//! Frame Solver CLI
//!
//! Reads a run request (model document, combination ids, options) as JSON
//! and writes the analysis results as JSON.
//!
//! Usage: frame-analyze [REQUEST.json] [RESULTS.json]
//! Reads stdin / writes stdout when a path is omitted or `-`.

use anyhow::{Context, Result};
use log::info;
use std::io::{Read, Write};

use frame_solver::prelude::*;

fn read_input(path: Option<&str>) -> Result<String> {
    let mut input = String::new();
    match path {
        Some(path) if path != "-" => {
            input = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
        }
        _ => {
            std::io::stdin()
                .read_to_string(&mut input)
                .context("reading stdin")?;
        }
    }
    Ok(input)
}

fn write_output(path: Option<&str>, json: &str) -> Result<()> {
    match path {
        Some(path) if path != "-" => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path))?;
        }
        _ => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let input = read_input(args.get(1).map(String::as_str))?;

    let request = RunRequest::from_json(&input).context("parsing run request")?;
    let (model, combinations, options) = request.into_parts().context("building model")?;
    info!(
        "model: {} nodes, {} elements, {:?} analysis",
        model.num_nodes(),
        model.num_elements(),
        options.analysis_type
    );

    let results = run(&model.snapshot(), &combinations, &options, &CancelToken::new())
        .context("analysis failed")?;

    write_output(args.get(2).map(String::as_str), &results.to_json()?)?;
    Ok(())
}

use std::{
    env,
    fs::{self, File},
    io::{self, BufWriter, Write},
    process::ExitCode,
};

use anyhow::{Context, Result, bail};
use log::{error, info};
use serde::Serialize;

use tired_lae::{ComputationNode, EngineConfig, ExprSpec, Grid, LinearAlgebraEngine};

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Output {
    Result(Grid),
    Error(String),
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let (input, output) = match args.as_slice() {
        [_, input] => (input.as_str(), None),
        [_, input, output] => (input.as_str(), Some(output.as_str())),
        _ => {
            eprintln!("usage: tired_lae <input.json> [output.json]");
            return ExitCode::from(2);
        }
    };

    let (out, code) = match evaluate(input) {
        Ok(grid) => (Output::Result(grid), ExitCode::SUCCESS),
        Err(e) => {
            error!("evaluation failed: {e:#}");
            (Output::Error(format!("{e:#}")), ExitCode::FAILURE)
        }
    };

    if let Err(e) = write_output(&out, output) {
        eprintln!("failed to write the output: {e:#}");
        return ExitCode::FAILURE;
    }

    code
}

fn evaluate(path: &str) -> Result<Grid> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    let spec: ExprSpec =
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {path}"))?;

    let tree = ComputationNode::try_from(spec).context("invalid expression")?;
    let config = EngineConfig::from_env().context("invalid engine configuration")?;

    if config.threads == 0 {
        bail!("LAE_THREADS must be positive");
    }

    info!(threads = config.threads; "evaluating {path}");

    let mut engine = LinearAlgebraEngine::new(config)?;
    let grid = engine.run(tree)?.into_matrix()?;
    Ok(grid)
}

fn write_output(out: &Output, path: Option<&str>) -> Result<()> {
    let mut writer: Box<dyn Write> = match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {path}"))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    serde_json::to_writer_pretty(&mut writer, out)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

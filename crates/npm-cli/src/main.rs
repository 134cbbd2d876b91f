//! npm-cli: standalone harness for exercising the NLP peripheral model
//! outside of a real symbolic-CPU host.
//!
//! Loads an NLP hardware description (and, optionally, a compliance
//! sequence-rule file) from `NpmConfig`, drives a `MockCpu` through the
//! fork-point loop until completion (B3), and writes `NLPStatistics.dat` /
//! `ComplianceCheck.dat` to the configured output directory.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use npm_cli::{mock_cpu::MockCpu, replay};
use npm_core::{NlpPeripheralModel, NpmConfig};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,npm_cli=debug")))
        .init();

    info!("starting npm-cli");
    info!(version = env!("CARGO_PKG_VERSION"));

    let config = NpmConfig::from_env();
    let nlp_source = std::fs::read_to_string(&config.nlp_file_name)
        .with_context(|| format!("reading NLP file {:?}", config.nlp_file_name))?;
    let cc_source = config
        .cc_file_name
        .as_ref()
        .map(std::fs::read_to_string)
        .transpose()
        .context("reading compliance sequence-rule file")?;

    let mut model = NlpPeripheralModel::load(&nlp_source, cc_source.as_deref(), config.clone())
        .context("parsing NLP file")?;
    let mut cpu = MockCpu::new(Vec::new());

    let crossings = replay::run_until_complete(&mut model, &mut cpu, config.fork_point);
    info!(crossings, "replay complete");

    let out_dir = Path::new(&config.output_dir);
    model.shutdown(out_dir).context("writing NLPStatistics.dat / ComplianceCheck.dat")?;
    info!(output_dir = %config.output_dir, "wrote diagnosis and compliance reports");

    if model.compliance_over_budget() {
        anyhow::bail!("compliance budget exceeded with outstanding violations");
    }

    Ok(())
}

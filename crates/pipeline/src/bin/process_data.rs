//! Combine raw per-symbol files into the full and sampled datasets.

use anyhow::Context;
use tracing::info;

fn main() -> anyhow::Result<()> {
    intraday_pipeline::init_tracing();
    let config = intraday_pipeline::load_config().context("loading pipeline configuration")?;

    let summary = intraday_pipeline::run_process_data(&config).with_context(|| {
        format!("processing raw files in {}", config.paths.raw_dir.display())
    })?;

    info!(
        full = %summary.full_path.display(),
        sample = %summary.sample_path.display(),
        sample_symbols = ?summary.sample_symbols,
        "raw data processed"
    );
    Ok(())
}

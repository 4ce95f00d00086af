//! Build and persist the feature table.

use anyhow::Context;
use tracing::info;

fn main() -> anyhow::Result<()> {
    intraday_pipeline::init_tracing();
    let config = intraday_pipeline::load_config().context("loading pipeline configuration")?;

    let summary = intraday_pipeline::run_build_features(&config).with_context(|| {
        format!("building features from {}", config.feature_input_path().display())
    })?;

    info!(
        feature_set = %summary.feature_set,
        rows = summary.rows,
        symbols = summary.symbols,
        path = %summary.path.display(),
        "features saved"
    );
    Ok(())
}

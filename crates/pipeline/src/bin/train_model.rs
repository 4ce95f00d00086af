//! Train the classifier and save it.

use anyhow::Context;
use tracing::info;

fn main() -> anyhow::Result<()> {
    intraday_pipeline::init_tracing();
    let config = intraday_pipeline::load_config().context("loading pipeline configuration")?;

    let summary = intraday_pipeline::run_train(&config).with_context(|| {
        format!("training on {}", config.paths.features_path().display())
    })?;

    info!(
        accuracy = summary.accuracy,
        f1 = summary.f1,
        model = %summary.model_path.display(),
        "model trained and saved"
    );
    Ok(())
}

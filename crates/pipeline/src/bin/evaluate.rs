//! Evaluate the saved model on its held-out rows.

use anyhow::Context;
use tracing::info;

fn main() -> anyhow::Result<()> {
    intraday_pipeline::init_tracing();
    let config = intraday_pipeline::load_config().context("loading pipeline configuration")?;

    let summary = intraday_pipeline::run_evaluate(&config).with_context(|| {
        format!("evaluating {}", config.paths.model_path().display())
    })?;

    info!(
        accuracy = summary.accuracy,
        f1 = summary.f1,
        metrics = %summary.metrics_path.display(),
        report = %summary.report_path.display(),
        "evaluation complete"
    );
    Ok(())
}

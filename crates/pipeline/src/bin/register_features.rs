//! Register the feature view and check offline retrieval.

use anyhow::Context;
use tracing::info;

fn main() -> anyhow::Result<()> {
    intraday_pipeline::init_tracing();
    let config = intraday_pipeline::load_config().context("loading pipeline configuration")?;

    let summary = intraday_pipeline::run_register_features(&config).with_context(|| {
        format!(
            "registering {} in {}",
            config.registry.view_name,
            config.paths.registry_dir.display()
        )
    })?;

    info!(
        view = %summary.view,
        shape = ?summary.retrieval_shape,
        "feature view registered"
    );
    Ok(())
}

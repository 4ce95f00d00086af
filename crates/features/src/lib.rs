//! Feature computation for the intraday feature pipeline.
//!
//! This crate handles:
//! - Trailing rolling means and sums with warm-up
//! - Forward-looking labels computed per symbol
//! - Building the feature table from combined records
//! - Parquet persistence of the feature table

pub mod builder;
pub mod label;
pub mod rolling;
pub mod table_io;

pub use builder::FeatureBuilder;
pub use label::forward_labels;
pub use rolling::{pct_change, rolling_mean, rolling_sum, RollingStats, RollingWindow};
pub use table_io::{read_feature_table, table_schema, write_feature_table, FEATURE_SET_METADATA_KEY};

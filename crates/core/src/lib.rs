//! Core types and configuration for the intraday feature pipeline.
//!
//! This crate provides shared types used across all other crates:
//! - Market records and feature rows
//! - Versioned feature-set declarations
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod feature_set;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use feature_set::{
    FeatureColumn, FeatureKind, FeatureSet, LabelSpec, VolumeAggregate, FEATURE_SET_NAME,
    LABEL_COLUMN,
};
pub use types::*;

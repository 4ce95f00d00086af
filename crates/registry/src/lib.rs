//! Feature registry for the intraday feature pipeline.
//!
//! This crate handles:
//! - Entity, source and feature-view declarations for the stored table
//! - Keeping the label out of every servable schema
//! - An explicitly opened and closed store client
//! - Point-in-time offline retrieval

pub mod definition;
pub mod store;

pub use definition::{Entity, FeatureView, Field, FileSource, ValueType};
pub use store::{EntityRow, FeatureStore, Registry, RetrievalFrame, RetrievedRow, REGISTRY_FILE};

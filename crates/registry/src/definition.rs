//! Feature registry declarations.
//!
//! A [`FeatureView`] describes a stored feature table to a serving layer:
//! which entity keys it, which column carries event time, and which
//! columns may be served. The label is stored alongside the features but
//! must never be part of a view's schema.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::Duration;
use intraday_core::{Error, FeatureSet, Result};
use serde::{Deserialize, Serialize};

/// Declared type of an entity key or feature column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Float64,
    Int64,
}

/// The key feature rows are joined on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub join_keys: Vec<String>,
    pub value_type: ValueType,
}

impl Entity {
    /// String-keyed entity joined on a single column of the same name.
    pub fn string_key(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            join_keys: vec![name.clone()],
            name,
            value_type: ValueType::String,
        }
    }
}

/// A servable column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub dtype: ValueType,
}

/// Where the view's rows are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSource {
    pub path: PathBuf,
    pub timestamp_field: String,
}

/// Servable description of a stored feature table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureView {
    pub name: String,
    pub entities: Vec<Entity>,
    /// Maximum age of a row at retrieval time, in seconds. `None` means unlimited.
    pub ttl_seconds: Option<i64>,
    pub schema: Vec<Field>,
    pub source: FileSource,
    pub online: bool,
    /// Declaration the stored table was produced with.
    pub feature_set: FeatureSet,
}

impl FeatureView {
    /// Describe a table stored at `path` that was built with `feature_set`.
    ///
    /// The schema is the feature set's servable columns: base OHLCV plus
    /// derived features, never the label.
    pub fn from_feature_set(
        name: impl Into<String>,
        feature_set: &FeatureSet,
        path: impl Into<PathBuf>,
        ttl_seconds: Option<i64>,
        online: bool,
    ) -> Self {
        let schema = feature_set
            .servable_columns()
            .into_iter()
            .map(|name| Field {
                name: name.to_string(),
                dtype: ValueType::Float64,
            })
            .collect();

        Self {
            name: name.into(),
            entities: vec![Entity::string_key(feature_set.entity.clone())],
            ttl_seconds,
            schema,
            source: FileSource {
                path: path.into(),
                timestamp_field: feature_set.timestamp_field.clone(),
            },
            online,
            feature_set: feature_set.clone(),
        }
    }

    /// Version of the bound feature set.
    pub fn feature_set_version(&self) -> u32 {
        self.feature_set.version
    }

    /// Names of the servable columns.
    pub fn feature_names(&self) -> Vec<&str> {
        self.schema.iter().map(|f| f.name.as_str()).collect()
    }

    /// Whether `name` is a servable column of this view.
    pub fn has_feature(&self, name: &str) -> bool {
        self.schema.iter().any(|f| f.name == name)
    }

    /// Maximum age of a served row, if bounded.
    ///
    /// Fails with `Config` for a negative or out-of-range `ttl_seconds`.
    pub fn ttl(&self) -> Result<Option<Duration>> {
        self.ttl_seconds
            .map(|secs| {
                Duration::try_seconds(secs)
                    .filter(|ttl| *ttl >= Duration::zero())
                    .ok_or_else(|| {
                        Error::config(format!("view {} has invalid ttl {secs}s", self.name))
                    })
            })
            .transpose()
    }

    /// Check the view against its feature set.
    ///
    /// Fails with `LabelLeak` if the label, the entity key, or the
    /// timestamp appears in the schema, and with `UnknownFeature` if the
    /// schema names a column the feature set does not store.
    pub fn validate(&self) -> Result<()> {
        let set = &self.feature_set;
        if self.name.is_empty() {
            return Err(Error::config("feature view name must not be empty"));
        }
        self.ttl()?;

        for field in &self.schema {
            if field.name == set.label.name {
                return Err(Error::label_leak(format!(
                    "view {} exposes label column {}",
                    self.name, field.name
                )));
            }
            if field.name == set.entity || field.name == set.timestamp_field {
                return Err(Error::label_leak(format!(
                    "view {} exposes key column {} as a feature",
                    self.name, field.name
                )));
            }
        }

        let servable: HashSet<&str> = set.servable_columns().into_iter().collect();
        let mut seen = HashSet::new();
        for field in &self.schema {
            if !servable.contains(field.name.as_str()) {
                return Err(Error::unknown_feature(format!(
                    "view {} declares {}, which {} does not store",
                    self.name,
                    field.name,
                    set.id()
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::config(format!(
                    "view {} declares {} twice",
                    self.name, field.name
                )));
            }
        }

        let keyed_on_entity = self
            .entities
            .iter()
            .any(|e| e.join_keys.iter().any(|k| *k == set.entity));
        if !keyed_on_entity {
            return Err(Error::config(format!(
                "view {} has no entity joined on {}",
                self.name, set.entity
            )));
        }
        if self.source.timestamp_field != set.timestamp_field {
            return Err(Error::config(format!(
                "view {} reads event time from {}, table stores it in {}",
                self.name, self.source.timestamp_field, set.timestamp_field
            )));
        }
        Ok(())
    }
}

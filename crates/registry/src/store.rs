//! Feature store client.
//!
//! The store is constructed explicitly from a repository directory, holds
//! the registered views in memory, and writes them back on [`FeatureStore::close`].
//! Offline retrieval performs a point-in-time join against each view's
//! stored table.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use intraday_core::{Error, FeatureRow, FeatureSet, FeatureTable, Result, SourceField};
use intraday_features::read_feature_table;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::definition::FeatureView;

/// Registry file inside the repository directory.
pub const REGISTRY_FILE: &str = "registry.json";

/// Persisted registry contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    /// Registered views by name.
    pub views: BTreeMap<String, FeatureView>,
}

/// An entity key and the instant features are wanted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRow {
    pub entity: String,
    pub event_timestamp: DateTime<Utc>,
}

impl EntityRow {
    pub fn new(entity: impl Into<String>, event_timestamp: DateTime<Utc>) -> Self {
        Self {
            entity: entity.into(),
            event_timestamp,
        }
    }
}

/// One retrieved row: the request plus a value per requested feature.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedRow {
    pub entity: String,
    pub event_timestamp: DateTime<Utc>,
    /// `None` where no stored row was visible at the event time.
    pub values: Vec<Option<f64>>,
}

/// Result of an offline retrieval, one row per entity row in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalFrame {
    /// Requested references (`view:feature`), in request order.
    pub columns: Vec<String>,
    pub rows: Vec<RetrievedRow>,
}

impl RetrievalFrame {
    /// (rows, columns) including the entity and timestamp columns.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len() + 2)
    }

    /// Values of one requested reference.
    pub fn column(&self, reference: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.columns.iter().position(|c| c == reference)?;
        Some(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    /// Rows where every requested value was found.
    pub fn complete_rows(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.values.iter().all(Option::is_some))
            .count()
    }
}

/// A parsed `view:feature` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FeatureRef<'a> {
    view: &'a str,
    feature: &'a str,
}

impl<'a> FeatureRef<'a> {
    fn parse(reference: &'a str) -> Result<Self> {
        match reference.split_once(':') {
            Some((view, feature)) if !view.is_empty() && !feature.is_empty() => {
                Ok(Self { view, feature })
            }
            _ => Err(Error::unknown_feature(format!(
                "{reference} is not of the form view:feature"
            ))),
        }
    }
}

/// Rows of one stored table, grouped by entity in ascending time.
struct TimeIndex {
    feature_set: FeatureSet,
    by_entity: HashMap<String, Vec<FeatureRow>>,
}

impl TimeIndex {
    fn new(table: FeatureTable) -> Self {
        let mut by_entity: HashMap<String, Vec<FeatureRow>> = HashMap::new();
        for row in table.rows {
            by_entity.entry(row.record.symbol.clone()).or_default().push(row);
        }
        for rows in by_entity.values_mut() {
            rows.sort_by_key(|r| r.record.timestamp);
        }
        Self {
            feature_set: table.feature_set,
            by_entity,
        }
    }

    /// Latest row at or before `at`, no older than `ttl` when set.
    fn as_of(&self, entity: &str, at: DateTime<Utc>, ttl: Option<Duration>) -> Option<&FeatureRow> {
        let rows = self.by_entity.get(entity)?;
        let visible = rows.partition_point(|r| r.record.timestamp <= at);
        let row = rows.get(visible.checked_sub(1)?)?;
        match ttl {
            Some(ttl) if at - row.record.timestamp > ttl => None,
            _ => Some(row),
        }
    }

    /// Value of a servable column.
    fn value(&self, row: &FeatureRow, column: &str) -> Option<f64> {
        if let Some(source) = SourceField::ALL.iter().find(|f| f.column_name() == column) {
            return Some(source.value(&row.record));
        }
        self.feature_set
            .feature_index(column)
            .and_then(|i| row.features.get(i).copied())
    }
}

/// Explicitly constructed feature store client.
pub struct FeatureStore {
    repo_dir: PathBuf,
    registry: Registry,
}

impl FeatureStore {
    /// Open a repository, loading its registry if one exists.
    pub fn open(repo_dir: impl AsRef<Path>) -> Result<Self> {
        let repo_dir = repo_dir.as_ref().to_path_buf();
        let registry_path = repo_dir.join(REGISTRY_FILE);
        let registry = if registry_path.exists() {
            let content = fs::read_to_string(&registry_path)?;
            serde_json::from_str(&content)?
        } else {
            Registry::default()
        };

        debug!(
            repo = %repo_dir.display(),
            views = registry.views.len(),
            "opened feature store"
        );
        Ok(Self { repo_dir, registry })
    }

    /// Repository directory.
    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Validate and register a view, replacing one of the same name.
    pub fn apply(&mut self, view: FeatureView) -> Result<()> {
        view.validate()?;
        info!(
            view = %view.name,
            feature_set = %view.feature_set.id(),
            features = view.schema.len(),
            online = view.online,
            "registered feature view"
        );
        self.registry.views.insert(view.name.clone(), view);
        Ok(())
    }

    /// Look up a registered view.
    pub fn view(&self, name: &str) -> Option<&FeatureView> {
        self.registry.views.get(name)
    }

    /// All registered views, by name.
    pub fn views(&self) -> impl Iterator<Item = &FeatureView> {
        self.registry.views.values()
    }

    /// Point-in-time retrieval.
    ///
    /// For each entity row, every requested feature is read from the latest
    /// stored row of that entity whose timestamp is at or before the event
    /// timestamp (and within the view's ttl). References must name a
    /// registered view and one of its schema columns; the label is never
    /// retrievable.
    pub fn get_historical_features(
        &self,
        entity_rows: &[EntityRow],
        features: &[&str],
    ) -> Result<RetrievalFrame> {
        let mut refs = Vec::with_capacity(features.len());
        for reference in features {
            let parsed = FeatureRef::parse(reference)?;
            let view = self.view(parsed.view).ok_or_else(|| {
                Error::unknown_feature(format!("{reference}: no view named {}", parsed.view))
            })?;
            if !view.has_feature(parsed.feature) {
                return Err(Error::unknown_feature(format!(
                    "{reference}: {} is not in the schema of {}",
                    parsed.feature, view.name
                )));
            }
            refs.push((view, parsed.feature));
        }

        let mut indexes: HashMap<&str, TimeIndex> = HashMap::new();
        for (view, _) in &refs {
            if !indexes.contains_key(view.name.as_str()) {
                let table = read_feature_table(&view.source.path, Some(&view.feature_set))?;
                indexes.insert(view.name.as_str(), TimeIndex::new(table));
            }
        }

        let ttls: Vec<Option<Duration>> = refs
            .iter()
            .map(|(view, _)| view.ttl())
            .collect::<Result<_>>()?;

        let rows: Vec<RetrievedRow> = entity_rows
            .iter()
            .map(|entity_row| {
                let values = refs
                    .iter()
                    .zip(&ttls)
                    .map(|((view, feature), ttl)| {
                        let index = indexes.get(view.name.as_str())?;
                        let row = index.as_of(&entity_row.entity, entity_row.event_timestamp, *ttl)?;
                        index.value(row, feature)
                    })
                    .collect();
                RetrievedRow {
                    entity: entity_row.entity.clone(),
                    event_timestamp: entity_row.event_timestamp,
                    values,
                }
            })
            .collect();

        let frame = RetrievalFrame {
            columns: features.iter().map(|f| f.to_string()).collect(),
            rows,
        };
        debug!(
            rows = frame.rows.len(),
            complete = frame.complete_rows(),
            "retrieved historical features"
        );
        Ok(frame)
    }

    /// Persist the registry and release the client.
    pub fn close(self) -> Result<()> {
        fs::create_dir_all(&self.repo_dir)?;
        let path = self.repo_dir.join(REGISTRY_FILE);
        let json = serde_json::to_string_pretty(&self.registry)?;
        fs::write(&path, json)?;
        debug!(path = %path.display(), views = self.registry.views.len(), "closed feature store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use intraday_core::{Record, VolumeAggregate};
    use intraday_features::write_feature_table;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 9, minute, 0).unwrap()
    }

    fn feature_set() -> FeatureSet {
        FeatureSet::rolling(10, 5, VolumeAggregate::Sum)
    }

    fn make_row(symbol: &str, minute: u32, close: f64, label: u8) -> FeatureRow {
        FeatureRow {
            record: Record {
                timestamp: ts(minute),
                symbol: symbol.to_string(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 10.0,
            },
            features: vec![close * 2.0, 100.0],
            label,
        }
    }

    /// Store with one view over a small table in a temp repository.
    fn store_with_view(dir: &Path, ttl_seconds: Option<i64>) -> FeatureStore {
        let path = dir.join("features.parquet");
        let table = FeatureTable::new(
            feature_set(),
            vec![
                make_row("AAA", 15, 1.0, 0),
                make_row("AAA", 20, 2.0, 1),
                make_row("BBB", 15, 7.0, 1),
            ],
        );
        write_feature_table(&path, &table).unwrap();

        let mut store = FeatureStore::open(dir.join("repo")).unwrap();
        let view = FeatureView::from_feature_set("minute_features", &feature_set(), path, ttl_seconds, true);
        store.apply(view).unwrap();
        store
    }

    #[test]
    fn test_point_in_time_join() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_view(dir.path(), None);

        let frame = store
            .get_historical_features(
                &[
                    EntityRow::new("AAA", ts(14)),
                    EntityRow::new("AAA", ts(15)),
                    EntityRow::new("AAA", ts(19)),
                    EntityRow::new("AAA", ts(30)),
                    EntityRow::new("BBB", ts(16)),
                    EntityRow::new("ZZZ", ts(16)),
                ],
                &["minute_features:close_price", "minute_features:rolling_close_mean_10"],
            )
            .unwrap();

        assert_eq!(frame.shape(), (6, 4));
        assert_eq!(
            frame.column("minute_features:close_price").unwrap(),
            vec![None, Some(1.0), Some(1.0), Some(2.0), Some(7.0), None]
        );
        assert_eq!(
            frame.column("minute_features:rolling_close_mean_10").unwrap()[3],
            Some(4.0)
        );
        assert_eq!(frame.complete_rows(), 4);
    }

    #[test]
    fn test_ttl_hides_stale_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_view(dir.path(), Some(120));

        let frame = store
            .get_historical_features(
                &[EntityRow::new("AAA", ts(21)), EntityRow::new("AAA", ts(25))],
                &["minute_features:close_price"],
            )
            .unwrap();
        assert_eq!(frame.rows[0].values, vec![Some(2.0)]);
        assert_eq!(frame.rows[1].values, vec![None]);
    }

    #[test]
    fn test_label_is_not_retrievable() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_view(dir.path(), None);
        let err = store
            .get_historical_features(&[EntityRow::new("AAA", ts(20))], &["minute_features:label"])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownFeature(_)));
    }

    #[test]
    fn test_unknown_view_and_malformed_reference() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_view(dir.path(), None);
        let rows = [EntityRow::new("AAA", ts(20))];
        assert!(matches!(
            store.get_historical_features(&rows, &["other:close_price"]),
            Err(Error::UnknownFeature(_))
        ));
        assert!(matches!(
            store.get_historical_features(&rows, &["close_price"]),
            Err(Error::UnknownFeature(_))
        ));
    }

    #[test]
    fn test_close_then_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_view(dir.path(), None);
        let repo = store.repo_dir().to_path_buf();
        store.close().unwrap();

        assert!(repo.join(REGISTRY_FILE).exists());
        let reopened = FeatureStore::open(&repo).unwrap();
        let view = reopened.view("minute_features").unwrap();
        assert_eq!(view.feature_set, feature_set());
        assert_eq!(reopened.views().count(), 1);
    }

    #[test]
    fn test_apply_rejects_leaking_view() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FeatureStore::open(dir.path()).unwrap();
        let mut view = FeatureView::from_feature_set("v", &feature_set(), "x.parquet", None, false);
        view.schema.push(crate::definition::Field {
            name: "label".to_string(),
            dtype: crate::definition::ValueType::Int64,
        });
        assert!(matches!(store.apply(view), Err(Error::LabelLeak(_))));
        assert!(store.view("v").is_none());
    }
}

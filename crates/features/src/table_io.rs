//! Parquet persistence for feature tables.
//!
//! The declaring [`FeatureSet`] is embedded as JSON in the file's key-value
//! metadata so readers can verify they bind to the version that produced
//! the rows.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float64Array, Float64Builder, Int64Array, Int64Builder, StringArray,
    StringBuilder, TimestampMillisecondArray, TimestampMillisecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use intraday_core::{Error, FeatureRow, FeatureSet, FeatureTable, Record, Result, SourceField};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use tracing::{debug, info};

/// Metadata key holding the feature-set declaration.
pub const FEATURE_SET_METADATA_KEY: &str = "feature_set";

const TIMEZONE: &str = "UTC";

fn storage_err(e: impl std::fmt::Display) -> Error {
    Error::storage(e.to_string())
}

/// Arrow schema for a feature set's stored columns.
pub fn table_schema(feature_set: &FeatureSet) -> Schema {
    let mut fields = vec![
        Field::new(
            &feature_set.timestamp_field,
            DataType::Timestamp(TimeUnit::Millisecond, Some(TIMEZONE.into())),
            false,
        ),
        Field::new(&feature_set.entity, DataType::Utf8, false),
    ];
    for source in SourceField::ALL {
        fields.push(Field::new(source.column_name(), DataType::Float64, false));
    }
    for name in feature_set.feature_names() {
        fields.push(Field::new(name, DataType::Float64, false));
    }
    fields.push(Field::new(&feature_set.label.name, DataType::Int64, false));
    Schema::new(fields)
}

/// Build an Arrow RecordBatch from the table's rows.
fn build_record_batch(table: &FeatureTable, schema: Arc<Schema>) -> Result<RecordBatch> {
    let n = table.len();
    let n_features = table.feature_set.columns.len();

    let mut timestamps = TimestampMillisecondBuilder::with_capacity(n).with_timezone(TIMEZONE);
    let mut symbols = StringBuilder::with_capacity(n, n * 8);
    let mut base: Vec<Float64Builder> = SourceField::ALL
        .iter()
        .map(|_| Float64Builder::with_capacity(n))
        .collect();
    let mut features: Vec<Float64Builder> = (0..n_features)
        .map(|_| Float64Builder::with_capacity(n))
        .collect();
    let mut labels = Int64Builder::with_capacity(n);

    for row in &table.rows {
        if row.features.len() != n_features {
            return Err(Error::data(format!(
                "row for {} at {} has {} feature values, feature set declares {}",
                row.record.symbol,
                row.record.timestamp,
                row.features.len(),
                n_features
            )));
        }
        timestamps.append_value(row.record.timestamp.timestamp_millis());
        symbols.append_value(&row.record.symbol);
        for (builder, source) in base.iter_mut().zip(SourceField::ALL) {
            builder.append_value(source.value(&row.record));
        }
        for (builder, value) in features.iter_mut().zip(&row.features) {
            builder.append_value(*value);
        }
        labels.append_value(i64::from(row.label));
    }

    let mut columns: Vec<ArrayRef> = vec![Arc::new(timestamps.finish()), Arc::new(symbols.finish())];
    columns.extend(base.iter_mut().map(|b| Arc::new(b.finish()) as ArrayRef));
    columns.extend(features.iter_mut().map(|b| Arc::new(b.finish()) as ArrayRef));
    columns.push(Arc::new(labels.finish()));

    RecordBatch::try_new(schema, columns).map_err(storage_err)
}

/// Write a feature table, replacing any existing file.
///
/// Identical tables produce byte-identical files.
pub fn write_feature_table(path: &Path, table: &FeatureTable) -> Result<()> {
    // Create parent directories if needed
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let schema = Arc::new(table_schema(&table.feature_set));
    let batch = build_record_batch(table, schema.clone())?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(vec![KeyValue::new(
            FEATURE_SET_METADATA_KEY.to_string(),
            table.feature_set.to_json()?,
        )]))
        .build();

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(props)).map_err(storage_err)?;
    if batch.num_rows() > 0 {
        writer.write(&batch).map_err(storage_err)?;
    }
    writer.close().map_err(storage_err)?;

    info!(
        path = %path.display(),
        rows = table.len(),
        feature_set = %table.feature_set.id(),
        "wrote feature table"
    );
    Ok(())
}

/// Read a feature table.
///
/// With `expected` set, the embedded declaration must match it. Rows with a
/// null in any stored column are skipped.
pub fn read_feature_table(path: &Path, expected: Option<&FeatureSet>) -> Result<FeatureTable> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(storage_err)?;

    let embedded = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .and_then(|kvs| kvs.iter().find(|kv| kv.key == FEATURE_SET_METADATA_KEY))
        .and_then(|kv| kv.value.as_deref())
        .map(FeatureSet::from_json)
        .transpose()?;

    let feature_set = match (embedded, expected) {
        (Some(stored), Some(expected)) if !stored.is_compatible_with(expected) => {
            return Err(Error::feature_set_mismatch(format!(
                "{} was written with {}, expected {}",
                path.display(),
                stored.id(),
                expected.id()
            )));
        }
        (Some(stored), _) => stored,
        (None, Some(expected)) => expected.clone(),
        (None, None) => {
            return Err(Error::feature_set_mismatch(format!(
                "{} carries no feature set declaration",
                path.display()
            )));
        }
    };

    let schema = builder.schema().clone();
    let missing: Vec<&str> = feature_set
        .stored_columns()
        .into_iter()
        .filter(|c| schema.index_of(c).is_err())
        .collect();
    if !missing.is_empty() {
        return Err(Error::missing_columns(missing));
    }

    let reader = builder.build().map_err(storage_err)?;
    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for batch in reader {
        let batch = batch.map_err(storage_err)?;
        skipped += read_batch(&batch, &feature_set, &mut rows)?;
    }

    debug!(path = %path.display(), rows = rows.len(), skipped, "read feature table");
    Ok(FeatureTable::new(feature_set, rows))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::missing_columns([name]))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::data(format!("column {name} has unexpected type")))
}

/// Append the batch's complete rows; returns how many were skipped.
fn read_batch(batch: &RecordBatch, feature_set: &FeatureSet, out: &mut Vec<FeatureRow>) -> Result<usize> {
    let timestamps: &TimestampMillisecondArray = column(batch, &feature_set.timestamp_field)?;
    let symbols: &StringArray = column(batch, &feature_set.entity)?;
    let base: Vec<&Float64Array> = SourceField::ALL
        .iter()
        .map(|f| column(batch, f.column_name()))
        .collect::<Result<_>>()?;
    let features: Vec<&Float64Array> = feature_set
        .feature_names()
        .into_iter()
        .map(|name| column(batch, name))
        .collect::<Result<_>>()?;
    let labels: &Int64Array = column(batch, &feature_set.label.name)?;

    let mut skipped = 0;
    for i in 0..batch.num_rows() {
        let any_null = timestamps.is_null(i)
            || symbols.is_null(i)
            || labels.is_null(i)
            || base.iter().any(|a| a.is_null(i))
            || features.iter().any(|a| a.is_null(i));
        if any_null {
            skipped += 1;
            continue;
        }

        let ms = timestamps.value(i);
        let timestamp = DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| Error::data(format!("timestamp {ms} out of range")))?;
        let label = match labels.value(i) {
            0 => 0,
            1 => 1,
            other => return Err(Error::data(format!("label must be 0 or 1, got {other}"))),
        };

        out.push(FeatureRow {
            record: Record {
                timestamp,
                symbol: symbols.value(i).to_string(),
                open: base[0].value(i),
                high: base[1].value(i),
                low: base[2].value(i),
                close: base[3].value(i),
                volume: base[4].value(i),
            },
            features: features.iter().map(|a| a.value(i)).collect(),
            label,
        });
    }
    Ok(skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FeatureBuilder;
    use chrono::{Duration, TimeZone, Utc};
    use intraday_core::VolumeAggregate;

    fn sample_table() -> FeatureTable {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 9, 15, 0).unwrap();
        let records: Vec<Record> = (0..24)
            .map(|i| Record {
                timestamp: start + Duration::minutes(i / 2),
                symbol: if i % 2 == 0 { "AAA" } else { "BBB" }.to_string(),
                open: 10.0 + i as f64,
                high: 11.0 + i as f64,
                low: 9.0 + i as f64,
                close: 10.5 + ((i * 5) % 7) as f64,
                volume: 100.0 + i as f64,
            })
            .collect();
        FeatureBuilder::new(FeatureSet::rolling(10, 5, VolumeAggregate::Sum))
            .build(&records)
            .unwrap()
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/features.parquet");
        let table = sample_table();

        write_feature_table(&path, &table).unwrap();
        let read = read_feature_table(&path, Some(&table.feature_set)).unwrap();
        assert_eq!(read, table);
    }

    #[test]
    fn test_schema_matches_stored_columns() {
        let set = FeatureSet::rolling(10, 5, VolumeAggregate::Sum);
        let schema = table_schema(&set);
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, set.stored_columns());
        assert_eq!(schema.field_with_name("label").unwrap().data_type(), &DataType::Int64);
    }

    #[test]
    fn test_write_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.parquet");
        let second = dir.path().join("b.parquet");
        write_feature_table(&first, &sample_table()).unwrap();
        write_feature_table(&second, &sample_table()).unwrap();
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_mismatched_feature_set_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.parquet");
        write_feature_table(&path, &sample_table()).unwrap();

        let other = FeatureSet::rolling(20, 5, VolumeAggregate::Sum);
        let err = read_feature_table(&path, Some(&other)).unwrap_err();
        assert!(matches!(err, Error::FeatureSetMismatch(_)));
    }

    #[test]
    fn test_missing_label_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_label.parquet");
        let set = FeatureSet::rolling(10, 5, VolumeAggregate::Sum);

        // Same schema minus the label, with no embedded declaration.
        let fields: Vec<Field> = table_schema(&set)
            .fields()
            .iter()
            .filter(|f| f.name() != "label")
            .map(|f| f.as_ref().clone())
            .collect();
        let schema = Arc::new(Schema::new(fields));
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
        writer.close().unwrap();

        match read_feature_table(&path, Some(&set)).unwrap_err() {
            Error::MissingColumn { fields } => assert_eq!(fields, vec!["label".to_string()]),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_null_rows_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nulls.parquet");
        let set = FeatureSet::rolling(2, 1, VolumeAggregate::Sum);

        let nullable: Vec<Field> = table_schema(&set)
            .fields()
            .iter()
            .map(|f| f.as_ref().clone().with_nullable(true))
            .collect();
        let schema = Arc::new(Schema::new(nullable));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(TimestampMillisecondArray::from(vec![0, 60_000]).with_timezone(TIMEZONE)),
            Arc::new(StringArray::from(vec!["AAA", "AAA"])),
            Arc::new(Float64Array::from(vec![1.0, 2.0])),
            Arc::new(Float64Array::from(vec![1.0, 2.0])),
            Arc::new(Float64Array::from(vec![1.0, 2.0])),
            Arc::new(Float64Array::from(vec![1.0, 2.0])),
            Arc::new(Float64Array::from(vec![5.0, 6.0])),
            Arc::new(Float64Array::from(vec![Some(1.0), None])),
            Arc::new(Float64Array::from(vec![5.0, 11.0])),
            Arc::new(Int64Array::from(vec![1, 0])),
        ];
        let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = read_feature_table(&path, Some(&set)).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].label, 1);
        assert_eq!(table.rows[0].features, vec![1.0, 5.0]);
    }

    #[test]
    fn test_no_declaration_and_no_expectation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bare.parquet");
        let set = FeatureSet::rolling(10, 5, VolumeAggregate::Sum);
        let schema = Arc::new(table_schema(&set));
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
        writer.close().unwrap();

        assert!(matches!(
            read_feature_table(&path, None),
            Err(Error::FeatureSetMismatch(_))
        ));
        assert!(read_feature_table(&path, Some(&set)).unwrap().is_empty());
    }
}

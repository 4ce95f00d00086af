//! Raw per-symbol CSV ingestion.
//!
//! Resolves column-name variants, parses timestamps best-effort, and drops
//! rows that cannot become a valid [`Record`]. Schema problems are fatal;
//! row problems are counted and skipped.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{ByteRecord, StringRecord};
use intraday_core::{config::IngestConfig, Error, Record, Result};
use tracing::debug;

/// Timestamp layouts carrying an explicit UTC offset.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%z",
];

/// Timestamp layouts without an offset; interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// Date-only layouts; interpreted as midnight UTC.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parse a timestamp in any of the accepted layouts, normalized to UTC.
///
/// Returns `None` for anything unparseable; callers drop such rows.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

/// Parse a finite floating-point cell.
fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Derive the symbol from a raw file name: the stem up to the first delimiter.
///
/// `AARTIIND__minute.csv` with delimiter `__` gives `AARTIIND`; a stem
/// without the delimiter is used whole.
pub fn symbol_from_path(path: &Path, delimiter: &str) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let symbol = stem.split(delimiter).next().unwrap_or(stem).trim();
    if symbol.is_empty() {
        None
    } else {
        Some(symbol.to_string())
    }
}

/// A logical input field and the header names accepted for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawField {
    Timestamp,
    Symbol,
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl RawField {
    const PRICE_FIELDS: [RawField; 6] = [
        RawField::Timestamp,
        RawField::Open,
        RawField::High,
        RawField::Low,
        RawField::Close,
        RawField::Volume,
    ];

    /// Name used in MissingColumn errors.
    pub fn logical_name(self) -> &'static str {
        match self {
            RawField::Timestamp => "timestamp",
            RawField::Symbol => "symbol",
            RawField::Open => "open",
            RawField::High => "high",
            RawField::Low => "low",
            RawField::Close => "close",
            RawField::Volume => "volume",
        }
    }

    /// Accepted header names, canonical first.
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            RawField::Timestamp => &["timestamp", "datetime", "date"],
            RawField::Symbol => &["stock_symbol", "symbol"],
            RawField::Open => &["open_price", "open"],
            RawField::High => &["high_price", "high"],
            RawField::Low => &["low_price", "low"],
            RawField::Close => &["close_price", "close"],
            RawField::Volume => &["volume", "vol"],
        }
    }
}

/// Column positions for every required field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub timestamp: usize,
    pub symbol: Option<usize>,
    pub open: usize,
    pub high: usize,
    pub low: usize,
    pub close: usize,
    pub volume: usize,
}

/// Maps header rows onto logical fields.
pub struct ColumnResolver;

impl ColumnResolver {
    fn normalize(header: &str) -> String {
        header.trim_start_matches('\u{feff}').trim().to_ascii_lowercase()
    }

    fn find(headers: &[String], field: RawField) -> Option<usize> {
        field
            .candidates()
            .iter()
            .find_map(|candidate| headers.iter().position(|h| h == candidate))
    }

    /// Resolve every required field, or fail naming all that are missing.
    pub fn resolve(headers: &StringRecord, require_symbol: bool) -> Result<ColumnMap> {
        let normalized: Vec<String> = headers.iter().map(Self::normalize).collect();

        let mut fields: Vec<RawField> = RawField::PRICE_FIELDS.to_vec();
        if require_symbol {
            fields.insert(1, RawField::Symbol);
        }

        let mut missing = Vec::new();
        let mut positions = Vec::with_capacity(fields.len());
        for field in &fields {
            match Self::find(&normalized, *field) {
                Some(idx) => positions.push((*field, idx)),
                None => missing.push(field.logical_name()),
            }
        }
        if !missing.is_empty() {
            return Err(Error::missing_columns(missing));
        }

        let pos = |f: RawField| positions.iter().find(|(field, _)| *field == f).map(|(_, i)| *i);
        Ok(ColumnMap {
            timestamp: pos(RawField::Timestamp).unwrap_or_default(),
            symbol: pos(RawField::Symbol),
            open: pos(RawField::Open).unwrap_or_default(),
            high: pos(RawField::High).unwrap_or_default(),
            low: pos(RawField::Low).unwrap_or_default(),
            close: pos(RawField::Close).unwrap_or_default(),
            volume: pos(RawField::Volume).unwrap_or_default(),
        })
    }
}

/// Counters for rows seen and dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Files read.
    pub files_read: u64,
    /// Data rows read (excluding headers).
    pub rows_read: u64,
    /// Rows kept as records.
    pub rows_kept: u64,
    /// Rows dropped for an unparseable timestamp.
    pub dropped_timestamp: u64,
    /// Rows dropped for missing, non-numeric or negative values.
    pub dropped_values: u64,
}

impl IngestStats {
    /// Total dropped rows.
    pub fn dropped(&self) -> u64 {
        self.dropped_timestamp + self.dropped_values
    }
}

/// All records of one symbol, ascending by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolSeries {
    pub symbol: String,
    pub records: Vec<Record>,
    /// File the series was read from.
    pub source: PathBuf,
}

impl SymbolSeries {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Why a row could not be turned into a record.
enum RowRejection {
    Timestamp,
    Values,
}

/// Reads raw and combined CSV files into records.
pub struct Ingestor {
    symbol_delimiter: String,
    file_extension: String,
    stats: IngestStats,
}

impl Ingestor {
    /// Create an ingestor from configuration.
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            symbol_delimiter: config.symbol_delimiter.clone(),
            file_extension: config.file_extension.clone(),
            stats: IngestStats::default(),
        }
    }

    /// Cumulative statistics since creation.
    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Read one raw file for `symbol`. Output is stable-sorted by timestamp.
    pub fn read_symbol_file(&mut self, path: &Path, symbol: &str) -> Result<SymbolSeries> {
        let file = File::open(path)?;
        let mut records = self.read_records(file, Some(symbol))?;
        records.sort_by_key(|r| r.timestamp);

        debug!(
            symbol,
            path = %path.display(),
            rows = records.len(),
            "read raw symbol file"
        );

        Ok(SymbolSeries {
            symbol: symbol.to_string(),
            records,
            source: path.to_path_buf(),
        })
    }

    /// Read every raw file in `dir` with the configured extension, in file-name order.
    pub fn read_raw_dir(&mut self, dir: &Path) -> Result<Vec<SymbolSeries>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && self.has_raw_extension(p))
            .collect();
        paths.sort();

        let mut series = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(symbol) = symbol_from_path(&path, &self.symbol_delimiter) else {
                debug!(path = %path.display(), "skipping file without a symbol prefix");
                continue;
            };
            series.push(self.read_symbol_file(&path, &symbol)?);
        }
        Ok(series)
    }

    /// Read a combined dataset (symbol column required). File order is preserved.
    pub fn read_combined(&mut self, path: &Path) -> Result<Vec<Record>> {
        let file = File::open(path)?;
        self.read_records(file, None)
    }

    fn has_raw_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.file_extension))
            .unwrap_or(false)
    }

    /// Read records from CSV. With `symbol` set every row gets that symbol;
    /// otherwise the symbol column is required.
    fn read_records<R: Read>(&mut self, input: R, symbol: Option<&str>) -> Result<Vec<Record>> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(input);

        let headers = reader.headers()?.clone();
        let columns = ColumnResolver::resolve(&headers, symbol.is_none())?;
        self.stats.files_read += 1;

        // Cells are decoded individually; invalid UTF-8 drops only its row.
        let mut records = Vec::new();
        for row in reader.byte_records() {
            let row = row?;
            self.stats.rows_read += 1;
            match Self::parse_row(&row, &columns, symbol) {
                Ok(record) => {
                    self.stats.rows_kept += 1;
                    records.push(record);
                }
                Err(RowRejection::Timestamp) => self.stats.dropped_timestamp += 1,
                Err(RowRejection::Values) => self.stats.dropped_values += 1,
            }
        }
        Ok(records)
    }

    fn parse_row(
        row: &ByteRecord,
        columns: &ColumnMap,
        symbol: Option<&str>,
    ) -> std::result::Result<Record, RowRejection> {
        let timestamp = cell(row, columns.timestamp)
            .and_then(parse_timestamp)
            .ok_or(RowRejection::Timestamp)?;

        let symbol = match symbol {
            Some(s) => s.to_string(),
            None => columns
                .symbol
                .and_then(|i| cell(row, i))
                .filter(|s| !s.is_empty())
                .ok_or(RowRejection::Values)?
                .to_string(),
        };

        let number = |idx: usize| cell(row, idx).and_then(parse_number).ok_or(RowRejection::Values);
        let volume = number(columns.volume)?;
        if volume < 0.0 {
            return Err(RowRejection::Values);
        }

        Ok(Record {
            timestamp,
            symbol,
            open: number(columns.open)?,
            high: number(columns.high)?,
            low: number(columns.low)?,
            close: number(columns.close)?,
            volume,
        })
    }
}

/// UTF-8 text of one cell; `None` when absent or not valid UTF-8.
fn cell(row: &ByteRecord, idx: usize) -> Option<&str> {
    row.get(idx).and_then(|bytes| std::str::from_utf8(bytes).ok())
}

impl Default for Ingestor {
    fn default() -> Self {
        Self::new(&IngestConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 9, 15, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-02 09:15:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02T09:15:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02T09:15:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02 09:15"), Some(expected));
        assert_eq!(parse_timestamp(" 2024-01-02 09:15:00+00:00 "), Some(expected));
    }

    #[test]
    fn test_parse_timestamp_normalizes_offset() {
        let ts = parse_timestamp("2024-01-02 14:45:00+05:30").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 2, 9, 15, 0).unwrap());
        assert_eq!(ts.hour(), 9);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("2024-13-45 99:00:00").is_none());
    }

    #[test]
    fn test_symbol_from_path() {
        let d = "__";
        assert_eq!(
            symbol_from_path(Path::new("raw/AARTIIND__minute.csv"), d),
            Some("AARTIIND".to_string())
        );
        assert_eq!(symbol_from_path(Path::new("ABB.csv"), d), Some("ABB".to_string()));
        assert_eq!(symbol_from_path(Path::new("__x.csv"), d), None);
    }

    #[test]
    fn test_resolver_accepts_variants() {
        let headers = StringRecord::from(vec!["Datetime", "open", "HIGH", "low", "close", "volume"]);
        let map = ColumnResolver::resolve(&headers, false).unwrap();
        assert_eq!(map.timestamp, 0);
        assert_eq!(map.close, 4);
        assert_eq!(map.symbol, None);
    }

    #[test]
    fn test_resolver_prefers_canonical_name() {
        let headers = StringRecord::from(vec!["close", "timestamp", "close_price", "open", "high", "low", "volume"]);
        let map = ColumnResolver::resolve(&headers, false).unwrap();
        assert_eq!(map.close, 2);
    }

    #[test]
    fn test_resolver_names_all_missing_fields() {
        let headers = StringRecord::from(vec!["datetime", "open", "high", "low"]);
        match ColumnResolver::resolve(&headers, false) {
            Err(Error::MissingColumn { fields }) => {
                assert_eq!(fields, vec!["close".to_string(), "volume".to_string()]);
            }
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_resolver_requires_symbol_for_combined() {
        let headers = StringRecord::from(vec!["timestamp", "open_price", "high_price", "low_price", "close_price", "volume"]);
        match ColumnResolver::resolve(&headers, true) {
            Err(Error::MissingColumn { fields }) => assert_eq!(fields, vec!["symbol".to_string()]),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_read_symbol_file_drops_bad_rows_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "AAA__minute.csv",
            "datetime,open,high,low,close,volume\n\
             2024-01-02 09:17:00,3,3,3,3,30\n\
             garbage,1,1,1,1,10\n\
             2024-01-02 09:15:00,1,1,1,1,10\n\
             2024-01-02 09:16:00,2,2,2,abc,20\n\
             2024-01-02 09:16:00,2,2,2,2,20\n\
             2024-01-02 09:18:00,4,4,4,4,-1\n",
        );

        let mut ingestor = Ingestor::default();
        let series = ingestor.read_symbol_file(&path, "AAA").unwrap();

        let closes: Vec<f64> = series.records.iter().map(|r| r.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
        assert!(series.records.iter().all(|r| r.symbol == "AAA"));

        let stats = ingestor.stats();
        assert_eq!(stats.rows_read, 6);
        assert_eq!(stats.rows_kept, 3);
        assert_eq!(stats.dropped_timestamp, 1);
        assert_eq!(stats.dropped_values, 2);
    }

    #[test]
    fn test_invalid_utf8_cell_drops_only_its_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AAA__minute.csv");
        let mut content = b"datetime,open,high,low,close,volume\n\
                            2024-01-02 09:15:00,1,1,1,1,10\n"
            .to_vec();
        content.extend_from_slice(b"2024-01-02 09:\xff:00,2,2,2,2,20\n");
        content.extend_from_slice(b"2024-01-02 09:17:00,3,3,3,\xff,30\n");
        content.extend_from_slice(b"2024-01-02 09:18:00,4,4,4,4,40\n");
        std::fs::write(&path, content).unwrap();

        let mut ingestor = Ingestor::default();
        let series = ingestor.read_symbol_file(&path, "AAA").unwrap();

        let closes: Vec<f64> = series.records.iter().map(|r| r.close).collect();
        assert_eq!(closes, vec![1.0, 4.0]);
        let stats = ingestor.stats();
        assert_eq!(stats.rows_read, 4);
        assert_eq!(stats.dropped_timestamp, 1);
        assert_eq!(stats.dropped_values, 1);
    }

    #[test]
    fn test_read_symbol_file_missing_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "AAA__minute.csv",
            "datetime,open,high,low,volume\n2024-01-02 09:15:00,1,1,1,10\n",
        );
        let mut ingestor = Ingestor::default();
        let err = ingestor.read_symbol_file(&path, "AAA").unwrap_err();
        assert!(matches!(err, Error::MissingColumn { ref fields } if fields == &vec!["close".to_string()]));
        assert!(err.to_string().contains("close"));
    }

    #[test]
    fn test_read_raw_dir_orders_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let body = "datetime,open,high,low,close,volume\n2024-01-02 09:15:00,1,1,1,1,10\n";
        write_file(dir.path(), "ZZZ__minute.csv", body);
        write_file(dir.path(), "AAA__minute.csv", body);
        write_file(dir.path(), "notes.txt", "ignored");

        let mut ingestor = Ingestor::default();
        let series = ingestor.read_raw_dir(dir.path()).unwrap();
        let symbols: Vec<&str> = series.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAA", "ZZZ"]);
        assert_eq!(ingestor.stats().files_read, 2);
    }

    #[test]
    fn test_read_combined_keeps_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "combined.csv",
            "timestamp,stock_symbol,open_price,high_price,low_price,close_price,volume\n\
             2024-01-02T09:16:00Z,BBB,2,2,2,2,20\n\
             2024-01-02T09:15:00Z,AAA,1,1,1,1,10\n\
             2024-01-02T09:15:00Z,,1,1,1,1,10\n",
        );
        let mut ingestor = Ingestor::default();
        let records = ingestor.read_combined(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].symbol, "BBB");
        assert_eq!(records[1].symbol, "AAA");
    }
}

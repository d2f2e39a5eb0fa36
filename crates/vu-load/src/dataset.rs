//! Shared, read-only test dataset.
//!
//! The dataset is parsed once per run and handed to every virtual user as an
//! `Arc<DatasetStore>`. Column names are stored once for the whole dataset;
//! each [`Record`] only owns its row values, so memory is proportional to the
//! dataset size and independent of the number of VUs.

use crate::error::{DataLoadError, HarnessError, HarnessResult};
use std::path::PathBuf;
use std::sync::Arc;

/// Raw bytes of a delimited-text dataset.
pub trait DatasetSource: Send + Sync {
    /// Where the bytes come from, for errors.
    fn describe(&self) -> String;

    /// Dataset label carried by the loaded store, e.g. `users`.
    fn label(&self) -> String {
        self.describe()
    }

    fn read_bytes(&self) -> std::io::Result<Vec<u8>>;
}

/// Dataset stored in a file on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    label: Option<String>,
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            label: None,
            path: path.into(),
        }
    }

    /// File dataset with a label other than its path.
    pub fn named(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            label: Some(label.into()),
            path: path.into(),
        }
    }
}

impl DatasetSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn label(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.describe())
    }

    fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }
}

/// Dataset already held in memory.
#[derive(Debug, Clone)]
pub struct InlineSource {
    name: String,
    data: Vec<u8>,
}

impl InlineSource {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

impl DatasetSource for InlineSource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        Ok(self.data.clone())
    }
}

/// One dataset row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<String>,
}

impl Record {
    pub fn new(columns: Arc<[String]>, values: Vec<String>) -> Self {
        Self { columns, values }
    }

    /// Value of `field`, or `""` if the column is unknown or the row was short.
    pub fn get(&self, field: &str) -> &str {
        self.columns
            .iter()
            .position(|c| c == field)
            .and_then(|idx| self.values.get(idx))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// `(field, value)` pairs in column order, padding short rows with `""`.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().enumerate().map(move |(idx, column)| {
            let value = self.values.get(idx).map(String::as_str).unwrap_or("");
            (column.as_str(), value)
        })
    }
}

/// Immutable ordered sequence of records, built once per test run.
#[derive(Debug)]
pub struct DatasetStore {
    name: String,
    columns: Arc<[String]>,
    records: Vec<Record>,
}

impl DatasetStore {
    /// Read and parse `source`. Fails if it is unreadable, malformed, or has no rows.
    pub fn load(source: &dyn DatasetSource) -> Result<Self, DataLoadError> {
        let bytes = source.read_bytes().map_err(|error| DataLoadError::Read {
            source_name: source.describe(),
            error,
        })?;
        let mut store = Self::parse(&source.describe(), &bytes)?;
        store.name = source.label();
        Ok(store)
    }

    /// Parse delimited text with a header row.
    pub fn parse(name: &str, bytes: &[u8]) -> Result<Self, DataLoadError> {
        let parse_err = |error| DataLoadError::Parse {
            source_name: name.to_string(),
            error,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(bytes);

        let columns: Arc<[String]> = reader
            .headers()
            .map_err(parse_err)?
            .iter()
            .map(str::to_string)
            .collect();

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(parse_err)?;
            if row.iter().all(|v| v.is_empty()) {
                continue;
            }
            let values = row
                .iter()
                .take(columns.len())
                .map(str::to_string)
                .collect();
            records.push(Record::new(Arc::clone(&columns), values));
        }

        if records.is_empty() {
            return Err(DataLoadError::Empty {
                source_name: name.to_string(),
            });
        }

        tracing::debug!(
            dataset = name,
            records = records.len(),
            columns = columns.len(),
            "Dataset loaded"
        );

        Ok(Self {
            name: name.to_string(),
            columns,
            records,
        })
    }

    /// Record at `index`.
    pub fn get(&self, index: usize) -> HarnessResult<&Record> {
        self.records
            .get(index)
            .ok_or(HarnessError::IndexOutOfRange {
                index,
                len: self.records.len(),
            })
    }

    /// Number of records; at least 1 for any loaded store.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const USERS: &str = "name,message\nadmin,hi\ntest_user,yo\n";

    #[test]
    fn test_load_inline() {
        let store = DatasetStore::load(&InlineSource::new("users", USERS)).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.name(), "users");
        assert_eq!(store.columns(), &["name".to_string(), "message".to_string()]);
        assert_eq!(store.get(0).unwrap().get("name"), "admin");
        assert_eq!(store.get(1).unwrap().get("message"), "yo");
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(USERS.as_bytes()).unwrap();

        let store = DatasetStore::load(&FileSource::new(file.path())).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = DatasetStore::load(&FileSource::new("/nonexistent/users.csv")).unwrap_err();
        assert!(matches!(err, DataLoadError::Read { .. }));
    }

    #[test]
    fn test_named_file_source_labels_store() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(USERS.as_bytes()).unwrap();

        let store = DatasetStore::load(&FileSource::named("users", file.path())).unwrap();
        assert_eq!(store.name(), "users");

        let unnamed = DatasetStore::load(&FileSource::new(file.path())).unwrap();
        assert_eq!(unnamed.name(), file.path().display().to_string());

        // Errors still point at the file.
        let err = DatasetStore::load(&FileSource::named("users", "/nonexistent/users.csv"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/users.csv"), "{}", err);
    }

    #[test]
    fn test_header_only_is_empty() {
        let err = DatasetStore::load(&InlineSource::new("h", "name,message\n")).unwrap_err();
        assert!(matches!(err, DataLoadError::Empty { .. }));
    }

    #[test]
    fn test_zero_bytes_is_empty() {
        let err = DatasetStore::load(&InlineSource::new("e", "")).unwrap_err();
        assert!(matches!(err, DataLoadError::Empty { .. }));
    }

    #[test]
    fn test_invalid_utf8_is_parse_error() {
        let err =
            DatasetStore::load(&InlineSource::new("bin", b"name\n\xff\xfe\n".to_vec())).unwrap_err();
        assert!(matches!(err, DataLoadError::Parse { .. }));
    }

    #[test]
    fn test_missing_trailing_field_reads_empty() {
        let store = DatasetStore::load(&InlineSource::new("short", "name,message\nadmin\n")).unwrap();
        let record = store.get(0).unwrap();
        assert_eq!(record.get("name"), "admin");
        assert_eq!(record.get("message"), "");
        assert_eq!(
            record.fields().collect::<Vec<_>>(),
            vec![("name", "admin"), ("message", "")]
        );
    }

    #[test]
    fn test_surplus_fields_are_dropped() {
        let store =
            DatasetStore::load(&InlineSource::new("long", "name\nadmin,extra,more\n")).unwrap();
        assert_eq!(store.get(0).unwrap().fields().count(), 1);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let store =
            DatasetStore::load(&InlineSource::new("gaps", "name,message\n\nadmin,hi\n\n")).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unknown_field_reads_empty() {
        let store = DatasetStore::load(&InlineSource::new("users", USERS)).unwrap();
        assert_eq!(store.get(0).unwrap().get("password"), "");
    }

    #[test]
    fn test_get_out_of_range() {
        let store = DatasetStore::load(&InlineSource::new("users", USERS)).unwrap();
        match store.get(2) {
            Err(HarnessError::IndexOutOfRange { index, len }) => {
                assert_eq!(index, 2);
                assert_eq!(len, 2);
            }
            other => panic!("expected IndexOutOfRange, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_records_share_column_header() {
        let store = DatasetStore::load(&InlineSource::new("users", USERS)).unwrap();
        let first = store.get(0).unwrap();
        let second = store.get(1).unwrap();
        assert!(Arc::ptr_eq(&first.columns, &second.columns));
        assert!(Arc::ptr_eq(&first.columns, &store.columns));
    }
}

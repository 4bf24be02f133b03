//! CSV to line-delimited JSON conversion.
//!
//! Inputs at or below the size threshold are read into memory and written in
//! one pass. Larger inputs are streamed in fixed-size row chunks so peak memory
//! stays at one chunk regardless of file size. Either way every data row becomes
//! one JSON object on its own line, keyed by header in column order.

use crate::config::{DEFAULT_CHUNK_ROWS, DEFAULT_SIZE_THRESHOLD, MigrationConfig};
use crate::error::ConversionError;
use csv::{ReaderBuilder, StringRecord};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Number, Value};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStrategy {
    /// Parse the whole table, then serialize it in one pass
    WholeFile,
    /// Parse and serialize `chunk_rows` rows at a time
    Chunked { chunk_rows: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReport {
    pub strategy: ConversionStrategy,
    pub rows: u64,
    pub chunks: u64,
    pub output_path: PathBuf,
}

/// JSON type a column's cells are rendered as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    String,
    /// Every cell was empty
    Empty,
}

impl ColumnType {
    /// Renders one cell. Empty and missing cells are always `null`.
    pub fn render(self, cell: Option<&str>) -> Value {
        let raw = match cell {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return Value::Null,
        };
        let trimmed = raw.trim();

        match self {
            ColumnType::Integer => trimmed
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(raw.to_string())),
            ColumnType::Float => trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(raw.to_string())),
            ColumnType::Boolean => Value::Bool(trimmed.eq_ignore_ascii_case("true")),
            ColumnType::String => Value::String(raw.to_string()),
            ColumnType::Empty => Value::Null,
        }
    }
}

/// Decides the column types of one file.
///
/// Every data row is fed to a [`SchemaScan`] in file order before any output
/// is written, so the whole-file and chunked strategies render a column the
/// same way.
pub trait SchemaInference: Send + Sync {
    fn scan(&self, columns: usize) -> Box<dyn SchemaScan>;
}

/// Per-file scan state; holds one entry per column, never the rows.
pub trait SchemaScan {
    fn observe(&mut self, record: &StringRecord);
    fn finish(&self) -> Vec<ColumnType>;
}

/// Infers integer, then float, then boolean, falling back to string.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentInference;

impl SchemaInference for ContentInference {
    fn scan(&self, columns: usize) -> Box<dyn SchemaScan> {
        Box::new(ContentScan {
            profiles: vec![ColumnProfile::default(); columns],
        })
    }
}

struct ContentScan {
    profiles: Vec<ColumnProfile>,
}

impl SchemaScan for ContentScan {
    fn observe(&mut self, record: &StringRecord) {
        for (profile, cell) in self.profiles.iter_mut().zip(record.iter()) {
            profile.observe(cell);
        }
    }

    fn finish(&self) -> Vec<ColumnType> {
        self.profiles.iter().map(ColumnProfile::column_type).collect()
    }
}

/// Renders every non-empty cell as a string
#[derive(Debug, Clone, Copy, Default)]
pub struct StringInference;

impl SchemaInference for StringInference {
    fn scan(&self, columns: usize) -> Box<dyn SchemaScan> {
        Box::new(StringScan { columns })
    }
}

struct StringScan {
    columns: usize,
}

impl SchemaScan for StringScan {
    fn observe(&mut self, _record: &StringRecord) {}

    fn finish(&self) -> Vec<ColumnType> {
        vec![ColumnType::String; self.columns]
    }
}

/// Which types every non-empty cell of a column seen so far would parse as.
#[derive(Debug, Clone, Copy)]
struct ColumnProfile {
    seen: bool,
    integer: bool,
    float: bool,
    boolean: bool,
}

impl Default for ColumnProfile {
    fn default() -> Self {
        Self {
            seen: false,
            integer: true,
            float: true,
            boolean: true,
        }
    }
}

impl ColumnProfile {
    fn observe(&mut self, cell: &str) {
        let cell = cell.trim();
        if cell.is_empty() {
            return;
        }
        self.seen = true;
        if !self.integer && !self.float && !self.boolean {
            return;
        }
        self.integer = self.integer && cell.parse::<i64>().is_ok();
        self.float = self.float && cell.parse::<f64>().is_ok_and(f64::is_finite);
        self.boolean = self.boolean
            && (cell.eq_ignore_ascii_case("true") || cell.eq_ignore_ascii_case("false"));
    }

    fn column_type(&self) -> ColumnType {
        match (self.seen, self.integer, self.float, self.boolean) {
            (false, ..) => ColumnType::Empty,
            (true, true, _, _) => ColumnType::Integer,
            (true, false, true, _) => ColumnType::Float,
            (true, false, false, true) => ColumnType::Boolean,
            _ => ColumnType::String,
        }
    }
}

#[cfg(test)]
fn infer_column<'a>(cells: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut profile = ColumnProfile::default();
    cells.for_each(|cell| profile.observe(cell));
    profile.column_type()
}

/// Makes header names unique: `a, a` becomes `a, a.1`, and blank names
/// become `Unnamed: {index}`.
pub fn normalize_headers(headers: &StringRecord) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::with_capacity(headers.len());

    for (index, raw) in headers.iter().enumerate() {
        let base = if raw.trim().is_empty() {
            format!("Unnamed: {}", index)
        } else {
            raw.to_string()
        };

        let mut name = base.clone();
        if used.contains(&name) {
            let mut suffix = counts.get(&base).copied().unwrap_or(0).max(1);
            loop {
                name = format!("{}.{}", base, suffix);
                if !used.contains(&name) {
                    break;
                }
                suffix += 1;
            }
            counts.insert(base, suffix + 1);
        }

        used.insert(name.clone());
        names.push(name);
    }

    names
}

/// One output line: header/value pairs serialized in column order.
struct JsonRow<'a> {
    headers: &'a [String],
    types: &'a [ColumnType],
    record: &'a StringRecord,
}

impl Serialize for JsonRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.headers.len()))?;
        for (index, header) in self.headers.iter().enumerate() {
            let value = self.types[index].render(self.record.get(index));
            map.serialize_entry(header, &value)?;
        }
        map.end()
    }
}

#[derive(Clone)]
pub struct CsvConverter {
    size_threshold: u64,
    chunk_rows: usize,
    inference: Arc<dyn SchemaInference>,
}

impl Default for CsvConverter {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE_THRESHOLD, DEFAULT_CHUNK_ROWS)
    }
}

impl CsvConverter {
    pub fn new(size_threshold: u64, chunk_rows: usize) -> Self {
        Self {
            size_threshold,
            chunk_rows: chunk_rows.max(1),
            inference: Arc::new(ContentInference),
        }
    }

    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(config.size_threshold, config.chunk_rows)
    }

    pub fn with_inference(mut self, inference: Arc<dyn SchemaInference>) -> Self {
        self.inference = inference;
        self
    }

    pub fn strategy_for(&self, size_bytes: u64) -> ConversionStrategy {
        if size_bytes <= self.size_threshold {
            ConversionStrategy::WholeFile
        } else {
            ConversionStrategy::Chunked {
                chunk_rows: self.chunk_rows,
            }
        }
    }

    /// Converts `input` to line-delimited JSON at `output`.
    ///
    /// `size_bytes` is the size recorded for the source object; it alone picks
    /// the strategy. Blocking: call [`CsvConverter::convert_blocking`] from
    /// async code.
    pub fn convert(
        &self,
        input: &Path,
        size_bytes: u64,
        output: &Path,
    ) -> Result<ConversionReport, ConversionError> {
        let strategy = self.strategy_for(size_bytes);
        let open = || -> Result<BufReader<File>, ConversionError> {
            Ok(BufReader::new(File::open(input)?))
        };
        let mut writer = BufWriter::new(File::create(output)?);

        let (rows, chunks) = match strategy {
            ConversionStrategy::WholeFile => self.write_whole(open()?, &mut writer)?,
            ConversionStrategy::Chunked { chunk_rows } => {
                let types = self.scan_types(open()?)?;
                self.write_chunked(open()?, &mut writer, &types, chunk_rows)?
            }
        };
        writer.flush()?;

        tracing::info!(
            "Converted {} -> {} ({:?}, {} rows, {} chunks)",
            input.display(),
            output.display(),
            strategy,
            rows,
            chunks
        );

        Ok(ConversionReport {
            strategy,
            rows,
            chunks,
            output_path: output.to_path_buf(),
        })
    }

    /// Runs [`CsvConverter::convert`] on the blocking thread pool.
    pub async fn convert_blocking(
        &self,
        input: PathBuf,
        size_bytes: u64,
        output: PathBuf,
    ) -> Result<ConversionReport, ConversionError> {
        let converter = self.clone();
        tokio::task::spawn_blocking(move || converter.convert(&input, size_bytes, &output))
            .await
            .map_err(|e| ConversionError::Task(e.to_string()))?
    }

    fn write_whole<R: Read, W: Write>(
        &self,
        reader: R,
        writer: &mut W,
    ) -> Result<(u64, u64), ConversionError> {
        let mut records = RecordSource::new(reader)?;
        let mut scan = self.inference.scan(records.headers.len());
        let mut rows = Vec::new();
        while let Some(record) = records.next_record()? {
            scan.observe(&record);
            rows.push(record);
        }

        write_rows(writer, &records.headers, &rows, &scan.finish())?;
        Ok((rows.len() as u64, 1))
    }

    /// First pass of the chunked strategy: types every column from the whole
    /// file without keeping any rows.
    fn scan_types<R: Read>(&self, reader: R) -> Result<Vec<ColumnType>, ConversionError> {
        let mut records = RecordSource::new(reader)?;
        let mut scan = self.inference.scan(records.headers.len());
        while let Some(record) = records.next_record()? {
            scan.observe(&record);
        }
        Ok(scan.finish())
    }

    fn write_chunked<R: Read, W: Write>(
        &self,
        reader: R,
        writer: &mut W,
        types: &[ColumnType],
        chunk_rows: usize,
    ) -> Result<(u64, u64), ConversionError> {
        let mut records = RecordSource::new(reader)?;
        let mut chunk = Vec::with_capacity(chunk_rows);
        let mut total_rows = 0u64;
        let mut chunks = 0u64;

        loop {
            let next = records.next_record()?;
            let exhausted = next.is_none();
            if let Some(record) = next {
                chunk.push(record);
            }

            if chunk.len() == chunk_rows || (exhausted && !chunk.is_empty()) {
                write_rows(writer, &records.headers, &chunk, types)?;
                total_rows += chunk.len() as u64;
                chunks += 1;
                tracing::debug!("Wrote chunk {} ({} rows so far)", chunks, total_rows);
                chunk.clear();
            }

            if exhausted {
                break;
            }
        }

        Ok((total_rows, chunks))
    }
}

/// CSV records paired with their normalized header.
struct RecordSource<R: Read> {
    reader: csv::Reader<R>,
    headers: Vec<String>,
}

impl<R: Read> RecordSource<R> {
    fn new(reader: R) -> Result<Self, ConversionError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers()?;
        if headers.is_empty() {
            return Err(ConversionError::MissingHeader);
        }
        let headers = normalize_headers(headers);

        Ok(Self { reader, headers })
    }

    /// Next data row. Short rows are padded with nulls at render time; rows
    /// with more fields than the header are rejected.
    fn next_record(&mut self) -> Result<Option<StringRecord>, ConversionError> {
        let mut record = StringRecord::new();
        if !self.reader.read_record(&mut record)? {
            return Ok(None);
        }

        if record.len() > self.headers.len() {
            return Err(ConversionError::TooManyFields {
                row: record.position().map(|p| p.line()).unwrap_or_default(),
                expected: self.headers.len(),
                found: record.len(),
            });
        }

        Ok(Some(record))
    }
}

fn write_rows<W: Write>(
    writer: &mut W,
    headers: &[String],
    rows: &[StringRecord],
    types: &[ColumnType],
) -> Result<(), ConversionError> {
    for record in rows {
        let row = JsonRow {
            headers,
            types,
            record,
        };
        serde_json::to_writer(&mut *writer, &row)?;
        writer.write_all(b"\n")?;
    }

    Ok(())
}

//! CSV row source and sink.
//!
//! Headers are normalized once (BOM stripped, whitespace collapsed); cell
//! values are handed to the pipeline as-is apart from BOM stripping, so
//! untouched columns round-trip byte-for-byte.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};

use veil_core::{RowSink, RowSource};
use veil_model::{Row, Value, VeilError};

fn normalize_header(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('\u{feff}');
    let mut parts = trimmed.split_whitespace();
    let mut normalized = String::new();
    if let Some(first) = parts.next() {
        normalized.push_str(first);
        for part in parts {
            normalized.push(' ');
            normalized.push_str(part);
        }
    }
    normalized
}

fn normalize_cell(raw: &str) -> &str {
    raw.trim_matches('\u{feff}')
}

pub struct CsvRowSource<R: Read> {
    reader: csv::Reader<R>,
    headers: Vec<String>,
}

impl CsvRowSource<File> {
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("read csv: {}", path.display()))?;
        let headers = reader
            .headers()
            .with_context(|| format!("read headers: {}", path.display()))?
            .iter()
            .map(normalize_header)
            .collect();
        Ok(Self { reader, headers })
    }
}

impl<R: Read> CsvRowSource<R> {
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = reader
            .headers()
            .context("read headers")?
            .iter()
            .map(normalize_header)
            .collect();
        Ok(Self { reader, headers })
    }
}

impl<R: Read> RowSource for CsvRowSource<R> {
    fn field_names(&mut self) -> veil_model::Result<Vec<String>> {
        Ok(self.headers.clone())
    }

    fn next_row(&mut self) -> veil_model::Result<Option<Row>> {
        let mut record = csv::StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(true) => {
                let mut row = Row::new();
                for (idx, header) in self.headers.iter().enumerate() {
                    let cell = record.get(idx).unwrap_or("");
                    row.push(header.clone(), Value::text(normalize_cell(cell)));
                }
                Ok(Some(row))
            }
            Ok(false) => Ok(None),
            Err(error) => Err(VeilError::Message(format!("read record: {error}"))),
        }
    }
}

pub struct CsvRowSink<W: Write> {
    writer: csv::Writer<W>,
    headers: Vec<String>,
}

impl CsvRowSink<File> {
    pub fn create(path: &Path) -> Result<Self> {
        let writer = WriterBuilder::new()
            .from_path(path)
            .with_context(|| format!("write csv: {}", path.display()))?;
        Ok(Self {
            writer,
            headers: Vec::new(),
        })
    }
}

impl<W: Write> CsvRowSink<W> {
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: WriterBuilder::new().from_writer(writer),
            headers: Vec::new(),
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|error| anyhow::anyhow!("flush csv writer: {error}"))
    }
}

impl<W: Write> RowSink for CsvRowSink<W> {
    fn write_header(&mut self, columns: &[String]) -> veil_model::Result<()> {
        self.headers = columns.to_vec();
        self.writer
            .write_record(columns)
            .map_err(|error| VeilError::Message(format!("write header: {error}")))
    }

    fn write_row(&mut self, row: &Row) -> veil_model::Result<()> {
        let record: Vec<&str> = self
            .headers
            .iter()
            .map(|header| row.get(header).and_then(Value::as_text).unwrap_or(""))
            .collect();
        self.writer
            .write_record(&record)
            .map_err(|error| VeilError::Message(format!("write record: {error}")))
    }
}

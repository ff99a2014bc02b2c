//! Row stream capabilities the pipeline consumes.
//!
//! Concrete file formats live in the ingest crate; the engine only sees
//! ordered rows and a one-time header negotiation.

use veil_model::{Result, Row};

/// Produces rows in input order. `field_names` is called once before the
/// first row.
pub trait RowSource {
    fn field_names(&mut self) -> Result<Vec<String>>;
    fn next_row(&mut self) -> Result<Option<Row>>;
}

/// Receives transformed rows in emission order. `write_header` is called
/// once before the first row.
pub trait RowSink {
    fn write_header(&mut self, columns: &[String]) -> Result<()>;
    fn write_row(&mut self, row: &Row) -> Result<()>;
}

/// In-memory source over pre-built rows. Used by tests and by callers that
/// already hold rows.
#[derive(Debug, Clone)]
pub struct VecSource {
    headers: Vec<String>,
    rows: std::vec::IntoIter<Row>,
}

impl VecSource {
    pub fn new(headers: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            headers,
            rows: rows.into_iter(),
        }
    }
}

impl RowSource for VecSource {
    fn field_names(&mut self) -> Result<Vec<String>> {
        Ok(self.headers.clone())
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.next())
    }
}

/// In-memory sink collecting emitted rows.
#[derive(Debug, Clone, Default)]
pub struct VecSink {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RowSink for VecSink {
    fn write_header(&mut self, columns: &[String]) -> Result<()> {
        self.headers = columns.to_vec();
        Ok(())
    }

    fn write_row(&mut self, row: &Row) -> Result<()> {
        self.rows.push(row.clone());
        Ok(())
    }
}

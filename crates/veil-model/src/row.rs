use std::fmt;

/// A single cell. `Missing` is the degraded state for lookup misses and
/// parse failures; it serializes to an empty field on output.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Value {
    Text(String),
    Missing,
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::Missing => Ok(()),
        }
    }
}

/// An ordered mapping of column name to cell value, as produced by a row
/// source. Column order is the file's column order and is preserved through
/// the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Row {
    cells: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            cells: pairs.into_iter().collect(),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.cells.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Replaces the value of an existing column. Returns false when the
    /// column is not present in this row.
    pub fn set(&mut self, column: &str, value: Value) -> bool {
        match self.cells.iter_mut().find(|(name, _)| name == column) {
            Some((_, slot)) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let idx = self.cells.iter().position(|(name, _)| name == column)?;
        Some(self.cells.remove(idx).1)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{Row, Value};

    #[test]
    fn set_replaces_in_place() {
        let mut row = Row::from_pairs([
            ("id".to_string(), Value::text("P001")),
            ("ts".to_string(), Value::text("2020-01-15")),
        ]);
        assert!(row.set("id", Value::text("482910")));
        assert_eq!(row.get("id").and_then(Value::as_text), Some("482910"));
        assert!(!row.set("missing", Value::Missing));
    }

    #[test]
    fn remove_preserves_order_of_remaining_columns() {
        let mut row = Row::from_pairs([
            ("a".to_string(), Value::text("1")),
            ("b".to_string(), Value::text("2")),
            ("c".to_string(), Value::text("3")),
        ]);
        row.remove("b");
        let columns: Vec<&str> = row.columns().collect();
        assert_eq!(columns, vec!["a", "c"]);
    }

    #[test]
    fn missing_renders_empty() {
        assert_eq!(Value::Missing.to_string(), "");
        assert!(Value::Missing.as_text().is_none());
    }
}

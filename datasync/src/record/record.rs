use std::collections::HashMap;

use serde_json::json;

use crate::record::Column;

/// An ordered row of [`Column`]s with optional string metadata.
///
/// The byte size is maintained while columns are added so that channels can account for it
/// without walking the columns again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<Column>,
    meta: Option<HashMap<String, String>>,
    byte_size: usize,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
            meta: None,
            byte_size: 0,
        }
    }

    pub fn from_columns(columns: Vec<Column>) -> Self {
        let byte_size = columns.iter().map(Column::byte_size).sum();

        Self {
            columns,
            meta: None,
            byte_size,
        }
    }

    pub fn push_column(&mut self, column: Column) {
        self.byte_size += column.byte_size();
        self.columns.push(column);
    }

    /// Sets the column at `index`, padding with string nulls when the record is shorter.
    pub fn set_column(&mut self, index: usize, column: Column) {
        if index >= self.columns.len() {
            self.columns
                .resize(index + 1, Column::null(crate::record::ColumnType::String));
        }

        self.byte_size = self.byte_size - self.columns[index].byte_size() + column.byte_size();
        self.columns[index] = column;
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Sum of the byte sizes of all columns.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn meta(&self) -> Option<&HashMap<String, String>> {
        self.meta.as_ref()
    }

    pub fn set_meta(&mut self, meta: HashMap<String, String>) {
        self.meta = Some(meta);
    }

    pub fn add_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.meta
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
    }

    pub fn to_json(&self) -> serde_json::Value {
        let columns: Vec<_> = self.columns.iter().map(Column::to_json).collect();

        match &self.meta {
            Some(meta) => json!({ "columns": columns, "meta": meta }),
            None => json!({ "columns": columns }),
        }
    }
}

impl From<Vec<Column>> for Record {
    fn from(columns: Vec<Column>) -> Self {
        Record::from_columns(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ColumnType;

    #[test]
    fn byte_size_is_the_sum_of_column_sizes() {
        let mut record = Record::from_columns(vec![
            Column::string("abcd"),
            Column::Long(1),
            Column::null(ColumnType::Double),
        ]);
        assert_eq!(record.byte_size(), 12);

        record.push_column(Column::Bool(true));
        assert_eq!(record.byte_size(), 13);

        record.set_column(0, Column::string("ab"));
        assert_eq!(record.byte_size(), 11);
        assert_eq!(record.column_count(), 4);
    }

    #[test]
    fn set_column_pads_short_records() {
        let mut record = Record::new();
        record.set_column(2, Column::Long(9));

        assert_eq!(record.column_count(), 3);
        assert!(record.column(0).unwrap().is_null());
        assert_eq!(record.column(2), Some(&Column::Long(9)));
        assert_eq!(record.byte_size(), 8);
    }

    #[test]
    fn json_rendering_includes_metadata() {
        let mut record = Record::from_columns(vec![Column::string("x")]);
        record.add_meta("table", "users");

        let json = record.to_json();
        assert_eq!(json["columns"][0]["type"], "string");
        assert_eq!(json["columns"][0]["raw_data"], "x");
        assert_eq!(json["meta"]["table"], "users");
    }
}

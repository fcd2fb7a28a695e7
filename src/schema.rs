//! Schema inference over loaded records.

use crate::error::{Error, Result};
use crate::formats::netcdf::{Format, NcType, NC_FILL_DOUBLE, NC_FILL_INT, NC_FILL_INT64};
use crate::models::{Record, Value};
use crate::writer::nc_type_for;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of an output variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementType {
    /// Logical flags stored as 0/1
    Byte,
    Int64,
    Double,
    /// Fixed-width text, `width` bytes of UTF-8 per value
    Char { width: usize },
}

impl ElementType {
    /// Infer the element type from a value, `None` for nulls.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(_) => Some(ElementType::Int64),
            Value::Float(_) => Some(ElementType::Double),
            Value::Logical(_) => Some(ElementType::Byte),
            Value::Text(s) => Some(ElementType::Char { width: s.len() }),
            Value::Null => None,
        }
    }

    /// Whether `value` can be stored in this type without loss.
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (ElementType::Byte, Value::Logical(_))
                | (ElementType::Int64, Value::Integer(_))
                | (ElementType::Double, Value::Float(_) | Value::Integer(_))
                | (ElementType::Char { .. }, Value::Text(_))
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ElementType::Byte => "byte",
            ElementType::Int64 => "int64",
            ElementType::Double => "double",
            ElementType::Char { .. } => "char",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Char { width } => write!(f, "char[{}]", width),
            other => write!(f, "{}", other.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub name: String,
    #[serde(flatten)]
    pub element_type: ElementType,
    pub length: usize,
}

/// Ordered (name, type, length) entries governing the output layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub entries: Vec<SchemaEntry>,
}

impl Schema {
    pub fn new(entries: Vec<SchemaEntry>) -> Self {
        Self { entries }
    }

    /// Number of records every entry spans.
    pub fn record_count(&self) -> usize {
        self.entries.first().map_or(0, |e| e.length)
    }

    pub fn entry(&self, name: &str) -> Option<&SchemaEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check every record against the schema.
    ///
    /// Fails with [`Error::ShapeMismatch`] when a record lacks a field and
    /// with [`Error::TypeMismatch`] on the first value that does not fit its
    /// field's element type.
    pub fn verify(&self, records: &[Record]) -> Result<()> {
        for entry in &self.entries {
            if entry.length != records.len() {
                return Err(Error::ShapeMismatch {
                    variable: entry.name.clone(),
                    expected: entry.length,
                    actual: records.len(),
                });
            }
            for (index, record) in records.iter().enumerate() {
                let value = record.get(&entry.name).ok_or_else(|| Error::ShapeMismatch {
                    variable: entry.name.clone(),
                    expected: entry.length,
                    actual: index,
                })?;
                check_value(entry, index, value)?;
            }
        }
        Ok(())
    }

    /// [`Schema::verify`], plus the checks that depend on how `format`
    /// stores each field: integers must fit a 32-bit variable where 64-bit
    /// integers are unavailable, and a column holding nulls must not hold a
    /// value equal to its fill value.
    pub fn verify_for(&self, format: Format, records: &[Record]) -> Result<()> {
        self.verify(records)?;
        for entry in &self.entries {
            let values: Vec<&Value> = records.iter().filter_map(|r| r.get(&entry.name)).collect();
            check_storage(entry, nc_type_for(entry.element_type, format), &values)?;
        }
        Ok(())
    }
}

/// Check a whole column against the variable type it is written as.
pub(crate) fn check_storage(entry: &SchemaEntry, nc_type: NcType, values: &[&Value]) -> Result<()> {
    let has_nulls = values.iter().any(|v| v.is_null());
    let mismatch = |record: usize, found: String| Error::TypeMismatch {
        field: entry.name.clone(),
        record,
        expected: nc_type.to_string(),
        found,
    };

    for (index, value) in values.iter().enumerate() {
        match (nc_type, value) {
            (NcType::Int, Value::Integer(n)) if i32::try_from(*n).is_err() => {
                return Err(mismatch(index, format!("integer {} outside 32-bit range", n)));
            }
            (NcType::Int, Value::Integer(n)) if has_nulls && *n == NC_FILL_INT as i64 => {
                return Err(mismatch(index, format!("integer {} equal to the fill value", n)));
            }
            (NcType::Int64, Value::Integer(n)) if has_nulls && *n == NC_FILL_INT64 => {
                return Err(mismatch(index, format!("integer {} equal to the fill value", n)));
            }
            (NcType::Double, v) if has_nulls && v.as_f64() == Some(NC_FILL_DOUBLE) => {
                return Err(mismatch(index, format!("{} equal to the fill value", v)));
            }
            _ => {}
        }
    }
    Ok(())
}

pub(crate) fn check_value(entry: &SchemaEntry, record: usize, value: &Value) -> Result<()> {
    if !entry.element_type.accepts(value) {
        return Err(Error::TypeMismatch {
            field: entry.name.clone(),
            record,
            expected: entry.element_type.to_string(),
            found: value.kind().to_string(),
        });
    }
    if let (ElementType::Char { width }, Value::Text(s)) = (entry.element_type, value) {
        if s.len() > width {
            return Err(Error::TypeMismatch {
                field: entry.name.clone(),
                record,
                expected: entry.element_type.to_string(),
                found: format!("text of {} bytes", s.len()),
            });
        }
    }
    Ok(())
}

/// Derive the schema from the first record.
///
/// Keys and their order come from `records[0]`; so does each field's type,
/// unless that value is null, in which case the first non-null value of the
/// field decides. Text width is the longest value of the field over all
/// records.
pub fn derive_schema(records: &[Record]) -> Result<Schema> {
    let first = records.first().ok_or(Error::EmptySource)?;

    let entries = first
        .iter()
        .map(|(name, value)| {
            let element_type = match ElementType::of(value) {
                Some(t) => t,
                None => records
                    .iter()
                    .filter_map(|r| r.get(name))
                    .find_map(ElementType::of)
                    .unwrap_or(ElementType::Char { width: 1 }),
            };

            let element_type = match element_type {
                ElementType::Char { .. } => ElementType::Char {
                    width: text_width(records, name),
                },
                other => other,
            };

            SchemaEntry {
                name: name.to_string(),
                element_type,
                length: records.len(),
            }
        })
        .collect();

    Ok(Schema::new(entries))
}

fn text_width(records: &[Record], name: &str) -> usize {
    records
        .iter()
        .filter_map(|r| r.get(name).and_then(Value::as_str))
        .map(str::len)
        .max()
        .unwrap_or(0)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn test_empty_source() {
        assert!(matches!(derive_schema(&[]), Err(Error::EmptySource)));
    }

    #[test]
    fn test_first_record_governs_order_and_type() {
        let records = vec![
            record(&[("ID", 1i64.into()), ("XCOORD", 10.5.into()), ("NAAM", "a".into())]),
            record(&[("ID", 2i64.into()), ("XCOORD", 11.0.into()), ("NAAM", "dijkvak".into())]),
        ];
        let schema = derive_schema(&records).unwrap();

        assert_eq!(schema.field_names().collect::<Vec<_>>(), vec!["ID", "XCOORD", "NAAM"]);
        assert_eq!(schema.entries[0].element_type, ElementType::Int64);
        assert_eq!(schema.entries[1].element_type, ElementType::Double);
        assert_eq!(schema.entries[2].element_type, ElementType::Char { width: 7 });
        assert!(schema.entries.iter().all(|e| e.length == 2));
        schema.verify(&records).unwrap();
    }

    #[test]
    fn test_null_first_value_uses_first_non_null() {
        let records = vec![
            record(&[("DIEPTE", Value::Null)]),
            record(&[("DIEPTE", 3.25.into())]),
        ];
        let schema = derive_schema(&records).unwrap();
        assert_eq!(schema.entries[0].element_type, ElementType::Double);
    }

    #[test]
    fn test_verify_reports_type_mismatch() {
        let records = vec![
            record(&[("ID", 1i64.into())]),
            record(&[("ID", "twee".into())]),
        ];
        let schema = derive_schema(&records).unwrap();
        match schema.verify(&records) {
            Err(Error::TypeMismatch { field, record, .. }) => {
                assert_eq!(field, "ID");
                assert_eq!(record, 1);
            }
            other => panic!("expected TypeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_integer_accepted_by_double_column() {
        let records = vec![
            record(&[("XCOORD", 10.5.into())]),
            record(&[("XCOORD", 11i64.into())]),
        ];
        derive_schema(&records).unwrap().verify(&records).unwrap();
    }

    #[test]
    fn test_verify_for_classic_model_range() {
        let records = vec![record(&[("NR", 5_000_000_000i64.into())])];
        let schema = derive_schema(&records).unwrap();

        schema.verify_for(Format::Netcdf4, &records).unwrap();
        match schema.verify_for(Format::Netcdf4Classic, &records) {
            Err(Error::TypeMismatch { field, expected, .. }) => {
                assert_eq!(field, "NR");
                assert_eq!(expected, "NC_INT");
            }
            other => panic!("expected TypeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_fill_value_collision_only_with_nulls() {
        let fill = NC_FILL_INT as i64;
        let without_nulls = vec![record(&[("NR", fill.into())]), record(&[("NR", 3i64.into())])];
        derive_schema(&without_nulls)
            .unwrap()
            .verify_for(Format::Netcdf4Classic, &without_nulls)
            .unwrap();

        let with_nulls = vec![record(&[("NR", fill.into())]), record(&[("NR", Value::Null)])];
        assert!(matches!(
            derive_schema(&with_nulls)
                .unwrap()
                .verify_for(Format::Netcdf4Classic, &with_nulls),
            Err(Error::TypeMismatch { record: 0, .. })
        ));
    }

    #[test]
    fn test_schema_serializes_flat() {
        let schema = Schema::new(vec![SchemaEntry {
            name: "NAAM".to_string(),
            element_type: ElementType::Char { width: 4 },
            length: 3,
        }]);
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"entries": [{"name": "NAAM", "type": "char", "width": 4, "length": 3}]})
        );
    }
}

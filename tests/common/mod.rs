/// Test utilities for building dBASE tables
use byteorder::{LittleEndian, WriteBytesExt};
use std::path::{Path, PathBuf};

struct FieldSpec {
    name: String,
    field_type: u8,
    length: u8,
    decimal_count: u8,
}

/// Builder for creating `.dbf` test files
pub struct DbfBuilder {
    fields: Vec<FieldSpec>,
    rows: Vec<Vec<u8>>,
    declared_count: Option<u32>,
    eof_marker: bool,
}

#[allow(dead_code)]
impl DbfBuilder {
    /// Create an empty dBASE III table with no columns
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            rows: Vec::new(),
            declared_count: None,
            eof_marker: true,
        }
    }

    /// Add a column
    pub fn field(mut self, name: &str, field_type: u8, length: u8, decimal_count: u8) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            field_type,
            length,
            decimal_count,
        });
        self
    }

    /// Add a live record; cells are padded the way dBASE pads them
    pub fn record(mut self, cells: &[&str]) -> Self {
        let row = self.encode_row(b' ', cells);
        self.rows.push(row);
        self
    }

    /// Add a record flagged as deleted
    pub fn deleted_record(mut self, cells: &[&str]) -> Self {
        let row = self.encode_row(b'*', cells);
        self.rows.push(row);
        self
    }

    /// Add a record from raw cell bytes (for binary column types)
    pub fn raw_record(mut self, cells: &[Vec<u8>]) -> Self {
        let mut row = vec![b' '];
        for (field, cell) in self.fields.iter().zip(cells) {
            let mut cell = cell.clone();
            cell.resize(field.length as usize, b' ');
            row.extend_from_slice(&cell);
        }
        self.rows.push(row);
        self
    }

    /// Override the record count stored in the header
    pub fn declared_count(mut self, count: u32) -> Self {
        self.declared_count = Some(count);
        self
    }

    /// Leave out the trailing 0x1A marker
    pub fn without_eof_marker(mut self) -> Self {
        self.eof_marker = false;
        self
    }

    fn encode_row(&self, flag: u8, cells: &[&str]) -> Vec<u8> {
        let mut row = vec![flag];
        for (field, cell) in self.fields.iter().zip(cells) {
            let width = field.length as usize;
            let text = match field.field_type {
                b'N' | b'F' => format!("{:>width$}", cell, width = width),
                _ => format!("{:<width$}", cell, width = width),
            };
            let mut bytes = text.into_bytes();
            bytes.resize(width, b' ');
            row.extend_from_slice(&bytes);
        }
        row
    }

    fn record_length(&self) -> u16 {
        1 + self.fields.iter().map(|f| f.length as u16).sum::<u16>()
    }

    /// Build and return the table bytes
    pub fn build(self) -> Vec<u8> {
        let mut data = Vec::new();
        let header_length = 32 + 32 * self.fields.len() as u16 + 1;
        let count = self.declared_count.unwrap_or(self.rows.len() as u32);

        data.push(0x03); // dBASE III without memo
        data.extend_from_slice(&[124, 1, 15]); // 2024-01-15
        data.write_u32::<LittleEndian>(count).unwrap();
        data.write_u16::<LittleEndian>(header_length).unwrap();
        data.write_u16::<LittleEndian>(self.record_length()).unwrap();
        data.resize(29, 0);
        data.push(0x57); // language driver: ANSI
        data.resize(32, 0);

        for field in &self.fields {
            let mut name = field.name.as_bytes().to_vec();
            name.resize(11, 0);
            data.extend_from_slice(&name);
            data.push(field.field_type);
            data.extend_from_slice(&[0; 4]);
            data.push(field.length);
            data.push(field.decimal_count);
            data.extend_from_slice(&[0; 14]);
        }
        data.push(0x0D);

        for row in &self.rows {
            data.extend_from_slice(row);
        }
        if self.eof_marker {
            data.push(0x1A);
        }
        data
    }

    /// Build the table and write it to `dir/name`
    pub fn write_to(self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

impl Default for DbfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The survey coordinates table used across tests
#[allow(dead_code)]
pub fn coordinates_table() -> DbfBuilder {
    DbfBuilder::new()
        .field("ID", b'N', 4, 0)
        .field("XCOORD", b'N', 8, 1)
        .field("YCOORD", b'N', 8, 1)
        .record(&["1", "10.5", "20.1"])
        .record(&["2", "11.0", "19.8"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_header_layout() {
        let data = DbfBuilder::new().field("ID", b'N', 4, 0).record(&["7"]).build();
        assert_eq!(data[0], 0x03);
        assert_eq!(&data[4..8], &[1, 0, 0, 0]); // record count
        assert_eq!(&data[8..10], &[65, 0]); // header length 32 + 32 + 1
        assert_eq!(&data[10..12], &[5, 0]); // record length 1 + 4
        assert_eq!(data[64], 0x0D);
        assert_eq!(&data[65..70], b"    7");
        assert_eq!(*data.last().unwrap(), 0x1A);
    }
}

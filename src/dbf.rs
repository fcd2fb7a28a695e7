//! Low-level decoder for dBASE III/IV and FoxPro `.dbf` tables.
//!
//! The reader borrows the raw file bytes and hands out records as slices; cell
//! decoding happens per field so that columns outside a projection are never
//! touched.

use anyhow::{anyhow, bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::models::Value;

const HEADER_LEN: usize = 32;
const DESCRIPTOR_LEN: usize = 32;
const HEADER_TERMINATOR: u8 = 0x0D;
const EOF_MARKER: u8 = 0x1A;
const DELETED_FLAG: u8 = b'*';
const LANGUAGE_DRIVER_OFFSET: usize = 29;

/// How `C` columns are turned into strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// UTF-8 when the bytes are valid UTF-8, Latin-1 otherwise
    #[default]
    Auto,
    Utf8,
    Latin1,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: u8,
    pub length: usize,
    pub decimal_count: u8,
    /// Byte offset of this field within a record, past the deletion flag
    pub offset: usize,
}

impl FieldDescriptor {
    /// `_NullFlags` bookkeeping column written by Visual FoxPro.
    pub fn is_hidden(&self) -> bool {
        self.field_type == b'0'
    }
}

#[derive(Debug, Clone)]
pub struct DbfHeader {
    pub version: u8,
    pub last_update: (u16, u8, u8),
    pub record_count: u32,
    pub header_length: usize,
    pub record_length: usize,
    pub language_driver: u8,
    pub fields: Vec<FieldDescriptor>,
}

/// A record as stored on disk: the deletion flag plus the field bytes.
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    pub deleted: bool,
    pub data: &'a [u8],
}

impl<'a> RawRecord<'a> {
    pub fn field_bytes(&self, field: &FieldDescriptor) -> &'a [u8] {
        &self.data[field.offset..field.offset + field.length]
    }
}

pub struct DbfReader<'a> {
    data: &'a [u8],
    header: DbfHeader,
}

impl<'a> DbfReader<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let header = parse_header(data)?;
        Ok(Self { data, header })
    }

    pub fn header(&self) -> &DbfHeader {
        &self.header
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.header.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.header.fields.iter().find(|f| f.name == name)
    }

    pub fn records(&self) -> DbfRecordIterator<'a> {
        DbfRecordIterator {
            data: self.data,
            pos: self.header.header_length,
            record_length: self.header.record_length,
            remaining: self.header.record_count as usize,
        }
    }
}

fn parse_header(data: &[u8]) -> Result<DbfHeader> {
    if data.len() < HEADER_LEN + 1 {
        bail!("file is {} bytes, too short for a table header", data.len());
    }

    let mut cursor = Cursor::new(data);
    let version = cursor.read_u8()?;
    let year = cursor.read_u8()? as u16 + 1900;
    let month = cursor.read_u8()?;
    let day = cursor.read_u8()?;
    let record_count = cursor.read_u32::<LittleEndian>()?;
    let header_length = cursor.read_u16::<LittleEndian>()? as usize;
    let record_length = cursor.read_u16::<LittleEndian>()? as usize;
    let language_driver = data[LANGUAGE_DRIVER_OFFSET];

    if header_length > data.len() {
        bail!(
            "header length {} exceeds file size {}",
            header_length,
            data.len()
        );
    }

    let mut fields = Vec::new();
    let mut pos = HEADER_LEN;
    let mut offset = 1; // deletion flag
    loop {
        match data.get(pos) {
            Some(&HEADER_TERMINATOR) => break,
            Some(_) if pos + DESCRIPTOR_LEN <= header_length => {}
            _ => bail!("field descriptor array is not terminated"),
        }
        let field = parse_descriptor(&data[pos..pos + DESCRIPTOR_LEN], offset)
            .with_context(|| format!("field descriptor #{}", fields.len() + 1))?;
        offset += field.length;
        fields.push(field);
        pos += DESCRIPTOR_LEN;
    }

    if offset > record_length {
        bail!(
            "record length {} is smaller than the {} bytes its fields require",
            record_length,
            offset
        );
    }

    let data_len = (record_count as u64)
        .checked_mul(record_length as u64)
        .and_then(|n| n.checked_add(header_length as u64))
        .ok_or_else(|| anyhow!("record count {} overflows the table size", record_count))?;
    if data_len > data.len() as u64 {
        bail!(
            "{} records of {} bytes need {} bytes but the file has {}",
            record_count,
            record_length,
            data_len,
            data.len()
        );
    }

    Ok(DbfHeader {
        version,
        last_update: (year, month, day),
        record_count,
        header_length,
        record_length,
        language_driver,
        fields,
    })
}

fn parse_descriptor(raw: &[u8], offset: usize) -> Result<FieldDescriptor> {
    let name_bytes = &raw[0..11];
    let name_end = name_bytes.iter().position(|&b| b == 0).unwrap_or(11);
    let name = std::str::from_utf8(&name_bytes[..name_end])
        .map_err(|e| anyhow!("field name is not valid text: {}", e))?
        .trim()
        .to_string();
    if name.is_empty() {
        bail!("empty field name");
    }

    Ok(FieldDescriptor {
        name,
        field_type: raw[11],
        length: raw[16] as usize,
        decimal_count: raw[17],
        offset,
    })
}

pub struct DbfRecordIterator<'a> {
    data: &'a [u8],
    pos: usize,
    record_length: usize,
    remaining: usize,
}

impl<'a> Iterator for DbfRecordIterator<'a> {
    type Item = Result<RawRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        match self.data.get(self.pos) {
            None | Some(&EOF_MARKER) => {
                let missing = self.remaining;
                self.remaining = 0;
                return Some(Err(anyhow!(
                    "table ends {} record(s) short of its declared count",
                    missing
                )));
            }
            Some(_) => {}
        }

        let end = self.pos + self.record_length;
        if end > self.data.len() {
            self.remaining = 0;
            return Some(Err(anyhow!("record at offset {} is truncated", self.pos)));
        }

        let data = &self.data[self.pos..end];
        self.pos = end;
        self.remaining -= 1;

        Some(Ok(RawRecord {
            deleted: data[0] == DELETED_FLAG,
            data,
        }))
    }
}

/// Decode one cell according to its column type.
pub fn decode_field(field: &FieldDescriptor, raw: &[u8], encoding: TextEncoding) -> Result<Value> {
    match field.field_type {
        b'C' => decode_text(raw, encoding).map(Value::Text),
        b'N' => decode_numeric(raw, field.decimal_count > 0),
        b'F' => decode_numeric(raw, true),
        b'I' | b'+' => {
            let mut cursor = Cursor::new(raw);
            Ok(Value::Integer(cursor.read_i32::<LittleEndian>()? as i64))
        }
        b'O' => {
            let mut cursor = Cursor::new(raw);
            Ok(Value::Float(cursor.read_f64::<LittleEndian>()?))
        }
        b'L' => decode_logical(raw),
        b'D' => decode_date(raw),
        other => bail!(
            "unsupported column type '{}' for field {}",
            other as char,
            field.name
        ),
    }
}

fn decode_text(raw: &[u8], encoding: TextEncoding) -> Result<String> {
    let end = raw
        .iter()
        .rposition(|&b| b != b' ' && b != 0)
        .map_or(0, |p| p + 1);
    let bytes = &raw[..end];

    match encoding {
        TextEncoding::Utf8 => String::from_utf8(bytes.to_vec())
            .map_err(|e| anyhow!("Invalid UTF-8 in text cell: {}", e)),
        TextEncoding::Latin1 => Ok(latin1(bytes)),
        TextEncoding::Auto => Ok(match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => latin1(bytes),
        }),
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn decode_numeric(raw: &[u8], force_float: bool) -> Result<Value> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| anyhow!("numeric cell is not ASCII: {}", e))?
        .trim_matches(|c: char| c.is_ascii_whitespace() || c == '\0')
        .trim_matches('*');

    if text.is_empty() {
        return Ok(Value::Null);
    }

    if !force_float {
        if let Ok(v) = text.parse::<i64>() {
            return Ok(Value::Integer(v));
        }
    }

    text.replace(',', ".")
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|_| anyhow!("invalid numeric cell {:?}", text))
}

fn decode_logical(raw: &[u8]) -> Result<Value> {
    match raw.first().copied().unwrap_or(b' ') {
        b'T' | b't' | b'Y' | b'y' => Ok(Value::Logical(true)),
        b'F' | b'f' | b'N' | b'n' => Ok(Value::Logical(false)),
        b'?' | b' ' | 0 => Ok(Value::Null),
        other => bail!("invalid logical cell {:?}", other as char),
    }
}

fn decode_date(raw: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| anyhow!("date cell is not ASCII: {}", e))?
        .trim_matches(|c: char| c.is_ascii_whitespace() || c == '\0');

    if text.is_empty() || text.bytes().all(|b| b == b'0') {
        return Ok(Value::Null);
    }
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        bail!("invalid date cell {:?}", text);
    }

    Ok(Value::Text(format!(
        "{}-{}-{}",
        &text[0..4],
        &text[4..6],
        &text[6..8]
    )))
}

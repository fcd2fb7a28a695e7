//! Mapping between this crate's column arrays and the `netcdf` library.
//!
//! Files are written through `libnetcdf` in one of its netCDF-4 (HDF5
//! backed) flavours. Only the types a dBASE column can produce are mapped:
//! bytes for logicals, 32/64-bit integers, doubles and fixed-width text.

use anyhow::{Context, Result};
use netcdf::types::{FloatType, IntType, NcVariableType};
use netcdf::{AttributeValue, Options};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const NC_FILL_BYTE: i8 = -127;
pub const NC_FILL_SHORT: i16 = -32767;
pub const NC_FILL_INT: i32 = -2147483647;
pub const NC_FILL_FLOAT: f32 = 9.969_21e36;
pub const NC_FILL_DOUBLE: f64 = 9.969_209_968_386_869e36;
pub const NC_FILL_INT64: i64 = -9223372036854775806;

/// On-disk format variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    /// netCDF-4 storage restricted to the classic data model: no 64-bit
    /// integers, no strings, no groups
    #[default]
    Netcdf4Classic,
    /// netCDF-4 with the enhanced data model
    Netcdf4,
}

impl Format {
    pub fn options(self) -> Options {
        match self {
            Format::Netcdf4Classic => Options::NETCDF4 | Options::CLASSIC,
            Format::Netcdf4 => Options::NETCDF4,
        }
    }

    /// Whether variables of `nc_type` can be declared at all.
    pub fn supports(self, nc_type: NcType) -> bool {
        self == Format::Netcdf4 || nc_type != NcType::Int64
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Netcdf4Classic => write!(f, "NETCDF4_CLASSIC"),
            Format::Netcdf4 => write!(f, "NETCDF4"),
        }
    }
}

/// External data types produced or read back by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NcType {
    Byte,
    Char,
    Short,
    Int,
    Float,
    Double,
    Int64,
}

impl NcType {
    /// `None` for types outside the set this crate handles (unsigned,
    /// strings, user-defined).
    pub fn from_variable_type(vartype: &NcVariableType) -> Option<Self> {
        match vartype {
            NcVariableType::Char => Some(NcType::Char),
            NcVariableType::Int(IntType::I8) => Some(NcType::Byte),
            NcVariableType::Int(IntType::I16) => Some(NcType::Short),
            NcVariableType::Int(IntType::I32) => Some(NcType::Int),
            NcVariableType::Int(IntType::I64) => Some(NcType::Int64),
            NcVariableType::Float(FloatType::F32) => Some(NcType::Float),
            NcVariableType::Float(FloatType::F64) => Some(NcType::Double),
            _ => None,
        }
    }

    pub fn variable_type(self) -> NcVariableType {
        match self {
            NcType::Byte => NcVariableType::Int(IntType::I8),
            NcType::Char => NcVariableType::Char,
            NcType::Short => NcVariableType::Int(IntType::I16),
            NcType::Int => NcVariableType::Int(IntType::I32),
            NcType::Float => NcVariableType::Float(FloatType::F32),
            NcType::Double => NcVariableType::Float(FloatType::F64),
            NcType::Int64 => NcVariableType::Int(IntType::I64),
        }
    }
}

impl fmt::Display for NcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NcType::Byte => write!(f, "NC_BYTE"),
            NcType::Char => write!(f, "NC_CHAR"),
            NcType::Short => write!(f, "NC_SHORT"),
            NcType::Int => write!(f, "NC_INT"),
            NcType::Float => write!(f, "NC_FLOAT"),
            NcType::Double => write!(f, "NC_DOUBLE"),
            NcType::Int64 => write!(f, "NC_INT64"),
        }
    }
}

/// A flat, typed array of values as stored in a variable or attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Byte(Vec<i8>),
    Char(Vec<u8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Int64(Vec<i64>),
}

impl ArrayData {
    pub fn nc_type(&self) -> NcType {
        match self {
            ArrayData::Byte(_) => NcType::Byte,
            ArrayData::Char(_) => NcType::Char,
            ArrayData::Short(_) => NcType::Short,
            ArrayData::Int(_) => NcType::Int,
            ArrayData::Float(_) => NcType::Float,
            ArrayData::Double(_) => NcType::Double,
            ArrayData::Int64(_) => NcType::Int64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayData::Byte(v) => v.len(),
            ArrayData::Char(v) => v.len(),
            ArrayData::Short(v) => v.len(),
            ArrayData::Int(v) => v.len(),
            ArrayData::Float(v) => v.len(),
            ArrayData::Double(v) => v.len(),
            ArrayData::Int64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the whole array into `var`.
    pub(crate) fn put(&self, var: &mut netcdf::VariableMut<'_>) -> Result<()> {
        match self {
            ArrayData::Byte(v) => var.put_values(v.as_slice(), ..),
            // NC_CHAR has no typed counterpart; the bytes go in as stored.
            ArrayData::Char(v) => var.put_raw_values(v.as_slice(), ..),
            ArrayData::Short(v) => var.put_values(v.as_slice(), ..),
            ArrayData::Int(v) => var.put_values(v.as_slice(), ..),
            ArrayData::Float(v) => var.put_values(v.as_slice(), ..),
            ArrayData::Double(v) => var.put_values(v.as_slice(), ..),
            ArrayData::Int64(v) => var.put_values(v.as_slice(), ..),
        }
        .with_context(|| format!("writing {} values into {}", self.nc_type(), var.name()))
    }

    /// Read the whole of `var` as `nc_type`.
    pub(crate) fn get(var: &netcdf::Variable<'_>, nc_type: NcType) -> Result<Self> {
        let data = match nc_type {
            NcType::Byte => ArrayData::Byte(var.get_values::<i8, _>(..)?),
            NcType::Char => ArrayData::Char(var.get_raw_values(..)?),
            NcType::Short => ArrayData::Short(var.get_values::<i16, _>(..)?),
            NcType::Int => ArrayData::Int(var.get_values::<i32, _>(..)?),
            NcType::Float => ArrayData::Float(var.get_values::<f32, _>(..)?),
            NcType::Double => ArrayData::Double(var.get_values::<f64, _>(..)?),
            NcType::Int64 => ArrayData::Int64(var.get_values::<i64, _>(..)?),
        };
        Ok(data)
    }

    fn from_attribute_value(value: AttributeValue) -> Option<Self> {
        Some(match value {
            AttributeValue::Schar(x) => ArrayData::Byte(vec![x]),
            AttributeValue::Schars(v) => ArrayData::Byte(v),
            AttributeValue::Str(s) => ArrayData::Char(s.into_bytes()),
            AttributeValue::Short(x) => ArrayData::Short(vec![x]),
            AttributeValue::Shorts(v) => ArrayData::Short(v),
            AttributeValue::Int(x) => ArrayData::Int(vec![x]),
            AttributeValue::Ints(v) => ArrayData::Int(v),
            AttributeValue::Float(x) => ArrayData::Float(vec![x]),
            AttributeValue::Floats(v) => ArrayData::Float(v),
            AttributeValue::Double(x) => ArrayData::Double(vec![x]),
            AttributeValue::Doubles(v) => ArrayData::Double(v),
            AttributeValue::Longlong(x) => ArrayData::Int64(vec![x]),
            AttributeValue::Longlongs(v) => ArrayData::Int64(v),
            _ => return None,
        })
    }

    fn to_attribute_value(&self) -> AttributeValue {
        match self {
            ArrayData::Byte(v) => AttributeValue::Schars(v.clone()),
            ArrayData::Char(v) => AttributeValue::Str(String::from_utf8_lossy(v).into_owned()),
            ArrayData::Short(v) => AttributeValue::Shorts(v.clone()),
            ArrayData::Int(v) => AttributeValue::Ints(v.clone()),
            ArrayData::Float(v) => AttributeValue::Floats(v.clone()),
            ArrayData::Double(v) => AttributeValue::Doubles(v.clone()),
            ArrayData::Int64(v) => AttributeValue::Longlongs(v.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: ArrayData,
}

impl Attribute {
    pub fn text(name: impl Into<String>, value: &str) -> Self {
        Self {
            name: name.into(),
            value: ArrayData::Char(value.as_bytes().to_vec()),
        }
    }

    /// The `_FillValue` attribute for a variable of `nc_type`, holding the
    /// library's default fill for that type. Text has none.
    pub fn fill_value(nc_type: NcType) -> Option<Self> {
        let value = match nc_type {
            NcType::Byte => ArrayData::Byte(vec![NC_FILL_BYTE]),
            NcType::Short => ArrayData::Short(vec![NC_FILL_SHORT]),
            NcType::Int => ArrayData::Int(vec![NC_FILL_INT]),
            NcType::Float => ArrayData::Float(vec![NC_FILL_FLOAT]),
            NcType::Double => ArrayData::Double(vec![NC_FILL_DOUBLE]),
            NcType::Int64 => ArrayData::Int64(vec![NC_FILL_INT64]),
            NcType::Char => return None,
        };
        Some(Self {
            name: "_FillValue".to_string(),
            value,
        })
    }

    pub fn as_text(&self) -> Option<String> {
        match &self.value {
            ArrayData::Char(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    pub(crate) fn read(attr: &netcdf::Attribute<'_>) -> Result<Option<Self>> {
        let value = attr
            .value()
            .with_context(|| format!("reading attribute {}", attr.name()))?;
        Ok(ArrayData::from_attribute_value(value).map(|value| Self {
            name: attr.name().to_string(),
            value,
        }))
    }

    pub(crate) fn value(&self) -> AttributeValue {
        self.value.to_attribute_value()
    }
}

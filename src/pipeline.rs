//! The end-to-end conversion: load, derive, build, write.

use crate::container::Container;
use crate::dbf::TextEncoding;
use crate::error::{Error, Result};
use crate::formats::netcdf::{ArrayData, Attribute, Format};
use crate::models::Value;
use crate::reader::DbfTable;
use crate::schema::derive_schema;
use crate::writer::NetcdfWriter;
use log::info;
use std::path::Path;
use std::time::Instant;

/// Handle to an open, populated container.
pub type ContainerHandle = Container;

/// Options for [`convert_with`].
///
/// # Examples
///
/// ```no_run
/// use dbf2netcdf::{convert_with, ConvertOptions, Format};
///
/// let options = ConvertOptions::new().format(Format::Netcdf4).overwrite(false);
/// let handle = convert_with(&options, &["ID"], "survey.dbf", "survey.nc")?;
/// handle.close()?;
/// # Ok::<(), dbf2netcdf::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    format: Format,
    overwrite: bool,
    encoding: TextEncoding,
}

impl ConvertOptions {
    /// Defaults: `NETCDF4_CLASSIC`, overwrite, automatic text decoding.
    pub fn new() -> Self {
        Self {
            format: Format::default(),
            overwrite: true,
            encoding: TextEncoding::default(),
        }
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert the table at `source` into a container at `output` using default
/// options. The returned handle is open; the caller stamps and closes it.
pub fn convert<S, P, Q>(field_names: &[S], source: P, output: Q) -> Result<ContainerHandle>
where
    S: AsRef<str>,
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    convert_with(&ConvertOptions::default(), field_names, source, output)
}

/// Like [`convert`] with explicit options.
///
/// Every record is checked against the derived schema and the chosen format
/// before the output file is created, and a failed write is discarded, so an
/// error leaves any existing output untouched.
pub fn convert_with<S, P, Q>(
    options: &ConvertOptions,
    field_names: &[S],
    source: P,
    output: Q,
) -> Result<ContainerHandle>
where
    S: AsRef<str>,
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let table = DbfTable::from_file(source.as_ref())?;
    convert_table(options, &table, field_names, output)
}

/// Like [`convert_with`] for a table that is already open.
pub fn convert_table<S, Q>(
    options: &ConvertOptions,
    table: &DbfTable,
    field_names: &[S],
    output: Q,
) -> Result<ContainerHandle>
where
    S: AsRef<str>,
    Q: AsRef<Path>,
{
    let start = Instant::now();

    let records = table.read_fields_with(field_names, options.encoding)?;

    let schema = derive_schema(&records)?;
    schema.verify_for(options.format, &records)?;

    let container = NetcdfWriter::new(output.as_ref())
        .format(options.format)
        .overwrite(options.overwrite)
        .write(&schema, &records)?;

    info!(
        "Converted {} -> {} ({} records, {} variables) in {:.2?}",
        table.path().display(),
        output.as_ref().display(),
        records.len(),
        schema.len(),
        start.elapsed()
    );

    Ok(container)
}

/// Set the container's `title` attribute.
pub fn stamp(handle: &mut ContainerHandle, title: &str) -> Result<()> {
    handle.set_attribute(Attribute::text("title", title))
}

/// First `limit` values of the variable named `field`.
///
/// Elements equal to the variable's `_FillValue` attribute come back as
/// [`Value::Null`]; variables without one have no nulls. Text variables
/// yield one value per row with trailing padding removed.
pub fn peek(handle: &ContainerHandle, field: &str, limit: usize) -> Result<Vec<Value>> {
    let variable = handle
        .variable(field)
        .ok_or_else(|| Error::NotFound(format!("variable {}", field)))?;
    let data = handle.values(field)?;
    let fill = handle
        .variable_attribute(field, "_FillValue")
        .map(|a| a.value);

    let values = match (data, fill) {
        (ArrayData::Byte(v), fill) => {
            let fill = match fill {
                Some(ArrayData::Byte(f)) => f.first().copied(),
                _ => None,
            };
            let logical = handle
                .variable_attribute(field, "flag_meanings")
                .and_then(|a| a.as_text())
                .is_some_and(|m| m == "false true");
            v.into_iter()
                .take(limit)
                .map(|x| match x {
                    x if Some(x) == fill => Value::Null,
                    x if logical => Value::Logical(x != 0),
                    x => Value::Integer(x as i64),
                })
                .collect()
        }
        (ArrayData::Short(v), Some(ArrayData::Short(f))) => {
            integers(v.into_iter().map(i64::from), f.first().map(|&x| x as i64), limit)
        }
        (ArrayData::Short(v), _) => integers(v.into_iter().map(i64::from), None, limit),
        (ArrayData::Int(v), Some(ArrayData::Int(f))) => {
            integers(v.into_iter().map(i64::from), f.first().map(|&x| x as i64), limit)
        }
        (ArrayData::Int(v), _) => integers(v.into_iter().map(i64::from), None, limit),
        (ArrayData::Int64(v), Some(ArrayData::Int64(f))) => {
            integers(v.into_iter(), f.first().copied(), limit)
        }
        (ArrayData::Int64(v), _) => integers(v.into_iter(), None, limit),
        (ArrayData::Float(v), fill) => {
            let fill = match fill {
                Some(ArrayData::Float(f)) => f.first().map(|&x| x as f64),
                _ => None,
            };
            floats(v.into_iter().map(f64::from), fill, limit)
        }
        (ArrayData::Double(v), fill) => {
            let fill = match fill {
                Some(ArrayData::Double(f)) => f.first().copied(),
                _ => None,
            };
            floats(v.into_iter(), fill, limit)
        }
        (ArrayData::Char(bytes), _) => {
            let width = if variable.shape.len() >= 2 {
                variable.shape[variable.shape.len() - 1]
            } else {
                1
            };
            bytes
                .chunks(width.max(1))
                .take(limit)
                .map(|chunk| {
                    let end = chunk.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
                    Value::Text(String::from_utf8_lossy(&chunk[..end]).into_owned())
                })
                .collect()
        }
    };

    Ok(values)
}

fn integers(values: impl Iterator<Item = i64>, fill: Option<i64>, limit: usize) -> Vec<Value> {
    values
        .take(limit)
        .map(|x| if Some(x) == fill { Value::Null } else { Value::Integer(x) })
        .collect()
}

fn floats(values: impl Iterator<Item = f64>, fill: Option<f64>, limit: usize) -> Vec<Value> {
    values
        .take(limit)
        .map(|x| if Some(x) == fill { Value::Null } else { Value::Float(x) })
        .collect()
}

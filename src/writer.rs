//! Building netCDF containers from a schema and filling them with records.

use crate::container::Container;
use crate::error::{Error, Result};
use crate::formats::netcdf::{
    ArrayData, Attribute, Format, NcType, NC_FILL_BYTE, NC_FILL_DOUBLE, NC_FILL_INT, NC_FILL_INT64,
};
use crate::models::{Record, Value};
use crate::schema::{check_storage, check_value, ElementType, Schema, SchemaEntry};
use log::{info, warn};
use std::path::{Path, PathBuf};

/// Suffix of the character dimension declared for each text field.
pub const STRLEN_SUFFIX: &str = "_strlen";

/// Writer for turning loaded records into a netCDF container.
///
/// # Examples
///
/// ```no_run
/// use dbf2netcdf::{derive_schema, load, Format, NetcdfWriter};
///
/// let records = load(&["ID", "XCOORD"], "survey.dbf")?;
/// let schema = derive_schema(&records)?;
///
/// let container = NetcdfWriter::new("survey.nc")
///     .format(Format::Netcdf4)
///     .write(&schema, &records)?;
/// container.close()?;
/// # Ok::<(), dbf2netcdf::Error>(())
/// ```
pub struct NetcdfWriter {
    output_path: PathBuf,
    format: Format,
    overwrite: bool,
}

impl NetcdfWriter {
    /// Create a writer targeting `output_path`. Defaults to
    /// `NETCDF4_CLASSIC` and overwriting an existing file.
    pub fn new<P: AsRef<Path>>(output_path: P) -> Self {
        Self {
            output_path: output_path.as_ref().to_path_buf(),
            format: Format::default(),
            overwrite: true,
        }
    }

    /// Set the on-disk format variant.
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Whether an existing file at the output path may be replaced.
    ///
    /// Default is `true`; with `false` an existing file is
    /// [`Error::AlreadyExists`].
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Create the container and declare its dimensions and variables.
    ///
    /// For each schema entry, in order: a dimension named after the field
    /// with the entry's length, a character dimension for text, then the
    /// variable itself. No data is written.
    pub fn build(&self, schema: &Schema) -> Result<Container> {
        let mut container = Container::create(&self.output_path, self.format, self.overwrite)?;
        if let Err(e) = declare(&mut container, schema, self.format) {
            container.discard();
            return Err(e);
        }

        info!(
            "Declared {} variables over {} dimensions for {}",
            container.variables().len(),
            container.dimensions().len(),
            self.output_path.display()
        );

        Ok(container)
    }

    /// Build the container and write every field's values into it.
    ///
    /// On failure the partly written container is discarded and the output
    /// path is left as it was.
    pub fn write(&self, schema: &Schema, records: &[Record]) -> Result<Container> {
        let mut container = self.build(schema)?;
        if let Err(e) = write_data(&mut container, schema, records) {
            container.discard();
            return Err(e);
        }
        Ok(container)
    }
}

fn declare(container: &mut Container, schema: &Schema, format: Format) -> Result<()> {
    for entry in &schema.entries {
        container.add_dimension(&entry.name, entry.length)?;
        let nc_type = nc_type_for(entry.element_type, format);

        match entry.element_type {
            ElementType::Char { width } => {
                let strlen = strlen_dimension(container, schema, &entry.name);
                container.add_dimension(&strlen, width)?;
                container.add_variable(&entry.name, nc_type, &[entry.name.as_str(), strlen.as_str()])?;
            }
            ElementType::Byte => {
                container.add_variable(&entry.name, nc_type, &[entry.name.as_str()])?;
                container.set_variable_attribute(
                    &entry.name,
                    Attribute {
                        name: "flag_values".to_string(),
                        value: ArrayData::Byte(vec![0, 1]),
                    },
                )?;
                container
                    .set_variable_attribute(&entry.name, Attribute::text("flag_meanings", "false true"))?;
            }
            ElementType::Int64 | ElementType::Double => {
                container.add_variable(&entry.name, nc_type, &[entry.name.as_str()])?;
            }
        }
    }
    Ok(())
}

/// Name for the character dimension of text field `field`: `<field>_strlen`,
/// or that name with a numeric suffix when a field or dimension already
/// uses it.
fn strlen_dimension(container: &Container, schema: &Schema, field: &str) -> String {
    let base = format!("{}{}", field, STRLEN_SUFFIX);
    let taken = |name: &str| schema.entry(name).is_some() || container.dimension(name).is_some();

    if !taken(&base) {
        return base;
    }
    let mut suffix = 2;
    loop {
        let name = format!("{}{}", base, suffix);
        if !taken(&name) {
            warn!("{} is taken, using {} for field {}", base, name, field);
            return name;
        }
        suffix += 1;
    }
}

/// External type used for an element type in a given format.
pub fn nc_type_for(element_type: ElementType, format: Format) -> NcType {
    match element_type {
        ElementType::Byte => NcType::Byte,
        ElementType::Int64 if format.supports(NcType::Int64) => NcType::Int64,
        ElementType::Int64 => NcType::Int,
        ElementType::Double => NcType::Double,
        ElementType::Char { .. } => NcType::Char,
    }
}

/// Create a container at `output_path` with the default writer settings.
pub fn build_container<P: AsRef<Path>>(schema: &Schema, output_path: P) -> Result<Container> {
    NetcdfWriter::new(output_path).build(schema)
}

/// Fill each schema field's variable with that field's values across
/// `records`, in record order.
///
/// Variables are looked up by field name. Fails with [`Error::TypeMismatch`]
/// on a value that does not fit the field's element type and with
/// [`Error::ShapeMismatch`] when the number of values differs from the
/// variable's declared length.
///
/// Nulls are stored as the type's default fill value, and only then is a
/// `_FillValue` attribute attached to the variable.
pub fn write_data(container: &mut Container, schema: &Schema, records: &[Record]) -> Result<()> {
    for entry in &schema.entries {
        let variable = container
            .variable(&entry.name)
            .ok_or_else(|| Error::NotFound(format!("variable {}", entry.name)))?;
        let declared = variable.shape.first().copied().unwrap_or(1);

        let values: Vec<&Value> = records.iter().filter_map(|r| r.get(&entry.name)).collect();
        if values.len() != declared || values.len() != entry.length {
            return Err(Error::ShapeMismatch {
                variable: entry.name.clone(),
                expected: declared,
                actual: values.len(),
            });
        }

        let array = column_array(entry, variable.nc_type, &values)?;
        if values.iter().any(|v| v.is_null()) {
            if let Some(fill) = Attribute::fill_value(variable.nc_type) {
                container.set_variable_attribute(&entry.name, fill)?;
            }
        }
        container.put_values(&entry.name, array)?;
    }

    info!(
        "Wrote {} records into {} variables",
        records.len(),
        schema.entries.len()
    );
    Ok(())
}

fn column_array(entry: &SchemaEntry, nc_type: NcType, values: &[&Value]) -> Result<ArrayData> {
    for (index, value) in values.iter().enumerate() {
        check_value(entry, index, value)?;
    }
    check_storage(entry, nc_type, values)?;

    let array = match nc_type {
        NcType::Byte => ArrayData::Byte(
            values
                .iter()
                .map(|v| match v {
                    Value::Logical(b) => *b as i8,
                    _ => NC_FILL_BYTE,
                })
                .collect(),
        ),
        NcType::Int => ArrayData::Int(
            values
                .iter()
                .map(|v| {
                    v.as_i64()
                        .and_then(|n| i32::try_from(n).ok())
                        .unwrap_or(NC_FILL_INT)
                })
                .collect(),
        ),
        NcType::Int64 => ArrayData::Int64(
            values
                .iter()
                .map(|v| v.as_i64().unwrap_or(NC_FILL_INT64))
                .collect(),
        ),
        NcType::Double => ArrayData::Double(
            values
                .iter()
                .map(|v| v.as_f64().unwrap_or(NC_FILL_DOUBLE))
                .collect(),
        ),
        NcType::Char => {
            let width = match entry.element_type {
                ElementType::Char { width } => width,
                _ => 1,
            };
            let mut chars = Vec::with_capacity(values.len() * width);
            for value in values {
                let start = chars.len();
                if let Value::Text(s) = value {
                    chars.extend_from_slice(s.as_bytes());
                }
                chars.resize(start + width, 0);
            }
            ArrayData::Char(chars)
        }
        other => {
            return Err(Error::Container(format!(
                "field {} cannot be written as {}",
                entry.name, other
            )))
        }
    };

    Ok(array)
}

/// Statistics about a finished conversion.
#[derive(Debug, Clone)]
pub struct WriteStats {
    /// Records written per variable
    pub num_records: usize,
    /// Variables declared
    pub num_variables: usize,
    /// Requested fields with no matching column
    pub skipped_fields: Vec<String>,
}

impl WriteStats {
    /// Gather statistics from a populated container and the projection that
    /// produced it.
    pub fn collect<S: AsRef<str>>(container: &Container, field_names: &[S]) -> Self {
        let variables = container.variables();
        Self {
            num_records: variables
                .first()
                .and_then(|v| v.shape.first().copied())
                .unwrap_or(0),
            num_variables: variables.len(),
            skipped_fields: field_names
                .iter()
                .map(|n| n.as_ref())
                .filter(|n| container.variable(n).is_none())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Get a human-readable summary of the write operation.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Wrote {} records into {} variable(s)",
            self.num_records, self.num_variables
        );
        if !self.skipped_fields.is_empty() {
            summary.push_str(&format!(
                ", skipped absent field(s): {}",
                self.skipped_fields.join(", ")
            ));
        }
        summary
    }
}

//! Open/close lifecycle for netCDF containers.
//!
//! A writable [`Container`] is built in a staging file next to its target
//! path. [`Container::close`] finishes the file and moves it over the target,
//! so an existing output is only replaced by a complete container.
//! [`Container::discard`] drops the staged file instead. Dropping a container
//! that was neither closed nor discarded commits it like `close`.

use crate::error::{Error, Result};
use crate::formats::netcdf::{ArrayData, Attribute, Format, NcType};
use log::{debug, error};
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// A declared dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub len: usize,
}

/// A declared variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub nc_type: NcType,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
}

impl Variable {
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    fn describe(var: &netcdf::Variable<'_>) -> Option<Self> {
        let nc_type = NcType::from_variable_type(&var.vartype())?;
        Some(Self {
            name: var.name(),
            nc_type,
            dimensions: var.dimensions().iter().map(|d| d.name()).collect(),
            shape: var.dimensions().iter().map(|d| d.len()).collect(),
        })
    }
}

enum Handle {
    Write {
        file: netcdf::FileMut,
        staging: TempPath,
        overwrite: bool,
    },
    Read(netcdf::File),
}

pub struct Container {
    path: PathBuf,
    format: Option<Format>,
    handle: Option<Handle>,
}

fn nc_error(path: &Path, err: impl fmt::Display) -> Error {
    Error::Container(format!("{}: {:#}", path.display(), err))
}

impl Container {
    /// Create a new, empty container that will be written to `path`.
    ///
    /// With `overwrite` unset an existing file at `path` is
    /// [`Error::AlreadyExists`]. Nothing at `path` changes until the
    /// container is committed.
    pub fn create<P: AsRef<Path>>(path: P, format: Format, overwrite: bool) -> Result<Self> {
        let path = path.as_ref();
        if !overwrite && path.exists() {
            return Err(Error::AlreadyExists(path.to_path_buf()));
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let staging = tempfile::Builder::new()
            .prefix(".")
            .suffix(".nc.partial")
            .tempfile_in(dir)
            .map_err(|e| Error::Unwritable {
                path: path.to_path_buf(),
                source: e,
            })?
            .into_temp_path();

        let file = netcdf::create_with(&staging, format.options()).map_err(|e| nc_error(path, e))?;

        debug!(
            "Created {} container for {} (staged at {})",
            format,
            path.display(),
            staging.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            format: Some(format),
            handle: Some(Handle::Write {
                file,
                staging,
                overwrite,
            }),
        })
    }

    /// Open an existing container read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::NotFound(path.display().to_string()));
        }
        let file = netcdf::open(path).map_err(|e| nc_error(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            format: None,
            handle: Some(Handle::Read(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format chosen at creation; `None` for containers opened from disk.
    pub fn format(&self) -> Option<Format> {
        self.format
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.handle, Some(Handle::Write { .. }))
    }

    fn file(&self) -> Result<&netcdf::File> {
        match &self.handle {
            Some(Handle::Write { file, .. }) => Ok(&**file),
            Some(Handle::Read(file)) => Ok(file),
            None => Err(Error::Container(format!("{} is closed", self.path.display()))),
        }
    }

    fn file_mut(&mut self) -> Result<&mut netcdf::FileMut> {
        match &mut self.handle {
            Some(Handle::Write { file, .. }) => Ok(file),
            _ => Err(Error::Container(format!(
                "{} is open read-only",
                self.path.display()
            ))),
        }
    }

    /// Declare a fixed-length dimension.
    pub fn add_dimension(&mut self, name: &str, len: usize) -> Result<Dimension> {
        if len == 0 {
            return Err(Error::Container(format!(
                "dimension {} must have a positive length",
                name
            )));
        }
        if self.dimension(name).is_some() {
            return Err(Error::Container(format!("dimension {} already declared", name)));
        }

        let path = self.path.clone();
        self.file_mut()?
            .add_dimension(name, len)
            .map_err(|e| nc_error(&path, e))?;
        debug!("Declared dimension {} ({})", name, len);

        Ok(Dimension {
            name: name.to_string(),
            len,
        })
    }

    /// Declare a variable over previously declared dimensions.
    pub fn add_variable(&mut self, name: &str, nc_type: NcType, dims: &[&str]) -> Result<Variable> {
        if let Some(format) = self.format {
            if !format.supports(nc_type) {
                return Err(Error::Container(format!(
                    "{} cannot be stored in the {} format",
                    nc_type, format
                )));
            }
        }
        if self.variable(name).is_some() {
            return Err(Error::Container(format!("variable {} already declared", name)));
        }
        for dim in dims {
            if self.dimension(dim).is_none() {
                return Err(Error::NotFound(format!("dimension {}", dim)));
            }
        }

        let path = self.path.clone();
        let file = self.file_mut()?;
        let created = match nc_type {
            NcType::Byte => file.add_variable::<i8>(name, dims).map(drop),
            NcType::Short => file.add_variable::<i16>(name, dims).map(drop),
            NcType::Int => file.add_variable::<i32>(name, dims).map(drop),
            NcType::Float => file.add_variable::<f32>(name, dims).map(drop),
            NcType::Double => file.add_variable::<f64>(name, dims).map(drop),
            NcType::Int64 => file.add_variable::<i64>(name, dims).map(drop),
            NcType::Char => file
                .add_variable_with_type(name, dims, &nc_type.variable_type())
                .map(drop),
        };
        created.map_err(|e| nc_error(&path, e))?;
        debug!("Declared variable {} {} {:?}", nc_type, name, dims);

        self.variable(name)
            .ok_or_else(|| Error::NotFound(format!("variable {}", name)))
    }

    /// Replace the full contents of a variable.
    pub fn put_values(&mut self, name: &str, values: ArrayData) -> Result<()> {
        let variable = self
            .variable(name)
            .ok_or_else(|| Error::NotFound(format!("variable {}", name)))?;

        if values.nc_type() != variable.nc_type {
            return Err(Error::Container(format!(
                "variable {} is {} but {} values were supplied",
                name,
                variable.nc_type,
                values.nc_type()
            )));
        }
        let expected = variable.element_count();
        if values.len() != expected {
            return Err(Error::ShapeMismatch {
                variable: name.to_string(),
                expected,
                actual: values.len(),
            });
        }

        let path = self.path.clone();
        let mut var = self
            .file_mut()?
            .variable_mut(name)
            .ok_or_else(|| Error::NotFound(format!("variable {}", name)))?;
        values.put(&mut var).map_err(|e| nc_error(&path, e))
    }

    /// Set (or replace) a global attribute.
    pub fn set_attribute(&mut self, attribute: Attribute) -> Result<()> {
        let path = self.path.clone();
        self.file_mut()?
            .add_attribute(&attribute.name, attribute.value())
            .map_err(|e| nc_error(&path, e))?;
        Ok(())
    }

    /// Set (or replace) an attribute on one variable.
    pub fn set_variable_attribute(&mut self, variable: &str, attribute: Attribute) -> Result<()> {
        let path = self.path.clone();
        let mut var = self
            .file_mut()?
            .variable_mut(variable)
            .ok_or_else(|| Error::NotFound(format!("variable {}", variable)))?;
        var.put_attribute(&attribute.name, attribute.value())
            .map_err(|e| nc_error(&path, e))?;
        Ok(())
    }

    pub fn attribute(&self, name: &str) -> Option<Attribute> {
        let attr = self.file().ok()?.attribute(name)?;
        self.read_attribute(&attr)
    }

    pub fn variable_attribute(&self, variable: &str, name: &str) -> Option<Attribute> {
        let var = self.file().ok()?.variable(variable)?;
        let attr = var.attribute(name)?;
        self.read_attribute(&attr)
    }

    fn read_attribute(&self, attr: &netcdf::Attribute<'_>) -> Option<Attribute> {
        match Attribute::read(attr) {
            Ok(attribute) => attribute,
            Err(e) => {
                error!("{}: {:#}", self.path.display(), e);
                None
            }
        }
    }

    pub fn title(&self) -> Option<String> {
        self.attribute("title").as_ref().and_then(Attribute::as_text)
    }

    pub fn dimensions(&self) -> Vec<Dimension> {
        let Ok(file) = self.file() else {
            return Vec::new();
        };
        file.dimensions()
            .map(|d| Dimension {
                name: d.name(),
                len: d.len(),
            })
            .collect()
    }

    pub fn dimension(&self, name: &str) -> Option<Dimension> {
        let d = self.file().ok()?.dimension(name)?;
        Some(Dimension {
            name: d.name(),
            len: d.len(),
        })
    }

    /// Variables of a type this crate can read, in definition order.
    pub fn variables(&self) -> Vec<Variable> {
        let Ok(file) = self.file() else {
            return Vec::new();
        };
        file.variables().filter_map(|v| Variable::describe(&v)).collect()
    }

    pub fn variable(&self, name: &str) -> Option<Variable> {
        let var = self.file().ok()?.variable(name)?;
        Variable::describe(&var)
    }

    /// Full contents of a variable.
    pub fn values(&self, name: &str) -> Result<ArrayData> {
        let file = self.file()?;
        let var = file
            .variable(name)
            .ok_or_else(|| Error::NotFound(format!("variable {}", name)))?;
        let nc_type = NcType::from_variable_type(&var.vartype()).ok_or_else(|| {
            Error::Container(format!("variable {} has an unsupported type", name))
        })?;
        ArrayData::get(&var, nc_type).map_err(|e| nc_error(&self.path, e))
    }

    fn commit(&mut self) -> Result<()> {
        let Some(Handle::Write {
            file,
            staging,
            overwrite,
        }) = self.handle.take()
        else {
            return Ok(());
        };

        file.close().map_err(|e| nc_error(&self.path, e))?;

        if !overwrite && self.path.exists() {
            return Err(Error::AlreadyExists(self.path.clone()));
        }
        staging.persist(&self.path).map_err(|e| Error::Unwritable {
            path: self.path.clone(),
            source: e.error,
        })?;

        debug!("Committed {}", self.path.display());
        Ok(())
    }

    /// Finish the file and move it into place.
    pub fn close(mut self) -> Result<()> {
        self.commit()
    }

    /// Drop the container without touching the target path.
    pub fn discard(mut self) {
        if let Some(Handle::Write { file, staging, .. }) = self.handle.take() {
            drop(file);
            drop(staging);
            debug!("Discarded staged output for {}", self.path.display());
        }
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if let Err(e) = self.commit() {
            error!("Failed to commit {} on drop: {}", self.path.display(), e);
        }
    }
}

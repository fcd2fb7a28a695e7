//! # dbf2netcdf
//!
//! Convert dBASE (`.dbf`) survey tables into self-describing netCDF files.
//!
//! Output is written through the `netcdf` crate (and so `libnetcdf`), as
//! `NETCDF4_CLASSIC` unless another [`Format`] is chosen.
//!
//! Each requested column becomes a dimension of length *record count* and a
//! same-named variable holding the column's values in table order. Text
//! columns are stored as fixed-width `NC_CHAR` arrays with an extra
//! `<column>_strlen` dimension.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dbf2netcdf::{convert, peek, stamp};
//!
//! let mut handle = convert(
//!     &["ID", "XCOORD", "YCOORD"],
//!     "toetsingsresultaten_database.dbf",
//!     "Nazca_netCDF.nc",
//! )?;
//! stamp(&mut handle, "Nazca survey results")?;
//!
//! println!("{:?}", peek(&handle, "XCOORD", 10)?);
//! handle.close()?;
//! # Ok::<(), dbf2netcdf::Error>(())
//! ```
//!
//! ## Pipeline Stages
//!
//! The stages behind [`convert`] are public for callers that need to step in
//! between them:
//!
//! ```no_run
//! use dbf2netcdf::{build_container, derive_schema, load, write_data, Format};
//!
//! let records = load(&["ID", "NAAM"], "survey.dbf")?;
//! let schema = derive_schema(&records)?;
//! schema.verify_for(Format::default(), &records)?;
//!
//! let mut container = build_container(&schema, "survey.nc")?;
//! write_data(&mut container, &schema, &records)?;
//! container.close()?;
//! # Ok::<(), dbf2netcdf::Error>(())
//! ```
//!
//! ## Reading Back
//!
//! ```no_run
//! use dbf2netcdf::{peek, Container};
//!
//! let container = Container::open("survey.nc")?;
//! for variable in container.variables() {
//!     println!("{} {:?}", variable.name, peek(&container, &variable.name, 5)?);
//! }
//! # Ok::<(), dbf2netcdf::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! ```no_run
//! use dbf2netcdf::{convert, Error};
//!
//! match convert(&["ID"], "survey.dbf", "survey.nc") {
//!     Ok(handle) => handle.close()?,
//!     Err(Error::EmptySource) => eprintln!("table has no records"),
//!     Err(Error::TypeMismatch { field, record, .. }) => {
//!         eprintln!("field {} changes type at record {}", field, record);
//!     }
//!     Err(err) => eprintln!("Error: {}", err),
//! }
//! # Ok::<(), dbf2netcdf::Error>(())
//! ```

// Public API modules
pub mod container;
pub mod error;
pub mod pipeline;
pub mod reader;
pub mod schema;
pub mod writer;

// Re-export commonly used types
pub use container::{Container, Dimension, Variable};
pub use error::{Error, Result};
pub use pipeline::{
    convert, convert_table, convert_with, peek, stamp, ContainerHandle, ConvertOptions,
};
pub use reader::{load, DbfTable};
pub use schema::{derive_schema, ElementType, Schema, SchemaEntry};
pub use writer::{build_container, write_data, NetcdfWriter, WriteStats};

pub use dbf::TextEncoding;
pub use formats::netcdf::{ArrayData, Format, NcType};
pub use models::{Record, Value};

// Internal modules (public but not part of the high-level API)
pub mod dbf;
pub mod formats;
pub mod models;

/// Alias for the records produced by [`load`]
pub type Records = Vec<Record>;

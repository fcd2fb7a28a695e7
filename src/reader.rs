//! High-level API for loading records from dBASE tables.

use crate::dbf::{decode_field, DbfHeader, DbfReader, FieldDescriptor, TextEncoding};
use crate::error::{Error, Result};
use crate::models::Record;
use log::{debug, info};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A dBASE table opened read-only.
///
/// # Examples
///
/// ```no_run
/// use dbf2netcdf::DbfTable;
///
/// let table = DbfTable::from_file("toetsingsresultaten_database.dbf")?;
/// let records = table.read_fields(&["ID", "XCOORD", "YCOORD"])?;
/// println!("Loaded {} records", records.len());
/// # Ok::<(), dbf2netcdf::Error>(())
/// ```
pub struct DbfTable {
    path: PathBuf,
    data: Mmap,
    header: DbfHeader,
    encoding: TextEncoding,
}

impl DbfTable {
    /// Open and validate a table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the file cannot be opened and
    /// [`Error::MalformedSource`] if it is not a valid table.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::not_found_path(path, e))?;

        let len = file.metadata()?.len();
        if len == 0 {
            return Err(Error::MalformedSource(format!(
                "{}: empty file",
                path.display()
            )));
        }

        // SAFETY: the mapping is read-only and the table is not expected to be
        // modified while a conversion is running.
        let data = unsafe { Mmap::map(&file)? };

        let header = DbfReader::new(&data)
            .map(|reader| reader.header().clone())
            .map_err(|e| Error::MalformedSource(format!("{}: {:#}", path.display(), e)))?;

        debug!(
            "Opened {} (version {:#04x}, {} records, {} fields)",
            path.display(),
            header.version,
            header.record_count,
            header.fields.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            data,
            header,
            encoding: TextEncoding::default(),
        })
    }

    /// Set how text columns are decoded. Default is [`TextEncoding::Auto`].
    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn header(&self) -> &DbfHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of all visible columns, in table order.
    pub fn field_names(&self) -> Vec<String> {
        self.header
            .fields
            .iter()
            .filter(|f| !f.is_hidden())
            .map(|f| f.name.clone())
            .collect()
    }

    /// Read every live record, keeping only the requested fields.
    ///
    /// Field order in each record follows the table's column order. Requested
    /// names that the table does not have are skipped. Deleted rows are
    /// skipped.
    pub fn read_fields<S: AsRef<str>>(&self, field_names: &[S]) -> Result<Vec<Record>> {
        self.read_fields_with(field_names, self.encoding)
    }

    /// [`DbfTable::read_fields`] with an explicit text decoding.
    pub fn read_fields_with<S: AsRef<str>>(
        &self,
        field_names: &[S],
        encoding: TextEncoding,
    ) -> Result<Vec<Record>> {
        let projection: Vec<&FieldDescriptor> = self
            .header
            .fields
            .iter()
            .filter(|f| !f.is_hidden())
            .filter(|f| field_names.iter().any(|n| n.as_ref() == f.name))
            .collect();

        for name in field_names {
            if projection.iter().all(|f| f.name != name.as_ref()) {
                debug!("Field {} not present in {}, skipping", name.as_ref(), self.path.display());
            }
        }

        let reader = DbfReader::new(&self.data).map_err(|e| self.malformed(e))?;
        let mut records = Vec::with_capacity(self.header.record_count as usize);
        let mut deleted = 0usize;

        for (index, raw) in reader.records().enumerate() {
            let raw = raw.map_err(|e| self.malformed(e))?;
            if raw.deleted {
                deleted += 1;
                continue;
            }

            let mut record = Record::new();
            for field in &projection {
                let value = decode_field(field, raw.field_bytes(field), encoding).map_err(|e| {
                    self.malformed(e.context(format!("record {} field {}", index, field.name)))
                })?;
                record.insert(field.name.clone(), value);
            }
            records.push(record);
        }

        info!(
            "Loaded {} records ({} deleted skipped) with {} of {} requested fields from {}",
            records.len(),
            deleted,
            projection.len(),
            field_names.len(),
            self.path.display()
        );

        Ok(records)
    }

    fn malformed(&self, err: anyhow::Error) -> Error {
        Error::MalformedSource(format!("{}: {:#}", self.path.display(), err))
    }
}

/// Load all records of the table at `source`, projected onto `field_names`.
pub fn load<S: AsRef<str>, P: AsRef<Path>>(field_names: &[S], source: P) -> Result<Vec<Record>> {
    DbfTable::from_file(source)?.read_fields(field_names)
}

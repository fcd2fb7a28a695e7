//! Command-line interface for the dBASE to netCDF converter.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dbf2netcdf::{
    convert_table, derive_schema, peek, stamp, ConvertOptions, DbfTable, Format, TextEncoding,
    WriteStats,
};
use log::{info, LevelFilter};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Table name used when the input argument is a directory.
const DEFAULT_SOURCE_FILE: &str = "toetsingsresultaten_database.dbf";
/// Container name used when the output argument is a directory.
const DEFAULT_OUTPUT_FILE: &str = "Nazca_netCDF.nc";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    /// netCDF-4 file, classic data model
    Netcdf4Classic,
    /// netCDF-4 file, enhanced data model (64-bit integers)
    Netcdf4,
}

impl From<FormatArg> for Format {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Netcdf4Classic => Format::Netcdf4Classic,
            FormatArg::Netcdf4 => Format::Netcdf4,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Convert dBASE (.dbf) tables to netCDF",
    long_about = "Converts a dBASE survey table into a netCDF file with one dimension and one \
                  same-named variable per selected column.\n\n\
                  An existing output file is overwritten unless --no-clobber is given."
)]
struct Args {
    /// Source .dbf file, or a directory containing toetsingsresultaten_database.dbf
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output .nc file, or a directory to write Nazca_netCDF.nc into
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Columns to convert (comma separated); all columns when omitted
    #[arg(short, long, value_delimiter = ',')]
    fields: Vec<String>,

    /// Value of the global `title` attribute
    #[arg(long)]
    title: Option<String>,

    /// On-disk netCDF variant
    #[arg(long, value_enum, default_value = "netcdf4-classic")]
    format: FormatArg,

    /// Fail instead of overwriting an existing output file
    #[arg(long)]
    no_clobber: bool,

    /// Decode text columns as Latin-1 instead of guessing
    #[arg(long)]
    latin1: bool,

    /// Print the derived schema as JSON and exit without writing
    #[arg(long)]
    schema: bool,

    /// Log the first N values of every variable after converting
    #[arg(long, value_name = "N")]
    peek: Option<usize>,
}

fn resolve(path: &Path, default_name: &str) -> PathBuf {
    if path.is_dir() {
        path.join(default_name)
    } else {
        path.to_path_buf()
    }
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let input = resolve(&args.input, DEFAULT_SOURCE_FILE);
    let encoding = if args.latin1 {
        TextEncoding::Latin1
    } else {
        TextEncoding::Auto
    };

    let table = DbfTable::from_file(&input)?.encoding(encoding);
    let fields = if args.fields.is_empty() {
        table.field_names()
    } else {
        args.fields.clone()
    };

    if args.schema {
        let records = table.read_fields(&fields)?;
        let schema = derive_schema(&records)?;
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let output = match &args.output {
        Some(path) => resolve(path, DEFAULT_OUTPUT_FILE),
        None => input.with_extension("nc"),
    };

    info!("📄 Source: {}", input.display());
    info!("📁 Output: {}", output.display());
    info!("📊 Fields: {}", fields.join(", "));

    let start = Instant::now();
    let options = ConvertOptions::new()
        .format(args.format.into())
        .overwrite(!args.no_clobber)
        .encoding(encoding);

    let mut handle = convert_table(&options, &table, &fields, &output)
        .with_context(|| format!("converting {}", input.display()))?;

    if let Some(title) = &args.title {
        stamp(&mut handle, title)?;
    }

    if let Some(limit) = args.peek {
        for variable in handle.variables() {
            let values = peek(&handle, &variable.name, limit)?;
            let shown: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            info!("   {} = [{}]", variable.name, shown.join(", "));
        }
    }

    let stats = WriteStats::collect(&handle, &fields);
    handle.close()?;

    info!("   ├─ {}", stats.summary());
    info!("   └─ ✓ Total time: {:.2?}", start.elapsed());

    Ok(())
}

//! NetCDF output
//!
//! Writes a [`Dataset`] to a NetCDF-4 file. Coordinates are written eagerly;
//! data variables are pulled from their lazy sources block by block, so only
//! one block is held in memory at a time.

use crate::coords::{CoordValues, Coordinate};
use crate::dataset::{Attributes, Dataset, Variable};
use crate::errors::{ObsPrepError, Result};
use crate::time::{cf_to_datetimes, encode_times};
use futures::TryStreamExt;
use netcdf::{create, AttributeValue, FileMut, VariableMut};
use serde_json::Value as JsonValue;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const OUTPUT_CALENDAR: &str = "proleptic_gregorian";

/// Attributes replaced by the time encoding written to the file
const TIME_ENCODING: &[&str] = &["units", "calendar"];
const NO_SKIP: &[&str] = &[];

/// File name used for a dataset whose first variable is `name`
pub fn output_file_name(name: &str) -> String {
    format!("OBS_{}.nc", name)
}

/// Unified NetCDF writer for prepared datasets
pub struct NetCDFWriter<'a> {
    output_path: &'a Path,
}

impl<'a> NetCDFWriter<'a> {
    /// Create a new NetCDF writer
    pub fn new(output_path: &'a Path) -> Self {
        Self { output_path }
    }

    /// Write every dimension, coordinate and variable of `ds`, replacing any existing file.
    pub async fn write_dataset(&self, ds: &Dataset) -> Result<()> {
        if self.output_path.exists() {
            fs::remove_file(self.output_path)?;
        }

        let mut file = create(self.output_path)?;

        // Define dimensions
        for dim in ds.dims() {
            match ds.dim_len(dim).unwrap_or(0) {
                0 => {
                    file.add_unlimited_dimension(dim)?;
                }
                len => {
                    file.add_dimension(dim, len)?;
                }
            }
        }

        for coord in ds.coords() {
            write_coordinate(&mut file, coord)?;
        }

        for variable in ds.variables() {
            write_variable(&mut file, variable).await?;
        }

        for (name, value) in &ds.attrs {
            match to_attribute(value) {
                Some(attr) => {
                    file.add_attribute(name, attr)?;
                }
                None => warn!("Skipped unsupported global attribute '{}'", name),
            }
        }

        Ok(())
    }
}

fn write_coordinate(file: &mut FileMut, coord: &Coordinate) -> Result<()> {
    let dims = [coord.name.as_str()];
    let empty = coord.is_empty();

    let (mut var, skip): (VariableMut<'_>, &[&str]) = match &coord.values {
        CoordValues::Float(values) => {
            let mut var = file.add_variable::<f64>(&coord.name, &dims)?;
            if !empty {
                var.put_values(values.as_slice(), ..)?;
            }
            (var, NO_SKIP)
        }
        CoordValues::Float32(values) => {
            let mut var = file.add_variable::<f32>(&coord.name, &dims)?;
            if !empty {
                var.put_values(values.as_slice(), ..)?;
            }
            (var, NO_SKIP)
        }
        CoordValues::Int(values) => {
            let mut var = file.add_variable::<i64>(&coord.name, &dims)?;
            if !empty {
                var.put_values(values.as_slice(), ..)?;
            }
            (var, NO_SKIP)
        }
        CoordValues::Time(times) => (write_times(file, &coord.name, times)?, TIME_ENCODING),
        CoordValues::CfTime { values, .. } => {
            let times = cf_to_datetimes(values)?;
            (write_times(file, &coord.name, &times)?, TIME_ENCODING)
        }
    };

    put_attributes(&mut var, &coord.attrs, skip)?;
    Ok(())
}

fn write_times<'f>(
    file: &'f mut FileMut,
    name: &str,
    times: &[chrono::NaiveDateTime],
) -> Result<VariableMut<'f>> {
    let (offsets, units) = encode_times(times)?;
    let mut var = file.add_variable::<i64>(name, &[name])?;
    var.put_attribute("units", units)?;
    var.put_attribute("calendar", OUTPUT_CALENDAR)?;
    if !offsets.is_empty() {
        var.put_values(offsets.as_slice(), ..)?;
    }
    Ok(var)
}

async fn write_variable(file: &mut FileMut, variable: &Variable) -> Result<()> {
    let dims: Vec<&str> = variable.dims.iter().map(String::as_str).collect();
    let mut var = file.add_variable::<f32>(&variable.name, &dims)?;
    var.put_attribute("_FillValue", f32::NAN)?;
    put_attributes(&mut var, &variable.attrs, &["_FillValue"])?;

    let shape = variable.shape();
    if shape.iter().any(|&n| n == 0) {
        debug!("Variable '{}' is empty, no data written", variable.name);
        return Ok(());
    }

    info!("Writing variable '{}' with shape {:?}", variable.name, shape);
    let mut blocks = variable.data.blocks();
    while let Some(block) = blocks.try_next().await? {
        let values: Vec<f32> = block.data.iter().copied().collect();
        let rows = match block.data.shape().first() {
            Some(&n) => block.offset..block.offset + n,
            None => 0..0,
        };
        debug!("Writing rows {:?} of '{}'", rows, variable.name);
        put_rows(&mut var, &values, rows, shape.len())?;
    }
    Ok(())
}

/// Write full rows `rows` of the first dimension
fn put_rows(var: &mut VariableMut, values: &[f32], rows: Range<usize>, ndim: usize) -> Result<()> {
    match ndim {
        0 => var.put_values(values, ..)?,
        1 => var.put_values(values, (rows,))?,
        2 => var.put_values(values, (rows, ..))?,
        3 => var.put_values(values, (rows, .., ..))?,
        4 => var.put_values(values, (rows, .., .., ..))?,
        5 => var.put_values(values, (rows, .., .., .., ..))?,
        n => {
            return Err(ObsPrepError::Generic(format!(
                "Unsupported number of dimensions for NetCDF output: {}",
                n
            )))
        }
    }
    Ok(())
}

fn put_attributes(var: &mut VariableMut, attrs: &Attributes, skip: &[&str]) -> Result<()> {
    for (name, value) in attrs.iter().filter(|(k, _)| !skip.contains(&k.as_str())) {
        match to_attribute(value) {
            Some(attr) => {
                var.put_attribute(name, attr)?;
            }
            None => warn!("Skipped unsupported attribute type for '{}'", name),
        }
    }
    Ok(())
}

/// Map a JSON attribute to a NetCDF attribute value
fn to_attribute(value: &JsonValue) -> Option<AttributeValue> {
    match value {
        JsonValue::String(s) => Some(AttributeValue::Str(s.clone())),
        JsonValue::Bool(b) => Some(AttributeValue::Schar(*b as i8)),
        JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Some(AttributeValue::Longlong(i)),
            (None, Some(f)) => Some(AttributeValue::Double(f)),
            _ => None,
        },
        JsonValue::Array(items) if !items.is_empty() => {
            if let Some(ints) = items.iter().map(|v| v.as_i64()).collect::<Option<Vec<_>>>() {
                Some(AttributeValue::Longlongs(ints))
            } else if let Some(floats) = items.iter().map(|v| v.as_f64()).collect::<Option<Vec<_>>>() {
                Some(AttributeValue::Doubles(floats))
            } else {
                items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .map(AttributeValue::Strs)
            }
        }
        _ => None,
    }
}

/// Save `ds` as `savedir/OBS_<first variable>.nc` and return the path written.
pub async fn save_dataset(ds: &Dataset, savedir: &Path) -> Result<PathBuf> {
    let name = ds
        .variable_names()
        .first()
        .map(|n| n.to_string())
        .ok_or_else(|| ObsPrepError::Generic("dataset has no data variables to save".to_string()))?;
    let path = savedir.join(output_file_name(&name));

    NetCDFWriter::new(&path).write_dataset(ds).await?;
    info!("Saved {}", path.display());
    Ok(path)
}

//! Construction of the standardized single-variable output dataset

use crate::coords::Coordinate;
use crate::dataset::{Attributes, DataArray, Dataset};
use crate::errors::{ObsPrepError, Result};
use crate::preprocess::{LAT, LEV, LON, TIME};
use chrono::Local;
use serde::Deserialize;
use serde_json::Value as JsonValue;

/// Name, description and units of the output variable
#[derive(Debug, Clone, Deserialize)]
pub struct OutputNames {
    pub shortname: String,
    pub longname: String,
    pub units: String,
}

/// Who produced the file and from what
#[derive(Debug, Clone, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub author: String,
    pub email: String,
}

impl Provenance {
    /// `Created on YYYY-MM-DD by <author> (<email>)` with today's local date
    pub fn history(&self) -> String {
        format!(
            "Created on {} by {} ({})",
            Local::now().format("%Y-%m-%d"),
            self.author,
            self.email
        )
    }
}

fn text_attrs(pairs: &[(&str, &str)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), JsonValue::String(v.to_string())))
        .collect()
}

/// Package `data` as a new dataset with a single variable and annotated
/// coordinates. Source attributes of the variable and its coordinates are
/// not carried over.
pub fn create_dataset(data: &DataArray, names: &OutputNames, provenance: &Provenance) -> Result<Dataset> {
    for dim in [TIME, LAT, LON] {
        if data.coord(dim).is_none() {
            return Err(ObsPrepError::DimensionNotFound {
                var: data.name().to_string(),
                dim: dim.to_string(),
            });
        }
    }

    let mut ds = Dataset::new();
    for dim in data.dims() {
        let Some(coord) = data.coord(dim) else {
            continue;
        };
        let attrs = match dim.as_str() {
            TIME => text_attrs(&[("long_name", "Time")]),
            LAT => text_attrs(&[("long_name", "Latitude"), ("units", "°N")]),
            LON => text_attrs(&[("long_name", "Longitude"), ("units", "°E")]),
            LEV => text_attrs(&[("long_name", "Pressure level"), ("units", "hPa")]),
            _ => Attributes::new(),
        };
        ds.add_coord(Coordinate::new(dim, coord.values.clone()).with_attrs(attrs))?;
    }

    let mut variable = data.variable.clone();
    variable.name = names.shortname.clone();
    variable.attrs = text_attrs(&[
        ("long_name", names.longname.as_str()),
        ("units", names.units.as_str()),
    ]);
    ds.add_variable(variable)?;

    ds.attrs = text_attrs(&[
        ("source", provenance.source.as_str()),
        ("history", provenance.history().as_str()),
    ]);
    Ok(ds)
}

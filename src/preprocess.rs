//! Dimension standardization, subsetting and temporal resampling

use crate::coords::CoordValues;
use crate::dataset::Dataset;
use crate::errors::{ObsPrepError, Result};
use crate::time::{cf_to_datetimes, decode_cf_times, Calendar, CfUnits, Frequency};
use chrono::{Datelike, NaiveDateTime};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const TIME: &str = "time";
pub const LAT: &str = "lat";
pub const LON: &str = "lon";
pub const LEV: &str = "lev";

/// Canonical dimension order of a dataset: `lev` is included only when present
pub fn canonical_dims(ds: &Dataset) -> Vec<&'static str> {
    if ds.has_dim(LEV) {
        vec![TIME, LAT, LON, LEV]
    } else {
        vec![TIME, LAT, LON]
    }
}

/// Make `time` a standard timestamp coordinate and every other canonical
/// dimension a 64-bit float coordinate, then sort ascending along each and
/// transpose to `(time, lat, lon[, lev])`.
pub fn standardize_dims(ds: &Dataset) -> Result<Dataset> {
    let dims = canonical_dims(ds);
    let mut out = ds.clone();

    for &dim in &dims {
        let coord = ds.coord(dim).ok_or_else(|| ObsPrepError::DimensionNotFound {
            var: "dataset".to_string(),
            dim: dim.to_string(),
        })?;

        if dim == TIME {
            match &coord.values {
                CoordValues::Time(_) => {}
                CoordValues::CfTime { values, calendar } => {
                    debug!("Converting {} calendar times to timestamps", calendar.name());
                    out.set_coord_values(dim, CoordValues::Time(cf_to_datetimes(values)?))?;
                }
                numeric => {
                    let raw = numeric.as_f64().unwrap_or_default();
                    let units = coord
                        .attrs
                        .get("units")
                        .and_then(|u| u.as_str())
                        .filter(|u| CfUnits::is_time_units(u))
                        .ok_or_else(|| {
                            ObsPrepError::TimeDecodeError(
                                "time coordinate is numeric and has no CF time units".to_string(),
                            )
                        })?;
                    let calendar =
                        Calendar::parse(coord.attrs.get("calendar").and_then(|c| c.as_str()))?;
                    let decoded = decode_cf_times(&raw, units, calendar)?;
                    let times = cf_to_datetimes(&decoded)?;

                    let mut decoded_coord = coord.clone();
                    decoded_coord.attrs.remove("units");
                    decoded_coord.attrs.remove("calendar");
                    decoded_coord.values = CoordValues::Time(times);
                    out.add_coord(decoded_coord)?;
                }
            }
        } else {
            let values = coord.values.as_f64().ok_or_else(|| ObsPrepError::InvalidSelection {
                message: format!("coordinate '{}' cannot be cast to float", dim),
            })?;
            out.set_coord_values(dim, CoordValues::Float(values))?;
        }
    }

    out.sortby(&dims)?.transpose(&dims)
}

/// Subset by latitude/longitude ranges, years, months and optionally levels.
///
/// Ranges are inclusive label slices `(start, stop)`; on a descending index the
/// start must be the larger value. Selections that match nothing yield empty
/// dimensions rather than errors.
pub fn subset_dims(
    ds: &Dataset,
    years: &[i32],
    months: &[u32],
    latrange: (f64, f64),
    lonrange: (f64, f64),
    levrange: Option<(f64, f64)>,
) -> Result<Dataset> {
    let mut out = slice_dim(ds, LAT, latrange)?;
    out = slice_dim(&out, LON, lonrange)?;

    let time = out.coord(TIME).ok_or_else(|| ObsPrepError::DimensionNotFound {
        var: "dataset".to_string(),
        dim: TIME.to_string(),
    })?;
    let year_months: Vec<(i64, u32)> = match &time.values {
        CoordValues::Time(values) => values.iter().map(|t| (t.year() as i64, t.month())).collect(),
        CoordValues::CfTime { values, .. } => values.iter().map(|t| (t.year, t.month)).collect(),
        other => {
            return Err(ObsPrepError::InvalidSelection {
                message: format!("cannot filter {} time coordinate by year and month", other.kind()),
            })
        }
    };
    let keep: Vec<usize> = year_months
        .iter()
        .enumerate()
        .filter(|&(_, &(year, month))| years.iter().any(|&y| y as i64 == year) && months.contains(&month))
        .map(|(i, _)| i)
        .collect();
    out = out.isel(TIME, &keep)?;

    if let Some(range) = levrange {
        if out.has_dim(LEV) {
            out = slice_dim(&out, LEV, range)?;
        }
    }

    info!(
        "Subset to {}",
        out.dims()
            .iter()
            .map(|d| format!("{}={}", d, out.dim_len(d).unwrap_or(0)))
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(out)
}

fn slice_dim(ds: &Dataset, dim: &str, (start, stop): (f64, f64)) -> Result<Dataset> {
    let coord = ds.coord(dim).ok_or_else(|| ObsPrepError::DimensionNotFound {
        var: "dataset".to_string(),
        dim: dim.to_string(),
    })?;
    let positions = coord.slice_indexer(start, stop)?;
    ds.isel(dim, &positions)
}

/// Resample `time` to a fixed frequency, keeping the first observation of
/// every bin. Missing values in the first observation are filled from later
/// observations of the same bin.
pub fn resample_time(ds: &Dataset, frequency: &Frequency) -> Result<Dataset> {
    let time = ds.coord(TIME).ok_or_else(|| ObsPrepError::DimensionNotFound {
        var: "dataset".to_string(),
        dim: TIME.to_string(),
    })?;
    let times = time.values.as_times().ok_or_else(|| ObsPrepError::InvalidSelection {
        message: format!(
            "cannot resample a {} time coordinate; standardize it first",
            time.values.kind()
        ),
    })?;

    let mut bins: BTreeMap<NaiveDateTime, Vec<usize>> = BTreeMap::new();
    for (i, t) in times.iter().enumerate() {
        bins.entry(frequency.floor(t)?).or_default().push(i);
    }
    debug!("Resampling {} time steps into {} bins", times.len(), bins.len());

    let labels: Vec<NaiveDateTime> = bins.keys().copied().collect();
    let groups: Vec<Vec<usize>> = bins.into_values().collect();
    let mut out = ds.group_dim(TIME, &groups)?;
    out.set_coord_values(TIME, CoordValues::Time(labels))?;
    Ok(out)
}

/// [`resample_time`] with a pandas-style frequency string such as `"1D"` or `"3h"`
pub fn resample_time_str(ds: &Dataset, frequency: &str) -> Result<Dataset> {
    resample_time(ds, &frequency.parse()?)
}

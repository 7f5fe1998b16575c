//! Unit tests for obs_prep modules
//!
//! Synthetic in-memory datasets cover time decoding, label selection, lazy
//! arrays and the preprocessing steps without any network access.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use ndarray::{ArrayD, IxDyn};
use obs_prep::{
    coords::{CoordValues, Coordinate},
    data_source::{ArraySource, InMemorySource},
    dataset::{Dataset, Variable},
    errors::{ObsPrepError, Result},
    lazy::LazyArray,
    metadata::DatasetSummary,
    output::{create_dataset, OutputNames, Provenance},
    preprocess::{resample_time, resample_time_str, standardize_dims, subset_dims},
    sources::ERA5_RENAMES,
    time::{cf_to_datetimes, decode_cf_times, encode_times, Calendar, CfDateTime, CfUnits, Frequency},
};
use std::sync::Arc;

fn ts(y: i32, m: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, mi, 0)
        .unwrap()
}

fn array(shape: &[usize], values: Vec<f32>) -> ArrayD<f32> {
    ArrayD::from_shape_vec(IxDyn(shape), values).unwrap()
}

/// Dataset with one variable `var` over (time, lat, lon) holding its flat index
fn grid_dataset(times: Vec<NaiveDateTime>, lats: Vec<f64>, lons: Vec<f64>) -> Dataset {
    let shape = [times.len(), lats.len(), lons.len()];
    let n: usize = shape.iter().product();
    let data = array(&shape, (0..n).map(|v| v as f32).collect());

    let mut ds = Dataset::new();
    ds.add_coord(Coordinate::new("time", CoordValues::Time(times))).unwrap();
    ds.add_coord(Coordinate::new("lat", CoordValues::Float(lats))).unwrap();
    ds.add_coord(Coordinate::new("lon", CoordValues::Float(lons))).unwrap();
    ds.add_variable(Variable::new("var", &["time", "lat", "lon"], LazyArray::from_array(data)).unwrap())
        .unwrap();
    ds
}

#[test]
fn test_error_types() {
    let var_err = ObsPrepError::VariableNotFound {
        var: "precip".to_string(),
    };
    assert!(format!("{}", var_err).contains("Variable 'precip' not found"));

    let dim_err = ObsPrepError::DimensionNotFound {
        var: "precip".to_string(),
        dim: "lev".to_string(),
    };
    assert!(format!("{}", dim_err).contains("Dimension 'lev' not found in 'precip'"));

    let generic_err: ObsPrepError = "Test error".into();
    assert_eq!(format!("{}", generic_err), "Test error");

    let io_err: ObsPrepError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(std::error::Error::source(&io_err).is_some());
}

#[test]
fn test_calendar_parse() {
    assert_eq!(Calendar::parse(None).unwrap(), Calendar::Standard);
    assert_eq!(Calendar::parse(Some("gregorian")).unwrap(), Calendar::Standard);
    assert_eq!(Calendar::parse(Some("365_day")).unwrap(), Calendar::NoLeap);
    assert_eq!(Calendar::parse(Some("360_day")).unwrap(), Calendar::Day360);
    assert!(Calendar::parse(Some("lunar")).is_err());
    assert!(Calendar::Standard.is_standard());
    assert!(!Calendar::Julian.is_standard());
}

#[test]
fn test_cf_units_parse() {
    let units = CfUnits::parse("hours since 1900-01-01 00:00:00.0").unwrap();
    assert_eq!(units.unit_micros, 3_600_000_000);
    assert_eq!(units.reference, CfDateTime::new(1900, 1, 1, 0, 0, 0));

    assert!(CfUnits::is_time_units("seconds since 1970-01-01T00:00:00Z"));
    assert!(!CfUnits::is_time_units("K"));
    assert!(!CfUnits::is_time_units("fortnights since 2000-01-01"));
}

#[test]
fn test_decode_standard_hours() -> Result<()> {
    let decoded = decode_cf_times(&[0.0, 6.0, 30.0], "hours since 1979-01-01 00:00:00", Calendar::Standard)?;
    let times = cf_to_datetimes(&decoded)?;
    assert_eq!(times, vec![ts(1979, 1, 1, 0, 0), ts(1979, 1, 1, 6, 0), ts(1979, 1, 2, 6, 0)]);
    Ok(())
}

#[test]
fn test_decode_noleap_calendar() -> Result<()> {
    // 2004 is a leap year, but not in a 365-day calendar
    let decoded = decode_cf_times(&[58.0, 59.0, 365.0], "days since 2004-01-01", Calendar::NoLeap)?;
    assert_eq!(decoded[0], CfDateTime::new(2004, 2, 28, 0, 0, 0));
    assert_eq!(decoded[1], CfDateTime::new(2004, 3, 1, 0, 0, 0));
    assert_eq!(decoded[2], CfDateTime::new(2005, 1, 1, 0, 0, 0));
    Ok(())
}

#[test]
fn test_decode_360_day_calendar() -> Result<()> {
    let decoded = decode_cf_times(&[30.0, 59.0, 360.0], "days since 2000-01-01", Calendar::Day360)?;
    assert_eq!(decoded[0], CfDateTime::new(2000, 2, 1, 0, 0, 0));
    assert_eq!(decoded[1], CfDateTime::new(2000, 2, 30, 0, 0, 0));
    assert_eq!(decoded[2], CfDateTime::new(2001, 1, 1, 0, 0, 0));

    // February 30 has no standard calendar counterpart
    assert!(matches!(decoded[1].to_naive(), Err(ObsPrepError::TimeDecodeError(_))));
    assert_eq!(decoded[0].to_naive()?, ts(2000, 2, 1, 0, 0));
    Ok(())
}

#[test]
fn test_decode_julian_calendar() -> Result<()> {
    // 1900 is a leap year in the Julian calendar only
    let decoded = decode_cf_times(&[1.0, 2.0], "days since 1900-02-28", Calendar::Julian)?;
    assert_eq!(decoded[0], CfDateTime::new(1900, 2, 29, 0, 0, 0));
    assert_eq!(decoded[1], CfDateTime::new(1900, 3, 1, 0, 0, 0));
    assert!(decoded[0].to_naive().is_err());

    let modern = decode_cf_times(&[0.5], "days since 2000-06-15", Calendar::Julian)?;
    assert_eq!(cf_to_datetimes(&modern)?, vec![ts(2000, 6, 15, 12, 0)]);
    Ok(())
}

#[test]
fn test_decode_rejects_non_finite() {
    let result = decode_cf_times(&[f64::NAN], "days since 2000-01-01", Calendar::Standard);
    assert!(matches!(result, Err(ObsPrepError::TimeDecodeError(_))));
}

#[test]
fn test_cf_units_fractional_seconds_carry() -> Result<()> {
    let units = CfUnits::parse("seconds since 2000-01-01 00:00:59.9999999")?;
    assert_eq!(units.reference.second, 60);
    assert_eq!(units.reference.microsecond, 0);

    let decoded = decode_cf_times(&[0.0], "seconds since 2000-01-01 00:00:59.9999999", Calendar::Standard)?;
    assert_eq!(cf_to_datetimes(&decoded)?, vec![ts(2000, 1, 1, 0, 1)]);

    let units = CfUnits::parse("seconds since 2000-01-01 00:00:01.25")?;
    assert_eq!((units.reference.second, units.reference.microsecond), (1, 250_000));
    Ok(())
}

#[test]
fn test_encode_times_picks_coarsest_unit() -> Result<()> {
    let (values, units) = encode_times(&[ts(2020, 1, 1, 0, 0), ts(2020, 1, 3, 0, 0)])?;
    assert_eq!(values, vec![0, 2]);
    assert_eq!(units, "days since 2020-01-01");

    let (values, units) = encode_times(&[ts(2020, 1, 1, 6, 0), ts(2020, 1, 1, 12, 0), ts(2020, 1, 2, 6, 0)])?;
    assert_eq!(values, vec![0, 6, 24]);
    assert_eq!(units, "hours since 2020-01-01 06:00:00");

    let (values, units) = encode_times(&[ts(2020, 1, 1, 0, 0), ts(2020, 1, 1, 0, 30)])?;
    assert_eq!(values, vec![0, 30]);
    assert_eq!(units, "minutes since 2020-01-01");

    let (values, _) = encode_times(&[])?;
    assert!(values.is_empty());
    Ok(())
}

#[test]
fn test_encode_times_rejects_unrepresentable_span() {
    let result = encode_times(&[NaiveDateTime::MIN, NaiveDateTime::MAX]);
    assert!(matches!(result, Err(ObsPrepError::TimeDecodeError(_))));
}

#[test]
fn test_frequency_parse() {
    let day: Frequency = "1D".parse().unwrap();
    assert_eq!(day.micros(), 86_400_000_000);
    assert_eq!("D".parse::<Frequency>().unwrap(), day);
    assert_eq!("3h".parse::<Frequency>().unwrap().micros(), 3 * 3_600_000_000);
    assert_eq!("30min".parse::<Frequency>().unwrap().micros(), 30 * 60_000_000);
    assert_eq!("15T".parse::<Frequency>().unwrap().micros(), 15 * 60_000_000);
    assert_eq!("10s".parse::<Frequency>().unwrap().micros(), 10_000_000);

    for bad in ["M", "1W", "0D", "", "D1", "1.5h", "999999999999D"] {
        assert!(
            matches!(bad.parse::<Frequency>(), Err(ObsPrepError::InvalidFrequency { .. })),
            "{} should be rejected",
            bad
        );
    }
}

#[test]
fn test_frequency_from_micros_requires_positive() -> Result<()> {
    assert_eq!(Frequency::from_micros(60_000_000)?, "1min".parse::<Frequency>()?);
    for bad in [0, -1, i64::MIN] {
        assert!(matches!(
            Frequency::from_micros(bad),
            Err(ObsPrepError::InvalidFrequency { .. })
        ));
    }
    Ok(())
}

#[test]
fn test_frequency_floor() -> Result<()> {
    let t = ts(2020, 1, 1, 13, 45);
    assert_eq!("1D".parse::<Frequency>()?.floor(&t)?, ts(2020, 1, 1, 0, 0));
    assert_eq!("6h".parse::<Frequency>()?.floor(&t)?, ts(2020, 1, 1, 12, 0));
    assert_eq!("30min".parse::<Frequency>()?.floor(&t)?, ts(2020, 1, 1, 13, 30));
    // Before the epoch floors downwards, not towards zero
    assert_eq!("1D".parse::<Frequency>()?.floor(&ts(1969, 12, 31, 6, 0))?, ts(1969, 12, 31, 0, 0));
    Ok(())
}

#[test]
fn test_slice_indexer_ascending() -> Result<()> {
    let lat = Coordinate::new("lat", CoordValues::Float(vec![0.0, 10.0, 20.0, 30.0]));
    assert_eq!(lat.slice_indexer(5.0, 25.0)?, vec![1, 2]);
    assert_eq!(lat.slice_indexer(10.0, 20.0)?, vec![1, 2]);
    assert_eq!(lat.slice_indexer(-90.0, 90.0)?, vec![0, 1, 2, 3]);
    assert!(lat.slice_indexer(25.0, 5.0)?.is_empty());
    Ok(())
}

#[test]
fn test_slice_indexer_descending() -> Result<()> {
    let lat = Coordinate::new("lat", CoordValues::Float32(vec![30.0, 20.0, 10.0, 0.0]));
    assert_eq!(lat.slice_indexer(25.0, 5.0)?, vec![1, 2]);
    // Ascending bounds on a descending index select nothing
    assert!(lat.slice_indexer(5.0, 25.0)?.is_empty());
    Ok(())
}

#[test]
fn test_slice_indexer_non_monotonic() {
    let lon = Coordinate::new("lon", CoordValues::Int(vec![0, 20, 10]));
    assert!(matches!(
        lon.slice_indexer(0.0, 15.0),
        Err(ObsPrepError::InvalidSelection { .. })
    ));

    let time = Coordinate::new("time", CoordValues::Time(vec![ts(2020, 1, 1, 0, 0)]));
    assert!(time.slice_indexer(0.0, 1.0).is_err());
}

#[test]
fn test_coord_argsort_is_stable() {
    let values = CoordValues::Float(vec![2.0, f64::NAN, 1.0, 2.0]);
    assert_eq!(values.argsort(), vec![2, 0, 3, 1]);
}

#[tokio::test]
async fn test_in_memory_source_region() -> Result<()> {
    let source = InMemorySource::new(array(&[3, 2], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]));
    let region = source.read_region(&[1..3, 1..2]).await?;
    assert_eq!(region.shape(), &[2, 1]);
    assert_eq!(region.iter().copied().collect::<Vec<_>>(), vec![3.0, 5.0]);
    assert!(source.read_region(&[0..4, 0..2]).await.is_err());
    assert!(source.read_region(&[0..1]).await.is_err());
    assert_eq!(source.read_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_lazy_array_defers_reads() -> Result<()> {
    let source = Arc::new(InMemorySource::new(array(&[3, 2], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0])));
    let lazy = LazyArray::new(source.clone());

    let view = lazy.select(0, &[2, 0])?.permute(&[1, 0])?;
    assert_eq!(view.shape(), vec![2, 2]);
    assert_eq!(source.read_count(), 0);

    let loaded = view.load().await?;
    assert!(source.read_count() > 0);
    assert_eq!(loaded.iter().copied().collect::<Vec<_>>(), vec![4.0, 0.0, 5.0, 1.0]);
    Ok(())
}

#[tokio::test]
async fn test_lazy_array_group_fills_missing() -> Result<()> {
    let lazy = LazyArray::from_array(array(&[4, 1], vec![f32::NAN, 2.0, 3.0, 4.0]));
    let grouped = lazy.group(0, &[vec![0, 1], vec![2, 3]])?;
    let loaded = grouped.load().await?;
    assert_eq!(loaded.iter().copied().collect::<Vec<_>>(), vec![2.0, 3.0]);
    Ok(())
}

#[test]
fn test_lazy_array_invalid_selection() {
    let lazy = LazyArray::from_array(array(&[2, 2], vec![0.0; 4]));
    assert!(lazy.select(0, &[2]).is_err());
    assert!(lazy.select(2, &[0]).is_err());
    assert!(lazy.permute(&[0, 0]).is_err());
    assert!(lazy.permute(&[0]).is_err());
    assert!(lazy.group(0, &[vec![]]).is_err());
}

#[test]
fn test_era5_rename_only_touches_spatial_labels() -> Result<()> {
    let data = LazyArray::from_array(array(&[1, 2, 2, 1], vec![0.0; 4]));
    let mut ds = Dataset::new();
    ds.add_coord(Coordinate::new("time", CoordValues::Time(vec![ts(2020, 1, 1, 0, 0)])))?;
    ds.add_coord(Coordinate::new("latitude", CoordValues::Float32(vec![10.0, 0.0])))?;
    ds.add_coord(Coordinate::new("longitude", CoordValues::Float32(vec![0.0, 0.25])))?;
    ds.add_coord(Coordinate::new("level", CoordValues::Int(vec![500])))?;
    ds.add_variable(Variable::new("temperature", &["time", "latitude", "longitude", "level"], data)?)?;

    let renamed = ds.rename(&ERA5_RENAMES)?;
    assert_eq!(renamed.dims(), vec!["time", "lat", "lon", "lev"]);
    assert_eq!(renamed.variable_names(), vec!["temperature"]);
    assert_eq!(renamed.variable("temperature")?.dims, vec!["time", "lat", "lon", "lev"]);
    assert_eq!(renamed.coord("lev").map(|c| c.values.clone()), Some(CoordValues::Int(vec![500])));

    // Renaming a label that does not exist fails
    let without_level = ds.select_variables(&["temperature"])?.rename(&[("height", "h")]);
    assert!(without_level.is_err());
    Ok(())
}

#[tokio::test]
async fn test_standardize_dims_sorts_casts_and_transposes() -> Result<()> {
    // Stored as (lon, lat, time) with value lon*100 + lat*10 + time
    let mut values = Vec::new();
    for lon in 0..2 {
        for lat in 0..3 {
            for time in 0..2 {
                values.push((lon * 100 + lat * 10 + time) as f32);
            }
        }
    }
    let mut ds = Dataset::new();
    ds.add_coord(Coordinate::new("lon", CoordValues::Int(vec![5, 0])))?;
    ds.add_coord(Coordinate::new("lat", CoordValues::Float32(vec![30.0, 20.0, 10.0])))?;
    ds.add_coord(Coordinate::new(
        "time",
        CoordValues::CfTime {
            values: vec![CfDateTime::new(2001, 1, 2, 0, 0, 0), CfDateTime::new(2001, 1, 1, 0, 0, 0)],
            calendar: Calendar::NoLeap,
        },
    ))?;
    ds.add_variable(Variable::new(
        "t",
        &["lon", "lat", "time"],
        LazyArray::from_array(array(&[2, 3, 2], values)),
    )?)?;

    let standardized = standardize_dims(&ds)?;
    assert_eq!(standardized.dims(), vec!["time", "lat", "lon"]);
    assert_eq!(standardized.variable("t")?.dims, vec!["time", "lat", "lon"]);
    assert_eq!(standardized.coord("lat").unwrap().values, CoordValues::Float(vec![10.0, 20.0, 30.0]));
    assert_eq!(standardized.coord("lon").unwrap().values, CoordValues::Float(vec![0.0, 5.0]));
    assert_eq!(
        standardized.coord("time").unwrap().values,
        CoordValues::Time(vec![ts(2001, 1, 1, 0, 0), ts(2001, 1, 2, 0, 0)])
    );

    let loaded = standardized.variable("t")?.data.load().await?;
    assert_eq!(loaded.shape(), &[2, 3, 2]);
    assert_eq!(loaded[[0, 0, 0]], 121.0);
    assert_eq!(loaded[[1, 2, 1]], 0.0);

    // Idempotent
    let again = standardize_dims(&standardized)?;
    assert_eq!(again.dims(), standardized.dims());
    assert_eq!(again.coords(), standardized.coords());
    assert_eq!(again.variable("t")?.data.load().await?, loaded);
    Ok(())
}

#[test]
fn test_standardize_dims_requires_canonical_dims() {
    let mut ds = Dataset::new();
    ds.add_coord(Coordinate::new("lat", CoordValues::Float(vec![0.0]))).unwrap();
    ds.add_coord(Coordinate::new("lon", CoordValues::Float(vec![0.0]))).unwrap();
    assert!(matches!(
        standardize_dims(&ds),
        Err(ObsPrepError::DimensionNotFound { .. })
    ));
}

#[test]
fn test_standardize_decodes_numeric_time() -> Result<()> {
    let mut attrs = obs_prep::dataset::Attributes::new();
    attrs.insert("units".to_string(), "days since 2000-01-01".into());
    attrs.insert("calendar".to_string(), "julian".into());

    let mut ds = Dataset::new();
    ds.add_coord(Coordinate::new("time", CoordValues::Int(vec![1, 0])).with_attrs(attrs))?;
    ds.add_coord(Coordinate::new("lat", CoordValues::Float(vec![0.0])))?;
    ds.add_coord(Coordinate::new("lon", CoordValues::Float(vec![0.0])))?;

    let standardized = standardize_dims(&ds)?;
    let time = standardized.coord("time").unwrap();
    assert_eq!(time.values, CoordValues::Time(vec![ts(2000, 1, 1, 0, 0), ts(2000, 1, 2, 0, 0)]));
    assert!(time.attrs.get("units").is_none());
    Ok(())
}

#[test]
fn test_subset_by_year_month_and_space() -> Result<()> {
    let times: Vec<NaiveDateTime> = (0..24)
        .map(|i| ts(2020 + i / 12, (i % 12) as u32 + 1, 1, 0, 0))
        .collect();
    let ds = grid_dataset(times, vec![0.0, 10.0, 20.0, 30.0], vec![0.0, 1.0]);

    let subset = subset_dims(&ds, &[2020], &[6, 7], (5.0, 25.0), (0.0, 1.0), None)?;
    let times = subset.coord("time").unwrap().values.as_times().unwrap().to_vec();
    assert_eq!(times, vec![ts(2020, 6, 1, 0, 0), ts(2020, 7, 1, 0, 0)]);
    assert!(times.iter().all(|t| t.year() == 2020));
    assert_eq!(subset.coord("lat").unwrap().values, CoordValues::Float(vec![10.0, 20.0]));
    assert_eq!(subset.variable("var")?.shape(), vec![2, 2, 2]);
    Ok(())
}

#[test]
fn test_subset_empty_selection_is_not_an_error() -> Result<()> {
    let ds = grid_dataset(vec![ts(2020, 1, 1, 0, 0)], vec![0.0, 10.0], vec![0.0]);
    let subset = subset_dims(&ds, &[1999], &[1], (0.0, 10.0), (0.0, 0.0), Some((500.0, 850.0)))?;
    assert_eq!(subset.dim_len("time"), Some(0));
    assert_eq!(subset.variable("var")?.shape(), vec![0, 2, 1]);
    Ok(())
}

#[tokio::test]
async fn test_resample_keeps_first_observation() -> Result<()> {
    let times = vec![ts(2020, 1, 1, 0, 0), ts(2020, 1, 1, 0, 30), ts(2020, 1, 1, 1, 0)];
    let ds = grid_dataset(times, vec![0.0], vec![0.0]);

    let daily = resample_time_str(&ds, "1D")?;
    assert_eq!(daily.coord("time").unwrap().values, CoordValues::Time(vec![ts(2020, 1, 1, 0, 0)]));
    let loaded = daily.variable("var")?.data.load().await?;
    assert_eq!(loaded.iter().copied().collect::<Vec<_>>(), vec![0.0]);

    let hourly = resample_time(&ds, &"1h".parse()?)?;
    assert_eq!(
        hourly.coord("time").unwrap().values,
        CoordValues::Time(vec![ts(2020, 1, 1, 0, 0), ts(2020, 1, 1, 1, 0)])
    );
    let loaded = hourly.variable("var")?.data.load().await?;
    assert_eq!(loaded.iter().copied().collect::<Vec<_>>(), vec![0.0, 2.0]);
    Ok(())
}

#[tokio::test]
async fn test_resample_first_skips_missing_values() -> Result<()> {
    let times = vec![ts(2020, 1, 1, 0, 0), ts(2020, 1, 1, 0, 30), ts(2020, 1, 2, 0, 0)];
    let mut ds = Dataset::new();
    ds.add_coord(Coordinate::new("time", CoordValues::Time(times)))?;
    ds.add_variable(Variable::new(
        "var",
        &["time"],
        LazyArray::from_array(array(&[3], vec![f32::NAN, 2.0, 3.0])),
    )?)?;

    let daily = resample_time_str(&ds, "D")?;
    let loaded = daily.variable("var")?.data.load().await?;
    assert_eq!(loaded.iter().copied().collect::<Vec<_>>(), vec![2.0, 3.0]);
    Ok(())
}

#[test]
fn test_resample_rejects_calendar_frequency() {
    let ds = grid_dataset(vec![ts(2020, 1, 1, 0, 0)], vec![0.0], vec![0.0]);
    assert!(matches!(
        resample_time_str(&ds, "M"),
        Err(ObsPrepError::InvalidFrequency { .. })
    ));
}

fn names() -> OutputNames {
    OutputNames {
        shortname: "precip".to_string(),
        longname: "Precipitation rate".to_string(),
        units: "mm/hr".to_string(),
    }
}

fn provenance() -> Provenance {
    Provenance {
        source: "IMERG V06".to_string(),
        author: "Jane Doe".to_string(),
        email: "jane@example.org".to_string(),
    }
}

#[test]
fn test_create_dataset_attributes() -> Result<()> {
    let ds = grid_dataset(vec![ts(2020, 1, 1, 0, 0)], vec![0.0, 10.0], vec![0.0]);
    let out = create_dataset(&ds.data_array("var")?, &names(), &provenance())?;

    assert_eq!(out.variable_names(), vec!["precip"]);
    let var = out.variable("precip")?;
    assert_eq!(var.attr_str("long_name"), Some("Precipitation rate"));
    assert_eq!(var.attr_str("units"), Some("mm/hr"));
    assert_eq!(var.attrs.len(), 2);

    let attr = |coord: &str, key: &str| {
        out.coord(coord)
            .and_then(|c| c.attrs.get(key))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    assert_eq!(attr("time", "long_name").as_deref(), Some("Time"));
    assert_eq!(attr("lat", "units").as_deref(), Some("°N"));
    assert_eq!(attr("lon", "long_name").as_deref(), Some("Longitude"));
    assert_eq!(attr("lon", "units").as_deref(), Some("°E"));

    let history = out.attrs["history"].as_str().unwrap();
    let today = Local::now().format("%Y-%m-%d").to_string();
    assert_eq!(history, format!("Created on {} by Jane Doe (jane@example.org)", today));
    assert_eq!(out.attrs["source"].as_str(), Some("IMERG V06"));
    Ok(())
}

#[test]
fn test_create_dataset_with_levels() -> Result<()> {
    let mut ds = Dataset::new();
    ds.add_coord(Coordinate::new("time", CoordValues::Time(vec![ts(2020, 1, 1, 0, 0)])))?;
    ds.add_coord(Coordinate::new("lat", CoordValues::Float(vec![0.0])))?;
    ds.add_coord(Coordinate::new("lon", CoordValues::Float(vec![0.0])))?;
    ds.add_coord(Coordinate::new("lev", CoordValues::Float(vec![500.0, 850.0])))?;
    ds.add_variable(Variable::new(
        "t",
        &["time", "lat", "lon", "lev"],
        LazyArray::from_array(array(&[1, 1, 1, 2], vec![1.0, 2.0])),
    )?)?;

    let out = create_dataset(&ds.data_array("t")?, &names(), &provenance())?;
    let lev = out.coord("lev").unwrap();
    assert_eq!(lev.attrs["long_name"].as_str(), Some("Pressure level"));
    assert_eq!(lev.attrs["units"].as_str(), Some("hPa"));
    assert_eq!(out.dims(), vec!["time", "lat", "lon", "lev"]);
    Ok(())
}

#[test]
fn test_create_dataset_requires_spatial_dims() {
    let mut ds = Dataset::new();
    ds.add_coord(Coordinate::new("time", CoordValues::Time(vec![ts(2020, 1, 1, 0, 0)])))
        .unwrap();
    ds.add_variable(
        Variable::new("var", &["time"], LazyArray::from_array(array(&[1], vec![1.0]))).unwrap(),
    )
    .unwrap();

    let result = create_dataset(&ds.data_array("var").unwrap(), &names(), &provenance());
    assert!(matches!(result, Err(ObsPrepError::DimensionNotFound { .. })));
}

#[test]
fn test_dataset_summary() {
    let ds = grid_dataset(vec![ts(2020, 1, 1, 0, 0), ts(2020, 1, 2, 0, 0)], vec![0.0, 10.0], vec![5.0]);
    let summary = DatasetSummary::from_dataset(&ds);

    assert_eq!(summary.dimensions.len(), 3);
    assert_eq!(summary.variables[0].name, "var");
    assert_eq!(summary.variables[0].total_elements, 4);
    assert_eq!(summary.variables[0].estimated_size_bytes, 16);

    let lat = summary.coordinates.iter().find(|c| c.name == "lat").unwrap();
    assert_eq!(lat.range, Some(("0".to_string(), "10".to_string())));
    assert_eq!(lat.kind, "float64");
}

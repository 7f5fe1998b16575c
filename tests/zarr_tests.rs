//! Zarr store tests against a small hand-written uncompressed Zarr v2 store

use chrono::{NaiveDate, NaiveDateTime};
use obs_prep::{
    coords::CoordValues,
    errors::{ObsPrepError, Result},
    output::{create_dataset, OutputNames, Provenance},
    netcdf_io::save_dataset,
    preprocess::{resample_time_str, standardize_dims, subset_dims},
    sources::{zarr_source_for_asset, ERA5_RENAMES},
    stac::Asset,
    zarr_io::{open_zarr, parse_consolidated, ElementType, OpenOptions, ZarrSource},
};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

const MISSING: i16 = -32767;

fn ts(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn zarray(shape: &[usize], chunks: &[usize], dtype: &str, fill_value: Value) -> Value {
    json!({
        "zarr_format": 2,
        "shape": shape,
        "chunks": chunks,
        "dtype": dtype,
        "compressor": null,
        "fill_value": fill_value,
        "filters": null,
        "order": "C"
    })
}

fn write_json(root: &Path, key: &str, value: &Value) {
    let path = root.join(key);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

fn write_chunk(root: &Path, key: &str, bytes: Vec<u8>) {
    let path = root.join(key);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

/// ERA5-like store: t2m(time=3, latitude=2, longitude=2) as scaled int16,
/// with latitude descending and element 5 missing.
fn build_store(consolidated: bool) -> TempDir {
    let dir = tempdir().expect("Failed to create temp dir");
    let root = dir.path();

    let mut metadata = serde_json::Map::new();
    let mut put = |key: &str, value: Value| {
        write_json(root, key, &value);
        metadata.insert(key.to_string(), value);
    };

    put(".zgroup", json!({"zarr_format": 2}));
    put(".zattrs", json!({"title": "synthetic reanalysis"}));

    put("time/.zarray", zarray(&[3], &[3], "<i8", json!(0)));
    put(
        "time/.zattrs",
        json!({"_ARRAY_DIMENSIONS": ["time"], "units": "hours since 2020-01-01", "calendar": "proleptic_gregorian"}),
    );
    put("latitude/.zarray", zarray(&[2], &[2], "<f8", json!("NaN")));
    put(
        "latitude/.zattrs",
        json!({"_ARRAY_DIMENSIONS": ["latitude"], "units": "degrees_north"}),
    );
    put("longitude/.zarray", zarray(&[2], &[2], "<f4", json!("NaN")));
    put("longitude/.zattrs", json!({"_ARRAY_DIMENSIONS": ["longitude"]}));
    put("t2m/.zarray", zarray(&[3, 2, 2], &[2, 2, 2], "<i2", json!(MISSING)));
    put(
        "t2m/.zattrs",
        json!({
            "_ARRAY_DIMENSIONS": ["time", "latitude", "longitude"],
            "scale_factor": 0.5,
            "add_offset": 200.0,
            "units": "K",
            "long_name": "2 metre temperature"
        }),
    );

    if consolidated {
        write_json(
            root,
            ".zmetadata",
            &json!({"metadata": Value::Object(metadata), "zarr_consolidated_format": 1}),
        );
    }

    write_chunk(root, "time/0", [0i64, 12, 24].iter().flat_map(|v| v.to_le_bytes()).collect());
    write_chunk(root, "latitude/0", [10.0f64, 0.0].iter().flat_map(|v| v.to_le_bytes()).collect());
    write_chunk(root, "longitude/0", [0.0f32, 90.0].iter().flat_map(|v| v.to_le_bytes()).collect());

    // Element k of t2m is stored as k; the last chunk is padded to full size.
    let raw: Vec<i16> = (0..16).map(|k| if k == 5 { MISSING } else { k as i16 }).collect();
    write_chunk(root, "t2m/0.0.0", raw[..8].iter().flat_map(|v| v.to_le_bytes()).collect());
    write_chunk(root, "t2m/1.0.0", raw[8..].iter().flat_map(|v| v.to_le_bytes()).collect());

    dir
}

fn local_source(dir: &TempDir) -> ZarrSource {
    ZarrSource::from_url(dir.path().to_str().unwrap()).expect("Failed to open local store")
}

#[test]
fn test_element_type_from_dtype() {
    assert_eq!(ElementType::from_dtype("<f4"), Some(ElementType::F32));
    assert_eq!(ElementType::from_dtype(">f8"), Some(ElementType::F64));
    assert_eq!(ElementType::from_dtype("|u1"), Some(ElementType::U8));
    assert_eq!(ElementType::from_dtype("<i2"), Some(ElementType::I16));
    assert_eq!(ElementType::from_dtype("<M8[ns]"), None);
    assert!(ElementType::I64.is_integer());
    assert!(!ElementType::F32.is_integer());
}

#[test]
fn test_parse_consolidated_requires_dimension_names() {
    let doc = json!({"metadata": {
        "x/.zarray": zarray(&[2], &[2], "<f4", json!("NaN")),
        "x/.zattrs": {"units": "m"}
    }});
    assert!(matches!(parse_consolidated(&doc), Err(ObsPrepError::ZarrError(_))));

    let doc = json!({"metadata": {
        ".zattrs": {"title": "t"},
        "x/.zarray": zarray(&[2], &[1], "<f4", json!("NaN")),
        "x/.zattrs": {"_ARRAY_DIMENSIONS": ["x"]}
    }});
    let metadata = parse_consolidated(&doc).unwrap();
    assert_eq!(metadata.attributes["title"], json!("t"));
    let x = &metadata.arrays["x"];
    assert_eq!(x.shape, vec![2]);
    assert_eq!(x.chunks, vec![1]);
    assert_eq!(x.dims, vec!["x"]);
    assert!(x.fill_value.unwrap().is_nan());
    assert!(x.attributes.get("_ARRAY_DIMENSIONS").is_none());
}

#[test]
fn test_unsupported_url_scheme() {
    assert!(ZarrSource::from_url("s3://bucket/store.zarr").is_err());
    assert!(ZarrSource::from_url("abfs://container/store.zarr").is_err());
}

#[test]
fn test_asset_without_account_is_rejected() {
    let asset: Asset = serde_json::from_value(json!({
        "href": "abfs://gpm-imerg-hhr/gpm-imerg-hhr.zarr",
        "xarray:storage_options": {}
    }))
    .unwrap();
    assert!(matches!(zarr_source_for_asset(&asset), Err(ObsPrepError::CatalogError(_))));
}

#[tokio::test]
async fn test_open_consolidated_store() -> Result<()> {
    let dir = build_store(true);
    let ds = open_zarr(&local_source(&dir), &OpenOptions::default()).await?;

    assert_eq!(ds.dims(), vec!["latitude", "longitude", "time"]);
    assert_eq!(ds.variable_names(), vec!["t2m"]);
    assert_eq!(ds.attrs["title"], json!("synthetic reanalysis"));

    let time = ds.coord("time").unwrap();
    assert_eq!(
        time.values,
        CoordValues::Time(vec![ts(2020, 1, 1, 0), ts(2020, 1, 1, 12), ts(2020, 1, 2, 0)])
    );
    assert!(time.attrs.get("units").is_none());
    assert_eq!(ds.coord("latitude").unwrap().values, CoordValues::Float(vec![10.0, 0.0]));
    assert_eq!(ds.coord("longitude").unwrap().values, CoordValues::Float32(vec![0.0, 90.0]));

    let t2m = ds.variable("t2m")?;
    assert_eq!(t2m.dims, vec!["time", "latitude", "longitude"]);
    assert_eq!(t2m.attr_str("units"), Some("K"));
    assert!(t2m.attrs.get("scale_factor").is_none());

    let data = t2m.data.load().await?;
    assert_eq!(data.shape(), &[3, 2, 2]);
    assert_eq!(data[[0, 0, 0]], 200.0);
    assert_eq!(data[[0, 1, 1]], 201.5);
    assert!(data[[1, 0, 1]].is_nan());
    assert_eq!(data[[2, 1, 1]], 205.5);
    Ok(())
}

#[tokio::test]
async fn test_open_without_time_decoding() -> Result<()> {
    let dir = build_store(true);
    let options = OpenOptions { decode_times: false };
    let ds = open_zarr(&local_source(&dir), &options).await?;

    let time = ds.coord("time").unwrap();
    assert_eq!(time.values, CoordValues::Int(vec![0, 12, 24]));
    assert_eq!(time.attrs["units"], json!("hours since 2020-01-01"));

    // Standardization decodes the raw offsets
    let renamed = ds.rename(&ERA5_RENAMES[..2])?;
    let standardized = standardize_dims(&renamed)?;
    assert_eq!(
        standardized.coord("time").unwrap().values,
        CoordValues::Time(vec![ts(2020, 1, 1, 0), ts(2020, 1, 1, 12), ts(2020, 1, 2, 0)])
    );
    Ok(())
}

#[tokio::test]
async fn test_open_store_by_listing() -> Result<()> {
    let dir = build_store(false);
    let ds = open_zarr(&local_source(&dir), &OpenOptions::default()).await?;
    assert_eq!(ds.dims(), vec!["latitude", "longitude", "time"]);
    assert_eq!(ds.variable("t2m")?.shape(), vec![3, 2, 2]);
    Ok(())
}

#[tokio::test]
async fn test_zarr_to_netcdf_pipeline() -> Result<()> {
    let dir = build_store(true);
    let out_dir = tempdir().expect("Failed to create temp dir");

    let ds = open_zarr(&local_source(&dir), &OpenOptions::default()).await?;
    // The synthetic store has no `level` dimension
    assert!(ds.rename(&ERA5_RENAMES).is_err());
    let ds = ds.rename(&ERA5_RENAMES[..2])?;

    let ds = standardize_dims(&ds)?;
    let ds = subset_dims(&ds, &[2020], &[1], (0.0, 10.0), (0.0, 90.0), None)?;
    let ds = resample_time_str(&ds, "1D")?;

    let names = OutputNames {
        shortname: "t2m".to_string(),
        longname: "2-m temperature".to_string(),
        units: "K".to_string(),
    };
    let provenance = Provenance {
        source: "ERA5".to_string(),
        author: "Jane Doe".to_string(),
        email: "jane@example.org".to_string(),
    };
    let out = create_dataset(&ds.data_array("t2m")?, &names, &provenance)?;
    let path = save_dataset(&out, out_dir.path()).await?;
    assert_eq!(path, out_dir.path().join("OBS_t2m.nc"));

    let file = netcdf::open(&path)?;
    let values: Vec<f32> = file.variable("t2m").unwrap().get_values::<f32, _>(..)?;
    // Latitude is flipped to ascending; each day keeps its first time step.
    assert_eq!(values, vec![201.0, 201.5, 200.0, 200.5, 205.0, 205.5, 204.0, 204.5]);
    let lat: Vec<f64> = file.variable("lat").unwrap().get_values::<f64, _>(..)?;
    assert_eq!(lat, vec![0.0, 10.0]);
    Ok(())
}

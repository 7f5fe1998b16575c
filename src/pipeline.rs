//! End-to-end preparation of one output file: fetch, standardize, subset,
//! optionally resample, package and save.

use crate::dataset::Dataset;
use crate::errors::Result;
use crate::netcdf_io::save_dataset;
use crate::output::{create_dataset, OutputNames, Provenance};
use crate::preprocess::{resample_time, standardize_dims, subset_dims};
use crate::sources::{get_era5, get_imerg, SourceConfig};
use crate::time::Frequency;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use tracing::info;

/// Which source dataset to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Era5,
    Imerg,
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::Era5 => write!(f, "ERA5"),
            DatasetKind::Imerg => write!(f, "IMERG"),
        }
    }
}

/// Parameters of one preparation run
#[derive(Debug, Clone, Deserialize)]
pub struct PrepRequest {
    pub dataset: DatasetKind,
    /// Variable to extract from the source dataset
    pub variable: String,
    pub years: Vec<i32>,
    pub months: Vec<u32>,
    pub latrange: (f64, f64),
    pub lonrange: (f64, f64),
    #[serde(default)]
    pub levrange: Option<(f64, f64)>,
    /// Pandas-style resampling frequency, e.g. `1D`
    #[serde(default)]
    pub frequency: Option<String>,
    pub names: OutputNames,
    pub provenance: Provenance,
    pub savedir: PathBuf,
}

/// Open the requested source dataset
pub async fn fetch(kind: DatasetKind, config: &SourceConfig) -> Result<Dataset> {
    match kind {
        DatasetKind::Era5 => get_era5(config).await,
        DatasetKind::Imerg => get_imerg(config).await,
    }
}

/// Run every step on an already opened source dataset and return the written path
pub async fn prepare(source: &Dataset, request: &PrepRequest) -> Result<PathBuf> {
    let frequency = request
        .frequency
        .as_deref()
        .map(str::parse::<Frequency>)
        .transpose()?;

    let selected = source.select_variables(&[request.variable.as_str()])?;
    info!("Standardizing dimensions of '{}'", request.variable);
    let mut ds = standardize_dims(&selected)?;

    ds = subset_dims(
        &ds,
        &request.years,
        &request.months,
        request.latrange,
        request.lonrange,
        request.levrange,
    )?;

    if let Some(frequency) = &frequency {
        info!("Resampling time to {:?}", frequency);
        ds = resample_time(&ds, frequency)?;
    }

    let data = ds.data_array(&request.variable)?;
    let output = create_dataset(&data, &request.names, &request.provenance)?;
    save_dataset(&output, &request.savedir).await
}

/// Fetch the source and run [`prepare`] on it
pub async fn run(request: &PrepRequest, config: &SourceConfig) -> Result<PathBuf> {
    let source = fetch(request.dataset, config).await?;
    prepare(&source, request).await
}

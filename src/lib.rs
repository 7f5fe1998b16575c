//! obs_prep: ERA5 and IMERG observation preparation
//!
//! Fetches ERA5 reanalysis and IMERG precipitation from cloud Zarr stores,
//! aligns their coordinate conventions, subsets them in space and time,
//! optionally resamples time, and writes small standardized single-variable
//! NetCDF files with descriptive metadata.
//!
//! ## Key Features
//!
//! - **Lazy Zarr access**: Only coordinates are read when a store is opened;
//!   data chunks are fetched block by block while the output file is written
//! - **CF decoding**: Masking, scaling and time decoding for standard and
//!   non-standard calendars
//! - **STAC signing**: Planetary Computer SAS tokens for Azure-hosted assets
//! - **Label selection**: Inclusive coordinate slices on ascending or descending indexes
//!
//! ## Module Organization
//!
//! - [`sources`]: ERA5 and IMERG acquisition
//! - [`zarr_io`]: Zarr store access and CF decoding
//! - [`stac`]: STAC catalog client and asset signing
//! - [`dataset`], [`coords`], [`lazy`], [`data_source`]: labeled lazy datasets
//! - [`preprocess`]: dimension standardization, subsetting and resampling
//! - [`output`]: packaging of the output dataset
//! - [`netcdf_io`]: NetCDF writing
//! - [`metadata`]: dataset inspection
//! - [`pipeline`]: all steps chained from one request
//! - [`errors`]: Centralized error handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use obs_prep::prelude::*;
//! use std::path::Path;
//!
//! # async fn example() -> Result<()> {
//! let ds = get_era5(&SourceConfig::default()).await?;
//! let ds = standardize_dims(&ds.select_variables(&["2m_temperature"])?)?;
//! let ds = subset_dims(&ds, &[2020], &[6, 7], (-10.0, 10.0), (100.0, 120.0), None)?;
//! let ds = resample_time(&ds, &"1D".parse()?)?;
//!
//! let names = OutputNames {
//!     shortname: "t2m".to_string(),
//!     longname: "2-m temperature".to_string(),
//!     units: "K".to_string(),
//! };
//! let provenance = Provenance {
//!     source: "ERA5".to_string(),
//!     author: "A. Researcher".to_string(),
//!     email: "a.researcher@example.org".to_string(),
//! };
//! let out = create_dataset(&ds.data_array("2m_temperature")?, &names, &provenance)?;
//! save_dataset(&out, Path::new("/tmp")).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod coords;
pub mod data_source;
pub mod dataset;
pub mod errors;
pub mod lazy;
pub mod logging;
pub mod metadata;
pub mod netcdf_io;
pub mod output;
pub mod pipeline;
pub mod preprocess;
pub mod sources;
pub mod stac;
pub mod time;
pub mod zarr_io;

pub use errors::{ObsPrepError, Result};

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::coords::{CoordValues, Coordinate};
    pub use crate::data_source::{ArraySource, InMemorySource};
    pub use crate::dataset::{Attributes, DataArray, Dataset, Variable};
    pub use crate::errors::{ObsPrepError, Result};
    pub use crate::lazy::LazyArray;
    pub use crate::metadata::{describe_dataset, DatasetSummary};
    pub use crate::netcdf_io::{save_dataset, NetCDFWriter};
    pub use crate::output::{create_dataset, OutputNames, Provenance};
    pub use crate::pipeline::{DatasetKind, PrepRequest};
    pub use crate::preprocess::{resample_time, standardize_dims, subset_dims};
    pub use crate::sources::{get_era5, get_imerg, SourceConfig};
    pub use crate::time::{Calendar, CfDateTime, Frequency};
    pub use crate::zarr_io::{open_zarr, OpenOptions, ZarrSource};
}

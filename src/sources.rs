//! ERA5 and IMERG source datasets

use crate::dataset::Dataset;
use crate::errors::{ObsPrepError, Result};
use crate::stac::{Asset, PlanetaryComputerSigner, StacClient};
use crate::zarr_io::{open_zarr, OpenOptions, ZarrSource};
use serde::Deserialize;
use tracing::info;

pub const ERA5_URL: &str =
    "gs://gcp-public-data-arco-era5/ar/1959-2022-full_37-1h-0p25deg-chunk-1.zarr-v2/";
pub const PLANETARY_COMPUTER_STAC_URL: &str = "https://planetarycomputer.microsoft.com/api/stac/v1";
pub const IMERG_COLLECTION: &str = "gpm-imerg-hhr";
pub const IMERG_ASSET: &str = "zarr-abfs";

/// ERA5 labels and the names they get
pub const ERA5_RENAMES: [(&str, &str); 3] = [("latitude", "lat"), ("longitude", "lon"), ("level", "lev")];

/// Where the source datasets live
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub era5_url: String,
    pub stac_url: String,
    pub imerg_collection: String,
    pub imerg_asset: String,
    /// Planetary Computer subscription key, sent with SAS token requests
    pub subscription_key: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            era5_url: ERA5_URL.to_string(),
            stac_url: PLANETARY_COMPUTER_STAC_URL.to_string(),
            imerg_collection: IMERG_COLLECTION.to_string(),
            imerg_asset: IMERG_ASSET.to_string(),
            subscription_key: None,
        }
    }
}

/// Open the ERA5 archive with decoded times and `lat`/`lon`/`lev` dimension names.
pub async fn get_era5(config: &SourceConfig) -> Result<Dataset> {
    info!("Fetching ERA5 from {}", config.era5_url);
    let source = ZarrSource::from_url(&config.era5_url)?;
    let ds = open_zarr(&source, &OpenOptions::default()).await?;
    ds.rename(&ERA5_RENAMES)
}

/// Open IMERG through the STAC catalog with signed Azure credentials.
pub async fn get_imerg(config: &SourceConfig) -> Result<Dataset> {
    info!("Fetching IMERG collection '{}' from {}", config.imerg_collection, config.stac_url);
    let signer = PlanetaryComputerSigner::new(config.subscription_key.clone());
    let catalog = StacClient::open(&config.stac_url, Some(signer)).await?;
    let collection = catalog.get_collection(&config.imerg_collection).await?;
    let asset = collection.asset(&config.imerg_asset)?;

    let source = zarr_source_for_asset(asset)?;
    open_zarr(&source, &OpenOptions::default()).await
}

/// Store for a signed `abfs://` asset, or for any URL [`ZarrSource::from_url`] understands
pub fn zarr_source_for_asset(asset: &Asset) -> Result<ZarrSource> {
    let Some(rest) = asset
        .href
        .strip_prefix("abfs://")
        .or_else(|| asset.href.strip_prefix("az://"))
    else {
        return ZarrSource::from_url(&asset.href);
    };

    let (container, prefix) = rest.split_once('/').unwrap_or((rest, ""));
    let account = asset.storage_option("account_name").ok_or_else(|| {
        ObsPrepError::CatalogError(format!(
            "asset '{}' has no account_name storage option",
            asset.href
        ))
    })?;
    ZarrSource::azure(account, container, prefix, asset.storage_option("credential"))
}

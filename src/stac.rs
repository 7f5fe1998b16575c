//! STAC catalog access with Planetary Computer asset signing

use crate::dataset::Attributes;
use crate::errors::{ObsPrepError, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::{debug, info, warn};

pub const PLANETARY_COMPUTER_SAS_URL: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/token";

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const STORAGE_OPTIONS_KEY: &str = "xarray:storage_options";

/// Landing page of a STAC API
#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Link to a retrievable file or store, with its extension fields
#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub href: String,
    #[serde(rename = "type", default)]
    pub media_type: Option<String>,
    #[serde(flatten)]
    pub extra_fields: Attributes,
}

impl Asset {
    /// The `xarray:storage_options` object, if any
    pub fn storage_options(&self) -> Option<&Attributes> {
        self.extra_fields
            .get(STORAGE_OPTIONS_KEY)
            .and_then(|v| v.as_object())
    }

    pub fn storage_option(&self, key: &str) -> Option<&str> {
        self.storage_options()
            .and_then(|o| o.get(key))
            .and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Collection {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub assets: BTreeMap<String, Asset>,
}

impl Collection {
    /// Collection-level asset by key
    pub fn asset(&self, key: &str) -> Result<&Asset> {
        self.assets.get(key).ok_or_else(|| {
            ObsPrepError::CatalogError(format!(
                "collection '{}' has no asset '{}' (available: {})",
                self.id,
                key,
                self.assets.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SasToken {
    token: String,
    #[serde(rename = "msft:expiry")]
    expiry: String,
}

impl SasToken {
    /// An expiry that cannot be parsed counts as expired.
    fn is_valid(&self) -> bool {
        DateTime::parse_from_rfc3339(&self.expiry)
            .map(|expiry| expiry.with_timezone(&Utc) > Utc::now())
            .unwrap_or(false)
    }
}

/// Signs assets with short-lived SAS tokens from the Planetary Computer
#[derive(Debug)]
pub struct PlanetaryComputerSigner {
    client: Client,
    token_url: String,
    subscription_key: Option<String>,
    tokens: Mutex<HashMap<(String, String), SasToken>>,
}

impl PlanetaryComputerSigner {
    pub fn new(subscription_key: Option<String>) -> Self {
        Self::with_token_url(PLANETARY_COMPUTER_SAS_URL, subscription_key)
    }

    pub fn with_token_url(token_url: &str, subscription_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            token_url: token_url.trim_end_matches('/').to_string(),
            subscription_key,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.subscription_key {
            Some(key) => request.header(SUBSCRIPTION_KEY_HEADER, key),
            None => request,
        }
    }

    fn cached(&self, key: &(String, String)) -> Result<Option<String>> {
        let tokens = self
            .tokens
            .lock()
            .map_err(|_| ObsPrepError::Generic("SAS token cache poisoned".to_string()))?;
        Ok(tokens
            .get(key)
            .filter(|t| t.is_valid())
            .map(|t| t.token.clone()))
    }

    /// SAS token for a storage container, reusing unexpired tokens
    pub async fn token(&self, account: &str, container: &str) -> Result<String> {
        let key = (account.to_string(), container.to_string());
        if let Some(token) = self.cached(&key)? {
            return Ok(token);
        }

        let url = format!("{}/{}/{}", self.token_url, account, container);
        debug!("Requesting SAS token from {}", url);
        let token: SasToken = self
            .authorize(self.client.get(&url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let value = token.token.clone();

        if token.is_valid() {
            self.tokens
                .lock()
                .map_err(|_| ObsPrepError::Generic("SAS token cache poisoned".to_string()))?
                .insert(key, token);
        } else {
            warn!(
                "SAS token for {}/{} has unusable expiry '{}', not caching",
                account, container, token.expiry
            );
        }
        Ok(value)
    }

    /// Sign an asset in place.
    ///
    /// `abfs://` assets get a `credential` storage option, Azure Blob `https://`
    /// assets get the token appended to their URL. Other assets are unchanged.
    pub async fn sign(&self, asset: &mut Asset) -> Result<()> {
        if let Some((account, container)) = abfs_target(asset) {
            let token = self.token(&account, &container).await?;
            let options = asset
                .extra_fields
                .entry(STORAGE_OPTIONS_KEY)
                .or_insert_with(|| JsonValue::Object(Attributes::new()));
            if let JsonValue::Object(options) = options {
                options.insert("credential".to_string(), JsonValue::String(token));
            }
        } else if let Some((account, container)) = blob_target(&asset.href) {
            let token = self.token(&account, &container).await?;
            let separator = if asset.href.contains('?') { '&' } else { '?' };
            asset.href = format!("{}{}{}", asset.href, separator, token);
        }
        Ok(())
    }
}

/// Account and container of an `abfs://container/path` asset
fn abfs_target(asset: &Asset) -> Option<(String, String)> {
    let rest = asset
        .href
        .strip_prefix("abfs://")
        .or_else(|| asset.href.strip_prefix("az://"))?;
    let container = rest.split('/').next()?.split('@').next()?;
    let account = asset.storage_option("account_name")?;
    Some((account.to_string(), container.to_string()))
}

/// Account and container of an `https://<account>.blob.core.windows.net/<container>/...` URL
fn blob_target(href: &str) -> Option<(String, String)> {
    let rest = href.strip_prefix("https://")?;
    let (host, path) = rest.split_once('/')?;
    let account = host.strip_suffix(".blob.core.windows.net")?;
    let container = path.split(['/', '?']).next().filter(|c| !c.is_empty())?;
    Some((account.to_string(), container.to_string()))
}

/// Minimal STAC API client
#[derive(Debug)]
pub struct StacClient {
    client: Client,
    url: String,
    catalog: Catalog,
    signer: Option<PlanetaryComputerSigner>,
}

impl StacClient {
    /// Open a STAC API by fetching its landing page
    pub async fn open(url: &str, signer: Option<PlanetaryComputerSigner>) -> Result<Self> {
        let client = Client::new();
        let url = url.trim_end_matches('/').to_string();
        info!("Opening STAC catalog {}", url);
        let catalog: Catalog = client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Catalog id: {}", catalog.id);
        Ok(Self {
            client,
            url,
            catalog,
            signer,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Fetch a collection, signing its assets when a signer is configured
    pub async fn get_collection(&self, id: &str) -> Result<Collection> {
        let url = format!("{}/collections/{}", self.url, id);
        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ObsPrepError::CatalogError(format!(
                "collection '{}' not found in {}",
                id, self.url
            )));
        }
        let mut collection: Collection = response.error_for_status()?.json().await?;

        if let Some(signer) = &self.signer {
            for asset in collection.assets.values_mut() {
                signer.sign(asset).await?;
            }
        }
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(json: &str) -> Asset {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_abfs_target_uses_storage_options() {
        let a = asset(
            r#"{"href": "abfs://gpm-imerg-hhr/gpm-imerg-hhr.zarr",
                "type": "application/vnd+zarr",
                "xarray:storage_options": {"account_name": "pcstacitems"}}"#,
        );
        assert_eq!(
            abfs_target(&a),
            Some(("pcstacitems".to_string(), "gpm-imerg-hhr".to_string()))
        );
        assert_eq!(a.media_type.as_deref(), Some("application/vnd+zarr"));
    }

    #[test]
    fn test_blob_target() {
        assert_eq!(
            blob_target("https://acct.blob.core.windows.net/cont/a/b.nc"),
            Some(("acct".to_string(), "cont".to_string()))
        );
        assert_eq!(blob_target("https://example.com/cont/a"), None);
    }

    fn sas(expiry: &str) -> SasToken {
        SasToken {
            token: "sv=2021&sig=abc".to_string(),
            expiry: expiry.to_string(),
        }
    }

    #[test]
    fn test_sas_token_expiry() {
        assert!(sas("2999-01-01T00:00:00Z").is_valid());
        assert!(!sas("2000-01-01T00:00:00Z").is_valid());
        assert!(!sas("tomorrow").is_valid());
        assert!(!sas("").is_valid());
    }

    #[test]
    fn test_cache_ignores_unparseable_expiry() {
        let signer = PlanetaryComputerSigner::new(None);
        let key = ("acct".to_string(), "cont".to_string());
        signer.tokens.lock().unwrap().insert(key.clone(), sas("not-a-date"));
        assert_eq!(signer.cached(&key).unwrap(), None);

        signer.tokens.lock().unwrap().insert(key.clone(), sas("2999-01-01T00:00:00Z"));
        assert_eq!(signer.cached(&key).unwrap().as_deref(), Some("sv=2021&sig=abc"));
    }

    #[test]
    fn test_missing_asset_is_catalog_error() {
        let collection: Collection =
            serde_json::from_str(r#"{"id": "c", "assets": {}}"#).unwrap();
        assert!(matches!(
            collection.asset("zarr-abfs"),
            Err(ObsPrepError::CatalogError(_))
        ));
    }
}

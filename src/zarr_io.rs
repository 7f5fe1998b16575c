//! Zarr I/O operations
//!
//! Opens Zarr v2 stores written by xarray (local, HTTP, Google Cloud Storage
//! public buckets, Azure Blob Storage) as lazy [`Dataset`]s. Metadata comes from
//! consolidated `.zmetadata` when present; chunk decoding is delegated to
//! `zarrs`. Dimension coordinates are read eagerly, data variables stay lazy.

use crate::coords::{CoordValues, Coordinate};
use crate::data_source::{validate_region, ArraySource};
use crate::dataset::{Attributes, Dataset, Variable};
use crate::errors::{ObsPrepError, Result};
use crate::lazy::LazyArray;
use crate::time::{decode_cf_times, Calendar, CfUnits};
use async_trait::async_trait;
use futures::TryStreamExt;
use ndarray::{ArrayD, IxDyn};
use object_store::azure::{AzureConfigKey, MicrosoftAzureBuilder};
use object_store::http::HttpBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::prefix::PrefixStore;
use object_store::ObjectStore;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use zarrs::array::Array;
use zarrs::array_subset::ArraySubset;
use zarrs_object_store::AsyncObjectStore;

const GCS_PUBLIC_ENDPOINT: &str = "https://storage.googleapis.com";

type ZarrStorage = AsyncObjectStore<Arc<dyn ObjectStore>>;

/// Location of a Zarr store
#[derive(Clone)]
pub struct ZarrSource {
    store: Arc<dyn ObjectStore>,
    /// Human-readable location for logs and errors
    pub location: String,
}

impl fmt::Debug for ZarrSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZarrSource")
            .field("location", &self.location)
            .finish()
    }
}

impl ZarrSource {
    /// Create a source from a URL or local path.
    ///
    /// Supported: `gs://bucket/path` (public buckets, read over HTTPS),
    /// `http(s)://...`, `abfs://container@account.dfs.core.windows.net/path`
    /// and local filesystem paths (optionally `file://`).
    pub fn from_url(url: &str) -> Result<Self> {
        let trimmed = url.trim_end_matches('/');

        if let Some(rest) = trimmed
            .strip_prefix("gs://")
            .or_else(|| trimmed.strip_prefix("gcs://"))
        {
            let https = format!("{}/{}", GCS_PUBLIC_ENDPOINT, rest);
            return Self::http(&https).map(|s| s.described_as(url));
        }

        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Self::http(trimmed);
        }

        if let Some(rest) = trimmed
            .strip_prefix("abfs://")
            .or_else(|| trimmed.strip_prefix("az://"))
        {
            let (authority, prefix) = rest.split_once('/').unwrap_or((rest, ""));
            let (container, host) = authority.split_once('@').ok_or_else(|| {
                ObsPrepError::Generic(format!(
                    "Azure URL '{}' has no account; use ZarrSource::azure instead",
                    url
                ))
            })?;
            let account = host.split('.').next().unwrap_or(host);
            return Self::azure(account, container, prefix, None);
        }

        if trimmed.contains("://") && !trimmed.starts_with("file://") {
            return Err(ObsPrepError::Generic(format!(
                "Unsupported store URL scheme: {}",
                url
            )));
        }

        let path = trimmed.strip_prefix("file://").unwrap_or(trimmed);
        let store = LocalFileSystem::new_with_prefix(path)?;
        Ok(Self {
            store: Arc::new(store),
            location: path.to_string(),
        })
    }

    fn http(url: &str) -> Result<Self> {
        let store = HttpBuilder::new().with_url(url).build()?;
        Ok(Self {
            store: Arc::new(store),
            location: url.to_string(),
        })
    }

    /// Azure Blob Storage store, optionally authorized with a SAS token
    pub fn azure(account: &str, container: &str, prefix: &str, sas_token: Option<&str>) -> Result<Self> {
        let mut builder = MicrosoftAzureBuilder::new()
            .with_account(account)
            .with_container_name(container);
        if let Some(token) = sas_token {
            builder = builder.with_config(AzureConfigKey::SasKey, token.trim_start_matches('?'));
        }
        let azure = builder.build()?;

        let prefix = prefix.trim_matches('/');
        let store: Arc<dyn ObjectStore> = if prefix.is_empty() {
            Arc::new(azure)
        } else {
            Arc::new(PrefixStore::new(azure, prefix))
        };
        Ok(Self {
            store,
            location: format!("abfs://{}/{} ({})", container, prefix, account),
        })
    }

    /// Wrap an existing object store rooted at the Zarr group
    pub fn from_store(store: Arc<dyn ObjectStore>, location: &str) -> Self {
        Self {
            store,
            location: location.to_string(),
        }
    }

    fn described_as(mut self, location: &str) -> Self {
        self.location = location.to_string();
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    async fn get_json(&self, key: &str) -> Result<Option<JsonValue>> {
        match self.store.get(&ObjectPath::from(key)).await {
            Ok(result) => {
                let bytes = result.bytes().await?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Element types readable from Zarr v2 arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl ElementType {
    /// Parse a NumPy-style Zarr v2 dtype such as `<f4` or `|u1`
    pub fn from_dtype(dtype: &str) -> Option<Self> {
        let code = dtype.trim_start_matches(['<', '>', '|', '=']);
        match code {
            "f4" => Some(ElementType::F32),
            "f8" => Some(ElementType::F64),
            "i1" => Some(ElementType::I8),
            "i2" => Some(ElementType::I16),
            "i4" => Some(ElementType::I32),
            "i8" => Some(ElementType::I64),
            "u1" => Some(ElementType::U8),
            "u2" => Some(ElementType::U16),
            "u4" => Some(ElementType::U32),
            "u8" => Some(ElementType::U64),
            _ => None,
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, ElementType::F32 | ElementType::F64)
    }
}

/// Metadata for a Zarr array
#[derive(Debug, Clone)]
pub struct ArrayMetadata {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
    pub chunks: Vec<usize>,
    pub fill_value: Option<f64>,
    pub dims: Vec<String>,
    pub attributes: Attributes,
}

impl ArrayMetadata {
    fn from_json(name: &str, zarray: &JsonValue, zattrs: Option<&JsonValue>) -> Result<Self> {
        let invalid = |what: &str| {
            ObsPrepError::ZarrError(format!("Missing or invalid {} in metadata of '{}'", what, name))
        };
        let usizes = |key: &str| -> Result<Vec<usize>> {
            zarray[key]
                .as_array()
                .ok_or_else(|| invalid(key))?
                .iter()
                .map(|v| v.as_u64().map(|n| n as usize).ok_or_else(|| invalid(key)))
                .collect()
        };
        let shape = usizes("shape")?;
        let chunks = usizes("chunks")?;
        let dtype = match &zarray["dtype"] {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        };

        let mut attributes = zattrs
            .and_then(|a| a.as_object())
            .cloned()
            .unwrap_or_default();
        let dims = match attributes.remove("_ARRAY_DIMENSIONS") {
            Some(JsonValue::Array(names)) => names
                .iter()
                .map(|n| n.as_str().map(str::to_string).ok_or_else(|| invalid("_ARRAY_DIMENSIONS")))
                .collect::<Result<Vec<_>>>()?,
            _ => {
                return Err(ObsPrepError::ZarrError(format!(
                    "Array '{}' has no _ARRAY_DIMENSIONS attribute",
                    name
                )))
            }
        };
        if dims.len() != shape.len() {
            return Err(invalid("_ARRAY_DIMENSIONS"));
        }

        Ok(Self {
            name: name.to_string(),
            shape,
            dtype,
            chunks,
            fill_value: parse_number(&zarray["fill_value"]),
            dims,
            attributes,
        })
    }
}

/// JSON numbers plus the NaN/Infinity spellings used by Zarr v2 fill values
fn parse_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

/// Group-level metadata of a Zarr store
#[derive(Debug, Clone, Default)]
pub struct StoreMetadata {
    pub attributes: Attributes,
    pub arrays: BTreeMap<String, ArrayMetadata>,
}

/// Read `.zmetadata`, or list the store for `.zarray` documents when it is absent.
pub async fn read_store_metadata(source: &ZarrSource) -> Result<StoreMetadata> {
    if let Some(doc) = source.get_json(".zmetadata").await? {
        debug!("Using consolidated metadata of {}", source.location);
        return parse_consolidated(&doc);
    }

    warn!(
        "No consolidated metadata in {}, listing the store instead",
        source.location
    );
    let objects: Vec<_> = source.store.list(None).try_collect().await?;
    let mut keys: Vec<String> = objects
        .iter()
        .map(|meta| meta.location.as_ref().to_string())
        .filter(|key| key.ends_with("/.zarray"))
        .collect();
    keys.sort();

    let mut metadata = StoreMetadata {
        attributes: attributes_of(source.get_json(".zattrs").await?.as_ref()),
        arrays: BTreeMap::new(),
    };
    for key in keys {
        let name = key.trim_end_matches("/.zarray");
        let zarray = source
            .get_json(&key)
            .await?
            .ok_or_else(|| ObsPrepError::ZarrError(format!("{} disappeared", key)))?;
        let zattrs = source.get_json(&format!("{}/.zattrs", name)).await?;
        let array = ArrayMetadata::from_json(name, &zarray, zattrs.as_ref())?;
        metadata.arrays.insert(name.to_string(), array);
    }
    Ok(metadata)
}

fn attributes_of(value: Option<&JsonValue>) -> Attributes {
    value.and_then(|v| v.as_object()).cloned().unwrap_or_default()
}

/// Parse a consolidated `.zmetadata` document
pub fn parse_consolidated(doc: &JsonValue) -> Result<StoreMetadata> {
    let entries = doc["metadata"].as_object().ok_or_else(|| {
        ObsPrepError::ZarrError("Consolidated metadata has no 'metadata' object".to_string())
    })?;

    let mut metadata = StoreMetadata {
        attributes: attributes_of(entries.get(".zattrs")),
        arrays: BTreeMap::new(),
    };
    for (key, zarray) in entries {
        let Some(name) = key.strip_suffix("/.zarray") else {
            continue;
        };
        let zattrs = entries.get(&format!("{}/.zattrs", name));
        let array = ArrayMetadata::from_json(name, zarray, zattrs)?;
        metadata.arrays.insert(name.to_string(), array);
    }
    Ok(metadata)
}

/// CF masking and scaling applied after decoding chunks
#[derive(Debug, Clone, Default)]
struct MaskAndScale {
    missing: Vec<f64>,
    scale_factor: Option<f64>,
    add_offset: Option<f64>,
}

impl MaskAndScale {
    /// Collect the encoding attributes, removing them from `attrs`.
    fn take_from(attrs: &mut Attributes, fill_value: Option<f64>) -> Self {
        let mut missing: Vec<f64> = fill_value.into_iter().collect();
        for key in ["_FillValue", "missing_value"] {
            match attrs.remove(key) {
                Some(JsonValue::Array(values)) => missing.extend(values.iter().filter_map(parse_number)),
                Some(value) => missing.extend(parse_number(&value)),
                None => {}
            }
        }
        missing.retain(|v| !v.is_nan());
        Self {
            missing,
            scale_factor: attrs.remove("scale_factor").as_ref().and_then(parse_number),
            add_offset: attrs.remove("add_offset").as_ref().and_then(parse_number),
        }
    }

    fn apply(&self, value: f64) -> f64 {
        if self.missing.contains(&value) {
            return f64::NAN;
        }
        value * self.scale_factor.unwrap_or(1.0) + self.add_offset.unwrap_or(0.0)
    }
}

macro_rules! retrieve_as_f64 {
    ($array:expr, $subset:expr, $t:ty) => {
        $array
            .async_retrieve_array_subset_elements::<$t>($subset)
            .await
            .map_err(|e| ObsPrepError::ZarrError(e.to_string()))?
            .into_iter()
            .map(|v| v as f64)
            .collect::<Vec<f64>>()
    };
}

/// A single Zarr array, opened on first read
pub struct ZarrArraySource {
    storage: Arc<ZarrStorage>,
    path: String,
    shape: Vec<usize>,
    element: ElementType,
    decoding: MaskAndScale,
    array: OnceCell<Array<ZarrStorage>>,
}

impl fmt::Debug for ZarrArraySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZarrArraySource")
            .field("path", &self.path)
            .field("shape", &self.shape)
            .field("element", &self.element)
            .finish()
    }
}

impl ZarrArraySource {
    fn new(storage: Arc<ZarrStorage>, meta: &ArrayMetadata, element: ElementType, decoding: MaskAndScale) -> Self {
        Self {
            storage,
            path: format!("/{}", meta.name),
            shape: meta.shape.clone(),
            element,
            decoding,
            array: OnceCell::new(),
        }
    }

    async fn array(&self) -> Result<&Array<ZarrStorage>> {
        self.array
            .get_or_try_init(|| async {
                debug!("Opening Zarr array {}", self.path);
                Array::async_open(self.storage.clone(), &self.path)
                    .await
                    .map_err(|e| ObsPrepError::ZarrError(format!("{}: {}", self.path, e)))
            })
            .await
    }

    /// Raw values of a region, widened to `f64`, without masking
    async fn read_raw(&self, ranges: &[Range<usize>]) -> Result<Vec<f64>> {
        validate_region(&self.shape, ranges)?;
        let array = self.array().await?;
        let subset_ranges: Vec<Range<u64>> = ranges
            .iter()
            .map(|r| r.start as u64..r.end as u64)
            .collect();
        let subset = ArraySubset::new_with_ranges(&subset_ranges);

        let values = match self.element {
            ElementType::F32 => retrieve_as_f64!(array, &subset, f32),
            ElementType::F64 => retrieve_as_f64!(array, &subset, f64),
            ElementType::I8 => retrieve_as_f64!(array, &subset, i8),
            ElementType::I16 => retrieve_as_f64!(array, &subset, i16),
            ElementType::I32 => retrieve_as_f64!(array, &subset, i32),
            ElementType::I64 => retrieve_as_f64!(array, &subset, i64),
            ElementType::U8 => retrieve_as_f64!(array, &subset, u8),
            ElementType::U16 => retrieve_as_f64!(array, &subset, u16),
            ElementType::U32 => retrieve_as_f64!(array, &subset, u32),
            ElementType::U64 => retrieve_as_f64!(array, &subset, u64),
        };
        Ok(values)
    }

    async fn read_all_raw(&self) -> Result<Vec<f64>> {
        let ranges: Vec<Range<usize>> = self.shape.iter().map(|&n| 0..n).collect();
        self.read_raw(&ranges).await
    }
}

#[async_trait]
impl ArraySource for ZarrArraySource {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    async fn read_region(&self, ranges: &[Range<usize>]) -> Result<ArrayD<f32>> {
        let raw = self.read_raw(ranges).await?;
        let values: Vec<f32> = raw
            .into_iter()
            .map(|v| self.decoding.apply(v) as f32)
            .collect();
        let shape: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
        Ok(ArrayD::from_shape_vec(IxDyn(&shape), values)?)
    }
}

/// Options for [`open_zarr`]
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Decode CF time coordinates into timestamps
    pub decode_times: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self { decode_times: true }
    }
}

/// Open a Zarr store as a lazy dataset
pub async fn open_zarr(source: &ZarrSource, options: &OpenOptions) -> Result<Dataset> {
    info!("Opening Zarr store {}", source.location);
    let metadata = read_store_metadata(source).await?;
    let storage = Arc::new(AsyncObjectStore::new(source.store.clone()));

    let mut dataset = Dataset::new();
    dataset.attrs = metadata.attributes.clone();

    for meta in metadata.arrays.values() {
        let Some(element) = ElementType::from_dtype(&meta.dtype) else {
            warn!("Skipping array '{}' with unsupported dtype {}", meta.name, meta.dtype);
            continue;
        };
        let is_dimension_coordinate = meta.dims.len() == 1 && meta.dims[0] == meta.name;

        if is_dimension_coordinate {
            let mut attrs = meta.attributes.clone();
            let array = ZarrArraySource::new(storage.clone(), meta, element, MaskAndScale::default());
            let raw = array.read_all_raw().await?;
            let values = coordinate_values(&meta.name, raw, element, &mut attrs, options)?;
            dataset.add_coord(Coordinate::new(&meta.name, values).with_attrs(attrs))?;
        } else {
            let mut attrs = meta.attributes.clone();
            let decoding = MaskAndScale::take_from(&mut attrs, meta.fill_value);
            let array = ZarrArraySource::new(storage.clone(), meta, element, decoding);
            let dims: Vec<&str> = meta.dims.iter().map(String::as_str).collect();
            let variable = Variable::new(&meta.name, &dims, LazyArray::new(Arc::new(array)))?;
            dataset.add_variable(variable.with_attrs(attrs))?;
        }
    }

    debug!(
        "Opened {} with dimensions {:?} and {} variables",
        source.location,
        dataset.dims(),
        dataset.variables().len()
    );
    Ok(dataset)
}

/// Build coordinate values, decoding CF time units when requested
fn coordinate_values(
    name: &str,
    raw: Vec<f64>,
    element: ElementType,
    attrs: &mut Attributes,
    options: &OpenOptions,
) -> Result<CoordValues> {
    let units = attrs.get("units").and_then(|u| u.as_str()).map(str::to_string);
    if let Some(units) = units.filter(|u| options.decode_times && CfUnits::is_time_units(u)) {
        let calendar_name = attrs.get("calendar").and_then(|c| c.as_str()).map(str::to_string);
        let calendar = Calendar::parse(calendar_name.as_deref())?;
        let decoded = decode_cf_times(&raw, &units, calendar)?;
        attrs.remove("units");
        attrs.remove("calendar");
        debug!("Decoded time coordinate '{}' ({} calendar)", name, calendar.name());

        return if calendar.is_standard() {
            Ok(CoordValues::Time(
                decoded.iter().map(|d| d.to_naive()).collect::<Result<_>>()?,
            ))
        } else {
            Ok(CoordValues::CfTime {
                values: decoded,
                calendar,
            })
        };
    }

    Ok(match element {
        ElementType::F64 => CoordValues::Float(raw),
        ElementType::F32 => CoordValues::Float32(raw.into_iter().map(|v| v as f32).collect()),
        _ => CoordValues::Int(raw.into_iter().map(|v| v as i64).collect()),
    })
}

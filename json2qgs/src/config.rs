//! The JSON configuration describing a map service.

use std::fs;
use std::path::Path;

use eyre::{Result, WrapErr};
use log::debug;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::Error;

/// Layer entries of this type are groups rather than data layers.
pub const GROUP_LAYER_TYPE: &str = "productset";

fn default_selection_color() -> [u8; 4] {
    [255, 255, 0, 255]
}

/// Top-level json2qgs configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "$schema", default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub layers: Vec<LayerEntry>,
    #[serde(default)]
    pub wms_top_layers: Vec<String>,
    #[serde(default)]
    pub wms_metadata: ServiceMetadata,
    #[serde(default)]
    pub wfs_metadata: ServiceMetadata,
    #[serde(default, alias = "composers")]
    pub print_templates: Vec<PrintTemplate>,
    #[serde(default = "default_selection_color")]
    pub selection_color_rgba: [u8; 4],
    #[serde(default)]
    pub default_extent: Option<[f64; 4]>,
    #[serde(default)]
    pub default_raster_extent: Option<[f64; 4]>,
}

impl Config {
    /// Reads the configuration file at the given path as a plain JSON document.
    ///
    /// Schema validation runs on this document, before it is turned into a
    /// [`Config`] with [`Config::from_json`].
    pub fn read_json<P: AsRef<Path>>(path: P) -> Result<JsonValue> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Io(path.display().to_string(), e))
            .wrap_err_with(|| Error::FailedToLoadConfig(path.to_path_buf()))?;
        let raw = serde_json::from_str::<JsonValue>(&content)
            .map_err(Error::from)
            .wrap_err_with(|| Error::FailedToLoadConfig(path.to_path_buf()))?;
        debug!("Read configuration from {}", path.display());
        Ok(raw)
    }

    /// Reads and parses the configuration file at the given path, without
    /// schema validation.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Self::from_json(Self::read_json(path)?)
            .wrap_err_with(|| Error::FailedToLoadConfig(path.to_path_buf()))?;
        debug!(
            "Loaded {} layer entries from {}",
            config.layers.len(),
            path.display()
        );
        Ok(config)
    }

    /// Builds a configuration from an already parsed JSON document.
    pub fn from_json(value: JsonValue) -> Result<Self, Error> {
        Ok(serde_json::from_value(value)?)
    }

    /// Returns the first layer entry with the given name.
    pub fn find_entry(&self, name: &str) -> Option<&LayerEntry> {
        find_entry(&self.layers, name)
    }
}

/// Returns the first entry in `entries` with the given name.
pub fn find_entry<'a>(entries: &'a [LayerEntry], name: &str) -> Option<&'a LayerEntry> {
    entries.iter().find(|entry| entry.name() == name)
}

/// An entry of the flat `layers` list: either a data layer or a group
/// ("productset") referencing other layers by name.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawLayerEntry")]
pub enum LayerEntry {
    Layer(Box<LayerConfig>),
    Group(GroupConfig),
}

impl LayerEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::Layer(layer) => &layer.name,
            Self::Group(group) => &group.name,
        }
    }
}

/// A single data layer.
#[derive(Debug, Clone)]
pub struct LayerConfig {
    pub name: String,
    pub title: String,
    pub layer_type: String,
    pub datatype: Option<String>,
    pub datasource: Datasource,
    pub bbox: Option<BoundingBox>,
    pub qml_base64: Option<String>,
    pub attributes: Vec<AttributeConfig>,
    pub qml_assets: Vec<AssetConfig>,
}

/// A group of layers, forming one level of the layer hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub name: String,
    pub title: String,
    pub group_type: String,
    pub sublayers: Vec<String>,
}

/// The four kinds of data a layer can be backed by.
#[derive(Debug, Clone, PartialEq)]
pub enum Datasource {
    Postgis(PostgisDatasource),
    Raster(RasterDatasource),
    Wms(WmsDatasource),
    Wmts(WmtsDatasource),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostgisDatasource {
    pub dbconnection: String,
    pub unique_key: String,
    pub srid: u32,
    pub geometry_type: String,
    pub schema: String,
    pub table: String,
    pub geometry_field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RasterDatasource {
    pub datasource: String,
}

/// A remote WMS (map image) source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WmsDatasource {
    pub service_url: String,
    pub layers: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub crs: Option<String>,
    #[serde(default)]
    pub styles: Option<String>,
    #[serde(default)]
    pub feature_count: Option<u32>,
    #[serde(default)]
    pub dpi_mode: Option<u32>,
}

/// A remote WMTS (map tile) source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WmtsDatasource {
    pub capabilities_url: String,
    pub layer: String,
    pub tile_matrix_set: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub crs: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub tile_dimensions: Option<String>,
    #[serde(default)]
    pub tile_pixel_ratio: Option<u32>,
    #[serde(default)]
    pub feature_count: Option<u32>,
    #[serde(default)]
    pub dpi_mode: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoundingBox {
    pub bounds: [f64; 4],
    #[serde(default)]
    pub srid: Option<u32>,
}

/// Attribute metadata used to build a layer's alias table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttributeConfig {
    pub name: String,
    #[serde(default)]
    pub alias: String,
}

impl AttributeConfig {
    pub fn new<N: Into<String>, A: Into<String>>(name: N, alias: A) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
        }
    }
}

/// A binary file embedded in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetConfig {
    pub path: String,
    pub base64: String,
}

/// An embedded print layout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PrintTemplate {
    #[serde(default)]
    pub name: String,
    #[serde(alias = "composer_base64")]
    pub template_base64: String,
    #[serde(default, alias = "composer_assets")]
    pub template_assets: Vec<AssetConfig>,
}

/// Service-wide metadata for the WMS or WFS part of a project.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceMetadata {
    pub service_name: String,
    pub service_title: String,
    pub service_abstract: String,
    pub keywords: Option<Vec<String>>,
    pub online_resource: String,
    pub contact_person: String,
    pub contact_organization: String,
    pub contact_position: String,
    pub contact_phone: String,
    pub contact_mail: String,
    pub fees: String,
    pub access_constraints: String,
    pub root_name: String,
    pub root_title: String,
    pub crs_list: Option<Vec<String>>,
    pub bbox: Option<BoundingBox>,
}

// The shape of a layer entry as it appears in the JSON document, before we
// have decided whether it is a group or which datasource it uses.
#[derive(Debug, Deserialize)]
struct RawLayerEntry {
    name: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "type", default)]
    layer_type: String,
    #[serde(default)]
    datatype: Option<String>,
    #[serde(default)]
    sublayers: Vec<String>,
    #[serde(default)]
    bbox: Option<BoundingBox>,
    #[serde(default)]
    qml_base64: Option<String>,
    #[serde(default)]
    attributes: Vec<AttributeConfig>,
    #[serde(default)]
    qml_assets: Vec<AssetConfig>,
    #[serde(default)]
    postgis_datasource: Option<PostgisDatasource>,
    #[serde(default)]
    raster_datasource: Option<RasterDatasource>,
    #[serde(default)]
    wms_datasource: Option<WmsDatasource>,
    #[serde(default)]
    wmts_datasource: Option<WmtsDatasource>,
}

impl TryFrom<RawLayerEntry> for LayerEntry {
    type Error = Error;

    fn try_from(raw: RawLayerEntry) -> Result<Self, Self::Error> {
        if raw.layer_type == GROUP_LAYER_TYPE {
            return Ok(Self::Group(GroupConfig {
                name: raw.name,
                title: raw.title,
                group_type: raw.layer_type,
                sublayers: raw.sublayers,
            }));
        }

        let mut found = Vec::new();
        if let Some(ds) = raw.postgis_datasource {
            found.push(("postgis_datasource", Datasource::Postgis(ds)));
        }
        if let Some(ds) = raw.raster_datasource {
            found.push(("raster_datasource", Datasource::Raster(ds)));
        }
        if let Some(ds) = raw.wms_datasource {
            found.push(("wms_datasource", Datasource::Wms(ds)));
        }
        if let Some(ds) = raw.wmts_datasource {
            found.push(("wmts_datasource", Datasource::Wmts(ds)));
        }
        if found.len() > 1 {
            let keys = found.iter().map(|(k, _)| *k).collect::<Vec<_>>();
            return Err(Error::AmbiguousDatasource(raw.name, keys.join(", ")));
        }
        let (_, datasource) = found
            .pop()
            .ok_or_else(|| Error::UnknownDatasource(raw.name.clone()))?;

        Ok(Self::Layer(Box::new(LayerConfig {
            name: raw.name,
            title: raw.title,
            layer_type: raw.layer_type,
            datatype: raw.datatype,
            datasource,
            bbox: raw.bbox,
            qml_base64: raw.qml_base64,
            attributes: raw.attributes,
            qml_assets: raw.qml_assets,
        })))
    }
}

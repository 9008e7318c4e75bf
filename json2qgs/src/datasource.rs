//! Translates layer datasources into the provider keys and datasource strings
//! QGIS expects.

use std::fmt;

use quick_xml::escape::escape;
use serde::Serialize;

use crate::config::{Datasource, PostgisDatasource, WmsDatasource, WmtsDatasource};
use crate::style::StyleKind;

const DEFAULT_REMOTE_CRS: &str = "EPSG:2056";
const DEFAULT_REMOTE_FORMAT: &str = "image/png";
const DEFAULT_FEATURE_COUNT: u32 = 10;
const DEFAULT_DPI_MODE: u32 = 7;
const DEFAULT_WMTS_STYLE: &str = "default";

/// QGIS data provider keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Postgres,
    Gdal,
    Wms,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Gdal => "gdal",
            Self::Wms => "wms",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether QGIS treats the layer as a vector or a raster layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Vector,
    Raster,
}

/// The encoded form of a datasource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedDatasource {
    pub provider: Provider,
    /// The datasource string, already escaped for embedding in XML.
    pub datasource: String,
    pub layer_kind: LayerKind,
}

/// Encode the given datasource.
pub fn encode_datasource(datasource: &Datasource) -> EncodedDatasource {
    match datasource {
        Datasource::Postgis(ds) => EncodedDatasource {
            provider: Provider::Postgres,
            datasource: escape(&postgis_datasource(ds)).into_owned(),
            layer_kind: LayerKind::Vector,
        },
        Datasource::Raster(ds) => EncodedDatasource {
            provider: Provider::Gdal,
            datasource: escape(&ds.datasource).into_owned(),
            layer_kind: LayerKind::Raster,
        },
        Datasource::Wms(ds) => EncodedDatasource {
            provider: Provider::Wms,
            datasource: wms_datasource(ds),
            layer_kind: LayerKind::Raster,
        },
        Datasource::Wmts(ds) => EncodedDatasource {
            provider: Provider::Wms,
            datasource: wmts_datasource(ds),
            layer_kind: LayerKind::Raster,
        },
    }
}

/// The default style to fall back to for the given datasource, if any.
///
/// Remote map services are styled by the remote server and never get one.
pub fn default_style_kind(datasource: &Datasource) -> Option<StyleKind> {
    match datasource {
        Datasource::Postgis(ds) => StyleKind::from_geometry_type(&ds.geometry_type),
        Datasource::Raster(_) => Some(StyleKind::Raster),
        Datasource::Wms(_) | Datasource::Wmts(_) => None,
    }
}

// The trailing `sql=` is where QGIS puts a layer's filter; we never set one.
fn postgis_datasource(ds: &PostgisDatasource) -> String {
    format!(
        "{db_connection} sslmode=disable key='{pkey}' srid={srid} type={geometry_type} \
         table=\"{schema}\".\"{table}\" ({geometry_column}) sql=",
        db_connection = ds.dbconnection,
        pkey = ds.unique_key,
        srid = ds.srid,
        geometry_type = ds.geometry_type,
        schema = ds.schema,
        table = ds.table,
        geometry_column = ds.geometry_field,
    )
}

fn wms_datasource(ds: &WmsDatasource) -> String {
    let feature_count = ds.feature_count.unwrap_or(DEFAULT_FEATURE_COUNT).to_string();
    let dpi_mode = ds.dpi_mode.unwrap_or(DEFAULT_DPI_MODE).to_string();
    query_string(&[
        ("contextualWMSLegend", "0"),
        ("crs", ds.crs.as_deref().unwrap_or(DEFAULT_REMOTE_CRS)),
        ("dpiMode", dpi_mode.as_str()),
        ("featureCount", feature_count.as_str()),
        ("format", ds.format.as_deref().unwrap_or(DEFAULT_REMOTE_FORMAT)),
        ("layers", ds.layers.as_str()),
        ("styles", ds.styles.as_deref().unwrap_or("")),
        ("url", ds.service_url.as_str()),
    ])
}

fn wmts_datasource(ds: &WmtsDatasource) -> String {
    let feature_count = ds.feature_count.unwrap_or(DEFAULT_FEATURE_COUNT).to_string();
    let dpi_mode = ds.dpi_mode.unwrap_or(DEFAULT_DPI_MODE).to_string();
    let tile_pixel_ratio = ds.tile_pixel_ratio.unwrap_or(0).to_string();
    query_string(&[
        ("contextualWMSLegend", "0"),
        ("crs", ds.crs.as_deref().unwrap_or(DEFAULT_REMOTE_CRS)),
        ("dpiMode", dpi_mode.as_str()),
        ("featureCount", feature_count.as_str()),
        ("format", ds.format.as_deref().unwrap_or(DEFAULT_REMOTE_FORMAT)),
        ("layers", ds.layer.as_str()),
        ("styles", ds.style.as_deref().unwrap_or(DEFAULT_WMTS_STYLE)),
        ("tileDimensions", ds.tile_dimensions.as_deref().unwrap_or("")),
        ("tileMatrixSet", ds.tile_matrix_set.as_str()),
        ("tilePixelRatio", tile_pixel_ratio.as_str()),
        ("url", ds.capabilities_url.as_str()),
    ])
}

// Values are escaped individually; the joining `&` is escaped as well since
// the whole string ends up in XML text.
fn query_string(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", key, escape(*value)))
        .collect::<Vec<String>>()
        .join("&amp;")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::RasterDatasource;

    fn postgis(table: &str, geometry_type: &str) -> Datasource {
        Datasource::Postgis(PostgisDatasource {
            dbconnection: "service=sogis_services".to_string(),
            unique_key: "t_id".to_string(),
            srid: 2056,
            geometry_type: geometry_type.to_string(),
            schema: "afu".to_string(),
            table: table.to_string(),
            geometry_field: "geometrie".to_string(),
        })
    }

    #[test]
    fn postgis_datasource_ends_with_empty_filter() {
        for (table, geometry_type) in [
            ("parcels", "MultiPolygon"),
            ("roads", "LineString"),
            ("a&b", "Point"),
        ] {
            let encoded = encode_datasource(&postgis(table, geometry_type));
            assert_eq!(encoded.provider, Provider::Postgres);
            assert_eq!(encoded.layer_kind, LayerKind::Vector);
            assert!(encoded.datasource.ends_with(" sql="), "{}", encoded.datasource);
        }
    }

    #[test]
    fn postgis_datasource_is_escaped_for_xml() {
        let encoded = encode_datasource(&postgis("parcels", "MultiPolygon"));
        assert_eq!(
            encoded.datasource,
            "service=sogis_services sslmode=disable key=&apos;t_id&apos; srid=2056 \
             type=MultiPolygon table=&quot;afu&quot;.&quot;parcels&quot; (geometrie) sql="
        );
    }

    #[test]
    fn raster_datasource_is_used_verbatim() {
        let encoded = encode_datasource(&Datasource::Raster(RasterDatasource {
            datasource: "/geodata/ortho_2019.vrt".to_string(),
        }));
        assert_eq!(encoded.provider, Provider::Gdal);
        assert_eq!(encoded.datasource, "/geodata/ortho_2019.vrt");
        assert_eq!(encoded.layer_kind, LayerKind::Raster);
    }

    #[test]
    fn wms_datasource_uses_defaults() {
        let encoded = encode_datasource(&Datasource::Wms(WmsDatasource {
            service_url: "https://wms.example.com/ows?map=base&lang=de".to_string(),
            layers: "ch.roads".to_string(),
            format: None,
            crs: None,
            styles: None,
            feature_count: None,
            dpi_mode: None,
        }));
        assert_eq!(encoded.provider, Provider::Wms);
        assert_eq!(
            encoded.datasource,
            "contextualWMSLegend=0&amp;crs=EPSG:2056&amp;dpiMode=7&amp;featureCount=10\
             &amp;format=image/png&amp;layers=ch.roads&amp;styles=\
             &amp;url=https://wms.example.com/ows?map=base&amp;lang=de"
        );
    }

    #[test]
    fn wmts_datasource_carries_tile_parameters_and_url_last() {
        let encoded = encode_datasource(&Datasource::Wmts(WmtsDatasource {
            capabilities_url: "https://wmts.example.com/1.0.0/WMTSCapabilities.xml".to_string(),
            layer: "ch.swisstopo.pixelkarte".to_string(),
            tile_matrix_set: "2056_27".to_string(),
            format: Some("image/jpeg".to_string()),
            crs: None,
            style: None,
            tile_dimensions: Some("Time=current".to_string()),
            tile_pixel_ratio: None,
            feature_count: Some(5),
            dpi_mode: None,
        }));
        assert_eq!(
            encoded.datasource,
            "contextualWMSLegend=0&amp;crs=EPSG:2056&amp;dpiMode=7&amp;featureCount=5\
             &amp;format=image/jpeg&amp;layers=ch.swisstopo.pixelkarte&amp;styles=default\
             &amp;tileDimensions=Time=current&amp;tileMatrixSet=2056_27&amp;tilePixelRatio=0\
             &amp;url=https://wmts.example.com/1.0.0/WMTSCapabilities.xml"
        );
    }

    #[test]
    fn default_style_kinds() {
        assert_eq!(
            default_style_kind(&postgis("t", "MultiLineString")),
            Some(StyleKind::LineString)
        );
        assert_eq!(
            default_style_kind(&Datasource::Raster(RasterDatasource {
                datasource: "x.tif".to_string()
            })),
            Some(StyleKind::Raster)
        );
    }
}

//! Assembly of the data handed to the project templates.

use quick_xml::escape::escape;
use serde::Serialize;

use crate::config::ServiceMetadata;
use crate::tree::{ResolvedLayer, TreeNode};

/// The coordinate reference system advertised when none is configured.
pub const DEFAULT_CRS: &str = "EPSG:2056";

fn escaped(s: &str) -> String {
    escape(s).into_owned()
}

fn escaped_list(list: &Option<Vec<String>>) -> Option<Vec<String>> {
    list.as_ref()
        .map(|items| items.iter().map(|item| escaped(item)).collect())
}

/// Template data for WMS and print projects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WmsBinding {
    pub wms_service_name: String,
    pub wms_service_title: String,
    pub wms_service_abstract: String,
    pub wms_keywords: Option<Vec<String>>,
    pub wms_url: String,
    pub wms_contact_person: String,
    pub wms_contact_organization: String,
    pub wms_contact_position: String,
    pub wms_contact_phone: String,
    pub wms_contact_mail: String,
    pub wms_fees: String,
    pub wms_access_constraints: String,
    pub wms_root_name: String,
    pub wms_root_title: String,
    pub wms_crs_list: Vec<String>,
    pub wms_extent: Option<[f64; 4]>,
    pub layertree: Vec<TreeNode>,
    pub composers: Vec<String>,
    pub selection_color: [u8; 4],
}

/// Template data for WFS projects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WfsBinding {
    pub wfs_service_title: String,
    pub wfs_service_abstract: String,
    pub wfs_keywords: Option<Vec<String>>,
    pub wfs_fees: String,
    pub wfs_access_constraints: String,
    /// Identifiers of the layers published through WFS.
    pub wfs_layers: Vec<String>,
    pub layertree: Vec<ResolvedLayer>,
    pub composers: Vec<String>,
    pub selection_color: [u8; 4],
}

/// Everything the template engine needs to render one project.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProjectBinding {
    Wms(WmsBinding),
    Wfs(WfsBinding),
}

/// Collects WMS metadata, the layer tree and decoded print layouts.
pub fn assemble_wms_binding(
    metadata: &ServiceMetadata,
    layertree: Vec<TreeNode>,
    composers: Vec<String>,
    selection_color: [u8; 4],
) -> ProjectBinding {
    ProjectBinding::Wms(WmsBinding {
        wms_service_name: escaped(&metadata.service_name),
        wms_service_title: escaped(&metadata.service_title),
        wms_service_abstract: escaped(&metadata.service_abstract),
        wms_keywords: escaped_list(&metadata.keywords),
        wms_url: escaped(&metadata.online_resource),
        wms_contact_person: escaped(&metadata.contact_person),
        wms_contact_organization: escaped(&metadata.contact_organization),
        wms_contact_position: escaped(&metadata.contact_position),
        wms_contact_phone: escaped(&metadata.contact_phone),
        wms_contact_mail: escaped(&metadata.contact_mail),
        wms_fees: escaped(&metadata.fees),
        wms_access_constraints: escaped(&metadata.access_constraints),
        wms_root_name: escaped(&metadata.root_name),
        wms_root_title: escaped(&metadata.root_title),
        wms_crs_list: metadata
            .crs_list
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_CRS.to_string()]),
        wms_extent: metadata.bbox.map(|bbox| bbox.bounds),
        layertree,
        composers,
        selection_color,
    })
}

/// Collects the reduced WFS metadata and the flat list of published layers.
pub fn assemble_wfs_binding(
    metadata: &ServiceMetadata,
    layers: Vec<ResolvedLayer>,
    selection_color: [u8; 4],
) -> ProjectBinding {
    ProjectBinding::Wfs(WfsBinding {
        wfs_service_title: escaped(&metadata.service_title),
        wfs_service_abstract: escaped(&metadata.service_abstract),
        wfs_keywords: escaped_list(&metadata.keywords),
        wfs_fees: escaped(&metadata.fees),
        wfs_access_constraints: escaped(&metadata.access_constraints),
        wfs_layers: layers.iter().map(|layer| layer.id.clone()).collect(),
        layertree: layers,
        composers: Vec::new(),
        selection_color,
    })
}

//! Assembly of the project's layer tree.

use log::debug;
use quick_xml::escape::escape;
use serde::Serialize;

use crate::asset::AssetMaterializer;
use crate::config::{find_entry, Datasource, GroupConfig, LayerConfig, LayerEntry};
use crate::datasource::{default_style_kind, encode_datasource, LayerKind, Provider};
use crate::ids::LayerIdGenerator;
use crate::style::StyleTable;

/// A data layer, ready to be rendered into a project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLayer {
    pub name: String,
    pub title: String,
    pub id: String,
    #[serde(rename = "type")]
    pub layer_type: String,
    pub layer_kind: LayerKind,
    pub datatype: Option<String>,
    pub provider: Provider,
    pub datasource: String,
    pub extent: Option<[f64; 4]>,
    pub srid: Option<u32>,
    /// QML body. `None` for layers styled by a remote service.
    pub style: Option<String>,
    /// Root attributes of the QML document.
    pub attributes: Option<String>,
}

/// A group of layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedGroup {
    #[serde(rename = "type")]
    pub group_type: String,
    pub name: String,
    pub title: String,
    pub items: Vec<ResolvedLayer>,
}

/// A node of the layer tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "lowercase")]
pub enum TreeNode {
    Layer(ResolvedLayer),
    Group(ResolvedGroup),
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            Self::Layer(layer) => &layer.name,
            Self::Group(group) => &group.name,
        }
    }
}

/// Extents used for layers without a bounding box of their own.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DefaultExtents {
    pub vector: Option<[f64; 4]>,
    pub raster: Option<[f64; 4]>,
}

impl DefaultExtents {
    fn for_kind(&self, kind: LayerKind) -> Option<[f64; 4]> {
        match kind {
            LayerKind::Vector => self.vector,
            LayerKind::Raster => self.raster.or(self.vector),
        }
    }
}

/// Resolves layer entries into tree nodes.
///
/// Every resolution of a layer performs that layer's asset writes, so a layer
/// referenced twice has its assets written twice.
pub struct TreeBuilder<'a> {
    styles: &'a StyleTable,
    assets: &'a AssetMaterializer,
    ids: &'a mut dyn LayerIdGenerator,
    extents: DefaultExtents,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(
        styles: &'a StyleTable,
        assets: &'a AssetMaterializer,
        ids: &'a mut dyn LayerIdGenerator,
        extents: DefaultExtents,
    ) -> Self {
        Self {
            styles,
            assets,
            ids,
            extents,
        }
    }

    /// Builds the tree for the given top-level layer and group names, in the
    /// order of `top_level_names`. Names that do not match any entry are
    /// skipped.
    pub fn build_tree(&mut self, top_level_names: &[String], entries: &[LayerEntry]) -> Vec<TreeNode> {
        let mut tree = Vec::new();
        for name in top_level_names {
            match find_entry(entries, name) {
                Some(LayerEntry::Group(group)) => {
                    tree.push(TreeNode::Group(self.resolve_group(group, entries)))
                }
                Some(LayerEntry::Layer(layer)) => {
                    tree.push(TreeNode::Layer(self.resolve_layer(layer)))
                }
                None => debug!("Top layer {} not found in layer list, skipping", name),
            }
        }
        tree
    }

    /// Resolves every data layer in file order, ignoring groups.
    pub fn build_flat(&mut self, entries: &[LayerEntry]) -> Vec<ResolvedLayer> {
        entries
            .iter()
            .filter_map(|entry| match entry {
                LayerEntry::Layer(layer) => Some(self.resolve_layer(layer)),
                LayerEntry::Group(group) => {
                    debug!("Skipping group {} in flat layer list", group.name);
                    None
                }
            })
            .collect()
    }

    /// Resolves a group's sublayers in the order the group lists them. Names
    /// that do not refer to a data layer are dropped.
    pub fn resolve_group(&mut self, group: &GroupConfig, entries: &[LayerEntry]) -> ResolvedGroup {
        let mut items = Vec::new();
        for sublayer in &group.sublayers {
            match find_entry(entries, sublayer) {
                Some(LayerEntry::Layer(layer)) => items.push(self.resolve_layer(layer)),
                Some(LayerEntry::Group(_)) => {
                    debug!("Group {} cannot contain group {}", group.name, sublayer)
                }
                None => debug!("Sublayer {} of group {} not found", sublayer, group.name),
            }
        }
        ResolvedGroup {
            group_type: group.group_type.clone(),
            name: escape(&group.name).into_owned(),
            title: escape(&group.title).into_owned(),
            items,
        }
    }

    /// Resolves a single data layer, writing its assets along the way.
    pub fn resolve_layer(&mut self, layer: &LayerConfig) -> ResolvedLayer {
        let encoded = encode_datasource(&layer.datasource);
        let (style, attributes) = match &layer.datasource {
            Datasource::Postgis(_) | Datasource::Raster(_) => {
                let style = self.styles.resolve_or_default(
                    &layer.name,
                    layer.qml_base64.as_deref(),
                    &layer.attributes,
                    default_style_kind(&layer.datasource),
                );
                if !layer.qml_assets.is_empty() {
                    let owner = format!("Layer: {}", layer.name);
                    self.assets.save_all(&owner, &layer.qml_assets);
                }
                (Some(style.body), Some(style.attributes))
            }
            Datasource::Wms(_) | Datasource::Wmts(_) => (None, None),
        };

        let extent = layer
            .bbox
            .map(|bbox| bbox.bounds)
            .or_else(|| self.extents.for_kind(encoded.layer_kind));
        let resolved = ResolvedLayer {
            name: escape(&layer.name).into_owned(),
            title: escape(&layer.title).into_owned(),
            id: escape(&self.ids.next_id(&layer.name)).into_owned(),
            layer_type: layer.layer_type.clone(),
            layer_kind: encoded.layer_kind,
            datatype: layer.datatype.clone(),
            provider: encoded.provider,
            datasource: encoded.datasource,
            extent,
            srid: layer.bbox.and_then(|bbox| bbox.srid),
            style,
            attributes,
        };
        debug!(
            "Resolved layer {} ({} provider)",
            resolved.name, resolved.provider
        );
        resolved
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::ids::DeterministicIds;
    use serde_json::json;

    fn styles() -> StyleTable {
        StyleTable::load(concat!(env!("CARGO_MANIFEST_DIR"), "/templates")).unwrap()
    }

    fn postgis_layer(name: &str) -> serde_json::Value {
        json!({
            "name": name,
            "title": format!("Title of {}", name),
            "type": "layer",
            "postgis_datasource": {
                "dbconnection": "service=gis",
                "unique_key": "id",
                "srid": 2056,
                "geometry_type": "MultiPolygon",
                "schema": "public",
                "table": name,
                "geometry_field": "geom"
            }
        })
    }

    fn build(config: &Config) -> Vec<TreeNode> {
        let styles = styles();
        let root = tempfile::tempdir().unwrap();
        let assets = AssetMaterializer::new(root.path());
        let mut ids = DeterministicIds::default();
        let extents = DefaultExtents {
            vector: config.default_extent,
            raster: config.default_raster_extent,
        };
        let mut builder = TreeBuilder::new(&styles, &assets, &mut ids, extents);
        builder.build_tree(&config.wms_top_layers, &config.layers)
    }

    #[test]
    fn single_layer_receives_default_extent() {
        let config = Config::from_json(json!({
            "layers": [postgis_layer("parcels")],
            "wms_top_layers": ["parcels"],
            "default_extent": [0, 0, 10, 10]
        }))
        .unwrap();
        let tree = build(&config);
        assert_eq!(tree.len(), 1);
        match &tree[0] {
            TreeNode::Layer(layer) => {
                assert_eq!(layer.name, "parcels");
                assert_eq!(layer.extent, Some([0.0, 0.0, 10.0, 10.0]));
                assert_eq!(layer.provider, Provider::Postgres);
                assert!(layer.style.as_deref().unwrap().contains("renderer-v2"));
            }
            other => panic!("expected a layer, but got {:?}", other),
        }
    }

    #[test]
    fn own_bbox_wins_over_default_extent() {
        let mut layer = postgis_layer("parcels");
        layer["bbox"] = json!({ "bounds": [1, 2, 3, 4], "srid": 2056 });
        let config = Config::from_json(json!({
            "layers": [layer],
            "wms_top_layers": ["parcels"],
            "default_extent": [0, 0, 10, 10]
        }))
        .unwrap();
        match &build(&config)[0] {
            TreeNode::Layer(layer) => {
                assert_eq!(layer.extent, Some([1.0, 2.0, 3.0, 4.0]));
                assert_eq!(layer.srid, Some(2056));
            }
            other => panic!("expected a layer, but got {:?}", other),
        }
    }

    #[test]
    fn group_drops_unknown_sublayers() {
        let config = Config::from_json(json!({
            "layers": [
                postgis_layer("roads"),
                {
                    "name": "basemap",
                    "title": "Base map",
                    "type": "productset",
                    "sublayers": ["roads", "water"]
                }
            ],
            "wms_top_layers": ["basemap"]
        }))
        .unwrap();
        let tree = build(&config);
        assert_eq!(tree.len(), 1);
        match &tree[0] {
            TreeNode::Group(group) => {
                assert_eq!(group.name, "basemap");
                assert_eq!(group.group_type, "productset");
                let names = group.items.iter().map(|l| l.name.as_str()).collect::<Vec<_>>();
                assert_eq!(names, vec!["roads"]);
            }
            other => panic!("expected a group, but got {:?}", other),
        }
    }

    #[test]
    fn tree_follows_top_layer_and_sublayer_order() {
        let config = Config::from_json(json!({
            "layers": [
                postgis_layer("a"),
                postgis_layer("b"),
                postgis_layer("c"),
                { "name": "g", "title": "G", "type": "productset", "sublayers": ["c", "a"] }
            ],
            "wms_top_layers": ["b", "g", "a", "missing"]
        }))
        .unwrap();
        let tree = build(&config);
        let names = tree.iter().map(TreeNode::name).collect::<Vec<_>>();
        assert_eq!(names, vec!["b", "g", "a"]);
        match &tree[1] {
            TreeNode::Group(group) => {
                let names = group.items.iter().map(|l| l.name.as_str()).collect::<Vec<_>>();
                assert_eq!(names, vec!["c", "a"]);
                // "a" is resolved once inside the group and once at top level.
                match &tree[2] {
                    TreeNode::Layer(a) => assert_ne!(a.id, group.items[1].id),
                    other => panic!("expected a layer, but got {:?}", other),
                }
            }
            other => panic!("expected a group, but got {:?}", other),
        }
    }

    #[test]
    fn flat_list_keeps_file_order() {
        let config = Config::from_json(json!({
            "layers": [
                postgis_layer("a"),
                postgis_layer("b"),
                { "name": "g", "title": "G", "type": "productset", "sublayers": ["a"] },
                postgis_layer("c")
            ],
            "wms_top_layers": ["c", "g"]
        }))
        .unwrap();
        let styles = styles();
        let root = tempfile::tempdir().unwrap();
        let assets = AssetMaterializer::new(root.path());
        let mut ids = DeterministicIds::default();
        let mut builder =
            TreeBuilder::new(&styles, &assets, &mut ids, DefaultExtents::default());
        let names = builder
            .build_flat(&config.layers)
            .into_iter()
            .map(|l| l.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn names_and_titles_are_escaped() {
        let mut layer = postgis_layer("a&b");
        layer["title"] = json!("Roads <main>");
        let config = Config::from_json(json!({
            "layers": [layer],
            "wms_top_layers": ["a&b"]
        }))
        .unwrap();
        match &build(&config)[0] {
            TreeNode::Layer(layer) => {
                assert_eq!(layer.name, "a&amp;b");
                assert_eq!(layer.title, "Roads &lt;main&gt;");
            }
            other => panic!("expected a layer, but got {:?}", other),
        }
    }

    #[test]
    fn remote_layers_have_no_style_and_use_raster_extent() {
        let config = Config::from_json(json!({
            "layers": [{
                "name": "ortho",
                "title": "Orthophoto",
                "type": "layer",
                "wms_datasource": { "service_url": "https://example.com/wms", "layers": "ortho" }
            }],
            "wms_top_layers": ["ortho"],
            "default_extent": [0, 0, 10, 10],
            "default_raster_extent": [0, 0, 20, 20]
        }))
        .unwrap();
        match &build(&config)[0] {
            TreeNode::Layer(layer) => {
                assert_eq!(layer.provider, Provider::Wms);
                assert!(layer.style.is_none());
                assert_eq!(layer.extent, Some([0.0, 0.0, 20.0, 20.0]));
            }
            other => panic!("expected a layer, but got {:?}", other),
        }
    }

    #[test]
    fn layer_assets_are_written_per_reference() {
        let root = tempfile::tempdir().unwrap();
        let asset_path = root.path().join("icons/marker.svg");
        let mut layer = postgis_layer("poi");
        layer["qml_assets"] = json!([{
            "path": asset_path.display().to_string(),
            "base64": "PHN2Zy8+"
        }]);
        let config = Config::from_json(json!({
            "layers": [layer],
            "wms_top_layers": ["poi"]
        }))
        .unwrap();
        let styles = styles();
        let assets = AssetMaterializer::new(root.path());
        let mut ids = DeterministicIds::default();
        let mut builder =
            TreeBuilder::new(&styles, &assets, &mut ids, DefaultExtents::default());
        builder.build_tree(&config.wms_top_layers, &config.layers);
        assert_eq!(std::fs::read_to_string(&asset_path).unwrap(), "<svg/>");
    }
}

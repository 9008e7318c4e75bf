//! json2qgs turns a JSON description of a map service (layers, styles,
//! metadata and print layouts) into QGIS project files for serving WMS, WFS
//! and print requests.
//!
//! This crate provides the library API. For the command line interface, see
//! the `json2qgs-cli` crate.

pub mod asset;
pub mod config;
pub mod datasource;
mod error;
mod fs;
mod generator;
pub mod ids;
pub mod metadata;
pub mod schema;
pub mod style;
mod template;
pub mod tree;

pub use asset::{save_asset, AssetError, AssetMaterializer};
pub use config::{Config, LayerConfig, LayerEntry};
pub use datasource::{encode_datasource, EncodedDatasource, Provider};
pub use error::Error;
pub use generator::{Generator, GeneratorOptions, Mode, QgisVersion};
pub use metadata::ProjectBinding;
pub use schema::{validate_config, HttpSchemaSource, SchemaSource, SchemaViolation};
pub use style::{resolve_style, StyleError, StyleTable};
pub use tree::{ResolvedGroup, ResolvedLayer, TreeBuilder, TreeNode};

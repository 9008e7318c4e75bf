use std::path::PathBuf;

use thiserror::Error;

use crate::schema::SchemaViolation;

/// The primary error type that can be produced by json2qgs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error {0}: {1}")]
    Io(String, std::io::Error),
    #[error("malformed JSON")]
    Json(#[from] serde_json::Error),
    #[error("failed to load configuration from {0}")]
    FailedToLoadConfig(PathBuf),
    #[error("layer \"{0}\" does not declare a recognized datasource")]
    UnknownDatasource(String),
    #[error("layer \"{0}\" declares more than one datasource: {1}")]
    AmbiguousDatasource(String, String),
    #[error("destination directory does not exist: {0}")]
    DestinationMissing(PathBuf),
    #[error("failed to load template file {0}")]
    FailedToLoadTemplate(PathBuf),
    #[error("failed to parse template \"{0}\": {1}")]
    TemplateParse(String, Box<handlebars::TemplateError>),
    #[error("failed to render template \"{0}\": {1}")]
    TemplateRender(String, handlebars::RenderError),
    #[error("failed to write output file {0}")]
    FailedToWriteOutput(PathBuf),
    #[error("unsupported QGIS version \"{0}\" (expected 2 or 3)")]
    UnsupportedQgisVersion(String),
    #[error("unsupported mode \"{0}\" (expected wms, print or wfs)")]
    UnsupportedMode(String),
    #[error("failed to fetch JSON schema from {0}: {1}")]
    SchemaFetch(String, String),
    #[error("invalid JSON schema: {0}")]
    SchemaCompile(String),
    #[error("configuration does not match its JSON schema ({} violation(s))", .0.len())]
    SchemaValidation(Vec<SchemaViolation>),
}

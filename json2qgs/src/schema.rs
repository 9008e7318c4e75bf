//! Validation of configurations against their JSON schema.

use std::fmt;
use std::fs;
use std::time::Duration;

use jsonschema::JSONSchema;
use log::{debug, error};
use serde_json::{Map, Value as JsonValue};

use crate::Error;

/// Where schema documents are loaded from.
pub trait SchemaSource {
    fn fetch(&self, url: &str) -> Result<JsonValue, Error>;
}

/// Loads schemas over HTTP(S), or from the local file system for `file://`
/// URLs and plain paths.
#[derive(Debug, Clone)]
pub struct HttpSchemaSource {
    timeout: Duration,
}

impl Default for HttpSchemaSource {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }
}

impl SchemaSource for HttpSchemaSource {
    fn fetch(&self, url: &str) -> Result<JsonValue, Error> {
        let fetch_err = |e: &dyn fmt::Display| Error::SchemaFetch(url.to_string(), e.to_string());
        let content = if url.starts_with("http://") || url.starts_with("https://") {
            debug!("Downloading JSON schema from {}", url);
            let client = reqwest::blocking::Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| fetch_err(&e))?;
            client
                .get(url)
                .send()
                .and_then(|response| response.error_for_status())
                .and_then(|response| response.text())
                .map_err(|e| fetch_err(&e))?
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            debug!("Reading JSON schema from {}", path);
            fs::read_to_string(path).map_err(|e| fetch_err(&e))?
        };
        serde_json::from_str(&content).map_err(|e| fetch_err(&e))
    }
}

/// A single place where a configuration does not match its schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Location within the configuration, e.g. `layers[3].name`.
    pub path: String,
    /// The offending value, with nested values elided.
    pub instance: String,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "(root)" } else { &self.path };
        write!(f, "{}: {} (instance: {})", path, self.message, self.instance)
    }
}

/// Validate `config` against `schema`, returning every violation found.
pub fn validate_config(schema: &JsonValue, config: &JsonValue) -> Result<(), Error> {
    let compiled =
        JSONSchema::compile(schema).map_err(|e| Error::SchemaCompile(e.to_string()))?;
    let violations = match compiled.validate(config) {
        Ok(()) => return Ok(()),
        Err(errors) => errors
            .map(|e| SchemaViolation {
                path: format_instance_path(&e.instance_path.to_string()),
                instance: truncated_instance(&e.instance),
                message: e.to_string(),
            })
            .collect::<Vec<_>>(),
    };
    for violation in &violations {
        error!("{}", violation);
    }
    Err(Error::SchemaValidation(violations))
}

/// Fetch the schema at `url` and validate `config` against it.
pub fn validate_with_source(
    source: &dyn SchemaSource,
    url: &str,
    config: &JsonValue,
) -> Result<(), Error> {
    let schema = source.fetch(url)?;
    validate_config(&schema, config)?;
    debug!("Configuration matches schema {}", url);
    Ok(())
}

/// Converts a JSON pointer such as `/layers/0/name` into `layers[0].name`.
pub fn format_instance_path(pointer: &str) -> String {
    let mut path = String::new();
    for token in pointer.split('/').skip(1) {
        let token = token.replace("~1", "/").replace("~0", "~");
        if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
            path.push_str(&format!("[{}]", token));
        } else {
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(&token);
        }
    }
    path
}

/// Renders a value with everything below its first level replaced by `"..."`.
pub fn truncated_instance(value: &JsonValue) -> String {
    let elide = |v: &JsonValue| match v {
        JsonValue::Object(_) | JsonValue::Array(_) => JsonValue::String("...".to_string()),
        other => other.clone(),
    };
    let truncated = match value {
        JsonValue::Object(obj) => JsonValue::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), elide(v)))
                .collect::<Map<String, JsonValue>>(),
        ),
        JsonValue::Array(arr) => JsonValue::Array(arr.iter().map(elide).collect()),
        other => other.clone(),
    };
    truncated.to_string()
}

//! QML style handling: decoding embedded styles, rewriting their alias table
//! from layer attribute metadata and falling back to default styles.

use std::fs;
use std::path::Path;

use base64::Engine;
use eyre::{Result, WrapErr};
use log::{debug, warn};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::config::AttributeConfig;
use crate::Error;

const ROOT_ELEMENT: &[u8] = b"qgis";
const ALIASES_ELEMENT: &[u8] = b"aliases";

/// Errors that make an embedded style unusable. Callers fall back to a
/// default style when they get one of these.
#[derive(Debug, Error)]
pub enum StyleError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("style is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("style document has no root element")]
    MissingRoot,
    #[error("unexpected root element <{0}>, expected <qgis>")]
    UnexpectedRoot(String),
    #[error("style document ends before its root element is closed")]
    Unclosed,
    #[error("style document has content after its root element")]
    TrailingContent,
}

/// The parts of a QML document needed to embed it into a project file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedStyle {
    /// Attributes of the `<qgis>` root element (except `version`), as
    /// `key="value"` pairs.
    pub attributes: String,
    /// Everything inside the `<qgis>` root element.
    pub body: String,
}

/// Decodes a base64-encoded QML document and resolves it.
pub fn resolve_base64_style(
    qml_base64: &str,
    attributes: &[AttributeConfig],
) -> Result<ResolvedStyle, StyleError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(qml_base64.trim())?;
    let qml = String::from_utf8(bytes)?;
    resolve_style(&qml, attributes)
}

/// Parses a QML document and splits it into its root attributes and body.
///
/// If `attributes` is non-empty, the document's `<aliases>` element is
/// replaced with one built from `attributes` (or added, if the document has
/// none).
pub fn resolve_style(
    qml: &str,
    attributes: &[AttributeConfig],
) -> Result<ResolvedStyle, StyleError> {
    let mut reader = Reader::from_str(qml);
    let mut writer = Writer::new(Vec::new());
    let mut root_attributes = None;
    let mut depth = 0_usize;
    let mut root_closed = false;
    // Depth at which we're skipping over an existing <aliases> element.
    let mut skipping: Option<usize> = None;
    let mut aliases_written = false;
    let rewrite_aliases = !attributes.is_empty();

    loop {
        let event = reader.read_event()?;
        match event {
            Event::Eof => break,
            // Only whitespace, comments and processing instructions may
            // follow the root element.
            _ if root_closed => match event {
                Event::Text(ref t) if t.iter().all(u8::is_ascii_whitespace) => {}
                Event::Comment(_) | Event::PI(_) => {}
                _ => return Err(StyleError::TrailingContent),
            },
            Event::Start(ref e) if depth == 0 => {
                root_attributes = Some(root_attribute_decl(e)?);
                depth = 1;
            }
            Event::Empty(ref e) if depth == 0 => {
                root_attributes = Some(root_attribute_decl(e)?);
                root_closed = true;
            }
            // Declarations, comments and the doctype outside of the root
            // element are not part of the style.
            _ if depth == 0 => {}
            Event::Start(ref e) => {
                depth += 1;
                if skipping.is_some() {
                    continue;
                }
                if rewrite_aliases && e.name().as_ref() == ALIASES_ELEMENT {
                    skipping = Some(depth);
                    if !aliases_written {
                        write_aliases(&mut writer, attributes)?;
                        aliases_written = true;
                    }
                    continue;
                }
                writer.write_event(&event)?;
            }
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    root_closed = true;
                    continue;
                }
                if let Some(skip_depth) = skipping {
                    if depth + 1 == skip_depth {
                        skipping = None;
                    }
                    continue;
                }
                writer.write_event(&event)?;
            }
            Event::Empty(ref e) => {
                if skipping.is_some() {
                    continue;
                }
                if rewrite_aliases && e.name().as_ref() == ALIASES_ELEMENT {
                    if !aliases_written {
                        write_aliases(&mut writer, attributes)?;
                        aliases_written = true;
                    }
                    continue;
                }
                writer.write_event(&event)?;
            }
            _ => {
                if skipping.is_none() {
                    writer.write_event(&event)?;
                }
            }
        }
    }

    let attributes_decl = root_attributes.ok_or(StyleError::MissingRoot)?;
    if depth > 0 {
        return Err(StyleError::Unclosed);
    }
    if rewrite_aliases && !aliases_written {
        write_aliases(&mut writer, attributes)?;
    }
    Ok(ResolvedStyle {
        attributes: attributes_decl,
        body: String::from_utf8(writer.into_inner())?,
    })
}

fn root_attribute_decl(root: &BytesStart) -> Result<String, StyleError> {
    if root.name().as_ref() != ROOT_ELEMENT {
        return Err(StyleError::UnexpectedRoot(
            String::from_utf8_lossy(root.name().as_ref()).into_owned(),
        ));
    }
    let mut pairs = Vec::new();
    for attr in root.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if key == "version" {
            continue;
        }
        let value = attr.unescape_value()?;
        pairs.push(format!(
            "{}=\"{}\"",
            key,
            quick_xml::escape::escape(value.as_ref())
        ));
    }
    Ok(pairs.join(" "))
}

fn write_aliases(
    writer: &mut Writer<Vec<u8>>,
    attributes: &[AttributeConfig],
) -> Result<(), StyleError> {
    writer.write_event(Event::Start(BytesStart::new("aliases")))?;
    for (index, attribute) in attributes.iter().enumerate() {
        let index = index.to_string();
        let display_name = display_alias(&attribute.alias);
        let alias = BytesStart::new("alias").with_attributes([
            ("field", attribute.name.as_str()),
            ("index", index.as_str()),
            ("name", display_name.as_str()),
        ]);
        writer.write_event(Event::Empty(alias))?;
    }
    writer.write_event(Event::End(BytesEnd::new("aliases")))?;
    Ok(())
}

/// Returns the display name for an attribute alias.
///
/// Aliases may be JSON objects carrying the display name in their `alias`
/// key. If such an alias cannot be parsed, or has no `alias` key, the raw
/// text is used.
pub fn display_alias(alias: &str) -> String {
    if !alias.starts_with('{') {
        return alias.to_string();
    }
    match serde_json::from_str::<JsonValue>(alias) {
        Ok(value) => match value.get("alias").and_then(JsonValue::as_str) {
            Some(display) => display.to_string(),
            None => {
                warn!("JSON alias has no \"alias\" key: '{}'", alias);
                alias.to_string()
            }
        },
        Err(e) => {
            warn!("Could not parse value as JSON: '{}': {}", alias, e);
            alias.to_string()
        }
    }
}

/// The kind of default style to use for a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleKind {
    Point,
    LineString,
    Polygon,
    Raster,
}

impl StyleKind {
    /// Determine the style kind from a geometry type such as `MultiPolygon`
    /// or `POINT`.
    pub fn from_geometry_type(geometry_type: &str) -> Option<Self> {
        let lower = geometry_type.to_lowercase();
        let single = lower.strip_prefix("multi").unwrap_or(&lower);
        match single {
            "point" => Some(Self::Point),
            "linestring" | "line" => Some(Self::LineString),
            "polygon" => Some(Self::Polygon),
            _ => None,
        }
    }

    fn file_name(&self) -> &'static str {
        match self {
            Self::Point => "point.qml",
            Self::LineString => "linestring.qml",
            Self::Polygon => "polygon.qml",
            Self::Raster => "raster.qml",
        }
    }
}

/// The built-in default styles, loaded once per run.
#[derive(Debug, Clone)]
pub struct StyleTable {
    point: String,
    linestring: String,
    polygon: String,
    raster: String,
}

impl StyleTable {
    /// Load the default styles from the given template directory.
    pub fn load<P: AsRef<Path>>(template_dir: P) -> Result<Self> {
        let dir = template_dir.as_ref();
        let read = |kind: StyleKind| -> Result<String> {
            let path = dir.join(kind.file_name());
            let content = fs::read_to_string(&path)
                .map_err(|e| Error::Io(path.display().to_string(), e))
                .wrap_err_with(|| Error::FailedToLoadTemplate(path.clone()))?;
            debug!("Loaded default style {}", path.display());
            Ok(content)
        };
        Ok(Self {
            point: read(StyleKind::Point)?,
            linestring: read(StyleKind::LineString)?,
            polygon: read(StyleKind::Polygon)?,
            raster: read(StyleKind::Raster)?,
        })
    }

    pub fn get(&self, kind: StyleKind) -> &str {
        match kind {
            StyleKind::Point => &self.point,
            StyleKind::LineString => &self.linestring,
            StyleKind::Polygon => &self.polygon,
            StyleKind::Raster => &self.raster,
        }
    }

    /// Resolve the layer's embedded style if it has one, or the default style
    /// for `kind` otherwise. Any failure is logged, never returned.
    pub fn resolve_or_default(
        &self,
        layer_name: &str,
        qml_base64: Option<&str>,
        attributes: &[AttributeConfig],
        kind: Option<StyleKind>,
    ) -> ResolvedStyle {
        if let Some(qml_base64) = qml_base64 {
            match resolve_base64_style(qml_base64, attributes) {
                Ok(style) => return style,
                Err(e) => warn!(
                    "Falling back to default style for {}: {}",
                    layer_name, e
                ),
            }
        } else {
            debug!("Layer {} has no style, using default style", layer_name);
        }

        let kind = match kind {
            Some(kind) => kind,
            None => {
                warn!("No default style available for layer {}", layer_name);
                return ResolvedStyle::default();
            }
        };
        resolve_style(self.get(kind), attributes).unwrap_or_else(|e| {
            warn!(
                "Default style {} is unusable for layer {}: {}",
                kind.file_name(),
                layer_name,
                e
            );
            ResolvedStyle::default()
        })
    }
}

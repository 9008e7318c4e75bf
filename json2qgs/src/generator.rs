//! Project generation: loads templates and default styles, builds the
//! template binding for a mode and writes the rendered project file.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use base64::Engine;
use eyre::{Result, WrapErr};
use handlebars::Handlebars;
use log::{debug, error, info};

use crate::asset::AssetMaterializer;
use crate::config::{Config, PrintTemplate};
use crate::ids::{DeterministicIds, LayerIdGenerator, RandomIds};
use crate::metadata::{assemble_wfs_binding, assemble_wms_binding, ProjectBinding};
use crate::style::StyleTable;
use crate::template::register_helpers;
use crate::tree::{DefaultExtents, TreeBuilder};
use crate::Error;

/// The kind of project to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Wms,
    Print,
    Wfs,
}

impl Mode {
    /// Name of the generated project file.
    pub fn output_file_name(&self) -> String {
        format!("somap_{}.qgs", self)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Wms => "wms",
            Self::Print => "print",
            Self::Wfs => "wfs",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wms" => Ok(Self::Wms),
            "print" | "prints" => Ok(Self::Print),
            "wfs" => Ok(Self::Wfs),
            _ => Err(Error::UnsupportedMode(s.to_string())),
        }
    }
}

/// The QGIS project file format version to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QgisVersion {
    V2,
    V3,
}

impl QgisVersion {
    fn number(&self) -> u8 {
        match self {
            Self::V2 => 2,
            Self::V3 => 3,
        }
    }
}

impl FromStr for QgisVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2" => Ok(Self::V2),
            "3" => Ok(Self::V3),
            _ => Err(Error::UnsupportedQgisVersion(s.to_string())),
        }
    }
}

/// Run options that do not come from the JSON configuration.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// Directory holding the project templates and default styles.
    pub template_dir: PathBuf,
    /// Directory the project file is written to.
    pub destination: PathBuf,
    pub qgis_version: QgisVersion,
    /// Assets may only be written below this directory. Defaults to the
    /// destination.
    pub asset_root: Option<PathBuf>,
    /// Derive layer identifiers from layer names instead of generating random
    /// ones.
    pub deterministic_ids: bool,
}

impl GeneratorOptions {
    pub fn new<P1, P2>(template_dir: P1, destination: P2, qgis_version: QgisVersion) -> Self
    where
        P1: AsRef<Path>,
        P2: AsRef<Path>,
    {
        Self {
            template_dir: template_dir.as_ref().to_path_buf(),
            destination: destination.as_ref().to_path_buf(),
            qgis_version,
            asset_root: None,
            deterministic_ids: false,
        }
    }
}

/// Generates QGIS projects from a configuration.
pub struct Generator<'a> {
    config: Config,
    options: GeneratorOptions,
    hb: Handlebars<'a>,
    styles: StyleTable,
    assets: AssetMaterializer,
}

impl<'a> Generator<'a> {
    /// Constructor. Fails if the destination directory does not exist or if
    /// any template or default style cannot be loaded.
    pub fn new(config: Config, options: GeneratorOptions) -> Result<Self> {
        if !options.destination.is_dir() {
            return Err(Error::DestinationMissing(options.destination.clone()).into());
        }

        let mut hb = Handlebars::new();
        // Every value is escaped before it reaches the templates.
        hb.register_escape_fn(handlebars::no_escape);
        register_helpers(&mut hb);
        for mode in [Mode::Wms, Mode::Wfs] {
            let name = template_name(mode, options.qgis_version);
            let path = options.template_dir.join(&name);
            let content = fs::read_to_string(&path)
                .map_err(|e| Error::Io(path.display().to_string(), e))
                .wrap_err_with(|| Error::FailedToLoadTemplate(path.clone()))?;
            hb.register_template_string(&name, content)
                .map_err(|e| Error::TemplateParse(name.clone(), Box::new(e)))?;
            debug!("Registered template {}", name);
        }
        let styles = StyleTable::load(&options.template_dir)?;
        let assets = AssetMaterializer::new(
            options
                .asset_root
                .clone()
                .unwrap_or_else(|| options.destination.clone()),
        );

        Ok(Self {
            config,
            options,
            hb,
            styles,
            assets,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn layer_ids(&self) -> Box<dyn LayerIdGenerator> {
        if self.options.deterministic_ids {
            Box::new(DeterministicIds::default())
        } else {
            Box::new(RandomIds)
        }
    }

    /// Builds the data for the template of the given mode. Writes layer and
    /// print layout assets as a side effect.
    pub fn binding(&self, mode: Mode) -> ProjectBinding {
        let mut ids = self.layer_ids();
        let extents = DefaultExtents {
            vector: self.config.default_extent,
            raster: self.config.default_raster_extent,
        };
        let mut builder = TreeBuilder::new(&self.styles, &self.assets, ids.as_mut(), extents);
        let selection_color = self.config.selection_color_rgba;

        match mode {
            Mode::Wfs => {
                let layers = builder.build_flat(&self.config.layers);
                assemble_wfs_binding(&self.config.wfs_metadata, layers, selection_color)
            }
            Mode::Wms | Mode::Print => {
                let layertree =
                    builder.build_tree(&self.config.wms_top_layers, &self.config.layers);
                let composers = if mode == Mode::Print {
                    self.print_layouts()
                } else {
                    Vec::new()
                };
                assemble_wms_binding(
                    &self.config.wms_metadata,
                    layertree,
                    composers,
                    selection_color,
                )
            }
        }
    }

    /// Decodes all print layouts and saves their assets. Layouts that cannot
    /// be decoded are skipped.
    fn print_layouts(&self) -> Vec<String> {
        let mut layouts = Vec::new();
        for template in &self.config.print_templates {
            match decode_print_layout(template) {
                Ok(layout) => layouts.push(layout),
                Err(e) => error!("Error trying to decode print layout '{}': {}", template.name, e),
            }
            let owner = format!("Print layout: {}", template.name);
            self.assets.save_all(&owner, &template.template_assets);
        }
        layouts
    }

    /// Renders the project for the given mode without writing it.
    pub fn render(&self, mode: Mode) -> Result<String> {
        let name = template_name(mode, self.options.qgis_version);
        let binding = self.binding(mode);
        Ok(self
            .hb
            .render(&name, &binding)
            .map_err(|e| Error::TemplateRender(name.clone(), e))?)
    }

    /// Renders the project for the given mode and writes it to the
    /// destination directory, returning the path of the written file.
    pub fn generate(&self, mode: Mode) -> Result<PathBuf> {
        let qgs = self.render(mode)?;
        let path = self.options.destination.join(mode.output_file_name());
        fs::write(&path, qgs)
            .map_err(|e| Error::Io(path.display().to_string(), e))
            .wrap_err_with(|| Error::FailedToWriteOutput(path.clone()))?;
        info!("Wrote {}", path.display());
        Ok(path)
    }
}

fn template_name(mode: Mode, version: QgisVersion) -> String {
    match mode {
        Mode::Wms | Mode::Print => format!("service_{}.qgs", version.number()),
        Mode::Wfs => format!("wfs_service_{}.qgs", version.number()),
    }
}

fn decode_print_layout(template: &PrintTemplate) -> Result<String> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(template.template_base64.trim())?;
    Ok(String::from_utf8(bytes)?)
}

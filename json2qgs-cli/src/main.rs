use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use eyre::{Result, WrapErr};
use json2qgs::schema::validate_with_source;
use json2qgs::{Config, Generator, GeneratorOptions, HttpSchemaSource, Mode, QgisVersion};

#[derive(Parser, Debug)]
#[clap(name = "json2qgs", about, version)]
struct Args {
    /// Increase output logging verbosity.
    #[clap(short, long)]
    verbose: bool,

    /// Directory below which embedded assets may be written (defaults to the
    /// destination directory).
    #[clap(long)]
    asset_root: Option<PathBuf>,

    /// JSON schema to validate against when the configuration does not name
    /// one in its "$schema" key.
    #[clap(long)]
    schema: Option<String>,

    /// Do not validate the configuration against its JSON schema.
    #[clap(long)]
    skip_validation: bool,

    /// Derive layer identifiers from layer names, so repeated runs produce
    /// identical projects.
    #[clap(long)]
    deterministic_ids: bool,

    /// Directory containing the QGIS project templates and default styles.
    template_dir: PathBuf,

    /// Path to the JSON configuration file.
    config: PathBuf,

    /// Kind of project to generate: wms, print or wfs.
    mode: Mode,

    /// Directory the generated project is written to.
    destination: PathBuf,

    /// QGIS project version to generate: 2 or 3.
    qgis_version: QgisVersion,
}

fn main() {
    let args = Args::parse();
    simple_logger::init_with_level(if args.verbose {
        log::Level::Debug
    } else {
        log::Level::Info
    })
    .unwrap();

    log::info!("Starting json2qgs...");
    match run(&args) {
        Ok(path) => log::info!("Generated {}", path.display()),
        Err(e) => {
            log::error!("Failed: {:#}", e);
            exit(1);
        }
    }
}

fn run(args: &Args) -> Result<PathBuf> {
    let raw = Config::read_json(&args.config)?;
    validate(args, &raw)?;
    let config = Config::from_json(raw)
        .wrap_err_with(|| format!("failed to load configuration from {}", args.config.display()))?;

    let mut options = GeneratorOptions::new(&args.template_dir, &args.destination, args.qgis_version);
    options.asset_root = args.asset_root.clone();
    options.deterministic_ids = args.deterministic_ids;
    let generator = Generator::new(config, options)?;
    generator.generate(args.mode)
}

fn validate(args: &Args, raw: &serde_json::Value) -> Result<()> {
    if args.skip_validation {
        log::info!("Skipping schema validation");
        return Ok(());
    }
    let declared = raw.get("$schema").and_then(serde_json::Value::as_str);
    match declared.or(args.schema.as_deref()) {
        Some(url) => {
            log::info!("Validating configuration {} against {}", args.config.display(), url);
            validate_with_source(&HttpSchemaSource::default(), url, raw)?;
            Ok(())
        }
        None => {
            log::warn!("Configuration has no \"$schema\", skipping schema validation");
            Ok(())
        }
    }
}

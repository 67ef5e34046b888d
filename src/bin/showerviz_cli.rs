//! ShowerViz CLI - JSON bridge over the configurator core
//!
//! Commands: validate, resolve, adjust, composite, print, fingerprint
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 on validation failure

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

use showerviz_core::{
    catalog::{CatalogSource, PlumbingSide, ProductId, ShowerTypeId},
    resolve, Catalog, Config, Design, ImageRef, ImageTransformer, LayerCompositor, PrintSheet,
    RenderCache, ResizeOptions, Validator, ENGINE_VERSION,
};

#[derive(Parser)]
#[command(name = "showerviz-cli")]
#[command(about = "ShowerViz CLI - plumbing-aware shower previews")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to catalog snapshot directory
    #[arg(short, long, default_value = "catalog")]
    catalog_dir: PathBuf,

    /// Path to config JSON
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the catalog
    Validate,

    /// Pick the variant a product shows for a plumbing side
    Resolve {
        #[arg(short, long)]
        product: ProductId,

        #[arg(long)]
        shower_type: ShowerTypeId,

        /// left or right
        #[arg(short, long)]
        side: PlumbingSide,
    },

    /// Apply mirroring and resize directives to an image reference
    Adjust {
        #[arg(short, long)]
        image: String,

        /// Side the image was authored for
        #[arg(short, long, default_value = "left")]
        orientation: PlumbingSide,

        /// Side being rendered
        #[arg(short, long)]
        side: PlumbingSide,

        /// JSON payload (ResizeOptions)
        #[arg(short, long)]
        resize: Option<String>,
    },

    /// Compute the ordered layer stack of a design
    Composite {
        #[command(flatten)]
        design: DesignArgs,
    },

    /// Print sheet of a design
    Print {
        #[command(flatten)]
        design: DesignArgs,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Fingerprint and blob of a design
    Fingerprint {
        #[command(flatten)]
        design: DesignArgs,
    },
}

#[derive(clap::Args)]
struct DesignArgs {
    /// JSON payload (Design)
    #[arg(short, long, conflicts_with = "blob")]
    payload: Option<String>,

    /// Saved design blob
    #[arg(short, long)]
    blob: Option<String>,
}

impl DesignArgs {
    /// Decode the design and put every selection back in its catalog slot.
    fn load(&self, catalog: &Catalog) -> Result<Design, String> {
        let mut design: Design = match (&self.payload, &self.blob) {
            (Some(payload), _) => {
                serde_json::from_str(payload).map_err(|e| format!("Invalid payload: {e}"))?
            }
            (None, Some(blob)) => Design::from_blob(blob).map_err(|e| e.to_string())?,
            (None, None) => return Err("Either --payload or --blob is required".to_string()),
        };
        design.check_slots(catalog);
        Ok(design)
    }
}

fn emit(value: &impl Serialize) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(format!("Serialization error: {e}")),
    }
}

fn fail(message: impl std::fmt::Display) -> ExitCode {
    error!("{message}");
    println!("{}", serde_json::json!({"success": false, "error": message.to_string()}));
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let catalog = match Catalog::load_from_dir(&cli.catalog_dir) {
        Ok(c) => c,
        Err(e) => return fail(format!("Failed to load catalog: {e}")),
    };

    match cli.command {
        Commands::Validate => {
            let result = Validator::new(config.cdn.clone(), config.failure_mode).validate(&catalog);
            if !result.valid {
                emit(&result);
                return ExitCode::from(2);
            }
            emit(&result)
        }

        Commands::Resolve { product, shower_type, side } => {
            let Some(product) = catalog.product(product) else {
                return fail(format!("Product not found: {product}"));
            };
            let Some(shower) = catalog.shower_type(shower_type) else {
                return fail(format!("Shower type not found: {shower_type}"));
            };
            emit(&resolve(&product.variants, side, shower.symmetry()))
        }

        Commands::Adjust { image, orientation, side, resize } => {
            let opts: ResizeOptions = match resize
                .as_deref()
                .map(serde_json::from_str::<ResizeOptions>)
                .transpose() {
                Ok(opts) => opts.unwrap_or_default(),
                Err(e) => return fail(format!("Invalid resize payload: {e}")),
            };
            let transformer = ImageTransformer::new(config.cdn.clone());
            emit(&transformer.adjust(&ImageRef::new(image), orientation, side, &opts))
        }

        Commands::Composite { design } => {
            let design = match design.load(&catalog) {
                Ok(d) => d,
                Err(e) => return fail(e),
            };
            let layers = LayerCompositor::from_config(&config).composite_design(
                &catalog,
                &design,
                &mut RenderCache::new(),
            );
            emit(&serde_json::json!({
                "success": true,
                "engineVersion": ENGINE_VERSION,
                "plumbingSide": design.plumbing_side(),
                "layers": layers,
            }))
        }

        Commands::Print { design, json } => {
            let design = match design.load(&catalog) {
                Ok(d) => d,
                Err(e) => return fail(e),
            };
            let layers = LayerCompositor::from_config(&config).composite_design(
                &catalog,
                &design,
                &mut RenderCache::new(),
            );
            let sheet = PrintSheet::build(&design, &catalog, &layers);
            if json {
                emit(&sheet)
            } else {
                print!("{}", sheet.render_text());
                ExitCode::SUCCESS
            }
        }

        Commands::Fingerprint { design } => {
            let design = match design.load(&catalog) {
                Ok(d) => d,
                Err(e) => return fail(e),
            };
            match (design.fingerprint(), design.to_blob()) {
                (Ok(fingerprint), Ok(blob)) => emit(&serde_json::json!({
                    "fingerprint": fingerprint,
                    "blob": blob,
                })),
                (Err(e), _) | (_, Err(e)) => fail(e),
            }
        }
    }
}

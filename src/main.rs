//! popup-resolver CLI: resolve a captured screen, manage close-icon templates.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use popup_resolver::library::DEFAULT_CATEGORY;
use popup_resolver::platform::{AndroidSnapshot, IosSnapshot, ScreenSource};
use popup_resolver::{Bounds, PopupResolver, ResolverConfig, ScreenGeometry, Screenshot, TemplateLibrary};

#[derive(Parser)]
#[command(name = "popup-resolver")]
#[command(about = "Find the dismiss point of popups in mobile UI snapshots")]
#[command(version)]
struct Cli {
    /// Template library root (defaults to the local data directory).
    #[arg(long, global = true)]
    templates: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a captured UI tree (and optional screenshot) to a tap target.
    Resolve(ResolveArgs),

    /// Manage the template library.
    #[command(subcommand)]
    Templates(TemplateCommands),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PlatformArg {
    Android,
    Ios,
}

#[derive(Debug, Args)]
struct ResolveArgs {
    /// uiautomator XML dump (android) or WDA JSON source (ios).
    #[arg(long)]
    tree: PathBuf,

    #[arg(long, value_enum, default_value_t = PlatformArg::Android)]
    platform: PlatformArg,

    /// Screen width in tree coordinates.
    #[arg(long)]
    width: u32,

    /// Screen height in tree coordinates.
    #[arg(long)]
    height: u32,

    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Crop offset of the screenshot in device pixels.
    #[arg(long, default_value_t = 0, requires = "screenshot")]
    crop_x: i32,

    #[arg(long, default_value_t = 0, requires = "screenshot")]
    crop_y: i32,

    /// JSON file overriding resolver thresholds.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Template category to search.
    #[arg(long)]
    category: Option<String>,
}

#[derive(Subcommand)]
enum TemplateCommands {
    /// List templates as JSON.
    List {
        #[arg(long)]
        category: Option<String>,
    },

    /// Add an image file as a template.
    Add {
        image: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = DEFAULT_CATEGORY)]
        category: String,
    },

    /// Crop a region out of a screenshot into a template.
    Crop {
        screenshot: PathBuf,
        #[arg(long)]
        x: i32,
        #[arg(long)]
        y: i32,
        #[arg(long)]
        width: i32,
        #[arg(long)]
        height: i32,
        /// Generated from the current time when omitted.
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = DEFAULT_CATEGORY)]
        category: String,
    },

    /// Delete a template by `category/name` or bare name.
    Delete { name: String },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let root = cli.templates.unwrap_or_else(TemplateLibrary::default_root);
    let mut library = TemplateLibrary::new(root);

    match cli.command {
        Commands::Resolve(args) => resolve(args, &mut library),
        Commands::Templates(cmd) => templates(cmd, &mut library),
    }
}

fn resolve(args: ResolveArgs, library: &mut TemplateLibrary) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ResolverConfig::from_json_file(path)?,
        None => ResolverConfig::default(),
    };
    if let Some(category) = args.category {
        config.matcher.category = category;
    }

    let raw = std::fs::read_to_string(&args.tree)
        .with_context(|| format!("reading tree {}", args.tree.display()))?;
    let geometry = ScreenGeometry::new(args.width, args.height);
    let screenshot = args
        .screenshot
        .map(|p| Screenshot::from_file(p).with_crop_offset(args.crop_x, args.crop_y));

    let source: Box<dyn ScreenSource> = match args.platform {
        PlatformArg::Android => Box::new(AndroidSnapshot {
            hierarchy_xml: raw,
            geometry,
            screenshot,
        }),
        PlatformArg::Ios => Box::new(IosSnapshot {
            source_json: raw,
            geometry,
            screenshot,
        }),
    };

    let result = PopupResolver::new(config).resolve_source(source.as_ref(), library)?;
    print_json(&result)
}

fn templates(cmd: TemplateCommands, library: &mut TemplateLibrary) -> anyhow::Result<()> {
    match cmd {
        TemplateCommands::List { category } => {
            log::info!("template library at {}", library.root().display());
            let infos = library.list(category.as_deref())?;
            print_json(&infos)
        }
        TemplateCommands::Add {
            image,
            name,
            category,
        } => {
            let img = image::open(&image)
                .with_context(|| format!("opening {}", image.display()))?;
            let path = library.add(&img, &name, &category)?;
            println!("{}", path.display());
            Ok(())
        }
        TemplateCommands::Crop {
            screenshot,
            x,
            y,
            width,
            height,
            name,
            category,
        } => {
            let img = image::open(&screenshot)
                .with_context(|| format!("opening {}", screenshot.display()))?;
            let rect = crop_rect(x, y, width, height)?;
            let name = match name {
                Some(name) => {
                    library.add_from_crop(&img, rect, &name, &category)?;
                    name
                }
                None => library.learn_from_crop(&img, rect, &category)?,
            };
            println!("{category}/{name}");
            Ok(())
        }
        TemplateCommands::Delete { name } => {
            if !library.delete(&name)? {
                anyhow::bail!("no template named {name}");
            }
            Ok(())
        }
    }
}

fn crop_rect(x: i32, y: i32, width: i32, height: i32) -> anyhow::Result<Bounds> {
    let (Some(x2), Some(y2)) = (x.checked_add(width), y.checked_add(height)) else {
        anyhow::bail!("crop {width}x{height} at ({x}, {y}) is out of range");
    };
    Ok(Bounds::new(x, y, x2, y2))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

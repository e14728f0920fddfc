use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rootcause::prelude::*;
use tracing_subscriber::EnvFilter;

use showroom::asset::{AssetDescriptor, Locator, RouterFetcher};
use showroom::codec::DecoderRegistry;
use showroom::config::{Config, PipelineConfig};
use showroom::error::LoadError;
use showroom::export::write_glb;
use showroom::models::{Node, SceneGraph};
use showroom::pipeline::{LoadGeneration, LoadObserver, LoadPhase, ModelContent, PreparedModel};
use showroom::ModelPipeline;

/// Load, optimize and export showcase models
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file. Missing keys keep their defaults.
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    /// Skip building detail levels
    #[clap(long, global = true)]
    no_lod: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a model and print what the pipeline made of it
    Inspect {
        /// File path or http(s) URL of a .glb/.gltf asset
        locator: String,
    },
    /// Write every detail level of a model as GLB
    Bake {
        locator: String,

        /// Output directory
        #[clap(short, long, default_value = ".")]
        out: PathBuf,
    },
}

/// Drives a terminal progress bar from load callbacks.
struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg:<20} [{bar:40}] {pos:>3}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self { bar }
    }
}

impl LoadObserver for ProgressObserver {
    fn on_phase(&mut self, phase: LoadPhase) {
        self.bar.set_message(phase.label());
    }

    fn on_progress(&mut self, percent: u8) {
        self.bar.set_position(u64::from(percent));
    }

    fn on_success(&mut self, _model: &PreparedModel) {
        self.bar.finish_with_message("Ready");
    }

    fn on_error(&mut self, error: &LoadError) {
        self.bar.abandon_with_message(format!("Failed ({})", error.label()));
    }
}

fn load_config(args: &Args) -> Result<PipelineConfig, Report> {
    let mut config = match &args.config {
        Some(path) => {
            Config::load(path)
                .context_with(|| format!("Failed to load config {}", path.display()))?
                .pipeline
        }
        None => PipelineConfig::default(),
    };
    if args.no_lod {
        config.build_lods = false;
    }
    Ok(config)
}

fn load_model(config: PipelineConfig, locator: &str) -> Result<PreparedModel, Report> {
    let pipeline = ModelPipeline::builder()
        .fetcher(Box::new(RouterFetcher::new()))
        .decoders(DecoderRegistry::default())
        .config(config)
        .build();
    let generation = LoadGeneration::new();
    let mut observer = ProgressObserver::new();

    let model = pipeline
        .load(
            &AssetDescriptor::new(Locator::parse(locator)),
            &generation.next(),
            &mut observer,
        )
        .context_with(|| format!("Failed to load {locator}"))?;
    Ok(model)
}

fn print_tree(node: &Node, depth: usize) {
    let indent = "  ".repeat(depth);
    match &node.mesh {
        Some(mesh) => println!(
            "{indent}{} [{} tris, {}, {}]",
            node.name,
            mesh.geometry.triangle_count(),
            mesh.class.map_or("unclassified", |c| c.as_str()),
            mesh.material.shading.label(),
        ),
        None => println!("{indent}{}", node.name),
    }
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}

fn inspect(model: &PreparedModel) {
    println!("{}", model.locator);
    if let Some(graph) = model.content.active_graph() {
        print_tree(&graph.root, 1);
        if let Some(bounds) = graph.bounds() {
            println!("bounds: {:?} .. {:?}", bounds.min, bounds.max);
        }
    }

    println!("classes:");
    for (class, count) in &model.classes.counts {
        println!("  {class}: {count}");
    }

    if let ModelContent::Lod(lod) = &model.content {
        println!("detail levels:");
        for (i, level) in lod.levels().iter().enumerate() {
            println!(
                "  {i}: from {:>5.1} units, {} triangles",
                level.distance,
                level.graph.triangle_count()
            );
        }
    }

    let counts = model.content.resource_counts();
    println!(
        "resources: {} geometries, {} materials, {} textures",
        counts.geometries, counts.materials, counts.textures
    );
}

fn write_level(graph: &SceneGraph, path: &Path) -> Result<(), Report> {
    let file = File::create(path).context_with(|| format!("Failed to create {}", path.display()))?;
    write_glb(graph, BufWriter::new(file))
        .context_with(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn bake(model: &PreparedModel, out: &Path) -> Result<(), Report> {
    fs::create_dir_all(out).context_with(|| format!("Failed to create {}", out.display()))?;
    let name = model.locator.file_name();
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model");

    for (i, graph) in model.content.graphs().into_iter().enumerate() {
        let path = out.join(format!("{stem}.lod{i}.glb"));
        write_level(graph, &path)?;
        println!("{} ({} triangles)", path.display(), graph.triangle_count());
    }
    Ok(())
}

fn main() -> Result<(), Report> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    match &args.command {
        Command::Inspect { locator } => {
            let model = load_model(config, locator)?;
            inspect(&model);
        }
        Command::Bake { locator, out } => {
            let model = load_model(config, locator)?;
            bake(&model, out)?;
        }
    }

    Ok(())
}

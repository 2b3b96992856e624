//! Hana3D pipeline CLI - drives downloads and thumbnail renders without a UI
//!
//! Provides subcommands for:
//! - `fetch`: Download an asset and place it through a headless host
//! - `thumbnail`: Render an asset thumbnail in a background renderer

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info};
use tokio_util::sync::CancellationToken;

use hana3d_pipeline::asset::{AssetDescriptor, Placement, PlacementArgs};
use hana3d_pipeline::config::{read_json_file, JsonFileStore, PipelineConfig};
use hana3d_pipeline::downloads::HttpTransport;
use hana3d_pipeline::host::{HeadlessHost, PropertyValue, ReportLevel};
use hana3d_pipeline::process::ThumbnailRequest;
use hana3d_pipeline::{scheduler, Error, Orchestrator};

#[derive(Parser, Debug)]
#[command(name = "hana3d-pipeline")]
#[command(about = "Download, place and render Hana3D assets", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/hana3d/pipeline.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download an asset and append it to a headless scene
    Fetch(FetchArgs),
    /// Render a thumbnail and print the image path
    Thumbnail(ThumbnailArgs),
}

#[derive(Parser, Debug)]
struct FetchArgs {
    /// Asset descriptor as returned by the search API (JSON)
    #[arg(short, long)]
    asset: PathBuf,

    /// Placement location as x,y,z
    #[arg(long, default_value = "0,0,0", value_parser = parse_location)]
    location: [f64; 3],

    /// Download even if the file is cached
    #[arg(long)]
    force: bool,
}

#[derive(Parser, Debug)]
struct ThumbnailArgs {
    /// Thumbnail request (JSON)
    #[arg(short, long)]
    request: PathBuf,
}

fn parse_location(s: &str) -> Result<[f64; 3], String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("'{}': {}", p, e)))
        .collect::<Result<Vec<_>, _>>()?;
    <[f64; 3]>::try_from(parts).map_err(|parts| {
        format!("expected 3 comma-separated numbers, got {}", parts.len())
    })
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, Error> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("hana3d")
            .join("pipeline.json"),
    };
    let store = JsonFileStore::open(path)?;
    Ok(PipelineConfig::load(&store))
}

/// Tick the orchestrator until it is idle or Ctrl-C is pressed
fn drive(orchestrator: &mut Orchestrator<HeadlessHost>) -> Result<(), Error> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let shutdown = CancellationToken::new();
        let interrupt = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted");
                interrupt.cancel();
            }
        });
        scheduler::run_until_idle(orchestrator, shutdown).await;
    });

    orchestrator.shutdown();
    Ok(())
}

fn fetch(config: PipelineConfig, args: FetchArgs) -> Result<ExitCode, Error> {
    let asset: AssetDescriptor = read_json_file(&args.asset)?;

    // The blocking client must be created outside the runtime
    let transport = Arc::new(HttpTransport::new()?);
    let mut orchestrator = Orchestrator::new(config, HeadlessHost::new(), transport);

    let placement = PlacementArgs {
        force: args.force,
        ..PlacementArgs::single(Placement::at(args.location))
    };
    let outcome = orchestrator.start_download(asset, placement)?;
    info!("Download request: {}", outcome);

    drive(&mut orchestrator)?;

    let host = orchestrator.host();
    for call in &host.calls {
        println!("{:?}", call);
    }
    let failed = host
        .reports
        .iter()
        .any(|(level, _)| *level == ReportLevel::Error);
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn thumbnail(config: PipelineConfig, args: ThumbnailArgs) -> Result<ExitCode, Error> {
    let request: ThumbnailRequest = read_json_file(&args.request)?;
    let status = request.status_property();

    let transport = Arc::new(HttpTransport::new()?);
    let mut orchestrator = Orchestrator::new(config, HeadlessHost::new(), transport);

    let image = orchestrator.generate_thumbnail(request)?;
    drive(&mut orchestrator)?;

    match orchestrator.host().properties.get(&status) {
        Some(PropertyValue::Text(text)) if text.ends_with("finished successfully") => {
            println!("{}", image.display());
            Ok(ExitCode::SUCCESS)
        }
        other => {
            error!("Thumbnail was not rendered: {:?}", other);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn main() -> ExitCode {
    hana3d_pipeline::log::init();
    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Fetch(args) => fetch(config, args),
        Commands::Thumbnail(args) => thumbnail(config, args),
    });

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

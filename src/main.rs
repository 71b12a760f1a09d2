use clap::{Parser, Subcommand};
use pi_control::OurResult;
use pi_control::camera::{BroadcastHub, StillCapture, StreamSupervisor, status};
use pi_control::config::Settings;
use pi_control::server;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "pi-control")]
#[command(about = "Raspberry Pi home dashboard and camera server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server
    Serve {
        /// Host to bind to, overriding the configured value
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to, overriding the configured value
        #[arg(long)]
        port: Option<u16>,
    },
    /// Camera operations
    Camera {
        #[command(subcommand)]
        action: CameraAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CameraAction {
    /// Show camera availability and capture limits
    Status,
    /// Capture a single still to a file
    Still {
        /// Capture width in pixels
        #[arg(long)]
        width: Option<u32>,
        /// Capture height in pixels
        #[arg(long)]
        height: Option<u32>,
        /// Output file path
        #[arg(long, default_value = "still.jpg")]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show configuration
    Show,
}

#[tokio::main]
async fn main() -> OurResult<()> {
    let cli = Cli::parse();

    // Initialize configuration
    let settings = match Settings::new() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing
    let log_level = if cli.debug || settings.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
        std::process::exit(1);
    }

    if cli.debug {
        debug!("Debug mode enabled");
    }

    match cli.command {
        Commands::Serve { host, port } => {
            let mut settings = settings;
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            info!("pi-control starting up");
            server::start_server(settings).await
        }
        Commands::Camera { action } => handle_camera_command(action, &settings).await,
        Commands::Config { action } => handle_config_command(action, &settings),
    }
}

async fn handle_camera_command(action: CameraAction, settings: &Settings) -> OurResult<()> {
    match action {
        CameraAction::Status => {
            let report = status::report(&settings.camera);
            println!("Camera status:");
            println!("  Online: {}", report.online);
            println!("  Capture tools installed: {}", report.libcamera_installed);
            println!("  Devices: {:?}", report.devices);
            println!(
                "  Max still: {}x{}",
                report.max_still.width, report.max_still.height
            );
            Ok(())
        }
        CameraAction::Still {
            width,
            height,
            output,
        } => {
            let hub = Arc::new(BroadcastHub::new());
            let supervisor = Arc::new(StreamSupervisor::new(settings.camera.clone(), hub));
            let still = StillCapture::new(settings.camera.clone(), supervisor);

            let image = still.capture(width, height).await?;
            std::fs::write(&output, &image.data)?;
            info!(
                "Captured {}x{} still ({} bytes) to {}",
                image.width,
                image.height,
                image.data.len(),
                output.display()
            );
            Ok(())
        }
    }
}

fn handle_config_command(action: ConfigAction, settings: &Settings) -> OurResult<()> {
    match action {
        ConfigAction::Show => {
            println!("Configuration:");
            println!("  Host: {}", settings.host);
            println!("  Port: {}", settings.port);
            println!("  Debug: {}", settings.debug);
            println!("  Public directory: {}", settings.public_directory.display());
            println!("  Stills directory: {}", settings.stills_directory.display());
            println!(
                "  Stream: {}x{} @ {} fps",
                settings.camera.stream_width, settings.camera.stream_height, settings.camera.framerate
            );
            println!(
                "  Weather: {}, {} (cache {} min)",
                settings.weather_latitude, settings.weather_longitude, settings.weather_cache_minutes
            );
            Ok(())
        }
    }
}

//! Zephyr Server - HTTP server for location-aware LLM answers
//!
//! This binary loads the text generation engine, then serves `POST /ask-zephyr`.
//! If the engine fails to load the process exits without serving.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use zephyr_server::{
    config::ServerConfig,
    engine::load_engine,
    error::{ServerError, ServerResult},
    server::ZephyrServer,
};

/// Command line arguments
#[derive(Parser)]
#[command(
    name = "zephyr-server",
    about = "Location-aware LLM ask server",
    long_about = "An HTTP server that answers prompts with a local Zephyr chat model, adding the user's nearby place as context when the prompt is about their surroundings."
)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Server bind address (overrides the configuration file)
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Start,
    /// Generate a default configuration file
    Config {
        /// Output file path
        #[arg(short, long, default_value = "zephyr-server.toml")]
        output: PathBuf,
        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show server information
    Info,
}

#[tokio::main]
async fn main() -> ServerResult<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let result = match &args.command {
        Some(Commands::Config { output, force }) => generate_config(output, *force),
        Some(Commands::Validate { config }) => validate_config(config),
        Some(Commands::Info) => {
            show_info();
            Ok(())
        }
        Some(Commands::Start) | None => start_server(&args).await,
    };

    if let Err(e) = &result {
        error!("{}", e);
    }
    result
}

/// Initialize logging based on command line arguments
fn init_logging(args: &Args) -> ServerResult<()> {
    let log_level = args
        .log_level
        .parse::<Level>()
        .map_err(|_| ServerError::Config(format!("Invalid log level: {}", args.log_level)))?;

    let mut env_filter = EnvFilter::from_default_env();
    for target in ["zephyr_server", "zephyr_core", "tower_http"] {
        let directive = format!("{}={}", target, log_level)
            .parse()
            .map_err(|e| ServerError::Config(format!("Invalid log directive: {}", e)))?;
        env_filter = env_filter.add_directive(directive);
    }

    if args.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().compact())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().pretty())
            .with(env_filter)
            .init();
    }

    Ok(())
}

fn load_config(args: &Args) -> ServerResult<ServerConfig> {
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {:?}", config_path);
        ServerConfig::from_file(config_path)
            .map_err(|e| ServerError::Config(format!("Failed to load config: {}", e)))?
    } else {
        info!("Using default configuration");
        ServerConfig::default()
    };

    if let Some(bind) = &args.bind {
        config.bind = bind
            .parse()
            .map_err(|e| ServerError::Config(format!("Invalid bind address: {}", e)))?;
    }

    Ok(config)
}

/// Load the engine, then serve until shutdown
async fn start_server(args: &Args) -> ServerResult<()> {
    info!("Starting Zephyr Server v{}", zephyr_server::VERSION);

    let config = load_config(args)?;
    info!("Server configuration:");
    info!("  Bind address: {}", config.bind);
    info!("  Model: {} ({:?})", config.engine.model_name, config.engine.model_path);
    info!("  Device: {:?}", config.engine.device);
    info!("  Queue capacity: {}", config.worker.queue_capacity);

    let engine = load_engine(&config.engine).await?;
    let server = ZephyrServer::new(config, engine)?;

    server.start().await
}

/// Generate a default configuration file
fn generate_config(output: &PathBuf, force: bool) -> ServerResult<()> {
    if output.exists() && !force {
        error!("Configuration file already exists: {:?}", output);
        error!("Use --force to overwrite");
        return Err(ServerError::Config("Configuration file already exists".to_string()));
    }

    ServerConfig::default()
        .to_file(output)
        .map_err(|e| ServerError::Config(format!("Failed to write config: {}", e)))?;

    info!("Generated default configuration file: {:?}", output);
    Ok(())
}

/// Validate a configuration file
fn validate_config(config_path: &PathBuf) -> ServerResult<()> {
    info!("Validating configuration file: {:?}", config_path);

    let config = ServerConfig::from_file(config_path)
        .map_err(|e| ServerError::Config(format!("Invalid configuration: {}", e)))?;

    info!("Configuration is valid");
    info!("  Bind address: {}", config.bind);
    info!("  Model path: {:?}", config.engine.model_path);
    info!("  Tokenizer path: {:?}", config.engine.tokenizer_path);
    info!("  Queue capacity: {}", config.worker.queue_capacity);
    Ok(())
}

/// Show server information
fn show_info() {
    println!("Zephyr Server v{}", zephyr_server::VERSION);
    println!("Answers prompts with a local chat model, adding nearby-place context");
    println!();
    println!("Endpoints:");
    println!("  POST /ask-zephyr     Generate a response");
    println!("  GET  /health         Liveness");
    println!("  GET  /health/ready   Generation worker readiness");
    println!();
    println!("Configuration:");
    println!("  • Default bind address: 0.0.0.0:8000");
    println!("  • Default model: ./models/zephyr-7b-alpha.Q4_K_M.gguf");
    println!("  • Environment overrides: ZEPHYR__ENGINE__MODEL_PATH, ...");
    println!();
    println!("Usage:");
    println!("  zephyr-server                       # Start with default config");
    println!("  zephyr-server -c config.toml        # Start with custom config");
    println!("  zephyr-server config                # Generate default config");
    println!("  zephyr-server validate config.toml  # Validate config file");
}

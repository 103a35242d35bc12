use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use wayfarer_core::config::{Config, LoggingConfig};
use wayfarer_core::types::Coordinate;
use wayfarer_guide::client::HttpInferenceGateway;
use wayfarer_guide::{GuideSession, QuestionOutcome, SessionSettings};

mod probe;

use probe::{HostInputs, probe};

#[derive(Parser)]
#[command(
    name = "wayfarer",
    about = "Camera-and-voice tour guide: ask about what you see, hear the answer",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the analysis gateway
    Serve {
        /// Port to listen on (default: 3000)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Ask one question about a photo
    Ask {
        /// Still image standing in for the camera
        #[arg(long)]
        image: PathBuf,

        /// Typed question
        #[arg(long, conflicts_with = "audio", required_unless_present = "audio")]
        question: Option<String>,

        /// Recorded question (.wav, or raw 16 kHz mono .pcm)
        #[arg(long)]
        audio: Option<PathBuf>,

        /// Latitude of the current position
        #[arg(long, requires = "lng", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude of the current position
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lng: Option<f64>,

        /// Gateway base URL (default: from config)
        #[arg(long)]
        gateway: Option<String>,

        /// Write the spoken answer to this audio file
        #[arg(long)]
        speak_to: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose common issues
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (secrets redacted)
    Show,
}

/// Initialize tracing from the logging section; `RUST_LOG` wins.
fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = logging
        .level
        .clone()
        .unwrap_or_else(|| if verbose { "debug" } else { "info" }.to_string());
    let directives = std::iter::once(level)
        .chain(logging.filters.iter().cloned())
        .collect::<Vec<_>>()
        .join(",");
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    let writer = if logging.output == "stdout" {
        BoxMakeWriter::new(std::io::stdout)
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Replace every `api_key` value with a placeholder.
fn redact(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if key == "api_key" && v.is_string() {
                    *v = serde_json::Value::String("********".into());
                } else {
                    redact(v);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}

async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let (warnings, errors) = config.validate();
    for w in &warnings {
        tracing::warn!("{w}");
    }
    if !errors.is_empty() {
        anyhow::bail!("Invalid configuration: {}", errors.join("; "));
    }

    let port = port.unwrap_or_else(|| config.gateway_port());
    let base_url = config.model.as_ref().and_then(|m| m.base_url.clone());
    let model =
        wayfarer_providers::google::GeminiProvider::new(base_url.as_deref(), config.request_timeout())?;

    let state = wayfarer_gateway::GatewayState::new(Arc::new(config), Arc::new(model));

    #[cfg(feature = "metrics")]
    let state = state.with_metrics(wayfarer_gateway::metrics::install_prometheus_recorder()?);

    tracing::info!("Starting Wayfarer gateway on port {port}");
    wayfarer_gateway::start_gateway(Arc::new(state), port).await
}

async fn ask(config: Config, inputs: HostInputs, gateway: Option<String>) -> anyhow::Result<()> {
    let gateway_url = gateway.unwrap_or_else(|| config.gateway_url());
    let client = HttpInferenceGateway::new(&gateway_url, config.request_timeout())?;
    tracing::debug!(endpoint = client.endpoint(), "Using inference gateway");

    let capabilities = probe(&config, &inputs);
    let missing = capabilities.missing();
    if !missing.is_empty() {
        tracing::info!(?missing, "Some capabilities are unavailable");
    }

    let session = GuideSession::new(
        capabilities,
        Arc::new(client),
        SessionSettings::from_config(&config),
    );

    if let Err(e) = session.start().await {
        eprintln!("{}", e.user_message());
        anyhow::bail!("{e}");
    }
    let state = session.state();
    if state.current_coordinate.is_none() {
        if !state.last_error.is_empty() {
            eprintln!("{}", state.last_error);
        }
        anyhow::bail!("No position fix: pass --lat and --lng");
    }

    let outcome = session.listen_once().await;
    let state = session.state();
    match outcome {
        Some(QuestionOutcome::Answered(text)) => {
            println!("問：{}", state.last_question);
            println!("答：{text}");
            session.finish_speaking().await;
        }
        Some(QuestionOutcome::Failed(message)) => {
            eprintln!("{message}");
            anyhow::bail!("Question failed");
        }
        Some(QuestionOutcome::Skipped) | None => {
            if !state.last_error.is_empty() {
                eprintln!("{}", state.last_error);
            }
            anyhow::bail!("No question was heard");
        }
    }

    session.shutdown();
    Ok(())
}

async fn doctor(config: &Config, config_path: &std::path::Path) -> anyhow::Result<()> {
    println!("Wayfarer v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "Config: {} ({})",
        config_path.display(),
        if config_path.exists() { "found" } else { "not found, using defaults" }
    );

    let (warnings, errors) = config.validate();
    for w in &warnings {
        println!("  warning: {w}");
    }
    for e in &errors {
        println!("  error: {e}");
    }

    println!("Capabilities (without --image/--lat/--lng/--question):");
    let capabilities = probe(config, &HostInputs::default());
    for (capability, present) in capabilities.report() {
        println!("  {capability:<20} {}", if present { "present" } else { "absent" });
    }

    let health_url = format!("{}/health", config.gateway_url().trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(3))
        .build()?;
    match client.get(&health_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            println!(
                "Gateway: reachable at {health_url} (model {})",
                body["model"].as_str().unwrap_or("unknown")
            );
        }
        Ok(resp) => println!("Gateway: {health_url} answered {}", resp.status()),
        Err(_) => println!("Gateway: not reachable at {health_url}"),
    }

    if !errors.is_empty() {
        anyhow::bail!("{} configuration error(s)", errors.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    init_logging(&config.logging.clone().unwrap_or_default(), cli.verbose);

    match cli.command {
        Commands::Serve { port } => serve(config, port).await?,
        Commands::Ask {
            image,
            question,
            audio,
            lat,
            lng,
            gateway,
            speak_to,
        } => {
            let position = lat.zip(lng).map(|(lat, lng)| Coordinate::new(lat, lng));
            let inputs = HostInputs {
                image: Some(image),
                question,
                audio,
                position,
                speak_to,
            };
            ask(config, inputs, gateway).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let mut value = serde_json::to_value(&config)?;
                redact(&mut value);
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
        },
        Commands::Doctor => doctor(&config, &config_path).await?,
    }

    Ok(())
}

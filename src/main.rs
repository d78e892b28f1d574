use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, Subcommand};
use http::{Method, header::CONTENT_TYPE};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use anyhow::anyhow;

use live_gateway::core::audio::{CaptureBackend, PlaybackBackend};
use live_gateway::core::live::fetch_discovery;
use live_gateway::{ServerConfig, VoicePhase, VoiceSession, routes, state::AppState};

/// Live Gateway - Realtime voice relay server
#[derive(Parser, Debug)]
#[command(name = "live-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the relay gateway
    Serve,

    /// Hold a voice conversation through a running gateway
    Talk {
        /// Gateway live endpoint
        #[arg(long, default_value = "ws://localhost:3001/ws/gemini-live")]
        gateway: String,

        /// Gateway HTTP origin serving /api/config
        #[arg(long, default_value = "http://localhost:3001")]
        api: String,

        /// Prebuilt voice name
        #[arg(long)]
        voice: Option<String>,

        /// System instruction for the model
        #[arg(long)]
        instruction: Option<String>,

        /// Input device name (see --list-devices)
        #[arg(long)]
        device: Option<String>,

        /// List input devices and exit
        #[arg(long)]
        list_devices: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // Parse CLI arguments
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cli.config).await,
        Commands::Talk {
            gateway,
            api,
            voice,
            instruction,
            device,
            list_devices,
        } => {
            if list_devices {
                return print_input_devices();
            }
            talk(gateway, api, voice, instruction, device).await
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    // Load configuration from file or environment
    let config = if let Some(config_path) = config_path {
        println!("Loading configuration from {}", config_path.display());
        ServerConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    let address = config.address();
    let tls_config = config.tls.clone();
    let cors_origins = config.cors_allowed_origins.clone();
    info!(
        live_path = %config.live_path,
        voice_service_url = %config.voice_service_url(),
        static_token = config.upstream_access_token.is_some(),
        "Starting live gateway on {address}"
    );
    if config.forwards_directive_to_hosted_endpoint() {
        warn!(
            voice_service_url = %config.voice_service_url(),
            "Routing directives are forwarded upstream, but hosted live endpoints expect setup as the first frame; set FORWARD_ROUTING_DIRECTIVE=false when relaying to them"
        );
    }
    if config.upstream_allowed_hosts.is_empty() {
        warn!("UPSTREAM_ALLOWED_HOSTS is empty; directives may route the upstream token to any host");
    }

    // Create application state
    let app_state = AppState::new(config);

    // Configure CORS
    let cors_layer = if let Some(ref origins) = cors_origins {
        if origins == "*" {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE])
                .allow_credentials(false)
        } else {
            // Parse comma-separated origins
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE])
                .allow_credentials(true)
        }
    } else {
        info!(
            "CORS not configured, defaulting to same-origin only. \
             Set CORS_ALLOWED_ORIGINS to enable cross-origin access."
        );
        CorsLayer::new()
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE])
            .allow_credentials(false)
    };

    // Security headers
    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_CONTENT_TYPE_OPTIONS,
            http::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_FRAME_OPTIONS,
            http::HeaderValue::from_static("DENY"),
        ));

    let app = routes::create_app(app_state)
        .layer(cors_layer)
        .layer(security_headers);

    // Parse socket address
    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    // Start server with or without TLS
    if let Some(tls) = tls_config {
        let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
            .await
            .map_err(|e| {
                anyhow!(
                    "Failed to load TLS certificates from {} and {}: {}",
                    tls.cert_path.display(),
                    tls.key_path.display(),
                    e
                )
            })?;

        println!("Server listening on https://{} (TLS enabled)", socket_addr);

        axum_server::bind_rustls(socket_addr, rustls_config)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|e| anyhow!("TLS server error: {}", e))?;
    } else {
        println!("Server listening on http://{}", socket_addr);

        let listener = TcpListener::bind(&socket_addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
    }

    Ok(())
}

#[cfg(feature = "native-audio")]
fn audio_backends() -> (Box<dyn CaptureBackend>, Box<dyn PlaybackBackend>) {
    use live_gateway::core::audio::{CpalCaptureBackend, CpalPlaybackBackend};
    (
        Box::new(CpalCaptureBackend::new()),
        Box::new(CpalPlaybackBackend::new()),
    )
}

/// Without device support nothing drains the playback buffer; the talk loop
/// discards queued model audio on every tick.
#[cfg(not(feature = "native-audio"))]
fn audio_backends() -> (Box<dyn CaptureBackend>, Box<dyn PlaybackBackend>) {
    use live_gateway::core::audio::{ChannelCaptureBackend, PullPlaybackBackend};
    println!("Built without the native-audio feature; running text-only.");
    let (capture, _feed) = ChannelCaptureBackend::pair_with_devices(Vec::new());
    (Box::new(capture), Box::new(PullPlaybackBackend::new()))
}

#[cfg(feature = "native-audio")]
fn print_input_devices() -> anyhow::Result<()> {
    for name in live_gateway::core::audio::native::list_input_devices()? {
        println!("{name}");
    }
    Ok(())
}

#[cfg(not(feature = "native-audio"))]
fn print_input_devices() -> anyhow::Result<()> {
    anyhow::bail!("Device listing requires the native-audio feature")
}

async fn talk(
    gateway: String,
    api: String,
    voice: Option<String>,
    instruction: Option<String>,
    device: Option<String>,
) -> anyhow::Result<()> {
    let discovered = fetch_discovery(&api).await?;
    let mut session_config = discovered.voice_session_config()?;
    if let Some(voice) = voice {
        session_config = session_config.with_voice(voice);
    }
    if let Some(instruction) = instruction {
        session_config = session_config.with_system_instruction(instruction);
    }

    let (capture, playback) = audio_backends();
    let session = VoiceSession::new(
        gateway,
        discovered.voice_service_url(),
        session_config,
        capture,
        playback,
    )?;
    session.set_input_device(device);
    session.start().await?;
    println!("Connected. Type a message and press enter, or Ctrl-C to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let mut printed = 0usize;

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if !line.trim().is_empty() => {
                    session.send_text(line.trim()).await?;
                }
                Some(_) => {}
                None => break,
            },
            _ = ticker.tick() => {
                #[cfg(not(feature = "native-audio"))]
                session.player().buffer().clear();

                // An entry is final once another speaker follows it.
                let transcript = session.transcript();
                let complete = transcript.len().saturating_sub(1);
                for entry in transcript.iter().take(complete).skip(printed) {
                    println!("{}: {}", entry.role, entry.text);
                }
                printed = printed.max(complete);
                if session.status().phase == VoicePhase::Disconnected {
                    println!("Session closed.");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    for entry in session.transcript().iter().skip(printed) {
        println!("{}: {}", entry.role, entry.text);
    }
    session.end().await;
    if let Some(error) = session.status().last_error {
        println!("Last error: {error}");
    }
    Ok(())
}

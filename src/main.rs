use facegate::{
    ConsentCategory, Config, DevMode, FaceBox, FileConsentStore, Frame, FrameSize, Mode, RemoteMatcher,
    SessionManager, SessionState,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "facegate")]
#[command(about = "Consent-gated face authentication sessions")]
struct Cli {
    /// Enable development mode (keeps consent data and sockets local)
    #[arg(long, global = true)]
    dev: bool,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print the effective values
    CheckConfig,
    /// Manage a user's consent flags
    Consent {
        #[command(subcommand)]
        action: ConsentAction,
    },
    /// Drive one session from a JSON file of captured frames
    Run {
        #[arg(short, long)]
        user: String,
        #[arg(short, long, value_enum, default_value = "verify")]
        mode: CliMode,
        /// JSON array of frames: {"width", "height", "face", "payload_path"}
        #[arg(short, long)]
        frames: PathBuf,
        /// Print the full token instead of only its fingerprint
        #[arg(long)]
        print_token: bool,
    },
    /// Verify and decode a token issued with the configured secret
    InspectToken {
        #[arg(short, long)]
        token: String,
    },
}

#[derive(Subcommand)]
enum ConsentAction {
    Grant {
        #[arg(short, long)]
        user: String,
        #[arg(long, default_value = "facial_data")]
        category: ConsentCategory,
    },
    Revoke {
        #[arg(short, long)]
        user: String,
        #[arg(long, default_value = "facial_data")]
        category: ConsentCategory,
    },
    Show {
        #[arg(short, long)]
        user: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CliMode {
    Enroll,
    Verify,
}

impl From<CliMode> for Mode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Enroll => Mode::Enroll,
            CliMode::Verify => Mode::Verify,
        }
    }
}

#[derive(Deserialize)]
struct FrameSpec {
    width: u32,
    height: u32,
    #[serde(default)]
    face: Option<FaceBox>,
    #[serde(default)]
    payload_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on mode
    setup_logging(cli.dev);

    let dev_mode = DevMode::new(cli.dev)?;
    let config = load_config(cli.config.as_ref(), &dev_mode)?;

    match cli.command {
        Commands::CheckConfig => {
            config.validate()?;
            println!("✅ Configuration is valid\n");
            println!("{}", toml::to_string_pretty(&redacted(&config))?);
        }
        Commands::Consent { action } => {
            let store = FileConsentStore::new_with_dev_mode(&config.consent, &dev_mode)?;
            match action {
                ConsentAction::Grant { user, category } => {
                    store.set_consent(&user, category, true)?;
                    println!("✅ Granted {} for {}", category, user);
                }
                ConsentAction::Revoke { user, category } => {
                    store.set_consent(&user, category, false)?;
                    println!("Revoked {} for {}", category, user);
                }
                ConsentAction::Show { user } => {
                    let state = store.load(&user)?;
                    println!("{}", serde_json::to_string_pretty(&state)?);
                }
            }
        }
        Commands::Run { user, mode, frames, print_token } => {
            run_session(config, &dev_mode, &user, mode.into(), &frames, print_token).await?;
        }
        Commands::InspectToken { token } => {
            if config.token.secret.is_empty() {
                anyhow::bail!("No token secret configured; tokens from other processes cannot be verified");
            }
            let issuer = facegate::core::TokenIssuer::new(&config.token)?;
            let claims = issuer.decode(&token)?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
    }

    Ok(())
}

async fn run_session(
    config: Config,
    dev_mode: &DevMode,
    user: &str,
    mode: Mode,
    frames: &PathBuf,
    print_token: bool,
) -> Result<()> {
    let specs: Vec<FrameSpec> = serde_json::from_str(
        &std::fs::read_to_string(frames).with_context(|| format!("Failed to read {}", frames.display()))?,
    )
    .with_context(|| format!("Failed to parse {}", frames.display()))?;

    let matcher = Arc::new(RemoteMatcher::from_config(&config.matcher, dev_mode));
    let consent = Arc::new(FileConsentStore::new_with_dev_mode(&config.consent, dev_mode)?);
    tracing::info!("Using matcher at {}", matcher.socket_path().display());

    let manager = SessionManager::new(config, matcher, consent)?;
    let handle = manager.start(user, mode).await?;

    if handle.state == SessionState::Denied {
        println!("❌ Session denied: {}", handle.deny_reason.unwrap_or_default());
        return Ok(());
    }
    println!("Session {} started for {} ({})", handle.id, user, mode);

    for (index, spec) in specs.into_iter().enumerate() {
        let payload = match &spec.payload_path {
            Some(path) => std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?,
            None => Vec::new(),
        };
        let frame = Frame::new(payload, FrameSize::new(spec.width, spec.height), spec.face);

        match manager.submit_frame(handle.id, frame).await {
            Ok(outcome) => {
                println!(
                    "Frame {}: {} (quality {:.2}, {} attempts left)",
                    index + 1,
                    outcome.state,
                    outcome.quality_score,
                    outcome.attempts_remaining
                );
                if let Some(reason) = outcome.rejection {
                    println!("   Rejected locally: {:?}", reason);
                }
                for suggestion in &outcome.suggestions {
                    println!("   💡 {}", suggestion);
                }
                if outcome.state.is_terminal() {
                    break;
                }
            }
            Err(e) if e.is_retryable() => {
                println!("Frame {}: {} (retrying with next frame)", index + 1, e);
            }
            Err(e) => {
                println!("Frame {}: {}", index + 1, e);
                break;
            }
        }
    }

    let status = manager.status(handle.id)?;
    if let Some(report) = &status.last_quality {
        println!("Last frame: {}", report.get_quality_assessment());
    }
    match manager.get_token(handle.id) {
        Ok(token) => {
            println!("✅ {} succeeded after {} attempt(s)", mode, status.attempts);
            println!("   Token {} expires at {}", token.fingerprint(), token.expires_at());
            if print_token {
                println!("{}", token.value());
            }
        }
        Err(e) => {
            println!("❌ Session ended in {}: {}", status.state, e);
            if status.state == SessionState::AwaitingFrame {
                manager.abort(handle.id)?;
            }
        }
    }

    Ok(())
}

fn load_config(explicit: Option<&PathBuf>, dev_mode: &DevMode) -> Result<Config> {
    if let Some(path) = explicit {
        return Ok(Config::load_from_path(path)?);
    }

    let installed = dev_mode.config_file();
    if installed.exists() {
        return Ok(Config::load_from_path(&installed)?);
    }
    if std::path::Path::new("configs/facegate.toml").exists() {
        return Ok(Config::load()?);
    }

    tracing::warn!("No config file found, using built-in defaults");
    Ok(Config::default())
}

fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    if !config.token.secret.is_empty() {
        config.token.secret = "<redacted>".to_string();
    }
    config
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}

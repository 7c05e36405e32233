//! keyfob - keep a gallery API session alive from the command line.
//!
//! Logs in using cached tokens, refresh grants, or a stored password, and
//! offers a few read-only gallery lookups on top of the resulting session.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use keyfob_core::api::GalleryClient;
use keyfob_core::auth::{AuthError, TokenCache};
use keyfob_core::config::{BackendKind, Config};
use keyfob_core::secrets::{store_credential, SecretKey, StoredCredential};
use keyfob_core::utils::{fmt_member_tag, illust_url, member_url, MemberAliases};

/// Directory for the optional rolling log file
const LOG_DIR_ENV: &str = "KEYFOB_LOG_DIR";

const LOG_FILE_PREFIX: &str = "keyfob.log";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// More output on stderr (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (defaults to the user config directory)
    #[arg(short, long, env = "KEYFOB_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Keep tokens in memory only; nothing is read from or written to disk
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Make sure a usable token exists, logging in if needed
    Login,
    /// Show the cached token's owner and expiry
    Status,
    /// Forget the cached token
    Logout,
    /// Store the login password in the credential backend
    StorePassword { login: String },
    /// Show one work's details
    Illust {
        id: u64,
        /// Page mode for the printed link
        #[arg(long, default_value = keyfob_core::utils::DEFAULT_ILLUST_MODE)]
        mode: String,
    },
    /// Show a member's profile
    Member { id: u64 },
    /// List one page of a member's works
    Works {
        member: u64,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 30)]
        per_page: u32,
    },
    /// Print the tag used for a member's files
    Tag { id: u64, name: String },
    /// Write the current settings to the config file
    InitConfig {
        /// Replace an existing config file
        #[arg(long)]
        force: bool,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the log file on drop and must outlive `main`'s work.
fn init_tracing(verbose: u8) -> Option<WorkerGuard> {
    // RUST_LOG wins unless -v was given
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let (file_layer, guard) = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match cli.config {
        Some(ref path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env();
            config
        }
        None => Config::load()?,
    };
    if cli.ephemeral {
        config.token_backend = BackendKind::Memory;
    }
    debug!(?config, "configuration loaded");
    Ok(config)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;

    match cli.command {
        Command::Login => {
            let mut client = GalleryClient::from_config(&config)?;
            let token = client.authenticate()?;
            println!(
                "Logged in to {} as user {} (token valid until {})",
                config.display_name,
                token.subject_id,
                token.expires_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
            );
        }
        Command::Status => {
            let tokens = TokenCache::new(config.open_backend(config.token_backend)?, &config.token_domain);
            match tokens.load()? {
                Some(token) if token.is_valid() => {
                    let left = token.time_until_expiry();
                    println!(
                        "{}: user {}, token expires in {}m{:02}s",
                        config.display_name,
                        token.subject_id,
                        left.num_minutes(),
                        left.num_seconds() % 60
                    );
                }
                Some(token) => println!(
                    "{}: user {}, token expired at {}",
                    config.display_name,
                    token.subject_id,
                    token.expires_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
                ),
                None => println!("{}: no cached token", config.display_name),
            }
        }
        Command::Logout => {
            let tokens = TokenCache::new(config.open_backend(config.token_backend)?, &config.token_domain);
            tokens.forget()?;
            info!(key = %tokens.key(), "token forgotten");
            println!("Forgot cached token for {}", config.display_name);
        }
        Command::StorePassword { ref login } => {
            let store = config.open_backend(config.credential_backend)?;
            let key = SecretKey::new(
                config.credential_namespace.as_str(),
                config.credential_host.as_str(),
            );

            let secret = rpassword::prompt_password(format!("Password for {}: ", login))
                .context("Failed to read password")?;
            if secret.is_empty() {
                anyhow::bail!("Empty password, nothing stored");
            }
            let credential = StoredCredential {
                login: login.clone(),
                secret,
                account: None,
            };
            store_credential(store.as_ref(), &key, &credential)
                .with_context(|| format!("Failed to store credential in {}", store.name()))?;
            println!("Stored credential for {} in {}", key, store.name());
        }
        Command::Illust { id, ref mode } => {
            let mut client = GalleryClient::from_config(&config)?;
            print_json(&client.illust_info(id)?)?;
            println!("{}", illust_url(id, mode));
        }
        Command::Member { id } => {
            let mut client = GalleryClient::from_config(&config)?;
            let member = client.member_info(id)?;
            print_json(&member)?;
            println!("{}", member_url(id));
        }
        Command::Works {
            member,
            page,
            per_page,
        } => {
            let mut client = GalleryClient::from_config(&config)?;
            print_json(&client.member_works(member, page, per_page)?)?;
        }
        Command::Tag { id, ref name } => {
            let aliases = MemberAliases::load(&MemberAliases::default_path()?)?;
            println!("{}", fmt_member_tag(&aliases, id, name));
        }
        Command::InitConfig { force } => {
            let path = match cli.config {
                Some(ref path) => path.clone(),
                None => Config::config_path()?,
            };
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to replace it)", path.display());
            }
            match cli.config {
                Some(ref path) => config.save_to(path)?,
                None => config.save()?,
            }
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

fn is_exhausted(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<AuthError>())
        .any(AuthError::is_exhausted)
}

fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if is_exhausted(&e) {
                // Already logged by the session; keep the message short
                eprintln!("keyfob: {}", e);
            } else {
                eprintln!("keyfob: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

//! # Mastodoff CLI (`mastodoff`)
//!
//! Runs the web interface and exposes the same operations from the command
//! line.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mastodoff init` | Create the SQLite database and schema |
//! | `mastodoff login` | Register the app and obtain an access token |
//! | `mastodoff add <username>` | Fetch, embed and store an account's statuses |
//! | `mastodoff get <username>` | Print a stored account's statuses |
//! | `mastodoff accounts` | List stored accounts |
//! | `mastodoff predict <u1> <u2> <text>` | Guess which account wrote `text` |
//! | `mastodoff reset --yes` | Drop all stored data |
//! | `mastodoff serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! mastodoff --config ./config/mastodoff.toml init
//! mastodoff add @Gargron@mastodon.social --count 200
//! mastodoff predict Gargron@mastodon.social someone@example.social "Toots are posts"
//! mastodoff serve
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use mastodoff::config::{self, Config};
use mastodoff::context::AppContext;
use mastodoff::logging::{init_logging, LogLevel};
use mastodoff::mastodon::MastodonClient;
use mastodoff::text::plain_text;
use mastodoff::{db, ingest, lookup, migrate, predict, server, store};

/// Mastodoff: which of two Mastodon accounts wrote this?
#[derive(Parser)]
#[command(
    name = "mastodoff",
    version,
    about = "Mastodoff: which of two Mastodon accounts wrote this?",
    long_about = "Mastodoff stores the public statuses of Mastodon accounts together with \
    sentence embeddings of their text, and trains a logistic regression on two stored \
    accounts to predict which one more likely wrote a given piece of text."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mastodoff.toml")]
    config: PathBuf,

    /// Log debug output.
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Only log errors.
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Log level (error, warn, info, debug, off). Overrides --verbose and --quiet.
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `accounts` and `statuses`
    /// tables. Running it again is harmless.
    Init,

    /// Register the app with the instance and log in.
    ///
    /// Needs `mastodon.username` in the config and the password in the
    /// environment variable named by `mastodon.password_env`. Credentials are
    /// cached in `mastodon.secret_file` and `mastodon.token_file`.
    Login,

    /// Fetch an account's statuses, embed them and store them.
    Add {
        /// Account handle, e.g. `@user@instance.social`.
        username: String,

        /// Number of most recent statuses to fetch. Defaults to
        /// `ingest.default_count`, or all statuses.
        #[arg(long)]
        count: Option<usize>,
    },

    /// Print a stored account and its statuses.
    Get {
        username: String,

        /// Print at most this many statuses.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List stored accounts.
    Accounts,

    /// Predict which of two stored accounts wrote a piece of text.
    Predict {
        username1: String,
        username2: String,
        /// The text to attribute.
        content: String,
    },

    /// Delete every stored account and status.
    Reset {
        /// Confirm the reset.
        #[arg(long)]
        yes: bool,
    },

    /// Start the HTTP server on `server.bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(
        cli.log_level
            .unwrap_or(LogLevel::from_flags(cli.quiet, cli.verbose)),
    );

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Login => {
            run_login(&cfg).await?;
        }
        Commands::Add { username, count } => {
            let ctx = AppContext::from_config(cfg).await?;
            let report = ingest::add_account(&ctx, &username, count).await?;
            println!("add {}", report.account.acct);
            println!("  fetched: {}", report.fetched);
            println!("  stored: {}", report.stored);
            println!("  unchanged: {}", report.unchanged);
            println!("  skipped: {}", report.skipped);
            println!("ok");
        }
        Commands::Get { username, limit } => {
            let ctx = AppContext::from_config(cfg).await?;
            let (account, statuses) = lookup::get_db_account_with_statuses(&ctx, &username).await?;
            println!("--- Account ---");
            println!("id:       {}", account.id);
            println!("username: {}", account.username);
            println!("acct:     {}", account.acct);
            println!("url:      {}", account.url);
            println!();
            println!("--- Statuses ({}) ---", statuses.len());
            for status in statuses.iter().take(limit.unwrap_or(usize::MAX)) {
                println!("[{}] {}", status.id, status.uri);
                println!("{}", plain_text(&status.content));
                println!();
            }
        }
        Commands::Accounts => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            let accounts = store::list_accounts(&pool).await?;
            pool.close().await;
            if accounts.is_empty() {
                println!("No accounts stored.");
            }
            for account in accounts {
                println!(
                    "{:<40} {:>6} statuses  {}",
                    account.acct, account.status_count, account.url
                );
            }
        }
        Commands::Predict {
            username1,
            username2,
            content,
        } => {
            let ctx = AppContext::from_config(cfg).await?;
            let prediction =
                predict::predict_account(&ctx, &username1, &username2, &content).await?;
            println!("{}", prediction.account);
            println!(
                "  probability: {:.3} (vs {})",
                prediction.probability, prediction.other.acct
            );
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("Refusing to reset without --yes: this deletes every stored account and status");
            }
            let pool = db::connect(&cfg).await?;
            migrate::reset_database(&pool).await?;
            pool.close().await;
            println!("Database reset.");
        }
        Commands::Serve => {
            let ctx = AppContext::from_config(cfg).await?;
            server::run_server(ctx).await?;
        }
    }

    Ok(())
}

async fn run_login(cfg: &Config) -> Result<()> {
    if cfg.mastodon.username.is_none() {
        bail!("mastodon.username must be set to log in");
    }
    let client = MastodonClient::anonymous(&cfg.mastodon)?;
    client.ensure_token(&cfg.mastodon).await?;
    println!(
        "Logged in to {}; token stored in {}",
        cfg.mastodon.api_base_url,
        cfg.mastodon.token_file.display()
    );
    Ok(())
}

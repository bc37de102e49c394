//! Venue console - drive the session engine from a terminal.
//!
//! Runs against an in-memory identity backend seeded from a JSON fixture
//! file (or the bundled demo accounts).
//!
//! # Usage
//!
//! ```bash
//! # Sign in as the demo waiter and check two routes
//! venue sign-in -e waiter@venue.test -p waiter-pass --path /dashboard/waiter/tables --path /dashboard/owner
//!
//! # Landing route per role
//! venue routes
//!
//! # Menu for a role
//! venue menu --role cook
//!
//! # Why a role may or may not open a path
//! venue access --role waiter --path /dashboard/waiter/../owner
//! ```
//!
//! `VENUE_LOG_FORMAT`, `VENUE_FIXTURES`, `VENUE_CLOCK_SKEW_MS` and the
//! `VENUE_*_TIMEOUT_MS` variables are read from the environment or a `.env`
//! file.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use venue_auth::Role;
use venue_observability::LogFormat;
use venue_session::SessionConfig;

mod commands;
mod fixtures;

use fixtures::Fixtures;

#[derive(Parser)]
#[command(name = "venue")]
#[command(author, version, about = "Venue session console")]
struct Cli {
    /// Log output format (`json` or `pretty`)
    #[arg(long, env = "VENUE_LOG_FORMAT", default_value = "pretty", global = true)]
    log_format: LogFormat,

    /// Account fixtures (JSON); defaults to the bundled demo accounts
    #[arg(long, env = "VENUE_FIXTURES", global = true)]
    fixtures: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and print the resulting session view
    SignIn {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,

        /// Paths to run through the route guard
        #[arg(long = "path")]
        paths: Vec<String>,
    },
    /// Create an account with its profile
    SignUp {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        /// National document number (positive)
        #[arg(long)]
        document: i64,

        /// Profile role (`waiter`, `cook`, `registeredcustomer`, ...)
        #[arg(short, long)]
        role: Option<Role>,
    },
    /// Print the landing route and title of every role
    Routes,
    /// Print the navigation menu of a role
    Menu {
        #[arg(short, long)]
        role: Role,
    },
    /// Explain an access decision
    Access {
        /// Omit for a session without a role
        #[arg(short, long)]
        role: Option<Role>,

        #[arg(long)]
        path: String,
    },
}

#[tokio::main]
async fn main() {
    // Missing .env is fine; real environment variables still apply.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    venue_observability::tracing::init(cli.log_format);

    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Routes => commands::navigation::routes(),
        Commands::Menu { role } => commands::navigation::menu(role),
        Commands::Access { role, path } => commands::navigation::access(role, &path),
        Commands::SignIn {
            email,
            password,
            paths,
        } => {
            let (fixtures, config) = session_inputs(cli.fixtures)?;
            commands::session::sign_in(&fixtures, &config, &email, &password, &paths).await
        }
        Commands::SignUp {
            email,
            password,
            first_name,
            last_name,
            document,
            role,
        } => {
            let (fixtures, config) = session_inputs(cli.fixtures)?;
            let args = commands::session::SignUpArgs {
                email,
                password,
                first_name,
                last_name,
                document_number: document,
                role,
            };
            commands::session::sign_up(&fixtures, &config, args).await
        }
    }
}

fn session_inputs(path: Option<PathBuf>) -> anyhow::Result<(Fixtures, SessionConfig)> {
    let fixtures = Fixtures::load(path.as_deref())?;
    let config = SessionConfig::from_env().context("reading session configuration")?;
    Ok((fixtures, config))
}

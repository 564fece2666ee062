//! userdesk - command-line client for the user service.
//!
//! Log in or register, then list, create, update, and delete users. The
//! session token is saved between runs; when the server rejects it the
//! token is dropped and the next command asks you to log in again.

mod app;

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use userdesk_core::{ApiError, UserId};

#[derive(Parser)]
#[command(name = "userdesk", version, about = "Manage users on the userdesk service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and save the session
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Create an account and sign in with it
    Register {
        #[arg(long)]
        full_name: String,
        #[arg(short, long)]
        username: String,
    },
    /// Forget the saved session
    Logout,
    /// Show who the saved session belongs to
    Whoami,
    /// Manage users
    #[command(subcommand)]
    Users(UsersCommand),
}

#[derive(Subcommand)]
enum UsersCommand {
    /// List all users
    List,
    /// Create a user (the password is prompted for)
    Create {
        #[arg(long)]
        full_name: String,
        #[arg(short, long)]
        username: String,
    },
    /// Update a user; omitted fields keep their current values
    Update {
        id: String,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(short, long)]
        username: Option<String>,
        /// Prompt for a new password
        #[arg(long)]
        password: bool,
    },
    /// Delete a user
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (writer, guard) = tracing_appender::non_blocking(io::stderr());
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing();
    info!("userdesk starting");

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<()> {
    let mut app = App::new()?;

    match command {
        Command::Login { username } => app.login(username).await,
        Command::Register { full_name, username } => app.register(&full_name, &username).await,
        Command::Logout => app.logout(),
        Command::Whoami => app.whoami(),
        Command::Users(UsersCommand::List) => app.list_users().await,
        Command::Users(UsersCommand::Create { full_name, username }) => {
            let password = App::prompt_password("Password for new user: ")?;
            app.create_user(&full_name, &username, &password).await
        }
        Command::Users(UsersCommand::Update {
            id,
            full_name,
            username,
            password,
        }) => {
            let password = if password {
                Some(App::prompt_password("New password (blank keeps current): ")?)
            } else {
                None
            };
            app.update_user(&UserId::from(id.as_str()), full_name, username, password)
                .await
        }
        Command::Users(UsersCommand::Delete { id, yes }) => {
            app.delete_user(&UserId::from(id.as_str()), yes).await
        }
    }
}

/// Print a failure the way the app's alerts word it
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<ApiError>() {
        Some(api_err) => {
            error!(error = %api_err, "Command failed");
            eprintln!("Error: {}", api_err.user_message());
            if api_err.is_session_expired() {
                eprintln!("Run `userdesk login` to sign in again.");
            }
        }
        None => eprintln!("Error: {:#}", err),
    }
}

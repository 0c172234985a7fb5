mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_account_login, cmd_account_logout, cmd_account_show, cmd_add, cmd_delete, cmd_edit,
    cmd_import, cmd_list, cmd_watch,
};
use crate::config::Config;
use gastos_core::store::SqliteStore;

#[derive(Parser)]
#[command(
    name = "gastos",
    version,
    about = "A simple expense tracker CLI",
    long_about = "Controle de Gastos: keep a running list and total of your expenses."
)]
struct Cli {
    /// Act as this user instead of the signed-in one
    #[arg(long, global = true)]
    user: Option<String>,
    /// Database file to use (default: the data directory's gastos.db)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show all expenses, most recent first, with the total
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive list that updates whenever the expenses change
    Watch {
        /// How often to check for changes made by other processes, in milliseconds
        #[arg(long, default_value = "500")]
        poll_ms: u64,
    },
    /// Record a new expense
    Add {
        /// What the money was spent on
        description: String,
        /// Amount spent
        #[arg(allow_hyphen_values = true)]
        value: f64,
        /// Date (YYYY-MM-DD, DD/MM/YYYY, or today/yesterday; default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change an existing expense
    Edit {
        /// Expense ID
        id: String,
        /// New description
        #[arg(long)]
        description: Option<String>,
        /// New amount
        #[arg(long, allow_hyphen_values = true)]
        value: Option<f64>,
        /// New date (YYYY-MM-DD, DD/MM/YYYY, or today/yesterday)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an expense by ID
    Delete {
        /// Expense ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import expense documents from a JSON array
    Import {
        /// Path to the JSON file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the signed-in user
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Sign in as a user
    Login {
        /// User ID
        #[arg(value_name = "USER")]
        user_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sign out
    Logout {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the signed-in user
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("GASTOS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?.with_db_override(cli.db.clone());
    // Resolved per command so `account login` can replace an unreadable session.
    let user = || config.resolve_user(cli.user.as_deref());
    let open_store = || {
        debug!(db = %config.db_path.display(), "opening store");
        SqliteStore::open(&config.db_path)
    };

    match cli.command {
        Commands::List { json } => cmd_list(open_store()?, user()?, json).await,
        Commands::Watch { poll_ms } => {
            cmd_watch(open_store()?, user()?, Duration::from_millis(poll_ms.max(10))).await
        }
        Commands::Add {
            description,
            value,
            date,
            json,
        } => cmd_add(&open_store()?, user()?, &description, value, date, json),
        Commands::Edit {
            id,
            description,
            value,
            date,
            json,
        } => cmd_edit(&open_store()?, user()?, &id, description, value, date, json),
        Commands::Delete { id, json } => cmd_delete(open_store()?, user()?, &id, json).await,
        Commands::Import { file, json } => cmd_import(&open_store()?, user()?, &file, json),
        Commands::Account { command } => match command {
            AccountCommands::Login { user_id, json } => cmd_account_login(&config, &user_id, json),
            AccountCommands::Logout { json } => cmd_account_logout(&config, json),
            AccountCommands::Show { json } => cmd_account_show(&config, user()?.as_ref(), json),
        },
    }
}

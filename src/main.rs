use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::Level;

use gedpro::commands;
use gedpro::config::{self, BackendKind, ConfigState, Overrides};
use gedpro::db::Database;
use gedpro::models::{DocumentStatus, DocumentSummary};
use gedpro::services::platform::SignUpOutcome;
use gedpro::services::state::{AppState, UrlAction};
use gedpro::utils::format_amount;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Backend {
    Hosted,
    Local,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Status {
    Draft,
    Validated,
    Archived,
}

impl From<Status> for DocumentStatus {
    fn from(status: Status) -> Self {
        match status {
            Status::Draft => DocumentStatus::Draft,
            Status::Validated => DocumentStatus::Validated,
            Status::Archived => DocumentStatus::Archived,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "gedpro", version, about = "Commercial document management client")]
struct Cli {
    /// Directory holding the local database and blobs
    #[arg(long = "data-dir", global = true)]
    data_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "hosted", global = true)]
    backend: Backend,

    /// Platform URL, overrides the stored one
    #[arg(long = "platform-url", global = true)]
    platform_url: Option<String>,

    /// Public API key, overrides the stored one
    #[arg(long = "api-key", global = true)]
    api_key: Option<String>,

    /// -v for debug, -vv for trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Platform settings
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Sign up, sign in and out
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Print a blank document to fill in
    New,
    /// Recompute and print the totals of a document file
    Totals { document: PathBuf },
    /// Upload a file with its document data
    Submit { document: PathBuf, file: PathBuf },
    /// List documents, newest first
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, value_enum)]
        status: Option<Status>,
    },
    /// Open a document in the default viewer
    View { id: String },
    /// Download a document
    Download {
        id: String,
        /// Only print the signed URL
        #[arg(long)]
        print: bool,
    },
    /// Delete a document and its file
    Delete { id: String },
    /// Show document counts and the sum of grand totals
    Dashboard,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Store the public API key, encrypted
    SetKey { key: String },
    /// Store the platform URL
    SetUrl { url: String },
    /// Print the stored settings with the key masked
    Show,
    /// Check that the platform answers
    Test,
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Create an account
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign in with e-mail and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Print the signed-in user
    Whoami,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Command::New => return print_json(&commands::documents::new_document()),
        Command::Totals { document } => {
            let document = commands::documents::compute_totals(document).await.map_err(|e| anyhow!(e))?;
            return print_json(&document);
        }
        _ => {}
    }

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&data_dir).with_context(|| format!("Data dir {}", data_dir.display()))?;
    let db = Database::new(data_dir.join("gedpro.sqlite"))?;

    if let Command::Config(command) = &cli.command {
        if !matches!(command, ConfigCommand::Test) {
            return run_config(command, &db);
        }
    }

    let backend = match cli.backend {
        Backend::Hosted => BackendKind::Hosted,
        Backend::Local => BackendKind::Local,
    };
    let overrides = Overrides {
        platform_url: cli.platform_url.clone(),
        api_key: cli.api_key.clone(),
    }
    .or(Overrides::from_env());

    let config = match config::resolve(backend, data_dir, overrides, &db)? {
        ConfigState::Configured(config) => config,
        ConfigState::NotConfigured(reason) => {
            eprintln!("GED Pro is not configured: {}", reason);
            eprintln!("Run `gedpro config set-url <URL>` and `gedpro config set-key <KEY>`, or use --backend local.");
            std::process::exit(2);
        }
    };

    if let Command::Config(ConfigCommand::Test) = &cli.command {
        if config.backend == BackendKind::Local {
            println!("Local backend, nothing to test.");
            return Ok(());
        }
        let ok = commands::settings::test_connection(&config).await.map_err(|e| anyhow!(e))?;
        println!("{}", if ok { "Connection OK" } else { "Connection refused by the platform" });
        return Ok(());
    }

    let state = AppState::build(config, Arc::new(Mutex::new(db)))?;
    run(cli.command, &state).await
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gedpro")
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_config(command: &ConfigCommand, db: &Database) -> anyhow::Result<()> {
    match command {
        ConfigCommand::SetKey { key } => {
            commands::settings::save_api_key(db, key).map_err(|e| anyhow!(e))?;
            println!("API key saved.");
        }
        ConfigCommand::SetUrl { url } => {
            let url = commands::settings::save_platform_url(db, url).map_err(|e| anyhow!(e))?;
            println!("Platform URL set to {}", url);
        }
        ConfigCommand::Show => {
            let settings = commands::settings::get_settings(db).map_err(|e| anyhow!(e))?;
            println!("platform_url: {}", settings.platform_url.as_deref().unwrap_or("-"));
            println!("api_key:      {}", settings.platform_api_key.as_deref().unwrap_or("-"));
            println!("bucket:       {}", settings.bucket);
            println!("table:        {}", settings.table);
        }
        ConfigCommand::Test => {}
    }
    Ok(())
}

async fn run(command: Command, state: &AppState) -> anyhow::Result<()> {
    use commands::{auth, dashboard, documents};

    match command {
        Command::Auth(AuthCommand::Signup { email, password }) => {
            match auth::sign_up(state, &email, &password).await.map_err(|e| anyhow!(e))? {
                SignUpOutcome::SignedIn(session) => {
                    println!("Account created, signed in as {}", session.user.email.unwrap_or(session.user.id));
                }
                SignUpOutcome::ConfirmationRequired(_) => {
                    println!("Account created. Check your e-mail to confirm it, then log in.");
                }
            }
        }
        Command::Auth(AuthCommand::Login { email, password }) => {
            let session = auth::sign_in(state, &email, &password).await.map_err(|e| anyhow!(e))?;
            println!("Signed in as {}", session.user.email.unwrap_or(session.user.id));
        }
        Command::Auth(AuthCommand::Logout) => {
            auth::sign_out(state).await.map_err(|e| anyhow!(e))?;
            println!("Signed out.");
        }
        Command::Auth(AuthCommand::Whoami) => match auth::whoami(state).await.map_err(|e| anyhow!(e))? {
            Some(session) => println!("{}", session.user.email.unwrap_or(session.user.id)),
            None => println!("Not signed in."),
        },
        Command::Submit { document, file } => {
            let summary = documents::submit_document(state, &document, file)
                .await
                .map_err(|e| anyhow!(e))?;
            println!("Document saved: {} ({})", summary.display_name, summary.id);
        }
        Command::List { search, status } => {
            let list = documents::list_documents(state, search.as_deref(), status.map(Into::into))
                .await
                .map_err(|e| anyhow!(e))?;
            print_list(&list);
        }
        Command::View { id } => {
            let link = documents::document_link(state, &id, UrlAction::View)
                .await
                .map_err(|e| anyhow!(e))?;
            open::that(&link.url).with_context(|| format!("Opening {}", link.file_name))?;
        }
        Command::Download { id, print } => {
            let link = documents::document_link(state, &id, UrlAction::Download)
                .await
                .map_err(|e| anyhow!(e))?;
            if print {
                println!("{}\t{}", link.file_name, link.url);
            } else {
                open::that(&link.url).with_context(|| format!("Downloading {}", link.file_name))?;
            }
        }
        Command::Delete { id } => {
            documents::delete_document(state, &id).await.map_err(|e| anyhow!(e))?;
            println!("Document deleted.");
        }
        Command::Dashboard => {
            let stats = dashboard::get_dashboard_stats(state).await.map_err(|e| anyhow!(e))?;
            println!("Documents:  {}", stats.total);
            println!("Brouillon:  {}", stats.draft);
            println!("Validé:     {}", stats.validated);
            println!("Archivé:    {}", stats.archived);
            println!("Total TTC:  {}", format_amount(stats.total_amount));
        }
        Command::Config(_) | Command::New | Command::Totals { .. } => {}
    }
    Ok(())
}

fn print_list(list: &[DocumentSummary]) {
    if list.is_empty() {
        println!("No documents.");
        return;
    }
    for doc in list {
        println!(
            "{}  {:<10}  {:<24}  {:<24}  {:>14} {}  {}",
            doc.id,
            doc.date,
            doc.display_name,
            doc.counterparty,
            format_amount(doc.grand_total),
            doc.currency,
            doc.status.as_str()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn every_subcommand_has_help() {
        let cli = Cli::command();
        for command in cli.get_subcommands() {
            assert!(command.get_about().is_some(), "{} has no help", command.get_name());
            for nested in command.get_subcommands() {
                assert!(nested.get_about().is_some(), "{} has no help", nested.get_name());
            }
        }
    }
}

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::{error, info, warn};

mod catalog;
mod commands;
mod config;
mod errors;
mod list;
mod restore;
mod workflow;

#[derive(Parser)]
#[command(name = "pg-restore-service")]
#[command(about = "A Rust-based restore service for PostgreSQL backup archives", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available backup archives, most recent first
    List {
        /// Return data as JSON (for scripting)
        #[arg(short, long)]
        json: bool,
    },
    /// Restore an archive into a freshly created database
    Restore {
        /// Archive filename to restore (interactive selection when omitted)
        #[arg(short, long)]
        archive: Option<String>,
        /// Suffix appended to the source database name (default: _restore)
        #[arg(short, long)]
        suffix: Option<String>,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
        /// Return the stage report as JSON (for scripting, never prompts; requires --archive)
        #[arg(short, long)]
        json: bool,
    },
    /// Generate sample .env file
    Init,
}

fn init_logging() -> Result<(), crate::errors::RestoreServiceError> {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt::writer::MakeWriterExt, EnvFilter};

    // Create logs directory if it doesn't exist
    std::fs::create_dir_all("./logs")?;

    let file_appender = rolling::daily("./logs", "pg-restore.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Console output goes to stderr so JSON on stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr.and(non_blocking))
        .with_env_filter(env_filter)
        .init();

    // Keep the guard alive
    std::mem::forget(_guard);

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging first
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Operation failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, errors::RestoreServiceError> {
    // Load configuration for all commands except init
    let config = match &cli.command {
        Commands::Init => None,
        _ => Some(config::Config::load()?),
    };

    match cli.command {
        Commands::List { json } => {
            list::list_archives(&config.unwrap(), json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Restore {
            archive,
            suffix,
            yes,
            json,
        } => restore::restore_interactive(config.unwrap(), archive, suffix, yes, json).await,
        Commands::Init => {
            init_env_file()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_env_file() -> Result<(), errors::RestoreServiceError> {
    use std::fs;
    use std::path::Path;

    let env_file = ".env";
    if Path::new(env_file).exists() {
        warn!(file = %env_file, ".env file already exists, not overwriting");
        return Ok(());
    }

    let content = r#"# PostgreSQL Restore Service Configuration
# Fill in your actual values below

# Directory scanned for <db>_backup_<timestamp>.sql.gz archives
BACKUP_DIR=/backups

# Target database server connection
TARGET_DB_HOST=db
TARGET_DB_PORT=5432
TARGET_DB_USER=postgres

# Required for restores; list works without it
TARGET_DB_PASSWORD=your_database_password_here

# Optional: per-command timeout in seconds (0 disables the bound)
# RESTORE_COMMAND_TIMEOUT_SECS=3600
"#;

    fs::write(env_file, content)?;
    info!(file = %env_file, "Created sample .env file, please edit with your actual credentials");

    Ok(())
}

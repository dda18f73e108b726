use crate::errors::{RestoreServiceError, Result};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BACKUP_DIR: &str = "/backups";
const DEFAULT_DB_HOST: &str = "db";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_USER: &str = "postgres";
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 3600;

/// Connection settings for the target database server
#[derive(Clone)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// May be absent; restores refuse to run until it is provided
    pub password: Option<String>,
}

impl fmt::Debug for DbSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backup_dir: PathBuf,
    pub database: DbSettings,
    /// Upper bound for each external command; None disables the bound
    pub command_timeout: Option<Duration>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let backup_dir = env::var("BACKUP_DIR").unwrap_or_else(|_| DEFAULT_BACKUP_DIR.to_string());

        let host = env::var("TARGET_DB_HOST").unwrap_or_else(|_| DEFAULT_DB_HOST.to_string());
        let port = match env::var("TARGET_DB_PORT") {
            Ok(raw) => Self::parse_port(&raw)?,
            Err(_) => DEFAULT_DB_PORT,
        };
        let user = env::var("TARGET_DB_USER").unwrap_or_else(|_| DEFAULT_DB_USER.to_string());

        // No default here; an empty value counts as unset
        let password = env::var("TARGET_DB_PASSWORD").ok().filter(|p| !p.is_empty());

        let command_timeout = match env::var("RESTORE_COMMAND_TIMEOUT_SECS") {
            Ok(raw) => Self::parse_timeout(&raw)?,
            Err(_) => Some(Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS)),
        };

        Ok(Config {
            backup_dir: PathBuf::from(backup_dir),
            database: DbSettings {
                host,
                port,
                user,
                password,
            },
            command_timeout,
        })
    }

    fn parse_port(raw: &str) -> Result<u16> {
        raw.trim().parse::<u16>().map_err(|_| {
            RestoreServiceError::ConfigurationError(format!(
                "TARGET_DB_PORT is not a valid port number: {}",
                raw
            ))
        })
    }

    /// Zero disables the timeout entirely
    fn parse_timeout(raw: &str) -> Result<Option<Duration>> {
        let secs = raw.trim().parse::<u64>().map_err(|_| {
            RestoreServiceError::ConfigurationError(format!(
                "RESTORE_COMMAND_TIMEOUT_SECS is not a valid number of seconds: {}",
                raw
            ))
        })?;
        Ok((secs > 0).then(|| Duration::from_secs(secs)))
    }
}

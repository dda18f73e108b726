use crate::config::{Config, DbSettings};
use async_trait::async_trait;
use flate2::read::MultiGzDecoder;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Captured outcome of one external command invocation
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub success: bool,
    /// Combined stdout and stderr, verbatim
    pub output: String,
}

impl StageOutput {
    fn failure(output: String) -> Self {
        Self {
            success: false,
            output,
        }
    }
}

/// External database capabilities needed by the restore workflow
#[async_trait]
pub trait DatabaseCommands: Send + Sync {
    /// Create a brand-new database with the given name
    async fn create_database(&self, name: &str) -> StageOutput;

    /// Decompress the archive and load its SQL into the named database
    async fn load_dump(&self, archive: &Path, name: &str) -> StageOutput;

    /// Drop the named database if it exists
    async fn drop_database_if_exists(&self, name: &str) -> StageOutput;
}

/// PostgreSQL client tool implementation (createdb, psql, dropdb)
pub struct PgCommands {
    settings: DbSettings,
    timeout: Option<Duration>,
}

impl PgCommands {
    pub fn new(config: &Config) -> Self {
        Self {
            settings: config.database.clone(),
            timeout: config.command_timeout,
        }
    }

    fn connection_args(&self) -> [String; 6] {
        [
            "-h".to_string(),
            self.settings.host.clone(),
            "-p".to_string(),
            self.settings.port.to_string(),
            "-U".to_string(),
            self.settings.user.clone(),
        ]
    }

    /// Base command with connection arguments. The credential only ever
    /// travels through the child environment, never through the argv.
    fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(self.connection_args());
        if let Some(password) = &self.settings.password {
            cmd.env("PGPASSWORD", password);
        }
        cmd
    }
}

#[async_trait]
impl DatabaseCommands for PgCommands {
    async fn create_database(&self, name: &str) -> StageOutput {
        debug!(database = %name, host = %self.settings.host, "Running createdb");

        let mut cmd = self.command("createdb");
        cmd.arg(name).stdin(Stdio::null());
        run_with_timeout(cmd, self.timeout, "createdb").await
    }

    async fn load_dump(&self, archive: &Path, name: &str) -> StageOutput {
        // Decompress into an anonymous spool file first so psql reads a
        // plain byte stream on stdin. No shell is involved at any point.
        let spool = match decompress_to_spool(archive).await {
            Ok(file) => file,
            Err(e) => {
                return StageOutput::failure(format!(
                    "Failed to decompress {}: {}",
                    archive.display(),
                    e
                ))
            }
        };

        debug!(database = %name, archive = %archive.display(), "Running psql restore");

        let mut cmd = self.command("psql");
        cmd.args(["-d", name, "--quiet"]).stdin(Stdio::from(spool));
        run_with_timeout(cmd, self.timeout, "psql").await
    }

    async fn drop_database_if_exists(&self, name: &str) -> StageOutput {
        debug!(database = %name, "Running dropdb --if-exists");

        let mut cmd = self.command("dropdb");
        cmd.arg("--if-exists").arg(name).stdin(Stdio::null());
        run_with_timeout(cmd, self.timeout, "dropdb").await
    }
}

/// Decompress a gzip archive into an anonymous temporary file, rewound to
/// the start so it can serve directly as child stdin. Archives may consist
/// of several concatenated gzip members; all of them are decoded.
async fn decompress_to_spool(archive: &Path) -> std::io::Result<std::fs::File> {
    let path = archive.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        let mut decoder = MultiGzDecoder::new(std::fs::File::open(&path)?);
        let mut spool = tempfile::tempfile()?;
        std::io::copy(&mut decoder, &mut spool)?;
        spool.seek(SeekFrom::Start(0))?;
        Ok(spool)
    })
    .await;

    match result {
        Ok(inner) => inner,
        Err(join_error) => Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            join_error,
        )),
    }
}

/// Spawn the command, wait for it (bounded when a timeout is set), and fold
/// every failure mode into a StageOutput instead of raising.
async fn run_with_timeout(mut cmd: Command, bound: Option<Duration>, context: &str) -> StageOutput {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    // Dropping the wait future on timeout must also end the child
    cmd.kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return StageOutput::failure(format!("Failed to execute {}: {}", context, e)),
    };

    let waited = match bound {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => result,
            Err(_) => {
                return StageOutput::failure(format!(
                    "{} timed out after {} seconds and was terminated",
                    context,
                    limit.as_secs()
                ))
            }
        },
        None => child.wait_with_output().await,
    };

    match waited {
        Ok(output) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.is_empty() {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&stderr);
            }
            StageOutput {
                success: output.status.success(),
                output: text,
            }
        }
        Err(e) => StageOutput::failure(format!(
            "Failed to collect output from {}: {}",
            context, e
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::ffi::OsStr;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    fn test_settings() -> DbSettings {
        DbSettings {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: Some("s3cret_value".to_string()),
        }
    }

    fn test_pg(timeout: Option<Duration>) -> PgCommands {
        PgCommands {
            settings: test_settings(),
            timeout,
        }
    }

    async fn run_sh(script: &str, bound: Option<Duration>) -> StageOutput {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script).stdin(Stdio::null());
        run_with_timeout(cmd, bound, "sh").await
    }

    #[tokio::test]
    async fn test_run_captures_stdout_and_stderr() {
        let result = run_sh("echo visible; echo hidden 1>&2", None).await;

        assert!(result.success);
        assert!(result.output.contains("visible"));
        assert!(result.output.contains("hidden"));
    }

    #[tokio::test]
    async fn test_run_reports_nonzero_exit_as_failure() {
        let result = run_sh("echo broken 1>&2; exit 3", None).await;

        assert!(!result.success);
        assert!(result.output.contains("broken"));
    }

    #[tokio::test]
    async fn test_run_folds_spawn_failure_into_output() {
        let mut cmd = Command::new("/definitely/not/a/real/binary");
        cmd.stdin(Stdio::null());
        let result = run_with_timeout(cmd, None, "missing-tool").await;

        assert!(!result.success);
        assert!(result.output.contains("Failed to execute missing-tool"));
    }

    #[tokio::test]
    async fn test_run_terminates_on_timeout() {
        let result = run_sh("sleep 5", Some(Duration::from_millis(100))).await;

        assert!(!result.success);
        assert!(result.output.contains("timed out"));
    }

    #[tokio::test]
    async fn test_decompress_rewinds_spool_for_reading() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("appdb_backup_2024.sql.gz");

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"CREATE TABLE t (id int);\n").unwrap();
        std::fs::write(&archive, encoder.finish().unwrap()).unwrap();

        let mut spool = decompress_to_spool(&archive).await.unwrap();
        let mut sql = String::new();
        spool.read_to_string(&mut sql).unwrap();

        assert_eq!(sql, "CREATE TABLE t (id int);\n");
    }

    #[tokio::test]
    async fn test_decompress_reads_all_concatenated_gzip_members() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("appdb_backup_2024.sql.gz");

        // Chunk-assembled dumps arrive as back-to-back gzip members
        let mut bytes = Vec::new();
        for part in ["CREATE TABLE a (id int);\n", "CREATE TABLE b (id int);\n"] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(part.as_bytes()).unwrap();
            bytes.extend(encoder.finish().unwrap());
        }
        std::fs::write(&archive, bytes).unwrap();

        let mut spool = decompress_to_spool(&archive).await.unwrap();
        let mut sql = String::new();
        spool.read_to_string(&mut sql).unwrap();

        assert_eq!(sql, "CREATE TABLE a (id int);\nCREATE TABLE b (id int);\n");
    }

    #[tokio::test]
    async fn test_load_dump_fails_cleanly_on_corrupt_archive() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("appdb_backup_2024.sql.gz");
        std::fs::write(&archive, b"this is not gzip data").unwrap();

        let pg = test_pg(None);
        let result = pg.load_dump(&archive, "appdb_restore").await;

        assert!(!result.success);
        assert!(result.output.contains("Failed to decompress"));
    }

    #[test]
    fn test_credential_stays_out_of_argv() {
        let pg = test_pg(None);
        let cmd = pg.command("createdb");
        let std_cmd = cmd.as_std();

        let args: Vec<String> = std_cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(!args.iter().any(|a| a.contains("s3cret_value")));

        let has_password_env = std_cmd
            .get_envs()
            .any(|(k, v)| k == OsStr::new("PGPASSWORD") && v == Some(OsStr::new("s3cret_value")));
        assert!(has_password_env);
    }

    #[test]
    fn test_connection_args_are_discrete() {
        let pg = test_pg(None);

        assert_eq!(
            pg.connection_args(),
            [
                "-h".to_string(),
                "localhost".to_string(),
                "-p".to_string(),
                "5432".to_string(),
                "-U".to_string(),
                "postgres".to_string(),
            ]
        );
    }
}

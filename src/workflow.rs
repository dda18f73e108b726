use crate::catalog::{BackupArchive, BackupCatalog};
use crate::commands::{DatabaseCommands, StageOutput};
use crate::config::Config;
use crate::errors::{RestoreServiceError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

/// Suffix appended to the source database name when the caller leaves it empty
pub const DEFAULT_RESTORE_SUFFIX: &str = "_restore";

/// One discrete external operation within a restore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStage {
    CreateDatabase,
    RestoreData,
    CleanupDrop,
}

impl RestoreStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreStage::CreateDatabase => "create_database",
            RestoreStage::RestoreData => "restore_data",
            RestoreStage::CleanupDrop => "cleanup_drop",
        }
    }
}

/// Outcome of one stage, with the external tool's output attached verbatim
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub stage: RestoreStage,
    pub success: bool,
    pub output: String,
}

impl StageResult {
    fn new(stage: RestoreStage, output: StageOutput) -> Self {
        Self {
            stage,
            success: output.success,
            output: output.output,
        }
    }
}

/// Terminal state of a restore operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreOutcome {
    /// Database created and data loaded
    Succeeded,
    /// Creation failed, so nothing was made and nothing needs cleaning
    CreateDatabaseFailed,
    /// Data load failed and the fresh database was dropped again
    Cleaned,
    /// Data load failed and the drop failed too
    CleanupFailed,
}

impl RestoreOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RestoreOutcome::Succeeded)
    }
}

/// Caller-supplied restore parameters
#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub archive: String,
    /// None or blank means the default suffix
    pub suffix: Option<String>,
}

/// Full record of one restore operation
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub archive: String,
    pub target_database: String,
    pub outcome: RestoreOutcome,
    pub stages: Vec<StageResult>,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
}

/// Apply the trim-and-default rule, then enforce the identifier alphabet:
/// letters, digits, and underscores, with at least one non-underscore.
fn effective_suffix(raw: Option<&str>) -> Result<String> {
    let trimmed = raw.unwrap_or("").trim();
    let suffix = if trimmed.is_empty() {
        DEFAULT_RESTORE_SUFFIX
    } else {
        trimmed
    };

    let stripped: String = suffix.chars().filter(|c| *c != '_').collect();
    if stripped.is_empty() || !stripped.chars().all(char::is_alphanumeric) {
        return Err(RestoreServiceError::InvalidSuffix(suffix.to_string()));
    }
    Ok(suffix.to_string())
}

/// Serializes restores that aim at the same target database name
#[derive(Clone, Default)]
pub struct TargetGates {
    gates: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl TargetGates {
    pub async fn acquire(&self, target: &str) -> OwnedMutexGuard<()> {
        let gate = {
            let mut gates = self.gates.lock().await;
            // Holders and waiters keep their gate's Arc alive, so an entry
            // at strong count 1 is idle and can be pruned
            gates.retain(|_, gate| Arc::strong_count(gate) > 1);
            gates
                .entry(target.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        gate.lock_owned().await
    }
}

struct RestorePlan {
    archive: BackupArchive,
    archive_path: PathBuf,
    target_database: String,
}

/// Runs the validate, create, restore, cleanup sequence for one archive
pub struct RestoreWorkflow {
    config: Config,
    commands: Arc<dyn DatabaseCommands>,
    gates: TargetGates,
}

impl RestoreWorkflow {
    pub fn new(config: Config, commands: Arc<dyn DatabaseCommands>) -> Self {
        Self {
            config,
            commands,
            gates: TargetGates::default(),
        }
    }

    /// Validate the request, then run the stage sequence.
    ///
    /// Validation problems come back as errors before anything touches the
    /// database server. Once stages start, failures are captured in the
    /// report instead of being raised.
    pub async fn execute(&self, request: &RestoreRequest) -> Result<RestoreReport> {
        let started_at = Utc::now();
        let started = Instant::now();

        let plan = self.validate(request)?;
        let _gate = self.gates.acquire(&plan.target_database).await;

        info!(
            archive = %plan.archive.filename,
            target_database = %plan.target_database,
            "Starting restore"
        );

        let mut stages = Vec::new();

        let create = self.commands.create_database(&plan.target_database).await;
        let created = create.success;
        stages.push(StageResult::new(RestoreStage::CreateDatabase, create));
        if !created {
            error!(
                target_database = %plan.target_database,
                "createdb failed, nothing to clean up"
            );
            let outcome = RestoreOutcome::CreateDatabaseFailed;
            return Ok(self.report(plan, outcome, stages, started_at, started));
        }
        info!(target_database = %plan.target_database, "Created target database");

        let load = self.commands.load_dump(&plan.archive_path, &plan.target_database).await;
        let loaded = load.success;
        stages.push(StageResult::new(RestoreStage::RestoreData, load));
        if loaded {
            info!(target_database = %plan.target_database, "Restore completed");
            let outcome = RestoreOutcome::Succeeded;
            return Ok(self.report(plan, outcome, stages, started_at, started));
        }

        // The created-but-unrestored database must not stay behind
        warn!(
            target_database = %plan.target_database,
            "Restore failed, dropping the target database"
        );
        let cleanup = self.commands.drop_database_if_exists(&plan.target_database).await;
        let cleaned = cleanup.success;
        stages.push(StageResult::new(RestoreStage::CleanupDrop, cleanup));

        let outcome = if cleaned {
            info!(target_database = %plan.target_database, "Dropped target database after failed restore");
            RestoreOutcome::Cleaned
        } else {
            error!(
                target_database = %plan.target_database,
                "Cleanup failed, the target database must be removed manually"
            );
            RestoreOutcome::CleanupFailed
        };
        Ok(self.report(plan, outcome, stages, started_at, started))
    }

    fn validate(&self, request: &RestoreRequest) -> Result<RestorePlan> {
        let catalog = BackupCatalog::new(&self.config.backup_dir);

        if request.archive.is_empty() {
            return Err(RestoreServiceError::ArchiveNotFound(request.archive.clone()));
        }

        // Re-resolved against the directory on every call, never cached
        let archive = catalog
            .find(&request.archive)?
            .ok_or_else(|| RestoreServiceError::ArchiveNotFound(request.archive.clone()))?;

        let suffix = effective_suffix(request.suffix.as_deref())?;

        if archive.source_database.is_empty() {
            return Err(RestoreServiceError::UnknownSourceDatabase(
                archive.filename.clone(),
            ));
        }

        if self.config.database.password.is_none() {
            return Err(RestoreServiceError::MissingCredential);
        }

        let target_database = format!("{}{}", archive.source_database, suffix);
        let archive_path = catalog.archive_path(&archive.filename);

        Ok(RestorePlan {
            archive,
            archive_path,
            target_database,
        })
    }

    fn report(
        &self,
        plan: RestorePlan,
        outcome: RestoreOutcome,
        stages: Vec<StageResult>,
        started_at: DateTime<Utc>,
        started: Instant,
    ) -> RestoreReport {
        RestoreReport {
            archive: plan.archive.filename,
            target_database: plan.target_database,
            outcome,
            stages,
            started_at,
            duration_secs: started.elapsed().as_secs_f64(),
        }
    }
}

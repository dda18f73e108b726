use crate::catalog::BackupCatalog;
use crate::commands::PgCommands;
use crate::config::Config;
use crate::errors::{RestoreServiceError, Result};
use crate::workflow::{
    RestoreOutcome, RestoreReport, RestoreRequest, RestoreWorkflow, DEFAULT_RESTORE_SUFFIX,
};
use dialoguer::{Confirm, Select};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;

pub async fn restore_interactive(
    config: Config,
    archive_opt: Option<String>,
    suffix_opt: Option<String>,
    assume_yes: bool,
    json_output: bool,
) -> Result<ExitCode> {
    // Phase 1: Archive selection. JSON mode is for scripting, so it fails
    // fast instead of falling back to the interactive picker.
    let archive = match archive_opt {
        Some(archive) => archive,
        None if json_output => {
            return Err(RestoreServiceError::ConfigurationError(
                "--json requires --archive; interactive selection is disabled in JSON mode"
                    .to_string(),
            ))
        }
        None => select_archive(&config)?,
    };

    // Phase 2: Confirmation. JSON mode is for scripting and never prompts.
    if !assume_yes && !json_output {
        let suffix_label = suffix_opt
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_RESTORE_SUFFIX);

        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Restore '{}' into a new database (name suffix '{}')?",
                archive, suffix_label
            ))
            .default(true)
            .interact()?;

        if !confirmed {
            warn!("Restore cancelled by user");
            return Ok(ExitCode::SUCCESS);
        }
    }

    // Phase 3: Run the restore workflow
    let commands = Arc::new(PgCommands::new(&config));
    let workflow = RestoreWorkflow::new(config, commands);
    let request = RestoreRequest {
        archive,
        suffix: suffix_opt,
    };
    let report = workflow.execute(&request).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        display_report(&report);
    }

    if report.outcome.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn select_archive(config: &Config) -> Result<String> {
    let catalog = BackupCatalog::new(&config.backup_dir);
    let archives = catalog.list_archives()?;

    if archives.is_empty() {
        return Err(RestoreServiceError::ConfigurationError(format!(
            "No backup archives found in {}",
            config.backup_dir.display()
        )));
    }

    let items: Vec<String> = archives
        .iter()
        .map(|a| format!("{} (source database: {})", a.filename, a.source_database))
        .collect();

    let selection = Select::new()
        .with_prompt("Select a backup archive to restore")
        .items(&items)
        .default(0)
        .interact()?;

    Ok(archives[selection].filename.clone())
}

fn display_report(report: &RestoreReport) {
    println!("\nRESTORE REPORT: {}", report.archive);
    println!("====================");
    println!("Target database: {}", report.target_database);

    for stage in &report.stages {
        let marker = if stage.success { "ok" } else { "FAILED" };
        println!("\n[{}] {}", marker, stage.stage.as_str());

        let trimmed = stage.output.trim();
        if !trimmed.is_empty() {
            for line in trimmed.lines() {
                println!("    {}", line);
            }
        }
    }

    println!();
    match report.outcome {
        RestoreOutcome::Succeeded => println!(
            "Restored '{}' into database '{}' in {:.1}s",
            report.archive, report.target_database, report.duration_secs
        ),
        RestoreOutcome::CreateDatabaseFailed => println!(
            "Could not create database '{}', so nothing was restored and no cleanup was needed",
            report.target_database
        ),
        RestoreOutcome::Cleaned => println!(
            "Restore into '{}' failed and the database was dropped again",
            report.target_database
        ),
        RestoreOutcome::CleanupFailed => println!(
            "Restore into '{}' failed AND the cleanup drop failed. The database may still exist and must be removed manually.",
            report.target_database
        ),
    }
    println!();
}

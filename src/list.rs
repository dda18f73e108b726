use crate::catalog::{BackupArchive, BackupCatalog};
use crate::config::Config;
use crate::errors::{RestoreServiceError, Result};
use serde_json::json;
use tracing::{info, warn};

/// Render the archive catalog. An unavailable backup directory degrades to
/// an empty listing with a warning so the command still completes.
pub fn list_archives(config: &Config, json_output: bool) -> Result<()> {
    if !json_output {
        info!(backup_dir = %config.backup_dir.display(), "Listing backup archives");
    }

    let catalog = BackupCatalog::new(&config.backup_dir);
    let archives = match catalog.list_archives() {
        Ok(archives) => archives,
        Err(error @ RestoreServiceError::CatalogUnavailable { .. }) => {
            warn!(error = %error, "Backup directory is not readable, listing nothing");
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    if json_output {
        // Return JSON format for scripting
        let output = json!({
            "backup_dir": config.backup_dir.to_string_lossy(),
            "archives": archives.iter().map(|a| json!({
                "filename": a.filename,
                "source_database": a.source_database
            })).collect::<Vec<_>>()
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        display_archive_summary(config, &archives);
    }

    Ok(())
}

fn display_archive_summary(config: &Config, archives: &[BackupArchive]) {
    println!("\nBACKUP ARCHIVES ({}):", config.backup_dir.display());
    println!("====================");

    if archives.is_empty() {
        println!("  None");
    } else {
        for archive in archives {
            println!(
                "  {:<60} source database: {}",
                archive.filename, archive.source_database
            );
        }
    }

    println!();
}

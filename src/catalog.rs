use crate::errors::{RestoreServiceError, Result};
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::warn;

/// Filename suffix every restorable archive must carry
pub const ARCHIVE_SUFFIX: &str = ".sql.gz";

/// Marker separating the source database name from the backup timestamp
pub const SOURCE_NAME_MARKER: &str = "_backup_";

/// Catalog label for archives whose filename carries no marker
pub const UNKNOWN_SOURCE_DB: &str = "unknown_db";

/// Derive the source database name embedded in an archive filename.
///
/// The name is everything before the first `_backup_` occurrence. Returns
/// None when the marker is absent from the filename.
pub fn source_database_name(filename: &str) -> Option<&str> {
    filename
        .split_once(SOURCE_NAME_MARKER)
        .map(|(prefix, _)| prefix)
}

/// One restorable archive discovered in the backup directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArchive {
    pub filename: String,
    pub source_database: String,
}

impl BackupArchive {
    fn from_filename(filename: String) -> Self {
        let source_database = source_database_name(&filename)
            .unwrap_or(UNKNOWN_SOURCE_DB)
            .to_string();
        Self {
            filename,
            source_database,
        }
    }
}

/// Read-only view over the directory holding backup archives
#[derive(Debug, Clone)]
pub struct BackupCatalog {
    backup_dir: PathBuf,
}

impl BackupCatalog {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    /// Full path of an archive inside the backup directory
    pub fn archive_path(&self, filename: &str) -> PathBuf {
        self.backup_dir.join(filename)
    }

    /// List restorable archives, most recent first.
    ///
    /// Timestamped filenames sort newest-first under reverse lexicographic
    /// order. Single unreadable entries are skipped with a warning so the
    /// rest of the listing still comes back.
    pub fn list_archives(&self) -> Result<Vec<BackupArchive>> {
        let entries = fs::read_dir(&self.backup_dir).map_err(|source| {
            RestoreServiceError::CatalogUnavailable {
                dir: self.backup_dir.clone(),
                source,
            }
        })?;

        let mut archives: Vec<BackupArchive> = entries
            .filter_map(|entry| self.archive_from_entry(entry))
            .collect();

        archives.sort_by(|a, b| b.filename.cmp(&a.filename));
        Ok(archives)
    }

    /// Map one directory entry to a catalog archive.
    ///
    /// Unreadable entries are logged and skipped, names without the
    /// archive suffix are dropped silently.
    fn archive_from_entry(&self, entry: io::Result<fs::DirEntry>) -> Option<BackupArchive> {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) => {
                let error = RestoreServiceError::CatalogRead(source);
                warn!(
                    dir = %self.backup_dir.display(),
                    error = %error,
                    "Skipping unreadable backup directory entry"
                );
                return None;
            }
        };

        let filename = entry.file_name().to_string_lossy().into_owned();
        if filename.ends_with(ARCHIVE_SUFFIX) {
            Some(BackupArchive::from_filename(filename))
        } else {
            None
        }
    }

    /// Look a single archive up by filename against the current listing
    pub fn find(&self, filename: &str) -> Result<Option<BackupArchive>> {
        Ok(self
            .list_archives()?
            .into_iter()
            .find(|archive| archive.filename == filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed_files(names: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in names {
            fs::write(dir.path().join(name), b"dummy").unwrap();
        }
        dir
    }

    #[test]
    fn test_source_database_name_splits_on_first_marker() {
        assert_eq!(
            source_database_name("appdb_backup_2024-05-01T12-00-00.sql.gz"),
            Some("appdb")
        );

        // Only the first occurrence counts
        assert_eq!(
            source_database_name("a_backup_b_backup_c.sql.gz"),
            Some("a")
        );

        // Marker present but nothing before it
        assert_eq!(source_database_name("_backup_2024.sql.gz"), Some(""));

        // No marker at all
        assert_eq!(source_database_name("plain.sql.gz"), None);
    }

    #[test]
    fn test_list_filters_by_archive_suffix() -> Result<()> {
        let dir = seed_files(&[
            "appdb_backup_2024-05-01.sql.gz",
            "notes.txt",
            "appdb_backup_2024-05-02.sql",
            "schema.gz",
        ]);
        let catalog = BackupCatalog::new(dir.path());

        let archives = catalog.list_archives()?;
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].filename, "appdb_backup_2024-05-01.sql.gz");

        Ok(())
    }

    #[test]
    fn test_list_orders_most_recent_first() -> Result<()> {
        let dir = seed_files(&[
            "a_backup_1.sql.gz",
            "b_backup_2.sql.gz",
            "a_backup_9.sql.gz",
        ]);
        let catalog = BackupCatalog::new(dir.path());

        let names: Vec<String> = catalog
            .list_archives()?
            .into_iter()
            .map(|archive| archive.filename)
            .collect();
        assert_eq!(
            names,
            vec!["b_backup_2.sql.gz", "a_backup_9.sql.gz", "a_backup_1.sql.gz"]
        );

        Ok(())
    }

    #[test]
    fn test_markerless_archive_gets_unknown_source_label() -> Result<()> {
        let dir = seed_files(&["snapshot.sql.gz"]);
        let catalog = BackupCatalog::new(dir.path());

        let archives = catalog.list_archives()?;
        assert_eq!(archives[0].source_database, UNKNOWN_SOURCE_DB);

        Ok(())
    }

    #[test]
    fn test_empty_prefix_is_preserved_not_relabeled() -> Result<()> {
        let dir = seed_files(&["_backup_2024.sql.gz"]);
        let catalog = BackupCatalog::new(dir.path());

        let archives = catalog.list_archives()?;
        assert_eq!(archives[0].source_database, "");

        Ok(())
    }

    #[test]
    fn test_missing_directory_is_catalog_unavailable() {
        let catalog = BackupCatalog::new("/definitely/not/a/real/backup/dir");

        assert!(matches!(
            catalog.list_archives(),
            Err(RestoreServiceError::CatalogUnavailable { .. })
        ));
    }

    #[test]
    fn test_unreadable_entry_is_skipped_not_fatal() {
        let dir = seed_files(&["appdb_backup_1.sql.gz"]);
        let catalog = BackupCatalog::new(dir.path());

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(catalog.archive_from_entry(Err(denied)).is_none());

        // A bad entry only costs itself, readable neighbors still list
        let entry = fs::read_dir(dir.path()).unwrap().next().unwrap();
        let archive = catalog.archive_from_entry(entry).unwrap();
        assert_eq!(archive.filename, "appdb_backup_1.sql.gz");
    }

    #[test]
    fn test_find_resolves_only_listed_archives() -> Result<()> {
        let dir = seed_files(&["appdb_backup_1.sql.gz", "notes.txt"]);
        let catalog = BackupCatalog::new(dir.path());

        let found = catalog.find("appdb_backup_1.sql.gz")?;
        assert_eq!(found.unwrap().source_database, "appdb");

        assert!(catalog.find("missing_backup_1.sql.gz")?.is_none());
        // Present on disk but not a recognized archive
        assert!(catalog.find("notes.txt")?.is_none());

        Ok(())
    }

    #[test]
    fn test_archive_path_joins_backup_dir() {
        let catalog = BackupCatalog::new("/backups");
        assert_eq!(
            catalog.archive_path("appdb_backup_1.sql.gz"),
            PathBuf::from("/backups/appdb_backup_1.sql.gz")
        );
    }
}

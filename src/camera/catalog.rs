//! Persistent catalog of captured stills.
//!
//! Each still is a JPEG artifact plus a JSON metadata record sharing a
//! generated identifier. The identifier is immutable for the lifetime of the
//! record; only the display name changes on rename. The binary is always
//! written before the metadata so a crash between the two never leaves a
//! listed record pointing at a missing artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{OurError, OurResult};

/// Metadata for one persisted still
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StillRecord {
    /// Unique identifier, stable across renames
    pub id: String,
    /// Optional user-assigned display name; falls back to the id
    pub name: Option<String>,
    /// Creation timestamp
    pub created: DateTime<Utc>,
    /// Artifact size in bytes
    pub size: u64,
    /// Requested capture width
    pub width: u32,
    /// Requested capture height
    pub height: u32,
}

impl StillRecord {
    /// Access URL for the binary artifact
    pub fn url(&self) -> String {
        format!("/api/camera/stills/{}/image", self.id)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Still catalog backed by a directory of `<id>.jpg` + `<id>.json` pairs
#[derive(Debug, Clone)]
pub struct StillCatalog {
    directory: PathBuf,
}

impl StillCatalog {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    /// Create the backing directory if needed and verify it is writable
    pub fn ensure_directory(&self) -> OurResult<()> {
        fs::create_dir_all(&self.directory)?;
        Ok(())
    }

    /// Persist a captured still, returning its new record
    pub fn create(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        name: Option<String>,
    ) -> OurResult<StillRecord> {
        self.ensure_directory()?;

        let record = StillRecord {
            id: Uuid::new_v4().to_string(),
            name: name.filter(|n| !n.trim().is_empty()),
            created: Utc::now(),
            size: data.len() as u64,
            width,
            height,
        };

        // Binary first: metadata must never reference a missing artifact
        fs::write(self.image_path(&record.id), data)?;
        let json = serde_json::to_string_pretty(&record)?;
        fs::write(self.metadata_path(&record.id), json)?;

        info!(id = %record.id, size = record.size, "Stored still");
        Ok(record)
    }

    /// All records, most recent first
    pub fn list(&self) -> OurResult<Vec<StillRecord>> {
        let mut records = Vec::new();

        if !self.directory.exists() {
            return Ok(records);
        }

        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.extension() != Some(std::ffi::OsStr::new("json")) {
                continue;
            }

            match fs::read_to_string(&path)
                .map_err(OurError::from)
                .and_then(|text| Ok(serde_json::from_str::<StillRecord>(&text)?))
            {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable still metadata {}: {e}", path.display()),
            }
        }

        records.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(records)
    }

    /// Load one record by id
    pub fn get(&self, id: &str) -> OurResult<StillRecord> {
        let path = self.checked_metadata_path(id)?;
        let text = fs::read_to_string(&path).map_err(|_| self.not_found(id))?;
        let record = serde_json::from_str(&text)?;
        Ok(record)
    }

    /// Load the binary artifact for a record
    pub fn image(&self, id: &str) -> OurResult<Vec<u8>> {
        // Resolve metadata first so a stray file cannot be fetched by id
        let record = self.get(id)?;
        let data = fs::read(self.image_path(&record.id)).map_err(|_| self.not_found(id))?;
        Ok(data)
    }

    /// Update the display name only; id, timestamp and artifact are untouched
    pub fn rename(&self, id: &str, name: String) -> OurResult<StillRecord> {
        let mut record = self.get(id)?;
        record.name = if name.trim().is_empty() {
            None
        } else {
            Some(name)
        };

        let json = serde_json::to_string_pretty(&record)?;
        fs::write(self.metadata_path(&record.id), json)?;

        info!(id = %record.id, name = ?record.name, "Renamed still");
        Ok(record)
    }

    /// Remove both metadata and artifact; NotFound when already absent
    pub fn delete(&self, id: &str) -> OurResult<()> {
        let metadata_path = self.checked_metadata_path(id)?;
        if !metadata_path.exists() {
            return Err(self.not_found(id));
        }

        // Metadata goes first so a half-deleted record never appears in list()
        fs::remove_file(&metadata_path)?;
        if let Err(e) = fs::remove_file(self.image_path(id)) {
            warn!("Failed to remove still artifact for {id}: {e}");
        }

        info!(id = %id, "Deleted still");
        Ok(())
    }

    fn metadata_path(&self, id: &str) -> PathBuf {
        self.directory.join(format!("{id}.json"))
    }

    fn image_path(&self, id: &str) -> PathBuf {
        self.directory.join(format!("{id}.jpg"))
    }

    /// Ids are UUIDs; anything else (path separators included) is unknown
    fn checked_metadata_path(&self, id: &str) -> OurResult<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(self.not_found(id));
        }
        Ok(self.metadata_path(id))
    }

    fn not_found(&self, id: &str) -> OurError {
        OurError::NotFound(format!("still '{id}' does not exist"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const JPEG: &[u8] = &[0xFF, 0xD8, b'x', 0xFF, 0xD9];

    fn test_catalog() -> (TempDir, StillCatalog) {
        let temp_dir = TempDir::new().expect("Test operation should succeed");
        let catalog = StillCatalog::new(temp_dir.path().to_path_buf());
        (temp_dir, catalog)
    }

    #[test]
    fn test_create_then_list() {
        let (_temp_dir, catalog) = test_catalog();

        let record = catalog
            .create(JPEG, 640, 480, Some("porch".to_string()))
            .expect("Test operation should succeed");
        assert_eq!(record.size, JPEG.len() as u64);
        assert_eq!(record.display_name(), "porch");
        assert_eq!(record.url(), format!("/api/camera/stills/{}/image", record.id));

        let listed = catalog.list().expect("Test operation should succeed");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], record);

        let image = catalog
            .image(&record.id)
            .expect("Test operation should succeed");
        assert_eq!(image, JPEG);
    }

    #[test]
    fn test_list_is_newest_first() {
        let (_temp_dir, catalog) = test_catalog();

        let first = catalog
            .create(JPEG, 640, 480, None)
            .expect("Test operation should succeed");
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = catalog
            .create(JPEG, 640, 480, None)
            .expect("Test operation should succeed");

        let listed = catalog.list().expect("Test operation should succeed");
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[test]
    fn test_rename_updates_name_only() {
        let (_temp_dir, catalog) = test_catalog();

        let record = catalog
            .create(JPEG, 640, 480, None)
            .expect("Test operation should succeed");
        assert_eq!(record.display_name(), record.id);

        let renamed = catalog
            .rename(&record.id, "driveway".to_string())
            .expect("Test operation should succeed");
        assert_eq!(renamed.id, record.id);
        assert_eq!(renamed.created, record.created);
        assert_eq!(renamed.name.as_deref(), Some("driveway"));

        let listed = catalog.list().expect("Test operation should succeed");
        assert_eq!(listed[0].name.as_deref(), Some("driveway"));
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let (_temp_dir, catalog) = test_catalog();

        assert!(matches!(
            catalog.rename("no-such-id", "x".to_string()),
            Err(OurError::NotFound(_))
        ));
        assert!(matches!(
            catalog.delete("no-such-id"),
            Err(OurError::NotFound(_))
        ));
        assert!(matches!(
            catalog.image("no-such-id"),
            Err(OurError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_removes_record_and_artifact() {
        let (temp_dir, catalog) = test_catalog();

        let record = catalog
            .create(JPEG, 640, 480, None)
            .expect("Test operation should succeed");
        catalog
            .delete(&record.id)
            .expect("Test operation should succeed");

        assert!(catalog.list().expect("Test operation should succeed").is_empty());
        assert!(!temp_dir.path().join(format!("{}.jpg", record.id)).exists());

        // Repeated delete is a clear NotFound, not an error storm
        assert!(matches!(
            catalog.delete(&record.id),
            Err(OurError::NotFound(_))
        ));
        assert!(matches!(
            catalog.rename(&record.id, "x".to_string()),
            Err(OurError::NotFound(_))
        ));
    }

    #[test]
    fn test_path_traversal_ids_rejected() {
        let (_temp_dir, catalog) = test_catalog();
        assert!(matches!(
            catalog.image("../../etc/passwd"),
            Err(OurError::NotFound(_))
        ));
    }

    #[test]
    fn test_blank_name_falls_back_to_id() {
        let (_temp_dir, catalog) = test_catalog();
        let record = catalog
            .create(JPEG, 640, 480, Some("   ".to_string()))
            .expect("Test operation should succeed");
        assert_eq!(record.name, None);
        assert_eq!(record.display_name(), record.id);
    }
}

//! Backup and rollback machinery for BIB configuration files.
//!
//! Every known-good load is snapshotted to `backups/<id>/bib_<id>_<ts>.xml`
//! plus a `backups/<id>/latest_<id>.xml` pointer copy. When a reload fails
//! validation or parsing, the corrupted file is preserved alongside under
//! `backups/<id>/corrupted_<id>_<ts>.xml` and the loader falls back to the
//! latest known-good snapshot so the service keeps running on the last
//! configuration that worked.

use std::fs;
use std::path::{Path, PathBuf};

use rigctl_core::ids::BibId;

/// Manages the `backups/<id>/` hierarchy beside the configuration directory.
#[derive(Debug, Clone)]
pub struct BackupService {
    backups_dir: PathBuf,
    /// Maximum number of timestamped good-snapshots kept per BIB.
    retention: usize,
}

impl BackupService {
    pub fn new(backups_dir: PathBuf, retention: usize) -> Self {
        Self { backups_dir, retention }
    }

    fn bib_dir(&self, id: &BibId) -> PathBuf {
        self.backups_dir.join(id.as_str())
    }

    /// Snapshot a known-good raw XML document for `id`, pruning old
    /// snapshots beyond the retention count.
    pub fn save_known_good(&self, id: &BibId, raw_xml: &str, timestamp: u64) -> std::io::Result<()> {
        let dir = self.bib_dir(id);
        fs::create_dir_all(&dir)?;

        let snapshot_path = dir.join(format!("bib_{}_{timestamp}.xml", id.as_str()));
        fs::write(&snapshot_path, raw_xml)?;

        let latest_path = dir.join(format!("latest_{}.xml", id.as_str()));
        fs::write(&latest_path, raw_xml)?;

        self.prune(id)?;
        Ok(())
    }

    /// Preserve a raw XML document that failed to parse or validate.
    pub fn save_corrupted(&self, id: &BibId, raw_xml: &str, timestamp: u64) -> std::io::Result<PathBuf> {
        let dir = self.bib_dir(id);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("corrupted_{}_{timestamp}.xml", id.as_str()));
        fs::write(&path, raw_xml)?;
        Ok(path)
    }

    /// The most recently saved known-good snapshot, if any exists.
    pub fn latest_known_good(&self, id: &BibId) -> Option<String> {
        let path = self.bib_dir(id).join(format!("latest_{}.xml", id.as_str()));
        fs::read_to_string(path).ok()
    }

    /// Drop all but the `retention` most recent timestamped snapshots.
    fn prune(&self, id: &BibId) -> std::io::Result<()> {
        let dir = self.bib_dir(id);
        let prefix = format!("bib_{}_", id.as_str());

        let mut snapshots: Vec<(u64, PathBuf)> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let stripped = name.strip_prefix(&prefix)?.strip_suffix(".xml")?;
                stripped.parse::<u64>().ok().map(|ts| (ts, entry.path()))
            })
            .collect();

        if snapshots.len() <= self.retention {
            return Ok(());
        }

        snapshots.sort_by_key(|(ts, _)| *ts);
        let excess = snapshots.len() - self.retention;
        for (_, path) in snapshots.into_iter().take(excess) {
            let _ = fs::remove_file(path);
        }
        Ok(())
    }
}

/// Strip the `bib_` prefix and `.xml` suffix from a filename, returning the BIB id.
pub fn bib_id_from_filename(path: &Path) -> Option<BibId> {
    let name = path.file_name()?.to_str()?;
    let stripped = name.strip_prefix("bib_")?.strip_suffix(".xml")?;
    Some(BibId::from(stripped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bib_id_parses_from_standard_filename() {
        let path = Path::new("bib_demo.xml");
        assert_eq!(bib_id_from_filename(path), Some(BibId::from("demo")));
    }

    #[test]
    fn bib_id_rejects_non_matching_filename() {
        assert_eq!(bib_id_from_filename(Path::new("rigctl.toml")), None);
        assert_eq!(bib_id_from_filename(Path::new("demo.xml")), None);
    }

    #[test]
    fn save_and_restore_known_good_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let service = BackupService::new(tmp.path().join("backups"), 10);
        let id = BibId::from("demo");

        service.save_known_good(&id, "<bib id=\"demo\"/>", 1000).unwrap();
        assert_eq!(service.latest_known_good(&id).as_deref(), Some("<bib id=\"demo\"/>"));

        service.save_known_good(&id, "<bib id=\"demo\" v=\"2\"/>", 2000).unwrap();
        assert_eq!(service.latest_known_good(&id).as_deref(), Some("<bib id=\"demo\" v=\"2\"/>"));
    }

    #[test]
    fn retention_prunes_oldest_snapshots_first() {
        let tmp = tempfile::tempdir().unwrap();
        let service = BackupService::new(tmp.path().join("backups"), 2);
        let id = BibId::from("demo");

        for ts in [1000, 2000, 3000] {
            service.save_known_good(&id, &format!("<bib ts=\"{ts}\"/>"), ts).unwrap();
        }

        let dir = service.bib_dir(&id);
        let remaining: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("bib_demo_"))
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(!remaining.contains(&"bib_demo_1000.xml".to_string()));
    }

    #[test]
    fn corrupted_snapshot_is_preserved_separately() {
        let tmp = tempfile::tempdir().unwrap();
        let service = BackupService::new(tmp.path().join("backups"), 10);
        let id = BibId::from("c");

        let path = service.save_corrupted(&id, "<bib id=\"c\"", 5000).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("corrupted_c_"));
        assert_eq!(fs::read_to_string(path).unwrap(), "<bib id=\"c\"");
    }
}

//! Configuration model, XML loader, and backup/rollback (component C).

pub mod backup;
pub mod diagnostics;
pub mod error;
pub mod validate;
pub mod xml_model;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rigctl_core::config_model::BibConfiguration;
use rigctl_core::ids::BibId;
use tracing::{info, warn};

pub use backup::{bib_id_from_filename, BackupService};
pub use diagnostics::{Diagnostic, DiagnosticSeverity};
pub use error::ConfigError;

/// Loads, validates, and backs up BIB configuration files.
pub struct ConfigLoader {
    config_dir: PathBuf,
    backups: BackupService,
}

impl ConfigLoader {
    pub fn new(config_dir: PathBuf, backups_dir: PathBuf, backup_retention: usize) -> Self {
        Self { config_dir, backups: BackupService::new(backups_dir, backup_retention) }
    }

    fn bib_path(&self, id: &BibId) -> PathBuf {
        self.config_dir.join(format!("bib_{}.xml", id.as_str()))
    }

    /// Load, parse, and validate `bib_<id>.xml`.
    ///
    /// On `ConfigParseError` or `ConfigInvalid`, the corrupted document is
    /// preserved under `backups/<id>/corrupted_<id>_<ts>.xml`; callers that
    /// need to keep running on the last good configuration should follow a
    /// failed `load_bib` with [`Self::restore_latest_known_good`].
    pub fn load_bib(&self, id: &BibId) -> Result<BibConfiguration, ConfigError> {
        let path = self.bib_path(id);
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(id.clone())
            } else {
                ConfigError::Io { path: path.display().to_string(), source: e }
            }
        })?;

        match self.parse_and_validate(id, &raw) {
            Ok(bib) => {
                self.backups
                    .save_known_good(id, &raw, now_unix())
                    .map_err(|e| ConfigError::Io { path: path.display().to_string(), source: e })?;
                Ok(bib)
            }
            Err(e) => {
                if let Err(io_err) = self.backups.save_corrupted(id, &raw, now_unix()) {
                    warn!(bib_id = %id, error = %io_err, "failed to preserve corrupted BIB snapshot");
                }
                Err(e)
            }
        }
    }

    /// Parse and validate a raw XML document without touching the filesystem.
    pub fn parse_and_validate(&self, id: &BibId, raw_xml: &str) -> Result<BibConfiguration, ConfigError> {
        let xml_bib: xml_model::XmlBib = quick_xml::de::from_str(raw_xml)
            .map_err(|e| ConfigError::ParseError(id.clone(), e.to_string()))?;
        let bib = xml_bib.into_model(id)?;

        let diagnostics = validate::validate(&bib);
        let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).cloned().collect();
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(id.clone(), errors));
        }
        for diagnostic in diagnostics.iter().filter(|d| !d.is_error()) {
            warn!(bib_id = %id, %diagnostic, "configuration warning");
        }
        Ok(bib)
    }

    /// Restore the last known-good snapshot for `id`, if one was ever saved.
    pub fn restore_latest_known_good(&self, id: &BibId) -> Option<BibConfiguration> {
        let raw = self.backups.latest_known_good(id)?;
        match self.parse_and_validate(id, &raw) {
            Ok(bib) => {
                info!(bib_id = %id, "restored last known-good configuration after a failed reload");
                Some(bib)
            }
            Err(e) => {
                warn!(bib_id = %id, error = %e, "last known-good snapshot itself failed to parse");
                None
            }
        }
    }

    /// Load every `bib_*.xml` file in the configuration directory,
    /// continuing past individual failures and collecting their errors.
    pub fn load_all_bibs(&self) -> (Vec<BibConfiguration>, Vec<ConfigError>) {
        let mut bibs = Vec::new();
        let mut errors = Vec::new();

        let entries = match std::fs::read_dir(&self.config_dir) {
            Ok(entries) => entries,
            Err(e) => {
                errors.push(ConfigError::Io { path: self.config_dir.display().to_string(), source: e });
                return (bibs, errors);
            }
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let Some(id) = bib_id_from_filename(&path) else { continue };
            match self.load_bib(&id) {
                Ok(bib) => bibs.push(bib),
                Err(e) => errors.push(e),
            }
        }

        bibs.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        (bibs, errors)
    }

    /// Diagnostics for an already-loaded model, without re-reading the file.
    pub fn validate(&self, bib: &BibConfiguration) -> Vec<Diagnostic> {
        validate::validate(bib)
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_xml(id: &str) -> String {
        format!(
            r#"<bib id="{id}" description="demo rig">
  <uut id="uut1" description="demo uut">
    <port number="1">
      <protocol>rs232</protocol>
      <speed>115200</speed>
      <data_pattern>n81</data_pattern>
      <read_timeout_ms>3000</read_timeout_ms>
      <write_timeout_ms>3000</write_timeout_ms>
      <start>
        <command outbound="ATZ\r\n" timeout_ms="3000">
          <pass pattern="OK"/>
        </command>
      </start>
      <test sequence_timeout_ms="20000">
        <command outbound="INIT_RS232\r\n" timeout_ms="3000">
          <pass pattern="READY"/>
        </command>
        <command outbound="TEST\r\n" timeout_ms="3000">
          <pass pattern="PASS"/>
          <fail pattern="ERROR"/>
        </command>
      </test>
      <stop>
        <command outbound="EXIT\r\n" timeout_ms="2000">
          <pass pattern="BYE"/>
        </command>
      </stop>
    </port>
  </uut>
</bib>"#
        )
    }

    #[test]
    fn loads_and_validates_a_well_formed_bib() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("bib_demo.xml"), sample_xml("demo")).unwrap();
        let loader = ConfigLoader::new(tmp.path().to_path_buf(), tmp.path().join("backups"), 10);

        let bib = loader.load_bib(&BibId::from("demo")).unwrap();
        assert_eq!(bib.id, BibId::from("demo"));
        assert_eq!(bib.uuts.len(), 1);
        assert_eq!(bib.uuts[0].ports[0].test.commands.len(), 2);
        assert_eq!(bib.uuts[0].ports[0].start.commands[0].outbound, "ATZ\r\n");
    }

    #[test]
    fn missing_file_is_config_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(tmp.path().to_path_buf(), tmp.path().join("backups"), 10);
        let err = loader.load_bib(&BibId::from("missing")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn malformed_xml_is_config_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("bib_broken.xml"), "<bib id=\"broken\"").unwrap();
        let loader = ConfigLoader::new(tmp.path().to_path_buf(), tmp.path().join("backups"), 10);
        let err = loader.load_bib(&BibId::from("broken")).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_, _)));
    }

    #[test]
    fn reload_after_corruption_can_restore_last_known_good() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bib_c.xml");
        std::fs::write(&path, sample_xml("c")).unwrap();
        let loader = ConfigLoader::new(tmp.path().to_path_buf(), tmp.path().join("backups"), 10);
        loader.load_bib(&BibId::from("c")).unwrap();

        std::fs::write(&path, "<bib id=\"c\" broken").unwrap();
        assert!(loader.load_bib(&BibId::from("c")).is_err());

        let restored = loader.restore_latest_known_good(&BibId::from("c"));
        assert!(restored.is_some());
    }

    #[test]
    fn load_all_bibs_continues_past_one_failure() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("bib_good.xml"), sample_xml("good")).unwrap();
        std::fs::write(tmp.path().join("bib_bad.xml"), "<bib id=\"bad\"").unwrap();
        let loader = ConfigLoader::new(tmp.path().to_path_buf(), tmp.path().join("backups"), 10);

        let (bibs, errors) = loader.load_all_bibs();
        assert_eq!(bibs.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(bibs[0].id, BibId::from("good"));
    }
}

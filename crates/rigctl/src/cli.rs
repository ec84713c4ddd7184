//! Command-line interface (spec.md §6's CLI flag table).

use std::path::PathBuf;

use clap::{ArgGroup, Parser, ValueEnum};

/// Test orchestration service.
#[derive(Parser)]
#[command(name = "rigctl", version, about)]
#[command(group(ArgGroup::new("selection").args(["discover_bibs", "bib_ids"])))]
pub struct Cli {
    /// Directory watched for BIB files.
    #[arg(long, default_value = "Configuration")]
    pub config_dir: PathBuf,

    /// Enumerate all `bib_*.xml` in `--config-dir` and run each.
    #[arg(long)]
    pub discover_bibs: bool,

    /// Space-separated BIB ids to run; mutually exclusive with `--discover-bibs`.
    #[arg(long, value_delimiter = ' ')]
    pub bib_ids: Vec<String>,

    /// Execution mode.
    #[arg(long, value_enum, default_value_t = Mode::Single)]
    pub mode: Mode,

    /// Inter-cycle interval in seconds, for `continuous`/`scheduled` modes.
    #[arg(long)]
    pub interval: Option<f64>,

    /// Raise default log verbosity to the logging config's `detailed_filter`.
    #[arg(long)]
    pub detailed_logs: bool,

    /// Path to the optional service settings file (`rigctl.toml`), resolved
    /// relative to `--config-dir`'s parent if not given.
    #[arg(long)]
    pub service_config: Option<PathBuf>,

    /// Path to the logging configuration file. Its absence is a fatal
    /// startup error (spec.md §6).
    #[arg(long, default_value = "logging.toml")]
    pub logging_config: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Mode {
    Single,
    Continuous,
    Scheduled,
    Ondemand,
}

impl Cli {
    /// `None` when `--discover-bibs` (or neither flag) was given.
    pub fn selected_bib_ids(&self) -> Option<std::collections::HashSet<rigctl_core::ids::BibId>> {
        if self.bib_ids.is_empty() {
            None
        } else {
            Some(self.bib_ids.iter().map(|s| rigctl_core::ids::BibId::from(s.as_str())).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bib_ids_and_discover_bibs_are_mutually_exclusive() {
        let result = Cli::try_parse_from(["rigctl", "--discover-bibs", "--bib-ids", "a b"]);
        assert!(result.is_err());
    }

    #[test]
    fn bib_ids_alone_parses_into_a_selection_set() {
        let cli = Cli::try_parse_from(["rigctl", "--bib-ids", "alpha beta"]).unwrap();
        let selected = cli.selected_bib_ids().unwrap();
        assert_eq!(selected.len(), 2);
        assert!(selected.contains(&rigctl_core::ids::BibId::from("alpha")));
    }

    #[test]
    fn no_selection_flags_means_discover_everything() {
        let cli = Cli::try_parse_from(["rigctl"]).unwrap();
        assert!(cli.selected_bib_ids().is_none());
        assert!(!cli.discover_bibs);
    }

    #[test]
    fn continuous_mode_without_interval_is_accepted_by_the_parser() {
        // --interval is validated at startup, not parse time, since it is
        // only required for continuous/scheduled modes.
        let cli = Cli::try_parse_from(["rigctl", "--mode", "continuous"]).unwrap();
        assert!(cli.interval.is_none());
    }

    #[test]
    fn default_mode_is_single() {
        let cli = Cli::try_parse_from(["rigctl"]).unwrap();
        assert!(matches!(cli.mode, Mode::Single));
    }
}

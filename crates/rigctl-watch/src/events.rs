use std::path::PathBuf;

use rigctl_core::ids::BibId;

/// One BIB lifecycle event, emitted by [`crate::BibWatcher::run`].
///
/// Events for the same [`BibId`] are serialized (spec.md §4.D): the
/// watcher never emits a second event for BIB X while a handler for an
/// earlier X event is still being processed downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BibEvent {
    /// A new `bib_<id>.xml` appeared, or was present at startup's initial scan.
    Discovered(BibId, PathBuf),
    /// An existing `bib_<id>.xml` was modified.
    Changed(BibId, PathBuf),
    /// `bib_<id>.xml` was deleted or renamed away.
    Removed(BibId),
    /// Processing the event for this BIB failed downstream; not generated
    /// by the watcher itself, but shares the enum so handlers can fold it
    /// into the same match as the events that can trigger it.
    Error(BibId, String),
}

impl BibEvent {
    pub fn bib_id(&self) -> &BibId {
        match self {
            BibEvent::Discovered(id, _) | BibEvent::Changed(id, _) => id,
            BibEvent::Removed(id) => id,
            BibEvent::Error(id, _) => id,
        }
    }
}

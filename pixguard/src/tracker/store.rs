use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use pixguard_core::{
    ACTORS_FILE, ActorRecord, DAILY_TOTALS_FILE, DailyTotals, PixguardError, VANDAL_INDEX_FILE,
    VandalIndexDocument, read_json, write_atomic, write_json_atomic,
};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::ledger::{Dirty, Ledger};

/// One of the three persisted documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Doc {
    Actors,
    Index,
    Totals,
}

impl Doc {
    const fn file(self) -> &'static str {
        match self {
            Self::Actors => ACTORS_FILE,
            Self::Index => VANDAL_INDEX_FILE,
            Self::Totals => DAILY_TOTALS_FILE,
        }
    }

    const fn dirty(self) -> Dirty {
        Dirty {
            actors: matches!(self, Self::Actors),
            index: matches!(self, Self::Index),
            totals: matches!(self, Self::Totals),
        }
    }
}

/// A document serialized under the tracker lock, waiting to be written.
#[derive(Debug)]
pub(crate) struct Encoded {
    doc: Doc,
    bytes: Vec<u8>,
}

/// Location of the tracker's documents.
#[derive(Debug, Clone)]
pub(crate) struct Store {
    dir: PathBuf,
}

impl Store {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub(crate) fn path(&self, doc: Doc) -> PathBuf {
        self.dir.join(doc.file())
    }

    /// Load all documents, tolerating missing or malformed files.
    ///
    /// A malformed file is renamed aside with a `.corrupt-<timestamp>` suffix
    /// and the tracker starts without it.
    ///
    /// Actor records with stale derived scores are repaired and written back
    /// once before the tracker starts.
    pub(crate) fn load(&self) -> Ledger {
        let mut actors: BTreeMap<String, ActorRecord> =
            load_or_default(&self.path(Doc::Actors));
        let index: VandalIndexDocument = load_or_default(&self.path(Doc::Index));
        let totals: DailyTotals = load_or_default(&self.path(Doc::Totals));

        let mut migrated = 0usize;
        for (id, record) in &mut actors {
            if record.id.is_empty() {
                record.id.clone_from(id);
            }
            if record.normalize() {
                migrated += 1;
            }
        }
        if migrated > 0 {
            let path = self.path(Doc::Actors);
            match write_json_atomic(&path, &actors) {
                Ok(()) => info!(migrated, path = %path.display(), "recomputed stale actor scores"),
                Err(err) => warn!(error = %err, "failed to save migrated actor records"),
            }
        }

        let ledger = Ledger::restore(actors, &index, totals);
        info!(
            actors = ledger.actors.len(),
            snapshot = ledger.snapshot.len(),
            attributed = ledger.index.len(),
            dir = %self.dir.display(),
            "tracker state loaded"
        );
        ledger
    }

    /// Serialize the documents flagged in `dirty`.
    pub(crate) fn encode(ledger: &Ledger, dirty: Dirty) -> Vec<Encoded> {
        let mut out = Vec::new();
        for doc in [Doc::Actors, Doc::Index, Doc::Totals] {
            let wanted = match doc {
                Doc::Actors => dirty.actors,
                Doc::Index => dirty.index,
                Doc::Totals => dirty.totals,
            };
            if !wanted {
                continue;
            }
            let bytes = match doc {
                Doc::Actors => serde_json::to_vec_pretty(&ledger.actors),
                Doc::Index => serde_json::to_vec_pretty(&ledger.index_document()),
                Doc::Totals => serde_json::to_vec_pretty(&ledger.totals),
            };
            match bytes {
                Ok(bytes) => out.push(Encoded { doc, bytes }),
                Err(err) => warn!(file = doc.file(), error = %err, "failed to serialize document"),
            }
        }
        out
    }

    /// Write encoded documents; returns the flags of documents that failed.
    pub(crate) fn write(&self, docs: Vec<Encoded>) -> (Dirty, Option<PixguardError>) {
        let mut failed = Dirty::default();
        let mut last_err = None;
        for Encoded { doc, bytes } in docs {
            let path = self.path(doc);
            if let Err(err) = write_atomic(&path, &bytes) {
                warn!(path = %path.display(), error = %err, "persist failed; will retry");
                failed.merge(doc.dirty());
                last_err = Some(err);
            }
        }
        (failed, last_err)
    }
}

fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match read_json(path) {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "unreadable document; starting empty");
            set_aside(path);
            T::default()
        }
    }
}

/// Move an unreadable document to `<name>.corrupt-<timestamp>` so the next
/// flush cannot overwrite it.
fn set_aside(path: &Path) {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ")));
    let aside = PathBuf::from(name);
    match fs::rename(path, &aside) {
        Ok(()) => {
            warn!(from = %path.display(), to = %aside.display(), "moved unreadable document aside");
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to move unreadable document aside");
        }
    }
}

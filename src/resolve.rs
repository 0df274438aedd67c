//! Archive traversal: decides which entry represents each logical class and
//! reads its class file version.
//!
//! Per entry offered by the archive view:
//!
//! 1. directories are ignored
//! 2. repeated names are reported as duplicate entries
//! 3. signature block files are reported and never treated as classes
//! 4. anything that is not a `.class` outside `META-INF/versions` stops here
//! 5. the name is resolved through the view to its effective entry
//! 6. unversioned compiler generated classes (`Outer$1.class`) whose outer
//!    class has a distinct versioned copy are skipped
//! 7. the header of the effective entry is decoded; failures are recorded and
//!    the entry is left out
//! 8. a class path that is inserted twice keeps the first version
//!
//! Nothing that happens to a single entry aborts the scan. Only opening the
//! archive, building the worker pool or an interruption fail the whole call.

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use rayon::prelude::*;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::archive::{
    ArchiveError, Candidate, EntryReader, EntryView, JarArchive, RawEntry, VERSIONS_DIR, ViewMode,
};
use crate::config::ScanConfig;
use crate::diagnostic::{Diagnostic, DiagnosticKind, Severity};
use crate::manifest::ManifestSummary;
use crate::progress::ProgressTracker;
use crate::tally::VersionTally;
use crate::version::ClassFileVersion;

const SIGNING_FILE_SUFFIXES: [&str; 4] = [".RSA", ".DSA", ".SF", ".EC"];

/// Entries per task in fair (FIFO) scheduling.
const FAIR_CHUNK_LEN: usize = 64;

#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub archive: String,
    pub mode: ViewMode,
    pub manifest: Option<ManifestSummary>,
    pub classes: HashMap<String, ClassFileVersion>,
    pub diagnostics: Vec<Diagnostic>,
    pub entries_processed: usize,
    pub duration_ms: u64,
}

impl ScanReport {
    pub fn tally(&self) -> VersionTally {
        VersionTally::from_versions(self.classes.values())
    }

    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }
}

type ProgressSink = Arc<dyn Fn(usize, Option<usize>) + Send + Sync>;

pub struct ArchiveScanner {
    config: ScanConfig,
    interrupted: Arc<AtomicBool>,
    progress: Option<ProgressSink>,
}

impl ArchiveScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            interrupted: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    /// Sends progress samples to `sink` instead of the log while `track` is set.
    pub fn with_progress<F>(mut self, sink: F) -> Self
    where
        F: Fn(usize, Option<usize>) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(sink));
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Setting the returned flag makes running and future scans stop taking
    /// entries and return [`ArchiveError::Interrupted`].
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn scan(&self, path: &Path) -> Result<ScanReport, ArchiveError> {
        let start = Instant::now();
        let archive = JarArchive::open(path, self.config.multi_release, self.config.release)?;
        for diagnostic in archive.open_diagnostics() {
            diagnostic.emit();
        }

        let view = archive.view();
        let candidates = view.candidates();
        let processed = Arc::new(AtomicUsize::new(0));

        let mut tracker = self.config.track.then(|| {
            let sink = self.progress.clone();
            ProgressTracker::start(
                self.config.track_interval,
                Arc::clone(&processed),
                Some(candidates.len()),
                move |current, total| match (&sink, total) {
                    (Some(sink), _) => sink(current, total),
                    (None, Some(total)) => {
                        tracing::info!("Processing entries... ({current}/{total})")
                    }
                    (None, None) => tracing::info!("Processing entries... ({current})"),
                },
            )
        });

        let traversal = Traversal {
            view: view.as_ref(),
            config: &self.config,
            processed: &processed,
            interrupted: &self.interrupted,
        };

        let outcome = if self.config.is_effectively_parallel() {
            self.scan_parallel(&traversal, &archive, &candidates)
        } else {
            Ok(scan_serial(&traversal, &archive, &candidates))
        };

        if let Some(tracker) = tracker.as_mut() {
            tracker.stop();
        }
        let (classes, scan_diagnostics) = outcome?;

        if self.interrupted.load(Ordering::SeqCst) {
            return Err(ArchiveError::Interrupted(path.to_path_buf()));
        }

        let entries_processed = processed.load(Ordering::Relaxed);
        let duration_ms = start.elapsed().as_millis() as u64;
        if self.config.track || self.config.timing {
            tracing::info!("Processed {entries_processed} entries in {duration_ms} ms");
        }

        let mut diagnostics = archive.open_diagnostics().to_vec();
        diagnostics.extend(scan_diagnostics);

        Ok(ScanReport {
            archive: path.to_string_lossy().to_string(),
            mode: view.mode(),
            manifest: archive.manifest().map(|m| m.summary()),
            classes,
            diagnostics,
            entries_processed,
            duration_ms,
        })
    }

    fn scan_parallel(
        &self,
        traversal: &Traversal<'_>,
        archive: &JarArchive,
        candidates: &[Candidate<'_>],
    ) -> Result<(HashMap<String, ClassFileVersion>, Vec<Diagnostic>), ArchiveError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .thread_name(|i| format!("bva-entry-{i}"))
            .build()?;
        let store = ConcurrentStore::default();

        if self.config.fair {
            pool.scope_fifo(|scope| {
                for chunk in candidates.chunks(FAIR_CHUNK_LEN) {
                    let store = &store;
                    scope.spawn_fifo(move |_| {
                        let mut reader = archive.reader();
                        for candidate in chunk {
                            traversal.visit(store, &mut reader, *candidate);
                        }
                    });
                }
            });
        } else {
            pool.install(|| {
                candidates.par_iter().for_each_init(
                    || archive.reader(),
                    |reader, candidate| traversal.visit(&store, reader, *candidate),
                );
            });
        }

        // all workers have joined; tear the pool down before handing results back
        drop(pool);
        Ok(store.into_parts())
    }
}

fn scan_serial(
    traversal: &Traversal<'_>,
    archive: &JarArchive,
    candidates: &[Candidate<'_>],
) -> (HashMap<String, ClassFileVersion>, Vec<Diagnostic>) {
    let store = LocalStore::default();
    let mut reader = archive.reader();
    for candidate in candidates {
        traversal.visit(&store, &mut reader, *candidate);
    }
    store.into_parts()
}

struct Traversal<'a> {
    view: &'a dyn EntryView,
    config: &'a ScanConfig,
    processed: &'a AtomicUsize,
    interrupted: &'a AtomicBool,
}

impl Traversal<'_> {
    fn visit<S: ScanStore>(&self, store: &S, reader: &mut EntryReader, candidate: Candidate<'_>) {
        if self.interrupted.load(Ordering::Relaxed) {
            return;
        }
        self.processed.fetch_add(1, Ordering::Relaxed);

        if candidate.is_dir {
            return;
        }
        let name = candidate.name;

        let duplicate = !store.mark_seen(name);
        if duplicate {
            store.record(Diagnostic::for_entry(
                Severity::Warn,
                DiagnosticKind::DuplicateEntry,
                name,
                format!("duplicate entry: {name}"),
            ));
        }

        if is_signing_file(name) {
            store.record(Diagnostic::for_entry(
                Severity::Info,
                DiagnosticKind::SigningFile,
                name,
                format!("found signing file: {name}"),
            ));
        }

        if !name.ends_with(".class") || name.starts_with(VERSIONS_DIR) {
            return;
        }

        // a repeated name resolves to the record already taken for it
        if duplicate {
            return;
        }

        let Some(entry) = self.view.effective(name) else {
            store.record(Diagnostic::for_entry(
                Severity::Error,
                DiagnosticKind::EntryFailed,
                name,
                format!("entry {name} could not be resolved"),
            ));
            return;
        };

        if let Some(outer) = versioned_outer_class(self.view, name, entry) {
            store.record(Diagnostic::for_entry(
                Severity::Debug,
                DiagnosticKind::SyntheticSkipped,
                name,
                format!(
                    "skipping {name} (non-versioned compiler generated class whose base class {outer} is versioned)"
                ),
            ));
            return;
        }

        match reader.read_version(entry, self.config.verify, self.config.buffered) {
            Ok(version) => {
                if !store.insert_class(name, version) {
                    store.record(Diagnostic::for_entry(
                        Severity::Warn,
                        DiagnosticKind::DuplicateClass,
                        name,
                        format!("duplicate class: {name}, keeping the first version read"),
                    ));
                }
            }
            Err(e) => store.record(Diagnostic::for_entry(
                Severity::Error,
                DiagnosticKind::EntryFailed,
                name,
                format!("error when processing class {name}: {e}"),
            )),
        }
    }
}

/// For an unversioned compiler generated class such as `a/Outer$1.class`,
/// returns `a/Outer.class` when that outer class resolves to a different
/// physical entry than its base copy. Such a class belongs to the base copy
/// of its outer class only and must not be reported.
fn versioned_outer_class(view: &dyn EntryView, name: &str, effective: &RawEntry) -> Option<String> {
    if !name.contains('$') {
        return None;
    }

    let base = view.base(name)?;
    if base.id != effective.id {
        return None;
    }

    let mut segments = name.split('$');
    let outer = segments.next()?;
    let last = segments.last()?;
    let id = last.strip_suffix(".class").unwrap_or(last);
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let outer_class = format!("{outer}.class");
    let versioned = view.effective(&outer_class)?;
    let unversioned = view.base(&outer_class)?;
    (versioned.id != unversioned.id).then_some(outer_class)
}

fn is_signing_file(name: &str) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    file_name.starts_with("SIG-")
        || SIGNING_FILE_SUFFIXES
            .iter()
            .any(|suffix| file_name.ends_with(suffix))
}

/// Shared scan state. The implementation is picked once per scan from the
/// effective parallelism.
trait ScanStore {
    /// `false` when the name was already seen.
    fn mark_seen(&self, name: &str) -> bool;

    /// `false` when the class was already recorded; the first version stays.
    fn insert_class(&self, name: &str, version: ClassFileVersion) -> bool;

    fn record(&self, diagnostic: Diagnostic);
}

#[derive(Default)]
struct LocalStore {
    seen: RefCell<HashSet<String>>,
    classes: RefCell<HashMap<String, ClassFileVersion>>,
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl LocalStore {
    fn into_parts(self) -> (HashMap<String, ClassFileVersion>, Vec<Diagnostic>) {
        (self.classes.into_inner(), self.diagnostics.into_inner())
    }
}

impl ScanStore for LocalStore {
    fn mark_seen(&self, name: &str) -> bool {
        self.seen.borrow_mut().insert(name.to_string())
    }

    fn insert_class(&self, name: &str, version: ClassFileVersion) -> bool {
        let mut classes = self.classes.borrow_mut();
        if classes.contains_key(name) {
            return false;
        }
        classes.insert(name.to_string(), version);
        true
    }

    fn record(&self, diagnostic: Diagnostic) {
        diagnostic.emit();
        self.diagnostics.borrow_mut().push(diagnostic);
    }
}

#[derive(Default)]
struct ConcurrentStore {
    seen: DashSet<String>,
    classes: DashMap<String, ClassFileVersion>,
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl ConcurrentStore {
    fn into_parts(self) -> (HashMap<String, ClassFileVersion>, Vec<Diagnostic>) {
        let diagnostics = self
            .diagnostics
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (self.classes.into_iter().collect(), diagnostics)
    }
}

impl ScanStore for ConcurrentStore {
    fn mark_seen(&self, name: &str) -> bool {
        self.seen.insert(name.to_string())
    }

    fn insert_class(&self, name: &str, version: ClassFileVersion) -> bool {
        match self.classes.entry(name.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(version);
                true
            }
        }
    }

    fn record(&self, diagnostic: Diagnostic) {
        diagnostic.emit();
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(diagnostic);
    }
}

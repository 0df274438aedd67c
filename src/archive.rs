//! Archive access: opening a jar, indexing its physical entries and looking
//! entries up through a release-aware or a plain view.
//!
//! The view is chosen once, when the archive is opened. The versioned view is
//! only used when multi-release lookup is enabled and the manifest declares
//! `Multi-Release: true`; every other archive gets the plain view, where each
//! entry is its own effective entry.

use memmap2::Mmap;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::diagnostic::{Diagnostic, DiagnosticKind, Severity};
use crate::header::{HeaderError, read_class_file_version};
use crate::manifest::Manifest;
use crate::version::ClassFileVersion;

pub const VERSIONS_DIR: &str = "META-INF/versions";
pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";

/// Versioned directories below this release are ignored by runtimes.
pub const MIN_VERSIONED_RELEASE: u32 = 9;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive file does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("can't process a directory: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("can't read the file {}: {source}", .path.display())]
    NotReadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can't read zip structure of {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("scan of {} was interrupted", .0.display())]
    Interrupted(PathBuf),

    #[error("failed to start entry worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Failure reading one entry. Never fatal for the archive.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error(transparent)]
    Zip(#[from] ZipError),

    #[error(transparent)]
    Header(#[from] HeaderError),
}

/// Physical identity of a zip record: where its local header starts plus its CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId {
    pub offset: u64,
    pub crc32: u32,
}

#[derive(Debug, Clone)]
pub struct RawEntry {
    pub index: usize,
    pub name: String,
    pub is_dir: bool,
    pub id: EntryId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    Versioned { release: Option<u32> },
    Plain,
}

/// An entry offered by a view's enumeration, under its logical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub name: &'a str,
    pub is_dir: bool,
}

pub trait EntryView: Send + Sync {
    fn mode(&self) -> ViewMode;

    /// Entries to traverse, in archive order.
    fn candidates(&self) -> Vec<Candidate<'_>>;

    /// The entry a runtime would load for `name` under this view.
    fn effective(&self, name: &str) -> Option<&RawEntry>;

    /// The top-level entry for `name`, ignoring any versioned overlay.
    fn base(&self, name: &str) -> Option<&RawEntry>;
}

#[derive(Clone)]
struct MappedBytes(Arc<Mmap>);

impl AsRef<[u8]> for MappedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

type JarZip = ZipArchive<Cursor<MappedBytes>>;

pub struct JarArchive {
    path: PathBuf,
    zip: JarZip,
    entries: Vec<RawEntry>,
    by_name: HashMap<String, usize>,
    versioned: HashMap<String, BTreeMap<u32, usize>>,
    versioned_order: Vec<String>,
    manifest: Option<Manifest>,
    mode: ViewMode,
    diagnostics: Vec<Diagnostic>,
}

impl JarArchive {
    /// Opens `path` read-only. `multi_release` says whether release-aware lookup
    /// is available at all; `release` bounds which versioned slices apply
    /// (`None` means every slice does).
    pub fn open(
        path: &Path,
        multi_release: bool,
        release: Option<u32>,
    ) -> Result<Self, ArchiveError> {
        if !path.exists() {
            return Err(ArchiveError::NotFound(path.to_path_buf()));
        }
        if !path.is_file() {
            return Err(ArchiveError::NotAFile(path.to_path_buf()));
        }

        let not_readable = |source| ArchiveError::NotReadable {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(not_readable)?;
        let len = file.metadata().map_err(not_readable)?.len();
        if len == 0 {
            return Err(ArchiveError::Corrupt {
                path: path.to_path_buf(),
                source: ZipError::InvalidArchive("empty file"),
            });
        }

        // SAFETY: The file is opened read-only and the mapping is kept alive by the Arc
        // for as long as any reader cloned from this archive exists.
        let mmap = unsafe { Mmap::map(&file) }.map_err(not_readable)?;
        let mut zip = ZipArchive::new(Cursor::new(MappedBytes(Arc::new(mmap)))).map_err(
            |source| ArchiveError::Corrupt {
                path: path.to_path_buf(),
                source,
            },
        )?;

        let mut diagnostics = Vec::new();
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            match zip.by_index(i) {
                Ok(file) => entries.push(RawEntry {
                    index: i,
                    name: file.name().to_string(),
                    is_dir: file.is_dir(),
                    id: EntryId {
                        offset: file.header_start(),
                        crc32: file.crc32(),
                    },
                }),
                Err(e) => diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    DiagnosticKind::EntryFailed,
                    format!("unreadable zip entry #{i}: {e}"),
                )),
            }
        }

        let mut by_name = HashMap::with_capacity(entries.len());
        let mut versioned: HashMap<String, BTreeMap<u32, usize>> = HashMap::new();
        let mut versioned_order = Vec::new();
        for (pos, entry) in entries.iter().enumerate() {
            by_name.entry(entry.name.clone()).or_insert(pos);

            if let Some((release, logical)) = split_versioned_name(&entry.name)
                && !entry.is_dir
            {
                let slices = versioned.entry(logical.to_string()).or_insert_with(|| {
                    versioned_order.push(logical.to_string());
                    BTreeMap::new()
                });
                slices.entry(release).or_insert(pos);
            }
        }

        let manifest = match by_name.get(MANIFEST_NAME) {
            Some(&pos) => match read_entry(&mut zip, &entries[pos]) {
                Ok(bytes) => Some(Manifest::parse(&bytes)),
                Err(e) => {
                    diagnostics.push(Diagnostic::for_entry(
                        Severity::Warn,
                        DiagnosticKind::Manifest,
                        MANIFEST_NAME,
                        format!("failed to read manifest: {e}"),
                    ));
                    None
                }
            },
            None => None,
        };

        let declared_multi_release = manifest.as_ref().is_some_and(Manifest::is_multi_release);
        let mode = if multi_release && declared_multi_release {
            ViewMode::Versioned { release }
        } else {
            ViewMode::Plain
        };

        let mut archive = Self {
            path: path.to_path_buf(),
            zip,
            entries,
            by_name,
            versioned,
            versioned_order,
            manifest,
            mode,
            diagnostics: Vec::new(),
        };
        let mut info = archive.manifest_diagnostics(multi_release);
        info.append(&mut diagnostics);
        archive.diagnostics = info;
        Ok(archive)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    pub fn entries(&self) -> &[RawEntry] {
        &self.entries
    }

    /// Informational findings gathered while opening: manifest flags and unreadable records.
    pub fn open_diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_versioned_entries(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.name.starts_with(VERSIONS_DIR))
    }

    pub fn view(&self) -> Box<dyn EntryView + '_> {
        match self.mode {
            ViewMode::Versioned { release } => Box::new(VersionedView {
                archive: self,
                release,
            }),
            ViewMode::Plain => Box::new(PlainView { archive: self }),
        }
    }

    /// An independent handle for reading entry bytes. Cheap; shares the mapping.
    pub fn reader(&self) -> EntryReader {
        EntryReader {
            zip: self.zip.clone(),
        }
    }

    fn base_entry(&self, name: &str) -> Option<&RawEntry> {
        self.by_name.get(name).map(|&pos| &self.entries[pos])
    }

    fn versioned_entry(&self, name: &str, release: Option<u32>) -> Option<&RawEntry> {
        let slices = self.versioned.get(name)?;
        let (_, &pos) = match release {
            Some(r) => slices.range(..=r).next_back(),
            None => slices.iter().next_back(),
        }?;
        Some(&self.entries[pos])
    }

    fn manifest_diagnostics(&self, multi_release: bool) -> Vec<Diagnostic> {
        let info = |message: &str| {
            Diagnostic::new(Severity::Info, DiagnosticKind::Manifest, message)
        };

        let Some(manifest) = self.manifest.as_ref() else {
            return vec![Diagnostic::new(
                Severity::Warn,
                DiagnosticKind::Manifest,
                "the jar has no manifest",
            )];
        };

        let mut out = Vec::new();
        if manifest.is_multi_release() {
            out.push(info("the jar is a multi release jar"));
            if !multi_release {
                out.push(Diagnostic::new(
                    Severity::Debug,
                    DiagnosticKind::Manifest,
                    "multi release lookup is disabled, reading base entries only",
                ));
            }
        } else {
            out.push(info("the jar is not a multi release jar"));
            if self.has_versioned_entries() {
                out.push(Diagnostic::new(
                    Severity::Warn,
                    DiagnosticKind::Manifest,
                    "the jar is not a multi release jar but it has META-INF/versions; \
                     add Multi-Release: true to MANIFEST.MF, otherwise those entries have no effect at runtime",
                ));
            }
        }

        out.push(info(if manifest.is_sealed() {
            "the jar is sealed globally"
        } else {
            "the jar is not sealed globally"
        }));
        out.push(info(if manifest.is_signed() {
            "the jar is signed from manifest"
        } else {
            "the jar is not signed from manifest"
        }));
        out
    }
}

pub struct EntryReader {
    zip: JarZip,
}

impl EntryReader {
    /// Decodes the class file header of `entry`. The entry stream is closed on return.
    pub fn read_version(
        &mut self,
        entry: &RawEntry,
        verify: bool,
        buffered: bool,
    ) -> Result<ClassFileVersion, EntryError> {
        let mut file = self.zip.by_index(entry.index)?;
        let version = if buffered {
            read_class_file_version(&mut BufReader::new(file), verify)?
        } else {
            read_class_file_version(&mut file, verify)?
        };
        Ok(version)
    }
}

struct VersionedView<'a> {
    archive: &'a JarArchive,
    release: Option<u32>,
}

impl EntryView for VersionedView<'_> {
    fn mode(&self) -> ViewMode {
        ViewMode::Versioned {
            release: self.release,
        }
    }

    fn candidates(&self) -> Vec<Candidate<'_>> {
        let archive = self.archive;
        let mut out: Vec<Candidate<'_>> = archive
            .entries
            .iter()
            .filter(|e| !e.name.starts_with(VERSIONS_DIR))
            .map(|e| Candidate {
                name: e.name.as_str(),
                is_dir: e.is_dir,
            })
            .collect();

        // classes that only exist inside an applicable versioned slice
        out.extend(
            archive
                .versioned_order
                .iter()
                .filter(|name| !archive.by_name.contains_key(name.as_str()))
                .filter(|name| archive.versioned_entry(name, self.release).is_some())
                .map(|name| Candidate {
                    name: name.as_str(),
                    is_dir: false,
                }),
        );
        out
    }

    fn effective(&self, name: &str) -> Option<&RawEntry> {
        self.archive
            .versioned_entry(name, self.release)
            .or_else(|| self.archive.base_entry(name))
    }

    fn base(&self, name: &str) -> Option<&RawEntry> {
        self.archive.base_entry(name)
    }
}

struct PlainView<'a> {
    archive: &'a JarArchive,
}

impl EntryView for PlainView<'_> {
    fn mode(&self) -> ViewMode {
        ViewMode::Plain
    }

    fn candidates(&self) -> Vec<Candidate<'_>> {
        self.archive
            .entries
            .iter()
            .map(|e| Candidate {
                name: e.name.as_str(),
                is_dir: e.is_dir,
            })
            .collect()
    }

    fn effective(&self, name: &str) -> Option<&RawEntry> {
        self.archive.base_entry(name)
    }

    fn base(&self, name: &str) -> Option<&RawEntry> {
        self.archive.base_entry(name)
    }
}

/// `META-INF/versions/11/a/B.class` -> `(11, "a/B.class")`.
fn split_versioned_name(name: &str) -> Option<(u32, &str)> {
    let rest = name.strip_prefix(VERSIONS_DIR)?.strip_prefix('/')?;
    let (release, logical) = rest.split_once('/')?;
    let release = release.parse::<u32>().ok()?;
    if release < MIN_VERSIONED_RELEASE || logical.is_empty() {
        return None;
    }
    Some((release, logical))
}

fn read_entry(zip: &mut JarZip, entry: &RawEntry) -> Result<Vec<u8>, EntryError> {
    let mut file = zip.by_index(entry.index)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| EntryError::Header(HeaderError::Io(e)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};
    use zip::write::FileOptions;

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "bva_archive_test_{}_{}_{}_{}",
            std::process::id(),
            nanos,
            COUNTER.fetch_add(1, Ordering::Relaxed),
            name
        ))
    }

    fn write_jar(path: &Path, entries: &[(&str, &[u8])]) -> anyhow::Result<()> {
        let file = File::create(path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for (name, content) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options)?;
            } else {
                zip.start_file(*name, options)?;
                zip.write_all(content)?;
            }
        }
        zip.finish()?;
        Ok(())
    }

    const MR_MANIFEST: &[u8] = b"Manifest-Version: 1.0\r\nMulti-Release: true\r\n\r\n";

    #[test]
    fn open_rejects_missing_directory_and_garbage() -> anyhow::Result<()> {
        let missing = temp_path("missing.jar");
        assert!(matches!(
            JarArchive::open(&missing, true, None),
            Err(ArchiveError::NotFound(_))
        ));

        let dir = temp_path("dir");
        std::fs::create_dir_all(&dir)?;
        assert!(matches!(
            JarArchive::open(&dir, true, None),
            Err(ArchiveError::NotAFile(_))
        ));

        let garbage = temp_path("garbage.jar");
        std::fs::write(&garbage, b"definitely not a zip file")?;
        assert!(matches!(
            JarArchive::open(&garbage, true, None),
            Err(ArchiveError::Corrupt { .. })
        ));

        let empty = temp_path("empty.jar");
        std::fs::write(&empty, b"")?;
        assert!(matches!(
            JarArchive::open(&empty, true, None),
            Err(ArchiveError::Corrupt { .. })
        ));

        let _ = std::fs::remove_dir_all(dir);
        let _ = std::fs::remove_file(garbage);
        let _ = std::fs::remove_file(empty);
        Ok(())
    }

    #[test]
    fn versioned_view_prefers_highest_applicable_release() -> anyhow::Result<()> {
        let jar = temp_path("mr.jar");
        write_jar(
            &jar,
            &[
                (MANIFEST_NAME, MR_MANIFEST),
                ("a/Foo.class", b"base"),
                ("META-INF/versions/11/a/Foo.class", b"eleven"),
                ("META-INF/versions/17/a/Foo.class", b"seventeen"),
                ("META-INF/versions/17/a/OnlyNew.class", b"new"),
            ],
        )?;

        let archive = JarArchive::open(&jar, true, Some(11))?;
        assert_eq!(archive.mode(), ViewMode::Versioned { release: Some(11) });
        let view = archive.view();
        assert_eq!(
            view.effective("a/Foo.class").map(|e| e.name.as_str()),
            Some("META-INF/versions/11/a/Foo.class")
        );
        assert_eq!(
            view.base("a/Foo.class").map(|e| e.name.as_str()),
            Some("a/Foo.class")
        );
        assert!(view.effective("a/OnlyNew.class").is_none());
        assert!(
            !view
                .candidates()
                .iter()
                .any(|c| c.name.starts_with(VERSIONS_DIR) || c.name == "a/OnlyNew.class")
        );

        let newest = JarArchive::open(&jar, true, None)?;
        let view = newest.view();
        assert_eq!(
            view.effective("a/Foo.class").map(|e| e.name.as_str()),
            Some("META-INF/versions/17/a/Foo.class")
        );
        assert!(view.candidates().iter().any(|c| c.name == "a/OnlyNew.class"));

        std::fs::remove_file(jar)?;
        Ok(())
    }

    #[test]
    fn plain_view_when_not_declared_or_disabled() -> anyhow::Result<()> {
        let undeclared = temp_path("undeclared.jar");
        write_jar(
            &undeclared,
            &[
                (MANIFEST_NAME, b"Manifest-Version: 1.0\r\n\r\n"),
                ("a/Foo.class", b"base"),
                ("META-INF/versions/11/a/Foo.class", b"eleven"),
            ],
        )?;
        let archive = JarArchive::open(&undeclared, true, None)?;
        assert_eq!(archive.mode(), ViewMode::Plain);
        assert!(
            archive
                .open_diagnostics()
                .iter()
                .any(|d| d.severity == Severity::Warn && d.message.contains("META-INF/versions"))
        );
        let view = archive.view();
        assert_eq!(
            view.effective("a/Foo.class").map(|e| e.id),
            view.base("a/Foo.class").map(|e| e.id)
        );
        assert_eq!(view.candidates().len(), 3);

        let declared = temp_path("declared.jar");
        write_jar(
            &declared,
            &[(MANIFEST_NAME, MR_MANIFEST), ("a/Foo.class", b"base")],
        )?;
        assert_eq!(JarArchive::open(&declared, false, None)?.mode(), ViewMode::Plain);

        std::fs::remove_file(undeclared)?;
        std::fs::remove_file(declared)?;
        Ok(())
    }

    #[test]
    fn missing_manifest_is_reported() -> anyhow::Result<()> {
        let jar = temp_path("nomanifest.jar");
        write_jar(&jar, &[("a/Foo.class", b"x")])?;
        let archive = JarArchive::open(&jar, true, None)?;
        assert!(archive.manifest().is_none());
        assert_eq!(archive.open_diagnostics().len(), 1);
        assert_eq!(archive.open_diagnostics()[0].severity, Severity::Warn);
        std::fs::remove_file(jar)?;
        Ok(())
    }

    #[test]
    fn entry_reader_decodes_header() -> anyhow::Result<()> {
        let jar = temp_path("reader.jar");
        write_jar(
            &jar,
            &[("a/Foo.class", &[0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 0x3D, 9, 9])],
        )?;
        let archive = JarArchive::open(&jar, true, None)?;
        let entry = archive.view().effective("a/Foo.class").cloned().unwrap();
        let mut reader = archive.reader();
        assert_eq!(
            reader.read_version(&entry, true, true)?,
            ClassFileVersion::new(61, 0)
        );
        assert_eq!(
            reader.read_version(&entry, true, false)?,
            ClassFileVersion::new(61, 0)
        );
        std::fs::remove_file(jar)?;
        Ok(())
    }

    #[test]
    fn splits_versioned_names() {
        assert_eq!(
            split_versioned_name("META-INF/versions/11/a/B.class"),
            Some((11, "a/B.class"))
        );
        assert_eq!(split_versioned_name("META-INF/versions/8/a/B.class"), None);
        assert_eq!(split_versioned_name("META-INF/versions/x/a/B.class"), None);
        assert_eq!(split_versioned_name("META-INF/versions/11/"), None);
        assert_eq!(split_versioned_name("a/B.class"), None);
    }
}

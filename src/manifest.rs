//! `META-INF/MANIFEST.MF` parsing.
//!
//! The manifest is a list of sections separated by blank lines. The first one
//! holds the main attributes, later ones describe individual entries and start
//! with a `Name:` attribute. Lines beginning with a single space continue the
//! previous value. Attribute names compare case-insensitively.

use serde::Serialize;

pub const MULTI_RELEASE: &str = "Multi-Release";
pub const SEALED: &str = "Sealed";

const SIGNATURE_KEY_SUFFIXES: [&str; 3] = [
    "-Digest-Manifest-Main-Attributes",
    "-Digest-Manifest",
    "-Digest",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    attributes: Vec<(String, String)>,
}

impl Section {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|(k, _)| k.as_str())
    }

    pub fn name(&self) -> Option<&str> {
        self.get("Name")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    main: Section,
    entries: Vec<Section>,
}

impl Manifest {
    pub fn parse(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let mut main: Option<Section> = None;
        let mut entries = Vec::new();
        let mut current = Section::default();

        for line in text.lines() {
            if line.is_empty() {
                // the first blank line ends the main section even when it is empty
                if main.is_none() {
                    main = Some(std::mem::take(&mut current));
                } else if !current.attributes.is_empty() {
                    entries.push(std::mem::take(&mut current));
                }
                continue;
            }

            if let Some(rest) = line.strip_prefix(' ') {
                if let Some((_, value)) = current.attributes.last_mut() {
                    value.push_str(rest);
                }
                continue;
            }

            if let Some((key, value)) = line.split_once(':') {
                current
                    .attributes
                    .push((key.trim().to_string(), value.trim_start().to_string()));
            }
        }

        let main = match main {
            None => current,
            Some(main) => {
                if !current.attributes.is_empty() {
                    entries.push(current);
                }
                main
            }
        };

        Self { main, entries }
    }

    pub fn main_attribute(&self, key: &str) -> Option<&str> {
        self.main.get(key)
    }

    pub fn entry_sections(&self) -> &[Section] {
        &self.entries
    }

    /// Declared `Multi-Release: true`. Says nothing about how a runtime treats the jar.
    pub fn is_multi_release(&self) -> bool {
        is_true(self.main_attribute(MULTI_RELEASE))
    }

    pub fn is_sealed(&self) -> bool {
        is_true(self.main_attribute(SEALED))
    }

    /// Any per-entry digest attribute. Signature block files are not consulted here.
    pub fn is_signed(&self) -> bool {
        self.entries.iter().flat_map(Section::keys).any(|key| {
            SIGNATURE_KEY_SUFFIXES
                .iter()
                .any(|suffix| key.ends_with(suffix))
        })
    }

    pub fn summary(&self) -> ManifestSummary {
        ManifestSummary {
            multi_release: self.is_multi_release(),
            sealed: self.is_sealed(),
            signed: self.is_signed(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManifestSummary {
    pub multi_release: bool,
    pub sealed: bool,
    pub signed: bool,
}

fn is_true(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNED: &str = "Manifest-Version: 1.0\r\n\
Multi-Release: TRUE\r\n\
Created-By: 17 (Vendor)\r\n\
\r\n\
Name: com/example/Foo.class\r\n\
SHA-256-Digest: abcdefghijklmnopqrstuvwxyz0123456789abcdefghijklmnopqrst\r\n\
\x20uv\r\n\
\r\n";

    #[test]
    fn parses_main_and_entry_sections() {
        let manifest = Manifest::parse(SIGNED.as_bytes());
        assert_eq!(manifest.main_attribute("manifest-version"), Some("1.0"));
        assert!(manifest.is_multi_release());
        assert!(!manifest.is_sealed());

        let entries = manifest.entry_sections();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name(), Some("com/example/Foo.class"));
        assert!(
            entries[0]
                .get("SHA-256-Digest")
                .is_some_and(|v| v.ends_with("rstuv"))
        );
        assert!(manifest.is_signed());
    }

    #[test]
    fn leading_blank_line_leaves_main_section_empty() {
        let manifest =
            Manifest::parse(b"\r\nName: com/example/Foo.class\r\nMulti-Release: true\r\n\r\n");
        assert!(manifest.main_attribute("Name").is_none());
        assert!(!manifest.is_multi_release());
        assert_eq!(manifest.entry_sections().len(), 1);
        assert_eq!(
            manifest.entry_sections()[0].name(),
            Some("com/example/Foo.class")
        );
    }

    #[test]
    fn plain_manifest_has_no_flags() {
        let manifest = Manifest::parse(b"Manifest-Version: 1.0\nSealed: true\n");
        assert!(!manifest.is_multi_release());
        assert!(manifest.is_sealed());
        assert!(!manifest.is_signed());
        assert!(manifest.entry_sections().is_empty());
    }

    #[test]
    fn empty_manifest_is_tolerated() {
        let manifest = Manifest::parse(b"");
        assert_eq!(manifest, Manifest::default());
        assert!(!manifest.summary().multi_release);
    }
}

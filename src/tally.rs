use serde::Serialize;
use std::collections::BTreeMap;

use crate::version::ClassFileVersion;

/// How many classes use each class file version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionTally {
    counts: BTreeMap<ClassFileVersion, usize>,
    total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TallyRow {
    pub version: String,
    pub platform_version: i32,
    pub preview: bool,
    pub classes: usize,
    pub percent: f64,
}

impl VersionTally {
    pub fn from_versions<'a, I>(versions: I) -> Self
    where
        I: IntoIterator<Item = &'a ClassFileVersion>,
    {
        let mut tally = Self::default();
        for version in versions {
            tally.record(*version);
        }
        tally
    }

    pub fn record(&mut self, version: ClassFileVersion) {
        *self.counts.entry(version).or_insert(0) += 1;
        self.total += 1;
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn count(&self, version: &ClassFileVersion) -> usize {
        self.counts.get(version).copied().unwrap_or(0)
    }

    pub fn percent(&self, version: &ClassFileVersion) -> f64 {
        percent_of(self.count(version), self.total)
    }

    /// Versions in ascending order with their usage.
    pub fn iter(&self) -> impl Iterator<Item = (&ClassFileVersion, usize)> {
        self.counts.iter().map(|(v, n)| (v, *n))
    }

    pub fn rows(&self) -> Vec<TallyRow> {
        self.iter()
            .map(|(version, classes)| TallyRow {
                version: version.to_string(),
                platform_version: version.to_platform_version(),
                preview: version.is_preview(),
                classes,
                percent: percent_of(classes, self.total),
            })
            .collect()
    }

    /// `"6 out of total 10 classes (%60) use 52.0 (Java 8) class file version"` per version.
    pub fn summary_lines(&self) -> Vec<String> {
        self.iter()
            .map(|(version, classes)| {
                format!(
                    "{classes} out of total {} classes (%{}) use {} class file version",
                    self.total,
                    format_percent(percent_of(classes, self.total)),
                    version.describe()
                )
            })
            .collect()
    }
}

pub fn percent_of(current: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (current as f64 * 100.0) / total as f64
}

/// At most two fractional digits, rounded up, trailing zeros dropped: `33.333` -> `"33.34"`.
pub fn format_percent(percent: f64) -> String {
    // tolerate representation error so exact values do not round up a step
    let hundredths = (percent * 100.0 - 1e-6).ceil().max(0.0) as u64;
    let whole = hundredths / 100;
    let frac = hundredths % 100;
    match frac {
        0 => whole.to_string(),
        f if f % 10 == 0 => format!("{whole}.{}", f / 10),
        f => format!("{whole}.{f:02}"),
    }
}

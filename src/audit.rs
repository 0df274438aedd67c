//! Threshold and preview checks over scanned classes.

use serde::Serialize;
use std::collections::HashMap;

use crate::version::ClassFileVersion;

#[derive(Debug, Clone, Default)]
pub struct AuditPolicy {
    pub below: Option<ClassFileVersion>,
    pub above: Option<ClassFileVersion>,
    /// Threshold findings are limited to class paths containing this text.
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    Preview {
        class: String,
        version: ClassFileVersion,
    },
    Below {
        class: String,
        version: ClassFileVersion,
        threshold: ClassFileVersion,
    },
    Above {
        class: String,
        version: ClassFileVersion,
        threshold: ClassFileVersion,
    },
}

impl Finding {
    pub fn class(&self) -> &str {
        match self {
            Finding::Preview { class, .. }
            | Finding::Below { class, .. }
            | Finding::Above { class, .. } => class,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Finding::Preview { class, version } => format!(
                "class {class} uses preview language features ({version}, Java {} with preview language features)",
                version.to_platform_version()
            ),
            Finding::Below {
                class,
                version,
                threshold,
            } => format!(
                "class {class} uses version {} which is below specified ({threshold}, Java {})",
                version.describe(),
                threshold.to_platform_version()
            ),
            Finding::Above {
                class,
                version,
                threshold,
            } => format!(
                "class {class} uses version {} which is above specified ({threshold}, Java {})",
                version.describe(),
                threshold.to_platform_version()
            ),
        }
    }
}

impl AuditPolicy {
    fn matches_filter(&self, class: &str) -> bool {
        self.filter.as_deref().is_none_or(|f| class.contains(f))
    }

    /// Findings ordered by class path.
    pub fn audit(&self, classes: &HashMap<String, ClassFileVersion>) -> Vec<Finding> {
        let mut sorted: Vec<(&String, &ClassFileVersion)> = classes.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let mut findings = Vec::new();
        for (class, version) in sorted {
            if version.is_preview() {
                findings.push(Finding::Preview {
                    class: class.clone(),
                    version: *version,
                });
            }

            if !self.matches_filter(class) {
                continue;
            }

            if let Some(threshold) = self.below
                && threshold.is_higher_than(version)
            {
                findings.push(Finding::Below {
                    class: class.clone(),
                    version: *version,
                    threshold,
                });
            }

            if let Some(threshold) = self.above
                && version.is_higher_than(&threshold)
            {
                findings.push(Finding::Above {
                    class: class.clone(),
                    version: *version,
                    threshold,
                });
            }
        }
        findings
    }
}

use anyhow::{Context, Result};
use bytecode_version_analyzer::archive::ViewMode;
use bytecode_version_analyzer::audit::{AuditPolicy, Finding};
use bytecode_version_analyzer::cli::{Cli, OutputFormat};
use bytecode_version_analyzer::config::{ScanConfig, resolve_audit_policy, resolve_scan_config};
use bytecode_version_analyzer::diagnostic::{Diagnostic, Severity};
use bytecode_version_analyzer::header::class_file_version;
use bytecode_version_analyzer::logging::{Verbosity, init_logging};
use bytecode_version_analyzer::manifest::ManifestSummary;
use bytecode_version_analyzer::resolve::{ArchiveScanner, ScanReport};
use bytecode_version_analyzer::tally::TallyRow;
use bytecode_version_analyzer::version::ClassFileVersion;
use clap::Parser;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.effective_verbosity());

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = resolve_scan_config(cli)?;
    let policy = resolve_audit_policy(cli);
    let scanner = ArchiveScanner::new(config);

    let outputs: Vec<PathOutput> = cli
        .paths
        .iter()
        .map(|path| analyze_path(&scanner, &policy, path))
        .collect();

    write_output(&outputs, cli.format)?;

    let failed = outputs.iter().any(|o| o.fails(cli.fail_verbosity));
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum PathOutput {
    Class {
        path: String,
        version: ClassFileVersion,
        description: String,
        findings: Vec<Finding>,
    },
    Archive {
        path: String,
        mode: ViewMode,
        manifest: Option<ManifestSummary>,
        total: usize,
        versions: Vec<TallyRow>,
        #[serde(skip)]
        summary: Vec<String>,
        findings: Vec<Finding>,
        diagnostics: Vec<Diagnostic>,
        entries_processed: usize,
        duration_ms: u64,
    },
    Failed {
        path: String,
        error: String,
    },
}

impl PathOutput {
    /// Whether this result should turn the exit status into a failure.
    /// Paths that could not be analyzed at all always do.
    fn fails(&self, level: Verbosity) -> bool {
        match self {
            PathOutput::Failed { .. } => true,
            PathOutput::Class { findings, .. } => {
                !findings.is_empty() && level.admits(Severity::Warn)
            }
            PathOutput::Archive {
                findings,
                diagnostics,
                ..
            } => {
                (!findings.is_empty() && level.admits(Severity::Warn))
                    || diagnostics.iter().any(|d| level.admits(d.severity))
            }
        }
    }
}

fn analyze_path(scanner: &ArchiveScanner, policy: &AuditPolicy, path: &Path) -> PathOutput {
    let path_key = path.to_string_lossy().to_string();
    let is_class_file = path.extension().is_some_and(|ext| ext == "class");

    let outcome = if is_class_file {
        analyze_class_file(scanner.config(), policy, path)
    } else {
        analyze_archive(scanner, policy, path)
    };

    outcome.unwrap_or_else(|e| {
        tracing::error!("{e:#}");
        PathOutput::Failed {
            path: path_key,
            error: format!("{e:#}"),
        }
    })
}

fn analyze_class_file(
    config: &ScanConfig,
    policy: &AuditPolicy,
    path: &Path,
) -> Result<PathOutput> {
    let path_key = path.to_string_lossy().to_string();
    let version = class_file_version(path, config.verify, config.buffered)
        .with_context(|| format!("failed to read class file {}", path.display()))?;

    let classes = HashMap::from([(path_key.clone(), version)]);
    let findings = policy.audit(&classes);
    report_findings(&findings);

    Ok(PathOutput::Class {
        path: path_key,
        version,
        description: version.describe(),
        findings,
    })
}

fn analyze_archive(
    scanner: &ArchiveScanner,
    policy: &AuditPolicy,
    path: &Path,
) -> Result<PathOutput> {
    let report: ScanReport = scanner
        .scan(path)
        .with_context(|| format!("failed to analyze {}", path.display()))?;

    let findings = policy.audit(&report.classes);
    report_findings(&findings);

    let tally = report.tally();
    Ok(PathOutput::Archive {
        path: report.archive,
        mode: report.mode,
        manifest: report.manifest,
        total: tally.total(),
        versions: tally.rows(),
        summary: tally.summary_lines(),
        findings,
        diagnostics: report.diagnostics,
        entries_processed: report.entries_processed,
        duration_ms: report.duration_ms,
    })
}

fn report_findings(findings: &[Finding]) {
    for finding in findings {
        tracing::warn!(class = finding.class(), "{}", finding.message());
    }
}

fn write_output(outputs: &[PathOutput], format: OutputFormat) -> Result<()> {
    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(outputs)?,
        OutputFormat::Text => render_text(outputs),
    };

    print!("{content}");
    if !content.is_empty() && !content.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn render_text(outputs: &[PathOutput]) -> String {
    let mut out = String::new();
    for output in outputs {
        match output {
            PathOutput::Class {
                path, description, ..
            } => {
                out.push_str(&format!("{path}: {description}\n"));
            }
            PathOutput::Archive {
                path,
                total,
                summary,
                ..
            } => {
                out.push_str(&format!("{path}:\n"));
                if *total == 0 {
                    out.push_str("no classes found\n");
                }
                for line in summary {
                    out.push_str(line);
                    out.push('\n');
                }
            }
            PathOutput::Failed { .. } => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecode_version_analyzer::diagnostic::DiagnosticKind;

    fn archive_output(findings: Vec<Finding>, diagnostics: Vec<Diagnostic>) -> PathOutput {
        PathOutput::Archive {
            path: "app.jar".to_string(),
            mode: ViewMode::Plain,
            manifest: None,
            total: 0,
            versions: Vec::new(),
            summary: Vec::new(),
            findings,
            diagnostics,
            entries_processed: 0,
            duration_ms: 0,
        }
    }

    #[test]
    fn fail_verbosity_compares_against_reported_severity() {
        let warned = archive_output(
            Vec::new(),
            vec![Diagnostic::new(
                Severity::Warn,
                DiagnosticKind::Manifest,
                "the jar has no manifest",
            )],
        );
        assert!(warned.fails(Verbosity::Warn));
        assert!(warned.fails(Verbosity::Info));
        assert!(!warned.fails(Verbosity::Error));
        assert!(!warned.fails(Verbosity::None));

        let flagged = archive_output(
            vec![Finding::Preview {
                class: "a/A.class".to_string(),
                version: ClassFileVersion::new(65, 0xFFFF),
            }],
            Vec::new(),
        );
        assert!(flagged.fails(Verbosity::Warn));
        assert!(!flagged.fails(Verbosity::Error));
    }

    #[test]
    fn failed_paths_always_fail() {
        let failed = PathOutput::Failed {
            path: "missing.jar".to_string(),
            error: "archive file does not exist".to_string(),
        };
        assert!(failed.fails(Verbosity::None));
    }

    #[test]
    fn text_output_lists_summary_lines() {
        let text = render_text(&[
            PathOutput::Class {
                path: "A.class".to_string(),
                version: ClassFileVersion::new(61, 0),
                description: ClassFileVersion::new(61, 0).describe(),
                findings: Vec::new(),
            },
            PathOutput::Archive {
                path: "app.jar".to_string(),
                mode: ViewMode::Plain,
                manifest: None,
                total: 10,
                versions: Vec::new(),
                summary: vec![
                    "6 out of total 10 classes (%60) use 52.0 (Java 8) class file version"
                        .to_string(),
                ],
                findings: Vec::new(),
                diagnostics: Vec::new(),
                entries_processed: 10,
                duration_ms: 0,
            },
            PathOutput::Failed {
                path: "missing.jar".to_string(),
                error: "archive file does not exist".to_string(),
            },
        ]);
        assert_eq!(
            text,
            "A.class: 61.0 (Java 17)\napp.jar:\n6 out of total 10 classes (%60) use 52.0 (Java 8) class file version\n"
        );
    }
}

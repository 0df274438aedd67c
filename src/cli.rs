use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

use crate::logging::Verbosity;
use crate::version::ClassFileVersion;

#[derive(Debug, Clone, Parser)]
#[command(name = "bytecode-version-analyzer", version)]
#[command(about = "Report the class file versions used by JAR archives and class files")]
pub struct Cli {
    /// JAR/ZIP archives or standalone .class files
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Warn about classes below this version (major.minor or Java version)
    #[arg(long, value_name = "VERSION")]
    pub print_if_below: Option<ClassFileVersion>,

    /// Warn about classes above this version (major.minor or Java version)
    #[arg(long, value_name = "VERSION")]
    pub print_if_above: Option<ClassFileVersion>,

    /// Only report threshold warnings for classes whose path contains this text
    #[arg(long, value_name = "TEXT")]
    pub filter: Option<String>,

    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub parallel: bool,

    /// Worker threads: a count, or a per-core factor such as 2C
    #[arg(long, value_name = "N")]
    pub threads: Option<String>,

    /// Schedule entry work first-in first-out
    #[arg(long)]
    pub fair: bool,

    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub buffered: bool,

    /// Reject entries that lack the 0xCAFEBABE magic
    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub verify: bool,

    /// Resolve multi-release entries when the manifest declares them
    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub multi_release: bool,

    /// Java release used to pick multi-release entries (default: newest)
    #[arg(long, value_name = "N")]
    pub release: Option<u32>,

    /// Log processed entry counts while scanning
    #[arg(long)]
    pub track: bool,

    /// Log how long each archive took
    #[arg(long)]
    pub timing: bool,

    #[arg(long, value_enum, default_value_t = Verbosity::Info)]
    pub verbosity: Verbosity,

    /// Shorthand for --verbosity debug
    #[arg(long)]
    pub debug: bool,

    /// Exit with a failure status when anything at or above this level is reported
    #[arg(long, value_enum, default_value_t = Verbosity::Error)]
    pub fail_verbosity: Verbosity,
}

impl Cli {
    pub fn effective_verbosity(&self) -> Verbosity {
        if self.debug {
            Verbosity::Debug
        } else {
            self.verbosity
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

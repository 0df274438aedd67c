//! # bytecode-version-analyzer
//!
//! Reports which class file versions the classes inside a JAR use, resolving
//! multi-release archives the way a runtime would.
//!
//! ## Architecture
//!
//! - **version**: `ClassFileVersion` value type, parsing and platform version mapping
//! - **header**: Class file header decoding (magic, minor, major)
//! - **manifest**: `META-INF/MANIFEST.MF` parsing and archive flags
//! - **archive**: Memory-mapped archive access with versioned and plain entry views
//! - **resolve**: Entry traversal, synthetic class exclusion, serial and parallel drivers
//! - **diagnostic**: Per-entry findings logged through tracing and kept in the report
//! - **progress**: Background progress sampling during long scans
//! - **tally**: Per-version counts and percentages
//! - **audit**: Threshold and preview checks over scanned classes
//! - **config**: Scan configuration resolved from flags and environment
//! - **logging**: tracing subscriber setup and verbosity levels

pub mod archive;
pub mod audit;
pub mod cli;
pub mod config;
pub mod diagnostic;
pub mod header;
pub mod logging;
pub mod manifest;
pub mod progress;
pub mod resolve;
pub mod tally;
pub mod version;

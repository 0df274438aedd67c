//! Class file version values.
//!
//! A `ClassFileVersion` is the `(major, minor)` pair stored in the class file
//! prologue. Ordering is lexicographic on `(major, minor)`, so the derived
//! `Ord` already matches the "higher than" relation used by audits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Minor version written by compilers when preview language features are enabled.
pub const PREVIEW_MINOR_VERSION: u16 = 0xFFFF;

/// Major version of the earliest tracked platform release, minus one.
/// `major - 44` is the platform version (52 -> 8).
pub const PLATFORM_VERSION_OFFSET: u16 = 44;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    #[error("not in major.minor format: {0}")]
    NotDotted(String),

    #[error("invalid class file version: {0:?}")]
    InvalidNumber(String),

    #[error("platform version {0} has no class file version")]
    OutOfRange(u32),
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ClassFileVersion {
    major: u16,
    minor: u16,
}

impl ClassFileVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub const fn major(&self) -> u16 {
        self.major
    }

    pub const fn minor(&self) -> u16 {
        self.minor
    }

    /// `17` -> `61.0`.
    pub fn from_platform_version(platform: u32) -> Result<Self, VersionParseError> {
        let major = platform
            .checked_add(u32::from(PLATFORM_VERSION_OFFSET))
            .and_then(|m| u16::try_from(m).ok())
            .ok_or(VersionParseError::OutOfRange(platform))?;
        Ok(Self::new(major, 0))
    }

    /// Platform release this version targets. Negative for pre-release formats below 44.
    pub fn to_platform_version(&self) -> i32 {
        i32::from(self.major) - i32::from(PLATFORM_VERSION_OFFSET)
    }

    /// Strictly greater major, or equal major with strictly greater minor.
    pub fn is_higher_than(&self, other: &ClassFileVersion) -> bool {
        self > other
    }

    pub fn is_preview(&self) -> bool {
        self.minor == PREVIEW_MINOR_VERSION
    }

    /// Parses the strict `major.minor` form only. A bare `17` is rejected here
    /// so it can never be misread as a class file version.
    pub fn parse_dotted(input: &str) -> Result<Self, VersionParseError> {
        let mut parts = input.split('.');
        let (Some(major), Some(minor), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(VersionParseError::NotDotted(input.to_string()));
        };

        let major = major
            .parse::<u16>()
            .map_err(|_| VersionParseError::InvalidNumber(input.to_string()))?;
        let minor = minor
            .parse::<u16>()
            .map_err(|_| VersionParseError::InvalidNumber(input.to_string()))?;
        Ok(Self::new(major, minor))
    }

    /// `"52.0 (Java 8)"`, or `"65.65535 (Java 21, with preview features enabled)"`.
    pub fn describe(&self) -> String {
        if self.is_preview() {
            format!(
                "{self} (Java {}, with preview features enabled)",
                self.to_platform_version()
            )
        } else {
            format!("{self} (Java {})", self.to_platform_version())
        }
    }
}

impl fmt::Display for ClassFileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ClassFileVersion {
    type Err = VersionParseError;

    /// Tries `major.minor` first and falls back to a platform version number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(version) = Self::parse_dotted(s) {
            return Ok(version);
        }

        let platform = s
            .parse::<u32>()
            .map_err(|_| VersionParseError::InvalidNumber(s.to_string()))?;
        Self::from_platform_version(platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_round_trip() {
        for (major, minor) in [(45, 3), (52, 0), (61, 0), (65, 1), (0, 0), (u16::MAX, 12)] {
            let v = ClassFileVersion::new(major, minor);
            assert_eq!(v.to_string().parse::<ClassFileVersion>().unwrap(), v);
        }
    }

    #[test]
    fn bare_integer_is_a_platform_version() {
        assert_eq!(
            "17".parse::<ClassFileVersion>().unwrap(),
            ClassFileVersion::new(61, 0)
        );
        assert_eq!(
            "8".parse::<ClassFileVersion>().unwrap(),
            ClassFileVersion::new(52, 0)
        );
        assert!(matches!(
            ClassFileVersion::parse_dotted("17"),
            Err(VersionParseError::NotDotted(_))
        ));
    }

    #[test]
    fn rejects_garbage_and_extra_components() {
        assert!("abc".parse::<ClassFileVersion>().is_err());
        assert!("52.0.1".parse::<ClassFileVersion>().is_err());
        assert!("52.x".parse::<ClassFileVersion>().is_err());
        assert_eq!(
            "70000".parse::<ClassFileVersion>(),
            Err(VersionParseError::OutOfRange(70000))
        );
    }

    #[test]
    fn higher_than_is_lexicographic() {
        let v52_0 = ClassFileVersion::new(52, 0);
        let v52_3 = ClassFileVersion::new(52, 3);
        let v53_0 = ClassFileVersion::new(53, 0);

        assert!(v53_0.is_higher_than(&v52_3));
        assert!(v52_3.is_higher_than(&v52_0));
        assert!(!v52_0.is_higher_than(&v52_0));
        assert!(!v52_3.is_higher_than(&v53_0));
    }

    #[test]
    fn preview_and_platform_conversion() {
        let preview = ClassFileVersion::new(65, PREVIEW_MINOR_VERSION);
        assert!(preview.is_preview());
        assert!(!ClassFileVersion::new(65, 0).is_preview());

        assert_eq!(ClassFileVersion::new(52, 0).to_platform_version(), 8);
        assert_eq!(ClassFileVersion::new(40, 0).to_platform_version(), -4);
        assert_eq!(
            ClassFileVersion::from_platform_version(21).unwrap(),
            ClassFileVersion::new(65, 0)
        );
    }

    #[test]
    fn describe_mentions_platform_and_preview() {
        assert_eq!(ClassFileVersion::new(52, 0).describe(), "52.0 (Java 8)");
        assert_eq!(
            ClassFileVersion::new(65, PREVIEW_MINOR_VERSION).describe(),
            "65.65535 (Java 21, with preview features enabled)"
        );
    }
}

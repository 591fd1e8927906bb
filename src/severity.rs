// SPDX-License-Identifier: Apache-2.0 OR MIT
// Severity levels and level masks for dispatch filtering

use serde::{Deserialize, Serialize};

/// Log severity levels, one bit each so they compose into a [`LevelMask`]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Unrecoverable host failure (crash handlers, fatal asserts)
    Fatal = 1,
    /// Error conditions (failed loads, broken plugins)
    Error = 2,
    /// Warning conditions (deprecated calls, degraded paths)
    Warning = 4,
    /// Significant normal condition (plugin loaded, listener attached)
    Notice = 8,
    /// Informational chatter
    Info = 16,
    /// Debug-level messages (verbose per-event traces)
    Debug = 32,
}

impl Severity {
    /// Get the severity bit as u8
    #[inline]
    pub const fn bit(self) -> u8 {
        self as u8
    }

    /// Get severity name as static string
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Fatal => "FATAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        }
    }

    /// Create from a single bit value (returns None if not exactly one known bit)
    pub const fn from_bit(value: u8) -> Option<Self> {
        match value {
            1 => Some(Severity::Fatal),
            2 => Some(Severity::Error),
            4 => Some(Severity::Warning),
            8 => Some(Severity::Notice),
            16 => Some(Severity::Info),
            32 => Some(Severity::Debug),
            _ => None,
        }
    }

    /// All severities, most severe first
    pub const ALL: [Severity; 6] = [
        Severity::Fatal,
        Severity::Error,
        Severity::Warning,
        Severity::Notice,
        Severity::Info,
        Severity::Debug,
    ];
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Set of severities, used both for per-source filtering and for deciding
/// which events get an eager stack-trace capture.
///
/// Serializes as a list of severity names so config files stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Severity>", into = "Vec<Severity>")]
pub struct LevelMask(u8);

impl LevelMask {
    /// Mask matching every severity
    pub const ALL: LevelMask = LevelMask(0x3F);
    /// Mask matching nothing
    pub const NONE: LevelMask = LevelMask(0);

    /// Build a mask from a set of severities
    pub fn of(levels: &[Severity]) -> Self {
        let mut bits = 0u8;
        for level in levels {
            bits |= level.bit();
        }
        LevelMask(bits)
    }

    /// Check whether the mask includes a severity
    #[inline]
    pub const fn contains(self, level: Severity) -> bool {
        self.0 & level.bit() != 0
    }

    /// Union of two masks
    pub const fn union(self, other: LevelMask) -> LevelMask {
        LevelMask(self.0 | other.0)
    }

    /// Raw bits (for atomic storage in the filter table)
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Rebuild from raw bits, discarding unknown ones
    pub const fn from_bits(bits: u8) -> LevelMask {
        LevelMask(bits & 0x3F)
    }
}

impl Default for LevelMask {
    /// Unconfigured sources allow everything
    fn default() -> Self {
        LevelMask::ALL
    }
}

impl From<Vec<Severity>> for LevelMask {
    fn from(levels: Vec<Severity>) -> Self {
        LevelMask::of(&levels)
    }
}

impl From<LevelMask> for Vec<Severity> {
    fn from(mask: LevelMask) -> Self {
        Severity::ALL
            .iter()
            .copied()
            .filter(|s| mask.contains(*s))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_bits_are_disjoint() {
        let mut seen = 0u8;
        for level in Severity::ALL {
            assert_eq!(seen & level.bit(), 0);
            seen |= level.bit();
        }
        assert_eq!(seen, LevelMask::ALL.bits());
    }

    #[test]
    fn test_severity_from_bit() {
        assert_eq!(Severity::from_bit(1), Some(Severity::Fatal));
        assert_eq!(Severity::from_bit(32), Some(Severity::Debug));
        assert_eq!(Severity::from_bit(3), None);
        assert_eq!(Severity::from_bit(0), None);
    }

    #[test]
    fn test_mask_contains() {
        let mask = LevelMask::of(&[Severity::Fatal, Severity::Error]);
        assert!(mask.contains(Severity::Fatal));
        assert!(mask.contains(Severity::Error));
        assert!(!mask.contains(Severity::Info));
    }

    #[test]
    fn test_mask_defaults_allow_all() {
        let mask = LevelMask::default();
        for level in Severity::ALL {
            assert!(mask.contains(level));
        }
    }

    #[test]
    fn test_mask_union() {
        let a = LevelMask::of(&[Severity::Fatal]);
        let b = LevelMask::of(&[Severity::Debug]);
        let u = a.union(b);
        assert!(u.contains(Severity::Fatal));
        assert!(u.contains(Severity::Debug));
        assert!(!u.contains(Severity::Info));
    }

    #[test]
    fn test_mask_serde_roundtrip() {
        let mask = LevelMask::of(&[Severity::Error, Severity::Warning]);
        let json = serde_json::to_string(&mask).unwrap();
        assert_eq!(json, r#"["Error","Warning"]"#);
        let back: LevelMask = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mask);
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(format!("{}", Severity::Fatal), "FATAL");
        assert_eq!(format!("{}", Severity::Debug), "DEBUG");
    }
}

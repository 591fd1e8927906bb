// Per-source level masks consulted once per event and memoized in the context

use crate::severity::{LevelMask, Severity};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::RwLock;

/// Lookup table mapping source identity to the severities it may emit.
///
/// Sources without an entry fall back to the default mask (allow all unless
/// reconfigured). Both the default and per-source entries are adjustable at
/// runtime; a change applies to events enriched after it.
pub struct FilterTable {
    /// Default mask bits for unconfigured sources
    default_mask: AtomicU8,
    /// Per-source overrides
    source_masks: RwLock<HashMap<String, LevelMask>>,
}

impl FilterTable {
    /// Create a table where every source allows everything
    pub fn new() -> Self {
        Self {
            default_mask: AtomicU8::new(LevelMask::ALL.bits()),
            source_masks: RwLock::new(HashMap::new()),
        }
    }

    /// Create a table pre-populated with per-source masks
    pub fn with_sources(default_mask: LevelMask, sources: HashMap<String, LevelMask>) -> Self {
        Self {
            default_mask: AtomicU8::new(default_mask.bits()),
            source_masks: RwLock::new(sources),
        }
    }

    /// Get the mask for a source (default if unconfigured)
    pub fn level_mask(&self, source: &str) -> LevelMask {
        let masks = self.source_masks.read().unwrap();
        if let Some(&mask) = masks.get(source) {
            return mask;
        }
        drop(masks);
        LevelMask::from_bits(self.default_mask.load(Ordering::Relaxed))
    }

    /// Convenience: whether `source` may emit `level`
    pub fn allows(&self, source: &str, level: Severity) -> bool {
        self.level_mask(source).contains(level)
    }

    /// Set the default mask for unconfigured sources
    pub fn set_default_mask(&self, mask: LevelMask) {
        self.default_mask.store(mask.bits(), Ordering::Relaxed);
    }

    /// Set an override for one source
    pub fn set_source_mask(&self, source: &str, mask: LevelMask) {
        self.source_masks
            .write()
            .unwrap()
            .insert(source.to_string(), mask);
    }

    /// Remove a source override (fall back to the default)
    pub fn clear_source_mask(&self, source: &str) {
        self.source_masks.write().unwrap().remove(source);
    }
}

impl Default for FilterTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_source_allows_all() {
        let table = FilterTable::new();
        for level in Severity::ALL {
            assert!(table.allows("anything", level));
        }
    }

    #[test]
    fn test_source_override() {
        let table = FilterTable::new();
        table.set_source_mask("physics", LevelMask::of(&[Severity::Fatal, Severity::Error]));

        assert!(table.allows("physics", Severity::Error));
        assert!(!table.allows("physics", Severity::Debug));
        // Other sources untouched
        assert!(table.allows("render", Severity::Debug));
    }

    #[test]
    fn test_clear_source_mask_restores_default() {
        let table = FilterTable::new();
        table.set_source_mask("physics", LevelMask::NONE);
        assert!(!table.allows("physics", Severity::Fatal));

        table.clear_source_mask("physics");
        assert!(table.allows("physics", Severity::Fatal));
    }

    #[test]
    fn test_default_mask_change() {
        let table = FilterTable::new();
        table.set_default_mask(LevelMask::of(&[Severity::Fatal]));

        assert!(table.allows("anything", Severity::Fatal));
        assert!(!table.allows("anything", Severity::Info));

        // An override still beats the default
        table.set_source_mask("chatty", LevelMask::ALL);
        assert!(table.allows("chatty", Severity::Info));
    }
}

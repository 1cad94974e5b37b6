//! Compaction settings.

use serde::{Deserialize, Serialize};

/// Global compaction defaults. Sessions can override `auto_compaction` and
/// `threshold` through their own settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompactionSettings {
    /// Whether compaction runs automatically when context overflows.
    pub auto_compaction: bool,
    /// Fraction of the context window above which compaction triggers.
    pub threshold: f64,
    /// Context window assumed when the model catalog has no entry.
    pub default_context_window: u64,
    /// Number of most recent tool-call rounds kept verbatim in context.
    pub keep_tool_call_rounds: usize,
    /// Lifetime of context-token cache entries, in seconds.
    pub token_cache_ttl_secs: u64,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            auto_compaction: true,
            threshold: 0.85,
            default_context_window: 128_000,
            keep_tool_call_rounds: 2,
            token_cache_ttl_secs: 300,
        }
    }
}

impl CompactionSettings {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(format!(
                "compaction threshold must be in (0, 1], got {}",
                self.threshold
            ));
        }
        if self.default_context_window == 0 {
            return Err("default context window must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_leave_headroom() {
        let s = CompactionSettings::default();
        assert!(s.auto_compaction);
        assert!(s.threshold < 1.0);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_threshold() {
        let s = CompactionSettings {
            threshold: 0.0,
            ..CompactionSettings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: CompactionSettings = serde_json::from_str(r#"{"threshold": 0.5}"#).unwrap();
        assert!((s.threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(s.keep_tool_call_rounds, 2);
    }
}

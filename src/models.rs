//! Client model name -> upstream model id lookup.

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Upstream id used when nothing else matches.
pub const DEFAULT_UPSTREAM_MODEL: &str = "CLAUDE_SONNET_4_5_20250929_V1_0";

static BUILTIN_ALIASES: LazyLock<FxHashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut table = FxHashMap::default();
    table.insert("claude-opus-4-5", "claude-opus-4.5");
    table.insert("claude-haiku-4-5", "claude-haiku-4.5");
    table.insert("claude-sonnet-4-5", "CLAUDE_SONNET_4_5_20250929_V1_0");
    table.insert("claude-sonnet-4-5-20250929", "CLAUDE_SONNET_4_5_20250929_V1_0");
    table.insert("claude-sonnet-4-20250514", "CLAUDE_SONNET_4_20250514_V1_0");
    table
});

/// Alias table: configured overrides first, then the built-in table, then the default.
#[derive(Debug, Clone)]
pub struct ModelAliases {
    overrides: FxHashMap<String, String>,
    default_model: String,
}

impl ModelAliases {
    #[must_use]
    pub fn new(overrides: &BTreeMap<String, String>, default_model: &str) -> Self {
        Self {
            overrides: overrides
                .iter()
                .map(|(alias, target)| (alias.trim().to_string(), target.trim().to_string()))
                .collect(),
            default_model: default_model.to_string(),
        }
    }

    /// Resolve a client-facing model name. Lookup is exact after trimming.
    #[must_use]
    pub fn resolve(&self, client_model: &str) -> &str {
        let key = client_model.trim();
        if let Some(target) = self.overrides.get(key) {
            return target;
        }
        BUILTIN_ALIASES
            .get(key)
            .copied()
            .unwrap_or(self.default_model.as_str())
    }
}

impl Default for ModelAliases {
    fn default() -> Self {
        Self::new(&BTreeMap::new(), DEFAULT_UPSTREAM_MODEL)
    }
}

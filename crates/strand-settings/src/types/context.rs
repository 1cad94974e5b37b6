//! Context-building settings.

use serde::{Deserialize, Serialize};
use strand_core::TokenizerKind;

/// Global context defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextSettings {
    /// Maximum non-system messages sent as context. `None` is unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_context_message_count: Option<usize>,
    /// Tokenizer used for token accounting.
    pub tokenizer: TokenizerKind,
}

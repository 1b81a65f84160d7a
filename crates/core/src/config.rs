use serde::{Deserialize, Serialize};

/// When root validation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// After every change that settles.
    #[default]
    OnChange,
    /// Only when `FormTree::validate` is called.
    OnRequest,
    /// Never.
    None,
}

/// Tree-wide behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TreeConfig {
    pub validation_mode: ValidationMode,
    /// Reset a node to its safe-empty value when it becomes hidden or inactive.
    pub reset_hidden_values: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            validation_mode: ValidationMode::OnChange,
            reset_hidden_values: true,
        }
    }
}

//! Per-language labels for snapshot nodes.

use arbor_core::{ArborConfig, Node};

/// External per-language field provider.
pub trait LabelProvider: Send + Sync {
    fn label(&self, node: &Node, language: &str) -> Option<String>;
}

/// Reads labels from the node payload:
/// `labels[language]`, then `labels[default_language]`, then `label`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadLabelProvider {
    default_language: String,
}

impl PayloadLabelProvider {
    pub fn new(default_language: impl Into<String>) -> Self {
        Self {
            default_language: default_language.into(),
        }
    }

    pub fn from_config(config: &ArborConfig) -> Self {
        Self::new(config.default_language.clone())
    }
}

impl LabelProvider for PayloadLabelProvider {
    fn label(&self, node: &Node, language: &str) -> Option<String> {
        let translated = node.payload.get("labels").and_then(|labels| {
            labels
                .get(language)
                .or_else(|| labels.get(&self.default_language))
                .and_then(serde_json::Value::as_str)
        });
        translated
            .or_else(|| node.payload.get("label").and_then(serde_json::Value::as_str))
            .map(str::to_string)
    }
}

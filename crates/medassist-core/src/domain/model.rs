//! Model selection from the service's model listing.

use crate::settings::DEFAULT_MODEL;

/// Models tried in order when no model is configured.
pub const PREFERRED_MODELS: &[&str] =
    &["llama3.1:8b", "llama3:8b", "mistral:7b", "tinyllama:latest"];

/// Pick the model to generate with.
///
/// A configured model always wins, even if the service does not list it; the
/// service then rejects the request with a readable error. Otherwise the first
/// preferred model that is available, then the first available model, then
/// [`DEFAULT_MODEL`].
pub fn select_model(configured: Option<&str>, available: &[String]) -> String {
    if let Some(model) = configured.filter(|m| !m.trim().is_empty()) {
        return model.to_string();
    }

    PREFERRED_MODELS
        .iter()
        .find(|preferred| available.iter().any(|m| m.as_str() == **preferred))
        .map(|m| (*m).to_string())
        .or_else(|| available.first().cloned())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

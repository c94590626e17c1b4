//! Medical response types handed to the chat UI.

use serde::{Deserialize, Serialize};

/// Coarse severity attached to guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Moderate,
}

/// Structured guidance shown next to the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalGuidance {
    pub severity: Severity,
    pub recommendations: Vec<String>,
    /// Present only when an emergency was detected in the user's text.
    pub emergency_action: Option<String>,
    pub follow_up: Option<String>,
}

/// Formatted answer to one user query.
///
/// Created fresh per query and owned by the caller; the core never stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalResponse {
    pub text: String,
    pub emergency_detected: bool,
    /// Heuristic score in `[0.0, 0.9]`.
    pub confidence: f64,
    pub model_name: String,
    pub elapsed_ms: u64,
    /// RFC 3339 creation time.
    pub timestamp: String,
    pub guidance: Option<MedicalGuidance>,
    /// Context to pass back with the next query to the same model.
    pub context_tokens: Option<Vec<i64>>,
}

impl MedicalResponse {
    /// The emergency action, if one was attached.
    pub fn emergency_action(&self) -> Option<&str> {
        self.guidance
            .as_ref()
            .and_then(|g| g.emergency_action.as_deref())
    }
}

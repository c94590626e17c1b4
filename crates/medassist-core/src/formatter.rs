//! Medical query and response formatting.
//!
//! Wraps user text in the medical system instruction on the way out, and
//! cleans up, annotates and scores the model's answer on the way back. The
//! emergency detector and the disclaimer rule are keyword heuristics: they can
//! both over- and under-trigger, and are kept deliberately simple.

use chrono::Utc;

use crate::domain::{
    GenerationRequest, GenerationResult, MedicalGuidance, MedicalResponse, Severity,
};

/// System instruction sent with every medical query.
pub const MEDICAL_SYSTEM_INSTRUCTION: &str = "You are a medical information assistant that provides general, educational health information. Follow these rules:
1. Give educational information only. Never diagnose conditions or prescribe treatments.
2. Recommend consulting a healthcare professional for any serious or persistent concern.
3. If the user describes symptoms of a possible emergency (such as chest pain, difficulty breathing or loss of consciousness), tell them clearly to seek immediate medical attention or call emergency services.
4. Be clear and conservative, and acknowledge uncertainty.";

/// Default sampling temperature for medical answers.
pub const DEFAULT_MEDICAL_TEMPERATURE: f32 = 0.2;

/// Default generation limit (`num_predict`).
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Answers shorter than this (in characters) are replaced by [`FALLBACK_RESPONSE`].
pub const MIN_READABLE_LENGTH: usize = 20;

/// Shown instead of an answer that is too short to be useful.
pub const FALLBACK_RESPONSE: &str = "I'm sorry, I couldn't put together a useful answer to that. Could you describe your question or symptoms in a little more detail?";

/// Appended to answers that do not already point the user to a professional.
pub const DISCLAIMER: &str = "This information is for educational purposes only and is not a substitute for professional medical advice. Please consult a qualified healthcare provider about your specific situation.";

/// Replaces answers that read like a diagnosis or a prescription.
pub const SAFE_REFERRAL_RESPONSE: &str = "I understand you're looking for medical information. For your safety, please discuss your specific concerns with a qualified healthcare provider who can give you personalized medical advice.";

/// Action attached to the guidance block when an emergency is detected.
pub const EMERGENCY_ACTION: &str = "Seek immediate medical attention or call emergency services.";

const FOLLOW_UP: &str = "Consider consulting with a healthcare professional for personalized advice.";

/// Phrases in the user's text that trigger emergency guidance.
pub const EMERGENCY_KEYWORDS: &[&str] = &[
    "chest pain",
    "difficulty breathing",
    "can't breathe",
    "cannot breathe",
    "severe pain",
    "severe headache",
    "unconscious",
    "bleeding heavily",
    "severe bleeding",
    "severe allergic reaction",
    "anaphylaxis",
    "heart attack",
    "stroke",
    "seizure",
    "severe burn",
    "choking",
    "poisoning",
    "overdose",
    "suicide",
    "suicidal",
];

// Any of these means the answer already refers the user to a professional.
const REFERRAL_PHRASES: &[&str] = &[
    "healthcare provider",
    "healthcare professional",
    "medical professional",
    "doctor",
    "physician",
    "consult",
];

const INAPPROPRIATE_PHRASES: &[&str] = &[
    "you definitely have",
    "you are diagnosed with",
    "take this medication",
    "stop taking your medication",
    "you don't need to see a doctor",
    "this is definitely",
];

// Labels some models echo before the actual answer.
const ECHO_LABELS: &[&str] = &["response:", "answer:", "assistant:"];

/// Case-insensitive keyword match of `user_text` against [`EMERGENCY_KEYWORDS`].
pub fn detect_emergency(user_text: &str) -> bool {
    let lower = user_text.to_lowercase();
    EMERGENCY_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Builds medical generation requests and formats their results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MedicalFormatter {
    temperature: f32,
    max_tokens: u32,
}

impl Default for MedicalFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl MedicalFormatter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            temperature: DEFAULT_MEDICAL_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Override the sampling temperature (clamped to `0.0..=2.0`).
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    pub const fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Wrap user text with the medical system instruction.
    pub fn format_query(&self, user_text: &str) -> GenerationRequest {
        GenerationRequest::new(user_text.trim(), self.temperature)
            .with_system(MEDICAL_SYSTEM_INSTRUCTION)
            .with_max_tokens(self.max_tokens)
    }

    /// Turn a raw generation result into the response shown to the user.
    pub fn format_result(&self, raw: &GenerationResult, user_text: &str) -> MedicalResponse {
        let cleaned = strip_echo(&raw.text, user_text);
        let emergency_detected = detect_emergency(user_text);

        let body = if contains_any(cleaned, INAPPROPRIATE_PHRASES) {
            tracing::warn!("Model answer looked like a diagnosis or prescription, replacing it");
            SAFE_REFERRAL_RESPONSE
        } else {
            cleaned
        };

        let text = if body.chars().count() < MIN_READABLE_LENGTH {
            FALLBACK_RESPONSE.to_string()
        } else if contains_any(body, REFERRAL_PHRASES) {
            body.to_string()
        } else {
            format!("{body}\n\n{DISCLAIMER}")
        };

        MedicalResponse {
            guidance: build_guidance(&text, emergency_detected),
            confidence: confidence(cleaned),
            text,
            emergency_detected,
            model_name: raw.model_name.clone(),
            elapsed_ms: raw.elapsed_ms,
            timestamp: Utc::now().to_rfc3339(),
            context_tokens: raw.context_tokens.clone(),
        }
    }
}

fn contains_any(text: &str, phrases: &[&str]) -> bool {
    let lower = text.to_lowercase();
    phrases.iter().any(|p| lower.contains(p))
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

/// True if `rest` does not continue the word that precedes it.
fn ends_word(rest: &str) -> bool {
    rest.chars().next().is_none_or(|c| !c.is_alphanumeric())
}

/// Remove an echoed system instruction, prompt or answer label.
fn strip_echo<'a>(raw: &'a str, user_text: &str) -> &'a str {
    let prompt = user_text.trim();
    let mut text = raw.trim_start();

    loop {
        let before = text.len();

        if let Some(rest) = text.strip_prefix(MEDICAL_SYSTEM_INSTRUCTION) {
            text = rest.trim_start();
        }
        if !prompt.is_empty() {
            if let Some(rest) = text.strip_prefix(prompt).filter(|rest| ends_word(rest)) {
                text = rest.trim_start();
            }
        }
        for label in ECHO_LABELS {
            if let Some(rest) = strip_prefix_ignore_case(text, label) {
                text = rest.trim_start();
            }
        }

        if text.len() == before {
            break;
        }
    }

    text.trim_end()
}

/// Bullet lines and explicit recommendations from the answer.
fn extract_recommendations(text: &str) -> Vec<String> {
    let mut recommendations: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            let bullet = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("• "))
                .or_else(|| line.strip_prefix("* "));
            match bullet {
                Some(item) => Some(item.trim().to_string()),
                None if line.to_lowercase().contains("recommend") => Some(line.to_string()),
                None => None,
            }
        })
        .filter(|item| !item.is_empty())
        .collect();

    let lower = text.to_lowercase();
    if lower.contains("symptom") {
        recommendations.push("Monitor symptoms and their progression".to_string());
    }
    if lower.contains("pain") {
        recommendations.push("Keep a symptom diary including pain levels and triggers".to_string());
    }

    recommendations.dedup();
    recommendations
}

fn build_guidance(text: &str, emergency_detected: bool) -> Option<MedicalGuidance> {
    let recommendations = extract_recommendations(text);

    if emergency_detected {
        Some(MedicalGuidance {
            severity: Severity::High,
            recommendations,
            emergency_action: Some(EMERGENCY_ACTION.to_string()),
            follow_up: Some(FOLLOW_UP.to_string()),
        })
    } else if recommendations.is_empty() {
        None
    } else {
        Some(MedicalGuidance {
            severity: Severity::Moderate,
            recommendations,
            emergency_action: None,
            follow_up: Some(FOLLOW_UP.to_string()),
        })
    }
}

/// Length and hedging based score; never above 0.9.
fn confidence(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }

    let mut score: f64 = 0.5;
    if text.chars().count() > 100 {
        score += 0.2;
    }
    let lower = text.to_lowercase();
    if lower.contains("disclaimer") || lower.contains("consult") {
        score += 0.2;
    }
    score.min(0.9)
}

//! Heuristic importance scoring for ingested chunks.
//!
//! Deterministic and pure: the same content always yields the same score.

/// Score every chunk starts from.
pub const BASE_SCORE: f64 = 0.3;

/// Extra weight given to conversational turns from chat exports.
pub const CHAT_BOOST: f64 = 0.2;

const TECHNICAL_KEYWORDS: &[&str] = &[
    "algorithm",
    "api",
    "architecture",
    "bug",
    "class",
    "code",
    "config",
    "database",
    "debug",
    "deploy",
    "error",
    "function",
    "implementation",
    "python",
    "query",
    "rust",
    "server",
    "system",
];

const IMPORTANCE_KEYWORDS: &[&str] = &["important", "critical", "key", "essential", "note"];

/// Importance in `[0.0, 1.0]` from length, word count, and keyword presence.
pub fn score(content: &str) -> f64 {
    let len = content.chars().count();
    let words = content.split_whitespace().count();
    let lower = content.to_lowercase();

    let mut score = BASE_SCORE;
    if len > 100 {
        score += 0.2;
    }
    if len > 500 {
        score += 0.2;
    }
    if words > 20 {
        score += 0.1;
    }
    if words > 50 {
        score += 0.1;
    }
    if TECHNICAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
        score += 0.1;
    }
    if IMPORTANCE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        score += 0.1;
    }
    score.min(1.0)
}

/// [`score`] plus `boost`, clamped to 1.0.
pub fn score_with_boost(content: &str, boost: f64) -> f64 {
    (score(content) + boost).clamp(0.0, 1.0)
}

//! Review results and score extraction from free-form model replies.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

/// Minimum score for a review to pass. Fixed at this layer.
pub const PASS_THRESHOLD: u8 = 90;

static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?[^\n]*\n(.*?)```").expect("Invalid regex: json fence")
});

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("Invalid regex: first number"));

static BULLET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•]\s+|\d+[.)]\s+|\d+、\s*)(.+)$").expect("Invalid regex: bullet line")
});

/// Outcome of a code review.
///
/// `passed` is always derived from `score`, including when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ReviewWire")]
pub struct ReviewResult {
    score: u8,
    passed: bool,
    comments: Vec<String>,
}

#[derive(Deserialize)]
struct ReviewWire {
    score: u8,
    #[serde(default)]
    comments: Vec<String>,
}

impl From<ReviewWire> for ReviewResult {
    fn from(wire: ReviewWire) -> Self {
        ReviewResult::new(wire.score, wire.comments)
    }
}

impl ReviewResult {
    /// Builds a result; scores above 100 are clamped.
    pub fn new(score: u8, comments: Vec<String>) -> Self {
        let score = score.min(100);
        Self {
            score,
            passed: score >= PASS_THRESHOLD,
            comments,
        }
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    /// Human-readable summary used in assistant turns.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Review score: {}/100 ({})",
            self.score,
            if self.passed { "passed" } else { "below threshold" }
        );
        for comment in &self.comments {
            out.push_str("\n- ");
            out.push_str(comment);
        }
        out
    }
}

/// Extracts a review from a model reply.
///
/// Tries, in order: a fenced JSON block, the whole reply as JSON, the outermost `{...}` span,
/// and finally the first number in the text. A reply without any number scores 0.
pub fn parse_review(reply: &str) -> ReviewResult {
    for candidate in json_candidates(reply) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&candidate) {
            if let Some(score) = map.get("score").and_then(score_from_value) {
                return ReviewResult::new(to_score(score), comments_from_json(&map));
            }
        }
    }

    let score = FIRST_NUMBER
        .find(reply)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|n| if n > 100.0 { n / 10.0 } else { n })
        .unwrap_or(0.0);

    ReviewResult::new(to_score(score), comments_from_text(reply))
}

fn json_candidates(reply: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    if let Some(caps) = JSON_FENCE.captures(reply) {
        if let Some(body) = caps.get(1) {
            candidates.push(body.as_str().trim().to_string());
        }
    }
    candidates.push(reply.trim().to_string());
    if let (Some(start), Some(end)) = (reply.find('{'), reply.rfind('}')) {
        if start < end {
            candidates.push(reply[start..=end].to_string());
        }
    }
    candidates
}

fn score_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

fn to_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

fn comments_from_json(map: &serde_json::Map<String, Value>) -> Vec<String> {
    let mut comments = Vec::new();
    for key in ["comments", "feedback", "suggestions", "issues"] {
        match map.get(key) {
            Some(Value::Array(items)) => comments.extend(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.trim().to_string()),
                        Value::Null => None,
                        other => Some(other.to_string()),
                    })
                    .filter(|s| !s.is_empty()),
            ),
            Some(Value::String(s)) if !s.trim().is_empty() => comments.push(s.trim().to_string()),
            _ => {}
        }
    }
    comments
}

fn comments_from_text(reply: &str) -> Vec<String> {
    let bullets: Vec<String> = reply
        .lines()
        .filter_map(|line| BULLET.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .collect();
    if !bullets.is_empty() {
        return bullets;
    }
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![trimmed.to_string()]
    }
}

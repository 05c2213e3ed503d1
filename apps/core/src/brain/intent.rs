//! Intent Classification using regex patterns.
//!
//! Fast pattern-based intent detection for Chinese and English input.
//! No backend call required - pure Rust regex matching.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::brain::artifact::{find_code_block, find_file_reference};
use crate::models::{Role, Turn};

/// What the user wants done with their message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// General conversation or a programming question.
    Chat,
    /// Write new code (or extend the code in play).
    Generate,
    /// Improve existing code.
    Optimize,
    /// Score and critique existing code.
    Review,
    /// Could not be mapped to any action.
    Unknown,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::Chat,
        Intent::Generate,
        Intent::Optimize,
        Intent::Review,
        Intent::Unknown,
    ];

    /// Wire label, also used in classification prompts
    pub fn label(&self) -> &'static str {
        match self {
            Intent::Chat => "chat",
            Intent::Generate => "generate",
            Intent::Optimize => "optimize",
            Intent::Review => "review",
            Intent::Unknown => "unknown",
        }
    }

    /// Whether the action works on a code artifact.
    pub fn touches_code(&self) -> bool {
        matches!(self, Intent::Generate | Intent::Optimize | Intent::Review)
    }
}

impl FromStr for Intent {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Intent::ALL
            .into_iter()
            .find(|intent| intent.label().eq_ignore_ascii_case(s.trim()))
            .ok_or(())
    }
}

/// Result of intent classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    /// Detected intent
    pub intent: Intent,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
    /// Patterns that matched
    pub matched_patterns: Vec<String>,
    /// Source file named in the message, relative to the workspace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl IntentResult {
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            confidence: 0.0,
            matched_patterns: vec![],
            filename: None,
        }
    }
}

/// Pattern definition for intent matching
struct IntentPattern {
    intent: Intent,
    patterns: Vec<Regex>,
    /// Only counted once `patterns` matched; never selects the intent on their own
    support: Vec<Regex>,
    weight: f32,
}

/// Intent classifier using regex patterns
pub struct IntentClassifier {
    patterns: Vec<IntentPattern>,
}

// Compile patterns once at startup
// NOTE: expect() is acceptable here: the patterns are constants and a typo is a bug
static REVIEW_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // Chinese
        Regex::new(r"(审查|审核|评审|检查|审阅|代码走查)").expect("Invalid regex: Chinese review verbs"),
        Regex::new(r"(打分|评分|评价一下|找.{0,4}(问题|bug|漏洞))").expect("Invalid regex: Chinese scoring phrases"),
        // English
        Regex::new(r"(?i)\b(review|audit|critique|inspect)\b").expect("Invalid regex: English review verbs"),
        Regex::new(r"(?i)\b(check (my|this|the) code|code review|rate (my|this) code|find (bugs|issues))\b").expect("Invalid regex: English review phrases"),
    ]
});

static OPTIMIZE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // Chinese
        Regex::new(r"(优化|重构|改进|改善|精简|简化)").expect("Invalid regex: Chinese optimize verbs"),
        Regex::new(r"(提升|提高|加快).{0,6}(性能|效率|速度|可读性)").expect("Invalid regex: Chinese performance phrases"),
        // English
        Regex::new(r"(?i)\b(optimi[sz]e|refactor|improve|simplify|clean ?up)\b").expect("Invalid regex: English optimize verbs"),
        Regex::new(r"(?i)\b(speed up|make (it|this) faster|more (efficient|readable)|performance)\b").expect("Invalid regex: English performance phrases"),
    ]
});

static GENERATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // Chinese
        Regex::new(r"(生成|编写|写一个|写个|帮我写|实现|创建|开发)").expect("Invalid regex: Chinese generate verbs"),
        Regex::new(r"(添加|增加|加上|加入|补充)").expect("Invalid regex: Chinese extend verbs"),
        // English
        Regex::new(r"(?i)^(please\s+|(can|could|would) you\s+)?(write|generate|create|implement|build|make|code|add)\b").expect("Invalid regex: English generate verbs"),
    ]
});

// Questions about code mention these too, so they only back up a generate verb
static CODE_NOUN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(函数|类|方法|脚本|程序|代码|模块|接口|功能)").expect("Invalid regex: Chinese code nouns"),
        Regex::new(r"(?i)\b(function|class|method|script|program|module|endpoint|api|cli)\b").expect("Invalid regex: English code nouns"),
    ]
});

static CHAT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // Universal
        Regex::new(r"[?？]").expect("Invalid regex: question mark pattern"),
        // Chinese
        Regex::new(r"(什么|为什么|怎么|如何|是否|区别|解释|介绍|吗|呢)").expect("Invalid regex: Chinese question words"),
        Regex::new(r"^(你好|您好|嗨|谢谢|多谢|再见)").expect("Invalid regex: Chinese greetings"),
        // English
        Regex::new(r"(?i)^(what|why|how|when|where|who|which|is|are|can|could|does|do)\b").expect("Invalid regex: English question words"),
        Regex::new(r"(?i)\b(explain|difference|meaning of|tell me about)\b").expect("Invalid regex: English explanation words"),
        Regex::new(r"(?i)^(hello|hi|hey|thanks|thank you|good (morning|evening))\b").expect("Invalid regex: English greetings"),
    ]
});

/// Confidence multiplier applied to optimize/review when there is no code to work on.
const NO_CODE_PENALTY: f32 = 0.8;

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    /// Create a new intent classifier with all patterns
    pub fn new() -> Self {
        let patterns = vec![
            IntentPattern {
                intent: Intent::Review,
                patterns: REVIEW_PATTERNS.clone(),
                support: vec![],
                weight: 1.0,
            },
            IntentPattern {
                intent: Intent::Optimize,
                patterns: OPTIMIZE_PATTERNS.clone(),
                support: vec![],
                weight: 0.95,
            },
            IntentPattern {
                intent: Intent::Generate,
                patterns: GENERATE_PATTERNS.clone(),
                support: CODE_NOUN_PATTERNS.clone(),
                weight: 0.9,
            },
            IntentPattern {
                intent: Intent::Chat,
                patterns: CHAT_PATTERNS.clone(),
                support: vec![],
                weight: 0.7, // Lower priority - questions are common
            },
        ];

        Self { patterns }
    }

    /// Classify the intent of a message, using history to tell whether code is in play.
    pub fn classify(&self, text: &str, history: &[Turn]) -> IntentResult {
        let text = text.trim();

        if text.is_empty() {
            return IntentResult::unknown();
        }

        let mut best = IntentResult::unknown();

        for pattern_group in &self.patterns {
            let mut group_patterns: Vec<String> = pattern_group
                .patterns
                .iter()
                .filter_map(|pattern| pattern.find(text))
                .map(|m| m.as_str().to_string())
                .collect();

            if group_patterns.is_empty() {
                continue;
            }
            group_patterns.extend(
                pattern_group
                    .support
                    .iter()
                    .filter_map(|pattern| pattern.find(text))
                    .map(|m| m.as_str().to_string()),
            );

            // One hit is already a fair signal; more hits saturate quickly
            let strength = match group_patterns.len() {
                1 => 0.7,
                2 => 0.9,
                _ => 1.0,
            };
            let score = strength * pattern_group.weight;

            // Strictly greater: on ties the earlier (more specific) group wins, except that
            // a question beats a generate request of the same strength
            let question_tie = score == best.confidence
                && pattern_group.intent == Intent::Chat
                && best.intent == Intent::Generate;
            if score > best.confidence || question_tie {
                best = IntentResult {
                    intent: pattern_group.intent,
                    confidence: score,
                    matched_patterns: group_patterns,
                    filename: None,
                };
            }
        }

        best.filename = find_file_reference(text);

        if matches!(best.intent, Intent::Optimize | Intent::Review)
            && !has_code_context(text, history)
        {
            best.confidence *= NO_CODE_PENALTY;
        }

        best
    }
}

/// Whether the message carries code or an earlier turn produced some.
pub fn has_code_context(text: &str, history: &[Turn]) -> bool {
    if find_code_block(text).is_some() {
        return true;
    }
    history.iter().any(|turn| {
        turn.role == Role::Assistant
            && (turn
                .metadata
                .as_ref()
                .and_then(|m| m.action)
                .is_some_and(|a| a.touches_code())
                || find_code_block(&turn.content).is_some())
    })
}

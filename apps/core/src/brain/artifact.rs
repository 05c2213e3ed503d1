//! The code currently "in play" in a session, and extraction of code from model replies.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::sync::LazyLock;

// NOTE: expect() is acceptable for patterns that are compile-time constants
static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+#.\-]*)[^\n]*\n(.*?)```")
        .expect("Invalid regex: fenced code block")
});

static FILE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([A-Za-z0-9_\-./]*[A-Za-z0-9_\-]\.(?i:py|rs|js|ts|jsx|tsx|go|java|kt|c|cc|cpp|h|hpp|cs|rb|php|swift|scala|sh|sql|lua))\b",
    )
    .expect("Invalid regex: source file reference")
});

/// Fence language for a source file extension.
const EXTENSION_LANGUAGES: [(&str, &str); 21] = [
    ("py", "python"),
    ("rs", "rust"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("go", "go"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("c", "c"),
    ("h", "c"),
    ("cc", "cpp"),
    ("cpp", "cpp"),
    ("hpp", "cpp"),
    ("cs", "csharp"),
    ("rb", "ruby"),
    ("php", "php"),
    ("swift", "swift"),
    ("scala", "scala"),
    ("sh", "bash"),
    ("sql", "sql"),
];

/// A piece of code produced or supplied during a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeArtifact {
    /// The code itself, without surrounding fences.
    pub code: String,
    /// Language tag from the fence info string, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl CodeArtifact {
    pub fn new(code: impl Into<String>, language: Option<String>) -> Self {
        Self {
            code: code.into(),
            language: language.filter(|l| !l.is_empty()),
        }
    }

    /// Builds an artifact from a model reply.
    ///
    /// The first fenced block wins; a reply without fences is taken as code verbatim.
    pub fn from_reply(reply: &str) -> Self {
        find_code_block(reply).unwrap_or_else(|| Self::new(reply.trim(), None))
    }

    /// Renders the artifact as a fenced markdown block.
    pub fn to_markdown(&self) -> String {
        format!(
            "```{}\n{}\n```",
            self.language.as_deref().unwrap_or(""),
            self.code.trim_end()
        )
    }

    pub fn is_blank(&self) -> bool {
        self.code.trim().is_empty()
    }
}

/// Returns the first fenced code block in `text`, if there is one.
pub fn find_code_block(text: &str) -> Option<CodeArtifact> {
    let caps = FENCED_BLOCK.captures(text)?;
    let language = caps.get(1).map(|m| m.as_str().to_lowercase());
    let code = caps.get(2).map(|m| m.as_str().trim_end()).unwrap_or_default();
    if code.trim().is_empty() {
        return None;
    }
    Some(CodeArtifact::new(code, language))
}

/// Returns the first source file name mentioned in `text`, e.g. `src/calc.py`.
pub fn find_file_reference(text: &str) -> Option<String> {
    FILE_REFERENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Language tag for a path, from its extension.
pub fn language_for_path(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    EXTENSION_LANGUAGES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, language)| language.to_string())
        .or(Some(ext))
}

/// Reads a source file into an artifact tagged with the file's language.
pub async fn read_source_file(path: &Path) -> io::Result<CodeArtifact> {
    let code = tokio::fs::read_to_string(path).await?;
    Ok(CodeArtifact::new(code.trim_end(), language_for_path(path)))
}

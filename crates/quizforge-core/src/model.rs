//! Core data model types for quizforge.
//!
//! These are the fundamental types the whole engine operates on:
//! questions, candidate answers, per-session settings, and question sets.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A single question presented during a test session.
///
/// Immutable once created; the kind never changes and fully determines
/// the shape of the correctness data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Unique identifier within its question set.
    pub id: String,
    /// The prompt shown to the user.
    pub text: String,
    /// Question kind and its correctness data.
    #[serde(flatten)]
    pub kind: QuestionKind,
}

/// Question kind with type-specific correctness data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    /// Exactly one correct option.
    Single {
        options: Vec<String>,
        correct: BTreeSet<usize>,
    },
    /// One or more correct options; the answer must match the full set.
    Multiple {
        options: Vec<String>,
        correct: BTreeSet<usize>,
    },
    /// Term/meaning association; the answer is a set of id pairs.
    Matching {
        terms: Vec<MatchItem>,
        meanings: Vec<MatchItem>,
        correct: BTreeSet<PairKey>,
    },
    /// Open-ended answer graded semantically, with exact-match fallback.
    FreeText { accepted: Vec<String> },
}

impl Question {
    /// Whether this question needs the external grader.
    pub fn is_free_text(&self) -> bool {
        matches!(self.kind, QuestionKind::FreeText { .. })
    }
}

/// One side of a matching question: a stable id plus display text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchItem {
    pub id: String,
    pub text: String,
}

/// An association between a term id and a meaning id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub term: String,
    pub meaning: String,
}

/// A recorded candidate answer for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Answer {
    /// Selected option indices (single and multiple choice).
    Choices(BTreeSet<usize>),
    /// Selected term/meaning pairs (matching).
    Pairs(BTreeSet<PairKey>),
    /// Free-text answer.
    Text(String),
}

impl Answer {
    /// The answer text for free-text answers, empty otherwise.
    pub fn text(&self) -> &str {
        match self {
            Answer::Text(t) => t,
            _ => "",
        }
    }
}

/// Grading strictness passed through to the external grader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    Lite,
    #[default]
    Medium,
    Hard,
    Unreal,
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strictness::Lite => write!(f, "lite"),
            Strictness::Medium => write!(f, "medium"),
            Strictness::Hard => write!(f, "hard"),
            Strictness::Unreal => write!(f, "unreal"),
        }
    }
}

impl FromStr for Strictness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lite" => Ok(Strictness::Lite),
            "medium" => Ok(Strictness::Medium),
            "hard" => Ok(Strictness::Hard),
            "unreal" => Ok(Strictness::Unreal),
            other => Err(format!("unknown strictness: {other}")),
        }
    }
}

/// How a session was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Standard,
    Abbreviated,
}

/// Per-session settings, frozen for the session's lifetime at start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Correct answers needed to pass, clamped to [1, question count].
    pub pass_threshold: u32,
    /// Whether hints may be shown during the session.
    #[serde(default)]
    pub hints_enabled: bool,
    /// Whether each answer is checked immediately after recording.
    #[serde(default)]
    pub check_after_answer: bool,
    /// Whether the final report carries the incorrect-answer review.
    #[serde(default = "default_true")]
    pub show_incorrect_at_end: bool,
    /// Free-text grading strictness.
    #[serde(default)]
    pub strictness: Strictness,
}

fn default_true() -> bool {
    true
}

impl Settings {
    /// Default settings for a pool of `count` questions.
    ///
    /// The pass threshold defaults to 85% of the pool, rounded up,
    /// and is never below 1.
    pub fn defaults_for(count: usize) -> Self {
        let threshold = (count * 85).div_ceil(100).max(1) as u32;
        Self {
            pass_threshold: threshold,
            hints_enabled: false,
            check_after_answer: false,
            show_incorrect_at_end: true,
            strictness: Strictness::Medium,
        }
    }

    /// Clamp the pass threshold into `[1, count]`.
    pub fn clamp_threshold(&mut self, count: usize) {
        self.pass_threshold = self.pass_threshold.clamp(1, count.max(1) as u32);
    }
}

/// Partial settings override merged over computed defaults at start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default)]
    pub pass_threshold: Option<u32>,
    #[serde(default)]
    pub hints_enabled: Option<bool>,
    #[serde(default)]
    pub check_after_answer: Option<bool>,
    #[serde(default)]
    pub show_incorrect_at_end: Option<bool>,
    #[serde(default)]
    pub strictness: Option<Strictness>,
}

impl SettingsPatch {
    /// Merge this patch over `base`, returning the effective settings.
    pub fn apply(&self, mut base: Settings) -> Settings {
        if let Some(t) = self.pass_threshold {
            base.pass_threshold = t;
        }
        if let Some(h) = self.hints_enabled {
            base.hints_enabled = h;
        }
        if let Some(c) = self.check_after_answer {
            base.check_after_answer = c;
        }
        if let Some(s) = self.show_incorrect_at_end {
            base.show_incorrect_at_end = s;
        }
        if let Some(s) = self.strictness {
            base.strictness = s;
        }
        base
    }

    pub fn is_empty(&self) -> bool {
        self.pass_threshold.is_none()
            && self.hints_enabled.is_none()
            && self.check_after_answer.is_none()
            && self.show_incorrect_at_end.is_none()
            && self.strictness.is_none()
    }
}

/// A named collection of questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSet {
    /// Unique identifier for this set (the test id).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Description of this set.
    #[serde(default)]
    pub description: String,
    /// The questions in this set.
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl QuestionSet {
    /// Parse a question set from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let set: QuestionSet = toml::from_str(content).context("failed to parse question set")?;
        set.validate()?;
        Ok(set)
    }

    /// Load a question set from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read question set: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid question set: {}", path.display()))
    }

    /// Validate internal consistency: unique ids, in-range option
    /// indices, pair keys referencing declared items.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for q in &self.questions {
            if !seen.insert(q.id.as_str()) {
                anyhow::bail!("duplicate question id: {}", q.id);
            }
            match &q.kind {
                QuestionKind::Single { options, correct }
                | QuestionKind::Multiple { options, correct } => {
                    if correct.is_empty() {
                        anyhow::bail!("question {} has no correct options", q.id);
                    }
                    if let Some(&idx) = correct.iter().find(|&&i| i >= options.len()) {
                        anyhow::bail!("question {} correct index {idx} out of range", q.id);
                    }
                }
                QuestionKind::Matching {
                    terms,
                    meanings,
                    correct,
                } => {
                    for pair in correct {
                        if !terms.iter().any(|t| t.id == pair.term) {
                            anyhow::bail!("question {} references unknown term {}", q.id, pair.term);
                        }
                        if !meanings.iter().any(|m| m.id == pair.meaning) {
                            anyhow::bail!(
                                "question {} references unknown meaning {}",
                                q.id,
                                pair.meaning
                            );
                        }
                    }
                }
                QuestionKind::FreeText { accepted } => {
                    if accepted.is_empty() {
                        anyhow::bail!("question {} has no accepted answers", q.id);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictness_display_and_parse() {
        assert_eq!(Strictness::Medium.to_string(), "medium");
        assert_eq!("lite".parse::<Strictness>().unwrap(), Strictness::Lite);
        assert_eq!("Unreal".parse::<Strictness>().unwrap(), Strictness::Unreal);
        assert!("brutal".parse::<Strictness>().is_err());
    }

    #[test]
    fn default_threshold_is_85_percent_rounded_up() {
        assert_eq!(Settings::defaults_for(4).pass_threshold, 4);
        assert_eq!(Settings::defaults_for(10).pass_threshold, 9);
        assert_eq!(Settings::defaults_for(20).pass_threshold, 17);
        // Never below 1, even for an empty pool.
        assert_eq!(Settings::defaults_for(0).pass_threshold, 1);
        assert_eq!(Settings::defaults_for(1).pass_threshold, 1);
    }

    #[test]
    fn patch_merges_over_defaults() {
        let patch = SettingsPatch {
            pass_threshold: Some(3),
            strictness: Some(Strictness::Hard),
            ..SettingsPatch::default()
        };
        let merged = patch.apply(Settings::defaults_for(10));
        assert_eq!(merged.pass_threshold, 3);
        assert_eq!(merged.strictness, Strictness::Hard);
        assert!(merged.show_incorrect_at_end);
    }

    #[test]
    fn question_serde_roundtrip() {
        let q = Question {
            id: "q1".into(),
            text: "Pick one".into(),
            kind: QuestionKind::Single {
                options: vec!["a".into(), "b".into()],
                correct: BTreeSet::from([1]),
            },
        };
        let json = serde_json::to_string(&q).unwrap();
        let back: Question = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "q1");
        assert!(matches!(back.kind, QuestionKind::Single { .. }));
    }

    #[test]
    fn answer_serde_roundtrip() {
        let a = Answer::Pairs(BTreeSet::from([PairKey {
            term: "t1".into(),
            meaning: "m2".into(),
        }]));
        let json = serde_json::to_string(&a).unwrap();
        let back: Answer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn parse_question_set_toml() {
        let toml_str = r#"
id = "geo-101"
name = "Geography basics"

[[questions]]
id = "q1"
text = "Capital of France?"
type = "single"
options = ["Paris", "Lyon"]
correct = [0]

[[questions]]
id = "q2"
text = "Name the largest ocean."
type = "free_text"
accepted = ["Pacific", "Pacific Ocean"]
"#;
        let set = QuestionSet::from_toml_str(toml_str).unwrap();
        assert_eq!(set.id, "geo-101");
        assert_eq!(set.questions.len(), 2);
        assert!(set.questions[1].is_free_text());
    }

    #[test]
    fn validate_rejects_out_of_range_index() {
        let toml_str = r#"
id = "bad"
name = "Bad"

[[questions]]
id = "q1"
text = "?"
type = "single"
options = ["a"]
correct = [3]
"#;
        assert!(QuestionSet::from_toml_str(toml_str).is_err());
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let toml_str = r#"
id = "dup"
name = "Dup"

[[questions]]
id = "q1"
text = "?"
type = "free_text"
accepted = ["x"]

[[questions]]
id = "q1"
text = "?"
type = "free_text"
accepted = ["y"]
"#;
        assert!(QuestionSet::from_toml_str(toml_str).is_err());
    }
}

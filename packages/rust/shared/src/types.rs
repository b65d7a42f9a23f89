//! Core domain types for lesson generation runs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LessonError;
use crate::lesson::GeneratedLesson;

// ---------------------------------------------------------------------------
// LessonId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for lesson identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LessonId(pub Uuid);

impl LessonId {
    /// Generate a new time-sortable lesson identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LessonId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LessonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LessonId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// LessonType
// ---------------------------------------------------------------------------

/// The kind of lesson requested. Decides which optional sections are active.
///
/// Unrecognised names are preserved in [`LessonType::Other`] and get the
/// base section set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LessonType {
    Discussion,
    Grammar,
    Pronunciation,
    Travel,
    Business,
    Other(String),
}

impl LessonType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Discussion => "discussion",
            Self::Grammar => "grammar",
            Self::Pronunciation => "pronunciation",
            Self::Travel => "travel",
            Self::Business => "business",
            Self::Other(name) => name,
        }
    }

    /// The built-in lesson types, in display order.
    pub fn known() -> [LessonType; 5] {
        [
            Self::Discussion,
            Self::Grammar,
            Self::Pronunciation,
            Self::Travel,
            Self::Business,
        ]
    }
}

impl From<&str> for LessonType {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "discussion" => Self::Discussion,
            "grammar" => Self::Grammar,
            "pronunciation" => Self::Pronunciation,
            "travel" => Self::Travel,
            "business" => Self::Business,
            _ => Self::Other(value.trim().to_string()),
        }
    }
}

impl From<String> for LessonType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<LessonType> for String {
    fn from(value: LessonType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for LessonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StudentLevel
// ---------------------------------------------------------------------------

/// CEFR proficiency level of the target student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StudentLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl StudentLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::B1 => "B1",
            Self::B2 => "B2",
            Self::C1 => "C1",
            Self::C2 => "C2",
        }
    }

    /// Short register hint used in prompts.
    pub fn descriptor(&self) -> &'static str {
        match self {
            Self::A1 | Self::A2 => "beginner: short sentences, high-frequency words",
            Self::B1 | Self::B2 => "intermediate: everyday topics, some idioms",
            Self::C1 | Self::C2 => "advanced: nuanced, idiomatic, abstract language",
        }
    }
}

impl FromStr for StudentLevel {
    type Err = LessonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A1" => Ok(Self::A1),
            "A2" => Ok(Self::A2),
            "B1" => Ok(Self::B1),
            "B2" => Ok(Self::B2),
            "C1" => Ok(Self::C1),
            "C2" => Ok(Self::C2),
            other => Err(LessonError::validation(format!(
                "unknown student level '{other}': expected A1, A2, B1, B2, C1 or C2"
            ))),
        }
    }
}

impl fmt::Display for StudentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SectionKind
// ---------------------------------------------------------------------------

/// One independently-schema'd module of a lesson.
///
/// Declaration order is the canonical generation and display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionKind {
    Warmup,
    Vocabulary,
    Reading,
    Comprehension,
    Discussion,
    Dialogue,
    Grammar,
    Pronunciation,
    WrapUp,
}

impl SectionKind {
    /// Every section, in canonical order.
    pub const ALL: [SectionKind; 9] = [
        Self::Warmup,
        Self::Vocabulary,
        Self::Reading,
        Self::Comprehension,
        Self::Discussion,
        Self::Dialogue,
        Self::Grammar,
        Self::Pronunciation,
        Self::WrapUp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warmup => "warmup",
            Self::Vocabulary => "vocabulary",
            Self::Reading => "reading",
            Self::Comprehension => "comprehension",
            Self::Discussion => "discussion",
            Self::Dialogue => "dialogue",
            Self::Grammar => "grammar",
            Self::Pronunciation => "pronunciation",
            Self::WrapUp => "wrap-up",
        }
    }

    /// Sections whose output this section reads when they are active.
    pub fn depends_on(&self) -> &'static [SectionKind] {
        match self {
            Self::Reading => &[Self::Vocabulary],
            Self::Comprehension => &[Self::Reading],
            Self::WrapUp => &[Self::Vocabulary],
            _ => &[],
        }
    }
}

impl FromStr for SectionKind {
    type Err = LessonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "warmup" | "warm-up" => Ok(Self::Warmup),
            "vocabulary" => Ok(Self::Vocabulary),
            "reading" => Ok(Self::Reading),
            "comprehension" => Ok(Self::Comprehension),
            "discussion" => Ok(Self::Discussion),
            "dialogue" => Ok(Self::Dialogue),
            "grammar" => Ok(Self::Grammar),
            "pronunciation" => Ok(Self::Pronunciation),
            "wrap-up" | "wrapup" => Ok(Self::WrapUp),
            other => Err(LessonError::validation(format!("unknown section '{other}'"))),
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

/// Why a section was accepted below target or replaced by its template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Output stopped mid-structure (token-limit artifact).
    TruncatedOutput,
    /// Output was not parseable as the expected structure.
    MalformedOutput,
    /// Nothing usable arrived: an empty reply, or no reply within the
    /// call or section time budget.
    EmptyOutput,
    /// The remote call failed.
    UpstreamFailure,
    /// Parsed cleanly but fell short of the section minimums.
    BelowMinimum,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TruncatedOutput => "TRUNCATED_OUTPUT",
            Self::MalformedOutput => "MALFORMED_OUTPUT",
            Self::EmptyOutput => "EMPTY_OUTPUT",
            Self::UpstreamFailure => "UPSTREAM_FAILURE",
            Self::BelowMinimum => "BELOW_MINIMUM",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Run parameters
// ---------------------------------------------------------------------------

/// Input to a single lesson generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonParams {
    /// Raw source text supplied by the content-extraction collaborator.
    pub source_text: String,
    /// Title reported by the source, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
    pub lesson_type: LessonType,
    pub student_level: StudentLevel,
    /// Language the lesson teaches (e.g. "English").
    pub target_language: String,
}

// ---------------------------------------------------------------------------
// Progress events
// ---------------------------------------------------------------------------

/// Orchestrator state reported in progress updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    BuildingContext,
    GeneratingSection,
    Assembling,
    Done,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::BuildingContext => "Analyzing source text",
            Self::GeneratingSection => "Generating section",
            Self::Assembling => "Assembling lesson",
            Self::Done => "Done",
        }
    }
}

/// A progress notification, emitted at phase and section boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// 1-based sequence number within the run.
    pub step: u32,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<SectionKind>,
    /// Completion percentage, 0–100, non-decreasing within a run.
    pub progress: u8,
}

/// One message on the outbound progress stream.
///
/// A stream is a sequence of `Progress` events terminated by exactly one
/// `Complete` or `Error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GenerationEvent {
    Progress(ProgressUpdate),
    Complete { lesson: Box<GeneratedLesson> },
    Error { kind: String, message: String },
}

impl GenerationEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}

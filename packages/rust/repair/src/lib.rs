//! Recovery from truncated, malformed and empty model output.
//!
//! Model output is untrusted text. Everything here is a pure function of
//! that text:
//! - [`repair_json`] fixes near-valid JSON using a fixed table of known
//!   failure modes ([`RepairFix`])
//! - [`parse_lenient`] runs strict parse → repair → re-parse for a target type
//!   and classifies what went wrong when nothing works
//! - [`extract`] pulls structure out of free text (dialogue lines, numbered
//!   lists, `word - meaning` pairs) when the model ignored the JSON format

pub mod extract;
mod json;

use serde::de::DeserializeOwned;
use tracing::debug;

use lessonforge_shared::FailureKind;

pub use json::Repair;

// ---------------------------------------------------------------------------
// Failure-mode table
// ---------------------------------------------------------------------------

/// A known failure mode of model-produced JSON, and the fix applied for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepairFix {
    /// Payload wrapped in a Markdown code fence.
    CodeFence,
    /// Commentary before or after the JSON value.
    SurroundingProse,
    /// Raw newline, tab or other control character inside a string literal.
    ControlCharacter,
    /// Comma directly before `]` or `}`.
    TrailingComma,
    /// Output ended inside a string literal.
    UnterminatedString,
    /// Output ended after a key, colon, comma or partial literal.
    DanglingToken,
    /// The last element of the outermost open array was cut off and dropped.
    IncompleteTail,
    /// Missing `]` or `}`.
    UnclosedContainer,
}

impl RepairFix {
    /// Every failure mode, in the order fixes are applied.
    pub const ALL: [RepairFix; 8] = [
        Self::CodeFence,
        Self::SurroundingProse,
        Self::ControlCharacter,
        Self::TrailingComma,
        Self::UnterminatedString,
        Self::DanglingToken,
        Self::IncompleteTail,
        Self::UnclosedContainer,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            Self::CodeFence => "strip Markdown code fence",
            Self::SurroundingProse => "drop text outside the JSON value",
            Self::ControlCharacter => "escape raw control characters in strings",
            Self::TrailingComma => "remove comma before closing bracket",
            Self::UnterminatedString => "close unterminated string",
            Self::DanglingToken => "cut back dangling key, colon or partial literal",
            Self::IncompleteTail => "drop incomplete last array element",
            Self::UnclosedContainer => "close open arrays and objects",
        }
    }

    /// Whether this fix only makes sense for output that was cut short.
    pub fn implies_truncation(&self) -> bool {
        matches!(
            self,
            Self::UnterminatedString
                | Self::DanglingToken
                | Self::IncompleteTail
                | Self::UnclosedContainer
        )
    }
}

/// Repair near-valid JSON.
///
/// Returns the first repair candidate that parses as JSON, or `None` if the
/// text holds no repairable structure. Text that already parses is returned
/// unchanged with no fixes.
pub fn repair_json(raw: &str) -> Option<Repair> {
    let trimmed = raw.trim();
    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Some(Repair {
            text: trimmed.to_string(),
            fixes: Vec::new(),
        });
    }

    json::scan(trimmed)?
        .candidates()
        .into_iter()
        .find(|c| serde_json::from_str::<serde_json::Value>(&c.text).is_ok())
}

// ---------------------------------------------------------------------------
// Lenient typed parsing
// ---------------------------------------------------------------------------

/// A successfully parsed value and how much help it needed.
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub value: T,
    /// Fixes applied before the parse succeeded (empty for a strict parse).
    pub fixes: Vec<RepairFix>,
}

impl<T> Parsed<T> {
    /// Whether the value came from output that was cut short.
    pub fn was_truncated(&self) -> bool {
        self.fixes.iter().any(RepairFix::implies_truncation)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Parsed<U> {
        Parsed {
            value: f(self.value),
            fixes: self.fixes,
        }
    }
}

/// Why output could not be parsed into the expected structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    /// No text at all.
    Empty,
    /// Structure was cut off and no repair yields the expected shape.
    Truncated,
    /// Not recognisable as the expected structure.
    Malformed,
}

impl ParseFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Empty => FailureKind::EmptyOutput,
            Self::Truncated => FailureKind::TruncatedOutput,
            Self::Malformed => FailureKind::MalformedOutput,
        }
    }
}

/// Strict parse, then repair and re-parse, into `T`.
pub fn parse_lenient<T: DeserializeOwned>(raw: &str) -> Result<Parsed<T>, ParseFailure> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseFailure::Empty);
    }

    if let Ok(value) = serde_json::from_str::<T>(trimmed) {
        return Ok(Parsed {
            value,
            fixes: Vec::new(),
        });
    }

    let Some(scan) = json::scan(trimmed) else {
        return Err(ParseFailure::Malformed);
    };

    for candidate in scan.candidates() {
        match serde_json::from_str::<T>(&candidate.text) {
            Ok(value) => {
                debug!(fixes = ?candidate.fixes, "parsed after repair");
                return Ok(Parsed {
                    value,
                    fixes: candidate.fixes,
                });
            }
            Err(e) => debug!(error = %e, "repair candidate rejected"),
        }
    }

    if scan.truncated() {
        Err(ParseFailure::Truncated)
    } else {
        Err(ParseFailure::Malformed)
    }
}

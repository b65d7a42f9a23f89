//! Shared context and the assembled lesson.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::section::SectionResult;
use crate::types::{FailureKind, LessonId, LessonType, SectionKind, StudentLevel};

/// Where the shared context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextOrigin {
    /// Every field came from the generation service.
    Ai,
    /// Some fields were filled by the heuristic extractor.
    Mixed,
    /// The generation service was unavailable; heuristic only.
    Heuristic,
}

/// Read-only analysis of the source text, reused by every section generator
/// within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedContext {
    pub lesson_title: String,
    pub key_vocabulary: Vec<String>,
    pub main_themes: Vec<String>,
    pub difficulty_level: StudentLevel,
    pub source_summary: String,
    pub target_language: String,
    pub lesson_type: LessonType,
    /// Length-bounded slice of the normalized source used in prompts.
    pub source_excerpt: String,
    pub origin: ContextOrigin,
}

/// A section that was accepted below target or replaced by its template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedSection {
    pub section: SectionKind,
    pub failure: FailureKind,
    /// `true` when the section content is the deterministic template.
    pub fallback: bool,
    pub detail: String,
}

/// Token and call accounting for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub calls: u32,
    pub failed_calls: u32,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub models: BTreeSet<String>,
}

impl UsageStats {
    /// Account for one successful remote call.
    pub fn record_call(&mut self, tokens_in: u64, tokens_out: u64, model: &str) {
        self.calls += 1;
        self.tokens_in += tokens_in;
        self.tokens_out += tokens_out;
        if !model.is_empty() {
            self.models.insert(model.to_string());
        }
    }

    /// Account for one remote call that failed after its retries.
    pub fn record_failure(&mut self) {
        self.calls += 1;
        self.failed_calls += 1;
    }

    pub fn merge(&mut self, other: &UsageStats) {
        self.calls += other.calls;
        self.failed_calls += other.failed_calls;
        self.tokens_in += other.tokens_in;
        self.tokens_out += other.tokens_out;
        self.models.extend(other.models.iter().cloned());
    }
}

/// The finished lesson handed to persistence and export collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedLesson {
    pub id: LessonId,
    pub title: String,
    pub lesson_type: LessonType,
    pub student_level: StudentLevel,
    pub target_language: String,
    /// Completed sections in canonical order.
    pub sections: Vec<SectionResult>,
    #[serde(default)]
    pub degraded: Vec<DegradedSection>,
    /// User-facing note about degraded sections, when policy asks for one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    pub context_origin: ContextOrigin,
    /// SHA-256 of the normalized source text.
    pub source_hash: String,
    #[serde(default)]
    pub usage: UsageStats,
    pub generated_at: DateTime<Utc>,
}

impl GeneratedLesson {
    pub fn section(&self, kind: SectionKind) -> Option<&SectionResult> {
        self.sections.iter().find(|s| s.kind() == kind)
    }

    pub fn is_degraded(&self, kind: SectionKind) -> bool {
        self.degraded.iter().any(|d| d.section == kind)
    }
}

//! Shared types, error model, and configuration for LessonForge.
//!
//! This crate is the foundation depended on by all other LessonForge crates.
//! It provides:
//! - [`LessonError`]: the unified error type
//! - Domain types ([`SharedContext`], [`SectionResult`], [`GeneratedLesson`], [`ProgressUpdate`])
//! - Configuration ([`AppConfig`], [`ClientConfig`], config loading)

pub mod config;
pub mod error;
pub mod lesson;
pub mod section;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AiConfig, AppConfig, ClientConfig, DefaultsConfig, EndpointConfig, MAX_CALL_RETRIES,
    PolicyConfig, Schedule, config_dir, config_file_path, init_config, load_config,
    load_config_from, validate_api_key,
};
pub use error::{LessonError, Result};
pub use lesson::{ContextOrigin, DegradedSection, GeneratedLesson, SharedContext, UsageStats};
pub use section::{
    ComprehensionQuestion, ComprehensionSection, DialogueLine, DialogueSection,
    DiscussionSection, GrammarExercise, GrammarSection, PronunciationSection, PronunciationWord,
    ReadingSection, SectionResult, VocabularyItem, VocabularySection, WarmupSection,
    WrapUpSection,
};
pub use types::{
    FailureKind, GenerationEvent, LessonId, LessonParams, LessonType, Phase, ProgressUpdate,
    SectionKind, StudentLevel,
};

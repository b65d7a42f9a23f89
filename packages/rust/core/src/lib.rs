//! Lesson generation for LessonForge.
//!
//! This crate turns source text into a structured lesson: it builds one
//! shared context, generates each section through the repair and template
//! fallback chain, and reports weighted progress while doing so. The only
//! fatal outcome is failing to build the shared context.

pub mod collab;
pub mod context;
pub mod pipeline;
pub mod postprocess;
pub mod progress;
pub mod router;
pub mod sections;

pub use collab::{LessonSink, SourceDocument, SourceProvider};
pub use context::{BuiltContext, build_context, source_hash};
pub use pipeline::{
    ChannelReporter, GeneratorConfig, LessonGenerator, ProgressReporter, SilentProgress,
};
pub use progress::{PhaseWeights, ProgressTracker, active_sections, calculate_progress};
pub use router::ModelRouter;
pub use sections::{SectionOutcome, Verdict, generate_section, max_output_tokens};

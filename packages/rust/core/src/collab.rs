//! Seams to the systems around the pipeline: where source text comes from
//! and where finished lessons go.

use async_trait::async_trait;

use lessonforge_shared::{GeneratedLesson, LessonParams, LessonType, Result, StudentLevel};

/// Source text as handed over by the content-extraction collaborator.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub text: String,
    pub title: Option<String>,
    /// Where the text came from (file path, URL, ...), for logs.
    pub origin: String,
}

impl SourceDocument {
    pub fn into_params(
        self,
        lesson_type: LessonType,
        student_level: StudentLevel,
        target_language: impl Into<String>,
    ) -> LessonParams {
        LessonParams {
            source_text: self.text,
            source_title: self.title,
            lesson_type,
            student_level,
            target_language: target_language.into(),
        }
    }
}

/// Supplies raw source text.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch(&self) -> Result<SourceDocument>;
}

/// Accepts finished lessons (persistence, export queue, ...).
#[async_trait]
pub trait LessonSink: Send + Sync {
    async fn store(&self, lesson: &GeneratedLesson) -> Result<()>;
}

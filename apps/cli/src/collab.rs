//! File-backed source and sink for the CLI.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use lessonforge_core::{LessonSink, SourceDocument, SourceProvider};
use lessonforge_shared::{GeneratedLesson, LessonError, Result};

/// Reads source text from a file on disk.
pub(crate) struct FileSource {
    path: PathBuf,
    title: Option<String>,
}

impl FileSource {
    pub(crate) fn new(path: impl Into<PathBuf>, title: Option<String>) -> Self {
        Self {
            path: path.into(),
            title,
        }
    }
}

#[async_trait]
impl SourceProvider for FileSource {
    async fn fetch(&self) -> Result<SourceDocument> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| LessonError::io(&self.path, e))?;
        debug!(path = %self.path.display(), chars = text.len(), "source loaded");

        Ok(SourceDocument {
            text,
            title: self.title.clone(),
            origin: self.path.display().to_string(),
        })
    }
}

/// Writes finished lessons as pretty-printed JSON.
///
/// Writes to `out` when given, otherwise to `<root>/<lesson-id>.json`.
pub(crate) struct JsonFileSink {
    out: Option<PathBuf>,
    root: PathBuf,
}

impl JsonFileSink {
    pub(crate) fn new(out: Option<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            out,
            root: root.into(),
        }
    }

    pub(crate) fn path_for(&self, lesson: &GeneratedLesson) -> PathBuf {
        self.out
            .clone()
            .unwrap_or_else(|| self.root.join(format!("{}.json", lesson.id)))
    }
}

#[async_trait]
impl LessonSink for JsonFileSink {
    async fn store(&self, lesson: &GeneratedLesson) -> Result<()> {
        let path = self.path_for(lesson);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir(parent).await?;
        }

        let json = serde_json::to_string_pretty(lesson)
            .map_err(|e| LessonError::validation(format!("cannot serialize lesson: {e}")))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| LessonError::io(&path, e))?;

        info!(lesson_id = %lesson.id, path = %path.display(), "lesson written");
        Ok(())
    }
}

async fn create_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| LessonError::io(dir, e))
}

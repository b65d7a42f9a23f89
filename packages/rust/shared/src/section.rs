//! Section payloads: one shape per lesson section.

use serde::{Deserialize, Serialize};

use crate::types::SectionKind;

/// Warm-up questions that open the lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupSection {
    #[serde(default)]
    pub questions: Vec<String>,
}

/// A single vocabulary entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyItem {
    pub word: String,
    #[serde(alias = "definition")]
    pub meaning: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularySection {
    #[serde(default, alias = "words", alias = "vocabulary")]
    pub items: Vec<VocabularyItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSection {
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "text", alias = "content")]
    pub passage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensionQuestion {
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensionSection {
    #[serde(default)]
    pub questions: Vec<ComprehensionQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionSection {
    #[serde(default)]
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueLine {
    #[serde(alias = "speaker")]
    pub character: String,
    #[serde(alias = "text")]
    pub line: String,
}

/// A role-play dialogue. Lines may contain `___` gaps; `answers` is the
/// word bank for those gaps, never in gap order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueSection {
    #[serde(default)]
    pub lines: Vec<DialogueLine>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarExercise {
    #[serde(alias = "question")]
    pub prompt: String,
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarSection {
    #[serde(default)]
    pub focus: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub exercises: Vec<GrammarExercise>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PronunciationWord {
    pub word: String,
    #[serde(default, alias = "ipa")]
    pub phonetic: String,
    #[serde(default)]
    pub tip: String,
}

/// Pronunciation payload. The `shape` discriminant separates the legacy
/// single-word format from the current multi-word one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum PronunciationSection {
    SingleWord {
        word: String,
        #[serde(default)]
        phonetic: String,
        #[serde(default)]
        tips: Vec<String>,
    },
    MultiWord {
        words: Vec<PronunciationWord>,
        #[serde(default)]
        tongue_twisters: Vec<String>,
    },
}

impl PronunciationSection {
    /// Words the student practises, regardless of shape.
    pub fn target_words(&self) -> Vec<&str> {
        match self {
            Self::SingleWord { word, .. } => vec![word.as_str()],
            Self::MultiWord { words, .. } => words.iter().map(|w| w.word.as_str()).collect(),
        }
    }

    pub fn tongue_twister_count(&self) -> usize {
        match self {
            Self::SingleWord { .. } => 0,
            Self::MultiWord {
                tongue_twisters, ..
            } => tongue_twisters.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrapUpSection {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub reflection_questions: Vec<String>,
}

/// A completed section, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "section", rename_all = "kebab-case")]
pub enum SectionResult {
    Warmup(WarmupSection),
    Vocabulary(VocabularySection),
    Reading(ReadingSection),
    Comprehension(ComprehensionSection),
    Discussion(DiscussionSection),
    Dialogue(DialogueSection),
    Grammar(GrammarSection),
    Pronunciation(PronunciationSection),
    WrapUp(WrapUpSection),
}

impl SectionResult {
    pub fn kind(&self) -> SectionKind {
        match self {
            Self::Warmup(_) => SectionKind::Warmup,
            Self::Vocabulary(_) => SectionKind::Vocabulary,
            Self::Reading(_) => SectionKind::Reading,
            Self::Comprehension(_) => SectionKind::Comprehension,
            Self::Discussion(_) => SectionKind::Discussion,
            Self::Dialogue(_) => SectionKind::Dialogue,
            Self::Grammar(_) => SectionKind::Grammar,
            Self::Pronunciation(_) => SectionKind::Pronunciation,
            Self::WrapUp(_) => SectionKind::WrapUp,
        }
    }

    pub fn as_vocabulary(&self) -> Option<&VocabularySection> {
        match self {
            Self::Vocabulary(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_reading(&self) -> Option<&ReadingSection> {
        match self {
            Self::Reading(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_result_is_tagged_by_kind() {
        let result = SectionResult::Discussion(DiscussionSection {
            questions: vec!["Why?".into()],
        });
        let json = serde_json::to_string(&result).expect("serialize");
        assert!(json.contains(r#""section":"discussion""#));
        assert_eq!(result.kind(), SectionKind::Discussion);
    }

    #[test]
    fn pronunciation_shapes_are_discriminated() {
        let legacy = r#"{"shape":"single_word","word":"thought","phonetic":"/θɔːt/"}"#;
        let parsed: PronunciationSection = serde_json::from_str(legacy).expect("legacy shape");
        assert_eq!(parsed.target_words(), vec!["thought"]);
        assert_eq!(parsed.tongue_twister_count(), 0);

        let current = PronunciationSection::MultiWord {
            words: vec![PronunciationWord {
                word: "three".into(),
                phonetic: "/θriː/".into(),
                tip: String::new(),
            }],
            tongue_twisters: vec!["Three thin thinkers".into()],
        };
        let wrapped = SectionResult::Pronunciation(current.clone());
        let json = serde_json::to_string(&wrapped).expect("serialize");
        assert!(json.contains(r#""section":"pronunciation""#));
        assert!(json.contains(r#""shape":"multi_word""#));
        let back: SectionResult = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, wrapped);
    }

    #[test]
    fn vocabulary_accepts_common_aliases() {
        let json = r#"{"words":[{"word":"cozy","definition":"warm and comfortable"}]}"#;
        let parsed: VocabularySection = serde_json::from_str(json).expect("aliases");
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].meaning, "warm and comfortable");
        assert!(parsed.items[0].examples.is_empty());
    }
}

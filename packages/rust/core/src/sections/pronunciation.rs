use serde::Deserialize;

use lessonforge_shared::{
    PronunciationSection, PronunciationWord, SectionKind, SectionResult, SharedContext,
};

use super::{
    JSON_ONLY, PriorSections, SectionSpec, Verdict, lesson_words, padded_words, prompt_header,
};
use crate::postprocess::clean_list;

const MIN_WORDS: usize = 3;

pub(crate) struct Pronunciation;

/// Model reply in any of the shapes it has been seen to use.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PronunciationWire {
    Tagged(PronunciationSection),
    MultiWord {
        words: Vec<PronunciationWord>,
        #[serde(default, alias = "twisters")]
        tongue_twisters: Vec<String>,
    },
    SingleWord {
        word: String,
        #[serde(default, alias = "ipa")]
        phonetic: String,
        #[serde(default)]
        tips: Vec<String>,
    },
}

/// A pronunciation payload normalized to the tagged union.
#[derive(Debug, Deserialize)]
#[serde(from = "PronunciationWire")]
pub(crate) struct PronunciationReply(PronunciationSection);

impl From<PronunciationWire> for PronunciationReply {
    fn from(wire: PronunciationWire) -> Self {
        Self(match wire {
            PronunciationWire::Tagged(section) => section,
            PronunciationWire::MultiWord {
                words,
                tongue_twisters,
            } => PronunciationSection::MultiWord {
                words,
                tongue_twisters,
            },
            PronunciationWire::SingleWord {
                word,
                phonetic,
                tips,
            } => PronunciationSection::SingleWord {
                word,
                phonetic,
                tips,
            },
        })
    }
}

impl SectionSpec for Pronunciation {
    type Output = PronunciationReply;

    const KIND: SectionKind = SectionKind::Pronunciation;
    const MAX_OUTPUT_TOKENS: u32 = 900;
    const TEMPERATURE: f32 = 0.5;

    fn prompt(ctx: &SharedContext, prior: &PriorSections) -> String {
        format!(
            "{header}\
             Pick 4-6 words from this list that learners often mispronounce: {words}. For each \
             give the IPA and one practical tip. Add 1-2 short tongue twisters that practise the \
             same sounds.\n\
             {JSON_ONLY}\n\
             {{\"words\": [{{\"word\": \"...\", \"phonetic\": \"...\", \"tip\": \"...\"}}], \
             \"tongue_twisters\": [\"...\"]}}",
            header = prompt_header(ctx, "pronunciation"),
            words = lesson_words(ctx, prior).join(", "),
        )
    }

    fn validate(output: &PronunciationReply) -> Verdict {
        let section = &output.0;
        let words = section
            .target_words()
            .into_iter()
            .filter(|w| !w.trim().is_empty())
            .count();

        match Verdict::count("target words", words, MIN_WORDS) {
            Verdict::Full if section.tongue_twister_count() == 0 => {
                Verdict::Partial("no tongue twisters".into())
            }
            verdict => verdict,
        }
    }

    fn template(ctx: &SharedContext, prior: &PriorSections) -> PronunciationReply {
        let words = padded_words(ctx, prior, MIN_WORDS)
            .into_iter()
            .take(5)
            .map(|word| PronunciationWord {
                tip: format!("Clap the syllables of \"{word}\", find the stressed one, then say it at normal speed."),
                word,
                phonetic: String::new(),
            })
            .collect();

        PronunciationReply(PronunciationSection::MultiWord {
            words,
            tongue_twisters: vec!["Red lorry, yellow lorry, red lorry, yellow lorry.".to_string()],
        })
    }

    fn finish(output: PronunciationReply) -> SectionResult {
        let section = match output.0 {
            PronunciationSection::SingleWord {
                word,
                phonetic,
                tips,
            } => PronunciationSection::SingleWord {
                word: word.trim().to_string(),
                phonetic: phonetic.trim().to_string(),
                tips: clean_list(tips),
            },
            PronunciationSection::MultiWord {
                words,
                tongue_twisters,
            } => PronunciationSection::MultiWord {
                words: words
                    .into_iter()
                    .filter(|w| !w.word.trim().is_empty())
                    .map(|w| PronunciationWord {
                        word: w.word.trim().to_string(),
                        phonetic: w.phonetic.trim().to_string(),
                        tip: w.tip.trim().to_string(),
                    })
                    .collect(),
                tongue_twisters: clean_list(tongue_twisters),
            },
        };
        SectionResult::Pronunciation(section)
    }
}

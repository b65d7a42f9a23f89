use lessonforge_repair::extract;
use lessonforge_shared::{ReadingSection, SectionKind, SectionResult, SharedContext};

use super::{JSON_ONLY, PriorSections, SectionSpec, Verdict, lesson_words, prompt_header, word_count};

/// Passage length that earns full credit.
const MIN_WORDS: usize = 80;
/// Longest template passage, in words.
const TEMPLATE_WORDS: usize = 220;

pub(crate) struct Reading;

impl SectionSpec for Reading {
    type Output = ReadingSection;

    const KIND: SectionKind = SectionKind::Reading;
    const MAX_OUTPUT_TOKENS: u32 = 2000;

    fn prompt(ctx: &SharedContext, prior: &PriorSections) -> String {
        format!(
            "{header}\
             Adapt the source into a reading passage of 180-300 words at the students' level. \
             Use each of these words at least once: {words}.\n\
             Source:\n\"\"\"\n{excerpt}\n\"\"\"\n\
             {JSON_ONLY}\n\
             {{\"title\": \"...\", \"passage\": \"...\"}}",
            header = prompt_header(ctx, "reading"),
            words = lesson_words(ctx, prior).join(", "),
            excerpt = ctx.source_excerpt,
        )
    }

    fn extract(raw: &str, ctx: &SharedContext) -> Option<ReadingSection> {
        Some(ReadingSection {
            title: ctx.lesson_title.clone(),
            passage: extract::plain_passage(raw),
        })
    }

    fn validate(output: &ReadingSection) -> Verdict {
        match word_count(&output.passage) {
            0 => Verdict::Empty,
            n if n < MIN_WORDS => {
                Verdict::Partial(format!("passage has {n} words, expected at least {MIN_WORDS}"))
            }
            _ => Verdict::Full,
        }
    }

    /// The source itself, cut to a manageable length.
    fn template(ctx: &SharedContext, prior: &PriorSections) -> ReadingSection {
        let mut words: Vec<&str> = ctx
            .source_excerpt
            .split_whitespace()
            .take(TEMPLATE_WORDS)
            .collect();
        let mut passage = words.join(" ");

        if words.len() < MIN_WORDS {
            words = ctx.source_summary.split_whitespace().collect();
            if !words.is_empty() {
                passage.push_str("\n\n");
                passage.push_str(&words.join(" "));
            }
            passage.push_str(&format!(
                "\n\nKey words: {}.",
                lesson_words(ctx, prior).join(", ")
            ));
        }

        ReadingSection {
            title: ctx.lesson_title.clone(),
            passage: passage.trim().to_string(),
        }
    }

    fn finish(output: ReadingSection) -> SectionResult {
        SectionResult::Reading(ReadingSection {
            title: output.title.trim().to_string(),
            passage: output.passage.trim().to_string(),
        })
    }
}

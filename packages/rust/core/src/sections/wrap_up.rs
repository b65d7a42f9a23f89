use lessonforge_repair::extract;
use lessonforge_shared::{SectionKind, SectionResult, SharedContext, WrapUpSection};

use super::{JSON_ONLY, PriorSections, SectionSpec, Verdict, lesson_words, prompt_header, theme};
use crate::postprocess::clean_list;

pub(crate) struct WrapUp;

impl SectionSpec for WrapUp {
    type Output = WrapUpSection;

    const KIND: SectionKind = SectionKind::WrapUp;
    const MAX_OUTPUT_TOKENS: u32 = 500;

    fn prompt(ctx: &SharedContext, prior: &PriorSections) -> String {
        format!(
            "{header}\
             Write a 2-3 sentence summary of what students learned, mentioning some of these \
             words: {words}. Add 2-3 short reflection questions.\n\
             {JSON_ONLY}\n\
             {{\"summary\": \"...\", \"reflection_questions\": [\"...\"]}}",
            header = prompt_header(ctx, "wrap-up"),
            words = lesson_words(ctx, prior).join(", "),
        )
    }

    fn extract(raw: &str, _ctx: &SharedContext) -> Option<WrapUpSection> {
        Some(WrapUpSection {
            summary: extract::plain_passage(raw),
            reflection_questions: Vec::new(),
        })
    }

    fn validate(output: &WrapUpSection) -> Verdict {
        if output.summary.trim().is_empty() {
            Verdict::Empty
        } else {
            Verdict::Full
        }
    }

    fn template(ctx: &SharedContext, prior: &PriorSections) -> WrapUpSection {
        let words = lesson_words(ctx, prior);
        let shown: Vec<&str> = words.iter().take(5).map(String::as_str).collect();
        WrapUpSection {
            summary: format!(
                "In this lesson we read and talked about \"{}\" and practised words such as {}.",
                ctx.lesson_title,
                shown.join(", ")
            ),
            reflection_questions: vec![
                "Which new word will you use this week?".to_string(),
                format!("What did you learn about {}?", theme(ctx, 0)),
            ],
        }
    }

    fn finish(output: WrapUpSection) -> SectionResult {
        SectionResult::WrapUp(WrapUpSection {
            summary: output.summary.trim().to_string(),
            reflection_questions: clean_list(output.reflection_questions),
        })
    }
}

use lessonforge_repair::extract;
use lessonforge_shared::{SectionKind, SectionResult, SharedContext, WarmupSection};

use super::{JSON_ONLY, PriorSections, SectionSpec, Verdict, non_blank, prompt_header, theme};
use crate::postprocess::clean_list;

const MIN_QUESTIONS: usize = 3;

pub(crate) struct Warmup;

impl SectionSpec for Warmup {
    type Output = WarmupSection;

    const KIND: SectionKind = SectionKind::Warmup;
    const MAX_OUTPUT_TOKENS: u32 = 400;

    fn prompt(ctx: &SharedContext, _prior: &PriorSections) -> String {
        format!(
            "{header}\
             Ask 3-5 short, personal warm-up questions that get students talking about the themes \
             before they read anything. No answers.\n\
             {JSON_ONLY}\n\
             {{\"questions\": [\"...\"]}}",
            header = prompt_header(ctx, "warm-up"),
        )
    }

    fn extract(raw: &str, _ctx: &SharedContext) -> Option<WarmupSection> {
        Some(WarmupSection {
            questions: extract::list_items(raw),
        })
    }

    fn validate(output: &WarmupSection) -> Verdict {
        Verdict::count("questions", non_blank(&output.questions), MIN_QUESTIONS)
    }

    fn template(ctx: &SharedContext, _prior: &PriorSections) -> WarmupSection {
        WarmupSection {
            questions: vec![
                format!("What do you already know about {}?", theme(ctx, 0)),
                format!("How does {} connect to your own life?", theme(ctx, 1)),
                format!(
                    "Look at the title \"{}\". What do you think the text will be about?",
                    ctx.lesson_title
                ),
            ],
        }
    }

    fn finish(output: WarmupSection) -> SectionResult {
        SectionResult::Warmup(WarmupSection {
            questions: clean_list(output.questions),
        })
    }
}

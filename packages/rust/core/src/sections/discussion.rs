use lessonforge_repair::extract;
use lessonforge_shared::{DiscussionSection, SectionKind, SectionResult, SharedContext};

use super::{JSON_ONLY, PriorSections, SectionSpec, Verdict, non_blank, prompt_header, theme};
use crate::postprocess::clean_list;

const MIN_QUESTIONS: usize = 5;

pub(crate) struct Discussion;

impl SectionSpec for Discussion {
    type Output = DiscussionSection;

    const KIND: SectionKind = SectionKind::Discussion;
    const MAX_OUTPUT_TOKENS: u32 = 600;

    fn prompt(ctx: &SharedContext, _prior: &PriorSections) -> String {
        format!(
            "{header}\
             Write 5-7 open discussion questions that invite opinions and personal experience. \
             Avoid yes/no questions.\n\
             Source summary: {summary}\n\
             {JSON_ONLY}\n\
             {{\"questions\": [\"...\"]}}",
            header = prompt_header(ctx, "discussion"),
            summary = ctx.source_summary,
        )
    }

    fn extract(raw: &str, _ctx: &SharedContext) -> Option<DiscussionSection> {
        Some(DiscussionSection {
            questions: extract::list_items(raw),
        })
    }

    fn validate(output: &DiscussionSection) -> Verdict {
        Verdict::count("questions", non_blank(&output.questions), MIN_QUESTIONS)
    }

    fn template(ctx: &SharedContext, _prior: &PriorSections) -> DiscussionSection {
        DiscussionSection {
            questions: vec![
                format!("What is your opinion of {}? Why?", theme(ctx, 0)),
                format!("How is {} different in your country?", theme(ctx, 1)),
                "Which idea from the text surprised you most, and why?".to_string(),
                "Do you agree with the main point of the text? Give reasons.".to_string(),
                format!("How do you think {} will change in the next ten years?", theme(ctx, 0)),
            ],
        }
    }

    fn finish(output: DiscussionSection) -> SectionResult {
        SectionResult::Discussion(DiscussionSection {
            questions: clean_list(output.questions),
        })
    }
}

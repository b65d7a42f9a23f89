use lessonforge_repair::extract;
use lessonforge_shared::{
    ComprehensionQuestion, ComprehensionSection, SectionKind, SectionResult, SharedContext,
};

use super::{JSON_ONLY, PriorSections, SectionSpec, Verdict, prompt_header};

const MIN_QUESTIONS: usize = 5;

pub(crate) struct Comprehension;

/// The passage students read: the reading section if present, else the source.
fn passage<'a>(ctx: &'a SharedContext, prior: &'a PriorSections) -> &'a str {
    prior
        .get(&SectionKind::Reading)
        .and_then(SectionResult::as_reading)
        .map(|r| r.passage.as_str())
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(ctx.source_excerpt.as_str())
}

impl SectionSpec for Comprehension {
    type Output = ComprehensionSection;

    const KIND: SectionKind = SectionKind::Comprehension;
    const MAX_OUTPUT_TOKENS: u32 = 900;
    const TEMPERATURE: f32 = 0.4;

    fn prompt(ctx: &SharedContext, prior: &PriorSections) -> String {
        format!(
            "{header}\
             Write 5-6 comprehension questions about the passage below, each with a short model \
             answer taken from the passage.\n\
             Passage:\n\"\"\"\n{passage}\n\"\"\"\n\
             {JSON_ONLY}\n\
             {{\"questions\": [{{\"question\": \"...\", \"answer\": \"...\"}}]}}",
            header = prompt_header(ctx, "reading comprehension"),
            passage = passage(ctx, prior),
        )
    }

    fn extract(raw: &str, _ctx: &SharedContext) -> Option<ComprehensionSection> {
        let questions = extract::list_items(raw)
            .into_iter()
            .map(|question| ComprehensionQuestion {
                question,
                answer: String::new(),
            })
            .collect();
        Some(ComprehensionSection { questions })
    }

    fn validate(output: &ComprehensionSection) -> Verdict {
        let asked = output
            .questions
            .iter()
            .filter(|q| !q.question.trim().is_empty())
            .count();
        Verdict::count("questions", asked, MIN_QUESTIONS)
    }

    fn template(ctx: &SharedContext, _prior: &PriorSections) -> ComprehensionSection {
        let open = |question: &str| ComprehensionQuestion {
            question: question.to_string(),
            answer: "Answers will vary.".to_string(),
        };
        ComprehensionSection {
            questions: vec![
                ComprehensionQuestion {
                    question: "What is the main idea of the text?".to_string(),
                    answer: ctx.source_summary.clone(),
                },
                ComprehensionQuestion {
                    question: "Which words from the text are new to you?".to_string(),
                    answer: ctx.key_vocabulary.join(", "),
                },
                open("Find two facts in the text and say them in your own words."),
                open("Who or what is the text mostly about?"),
                open("What happens at the end of the text?"),
            ],
        }
    }

    fn finish(output: ComprehensionSection) -> SectionResult {
        let questions = output
            .questions
            .into_iter()
            .filter(|q| !q.question.trim().is_empty())
            .map(|q| ComprehensionQuestion {
                question: q.question.trim().to_string(),
                answer: q.answer.trim().to_string(),
            })
            .collect();
        SectionResult::Comprehension(ComprehensionSection { questions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::test_support::coffee_context;
    use lessonforge_shared::ReadingSection;

    #[test]
    fn prompt_uses_reading_passage_when_available() {
        let ctx = coffee_context();
        let mut prior = PriorSections::new();
        prior.insert(
            SectionKind::Reading,
            SectionResult::Reading(ReadingSection {
                title: "Morning".into(),
                passage: "Mia roasts beans every morning.".into(),
            }),
        );
        let prompt = Comprehension::prompt(&ctx, &prior);
        assert!(prompt.contains("Mia roasts beans every morning."));

        let fallback = Comprehension::prompt(&ctx, &PriorSections::new());
        assert!(fallback.contains("Coffee began in Ethiopia."));
    }

    #[test]
    fn blank_questions_do_not_count() {
        let section = ComprehensionSection {
            questions: vec![
                ComprehensionQuestion {
                    question: "  ".into(),
                    answer: "x".into(),
                };
                6
            ],
        };
        assert_eq!(Comprehension::validate(&section), Verdict::Empty);
    }
}

use lessonforge_shared::{
    GrammarExercise, GrammarSection, SectionKind, SectionResult, SharedContext, StudentLevel,
};

use super::{JSON_ONLY, PriorSections, SectionSpec, Verdict, prompt_header, theme};
use crate::postprocess::clean_list;

const MIN_EXAMPLES: usize = 3;
const MIN_EXERCISES: usize = 3;

pub(crate) struct Grammar;

impl SectionSpec for Grammar {
    type Output = GrammarSection;

    const KIND: SectionKind = SectionKind::Grammar;
    const MAX_OUTPUT_TOKENS: u32 = 1200;
    const TEMPERATURE: f32 = 0.4;

    fn prompt(ctx: &SharedContext, _prior: &PriorSections) -> String {
        format!(
            "{header}\
             Pick one grammar point that appears in the source and suits the level. Explain it \
             in 2-3 sentences, give 3-4 examples on the lesson themes and 4-5 gap-fill exercises \
             with answers.\n\
             Source:\n\"\"\"\n{excerpt}\n\"\"\"\n\
             {JSON_ONLY}\n\
             {{\"focus\": \"...\", \"explanation\": \"...\", \"examples\": [\"...\"], \
             \"exercises\": [{{\"prompt\": \"...\", \"answer\": \"...\"}}]}}",
            header = prompt_header(ctx, "grammar"),
            excerpt = ctx.source_excerpt,
        )
    }

    fn validate(output: &GrammarSection) -> Verdict {
        let examples = output.examples.iter().filter(|e| !e.trim().is_empty()).count();
        let exercises = output
            .exercises
            .iter()
            .filter(|e| !e.prompt.trim().is_empty())
            .count();

        if examples == 0 && exercises == 0 && output.explanation.trim().is_empty() {
            return Verdict::Empty;
        }

        let mut missing = Vec::new();
        if examples < MIN_EXAMPLES {
            missing.push(format!("{examples} examples, expected at least {MIN_EXAMPLES}"));
        }
        if exercises < MIN_EXERCISES {
            missing.push(format!("{exercises} exercises, expected at least {MIN_EXERCISES}"));
        }
        if missing.is_empty() {
            Verdict::Full
        } else {
            Verdict::Partial(missing.join("; "))
        }
    }

    fn template(ctx: &SharedContext, _prior: &PriorSections) -> GrammarSection {
        let topic = theme(ctx, 0);
        let exercise = |prompt: &str, answer: &str| GrammarExercise {
            prompt: prompt.to_string(),
            answer: answer.to_string(),
        };

        match ctx.difficulty_level {
            StudentLevel::A1 | StudentLevel::A2 => GrammarSection {
                focus: "Present simple".into(),
                explanation: "Use the present simple for habits and facts. Add -s or -es to the \
                              verb after he, she and it."
                    .into(),
                examples: vec![
                    "I read the news every morning.".into(),
                    "She drinks tea after lunch.".into(),
                    format!("We often talk about {topic}."),
                ],
                exercises: vec![
                    exercise("He ___ (work) in a café.", "works"),
                    exercise("They ___ (live) near the sea.", "live"),
                    exercise("My sister ___ (watch) films at the weekend.", "watches"),
                ],
            },
            StudentLevel::B1 | StudentLevel::B2 => GrammarSection {
                focus: "Past simple and present perfect".into(),
                explanation: "Use the past simple for finished actions at a stated time. Use the \
                              present perfect for experiences and for past actions that matter now."
                    .into(),
                examples: vec![
                    "I visited Lisbon in 2019.".into(),
                    "I have visited Lisbon twice.".into(),
                    format!("Have you ever read about {topic}?"),
                ],
                exercises: vec![
                    exercise("She ___ (finish) the report yesterday.", "finished"),
                    exercise("We ___ (never / try) Ethiopian food.", "have never tried"),
                    exercise("___ you ___ (see) the new film yet?", "Have, seen"),
                ],
            },
            StudentLevel::C1 | StudentLevel::C2 => GrammarSection {
                focus: "Mixed conditionals".into(),
                explanation: "Mixed conditionals link an unreal past condition to a present \
                              result, or an unreal present condition to a past result."
                    .into(),
                examples: vec![
                    "If I had studied medicine, I would be a doctor now.".into(),
                    "If she were more patient, she would have finished the puzzle.".into(),
                    format!("If I had known more about {topic}, I would feel more confident today."),
                ],
                exercises: vec![
                    exercise(
                        "If he ___ (take) the job, he would live in Paris now.",
                        "had taken",
                    ),
                    exercise(
                        "If I ___ (be) braver, I would have spoken up.",
                        "were",
                    ),
                    exercise(
                        "If we had left earlier, we ___ (be) there by now.",
                        "would be",
                    ),
                ],
            },
        }
    }

    fn finish(output: GrammarSection) -> SectionResult {
        let exercises = output
            .exercises
            .into_iter()
            .filter(|e| !e.prompt.trim().is_empty())
            .map(|e| GrammarExercise {
                prompt: e.prompt.trim().to_string(),
                answer: e.answer.trim().to_string(),
            })
            .collect();
        SectionResult::Grammar(GrammarSection {
            focus: output.focus.trim().to_string(),
            explanation: output.explanation.trim().to_string(),
            examples: clean_list(output.examples),
            exercises,
        })
    }
}

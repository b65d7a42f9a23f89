use lessonforge_repair::extract;
use lessonforge_shared::{DialogueLine, DialogueSection, SectionKind, SectionResult, SharedContext};

use super::{
    JSON_ONLY, PriorSections, SectionSpec, Verdict, lesson_words, padded_words, prompt_header,
    theme,
};
use crate::postprocess::{clean_list, shuffle_answer_key};

const MIN_LINES: usize = 10;
const TEMPLATE_GAPS: usize = 3;

pub(crate) struct Dialogue;

impl SectionSpec for Dialogue {
    type Output = DialogueSection;

    const KIND: SectionKind = SectionKind::Dialogue;
    const MAX_OUTPUT_TOKENS: u32 = 1500;
    const TEMPERATURE: f32 = 0.8;

    fn prompt(ctx: &SharedContext, prior: &PriorSections) -> String {
        format!(
            "{header}\
             Write a realistic role-play dialogue of 12-16 lines between two named characters in a \
             situation connected to the themes. Replace 4-6 of these words with ___ where they \
             appear: {words}. List the removed words in \"answers\" in the order the gaps appear.\n\
             {JSON_ONLY}\n\
             {{\"lines\": [{{\"character\": \"...\", \"line\": \"...\"}}], \"answers\": [\"...\"]}}",
            header = prompt_header(ctx, "dialogue"),
            words = lesson_words(ctx, prior).join(", "),
        )
    }

    fn extract(raw: &str, _ctx: &SharedContext) -> Option<DialogueSection> {
        Some(DialogueSection {
            lines: extract::dialogue_lines(raw),
            answers: answer_line(raw),
        })
    }

    fn validate(output: &DialogueSection) -> Verdict {
        let spoken = output
            .lines
            .iter()
            .filter(|l| !l.line.trim().is_empty())
            .count();
        Verdict::count("lines", spoken, MIN_LINES)
    }

    fn template(ctx: &SharedContext, prior: &PriorSections) -> DialogueSection {
        let gap_words: Vec<String> = padded_words(ctx, prior, TEMPLATE_GAPS)
            .into_iter()
            .take(TEMPLATE_GAPS)
            .collect();

        let script = [
            ("Alex", format!("Hi Sam! Did you read the text about {}?", ctx.lesson_title)),
            ("Sam", format!("Yes, I did. It was mostly about {}.", theme(ctx, 0))),
            ("Alex", "I learned a new word: \"___\". Do you know it?".to_string()),
            ("Sam", format!("I do. I use it when I talk about {}.", theme(ctx, 0))),
            ("Alex", "What did you think of the text?".to_string()),
            ("Sam", "I liked it. The part about ___ was my favourite.".to_string()),
            ("Alex", format!("Me too. Do you ever talk about {} in class?", theme(ctx, 1))),
            ("Sam", "Not often, but I want to practise more.".to_string()),
            ("Alex", "Let's both try to use \"___\" today.".to_string()),
            ("Sam", "Good idea. Can you give me an example first?".to_string()),
            ("Alex", "Sure. I'll say a sentence and you can check it.".to_string()),
            ("Sam", "Great. Let's start!".to_string()),
        ];

        DialogueSection {
            lines: script
                .into_iter()
                .map(|(character, line)| DialogueLine {
                    character: character.to_string(),
                    line,
                })
                .collect(),
            answers: gap_words,
        }
    }

    fn finish(output: DialogueSection) -> SectionResult {
        let lines = output
            .lines
            .into_iter()
            .filter(|l| !l.line.trim().is_empty())
            .map(|l| DialogueLine {
                character: l.character.trim().to_string(),
                line: l.line.trim().to_string(),
            })
            .collect();

        let mut answers = clean_list(output.answers);
        shuffle_answer_key(&mut answers, &mut rand::rng());

        SectionResult::Dialogue(DialogueSection { lines, answers })
    }
}

/// Words from an `Answers: a, b, c` line, if the free text has one.
fn answer_line(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .find_map(|line| {
            let (label, rest) = line.split_once(':')?;
            label
                .trim_matches(|c: char| c == '*' || c.is_whitespace())
                .eq_ignore_ascii_case("answers")
                .then_some(rest)
        })
        .map(|rest| {
            rest.split([',', ';'])
                .map(|w| w.trim().trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')'))
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::test_support::coffee_context;

    #[test]
    fn template_has_gaps_for_every_answer() {
        let section = Dialogue::template(&coffee_context(), &PriorSections::new());
        let gaps = section.lines.iter().filter(|l| l.line.contains("___")).count();
        assert_eq!(gaps, section.answers.len());
        assert!(section.lines.len() >= MIN_LINES);
    }

    #[test]
    fn finish_never_leaves_answers_in_gap_order() {
        let section = DialogueSection {
            lines: vec![DialogueLine {
                character: "Ana".into(),
                line: "I ___ and ___ coffee.".into(),
            }],
            answers: vec!["brew".into(), " roast ".into(), "".into()],
        };
        for _ in 0..20 {
            match Dialogue::finish(section.clone()) {
                SectionResult::Dialogue(d) => assert_eq!(d.answers, vec!["roast", "brew"]),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn free_text_script_with_answers() {
        let raw = "Ana: Hi!\nBen: Hello.\nAnswers: 1. brew, 2. roast";
        let section = Dialogue::extract(raw, &coffee_context()).unwrap();
        assert_eq!(section.lines.len(), 2);
        assert_eq!(section.answers, vec!["brew", "roast"]);
    }
}

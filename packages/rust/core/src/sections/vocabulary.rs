use lessonforge_repair::extract;
use lessonforge_shared::{
    SectionKind, SectionResult, SharedContext, VocabularyItem, VocabularySection,
};

use super::{JSON_ONLY, PriorSections, SectionSpec, Verdict, prompt_header};
use crate::postprocess::clean_list;

const MIN_ITEMS: usize = 5;

/// Padding for template vocabulary when the context has too few keywords.
const GENERAL_WORDS: [(&str, &str); 5] = [
    ("topic", "the subject a text or conversation is about"),
    ("opinion", "what a person thinks or believes about something"),
    ("describe", "to say what something or someone is like"),
    ("compare", "to look at how two things are similar or different"),
    ("experience", "something that has happened to you"),
];

pub(crate) struct Vocabulary;

impl SectionSpec for Vocabulary {
    type Output = VocabularySection;

    const KIND: SectionKind = SectionKind::Vocabulary;
    const MAX_OUTPUT_TOKENS: u32 = 1200;
    const TEMPERATURE: f32 = 0.5;

    fn prompt(ctx: &SharedContext, _prior: &PriorSections) -> String {
        format!(
            "{header}\
             Choose 6-8 words or phrases worth teaching, starting from these candidates: {words}.\n\
             For each give a simple meaning for this level and one example sentence.\n\
             {JSON_ONLY}\n\
             {{\"items\": [{{\"word\": \"...\", \"meaning\": \"...\", \"examples\": [\"...\"]}}]}}",
            header = prompt_header(ctx, "vocabulary"),
            words = ctx.key_vocabulary.join(", "),
        )
    }

    fn extract(raw: &str, _ctx: &SharedContext) -> Option<VocabularySection> {
        Some(VocabularySection {
            items: extract::term_pairs(raw),
        })
    }

    fn validate(output: &VocabularySection) -> Verdict {
        let usable = output
            .items
            .iter()
            .filter(|item| !item.word.trim().is_empty())
            .count();
        Verdict::count("items", usable, MIN_ITEMS)
    }

    fn template(ctx: &SharedContext, _prior: &PriorSections) -> VocabularySection {
        let mut items: Vec<VocabularyItem> = ctx
            .key_vocabulary
            .iter()
            .take(8)
            .map(|word| VocabularyItem {
                word: word.clone(),
                meaning: format!("a key word in \"{}\"", ctx.lesson_title),
                examples: Vec::new(),
            })
            .collect();

        for (word, meaning) in GENERAL_WORDS {
            if items.len() >= MIN_ITEMS {
                break;
            }
            if items.iter().any(|i| i.word.eq_ignore_ascii_case(word)) {
                continue;
            }
            items.push(VocabularyItem {
                word: word.to_string(),
                meaning: meaning.to_string(),
                examples: Vec::new(),
            });
        }

        VocabularySection { items }
    }

    fn finish(output: VocabularySection) -> SectionResult {
        let items = output
            .items
            .into_iter()
            .filter(|item| !item.word.trim().is_empty())
            .map(|item| VocabularyItem {
                word: item.word.trim().to_string(),
                meaning: item.meaning.trim().to_string(),
                examples: clean_list(item.examples),
            })
            .collect();
        SectionResult::Vocabulary(VocabularySection { items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::test_support::coffee_context;

    #[test]
    fn template_pads_short_keyword_lists() {
        let mut ctx = coffee_context();
        ctx.key_vocabulary = vec!["brew".into(), "topic".into(), "roast".into()];
        let section = Vocabulary::template(&ctx, &PriorSections::new());

        let words: Vec<_> = section.items.iter().map(|i| i.word.as_str()).collect();
        assert_eq!(words, vec!["brew", "topic", "roast", "opinion", "describe"]);
    }

    #[test]
    fn free_text_pairs_are_extracted() {
        let raw = "brew - make a hot drink\nroast - cook beans\nbean - a seed";
        let section = Vocabulary::extract(raw, &coffee_context()).unwrap();
        assert_eq!(section.items.len(), 3);
        assert!(matches!(Vocabulary::validate(&section), Verdict::Partial(_)));
    }
}

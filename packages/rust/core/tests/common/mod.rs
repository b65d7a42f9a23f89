//! Fixtures shared by the end-to-end generation tests.

#![allow(dead_code)]

use std::sync::Mutex;

use lessonforge_core::ProgressReporter;
use lessonforge_shared::{ProgressUpdate, Result, SectionKind};

/// About 500 words on the history of coffee.
pub fn coffee_source() -> String {
    [
        "The Story of Coffee",
        "",
        "Coffee is one of the most popular drinks in the world, but its story began in a quiet \
         corner of Ethiopia. According to an old legend, a goat herder called Kaldi noticed that \
         his goats became full of energy after eating the red berries of a certain bush. He tried \
         the berries himself and felt awake and cheerful. Monks at a nearby monastery heard about \
         the berries and began to dry them, roast them and brew a hot drink that helped them stay \
         awake during long evening prayers.",
        "",
        "From Ethiopia, coffee travelled across the Red Sea to Yemen. By the fifteenth century, \
         farmers in Yemen were growing coffee on terraces in the mountains, and traders were \
         shipping the beans from the port of Mocha. Coffee houses opened in cities such as Mecca, \
         Cairo and Istanbul. People met there to drink coffee, listen to music, play chess and \
         discuss the news. Some rulers worried that these lively places encouraged people to \
         criticise the government, and a few even tried to close them.",
        "",
        "In the seventeenth century coffee reached Europe. At first some people were suspicious \
         of the dark, bitter drink, but it soon became fashionable. Coffee houses appeared in \
         Venice, London, Paris and Vienna. In London they were sometimes called penny \
         universities, because for the price of a cup of coffee anyone could sit and listen to \
         serious conversations about science, business and politics. Several famous businesses, \
         including an insurance market, started life in coffee houses.",
        "",
        "European powers wanted to grow coffee themselves, so they carried plants to their \
         colonies. Dutch traders planted coffee in Java, and French sailors took a young plant to \
         the Caribbean. Later, Brazil became the largest producer in the world, a position it \
         still holds today. Growing coffee is hard work: farmers must harvest the cherries by \
         hand, remove the beans, dry them in the sun and sort them carefully before they are \
         sold.",
        "",
        "Today millions of people start their day with a cup of coffee. Some prefer a strong \
         espresso, others a milky latte or a simple filter coffee. A skilled barista can explain \
         how the origin of the beans, the roast and the way you brew them all change the aroma \
         and taste. At the same time, many consumers now ask whether the farmers who grow their \
         coffee receive a fair price, and whether the harvest is produced in a way that protects \
         forests, rivers and wildlife for future generations.",
    ]
    .join("\n")
}

pub const ANALYSIS_REPLY: &str = r#"{"title": "The Story of Coffee", "key_vocabulary": ["brew", "roast", "bean", "harvest", "aroma", "barista", "terrace", "legend"], "main_themes": ["the history of coffee", "coffee culture today"]}"#;

pub const SUMMARY_REPLY: &str = "Coffee was first used in Ethiopia and spread through Yemen to \
    the Middle East. Coffee houses became important meeting places in Europe. Today coffee is \
    grown around the world and people think about fair prices for farmers.";

/// Prompt phrase that identifies each section's request.
pub fn section_marker(kind: SectionKind) -> &'static str {
    match kind {
        SectionKind::Warmup => "Write the warm-up section",
        SectionKind::Vocabulary => "Write the vocabulary section",
        SectionKind::Reading => "Write the reading section",
        SectionKind::Comprehension => "Write the reading comprehension section",
        SectionKind::Discussion => "Write the discussion section",
        SectionKind::Dialogue => "Write the dialogue section",
        SectionKind::Grammar => "Write the grammar section",
        SectionKind::Pronunciation => "Write the pronunciation section",
        SectionKind::WrapUp => "Write the wrap-up section",
    }
}

pub const ANALYSIS_MARKER: &str = "Analyse the source text";
pub const SUMMARY_MARKER: &str = "Summarise the source text";

/// A well-formed reply that meets every minimum for `kind`.
pub fn section_reply(kind: SectionKind) -> String {
    let reply = match kind {
        SectionKind::Warmup => serde_json::json!({
            "questions": [
                "How many cups of coffee do you drink a day?",
                "Where do you think coffee was first grown?",
                "Do you prefer coffee or tea? Why?"
            ]
        }),
        SectionKind::Vocabulary => serde_json::json!({
            "items": [
                {"word": "brew", "meaning": "to make a hot drink with water", "examples": ["I brew coffee every morning."]},
                {"word": "roast", "meaning": "to cook beans with dry heat", "examples": ["They roast the beans slowly."]},
                {"word": "harvest", "meaning": "to collect a crop", "examples": ["Farmers harvest coffee by hand."]},
                {"word": "aroma", "meaning": "a pleasant smell", "examples": ["I love the aroma of fresh coffee."]},
                {"word": "espresso", "meaning": "a small, strong coffee", "examples": ["She ordered an espresso."]},
                {"word": "legend", "meaning": "an old story that may not be true", "examples": ["The legend of Kaldi is famous."]}
            ]
        }),
        SectionKind::Reading => serde_json::json!({
            "title": "The Story of Coffee",
            "passage": "A long time ago in Ethiopia, a goat herder called Kaldi saw his goats \
                        dancing after they ate red berries. According to the legend, monks \
                        learned to roast the berries and brew a hot drink that kept them awake. \
                        Coffee then travelled to Yemen, where farmers grew it on mountain \
                        terraces, and traders sent the beans around the world. Coffee houses \
                        opened in Cairo, Istanbul and later in London, where people met to talk \
                        about business and politics. Today farmers in Brazil and many other \
                        countries harvest coffee by hand. A good barista knows that the roast \
                        and the way you brew the beans change the aroma. Many people now ask if \
                        farmers get a fair price for their hard work, and they choose an \
                        espresso or a latte from companies that protect forests and rivers."
        }),
        SectionKind::Comprehension => serde_json::json!({
            "questions": [
                {"question": "Who was Kaldi?", "answer": "A goat herder in Ethiopia."},
                {"question": "Why did the monks drink coffee?", "answer": "To stay awake."},
                {"question": "Where did farmers grow coffee on terraces?", "answer": "In Yemen."},
                {"question": "What did people do in coffee houses?", "answer": "They met and talked about business and politics."},
                {"question": "Which country is the largest producer today?", "answer": "Brazil."}
            ]
        }),
        SectionKind::Discussion => serde_json::json!({
            "questions": [
                "Why do you think coffee houses became so popular?",
                "Should governments ever close public meeting places?",
                "Would you pay more for fair-trade coffee?",
                "How has coffee culture changed in your city?",
                "Is coffee a healthy habit? Why or why not?"
            ]
        }),
        SectionKind::Dialogue => {
            let lines: Vec<serde_json::Value> = (0..12)
                .map(|i| {
                    let character = if i % 2 == 0 { "Maya" } else { "Tom" };
                    let line = match i {
                        3 => "I always ___ my coffee at home.",
                        7 => "The ___ from this café is wonderful.",
                        _ => "That sounds great.",
                    };
                    serde_json::json!({"character": character, "line": line})
                })
                .collect();
            serde_json::json!({"lines": lines, "answers": ["brew", "aroma"]})
        }
        SectionKind::Grammar => serde_json::json!({
            "focus": "Past simple",
            "explanation": "We use the past simple for finished actions.",
            "examples": ["Kaldi saw his goats.", "Monks roasted the berries.", "Coffee reached Europe."],
            "exercises": [
                {"prompt": "Coffee ___ (travel) to Yemen.", "answer": "travelled"},
                {"prompt": "Traders ___ (ship) the beans.", "answer": "shipped"},
                {"prompt": "People ___ (meet) in coffee houses.", "answer": "met"}
            ]
        }),
        SectionKind::Pronunciation => serde_json::json!({
            "words": [
                {"word": "aroma", "phonetic": "əˈrəʊmə", "tip": "Stress the second syllable."},
                {"word": "barista", "phonetic": "bəˈriːstə", "tip": "Long 'ee' in the middle."},
                {"word": "harvest", "phonetic": "ˈhɑːvɪst", "tip": "Stress the first syllable."}
            ],
            "tongue_twisters": ["Bright baristas brew bold beans."]
        }),
        SectionKind::WrapUp => serde_json::json!({
            "summary": "We read about how coffee spread from Ethiopia to the world and learned words like brew, roast and harvest.",
            "reflection_questions": ["Which new word will you use this week?"]
        }),
    };
    reply.to_string()
}

/// Records every progress update it receives.
#[derive(Default)]
pub struct RecordingProgress(Mutex<Vec<ProgressUpdate>>);

impl RecordingProgress {
    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.0.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn on_progress(&self, update: &ProgressUpdate) -> Result<()> {
        self.0.lock().unwrap().push(update.clone());
        Ok(())
    }
}

/// Progress values never go down and end at 100.
pub fn assert_progress_complete(updates: &[ProgressUpdate]) {
    assert!(!updates.is_empty(), "no progress reported");
    for pair in updates.windows(2) {
        assert!(
            pair[0].progress <= pair[1].progress,
            "progress went backwards: {pair:?}"
        );
        assert_eq!(pair[0].step + 1, pair[1].step);
    }
    assert_eq!(updates.last().map(|u| u.progress), Some(100));
}

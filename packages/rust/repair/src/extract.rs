//! Pattern extraction from free-text model output.
//!
//! Used when output is not JSON at all but still carries the content in a
//! recognisable layout. Each extractor returns an empty result rather than
//! failing; the caller decides whether what came back is enough.

use std::sync::LazyLock;

use regex::Regex;

use lessonforge_shared::{DialogueLine, VocabularyItem};

/// `Name: line` with a short capitalised speaker label.
static DIALOGUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*]\s*)?\**([A-Z][\w .'-]{0,30}?)\**\s*:\s*(.+?)\s*$").expect("valid regex")
});

/// `1. item`, `2) item`, `- item`, `* item`, `• item`.
static LIST_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d{1,3}[.)]|[-*•])\s+(.+?)\s*$").expect("valid regex")
});

/// `word - meaning`, `word: meaning`, `word – meaning`.
static TERM_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\**([\p{L}][\p{L}' -]{0,40}?)\**\s*(?:-|–|—|:)\s+(.+?)\s*$").expect("valid regex")
});

/// Labels that look like speakers but are headings or notes.
const NON_SPEAKERS: &[&str] = &[
    "answer", "answers", "note", "notes", "dialogue", "title", "setting", "scene", "example",
    "examples", "question", "questions", "task", "instructions", "vocabulary",
];

/// Pull `Speaker: line` pairs out of a script.
pub fn dialogue_lines(text: &str) -> Vec<DialogueLine> {
    text.lines()
        .filter_map(|line| {
            let caps = DIALOGUE_RE.captures(line)?;
            let character = caps.get(1)?.as_str().trim();
            let spoken = caps.get(2)?.as_str().trim();
            if NON_SPEAKERS.contains(&character.to_lowercase().as_str()) || spoken.is_empty() {
                return None;
            }
            Some(DialogueLine {
                character: character.to_string(),
                line: spoken.to_string(),
            })
        })
        .collect()
}

/// Pull numbered or bulleted list items. Falls back to lines ending in `?`
/// when the text has no list markers.
pub fn list_items(text: &str) -> Vec<String> {
    let items: Vec<String> = text
        .lines()
        .filter_map(|line| LIST_ITEM_RE.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| strip_emphasis(m.as_str())))
        .filter(|item| !item.is_empty())
        .collect();

    if !items.is_empty() {
        return items;
    }

    text.lines()
        .map(str::trim)
        .filter(|line| line.ends_with('?') && line.len() > 1)
        .map(strip_emphasis)
        .collect()
}

/// Pull `word - meaning` pairs, one per line, with list markers tolerated.
pub fn term_pairs(text: &str) -> Vec<VocabularyItem> {
    text.lines()
        .filter_map(|line| {
            let line = LIST_ITEM_RE
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map_or(line.trim(), |m| m.as_str());
            let caps = TERM_PAIR_RE.captures(line)?;
            let word = caps.get(1)?.as_str().trim();
            let meaning = caps.get(2)?.as_str().trim();
            if word.is_empty() || meaning.is_empty() {
                return None;
            }
            Some(VocabularyItem {
                word: word.to_string(),
                meaning: strip_emphasis(meaning),
                examples: Vec::new(),
            })
        })
        .collect()
}

/// Treat the text as a prose passage: drop code fences, headings and JSON
/// debris, join paragraphs.
pub fn plain_passage(text: &str) -> String {
    let paragraphs: Vec<String> = text
        .split("\n\n")
        .map(|para| {
            para.lines()
                .map(str::trim)
                .filter(|line| {
                    !line.is_empty()
                        && !line.starts_with("```")
                        && !line.starts_with('#')
                        && !line.starts_with(['{', '}', '[', ']'])
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|para| !para.is_empty())
        .collect();
    paragraphs.join("\n\n")
}

fn strip_emphasis(text: &str) -> String {
    text.trim().trim_matches(|c| c == '*' || c == '_').trim().to_string()
}

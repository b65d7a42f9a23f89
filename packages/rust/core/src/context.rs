//! Shared context: one analysis of the source text reused by every section.
//!
//! Two small remote calls (analysis as JSON, summary as plain text) run
//! concurrently. Anything they fail to deliver is filled in by a keyword
//! heuristic. The run fails only when even the heuristic finds nothing to
//! teach from.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use lessonforge_ai::{CallPolicy, GenerationOptions, TextGenerator, call_with_policy};
use lessonforge_repair::{extract, parse_lenient};
use lessonforge_shared::{
    ContextOrigin, LessonError, LessonParams, Result, SharedContext, UsageStats,
};

/// Longest slice of the source that goes into prompts, in characters.
pub const MAX_SOURCE_CHARS: usize = 12_000;

/// Fewest distinct keywords a usable context needs.
const MIN_KEYWORDS: usize = 3;
const MAX_KEYWORDS: usize = 10;
const MAX_THEMES: usize = 4;
const SUMMARY_WORDS: usize = 60;
const SUMMARY_SENTENCES: usize = 3;

const ANALYSIS_OPTIONS: GenerationOptions = GenerationOptions {
    max_output_tokens: 700,
    temperature: 0.3,
};

const SUMMARY_OPTIONS: GenerationOptions = GenerationOptions {
    max_output_tokens: 400,
    temperature: 0.3,
};

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "have", "him", "his", "how", "its", "may", "new", "now", "old",
    "see", "two", "way", "who", "did", "get", "let", "say", "she", "too", "use", "that", "with",
    "this", "from", "they", "will", "would", "there", "their", "what", "about", "which", "when",
    "make", "like", "time", "just", "know", "take", "into", "year", "your", "some", "could",
    "them", "than", "then", "look", "only", "come", "over", "also", "back", "after", "work",
    "first", "well", "even", "want", "because", "these", "give", "most", "very", "been", "were",
    "said", "each", "where", "while", "more", "many", "such", "here", "other", "those", "being",
    "does", "should", "through", "much", "before", "between", "both", "under", "again", "still",
    "every", "own", "same", "why", "yes", "yet", "off", "ever", "never", "always", "often",
    "really", "thing", "things", "people", "during", "without", "within", "upon", "might",
    "must", "shall", "whose", "whom", "onto", "itself", "it's", "i'm", "don't", "doesn't",
];

/// A built context and what building it cost.
#[derive(Debug, Clone)]
pub struct BuiltContext {
    pub context: SharedContext,
    pub usage: UsageStats,
}

/// Collapse all whitespace runs to single spaces.
pub fn normalize_source(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 of the normalized source, hex encoded.
pub fn source_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_source(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Truncate to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Build the shared context for a run.
///
/// Fails with [`LessonError::ContextBuild`] only when the source is empty or
/// yields fewer than three usable keywords from both the remote analysis and
/// the heuristic.
#[instrument(skip_all, fields(lesson_type = %params.lesson_type, level = %params.student_level, chars = params.source_text.len()))]
pub async fn build_context(
    generator: &dyn TextGenerator,
    policy: &CallPolicy,
    params: &LessonParams,
) -> Result<BuiltContext> {
    let normalized = normalize_source(&params.source_text);
    if normalized.is_empty() {
        return Err(LessonError::context_build("source text is empty"));
    }

    let excerpt = truncate_chars(&normalized, MAX_SOURCE_CHARS).to_string();
    let heuristic = Heuristic::extract(&params.source_text, &normalized, params.source_title.as_deref());
    let mut usage = UsageStats::default();

    let analysis_prompt = analysis_prompt(params, &excerpt);
    let summary_prompt = summary_prompt(params, &excerpt);
    let (analysis, summary) = tokio::join!(
        call_with_policy(generator, &analysis_prompt, &ANALYSIS_OPTIONS, policy),
        call_with_policy(generator, &summary_prompt, &SUMMARY_OPTIONS, policy),
    );

    let analysis = match analysis {
        Ok(completion) => {
            usage.record_call(completion.tokens_in, completion.tokens_out, &completion.model);
            match parse_lenient::<AnalysisReply>(&completion.text) {
                Ok(parsed) => {
                    debug!(fixes = ?parsed.fixes, "analysis parsed");
                    Some(parsed.value)
                }
                Err(failure) => {
                    warn!(failure = %failure.kind(), "analysis output unusable, using heuristic");
                    None
                }
            }
        }
        Err(e) => {
            usage.record_failure();
            warn!(error = %e, "analysis call failed, using heuristic");
            None
        }
    }
    .unwrap_or_default();

    let summary = match summary {
        Ok(completion) => {
            usage.record_call(completion.tokens_in, completion.tokens_out, &completion.model);
            Some(extract::plain_passage(&completion.text)).filter(|s| !s.is_empty())
        }
        Err(e) => {
            usage.record_failure();
            warn!(error = %e, "summary call failed, using heuristic");
            None
        }
    };

    let mut from_heuristic = 0;
    let lesson_title = fill(
        non_empty(analysis.title),
        heuristic.title,
        &mut from_heuristic,
    );
    let key_vocabulary = fill(
        Some(dedup_terms(analysis.key_vocabulary)).filter(|v| v.len() >= MIN_KEYWORDS),
        heuristic.keywords,
        &mut from_heuristic,
    );
    let main_themes = fill(
        Some(dedup_terms(analysis.main_themes)).filter(|t| !t.is_empty()),
        heuristic.themes,
        &mut from_heuristic,
    );
    let source_summary = fill(summary, heuristic.summary, &mut from_heuristic);

    if key_vocabulary.len() < MIN_KEYWORDS {
        return Err(LessonError::context_build(format!(
            "found only {} usable keyword(s) in the source, need at least {MIN_KEYWORDS}",
            key_vocabulary.len()
        )));
    }

    let origin = match from_heuristic {
        0 => ContextOrigin::Ai,
        4 => ContextOrigin::Heuristic,
        _ => ContextOrigin::Mixed,
    };

    let main_themes: Vec<String> = if main_themes.is_empty() {
        key_vocabulary.iter().take(3).cloned().collect()
    } else {
        main_themes.into_iter().take(MAX_THEMES).collect()
    };

    info!(
        title = %lesson_title,
        keywords = key_vocabulary.len(),
        themes = main_themes.len(),
        ?origin,
        "shared context ready"
    );

    Ok(BuiltContext {
        context: SharedContext {
            lesson_title,
            key_vocabulary,
            main_themes,
            difficulty_level: params.student_level,
            source_summary,
            target_language: params.target_language.clone(),
            lesson_type: params.lesson_type.clone(),
            source_excerpt: excerpt,
            origin,
        },
        usage,
    })
}

// ---------------------------------------------------------------------------
// Remote analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct AnalysisReply {
    #[serde(default, alias = "lesson_title")]
    title: String,
    #[serde(default, alias = "vocabulary", alias = "keywords")]
    key_vocabulary: Vec<String>,
    #[serde(default, alias = "themes")]
    main_themes: Vec<String>,
}

fn analysis_prompt(params: &LessonParams, excerpt: &str) -> String {
    format!(
        "Analyse the source text for a {language} lesson.\n\
         Students: {level} ({descriptor}). Lesson type: {lesson_type}.\n\
         Reply with JSON only, no commentary, in exactly this shape:\n\
         {{\"title\": \"short lesson title\", \"key_vocabulary\": [\"8-12 words or phrases from the text worth teaching\"], \"main_themes\": [\"2-4 themes\"]}}\n\n\
         Source text:\n\"\"\"\n{excerpt}\n\"\"\"",
        language = params.target_language,
        level = params.student_level,
        descriptor = params.student_level.descriptor(),
        lesson_type = params.lesson_type,
    )
}

fn summary_prompt(params: &LessonParams, excerpt: &str) -> String {
    format!(
        "Summarise the source text in 3-4 plain {language} sentences for a teacher.\n\
         Plain text only: no headings, no lists, no JSON.\n\n\
         Source text:\n\"\"\"\n{excerpt}\n\"\"\"",
        language = params.target_language,
    )
}

/// Take the remote value when present, else the heuristic one (counted).
fn fill<T>(ai: Option<T>, fallback: T, from_heuristic: &mut usize) -> T {
    ai.unwrap_or_else(|| {
        *from_heuristic += 1;
        fallback
    })
}

fn non_empty(s: String) -> Option<String> {
    let s = s.trim().to_string();
    (!s.is_empty()).then_some(s)
}

/// Trim, drop blanks and case-insensitive duplicates, keep order.
fn dedup_terms(terms: Vec<String>) -> Vec<String> {
    let mut seen = Vec::<String>::new();
    let mut out = Vec::new();
    for term in terms {
        let term = term.trim().to_string();
        let key = term.to_lowercase();
        if term.is_empty() || seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(term);
    }
    out
}

// ---------------------------------------------------------------------------
// Heuristic extraction
// ---------------------------------------------------------------------------

/// Context pieces derived from the text alone.
#[derive(Debug, Clone)]
struct Heuristic {
    title: String,
    keywords: Vec<String>,
    themes: Vec<String>,
    summary: String,
}

impl Heuristic {
    fn extract(raw: &str, normalized: &str, source_title: Option<&str>) -> Self {
        let keywords = keywords(normalized);
        let themes = keywords.iter().take(3).cloned().collect();
        let title = source_title
            .and_then(|t| non_empty(t.to_string()))
            .or_else(|| title_line(raw))
            .unwrap_or_else(|| keyword_title(&keywords));

        Self {
            title,
            themes,
            summary: leading_summary(normalized),
            keywords,
        }
    }
}

/// Most frequent non-stop-words, ties broken by first appearance.
fn keywords(text: &str) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let tokens = text
        .split(|c: char| !(c.is_alphabetic() || c == '\'' || c == '-'))
        .map(|t| t.trim_matches(|c| c == '\'' || c == '-').to_lowercase())
        .filter(|t| t.chars().count() >= 3 && !STOP_WORDS.contains(&t.as_str()));

    for (position, token) in tokens.enumerate() {
        counts.entry(token).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));
    ranked
        .into_iter()
        .take(MAX_KEYWORDS)
        .map(|(word, _)| word)
        .collect()
}

/// A short first line that reads like a heading.
fn title_line(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.trim_start_matches('#').trim();
    let words = line.split_whitespace().count();
    let looks_like_heading = (1..=12).contains(&words)
        && line.chars().count() <= 80
        && !line.ends_with(['.', ',', ';', ':']);
    looks_like_heading.then(|| line.to_string())
}

fn keyword_title(keywords: &[String]) -> String {
    match keywords {
        [] => "Untitled lesson".to_string(),
        [only] => capitalize(only),
        [first, second, ..] => format!("{} and {}", capitalize(first), second),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Leading sentences, capped by sentence and word count.
fn leading_summary(text: &str) -> String {
    static SENTENCE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^.!?]+(?:[.!?]+|$)").expect("valid regex"));

    let mut taken: Vec<&str> = Vec::new();
    let mut words = 0;
    for sentence in SENTENCE_RE.find_iter(text).map(|m| m.as_str().trim()) {
        if sentence.is_empty() {
            continue;
        }
        let count = sentence.split_whitespace().count();
        if !taken.is_empty() && (words + count > SUMMARY_WORDS || taken.len() == SUMMARY_SENTENCES)
        {
            break;
        }
        taken.push(sentence);
        words += count;
    }

    let summary = taken.join(" ");
    if words > SUMMARY_WORDS {
        let cut: Vec<&str> = summary.split_whitespace().take(SUMMARY_WORDS).collect();
        format!("{}...", cut.join(" "))
    } else {
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use lessonforge_ai::{Completion, FinishReason};
    use lessonforge_shared::{LessonType, StudentLevel};

    const COFFEE: &str = "The History of Coffee\n\n\
        Coffee began in Ethiopia, where goats ate coffee cherries. \
        Traders carried coffee beans to Yemen, and coffee houses spread across Arabia. \
        In Europe, coffee houses became places for news and debate. \
        Today coffee farmers grow beans in Brazil, Vietnam and Colombia.";

    fn params(text: &str) -> LessonParams {
        LessonParams {
            source_text: text.to_string(),
            source_title: None,
            lesson_type: LessonType::Discussion,
            student_level: StudentLevel::B1,
            target_language: "English".into(),
        }
    }

    /// Answers analysis and summary prompts with fixed text, or fails.
    struct Canned {
        analysis: Option<&'static str>,
        summary: Option<&'static str>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TextGenerator for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = if prompt.starts_with("Analyse") {
                self.analysis
            } else {
                self.summary
            };
            let text = reply.ok_or_else(|| LessonError::UpstreamStatus {
                status: 400,
                body: "rejected".into(),
            })?;
            Ok(Completion {
                text: text.to_string(),
                finish_reason: FinishReason::Stop,
                tokens_in: 10,
                tokens_out: 20,
                model: "canned-model".into(),
            })
        }
    }

    fn canned(analysis: Option<&'static str>, summary: Option<&'static str>) -> Canned {
        Canned {
            analysis,
            summary,
            calls: AtomicU32::new(0),
        }
    }

    #[tokio::test]
    async fn ai_context_is_used_when_complete() {
        let generator = canned(
            Some(r#"{"title": "Coffee Through the Ages", "key_vocabulary": ["bean", "trader", "roast", "Bean"], "main_themes": ["trade", "culture"]}"#),
            Some("Coffee travelled from Ethiopia to the world."),
        );
        let built = build_context(&generator, &CallPolicy::default(), &params(COFFEE))
            .await
            .expect("context");

        let ctx = built.context;
        assert_eq!(ctx.origin, ContextOrigin::Ai);
        assert_eq!(ctx.lesson_title, "Coffee Through the Ages");
        assert_eq!(ctx.key_vocabulary, vec!["bean", "trader", "roast"]);
        assert_eq!(ctx.source_summary, "Coffee travelled from Ethiopia to the world.");
        assert_eq!(built.usage.calls, 2);
        assert_eq!(built.usage.tokens_out, 40);
    }

    #[tokio::test]
    async fn failed_calls_fall_back_to_heuristic() {
        let generator = canned(None, None);
        let built = build_context(&generator, &CallPolicy::default(), &params(COFFEE))
            .await
            .expect("heuristic context");

        let ctx = built.context;
        assert_eq!(ctx.origin, ContextOrigin::Heuristic);
        assert_eq!(ctx.lesson_title, "The History of Coffee");
        assert_eq!(ctx.key_vocabulary[0], "coffee");
        assert!(ctx.key_vocabulary.len() >= MIN_KEYWORDS);
        assert!(ctx.source_summary.starts_with("The History of Coffee Coffee began"));
        assert_eq!(built.usage.failed_calls, 2);
    }

    #[tokio::test]
    async fn truncated_analysis_is_repaired_and_mixed() {
        let generator = canned(
            Some(r#"{"title": "Coffee", "key_vocabulary": ["bean", "trader", "roast", "gro"#),
            None,
        );
        let ctx = build_context(&generator, &CallPolicy::default(), &params(COFFEE))
            .await
            .expect("context")
            .context;

        assert_eq!(ctx.origin, ContextOrigin::Mixed);
        assert_eq!(ctx.lesson_title, "Coffee");
        assert_eq!(ctx.key_vocabulary, vec!["bean", "trader", "roast"]);
    }

    #[tokio::test]
    async fn empty_source_fails_without_calls() {
        let generator = canned(Some("{}"), Some("x"));
        let err = build_context(&generator, &CallPolicy::default(), &params("   \n\t "))
            .await
            .unwrap_err();
        assert!(matches!(err, LessonError::ContextBuild { .. }));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn too_few_keywords_is_fatal() {
        let generator = canned(None, None);
        let err = build_context(&generator, &CallPolicy::default(), &params("Hi! Yes, the and a."))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "context_build_failure");
    }

    #[test]
    fn keywords_skip_stop_words_and_rank_by_frequency() {
        let words = keywords("the tea and the coffee; coffee, tea, coffee. Brewing!");
        assert_eq!(words, vec!["coffee", "tea", "brewing"]);
    }

    #[test]
    fn summary_is_capped() {
        let long = "word ".repeat(200) + ".";
        let summary = leading_summary(&long);
        assert!(summary.ends_with("..."));
        assert_eq!(summary.trim_end_matches("...").split_whitespace().count(), SUMMARY_WORDS);

        let short = leading_summary("One. Two. Three. Four. Five.");
        assert_eq!(short, "One. Two. Three.");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("cafébar", 4), "café");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn hash_ignores_whitespace_layout() {
        assert_eq!(source_hash("a  b\nc"), source_hash("a b c"));
        assert_ne!(source_hash("a b c"), source_hash("a b d"));
    }
}

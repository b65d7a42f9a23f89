//! Section generators.
//!
//! Every section goes through the same state machine:
//!
//! ```text
//! Attempt ──► Validate ──► Accept
//!    │           ▲   └───► TemplateFallback
//!    └─► Repair ─┘──────►  TemplateFallback
//! ```
//!
//! `Attempt` makes one bounded remote call and tries a strict parse.
//! `Repair` runs the JSON repair table, then section-specific pattern
//! extraction. `Validate` checks the section minimums: a full or partial pass
//! is accepted (partial is recorded as degraded), nothing usable falls back to
//! the deterministic template. A section never returns an error.

mod comprehension;
mod dialogue;
mod discussion;
mod grammar;
mod pronunciation;
mod reading;
mod vocabulary;
mod warmup;
mod wrap_up;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use lessonforge_ai::{CallPolicy, FinishReason, GenerationOptions, TextGenerator, call_with_policy};
use lessonforge_repair::{ParseFailure, Parsed, parse_lenient};
use lessonforge_shared::{
    DegradedSection, FailureKind, LessonError, SectionKind, SectionResult, SharedContext,
    UsageStats,
};

use comprehension::Comprehension;
use dialogue::Dialogue;
use discussion::Discussion;
use grammar::Grammar;
use pronunciation::Pronunciation;
use reading::Reading;
use vocabulary::Vocabulary;
use warmup::Warmup;
use wrap_up::WrapUp;

/// Sections completed earlier in the run, readable by later ones.
pub type PriorSections = BTreeMap<SectionKind, SectionResult>;

/// Result of generating one section. Always carries a usable payload.
#[derive(Debug, Clone)]
pub struct SectionOutcome {
    pub result: SectionResult,
    /// Set when the payload is below target or is the template.
    pub degraded: Option<DegradedSection>,
    pub usage: UsageStats,
}

/// How a candidate payload measures against the section minimums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Full,
    /// Usable but below target; the detail says what is missing.
    Partial(String),
    Empty,
}

impl Verdict {
    /// Grade a single count against its minimum.
    fn count(what: &str, have: usize, min: usize) -> Self {
        match have {
            0 => Self::Empty,
            n if n < min => Self::Partial(format!("{n} {what}, expected at least {min}")),
            _ => Self::Full,
        }
    }
}

/// One section's prompt, parsing, minimums and template.
pub(crate) trait SectionSpec {
    /// Deserialized model reply.
    type Output: DeserializeOwned + Send;

    const KIND: SectionKind;
    const MAX_OUTPUT_TOKENS: u32;
    const TEMPERATURE: f32 = 0.7;

    fn prompt(ctx: &SharedContext, prior: &PriorSections) -> String;

    /// Repair-stage parse. Defaults to the lenient JSON parse.
    fn parse(raw: &str) -> Result<Parsed<Self::Output>, ParseFailure> {
        parse_lenient(raw)
    }

    /// Free-text fallback when the reply is not JSON at all.
    fn extract(_raw: &str, _ctx: &SharedContext) -> Option<Self::Output> {
        None
    }

    fn validate(output: &Self::Output) -> Verdict;

    /// Deterministic payload that meets the minimums.
    fn template(ctx: &SharedContext, prior: &PriorSections) -> Self::Output;

    /// Clean up and wrap the accepted payload.
    fn finish(output: Self::Output) -> SectionResult;

    fn options() -> GenerationOptions {
        GenerationOptions::new(Self::MAX_OUTPUT_TOKENS, Self::TEMPERATURE)
    }
}

/// Output ceiling for `kind`.
pub fn max_output_tokens(kind: SectionKind) -> u32 {
    match kind {
        SectionKind::Warmup => Warmup::MAX_OUTPUT_TOKENS,
        SectionKind::Vocabulary => Vocabulary::MAX_OUTPUT_TOKENS,
        SectionKind::Reading => Reading::MAX_OUTPUT_TOKENS,
        SectionKind::Comprehension => Comprehension::MAX_OUTPUT_TOKENS,
        SectionKind::Discussion => Discussion::MAX_OUTPUT_TOKENS,
        SectionKind::Dialogue => Dialogue::MAX_OUTPUT_TOKENS,
        SectionKind::Grammar => Grammar::MAX_OUTPUT_TOKENS,
        SectionKind::Pronunciation => Pronunciation::MAX_OUTPUT_TOKENS,
        SectionKind::WrapUp => WrapUp::MAX_OUTPUT_TOKENS,
    }
}

/// Generate `kind` from the shared context and earlier sections.
#[instrument(skip_all, fields(section = %kind, endpoint = generator.name()))]
pub async fn generate_section(
    kind: SectionKind,
    generator: &dyn TextGenerator,
    policy: &CallPolicy,
    ctx: &SharedContext,
    prior: &PriorSections,
) -> SectionOutcome {
    match kind {
        SectionKind::Warmup => drive::<Warmup>(generator, policy, ctx, prior).await,
        SectionKind::Vocabulary => drive::<Vocabulary>(generator, policy, ctx, prior).await,
        SectionKind::Reading => drive::<Reading>(generator, policy, ctx, prior).await,
        SectionKind::Comprehension => drive::<Comprehension>(generator, policy, ctx, prior).await,
        SectionKind::Discussion => drive::<Discussion>(generator, policy, ctx, prior).await,
        SectionKind::Dialogue => drive::<Dialogue>(generator, policy, ctx, prior).await,
        SectionKind::Grammar => drive::<Grammar>(generator, policy, ctx, prior).await,
        SectionKind::Pronunciation => drive::<Pronunciation>(generator, policy, ctx, prior).await,
        SectionKind::WrapUp => drive::<WrapUp>(generator, policy, ctx, prior).await,
    }
}

/// The template for `kind`, recorded as degraded with `failure`.
pub fn template_outcome(
    kind: SectionKind,
    ctx: &SharedContext,
    prior: &PriorSections,
    failure: FailureKind,
    detail: impl Into<String>,
) -> SectionOutcome {
    let result = match kind {
        SectionKind::Warmup => template::<Warmup>(ctx, prior),
        SectionKind::Vocabulary => template::<Vocabulary>(ctx, prior),
        SectionKind::Reading => template::<Reading>(ctx, prior),
        SectionKind::Comprehension => template::<Comprehension>(ctx, prior),
        SectionKind::Discussion => template::<Discussion>(ctx, prior),
        SectionKind::Dialogue => template::<Dialogue>(ctx, prior),
        SectionKind::Grammar => template::<Grammar>(ctx, prior),
        SectionKind::Pronunciation => template::<Pronunciation>(ctx, prior),
        SectionKind::WrapUp => template::<WrapUp>(ctx, prior),
    };
    SectionOutcome {
        result,
        degraded: Some(DegradedSection {
            section: kind,
            failure,
            fallback: true,
            detail: detail.into(),
        }),
        usage: UsageStats::default(),
    }
}

fn template<S: SectionSpec>(ctx: &SharedContext, prior: &PriorSections) -> SectionResult {
    S::finish(S::template(ctx, prior))
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

enum Stage<T> {
    Attempt,
    Repair {
        raw: String,
        hit_token_limit: bool,
    },
    Validate {
        output: T,
        recovered: Option<FailureKind>,
    },
    Accept {
        output: T,
        degraded: Option<(FailureKind, String)>,
    },
    TemplateFallback {
        failure: FailureKind,
        detail: String,
    },
}

async fn drive<S: SectionSpec>(
    generator: &dyn TextGenerator,
    policy: &CallPolicy,
    ctx: &SharedContext,
    prior: &PriorSections,
) -> SectionOutcome {
    let mut usage = UsageStats::default();
    let mut stage: Stage<S::Output> = Stage::Attempt;

    loop {
        stage = match stage {
            Stage::Attempt => {
                let prompt = S::prompt(ctx, prior);
                debug!(prompt_chars = prompt.len(), max_tokens = S::MAX_OUTPUT_TOKENS, "requesting section");
                match call_with_policy(generator, &prompt, &S::options(), policy).await {
                    Ok(completion) => {
                        usage.record_call(
                            completion.tokens_in,
                            completion.tokens_out,
                            &completion.model,
                        );
                        match serde_json::from_str::<S::Output>(completion.text.trim()) {
                            Ok(output) => Stage::Validate {
                                output,
                                recovered: None,
                            },
                            Err(_) => Stage::Repair {
                                hit_token_limit: completion.finish_reason == FinishReason::Length,
                                raw: completion.text,
                            },
                        }
                    }
                    Err(e) => {
                        usage.record_failure();
                        Stage::TemplateFallback {
                            failure: upstream_failure(&e),
                            detail: e.to_string(),
                        }
                    }
                }
            }

            Stage::Repair {
                raw,
                hit_token_limit,
            } => {
                let repaired = match S::parse(&raw) {
                    Ok(parsed) if S::validate(&parsed.value) != Verdict::Empty => {
                        debug!(fixes = ?parsed.fixes, "section output repaired");
                        let truncated = hit_token_limit || parsed.was_truncated();
                        Ok(Stage::Validate {
                            output: parsed.value,
                            recovered: truncated.then_some(FailureKind::TruncatedOutput),
                        })
                    }
                    Ok(parsed) if hit_token_limit || parsed.was_truncated() => {
                        Err(FailureKind::TruncatedOutput)
                    }
                    Ok(_) => Err(FailureKind::EmptyOutput),
                    Err(ParseFailure::Malformed) if hit_token_limit => {
                        Err(FailureKind::TruncatedOutput)
                    }
                    Err(failure) => Err(failure.kind()),
                };

                match repaired {
                    Ok(next) => next,
                    Err(failure) => match S::extract(&raw, ctx)
                        .filter(|o| S::validate(o) != Verdict::Empty)
                    {
                        Some(output) => {
                            debug!(%failure, "section content extracted from free text");
                            Stage::Validate {
                                output,
                                recovered: Some(failure),
                            }
                        }
                        None => Stage::TemplateFallback {
                            failure,
                            detail: "no usable content after repair and extraction".into(),
                        },
                    },
                }
            }

            Stage::Validate { output, recovered } => match S::validate(&output) {
                Verdict::Full => Stage::Accept {
                    output,
                    degraded: recovered.map(|kind| (kind, "recovered from damaged output".into())),
                },
                Verdict::Partial(detail) => Stage::Accept {
                    output,
                    degraded: Some((recovered.unwrap_or(FailureKind::BelowMinimum), detail)),
                },
                Verdict::Empty => Stage::TemplateFallback {
                    failure: recovered.unwrap_or(FailureKind::EmptyOutput),
                    detail: "output parsed but held no content".into(),
                },
            },

            Stage::Accept { output, degraded } => {
                let degraded = degraded.map(|(failure, detail)| {
                    warn!(%failure, %detail, "section accepted below target");
                    DegradedSection {
                        section: S::KIND,
                        failure,
                        fallback: false,
                        detail,
                    }
                });
                return SectionOutcome {
                    result: S::finish(output),
                    degraded,
                    usage,
                };
            }

            Stage::TemplateFallback { failure, detail } => {
                warn!(%failure, %detail, "section replaced by template");
                let mut outcome = template_outcome(S::KIND, ctx, prior, failure, detail);
                outcome.usage = usage;
                return outcome;
            }
        };
    }
}

/// Timeouts count as empty output: the section got nothing back in time.
fn upstream_failure(error: &LessonError) -> FailureKind {
    match error {
        LessonError::UpstreamTimeout { .. } | LessonError::EmptyOutput => FailureKind::EmptyOutput,
        _ => FailureKind::UpstreamFailure,
    }
}

// ---------------------------------------------------------------------------
// Prompt and payload helpers
// ---------------------------------------------------------------------------

const JSON_ONLY: &str = "Reply with JSON only, no commentary, in exactly this shape:";

/// Opening lines shared by every section prompt.
fn prompt_header(ctx: &SharedContext, section: &str) -> String {
    format!(
        "Write the {section} section of a {language} lesson titled \"{title}\".\n\
         Students: {level} ({descriptor}). Lesson type: {lesson_type}.\n\
         Themes: {themes}.\n",
        language = ctx.target_language,
        title = ctx.lesson_title,
        level = ctx.difficulty_level,
        descriptor = ctx.difficulty_level.descriptor(),
        lesson_type = ctx.lesson_type,
        themes = ctx.main_themes.join(", "),
    )
}

/// Words chosen by the vocabulary section, or the context keywords.
fn lesson_words(ctx: &SharedContext, prior: &PriorSections) -> Vec<String> {
    let chosen: Vec<String> = prior
        .get(&SectionKind::Vocabulary)
        .and_then(SectionResult::as_vocabulary)
        .map(|v| v.items.iter().map(|i| i.word.clone()).collect())
        .unwrap_or_default();

    if chosen.is_empty() {
        ctx.key_vocabulary.clone()
    } else {
        chosen
    }
}

/// [`lesson_words`] topped up from the context keywords to at least `min`.
fn padded_words(ctx: &SharedContext, prior: &PriorSections, min: usize) -> Vec<String> {
    let mut words = lesson_words(ctx, prior);
    for keyword in &ctx.key_vocabulary {
        if words.len() >= min {
            break;
        }
        if !words.iter().any(|w| w.eq_ignore_ascii_case(keyword)) {
            words.push(keyword.clone());
        }
    }
    words
}

fn theme(ctx: &SharedContext, n: usize) -> &str {
    ctx.main_themes
        .get(n % ctx.main_themes.len().max(1))
        .or_else(|| ctx.key_vocabulary.first())
        .map(String::as_str)
        .unwrap_or("this topic")
}

/// Entries that still hold text after trimming.
fn non_blank(items: &[String]) -> usize {
    items.iter().filter(|s| !s.trim().is_empty()).count()
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
pub(crate) mod test_support {
    use lessonforge_shared::{ContextOrigin, LessonType, SharedContext, StudentLevel};

    pub fn coffee_context() -> SharedContext {
        SharedContext {
            lesson_title: "Coffee Culture".into(),
            key_vocabulary: vec![
                "brew".into(),
                "roast".into(),
                "bean".into(),
                "aroma".into(),
                "barista".into(),
                "harvest".into(),
            ],
            main_themes: vec!["coffee history".into(), "daily habits".into()],
            difficulty_level: StudentLevel::B1,
            source_summary: "Coffee spread from Ethiopia across the world and shaped daily life."
                .into(),
            target_language: "English".into(),
            lesson_type: LessonType::Discussion,
            source_excerpt: "Coffee began in Ethiopia. ".repeat(60),
            origin: ContextOrigin::Ai,
        }
    }
}

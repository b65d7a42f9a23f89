//! End-to-end lesson generation: source text → shared context → sections →
//! assembled lesson, with progress reporting along the way.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{Instrument, debug, error, info, instrument, warn};

use lessonforge_ai::{CallPolicy, TextGenerator};
use lessonforge_shared::{
    AppConfig, DegradedSection, FailureKind, GeneratedLesson, GenerationEvent, LessonError,
    LessonId, LessonParams, Phase, ProgressUpdate, Result, Schedule, SectionKind, SharedContext,
};

use crate::context::{self, source_hash};
use crate::progress::{PhaseWeights, ProgressTracker, active_sections};
use crate::router::ModelRouter;
use crate::sections::{PriorSections, SectionOutcome, generate_section, template_outcome};

/// Error kind streamed when a run ends without a result.
const ABORTED: &str = "aborted";

/// Default time budget for one section, retries included.
const DEFAULT_SECTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Run settings for [`LessonGenerator`].
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub schedule: Schedule,
    /// Timeout and retry budget for each remote call.
    pub call_policy: CallPolicy,
    /// Budget for a whole section. A section over budget gets its template.
    pub section_timeout: Duration,
    pub weights: PhaseWeights,
    /// Attach a user-facing notice when any section is degraded.
    pub notify_user_on_degraded: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            schedule: Schedule::Sequential,
            call_policy: CallPolicy::default(),
            section_timeout: DEFAULT_SECTION_TIMEOUT,
            weights: PhaseWeights::default(),
            notify_user_on_degraded: false,
        }
    }
}

impl GeneratorConfig {
    /// Resolve run settings from a validated config file.
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            schedule: config.schedule()?,
            call_policy: CallPolicy::new(
                Duration::from_secs(config.ai.request_timeout_secs),
                config.ai.max_retries,
            ),
            section_timeout: Duration::from_secs(config.ai.section_timeout_secs),
            weights: PhaseWeights::with_overrides(&config.weights)?,
            notify_user_on_degraded: config.policy.notify_user_on_degraded,
        })
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for generation runs.
///
/// Called inline by the orchestrator, so implementations must not block.
/// Errors and panics are logged and otherwise ignored.
pub trait ProgressReporter: Send + Sync {
    fn on_progress(&self, update: &ProgressUpdate) -> Result<()>;
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn on_progress(&self, _update: &ProgressUpdate) -> Result<()> {
        Ok(())
    }
}

/// Forwards progress updates onto an event stream.
pub struct ChannelReporter {
    tx: UnboundedSender<GenerationEvent>,
}

impl ChannelReporter {
    pub fn new(tx: UnboundedSender<GenerationEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressReporter for ChannelReporter {
    fn on_progress(&self, update: &ProgressUpdate) -> Result<()> {
        self.tx
            .send(GenerationEvent::Progress(update.clone()))
            .map_err(|_| LessonError::Callback("event receiver dropped".into()))
    }
}

fn emit(reporter: Option<&dyn ProgressReporter>, update: ProgressUpdate) {
    debug!(
        step = update.step,
        phase = update.phase.label(),
        section = ?update.section,
        progress = update.progress,
        "progress"
    );
    let Some(reporter) = reporter else {
        return;
    };
    match panic::catch_unwind(AssertUnwindSafe(|| reporter.on_progress(&update))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(step = update.step, error = %e, "progress reporter failed"),
        Err(_) => warn!(step = update.step, "progress reporter panicked"),
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Generates complete lessons. Cheap to clone; clones share endpoints.
#[derive(Clone)]
pub struct LessonGenerator {
    config: GeneratorConfig,
    router: ModelRouter,
}

impl LessonGenerator {
    pub fn new(config: GeneratorConfig, router: ModelRouter) -> Self {
        Self { config, router }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generate a lesson from `params`.
    ///
    /// Fails only when no shared context can be built. Every active section
    /// is present in the result: sections that could not be generated in
    /// full are listed in `degraded`.
    #[instrument(skip_all, fields(lesson_type = %params.lesson_type, level = %params.student_level, schedule = ?self.config.schedule))]
    pub async fn generate_lesson(
        &self,
        params: &LessonParams,
        progress: Option<&dyn ProgressReporter>,
    ) -> Result<GeneratedLesson> {
        let start = Instant::now();
        let mut run = RunState::new(params, &self.config.weights);

        // --- Phase 1: Shared context ---
        emit(progress, run.tracker.enter(Phase::BuildingContext));
        let built = context::build_context(
            self.router.for_context().as_ref(),
            &self.config.call_policy,
            params,
        )
        .await?;
        let ctx = Arc::new(built.context);
        let mut usage = built.usage;

        // --- Phase 2: Sections ---
        let active = active_sections(&params.lesson_type);
        info!(
            title = %ctx.lesson_title,
            origin = ?ctx.origin,
            sections = active.len(),
            "context ready, generating sections"
        );
        match self.config.schedule {
            Schedule::Sequential => self.run_sequential(&ctx, &active, &mut run, progress).await,
            Schedule::Parallel => self.run_parallel(&ctx, &active, &mut run, progress).await,
        }

        // --- Phase 3: Assembly ---
        emit(progress, run.tracker.enter(Phase::Assembling));
        let mut sections = Vec::with_capacity(run.outcomes.len());
        let mut degraded: Vec<DegradedSection> = Vec::new();
        for outcome in run.outcomes.into_values() {
            usage.merge(&outcome.usage);
            sections.push(outcome.result);
            degraded.extend(outcome.degraded);
        }

        let notice = (self.config.notify_user_on_degraded && !degraded.is_empty())
            .then(|| degraded_notice(&degraded));

        let lesson = GeneratedLesson {
            id: LessonId::new(),
            title: ctx.lesson_title.clone(),
            lesson_type: params.lesson_type.clone(),
            student_level: params.student_level,
            target_language: params.target_language.clone(),
            sections,
            degraded,
            notice,
            context_origin: ctx.origin,
            source_hash: source_hash(&params.source_text),
            usage,
            generated_at: Utc::now(),
        };

        emit(progress, run.tracker.enter(Phase::Done));
        info!(
            lesson_id = %lesson.id,
            sections = lesson.sections.len(),
            degraded = lesson.degraded.len(),
            calls = lesson.usage.calls,
            tokens_out = lesson.usage.tokens_out,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "lesson generated"
        );

        Ok(lesson)
    }

    /// Run a generation in the background and stream its events.
    ///
    /// The stream carries progress updates followed by exactly one
    /// `Complete` or `Error` event, including when the run panics.
    pub fn stream_lesson(
        &self,
        params: LessonParams,
    ) -> (UnboundedReceiver<GenerationEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let generator = self.clone();

        let handle = tokio::spawn(
            async move {
                let reporter = ChannelReporter::new(tx.clone());
                let run = tokio::spawn(
                    async move { generator.generate_lesson(&params, Some(&reporter)).await }
                        .in_current_span(),
                );
                let event = match run.await {
                    Ok(Ok(lesson)) => GenerationEvent::Complete {
                        lesson: Box::new(lesson),
                    },
                    Ok(Err(e)) => {
                        error!(error = %e, "lesson generation failed");
                        GenerationEvent::Error {
                            kind: e.kind().to_string(),
                            message: e.to_string(),
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "lesson generation aborted");
                        GenerationEvent::Error {
                            kind: ABORTED.to_string(),
                            message: format!("generation aborted: {e}"),
                        }
                    }
                };
                if tx.send(event).is_err() {
                    debug!("event receiver dropped before the run finished");
                }
            }
            .in_current_span(),
        );

        (rx, handle)
    }

    /// Sections one after another in canonical order; each sees all earlier
    /// results. A section task that panics gets its template.
    async fn run_sequential(
        &self,
        ctx: &Arc<SharedContext>,
        active: &[SectionKind],
        run: &mut RunState,
        progress: Option<&dyn ProgressReporter>,
    ) {
        for &kind in active {
            emit(progress, run.tracker.section_started(kind));
            let generator = self.router.for_section(kind);
            let policy = self.config.call_policy;
            let budget = self.config.section_timeout;
            let task_ctx = Arc::clone(ctx);
            let prior = run.prior.clone();
            let task = tokio::spawn(
                async move { run_section(kind, generator, policy, budget, &task_ctx, &prior).await }
                    .in_current_span(),
            );

            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(section = %kind, error = %e, "section task failed");
                    template_outcome(
                        kind,
                        ctx,
                        &run.prior,
                        FailureKind::UpstreamFailure,
                        "section task did not complete",
                    )
                }
            };
            run.complete(kind, outcome, progress);
        }
    }

    /// Sections in dependency waves; sections within a wave run
    /// concurrently and see results from earlier waves only.
    async fn run_parallel(
        &self,
        ctx: &Arc<SharedContext>,
        active: &[SectionKind],
        run: &mut RunState,
        progress: Option<&dyn ProgressReporter>,
    ) {
        for wave in dependency_waves(active) {
            debug!(sections = ?wave, "starting section wave");
            let snapshot = Arc::new(run.prior.clone());
            let mut pending: BTreeSet<SectionKind> = wave.iter().copied().collect();
            let mut tasks = JoinSet::new();

            for &kind in &wave {
                emit(progress, run.tracker.section_started(kind));
                let generator = self.router.for_section(kind);
                let policy = self.config.call_policy;
                let budget = self.config.section_timeout;
                let ctx = Arc::clone(ctx);
                let prior = Arc::clone(&snapshot);
                tasks.spawn(
                    async move {
                        let outcome = run_section(kind, generator, policy, budget, &ctx, &prior).await;
                        (kind, outcome)
                    }
                    .in_current_span(),
                );
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((kind, outcome)) => {
                        pending.remove(&kind);
                        run.complete(kind, outcome, progress);
                    }
                    Err(e) => warn!(error = %e, "section task failed"),
                }
            }

            // Tasks that panicked or were cancelled never reported back.
            for kind in pending {
                let outcome = template_outcome(
                    kind,
                    ctx,
                    &snapshot,
                    FailureKind::UpstreamFailure,
                    "section task did not complete",
                );
                run.complete(kind, outcome, progress);
            }
        }
    }
}

/// Per-run bookkeeping. Each section writes only its own slot.
struct RunState {
    tracker: ProgressTracker,
    prior: PriorSections,
    outcomes: BTreeMap<SectionKind, SectionOutcome>,
}

impl RunState {
    fn new(params: &LessonParams, weights: &PhaseWeights) -> Self {
        Self {
            tracker: ProgressTracker::new(params.lesson_type.clone(), weights.clone()),
            prior: PriorSections::new(),
            outcomes: BTreeMap::new(),
        }
    }

    fn complete(
        &mut self,
        kind: SectionKind,
        outcome: SectionOutcome,
        progress: Option<&dyn ProgressReporter>,
    ) {
        self.prior.insert(kind, outcome.result.clone());
        self.outcomes.insert(kind, outcome);
        emit(progress, self.tracker.section_completed(kind));
    }
}

/// One section under the section time budget.
async fn run_section(
    kind: SectionKind,
    generator: Arc<dyn TextGenerator>,
    policy: CallPolicy,
    budget: Duration,
    ctx: &SharedContext,
    prior: &PriorSections,
) -> SectionOutcome {
    let section = generate_section(kind, generator.as_ref(), &policy, ctx, prior);
    match tokio::time::timeout(budget, section).await {
        Ok(outcome) => outcome,
        Err(_) => {
            let budget_ms = budget.as_millis() as u64;
            warn!(section = %kind, budget_ms, "section over time budget, using template");
            template_outcome(
                kind,
                ctx,
                prior,
                FailureKind::EmptyOutput,
                format!("section exceeded its {budget_ms}ms budget"),
            )
        }
    }
}

/// Group `active` into waves: every section runs in a later wave than the
/// active sections it depends on.
fn dependency_waves(active: &[SectionKind]) -> Vec<Vec<SectionKind>> {
    let mut waves = Vec::new();
    let mut placed: BTreeSet<SectionKind> = BTreeSet::new();
    let mut remaining = active.to_vec();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<SectionKind>, Vec<SectionKind>) =
            remaining.into_iter().partition(|kind| {
                kind.depends_on()
                    .iter()
                    .all(|dep| placed.contains(dep) || !active.contains(dep))
            });
        if ready.is_empty() {
            // Unreachable with the built-in dependency table.
            waves.push(blocked);
            break;
        }
        placed.extend(ready.iter().copied());
        waves.push(ready);
        remaining = blocked;
    }

    waves
}

fn degraded_notice(degraded: &[DegradedSection]) -> String {
    let names: Vec<&str> = degraded.iter().map(|d| d.section.as_str()).collect();
    format!(
        "Some sections could not be generated in full and contain simplified content: {}.",
        names.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use lessonforge_shared::LessonType;

    use SectionKind::*;

    #[test]
    fn waves_respect_dependencies() {
        let active = active_sections(&LessonType::Discussion);
        assert_eq!(
            dependency_waves(&active),
            vec![
                vec![Warmup, Vocabulary, Discussion],
                vec![Reading, WrapUp],
                vec![Comprehension],
            ]
        );
    }

    #[test]
    fn inactive_dependencies_do_not_block() {
        assert_eq!(
            dependency_waves(&[Warmup, Comprehension]),
            vec![vec![Warmup, Comprehension]]
        );
    }

    struct Panicking;

    impl ProgressReporter for Panicking {
        fn on_progress(&self, _update: &ProgressUpdate) -> Result<()> {
            panic!("reporter bug");
        }
    }

    struct Recording(Mutex<Vec<u8>>);

    impl ProgressReporter for Recording {
        fn on_progress(&self, update: &ProgressUpdate) -> Result<()> {
            self.0.lock().unwrap().push(update.progress);
            Err(LessonError::Callback("display closed".into()))
        }
    }

    fn update(progress: u8) -> ProgressUpdate {
        ProgressUpdate {
            step: 1,
            phase: Phase::GeneratingSection,
            section: Some(Warmup),
            progress,
        }
    }

    #[test]
    fn reporter_panics_and_errors_are_contained() {
        emit(Some(&Panicking), update(10));

        let recording = Recording(Mutex::new(Vec::new()));
        emit(Some(&recording), update(10));
        emit(Some(&recording), update(20));
        assert_eq!(*recording.0.lock().unwrap(), vec![10, 20]);

        emit(None, update(30));
    }

    #[test]
    fn channel_reporter_reports_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = ChannelReporter::new(tx);
        assert!(reporter.on_progress(&update(5)).is_ok());
        drop(rx);
        assert!(matches!(
            reporter.on_progress(&update(6)),
            Err(LessonError::Callback(_))
        ));
    }

    #[test]
    fn config_from_file_settings() {
        let mut app = AppConfig::default();
        app.defaults.schedule = "parallel".into();
        app.ai.section_timeout_secs = 30;
        app.weights.insert("reading".into(), 40);
        app.policy.notify_user_on_degraded = true;

        let config = GeneratorConfig::from_app_config(&app).expect("valid config");
        assert_eq!(config.schedule, Schedule::Parallel);
        assert_eq!(config.section_timeout, Duration::from_secs(30));
        assert_eq!(config.weights.weight(Reading), 40);
        assert!(config.notify_user_on_degraded);

        app.weights.insert("homework".into(), 5);
        assert!(GeneratorConfig::from_app_config(&app).is_err());
    }

    #[test]
    fn notice_lists_degraded_sections() {
        let notice = degraded_notice(&[DegradedSection {
            section: Grammar,
            failure: FailureKind::UpstreamFailure,
            fallback: true,
            detail: "HTTP 500".into(),
        }]);
        assert!(notice.contains("grammar"));
    }
}

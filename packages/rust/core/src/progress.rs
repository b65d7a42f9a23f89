//! Weighted progress across the active section set of a lesson type.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use lessonforge_shared::{LessonError, LessonType, Phase, ProgressUpdate, Result, SectionKind};

/// Sections every lesson type generates.
const BASE_SECTIONS: [SectionKind; 5] = [
    SectionKind::Warmup,
    SectionKind::Vocabulary,
    SectionKind::Reading,
    SectionKind::Comprehension,
    SectionKind::WrapUp,
];

/// Sections active for `lesson_type`, in canonical order.
///
/// Unknown lesson types get the base set.
pub fn active_sections(lesson_type: &LessonType) -> Vec<SectionKind> {
    let extra: &[SectionKind] = match lesson_type {
        LessonType::Discussion => &[SectionKind::Discussion],
        LessonType::Grammar => &[SectionKind::Grammar],
        LessonType::Pronunciation => &[SectionKind::Pronunciation],
        LessonType::Travel | LessonType::Business => &[SectionKind::Dialogue],
        LessonType::Other(_) => &[],
    };

    SectionKind::ALL
        .into_iter()
        .filter(|kind| BASE_SECTIONS.contains(kind) || extra.contains(kind))
        .collect()
}

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

/// Relative cost of each section, used only for progress arithmetic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseWeights(BTreeMap<SectionKind, u32>);

impl Default for PhaseWeights {
    fn default() -> Self {
        Self(BTreeMap::from([
            (SectionKind::Warmup, 10),
            (SectionKind::Vocabulary, 15),
            (SectionKind::Reading, 20),
            (SectionKind::Comprehension, 10),
            (SectionKind::Discussion, 10),
            (SectionKind::Dialogue, 15),
            (SectionKind::Grammar, 15),
            (SectionKind::Pronunciation, 15),
            (SectionKind::WrapUp, 5),
        ]))
    }
}

impl PhaseWeights {
    /// Defaults with per-section overrides (`[weights]` in the config file).
    pub fn with_overrides(overrides: &BTreeMap<String, u32>) -> Result<Self> {
        let mut weights = Self::default();
        for (name, weight) in overrides {
            let kind: SectionKind = name.parse()?;
            if *weight == 0 {
                return Err(LessonError::validation(format!(
                    "weight for '{kind}' must be positive"
                )));
            }
            weights.0.insert(kind, *weight);
        }
        Ok(weights)
    }

    pub fn weight(&self, kind: SectionKind) -> u32 {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    /// Sum of weights over the sections active for `lesson_type`.
    pub fn total_for(&self, lesson_type: &LessonType) -> u64 {
        active_sections(lesson_type)
            .into_iter()
            .map(|kind| u64::from(self.weight(kind)))
            .sum()
    }
}

/// Percent complete, 0–100.
///
/// Only sections in the active set for `lesson_type` count, each at most
/// once. `current` is never credited.
pub fn calculate_progress(
    completed: &[SectionKind],
    current: Option<SectionKind>,
    lesson_type: &LessonType,
    weights: &PhaseWeights,
) -> u8 {
    let active = active_sections(lesson_type);
    let total: u64 = active.iter().map(|k| u64::from(weights.weight(*k))).sum();
    if total == 0 {
        return 0;
    }

    let done: BTreeSet<SectionKind> = completed
        .iter()
        .copied()
        .filter(|k| active.contains(k))
        .collect();
    let completed_weight: u64 = done.iter().map(|k| u64::from(weights.weight(*k))).sum();

    // Integer round-half-up of 100 * completed / total.
    let percent = (200 * completed_weight + total) / (2 * total);
    trace!(?current, completed_weight, total, percent, "progress");
    percent.min(100) as u8
}

// ---------------------------------------------------------------------------
// Per-run tracker
// ---------------------------------------------------------------------------

/// Stateful progress for one run: deduplicated completions, a step counter
/// and a high-water mark so reported progress never goes backwards.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    lesson_type: LessonType,
    weights: PhaseWeights,
    completed: Vec<SectionKind>,
    step: u32,
    high_water: u8,
}

impl ProgressTracker {
    pub fn new(lesson_type: LessonType, weights: PhaseWeights) -> Self {
        Self {
            lesson_type,
            weights,
            completed: Vec::new(),
            step: 0,
            high_water: 0,
        }
    }

    /// Enter a phase that is not tied to a section.
    pub fn enter(&mut self, phase: Phase) -> ProgressUpdate {
        self.update(phase, None, None)
    }

    /// A section is about to be generated.
    pub fn section_started(&mut self, section: SectionKind) -> ProgressUpdate {
        self.update(Phase::GeneratingSection, Some(section), Some(section))
    }

    /// A section finished (live output or template). Repeat calls are no-ops
    /// for the percentage.
    pub fn section_completed(&mut self, section: SectionKind) -> ProgressUpdate {
        if !self.completed.contains(&section) {
            self.completed.push(section);
        }
        self.update(Phase::GeneratingSection, Some(section), None)
    }

    pub fn percent(&self) -> u8 {
        self.high_water
    }

    pub fn completed(&self) -> &[SectionKind] {
        &self.completed
    }

    fn update(
        &mut self,
        phase: Phase,
        section: Option<SectionKind>,
        current: Option<SectionKind>,
    ) -> ProgressUpdate {
        let percent =
            calculate_progress(&self.completed, current, &self.lesson_type, &self.weights);
        self.high_water = self.high_water.max(percent);
        self.step += 1;
        ProgressUpdate {
            step: self.step,
            phase,
            section,
            progress: self.high_water,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_types() -> Vec<LessonType> {
        let mut types = LessonType::known().to_vec();
        types.push(LessonType::Other("kids-songs".into()));
        types
    }

    #[test]
    fn active_sets_per_lesson_type() {
        use SectionKind::*;
        assert_eq!(
            active_sections(&LessonType::Discussion),
            vec![Warmup, Vocabulary, Reading, Comprehension, Discussion, WrapUp]
        );
        assert_eq!(
            active_sections(&LessonType::Business),
            vec![Warmup, Vocabulary, Reading, Comprehension, Dialogue, WrapUp]
        );
        assert_eq!(
            active_sections(&LessonType::Other("poetry".into())),
            BASE_SECTIONS.to_vec()
        );
    }

    #[test]
    fn every_lesson_type_reaches_one_hundred() {
        let weights = PhaseWeights::default();
        for lesson_type in all_types() {
            assert!(weights.total_for(&lesson_type) > 0, "{lesson_type}");
            let active = active_sections(&lesson_type);
            assert_eq!(calculate_progress(&active, None, &lesson_type, &weights), 100);
            assert_eq!(calculate_progress(&[], None, &lesson_type, &weights), 0);
        }
    }

    #[test]
    fn discussion_weights_round_correctly() {
        // Active total: 10 + 15 + 20 + 10 + 10 + 5 = 70.
        let weights = PhaseWeights::default();
        let p = calculate_progress(
            &[SectionKind::Warmup, SectionKind::Vocabulary],
            Some(SectionKind::Reading),
            &LessonType::Discussion,
            &weights,
        );
        // 25 / 70 = 35.7%
        assert_eq!(p, 36);
    }

    #[test]
    fn duplicates_and_inactive_sections_are_ignored() {
        let weights = PhaseWeights::default();
        let once = calculate_progress(
            &[SectionKind::Warmup],
            None,
            &LessonType::Grammar,
            &weights,
        );
        let repeated = calculate_progress(
            &[
                SectionKind::Warmup,
                SectionKind::Warmup,
                SectionKind::Dialogue,
                SectionKind::Pronunciation,
            ],
            None,
            &LessonType::Grammar,
            &weights,
        );
        assert_eq!(once, repeated);
    }

    #[test]
    fn current_section_is_not_credited() {
        let weights = PhaseWeights::default();
        let without = calculate_progress(&[], None, &LessonType::Travel, &weights);
        let with = calculate_progress(&[], Some(SectionKind::Reading), &LessonType::Travel, &weights);
        assert_eq!(without, with);
    }

    #[test]
    fn overrides_replace_defaults_and_reject_zero() {
        let overrides = BTreeMap::from([("wrap_up".to_string(), 30)]);
        let weights = PhaseWeights::with_overrides(&overrides).unwrap();
        assert_eq!(weights.weight(SectionKind::WrapUp), 30);
        assert_eq!(weights.weight(SectionKind::Reading), 20);

        let zero = BTreeMap::from([("reading".to_string(), 0)]);
        assert!(PhaseWeights::with_overrides(&zero).is_err());
        let unknown = BTreeMap::from([("karaoke".to_string(), 5)]);
        assert!(PhaseWeights::with_overrides(&unknown).is_err());
    }

    #[test]
    fn tracker_is_monotonic_and_ends_at_one_hundred() {
        let lesson_type = LessonType::Pronunciation;
        let mut tracker = ProgressTracker::new(lesson_type.clone(), PhaseWeights::default());
        let mut seen = vec![tracker.enter(Phase::BuildingContext)];

        for kind in active_sections(&lesson_type) {
            seen.push(tracker.section_started(kind));
            seen.push(tracker.section_completed(kind));
            seen.push(tracker.section_completed(kind));
        }
        seen.push(tracker.enter(Phase::Assembling));

        for pair in seen.windows(2) {
            assert!(pair[0].progress <= pair[1].progress);
            assert_eq!(pair[0].step + 1, pair[1].step);
        }
        assert_eq!(seen.first().unwrap().progress, 0);
        assert_eq!(seen.last().unwrap().progress, 100);
        assert_eq!(tracker.completed().len(), 6);
    }
}

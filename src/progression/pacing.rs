//! Adaptive pacing over per-subject velocity state.
//!
//! Translates recent performance into problem counts, difficulty tier,
//! skip eligibility, and diagnostic-driven bulk mastery. Pure business logic
//! over supplied records; every operation degrades to safe defaults when a
//! record is missing, so a brand-new student never causes a failure here.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::config::PacingConfig;
use crate::curriculum;
use crate::models::{DifficultyTier, Progress, SubjectProgress};
use crate::store::ProgressionStore;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VelocityIndicator {
    pub icon: &'static str,
    pub label: &'static str,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSummary {
    pub module_number: u32,
    pub title: String,
    pub total_lessons: usize,
    pub lessons_mastered: usize,
    pub percent_complete: f64,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub modules: Vec<ModuleSummary>,
    pub total_lessons: usize,
    pub lessons_mastered: usize,
    pub percent_complete: f64,
}

pub struct Pacer<S> {
    store: Arc<S>,
    config: PacingConfig,
}

impl<S: ProgressionStore> Pacer<S> {
    pub fn new(store: Arc<S>, config: PacingConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &PacingConfig {
        &self.config
    }

    /// Fetch the subject progress record, creating it positioned at the
    /// subject's first lesson when absent.
    pub fn get_or_create_subject_progress(
        &self,
        student_id: &str,
        subject_id: &str,
    ) -> SubjectProgress {
        super::get_or_create_subject_progress(self.store.as_ref(), student_id, subject_id)
    }

    /// Number of problems for the next practice set: fewer when excelling,
    /// more when struggling. Always one of {min, base, max}.
    pub fn problem_count(&self, student_id: &str, subject_id: &str) -> u32 {
        let Some(progress) = self.store.subject_progress(student_id, subject_id) else {
            return self.config.base_problems;
        };

        if progress.consecutive_perfect >= self.config.speedup_streak {
            return self.config.min_problems;
        }
        if progress.consecutive_struggles >= self.config.slowdown_streak {
            return self.config.max_problems;
        }
        self.config.base_problems
    }

    /// Update streaks and velocity after a graded submission.
    ///
    /// Perfect score bumps the perfect streak and velocity; a score below the
    /// struggle threshold bumps the struggle streak and lowers velocity;
    /// anything in between clears both streaks. The two streaks are never
    /// simultaneously nonzero.
    pub fn update_velocity(&self, student_id: &str, subject_id: &str, score: f64) {
        let mut progress = self.get_or_create_subject_progress(student_id, subject_id);

        if score >= self.config.mastery_threshold {
            progress.consecutive_perfect += 1;
            progress.consecutive_struggles = 0;
            progress.velocity_score =
                (progress.velocity_score + self.config.velocity_step).min(self.config.velocity_max);
        } else if score < self.config.struggle_threshold {
            progress.consecutive_struggles += 1;
            progress.consecutive_perfect = 0;
            progress.velocity_score =
                (progress.velocity_score - self.config.velocity_step).max(self.config.velocity_min);
        } else {
            progress.consecutive_perfect = 0;
            progress.consecutive_struggles = 0;
            progress.velocity_score = progress
                .velocity_score
                .clamp(self.config.velocity_min, self.config.velocity_max);
        }

        tracing::debug!(
            student = student_id,
            subject = subject_id,
            score,
            velocity = progress.velocity_score,
            perfect = progress.consecutive_perfect,
            struggles = progress.consecutive_struggles,
            "velocity updated"
        );
        self.store.upsert_subject_progress(progress);
    }

    /// Difficulty tier for content generation. Struggles win over streaks of
    /// perfection; the mutual-exclusion invariant makes the order unambiguous.
    pub fn difficulty_tier(&self, student_id: &str, subject_id: &str) -> DifficultyTier {
        let Some(progress) = self.store.subject_progress(student_id, subject_id) else {
            return DifficultyTier::Standard;
        };

        if progress.consecutive_struggles >= self.config.slowdown_streak {
            return DifficultyTier::Easier;
        }
        if progress.consecutive_perfect >= self.config.speedup_streak {
            return DifficultyTier::Harder;
        }
        DifficultyTier::Standard
    }

    /// Whether to offer a mastery assessment to skip the current lesson.
    pub fn skip_eligible(&self, student_id: &str, subject_id: &str) -> bool {
        self.store
            .subject_progress(student_id, subject_id)
            .is_some_and(|p| p.consecutive_perfect >= self.config.skip_offer_streak)
    }

    /// Apply graded diagnostic results: every module at or above the
    /// diagnostic threshold has all of its lessons marked mastered, then the
    /// curriculum pointer moves to the first lesson of the first module that
    /// is not fully mastered (or the last lesson of the last module when
    /// everything is). Idempotent for already-mastered lessons.
    pub fn apply_diagnostic_mastery(
        &self,
        student_id: &str,
        subject_id: &str,
        module_scores: &HashMap<u32, f64>,
    ) -> Vec<u32> {
        let modules = self.store.modules(subject_id);
        let now = Utc::now();
        let mut mastered_modules = Vec::new();

        for module in &modules {
            let score = module_scores.get(&module.number).copied().unwrap_or(0.0);
            if score < self.config.diagnostic_mastery_threshold {
                continue;
            }
            mastered_modules.push(module.number);

            for lesson in &module.lessons {
                let mut progress = self
                    .store
                    .progress(student_id, &lesson.id)
                    .unwrap_or_else(|| Progress::new(student_id, &lesson.id));
                if progress.mastered {
                    continue;
                }
                progress.mastered = true;
                progress.mastered_at = Some(now);
                progress.best_practice_score = Some(100.0);
                self.store.upsert_progress(progress);
            }
        }

        let mut subject_progress = self.get_or_create_subject_progress(student_id, subject_id);
        let next_unmastered = modules.iter().find(|module| {
            module.lessons.iter().any(|lesson| {
                !self
                    .store
                    .progress(student_id, &lesson.id)
                    .is_some_and(|p| p.mastered)
            })
        });

        match next_unmastered {
            Some(module) => {
                subject_progress.current_module_id = Some(module.id.clone());
                subject_progress.current_lesson_id =
                    module.lessons.first().map(|l| l.id.clone());
            }
            None => {
                if let Some((module, lesson)) = curriculum::last_lesson(&modules) {
                    subject_progress.current_module_id = Some(module.id.clone());
                    subject_progress.current_lesson_id = Some(lesson.id.clone());
                }
            }
        }
        self.store.upsert_subject_progress(subject_progress);

        tracing::info!(
            student = student_id,
            subject = subject_id,
            mastered = ?mastered_modules,
            "applied diagnostic mastery"
        );
        mastered_modules
    }

    /// Most frequent error tags across the student's progress records,
    /// optionally narrowed to one lesson. Input for the remediation
    /// generator only.
    pub fn weak_concepts(&self, student_id: &str, lesson_id: Option<&str>) -> Vec<String> {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for progress in self.store.student_progress(student_id) {
            if lesson_id.is_some_and(|id| id != progress.lesson_id) {
                continue;
            }
            for (tag, count) in &progress.error_patterns {
                *counts.entry(tag.clone()).or_insert(0) += count;
            }
        }

        let mut tags: Vec<(String, u32)> = counts.into_iter().collect();
        tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        tags.truncate(self.config.weak_concept_limit);
        tags.into_iter().map(|(tag, _)| tag).collect()
    }

    pub fn velocity_indicator(&self, student_id: &str, subject_id: &str) -> VelocityIndicator {
        let Some(progress) = self.store.subject_progress(student_id, subject_id) else {
            return VelocityIndicator {
                icon: "🚶",
                label: "normal",
                description: "Standard pace".to_string(),
            };
        };

        if progress.consecutive_struggles >= self.config.slowdown_streak {
            VelocityIndicator {
                icon: "🐢",
                label: "slow",
                description: format!(
                    "Extra support mode ({} struggles)",
                    progress.consecutive_struggles
                ),
            }
        } else if progress.consecutive_perfect >= self.config.speedup_streak {
            VelocityIndicator {
                icon: "🏃",
                label: "fast",
                description: format!(
                    "Accelerated pace ({} perfect in a row!)",
                    progress.consecutive_perfect
                ),
            }
        } else {
            VelocityIndicator {
                icon: "🚶",
                label: "normal",
                description: format!("Standard pace (velocity: {:.1})", progress.velocity_score),
            }
        }
    }

    pub fn progress_summary(&self, student_id: &str, subject_id: &str) -> ProgressSummary {
        let modules = self.store.modules(subject_id);
        let mut summaries = Vec::with_capacity(modules.len());

        for module in &modules {
            let total = module.lessons.len();
            let mastered = module
                .lessons
                .iter()
                .filter(|lesson| {
                    self.store
                        .progress(student_id, &lesson.id)
                        .is_some_and(|p| p.mastered)
                })
                .count();
            summaries.push(ModuleSummary {
                module_number: module.number,
                title: module.title.clone(),
                total_lessons: total,
                lessons_mastered: mastered,
                percent_complete: if total > 0 {
                    mastered as f64 / total as f64 * 100.0
                } else {
                    0.0
                },
                is_complete: total > 0 && mastered == total,
            });
        }

        let total_lessons: usize = summaries.iter().map(|m| m.total_lessons).sum();
        let lessons_mastered: usize = summaries.iter().map(|m| m.lessons_mastered).sum();
        ProgressSummary {
            modules: summaries,
            total_lessons,
            lessons_mastered,
            percent_complete: if total_lessons > 0 {
                lessons_mastered as f64 / total_lessons as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::{seed_subject, CurriculumDoc};
    use crate::store::MemoryStore;

    fn fixture() -> (Arc<MemoryStore>, String) {
        let store = Arc::new(MemoryStore::new());
        let doc: CurriculumDoc = serde_json::from_value(serde_json::json!({
            "subject": { "code": "PREALG", "name": "Pre-Algebra" },
            "modules": [
                {
                    "number": 1, "title": "Integers",
                    "lessons": [
                        { "number": 1, "title": "Number line" },
                        { "number": 2, "title": "Adding integers" }
                    ]
                },
                {
                    "number": 2, "title": "Fractions",
                    "lessons": [ { "number": 1, "title": "Equivalent fractions" } ]
                },
                {
                    "number": 3, "title": "Decimals",
                    "lessons": [ { "number": 1, "title": "Place value" } ]
                }
            ]
        }))
        .unwrap();
        let subject = seed_subject(store.as_ref(), &doc).unwrap();
        (store, subject.id)
    }

    fn pacer(store: &Arc<MemoryStore>) -> Pacer<MemoryStore> {
        Pacer::new(Arc::clone(store), PacingConfig::default())
    }

    #[test]
    fn fresh_student_gets_safe_defaults() {
        let (store, subject_id) = fixture();
        let pacer = pacer(&store);

        assert_eq!(pacer.problem_count("amy", &subject_id), 25);
        assert_eq!(
            pacer.difficulty_tier("amy", &subject_id),
            DifficultyTier::Standard
        );
        assert!(!pacer.skip_eligible("amy", &subject_id));
    }

    #[test]
    fn perfect_streak_reduces_problem_count_and_hardens_difficulty() {
        let (store, subject_id) = fixture();
        let pacer = pacer(&store);

        for expected in 1..=3u32 {
            pacer.update_velocity("amy", &subject_id, 100.0);
            let progress = store.subject_progress("amy", &subject_id).unwrap();
            assert_eq!(progress.consecutive_perfect, expected);
        }

        assert_eq!(pacer.problem_count("amy", &subject_id), 15);
        assert_eq!(
            pacer.difficulty_tier("amy", &subject_id),
            DifficultyTier::Harder
        );
    }

    #[test]
    fn struggles_increase_problem_count() {
        let (store, subject_id) = fixture();
        let pacer = pacer(&store);

        pacer.update_velocity("amy", &subject_id, 60.0);
        pacer.update_velocity("amy", &subject_id, 55.0);

        assert_eq!(pacer.problem_count("amy", &subject_id), 35);
        assert_eq!(
            pacer.difficulty_tier("amy", &subject_id),
            DifficultyTier::Easier
        );
    }

    #[test]
    fn streaks_are_mutually_exclusive() {
        let (store, subject_id) = fixture();
        let pacer = pacer(&store);

        pacer.update_velocity("amy", &subject_id, 100.0);
        pacer.update_velocity("amy", &subject_id, 100.0);
        pacer.update_velocity("amy", &subject_id, 40.0);

        let progress = store.subject_progress("amy", &subject_id).unwrap();
        assert_eq!(progress.consecutive_perfect, 0);
        assert_eq!(progress.consecutive_struggles, 1);
    }

    #[test]
    fn middle_scores_reset_both_streaks() {
        let (store, subject_id) = fixture();
        let pacer = pacer(&store);

        pacer.update_velocity("amy", &subject_id, 100.0);
        pacer.update_velocity("amy", &subject_id, 85.0);

        let progress = store.subject_progress("amy", &subject_id).unwrap();
        assert_eq!(progress.consecutive_perfect, 0);
        assert_eq!(progress.consecutive_struggles, 0);
    }

    #[test]
    fn three_perfects_raise_velocity_by_exactly_point_three() {
        let (store, subject_id) = fixture();
        let pacer = pacer(&store);

        for _ in 0..3 {
            pacer.update_velocity("amy", &subject_id, 100.0);
        }
        let progress = store.subject_progress("amy", &subject_id).unwrap();
        assert!((progress.velocity_score - 1.3).abs() < 1e-9);

        for _ in 0..3 {
            pacer.update_velocity("bob", &subject_id, 50.0);
        }
        let progress = store.subject_progress("bob", &subject_id).unwrap();
        assert!((progress.velocity_score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn velocity_stays_within_bounds() {
        let (store, subject_id) = fixture();
        let pacer = pacer(&store);

        for _ in 0..20 {
            pacer.update_velocity("amy", &subject_id, 100.0);
        }
        assert!(store.subject_progress("amy", &subject_id).unwrap().velocity_score <= 2.0);

        for _ in 0..40 {
            pacer.update_velocity("amy", &subject_id, 10.0);
        }
        assert!(store.subject_progress("amy", &subject_id).unwrap().velocity_score >= 0.5);
    }

    #[test]
    fn skip_eligible_only_at_five_perfects() {
        let (store, subject_id) = fixture();
        let pacer = pacer(&store);

        for _ in 0..4 {
            pacer.update_velocity("amy", &subject_id, 100.0);
        }
        assert!(!pacer.skip_eligible("amy", &subject_id));

        pacer.update_velocity("amy", &subject_id, 100.0);
        assert!(pacer.skip_eligible("amy", &subject_id));
    }

    #[test]
    fn diagnostic_mastery_marks_modules_and_repositions() {
        let (store, subject_id) = fixture();
        let pacer = pacer(&store);

        let scores = HashMap::from([(1, 100.0), (2, 80.0), (3, 100.0)]);
        let mastered = pacer.apply_diagnostic_mastery("amy", &subject_id, &scores);
        assert_eq!(mastered, vec![1, 3]);

        let modules = store.modules(&subject_id);
        for lesson in &modules[0].lessons {
            let progress = store.progress("amy", &lesson.id).unwrap();
            assert!(progress.mastered);
            assert_eq!(progress.best_practice_score, Some(100.0));
        }
        assert!(store.progress("amy", &modules[1].lessons[0].id).is_none());

        let sp = store.subject_progress("amy", &subject_id).unwrap();
        assert_eq!(sp.current_module_id.as_deref(), Some(modules[1].id.as_str()));
        assert_eq!(
            sp.current_lesson_id.as_deref(),
            Some(modules[1].lessons[0].id.as_str())
        );

        // Repeat call is a no-op for already-mastered lessons.
        let first_mastered_at = store
            .progress("amy", &modules[0].lessons[0].id)
            .unwrap()
            .mastered_at;
        pacer.apply_diagnostic_mastery("amy", &subject_id, &scores);
        assert_eq!(
            store
                .progress("amy", &modules[0].lessons[0].id)
                .unwrap()
                .mastered_at,
            first_mastered_at
        );
    }

    #[test]
    fn diagnostic_mastery_of_everything_points_at_last_lesson() {
        let (store, subject_id) = fixture();
        let pacer = pacer(&store);

        let scores = HashMap::from([(1, 100.0), (2, 100.0), (3, 100.0)]);
        pacer.apply_diagnostic_mastery("amy", &subject_id, &scores);

        let modules = store.modules(&subject_id);
        let sp = store.subject_progress("amy", &subject_id).unwrap();
        assert_eq!(
            sp.current_lesson_id.as_deref(),
            Some(modules[2].lessons[0].id.as_str())
        );
    }

    #[test]
    fn weak_concepts_ranked_by_frequency() {
        let (store, subject_id) = fixture();
        let pacer = pacer(&store);
        let modules = store.modules(&subject_id);

        let mut p1 = Progress::new("amy", &modules[0].lessons[0].id);
        p1.add_error_pattern("sign errors", 4);
        p1.add_error_pattern("carrying", 1);
        store.upsert_progress(p1);

        let mut p2 = Progress::new("amy", &modules[0].lessons[1].id);
        p2.add_error_pattern("fraction division", 2);
        p2.add_error_pattern("sign errors", 1);
        store.upsert_progress(p2);

        let tags = pacer.weak_concepts("amy", None);
        assert_eq!(tags[0], "sign errors");
        assert_eq!(tags[1], "fraction division");

        let scoped = pacer.weak_concepts("amy", Some(&modules[0].lessons[1].id));
        assert_eq!(scoped[0], "fraction division");
    }
}

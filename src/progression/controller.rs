//! Orchestration over the planner, the pacer, and the content seams.
//!
//! The controller is the only component with side effects: it generates and
//! persists materials, records grades, and resolves disputes. The planner's
//! derivation stays pure, so a failed generation or render leaves the
//! student's assignment exactly where it was.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::content::{ContentGenerator, GeneratedMaterial, GenerationRequest, Renderer};
use crate::curriculum;
use crate::error::EngineError;
use crate::grading;
use crate::models::{
    DifficultyTier, Dispute, DisputeStatus, GradedItem, Material, MaterialKind, Progress,
    Submission, SubmissionStatus,
};
use crate::progression::pacing::{Pacer, ProgressSummary, VelocityIndicator};
use crate::progression::planner::{ActionType, Assignment, LearningState, Planner};
use crate::progression::ui::StateUi;
use crate::store::ProgressionStore;

/// The reader's verdict on one submitted sheet, item by item.
#[derive(Debug, Clone)]
pub struct GradeOutcome {
    pub items: Vec<GradedItem>,
}

impl GradeOutcome {
    /// Build an outcome from the reader's raw JSON item list, mapping its
    /// confidence strings and filling defaults for missing fields.
    pub fn from_reader(value: &serde_json::Value) -> Self {
        Self { items: grading::items_from_reader(value) }
    }
}

/// Dashboard payload: the assignment plus everything displayed next to it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressInfo {
    pub assignment: Assignment,
    pub ui: StateUi,
    pub velocity: VelocityIndicator,
    pub summary: ProgressSummary,
    pub skip_eligible: bool,
}

pub struct AssignmentController<S, G, R> {
    store: Arc<S>,
    pacer: Pacer<S>,
    planner: Planner<S>,
    generator: G,
    renderer: R,
    config: EngineConfig,
}

impl<S, G, R> AssignmentController<S, G, R>
where
    S: ProgressionStore,
    G: ContentGenerator,
    R: Renderer,
{
    pub fn new(store: Arc<S>, config: EngineConfig, generator: G, renderer: R) -> Self {
        let pacer = Pacer::new(Arc::clone(&store), config.pacing.clone());
        let planner = Planner::new(Arc::clone(&store), config.pacing.clone());
        Self { store, pacer, planner, generator, renderer, config }
    }

    pub fn get_assignment(
        &self,
        student_id: &str,
        subject_id: &str,
    ) -> Result<Assignment, EngineError> {
        self.planner.current_assignment(student_id, subject_id)
    }

    pub fn advance_student(
        &self,
        student_id: &str,
        subject_id: &str,
    ) -> Result<Assignment, EngineError> {
        self.planner.advance_to_next(student_id, subject_id)
    }

    pub fn mark_lesson_complete(&self, student_id: &str, lesson_id: &str) -> bool {
        self.planner.mark_lesson_read(student_id, lesson_id)
    }

    pub fn get_progress_info(
        &self,
        student_id: &str,
        subject_id: &str,
    ) -> Result<ProgressInfo, EngineError> {
        let assignment = self.planner.current_assignment(student_id, subject_id)?;
        Ok(ProgressInfo {
            ui: StateUi::for_state(assignment.state),
            velocity: self.pacer.velocity_indicator(student_id, subject_id),
            summary: self.pacer.progress_summary(student_id, subject_id),
            skip_eligible: self.pacer.skip_eligible(student_id, subject_id),
            assignment,
        })
    }

    /// Generate the material the current assignment is waiting on, if any.
    ///
    /// Returns `Ok(None)` when the assignment does not call for generation.
    /// Nothing is persisted unless the generator produced usable content, so
    /// a failure keeps the assignment in its "generate" state and the call
    /// is safe to repeat.
    pub async fn auto_generate_if_needed(
        &self,
        student_id: &str,
        subject_id: &str,
    ) -> Result<Option<Material>, EngineError> {
        let assignment = self.planner.current_assignment(student_id, subject_id)?;
        if assignment.action != ActionType::Generate {
            return Ok(None);
        }

        let request = self.build_request(student_id, &assignment)?;
        let generated = self
            .generator
            .generate(&request)
            .await?
            .ok_or_else(|| {
                EngineError::Generation("model produced no usable content".to_string())
            })?;

        let material = self.persist_material(
            &assignment.subject_id,
            assignment.module_id.clone(),
            assignment.lesson_id.clone(),
            request.kind,
            generated,
        )?;
        tracing::info!(
            student = student_id,
            kind = material.kind.as_str(),
            title = %material.title,
            "generated material"
        );
        Ok(Some(material))
    }

    /// Generate a cumulative quiz over the module, attached to the given
    /// lesson so its score lands in that lesson's quiz history. Quizzes are
    /// requested on demand rather than by the assignment loop; they inform
    /// pacing but never grant mastery.
    pub async fn generate_quiz(
        &self,
        student_id: &str,
        subject_id: &str,
        lesson_id: &str,
    ) -> Result<Material, EngineError> {
        let subject = self
            .store
            .subject(subject_id)
            .ok_or_else(|| EngineError::NotFound(format!("subject {subject_id}")))?;
        let modules = self.store.modules(subject_id);
        let (module, lesson) = curriculum::find_lesson(&modules, lesson_id)
            .ok_or_else(|| EngineError::NotFound(format!("lesson {lesson_id}")))?;

        let request = GenerationRequest {
            kind: MaterialKind::Quiz,
            subject,
            module: Some(module.clone()),
            lesson: Some(lesson.clone()),
            all_modules: Vec::new(),
            problem_count: self.config.content.questions_per_quiz,
            difficulty: DifficultyTier::Standard,
            weak_concepts: Vec::new(),
            questions_per_module: self.config.content.diagnostic_questions_per_module,
        };
        let generated = self.generator.generate(&request).await?.ok_or_else(|| {
            EngineError::Generation("model produced no usable content".to_string())
        })?;

        let material = self.persist_material(
            subject_id,
            Some(module.id.clone()),
            Some(lesson.id.clone()),
            MaterialKind::Quiz,
            generated,
        )?;
        tracing::info!(student = student_id, title = %material.title, "generated quiz");
        Ok(material)
    }

    fn build_request(
        &self,
        student_id: &str,
        assignment: &Assignment,
    ) -> Result<GenerationRequest, EngineError> {
        let subject_id = &assignment.subject_id;
        let subject = self
            .store
            .subject(subject_id)
            .ok_or_else(|| EngineError::NotFound(format!("subject {subject_id}")))?;
        let module = assignment
            .module_id
            .as_deref()
            .and_then(|id| self.store.module(id));
        let lesson = assignment
            .lesson_id
            .as_deref()
            .and_then(|id| self.store.lesson(id));

        let (kind, problem_count, difficulty, weak_concepts, all_modules) = match assignment.state {
            LearningState::NeedsDiagnostic => (
                MaterialKind::Diagnostic,
                0,
                DifficultyTier::Standard,
                Vec::new(),
                self.store.modules(subject_id),
            ),
            LearningState::LearningLesson => (
                MaterialKind::Lesson,
                0,
                DifficultyTier::Standard,
                Vec::new(),
                Vec::new(),
            ),
            LearningState::PracticeReady => (
                MaterialKind::Practice,
                self.pacer.problem_count(student_id, subject_id),
                self.pacer.difficulty_tier(student_id, subject_id),
                Vec::new(),
                Vec::new(),
            ),
            LearningState::NeedsRemediation => (
                MaterialKind::Remediation,
                self.config.content.remediation_problems,
                DifficultyTier::Easier,
                self.pacer
                    .weak_concepts(student_id, assignment.lesson_id.as_deref()),
                Vec::new(),
            ),
            LearningState::TestReady => (
                MaterialKind::Test,
                self.config.content.questions_per_test,
                DifficultyTier::Standard,
                Vec::new(),
                Vec::new(),
            ),
            state => {
                return Err(EngineError::Generation(format!(
                    "state {state:?} does not generate material"
                )))
            }
        };

        Ok(GenerationRequest {
            kind,
            subject,
            module,
            lesson,
            all_modules,
            problem_count,
            difficulty,
            weak_concepts,
            questions_per_module: self.config.content.diagnostic_questions_per_module,
        })
    }

    fn persist_material(
        &self,
        subject_id: &str,
        module_id: Option<String>,
        lesson_id: Option<String>,
        kind: MaterialKind,
        generated: GeneratedMaterial,
    ) -> Result<Material, EngineError> {
        // Tests attach to the module, diagnostics to the subject alone.
        let (module_id, lesson_id) = match kind {
            MaterialKind::Diagnostic => (None, None),
            MaterialKind::Test => (module_id, None),
            _ => (module_id, lesson_id),
        };

        let mut material = Material {
            id: Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            module_id,
            lesson_id,
            kind,
            title: generated.title,
            content: generated.content,
            answer_key: generated.answer_key,
            question_modules: generated.question_modules,
            scan_code: Uuid::new_v4().to_string(),
            file_path: None,
            created_at: Utc::now(),
        };

        material.file_path = self.renderer.render(&material)?;
        self.store.insert_material(material.clone());
        if let Some(path) = &material.file_path {
            self.store.set_material_path(&material.id, path);
        }
        Ok(material)
    }

    /// Register a scanned sheet as a pending submission.
    pub fn submit_scan(
        &self,
        student_id: &str,
        scan_code: &str,
    ) -> Result<Submission, EngineError> {
        let material = self
            .store
            .material_by_scan_code(scan_code)
            .ok_or_else(|| EngineError::NotFound(format!("no material with scan code {scan_code}")))?;
        let submission = Submission::new(student_id, &material.id);
        self.store.insert_submission(submission.clone());
        Ok(submission)
    }

    /// The single grading callback. Writes the scored submission, updates
    /// per-lesson progress and mastery, feeds the velocity tracker, and for
    /// diagnostics applies per-module bulk mastery.
    pub fn record_grade(
        &self,
        submission_id: &str,
        outcome: GradeOutcome,
    ) -> Result<Submission, EngineError> {
        let mut submission = self
            .store
            .submission(submission_id)
            .ok_or_else(|| EngineError::NotFound(format!("submission {submission_id}")))?;
        let material = self
            .store
            .material(&submission.material_id)
            .ok_or_else(|| EngineError::NotFound(format!("material {}", submission.material_id)))?;

        let mut items = outcome.items;
        grading::normalize_items(&mut items);
        let score = grading::score_items(&items);
        let mastery = score >= self.pacer.config().mastery_threshold;

        submission.score = Some(score);
        submission.graded_at = Some(Utc::now());
        submission.status = if mastery {
            SubmissionStatus::Graded
        } else {
            SubmissionStatus::NeedsRetry
        };
        submission.error_patterns = grading::aggregate_error_patterns(&items)
            .into_iter()
            .map(|(pattern, count)| crate::models::ErrorPattern {
                pattern,
                count,
                description: String::new(),
            })
            .collect();
        submission.items = items;
        self.store.update_submission(submission.clone());

        tracing::info!(
            student = %submission.student_id,
            kind = material.kind.as_str(),
            score,
            mastery,
            "graded submission"
        );

        if material.kind == MaterialKind::Diagnostic {
            let module_scores = grading::module_scores(
                &submission.items,
                material.question_modules.as_ref().unwrap_or(&Default::default()),
            );
            self.pacer.apply_diagnostic_mastery(
                &submission.student_id,
                &material.subject_id,
                &module_scores,
            );
            return Ok(submission);
        }

        if let Some(lesson_id) = &material.lesson_id {
            self.update_lesson_progress(&submission, &material, lesson_id, score, mastery);
        }
        self.pacer
            .update_velocity(&submission.student_id, &material.subject_id, score);

        Ok(submission)
    }

    fn update_lesson_progress(
        &self,
        submission: &Submission,
        material: &Material,
        lesson_id: &str,
        score: f64,
        mastery: bool,
    ) {
        let mut progress = self
            .store
            .progress(&submission.student_id, lesson_id)
            .unwrap_or_else(|| Progress::new(&submission.student_id, lesson_id));

        match material.kind {
            MaterialKind::Quiz => {
                progress.quiz_attempts += 1;
                if progress.best_quiz_score.is_none_or(|best| score > best) {
                    progress.best_quiz_score = Some(score);
                }
            }
            _ => {
                progress.practice_attempts += 1;
                if progress.best_practice_score.is_none_or(|best| score > best) {
                    progress.best_practice_score = Some(score);
                }
            }
        }

        for pattern in &submission.error_patterns {
            progress.add_error_pattern(&pattern.pattern, pattern.count);
        }

        // Mastery is monotonic and only practice-family sheets grant it.
        if mastery && material.kind.counts_toward_mastery() && !progress.mastered {
            progress.mastered = true;
            progress.mastered_at = Some(Utc::now());
        }

        self.store.upsert_progress(progress);
    }

    pub fn file_dispute(
        &self,
        submission_id: &str,
        item_number: u32,
        reason: &str,
    ) -> Result<Dispute, EngineError> {
        let submission = self
            .store
            .submission(submission_id)
            .ok_or_else(|| EngineError::NotFound(format!("submission {submission_id}")))?;
        if !submission.items.iter().any(|i| i.number == item_number) {
            return Err(EngineError::NotFound(format!(
                "submission {submission_id} has no item {item_number}"
            )));
        }
        let dispute = Dispute::new(submission_id, item_number, reason);
        self.store.insert_dispute(dispute.clone());
        Ok(dispute)
    }

    /// Approve or reject a dispute. Approval marks the item correct with
    /// full credit and recomputes the submission score from all items,
    /// then refreshes lesson progress with the corrected score.
    pub fn resolve_dispute(
        &self,
        dispute_id: &str,
        approved: bool,
        notes: Option<String>,
    ) -> Result<Dispute, EngineError> {
        let mut dispute = self
            .store
            .dispute(dispute_id)
            .ok_or_else(|| EngineError::NotFound(format!("dispute {dispute_id}")))?;

        dispute.status = if approved {
            DisputeStatus::Approved
        } else {
            DisputeStatus::Rejected
        };
        dispute.resolution_notes = notes;
        dispute.resolved_at = Some(Utc::now());
        self.store.update_dispute(dispute.clone());

        if !approved {
            return Ok(dispute);
        }

        let mut submission = self
            .store
            .submission(&dispute.submission_id)
            .ok_or_else(|| EngineError::NotFound(format!("submission {}", dispute.submission_id)))?;
        let score = grading::apply_dispute_override(&mut submission.items, dispute.item_number);
        let mastery = score >= self.pacer.config().mastery_threshold;
        submission.score = Some(score);
        submission.status = if mastery {
            SubmissionStatus::Graded
        } else {
            SubmissionStatus::NeedsRetry
        };
        self.store.update_submission(submission.clone());

        // Refresh best score and mastery only; the attempt was already
        // counted when the grade landed.
        if let Some(material) = self.store.material(&submission.material_id) {
            if let Some(lesson_id) = &material.lesson_id {
                let mut progress = self
                    .store
                    .progress(&submission.student_id, lesson_id)
                    .unwrap_or_else(|| Progress::new(&submission.student_id, lesson_id));
                if progress.best_practice_score.is_none_or(|best| score > best) {
                    progress.best_practice_score = Some(score);
                }
                if mastery && material.kind.counts_toward_mastery() && !progress.mastered {
                    progress.mastered = true;
                    progress.mastered_at = Some(Utc::now());
                }
                self.store.upsert_progress(progress);
            }
        }

        tracing::info!(
            dispute = dispute_id,
            item = dispute.item_number,
            score,
            "dispute approved, score recomputed"
        );
        Ok(dispute)
    }
}

//! Assignment derivation: one exhaustive pass from persisted facts to the
//! single next unit of work.
//!
//! The learning state is never stored; it is recomputed on every query from
//! progress, material, and submission records, so a half-finished mutation
//! can never be observed as a stale cached state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::PacingConfig;
use crate::curriculum;
use crate::error::EngineError;
use crate::models::{
    EnrollmentStatus, Lesson, Material, MaterialKind, Module, Progress, Submission,
};
use crate::store::ProgressionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LearningState {
    NeedsDiagnostic,
    LearningLesson,
    PracticeReady,
    Practicing,
    PendingGrade,
    NeedsRemediation,
    Remediating,
    MasteredLesson,
    TestReady,
    Testing,
    ModuleComplete,
    SubjectComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Generate,
    Download,
    Upload,
    Continue,
    None,
}

/// The planner's output: transient, recomputed on every query, never
/// persisted or cached across mutations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub state: LearningState,
    pub subject_id: String,
    pub module_id: Option<String>,
    pub lesson_id: Option<String>,
    pub module_number: Option<u32>,
    pub lesson_number: Option<u32>,
    pub title: String,
    pub instructions: String,
    pub action: ActionType,
    pub progress_percent: f64,
}

pub struct Planner<S> {
    store: Arc<S>,
    config: PacingConfig,
}

impl<S: ProgressionStore> Planner<S> {
    pub fn new(store: Arc<S>, config: PacingConfig) -> Self {
        Self { store, config }
    }

    /// Derive the current assignment for a (student, subject) pair.
    ///
    /// Evaluation order, first match wins: pending grade, missing
    /// diagnostic, lesson content, lesson read-flag, practice generation,
    /// practice upload, mastery / remediation loop, module test loop,
    /// subject completion.
    pub fn current_assignment(
        &self,
        student_id: &str,
        subject_id: &str,
    ) -> Result<Assignment, EngineError> {
        let modules = self.store.modules(subject_id);
        if modules.is_empty() {
            return Err(EngineError::EmptyCurriculum(format!(
                "subject {subject_id} has no modules"
            )));
        }

        let position = super::get_or_create_subject_progress(self.store.as_ref(), student_id, subject_id);
        let progress_percent = self.progress_percent(student_id, &modules);

        if position.status == EnrollmentStatus::Complete {
            return Ok(self.subject_complete(subject_id, progress_percent));
        }

        // 1. A pending submission blocks everything else.
        if !self.store.pending_submissions(student_id, subject_id).is_empty() {
            let (module, lesson) = self.current_position(&modules, &position)?;
            return Ok(self.assignment(
                LearningState::PendingGrade,
                subject_id,
                Some(module),
                Some(lesson),
                "Waiting for grading".to_string(),
                "A submitted sheet is still being graded.".to_string(),
                ActionType::None,
                progress_percent,
            ));
        }

        // 2. No diagnostic has ever been graded for this subject.
        if !self.has_graded_diagnostic(student_id, subject_id) {
            let ungraded_diagnostic = self
                .store
                .subject_materials(subject_id, MaterialKind::Diagnostic)
                .into_iter()
                .any(|m| self.latest_graded(student_id, &[m]).is_none());
            let action = if ungraded_diagnostic {
                ActionType::Upload
            } else {
                ActionType::Generate
            };
            return Ok(self.assignment(
                LearningState::NeedsDiagnostic,
                subject_id,
                None,
                None,
                "Diagnostic assessment".to_string(),
                "Complete the diagnostic to find your starting point.".to_string(),
                action,
                progress_percent,
            ));
        }

        let (module, lesson) = self.current_position(&modules, &position)?;
        let lesson_progress = self.store.progress(student_id, &lesson.id);
        let mastered = lesson_progress.as_ref().is_some_and(|p| p.mastered);

        if mastered {
            if curriculum::is_last_in_module(&modules, &lesson.id) {
                return Ok(self.module_test_phase(
                    student_id,
                    subject_id,
                    &modules,
                    module,
                    progress_percent,
                ));
            }
            // 7. Mastered mid-module: continue to the next lesson.
            return Ok(self.assignment(
                LearningState::MasteredLesson,
                subject_id,
                Some(module),
                Some(lesson),
                format!("Mastered: {}", lesson.title),
                "Great work! Continue to the next lesson.".to_string(),
                ActionType::Continue,
                progress_percent,
            ));
        }

        let materials = self.store.lesson_materials(&lesson.id);

        // 3. / 4. Lesson content: generate, then read.
        if !materials.iter().any(|m| m.kind == MaterialKind::Lesson) {
            return Ok(self.assignment(
                LearningState::LearningLesson,
                subject_id,
                Some(module),
                Some(lesson),
                format!("Learn: {}", lesson.title),
                "Generate the lesson sheet to start.".to_string(),
                ActionType::Generate,
                progress_percent,
            ));
        }
        if !lesson_progress.as_ref().is_some_and(|p| p.lesson_read) {
            return Ok(self.assignment(
                LearningState::LearningLesson,
                subject_id,
                Some(module),
                Some(lesson),
                format!("Learn: {}", lesson.title),
                "Read the lesson sheet, then mark it complete.".to_string(),
                ActionType::Download,
                progress_percent,
            ));
        }

        // 5. Practice generation with adaptive count/difficulty.
        let practice: Vec<Material> = materials
            .iter()
            .filter(|m| m.kind == MaterialKind::Practice)
            .cloned()
            .collect();
        if practice.is_empty() {
            return Ok(self.assignment(
                LearningState::PracticeReady,
                subject_id,
                Some(module),
                Some(lesson),
                format!("Practice: {}", lesson.title),
                "Generate a practice set sized to your recent pace.".to_string(),
                ActionType::Generate,
                progress_percent,
            ));
        }

        // 6.-9. Practice / remediation loop, driven by the latest graded
        // attempt across both kinds.
        let remediation: Vec<Material> = materials
            .iter()
            .filter(|m| m.kind == MaterialKind::Remediation)
            .cloned()
            .collect();
        let mut attempts = practice.clone();
        attempts.extend(remediation.iter().cloned());
        let latest = self.latest_graded(student_id, &attempts);

        let Some((_, graded)) = latest else {
            return Ok(self.assignment(
                LearningState::Practicing,
                subject_id,
                Some(module),
                Some(lesson),
                format!("Practice: {}", lesson.title),
                "Complete the practice sheet and upload your work.".to_string(),
                ActionType::Upload,
                progress_percent,
            ));
        };

        let score = graded.score.unwrap_or(0.0);
        if score >= self.config.mastery_threshold {
            // Mastery is normally recorded on the progress row when the
            // grade lands; this covers a graded submission racing the flag.
            return Ok(self.assignment(
                LearningState::MasteredLesson,
                subject_id,
                Some(module),
                Some(lesson),
                format!("Mastered: {}", lesson.title),
                "Great work! Continue to the next lesson.".to_string(),
                ActionType::Continue,
                progress_percent,
            ));
        }

        // Below mastery. A remediation sheet that has never been attempted
        // means the student still has work in hand; otherwise generate a
        // fresh one targeting current weak concepts.
        let unattempted_remediation = remediation.iter().any(|m| {
            !self
                .store
                .material_submissions(&m.id)
                .iter()
                .any(|s| s.student_id == student_id)
        });
        if unattempted_remediation {
            return Ok(self.assignment(
                LearningState::Remediating,
                subject_id,
                Some(module),
                Some(lesson),
                format!("Review: {}", lesson.title),
                "Work through the review sheet and upload it.".to_string(),
                ActionType::Upload,
                progress_percent,
            ));
        }

        Ok(self.assignment(
            LearningState::NeedsRemediation,
            subject_id,
            Some(module),
            Some(lesson),
            format!("Review: {}", lesson.title),
            "Some concepts need more practice. Generate a targeted review.".to_string(),
            ActionType::Generate,
            progress_percent,
        ))
    }

    /// Steps 10-12: the current module's lessons are all behind the student;
    /// the module test gates the boundary.
    fn module_test_phase(
        &self,
        student_id: &str,
        subject_id: &str,
        modules: &[Module],
        module: &Module,
        progress_percent: f64,
    ) -> Assignment {
        let tests = self.store.module_materials(&module.id, MaterialKind::Test);

        if tests.is_empty() {
            return self.assignment(
                LearningState::TestReady,
                subject_id,
                Some(module),
                None,
                format!("Module test: {}", module.title),
                "Generate the module test.".to_string(),
                ActionType::Generate,
                progress_percent,
            );
        }

        // A failed test regenerates, so only the newest sheet matters.
        let newest = tests.last().cloned().map(|m| vec![m]).unwrap_or_default();
        match self.latest_graded(student_id, &newest) {
            None => self.assignment(
                LearningState::Testing,
                subject_id,
                Some(module),
                None,
                format!("Module test: {}", module.title),
                "Complete the test and upload your work.".to_string(),
                ActionType::Upload,
                progress_percent,
            ),
            Some((_, submission)) => {
                let score = submission.score.unwrap_or(0.0);
                if score < self.config.mastery_threshold {
                    return self.assignment(
                        LearningState::TestReady,
                        subject_id,
                        Some(module),
                        None,
                        format!("Module test: {}", module.title),
                        "Not quite there. Generate a fresh test and try again.".to_string(),
                        ActionType::Generate,
                        progress_percent,
                    );
                }
                let is_last_module = modules.last().is_some_and(|m| m.id == module.id);
                if is_last_module {
                    self.subject_complete(subject_id, progress_percent)
                } else {
                    self.assignment(
                        LearningState::ModuleComplete,
                        subject_id,
                        Some(module),
                        None,
                        format!("Module complete: {}", module.title),
                        "Module mastered! Continue to the next module.".to_string(),
                        ActionType::Continue,
                        progress_percent,
                    )
                }
            }
        }
    }

    /// Move the position pointer forward: next lesson, next module's first
    /// lesson, or subject completion. Refuses to move past unmastered
    /// material or an unpassed module test.
    pub fn advance_to_next(
        &self,
        student_id: &str,
        subject_id: &str,
    ) -> Result<Assignment, EngineError> {
        let modules = self.store.modules(subject_id);
        if modules.is_empty() {
            return Err(EngineError::EmptyCurriculum(format!(
                "subject {subject_id} has no modules"
            )));
        }

        let mut position =
            super::get_or_create_subject_progress(self.store.as_ref(), student_id, subject_id);
        let (module, lesson) = {
            let (m, l) = self.current_position(&modules, &position)?;
            (m.clone(), l.clone())
        };

        let mastered = self
            .store
            .progress(student_id, &lesson.id)
            .is_some_and(|p| p.mastered);
        if !mastered {
            tracing::warn!(
                student = student_id,
                lesson = %lesson.title,
                "advance refused: current lesson not mastered"
            );
            return self.current_assignment(student_id, subject_id);
        }

        let crossing_module = curriculum::is_last_in_module(&modules, &lesson.id);
        if crossing_module && !self.module_test_passed(student_id, &module) {
            tracing::warn!(
                student = student_id,
                module = %module.title,
                "advance refused: module test not passed"
            );
            return self.current_assignment(student_id, subject_id);
        }

        match curriculum::next_lesson(&modules, &lesson.id) {
            Some((next_module, next_lesson)) => {
                position.current_module_id = Some(next_module.id.clone());
                position.current_lesson_id = Some(next_lesson.id.clone());
                self.store.upsert_subject_progress(position);
            }
            None => {
                position.status = EnrollmentStatus::Complete;
                self.store.upsert_subject_progress(position);
            }
        }

        self.current_assignment(student_id, subject_id)
    }

    /// Record that the student has read the lesson sheet. Idempotent;
    /// consulted only by the lesson-read derivation step.
    pub fn mark_lesson_read(&self, student_id: &str, lesson_id: &str) -> bool {
        if self.store.lesson(lesson_id).is_none() {
            return false;
        }
        let mut progress = self
            .store
            .progress(student_id, lesson_id)
            .unwrap_or_else(|| Progress::new(student_id, lesson_id));
        progress.lesson_read = true;
        self.store.upsert_progress(progress);
        true
    }

    // ---- internals ----

    fn current_position<'a>(
        &self,
        modules: &'a [Module],
        position: &crate::models::SubjectProgress,
    ) -> Result<(&'a Module, &'a Lesson), EngineError> {
        position
            .current_lesson_id
            .as_deref()
            .and_then(|id| curriculum::find_lesson(modules, id))
            .or_else(|| curriculum::first_lesson(modules))
            .ok_or_else(|| EngineError::EmptyCurriculum("curriculum has no lessons".to_string()))
    }

    fn has_graded_diagnostic(&self, student_id: &str, subject_id: &str) -> bool {
        self.store
            .subject_materials(subject_id, MaterialKind::Diagnostic)
            .iter()
            .flat_map(|m| self.store.material_submissions(&m.id))
            .any(|s| s.student_id == student_id && s.score.is_some())
    }

    fn module_test_passed(&self, student_id: &str, module: &Module) -> bool {
        let tests = self.store.module_materials(&module.id, MaterialKind::Test);
        let newest = tests.last().cloned().map(|m| vec![m]).unwrap_or_default();
        self.latest_graded(student_id, &newest)
            .is_some_and(|(_, s)| s.score.unwrap_or(0.0) >= self.config.mastery_threshold)
    }

    /// Newest graded submission by this student across the given materials,
    /// with the material it was graded against. Materials are shared between
    /// students; grades are not.
    fn latest_graded(
        &self,
        student_id: &str,
        materials: &[Material],
    ) -> Option<(Material, Submission)> {
        materials
            .iter()
            .flat_map(|m| {
                self.store
                    .material_submissions(&m.id)
                    .into_iter()
                    .filter(|s| s.student_id == student_id && s.score.is_some())
                    .map(move |s| (m.clone(), s))
            })
            .max_by_key(|(_, s)| s.graded_at)
    }

    fn progress_percent(&self, student_id: &str, modules: &[Module]) -> f64 {
        let total = curriculum::total_lessons(modules);
        if total == 0 {
            return 0.0;
        }
        let mastered = modules
            .iter()
            .flat_map(|m| m.lessons.iter())
            .filter(|lesson| {
                self.store
                    .progress(student_id, &lesson.id)
                    .is_some_and(|p| p.mastered)
            })
            .count();
        mastered as f64 / total as f64 * 100.0
    }

    #[allow(clippy::too_many_arguments)]
    fn assignment(
        &self,
        state: LearningState,
        subject_id: &str,
        module: Option<&Module>,
        lesson: Option<&Lesson>,
        title: String,
        instructions: String,
        action: ActionType,
        progress_percent: f64,
    ) -> Assignment {
        Assignment {
            state,
            subject_id: subject_id.to_string(),
            module_id: module.map(|m| m.id.clone()),
            lesson_id: lesson.map(|l| l.id.clone()),
            module_number: module.map(|m| m.number),
            lesson_number: lesson.map(|l| l.number),
            title,
            instructions,
            action,
            progress_percent,
        }
    }

    fn subject_complete(&self, subject_id: &str, progress_percent: f64) -> Assignment {
        Assignment {
            state: LearningState::SubjectComplete,
            subject_id: subject_id.to_string(),
            module_id: None,
            lesson_id: None,
            module_number: None,
            lesson_number: None,
            title: "Subject complete".to_string(),
            instructions: "Every module has been mastered. Congratulations!".to_string(),
            action: ActionType::None,
            progress_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::Utc;

    use crate::curriculum::{seed_subject, CurriculumDoc};
    use crate::models::{GradedItem, MaterialKind, ReadingConfidence, SubmissionStatus};
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
                }
            ]
        }))
        .unwrap();
        let subject = seed_subject(store.as_ref(), &doc).unwrap();
        (store, subject.id)
    }

    fn planner(store: &Arc<MemoryStore>) -> Planner<MemoryStore> {
        Planner::new(Arc::clone(store), PacingConfig::default())
    }

    fn insert_material(
        store: &MemoryStore,
        subject_id: &str,
        module_id: Option<&str>,
        lesson_id: Option<&str>,
        kind: MaterialKind,
    ) -> crate::models::Material {
        let material = crate::models::Material {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            module_id: module_id.map(str::to_string),
            lesson_id: lesson_id.map(str::to_string),
            kind,
            title: format!("{} sheet", kind.as_str()),
            content: serde_json::json!({}),
            answer_key: HashMap::new(),
            question_modules: None,
            scan_code: uuid::Uuid::new_v4().to_string(),
            file_path: None,
            created_at: Utc::now(),
        };
        store.insert_material(material.clone());
        material
    }

    fn graded_submission(store: &MemoryStore, student: &str, material_id: &str, score: f64) {
        let mut submission = crate::models::Submission::new(student, material_id);
        submission.status = if score >= 100.0 {
            SubmissionStatus::Graded
        } else {
            SubmissionStatus::NeedsRetry
        };
        submission.score = Some(score);
        submission.graded_at = Some(Utc::now());
        submission.items = vec![GradedItem {
            number: 1,
            student_answer: "4".to_string(),
            correct_answer: "4".to_string(),
            is_correct: score >= 100.0,
            partial_credit: if score >= 100.0 { 1.0 } else { 0.0 },
            confidence: ReadingConfidence::High,
            needs_review: false,
            notes: String::new(),
        }];
        store.insert_submission(submission);
    }

    fn pass_diagnostic(store: &MemoryStore, student: &str, subject_id: &str) {
        let diagnostic = insert_material(store, subject_id, None, None, MaterialKind::Diagnostic);
        graded_submission(store, student, &diagnostic.id, 40.0);
    }

    #[test]
    fn fresh_student_needs_diagnostic() {
        let (store, subject_id) = fixture();
        let planner = planner(&store);

        let assignment = planner.current_assignment("amy", &subject_id).unwrap();
        assert_eq!(assignment.state, LearningState::NeedsDiagnostic);
        assert_eq!(assignment.action, ActionType::Generate);
    }

    #[test]
    fn generated_diagnostic_waits_for_upload() {
        let (store, subject_id) = fixture();
        let planner = planner(&store);
        insert_material(&store, &subject_id, None, None, MaterialKind::Diagnostic);

        let assignment = planner.current_assignment("amy", &subject_id).unwrap();
        assert_eq!(assignment.state, LearningState::NeedsDiagnostic);
        assert_eq!(assignment.action, ActionType::Upload);
    }

    #[test]
    fn pending_submission_outranks_everything() {
        let (store, subject_id) = fixture();
        let planner = planner(&store);
        let diagnostic = insert_material(&store, &subject_id, None, None, MaterialKind::Diagnostic);
        store.insert_submission(crate::models::Submission::new("amy", &diagnostic.id));

        let assignment = planner.current_assignment("amy", &subject_id).unwrap();
        assert_eq!(assignment.state, LearningState::PendingGrade);
        assert_eq!(assignment.action, ActionType::None);
    }

    #[test]
    fn lesson_flow_generate_then_read_then_practice() {
        let (store, subject_id) = fixture();
        let planner = planner(&store);
        pass_diagnostic(&store, "amy", &subject_id);

        let assignment = planner.current_assignment("amy", &subject_id).unwrap();
        assert_eq!(assignment.state, LearningState::LearningLesson);
        assert_eq!(assignment.action, ActionType::Generate);
        let lesson_id = assignment.lesson_id.clone().unwrap();

        insert_material(&store, &subject_id, None, Some(&lesson_id), MaterialKind::Lesson);
        let assignment = planner.current_assignment("amy", &subject_id).unwrap();
        assert_eq!(assignment.state, LearningState::LearningLesson);
        assert_eq!(assignment.action, ActionType::Download);

        assert!(planner.mark_lesson_read("amy", &lesson_id));
        let assignment = planner.current_assignment("amy", &subject_id).unwrap();
        assert_eq!(assignment.state, LearningState::PracticeReady);
        assert_eq!(assignment.action, ActionType::Generate);

        insert_material(&store, &subject_id, None, Some(&lesson_id), MaterialKind::Practice);
        let assignment = planner.current_assignment("amy", &subject_id).unwrap();
        assert_eq!(assignment.state, LearningState::Practicing);
        assert_eq!(assignment.action, ActionType::Upload);
    }

    #[test]
    fn failed_practice_enters_remediation_loop() {
        let (store, subject_id) = fixture();
        let planner = planner(&store);
        pass_diagnostic(&store, "amy", &subject_id);

        let modules = store.modules(&subject_id);
        let lesson_id = modules[0].lessons[0].id.clone();
        insert_material(&store, &subject_id, None, Some(&lesson_id), MaterialKind::Lesson);
        planner.mark_lesson_read("amy", &lesson_id);
        let practice =
            insert_material(&store, &subject_id, None, Some(&lesson_id), MaterialKind::Practice);
        graded_submission(&store, "amy", &practice.id, 85.0);

        let assignment = planner.current_assignment("amy", &subject_id).unwrap();
        assert_eq!(assignment.state, LearningState::NeedsRemediation);
        assert_eq!(assignment.action, ActionType::Generate);

        let remediation =
            insert_material(&store, &subject_id, None, Some(&lesson_id), MaterialKind::Remediation);
        let assignment = planner.current_assignment("amy", &subject_id).unwrap();
        assert_eq!(assignment.state, LearningState::Remediating);
        assert_eq!(assignment.action, ActionType::Upload);

        // A failed remediation loops back to a fresh generation.
        graded_submission(&store, "amy", &remediation.id, 90.0);
        let assignment = planner.current_assignment("amy", &subject_id).unwrap();
        assert_eq!(assignment.state, LearningState::NeedsRemediation);
        assert_eq!(assignment.action, ActionType::Generate);
    }

    #[test]
    fn partial_credit_never_masters() {
        let (store, subject_id) = fixture();
        let planner = planner(&store);
        pass_diagnostic(&store, "amy", &subject_id);

        let modules = store.modules(&subject_id);
        let lesson_id = modules[0].lessons[0].id.clone();
        insert_material(&store, &subject_id, None, Some(&lesson_id), MaterialKind::Lesson);
        planner.mark_lesson_read("amy", &lesson_id);
        let practice =
            insert_material(&store, &subject_id, None, Some(&lesson_id), MaterialKind::Practice);
        graded_submission(&store, "amy", &practice.id, 99.9);

        let assignment = planner.current_assignment("amy", &subject_id).unwrap();
        assert_eq!(assignment.state, LearningState::NeedsRemediation);
    }

    #[test]
    fn graded_work_is_scoped_to_the_submitting_student() {
        let (store, subject_id) = fixture();
        let planner = planner(&store);
        pass_diagnostic(&store, "amy", &subject_id);
        pass_diagnostic(&store, "bob", &subject_id);

        let modules = store.modules(&subject_id);
        let lesson_id = modules[0].lessons[0].id.clone();
        insert_material(&store, &subject_id, None, Some(&lesson_id), MaterialKind::Lesson);
        planner.mark_lesson_read("amy", &lesson_id);
        planner.mark_lesson_read("bob", &lesson_id);

        // The practice sheet is shared; only amy has a graded submission.
        let practice =
            insert_material(&store, &subject_id, None, Some(&lesson_id), MaterialKind::Practice);
        graded_submission(&store, "amy", &practice.id, 100.0);

        let amy = planner.current_assignment("amy", &subject_id).unwrap();
        assert_eq!(amy.state, LearningState::MasteredLesson);

        let bob = planner.current_assignment("bob", &subject_id).unwrap();
        assert_eq!(bob.state, LearningState::Practicing);
        assert_eq!(bob.action, ActionType::Upload);

        // Same scoping for module tests: amy's pass does not open bob's gate.
        for lesson in &modules[0].lessons {
            for student in ["amy", "bob"] {
                let mut p = Progress::new(student, &lesson.id);
                p.mastered = true;
                p.mastered_at = Some(Utc::now());
                store.upsert_progress(p);
            }
        }
        for student in ["amy", "bob"] {
            let mut sp = store.subject_progress(student, &subject_id).unwrap();
            sp.current_module_id = Some(modules[0].id.clone());
            sp.current_lesson_id = Some(modules[0].lessons[1].id.clone());
            store.upsert_subject_progress(sp);
        }
        let test = insert_material(
            &store,
            &subject_id,
            Some(&modules[0].id),
            None,
            MaterialKind::Test,
        );
        graded_submission(&store, "amy", &test.id, 100.0);

        let amy = planner.current_assignment("amy", &subject_id).unwrap();
        assert_eq!(amy.state, LearningState::ModuleComplete);

        let bob = planner.current_assignment("bob", &subject_id).unwrap();
        assert_eq!(bob.state, LearningState::Testing, "bob still owes his own test");
    }

    #[test]
    fn advance_refuses_unmastered_lesson() {
        let (store, subject_id) = fixture();
        let planner = planner(&store);
        pass_diagnostic(&store, "amy", &subject_id);

        // First derivation lazily creates the position record.
        planner.current_assignment("amy", &subject_id).unwrap();
        let before = store.subject_progress("amy", &subject_id).unwrap();
        planner.advance_to_next("amy", &subject_id).unwrap();
        let after = store.subject_progress("amy", &subject_id).unwrap();
        assert_eq!(before.current_lesson_id, after.current_lesson_id);
    }

    #[test]
    fn mastered_last_lesson_requires_module_test() {
        let (store, subject_id) = fixture();
        let planner = planner(&store);
        pass_diagnostic(&store, "amy", &subject_id);

        let modules = store.modules(&subject_id);
        // Master both lessons of module 1 and point at the last one.
        for lesson in &modules[0].lessons {
            let mut p = Progress::new("amy", &lesson.id);
            p.mastered = true;
            p.mastered_at = Some(Utc::now());
            store.upsert_progress(p);
        }
        // First derivation lazily creates the position record.
        planner.current_assignment("amy", &subject_id).unwrap();
        let mut sp = store.subject_progress("amy", &subject_id).unwrap();
        sp.current_module_id = Some(modules[0].id.clone());
        sp.current_lesson_id = Some(modules[0].lessons[1].id.clone());
        store.upsert_subject_progress(sp);

        let assignment = planner.current_assignment("amy", &subject_id).unwrap();
        assert_eq!(assignment.state, LearningState::TestReady);
        assert_eq!(assignment.action, ActionType::Generate);

        // Advance is refused until the test is passed.
        planner.advance_to_next("amy", &subject_id).unwrap();
        let sp = store.subject_progress("amy", &subject_id).unwrap();
        assert_eq!(
            sp.current_lesson_id.as_deref(),
            Some(modules[0].lessons[1].id.as_str())
        );

        let test = insert_material(
            &store,
            &subject_id,
            Some(&modules[0].id),
            None,
            MaterialKind::Test,
        );
        let assignment = planner.current_assignment("amy", &subject_id).unwrap();
        assert_eq!(assignment.state, LearningState::Testing);

        graded_submission(&store, "amy", &test.id, 92.0);
        let assignment = planner.current_assignment("amy", &subject_id).unwrap();
        assert_eq!(assignment.state, LearningState::TestReady, "failed test regenerates");

        let retake = insert_material(
            &store,
            &subject_id,
            Some(&modules[0].id),
            None,
            MaterialKind::Test,
        );
        graded_submission(&store, "amy", &retake.id, 100.0);
        let assignment = planner.current_assignment("amy", &subject_id).unwrap();
        assert_eq!(assignment.state, LearningState::ModuleComplete);
        assert_eq!(assignment.action, ActionType::Continue);

        let assignment = planner.advance_to_next("amy", &subject_id).unwrap();
        assert_eq!(assignment.module_number, Some(2));
        assert_eq!(assignment.state, LearningState::LearningLesson);
    }
}

//! The progression engine: pacing, assignment planning, and orchestration.
//!
//! Data flows one direction: persisted facts feed the pacer's derived
//! signals, the planner turns both into a state plus an actionable
//! assignment, and the controller performs the side effects (generation,
//! rendering, persistence). The pacer and planner are synchronous and free
//! of external I/O.

pub mod controller;
pub mod pacing;
pub mod planner;
pub mod ui;

pub use controller::{AssignmentController, GradeOutcome, ProgressInfo};
pub use pacing::Pacer;
pub use planner::{ActionType, Assignment, LearningState, Planner};
pub use ui::StateUi;

use crate::curriculum;
use crate::models::SubjectProgress;
use crate::store::ProgressionStore;

/// Fetch or lazily create the per-subject progress record, seeded at the
/// subject's first module/lesson.
pub(crate) fn get_or_create_subject_progress<S: ProgressionStore>(
    store: &S,
    student_id: &str,
    subject_id: &str,
) -> SubjectProgress {
    if let Some(existing) = store.subject_progress(student_id, subject_id) {
        return existing;
    }

    let mut progress = SubjectProgress::new(student_id, subject_id);
    let modules = store.modules(subject_id);
    if let Some((module, lesson)) = curriculum::first_lesson(&modules) {
        progress.current_module_id = Some(module.id.clone());
        progress.current_lesson_id = Some(lesson.id.clone());
    }
    store.upsert_subject_progress(progress.clone());
    progress
}

//! Persistence contract used by the pacing engine, planner, and controller.
//!
//! Each trait method is one transactional call; callers never compose partial
//! writes across methods. Read-then-write flows (velocity updates, position
//! advances, diagnostic mastery) rely on the single-writer-per-(student,
//! subject) assumption rather than cross-process locking.

mod memory;

pub use memory::MemoryStore;

use std::path::Path;

use crate::models::{
    Dispute, Lesson, Material, MaterialKind, Module, Progress, Subject, SubjectProgress,
    Submission,
};

pub trait ProgressionStore: Send + Sync {
    // Curriculum (reference data, loaded once).
    fn subject(&self, subject_id: &str) -> Option<Subject>;
    fn subject_by_code(&self, code: &str) -> Option<Subject>;
    fn upsert_subject(&self, subject: Subject);
    /// Modules of a subject ordered by number, lessons ordered within each.
    fn modules(&self, subject_id: &str) -> Vec<Module>;
    fn module(&self, module_id: &str) -> Option<Module>;
    fn upsert_module(&self, module: Module);
    fn lesson(&self, lesson_id: &str) -> Option<Lesson>;

    // Per-lesson progress.
    fn progress(&self, student_id: &str, lesson_id: &str) -> Option<Progress>;
    fn upsert_progress(&self, progress: Progress);
    fn student_progress(&self, student_id: &str) -> Vec<Progress>;

    // Per-subject progress.
    fn subject_progress(&self, student_id: &str, subject_id: &str) -> Option<SubjectProgress>;
    fn upsert_subject_progress(&self, progress: SubjectProgress);

    // Materials.
    fn insert_material(&self, material: Material);
    fn set_material_path(&self, material_id: &str, path: &Path);
    fn material(&self, material_id: &str) -> Option<Material>;
    fn material_by_scan_code(&self, code: &str) -> Option<Material>;
    /// All materials for a lesson, oldest first.
    fn lesson_materials(&self, lesson_id: &str) -> Vec<Material>;
    fn module_materials(&self, module_id: &str, kind: MaterialKind) -> Vec<Material>;
    fn subject_materials(&self, subject_id: &str, kind: MaterialKind) -> Vec<Material>;

    // Submissions.
    fn insert_submission(&self, submission: Submission);
    fn update_submission(&self, submission: Submission);
    fn submission(&self, id: &str) -> Option<Submission>;
    /// Ungraded submissions by the student against materials of the subject.
    fn pending_submissions(&self, student_id: &str, subject_id: &str) -> Vec<Submission>;
    /// All submissions against a material, oldest first.
    fn material_submissions(&self, material_id: &str) -> Vec<Submission>;

    // Disputes.
    fn insert_dispute(&self, dispute: Dispute);
    fn update_dispute(&self, dispute: Dispute);
    fn dispute(&self, id: &str) -> Option<Dispute>;
    fn student_disputes(&self, student_id: &str) -> Vec<Dispute>;
}

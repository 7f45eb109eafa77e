use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;

use crate::models::{
    Dispute, Lesson, Material, MaterialKind, Module, Progress, Subject, SubjectProgress,
    Submission, SubmissionStatus,
};
use crate::store::ProgressionStore;

#[derive(Default)]
struct Tables {
    subjects: HashMap<String, Subject>,
    modules: HashMap<String, Module>,
    progress: HashMap<(String, String), Progress>,
    subject_progress: HashMap<(String, String), SubjectProgress>,
    materials: HashMap<String, Material>,
    submissions: HashMap<String, Submission>,
    disputes: HashMap<String, Dispute>,
}

/// In-memory store for tests and single-machine desktop use.
///
/// One lock around all tables gives every trait method the transactional
/// behavior the contract asks for.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressionStore for MemoryStore {
    fn subject(&self, subject_id: &str) -> Option<Subject> {
        self.tables.read().subjects.get(subject_id).cloned()
    }

    fn subject_by_code(&self, code: &str) -> Option<Subject> {
        self.tables
            .read()
            .subjects
            .values()
            .find(|s| s.code == code)
            .cloned()
    }

    fn upsert_subject(&self, subject: Subject) {
        self.tables
            .write()
            .subjects
            .insert(subject.id.clone(), subject);
    }

    fn modules(&self, subject_id: &str) -> Vec<Module> {
        let tables = self.tables.read();
        let mut modules: Vec<Module> = tables
            .modules
            .values()
            .filter(|m| m.subject_id == subject_id)
            .cloned()
            .collect();
        modules.sort_by_key(|m| m.number);
        for module in &mut modules {
            module.lessons.sort_by_key(|l| l.number);
        }
        modules
    }

    fn module(&self, module_id: &str) -> Option<Module> {
        self.tables.read().modules.get(module_id).cloned().map(|mut m| {
            m.lessons.sort_by_key(|l| l.number);
            m
        })
    }

    fn upsert_module(&self, module: Module) {
        self.tables.write().modules.insert(module.id.clone(), module);
    }

    fn lesson(&self, lesson_id: &str) -> Option<Lesson> {
        self.tables
            .read()
            .modules
            .values()
            .flat_map(|m| m.lessons.iter())
            .find(|l| l.id == lesson_id)
            .cloned()
    }

    fn progress(&self, student_id: &str, lesson_id: &str) -> Option<Progress> {
        self.tables
            .read()
            .progress
            .get(&(student_id.to_string(), lesson_id.to_string()))
            .cloned()
    }

    fn upsert_progress(&self, progress: Progress) {
        self.tables.write().progress.insert(
            (progress.student_id.clone(), progress.lesson_id.clone()),
            progress,
        );
    }

    fn student_progress(&self, student_id: &str) -> Vec<Progress> {
        self.tables
            .read()
            .progress
            .values()
            .filter(|p| p.student_id == student_id)
            .cloned()
            .collect()
    }

    fn subject_progress(&self, student_id: &str, subject_id: &str) -> Option<SubjectProgress> {
        self.tables
            .read()
            .subject_progress
            .get(&(student_id.to_string(), subject_id.to_string()))
            .cloned()
    }

    fn upsert_subject_progress(&self, progress: SubjectProgress) {
        self.tables.write().subject_progress.insert(
            (progress.student_id.clone(), progress.subject_id.clone()),
            progress,
        );
    }

    fn insert_material(&self, material: Material) {
        self.tables
            .write()
            .materials
            .insert(material.id.clone(), material);
    }

    fn set_material_path(&self, material_id: &str, path: &Path) {
        if let Some(material) = self.tables.write().materials.get_mut(material_id) {
            material.file_path = Some(path.to_path_buf());
        }
    }

    fn material(&self, material_id: &str) -> Option<Material> {
        self.tables.read().materials.get(material_id).cloned()
    }

    fn material_by_scan_code(&self, code: &str) -> Option<Material> {
        self.tables
            .read()
            .materials
            .values()
            .find(|m| m.scan_code == code)
            .cloned()
    }

    fn lesson_materials(&self, lesson_id: &str) -> Vec<Material> {
        let tables = self.tables.read();
        let mut materials: Vec<Material> = tables
            .materials
            .values()
            .filter(|m| m.lesson_id.as_deref() == Some(lesson_id))
            .cloned()
            .collect();
        materials.sort_by_key(|m| m.created_at);
        materials
    }

    fn module_materials(&self, module_id: &str, kind: MaterialKind) -> Vec<Material> {
        let tables = self.tables.read();
        let mut materials: Vec<Material> = tables
            .materials
            .values()
            .filter(|m| m.module_id.as_deref() == Some(module_id) && m.kind == kind)
            .cloned()
            .collect();
        materials.sort_by_key(|m| m.created_at);
        materials
    }

    fn subject_materials(&self, subject_id: &str, kind: MaterialKind) -> Vec<Material> {
        let tables = self.tables.read();
        let mut materials: Vec<Material> = tables
            .materials
            .values()
            .filter(|m| m.subject_id == subject_id && m.kind == kind)
            .cloned()
            .collect();
        materials.sort_by_key(|m| m.created_at);
        materials
    }

    fn insert_submission(&self, submission: Submission) {
        self.tables
            .write()
            .submissions
            .insert(submission.id.clone(), submission);
    }

    fn update_submission(&self, submission: Submission) {
        self.tables
            .write()
            .submissions
            .insert(submission.id.clone(), submission);
    }

    fn submission(&self, id: &str) -> Option<Submission> {
        self.tables.read().submissions.get(id).cloned()
    }

    fn pending_submissions(&self, student_id: &str, subject_id: &str) -> Vec<Submission> {
        let tables = self.tables.read();
        let mut pending: Vec<Submission> = tables
            .submissions
            .values()
            .filter(|s| {
                s.student_id == student_id
                    && s.status == SubmissionStatus::Pending
                    && tables
                        .materials
                        .get(&s.material_id)
                        .is_some_and(|m| m.subject_id == subject_id)
            })
            .cloned()
            .collect();
        pending.sort_by_key(|s| s.submitted_at);
        pending
    }

    fn material_submissions(&self, material_id: &str) -> Vec<Submission> {
        let tables = self.tables.read();
        let mut submissions: Vec<Submission> = tables
            .submissions
            .values()
            .filter(|s| s.material_id == material_id)
            .cloned()
            .collect();
        submissions.sort_by_key(|s| s.submitted_at);
        submissions
    }

    fn insert_dispute(&self, dispute: Dispute) {
        self.tables
            .write()
            .disputes
            .insert(dispute.id.clone(), dispute);
    }

    fn update_dispute(&self, dispute: Dispute) {
        self.tables
            .write()
            .disputes
            .insert(dispute.id.clone(), dispute);
    }

    fn dispute(&self, id: &str) -> Option<Dispute> {
        self.tables.read().disputes.get(id).cloned()
    }

    fn student_disputes(&self, student_id: &str) -> Vec<Dispute> {
        let tables = self.tables.read();
        let mut disputes: Vec<Dispute> = tables
            .disputes
            .values()
            .filter(|d| {
                tables
                    .submissions
                    .get(&d.submission_id)
                    .is_some_and(|s| s.student_id == student_id)
            })
            .cloned()
            .collect();
        disputes.sort_by_key(|d| d.created_at);
        disputes
    }
}

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ========== Curriculum ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: String,
    pub grade_level: Option<u32>,
    pub order: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub subject_id: String,
    pub number: u32,
    pub title: String,
    pub description: String,
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub module_id: String,
    pub number: u32,
    pub title: String,
    pub description: String,
    pub concepts: Vec<String>,
}

// ========== Per-lesson progress ==========

/// One record per (student, lesson), created lazily on first graded attempt.
/// `mastered` is monotonic: once true it is never reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub student_id: String,
    pub lesson_id: String,
    pub mastered: bool,
    pub mastered_at: Option<DateTime<Utc>>,
    pub lesson_read: bool,
    pub practice_attempts: u32,
    pub best_practice_score: Option<f64>,
    pub quiz_attempts: u32,
    pub best_quiz_score: Option<f64>,
    /// Concept tag -> accumulated occurrence count across graded attempts.
    pub error_patterns: HashMap<String, u32>,
}

impl Progress {
    pub fn new(student_id: &str, lesson_id: &str) -> Self {
        Self {
            student_id: student_id.to_string(),
            lesson_id: lesson_id.to_string(),
            mastered: false,
            mastered_at: None,
            lesson_read: false,
            practice_attempts: 0,
            best_practice_score: None,
            quiz_attempts: 0,
            best_quiz_score: None,
            error_patterns: HashMap::new(),
        }
    }

    pub fn add_error_pattern(&mut self, tag: &str, count: u32) {
        *self.error_patterns.entry(tag.to_string()).or_insert(0) += count;
    }
}

// ========== Per-subject progress ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum EnrollmentStatus {
    #[default]
    Active,
    Complete,
}

/// One record per (student, subject). Holds the curriculum position pointer
/// and the adaptive velocity state. `consecutive_perfect` and
/// `consecutive_struggles` are never both nonzero.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProgress {
    pub student_id: String,
    pub subject_id: String,
    pub current_module_id: Option<String>,
    pub current_lesson_id: Option<String>,
    pub velocity_score: f64,
    pub consecutive_perfect: u32,
    pub consecutive_struggles: u32,
    pub status: EnrollmentStatus,
}

impl SubjectProgress {
    pub fn new(student_id: &str, subject_id: &str) -> Self {
        Self {
            student_id: student_id.to_string(),
            subject_id: subject_id.to_string(),
            current_module_id: None,
            current_lesson_id: None,
            velocity_score: 1.0,
            consecutive_perfect: 0,
            consecutive_struggles: 0,
            status: EnrollmentStatus::Active,
        }
    }
}

// ========== Materials ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    Lesson,
    Practice,
    Quiz,
    Test,
    Diagnostic,
    Remediation,
}

impl MaterialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lesson => "lesson",
            Self::Practice => "practice",
            Self::Quiz => "quiz",
            Self::Test => "test",
            Self::Diagnostic => "diagnostic",
            Self::Remediation => "remediation",
        }
    }

    /// Kinds whose graded score counts toward lesson mastery.
    pub fn counts_toward_mastery(&self) -> bool {
        matches!(self, Self::Practice | Self::Remediation)
    }
}

/// A generated artifact tied to a lesson (or to a module for tests, or to a
/// subject for diagnostics). Immutable after creation except for the
/// recorded output file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: String,
    pub subject_id: String,
    pub module_id: Option<String>,
    pub lesson_id: Option<String>,
    pub kind: MaterialKind,
    pub title: String,
    pub content: serde_json::Value,
    /// Item number (as printed) -> expected answer.
    pub answer_key: HashMap<String, String>,
    /// Diagnostics only: global question number -> module number.
    pub question_modules: Option<HashMap<String, u32>>,
    /// Unique scan-identifiable code printed on the sheet.
    pub scan_code: String,
    pub file_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

// ========== Submissions ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum SubmissionStatus {
    #[default]
    Pending,
    Graded,
    NeedsRetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum ReadingConfidence {
    #[default]
    High,
    Medium,
    Low,
}

impl ReadingConfidence {
    pub fn needs_review(&self) -> bool {
        matches!(self, Self::Medium | Self::Low)
    }
}

/// One graded item within a submission. Low/medium reading confidence is
/// flagged for human review but still counts toward the score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedItem {
    pub number: u32,
    pub student_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub partial_credit: f64,
    pub confidence: ReadingConfidence,
    pub needs_review: bool,
    pub notes: String,
}

/// One scanned attempt against a material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub student_id: String,
    pub material_id: String,
    pub status: SubmissionStatus,
    pub score: Option<f64>,
    pub items: Vec<GradedItem>,
    pub error_patterns: Vec<ErrorPattern>,
    pub submitted_at: DateTime<Utc>,
    pub graded_at: Option<DateTime<Utc>>,
}

impl Submission {
    pub fn new(student_id: &str, material_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            material_id: material_id.to_string(),
            status: SubmissionStatus::Pending,
            score: None,
            items: Vec::new(),
            error_patterns: Vec::new(),
            submitted_at: Utc::now(),
            graded_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPattern {
    pub pattern: String,
    pub count: u32,
    pub description: String,
}

// ========== Disputes ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum DisputeStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// Explicit human correction of one graded item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispute {
    pub id: String,
    pub submission_id: String,
    pub item_number: u32,
    pub student_reason: String,
    pub status: DisputeStatus,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    pub fn new(submission_id: &str, item_number: u32, reason: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            submission_id: submission_id.to_string(),
            item_number,
            student_reason: reason.to_string(),
            status: DisputeStatus::Pending,
            resolution_notes: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }
}

// ========== Derived (transient) ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum DifficultyTier {
    Easier,
    #[default]
    Standard,
    Harder,
}

impl DifficultyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easier => "easier",
            Self::Standard => "standard",
            Self::Harder => "harder",
        }
    }
}

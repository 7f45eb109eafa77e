//! Presentation hints per learning state.
//!
//! Pure lookup table; the dashboard layer decides what to do with the
//! hints, the engine only guarantees the mapping is exhaustive.

use serde::Serialize;

use crate::progression::planner::LearningState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUi {
    pub icon: &'static str,
    pub color: &'static str,
    pub phase: &'static str,
    pub show_download: bool,
    pub show_upload: bool,
    pub show_generate: bool,
    pub show_continue: bool,
    pub show_complete_button: bool,
}

impl Default for StateUi {
    fn default() -> Self {
        Self {
            icon: "question",
            color: "gray",
            phase: "UNKNOWN",
            show_download: false,
            show_upload: false,
            show_generate: false,
            show_continue: false,
            show_complete_button: false,
        }
    }
}

impl StateUi {
    pub fn for_state(state: LearningState) -> Self {
        let base = Self::default();
        match state {
            LearningState::NeedsDiagnostic => Self {
                icon: "clipboard-list",
                color: "blue",
                phase: "ASSESSMENT",
                show_generate: true,
                ..base
            },
            LearningState::LearningLesson => Self {
                icon: "book-open",
                color: "green",
                phase: "LEARNING",
                show_download: true,
                show_complete_button: true,
                ..base
            },
            LearningState::PracticeReady => Self {
                icon: "pencil",
                color: "yellow",
                phase: "PRACTICE",
                show_generate: true,
                ..base
            },
            LearningState::Practicing => Self {
                icon: "pencil",
                color: "yellow",
                phase: "PRACTICE",
                show_download: true,
                show_upload: true,
                ..base
            },
            LearningState::PendingGrade => Self {
                icon: "clock",
                color: "gray",
                phase: "GRADING",
                ..base
            },
            LearningState::NeedsRemediation => Self {
                icon: "refresh",
                color: "orange",
                phase: "REVIEW",
                show_generate: true,
                ..base
            },
            LearningState::Remediating => Self {
                icon: "refresh",
                color: "orange",
                phase: "REVIEW",
                show_download: true,
                show_upload: true,
                ..base
            },
            LearningState::MasteredLesson => Self {
                icon: "check-circle",
                color: "green",
                phase: "COMPLETE",
                show_continue: true,
                ..base
            },
            LearningState::TestReady => Self {
                icon: "clipboard-check",
                color: "purple",
                phase: "TEST",
                show_generate: true,
                ..base
            },
            LearningState::Testing => Self {
                icon: "clipboard-check",
                color: "purple",
                phase: "TEST",
                show_download: true,
                show_upload: true,
                ..base
            },
            LearningState::ModuleComplete => Self {
                icon: "trophy",
                color: "gold",
                phase: "MODULE COMPLETE",
                show_continue: true,
                ..base
            },
            LearningState::SubjectComplete => Self {
                icon: "star",
                color: "gold",
                phase: "FINISHED!",
                ..base
            },
        }
    }
}

use serde::Serialize;

use super::{EvaluationStage, EvaluationState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelMode {
    Editable,
    NoteOnly,
    ReadOnly,
}

/// What the HR console renders for an application's evaluation form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationPanel {
    pub stage: EvaluationStage,
    pub status_label: &'static str,
    pub mode: PanelMode,
    pub decision_enabled: bool,
    pub note_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<&'static str>,
}

impl EvaluationPanel {
    pub fn for_state(state: &EvaluationState) -> Self {
        let mode = if state.locked {
            PanelMode::ReadOnly
        } else if state.note_only {
            PanelMode::NoteOnly
        } else {
            PanelMode::Editable
        };

        let notice = match mode {
            PanelMode::ReadOnly => {
                Some("This job is closed. The evaluation and note are read-only.")
            }
            PanelMode::NoteOnly => Some(
                "The result email has already been sent. The decision is final; you can still update the note.",
            ),
            PanelMode::Editable => None,
        };

        Self {
            stage: state.stage,
            status_label: state.stage.status().label(),
            mode,
            decision_enabled: mode == PanelMode::Editable,
            note_enabled: mode != PanelMode::ReadOnly,
            notice,
        }
    }
}

use crate::annotation::Canvas;
use crate::plans::PlanBoard;
use crate::questionnaire::Questionnaire;
use crate::transcript::Transcript;
use serde::{Deserialize, Serialize};

/// Everything that survives between invocations.
/// Stored as `<dir>/session.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub questionnaire: Questionnaire,
    pub transcript: Transcript,
    #[serde(default)]
    pub board: PlanBoard,
    #[serde(default)]
    pub canvas: Canvas,
}

impl SessionState {
    /// A fresh session showing the greeting and first question.
    pub fn new(pen_color: &str) -> Self {
        Self {
            questionnaire: Questionnaire::new(),
            transcript: Transcript::new(Questionnaire::greeting()),
            board: PlanBoard::default(),
            canvas: Canvas::new(pen_color),
        }
    }
}

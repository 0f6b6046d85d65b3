use serde::{Deserialize, Serialize};
use std::fmt;

// ===================================================================
// Create plan (POST /create_plan, JSON both ways)
// ===================================================================

/// One zone to lay out, with its compartments in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRequest {
    #[serde(rename = "type")]
    pub zone_type: String,
    pub compartments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePlanRequest {
    pub zones: Vec<ZoneRequest>,
}

/// A generated floor plan for a single zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedPlan {
    pub zone_type: String,
    #[serde(default)]
    pub compartments: Vec<String>,
    #[serde(default)]
    pub image_path: String,
    /// Empty while the generator is still rendering.
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub status: String,
}

impl GeneratedPlan {
    pub fn has_image(&self) -> bool {
        !self.image_url.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePlanResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<GeneratedPlan>,
    #[serde(default)]
    pub message: String,
}

// ===================================================================
// Edit plan (POST /edit, multipart in, JSON out)
// ===================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    Add,
    Modify,
    Remove,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Add => "ADD",
            ActionType::Modify => "MODIFY",
            ActionType::Remove => "REMOVE",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text fields of the edit form. The annotated image travels alongside as a
/// binary part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditPlanRequest {
    pub image_url: String,
    pub action_type: ActionType,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditPlanResponse {
    pub status: String,
    pub action_type: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub result_image_path: String,
    pub result_image_url: String,
    #[serde(default)]
    pub message: String,
}

// ===================================================================
// Health (GET /health)
// ===================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
}

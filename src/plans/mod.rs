use crate::types::{CreatePlanRequest, GeneratedPlan};
use serde::{Deserialize, Serialize};

/// Calls currently recorded as in flight. Cleared unconditionally once a
/// call returns, whatever the outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub generating: bool,
    pub editing: bool,
    pub refreshing: bool,
}

impl Activity {
    pub fn any(&self) -> bool {
        self.generating || self.editing || self.refreshing
    }

    pub fn clear(&mut self) {
        *self = Activity::default();
    }
}

/// The generated plans, the selected-plan cursor, and the bookkeeping for
/// re-fetching plans whose image wasn't ready yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanBoard {
    plans: Vec<GeneratedPlan>,
    selected: usize,
    /// The last create request that succeeded; replayed by the refresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_request: Option<CreatePlanRequest>,
    #[serde(default)]
    pub activity: Activity,
    /// Set once the current missing-image condition has triggered a refresh.
    #[serde(default)]
    refresh_fired: bool,
}

impl PlanBoard {
    pub fn plans(&self) -> &[GeneratedPlan] {
        &self.plans
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn selected_index(&self) -> Option<usize> {
        (!self.plans.is_empty()).then_some(self.selected)
    }

    pub fn selected(&self) -> Option<&GeneratedPlan> {
        self.plans.get(self.selected)
    }

    #[cfg(test)]
    pub fn last_request(&self) -> Option<&CreatePlanRequest> {
        self.last_request.as_ref()
    }

    /// Move the cursor, clamped to the available plans. Returns whether the
    /// selection actually changed.
    pub fn select(&mut self, index: usize) -> bool {
        if self.plans.is_empty() {
            return false;
        }
        let index = index.min(self.plans.len() - 1);
        let changed = index != self.selected;
        self.selected = index;
        changed
    }

    /// Install the results of a fresh generation.
    pub fn replace(&mut self, plans: Vec<GeneratedPlan>, request: CreatePlanRequest) {
        self.plans = plans;
        self.selected = 0;
        self.last_request = Some(request);
        self.refresh_fired = false;
    }

    /// Install the results of a refresh, keeping the cursor where it was
    /// when it still fits. Returns whether the cursor had to move.
    pub fn refresh(&mut self, plans: Vec<GeneratedPlan>) -> bool {
        self.plans = plans;
        let clamped = self.selected.min(self.plans.len().saturating_sub(1));
        let moved = clamped != self.selected;
        self.selected = clamped;
        if !self.has_missing_image() {
            self.refresh_fired = false;
        }
        moved
    }

    /// Point the selected plan at an edited image.
    pub fn update_selected_image(&mut self, image_url: &str, image_path: &str) -> bool {
        match self.plans.get_mut(self.selected) {
            Some(plan) => {
                plan.image_url = image_url.to_string();
                if !image_path.is_empty() {
                    plan.image_path = image_path.to_string();
                }
                true
            }
            None => false,
        }
    }

    pub fn has_missing_image(&self) -> bool {
        self.plans.iter().any(|p| !p.has_image())
    }

    /// The request to replay when a plan is still missing its image and
    /// nothing is in flight. Fires once per missing-image condition; marks
    /// the refresh as in flight when it does.
    pub fn take_refresh_request(&mut self) -> Option<CreatePlanRequest> {
        if !self.has_missing_image() {
            self.refresh_fired = false;
            return None;
        }
        if self.refresh_fired || self.activity.any() {
            return None;
        }
        let request = self.last_request.clone()?;
        self.refresh_fired = true;
        self.activity.refreshing = true;
        Some(request)
    }
}

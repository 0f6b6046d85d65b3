use crate::catalog::{ZONES, find_zone};
use serde::{Deserialize, Serialize};

// ===================================================================
// Question flow table
// ===================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Single-select from a fixed option list; auto-advances.
    Options,
    /// Multi-select from the zone catalog; advances on explicit continue.
    Zones,
}

/// One selectable answer, as attached to transcript messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl QuestionOption {
    pub fn new(label: &str, value: &str, description: &str) -> Self {
        Self {
            label: label.to_string(),
            value: value.to_string(),
            description: description.to_string(),
        }
    }

    /// Whether `input` names this option by value or label.
    pub fn matches(&self, input: &str) -> bool {
        let input = input.trim();
        self.value.eq_ignore_ascii_case(input) || self.label.eq_ignore_ascii_case(input)
    }
}

/// `(label, value, description)`
type StaticOption = (&'static str, &'static str, &'static str);

#[derive(Debug)]
pub struct QuestionDefinition {
    pub id: &'static str,
    pub prompt: &'static str,
    pub kind: QuestionKind,
    choices: &'static [StaticOption],
}

impl QuestionDefinition {
    /// The option set offered for this question. Zone questions draw theirs
    /// from the zone catalog.
    pub fn options(&self) -> Vec<QuestionOption> {
        match self.kind {
            QuestionKind::Options => self
                .choices
                .iter()
                .map(|(label, value, description)| QuestionOption::new(label, value, description))
                .collect(),
            QuestionKind::Zones => ZONES
                .iter()
                .map(|z| QuestionOption::new(z.name, z.name, z.description))
                .collect(),
        }
    }

    /// Zones are also accepted by catalog id.
    pub fn find_option(&self, input: &str) -> Option<QuestionOption> {
        match self.kind {
            QuestionKind::Options => self.options().into_iter().find(|o| o.matches(input)),
            QuestionKind::Zones => {
                find_zone(input).map(|z| QuestionOption::new(z.name, z.name, z.description))
            }
        }
    }
}

pub const ZONES_QUESTION_ID: &str = "zones";

pub static QUESTIONS: &[QuestionDefinition] = &[
    QuestionDefinition {
        id: "destination",
        prompt: "Where will your habitat be deployed?",
        kind: QuestionKind::Options,
        choices: &[
            ("Low Earth Orbit", "Low Earth Orbit", "Microgravity, frequent resupply"),
            ("Lunar Orbit", "Lunar Orbit", "Gateway-class station around the Moon"),
            ("Lunar Surface", "Lunar Surface", "One-sixth gravity, regolith shielding"),
            ("Mars Transit", "Mars Transit", "Long-duration deep space cruise"),
            ("Mars Surface", "Mars Surface", "Three-eighths gravity, thin atmosphere"),
        ],
    },
    QuestionDefinition {
        id: "crewSize",
        prompt: "How many crew members will live aboard?",
        kind: QuestionKind::Options,
        choices: &[
            ("Two", "Two", ""),
            ("Four", "Four", ""),
            ("Six", "Six", ""),
            ("Eight", "Eight", ""),
        ],
    },
    QuestionDefinition {
        id: "missionDuration",
        prompt: "How long is the mission?",
        kind: QuestionKind::Options,
        choices: &[
            ("30 Days", "30 Days", "Short sortie"),
            ("90 Days", "90 Days", "Extended stay"),
            ("180 Days", "180 Days", "Long-duration increment"),
            ("1 Year+", "1 Year+", "Permanent or semi-permanent outpost"),
        ],
    },
    QuestionDefinition {
        id: "structureType",
        prompt: "Which structure type should the habitat use?",
        kind: QuestionKind::Options,
        choices: &[
            ("Rigid", "Rigid", "Metallic pressure vessel, launched fully integrated"),
            ("Inflatable", "Inflatable", "Soft-goods shell expanded after launch"),
            ("Hybrid", "Hybrid", "Rigid core with inflatable volume"),
            ("In-situ", "In-situ", "Built from local materials"),
        ],
    },
    QuestionDefinition {
        id: "fairingSize",
        prompt: "What launch fairing diameter is available?",
        kind: QuestionKind::Options,
        choices: &[
            ("5m", "5m", "Heavy-lift class"),
            ("8.4m", "8.4m", "Super heavy-lift class"),
            ("9m", "9m", "Fully reusable super heavy-lift"),
        ],
    },
    QuestionDefinition {
        id: "priority",
        prompt: "What should the layout prioritize?",
        kind: QuestionKind::Options,
        choices: &[
            ("Volume", "Volume", "Maximize habitable volume per crew member"),
            ("Mass", "Mass", "Minimize launch mass"),
            ("Safety", "Safety", "Redundant egress and safe havens"),
            ("Comfort", "Comfort", "Privacy, windows and psychological wellbeing"),
        ],
    },
    QuestionDefinition {
        id: ZONES_QUESTION_ID,
        prompt: "Select up to 6 zones for your habitat, then continue.",
        kind: QuestionKind::Zones,
        choices: &[],
    },
];

/// Option set for the per-zone interface count prompt.
pub fn interface_count_options() -> Vec<QuestionOption> {
    ["1", "2", "3"]
        .iter()
        .map(|n| QuestionOption::new(n, n, ""))
        .collect()
}

/// Actions offered on the summary.
pub fn summary_options() -> Vec<QuestionOption> {
    vec![
        QuestionOption::new("Generate floor plans", "finalize", "Send the design to the generator"),
        QuestionOption::new("Start over", "modify", "Clear all answers and begin again"),
    ]
}

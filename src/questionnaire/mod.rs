use crate::catalog::MAX_SELECTED_ZONES;
use crate::questions::{QUESTIONS, QuestionKind, interface_count_options, summary_options};
use crate::transcript::{ChatMessage, GREETING};
use crate::types::{CreatePlanRequest, ZoneRequest};
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};

pub const FINALIZE: &str = "finalize";
pub const MODIFY: &str = "modify";

/// Summary template used when preferences don't override it.
pub const DEFAULT_SUMMARY_TEMPLATE: &str = r#"Here's a summary of your habitat design:
Destination: {{ answers.destination or "not set" }}
Crew size: {{ answers.crew_size or "not set" }}
Mission duration: {{ answers.mission_duration or "not set" }}
Structure type: {{ answers.structure_type or "not set" }}
Fairing size: {{ answers.fairing_size or "not set" }}
Priority: {{ answers.priority or "not set" }}
Zones:
{%- for zone in answers.zone_configurations %}
  {{ zone.zone_name }} ({{ zone.interface_count }}): {{ zone.separation_names | join(", ") }}
{%- else %} none selected
{%- endfor %}"#;

// ===================================================================
// State
// ===================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZonePhase {
    AskCount,
    AskNames,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Index into the question flow table.
    Question { index: usize },
    /// Index into `selected_zones`.
    ZoneConfig { zone: usize, phase: ZonePhase },
    Summary,
    /// Terminal while the create request is outstanding.
    Generating,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfiguration {
    pub zone_name: String,
    pub interface_count: u8,
    #[serde(default)]
    pub separation_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answers {
    pub destination: Option<String>,
    pub crew_size: Option<String>,
    pub mission_duration: Option<String>,
    pub structure_type: Option<String>,
    pub fairing_size: Option<String>,
    pub priority: Option<String>,
    /// Ordered set, at most `MAX_SELECTED_ZONES` entries.
    #[serde(default)]
    pub selected_zones: Vec<String>,
    /// One per selected zone, in selection order, appended as each zone's
    /// interface count is answered.
    #[serde(default)]
    pub zone_configurations: Vec<ZoneConfiguration>,
}

impl Answers {
    /// Record an answer under its question id. Unknown ids are ignored.
    fn record(&mut self, question_id: &str, value: String) {
        let slot = match question_id {
            "destination" => &mut self.destination,
            "crewSize" => &mut self.crew_size,
            "missionDuration" => &mut self.mission_duration,
            "structureType" => &mut self.structure_type,
            "fairingSize" => &mut self.fairing_size,
            "priority" => &mut self.priority,
            other => {
                log::warn!("no answer slot for question {other:?}");
                return;
            }
        };
        *slot = Some(value);
    }
}

/// The questionnaire: current step, accumulated answers, and the pending
/// transition (if any) that will complete on the next `Settle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Questionnaire {
    step: Step,
    answers: Answers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    advancing: Option<Step>,
}

impl Default for Questionnaire {
    fn default() -> Self {
        Self {
            step: Step::Question { index: 0 },
            answers: Answers::default(),
            advancing: None,
        }
    }
}

// ===================================================================
// Input / output of the reducer
// ===================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Pick an option (answer, zone toggle, interface count, summary action).
    Select(String),
    /// Leave zone selection.
    Continue,
    SubmitNames(Vec<String>),
    Finalize,
    Modify,
    /// The readability delay after an accepted input has elapsed.
    Settle,
    /// The create request failed for good.
    GenerationFailed,
}

/// What the caller should do with the transcript after a reduction.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Nothing changed.
    Ignored { reason: String },
    /// State changed without any new messages (zone toggles).
    Updated,
    /// Validation failed; show `message`, state unchanged.
    Rejected { message: String },
    Advanced { messages: Vec<ChatMessage> },
    /// Append `messages`, then send `request`.
    Generate {
        messages: Vec<ChatMessage>,
        request: CreatePlanRequest,
    },
    /// Replace the transcript with `greeting`.
    Reset { greeting: ChatMessage },
}

pub struct FlowContext<'a> {
    pub summary_template: &'a str,
}

impl Default for FlowContext<'static> {
    fn default() -> Self {
        Self {
            summary_template: DEFAULT_SUMMARY_TEMPLATE,
        }
    }
}

fn ignored(reason: String) -> Outcome {
    log::debug!("ignored input: {reason}");
    Outcome::Ignored { reason }
}

// ===================================================================
// Reducer
// ===================================================================

impl Questionnaire {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_step(&self) -> Step {
        self.step
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    pub fn is_advancing(&self) -> bool {
        self.advancing.is_some()
    }

    /// The opening message: the welcome text plus the first question.
    pub fn greeting() -> ChatMessage {
        let first = &QUESTIONS[0];
        ChatMessage::options(format!("{GREETING}\n\n{}", first.prompt), first.options())
    }

    /// Assemble the create request from the configured zones.
    pub fn create_request(&self) -> CreatePlanRequest {
        CreatePlanRequest {
            zones: self
                .answers
                .zone_configurations
                .iter()
                .map(|z| ZoneRequest {
                    zone_type: z.zone_name.clone(),
                    compartments: z.separation_names.clone(),
                })
                .collect(),
        }
    }

    /// Pure transition: returns the next state and what to do about it.
    /// Never fails; inputs that don't apply are reported as `Ignored`.
    pub fn reduce(&self, input: Input, ctx: &FlowContext) -> (Questionnaire, Outcome) {
        let mut next = self.clone();
        let outcome = next.apply(input, ctx);
        (next, outcome)
    }

    fn apply(&mut self, input: Input, ctx: &FlowContext) -> Outcome {
        match input {
            Input::Modify => return self.reset(),
            Input::Settle => return self.settle(ctx),
            _ => {}
        }

        if let Some(target) = self.advancing {
            return ignored(format!("still advancing to {target:?}"));
        }

        match (self.step, input) {
            (Step::Question { index }, Input::Select(value)) => self.select_answer(index, &value),
            (Step::Question { index }, Input::Continue) => self.leave_zone_selection(index),
            (
                Step::ZoneConfig {
                    zone,
                    phase: ZonePhase::AskCount,
                },
                Input::Select(value),
            ) => self.select_interface_count(zone, &value),
            (
                Step::ZoneConfig {
                    zone,
                    phase: ZonePhase::AskNames,
                },
                Input::SubmitNames(names),
            ) => self.submit_names(zone, names),
            (Step::Summary, Input::Finalize) => self.finalize(),
            (Step::Summary, Input::Select(value)) => {
                if value.trim().eq_ignore_ascii_case(FINALIZE) {
                    self.finalize()
                } else if value.trim().eq_ignore_ascii_case(MODIFY) {
                    self.reset()
                } else {
                    ignored(format!("{value:?} is not a summary action"))
                }
            }
            (Step::Generating, Input::GenerationFailed) => {
                self.step = Step::Summary;
                Outcome::Advanced {
                    messages: vec![self.summary_message(ctx)],
                }
            }
            (step, input) => ignored(format!("{input:?} does not apply at {step:?}")),
        }
    }

    fn select_answer(&mut self, index: usize, value: &str) -> Outcome {
        let Some(question) = QUESTIONS.get(index) else {
            return ignored(format!("question index {index} out of range"));
        };
        let Some(option) = question.find_option(value) else {
            return ignored(format!("{value:?} is not an option for {}", question.id));
        };

        match question.kind {
            QuestionKind::Zones => self.toggle_zone(option.value),
            QuestionKind::Options => {
                self.answers.record(question.id, option.value);
                self.advancing = Some(if index + 1 < QUESTIONS.len() {
                    Step::Question { index: index + 1 }
                } else {
                    Step::Summary
                });
                Outcome::Advanced {
                    messages: vec![ChatMessage::user(option.label)],
                }
            }
        }
    }

    fn toggle_zone(&mut self, zone: String) -> Outcome {
        let selected = &mut self.answers.selected_zones;
        if let Some(pos) = selected.iter().position(|z| *z == zone) {
            selected.remove(pos);
            Outcome::Updated
        } else if selected.len() >= MAX_SELECTED_ZONES {
            ignored(format!(
                "already {MAX_SELECTED_ZONES} zones selected; {zone} not added"
            ))
        } else {
            selected.push(zone);
            Outcome::Updated
        }
    }

    fn leave_zone_selection(&mut self, index: usize) -> Outcome {
        if QUESTIONS.get(index).map(|q| q.kind) != Some(QuestionKind::Zones) {
            return ignored(format!("continue only applies to zone selection, at question {index}"));
        }
        let selected = &self.answers.selected_zones;
        let (echo, target) = if selected.is_empty() {
            ("Continue without zones".to_string(), Step::Summary)
        } else {
            (
                format!("Selected zones: {}", selected.join(", ")),
                Step::ZoneConfig {
                    zone: 0,
                    phase: ZonePhase::AskCount,
                },
            )
        };
        self.advancing = Some(target);
        Outcome::Advanced {
            messages: vec![ChatMessage::user(echo)],
        }
    }

    fn select_interface_count(&mut self, zone: usize, value: &str) -> Outcome {
        let count = match value.trim().parse::<u8>() {
            Ok(n @ 1..=3) => n,
            _ => return ignored(format!("{value:?} is not an interface count (1-3)")),
        };
        let Some(zone_name) = self.answers.selected_zones.get(zone).cloned() else {
            return ignored(format!("zone index {zone} out of range"));
        };
        if self.answers.zone_configurations.len() != zone {
            return ignored(format!("zone {zone_name} already configured"));
        }

        self.answers.zone_configurations.push(ZoneConfiguration {
            zone_name,
            interface_count: count,
            separation_names: Vec::new(),
        });
        self.advancing = Some(Step::ZoneConfig {
            zone,
            phase: ZonePhase::AskNames,
        });
        Outcome::Advanced {
            messages: vec![ChatMessage::user(count.to_string())],
        }
    }

    fn submit_names(&mut self, zone: usize, names: Vec<String>) -> Outcome {
        let zone_count = self.answers.selected_zones.len();
        let Some(config) = self.answers.zone_configurations.get_mut(zone) else {
            return ignored(format!("zone {zone} has no configuration yet"));
        };

        let names: Vec<String> = names.iter().map(|n| n.trim().to_string()).collect();
        let expected = usize::from(config.interface_count);
        if names.len() != expected {
            return Outcome::Rejected {
                message: format!(
                    "Please enter exactly {expected} compartment name(s) for {} (got {}).",
                    config.zone_name,
                    names.len()
                ),
            };
        }
        if names.iter().any(String::is_empty) {
            return Outcome::Rejected {
                message: format!("Compartment names for {} cannot be blank.", config.zone_name),
            };
        }

        let echo = names.join(", ");
        config.separation_names = names;
        self.advancing = Some(if zone + 1 < zone_count {
            Step::ZoneConfig {
                zone: zone + 1,
                phase: ZonePhase::AskCount,
            }
        } else {
            Step::Summary
        });
        Outcome::Advanced {
            messages: vec![ChatMessage::user(echo)],
        }
    }

    fn finalize(&mut self) -> Outcome {
        let request = self.create_request();
        self.step = Step::Generating;
        let data = serde_json::to_value(&request).unwrap_or_default();
        Outcome::Generate {
            messages: vec![
                ChatMessage::user("Generate floor plans"),
                ChatMessage::api_request("Sending your design to the floor plan generator...", data),
            ],
            request,
        }
    }

    fn reset(&mut self) -> Outcome {
        *self = Questionnaire::new();
        Outcome::Reset {
            greeting: Self::greeting(),
        }
    }

    fn settle(&mut self, ctx: &FlowContext) -> Outcome {
        let Some(target) = self.advancing.take() else {
            return ignored("nothing to settle".to_string());
        };
        self.step = target;
        Outcome::Advanced {
            messages: vec![self.prompt_for(target, ctx)],
        }
    }

    // ---------------------------------------------------------------
    // Prompts
    // ---------------------------------------------------------------

    fn prompt_for(&self, step: Step, ctx: &FlowContext) -> ChatMessage {
        match step {
            Step::Question { index } => match QUESTIONS.get(index) {
                Some(q) if q.kind == QuestionKind::Zones => ChatMessage::zones(q.prompt, q.options()),
                Some(q) => ChatMessage::options(q.prompt, q.options()),
                None => self.summary_message(ctx),
            },
            Step::ZoneConfig { zone, phase } => {
                let name = self
                    .answers
                    .selected_zones
                    .get(zone)
                    .map(String::as_str)
                    .unwrap_or("this");
                match phase {
                    ZonePhase::AskCount => ChatMessage::options(
                        format!("How many interfaces (compartments) should the {name} zone have?"),
                        interface_count_options(),
                    ),
                    ZonePhase::AskNames => {
                        let count = self
                            .answers
                            .zone_configurations
                            .get(zone)
                            .map(|c| c.interface_count)
                            .unwrap_or(1);
                        ChatMessage::separation_names(
                            format!("Name the {count} compartment(s) of the {name} zone."),
                            name,
                            count,
                        )
                    }
                }
            }
            Step::Summary => self.summary_message(ctx),
            Step::Generating => ChatMessage::assistant("Generating your floor plans..."),
        }
    }

    fn summary_message(&self, ctx: &FlowContext) -> ChatMessage {
        ChatMessage::options(
            render_summary(ctx.summary_template, &self.answers),
            summary_options(),
        )
    }
}

/// Render the answers through the summary template, falling back to a plain
/// listing when the template is broken.
pub fn render_summary(template: &str, answers: &Answers) -> String {
    let env = Environment::new();
    let rendered = env
        .template_from_str(template)
        .and_then(|tmpl| tmpl.render(context! { answers }));
    match rendered {
        Ok(text) => text,
        Err(err) => {
            log::warn!("summary template failed, using plain summary: {err}");
            plain_summary(answers)
        }
    }
}

fn plain_summary(answers: &Answers) -> String {
    let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "not set".into());
    let mut lines = vec![
        "Here's a summary of your habitat design:".to_string(),
        format!("Destination: {}", field(&answers.destination)),
        format!("Crew size: {}", field(&answers.crew_size)),
        format!("Mission duration: {}", field(&answers.mission_duration)),
        format!("Structure type: {}", field(&answers.structure_type)),
        format!("Fairing size: {}", field(&answers.fairing_size)),
        format!("Priority: {}", field(&answers.priority)),
    ];
    for zone in &answers.zone_configurations {
        lines.push(format!(
            "  {} ({}): {}",
            zone.zone_name,
            zone.interface_count,
            zone.separation_names.join(", ")
        ));
    }
    lines.join("\n")
}

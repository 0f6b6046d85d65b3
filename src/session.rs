use crate::annotation::{self, Overlay, Tool};
use crate::catalog::{MAX_SELECTED_ZONES, ZONES};
use crate::client::{ApiClient, ApiError, ReferenceImage};
use crate::metadata::SessionState;
use crate::preferences::Preferences;
use crate::questionnaire::{FlowContext, Input, Outcome, Step};
use crate::retry::{RetryPolicy, TokioSleeper, with_retry};
use crate::transcript::ChatMessage;
use crate::types::{ActionType, CreatePlanRequest, EditPlanRequest};
use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const STATE_FILENAME: &str = "session.json";

/// Read and deserialize a JSON file, returning `None` if it doesn't exist.
fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path) {
        Ok(s) => {
            let val = serde_json::from_str(&s)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(Some(val))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

/// What a reduction asks of the shell beyond updating the transcript.
enum Effect {
    None,
    Note(String),
    Send(CreatePlanRequest),
}

pub struct Session {
    dir: PathBuf,
    pub prefs: Preferences,
    state: SessionState,
    client: ApiClient,
    summary_template: String,
    /// Transcript index from which messages are new to this invocation.
    start: usize,
}

impl Session {
    /// Ensure the state directory exists, load preferences and any saved
    /// session, and return a `Session` ready for use.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let prefs = Preferences::load(dir)?;
        let client = ApiClient::new(&prefs.api_base_url, prefs.request_timeout())?;
        let summary_template = prefs.summary_template.source(dir);

        let (mut state, start) = match read_json_file::<SessionState>(&dir.join(STATE_FILENAME))? {
            Some(state) => {
                let len = state.transcript.len();
                (state, len)
            }
            None => {
                log::info!("starting a new session in {}", dir.display());
                (SessionState::new(&prefs.pen_color), 0)
            }
        };
        state.canvas.set_color(&prefs.pen_color);

        Ok(Self {
            dir: dir.to_path_buf(),
            prefs,
            state,
            client,
            summary_template,
            start,
        })
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILENAME)
    }

    pub fn save(&self) -> Result<()> {
        let path = self.state_path();
        let json =
            serde_json::to_string_pretty(&self.state).context("serializing session state")?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))
    }

    /// Transcript messages added during this invocation, rendered.
    pub fn new_messages(&self) -> String {
        self.state.transcript.render_from(self.start)
    }

    // ---------------------------------------------------------------
    // Questionnaire plumbing
    // ---------------------------------------------------------------

    /// Run one input through the reducer and apply its transcript effects.
    fn reduce(&mut self, input: Input) -> Effect {
        let ctx = FlowContext {
            summary_template: &self.summary_template,
        };
        let (next, outcome) = self.state.questionnaire.reduce(input, &ctx);
        self.state.questionnaire = next;

        match outcome {
            Outcome::Ignored { reason } => Effect::Note(format!("(ignored: {reason})")),
            Outcome::Updated => Effect::Note(self.zone_selection_note()),
            Outcome::Rejected { message } => {
                self.state.transcript.push(ChatMessage::assistant(message));
                Effect::None
            }
            Outcome::Advanced { messages } => {
                self.state.transcript.extend(messages);
                Effect::None
            }
            Outcome::Generate { messages, request } => {
                self.state.transcript.extend(messages);
                Effect::Send(request)
            }
            Outcome::Reset { greeting } => {
                self.state.transcript.reset(greeting);
                self.start = 0;
                Effect::None
            }
        }
    }

    /// Feed `input`, then settle the transition it started (if any).
    async fn drive(&mut self, input: Input) -> Result<Option<String>> {
        let note = match self.reduce(input) {
            Effect::None => None,
            Effect::Note(note) => Some(note),
            Effect::Send(request) => {
                self.generate(request).await?;
                None
            }
        };
        if self.state.questionnaire.is_advancing() {
            self.reduce(Input::Settle);
        }
        Ok(note)
    }

    fn zone_selection_note(&self) -> String {
        let selected = &self.state.questionnaire.answers().selected_zones;
        if selected.is_empty() {
            "No zones selected. Run `continue` to skip zone configuration.".into()
        } else {
            format!(
                "Selected zones ({}/{MAX_SELECTED_ZONES}): {}. Run `continue` when done.",
                selected.len(),
                selected.join(", ")
            )
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.state.board.activity.any() {
            bail!("a request is already in flight; run `modify` to discard it if it was interrupted");
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Network calls
    // ---------------------------------------------------------------

    async fn generate(&mut self, request: CreatePlanRequest) -> Result<()> {
        self.ensure_idle()?;
        self.state.board.activity.generating = true;
        self.save()?;

        let result = with_retry(
            self.prefs.retry_policy(),
            &mut TokioSleeper,
            &mut self.state.transcript,
            ApiError::is_retryable,
            |_| self.client.create_plan(&request),
        )
        .await;
        self.state.board.activity.clear();

        match result {
            Ok(response) => {
                let count = response.results.len();
                let message = if count == 0 {
                    format!("The generator returned no floor plans. {}", response.message)
                } else {
                    format!(
                        "Generated {count} floor plan(s). Run `plans` to list them, then `draw` and `apply` to edit one."
                    )
                };
                self.state.transcript.push(ChatMessage::assistant(message.trim_end()));
                self.state.board.replace(response.results, request);
                self.state.canvas.reset();
                self.recover_missing_images().await;
                Ok(())
            }
            Err(failure) => {
                self.state.transcript.push(ChatMessage::assistant(format!(
                    "Sorry, generating floor plans failed after {} attempt(s): {}",
                    failure.attempts, failure.error
                )));
                self.reduce(Input::GenerationFailed);
                Err(anyhow::Error::new(failure).context("generating floor plans"))
            }
        }
    }

    /// Re-send the last create request once when a plan came back without
    /// an image. Failures are logged, never surfaced.
    async fn recover_missing_images(&mut self) {
        let Some(request) = self.state.board.take_refresh_request() else {
            return;
        };
        log::info!("a floor plan has no image yet; refreshing once");

        let result = with_retry(
            RetryPolicy::single_attempt(),
            &mut TokioSleeper,
            &mut self.state.transcript,
            ApiError::is_retryable,
            |_| self.client.create_plan(&request),
        )
        .await;
        self.state.board.activity.clear();

        match result {
            Ok(response) => {
                if self.state.board.refresh(response.results) {
                    self.state.canvas.reset();
                }
            }
            Err(failure) => log::warn!("image refresh {failure}: {}", failure.error),
        }
    }

    // ---------------------------------------------------------------
    // Command handlers
    // ---------------------------------------------------------------

    /// Print the whole conversation.
    pub fn handle_show(&mut self) -> Result<Option<String>> {
        self.start = 0;
        Ok(None)
    }

    pub async fn handle_answer(&mut self, value: &str) -> Result<Option<String>> {
        let choice = self.state.transcript.resolve_choice(value);
        self.drive(Input::Select(choice)).await
    }

    pub async fn handle_continue(&mut self) -> Result<Option<String>> {
        self.drive(Input::Continue).await
    }

    pub async fn handle_names(&mut self, names: Vec<String>) -> Result<Option<String>> {
        self.drive(Input::SubmitNames(names)).await
    }

    pub async fn handle_finalize(&mut self, dry_run: bool) -> Result<Option<String>> {
        if dry_run {
            let request = self.state.questionnaire.create_request();
            let json = serde_json::to_string_pretty(&request).context("serializing request")?;
            return Ok(Some(json));
        }
        if self.state.questionnaire.current_step() == Step::Summary {
            self.ensure_idle()?;
        }
        self.drive(Input::Finalize).await
    }

    pub async fn handle_modify(&mut self) -> Result<Option<String>> {
        self.state.board.activity.clear();
        self.drive(Input::Modify).await
    }

    pub fn handle_zones(&self) -> Result<Option<String>> {
        let selected = &self.state.questionnaire.answers().selected_zones;
        let lines: Vec<String> = ZONES
            .iter()
            .map(|z| {
                let mark = if selected.iter().any(|s| s == z.name) { "*" } else { " " };
                format!("{mark} {:<12} [{}] {}", z.name, z.icon, z.description)
            })
            .collect();
        Ok(Some(lines.join("\n")))
    }

    pub async fn handle_plans(&mut self) -> Result<Option<String>> {
        self.recover_missing_images().await;
        let board = &self.state.board;
        if board.is_empty() {
            return Ok(Some("No floor plans yet. Finish the questionnaire and run `finalize`.".into()));
        }
        let lines: Vec<String> = board
            .plans()
            .iter()
            .enumerate()
            .map(|(i, plan)| {
                let cursor = if board.selected_index() == Some(i) { ">" } else { " " };
                let image = if plan.has_image() {
                    self.client.resolve_url(&plan.image_url)
                } else {
                    "(image pending)".into()
                };
                format!(
                    "{cursor} [{i}] {} ({}): {image}",
                    plan.zone_type,
                    plan.compartments.join(", ")
                )
            })
            .collect();
        Ok(Some(lines.join("\n")))
    }

    pub fn handle_select(&mut self, index: usize) -> Result<Option<String>> {
        if self.state.board.is_empty() {
            bail!("no floor plans to select; run `finalize` first");
        }
        if self.state.board.select(index) {
            self.state.canvas.reset();
        }
        let plan = self
            .state
            .board
            .selected()
            .context("selected plan out of range")?;
        Ok(Some(format!(
            "Selected plan {}: {}",
            self.state.board.selected_index().unwrap_or_default(),
            plan.zone_type
        )))
    }

    // ---------------------------------------------------------------
    // Annotation
    // ---------------------------------------------------------------

    /// Check there is a plan to draw on and bring the overlay up to date.
    fn prepare_canvas(&mut self, overlay: Option<Overlay>) -> Result<()> {
        let plan = self
            .state
            .board
            .selected()
            .context("no floor plan selected; run `finalize` and `plans` first")?;
        if !plan.has_image() {
            bail!("the selected floor plan has no image yet; run `plans` to refresh");
        }
        match overlay {
            Some(overlay) => self.state.canvas.set_overlay(overlay),
            None if self.state.canvas.overlay().is_none() => {
                bail!("pass --display WxH with the displayed size of the image")
            }
            None => {}
        }
        Ok(())
    }

    pub fn handle_draw_pen(
        &mut self,
        points: &[(f32, f32)],
        overlay: Option<Overlay>,
    ) -> Result<Option<String>> {
        self.prepare_canvas(overlay)?;
        let canvas = &mut self.state.canvas;
        canvas.arm(Tool::DrawingPen);
        let Some((&(x, y), rest)) = points.split_first() else {
            return Ok(Some("No points given; nothing drawn.".into()));
        };
        if !canvas.pointer_down(x, y) {
            return Ok(Some("The stroke starts outside the image; nothing drawn.".into()));
        }
        // Leaving the image ends the stroke, as lifting the pen does.
        match rest.iter().position(|&(x, y)| !canvas.pointer_move(x, y)) {
            Some(left_at) => {
                canvas.pointer_leave();
                log::info!(
                    "stroke left the image; {} later point(s) dropped",
                    rest.len() - left_at
                );
            }
            None => canvas.pointer_up(),
        }
        Ok(Some(self.drawings_note()))
    }

    pub fn handle_draw_circle(
        &mut self,
        (x, y): (f32, f32),
        overlay: Option<Overlay>,
    ) -> Result<Option<String>> {
        self.prepare_canvas(overlay)?;
        let canvas = &mut self.state.canvas;
        canvas.arm(Tool::DrawingCircle);
        if !canvas.pointer_down(x, y) {
            return Ok(Some("That point is outside the image; nothing drawn.".into()));
        }
        canvas.pointer_up();
        Ok(Some(self.drawings_note()))
    }

    pub fn handle_draw_clear(&mut self) -> Result<Option<String>> {
        self.state.canvas.reset();
        Ok(Some("Marks cleared.".into()))
    }

    fn drawings_note(&self) -> String {
        format!(
            "{} mark(s) on the selected plan. Run `apply` to send them as an edit.",
            self.state.canvas.drawings().len()
        )
    }

    pub async fn handle_apply(
        &mut self,
        action: ActionType,
        prompt: &str,
        reference: Option<&Path>,
    ) -> Result<Option<String>> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            bail!("describe the edit with --prompt");
        }
        if !self.state.canvas.can_apply() {
            bail!("nothing is drawn on the selected plan; mark it with `draw` first");
        }
        self.ensure_idle()?;
        let plan = self
            .state
            .board
            .selected()
            .cloned()
            .context("no floor plan selected")?;
        let overlay = self
            .state
            .canvas
            .overlay()
            .context("the canvas has no display size")?;
        let reference = reference.map(ReferenceImage::load).transpose()?;

        let bytes = self
            .client
            .fetch_image(&plan.image_url)
            .await
            .context("fetching the floor plan image")?;
        let native = image::load_from_memory(&bytes).context("decoding the floor plan image")?;
        let composed = annotation::composite(
            &native,
            &overlay,
            self.state.canvas.drawings(),
            &self.prefs.stroke_style(),
        );
        let png = annotation::encode_png(&composed).context("encoding the annotated image")?;

        let request = EditPlanRequest {
            image_url: plan.image_url.clone(),
            action_type: action,
            prompt: prompt.to_string(),
        };
        self.state
            .transcript
            .push(ChatMessage::user(format!("{action} on {}: {prompt}", plan.zone_type)));
        self.state.board.activity.editing = true;
        self.save()?;

        let result = with_retry(
            self.prefs.retry_policy(),
            &mut TokioSleeper,
            &mut self.state.transcript,
            ApiError::is_retryable,
            |_| self.client.edit_plan(&request, &png, reference.as_ref()),
        )
        .await;
        self.state.board.activity.clear();

        match result {
            Ok(response) if response.result_image_url.trim().is_empty() => {
                self.state.transcript.push(ChatMessage::assistant(format!(
                    "The edit finished without a new image. {}",
                    response.message
                )));
                Ok(None)
            }
            Ok(response) => {
                self.state
                    .board
                    .update_selected_image(&response.result_image_url, &response.result_image_path);
                self.state.canvas.reset();
                self.state.transcript.push(ChatMessage::assistant(format!(
                    "Edit applied to the {} plan: {}",
                    plan.zone_type,
                    self.client.resolve_url(&response.result_image_url)
                )));
                Ok(None)
            }
            Err(failure) => {
                self.state.transcript.push(ChatMessage::assistant(format!(
                    "Sorry, the edit failed after {} attempt(s): {}",
                    failure.attempts, failure.error
                )));
                Err(anyhow::Error::new(failure).context("applying edit"))
            }
        }
    }

    // ---------------------------------------------------------------
    // Service utilities
    // ---------------------------------------------------------------

    pub async fn handle_health(&self) -> Result<Option<String>> {
        let health = self.client.health().await?;
        let mut line = format!("{}: {}", self.client.base_url(), health.status);
        if !health.message.is_empty() {
            line.push_str(&format!(" ({})", health.message));
        }
        if !health.timestamp.is_empty() {
            line.push_str(&format!(" at {}", health.timestamp));
        }
        Ok(Some(line))
    }

    pub async fn handle_download(&self, filename: &str, out: Option<&Path>) -> Result<Option<String>> {
        let bytes = self.client.download(filename).await?;
        let out = match out {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(
                Path::new(filename)
                    .file_name()
                    .context("download name has no file component")?,
            ),
        };
        fs::write(&out, &bytes).with_context(|| format!("writing {}", out.display()))?;
        Ok(Some(format!("Saved {} bytes to {}", bytes.len(), out.display())))
    }
}

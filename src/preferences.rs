use crate::annotation::{DEFAULT_COLOR, StrokeStyle, parse_color};
use crate::client::DEFAULT_BASE_URL;
use crate::questionnaire::DEFAULT_SUMMARY_TEMPLATE;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

const FILENAME: &str = "habitat-planner.toml";

/// Summary template: either an inline minijinja string or a path to a
/// template file (relative to the state directory).
///
/// In TOML this looks like one of:
///
/// ```toml
/// [summary_template]
/// inline = "Going to {{ answers.destination }}"
///
/// # or
///
/// [summary_template]
/// file = "summary.tmpl"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SummaryTemplate {
    /// An inline minijinja template string.
    Inline(String),
    /// Path to a template file (relative to the state directory).
    File(String),
}

impl Default for SummaryTemplate {
    fn default() -> Self {
        SummaryTemplate::Inline(DEFAULT_SUMMARY_TEMPLATE.into())
    }
}

impl SummaryTemplate {
    /// The template source. A file template that can't be read falls back to
    /// the built-in one.
    pub fn source(&self, dir: &Path) -> String {
        match self {
            SummaryTemplate::Inline(s) => s.clone(),
            SummaryTemplate::File(name) => {
                let path = dir.join(name);
                fs::read_to_string(&path).unwrap_or_else(|e| {
                    log::warn!("reading summary template {}: {e}", path.display());
                    DEFAULT_SUMMARY_TEMPLATE.into()
                })
            }
        }
    }
}

/// User-facing preferences stored in `<dir>/habitat-planner.toml`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Preferences {
    /// Root of the floor plan generation service.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Attempts per create/edit call before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff unit: attempt `n` failing waits `2^n` units.
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Mark color, `#rrggbb`.
    #[serde(default = "default_pen_color")]
    pub pen_color: String,

    /// Mark line width in displayed pixels.
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f32,

    /// Circle mark radius in displayed pixels.
    #[serde(default = "default_circle_radius")]
    pub circle_radius: f32,

    /// Summary message template (inline or file reference).
    #[serde(default)]
    pub summary_template: SummaryTemplate,
}

fn default_api_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_pen_color() -> String {
    DEFAULT_COLOR.into()
}

fn default_stroke_width() -> f32 {
    StrokeStyle::default().width
}

fn default_circle_radius() -> f32 {
    StrokeStyle::default().circle_radius
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            max_attempts: default_max_attempts(),
            backoff_unit_ms: default_backoff_unit_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            pen_color: default_pen_color(),
            stroke_width: default_stroke_width(),
            circle_radius: default_circle_radius(),
            summary_template: SummaryTemplate::default(),
        }
    }
}

impl Preferences {
    /// Load preferences from `<dir>/habitat-planner.toml`.
    ///
    /// If the file doesn't exist it is created with defaults. Missing keys
    /// in an existing file are filled in with defaults via serde.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(FILENAME);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let prefs: Preferences = toml::from_str(&contents)
                    .with_context(|| format!("parsing {}", path.display()))?;
                if parse_color(&prefs.pen_color).is_none() {
                    bail!(
                        "parsing {}: pen_color {:?} is not a #rrggbb or #rgb color",
                        path.display(),
                        prefs.pen_color
                    );
                }
                Ok(prefs)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let prefs = Preferences::default();
                let toml_str = toml::to_string_pretty(&prefs)
                    .context("serializing default preferences")?;
                fs::write(&path, &toml_str)
                    .with_context(|| format!("writing default {}", path.display()))?;
                Ok(prefs)
            }
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            backoff_unit: Duration::from_millis(self.backoff_unit_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stroke_style(&self) -> StrokeStyle {
        StrokeStyle {
            width: self.stroke_width,
            circle_radius: self.circle_radius,
        }
    }
}

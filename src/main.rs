mod annotation;
mod catalog;
mod client;
mod metadata;
mod plans;
mod preferences;
mod questionnaire;
mod questions;
mod retry;
mod session;
mod transcript;
mod types;

use annotation::Overlay;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use session::Session;
use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use types::ActionType;

#[derive(Parser, Debug)]
#[command(
    name = "habitat-planner",
    version,
    about = "Design a space habitat through a short questionnaire and edit the generated floor plans"
)]
struct Cli {
    /// State directory holding the session and preferences
    #[arg(long, global = true, default_value = ".habitat-planner")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the conversation so far
    Show,
    /// Answer the current question (option value, label or number)
    Answer { value: String },
    /// Finish zone selection
    Continue,
    /// Name the compartments of the zone being configured
    Names {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Send the design to the floor plan generator
    Finalize {
        /// Print the request instead of sending it
        #[arg(long)]
        dry_run: bool,
    },
    /// Start the questionnaire over
    Modify,
    /// List the zone catalog
    Zones,
    /// List generated floor plans
    Plans,
    /// Select a floor plan to annotate
    Select { index: usize },
    /// Mark up the selected floor plan
    #[command(subcommand)]
    Draw(DrawCommand),
    /// Send the marks on the selected plan as an edit
    Apply {
        #[arg(long, value_enum, ignore_case = true)]
        action: Action,
        #[arg(long)]
        prompt: String,
        /// Optional style or reference image
        #[arg(long)]
        reference: Option<PathBuf>,
    },
    /// Check that the generation service is up
    Health,
    /// Download a generated file by name
    Download {
        filename: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum DrawCommand {
    /// A freehand stroke through the given points
    Pen {
        #[arg(long, required = true, num_args = 1.., value_delimiter = ' ')]
        points: Vec<Point>,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// A circle mark centred on a point
    Circle {
        #[arg(long, allow_hyphen_values = true)]
        at: Point,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Remove every mark
    Clear,
}

/// Where the image sits on screen. Points are given in the same space.
#[derive(clap::Args, Debug)]
struct ViewArgs {
    /// Displayed image size, WxH
    #[arg(long)]
    display: Option<Size>,
    /// Displayed image position, X,Y
    #[arg(long, allow_hyphen_values = true)]
    offset: Option<Point>,
}

impl ViewArgs {
    fn overlay(&self) -> Option<Overlay> {
        let Size(width, height) = self.display?;
        let Point(x, y) = self.offset.unwrap_or(Point(0.0, 0.0));
        Some(Overlay::new(width, height).with_offset(x, y))
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
#[value(rename_all = "UPPER")]
enum Action {
    Add,
    Modify,
    Remove,
}

impl From<Action> for ActionType {
    fn from(action: Action) -> Self {
        match action {
            Action::Add => ActionType::Add,
            Action::Modify => ActionType::Modify,
            Action::Remove => ActionType::Remove,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Point(f32, f32);

impl FromStr for Point {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("expected X,Y, got {s:?}"))?;
        let coord = |v: &str| {
            v.trim()
                .parse::<f32>()
                .map_err(|e| format!("bad coordinate {v:?}: {e}"))
        };
        Ok(Point(coord(x)?, coord(y)?))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Size(f32, f32);

impl FromStr for Size {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WxH, got {s:?}"))?;
        let dim = |v: &str| match v.trim().parse::<f32>() {
            Ok(n) if n > 0.0 => Ok(n),
            _ => Err(format!("bad dimension {v:?}")),
        };
        Ok(Size(dim(w)?, dim(h)?))
    }
}

async fn dispatch(session: &mut Session, command: Command) -> Result<Option<String>> {
    match command {
        Command::Show => session.handle_show(),
        Command::Answer { value } => session.handle_answer(&value).await,
        Command::Continue => session.handle_continue().await,
        Command::Names { names } => session.handle_names(names).await,
        Command::Finalize { dry_run } => session.handle_finalize(dry_run).await,
        Command::Modify => session.handle_modify().await,
        Command::Zones => session.handle_zones(),
        Command::Plans => session.handle_plans().await,
        Command::Select { index } => session.handle_select(index),
        Command::Draw(DrawCommand::Pen { points, view }) => {
            let points: Vec<(f32, f32)> = points.iter().map(|p| (p.0, p.1)).collect();
            session.handle_draw_pen(&points, view.overlay())
        }
        Command::Draw(DrawCommand::Circle { at, view }) => {
            session.handle_draw_circle((at.0, at.1), view.overlay())
        }
        Command::Draw(DrawCommand::Clear) => session.handle_draw_clear(),
        Command::Apply {
            action,
            prompt,
            reference,
        } => {
            session
                .handle_apply(action.into(), &prompt, reference.as_deref())
                .await
        }
        Command::Health => session.handle_health().await,
        Command::Download { filename, out } => {
            session.handle_download(&filename, out.as_deref()).await
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut session = Session::open(&cli.dir)?;
    let result = dispatch(&mut session, cli.command).await;

    // Persist and show the conversation even when the command failed, so
    // failure messages aren't lost.
    session.save()?;
    let messages = session.new_messages();
    if !messages.is_empty() {
        println!("{messages}");
    }
    if let Some(output) = result? {
        println!("{output}");
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("habitat-planner: {err:#}");
        process::exit(2);
    }
}

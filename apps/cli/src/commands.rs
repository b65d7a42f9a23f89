//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use lessonforge_core::{
    GeneratorConfig, LessonGenerator, LessonSink, ModelRouter, PhaseWeights, ProgressReporter,
    SourceProvider, active_sections, max_output_tokens,
};
use lessonforge_shared::{
    AppConfig, GeneratedLesson, GenerationEvent, LessonParams, LessonType, ProgressUpdate,
    Schedule, StudentLevel, init_config, load_config, validate_api_key,
};

use crate::collab::{FileSource, JsonFileSink};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LessonForge: turn source texts into structured language lessons.
#[derive(Parser)]
#[command(
    name = "lessonforge",
    version,
    about = "Generate structured language lessons from source texts.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate a lesson from a source text file.
    Generate {
        /// Path to the source text.
        file: PathBuf,

        /// Lesson type (discussion, grammar, pronunciation, travel, business, ...).
        #[arg(short = 't', long = "type")]
        lesson_type: Option<String>,

        /// Student level (A1 to C2).
        #[arg(short, long)]
        level: Option<String>,

        /// Language the lesson teaches.
        #[arg(long)]
        language: Option<String>,

        /// Lesson title to use instead of the generated one.
        #[arg(long)]
        title: Option<String>,

        /// Generate independent sections concurrently.
        #[arg(long)]
        parallel: bool,

        /// Print progress and completion events as JSON lines on stdout.
        #[arg(long)]
        events: bool,

        /// Output file (defaults to var/lessons/<id>.json).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show the sections, progress weights and output ceilings of a lesson type.
    Sections {
        /// Lesson type (defaults to the configured one).
        #[arg(short = 't', long = "type")]
        lesson_type: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so stdout stays
/// free for event output.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "lessonforge=info",
        1 => "lessonforge=debug",
        _ => "lessonforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate {
            file,
            lesson_type,
            level,
            language,
            title,
            parallel,
            events,
            out,
        } => {
            let args = GenerateArgs {
                file,
                lesson_type,
                level,
                language,
                title,
                parallel,
                events,
                out,
            };
            cmd_generate(args).await
        }
        Command::Sections { lesson_type } => cmd_sections(lesson_type.as_deref()),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

struct GenerateArgs {
    file: PathBuf,
    lesson_type: Option<String>,
    level: Option<String>,
    language: Option<String>,
    title: Option<String>,
    parallel: bool,
    events: bool,
    out: Option<PathBuf>,
}

/// Lesson type, level and language from flags, falling back to config.
fn resolve_run(
    config: &AppConfig,
    lesson_type: Option<&str>,
    level: Option<&str>,
    language: Option<&str>,
) -> Result<(LessonType, StudentLevel, String)> {
    let lesson_type = LessonType::from(lesson_type.unwrap_or(&config.defaults.lesson_type));
    let level: StudentLevel = level
        .unwrap_or(&config.defaults.student_level)
        .parse()?;
    let language = language
        .unwrap_or(&config.defaults.target_language)
        .trim()
        .to_string();
    if language.is_empty() {
        return Err(eyre!("target language must not be empty"));
    }
    Ok((lesson_type, level, language))
}

async fn cmd_generate(args: GenerateArgs) -> Result<()> {
    // Validate API key before doing anything
    let config = load_config()?;
    validate_api_key(&config)?;

    let (lesson_type, level, language) = resolve_run(
        &config,
        args.lesson_type.as_deref(),
        args.level.as_deref(),
        args.language.as_deref(),
    )?;

    let mut generator_config = GeneratorConfig::from_app_config(&config)?;
    if args.parallel {
        generator_config.schedule = Schedule::Parallel;
    }
    let generator = LessonGenerator::new(generator_config, ModelRouter::from_config(&config)?);

    let source = FileSource::new(&args.file, args.title);
    let document = source.fetch().await?;
    info!(
        source = %document.origin,
        lesson_type = %lesson_type,
        level = %level,
        language = %language,
        "generating lesson"
    );
    let params = document.into_params(lesson_type, level, language);

    let cwd = std::env::current_dir()
        .map_err(|e| eyre!("cannot determine working directory: {e}"))?;
    let sink = JsonFileSink::new(args.out, cwd.join("var").join("lessons"));

    let start = Instant::now();
    let lesson = if args.events {
        generate_with_events(&generator, params).await?
    } else {
        let reporter = CliProgress::new();
        let result = generator.generate_lesson(&params, Some(&reporter)).await;
        reporter.finish();
        result?
    };

    sink.store(&lesson).await?;
    if !args.events {
        print_summary(&lesson, &sink.path_for(&lesson), start.elapsed());
    }

    Ok(())
}

/// Stream the run as NDJSON on stdout and return the finished lesson.
async fn generate_with_events(
    generator: &LessonGenerator,
    params: LessonParams,
) -> Result<GeneratedLesson> {
    let (mut events, handle) = generator.stream_lesson(params);
    let mut finished = None;

    while let Some(event) = events.recv().await {
        println!("{}", serde_json::to_string(&event)?);
        match event {
            GenerationEvent::Progress(_) => {}
            GenerationEvent::Complete { lesson } => finished = Some(*lesson),
            GenerationEvent::Error { kind, message } => {
                return Err(eyre!("lesson generation failed ({kind}): {message}"));
            }
        }
    }
    handle.await?;

    finished.ok_or_else(|| eyre!("event stream ended without a result"))
}

fn print_summary(lesson: &GeneratedLesson, path: &std::path::Path, elapsed: Duration) {
    println!();
    println!("  Lesson generated!");
    println!("  ID:       {}", lesson.id);
    println!("  Title:    {}", lesson.title);
    println!("  Type:     {} ({})", lesson.lesson_type, lesson.student_level);
    println!("  Sections: {}", lesson.sections.len());
    if !lesson.degraded.is_empty() {
        println!("  Degraded:");
        for d in &lesson.degraded {
            let how = if d.fallback { "template" } else { "partial" };
            println!("    - {} [{}, {how}] {}", d.section, d.failure, d.detail);
        }
    }
    if let Some(notice) = &lesson.notice {
        println!("  Notice:   {notice}");
    }
    println!(
        "  Usage:    {} calls, {} tokens in, {} tokens out",
        lesson.usage.calls, lesson.usage.tokens_in, lesson.usage.tokens_out
    );
    println!("  Path:     {}", path.display());
    println!("  Time:     {:.1}s", elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
            .map(|s| {
                s.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"])
                    .progress_chars("=> ")
            })
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn on_progress(&self, update: &ProgressUpdate) -> lessonforge_shared::Result<()> {
        self.bar.set_position(u64::from(update.progress));
        let message = match update.section {
            Some(section) => format!("{} {section}", update.phase.label()),
            None => update.phase.label().to_string(),
        };
        self.bar.set_message(message);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// sections
// ---------------------------------------------------------------------------

fn cmd_sections(lesson_type: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let lesson_type = LessonType::from(lesson_type.unwrap_or(&config.defaults.lesson_type));
    let weights = PhaseWeights::with_overrides(&config.weights)?;
    let total = weights.total_for(&lesson_type);

    println!("Sections for '{lesson_type}' lessons:");
    println!();
    println!("  {:<16} {:>6} {:>6} {:>10}  depends on", "section", "weight", "share", "max tokens");
    for kind in active_sections(&lesson_type) {
        let weight = weights.weight(kind);
        let share = f64::from(weight) * 100.0 / total as f64;
        let depends: Vec<&str> = kind.depends_on().iter().map(|d| d.as_str()).collect();
        println!(
            "  {:<16} {:>6} {:>5.1}% {:>10}  {}",
            kind.as_str(),
            weight,
            share,
            max_output_tokens(kind),
            if depends.is_empty() { "-".to_string() } else { depends.join(", ") }
        );
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_flags_parse() {
        let cli = Cli::try_parse_from([
            "lessonforge",
            "generate",
            "article.txt",
            "--type",
            "grammar",
            "--level",
            "c1",
            "--parallel",
            "--events",
            "-vv",
        ])
        .expect("valid arguments");

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Generate {
                file,
                lesson_type,
                level,
                parallel,
                events,
                out,
                ..
            } => {
                assert_eq!(file, PathBuf::from("article.txt"));
                assert_eq!(lesson_type.as_deref(), Some("grammar"));
                assert_eq!(level.as_deref(), Some("c1"));
                assert!(parallel && events);
                assert!(out.is_none());
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn flags_override_config_defaults() {
        let config = AppConfig::default();

        let (lesson_type, level, language) =
            resolve_run(&config, None, None, None).expect("defaults");
        assert_eq!(lesson_type, LessonType::Discussion);
        assert_eq!(level, StudentLevel::B1);
        assert_eq!(language, "English");

        let (lesson_type, level, language) =
            resolve_run(&config, Some("travel"), Some("A2"), Some("Spanish")).expect("flags");
        assert_eq!(lesson_type, LessonType::Travel);
        assert_eq!(level, StudentLevel::A2);
        assert_eq!(language, "Spanish");

        assert!(resolve_run(&config, None, Some("D1"), None).is_err());
        assert!(resolve_run(&config, None, None, Some("  ")).is_err());
    }
}

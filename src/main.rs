//! Modyfire command line
//!
//! Wires a `Workflow` from the TOML configuration and runs one subcommand.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use modyfire::cli::{Args, CallerArgs, Commands, GenerateArgs, SourceArgs};
use modyfire::config::Config;
use modyfire::export::{AspectRatio, ExportFormat, ExportTheme};
use modyfire::parse::parse;
use modyfire::policy::Caller;
use modyfire::prompt::SchemaKind;
use modyfire::request::{ContentRequest, ContentType, Source, TargetCount, Tier, Tone};
use modyfire::workflow::{GenerationOutcome, Workflow};

const DEFAULT_CONFIG: &str = "modyfire.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new(DEFAULT_CONFIG).exists() {
                info!("Found {} in current directory, loading...", DEFAULT_CONFIG);
                Config::from_file(DEFAULT_CONFIG)?
            } else {
                Config::default()
            }
        }
    };
    config.apply_env_overrides();

    match &args.command {
        Commands::Themes => {
            println!("{:<12} {:<10} {:<10} {:<20}", "Name", "Background", "Accent", "Geometry");
            println!("{}", "-".repeat(55));
            for name in ExportTheme::names() {
                let theme = ExportTheme::lookup(name);
                println!(
                    "{:<12} #{:<9} #{:<9} {:<20}",
                    theme.name,
                    theme.background.hex(),
                    theme.accent.hex(),
                    format!("{:?}", theme.geometry)
                );
            }
            return Ok(());
        }
        Commands::InitConfig { output, force } => {
            if output.exists() && !*force {
                anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
            }
            Config::default().save_to_file(output)?;
            println!("Wrote default configuration to {}", output.display());
            return Ok(());
        }
        _ => {}
    }

    let workflow = Workflow::new(config)?;

    match args.command {
        Commands::Generate { args, output } => {
            let outcome = run_generation(&workflow, &args).await?;
            let json = serde_json::to_string_pretty(&outcome.to_json())?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, json).await?;
                    println!("Wrote {} items to {}", outcome.artifact.len(), path.display());
                }
                None => println!("{}", json),
            }
        }
        Commands::Export { args, format, theme, aspect, output } => {
            let format: ExportFormat = format.parse()?;
            let caller = caller_from(&args.caller, &args.tier)?;
            let outcome = run_generation(&workflow, &args).await?;

            let bytes = workflow
                .export(&outcome.artifact, format, theme.as_deref(), AspectRatio::parse_lenient(&aspect), &caller)
                .await?;
            write_output(&output, &bytes).await?;
            println!("Exported {} to {} ({} bytes)", format.mime_type(), output.display(), bytes.len());
        }
        Commands::Podcast { script, url, text_file, language, output } => {
            let artifact = match (script, url, text_file) {
                (Some(path), _, _) => {
                    let raw = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read script {}", path.display()))?;
                    parse(&raw, SchemaKind::PodcastScript)
                }
                (None, url, text_file) => {
                    let source = SourceArgs { url, text: None, text_file };
                    let request = ContentRequest::new(ContentType::PodcastScript, read_source(&source).await?)
                        .with_tier(Tier::Podcaster)
                        .with_language(language);
                    let caller = Caller::anonymous();
                    let outcome = with_spinner("Writing podcast script...", workflow.generate(&request, &caller)).await?;
                    workflow.flush_background().await;
                    outcome.artifact
                }
            };
            if artifact.degraded {
                warn!("Script did not parse cleanly; the raw text will be read as one line");
            }

            let audio = with_spinner("Synthesizing audio...", workflow.podcast(&artifact)).await?;
            write_output(&output, &audio).await?;
            println!("Wrote podcast to {} ({} bytes)", output.display(), audio.len());
        }
        Commands::Resolve { url, language } => {
            let resolved = with_spinner("Resolving transcript...", workflow.resolve(&url, &language)).await?;
            println!("Source: {:?}{}", resolved.source_kind(), if resolved.is_degraded() { " (degraded)" } else { "" });
            println!("{}", resolved.text());
        }
        Commands::Rewrite { input, tone } => {
            let text = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let rewritten = with_spinner("Rewriting...", workflow.rewrite(&text, &tone, &Caller::anonymous())).await?;
            workflow.flush_background().await;
            println!("{}", rewritten);
        }
        Commands::Report { input, output } => {
            let text = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let bytes = workflow.report_pdf(&text)?;
            write_output(&output, &bytes).await?;
            println!("Wrote report to {}", output.display());
        }
        Commands::Purge { user } => {
            let removed = workflow.purge(&Caller::authenticated(user.clone(), Tier::Student, 0)).await?;
            println!("Removed {} stored files for {}", removed, user);
        }
        Commands::Themes | Commands::InitConfig { .. } => unreachable!("handled before workflow construction"),
    }

    info!("Modyfire completed successfully");
    Ok(())
}

async fn run_generation(workflow: &Workflow, args: &GenerateArgs) -> Result<GenerationOutcome> {
    let content_type: ContentType = args.content_type.parse()?;
    let tier: Tier = args.tier.parse()?;
    let tone: Tone = args.tone.parse()?;
    let caller = caller_from(&args.caller, &args.tier)?;

    let request = ContentRequest::new(content_type, read_source(&args.source).await?)
        .with_tier(tier)
        .with_language(args.language.clone())
        .with_tone(tone)
        .with_target_count(TargetCount::from(args.count.as_str()));

    let outcome = with_spinner(&format!("Generating {}...", content_type), workflow.generate(&request, &caller)).await?;
    workflow.flush_background().await;

    if let Some(kind) = outcome.transcript_kind.filter(|k| k.is_degraded()) {
        warn!("No transcript was available; content was generated from video metadata ({:?})", kind);
    }
    if outcome.artifact.degraded {
        warn!("Model output did not match the expected structure; returning the raw text");
    }
    Ok(outcome)
}

async fn read_source(source: &SourceArgs) -> Result<Source> {
    if let Some(url) = &source.url {
        return Ok(Source::Video(url.clone()));
    }
    if let Some(text) = &source.text {
        return Ok(Source::Text(text.clone()));
    }
    if let Some(path) = &source.text_file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        return Ok(Source::Text(text));
    }
    anyhow::bail!("one of --url, --text or --text-file is required")
}

fn caller_from(args: &CallerArgs, tier: &str) -> Result<Caller> {
    let tier: Tier = tier.parse()?;
    Ok(match (&args.user, args.authenticated) {
        (Some(user), _) => Caller::authenticated(user.clone(), tier, args.credits),
        (None, true) => Caller::authenticated("cli", tier, args.credits),
        (None, false) => Caller::anonymous(),
    })
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Show a spinner on stderr while `fut` runs.
async fn with_spinner<T, F>(message: &str, fut: F) -> Result<T>
where
    F: std::future::Future<Output = modyfire::error::Result<T>>,
{
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = fut.await;
    spinner.finish_and_clear();
    Ok(result?)
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".modyfire").join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "modyfire.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}", log_level, log_dir.join("modyfire.log").display());
    Ok(())
}

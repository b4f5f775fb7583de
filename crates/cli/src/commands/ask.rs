//! `rustedlens ask`: run the agent on one question.

use futures::StreamExt;
use rustedlens_agent::{Agent, AgentInput, RunState, Step};
use rustedlens_config::AppConfig;
use rustedlens_core::error::ProviderError;
use rustedlens_core::event::{DomainEvent, EventBus};
use rustedlens_core::image::ImageHandle;
use rustedlens_providers::{build_image_generator, build_text_generator};
use rustedlens_skills::FsSkillCatalog;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct AskOptions {
    pub text: String,
    pub images: Vec<PathBuf>,
    pub vlm_model: Option<String>,
    pub image_model: Option<String>,
    pub skills_dir: Option<PathBuf>,
    pub save_images: PathBuf,
    pub json: bool,
    pub log_events: bool,
}

pub async fn run(
    config_path: Option<&Path>,
    options: AskOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)
        .map_err(|e| format!("Failed to load config: {e}"))?;

    let vlm_model = options.vlm_model.unwrap_or_else(|| config.vlm_model.clone());
    let image_model = options
        .image_model
        .unwrap_or_else(|| config.image_model.clone());

    let text = match build_text_generator(&vlm_model, &config) {
        Ok(text) => text,
        Err(ProviderError::NotConfigured(reason)) => {
            print_key_help(&reason);
            return Err("No API key found. See above for setup instructions.".into());
        }
        Err(e) => return Err(e.into()),
    };
    let image = build_image_generator(&image_model, &config);

    let mut inputs = Vec::with_capacity(options.images.len());
    for path in &options.images {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| format!("Failed to read image {}: {e}", path.display()))?;
        inputs.push(ImageHandle::from_bytes(bytes));
    }

    let skills_dir = options
        .skills_dir
        .unwrap_or_else(|| config.skills.dir.clone());
    let catalog = FsSkillCatalog::new(&skills_dir);
    if catalog.scan()?.is_empty() {
        tracing::warn!(
            dir = %skills_dir.display(),
            "Skill catalog is empty; run `rustedlens init` to create starter skills"
        );
    }

    let event_bus = Arc::new(EventBus::new(256));
    let listener = options
        .log_events
        .then(|| tokio::spawn(log_events(event_bus.subscribe())));

    let mut agent = Agent::new(text, image, Arc::new(catalog))
        .with_settings(&config.agent)
        .with_event_bus(event_bus);

    tracing::info!(
        vlm = %vlm_model,
        image = %image_model,
        images = inputs.len(),
        "Starting agent"
    );

    let input = AgentInput::new(options.text).with_images(inputs);
    let mut run = agent.run(input);
    let mut saved = 0usize;
    let stdout = std::io::stdout();

    while let Some(step) = run.next().await {
        if options.json {
            let line = serde_json::to_string(&step)?;
            writeln!(stdout.lock(), "{line}")?;
            if step.is_final {
                for path in save_images(&options.save_images, &step.images, &mut saved)? {
                    eprintln!("Saved {}", path.display());
                }
            }
            continue;
        }

        if !step.is_final {
            show_progress(&step);
            continue;
        }

        clear_progress();
        let paths = save_images(&options.save_images, &step.images, &mut saved)?;
        writeln!(stdout.lock(), "{}", render_step(&step, &paths))?;
    }

    clear_progress();
    if run.state() == RunState::Done {
        tracing::info!(rounds = run.rounds(), "Agent finished");
    }
    drop(run);

    if let Some(listener) = listener {
        listener.abort();
    }
    Ok(())
}

/// Markdown block for a final step.
fn render_step(step: &Step, saved: &[PathBuf]) -> String {
    let mut out = format!("### Stage: {}\n\n{}\n", step.stage, step.message);
    if !saved.is_empty() {
        out.push_str("\n#### Generated Visuals:\n");
        for (i, path) in saved.iter().enumerate() {
            out.push_str(&format!("![Image {}]({})\n", i + 1, path.display()));
        }
    }
    out
}

/// Write images under `dir`, numbering them across the whole run.
fn save_images(
    dir: &Path,
    images: &[ImageHandle],
    counter: &mut usize,
) -> std::io::Result<Vec<PathBuf>> {
    if images.is_empty() {
        return Ok(Vec::new());
    }
    std::fs::create_dir_all(dir)?;

    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    let mut paths = Vec::with_capacity(images.len());
    for image in images {
        let path = dir.join(format!("gen_{stamp}_{counter}.{}", image.extension()));
        std::fs::write(&path, image.as_bytes())?;
        *counter += 1;
        paths.push(path);
    }
    Ok(paths)
}

fn show_progress(step: &Step) {
    let flat = step.message.replace('\n', " ");
    let tail: String = {
        let chars: Vec<char> = flat.chars().collect();
        let start = chars.len().saturating_sub(60);
        chars[start..].iter().collect()
    };
    eprint!("\r\x1b[2K  [{}] {}", step.stage, tail);
    let _ = std::io::stderr().flush();
}

fn clear_progress() {
    eprint!("\r\x1b[2K");
}

async fn log_events(mut rx: broadcast::Receiver<Arc<DomainEvent>>) {
    while let Ok(event) = rx.recv().await {
        match event.as_ref() {
            DomainEvent::RoundStarted { round, .. } => {
                tracing::debug!(round, "event: round started");
            }
            DomainEvent::SkillSelected {
                round,
                skill,
                stage,
                tool_calls,
                ..
            } => {
                tracing::debug!(round, %skill, %stage, tool_calls, "event: skill selected");
            }
            DomainEvent::ToolExecuted {
                tool_name,
                success,
                duration_ms,
                ..
            } => {
                tracing::debug!(%tool_name, success, duration_ms, "event: tool executed");
            }
            DomainEvent::RunFinished { rounds, reason, .. } => {
                tracing::debug!(rounds, ?reason, "event: run finished");
            }
        }
    }
}

fn print_key_help(reason: &str) {
    eprintln!();
    eprintln!("  ERROR: {reason}");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    export VLM_API_KEY='sk-...'         (generic)");
    eprintln!("    export DASHSCOPE_API_KEY='sk-...'   (Qwen models)");
    eprintln!("    export OPENAI_API_KEY='sk-...'      (OpenAI models)");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
}

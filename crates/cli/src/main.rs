//! RustedLens CLI: the main entry point.
//!
//! Commands:
//! - `ask`   : Run the agent on a question (text plus optional images)
//! - `skills`: List the skill catalog
//! - `init`  : Write the default config file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "rustedlens",
    about = "RustedLens: skill-driven vision-language reasoning agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to ~/.rustedlens/config.toml)
    #[arg(short, long, global = true, env = "RUSTEDLENS_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the agent a question
    Ask {
        /// The question
        text: String,

        /// Attach an image (repeatable)
        #[arg(short, long = "image", value_name = "PATH")]
        images: Vec<PathBuf>,

        /// Override the vision-language model
        #[arg(long)]
        vlm_model: Option<String>,

        /// Override the image generation model
        #[arg(long)]
        image_model: Option<String>,

        /// Override the skill directory
        #[arg(long)]
        skills_dir: Option<PathBuf>,

        /// Where generated images are written
        #[arg(long, value_name = "DIR", default_value = "generated_images")]
        save_images: PathBuf,

        /// Print every step as a JSON line
        #[arg(long)]
        json: bool,
    },

    /// List available skills
    Skills {
        /// Override the skill directory
        #[arg(long)]
        skills_dir: Option<PathBuf>,
    },

    /// Write the default configuration
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only agent output
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Ask {
            text,
            images,
            vlm_model,
            image_model,
            skills_dir,
            save_images,
            json,
        } => {
            let options = commands::ask::AskOptions {
                text,
                images,
                vlm_model,
                image_model,
                skills_dir,
                save_images,
                json,
                log_events: cli.verbose,
            };
            commands::ask::run(config_path, options).await?
        }
        Commands::Skills { skills_dir } => commands::skills::run(config_path, skills_dir)?,
        Commands::Init => commands::init::run(config_path)?,
    }

    Ok(())
}

//! `rustedlens init`: first-time setup.

use rustedlens_config::AppConfig;
use rustedlens_skills::SKILL_FILE;
use std::path::Path;

const STARTER_SKILLS: &[(&str, &str)] = &[
    (
        "reasoning",
        concat!(
            "Step-by-step reasoning over the current context.\n",
            "Use while the question is not yet solved.\n",
            "Produces intermediate conclusions, not the final answer.\n",
            "Stage: Thinking\n",
            "\n",
            "Work through the problem one step at a time. Build on the previous\n",
            "conclusions in the context, state what is now known, and say what\n",
            "remains to be worked out.\n",
        ),
    ),
    (
        "visualization",
        concat!(
            "Describe and interpret images in the context.\n",
            "Use when a picture or a generated diagram carries the key facts.\n",
            "Pair with the image generation tool to draw something new.\n",
            "Stage: Thinking\n",
            "\n",
            "Look closely at every image in the context. Describe the elements\n",
            "relevant to the question and what they imply.\n",
        ),
    ),
    (
        "response",
        concat!(
            "Write the final answer.\n",
            "Use once the reasoning is complete.\n",
            "Ends the run.\n",
            "Stage: Response\n",
            "\n",
            "Give a clear, complete answer to the original question using the\n",
            "conclusions in the context.\n",
        ),
    ),
];

pub fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::config_file(config_path);

    println!("RustedLens First-Time Setup");
    println!("=============================\n");

    if let Some(dir) = config_path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir)?;
        println!("Created config directory: {}", dir.display());
    }

    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete it and re-run init.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("Created config at: {}", config_path.display());
    }

    let config = super::load_config(Some(config_path.as_path()))?;
    let written = write_starter_skills(&config.skills.dir)?;
    if written > 0 {
        println!(
            "Created {written} starter skill(s) in {}",
            config.skills.dir.display()
        );
    }

    println!("\nNext steps:");
    println!("  1. Set VLM_API_KEY (or api_key in the config file)");
    println!("  2. Map an image model to its endpoint under [image.models]");
    println!("  3. Try: rustedlens ask \"Solve 2+2\"");
    Ok(())
}

/// Create any starter skill that does not exist yet. Returns how many were written.
fn write_starter_skills(root: &Path) -> std::io::Result<usize> {
    let mut written = 0;
    for (name, text) in STARTER_SKILLS {
        let dir = root.join(name);
        let file = dir.join(SKILL_FILE);
        if file.exists() {
            continue;
        }
        std::fs::create_dir_all(&dir)?;
        std::fs::write(&file, text)?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustedlens_skills::FsSkillCatalog;

    #[test]
    fn starter_skills_are_scannable() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(write_starter_skills(dir.path()).unwrap(), 3);

        let skills = FsSkillCatalog::new(dir.path()).scan().unwrap();
        assert_eq!(
            skills.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["reasoning", "response", "visualization"]
        );
        assert!(skills["response"].ends_with("Stage: Response"));
    }

    #[test]
    fn existing_skills_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("response");
        std::fs::create_dir_all(&custom).unwrap();
        std::fs::write(custom.join(SKILL_FILE), "mine").unwrap();

        assert_eq!(write_starter_skills(dir.path()).unwrap(), 2);
        assert_eq!(
            std::fs::read_to_string(custom.join(SKILL_FILE)).unwrap(),
            "mine"
        );
    }
}

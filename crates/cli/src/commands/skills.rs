//! `rustedlens skills`: list the skill catalog.

use rustedlens_skills::{FsSkillCatalog, SKILL_FILE};
use std::path::{Path, PathBuf};

pub fn run(
    config_path: Option<&Path>,
    skills_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let dir = skills_dir.unwrap_or(config.skills.dir);
    let catalog = FsSkillCatalog::new(dir);
    let skills = catalog.scan()?;

    println!("Skills in {}", catalog.root().display());
    if skills.is_empty() {
        println!();
        println!("  No skills found. Each skill is a directory with a {SKILL_FILE}.");
        println!("  Run `rustedlens init` to create the starter set.");
        return Ok(());
    }

    for (name, description) in &skills {
        println!();
        println!("  {name}");
        for line in description.lines() {
            println!("    {line}");
        }
    }
    println!();
    println!("  {} skill(s)", skills.len());
    Ok(())
}

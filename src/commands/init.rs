use anyhow::{Context, Result};
use archindex::config::Config;
use std::path::PathBuf;

pub fn init_config(path: PathBuf) -> Result<()> {
    let config_path = path.join("archindex.toml");
    if config_path.exists() {
        anyhow::bail!("Config already exists: {}", config_path.display());
    }

    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let content = format!(
        "# archindex configuration\n#\n# MEILISEARCH_HOST and MEILISEARCH_API_KEY override the backend section.\n\n{}",
        Config::default().to_toml()?
    );
    std::fs::write(&config_path, content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!("Created configuration at {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Point [import] data_dir at the finding-aid directory");
    println!("  2. Set [backend] host and environment");
    println!("  3. Run 'archindex run' to build the indexes");
    Ok(())
}

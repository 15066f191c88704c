//! CLI-level configuration loading
//!
//! Layers a TOML file over [`contentforge_core::config::PipelineConfig`]'s
//! built-in defaults, with the same fallback order the bundled tooling has
//! always used: a project-local file first, then a user config directory,
//! then the struct defaults.

use contentforge_core::config::PipelineConfig;
use std::path::{Path, PathBuf};

const PROJECT_CONFIG: &str = "contentforge.toml";

/// Load configuration with fallback priority:
/// 1. explicit `--config` path, if given
/// 2. `./contentforge.toml` (project-specific)
/// 3. `~/.config/contentforge/config.toml` (user default)
/// 4. built-in defaults
pub fn load_with_fallback(explicit: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    if let Some(path) = explicit {
        return load(path);
    }

    if Path::new(PROJECT_CONFIG).exists() {
        return load(Path::new(PROJECT_CONFIG));
    }

    if let Some(path) = user_config_path() {
        if path.exists() {
            return load(&path);
        }
    }

    Ok(PipelineConfig::default())
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("contentforge").join("config.toml"))
}

fn load(path: &Path) -> anyhow::Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
    toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_explicit_path_errors() {
        let result = load_with_fallback(Some(Path::new("/nonexistent/contentforge.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_falls_back_to_defaults_when_nothing_present() {
        let dir = tempfile::tempdir().unwrap();
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let result = load_with_fallback(None);
        std::env::set_current_dir(original).unwrap();

        let config = result.unwrap();
        assert_eq!(config.max_concurrent_content_generation, 10);
    }

    #[test]
    fn test_explicit_path_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "word_count_floor = 1200\n").unwrap();

        let config = load_with_fallback(Some(&path)).unwrap();
        assert_eq!(config.word_count_floor, 1200);
    }
}

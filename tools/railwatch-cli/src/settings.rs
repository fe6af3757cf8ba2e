use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use railwatch_transit::EngineConfig;

/// Directory holding the cached schedule when nothing else is configured
const DEFAULT_CACHE_DIR: &str = ".railwatch";

pub struct Settings {
    pub engine: EngineConfig,
    pub cache_dir: PathBuf,
}

/// `RAILWATCH_*` variables, nested keys separated by a double underscore
fn environment() -> Environment {
    Environment::with_prefix("RAILWATCH")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Layer defaults, the optional TOML file and `RAILWATCH_*` variables.
///
/// Nested keys use a double underscore in the environment, e.g.
/// `RAILWATCH_CLUSTER__TRAIN_THRESHOLD=3.5`. An explicit `cache_dir` wins over
/// both sources.
pub fn load(path: Option<&Path>, cache_dir: Option<PathBuf>) -> Result<Settings> {
    load_from(path, cache_dir, environment())
}

fn load_from(
    path: Option<&Path>,
    cache_dir: Option<PathBuf>,
    env: Environment,
) -> Result<Settings> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml));
    }
    let raw = builder
        .add_source(env)
        .build()
        .with_context(|| match path {
            Some(path) => format!("failed reading '{}'", path.display()),
            None => "failed reading environment".to_string(),
        })?;

    let engine: EngineConfig = raw
        .clone()
        .try_deserialize()
        .context("invalid engine configuration")?;

    let cache_dir = cache_dir
        .or_else(|| raw.get_string("cache_dir").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));

    Ok(Settings { engine, cache_dir })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Environment source fed from a fixed map instead of the process
    fn env_from(vars: &[(&str, &str)]) -> Environment {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(vars))
    }

    fn write_toml(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "railwatch-settings-{}-{name}.toml",
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    const FILE: &str = r#"
cache_dir = "/var/cache/railwatch"
realtime_feed_url = "https://example.test/rt"

[cluster]
train_threshold = 3.5
"#;

    #[test]
    fn test_defaults_without_file_or_environment() {
        let settings = load_from(None, None, env_from(&[])).unwrap();

        assert_eq!(settings.engine, EngineConfig::default());
        assert_eq!(settings.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
    }

    #[test]
    fn test_file_overrides_nested_keys() {
        let path = write_toml("nested", FILE);
        let settings = load_from(Some(&path), None, env_from(&[])).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(settings.engine.cluster.train_threshold, 3.5);
        assert_eq!(settings.engine.cluster.station_threshold, 5.0);
        assert_eq!(
            settings.engine.realtime_feed_url.as_deref(),
            Some("https://example.test/rt")
        );
        assert_eq!(settings.cache_dir, PathBuf::from("/var/cache/railwatch"));
    }

    #[test]
    fn test_environment_beats_file() {
        let path = write_toml("env", FILE);
        let env = env_from(&[
            ("RAILWATCH_CLUSTER__TRAIN_THRESHOLD", "1.25"),
            ("RAILWATCH_CACHE_MAX_AGE_DAYS", "3"),
        ]);
        let settings = load_from(Some(&path), None, env).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(settings.engine.cluster.train_threshold, 1.25);
        assert_eq!(settings.engine.cache_max_age_days, 3);
    }

    #[test]
    fn test_cache_dir_argument_beats_file() {
        let path = write_toml("cache-dir", FILE);
        let settings = load_from(
            Some(&path),
            Some(PathBuf::from("/tmp/explicit")),
            env_from(&[("RAILWATCH_CACHE_DIR", "/from/env")]),
        )
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(settings.cache_dir, PathBuf::from("/tmp/explicit"));
    }
}

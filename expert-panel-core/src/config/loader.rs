//! Configuration file discovery, layering and environment overrides

use super::schema::Config;
use super::validate::validate_config;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

const ENV_PREFIX: &str = "EXPERT_PANEL__";

/// Legacy variable names mapped onto config paths. The flag marks values
/// that should be parsed as JSON scalars rather than kept as strings.
const ENV_ALIASES: &[(&str, &str, bool)] = &[
    ("OPENAI_API_KEY", "coordinator.api_key", false),
    ("OPENAI_API_BASE", "coordinator.api_base", false),
    ("ARK_API_KEY", "coordinator.api_key", false),
    ("AI_MAX_ITERATIONS", "consultation.max_rounds", true),
];

/// Loads [`Config`] from a directory holding `config.json` or `config.yaml`
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Loader rooted at `~/.expert-panel`
    pub fn new() -> Self {
        let config_dir = dirs::home_dir()
            .map(|home| home.join(".expert-panel"))
            .unwrap_or_else(|| PathBuf::from(".expert-panel"));
        Self { config_dir }
    }

    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            config_dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Load configuration from file and process environment.
    ///
    /// Precedence, lowest first: built-in defaults, `config.json` (or
    /// `config.yaml` when no JSON file exists), alias variables such as
    /// `OPENAI_API_KEY`, then `EXPERT_PANEL__SECTION__FIELD` path variables.
    pub fn load(&self) -> crate::Result<Config> {
        self.load_with_env(std::env::vars())
    }

    fn load_with_env<I>(&self, env: I) -> crate::Result<Config>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut layered = serde_json::to_value(Config::default())?;
        if let Some(file) = self.read_config_file()? {
            deep_merge(&mut layered, file);
        }
        apply_env(&mut layered, env);

        let config: Config = serde_json::from_value(layered)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Write `config.json` as pretty JSON, creating the directory if needed
    pub fn save(&self, config: &Config) -> crate::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        let json = serde_json::to_string_pretty(config)?;
        std::fs::write(self.config_dir.join("config.json"), json)?;
        Ok(())
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn read_config_file(&self) -> crate::Result<Option<Value>> {
        for name in ["config.json", "config.yaml", "config.yml"] {
            let path = self.config_dir.join(name);
            if !path.exists() {
                continue;
            }
            debug!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            let value = if name.ends_with(".json") {
                serde_json::from_str(&content)?
            } else {
                serde_yaml::from_str(&content)?
            };
            return Ok(Some(value));
        }
        Ok(None)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively overlay objects; any non-object overlay replaces the base
fn deep_merge(base: &mut Value, overlay: Value) {
    let Value::Object(overlay_map) = overlay else {
        *base = overlay;
        return;
    };
    let Some(base_map) = base.as_object_mut() else {
        *base = Value::Object(overlay_map);
        return;
    };
    for (key, value) in overlay_map {
        match base_map.get_mut(&key) {
            Some(slot) => deep_merge(slot, value),
            None => {
                base_map.insert(key, value);
            }
        }
    }
}

/// Interpret an environment value as JSON when it parses, else as a string
fn env_scalar(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Set `value` at a dotted path, creating intermediate objects
fn insert_at(root: &mut Value, path: &[String], value: Value) {
    match path.split_first() {
        None => *root = value,
        Some((head, rest)) => {
            if !root.is_object() {
                *root = Value::Object(Map::new());
            }
            if let Value::Object(map) = root {
                let child = map.entry(head.clone()).or_insert(Value::Null);
                insert_at(child, rest, value);
            }
        }
    }
}

fn apply_env<I>(config: &mut Value, env: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut aliased = Vec::new();
    let mut prefixed = Vec::new();

    for (key, raw) in env {
        if let Some(suffix) = key.strip_prefix(ENV_PREFIX) {
            let path: Vec<String> = suffix
                .split("__")
                .filter(|segment| !segment.is_empty())
                .map(str::to_ascii_lowercase)
                .collect();
            if !path.is_empty() {
                prefixed.push((path, env_scalar(&raw)));
            }
        } else if let Some((_, target, typed)) =
            ENV_ALIASES.iter().find(|(alias, _, _)| *alias == key)
        {
            let path = target.split('.').map(str::to_string).collect();
            let value = if *typed {
                env_scalar(&raw)
            } else {
                Value::String(raw)
            };
            aliased.push((path, value));
        }
    }

    // Path variables are applied last so they win over aliases.
    for (path, value) in aliased.into_iter().chain(prefixed) {
        insert_at(config, &path, value);
    }
}

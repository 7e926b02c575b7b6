use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::schema::PapoConfig;

const CONFIG_BASENAME: &str = "papo";
const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json"];

/// Load config from the given path (any supported format).
///
/// String values may reference environment variables as `${VAR}`; the
/// placeholder is expanded before parsing so secrets such as the reasoning
/// API key can stay out of the file itself.
pub fn load_config(path: &Path) -> anyhow::Result<PapoConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = expand_placeholders(&raw, |name| std::env::var(name).ok());
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./papo.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/papo/papo.{toml,yaml,yml,json}` (user-global)
///
/// Returns `PapoConfig::default()` if no config file is found.
pub fn discover_and_load() -> PapoConfig {
    let Some(path) = candidate_paths().into_iter().find(|p| p.exists()) else {
        debug!("no config file found, using defaults");
        return PapoConfig::default();
    };

    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            PapoConfig::default()
        },
    }
}

/// All paths a config file may live at, in precedence order.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = CONFIG_EXTENSIONS
        .iter()
        .map(|ext| PathBuf::from(format!("{CONFIG_BASENAME}.{ext}")))
        .collect();
    if let Some(dir) = config_dir() {
        paths.extend(
            CONFIG_EXTENSIONS
                .iter()
                .map(|ext| dir.join(format!("{CONFIG_BASENAME}.{ext}"))),
        );
    }
    paths
}

/// Returns the user-global config directory (`~/.config/papo/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", CONFIG_BASENAME).map(|d| d.config_dir().to_path_buf())
}

/// Default location of the persisted credential blob, next to the config.
pub fn default_credentials_path() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("credentials.json")
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<PapoConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

/// Expand `${VAR}` placeholders against `lookup`.
///
/// Unresolvable or unterminated placeholders pass through verbatim, so a
/// literal `${...}` in a value degrades gracefully instead of erroring.
fn expand_placeholders(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let body = &rest[start + 2..];
        match body.find('}') {
            None => {
                // Unterminated; keep the tail as-is.
                out.push_str(&rest[start..]);
                rest = "";
            },
            Some(0) => {
                out.push_str("${}");
                rest = &body[1..];
            },
            Some(end) => {
                let name = &body[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&rest[start..start + end + 3]),
                }
                rest = &body[end + 1..];
            },
        }
    }

    out.push_str(rest);
    out
}

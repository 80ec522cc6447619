//! Front-end config generation.
//!
//! The browser client reads a `config.json` holding the map API key and the
//! URL of this backend. It is produced from a checked-in template with the
//! secrets injected from the environment at deploy time.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Environment variable holding the map API key.
pub const GOOGLE_MAPS_API_KEY: &str = "GOOGLE_MAPS_API_KEY";

/// Environment variable holding the backend URL.
pub const GOOGLE_SCRIPT_URL: &str = "GOOGLE_SCRIPT_URL";

const API_KEY_FIELD: &str = "googleMapsApiKey";
const SCRIPT_URL_FIELD: &str = "googleScriptUrl";

/// Outcome of a config build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendReport {
    /// Where the config was written.
    pub output: PathBuf,
    /// Whether an API key ended up in the output.
    pub has_api_key: bool,
    /// Whether a backend URL ended up in the output.
    pub has_script_url: bool,
}

/// Build the front-end config from `template`, reading the process environment.
///
/// # Errors
///
/// Returns an error if the template cannot be read or parsed, or the output
/// cannot be written.
pub fn build_config(template: &Path, output: &Path) -> Result<FrontendReport> {
    build_config_with(template, output, |name| std::env::var(name).ok())
}

/// Build the front-end config with an explicit environment lookup.
///
/// Each injected field takes the non-empty environment value, else the
/// non-empty template value, else `""`. Every other template key is kept in
/// its original position.
///
/// # Errors
///
/// Returns an error if the template cannot be read or is not a JSON object,
/// or the output cannot be written.
pub fn build_config_with<F>(template: &Path, output: &Path, env: F) -> Result<FrontendReport>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = fs::read_to_string(template).map_err(|source| Error::TemplateRead {
        path: template.to_path_buf(),
        source,
    })?;

    let mut config = match serde_json::from_str::<Value>(&raw)? {
        Value::Object(map) => map,
        _ => {
            return Err(Error::ConfigValidation {
                message: format!("template {} must be a JSON object", template.display()),
            })
        }
    };

    let api_key = inject(&mut config, API_KEY_FIELD, env(GOOGLE_MAPS_API_KEY));
    let script_url = inject(&mut config, SCRIPT_URL_FIELD, env(GOOGLE_SCRIPT_URL));

    if api_key.is_empty() {
        warn!("{GOOGLE_MAPS_API_KEY} is not set, the map may fail to load");
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut rendered = serde_json::to_string_pretty(&Value::Object(config))?;
    rendered.push('\n');
    fs::write(output, rendered)?;

    info!(output = %output.display(), "front-end config written");

    Ok(FrontendReport {
        output: output.to_path_buf(),
        has_api_key: !api_key.is_empty(),
        has_script_url: !script_url.is_empty(),
    })
}

/// Set `field` to the first non-empty of `from_env` and the template value.
fn inject(config: &mut Map<String, Value>, field: &str, from_env: Option<String>) -> String {
    let value = from_env
        .filter(|v| !v.is_empty())
        .or_else(|| {
            config
                .get(field)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_default();

    config.insert(field.to_string(), Value::String(value.clone()));
    value
}

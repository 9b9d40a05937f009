use std::{fmt::Write, path::Path, sync::LazyLock};

use anyhow::bail;
use regex::{Captures, Regex};
use serde::Deserialize;
use toml::Value;

use crate::Config;

/// Matches `{{ env.VAR_NAME }}` placeholders in a config string value.
static ENV_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("static pattern is valid"));

/// Loads and validates a `config.toml`, expanding `{{ env.VAR }}` placeholders
/// in every string value before deserializing into [`Config`].
pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path)?;
    let mut raw_config: Value = toml::from_str(&content)?;

    expand_dynamic_strings(&mut Vec::new(), &mut raw_config)?;

    let config = Config::deserialize(raw_config)?;
    validate_has_providers(&config)?;

    Ok(config)
}

fn validate_has_providers(config: &Config) -> anyhow::Result<()> {
    if config.llm.providers.is_empty() {
        bail!(
            "No LLM providers configured. The gateway requires at least one provider to function.\n\n\
             Example configuration:\n\n\
             [llm.providers.openai]\n\
             base_url = \"https://api.openai.com\"\n\
             api_key = \"{{{{ env.OPENAI_API_KEY }}}}\"\n\
             egress_format = \"chat\""
        );
    }

    Ok(())
}

/// Replaces every `{{ env.VAR }}` placeholder in `input` with the named
/// environment variable's value. Fails closed: a placeholder naming an unset
/// variable is an error, not a silent empty substitution.
fn expand_env_placeholders(input: &str) -> anyhow::Result<String> {
    let mut error = None;

    let expanded = ENV_PLACEHOLDER.replace_all(input, |caps: &Captures<'_>| {
        let var = &caps[1];
        match std::env::var(var) {
            Ok(value) => value,
            Err(_) => {
                error.get_or_insert_with(|| anyhow::anyhow!("environment variable '{var}' is not set"));
                String::new()
            }
        }
    });

    match error {
        Some(err) => Err(err),
        None => Ok(expanded.into_owned()),
    }
}

fn expand_dynamic_strings<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => match expand_env_placeholders(s) {
            Ok(expanded) => *s = expanded,
            Err(err) => {
                let mut p = String::new();

                for segment in path.iter() {
                    match segment {
                        Ok(s) => {
                            p.push_str(s);
                            p.push('.');
                        }
                        Err(i) => {
                            let _ = write!(p, "[{i}]");
                        }
                    }
                }

                if p.ends_with('.') {
                    p.pop();
                }

                bail!("Failed to expand dynamic string at path '{p}': {err}");
            }
        },
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_providers_is_rejected() {
        let config: Config = toml::from_str("").unwrap();
        assert!(validate_has_providers(&config).is_err());
    }

    #[test]
    fn configured_provider_passes() {
        let config: Config = toml::from_str(
            r#"
            [llm.providers.openai]
            base_url = "https://api.openai.com"
            api_key = "sk-test"
            egress_format = "chat"
            "#,
        )
        .unwrap();
        assert!(validate_has_providers(&config).is_ok());
    }

    #[test]
    fn env_placeholder_expands() {
        // SAFETY: test-only, single-threaded within this process's test harness isn't
        // guaranteed, so scope the var name to avoid collisions with other tests.
        unsafe { std::env::set_var("CONFIG_LOADER_TEST_VAR", "secret-value") };
        let expanded = expand_env_placeholders("{{ env.CONFIG_LOADER_TEST_VAR }}").unwrap();
        assert_eq!(expanded, "secret-value");
        unsafe { std::env::remove_var("CONFIG_LOADER_TEST_VAR") };
    }

    #[test]
    fn missing_env_var_is_rejected() {
        assert!(expand_env_placeholders("{{ env.CONFIG_LOADER_DEFINITELY_UNSET }}").is_err());
    }
}

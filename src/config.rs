//! Configuration loading for the coderunner-eval service.
//!
//! Loads a single TOML file (or string) into a [`Config`], then expands
//! `${VAR}` / `${VAR:-default}` / `$$` references in the fields that carry
//! deploy-time secrets (`docker.host`, `database.url`) — the same
//! expansion mechanism the teacher hand-rolls for its provider `env` maps,
//! here applied directly to named fields instead of a `HashMap`.

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};

/// Loads configuration from a TOML file and expands environment variable
/// references in its secret-bearing fields.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    load_config_str(&content)
}

/// Loads configuration from a TOML string. Useful for tests and the
/// `config check` CLI subcommand.
pub fn load_config_str(content: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(content).context("Failed to parse config")?;

    if let Some(host) = &config.docker.host {
        config.docker.host = Some(
            expand_env_value(host).map_err(|e| anyhow::anyhow!("Failed to expand docker.host: {e}"))?,
        );
    }
    config.database.url =
        expand_env_value(&config.database.url).map_err(|e| anyhow::anyhow!("Failed to expand database.url: {e}"))?;

    Ok(config)
}

/// Expands environment variable references in a string value.
///
/// Syntax:
/// - `${VAR}` - required, fails if VAR is not set
/// - `${VAR:-default}` - optional, uses "default" if VAR not set
/// - `$$` - escaped dollar sign (becomes single `$`)
fn expand_env_value(value: &str) -> Result<String, String> {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    result.push('$');
                }
                Some('{') => {
                    chars.next();

                    let mut var_content = String::new();
                    let mut found_close = false;

                    for c in chars.by_ref() {
                        if c == '}' {
                            found_close = true;
                            break;
                        }
                        var_content.push(c);
                    }

                    if !found_close {
                        return Err(format!("Unclosed variable reference: ${{{var_content}"));
                    }

                    let (var_name, default_value) = if let Some(idx) = var_content.find(":-") {
                        let (name, rest) = var_content.split_at(idx);
                        (name, Some(&rest[2..]))
                    } else {
                        (var_content.as_str(), None)
                    };

                    if var_name.is_empty() {
                        return Err("Empty variable name in ${}".to_string());
                    }

                    match std::env::var(var_name) {
                        Ok(val) => result.push_str(&val),
                        Err(_) => {
                            if let Some(default) = default_value {
                                result.push_str(default);
                            } else {
                                return Err(format!("Required environment variable not set: {var_name}"));
                            }
                        }
                    }
                }
                _ => result.push('$'),
            }
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_loads_with_defaults() {
        let config = load_config_str(
            r#"
            [database]
            url = "postgres://localhost/coderunner"
        "#,
        )
        .unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:50051");
    }

    #[test]
    fn database_url_expands_env_var() {
        unsafe {
            std::env::set_var("_CODERUNNER_TEST_DB_HOST", "db.internal");
        }
        let config = load_config_str(
            r#"
            [database]
            url = "postgres://${_CODERUNNER_TEST_DB_HOST}/coderunner"
        "#,
        )
        .unwrap();
        assert_eq!(config.database.url, "postgres://db.internal/coderunner");
        unsafe {
            std::env::remove_var("_CODERUNNER_TEST_DB_HOST");
        }
    }

    #[test]
    fn missing_required_env_var_is_an_error() {
        let result = load_config_str(
            r#"
            [database]
            url = "postgres://${_CODERUNNER_TEST_MISSING}/coderunner"
        "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn expand_env_value_default_used_when_unset() {
        let result = expand_env_value("${_CODERUNNER_TEST_MISSING:-fallback}").unwrap();
        assert_eq!(result, "fallback");
    }

    #[test]
    fn expand_env_value_escaped_dollar() {
        assert_eq!(expand_env_value("price is $$100").unwrap(), "price is $100");
    }
}

//! Load configuration from an XDG `config.toml` and a project `.env`,
//! then apply it to the process environment with priority:
//! **existing env > .env > XDG**.
//!
//! Used by the runtime for env-backed secret providers and by tests.

mod dotenv;
mod xdg_toml;

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Loads config from `$XDG_CONFIG_HOME/<app_name>/config.toml` (`[env]`
/// table) and an optional project `.env`, then sets environment variables
/// only for keys that are **not** already set, so existing env always
/// wins.
///
/// Precedence for a key missing from the process environment:
/// 1. the project `.env` (current directory, or `override_dir` if given),
/// 2. the XDG `config.toml` `[env]` table.
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let xdg_map = xdg_toml::load_env_map(app_name)?;
    let dotenv_map = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    let mut keys: std::collections::BTreeSet<String> = xdg_map.keys().cloned().collect();
    keys.extend(dotenv_map.keys().cloned());

    for key in keys {
        if std::env::var(&key).is_ok() {
            continue; // existing env wins
        }
        if let Some(value) = dotenv_map.get(&key).or_else(|| xdg_map.get(&key)) {
            std::env::set_var(&key, value);
        }
    }

    Ok(())
}

//! Host locations for data and configuration.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const APP_DIR: &str = "cco";
const CONFIG_FILE: &str = "config.toml";

/// `$XDG_DATA_HOME/cco`, or `~/.local/share/cco`.
pub fn data_dir() -> Result<PathBuf> {
    resolve(std::env::var_os("XDG_DATA_HOME"), ".local/share")
}

/// Host root of all job exchange directories, mounted into the VM.
pub fn exchange_root() -> Result<PathBuf> {
    Ok(data_dir()?.join("exchange"))
}

/// `$XDG_CONFIG_HOME/cco`, or `~/.config/cco`.
pub fn config_dir() -> Result<PathBuf> {
    resolve(std::env::var_os("XDG_CONFIG_HOME"), ".config")
}

pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

fn resolve(xdg: Option<OsString>, fallback: &str) -> Result<PathBuf> {
    resolve_with(xdg, dirs::home_dir(), fallback)
}

fn resolve_with(xdg: Option<OsString>, home: Option<PathBuf>, fallback: &str) -> Result<PathBuf> {
    // Relative XDG values are ignored.
    if let Some(base) = xdg.map(PathBuf::from).filter(|p| p.is_absolute()) {
        return Ok(base.join(APP_DIR));
    }
    let home = home.ok_or_else(|| Error::Config("could not determine home directory".to_string()))?;
    Ok(home.join(Path::new(fallback)).join(APP_DIR))
}

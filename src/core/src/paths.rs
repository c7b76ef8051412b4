use std::path::PathBuf;

use directories::BaseDirs;

fn env_home_dir() -> Option<PathBuf> {
    if let Some(home) = std::env::var_os("HOME") {
        if !home.is_empty() {
            return Some(PathBuf::from(home));
        }
    }
    if let Some(profile) = std::env::var_os("USERPROFILE") {
        if !profile.is_empty() {
            return Some(PathBuf::from(profile));
        }
    }
    None
}

pub fn user_home_dir() -> Option<PathBuf> {
    if let Some(base) = BaseDirs::new() {
        return Some(base.home_dir().to_path_buf());
    }
    env_home_dir()
}

/// `$SHELLGATE_HOME`, or `~/.shellgate`. Not created here; the gateway only reads from it.
pub fn shellgate_home_dir() -> Result<PathBuf, String> {
    if let Some(override_dir) = std::env::var_os("SHELLGATE_HOME") {
        let path = PathBuf::from(override_dir);
        if path.is_relative() {
            return Err("SHELLGATE_HOME must be an absolute path".to_string());
        }
        return Ok(path);
    }

    let home = user_home_dir().ok_or_else(|| {
        "failed to resolve user home; set SHELLGATE_HOME or HOME/USERPROFILE".to_string()
    })?;
    Ok(home.join(".shellgate"))
}

pub fn shellgate_config_path() -> Result<PathBuf, String> {
    Ok(shellgate_home_dir()?.join("config.toml"))
}

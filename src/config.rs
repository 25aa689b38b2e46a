use crate::model::MixSettings;
use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "mixdj";
const STATE_FILE: &str = "state.json";
const SETTINGS_FILE: &str = "settings.json";
const LOG_FILE: &str = "mixdj.log";

pub const CONFIG_DIR_ENV: &str = "MIXDJ_CONFIG_DIR";

pub fn config_root() -> Result<PathBuf> {
    if let Ok(override_dir) = env::var(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(override_dir));
    }

    let home = if cfg!(windows) {
        env::var("USERPROFILE").context("USERPROFILE is not set")?
    } else {
        env::var("HOME").context("HOME is not set")?
    };
    Ok(PathBuf::from(home).join(".config").join(APP_DIR))
}

pub fn state_path() -> Result<PathBuf> {
    Ok(config_root()?.join(STATE_FILE))
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(config_root()?.join(SETTINGS_FILE))
}

pub fn log_path() -> Result<PathBuf> {
    Ok(config_root()?.join(LOG_FILE))
}

pub fn ensure_config_dir() -> Result<PathBuf> {
    let root = config_root()?;
    fs::create_dir_all(&root).with_context(|| format!("failed to create {}", root.display()))?;
    Ok(root)
}

/// Reads mix settings, falling back to defaults when the file is missing or
/// unusable. A missing file is written out with the defaults.
pub fn load_settings() -> MixSettings {
    match settings_path().and_then(|path| read_settings(&path).map(|s| (path, s))) {
        Ok((path, settings)) => {
            if !path.exists() {
                if let Err(err) = save_settings(&settings) {
                    log::warn!("could not write default mix settings: {err:#}");
                }
            }
            settings
        }
        Err(err) => {
            log::warn!("using default mix settings: {err:#}");
            MixSettings::default()
        }
    }
}

pub fn read_settings(path: &Path) -> Result<MixSettings> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(MixSettings::default()),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read settings file {}", path.display()));
        }
    };
    let settings: MixSettings = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse settings file {}", path.display()))?;
    Ok(settings)
}

pub fn save_settings(settings: &MixSettings) -> Result<()> {
    ensure_config_dir()?;
    let path = settings_path()?;
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn settings_save_and_load_through_override_dir() {
        let dir = tempdir().expect("tempdir");
        unsafe {
            env::set_var(CONFIG_DIR_ENV, dir.path().to_string_lossy().as_ref());
        }

        let settings = MixSettings {
            fade_seconds: 3,
            ..MixSettings::default()
        };
        save_settings(&settings).expect("save");
        assert_eq!(load_settings(), settings);
        assert_eq!(state_path().expect("state path"), dir.path().join("state.json"));
        assert_eq!(log_path().expect("log path"), dir.path().join("mixdj.log"));
    }

    #[test]
    fn missing_settings_file_gives_defaults() {
        let dir = tempdir().expect("tempdir");
        let settings = read_settings(&dir.path().join("settings.json")).expect("read");
        assert_eq!(settings, MixSettings::default());
    }

    #[test]
    fn unparsable_settings_file_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, "fade_seconds = 3").expect("write");

        let err = read_settings(&path).expect_err("parse failure");
        assert!(err.to_string().contains("failed to parse"), "{err:#}");
    }
}

use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const NO_PROFILE: &str = "null";

pub const MIRRORS: &[&str] = &[
    "https://github.com/AM2R-Community-Developers/AM2R-Autopatcher-Data.git",
    "https://gitlab.com/AM2R-Community-Developers/AM2R-Autopatcher-Data.git",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_profile_index")]
    pub profile_index: String,
    #[serde(default)]
    pub mirror: usize,
    #[serde(default)]
    pub custom_mirror: Option<String>,
    #[serde(default)]
    pub hq_music_desktop: bool,
    #[serde(default)]
    pub hq_music_mobile: bool,
    #[serde(default)]
    pub capture_game_logs: bool,
    #[serde(default)]
    pub custom_env: String,
    #[serde(default)]
    pub strict_patching: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profile_index: default_profile_index(),
            mirror: 0,
            custom_mirror: None,
            hq_music_desktop: false,
            hq_music_mobile: false,
            capture_game_logs: false,
            custom_env: String::new(),
            strict_patching: false,
        }
    }
}

impl Settings {
    pub fn load_or_create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).context("create data root")?;
        let path = root.join("settings.json");
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read settings")?;
            let settings: Settings = serde_json::from_str(&raw).context("parse settings")?;
            return Ok(settings);
        }

        let settings = Settings::default();
        settings.save(root)?;
        Ok(settings)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        fs::create_dir_all(root).context("create data root")?;
        let path = root.join("settings.json");
        let raw = serde_json::to_string_pretty(self).context("serialize settings")?;
        fs::write(path, raw).context("write settings")?;
        Ok(())
    }

    pub fn mirror_url(&self) -> String {
        if let Some(custom) = self.custom_mirror.as_deref() {
            if !custom.trim().is_empty() {
                return custom.trim().to_string();
            }
        }
        MIRRORS
            .get(self.mirror)
            .unwrap_or(&MIRRORS[0])
            .to_string()
    }

    pub fn set_selection(&mut self, index: Option<usize>) {
        self.profile_index = match index {
            Some(index) => index.to_string(),
            None => NO_PROFILE.to_string(),
        };
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "mirror" => self.mirror = value.parse().context("mirror expects an index")?,
            "custom_mirror" => {
                self.custom_mirror = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            "hq_music_desktop" => self.hq_music_desktop = parse_flag(value)?,
            "hq_music_mobile" => self.hq_music_mobile = parse_flag(value)?,
            "capture_game_logs" => self.capture_game_logs = parse_flag(value)?,
            "custom_env" => self.custom_env = value.to_string(),
            "strict_patching" => self.strict_patching = parse_flag(value)?,
            _ => anyhow::bail!("Unknown setting: {key}"),
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => anyhow::bail!("expected true or false, got {value}"),
    }
}

fn default_profile_index() -> String {
    NO_PROFILE.to_string()
}

#[derive(Debug, Clone)]
pub struct Layout {
    pub root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(root_override: Option<&Path>) -> Result<Self> {
        if let Some(root) = root_override {
            return Ok(Self::new(root));
        }
        if let Some(root) = std::env::var_os("AM2RFORGE_ROOT") {
            return Ok(Self::new(PathBuf::from(root)));
        }
        let base = BaseDirs::new().context("resolve home dir")?;
        Ok(Self::new(base.data_local_dir().join("am2rforge")))
    }

    pub fn patch_data(&self) -> PathBuf {
        self.root.join("PatchData")
    }

    pub fn patch_data_files(&self) -> PathBuf {
        self.patch_data().join("data")
    }

    pub fn canonical_descriptor(&self) -> PathBuf {
        self.patch_data().join("profile.xml")
    }

    pub fn utilities(&self) -> PathBuf {
        self.patch_data().join("utilities")
    }

    pub fn hq_music(&self) -> PathBuf {
        self.patch_data_files().join("HDR_HQ_in-game_music")
    }

    pub fn appdir_template(&self) -> PathBuf {
        self.patch_data_files().join("AM2R.AppDir")
    }

    pub fn mods(&self) -> PathBuf {
        self.root.join("Mods")
    }

    pub fn profiles(&self) -> PathBuf {
        self.root.join("Profiles")
    }

    pub fn profile_dir(&self, name: &str) -> PathBuf {
        self.profiles().join(name)
    }

    pub fn temp(&self) -> PathBuf {
        self.root.join("temp")
    }

    pub fn verify_scratch(&self) -> PathBuf {
        self.root.join("verify")
    }

    pub fn base_archive(&self) -> PathBuf {
        self.root.join("AM2R_11.zip")
    }

    pub fn apk_output(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.apk"))
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join("am2rforge.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip_keeps_selection() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::load_or_create(dir.path()).unwrap();
        assert_eq!(settings.profile_index, NO_PROFILE);
        settings.set_selection(Some(2));
        settings.save(dir.path()).unwrap();

        let loaded = Settings::load_or_create(dir.path()).unwrap();
        assert_eq!(loaded.profile_index, "2");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), r#"{"hq_music_desktop": true}"#).unwrap();
        let loaded = Settings::load_or_create(dir.path()).unwrap();
        assert!(loaded.hq_music_desktop);
        assert_eq!(loaded.profile_index, NO_PROFILE);
        assert_eq!(loaded.mirror_url(), MIRRORS[0]);
    }

    #[test]
    fn custom_mirror_wins_over_index() {
        let mut settings = Settings::default();
        settings.set_value("mirror", "1").unwrap();
        assert_eq!(settings.mirror_url(), MIRRORS[1]);
        settings
            .set_value("custom_mirror", "https://example.com/data.git")
            .unwrap();
        assert_eq!(settings.mirror_url(), "https://example.com/data.git");
        assert!(settings.set_value("hq_music_mobile", "maybe").is_err());
    }
}

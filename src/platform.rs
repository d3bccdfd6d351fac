use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Windows,
    Linux,
}

impl Default for Platform {
    fn default() -> Self {
        Platform::current()
    }
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
        }
    }

    /// File whose presence under `Profiles/<name>` marks a profile as installed.
    pub fn runner_file(self) -> &'static str {
        match self {
            Platform::Windows => "AM2R.exe",
            Platform::Linux => "AM2R.AppImage",
        }
    }

    pub fn save_placeholder(self) -> &'static str {
        match self {
            Platform::Windows => "%localappdata%",
            Platform::Linux => "~",
        }
    }

    pub fn home_var(self) -> &'static str {
        match self {
            Platform::Windows => "LOCALAPPDATA",
            Platform::Linux => "HOME",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Desktop(Platform),
    Mobile,
}

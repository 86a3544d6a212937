use std::fmt;

use crate::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    NotInstalled,
    /// Binary downloaded, no server config yet.
    BinaryOnly,
    Installed,
}

impl InstallStatus {
    /// Derived from the filesystem on every call; never cache the result.
    #[must_use]
    pub fn detect(settings: &Settings) -> Self {
        let binary = settings.binary_path.exists();
        let config = settings.config_file().exists();
        match (binary, config) {
            (false, _) => Self::NotInstalled,
            (true, false) => Self::BinaryOnly,
            (true, true) => Self::Installed,
        }
    }
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInstalled => write!(f, "Not installed"),
            Self::BinaryOnly => write!(f, "Partially installed (needs configuration)"),
            Self::Installed => write!(f, "Installed"),
        }
    }
}

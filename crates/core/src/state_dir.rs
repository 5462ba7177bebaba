//! Platform-specific state directory management

use directories::ProjectDirs;
use std::path::PathBuf;
use tracing::warn;

/// Environment variable that overrides the state directory
pub const STATE_DIR_ENV: &str = "PORTAL_STATE_DIR";

/// Manages platform-specific application directories
#[derive(Debug, Clone)]
pub struct StateDir {
    /// Project directories from the directories crate
    project_dirs: Option<ProjectDirs>,
    /// Override directory for testing or custom installations
    override_dir: Option<PathBuf>,
}

impl StateDir {
    /// Create a new StateDir, honouring `PORTAL_STATE_DIR` when set
    pub fn new() -> Self {
        if let Ok(dir) = std::env::var(STATE_DIR_ENV) {
            return Self::with_override(dir);
        }

        let project_dirs = ProjectDirs::from("com", "Portal", "portal");
        if project_dirs.is_none() {
            warn!("Failed to determine platform-specific directories, will use fallback");
        }
        Self {
            project_dirs,
            override_dir: None,
        }
    }

    /// Create a new StateDir with an override directory
    pub fn with_override(path: impl Into<PathBuf>) -> Self {
        Self {
            project_dirs: None,
            override_dir: Some(path.into()),
        }
    }

    /// Get the configuration directory
    pub fn config_dir(&self) -> PathBuf {
        if let Some(override_dir) = &self.override_dir {
            return override_dir.join("config");
        }

        if let Some(project_dirs) = &self.project_dirs {
            project_dirs.config_dir().to_path_buf()
        } else {
            // Fallback to current directory
            PathBuf::from("./config")
        }
    }

    /// Get the data directory for persistent storage
    pub fn data_dir(&self) -> PathBuf {
        if let Some(override_dir) = &self.override_dir {
            return override_dir.join("data");
        }

        if let Some(project_dirs) = &self.project_dirs {
            project_dirs.data_dir().to_path_buf()
        } else {
            // Fallback to current directory
            PathBuf::from("./data")
        }
    }

    /// Get the config path
    pub fn config_path(&self) -> PathBuf {
        self.config_dir().join("portal.json")
    }

    /// Get the file holding the persisted session
    pub fn session_path(&self) -> PathBuf {
        self.data_dir().join("session.json")
    }

    /// Get the directory for log files
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }
}

impl Default for StateDir {
    fn default() -> Self {
        Self::new()
    }
}

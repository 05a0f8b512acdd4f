//! Cross-platform application directories for Gasoline.
//!
//! Provides unified directory management following platform conventions:
//! - Linux/macOS: `~/.gasoline`
//! - Windows: `%APPDATA%\gasoline`
//!
//! Can be overridden with the `GASOLINE_HOME` environment variable.

use std::path::PathBuf;

/// Application name for directory paths
pub const APP_NAME: &str = "gasoline";

/// Primary home directory name on Linux/macOS
pub const HOME_DIR_NAME: &str = ".gasoline";

/// Application directories structure
#[derive(Debug, Clone)]
pub struct AppDirs {
    /// Configuration directory (~/.gasoline on Linux/macOS)
    pub config_dir: PathBuf,
    /// Data directory (same as config_dir for simplicity)
    pub data_dir: PathBuf,
    /// Cache directory (~/.gasoline/cache on Linux/macOS)
    pub cache_dir: PathBuf,
}

impl AppDirs {
    /// Get application directories, respecting environment variable overrides.
    ///
    /// `GASOLINE_HOME` overrides all directories to a single path. Relative
    /// values are resolved against the current directory so config files do
    /// not land in unexpected locations.
    pub fn new() -> Option<Self> {
        let home_dir = dirs::home_dir()?;

        if let Ok(home) = std::env::var("GASOLINE_HOME") {
            let home = PathBuf::from(&home);
            let home = if home.is_relative() {
                match std::env::current_dir() {
                    Ok(cwd) => {
                        let resolved = cwd.join(&home);
                        resolved.canonicalize().unwrap_or(resolved)
                    }
                    Err(_) => home_dir.join(HOME_DIR_NAME),
                }
            } else {
                home
            };
            return Some(Self {
                config_dir: home.clone(),
                data_dir: home.clone(),
                cache_dir: home.join("cache"),
            });
        }

        #[cfg(target_os = "windows")]
        let (config_dir, data_dir, cache_dir) = {
            let appdata = dirs::config_dir()?;
            let local_appdata = dirs::cache_dir()?;
            (
                appdata.join(APP_NAME),
                appdata.join(APP_NAME),
                local_appdata.join(APP_NAME),
            )
        };

        #[cfg(not(target_os = "windows"))]
        let (config_dir, data_dir, cache_dir) = {
            let gasoline_home = home_dir.join(HOME_DIR_NAME);
            (
                gasoline_home.clone(),
                gasoline_home.clone(),
                gasoline_home.join("cache"),
            )
        };

        Some(Self {
            config_dir,
            data_dir,
            cache_dir,
        })
    }

    /// Get the recordings directory.
    pub fn recordings_dir(&self) -> PathBuf {
        self.data_dir.join("recordings")
    }

    /// Get the screenshots directory.
    pub fn screenshots_dir(&self) -> PathBuf {
        self.data_dir.join("screenshots")
    }

    /// Get the logs directory.
    pub fn logs_dir(&self) -> PathBuf {
        self.cache_dir.join("logs")
    }

    /// Ensure all directories exist with owner rwx, group rx permissions.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.config_dir,
            &self.data_dir,
            &self.cache_dir,
            &self.recordings_dir(),
            &self.screenshots_dir(),
        ] {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o750))?;
                }
            }
        }
        Ok(())
    }
}

/// Get application directories (convenience function)
pub fn get_app_dirs() -> Option<AppDirs> {
    AppDirs::new()
}

/// Get the effective home directory for the application
pub fn get_gasoline_home() -> Option<PathBuf> {
    let dirs = AppDirs::new()?;
    Some(dirs.config_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_dirs_creation() {
        let dirs = AppDirs::new();
        assert!(dirs.is_some());
    }

    #[test]
    fn test_recordings_under_data_dir() {
        let dirs = AppDirs::new().unwrap();
        assert!(dirs.recordings_dir().starts_with(&dirs.data_dir));
        assert!(dirs.screenshots_dir().ends_with("screenshots"));
    }
}

//! User settings
//!
//! Stored as TOML in the user's config directory, e.g.
//! `~/.config/shellcommand/settings.toml`. A missing file means defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{ExitStatusPolicy, NoOutputPolicy, DEFAULT_NO_OUTPUT_MESSAGE};
use crate::host::{CommandRunner, Shell};
use crate::sink::{DeliveryOptions, DEFAULT_PANEL_NAME};

/// Default prompt label when asking for a command
pub const DEFAULT_PROMPT: &str = "Shell Command";

/// Default title of output documents
pub const DEFAULT_TITLE: &str = "*Shell Command Output*";

/// Errors loading or saving settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Could not determine the config directory")]
    NoConfigDir,

    #[error("Failed to access settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Shell command settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Insert a placeholder when a command succeeds without output
    pub show_success_but_no_output_message: bool,
    /// The placeholder text
    pub success_but_no_output_message: String,
    /// Prompt label used when no command is given
    pub default_prompt: String,
    /// Title for new output documents
    pub default_title: String,
    /// Name of the reusable output panel
    pub panel_name: String,
    /// Whether exit status is shown in the output
    pub exit_status: ExitStatusPolicy,
    /// Remove ANSI escape sequences from output
    pub strip_ansi: bool,
    /// Shell program; the platform shell when unset
    pub shell: Option<String>,
    /// Arguments placed before the command line
    pub shell_args: Vec<String>,
    /// Extra environment variables for commands
    pub env: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_success_but_no_output_message: false,
            success_but_no_output_message: DEFAULT_NO_OUTPUT_MESSAGE.to_string(),
            default_prompt: DEFAULT_PROMPT.to_string(),
            default_title: DEFAULT_TITLE.to_string(),
            panel_name: DEFAULT_PANEL_NAME.to_string(),
            exit_status: ExitStatusPolicy::default(),
            strip_ansi: true,
            shell: None,
            shell_args: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub const FILENAME: &'static str = "settings.toml";

    /// Location of the user settings file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("shellcommand").join(Self::FILENAME))
    }

    /// Load the user settings, falling back to defaults when there is no file
    pub fn load() -> Result<Self, SettingsError> {
        let path = Self::default_path().ok_or(SettingsError::NoConfigDir)?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            tracing::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings = toml::from_str(&content)?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Save to the user settings file, returning its path
    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        let path = Self::default_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The placeholder policy for silent successes
    pub fn no_output_policy(&self) -> NoOutputPolicy {
        NoOutputPolicy {
            show_message: self.show_success_but_no_output_message,
            message: self.success_but_no_output_message.clone(),
        }
    }

    pub fn delivery_options(&self) -> DeliveryOptions {
        DeliveryOptions {
            strip_ansi: self.strip_ansi,
            no_output: self.no_output_policy(),
            exit_status: self.exit_status,
        }
    }

    pub fn shell(&self) -> Shell {
        match &self.shell {
            Some(program) => Shell::custom(program.clone(), self.shell_args.iter().cloned()),
            None => Shell::system(),
        }
    }

    /// A runner configured with the shell and environment from these settings
    pub fn runner(&self) -> CommandRunner {
        self.env
            .iter()
            .fold(CommandRunner::new().with_shell(self.shell()), |runner, (k, v)| {
                runner.with_env(k.clone(), v.clone())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(!settings.show_success_but_no_output_message);
        assert_eq!(settings.default_prompt, DEFAULT_PROMPT);
        assert_eq!(settings.default_title, DEFAULT_TITLE);
        assert_eq!(settings.panel_name, "ShellCommand");
        assert_eq!(settings.exit_status, ExitStatusPolicy::Silent);
        assert_eq!(settings.shell(), Shell::system());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(Settings::FILENAME);
        std::fs::write(
            &path,
            "show_success_but_no_output_message = true\nexit_status = \"annotate\"\n",
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert!(settings.show_success_but_no_output_message);
        assert_eq!(settings.exit_status, ExitStatusPolicy::Annotate);
        assert_eq!(settings.default_title, DEFAULT_TITLE);

        let policy = settings.no_output_policy();
        assert_eq!(policy.placeholder(), Some(DEFAULT_NO_OUTPUT_MESSAGE));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(Settings::FILENAME);

        let mut settings = Settings::default();
        settings.shell = Some("bash".to_string());
        settings.shell_args = vec!["-lc".to_string()];
        settings.env.insert("PAGER".to_string(), "cat".to_string());
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.shell(), Shell::custom("bash", ["-lc"]));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(Settings::FILENAME);
        std::fs::write(&path, "strip_ansi = \"maybe\"").unwrap();

        assert!(matches!(
            Settings::load_from(&path),
            Err(SettingsError::Parse(_))
        ));
    }
}

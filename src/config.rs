use crate::browser::BrowserOptions;
use eyre::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_OUTPUT: &str = "chat_data.json";
pub const DEFAULT_BASE_URL: &str = "https://chat.deepseek.com";
pub const DEFAULT_READY_SELECTOR: &str = "#chat-input";
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 120;

/// Optional settings read from `config.toml`.
#[derive(Deserialize, Default, Debug)]
pub struct FileConfig {
    pub output: Option<PathBuf>,
    pub base_url: Option<String>,
    pub ready_selector: Option<String>,
    pub login_timeout_secs: Option<u64>,
    pub webdriver_url: Option<String>,
    pub chromedriver: Option<PathBuf>,
    pub profile_dir: Option<PathBuf>,
}

/// Everything a run needs, already resolved.
/// This decouples the run from where each setting came from (CLI/config file).
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub output: PathBuf,
    pub base_url: String,
    pub ready_selector: String,
    pub login_timeout: Duration,
    pub browser: BrowserOptions,
}

impl ExportConfig {
    /// CLI > config file > built-in default.
    pub fn resolve(cli_output: Option<PathBuf>, file: FileConfig) -> Self {
        Self {
            output: cli_output
                .or(file.output)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
            base_url: file
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            ready_selector: file
                .ready_selector
                .unwrap_or_else(|| DEFAULT_READY_SELECTOR.to_string()),
            login_timeout: Duration::from_secs(
                file.login_timeout_secs.unwrap_or(DEFAULT_LOGIN_TIMEOUT_SECS),
            ),
            browser: BrowserOptions {
                webdriver_url: file.webdriver_url,
                chromedriver: file
                    .chromedriver
                    .unwrap_or_else(|| PathBuf::from("chromedriver")),
                profile_dir: file.profile_dir,
            },
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("deepseek-chat-export/config.toml"))
}

/// Read `path` if it exists; a missing file means all defaults.
pub fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
    match path.filter(|p| p.exists()) {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_any_config() {
        let cfg = ExportConfig::resolve(None, FileConfig::default());
        assert_eq!(cfg.output, PathBuf::from("chat_data.json"));
        assert_eq!(cfg.base_url, "https://chat.deepseek.com");
        assert_eq!(cfg.ready_selector, "#chat-input");
        assert_eq!(cfg.login_timeout, Duration::from_secs(120));
        assert_eq!(cfg.browser.chromedriver, PathBuf::from("chromedriver"));
        assert!(cfg.browser.webdriver_url.is_none());
    }

    #[test]
    fn cli_output_beats_config_file() {
        let file = FileConfig {
            output: Some("from-file.json".into()),
            ..Default::default()
        };
        let cfg = ExportConfig::resolve(Some("from-cli.json".into()), file);
        assert_eq!(cfg.output, PathBuf::from("from-cli.json"));

        let file = FileConfig {
            output: Some("from-file.json".into()),
            ..Default::default()
        };
        let cfg = ExportConfig::resolve(None, file);
        assert_eq!(cfg.output, PathBuf::from("from-file.json"));
    }

    #[test]
    fn loads_toml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "login_timeout_secs = 300\nwebdriver_url = \"http://localhost:4444\"\n",
        )
        .unwrap();

        let cfg = ExportConfig::resolve(None, load_file_config(Some(&path)).unwrap());
        assert_eq!(cfg.login_timeout, Duration::from_secs(300));
        assert_eq!(cfg.browser.webdriver_url.as_deref(), Some("http://localhost:4444"));
    }

    #[test]
    fn missing_file_is_default_but_broken_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        assert!(load_file_config(Some(&path)).unwrap().output.is_none());
        assert!(load_file_config(None).unwrap().output.is_none());

        fs::write(&path, "login_timeout_secs = \"soon\"").unwrap();
        assert!(load_file_config(Some(&path)).is_err());
    }
}

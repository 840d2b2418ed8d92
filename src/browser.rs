//! The live browser session used to log in and issue API calls.
//!
//! The WebDriver client is async; a private current-thread runtime drives it
//! so the rest of the program stays synchronous. Dropping the session closes
//! the browser and stops any chromedriver we launched.

use crate::api::{ApiError, CredentialSupplier, ScriptRunner};
use eyre::{Context, Result, eyre};
use fantoccini::wd::Capabilities;
use fantoccini::{Client, ClientBuilder, Locator};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::runtime::Runtime;

const DRIVER_PORT: u16 = 9515;
const CONNECT_ATTEMPTS: u32 = 20;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(250);

const TOKEN_SCRIPT: &str = r#"
const raw = localStorage.getItem('userToken');
if (!raw) return null;
try {
    const parsed = JSON.parse(raw);
    return (parsed && parsed.value) || null;
} catch (e) {
    return null;
}
"#;

/// How to obtain a browser.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Connect here instead of launching chromedriver.
    pub webdriver_url: Option<String>,
    pub chromedriver: PathBuf,
    /// Overrides profile auto-detection.
    pub profile_dir: Option<PathBuf>,
}

pub struct BrowserSession {
    runtime: Runtime,
    client: Option<Client>,
    driver: Option<Child>,
}

impl BrowserSession {
    pub fn start(options: &BrowserOptions) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .wrap_err("Failed to start async runtime")?;

        let browser_major = detect_browser_major();
        match browser_major {
            Some(major) => tracing::info!(major, "detected installed browser"),
            None => tracing::warn!("neither chromium nor google-chrome found; not pinning a driver version"),
        }

        let profile_dir = options.profile_dir.clone().or_else(detect_profile_dir);
        match &profile_dir {
            Some(dir) => tracing::info!(profile = %dir.display(), "reusing browser profile"),
            None => tracing::info!("no browser profile found; starting without one"),
        }
        let caps = chrome_capabilities(profile_dir.as_deref());

        let (url, driver) = match &options.webdriver_url {
            Some(url) => (url.clone(), None),
            None => {
                let child = spawn_chromedriver(&options.chromedriver, browser_major)?;
                (format!("http://localhost:{DRIVER_PORT}"), Some(child))
            }
        };

        // Built before connecting so a failed connect still reaps the driver.
        let mut session = Self {
            runtime,
            client: None,
            driver,
        };
        let client = session.runtime.block_on(connect(&url, caps))?;
        session.client = Some(client);
        Ok(session)
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| eyre!("Browser session is closed"))
    }

    pub fn open(&self, url: &str) -> Result<()> {
        let client = self.client()?;
        self.runtime
            .block_on(client.goto(url))
            .wrap_err_with(|| format!("Failed to open {url}"))
    }

    /// Block until `selector` shows up, giving the user time to log in.
    pub fn wait_for_login(&self, selector: &str, timeout: Duration) -> Result<()> {
        let client = self.client()?;

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.set_message(format!(
            "Waiting for login (up to {}s)...",
            timeout.as_secs()
        ));
        spinner.enable_steady_tick(Duration::from_millis(80));

        let result = self.runtime.block_on(
            client
                .wait()
                .at_most(timeout)
                .for_element(Locator::Css(selector)),
        );
        spinner.finish_and_clear();

        result.map(|_| ()).wrap_err_with(|| {
            format!(
                "Login not detected: {selector} did not appear within {}s",
                timeout.as_secs()
            )
        })
    }
}

impl ScriptRunner for BrowserSession {
    fn run_script(&self, script: &str, args: Vec<Value>) -> Result<Value, ApiError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ApiError::Script("browser session is closed".into()))?;
        self.runtime
            .block_on(client.execute(script, args))
            .map_err(|e| ApiError::Script(e.to_string()))
    }
}

impl CredentialSupplier for BrowserSession {
    fn bearer_token(&self) -> Result<String, ApiError> {
        match self.run_script(TOKEN_SCRIPT, Vec::new())? {
            Value::String(token) if !token.is_empty() => Ok(token),
            _ => Err(ApiError::MissingToken),
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = self.runtime.block_on(client.close()) {
                tracing::warn!(error = %e, "browser did not shut down cleanly");
            }
            println!("Browser closed.");
        }
        if let Some(mut driver) = self.driver.take() {
            let _ = driver.kill();
            let _ = driver.wait();
        }
    }
}

async fn connect(url: &str, caps: Capabilities) -> Result<Client> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = ClientBuilder::rustls()
            .wrap_err("Failed to set up WebDriver TLS")?
            .capabilities(caps.clone())
            .connect(url)
            .await;
        match result {
            Ok(client) => return Ok(client),
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                tracing::debug!(attempt, error = %e, "WebDriver not ready yet");
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            Err(e) => {
                return Err(e)
                    .wrap_err_with(|| format!("Failed to start a browser session via {url}"));
            }
        }
    }
}

fn spawn_chromedriver(program: &Path, browser_major: Option<u32>) -> Result<Child> {
    let driver_major = command_major_version(program.as_os_str());
    if let (Some(browser), Some(driver)) = (browser_major, driver_major)
        && browser != driver
    {
        tracing::warn!(
            browser,
            driver,
            "chromedriver major version does not match the installed browser"
        );
    }

    Command::new(program)
        .arg(format!("--port={DRIVER_PORT}"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .wrap_err_with(|| format!("Failed to launch {}", program.display()))
}

/// Chrome capabilities: reuse `profile` if given and hide the automation flags.
pub fn chrome_capabilities(profile: Option<&Path>) -> Capabilities {
    let mut args = vec!["--disable-blink-features=AutomationControlled".to_string()];
    if let Some(dir) = profile {
        args.push(format!("--user-data-dir={}", dir.display()));
        args.push("--profile-directory=Default".to_string());
    }

    let mut caps = Capabilities::new();
    caps.insert("browserName".into(), json!("chrome"));
    caps.insert(
        "goog:chromeOptions".into(),
        json!({
            "args": args,
            "excludeSwitches": ["enable-automation"],
        }),
    );
    caps
}

fn detect_profile_dir() -> Option<PathBuf> {
    dirs::config_dir().and_then(|dir| first_existing_profile(&dir))
}

/// Chromium's profile first, then Google Chrome's.
pub fn first_existing_profile(config_dir: &Path) -> Option<PathBuf> {
    ["chromium", "google-chrome"]
        .iter()
        .map(|name| config_dir.join(name))
        .find(|dir| dir.is_dir())
}

fn detect_browser_major() -> Option<u32> {
    ["chromium", "google-chrome"]
        .iter()
        .find_map(|program| command_major_version(OsStr::new(program)))
}

fn command_major_version(program: &OsStr) -> Option<u32> {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_major_version(&String::from_utf8_lossy(&output.stdout))
}

/// Major component of the first dotted version in `output`,
/// e.g. `Chromium 120.0.6099.224 Arch Linux` -> 120.
pub fn parse_major_version(output: &str) -> Option<u32> {
    output
        .split_whitespace()
        .filter(|token| token.contains('.'))
        .find_map(|token| token.split('.').next()?.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_browser_and_driver_versions() {
        assert_eq!(parse_major_version("Chromium 120.0.6099.224 Arch Linux\n"), Some(120));
        assert_eq!(parse_major_version("Google Chrome 126.0.6478.126 \n"), Some(126));
        assert_eq!(
            parse_major_version("ChromeDriver 126.0.6478.126 (d36ace6122e0-refs/branch-heads/6478@{#1591})"),
            Some(126)
        );
        assert_eq!(parse_major_version("command not found"), None);
        assert_eq!(parse_major_version(""), None);
    }

    #[test]
    fn prefers_chromium_profile() {
        let dir = TempDir::new().unwrap();
        assert_eq!(first_existing_profile(dir.path()), None);

        std::fs::create_dir(dir.path().join("google-chrome")).unwrap();
        assert_eq!(
            first_existing_profile(dir.path()),
            Some(dir.path().join("google-chrome"))
        );

        std::fs::create_dir(dir.path().join("chromium")).unwrap();
        assert_eq!(
            first_existing_profile(dir.path()),
            Some(dir.path().join("chromium"))
        );
    }

    #[test]
    fn capabilities_include_profile_only_when_given() {
        let caps = chrome_capabilities(None);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(!args.iter().any(|a| a.as_str().unwrap().starts_with("--user-data-dir")));

        let caps = chrome_capabilities(Some(Path::new("/tmp/profile")));
        let args = &caps["goog:chromeOptions"]["args"];
        assert!(args.as_array().unwrap().contains(&json!("--user-data-dir=/tmp/profile")));
        assert!(args.as_array().unwrap().contains(&json!("--profile-directory=Default")));
        assert_eq!(
            caps["goog:chromeOptions"]["excludeSwitches"],
            json!(["enable-automation"])
        );
    }
}

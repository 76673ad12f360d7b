use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use crate::git::Credential;
use crate::paths::paths;

/// Environment variable that overrides the configured API token.
pub const TOKEN_ENV: &str = "SECTION_TOKEN";

/// Process-wide settings, loaded once before a deployment starts.
///
/// Example `config.toml`:
/// ```toml
/// token = "..."
/// account_id = 1234
/// application_id = 5678
/// timeout_secs = 120
/// ```
///
/// Every key is optional.
#[derive(Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub token: Option<String>,
    pub api_url: String,
    pub git_url: String,
    /// Overall deadline for one run; 0 disables it.
    pub timeout_secs: u64,
    /// Extra attempts for transient clone/push failures.
    pub transport_retries: u32,
    pub account_id: Option<u64>,
    pub application_id: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            token: None,
            api_url: "https://aperture.section.io/api/v1".to_string(),
            git_url: "https://aperture.section.io".to_string(),
            timeout_secs: 300,
            transport_retries: 2,
            account_id: None,
            application_id: None,
        }
    }
}

impl Settings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Overlay values from the environment. `lookup` is `std::env::var` in
    /// production.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(tok) = lookup(TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
            self.token = Some(tok);
        }
    }

    pub fn credential(&self) -> Result<Credential> {
        match self.token.as_deref().map(str::trim) {
            Some(tok) if !tok.is_empty() => Ok(Credential::new(tok)),
            _ => bail!(
                "no API token configured: set {} or `token` in the config file",
                TOKEN_ENV
            ),
        }
    }
}

/// Load settings from the default config location and the environment.
pub fn load_settings() -> Result<Settings> {
    let p = paths()?;
    let mut settings = load_settings_from(&p.config)?;
    settings.apply_env(|k| std::env::var(k).ok());
    Ok(settings)
}

/// Parse `path`; a missing file yields the defaults.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let txt = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Settings::default()),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    toml::from_str(&txt).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let td = tempdir().unwrap();
        let s = load_settings_from(&td.path().join("nope.toml")).unwrap();
        assert!(s == Settings::default());
        assert_eq!(s.timeout(), Some(Duration::from_secs(300)));
        assert_eq!(s.transport_retries, 2);
    }

    #[test]
    fn file_values_override_defaults() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.toml");
        fs::write(
            &p,
            r#"
token = "abc"
account_id = 42
application_id = 7
timeout_secs = 0
git_url = "https://git.example.com"
"#,
        )
        .unwrap();
        let s = load_settings_from(&p).unwrap();
        assert_eq!(s.token.as_deref(), Some("abc"));
        assert_eq!(s.account_id, Some(42));
        assert_eq!(s.application_id, Some(7));
        assert_eq!(s.timeout(), None);
        assert_eq!(s.git_url, "https://git.example.com");
        assert_eq!(s.api_url, Settings::default().api_url);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.toml");
        fs::write(&p, "timeout_secs = \"soon\"").unwrap();
        assert!(load_settings_from(&p).is_err());

        fs::write(&p, "tokn = \"typo\"").unwrap();
        assert!(load_settings_from(&p).is_err());
    }

    #[test]
    fn env_token_wins_over_file() {
        let mut s = Settings {
            token: Some("from-file".into()),
            ..Settings::default()
        };
        s.apply_env(|k| (k == TOKEN_ENV).then(|| "from-env".to_string()));
        assert_eq!(s.credential().unwrap().token(), "from-env");

        s.apply_env(|_| Some("   ".to_string()));
        assert_eq!(s.credential().unwrap().token(), "from-env");
    }

    #[test]
    fn missing_token_is_reported() {
        let s = Settings::default();
        let err = s.credential().unwrap_err();
        assert!(err.to_string().contains(TOKEN_ENV));
    }
}

use forage_core::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://api.inaturalist.org/v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InatConfig {
    /// API root without a trailing slash.
    pub base_url: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for InatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_seconds: 10,
            user_agent: format!("forage/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl InatConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.base_url.trim();
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(ConfigError::Invalid(format!(
                "base_url `{}` must be an http(s) URL",
                self.base_url
            )));
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("user_agent must not be empty".into()));
        }
        Ok(())
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

use anyhow::{anyhow, Result};
use url::Url;

#[derive(Clone, Debug)]
pub struct ExplorerConfig {
    pub api_base: String,
    pub page_limit: u32,
    pub top_n: usize,
    pub options_ttl_secs: u64,
    /// No timeout unless configured.
    pub http_timeout_secs: Option<u64>,
    /// Transport-level retries for retryable failures; 0 disables.
    pub http_retries: u32,
    /// Substitute a labeled placeholder series when a chart has no data.
    pub demo_series: bool,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000/api".to_string(),
            page_limit: 20,
            top_n: 10,
            options_ttl_secs: 3600,
            http_timeout_secs: None,
            http_retries: 0,
            demo_series: false,
        }
    }
}

impl ExplorerConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            api_base: std::env::var("EXPLORER_API_BASE").unwrap_or(d.api_base),
            page_limit: std::env::var("EXPLORER_PAGE_LIMIT").ok().and_then(|v| v.parse().ok()).unwrap_or(d.page_limit),
            top_n: std::env::var("EXPLORER_TOP_N").ok().and_then(|v| v.parse().ok()).unwrap_or(d.top_n),
            options_ttl_secs: std::env::var("EXPLORER_OPTIONS_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.options_ttl_secs),
            http_timeout_secs: std::env::var("EXPLORER_HTTP_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()),
            http_retries: std::env::var("EXPLORER_HTTP_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(d.http_retries),
            demo_series: std::env::var("EXPLORER_DEMO_SERIES").map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes")).unwrap_or(false),
        }
    }

    /// Parsed API base. Must be an absolute http(s) URL.
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.api_base)
            .map_err(|e| anyhow!("invalid EXPLORER_API_BASE {:?}: {}", self.api_base, e))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(anyhow!("unsupported scheme {:?} in EXPLORER_API_BASE", other)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        if self.page_limit == 0 {
            return Err(anyhow!("EXPLORER_PAGE_LIMIT must be > 0"));
        }
        if self.top_n == 0 {
            return Err(anyhow!("EXPLORER_TOP_N must be > 0"));
        }
        Ok(())
    }
}

use thiserror::Error;

pub const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type, Authorization, X-API-Token";
pub const PREFLIGHT_MAX_AGE_SECONDS: u32 = 86400;

pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "https://dashy-8ke.pages.dev",
    "http://localhost:8080",
    "http://localhost:4000",
];

#[derive(Error, Debug, PartialEq, Eq)]
#[error("At least one allowed origin is required")]
pub struct EmptyOriginList;

/// Exact-match origin allow-list. Unknown origins are answered with the first
/// listed origin rather than a wildcard, so browsers block them.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: Vec<String>,
}

impl CorsPolicy {
    pub fn new<I, S>(origins: I) -> Result<Self, EmptyOriginList>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed_origins: Vec<String> = origins
            .into_iter()
            .map(Into::into)
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if allowed_origins.is_empty() {
            return Err(EmptyOriginList);
        }
        Ok(Self { allowed_origins })
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    pub fn allow_origin(&self, request_origin: Option<&str>) -> &str {
        request_origin
            .and_then(|origin| self.allowed_origins.iter().find(|o| *o == origin))
            .unwrap_or(&self.allowed_origins[0])
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect(),
        }
    }
}

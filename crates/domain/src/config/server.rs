use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP listener
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `[server]`: where `agentchain serve` listens and how callers are
/// identified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// Env var read once at startup. A non-empty value turns on the bearer
    /// gate for every route except `/v1/health`; unset leaves the API open.
    #[serde(default = "d_api_token_env")]
    pub api_token_env: String,
    /// Header the fronting auth proxy uses to pass the numeric user id.
    #[serde(default = "d_user_header")]
    pub user_header: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Absent means no per-IP throttling.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            api_token_env: d_api_token_env(),
            user_header: d_user_header(),
            cors: CorsConfig::default(),
            rate_limit: None,
        }
    }
}

/// Token bucket per client IP: refills at `requests_per_second`, holds at
/// most `burst_size`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u64,
    pub burst_size: u32,
}

/// Browser origins allowed to call the API. An entry such as
/// `http://localhost:*` matches any port on that host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    /// A lone `"*"` entry opens the API to every origin.
    pub fn allows_any(&self) -> bool {
        matches!(self.allowed_origins.as_slice(), [only] if only == "*")
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    5000
}
fn d_api_token_env() -> String {
    "AC_API_TOKEN".into()
}
fn d_user_header() -> String {
    "x-user-id".into()
}
fn d_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".into(),
        "http://localhost:*".into(),
        "http://127.0.0.1:*".into(),
    ]
}

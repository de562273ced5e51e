use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 3978;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Fixed wait budget for the sign-in prompt.
pub const SIGNIN_PROMPT_TIMEOUT_MS: u64 = 300_000;
/// Upper bound accepted for `bot.prompt_timeout_ms` (one day).
pub const MAX_PROMPT_TIMEOUT_MS: u64 = 86_400_000;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
pub const DEFAULT_PROFILE_URL: &str = "https://graph.microsoft.com/v1.0/me";
pub const DEFAULT_AUGMENTED_SETTING_KEY: &str = "SETTING.WSTEAMS.BOT.AI_LIBRARY.ACCESS";

/// Top-level config (warden.toml + WARDEN_* env overrides).
///
/// Built once at startup and handed to each component by value or `Arc`;
/// nothing reads the environment after `load` returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub token_service: TokenServiceConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Sign-in prompt and trust settings for the bot itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// OAuth connection name registered with the platform token service.
    #[serde(default)]
    pub connection_name: String,
    #[serde(default = "default_signin_text")]
    pub signin_text: String,
    #[serde(default = "default_signin_button")]
    pub signin_button: String,
    #[serde(default = "default_prompt_timeout_ms")]
    pub prompt_timeout_ms: u64,
    /// Local development: every turn is treated as coming from a trusted identity.
    #[serde(default)]
    pub local_mode: bool,
    /// Sender or recipient ids that skip authentication (internal callers).
    #[serde(default)]
    pub trusted_ids: Vec<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            connection_name: String::new(),
            signin_text: default_signin_text(),
            signin_button: default_signin_button(),
            prompt_timeout_ms: SIGNIN_PROMPT_TIMEOUT_MS,
            local_mode: false,
            trusted_ids: Vec::new(),
        }
    }
}

/// Which token is presented as the OBO assertion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OboAssertion {
    #[default]
    Platform,
    Backend,
}

/// Middle-tier app registration used for the on-behalf-of exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_authority")]
    pub authority: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub downstream_scope: String,
    #[serde(default)]
    pub obo_assertion: OboAssertion,
    #[serde(default = "default_profile_url")]
    pub downstream_profile_url: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            authority: default_authority(),
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            downstream_scope: String::new(),
            obo_assertion: OboAssertion::Platform,
            downstream_profile_url: default_profile_url(),
        }
    }
}

impl IdentityConfig {
    /// `{authority}/{tenant}/oauth2/v2.0/token`
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        )
    }

    /// `{authority}/{tenant}/oauth2/v2.0/authorize`
    pub fn authorize_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/authorize",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

/// Federated backend identity service (platform token → backend token) and
/// the settings service that sits behind it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub token_url: String,
    pub settings_url: Option<String>,
}

/// Platform user-token service. When `base_url` is unset an in-process
/// store is used, which only makes sense in `local_mode`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenServiceConfig {
    pub base_url: Option<String>,
    pub app_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// Process-level toggle for the augmented dispatch path.
    #[serde(default)]
    pub augmented_dispatch: bool,
    /// Per-tenant setting consulted before taking the augmented path.
    #[serde(default = "default_augmented_setting_key")]
    pub augmented_setting_key: String,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            augmented_dispatch: false,
            augmented_setting_key: default_augmented_setting_key(),
        }
    }
}

/// Timeout and retry budget for every outbound token/settings call.
///
/// `max_attempts = 1` means fail-fast (no retry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StateBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackend,
    /// Attempts per commit (conversation state and user state independently).
    #[serde(default = "default_commit_attempts")]
    pub commit_attempts: u32,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::Sqlite,
            commit_attempts: default_commit_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_signin_text() -> String {
    "Please click 'I agree' to authorise Workspace to use your Microsoft account details."
        .to_string()
}
fn default_signin_button() -> String {
    "I agree".to_string()
}
fn default_prompt_timeout_ms() -> u64 {
    SIGNIN_PROMPT_TIMEOUT_MS
}
fn default_authority() -> String {
    DEFAULT_AUTHORITY.to_string()
}
fn default_profile_url() -> String {
    DEFAULT_PROFILE_URL.to_string()
}
fn default_augmented_setting_key() -> String {
    DEFAULT_AUGMENTED_SETTING_KEY.to_string()
}
fn default_http_timeout_ms() -> u64 {
    DEFAULT_HTTP_TIMEOUT_MS
}
fn default_max_attempts() -> u32 {
    1
}
fn default_retry_base_delay_ms() -> u64 {
    200
}
fn default_commit_attempts() -> u32 {
    3
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.warden/warden.db", home)
}

impl WardenConfig {
    /// Load config from a TOML file with WARDEN_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `WARDEN_IDENTITY__CLIENT_SECRET`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        tracing::debug!(path = %path, "loading configuration");

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("WARDEN_").split("__")),
        )
    }

    /// Extract from an already-assembled figment (used by `load` and tests).
    pub fn from_figment(figment: Figment) -> crate::error::Result<Self> {
        figment
            .extract()
            .map_err(|e| crate::error::WardenError::Config(e.to_string()))
    }

    /// Fail-fast validation run once at process start.
    ///
    /// Reports every missing required value at once rather than the first.
    pub fn validate(&self) -> crate::error::Result<()> {
        let mut missing: Vec<&str> = Vec::new();
        let required = [
            ("bot.connection_name", &self.bot.connection_name),
            ("identity.tenant_id", &self.identity.tenant_id),
            ("identity.client_id", &self.identity.client_id),
            ("identity.client_secret", &self.identity.client_secret),
            ("identity.downstream_scope", &self.identity.downstream_scope),
            ("backend.token_url", &self.backend.token_url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                missing.push(name);
            }
        }
        let token_service_set = self
            .token_service
            .base_url
            .as_deref()
            .is_some_and(|u| !u.trim().is_empty());
        if !self.bot.local_mode && !token_service_set {
            missing.push("token_service.base_url");
        }
        if !missing.is_empty() {
            return Err(crate::error::WardenError::Config(format!(
                "missing required configuration: {}",
                missing.join(", ")
            )));
        }

        if self.bot.prompt_timeout_ms == 0 || self.bot.prompt_timeout_ms > MAX_PROMPT_TIMEOUT_MS {
            return Err(crate::error::WardenError::Config(format!(
                "bot.prompt_timeout_ms must be between 1 and {MAX_PROMPT_TIMEOUT_MS}"
            )));
        }
        if self.http.max_attempts == 0 || self.state.commit_attempts == 0 {
            return Err(crate::error::WardenError::Config(
                "http.max_attempts and state.commit_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.warden/warden.toml", home)
}

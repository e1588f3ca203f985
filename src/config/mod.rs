//! Configuration management.

use secrecy::SecretString;
use serde::Deserialize;

/// Main configuration for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: String,
    /// Port to listen on.
    pub port: u16,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Identity resolution configuration.
    pub identity: IdentityConfig,
    /// Episodic backend configuration.
    pub episodic: EpisodicConfig,
    /// Decision model configuration.
    pub llm: LlmConfig,
    /// Consolidation configuration.
    pub consolidation: ConsolidationConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Authentication configuration.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Static gateway token accepted alongside issued tokens.
    pub static_token: Option<SecretString>,
    /// Username for the login endpoint.
    pub username: Option<String>,
    /// Password for the login endpoint.
    pub password: Option<SecretString>,
    /// Lifetime of issued tokens in seconds. `None` means no expiry.
    pub token_ttl_secs: Option<u64>,
}

/// Identity resolution configuration.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// What to do when no user identity is supplied.
    pub policy: IdentityPolicy,
    /// User substituted under the permissive policy.
    pub default_user_id: String,
    /// Session substituted under the permissive policy.
    pub default_session_id: String,
    /// Group id stamped on every resolved session.
    pub group_id: Option<String>,
    /// Agent ids stamped on every resolved session.
    pub agent_ids: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            policy: IdentityPolicy::Permissive,
            default_user_id: "default_user".to_string(),
            default_session_id: "default_session".to_string(),
            group_id: None,
            agent_ids: Vec::new(),
        }
    }
}

/// Behavior when a request carries no user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityPolicy {
    /// Substitute the configured default identity.
    #[default]
    Permissive,
    /// Reject the request.
    Strict,
}

impl IdentityPolicy {
    /// Parses a policy string, defaulting to permissive.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "strict" => Self::Strict,
            _ => Self::Permissive,
        }
    }
}

/// Episodic backend configuration.
#[derive(Debug, Clone)]
pub struct EpisodicConfig {
    /// Base URL of the episodic memory service.
    pub base_url: String,
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
}

impl Default for EpisodicConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Decision model configuration.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    /// Model name.
    pub model: Option<String>,
    /// API key.
    pub api_key: Option<String>,
    /// Base URL for self-hosted or compatible endpoints.
    pub base_url: Option<String>,
    /// Request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
}

/// Consolidation configuration.
#[derive(Debug, Clone)]
pub struct ConsolidationConfig {
    /// Whether consolidation runs after adds at all.
    pub enabled: bool,
    /// Cap on candidates shown to the model per round.
    pub max_candidates: usize,
    /// How to treat candidates the decision leaves uncovered.
    pub coverage: CoveragePolicy,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_candidates: 10,
            coverage: CoveragePolicy::Warn,
        }
    }
}

/// Treatment of candidate ids a decision neither keeps nor cites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoveragePolicy {
    /// Uncovered candidates are removed, counted, and logged.
    #[default]
    Warn,
    /// Any uncovered candidate rejects the whole decision.
    Reject,
}

impl CoveragePolicy {
    /// Parses a coverage policy string, defaulting to warn.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "reject" => Self::Reject,
            _ => Self::Warn,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output format: "pretty" or "json".
    pub format: String,
    /// Default filter directive when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "pretty".to_string(),
            filter: "info".to_string(),
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Gateway section.
    pub gateway: Option<ConfigFileGateway>,
    /// Auth section.
    pub auth: Option<ConfigFileAuth>,
    /// Identity section.
    pub identity: Option<ConfigFileIdentity>,
    /// Episodic backend section.
    pub episodic: Option<ConfigFileEpisodic>,
    /// LLM section.
    pub llm: Option<ConfigFileLlm>,
    /// Consolidation section.
    pub consolidation: Option<ConfigFileConsolidation>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Gateway section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileGateway {
    /// Bind address.
    pub bind_addr: Option<String>,
    /// Listen port.
    pub port: Option<u16>,
}

/// Auth section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileAuth {
    /// Static token.
    pub static_token: Option<String>,
    /// Login username.
    pub username: Option<String>,
    /// Login password.
    pub password: Option<String>,
    /// Token TTL in seconds.
    pub token_ttl_secs: Option<u64>,
}

/// Identity section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileIdentity {
    /// Policy name.
    pub policy: Option<String>,
    /// Default user id.
    pub default_user_id: Option<String>,
    /// Default session id.
    pub default_session_id: Option<String>,
    /// Group id.
    pub group_id: Option<String>,
    /// Agent ids.
    pub agent_ids: Option<Vec<String>>,
}

/// Episodic section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileEpisodic {
    /// Base URL.
    pub base_url: Option<String>,
    /// Timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// LLM section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLlm {
    /// Model name.
    pub model: Option<String>,
    /// API key.
    pub api_key: Option<String>,
    /// Base URL.
    pub base_url: Option<String>,
    /// Request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
}

/// Consolidation section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileConsolidation {
    /// Enabled flag.
    pub enabled: Option<bool>,
    /// Candidate cap.
    pub max_candidates: Option<usize>,
    /// Coverage policy name.
    pub coverage: Option<String>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Output format.
    pub format: Option<String>,
    /// Filter directive.
    pub filter: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8000,
            auth: AuthConfig::default(),
            identity: IdentityConfig::default(),
            episodic: EpisodicConfig::default(),
            llm: LlmConfig::default(),
            consolidation: ConsolidationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &std::path::Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Internal(format!("read config file: {e}")))?;

        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|e| crate::Error::Internal(format!("parse config file: {e}")))?;

        Ok(Self::from_config_file(file).with_env_overrides())
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/memgate/` on macOS)
    /// 2. XDG config dir (`~/.config/memgate/` for Unix compatibility)
    ///
    /// Returns default configuration (plus environment overrides) if no
    /// config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default().with_env_overrides();
        };

        let platform_config = base_dirs.config_dir().join("memgate").join("config.toml");
        if platform_config.exists() {
            if let Ok(config) = Self::load_from_file(&platform_config) {
                return config;
            }
        }

        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("memgate")
            .join("config.toml");
        if xdg_config.exists() {
            if let Ok(config) = Self::load_from_file(&xdg_config) {
                return config;
            }
        }

        Self::default().with_env_overrides()
    }

    /// Converts a `ConfigFile` to `GatewayConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(gateway) = file.gateway {
            if let Some(bind_addr) = gateway.bind_addr {
                config.bind_addr = bind_addr;
            }
            if let Some(port) = gateway.port {
                config.port = port;
            }
        }
        if let Some(auth) = file.auth {
            config.auth.static_token = auth.static_token.map(SecretString::from);
            config.auth.username = auth.username;
            config.auth.password = auth.password.map(SecretString::from);
            config.auth.token_ttl_secs = auth.token_ttl_secs;
        }
        if let Some(identity) = file.identity {
            if let Some(policy) = identity.policy {
                config.identity.policy = IdentityPolicy::parse(&policy);
            }
            if let Some(user) = identity.default_user_id {
                config.identity.default_user_id = user;
            }
            if let Some(session) = identity.default_session_id {
                config.identity.default_session_id = session;
            }
            config.identity.group_id = identity.group_id;
            if let Some(agent_ids) = identity.agent_ids {
                config.identity.agent_ids = agent_ids;
            }
        }
        if let Some(episodic) = file.episodic {
            if let Some(base_url) = episodic.base_url {
                config.episodic.base_url = base_url;
            }
            if let Some(timeout_ms) = episodic.timeout_ms {
                config.episodic.timeout_ms = timeout_ms;
            }
        }
        if let Some(llm) = file.llm {
            config.llm.model = llm.model;
            config.llm.api_key = llm.api_key;
            config.llm.base_url = llm.base_url;
            config.llm.timeout_ms = llm.timeout_ms;
            config.llm.connect_timeout_ms = llm.connect_timeout_ms;
        }
        if let Some(consolidation) = file.consolidation {
            if let Some(enabled) = consolidation.enabled {
                config.consolidation.enabled = enabled;
            }
            if let Some(max_candidates) = consolidation.max_candidates {
                config.consolidation.max_candidates = max_candidates;
            }
            if let Some(coverage) = consolidation.coverage {
                config.consolidation.coverage = CoveragePolicy::parse(&coverage);
            }
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format {
                config.logging.format = format;
            }
            if let Some(filter) = logging.filter {
                config.logging.filter = filter;
            }
        }

        config
    }

    /// Applies `MEMGATE_*` environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("MEMGATE_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.port = port;
            }
        }
        if let Ok(v) = std::env::var("MEMGATE_STATIC_TOKEN") {
            if !v.is_empty() {
                self.auth.static_token = Some(SecretString::from(v));
            }
        }
        if let Ok(v) = std::env::var("MEMGATE_EPISODIC_URL") {
            if !v.is_empty() {
                self.episodic.base_url = v;
            }
        }
        if let Ok(v) = std::env::var("MEMGATE_LLM_API_KEY") {
            if !v.is_empty() {
                self.llm.api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("MEMGATE_LLM_TIMEOUT_MS") {
            if let Ok(timeout_ms) = v.parse::<u64>() {
                self.llm.timeout_ms = Some(timeout_ms);
            }
        }
        self
    }

    /// Sets the listen port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the static gateway token.
    #[must_use]
    pub fn with_static_token(mut self, token: impl Into<String>) -> Self {
        self.auth.static_token = Some(SecretString::from(token.into()));
        self
    }

    /// Sets the episodic backend base URL.
    #[must_use]
    pub fn with_episodic_url(mut self, base_url: impl Into<String>) -> Self {
        self.episodic.base_url = base_url.into();
        self
    }
}

use anyhow::anyhow;
use anyhow::Result;
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "ListConfig::subscribers", deserialize_with = "subscribers_section")]
    pub subscribers: ListConfig,
    #[serde(default = "ListConfig::leaderboard", deserialize_with = "leaderboard_section")]
    pub leaderboard: ListConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub worker_threads: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 8080, worker_threads: Some(4) }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Github,
    Memory,
}

/// Where the list files live. `token` is normally supplied through `GITHUB_TOKEN`.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_repo")]
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            api_base: default_api_base(),
            owner: default_owner(),
            repo: default_repo(),
            branch: default_branch(),
            token: None,
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_api_base() -> String { "https://api.github.com".into() }
fn default_owner() -> String { "lxsoftroxs".into() }
fn default_repo() -> String { "lxsoftroxs.github.io".into() }
fn default_branch() -> String { "main".into() }
fn default_user_agent() -> String { format!("list_api/{}", env!("CARGO_PKG_VERSION")) }
fn default_request_timeout() -> u64 { 10 }

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff_base_ms: u64,
    #[serde(default)]
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: default_max_attempts(), backoff_base_ms: 0, backoff_max_ms: 0 }
    }
}

fn default_max_attempts() -> u32 { 2 }

/// Per-list settings: repository path, commit message and CORS origin.
#[derive(Debug, Clone)]
pub struct ListConfig {
    pub path: String,
    pub commit_message: String,
    pub allowed_origin: String,
    pub max_entries: usize,
    pub top_n: usize,
}

fn default_max_entries() -> usize { 100 }
fn default_top_n() -> usize { 10 }

/// A `[subscribers]` / `[leaderboard]` table; keys left out keep that list's defaults.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListSection {
    path: Option<String>,
    commit_message: Option<String>,
    allowed_origin: Option<String>,
    max_entries: Option<usize>,
    top_n: Option<usize>,
}

impl ListSection {
    fn over(self, base: ListConfig) -> ListConfig {
        ListConfig {
            path: self.path.unwrap_or(base.path),
            commit_message: self.commit_message.unwrap_or(base.commit_message),
            allowed_origin: self.allowed_origin.unwrap_or(base.allowed_origin),
            max_entries: self.max_entries.unwrap_or(base.max_entries),
            top_n: self.top_n.unwrap_or(base.top_n),
        }
    }
}

fn subscribers_section<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<ListConfig, D::Error> {
    Ok(ListSection::deserialize(d)?.over(ListConfig::subscribers()))
}

fn leaderboard_section<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<ListConfig, D::Error> {
    Ok(ListSection::deserialize(d)?.over(ListConfig::leaderboard()))
}

impl ListConfig {
    pub fn subscribers() -> Self {
        Self {
            path: "subscribers.json".into(),
            commit_message: "chore(subscribers): +1".into(),
            allowed_origin: "*".into(),
            max_entries: default_max_entries(),
            top_n: default_top_n(),
        }
    }

    pub fn leaderboard() -> Self {
        Self {
            path: "tetris_scores.json".into(),
            commit_message: "chore(tetris): leaderboard update".into(),
            allowed_origin: "https://lxsoftroxs.github.io".into(),
            max_entries: default_max_entries(),
            top_n: default_top_n(),
        }
    }
}

/// Read `CONFIG_PATH` (default `config.toml`); a missing file yields defaults.
pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    if std::path::Path::new(&path).exists() {
        load_from_file(&path)
    } else {
        Ok(default_config())
    }
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

pub fn default_config() -> AppConfig {
    AppConfig::default()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            retry: RetryConfig::default(),
            subscribers: ListConfig::subscribers(),
            leaderboard: ListConfig::leaderboard(),
        }
    }
}

impl AppConfig {
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = load_default()?;
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    /// Overlay environment variables; `lookup` is injectable for tests.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("SERVER_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(w) = lookup("TOKIO_WORKER_THREADS").and_then(|v| v.parse::<usize>().ok()) {
            self.server.worker_threads = Some(w);
        }
        match lookup("STORE_BACKEND").map(|b| b.to_ascii_lowercase()).as_deref() {
            Some("memory") => self.store.backend = StoreBackend::Memory,
            Some("github") => self.store.backend = StoreBackend::Github,
            _ => {}
        }
        if let Some(base) = lookup("GITHUB_API_BASE") {
            self.store.api_base = base;
        }
        if let Some(owner) = lookup("GITHUB_OWNER") {
            self.store.owner = owner;
        }
        if let Some(repo) = lookup("GITHUB_REPO") {
            self.store.repo = repo;
        }
        if let Some(branch) = lookup("GITHUB_BRANCH") {
            self.store.branch = branch;
        }
        if let Some(token) = lookup("GITHUB_TOKEN") {
            self.store.token = Some(token);
        }
        // 单一 ALLOWED_ORIGIN 同时覆盖两个端点
        if let Some(origin) = lookup("ALLOWED_ORIGIN") {
            self.subscribers.allowed_origin = origin.clone();
            self.leaderboard.allowed_origin = origin;
        }
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.server.normalize()?;
        self.store.normalize();
        self.store.validate()?;
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be >= 1"));
        }
        self.subscribers.validate("subscribers")?;
        self.leaderboard.validate("leaderboard")?;
        Ok(())
    }
}

impl ServerConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = "127.0.0.1".to_string();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be within 1..=65535"));
        }
        match self.worker_threads {
            Some(w) if w > 0 => {}
            _ => self.worker_threads = Some(4),
        }
        Ok(())
    }
}

impl StoreConfig {
    fn normalize(&mut self) {
        // 空 token 等同于未配置
        if self.token.as_deref().map(str::trim).is_some_and(str::is_empty) {
            self.token = None;
        }
        while self.api_base.ends_with('/') {
            self.api_base.pop();
        }
    }

    fn validate(&self) -> Result<()> {
        if self.backend == StoreBackend::Memory {
            return Ok(());
        }
        let lower = self.api_base.to_lowercase();
        if !(lower.starts_with("https://") || lower.starts_with("http://")) {
            return Err(anyhow!("store.api_base must start with http:// or https://"));
        }
        if self.owner.trim().is_empty() || self.repo.trim().is_empty() || self.branch.trim().is_empty() {
            return Err(anyhow!("store.owner, store.repo and store.branch must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("store.request_timeout_secs must be a positive number of seconds"));
        }
        Ok(())
    }

    /// Missing credential is reported per request, not at startup.
    pub fn is_configured(&self) -> bool {
        self.backend == StoreBackend::Memory || self.token.is_some()
    }
}

impl ListConfig {
    fn validate(&self, section: &str) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(anyhow!("{section}.path must not be empty"));
        }
        if self.commit_message.trim().is_empty() {
            return Err(anyhow!("{section}.commit_message must not be empty"));
        }
        if self.max_entries == 0 || self.top_n == 0 {
            return Err(anyhow!("{section}.max_entries and {section}.top_n must be >= 1"));
        }
        Ok(())
    }
}

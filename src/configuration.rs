use config::ConfigError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub password: PasswordSettings,
    #[serde(default)]
    pub refresh: RefreshSettings,
    pub webhook: WebhookSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Serve from process-local stores instead of Postgres
    #[serde(default)]
    pub use_memory_store: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    /// Server-level URL, used to create throwaway test databases
    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT authentication settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_expiry: i64,   // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_expiry: i64,  // seconds (e.g., 604800 for 7 days)
    pub issuer: String,
}

/// Current password hashing policy
///
/// Digests produced under weaker parameters are upgraded on the next
/// successful login.
#[derive(serde::Deserialize, Clone, Debug)]
pub struct PasswordSettings {
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
    /// Minimum acceptable cost for legacy bcrypt digests
    pub bcrypt_cost: u32,
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            argon2_memory_kib: 19456,
            argon2_iterations: 2,
            argon2_parallelism: 1,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct RefreshSettings {
    /// Secret mismatches tolerated before a refresh token is revoked
    pub max_secret_mismatches: u32,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            max_secret_mismatches: 1,
        }
    }
}

/// Payment provider callback settings
#[derive(serde::Deserialize, Clone)]
pub struct WebhookSettings {
    pub server_key: String,
}

/// Load settings from `configuration.yaml` (optional) overlaid with
/// `APP_`-prefixed environment variables, e.g. `APP_JWT__SECRET`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}

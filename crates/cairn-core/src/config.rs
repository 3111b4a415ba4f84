use anyhow::Result;
use config::Config;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub repository: RepositoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    /// Filesystem root of the served repository.
    pub root: String,
    /// Directory holding one file per open activity.
    pub activities_dir: String,
    /// Repository-relative URI prefix requests are addressed under.
    pub context: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    /// ## Summary
    /// Loads configuration from `.env` file and environment variables into a `Settings`.
    /// Environment variables take precedence over `.env` file values.
    ///
    /// ## Errors
    /// Returns an error if building the configuration or deserializing it fails.
    pub fn load() -> Result<Self> {
        Ok(Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8680)?
            .set_default("repository.root", "./repo")?
            .set_default("repository.activities_dir", "./repo/activities.d")?
            .set_default("logging.level", "debug")?
            // Env file
            .add_source(
                config::Environment::default()
                    .convert_case(config::Case::Snake)
                    .separator("_")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            // TOML file
            .add_source(config::File::with_name("config.toml").required(false))
            .build()?
            .try_deserialize::<Settings>()?)
    }
}

impl RepositoryConfig {
    /// Returns the URI prefix the repository is served under.
    #[must_use]
    pub fn context_path(&self) -> String {
        match &self.context {
            Some(context) if !context.is_empty() => {
                if context.starts_with('/') {
                    context.clone()
                } else {
                    format!("/{context}")
                }
            }
            _ => crate::constants::REPOS_ROUTE_PREFIX.to_string(),
        }
    }
}

/// ## Summary
/// Loads configuration from environment variables and `.env` file.
///
/// ## Errors
/// Returns an error if loading or deserializing the configuration fails.
pub fn load_config() -> Result<Settings> {
    dotenvy::dotenv().ok();

    Settings::load()
}

use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo
    /// Canales donde se aceptan comandos; vacío = todos
    pub allowed_channel_ids: Vec<u64>,

    // Audio
    pub default_volume: f32,
    pub idle_timeout: Duration,

    // Fuentes
    pub search_concurrency: usize,
    pub resolve_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("Falta DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("Falta APPLICATION_ID")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),
            allowed_channel_ids: parse_channel_ids(
                &std::env::var("ALLOWED_CHANNEL_IDS").unwrap_or_default(),
            )?,

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()
                .context("DEFAULT_VOLUME inválido")?,
            idle_timeout: env_duration("IDLE_TIMEOUT", "10s")?,

            // Fuentes
            search_concurrency: std::env::var("SEARCH_CONCURRENCY")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("SEARCH_CONCURRENCY inválido")?,
            resolve_timeout: env_duration("RESOLVE_TIMEOUT", "30s")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Timeouts and yt-dlp concurrency must be non-zero
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.idle_timeout.is_zero() {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.resolve_timeout.is_zero() {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.search_concurrency == 0 {
            anyhow::bail!("Search concurrency must be greater than 0");
        }

        Ok(())
    }

    /// ¿Se aceptan comandos en este canal?
    pub fn is_channel_allowed(&self, channel_id: u64) -> bool {
        self.allowed_channel_ids.is_empty() || self.allowed_channel_ids.contains(&channel_id)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the bot token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {}, Canales: {})\n  \
            Audio: {}% vol, desconexión tras {}\n  \
            Fuentes: {} yt-dlp en paralelo, timeout {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            if self.allowed_channel_ids.is_empty() {
                "todos".to_string()
            } else {
                self.allowed_channel_ids.len().to_string()
            },
            (self.default_volume * 100.0) as u32,
            humantime::format_duration(self.idle_timeout),
            self.search_concurrency,
            humantime::format_duration(self.resolve_timeout),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,
            allowed_channel_ids: Vec::new(),

            default_volume: 0.5,
            idle_timeout: Duration::from_secs(10),

            search_concurrency: 3,
            resolve_timeout: Duration::from_secs(30),
        }
    }
}

fn env_duration(key: &str, default: &str) -> Result<Duration> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    humantime::parse_duration(raw.trim()).with_context(|| format!("{} inválido: {}", key, raw))
}

/// Lista separada por comas; se ignoran entradas vacías
fn parse_channel_ids(raw: &str) -> Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<u64>()
                .with_context(|| format!("ID de canal inválido: {}", id))
        })
        .collect()
}

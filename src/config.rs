use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::audio::PlayerSettings;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub idle_timeout_secs: u64,

    // Resolución
    pub resolve_timeout_secs: u64,
    pub resolver_cache_size: usize,
    pub resolver_cache_ttl_secs: u64,
    pub ytdlp_path: PathBuf,
    pub ytdlp_cookies: Option<PathBuf>,

    // Interfaz
    pub queue_page_size: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración a partir de una función de búsqueda de variables
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            application_id: var("APPLICATION_ID")
                .context("APPLICATION_ID no está definido")?
                .trim()
                .parse()
                .context("APPLICATION_ID debe ser numérico")?,
            guild_id: var("GUILD_ID").and_then(|s| s.trim().parse().ok()),

            // Audio
            default_volume: parse_or(var("DEFAULT_VOLUME"), "DEFAULT_VOLUME", defaults.default_volume)?,
            idle_timeout_secs: parse_or(var("IDLE_TIMEOUT_SECS"), "IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)?,

            // Resolución
            resolve_timeout_secs: parse_or(
                var("RESOLVE_TIMEOUT_SECS"),
                "RESOLVE_TIMEOUT_SECS",
                defaults.resolve_timeout_secs,
            )?,
            resolver_cache_size: parse_or(
                var("RESOLVER_CACHE_SIZE"),
                "RESOLVER_CACHE_SIZE",
                defaults.resolver_cache_size,
            )?,
            resolver_cache_ttl_secs: parse_or(
                var("RESOLVER_CACHE_TTL_SECS"),
                "RESOLVER_CACHE_TTL_SECS",
                defaults.resolver_cache_ttl_secs,
            )?,
            ytdlp_path: var("YTDLP_PATH").map(PathBuf::from).unwrap_or(defaults.ytdlp_path),
            ytdlp_cookies: var("YTDLP_COOKIES").map(PathBuf::from),

            // Interfaz
            queue_page_size: parse_or(var("QUEUE_PAGE_SIZE"), "QUEUE_PAGE_SIZE", defaults.queue_page_size)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Timeouts must be greater than zero
    /// - Cache and page sizes must be greater than zero
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.idle_timeout_secs == 0 {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.resolve_timeout_secs == 0 {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.resolver_cache_size == 0 {
            anyhow::bail!("Resolver cache size must be greater than 0");
        }

        if self.resolver_cache_ttl_secs == 0 {
            anyhow::bail!("Resolver cache TTL must be greater than 0");
        }

        if self.queue_page_size == 0 {
            anyhow::bail!("Queue page size must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, idle timeout {}\n  \
            Resolver: {} (timeout {}, cookies: {})\n  \
            Cache: {} entries, TTL {}\n  \
            UI: {} entries per queue page",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0).round() as u32,
            humantime::format_duration(self.idle_timeout()),
            self.ytdlp_path.display(),
            humantime::format_duration(self.resolve_timeout()),
            if self.ytdlp_cookies.is_some() { "sí" } else { "no" },
            self.resolver_cache_size,
            humantime::format_duration(self.resolver_cache_ttl()),
            self.queue_page_size,
        )
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn resolver_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.resolver_cache_ttl_secs)
    }

    /// Parámetros del motor de reproducción derivados de la configuración
    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            idle_timeout: self.idle_timeout(),
            ..PlayerSettings::default()
        }
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} tiene un valor inválido: '{}'", key, raw)),
        None => Ok(default),
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

            // Audio defaults
            default_volume: 0.5,
            idle_timeout_secs: 300, // 5 minutos

            // Resolver defaults
            resolve_timeout_secs: 30,
            resolver_cache_size: 100,
            resolver_cache_ttl_secs: 1800, // 30 minutos
            ytdlp_path: "yt-dlp".into(),
            ytdlp_cookies: None,

            // UI defaults
            queue_page_size: 10,
        }
    }
}

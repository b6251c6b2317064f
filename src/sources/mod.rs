//! # Sources Module
//!
//! Turns free-text queries into playable stream metadata.
//!
//! - [`Resolver`]: the contract the playback engine consumes
//! - [`ytdlp::YtDlpResolver`]: resolves through the `yt-dlp` executable
//! - [`cached::CachedResolver`]: memoizes successful resolutions for a while
//!
//! Resolution is network-bound and can take seconds. The engine always runs
//! it on its own task, so a slow lookup for one guild never stalls another.

pub mod cached;
pub mod ytdlp;

use async_trait::async_trait;
use std::time::Duration;

use crate::audio::error::MediaError;

pub use cached::CachedResolver;
pub use ytdlp::YtDlpResolver;

/// Contrato del resolvedor de consultas
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resuelve una consulta (texto libre o URL) a un stream reproducible
    async fn resolve(&self, query: &str) -> Result<ResolvedTrack, MediaError>;
}

/// Metadatos de un track ya resuelto, listo para el transporte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTrack {
    pub title: String,
    pub stream_url: String,
    pub thumbnail: Option<String>,
    pub page_url: String,
    pub duration: Option<Duration>,
}

impl ResolvedTrack {
    pub fn new(title: impl Into<String>, stream_url: impl Into<String>, page_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            stream_url: stream_url.into(),
            thumbnail: None,
            page_url: page_url.into(),
            duration: None,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: String) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

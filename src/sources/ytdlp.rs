use async_trait::async_trait;
use serde::Deserialize;
use std::{path::PathBuf, process::Stdio, time::Duration};
use tracing::{debug, info, warn};

use super::{ResolvedTrack, Resolver};
use crate::audio::error::MediaError;

/// Resolvedor que delega en el ejecutable `yt-dlp`
pub struct YtDlpResolver {
    executable: PathBuf,
    cookies: Option<PathBuf>,
    timeout: Duration,
}

/// Subconjunto del JSON que imprime `--dump-single-json`
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    url: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    entries: Option<Vec<YtDlpInfo>>,
}

impl YtDlpResolver {
    pub fn new(executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            cookies: None,
            timeout,
        }
    }

    pub fn with_cookies(mut self, cookies: Option<PathBuf>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Arma los argumentos para una consulta
    fn build_args(&self, query: &str) -> Vec<String> {
        let mut args: Vec<String> = [
            "--dump-single-json",
            "--format",
            "bestaudio/best",
            "--default-search",
            "ytsearch",
            "--no-playlist",
            "--no-check-certificate",
            "--no-warnings",
            "--quiet",
            "--socket-timeout",
            "15",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if let Some(cookies) = &self.cookies {
            args.push("--cookies".to_string());
            args.push(cookies.display().to_string());
        }

        // Las URLs van tal cual; el resto se busca como texto
        if url::Url::parse(query).is_ok() {
            args.push(query.to_string());
        } else {
            args.push(format!("ytsearch1:{}", query));
        }

        args
    }

    async fn run(&self, query: &str) -> Result<ResolvedTrack, MediaError> {
        let mut cmd = tokio::process::Command::new(&self.executable);
        cmd.args(self.build_args(query))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Si la resolución se cancela, el proceso muere con el future
            .kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| {
            MediaError::Unsupported(format!("no se pudo ejecutar {}: {}", self.executable.display(), e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr));
        }

        parse_output(&String::from_utf8_lossy(&output.stdout), query)
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<ResolvedTrack, MediaError> {
        debug!("🔎 Resolviendo con yt-dlp: {}", query);

        match tokio::time::timeout(self.timeout, self.run(query)).await {
            Ok(Ok(track)) => {
                info!("✅ Resuelto '{}' -> {}", query, track.title);
                Ok(track)
            }
            Ok(Err(e)) => {
                warn!("❌ yt-dlp falló para '{}': {}", query, e);
                Err(e)
            }
            Err(_) => {
                warn!("⏰ Timeout resolviendo '{}'", query);
                Err(MediaError::Network(format!(
                    "yt-dlp no respondió en {}s",
                    self.timeout.as_secs()
                )))
            }
        }
    }
}

/// Convierte la salida JSON de yt-dlp en un track
fn parse_output(stdout: &str, query: &str) -> Result<ResolvedTrack, MediaError> {
    let info: YtDlpInfo = serde_json::from_str(stdout.trim())
        .map_err(|e| MediaError::Unsupported(format!("salida de yt-dlp ilegible: {}", e)))?;

    // Las búsquedas devuelven una lista; nos quedamos con la primera entrada
    let info = match info.entries {
        Some(entries) => entries
            .into_iter()
            .next()
            .ok_or_else(|| MediaError::NotFound(format!("sin resultados para '{}'", query)))?,
        None => info,
    };

    let stream_url = info
        .url
        .ok_or_else(|| MediaError::Unsupported(format!("'{}' no tiene stream de audio", query)))?;

    let mut track = ResolvedTrack::new(
        info.title.unwrap_or_else(|| "Título desconocido".to_string()),
        stream_url,
        info.webpage_url.unwrap_or_else(|| query.to_string()),
    );

    if let Some(thumbnail) = info.thumbnail.filter(|t| !t.is_empty()) {
        track = track.with_thumbnail(thumbnail);
    }
    if let Some(secs) = info.duration.filter(|d| d.is_finite() && *d > 0.0) {
        track = track.with_duration(Duration::from_secs_f64(secs));
    }

    Ok(track)
}

/// Clasifica el stderr de yt-dlp en una clase de fallo
fn classify_failure(stderr: &str) -> MediaError {
    let lower = stderr.to_lowercase();
    let reason = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("yt-dlp terminó con error")
        .trim()
        .to_string();

    if lower.contains("unsupported url") || lower.contains("drm") {
        MediaError::Unsupported(reason)
    } else if lower.contains("video unavailable")
        || lower.contains("private video")
        || lower.contains("no video results")
        || lower.contains("http error 404")
        || lower.contains("does not exist")
    {
        MediaError::NotFound(reason)
    } else if lower.contains("sign in to confirm") || lower.contains("http error 403") {
        MediaError::ConnectionDenied(reason)
    } else {
        MediaError::Network(reason)
    }
}

use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use serenity::model::id::UserId;
use songbird::input::{Compose, Input, YoutubeDl};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use super::{MusicSource, Resolved, SourceResolver, TrackMetadata};
use crate::audio::{ResolutionError, Track};

/// Cliente para interactuar con YouTube/yt-dlp
pub struct YouTubeClient {
    http: reqwest::Client,
    // Limitar procesos yt-dlp concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
    resolve_timeout: Duration,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: String,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    is_live: Option<bool>,
}

impl YouTubeClient {
    pub fn new(concurrency: usize, resolve_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            rate_limiter: Semaphore::new(concurrency.max(1)),
            resolve_timeout,
        }
    }

    /// Obtiene información de una URL específica
    pub async fn get_info(&self, url: &str) -> Result<TrackMetadata> {
        debug!("📊 Obteniendo info de: {}", url);
        let stdout = self
            .run_ytdlp(&["--no-playlist", "--dump-json", "--no-warnings", url])
            .await?;

        let info: YtDlpInfo =
            serde_json::from_str(&stdout).context("Error al parsear respuesta de yt-dlp")?;
        info_to_metadata(info).context("yt-dlp no devolvió una URL para el video")
    }

    async fn run_ytdlp(&self, args: &[&str]) -> Result<String> {
        let _permit = self.rate_limiter.acquire().await?;

        let output = Command::new("yt-dlp")
            .args(args)
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Convierte YtDlpInfo a TrackMetadata. Las entradas planas de búsqueda
/// no traen `webpage_url`, solo el id.
fn info_to_metadata(info: YtDlpInfo) -> Option<TrackMetadata> {
    let url = info
        .webpage_url
        .or_else(|| info.url.filter(|url| url.starts_with("http")))
        .or_else(|| info.id.map(|id| format!("https://www.youtube.com/watch?v={id}")))?;

    Some(TrackMetadata {
        title: info.title,
        duration: info
            .duration
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64),
        thumbnail: info.thumbnail,
        url,
        is_live: info.is_live.unwrap_or(false),
    })
}

/// Una línea JSON por resultado; las líneas ilegibles se ignoran
fn parse_search_output(stdout: &str) -> Vec<TrackMetadata> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
        .filter_map(info_to_metadata)
        .collect()
}

#[async_trait]
impl MusicSource for YouTubeClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackMetadata>> {
        info!("🔍 Buscando en YouTube: {}", query);

        let search_query = format!("ytsearch{}:{}", limit.max(1), query);
        let stdout = self
            .run_ytdlp(&[
                "--no-playlist",
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        Ok(parse_search_output(&stdout))
    }

    async fn lookup(&self, query: &str, requested_by: UserId) -> Result<Track> {
        let query = query.trim();
        let metadata = if self.is_valid_url(query) {
            self.get_info(query).await?
        } else {
            self.search(query, 1)
                .await?
                .into_iter()
                .next()
                .with_context(|| format!("Sin resultados para '{}'", query))?
        };

        if metadata.is_live {
            warn!("📡 '{}' es una transmisión en vivo", metadata.title);
        }
        Ok(metadata.into_track(requested_by))
    }

    /// yt-dlp acepta cualquier URL http(s); YouTube es solo el caso común
    fn is_valid_url(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|parsed| matches!(parsed.scheme(), "http" | "https"))
            .unwrap_or(false)
    }
}

#[async_trait]
impl SourceResolver for YouTubeClient {
    type Stream = Input;

    async fn resolve(&self, track: &Track) -> Result<Resolved<Input>, ResolutionError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolutionError::Other(e.to_string()))?;

        debug!("🎵 Resolviendo stream para: {}", track.source());
        let mut source = YoutubeDl::new(self.http.clone(), track.source().to_string());

        // Pre-resolver la metadata hace que los fallos ocurran aquí y no en el driver
        let metadata = tokio::time::timeout(self.resolve_timeout, source.aux_metadata())
            .await
            .map_err(|_| ResolutionError::Timeout)?
            .map_err(|e| ResolutionError::Unavailable(e.to_string()))?;

        Ok(Resolved {
            stream: source.into(),
            duration: metadata.duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_text_is_not_a_url() {
        let client = YouTubeClient::new(1, Duration::from_secs(5));
        assert!(client.is_valid_url("https://soundcloud.com/artist/track"));
        assert!(!client.is_valid_url("lofi hip hop"));
        assert!(!client.is_valid_url("ftp://example.com/song.mp3"));
    }

    #[test]
    fn flat_search_entries_get_watch_urls() {
        let stdout = concat!(
            r#"{"id":"abc123","title":"Primera","duration":215.0,"url":"abc123"}"#,
            "\n",
            "no es json\n",
            r#"{"id":"xyz","title":"Segunda","webpage_url":"https://www.youtube.com/watch?v=xyz","is_live":true}"#,
        );

        let results = parse_search_output(stdout);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(results[0].duration, Some(Duration::from_secs(215)));
        assert!(results[1].is_live);
        assert_eq!(results[1].duration, None);
    }

    #[test]
    fn metadata_becomes_track_for_requester() {
        let metadata = TrackMetadata {
            title: "Canción".into(),
            duration: Some(Duration::from_secs(90)),
            thumbnail: Some("https://i.ytimg.com/vi/abc/hq.jpg".into()),
            url: "https://youtu.be/abc".into(),
            is_live: false,
        };

        let track = metadata.into_track(UserId::new(5));
        assert_eq!(track.source(), "https://youtu.be/abc");
        assert_eq!(track.duration(), Some(Duration::from_secs(90)));
        assert_eq!(track.thumbnail(), Some("https://i.ytimg.com/vi/abc/hq.jpg"));
        assert_eq!(track.requested_by(), UserId::new(5));
    }
}

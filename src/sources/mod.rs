pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::UserId;
use std::time::Duration;

use crate::audio::{ResolutionError, Track};

pub use youtube::YouTubeClient;

/// Stream listo para el sink, con la duración si la fuente la conoce.
#[derive(Debug)]
pub struct Resolved<S> {
    pub stream: S,
    pub duration: Option<Duration>,
}

/// Convierte un [`Track`] en algo reproducible. Puede tardar segundos.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    type Stream: Send + 'static;

    async fn resolve(&self, track: &Track) -> Result<Resolved<Self::Stream>, ResolutionError>;
}

/// Resultado de búsqueda, todavía sin solicitante
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    pub url: String,
    pub is_live: bool,
}

impl TrackMetadata {
    pub fn into_track(self, requested_by: UserId) -> Track {
        let mut track = Track::new(self.title, self.url, requested_by);
        if let Some(duration) = self.duration {
            track = track.with_duration(duration);
        }
        if let Some(thumbnail) = self.thumbnail {
            track = track.with_thumbnail(thumbnail);
        }
        track
    }
}

/// Trait común para las fuentes que el front-end consulta
#[async_trait]
pub trait MusicSource: Send + Sync {
    /// Busca tracks en la fuente
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackMetadata>>;

    /// Convierte una URL o texto libre en un track listo para encolar
    async fn lookup(&self, query: &str, requested_by: UserId) -> Result<Track>;

    /// Verifica si la URL es válida para esta fuente
    fn is_valid_url(&self, url: &str) -> bool;
}

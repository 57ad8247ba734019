use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::time::Duration;

/// Elemento de la cola. Es un valor inmutable: los `with_*` devuelven una copia nueva.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    title: String,
    source: String,
    duration: Option<Duration>,
    thumbnail: Option<String>,
    requested_by: UserId,
    requested_at: DateTime<Utc>,
}

impl Track {
    pub fn new(title: impl Into<String>, source: impl Into<String>, requested_by: UserId) -> Self {
        Self {
            title: title.into(),
            source: source.into(),
            duration: None,
            thumbnail: None,
            requested_by,
            requested_at: Utc::now(),
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    /// Referencia opaca que el resolver sabe convertir en stream (URL, id, etc.)
    pub fn source(&self) -> &str {
        &self.source
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }
    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    // Builders
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builders_return_updated_copies() {
        let base = Track::new("Song", "https://youtu.be/abc", UserId::new(7));
        let timed = base.clone().with_duration(Duration::from_secs(215));

        assert_eq!(base.duration(), None);
        assert_eq!(timed.duration(), Some(Duration::from_secs(215)));
        assert_eq!(timed.title(), "Song");
        assert_eq!(timed.requested_by(), UserId::new(7));
    }
}

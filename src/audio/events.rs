use serenity::model::id::GuildId;

use super::track::Track;

/// Notificaciones que la sesión publica hacia el front-end.
///
/// Los errores de resolución y del sink durante un avance automático no se
/// devuelven a nadie: se anuncian por aquí y la sesión sigue con el siguiente track.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Un track pasó a `Playing`
    NowPlaying { guild_id: GuildId, generation: u64, track: Track },
    /// No se pudo resolver el stream de un track; fue descartado
    ResolutionFailed { guild_id: GuildId, track: Track, reason: String },
    /// El sink reportó un error a mitad del stream
    SinkWarning { guild_id: GuildId, track: Track, reason: String },
    /// La cola se vació y la sesión quedó en `Idle`
    QueueFinished { guild_id: GuildId },
    /// El temporizador de inactividad desconectó la sesión
    Disconnected { guild_id: GuildId },
}

impl PlaybackEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::NowPlaying { guild_id, .. }
            | Self::ResolutionFailed { guild_id, .. }
            | Self::SinkWarning { guild_id, .. }
            | Self::QueueFinished { guild_id }
            | Self::Disconnected { guild_id } => *guild_id,
        }
    }
}

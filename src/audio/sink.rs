use async_trait::async_trait;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::error::SinkError;

/// Mensaje de fin de stream, etiquetado con la generación que lo inició.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEnded {
    pub generation: u64,
    /// `Some` si el sink terminó por error
    pub error: Option<String>,
}

/// Callback de finalización que la sesión entrega al sink en cada `play`.
///
/// No muta la sesión: solo deposita un [`StreamEnded`] en su buzón. Señales
/// duplicadas o tardías son inofensivas porque la sesión compara la generación.
#[derive(Debug, Clone)]
pub struct StreamCompletion {
    generation: u64,
    tx: mpsc::UnboundedSender<StreamEnded>,
}

impl StreamCompletion {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<StreamEnded>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn finish(&self, error: Option<String>) {
        let ended = StreamEnded {
            generation: self.generation,
            error,
        };
        if self.tx.send(ended).is_err() {
            debug!(
                "Sesión cerrada, se ignora el fin de la generación {}",
                self.generation
            );
        }
    }
}

/// Control sobre un stream que el sink está reproduciendo.
#[cfg_attr(test, mockall::automock)]
pub trait StreamControl: Send + Sync {
    /// Pide detener el stream. No espera a que termine.
    fn stop(&self);
}

/// Conexión de voz viva de una guild.
#[async_trait]
pub trait VoiceSink: Send + Sync {
    type Stream: Send + 'static;

    /// Empieza a reproducir `stream`. Debe retornar rápido: la sesión la llama
    /// con su lock tomado. `completion` se invoca una vez cuando el stream acaba.
    async fn play(
        &self,
        stream: Self::Stream,
        completion: StreamCompletion,
    ) -> Result<Box<dyn StreamControl>, SinkError>;

    /// Abandona el canal de voz
    async fn disconnect(&self);
}

/// Fábrica de sinks por guild
pub trait VoiceConnector: Send + Sync {
    type Stream: Send + 'static;

    fn sink_for(&self, guild_id: GuildId) -> Arc<dyn VoiceSink<Stream = Self::Stream>>;
}

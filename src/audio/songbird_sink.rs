//! Implementación de [`VoiceSink`] sobre songbird.

use async_trait::async_trait;
use serenity::model::id::GuildId;
use songbird::{
    input::Input,
    tracks::TrackHandle,
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::SinkError;
use super::sink::{StreamCompletion, StreamControl, VoiceConnector, VoiceSink};

/// Crea un [`SongbirdSink`] por guild sobre el manager compartido.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    volume: f32,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>, volume: f32) -> Self {
        Self { manager, volume }
    }
}

impl VoiceConnector for SongbirdConnector {
    type Stream = Input;

    fn sink_for(&self, guild_id: GuildId) -> Arc<dyn VoiceSink<Stream = Input>> {
        Arc::new(SongbirdSink {
            manager: Arc::clone(&self.manager),
            guild_id,
            volume: self.volume,
        })
    }
}

pub struct SongbirdSink {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    volume: f32,
}

#[async_trait]
impl VoiceSink for SongbirdSink {
    type Stream = Input;

    async fn play(
        &self,
        stream: Input,
        completion: StreamCompletion,
    ) -> Result<Box<dyn StreamControl>, SinkError> {
        let call = self.manager.get(self.guild_id).ok_or(SinkError::NotConnected)?;

        let handle = {
            let mut call = call.lock().await;
            call.play_input(stream)
        };
        let control = SongbirdControl(handle);
        if let Err(e) = control.0.set_volume(self.volume) {
            debug!("No se pudo ajustar el volumen: {:?}", e);
        }

        // End cubre fin natural y stop(); Error llega por separado
        attach_or_stop(control, |control| {
            control
                .0
                .add_event(
                    Event::Track(TrackEvent::End),
                    TrackEndNotifier {
                        completion: completion.clone(),
                    },
                )
                .map_err(|e| SinkError::Driver(e.to_string()))?;
            control
                .0
                .add_event(
                    Event::Track(TrackEvent::Error),
                    TrackErrorNotifier { completion },
                )
                .map_err(|e| SinkError::Driver(e.to_string()))
        })
    }

    async fn disconnect(&self) {
        if let Err(e) = self.manager.remove(self.guild_id).await {
            // NoCall: ya estábamos fuera del canal
            debug!("Desconexión de guild {}: {:?}", self.guild_id, e);
        }
    }
}

/// `play_input` ya arrancó el track: si no se pueden registrar los avisos
/// de fin se detiene, porque nadie más tendría su control.
fn attach_or_stop<C>(
    control: C,
    attach: impl FnOnce(&C) -> Result<(), SinkError>,
) -> Result<Box<dyn StreamControl>, SinkError>
where
    C: StreamControl + 'static,
{
    match attach(&control) {
        Ok(()) => Ok(Box::new(control)),
        Err(e) => {
            warn!("⚠️ Track detenido, no se pudo vigilar su fin: {}", e);
            control.stop();
            Err(e)
        }
    }
}

struct SongbirdControl(TrackHandle);

impl StreamControl for SongbirdControl {
    fn stop(&self) {
        if let Err(e) = self.0.stop() {
            debug!("Track ya detenido: {:?}", e);
        }
    }
}

struct TrackEndNotifier {
    completion: StreamCompletion,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("Track terminado (gen {})", self.completion.generation());
        self.completion.finish(None);
        None
    }
}

struct TrackErrorNotifier {
    completion: StreamCompletion,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let reason = match ctx {
            EventContext::Track(tracks) => tracks
                .first()
                .map(|(state, _)| format!("{:?}", state.playing))
                .unwrap_or_else(|| "error desconocido".to_string()),
            _ => "error desconocido".to_string(),
        };
        warn!("⚠️ Error en el driver de voz: {}", reason);
        self.completion.finish(Some(reason));
        None
    }
}

//! Dobles de prueba compartidos por los tests de sesión y registro.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{GuildId, UserId};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

use super::error::{ResolutionError, SinkError};
use super::events::PlaybackEvent;
use super::session::{PlaybackSession, SessionSnapshot};
use super::sink::{StreamCompletion, StreamControl, VoiceConnector, VoiceSink};
use super::track::Track;
use crate::sources::{Resolved, SourceResolver};

pub fn track(title: &str) -> Track {
    Track::new(title, format!("src:{title}"), UserId::new(42))
}

/// Stream de mentira: solo recuerda de qué track viene.
#[derive(Debug)]
pub struct FakeStream {
    pub title: String,
}

#[derive(Default)]
pub struct FakeResolver {
    failing: Mutex<HashSet<String>>,
    held: Mutex<HashMap<String, Arc<Notify>>>,
}

impl FakeResolver {
    pub fn fail(&self, title: &str) {
        self.failing.lock().insert(format!("src:{title}"));
    }

    /// La resolución de `title` queda bloqueada hasta notificar el `Notify`.
    pub fn hold(&self, title: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.held
            .lock()
            .insert(format!("src:{title}"), Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl SourceResolver for FakeResolver {
    type Stream = FakeStream;

    async fn resolve(&self, track: &Track) -> Result<Resolved<FakeStream>, ResolutionError> {
        let gate = self.held.lock().get(track.source()).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing.lock().contains(track.source()) {
            return Err(ResolutionError::Unavailable(track.source().to_string()));
        }
        Ok(Resolved {
            stream: FakeStream {
                title: track.title().to_string(),
            },
            duration: Some(Duration::from_secs(180)),
        })
    }
}

struct CountingControl(Arc<AtomicUsize>);

impl StreamControl for CountingControl {
    fn stop(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeSink {
    plays: Mutex<Vec<(String, StreamCompletion)>>,
    controls: Mutex<Vec<Box<dyn StreamControl>>>,
    refusal: Mutex<Option<SinkError>>,
    play_gate: Mutex<Option<Arc<Notify>>>,
    entered: AtomicUsize,
    stops: Arc<AtomicUsize>,
    pub disconnects: AtomicUsize,
}

impl FakeSink {
    pub fn played(&self) -> Vec<String> {
        self.plays.lock().iter().map(|(title, _)| title.clone()).collect()
    }

    pub fn stopped(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Callback del último `play` de `title`
    pub fn completion_for(&self, title: &str) -> StreamCompletion {
        self.plays
            .lock()
            .iter()
            .rev()
            .find(|(played, _)| played == title)
            .map(|(_, completion)| completion.clone())
            .unwrap_or_else(|| panic!("{title} nunca se reprodujo"))
    }

    pub fn refuse(&self, error: SinkError) {
        *self.refusal.lock() = Some(error);
    }

    /// El próximo `play` queda bloqueado hasta notificar el `Notify`.
    pub fn hold_play(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.play_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// Llamadas a `play` iniciadas, hayan terminado o no
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// El próximo `play` devolverá este control
    pub fn next_control(&self, control: Box<dyn StreamControl>) {
        self.controls.lock().push(control);
    }
}

#[async_trait]
impl VoiceSink for FakeSink {
    type Stream = FakeStream;

    async fn play(
        &self,
        stream: FakeStream,
        completion: StreamCompletion,
    ) -> Result<Box<dyn StreamControl>, SinkError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let gate = self.play_gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(error) = self.refusal.lock().clone() {
            return Err(error);
        }
        self.plays.lock().push((stream.title, completion));
        let control = self
            .controls
            .lock()
            .pop()
            .unwrap_or_else(|| {
                Box::new(CountingControl(Arc::clone(&self.stops))) as Box<dyn StreamControl>
            });
        Ok(control)
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Entrega siempre el mismo `FakeSink` y recuerda para qué guilds se pidió.
#[derive(Default)]
pub struct FakeConnector {
    pub sink: Arc<FakeSink>,
    pub requested: Mutex<Vec<GuildId>>,
}

impl VoiceConnector for FakeConnector {
    type Stream = FakeStream;

    fn sink_for(&self, guild_id: GuildId) -> Arc<dyn VoiceSink<Stream = FakeStream>> {
        self.requested.lock().push(guild_id);
        self.sink.clone()
    }
}

/// Espera hasta que el snapshot cumpla `done`, dejando correr las tareas de fondo.
pub async fn settle<S, F>(session: &Arc<PlaybackSession<S>>, done: F) -> SessionSnapshot
where
    S: Send + 'static,
    F: Fn(&SessionSnapshot) -> bool,
{
    within(async {
        loop {
            let snapshot = session.snapshot().await;
            if done(&snapshot) {
                return snapshot;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
}

async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("la sesión no llegó al estado esperado")
}

/// Vacía el receptor de eventos sin bloquear
pub fn events_of(rx: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

//! Máquina de estados de reproducción de una guild.
//!
//! Cada [`PlaybackSession`] es dueña de su cola, del track actual y de un
//! contador de generación. Toda transición ocurre bajo un único
//! `tokio::sync::Mutex`; la resolución de streams (lenta) y la entrega al sink
//! corren fuera del lock, y al volver se compara la generación para descartar
//! resultados obsoletos.
//! Las señales de fin del sink llegan por un canal y pasan por la misma guarda.

use serenity::model::id::GuildId;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{PlaybackError, PlaybackResult, ResolutionError};
use super::events::PlaybackEvent;
use super::queue::{MusicQueue, QueueInfo};
use super::sink::{StreamCompletion, StreamControl, StreamEnded, VoiceSink};
use super::track::Track;
use crate::sources::{Resolved, SourceResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Sin track actual
    Idle,
    /// Resolviendo el stream del track actual
    Starting,
    Playing,
    /// Transitorio: se está descartando el stream actual
    Stopping,
}

/// Resultado de `enqueue`
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// La sesión estaba inactiva y el track empezó a resolverse
    Started(Track),
    /// El track quedó en la cola en `position` (0-based)
    Queued { position: usize },
}

/// Foto consistente del estado de la sesión
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub current: Option<Track>,
    pub queue: Vec<Track>,
    pub state: PlaybackState,
    pub generation: u64,
}

impl SessionSnapshot {
    /// Sin track actual ni nada en cola
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }
}

/// Se invoca cuando el temporizador de inactividad cierra la sesión.
pub(crate) type ReapHook<S> = Box<dyn Fn(&Arc<PlaybackSession<S>>) + Send + Sync>;

enum ActiveStream {
    Resolving(CancellationToken),
    Attached(Box<dyn StreamControl>),
}

impl ActiveStream {
    fn discard(self) {
        match self {
            Self::Resolving(token) => token.cancel(),
            Self::Attached(control) => control.stop(),
        }
    }
}

/// Arranque pendiente: track elegido bajo el lock, a resolver fuera de él.
struct PendingStart {
    generation: u64,
    track: Track,
    cancel: CancellationToken,
}

struct SessionState {
    queue: MusicQueue,
    current: Option<Track>,
    state: PlaybackState,
    generation: u64,
    active: Option<ActiveStream>,
    /// Fin recibido mientras el sink arrancaba el stream
    early_end: Option<StreamEnded>,
    idle_timer: Option<CancellationToken>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            queue: MusicQueue::new(),
            current: None,
            state: PlaybackState::Idle,
            generation: 0,
            active: None,
            early_end: None,
            idle_timer: None,
        }
    }

    /// Toma el siguiente track de la cola y abre una generación nueva.
    /// Con la cola vacía deja la sesión en `Idle`.
    fn begin_next(&mut self) -> Option<PendingStart> {
        match self.queue.pop_next() {
            Some(track) => {
                self.generation += 1;
                self.early_end = None;
                let cancel = CancellationToken::new();
                self.current = Some(track.clone());
                self.state = PlaybackState::Starting;
                self.active = Some(ActiveStream::Resolving(cancel.clone()));
                Some(PendingStart {
                    generation: self.generation,
                    track,
                    cancel,
                })
            }
            None => {
                self.current = None;
                self.state = PlaybackState::Idle;
                self.active = None;
                None
            }
        }
    }

    /// Detiene o cancela lo que esté sonando; `current` se mantiene hasta el avance.
    fn discard_active(&mut self) {
        self.state = PlaybackState::Stopping;
        if let Some(active) = self.active.take() {
            active.discard();
        }
    }

    fn reset(&mut self) -> usize {
        let cleared = self.queue.clear();
        if self.state != PlaybackState::Idle {
            self.discard_active();
        }
        self.current = None;
        self.state = PlaybackState::Idle;
        cleared
    }

    fn cancel_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.cancel();
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            current: self.current.clone(),
            queue: self.queue.to_vec(),
            state: self.state,
            generation: self.generation,
        }
    }
}

pub struct PlaybackSession<S: Send + 'static> {
    guild_id: GuildId,
    inner: Mutex<SessionState>,
    resolver: Arc<dyn SourceResolver<Stream = S>>,
    sink: Arc<dyn VoiceSink<Stream = S>>,
    events: broadcast::Sender<PlaybackEvent>,
    completions: mpsc::UnboundedSender<StreamEnded>,
    idle_timeout: Duration,
    closed: AtomicBool,
    reaper: Option<ReapHook<S>>,
}

impl<S: Send + 'static> PlaybackSession<S> {
    pub fn new(
        guild_id: GuildId,
        resolver: Arc<dyn SourceResolver<Stream = S>>,
        sink: Arc<dyn VoiceSink<Stream = S>>,
        events: broadcast::Sender<PlaybackEvent>,
        idle_timeout: Duration,
    ) -> Arc<Self> {
        Self::spawn(guild_id, resolver, sink, events, idle_timeout, None)
    }

    pub(crate) fn spawn(
        guild_id: GuildId,
        resolver: Arc<dyn SourceResolver<Stream = S>>,
        sink: Arc<dyn VoiceSink<Stream = S>>,
        events: broadcast::Sender<PlaybackEvent>,
        idle_timeout: Duration,
        reaper: Option<ReapHook<S>>,
    ) -> Arc<Self> {
        let (completions, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            guild_id,
            inner: Mutex::new(SessionState::new()),
            resolver,
            sink,
            events,
            completions,
            idle_timeout,
            closed: AtomicBool::new(false),
            reaper,
        });

        tokio::spawn(pump_completions(Arc::downgrade(&session), rx));
        debug!("🎛️ Sesión de reproducción creada para guild {}", guild_id);
        session
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Agrega un track. Si la sesión estaba inactiva empieza a resolverlo.
    pub async fn enqueue(self: &Arc<Self>, track: Track) -> PlaybackResult<EnqueueOutcome> {
        let start = {
            let mut state = self.inner.lock().await;
            if self.is_closed() {
                return Err(PlaybackError::SessionClosed);
            }
            state.cancel_idle_timer();

            let position = state.queue.push(track);
            if state.state != PlaybackState::Idle {
                return Ok(EnqueueOutcome::Queued { position });
            }
            match state.begin_next() {
                Some(start) => start,
                None => return Ok(EnqueueOutcome::Queued { position }),
            }
        };

        let track = start.track.clone();
        self.spawn_driver(start);
        Ok(EnqueueOutcome::Started(track))
    }

    pub async fn remove_at(&self, index: usize) -> PlaybackResult<Track> {
        self.inner.lock().await.queue.remove_at(index)
    }

    pub async fn move_track(&self, from: usize, to: usize) -> PlaybackResult<Track> {
        self.inner.lock().await.queue.move_track(from, to)
    }

    /// Descarta el track actual y avanza. Devuelve el nuevo track actual, si hay.
    pub async fn skip(self: &Arc<Self>) -> PlaybackResult<Option<Track>> {
        let start = {
            let mut state = self.inner.lock().await;
            if state.state == PlaybackState::Idle {
                return Err(PlaybackError::NothingPlaying);
            }

            if let Some(track) = &state.current {
                info!("⏭️ Saltando: {}", track.title());
            }
            state.discard_active();
            let start = state.begin_next();
            if start.is_none() {
                self.arm_idle_timer(&mut state);
            }
            start
        };

        let next = start.as_ref().map(|start| start.track.clone());
        if let Some(start) = start {
            self.spawn_driver(start);
        }
        Ok(next)
    }

    /// Vacía la cola y detiene lo que suene. Idempotente.
    pub async fn stop_all(self: &Arc<Self>) {
        let mut state = self.inner.lock().await;
        let cleared = state.reset();
        info!(
            "⏹️ Reproducción detenida en guild {} ({} en cola descartadas)",
            self.guild_id, cleared
        );
        if !self.is_closed() {
            self.arm_idle_timer(&mut state);
        }
    }

    /// Cierra la sesión de forma definitiva y abandona el canal de voz.
    pub async fn shutdown(self: &Arc<Self>) {
        {
            let mut state = self.inner.lock().await;
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            state.cancel_idle_timer();
            state.reset();
        }
        self.sink.disconnect().await;
        info!("👋 Sesión cerrada en guild {}", self.guild_id);
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().await.snapshot()
    }

    pub async fn queue_info(&self) -> QueueInfo {
        let state = self.inner.lock().await;
        state.queue.info(state.current.clone())
    }

    /// Reinicia la cuenta de inactividad mientras el front-end prepara un
    /// track. Devuelve `false` si la sesión ya se cerró.
    pub async fn touch(self: &Arc<Self>) -> bool {
        let mut state = self.inner.lock().await;
        if self.is_closed() {
            return false;
        }
        if state.idle_timer.is_some() {
            self.arm_idle_timer(&mut state);
        }
        true
    }

    pub async fn current_track(&self) -> Option<Track> {
        self.inner.lock().await.current.clone()
    }

    /// Procesa una señal de fin del sink. Solo actúa si pertenece a la
    /// generación actual; si el arranque aún no se confirmó queda guardada.
    pub async fn handle_stream_end(self: &Arc<Self>, ended: StreamEnded) {
        let start = {
            let mut state = self.inner.lock().await;
            let current = state.generation == ended.generation;
            let phase = state.state;
            match phase {
                PlaybackState::Playing if current => self.finish_current(&mut state, ended),
                // El sink ya tiene el stream pero el arranque aún no se confirmó
                PlaybackState::Starting if current => {
                    state.early_end = Some(ended);
                    None
                }
                _ => {
                    debug!(
                        "🔕 Fin de stream obsoleto ignorado (gen {} / actual {}, {:?})",
                        ended.generation, state.generation, state.state
                    );
                    None
                }
            }
        };

        if let Some(start) = start {
            self.spawn_driver(start);
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        // Sin suscriptores no es un error
        let _ = self.events.send(event);
    }

    fn queue_drained(self: &Arc<Self>, state: &mut SessionState) {
        info!("📭 Cola terminada en guild {}", self.guild_id);
        self.emit(PlaybackEvent::QueueFinished {
            guild_id: self.guild_id,
        });
        self.arm_idle_timer(state);
    }

    fn spawn_driver(self: &Arc<Self>, start: PendingStart) {
        let session = Arc::clone(self);
        tokio::spawn(async move { session.drive(start).await });
    }

    /// Resuelve y arranca tracks hasta que uno suene, la cola se vacíe o
    /// la generación quede obsoleta.
    async fn drive(self: Arc<Self>, mut start: PendingStart) {
        loop {
            let outcome = tokio::select! {
                _ = start.cancel.cancelled() => {
                    debug!("🚫 Resolución cancelada para '{}'", start.track.title());
                    return;
                }
                outcome = self.resolver.resolve(&start.track) => outcome,
            };

            match self.commit(start, outcome).await {
                Some(next) => start = next,
                None => return,
            }
        }
    }

    /// Confirma un arranque. La generación se verifica bajo el lock antes y
    /// después de entregar el stream al sink; la entrega ocurre sin el lock.
    /// Devuelve el siguiente arranque si el track actual no pudo reproducirse.
    async fn commit(
        self: &Arc<Self>,
        start: PendingStart,
        outcome: Result<Resolved<S>, ResolutionError>,
    ) -> Option<PendingStart> {
        let PendingStart {
            generation,
            track,
            cancel,
        } = start;

        let (stream, track) = {
            let mut state = self.inner.lock().await;
            if is_stale(&state, generation, &cancel) {
                debug!(
                    "🗑️ Stream obsoleto descartado para '{}' (gen {} / actual {})",
                    track.title(),
                    generation,
                    state.generation
                );
                return None;
            }

            match outcome {
                Ok(Resolved { stream, duration }) => {
                    let track = match (track.duration(), duration) {
                        (None, Some(duration)) => track.with_duration(duration),
                        _ => track,
                    };
                    (stream, track)
                }
                Err(e) => {
                    warn!("❌ No se pudo resolver '{}': {}", track.title(), e);
                    self.emit(PlaybackEvent::ResolutionFailed {
                        guild_id: self.guild_id,
                        track,
                        reason: e.to_string(),
                    });
                    return self.advance(&mut state);
                }
            }
        };

        let completion = StreamCompletion::new(generation, self.completions.clone());
        let played = self.sink.play(stream, completion).await;

        let mut state = self.inner.lock().await;
        if is_stale(&state, generation, &cancel) {
            debug!(
                "🗑️ '{}' quedó obsoleto mientras arrancaba (gen {} / actual {})",
                track.title(),
                generation,
                state.generation
            );
            if let Ok(control) = played {
                control.stop();
            }
            return None;
        }

        match played {
            Ok(control) => {
                info!("🎵 Reproduciendo: {} (gen {})", track.title(), generation);
                state.current = Some(track.clone());
                state.active = Some(ActiveStream::Attached(control));
                state.state = PlaybackState::Playing;
                self.emit(PlaybackEvent::NowPlaying {
                    guild_id: self.guild_id,
                    generation,
                    track,
                });

                // El stream pudo terminar antes de quedar registrado
                let early_end = state.early_end.take();
                match early_end {
                    Some(ended) if ended.generation == generation => {
                        self.finish_current(&mut state, ended)
                    }
                    _ => None,
                }
            }
            Err(e) => {
                warn!("⚠️ El sink rechazó '{}': {}", track.title(), e);
                self.emit(PlaybackEvent::SinkWarning {
                    guild_id: self.guild_id,
                    track,
                    reason: e.to_string(),
                });
                self.advance(&mut state)
            }
        }
    }

    /// Cierra el track actual y toma el siguiente; con la cola vacía arma
    /// el temporizador de inactividad.
    fn advance(self: &Arc<Self>, state: &mut SessionState) -> Option<PendingStart> {
        state.active = None;
        let next = state.begin_next();
        if next.is_none() {
            self.queue_drained(state);
        }
        next
    }

    fn finish_current(
        self: &Arc<Self>,
        state: &mut SessionState,
        ended: StreamEnded,
    ) -> Option<PendingStart> {
        if let (Some(reason), Some(track)) = (ended.error, state.current.clone()) {
            warn!("⚠️ El stream de '{}' terminó con error: {}", track.title(), reason);
            self.emit(PlaybackEvent::SinkWarning {
                guild_id: self.guild_id,
                track,
                reason,
            });
        }
        self.advance(state)
    }

    fn arm_idle_timer(self: &Arc<Self>, state: &mut SessionState) {
        state.cancel_idle_timer();
        let token = CancellationToken::new();
        state.idle_timer = Some(token.clone());

        let session = Arc::downgrade(self);
        let timeout = self.idle_timeout;
        debug!("⏲️ Desconexión por inactividad en {:?}", timeout);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Some(session) = session.upgrade() {
                        session.expire(token).await;
                    }
                }
            }
        });
    }

    async fn expire(self: &Arc<Self>, token: CancellationToken) {
        {
            let mut state = self.inner.lock().await;
            if token.is_cancelled()
                || self.is_closed()
                || state.state != PlaybackState::Idle
                || !state.queue.is_empty()
            {
                return;
            }
            state.idle_timer = None;
            self.closed.store(true, Ordering::SeqCst);
            if let Some(reap) = &self.reaper {
                reap(self);
            }
        }

        info!("💤 Inactividad en guild {}, desconectando", self.guild_id);
        self.sink.disconnect().await;
        self.emit(PlaybackEvent::Disconnected {
            guild_id: self.guild_id,
        });
    }
}

fn is_stale(state: &SessionState, generation: u64, cancel: &CancellationToken) -> bool {
    cancel.is_cancelled()
        || state.generation != generation
        || state.state != PlaybackState::Starting
}

async fn pump_completions<S: Send + 'static>(
    session: Weak<PlaybackSession<S>>,
    mut rx: mpsc::UnboundedReceiver<StreamEnded>,
) {
    while let Some(ended) = rx.recv().await {
        let Some(session) = session.upgrade() else {
            break;
        };
        session.handle_stream_end(ended).await;
    }
}

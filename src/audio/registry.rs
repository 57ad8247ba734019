use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::error::{PlaybackError, PlaybackResult};
use super::events::PlaybackEvent;
use super::session::{EnqueueOutcome, PlaybackSession, ReapHook};
use super::sink::VoiceConnector;
use super::track::Track;
use crate::sources::SourceResolver;

const EVENT_BUFFER: usize = 256;

/// Mapa guild → sesión. Crea sesiones bajo demanda y las olvida cuando
/// el temporizador de inactividad las cierra.
pub struct SessionRegistry<S: Send + 'static> {
    sessions: Arc<DashMap<GuildId, Arc<PlaybackSession<S>>>>,
    resolver: Arc<dyn SourceResolver<Stream = S>>,
    connector: Arc<dyn VoiceConnector<Stream = S>>,
    events: broadcast::Sender<PlaybackEvent>,
    idle_timeout: Duration,
}

impl<S: Send + 'static> SessionRegistry<S> {
    pub fn new(
        resolver: Arc<dyn SourceResolver<Stream = S>>,
        connector: Arc<dyn VoiceConnector<Stream = S>>,
        idle_timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            sessions: Arc::new(DashMap::new()),
            resolver,
            connector,
            events,
            idle_timeout,
        }
    }

    /// Eventos de todas las sesiones
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Devuelve la sesión de la guild, creándola si no existe. Llamadas
    /// concurrentes para la misma guild obtienen la misma instancia.
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<PlaybackSession<S>> {
        let mut entry = self
            .sessions
            .entry(guild_id)
            .or_insert_with(|| self.create(guild_id));

        // Una sesión cerrada que todavía no fue retirada se reemplaza
        if entry.is_closed() {
            *entry = self.create(guild_id);
        }
        Arc::clone(entry.value())
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<PlaybackSession<S>>> {
        self.sessions
            .get(&guild_id)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|session| !session.is_closed())
    }

    /// Cierra y olvida la sesión. No hace nada si no existe.
    pub async fn remove(&self, guild_id: GuildId) -> bool {
        let Some((_, session)) = self.sessions.remove(&guild_id) else {
            debug!("No hay sesión que cerrar en guild {}", guild_id);
            return false;
        };
        session.shutdown().await;
        true
    }

    /// `enqueue` sobre la sesión de la guild, reintentando una vez si la
    /// sesión se cerró por inactividad entre la búsqueda y la llamada.
    pub async fn enqueue(&self, guild_id: GuildId, track: Track) -> PlaybackResult<EnqueueOutcome> {
        let session = self.get_or_create(guild_id);
        match session.enqueue(track.clone()).await {
            Err(PlaybackError::SessionClosed) => {
                debug!("♻️ Sesión de guild {} cerrada, creando otra", guild_id);
                self.get_or_create(guild_id).enqueue(track).await
            }
            other => other,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Cierra todas las sesiones (apagado del bot)
    pub async fn shutdown_all(&self) {
        let guilds: Vec<GuildId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for guild_id in guilds {
            self.remove(guild_id).await;
        }
    }

    fn create(&self, guild_id: GuildId) -> Arc<PlaybackSession<S>> {
        info!("🆕 Nueva sesión de reproducción para guild {}", guild_id);
        PlaybackSession::spawn(
            guild_id,
            Arc::clone(&self.resolver),
            self.connector.sink_for(guild_id),
            self.events.clone(),
            self.idle_timeout,
            Some(self.reaper()),
        )
    }

    fn reaper(&self) -> ReapHook<S> {
        let sessions = Arc::downgrade(&self.sessions);
        Box::new(move |session: &Arc<PlaybackSession<S>>| {
            if let Some(sessions) = sessions.upgrade() {
                // Solo se retira si sigue siendo la sesión registrada
                let removed = sessions
                    .remove_if(&session.guild_id(), |_, current| Arc::ptr_eq(current, session));
                if removed.is_some() {
                    debug!("🧹 Sesión inactiva retirada de guild {}", session.guild_id());
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::session::PlaybackState;
    use crate::audio::testing::{settle, track, FakeConnector, FakeResolver, FakeStream};
    use futures::future::join_all;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    const IDLE: Duration = Duration::from_secs(10);

    fn registry() -> (Arc<FakeConnector>, Arc<SessionRegistry<FakeStream>>) {
        let connector = Arc::new(FakeConnector::default());
        let registry: SessionRegistry<FakeStream> = SessionRegistry::new(
            Arc::new(FakeResolver::default()),
            connector.clone(),
            IDLE,
        );
        (connector, Arc::new(registry))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_get_or_create_returns_one_session() {
        let (connector, registry) = registry();
        let guild = GuildId::new(77);

        let handles = (0..16).map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get_or_create(guild) })
        });
        let sessions: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.expect("tarea completada"))
            .collect();

        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
        assert_eq!(registry.len(), 1);
        assert_eq!(connector.requested.lock().len(), 1);
    }

    #[tokio::test]
    async fn sessions_are_isolated_per_guild() {
        let (_, registry) = registry();
        let a = registry.get_or_create(GuildId::new(1));
        let b = registry.get_or_create(GuildId::new(2));

        assert!(!Arc::ptr_eq(&a, &b));
        registry.enqueue(GuildId::new(1), track("A")).await.unwrap();
        assert!(b.snapshot().await.current.is_none());
    }

    #[tokio::test]
    async fn remove_shuts_down_and_tolerates_absent_guild() {
        let (connector, registry) = registry();
        let guild = GuildId::new(5);

        assert!(!registry.remove(guild).await);

        registry.enqueue(guild, track("A")).await.unwrap();
        let session = registry.get(guild).expect("sesión creada");
        settle(&session, |s| s.state == PlaybackState::Playing).await;

        assert!(registry.remove(guild).await);
        assert!(registry.get(guild).is_none());
        assert!(session.is_closed());
        assert_eq!(connector.sink.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(connector.sink.stopped(), 1);
    }

    #[tokio::test]
    async fn enqueue_recovers_from_closed_session() {
        let (_, registry) = registry();
        let guild = GuildId::new(9);
        let stale = registry.get_or_create(guild);
        stale.shutdown().await;

        registry.enqueue(guild, track("B")).await.unwrap();

        let fresh = registry.get(guild).expect("sesión nueva");
        assert!(!Arc::ptr_eq(&stale, &fresh));
        settle(&fresh, |s| s.current.is_some()).await;
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_is_reaped_from_registry() {
        let (connector, registry) = registry();
        let guild = GuildId::new(3);

        let session = registry.get_or_create(guild);
        session.stop_all().await;
        tokio::time::sleep(IDLE + Duration::from_secs(1)).await;
        settle(&session, |_| session.is_closed()).await;

        assert!(registry.is_empty());
        assert!(registry.get(guild).is_none());

        let replacement = registry.get_or_create(guild);
        assert!(!Arc::ptr_eq(&session, &replacement));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(connector.sink.disconnects.load(Ordering::SeqCst), 1);
    }
}

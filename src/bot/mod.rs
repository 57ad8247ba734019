//! # Bot Module
//!
//! Front-end de Discord sobre el coordinador de reproducción.
//!
//! [`GrooveDeckBot`] implementa el [`EventHandler`] de serenity:
//!
//! - registra los comandos slash al conectarse
//! - traduce cada comando a operaciones del [`SessionRegistry`]
//! - publica en el canal de texto los [`PlaybackEvent`] de cada guild
//! - olvida la sesión cuando el bot es expulsado del canal de voz

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
    builder::CreateMessage,
    http::Http,
};
use songbird::{input::Input, Songbird};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{PlaybackEvent, SessionRegistry, SongbirdConnector},
    config::Config,
    sources::{SourceResolver, YouTubeClient},
    ui::embeds,
};

pub struct GrooveDeckBot {
    config: Arc<Config>,
    pub registry: Arc<SessionRegistry<Input>>,
    pub youtube: Arc<YouTubeClient>,
    songbird: Arc<Songbird>,
    /// Último canal de texto desde el que se usó `/play`, por guild
    announce_channels: Arc<DashMap<GuildId, ChannelId>>,
    announcer_started: AtomicBool,
}

impl GrooveDeckBot {
    pub fn new(config: Config, songbird: Arc<Songbird>) -> Self {
        let youtube = Arc::new(YouTubeClient::new(
            config.search_concurrency,
            config.resolve_timeout,
        ));
        let resolver: Arc<dyn SourceResolver<Stream = Input>> = youtube.clone();
        let connector = Arc::new(SongbirdConnector::new(
            Arc::clone(&songbird),
            config.default_volume,
        ));
        let registry = Arc::new(SessionRegistry::new(
            resolver,
            connector,
            config.idle_timeout,
        ));

        Self {
            config: Arc::new(config),
            registry,
            youtube,
            songbird,
            announce_channels: Arc::new(DashMap::new()),
            announcer_started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);
                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Conecta el bot al canal de voz si todavía no está en uno
    pub async fn join_voice_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        if let Some(call) = self.songbird.get(guild_id) {
            if call.lock().await.current_channel().is_some() {
                return Ok(());
            }
        }

        self.songbird.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error al obtener handler de voz: {:?}", e);
            anyhow::anyhow!("Error al conectar al canal de voz")
        })?;

        info!("🔊 Conectado al canal de voz en guild {}", guild_id);
        Ok(())
    }

    /// Cierra la sesión de la guild y abandona el canal de voz
    pub async fn leave_voice_channel(&self, guild_id: GuildId) -> Result<()> {
        self.announce_channels.remove(&guild_id);
        if !self.registry.remove(guild_id).await {
            // Sin sesión, pero puede quedar una llamada abierta
            if let Err(e) = self.songbird.remove(guild_id).await {
                debug!("Nada que desconectar en guild {}: {:?}", guild_id, e);
            }
        }

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }

    pub fn set_announce_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.announce_channels.insert(guild_id, channel_id);
    }
}

#[async_trait]
impl EventHandler for GrooveDeckBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        // `ready` se repite en cada reconexión
        if !self.announcer_started.swap(true, Ordering::SeqCst) {
            tokio::spawn(announce_events(
                Arc::clone(&ctx.http),
                self.registry.subscribe(),
                Arc::clone(&self.announce_channels),
            ));
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        // Detectar si el bot fue desconectado
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.announce_channels.remove(&guild_id);
            self.registry.remove(guild_id).await;
        }
    }
}

/// Publica los eventos de reproducción en el canal de texto de cada guild
async fn announce_events(
    http: Arc<Http>,
    mut events: broadcast::Receiver<PlaybackEvent>,
    channels: Arc<DashMap<GuildId, ChannelId>>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("📢 Se perdieron {} eventos de reproducción", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let guild_id = event.guild_id();
        let Some(channel_id) = channels.get(&guild_id).map(|entry| *entry.value()) else {
            continue;
        };

        let message = CreateMessage::new().embed(embeds::create_event_embed(&event));
        if let Err(e) = channel_id.send_message(&*http, message).await {
            warn!("No se pudo anunciar en el canal {}: {:?}", channel_id, e);
        }

        if matches!(event, PlaybackEvent::Disconnected { .. }) {
            channels.remove(&guild_id);
        }
    }
}

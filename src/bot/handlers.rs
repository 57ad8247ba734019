use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::future::Future;
use tracing::{info, warn};

use crate::{
    audio::{EnqueueOutcome, PlaybackError, QueueInfo, Track},
    bot::GrooveDeckBot,
    sources::MusicSource,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &GrooveDeckBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    if !bot.config().is_channel_allowed(command.channel_id.get()) {
        let embed = embeds::create_error_embed(
            "Canal no permitido",
            "Los comandos de música no están habilitados en este canal",
        );
        return respond(ctx, &command, embed, true).await;
    }

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "remove" => handle_remove(ctx, &command, bot, guild_id).await?,
        "move" => handle_move(ctx, &command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await?,
        "audio" => {
            let embed = embeds::create_audio_embed(bot.config().default_volume);
            respond(ctx, &command, embed, false).await?
        }
        "help" => respond(ctx, &command, embeds::create_help_embed(), false).await?,
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Comando no reconocido")
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GrooveDeckBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionada"))?
        .to_string();

    let channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(e) => {
            let embed = embeds::create_error_embed("Sin canal de voz", &e.to_string());
            return respond(ctx, command, embed, true).await;
        }
    };

    // La búsqueda puede tardar más de los 3s que da Discord
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let prepared = lookup_then_join(
        bot.youtube.as_ref(),
        &query,
        command.user.id,
        move || async move {
            // La cuenta de inactividad vuelve a empezar para que la llamada siga viva al encolar
            if let Some(session) = bot.registry.get(guild_id) {
                session.touch().await;
            }
            bot.join_voice_channel(guild_id, channel_id).await
        },
    )
    .await;

    let track = match prepared {
        Ok(track) => track,
        Err(PlayFailure::NotFound(e)) => {
            warn!("🔍 Búsqueda fallida para '{}': {:?}", query, e);
            let embed = embeds::create_error_embed(
                "Sin resultados",
                &format!("No se encontró nada para **{}**", query),
            );
            return edit(ctx, command, embed).await;
        }
        Err(PlayFailure::Join(e)) => {
            let embed = embeds::create_error_embed("Error de conexión", &e.to_string());
            return edit(ctx, command, embed).await;
        }
    };

    bot.set_announce_channel(guild_id, command.channel_id);

    let embed = match bot.registry.enqueue(guild_id, track.clone()).await {
        Ok(EnqueueOutcome::Started(track)) => embeds::create_track_starting_embed(&track),
        Ok(EnqueueOutcome::Queued { position }) => {
            embeds::create_track_added_embed(&track, position)
        }
        Err(e) => embeds::create_playback_error_embed(&e),
    };
    edit(ctx, command, embed).await
}

#[derive(Debug)]
enum PlayFailure {
    NotFound(anyhow::Error),
    Join(anyhow::Error),
}

/// Busca primero y solo entonces conecta a voz, así una búsqueda fallida no
/// deja al bot en un canal sin sesión que lo desconecte.
async fn lookup_then_join<J, F>(
    source: &dyn MusicSource,
    query: &str,
    requested_by: UserId,
    join: J,
) -> std::result::Result<Track, PlayFailure>
where
    J: FnOnce() -> F,
    F: Future<Output = Result<()>>,
{
    let track = source
        .lookup(query, requested_by)
        .await
        .map_err(PlayFailure::NotFound)?;
    join().await.map_err(PlayFailure::Join)?;
    Ok(track)
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GrooveDeckBot,
    guild_id: GuildId,
) -> Result<()> {
    let outcome = match bot.registry.get(guild_id) {
        Some(session) => session.skip().await,
        None => Err(PlaybackError::NothingPlaying),
    };

    let embed = match outcome {
        Ok(Some(next)) => embeds::create_success_embed(
            "Canción saltada",
            &format!("⏭️ Siguiente: **{}**", next.title()),
        ),
        Ok(None) => embeds::create_info_embed(
            "Canción saltada",
            "⏭️ No quedan más canciones en la cola",
        ),
        Err(e) => embeds::create_playback_error_embed(&e),
    };
    respond(ctx, command, embed, false).await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GrooveDeckBot,
    guild_id: GuildId,
) -> Result<()> {
    let session = bot.registry.get(guild_id);
    let idle = match &session {
        Some(session) => session.snapshot().await.is_empty(),
        None => true,
    };

    let embed = match session {
        Some(session) if !idle => {
            session.stop_all().await;
            embeds::create_success_embed(
                "Reproducción detenida",
                "⏹️ Se detuvo la música y se limpió la cola",
            )
        }
        _ => embeds::create_info_embed(
            "Nada que detener",
            "🔇 No hay música sonando ni en cola",
        ),
    };
    respond(ctx, command, embed, false).await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GrooveDeckBot,
    guild_id: GuildId,
) -> Result<()> {
    let page = integer_option(command, "page")
        .and_then(|page| usize::try_from(page).ok())
        .unwrap_or(1);

    let queue_info = match bot.registry.get(guild_id) {
        Some(session) => session.queue_info().await,
        None => QueueInfo::default(),
    };

    respond(ctx, command, embeds::create_queue_embed(&queue_info, page), false).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GrooveDeckBot,
    guild_id: GuildId,
) -> Result<()> {
    let current = match bot.registry.get(guild_id) {
        Some(session) => session.current_track().await,
        None => None,
    };

    let embed = match current {
        Some(track) => embeds::create_now_playing_embed(&track),
        None => embeds::create_info_embed("Nada sonando", "🔇 No hay nada reproduciéndose"),
    };
    respond(ctx, command, embed, false).await
}

async fn handle_remove(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GrooveDeckBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(index) = integer_option(command, "position").and_then(to_index) else {
        return respond(ctx, command, invalid_position_embed(), true).await;
    };

    let outcome = match bot.registry.get(guild_id) {
        Some(session) => session.remove_at(index).await,
        None => Err(PlaybackError::OutOfRange { index, len: 0 }),
    };

    let embed = match outcome {
        Ok(track) => embeds::create_success_embed(
            "Canción eliminada",
            &format!("🗑️ **{}** se quitó de la cola", track.title()),
        ),
        Err(e) => embeds::create_playback_error_embed(&e),
    };
    respond(ctx, command, embed, false).await
}

async fn handle_move(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GrooveDeckBot,
    guild_id: GuildId,
) -> Result<()> {
    let from = integer_option(command, "from").and_then(to_index);
    let to = integer_option(command, "to").and_then(to_index);
    let (Some(from), Some(to)) = (from, to) else {
        return respond(ctx, command, invalid_position_embed(), true).await;
    };

    let outcome = match bot.registry.get(guild_id) {
        Some(session) => session.move_track(from, to).await,
        None => Err(PlaybackError::OutOfRange { index: from, len: 0 }),
    };

    let embed = match outcome {
        Ok(track) => embeds::create_success_embed(
            "Cola reordenada",
            &format!("📍 **{}** ahora está en la posición {}", track.title(), to + 1),
        ),
        Err(e) => embeds::create_playback_error_embed(&e),
    };
    respond(ctx, command, embed, false).await
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GrooveDeckBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.leave_voice_channel(guild_id).await?;
    let embed = embeds::create_success_embed("Desconectado", "👋 ¡Hasta la próxima!");
    respond(ctx, command, embed, false).await
}

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn edit(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

/// Posición de usuario (desde 1) a índice de la cola
fn to_index(position: i64) -> Option<usize> {
    usize::try_from(position).ok()?.checked_sub(1)
}

fn invalid_position_embed() -> CreateEmbed {
    embeds::create_error_embed("Posición inválida", "Las posiciones de la cola empiezan en 1")
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::TrackMetadata;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    /// Fuente que anota cada búsqueda en el mismo registro que la conexión
    struct ScriptedSource {
        found: bool,
        log: Mutex<Vec<&'static str>>,
    }

    impl ScriptedSource {
        fn new(found: bool) -> Self {
            Self {
                found,
                log: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MusicSource for ScriptedSource {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<TrackMetadata>> {
            Ok(Vec::new())
        }

        async fn lookup(&self, query: &str, requested_by: UserId) -> Result<Track> {
            self.log.lock().push("lookup");
            if self.found {
                Ok(Track::new(query, format!("src:{query}"), requested_by))
            } else {
                anyhow::bail!("Sin resultados para '{}'", query)
            }
        }

        fn is_valid_url(&self, _url: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn failed_lookup_never_joins_voice() {
        let source = ScriptedSource::new(false);
        let log = &source.log;
        let outcome = lookup_then_join(&source, "nada", UserId::new(1), move || async move {
            log.lock().push("join");
            Ok(())
        })
        .await;

        assert!(matches!(outcome, Err(PlayFailure::NotFound(_))));
        assert_eq!(*source.log.lock(), vec!["lookup"]);
    }

    #[tokio::test]
    async fn joins_only_after_track_is_found() {
        let source = ScriptedSource::new(true);
        let log = &source.log;
        let track = lookup_then_join(&source, "lofi", UserId::new(1), move || async move {
            log.lock().push("join");
            Ok(())
        })
        .await
        .expect("track encontrado");

        assert_eq!(track.title(), "lofi");
        assert_eq!(*source.log.lock(), vec!["lookup", "join"]);
    }

    #[tokio::test]
    async fn join_failure_is_reported_separately() {
        let source = ScriptedSource::new(true);
        let outcome = lookup_then_join(&source, "lofi", UserId::new(1), || async {
            anyhow::bail!("sin permisos")
        })
        .await;

        assert!(matches!(outcome, Err(PlayFailure::Join(_))));
    }

    #[test]
    fn user_positions_are_one_based() {
        assert_eq!(to_index(1), Some(0));
        assert_eq!(to_index(12), Some(11));
        assert_eq!(to_index(0), None);
        assert_eq!(to_index(-3), None);
    }
}

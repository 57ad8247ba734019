use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{PlaybackError, PlaybackEvent, QueueInfo, QueuePage, Track};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Groove Deck";

pub const ITEMS_PER_PAGE: usize = 10;

/// Discord rechaza campos de más de 1024 caracteres
const FIELD_LIMIT: usize = 1024;
const TITLE_LIMIT: usize = 80;

/// Corta por caracteres, no por bytes, y marca el corte con `…`
fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

fn with_track_details(mut embed: CreateEmbed, track: &Track) -> CreateEmbed {
    embed = match track.duration() {
        Some(duration) => embed.field("⏱️ Duración", format_duration(duration), true),
        None => embed.field("⏱️ Duración", "🔴 En vivo", true),
    };
    embed = embed
        .field(
            "👤 Solicitado por",
            format!("<@{}>", track.requested_by()),
            true,
        )
        .field(
            "🕐 Pedido",
            format!("<t:{}:R>", track.requested_at().timestamp()),
            true,
        );

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }
    if track.source().starts_with("http") {
        embed = embed.url(track.source());
    }
    embed
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN);

    with_track_details(embed, track)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Respuesta a `/play` cuando la sesión estaba inactiva
pub fn create_track_starting_embed(track: &Track) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("▶️ Preparando reproducción")
        .description(format!("**{}** empezará a sonar en un momento", track.title()))
        .color(colors::MUSIC_PURPLE);

    with_track_details(embed, track)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción. `position` es 0-based.
pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!(
            "**{}** se ha agregado a la cola de reproducción",
            track.title()
        ))
        .color(colors::SUCCESS_GREEN)
        .field("📍 Posición", format!("#{}", position + 1), true);

    with_track_details(embed, track)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente cuando le toque",
        ))
}

/// Líneas numeradas (desde 1) de una página de la cola
fn queue_lines(page: &QueuePage) -> String {
    page.items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let duration = item
                .duration()
                .map(|dur| format!(" `[{}]`", format_duration(dur)))
                .unwrap_or_default();
            format!(
                "**{}**. {}{}\n",
                page.offset + i + 1,
                truncate_chars(item.title(), TITLE_LIMIT),
                duration
            )
        })
        .collect()
}

pub fn create_queue_embed(queue_info: &QueueInfo, page: usize) -> CreateEmbed {
    let queue_page = queue_info.get_page(page, ITEMS_PER_PAGE);

    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if queue_info.current.is_none() && queue_info.total_items() == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = &queue_info.current {
        embed = embed.field(
            "▶️ Reproduciendo",
            format!("**{}**", truncate_chars(current.title(), TITLE_LIMIT)),
            false,
        );
    }

    if !queue_page.items.is_empty() {
        let lines = truncate_chars(&queue_lines(&queue_page), FIELD_LIMIT);
        embed = embed.field("Próximas canciones", lines, false);
    }

    let mut info = format!("**Total:** {} canciones", queue_info.total_items());
    if queue_info.total_duration > Duration::ZERO {
        info.push_str(&format!(
            " • **Duración:** {}",
            format_duration(queue_info.total_duration)
        ));
    }
    embed = embed.field("Información", info, false);

    // Paginación
    if queue_page.total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Groove Deck",
            queue_page.current_page, queue_page.total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

pub fn create_help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Groove Deck - Comandos")
        .color(colors::INFO_BLUE)
        .field(
            "🎵 Reproducción",
            "• `/play <canción>` - Reproduce o agrega a la cola\n\
            • `/skip` - Salta a la siguiente canción\n\
            • `/stop` - Detiene y limpia la cola\n\
            • `/nowplaying` - Muestra la canción actual",
            false,
        )
        .field(
            "📜 Cola",
            "• `/queue [página]` - Muestra la cola\n\
            • `/remove <posición>` - Quita una canción\n\
            • `/move <desde> <hasta>` - Reordena la cola",
            false,
        )
        .field(
            "🔊 Conexión",
            "• `/leave` - Desconecta del canal\n\
            • `/audio` - Muestra la configuración de audio",
            false,
        )
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Lo que songbird entrega a Discord; solo el volumen es configurable
pub fn create_audio_embed(volume: f32) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎚️ Configuración de Audio")
        .color(colors::INFO_BLUE)
        .field(
            "⚙️ Salida",
            "**Códec:** Opus\n**Frecuencia:** 48 kHz\n**Canales:** Estéreo",
            true,
        )
        .field("🔊 Volumen", format!("{:.0}%", volume * 100.0), true)
        .field(
            "📥 Origen",
            "Streams de yt-dlp decodificados con symphonia",
            false,
        )
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Texto para el usuario, con posiciones desde 1
pub fn describe_playback_error(error: &PlaybackError) -> String {
    match error {
        PlaybackError::OutOfRange { index, len } => format!(
            "La posición {} no existe (la cola tiene {} canciones)",
            index.saturating_add(1),
            len
        ),
        PlaybackError::NoOp { index } => {
            format!("La canción ya está en la posición {}", index.saturating_add(1))
        }
        other => other.to_string(),
    }
}

pub fn create_playback_error_embed(error: &PlaybackError) -> CreateEmbed {
    create_error_embed("No se pudo completar", &describe_playback_error(error))
}

/// Anuncio en el canal de texto para un evento de reproducción
pub fn create_event_embed(event: &PlaybackEvent) -> CreateEmbed {
    match event {
        PlaybackEvent::NowPlaying { track, .. } => create_now_playing_embed(track),
        PlaybackEvent::ResolutionFailed { track, reason, .. } => CreateEmbed::default()
            .title("⚠️ Canción omitida")
            .description(format!(
                "No se pudo reproducir **{}**\n`{}`",
                track.title(),
                reason
            ))
            .color(colors::WARNING_ORANGE)
            .timestamp(Timestamp::now())
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER)),
        PlaybackEvent::SinkWarning { track, reason, .. } => CreateEmbed::default()
            .title("⚠️ Problema de audio")
            .description(format!(
                "La reproducción de **{}** se interrumpió\n`{}`",
                track.title(),
                reason
            ))
            .color(colors::WARNING_ORANGE)
            .timestamp(Timestamp::now())
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER)),
        PlaybackEvent::QueueFinished { .. } => create_info_embed(
            "Cola terminada",
            "No quedan canciones. Usa `/play` para seguir escuchando",
        ),
        PlaybackEvent::Disconnected { .. } => CreateEmbed::default()
            .title("💤 Desconectado por inactividad")
            .color(colors::NEUTRAL_GRAY)
            .timestamp(Timestamp::now())
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER)),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    #[test]
    fn durations_use_clock_format() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(215)), "3:35");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn errors_are_shown_with_one_based_positions() {
        assert_eq!(
            describe_playback_error(&PlaybackError::OutOfRange { index: 4, len: 2 }),
            "La posición 5 no existe (la cola tiene 2 canciones)"
        );
        assert_eq!(
            describe_playback_error(&PlaybackError::NoOp { index: 0 }),
            "La canción ya está en la posición 1"
        );
        assert_eq!(
            describe_playback_error(&PlaybackError::NothingPlaying),
            "No hay nada reproduciéndose"
        );
    }

    #[test]
    fn queue_lines_continue_numbering_across_pages() {
        let items: Vec<Track> = (1..=12)
            .map(|n| Track::new(format!("Tema {n}"), format!("src:{n}"), UserId::new(1)))
            .collect();
        let info = QueueInfo {
            items,
            ..QueueInfo::default()
        };

        let lines = queue_lines(&info.get_page(2, ITEMS_PER_PAGE));
        assert_eq!(lines, "**11**. Tema 11\n**12**. Tema 12\n");
    }

    #[test]
    fn long_titles_fit_in_one_field() {
        let long_title = "Canción larguísima ñandú ".repeat(8);
        let items: Vec<Track> = (1..=ITEMS_PER_PAGE)
            .map(|n| {
                Track::new(format!("{n} {long_title}"), format!("src:{n}"), UserId::new(1))
                    .with_duration(Duration::from_secs(3725))
            })
            .collect();
        let info = QueueInfo {
            items,
            ..QueueInfo::default()
        };

        let lines = queue_lines(&info.get_page(1, ITEMS_PER_PAGE));
        assert!(lines.chars().count() <= FIELD_LIMIT);
        assert!(lines.lines().all(|line| line.ends_with("… `[1:02:05]`")));
    }

    #[test]
    fn audio_embed_shows_configured_volume() {
        let embed = serde_json::to_value(create_audio_embed(0.5)).expect("embed serializable");
        assert_eq!(embed["fields"][1]["name"], "🔊 Volumen");
        assert_eq!(embed["fields"][1]["value"], "50%");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("ñandú", 10), "ñandú");
        assert_eq!(truncate_chars("ñandú", 3), "ña…");
        assert_eq!(truncate_chars(&"é".repeat(2000), FIELD_LIMIT).chars().count(), FIELD_LIMIT);
    }
}

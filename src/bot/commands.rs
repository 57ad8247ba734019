use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{
        application::{Command, CommandOptionType},
        id::GuildId,
    },
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        skip_command(),
        stop_command(),
        queue_command(),
        nowplaying_command(),
        remove_command(),
        move_command(),
        leave_command(),
        audio_command(),
        help_command(),
    ]
}

/// Registra comandos globales, reemplazando los anteriores
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    Command::set_global_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o la agrega a la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y limpia la cola")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(CreateCommandOption::new(
            CommandOptionType::Integer,
            "page",
            "Número de página",
        ))
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra la canción actual")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita una canción de la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "position",
                "Posición en la cola (desde 1)",
            )
            .required(true),
        )
}

fn move_command() -> CreateCommand {
    CreateCommand::new("move")
        .description("Cambia de lugar una canción de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "from", "Posición actual")
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "to", "Nueva posición")
                .required(true),
        )
}

// Comandos de conexión

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}

fn audio_command() -> CreateCommand {
    CreateCommand::new("audio").description("Muestra la configuración de audio")
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("Muestra la lista de comandos")
}

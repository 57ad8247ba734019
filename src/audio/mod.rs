//! # Audio Module
//!
//! Coordinador de reproducción por guild.
//!
//! ## Architecture
//!
//! ### [`session`] - Playback Session
//! - Máquina de estados `Idle → Starting → Playing → Stopping`
//! - Contador de generación que invalida resoluciones y señales de fin tardías
//! - Temporizador de inactividad que desconecta la guild
//!
//! ### [`registry`] - Session Registry
//! - Una sesión por guild, creada bajo demanda de forma atómica
//!
//! ### [`queue`] - Queue Management
//! - FIFO con eliminación y movimiento por índice
//!
//! ### [`sink`] / [`songbird_sink`] - Voice Transport
//! - Contrato mínimo con la conexión de voz y su implementación sobre songbird
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use groove_deck::audio::{SessionRegistry, SongbirdConnector, Track};
//! use groove_deck::sources::YouTubeClient;
//! use serenity::all::{GuildId, UserId};
//! use songbird::input::Input;
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn example(manager: Arc<songbird::Songbird>) -> anyhow::Result<()> {
//! let registry: SessionRegistry<Input> = SessionRegistry::new(
//!     Arc::new(YouTubeClient::new(3, Duration::from_secs(30))),
//!     Arc::new(SongbirdConnector::new(manager, 0.5)),
//!     Duration::from_secs(10),
//! );
//!
//! let guild_id = GuildId::new(123456789);
//! let track = Track::new("Song", "https://youtu.be/dQw4w9WgXcQ", UserId::new(1));
//! registry.enqueue(guild_id, track).await?;
//!
//! if let Some(session) = registry.get(guild_id) {
//!     session.skip().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod queue;
pub mod registry;
pub mod session;
pub mod sink;
pub mod songbird_sink;
pub mod track;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{PlaybackError, PlaybackResult, ResolutionError, SinkError};
pub use events::PlaybackEvent;
pub use queue::{MusicQueue, QueueInfo, QueuePage};
pub use registry::SessionRegistry;
pub use session::{EnqueueOutcome, PlaybackSession, PlaybackState, SessionSnapshot};
pub use sink::{StreamCompletion, StreamControl, StreamEnded, VoiceConnector, VoiceSink};
pub use songbird_sink::{SongbirdConnector, SongbirdSink};
pub use track::Track;

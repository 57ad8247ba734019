//! # Groove Deck
//!
//! Bot de música para Discord: una cola y un stream activo por guild,
//! coordinados por [`audio::PlaybackSession`].

pub mod audio;
pub mod bot;
pub mod config;
pub mod sources;
pub mod ui;

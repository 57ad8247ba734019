use thiserror::Error;

/// Errores de validación devueltos de forma síncrona al front-end.
///
/// Ninguno de ellos modifica el estado de la sesión.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Posición {index} fuera de rango (la cola tiene {len} canciones)")]
    OutOfRange { index: usize, len: usize },

    #[error("La canción ya está en la posición {index}")]
    NoOp { index: usize },

    #[error("No hay nada reproduciéndose")]
    NothingPlaying,

    #[error("La sesión de reproducción ya fue cerrada")]
    SessionClosed,
}

/// Fallo al convertir un track en un stream reproducible.
///
/// Se reporta al front-end como evento; la sesión salta al siguiente track.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Fuente no disponible: {0}")]
    Unavailable(String),

    #[error("Error ejecutando el extractor: {0}")]
    Process(String),

    #[error("Tiempo de espera agotado resolviendo la fuente")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

/// Errores del transporte de voz.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("No conectado a un canal de voz")]
    NotConnected,

    #[error("Error del driver de voz: {0}")]
    Driver(String),
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;

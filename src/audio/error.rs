use std::fmt;

use thiserror::Error;

use super::session::SessionState;

/// Clase de fallo de un colaborador externo (resolvedor o transporte).
///
/// El consumidor decide la política (saltar o abortar) solo con este valor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    Network,
    Unsupported,
    ConnectionDenied,
}

/// Error de resolución o de transporte de audio.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("no se encontró resultado: {0}")]
    NotFound(String),

    #[error("error de red: {0}")]
    Network(String),

    #[error("fuente no soportada: {0}")]
    Unsupported(String),

    #[error("conexión rechazada: {0}")]
    ConnectionDenied(String),
}

impl MediaError {
    pub fn kind(&self) -> FailureKind {
        match self {
            MediaError::NotFound(_) => FailureKind::NotFound,
            MediaError::Network(_) => FailureKind::Network,
            MediaError::Unsupported(_) => FailureKind::Unsupported,
            MediaError::ConnectionDenied(_) => FailureKind::ConnectionDenied,
        }
    }

    /// Un fallo de `play` con esta clase termina la sesión completa.
    pub fn is_fatal_for_session(&self) -> bool {
        self.kind() == FailureKind::ConnectionDenied
    }

    pub fn reason(&self) -> &str {
        match self {
            MediaError::NotFound(reason)
            | MediaError::Network(reason)
            | MediaError::Unsupported(reason)
            | MediaError::ConnectionDenied(reason) => reason,
        }
    }
}

/// Operaciones de control que llegan desde la capa de comandos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Pause,
    Resume,
    Skip,
    Stop,
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            ControlAction::Pause => "pausar",
            ControlAction::Resume => "reanudar",
            ControlAction::Skip => "saltar",
            ControlAction::Stop => "detener",
        };
        f.write_str(verb)
    }
}

/// Rechazo tipado de una operación de la superficie de control.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("no hay una sesión de reproducción activa en este servidor")]
    NoSession,

    #[error("no se puede {action} mientras el reproductor está {state}")]
    InvalidState {
        action: ControlAction,
        state: SessionState,
    },

    #[error("no se pudo conectar al canal de voz: {0}")]
    ConnectionSetup(MediaError),

    #[error("el transporte de audio falló: {0}")]
    Transport(MediaError),
}

impl ControlError {
    pub(crate) fn invalid(action: ControlAction, state: SessionState) -> Self {
        ControlError::InvalidState { action, state }
    }
}

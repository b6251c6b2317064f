use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, UserId};
use std::collections::VecDeque;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Solicitud de reproducción; inmutable una vez creada
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    pub requested_by: UserId,
    pub query: String,
    pub enqueued_at: DateTime<Utc>,
    /// Canal de texto donde se pidió, para los avisos
    pub text_channel: Option<ChannelId>,
}

impl PlaybackRequest {
    pub fn new(requested_by: UserId, query: impl Into<String>) -> Self {
        Self {
            requested_by,
            query: query.into(),
            enqueued_at: Utc::now(),
            text_channel: None,
        }
    }

    pub fn with_text_channel(mut self, channel_id: ChannelId) -> Self {
        self.text_channel = Some(channel_id);
        self
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    items: VecDeque<PlaybackRequest>,
    closed: bool,
}

/// Cola FIFO de solicitudes pendientes de un servidor.
///
/// Muchos productores, un solo consumidor. Una vez cerrada rechaza nuevas
/// solicitudes, así nada se encola en una sesión que se está desmontando.
#[derive(Debug, Default)]
pub struct RequestQueue {
    inner: Mutex<QueueInner>,
    available: Notify,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega al final; devuelve la posición (desde 1) o la solicitud si la cola está cerrada
    pub fn push(&self, request: PlaybackRequest) -> Result<usize, PlaybackRequest> {
        let position = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(request);
            }
            info!("➕ Agregado a la cola: {}", request.query);
            inner.items.push_back(request);
            inner.items.len()
        };

        self.available.notify_one();
        Ok(position)
    }

    /// Saca el primero sin esperar
    pub fn try_pop(&self) -> Option<PlaybackRequest> {
        let next = self.inner.lock().items.pop_front();
        if let Some(ref request) = next {
            debug!("➡️ Siguiente en cola (FIFO): {}", request.query);
        }
        next
    }

    /// Espera hasta que haya una solicitud.
    ///
    /// Seguro de cancelar: si el future se descarta, la solicitud sigue en la cola.
    pub async fn pop(&self) -> PlaybackRequest {
        loop {
            if let Some(request) = self.try_pop() {
                return request;
            }
            self.available.notified().await;
        }
    }

    /// Cierra la cola solo si está vacía; falso si llegó trabajo nuevo
    pub fn close_if_empty(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.items.is_empty() {
            inner.closed = true;
            true
        } else {
            false
        }
    }

    /// Cierra la cola y descarta lo pendiente; retorna cuántas solicitudes se tiraron
    pub fn close(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let dropped = inner.items.len();
        inner.items.clear();
        if dropped > 0 {
            info!("🗑️ Cola limpiada: {} solicitudes descartadas", dropped);
        }
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Copia de solo lectura de lo pendiente, en orden de reproducción
    pub fn snapshot(&self) -> Vec<PlaybackRequest> {
        self.inner.lock().items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}

//! Avisos de reproducción en los canales de texto.
//!
//! El consumidor publica sin esperar; una única tarea entrega los avisos en
//! orden y mantiene un mensaje de "reproduciendo ahora" por servidor, que se
//! edita en lugar de repetirse.

use serenity::{
    builder::{CreateMessage, EditMessage},
    http::Http,
    model::id::{ChannelId, GuildId, MessageId},
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    audio::{EventSink, Notice, SessionEvent, TrackOutcome},
    ui::{buttons, embeds},
};

pub struct DiscordAnnouncer {
    notices: mpsc::UnboundedSender<Notice>,
}

impl DiscordAnnouncer {
    /// Lanza la tarea de entrega y devuelve el receptor para el motor
    pub fn spawn(http: Arc<Http>) -> Self {
        let (notices, mut inbox) = mpsc::unbounded_channel::<Notice>();

        tokio::spawn(async move {
            let mut delivery = Delivery {
                http,
                now_playing: HashMap::new(),
            };
            while let Some(notice) = inbox.recv().await {
                delivery.deliver(notice).await;
            }
            debug!("Tarea de avisos terminada");
        });

        Self { notices }
    }
}

impl EventSink for DiscordAnnouncer {
    fn publish(&self, notice: Notice) {
        if self.notices.send(notice).is_err() {
            debug!("Aviso descartado: la tarea de entrega ya no existe");
        }
    }
}

struct Delivery {
    http: Arc<Http>,
    /// Último mensaje de "reproduciendo ahora" por servidor
    now_playing: HashMap<GuildId, (ChannelId, MessageId)>,
}

impl Delivery {
    async fn deliver(&mut self, notice: Notice) {
        let Notice {
            guild_id,
            channel_id,
            event,
        } = notice;

        let Some(channel_id) = channel_id else {
            debug!("Aviso sin canal para guild {}: {:?}", guild_id, event);
            return;
        };

        let result = match event {
            SessionEvent::TrackStarted(now) => {
                let embed = embeds::create_now_playing_embed(&now, false);
                let controls = buttons::create_player_buttons(false);
                self.show_now_playing(guild_id, channel_id, embed, controls).await
            }
            SessionEvent::TrackFailed { request, error } => {
                let embed = embeds::create_track_failed_embed(&request, &error);
                self.send(channel_id, CreateMessage::new().embed(embed)).await
            }
            SessionEvent::TrackFinished { track, outcome } => match outcome {
                TrackOutcome::Finished => {
                    debug!("Track terminado en guild {}: {}", guild_id, track.title);
                    Ok(())
                }
                TrackOutcome::Failed(reason) => {
                    let embed = embeds::create_error_embed(
                        "Error durante la reproducción",
                        &format!("**{}** se cortó: {}", track.title, reason),
                    );
                    self.send(channel_id, CreateMessage::new().embed(embed)).await
                }
            },
            SessionEvent::SessionEnded { exit, dropped } => {
                self.retire_now_playing(guild_id).await;
                let embed = embeds::create_session_ended_embed(&exit, dropped);
                self.send(channel_id, CreateMessage::new().embed(embed)).await
            }
        };

        if let Err(e) = result {
            warn!("⚠️ No se pudo enviar el aviso en guild {}: {:?}", guild_id, e);
        }
    }

    /// Edita el mensaje anterior si está en el mismo canal; si no, publica uno nuevo
    async fn show_now_playing(
        &mut self,
        guild_id: GuildId,
        channel_id: ChannelId,
        embed: serenity::builder::CreateEmbed,
        controls: Vec<serenity::builder::CreateActionRow>,
    ) -> serenity::Result<()> {
        let previous = self.now_playing.get(&guild_id).copied();

        if let Some((previous_channel, message_id)) = previous {
            if previous_channel == channel_id {
                let edit = EditMessage::new().embed(embed.clone()).components(controls.clone());
                match channel_id.edit_message(&*self.http, message_id, edit).await {
                    Ok(_) => return Ok(()),
                    Err(e) => debug!("No se pudo editar el mensaje anterior, enviando uno nuevo: {:?}", e),
                }
            } else {
                self.strip_controls(previous_channel, message_id).await;
            }
        }

        let message = channel_id
            .send_message(&*self.http, CreateMessage::new().embed(embed).components(controls))
            .await?;
        self.now_playing.insert(guild_id, (channel_id, message.id));
        Ok(())
    }

    async fn retire_now_playing(&mut self, guild_id: GuildId) {
        if let Some((channel_id, message_id)) = self.now_playing.remove(&guild_id) {
            self.strip_controls(channel_id, message_id).await;
        }
    }

    /// Quita los botones de un mensaje viejo para que nadie los use
    async fn strip_controls(&self, channel_id: ChannelId, message_id: MessageId) {
        let edit = EditMessage::new().components(Vec::new());
        if let Err(e) = channel_id.edit_message(&*self.http, message_id, edit).await {
            debug!("No se pudieron quitar los controles del mensaje {}: {:?}", message_id, e);
        }
    }

    async fn send(&self, channel_id: ChannelId, message: CreateMessage) -> serenity::Result<()> {
        channel_id.send_message(&*self.http, message).await?;
        Ok(())
    }
}

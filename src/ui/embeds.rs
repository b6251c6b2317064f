use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{MediaError, NowPlaying, PlaybackRequest, SessionExit};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Music";

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(now: &NowPlaying, paused: bool) -> CreateEmbed {
    let (title, color) = if paused {
        ("⏸️ En Pausa", colors::WARNING_ORANGE)
    } else {
        ("🎵 Reproduciendo Ahora", colors::SUCCESS_GREEN)
    };

    let duration = now
        .track
        .duration
        .map(format_duration)
        .unwrap_or_else(|| "🔴 En vivo".to_string());

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", now.track.title))
        .color(color)
        .field("⏱️ Duración", duration, true)
        .field("👤 Solicitado por", format!("<@{}>", now.request.requested_by), true)
        .url(&now.track.page_url);

    if let Some(thumbnail) = &now.track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Confirmación de `/play`
pub fn create_track_queued_embed(query: &str, position: usize, created: bool) -> CreateEmbed {
    let description = if created {
        format!("**{}** será lo primero en sonar", query)
    } else {
        format!("**{}** quedó en la posición **#{}** de la cola", query, position)
    };

    CreateEmbed::default()
        .title("✅ Agregado a la Cola")
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Aviso de una solicitud que no se pudo reproducir
pub fn create_track_failed_embed(request: &PlaybackRequest, error: &MediaError) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ No se pudo reproducir")
        .description(format!(
            "<@{}> **{}**\n{}\n\n⏭️ Pasando a la siguiente de la cola",
            request.requested_by, request.query, error
        ))
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Aviso de fin de sesión
pub fn create_session_ended_embed(exit: &SessionExit, dropped: usize) -> CreateEmbed {
    let (title, mut description, color) = match exit {
        SessionExit::IdleTimeout => (
            "👋 Desconectado por Inactividad",
            "No hubo nada que reproducir por un rato.\n💡 Usa `/play <canción>` para volver a empezar".to_string(),
            colors::NEUTRAL_GRAY,
        ),
        SessionExit::Stopped => (
            "⏹️ Reproducción Detenida",
            "La cola fue vaciada y el bot salió del canal de voz".to_string(),
            colors::INFO_BLUE,
        ),
        SessionExit::Aborted(reason) => (
            "⚠️ Reproducción Interrumpida",
            format!("El reproductor se detuvo por un error: {}", reason),
            colors::ERROR_RED,
        ),
    };

    if dropped > 0 {
        description.push_str(&format!("\n🗑️ {} solicitudes pendientes descartadas", dropped));
    }

    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(color)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para la cola
pub fn create_queue_embed(now: Option<&NowPlaying>, pending: &[PlaybackRequest], page_size: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if now.is_none() && pending.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(now) = now {
        embed = embed.field(
            "▶️ Reproduciendo",
            format!("**{}** · <@{}>", now.track.title, now.request.requested_by),
            false,
        );
    }

    let listing = if pending.is_empty() {
        "Nada más en espera".to_string()
    } else {
        queue_listing(pending, page_size)
    };

    embed
        .field(format!("⏳ En espera ({})", pending.len()), listing, false)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Lista numerada de las primeras `page_size` solicitudes y cuántas quedan fuera
pub fn queue_listing(pending: &[PlaybackRequest], page_size: usize) -> String {
    let mut lines: Vec<String> = pending
        .iter()
        .take(page_size)
        .enumerate()
        .map(|(i, request)| format!("**{}**. {} · <@{}>", i + 1, request.query, request.requested_by))
        .collect();

    let hidden = pending.len().saturating_sub(page_size);
    if hidden > 0 {
        lines.push(format!("... y {} más", hidden));
    }

    lines.join("\n")
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

fn format_duration(duration: Duration) -> String {
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
    use crate::sources::ResolvedTrack;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    fn pending(n: usize) -> Vec<PlaybackRequest> {
        (1..=n)
            .map(|i| PlaybackRequest::new(UserId::new(7), format!("song{}", i)))
            .collect()
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(3 * 60 + 5)), "3:05");
        assert_eq!(format_duration(Duration::from_secs(3600 + 62)), "1:01:02");
    }

    #[test]
    fn listing_is_capped_by_page_size() {
        let listing = queue_listing(&pending(13), 10);
        let lines: Vec<&str> = listing.lines().collect();

        assert_eq!(lines.len(), 11);
        assert_eq!(lines[0], "**1**. song1 · <@7>");
        assert_eq!(lines[10], "... y 3 más");
    }

    #[test]
    fn short_listing_has_no_overflow_line() {
        let listing = queue_listing(&pending(2), 10);
        assert!(!listing.contains("más"));
    }

    #[test]
    fn now_playing_embed_shows_live_for_unknown_duration() {
        let now = NowPlaying {
            track: ResolvedTrack::new("Song", "https://cdn.test/s", "https://video.test/s"),
            request: PlaybackRequest::new(UserId::new(3), "song"),
            started_at: Utc::now(),
        };

        let json = serde_json::to_value(create_now_playing_embed(&now, false)).unwrap();
        assert_eq!(json["description"], "**Song**");
        assert_eq!(json["fields"][0]["value"], "🔴 En vivo");
        assert_eq!(json["fields"][1]["value"], "<@3>");
    }

    #[test]
    fn session_end_mentions_dropped_requests() {
        let json = serde_json::to_value(create_session_ended_embed(&SessionExit::Stopped, 4)).unwrap();
        let description = json["description"].as_str().unwrap();
        assert!(description.contains("4 solicitudes pendientes descartadas"));

        let json = serde_json::to_value(create_session_ended_embed(&SessionExit::IdleTimeout, 0)).unwrap();
        assert!(!json["description"].as_str().unwrap().contains("descartadas"));
    }
}

use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod cache;
mod config;
mod sources;
mod ui;

use crate::audio::{PlayerControls, SessionRegistry, SongbirdTransport};
use crate::bot::{announcer::DiscordAnnouncer, GuildMusicBot};
use crate::config::Config;
use crate::sources::{cached::CachedResolver, ytdlp::YtDlpResolver};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    // El health check no necesita token
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    info!("🎵 Iniciando Guild Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("⚙️ {}", config.summary());

    // Resolución con yt-dlp detrás de la caché
    let resolver = CachedResolver::new(
        YtDlpResolver::new(config.ytdlp_path.clone(), config.resolve_timeout())
            .with_cookies(config.ytdlp_cookies.clone()),
        config.resolver_cache_size,
        config.resolver_cache_ttl(),
    );
    let resolver_cache = resolver.cache();

    // Voz y avisos
    let songbird = Songbird::serenity();
    let transport = SongbirdTransport::new(songbird.clone(), config.default_volume);
    let announcer = DiscordAnnouncer::spawn(Arc::new(Http::new(&config.discord_token)));

    let registry = SessionRegistry::new(
        Arc::new(resolver),
        Arc::new(transport),
        Arc::new(announcer),
        config.player_settings(),
    );
    let controls = PlayerControls::new(registry);

    // Intents mínimos: servidores y estados de voz
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = GuildMusicBot::new(config.clone(), controls.clone(), resolver_cache);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando sesiones...");
        controls.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    info!("👋 Bot detenido");
    Ok(())
}

async fn health_check() -> Result<()> {
    // Se lee YTDLP_PATH sin cargar toda la configuración
    dotenvy::dotenv().ok();
    let ytdlp_path = std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string());

    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}

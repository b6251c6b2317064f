use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PLAY_PAUSE: &str = "music_play_pause";
    pub const SKIP: &str = "music_skip";
    pub const STOP: &str = "music_stop";
    pub const QUEUE: &str = "music_queue";
}

/// Acción asociada a un botón del reproductor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    PlayPause,
    Skip,
    Stop,
    Queue,
}

impl ButtonAction {
    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        match custom_id {
            button_ids::PLAY_PAUSE => Some(ButtonAction::PlayPause),
            button_ids::SKIP => Some(ButtonAction::Skip),
            button_ids::STOP => Some(ButtonAction::Stop),
            button_ids::QUEUE => Some(ButtonAction::Queue),
            _ => None,
        }
    }

    /// Las acciones que cambian la reproducción exigen estar en el canal del bot
    pub fn requires_same_channel(self) -> bool {
        !matches!(self, ButtonAction::Queue)
    }
}

/// Controles del mensaje de "reproduciendo ahora"
pub fn create_player_buttons(paused: bool) -> Vec<CreateActionRow> {
    let (play_pause_emoji, play_pause_style) = if paused {
        ('▶', ButtonStyle::Success)
    } else {
        ('⏸', ButtonStyle::Secondary)
    };

    let play_pause_btn = CreateButton::new(button_ids::PLAY_PAUSE)
        .emoji(play_pause_emoji)
        .style(play_pause_style);

    let skip_btn = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .style(ButtonStyle::Primary)
        .disabled(paused);

    let stop_btn = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .style(ButtonStyle::Danger);

    let queue_btn = CreateButton::new(button_ids::QUEUE)
        .label("Cola")
        .emoji('📋')
        .style(ButtonStyle::Secondary);

    vec![CreateActionRow::Buttons(vec![
        play_pause_btn,
        skip_btn,
        stop_btn,
        queue_btn,
    ])]
}

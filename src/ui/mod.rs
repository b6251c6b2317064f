//! # UI Module
//!
//! Discord presentation helpers: embeds for playback notices and the
//! button row attached to the "now playing" message.

pub mod buttons;
pub mod embeds;

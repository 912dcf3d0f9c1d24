//! Adapters layer.

pub mod channel_window;

pub use channel_window::{ChannelWindow, ChannelWindowOpener, PostedMessage, RemoteWindow};

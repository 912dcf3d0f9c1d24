//! Ports layer: the remote browsing context.

pub mod window;

pub use window::{InboundMessage, PopupHandle, PopupWindow, WindowOpener};

use thiserror::Error;

/// Fatal errors while bringing the session up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to create Wayland socket: {0}")]
    Socket(String),
    #[error("failed to start backend: {0}")]
    Backend(String),
}

/// Per-event platform failures. The affected object is dropped and the
/// session keeps running.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("failed to compile keymap: {0}")]
    Keymap(String),
}

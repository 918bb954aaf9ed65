//! Platform implementations
//!
//! - **Headless** (`headless`): in-memory platform that records calls and
//!   simulates scene, layout and seat state. Drives the test suite.
//!
//! - **Winit** (`winit`): runs nested inside another compositor in a winit
//!   window, rendering with GLES. The smithay protocol state it drives lives
//!   in `wayland`.
//!
//! # Design Invariants
//!
//! 1. **Backend isolation**: each platform owns its display, renderer and
//!    output handles. The session core only sees the `platform` traits.
//!
//! 2. **Queued delivery**: protocol callbacks never call into the session.
//!    They queue a `PlatformEvent`, and the session pulls events one at a time.

mod cursor_image;
pub mod headless;
pub mod wayland;
pub mod winit;

pub use headless::HeadlessPlatform;
pub use winit::WinitPlatform;

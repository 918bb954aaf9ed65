//! Testing infrastructure for the session core
//!
//! This module provides test fixtures and utilities for integration testing
//! without a display server.
//!
//! # Architecture
//!
//! 1. **HeadlessPlatform** (`backend::headless`): records every platform call
//!    and simulates the scene, output layout and seat.
//!
//! 2. **Fixture**: runs a real `Session` on the headless platform and provides
//!    methods for simulating devices and clients.
//!
//! 3. **ClientManager**: simulated clients owning toplevels and cursor
//!    surfaces.
//!
//! # Example
//!
//! ```ignore
//! use kestrel_core::testing::Fixture;
//!
//! #[test]
//! fn test_window_gets_focus() {
//!     let mut fixture = Fixture::new().unwrap();
//!     fixture.add_output("Virtual-1", 1920, 1080);
//!     fixture.add_keyboard("kbd");
//!
//!     let client = fixture.add_client();
//!     let window = fixture.open_window(client);
//!
//!     assert_eq!(fixture.keyboard_focus(), Some(window));
//! }
//! ```

mod client;
mod fixture;

pub use crate::backend::headless::{keycodes, Call, CursorImage, HeadlessPlatform};
pub use client::{ClientManager, TestClient};
pub use fixture::Fixture;

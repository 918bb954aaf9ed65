//! Protocol-level tests for the session core
//!
//! These tests verify how the session answers platform events by using the
//! test fixture to simulate devices and clients.
//!
//! # Test Organization
//!
//! - `outputs.rs` - Output bring-up, frames, removal and termination
//! - `keyboard.rs` - Keymaps, key forwarding, the quit binding, device removal
//! - `focus.rs` - Toplevel lifecycle, stacking and keyboard focus
//! - `cursor.rs` - Cursor theming, pointer motion, cursor and selection requests

mod cursor;
mod focus;
mod keyboard;
mod outputs;

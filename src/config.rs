//! Session configuration
//!
//! Read once at startup from the environment. Invalid values are reported and
//! replaced by their defaults; configuration never fails startup.

use serde::Serialize;
use smithay::input::keyboard::xkb::{keysyms, Keysym};
use tracing::warn;

use crate::event::Modifiers;

pub const DEFAULT_CURSOR_THEME: &str = "default";
pub const DEFAULT_CURSOR_SIZE: u32 = 24;
/// Keys per second
pub const DEFAULT_REPEAT_RATE: i32 = 25;
/// Milliseconds before repeat starts
pub const DEFAULT_REPEAT_DELAY: i32 = 600;

/// XKB rules/model/layout/variant/options. Empty fields use the XKB defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeymapNames {
    pub rules: String,
    pub model: String,
    pub layout: String,
    pub variant: String,
    pub options: Option<String>,
}

/// A modifier + key combination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBinding {
    /// Any of these bits held activates the binding
    pub modifiers: Modifiers,
    pub keysym: Keysym,
}

impl KeyBinding {
    /// Whether a key press with `modifiers` held producing `symbols` triggers
    /// this binding. Letters match regardless of case.
    pub fn matches(&self, modifiers: Modifiers, symbols: &[Keysym]) -> bool {
        if !modifiers.intersects(self.modifiers) {
            return false;
        }
        let target = fold_case(self.keysym.raw());
        symbols.iter().any(|sym| fold_case(sym.raw()) == target)
    }
}

/// Map `A..=Z` to `a..=z`, leave everything else alone.
fn fold_case(keysym: u32) -> u32 {
    if (keysyms::KEY_A..=keysyms::KEY_Z).contains(&keysym) {
        keysym - keysyms::KEY_A + keysyms::KEY_a
    } else {
        keysym
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Listening socket name, `None` for the first free `wayland-N`
    pub socket_name: Option<String>,
    pub cursor_theme: String,
    pub cursor_size: u32,
    pub repeat_rate: i32,
    pub repeat_delay: i32,
    pub keymap: KeymapNames,
    /// Terminates the session
    pub quit_binding: KeyBinding,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_name: None,
            cursor_theme: DEFAULT_CURSOR_THEME.to_string(),
            cursor_size: DEFAULT_CURSOR_SIZE,
            repeat_rate: DEFAULT_REPEAT_RATE,
            repeat_delay: DEFAULT_REPEAT_DELAY,
            keymap: KeymapNames::default(),
            quit_binding: KeyBinding {
                modifiers: Modifiers::ALT,
                keysym: Keysym::new(keysyms::KEY_q),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        config.socket_name = lookup("KESTREL_SOCKET").filter(|name| !name.is_empty());
        if let Some(theme) = lookup("XCURSOR_THEME").filter(|theme| !theme.is_empty()) {
            config.cursor_theme = theme;
        }
        config.cursor_size = parse_or("XCURSOR_SIZE", lookup("XCURSOR_SIZE"), config.cursor_size);
        config.repeat_rate = parse_or(
            "KESTREL_REPEAT_RATE",
            lookup("KESTREL_REPEAT_RATE"),
            config.repeat_rate,
        );
        config.repeat_delay = parse_or(
            "KESTREL_REPEAT_DELAY",
            lookup("KESTREL_REPEAT_DELAY"),
            config.repeat_delay,
        );

        config.keymap = KeymapNames {
            rules: lookup("XKB_DEFAULT_RULES").unwrap_or_default(),
            model: lookup("XKB_DEFAULT_MODEL").unwrap_or_default(),
            layout: lookup("XKB_DEFAULT_LAYOUT").unwrap_or_default(),
            variant: lookup("XKB_DEFAULT_VARIANT").unwrap_or_default(),
            options: lookup("XKB_DEFAULT_OPTIONS"),
        };

        config
    }
}

fn parse_or<T: std::str::FromStr + Copy + std::fmt::Display>(
    key: &str,
    value: Option<String>,
    default: T,
) -> T {
    let Some(value) = value else {
        return default;
    };
    match value.trim().parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!("Invalid value {value:?} for {key}, using {default}");
            default
        }
    }
}

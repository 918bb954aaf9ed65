//! Keyboard tests
//!
//! Keymap setup, key and modifier forwarding, the quit binding and keyboard
//! hot-unplug.

use insta::assert_snapshot;
use kestrel_core::event::{KeyEvent, KeyState, KeyboardEvent, Modifiers, SeatCapabilities};
use kestrel_core::platform::Source;
use kestrel_core::testing::{keycodes, Fixture};
use kestrel_core::PlatformEvent;

fn fixture_with_output() -> Fixture {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture.add_output("Virtual-1", 1920, 1080);
    fixture
}

#[test]
fn test_new_keyboard_gets_keymap_and_repeat_info() {
    let mut fixture = fixture_with_output();
    fixture.clear_calls();

    let keyboard = fixture.add_keyboard("kbd");

    assert_snapshot!(fixture.call_log(), @r"
    keymap_compile
    set_keymap 2
    set_repeat_info 2 rate=25 delay=600
    set_keyboard 2
    set_capabilities POINTER+KEYBOARD
    ");
    assert_eq!(fixture.session_ref().seat.current_keyboard, Some(keyboard));
    assert_eq!(fixture.session_ref().listeners.count_for(Source::Keyboard(keyboard)), 3);
}

#[test]
fn test_repeat_info_follows_config() {
    let config = kestrel_core::Config {
        repeat_rate: 40,
        repeat_delay: 250,
        ..kestrel_core::Config::default()
    };
    let mut fixture = Fixture::with_config(config).expect("Failed to create fixture");
    fixture.clear_calls();

    fixture.add_keyboard("kbd");

    assert!(fixture.call_log().contains("set_repeat_info 1 rate=40 delay=250"));
}

#[test]
fn test_keymap_failure_drops_keyboard() {
    let mut fixture = fixture_with_output();
    fixture.platform().fail_keymap = true;
    fixture.clear_calls();

    let keyboard = fixture.add_keyboard("kbd");

    assert_snapshot!(fixture.call_log(), @r"
    keymap_compile
    set_capabilities POINTER
    ");
    assert!(fixture.session_ref().keyboards.is_empty());
    assert_eq!(fixture.session_ref().listeners.count_for(Source::Keyboard(keyboard)), 0);
    assert!(fixture.is_running());
}

#[test]
fn test_keys_are_forwarded_to_the_seat() {
    let mut fixture = fixture_with_output();
    let keyboard = fixture.add_keyboard("kbd");
    fixture.clear_calls();

    fixture.tap(keyboard, keycodes::KEY_Q);

    assert_snapshot!(fixture.call_log(), @r"
    set_keyboard 2
    notify_key 16 Pressed
    set_keyboard 2
    notify_key 16 Released
    ");
}

#[test]
fn test_modifier_keys_notify_modifiers() {
    let mut fixture = fixture_with_output();
    let keyboard = fixture.add_keyboard("kbd");
    fixture.clear_calls();

    fixture.press(keyboard, keycodes::KEY_LEFTSHIFT);

    assert_snapshot!(fixture.call_log(), @r"
    set_keyboard 2
    notify_key 42 Pressed
    set_keyboard 2
    notify_modifiers SHIFT
    ");
}

#[test]
fn test_alt_q_terminates_without_forwarding() {
    let mut fixture = fixture_with_output();
    let keyboard = fixture.add_keyboard("kbd");
    fixture.press(keyboard, keycodes::KEY_LEFTALT);
    fixture.clear_calls();

    fixture.press(keyboard, keycodes::KEY_Q);

    assert!(!fixture.is_running());
    assert_eq!(fixture.call_log(), "");
}

#[test]
fn test_queued_alt_q_chord_terminates() {
    let mut fixture = fixture_with_output();
    let keyboard = fixture.add_keyboard("kbd");
    fixture.clear_calls();

    fixture.platform().key(keyboard, keycodes::KEY_LEFTALT, KeyState::Pressed);
    fixture.platform().key(keyboard, keycodes::KEY_Q, KeyState::Pressed);
    fixture.platform().key(keyboard, keycodes::KEY_Q, KeyState::Released);
    fixture.platform().key(keyboard, keycodes::KEY_LEFTALT, KeyState::Released);
    fixture.dispatch();

    assert!(!fixture.is_running());
    assert_snapshot!(fixture.call_log(), @r"
    set_keyboard 2
    notify_key 56 Pressed
    set_keyboard 2
    notify_modifiers ALT
    ");
}

#[test]
fn test_queued_q_then_alt_is_forwarded() {
    let mut fixture = fixture_with_output();
    let keyboard = fixture.add_keyboard("kbd");
    fixture.clear_calls();

    fixture.platform().key(keyboard, keycodes::KEY_Q, KeyState::Pressed);
    fixture.platform().key(keyboard, keycodes::KEY_LEFTALT, KeyState::Pressed);
    fixture.dispatch();

    assert!(fixture.is_running());
    assert_snapshot!(fixture.call_log(), @r"
    set_keyboard 2
    notify_key 16 Pressed
    set_keyboard 2
    notify_key 56 Pressed
    set_keyboard 2
    notify_modifiers ALT
    ");
}

#[test]
fn test_surface_events_after_quit_reach_no_handler() {
    let mut fixture = fixture_with_output();
    let keyboard = fixture.add_keyboard("kbd");
    let client = fixture.add_client();
    let toplevel = fixture.open_window(client);
    fixture.press(keyboard, keycodes::KEY_LEFTALT);
    fixture.press(keyboard, keycodes::KEY_Q);
    assert!(!fixture.is_running());
    fixture.clear_calls();

    fixture.platform().commit(toplevel);
    fixture.platform().unmap(toplevel);
    fixture.dispatch();

    assert_eq!(fixture.call_log(), "");
    assert_eq!(fixture.platform_ref().pending_events(), 2);
    assert!(fixture
        .session_ref()
        .toplevels
        .get(toplevel)
        .is_some_and(|entry| entry.is_mapped()));
}

#[test]
fn test_alt_shift_q_also_terminates() {
    let mut fixture = fixture_with_output();
    let keyboard = fixture.add_keyboard("kbd");
    fixture.press(keyboard, keycodes::KEY_LEFTALT);
    fixture.press(keyboard, keycodes::KEY_LEFTSHIFT);

    fixture.press(keyboard, keycodes::KEY_Q);

    assert!(!fixture.is_running());
}

#[test]
fn test_other_alt_chords_are_forwarded() {
    let mut fixture = fixture_with_output();
    let keyboard = fixture.add_keyboard("kbd");
    fixture.press(keyboard, keycodes::KEY_LEFTALT);
    fixture.clear_calls();

    fixture.press(keyboard, keycodes::KEY_W);

    assert!(fixture.is_running());
    assert_snapshot!(fixture.call_log(), @r"
    set_keyboard 2
    notify_key 17 Pressed
    ");
}

#[test]
fn test_quit_release_is_forwarded() {
    let mut fixture = fixture_with_output();
    let keyboard = fixture.add_keyboard("kbd");
    fixture.press(keyboard, keycodes::KEY_LEFTALT);
    fixture.clear_calls();

    fixture.release(keyboard, keycodes::KEY_Q);

    assert!(fixture.is_running());
    assert_snapshot!(fixture.call_log(), @r"
    set_keyboard 2
    notify_key 16 Released
    ");
}

#[test]
fn test_last_active_keyboard_becomes_current() {
    let mut fixture = fixture_with_output();
    let first = fixture.add_keyboard("kbd-1");
    let second = fixture.add_keyboard("kbd-2");
    assert_eq!(fixture.session_ref().seat.current_keyboard, Some(second));

    fixture.tap(first, keycodes::KEY_A);

    assert_eq!(fixture.session_ref().seat.current_keyboard, Some(first));
    assert_eq!(fixture.platform_ref().active_keyboard(), Some(first));
}

#[test]
fn test_removing_current_keyboard_falls_back() {
    let mut fixture = fixture_with_output();
    let first = fixture.add_keyboard("kbd-1");
    let second = fixture.add_keyboard("kbd-2");
    fixture.clear_calls();

    fixture.remove_keyboard(second);

    assert_snapshot!(fixture.call_log(), @r"
    set_keyboard 2
    set_capabilities POINTER+KEYBOARD
    ");
    assert_eq!(fixture.session_ref().seat.current_keyboard, Some(first));
    assert_eq!(fixture.session_ref().listeners.count_for(Source::Keyboard(second)), 0);
}

#[test]
fn test_removing_last_keyboard_clears_capability() {
    let mut fixture = fixture_with_output();
    let keyboard = fixture.add_keyboard("kbd");
    fixture.clear_calls();

    fixture.remove_keyboard(keyboard);

    assert_snapshot!(fixture.call_log(), @r"
    set_keyboard none
    set_capabilities POINTER
    ");
    assert_eq!(fixture.session_ref().seat.current_keyboard, None);
    assert_eq!(fixture.platform_ref().capabilities(), SeatCapabilities::POINTER);
}

#[test]
fn test_removing_other_keyboard_keeps_current() {
    let mut fixture = fixture_with_output();
    let first = fixture.add_keyboard("kbd-1");
    let second = fixture.add_keyboard("kbd-2");

    fixture.remove_keyboard(first);

    assert_eq!(fixture.session_ref().seat.current_keyboard, Some(second));
    assert_eq!(fixture.session_ref().keyboards.len(), 1);
}

#[test]
fn test_events_from_removed_keyboard_are_dropped() {
    let mut fixture = fixture_with_output();
    let keyboard = fixture.add_keyboard("kbd");
    fixture.remove_keyboard(keyboard);
    let dropped = fixture.session_ref().listeners.dropped();
    fixture.clear_calls();

    fixture.platform().push_event(PlatformEvent::Keyboard(
        keyboard,
        KeyboardEvent::Key(KeyEvent {
            time_msec: 1,
            keycode: keycodes::KEY_A,
            state: KeyState::Pressed,
            modifiers: Modifiers::empty(),
            symbols: Vec::new(),
        }),
    ));
    fixture.platform().push_event(PlatformEvent::Keyboard(
        keyboard,
        KeyboardEvent::Modifiers(Modifiers::SHIFT),
    ));
    fixture.dispatch();

    assert_eq!(fixture.call_log(), "");
    assert_eq!(fixture.session_ref().listeners.dropped(), dropped + 2);
}

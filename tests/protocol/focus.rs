//! Focus tracking tests
//!
//! Toplevel lifecycle, stacking order and keyboard focus transitions.

use insta::assert_snapshot;
use kestrel_core::event::ToplevelId;
use kestrel_core::platform::{Signal, Source};
use kestrel_core::testing::{keycodes, Fixture};
use kestrel_core::toplevel::ToplevelState;
use proptest::prelude::*;

fn fixture_with_keyboard() -> Fixture {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture.add_output("Virtual-1", 1920, 1080);
    fixture.add_keyboard("kbd");
    fixture
}

/// Test initial focus state
#[test]
fn test_initial_focus_state() {
    let fixture = fixture_with_keyboard();

    assert_eq!(fixture.focused_toplevel(), None);
    assert_eq!(fixture.keyboard_focus(), None);
}

#[test]
fn test_new_toplevel_gets_initial_configure() {
    let mut fixture = fixture_with_keyboard();
    let client = fixture.add_client();
    fixture.clear_calls();

    let toplevel = fixture.create_toplevel(client);

    assert_snapshot!(fixture.call_log(), @r"
    scene_tree_create 3 -> node 4
    schedule_configure 3 0x0
    ");
    let entry = fixture.session_ref().toplevels.get(toplevel).unwrap();
    assert_eq!(entry.state, ToplevelState::Created);
    assert_eq!(fixture.focused_toplevel(), None);
}

#[test]
fn test_later_commits_do_not_reconfigure() {
    let mut fixture = fixture_with_keyboard();
    let client = fixture.add_client();
    let toplevel = fixture.create_toplevel(client);
    fixture.clear_calls();

    fixture.commit(toplevel);
    fixture.commit(toplevel);

    assert_eq!(fixture.call_log(), "");
}

#[test]
fn test_map_raises_and_focuses() {
    let mut fixture = fixture_with_keyboard();
    let client = fixture.add_client();
    let toplevel = fixture.create_toplevel(client);
    fixture.clear_calls();

    fixture.map_toplevel(toplevel);

    assert_snapshot!(fixture.call_log(), @r"
    raise_to_top node 4
    set_activated 3 true
    keyboard_enter 3 pressed=[] modifiers=none
    ");
    assert_eq!(fixture.focused_toplevel(), Some(toplevel));
    assert_eq!(fixture.keyboard_focus(), Some(toplevel));
    assert!(fixture.platform_ref().toplevel(toplevel).unwrap().activated);
}

#[test]
fn test_keyboard_enter_carries_held_keys() {
    let mut fixture = fixture_with_keyboard();
    let keyboard = fixture.session_ref().seat.current_keyboard.unwrap();
    let client = fixture.add_client();
    let toplevel = fixture.create_toplevel(client);
    fixture.press(keyboard, keycodes::KEY_LEFTCTRL);
    fixture.clear_calls();

    fixture.map_toplevel(toplevel);

    assert!(fixture
        .call_log()
        .ends_with("keyboard_enter 3 pressed=[29] modifiers=CTRL"));
}

#[test]
fn test_map_without_keyboard_activates_only() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture.add_output("Virtual-1", 1920, 1080);
    let client = fixture.add_client();
    let toplevel = fixture.create_toplevel(client);
    fixture.clear_calls();

    fixture.map_toplevel(toplevel);

    assert_snapshot!(fixture.call_log(), @r"
    raise_to_top node 3
    set_activated 2 true
    ");
    assert_eq!(fixture.focused_toplevel(), Some(toplevel));
    assert_eq!(fixture.keyboard_focus(), None);
}

#[test]
fn test_second_window_takes_focus() {
    let mut fixture = fixture_with_keyboard();
    let client = fixture.add_client();
    let first = fixture.open_window(client);
    let second = fixture.create_toplevel(client);
    fixture.clear_calls();

    fixture.map_toplevel(second);

    assert_snapshot!(fixture.call_log(), @r"
    raise_to_top node 6
    set_activated 3 false
    set_activated 5 true
    keyboard_enter 5 pressed=[] modifiers=none
    ");
    assert_eq!(fixture.top_toplevel(), Some(second));
    assert!(!fixture.platform_ref().toplevel(first).unwrap().activated);
    assert_eq!(
        fixture.session_ref().toplevels.mapped_stack(),
        vec![first, second]
    );
}

#[test]
fn test_unmapping_focused_window_focuses_next() {
    let mut fixture = fixture_with_keyboard();
    let client = fixture.add_client();
    let first = fixture.open_window(client);
    let second = fixture.open_window(client);
    fixture.clear_calls();

    fixture.unmap_toplevel(second);

    assert_snapshot!(fixture.call_log(), @r"
    set_activated 5 false
    raise_to_top node 4
    set_activated 3 true
    keyboard_enter 3 pressed=[] modifiers=none
    ");
    assert_eq!(fixture.keyboard_focus(), Some(first));
    assert_eq!(
        fixture.session_ref().toplevels.get(second).unwrap().state,
        ToplevelState::Unmapped
    );
}

#[test]
fn test_unmapping_unfocused_window_keeps_focus() {
    let mut fixture = fixture_with_keyboard();
    let client = fixture.add_client();
    let first = fixture.open_window(client);
    let second = fixture.open_window(client);
    fixture.clear_calls();

    fixture.unmap_toplevel(first);

    assert_eq!(fixture.call_log(), "");
    assert_eq!(fixture.keyboard_focus(), Some(second));
}

#[test]
fn test_closing_last_window_clears_focus() {
    let mut fixture = fixture_with_keyboard();
    let client = fixture.add_client();
    let toplevel = fixture.open_window(client);
    fixture.clear_calls();

    fixture.close_toplevel(toplevel);

    assert_snapshot!(fixture.call_log(), @r"
    set_activated 3 false
    keyboard_clear_focus
    ");
    assert_eq!(fixture.focused_toplevel(), None);
    assert_eq!(fixture.keyboard_focus(), None);
    assert!(fixture.session_ref().toplevels.is_empty());
}

#[test]
fn test_destroying_focused_window_focuses_next() {
    let mut fixture = fixture_with_keyboard();
    let client = fixture.add_client();
    let first = fixture.open_window(client);
    let second = fixture.open_window(client);

    fixture.platform().destroy_toplevel(second);
    fixture.dispatch();

    assert_eq!(fixture.focused_toplevel(), Some(first));
    assert_eq!(fixture.keyboard_focus(), Some(first));
}

#[test]
fn test_remapped_window_returns_to_top() {
    let mut fixture = fixture_with_keyboard();
    let client = fixture.add_client();
    let first = fixture.open_window(client);
    let second = fixture.open_window(client);
    fixture.unmap_toplevel(first);

    fixture.map_toplevel(first);

    assert_eq!(fixture.top_toplevel(), Some(first));
    assert_eq!(fixture.keyboard_focus(), Some(first));
    assert_eq!(
        fixture.session_ref().toplevels.mapped_stack(),
        vec![second, first]
    );
}

#[test]
fn test_no_handler_runs_after_destroy() {
    let mut fixture = fixture_with_keyboard();
    let client = fixture.add_client();
    let toplevel = fixture.open_window(client);
    fixture.close_toplevel(toplevel);

    let listeners = &fixture.session_ref().listeners;
    assert!(!listeners.is_subscribed(Source::Surface(toplevel), Signal::Map));
    assert_eq!(listeners.count_for(Source::Surface(toplevel)), 0);
    assert_eq!(listeners.count_for(Source::Toplevel(toplevel)), 0);

    let dropped = fixture.session_ref().listeners.dropped();
    fixture.clear_calls();
    fixture.map_toplevel(toplevel);
    fixture.commit(toplevel);

    assert_eq!(fixture.call_log(), "");
    assert_eq!(fixture.session_ref().listeners.dropped(), dropped + 2);
}

#[test]
fn test_popups_are_ignored() {
    let mut fixture = fixture_with_keyboard();
    fixture.clear_calls();

    fixture.platform().new_popup();
    fixture.dispatch();

    assert_eq!(fixture.call_log(), "");
    assert!(fixture.session_ref().toplevels.is_empty());
}

#[derive(Debug, Clone)]
enum WindowOp {
    Open,
    Create,
    Map(usize),
    Unmap(usize),
    Close(usize),
}

fn window_op() -> impl Strategy<Value = WindowOp> {
    prop_oneof![
        Just(WindowOp::Open),
        Just(WindowOp::Create),
        (0usize..8).prop_map(WindowOp::Map),
        (0usize..8).prop_map(WindowOp::Unmap),
        (0usize..8).prop_map(WindowOp::Close),
    ]
}

proptest! {
    #[test]
    fn test_focus_follows_top_mapped_window(ops in proptest::collection::vec(window_op(), 1..32)) {
        let mut fixture = fixture_with_keyboard();
        let client = fixture.add_client();
        let mut live: Vec<ToplevelId> = Vec::new();

        for op in ops {
            match op {
                WindowOp::Open => live.push(fixture.open_window(client)),
                WindowOp::Create => live.push(fixture.create_toplevel(client)),
                WindowOp::Map(slot) if !live.is_empty() => {
                    fixture.map_toplevel(live[slot % live.len()]);
                }
                WindowOp::Unmap(slot) if !live.is_empty() => {
                    fixture.unmap_toplevel(live[slot % live.len()]);
                }
                WindowOp::Close(slot) if !live.is_empty() => {
                    let toplevel = live.remove(slot % live.len());
                    fixture.close_toplevel(toplevel);
                }
                _ => {}
            }

            prop_assert_eq!(fixture.keyboard_focus(), fixture.top_toplevel());
            prop_assert_eq!(fixture.focused_toplevel(), fixture.top_toplevel());
            prop_assert_eq!(fixture.session_ref().toplevels.len(), live.len());
        }
    }
}

//! Cursor and seat request tests
//!
//! Lazy cursor theming, relative and absolute motion, client cursor images
//! and selection requests.

use insta::assert_snapshot;
use kestrel_core::event::{ButtonState, DataSourceId};
use kestrel_core::testing::{Call, CursorImage, Fixture};

fn fixture_with_pointer() -> (Fixture, kestrel_core::event::DeviceId) {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture.add_output("Virtual-1", 1920, 1080);
    let pointer = fixture.add_pointer("ptr");
    (fixture, pointer)
}

fn xcursor_loads(fixture: &Fixture) -> usize {
    fixture
        .platform_ref()
        .calls()
        .iter()
        .filter(|call| matches!(call, Call::CursorSetXcursor { .. }))
        .count()
}

#[test]
fn test_pointer_is_attached_to_cursor() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture.add_output("Virtual-1", 1920, 1080);
    fixture.clear_calls();

    let pointer = fixture.add_pointer("ptr");

    assert_snapshot!(fixture.call_log(), @r"
    cursor_attach_pointer 2
    set_capabilities POINTER
    ");
    assert_eq!(fixture.session_ref().cursor.pointers(), &[pointer]);
    assert!(!fixture.session_ref().cursor.is_themed());
}

#[test]
fn test_first_motion_applies_theme() {
    let (mut fixture, pointer) = fixture_with_pointer();
    fixture.clear_calls();

    fixture.pointer_motion(pointer, 10.0, 5.0);
    fixture.pointer_frame();
    fixture.pointer_motion(pointer, 2.5, 0.0);

    assert_snapshot!(fixture.call_log(), @r"
    cursor_set_xcursor default 24
    cursor_move 2 10 5
    pointer_clear_focus
    pointer_frame
    cursor_move 2 2.5 0
    pointer_clear_focus
    ");
    assert_eq!(fixture.platform_ref().cursor_position(), (12.5, 5.0));
}

#[test]
fn test_theme_applied_before_first_frame() {
    let (mut fixture, _pointer) = fixture_with_pointer();
    fixture.clear_calls();

    fixture.pointer_frame();
    fixture.pointer_frame();

    assert_snapshot!(fixture.call_log(), @r"
    cursor_set_xcursor default 24
    pointer_frame
    pointer_frame
    ");
}

#[test]
fn test_theme_follows_config() {
    let config = kestrel_core::Config {
        cursor_theme: "Adwaita".to_string(),
        cursor_size: 32,
        ..kestrel_core::Config::default()
    };
    let mut fixture = Fixture::with_config(config).expect("Failed to create fixture");
    fixture.add_output("Virtual-1", 1920, 1080);
    let pointer = fixture.add_pointer("ptr");

    fixture.pointer_motion(pointer, 1.0, 1.0);
    fixture.pointer_motion(pointer, 1.0, 1.0);

    assert_eq!(xcursor_loads(&fixture), 1);
    assert_eq!(
        fixture.platform_ref().cursor_image(),
        Some(&CursorImage::Theme {
            name: "Adwaita".to_string(),
            size: 32,
        })
    );
}

#[test]
fn test_absolute_motion_warps_across_layout() {
    let (mut fixture, pointer) = fixture_with_pointer();
    fixture.clear_calls();

    fixture.platform().pointer_motion_absolute(pointer, 0.5, 0.25);
    fixture.dispatch();

    assert_snapshot!(fixture.call_log(), @r"
    cursor_set_xcursor default 24
    cursor_warp 2 0.5 0.25
    pointer_clear_focus
    ");
    assert_eq!(fixture.platform_ref().cursor_position(), (960.0, 270.0));
}

#[test]
fn test_buttons_and_axis_reach_no_client() {
    let (mut fixture, pointer) = fixture_with_pointer();
    fixture.clear_calls();

    fixture.platform().pointer_button(pointer, 0x110, ButtonState::Pressed);
    fixture.platform().pointer_axis(pointer, 15.0);
    fixture.dispatch();

    assert_eq!(fixture.call_log(), "");
    assert_eq!(xcursor_loads(&fixture), 0);
}

#[test]
fn test_cursor_request_from_focused_client() {
    let (mut fixture, _pointer) = fixture_with_pointer();
    let client = fixture.add_client();
    let surface = fixture.add_cursor_surface(client).unwrap();
    fixture.platform().set_pointer_focus(Some(client));
    fixture.clear_calls();

    fixture.platform().request_set_cursor(client, Some(surface), (4, 6));
    fixture.dispatch();

    assert_snapshot!(fixture.call_log(), @"cursor_set_surface 1 (4, 6)");
    assert_eq!(
        fixture.platform_ref().cursor_image(),
        Some(&CursorImage::Surface {
            surface,
            hotspot: (4, 6),
        })
    );
}

#[test]
fn test_cursor_request_can_hide_cursor() {
    let (mut fixture, _pointer) = fixture_with_pointer();
    let client = fixture.add_client();
    fixture.platform().set_pointer_focus(Some(client));

    fixture.platform().request_set_cursor(client, None, (0, 0));
    fixture.dispatch();

    assert_eq!(fixture.platform_ref().cursor_image(), Some(&CursorImage::Hidden));
}

#[test]
fn test_cursor_request_without_pointer_focus_is_ignored() {
    let (mut fixture, _pointer) = fixture_with_pointer();
    let focused = fixture.add_client();
    let other = fixture.add_client();
    let surface = fixture.add_cursor_surface(other).unwrap();
    fixture.platform().set_pointer_focus(Some(focused));
    fixture.clear_calls();

    fixture.platform().request_set_cursor(other, Some(surface), (0, 0));
    fixture.dispatch();

    assert_eq!(fixture.call_log(), "");
    assert_eq!(fixture.platform_ref().cursor_image(), None);
}

#[test]
fn test_motion_clears_pointer_focus() {
    let (mut fixture, pointer) = fixture_with_pointer();
    let client = fixture.add_client();
    let surface = fixture.add_cursor_surface(client).unwrap();
    fixture.platform().set_pointer_focus(Some(client));

    fixture.pointer_motion(pointer, 1.0, 0.0);
    fixture.platform().request_set_cursor(client, Some(surface), (0, 0));
    fixture.dispatch();

    assert_eq!(
        fixture.platform_ref().cursor_image(),
        Some(&CursorImage::Theme {
            name: "default".to_string(),
            size: 24,
        })
    );
}

#[test]
fn test_selection_requests_are_honored() {
    let (mut fixture, _pointer) = fixture_with_pointer();
    fixture.clear_calls();

    fixture.platform().request_set_selection(Some(DataSourceId(7)));
    fixture.platform().request_set_selection(None);
    fixture.dispatch();

    assert_snapshot!(fixture.call_log(), @r"
    set_selection 7
    set_selection none
    ");
    assert_eq!(fixture.platform_ref().selection(), None);
}

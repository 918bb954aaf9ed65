//! Output lifecycle tests
//!
//! Bring-up, frame pacing, state requests and removal of outputs.

use insta::assert_snapshot;
use kestrel_core::event::{OutputConfiguration, OutputId, OutputMode};
use kestrel_core::platform::{Signal, Source};
use kestrel_core::testing::Fixture;
use proptest::prelude::*;

#[test]
fn test_new_output_is_enabled_with_preferred_mode() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture.clear_calls();

    let output = fixture.add_output("Virtual-1", 1920, 1080);

    assert_snapshot!(fixture.call_log(), @r"
    output_init_render 1
    output_commit 1 enabled=true mode=1920x1080@60000
    layout_add 1
    scene_output_create 1
    ");

    let virtual_output = fixture.platform_ref().output(output).unwrap();
    assert!(virtual_output.enabled);
    assert_eq!(virtual_output.position, Some((0, 0)));
    assert!(virtual_output.has_scene_output);
}

#[test]
fn test_output_without_mode_is_still_enabled() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    fixture.clear_calls();

    let output = fixture.add_output_without_mode("Virtual-1");

    assert_snapshot!(fixture.call_log(), @r"
    output_init_render 1
    output_commit 1 enabled=true
    layout_add 1
    scene_output_create 1
    ");
    assert_eq!(fixture.platform_ref().output(output).unwrap().mode, None);
    assert_eq!(fixture.output_count(), 1);
}

#[test]
fn test_rejected_commit_keeps_output() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    let output = fixture.platform().connect_output("Virtual-1", None);
    fixture.platform().output_mut(output).unwrap().reject_commits = true;

    fixture.dispatch();

    assert_eq!(fixture.output_count(), 1);
    assert!(!fixture.platform_ref().output(output).unwrap().enabled);
    assert!(fixture.platform_ref().output(output).unwrap().has_scene_output);
}

#[test]
fn test_frame_commits_scene_and_sends_frame_done() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    let output = fixture.add_output("Virtual-1", 1920, 1080);
    fixture.clear_calls();

    fixture.frame(output);
    fixture.frame(output);

    assert_snapshot!(fixture.call_log(), @r"
    scene_output_commit 1
    frame_done 1
    scene_output_commit 1
    frame_done 1
    ");
    assert_eq!(fixture.frames_done(output), 2);
}

#[test]
fn test_request_state_is_committed() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    let output = fixture.add_output("Virtual-1", 1920, 1080);
    fixture.clear_calls();

    let configuration = OutputConfiguration {
        mode: Some(OutputMode {
            width: 1280,
            height: 720,
            refresh: 60_000,
        }),
        ..OutputConfiguration::default()
    };
    fixture.platform().request_output_state(output, configuration);
    fixture.dispatch();

    assert_snapshot!(fixture.call_log(), @"output_commit 1 mode=1280x720@60000");
    let mode = fixture.platform_ref().output(output).unwrap().mode.unwrap();
    assert_eq!((mode.width, mode.height), (1280, 720));
}

#[test]
fn test_outputs_are_laid_out_left_to_right() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");

    let first = fixture.add_output("Virtual-1", 1920, 1080);
    let second = fixture.add_output("Virtual-2", 2560, 1440);

    let session = fixture.session_ref();
    assert_eq!(session.outputs.get(first).unwrap().position, (0, 0));
    assert_eq!(session.outputs.get(second).unwrap().position, (1920, 0));
}

#[test]
fn test_removing_last_output_terminates() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    let output = fixture.add_output("Virtual-1", 1920, 1080);
    fixture.clear_calls();

    fixture.remove_output(output);

    assert_snapshot!(fixture.call_log(), @r"
    layout_remove 1
    scene_output_destroy 1
    ");
    assert!(!fixture.is_running());
    assert_eq!(fixture.output_count(), 0);
}

#[test]
fn test_removed_output_stops_receiving_frames() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    let first = fixture.add_output("Virtual-1", 1920, 1080);
    let second = fixture.add_output("Virtual-2", 1920, 1080);

    fixture.remove_output(first);
    assert!(fixture.is_running());
    assert_eq!(fixture.session_ref().listeners.count_for(Source::Output(first)), 0);

    let dropped = fixture.session_ref().listeners.dropped();
    fixture.clear_calls();
    fixture.frame(first);
    fixture.frame(second);

    assert_snapshot!(fixture.call_log(), @r"
    scene_output_commit 2
    frame_done 2
    ");
    assert_eq!(fixture.session_ref().listeners.dropped(), dropped + 1);
    assert_eq!(fixture.frames_done(first), 0);
}

#[test]
fn test_duplicate_output_announcement_is_ignored() {
    let mut fixture = Fixture::new().expect("Failed to create fixture");
    let output = fixture.add_output("Virtual-1", 1920, 1080);
    let subscriptions = fixture.session_ref().listeners.len();

    fixture
        .platform()
        .push_event(kestrel_core::PlatformEvent::NewOutput {
            output,
            name: "Virtual-1".to_string(),
        });
    fixture.dispatch();

    assert_eq!(fixture.output_count(), 1);
    assert_eq!(fixture.session_ref().listeners.len(), subscriptions);
}

#[derive(Debug, Clone)]
enum OutputOp {
    Add,
    Remove(usize),
}

fn output_op() -> impl Strategy<Value = OutputOp> {
    prop_oneof![
        Just(OutputOp::Add),
        (0usize..8).prop_map(OutputOp::Remove),
    ]
}

proptest! {
    #[test]
    fn test_output_registry_tracks_hotplug(ops in proptest::collection::vec(output_op(), 1..24)) {
        let mut fixture = Fixture::new().unwrap();
        let mut connected: Vec<OutputId> = Vec::new();
        let mut running = true;

        for (index, op) in ops.into_iter().enumerate() {
            if !running {
                break;
            }
            match op {
                OutputOp::Add => {
                    let name = format!("Virtual-{index}");
                    connected.push(fixture.add_output(&name, 1280, 720));
                }
                OutputOp::Remove(_) if connected.is_empty() => {}
                OutputOp::Remove(slot) => {
                    let output = connected.remove(slot % connected.len());
                    fixture.remove_output(output);
                    running = !connected.is_empty();
                }
            }

            prop_assert_eq!(fixture.output_count(), connected.len());
            prop_assert_eq!(fixture.is_running(), running);
            for output in &connected {
                let listeners = &fixture.session_ref().listeners;
                prop_assert!(fixture.session_ref().outputs.contains(*output));
                prop_assert!(listeners.is_subscribed(Source::Output(*output), Signal::Frame));
                prop_assert_eq!(listeners.count_for(Source::Output(*output)), 3);
            }
        }
    }
}

//! Process-level helpers

use std::process::Child;
use std::time::Duration;

use tracing::info;

/// Current time on the monotonic clock.
///
/// This is the clock Wayland frame callbacks and input timestamps are
/// expressed in.
pub fn get_monotonic_time() -> Duration {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // CLOCK_MONOTONIC cannot fail with a valid timespec pointer
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
}

/// Spawn a client connected to our display.
pub fn spawn_client(program: &str, args: &[String], wayland_display: &str) -> std::io::Result<Child> {
    info!("Spawning: {} {:?}", program, args);
    info!("  WAYLAND_DISPLAY={}", wayland_display);

    std::process::Command::new(program)
        .args(args)
        .env("WAYLAND_DISPLAY", wayland_display)
        .spawn()
}

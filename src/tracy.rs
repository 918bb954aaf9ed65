//! Tracy profiling macros
//!
//! Everything here compiles to nothing unless the `profile-with-tracy`
//! feature is enabled.
//!
//! ```ignore
//! fn on_output_frame() {
//!     tracy_span!("on_output_frame");
//!     tracy_frame_mark!();
//! }
//! ```

/// Create a Tracy span for the current scope.
#[macro_export]
#[cfg(feature = "profile-with-tracy")]
macro_rules! tracy_span {
    ($name:expr) => {
        let _span = tracy_client::span!($name);
    };
}

#[macro_export]
#[cfg(not(feature = "profile-with-tracy"))]
macro_rules! tracy_span {
    ($name:expr) => {};
}

/// Mark a frame boundary for Tracy's frame view.
#[macro_export]
#[cfg(feature = "profile-with-tracy")]
macro_rules! tracy_frame_mark {
    () => {
        tracy_client::Client::running().map(|c| c.frame_mark());
    };
}

#[macro_export]
#[cfg(not(feature = "profile-with-tracy"))]
macro_rules! tracy_frame_mark {
    () => {};
}

/// Plot a value over time (registry sizes, queue depth).
#[macro_export]
#[cfg(feature = "profile-with-tracy")]
macro_rules! tracy_plot {
    ($name:expr, $value:expr) => {{
        static PLOT: std::sync::OnceLock<tracy_client::PlotName> = std::sync::OnceLock::new();
        let name = PLOT.get_or_init(|| tracy_client::plot_name!($name));
        tracy_client::Client::running().map(|c| c.plot(*name, $value as f64));
    }};
}

#[macro_export]
#[cfg(not(feature = "profile-with-tracy"))]
macro_rules! tracy_plot {
    ($name:expr, $value:expr) => {};
}

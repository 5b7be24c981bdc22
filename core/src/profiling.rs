//! Optional Tracy instrumentation.
//!
//! Enabled with the `profiling` feature. Without it every macro expands to
//! nothing, so call sites stay in release builds at no cost.
//!
//! ```ignore
//! use umbra_core::{profile_function, profile_scope};
//!
//! fn cull_surfaces() {
//!     profile_function!();
//!     {
//!         profile_scope!("record_cull_passes");
//!     }
//! }
//! ```

#[cfg(feature = "profiling")]
pub use tracy_client::{self, frame_mark as tracy_frame_mark, plot as tracy_plot, span};

/// Mark the end of a rendered frame.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! frame_mark {
    () => {
        $crate::profiling::tracy_frame_mark()
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! frame_mark {
    () => {};
}

/// Open a named span that lasts until the end of the enclosing scope.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Open a span named after the enclosing function.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _profile_span = $crate::profiling::span!();
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

/// Plot a per-frame counter, e.g. the number of materials drawn.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        $crate::profiling::tracy_plot!($name, $value as f64)
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        let _ = $value;
    };
}

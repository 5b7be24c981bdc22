//! # Umbra Core
//!
//! Math and profiling utilities shared by the Umbra renderer crates.

pub mod math;
pub mod profiling;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version once at startup.
pub fn init() {
    log::info!("Umbra Core v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}

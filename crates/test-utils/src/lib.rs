//! # Test Utilities for Credence
//!
//! In-memory provider trait implementations and a stub format service that
//! can be used for testing and examples.
//!
//! This crate provides common utilities for the Credence project and is not
//! intended to be used directly.

pub mod format;
pub mod provider;

use std::sync::Once;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

pub use format::TestFormatService;
pub use provider::Provider;

// initalise tracing once for all tests
static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// # Panics
///
/// Panics if the tracing subscriber cannot be set.
pub fn init_tracer() {
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::ERROR).finish();
        tracing::subscriber::set_global_default(subscriber).expect("subscriber set");
    });
}

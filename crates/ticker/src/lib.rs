//! Rate ticker application
//!
//! Wires configuration, the sampling plan and the scheduler together, and
//! renders round outcomes.

pub mod app;
pub mod reporter;

pub use app::App;
pub use reporter::LogReporter;

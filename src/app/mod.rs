mod commands;
mod orchestrator;
mod runtime;
mod shutdown;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::{Studio, StudioBackends};
pub use types::{ShutdownReason, StudioSettings, StudioSnapshot};

//! Client application: session driver and render hook

pub mod driver;
pub mod render;

pub use driver::{SessionDriver, SessionSummary};
pub use render::{Renderer, TracingRenderer};

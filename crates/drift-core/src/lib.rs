pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod queue;
pub mod registry;
pub mod reports;
pub mod session;

pub use config::EngineConfig;
pub use engine::Engine;

pub mod service;
pub(crate) mod ws;

pub use service::{EngineConfig, EventService, TopicResources};

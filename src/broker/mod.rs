pub mod dispatch;
pub mod engine;
pub mod message;
pub mod registry;

pub use engine::Broker;
pub use message::{Headers, Message};
pub use registry::SubscriptionRegistry;

pub mod bridge;
pub mod poller;

pub use bridge::EventBridge;
pub use poller::{FallbackPoller, PollOutcome};

pub mod cache;
pub mod dispatcher;
pub mod event_bus;
pub mod hooks;
pub mod notifier;

pub use cache::*;
pub use dispatcher::*;
pub use event_bus::*;
pub use hooks::*;
pub use notifier::*;

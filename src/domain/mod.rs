//! Domain layer: events and the broadcast bus that feeds subscriptions.

pub mod event;
pub mod event_bus;

pub use event::Event;
pub use event_bus::EventBus;

pub mod characteristic;
pub mod peripheral_event;
pub mod properties;
pub mod service;

pub use characteristic::Characteristic;
pub use peripheral_event::{PeripheralEvent, RadioState};
pub use service::Service;

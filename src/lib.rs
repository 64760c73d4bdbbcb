//! Host a switchable set of BLE GATT services on a single peripheral.
//!
//! Each catalog slot pairs a service UUID with one read-only
//! characteristic. A [`ServiceHost`] starts and stops slots at runtime,
//! keeps the advertised UUID set equal to whatever is running, and
//! reconciles radio power transitions and OS-driven session restoration
//! without user involvement. Backends implement [`PeripheralAdapter`]
//! and report everything asynchronous over one event channel.

pub mod catalog;
pub mod error;
pub mod gatt;
pub mod guard;
pub mod host;
pub mod peripheral;
pub mod sink;

pub use catalog::{ServiceCatalog, ServiceSlot};
pub use error::Error;
pub use gatt::{PeripheralEvent, RadioState};
pub use guard::BackgroundTask;
pub use host::{HostConfig, ServiceHost, DEFAULT_RESTORE_TOKEN};
pub use peripheral::PeripheralAdapter;
pub use sink::{NotificationSink, NullSink};

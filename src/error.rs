use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the host and its peripheral backends.
///
/// None of these are fatal. Intent validation errors are returned to the
/// caller; everything arriving on the event path is logged and absorbed,
/// leaving the previous running set intact.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The radio is not in the powered-on state; all user intents are
    /// rejected until it is.
    #[error("radio is not powered on")]
    NotPoweredOn,

    /// The slot index does not exist in the catalog.
    #[error("service index {0} is out of range")]
    IndexOutOfRange(usize),

    /// The slot already has a running service or an add in flight.
    #[error("service {0} is already running")]
    AlreadyRunning(usize),

    /// The slot has no running service to stop.
    #[error("service {0} is not running")]
    NotRunning(usize),

    /// The platform stack refused to register the service.
    #[error("backend rejected service {service}: {reason}")]
    AdapterRejected { service: Uuid, reason: String },

    /// A restored service identifier is not present in the catalog.
    #[error("restored service {0} is not in the catalog")]
    UnknownRestoredService(Uuid),

    /// The backend call itself failed before the platform stack could
    /// answer (transport error, closed channel, dbus failure).
    #[error("peripheral backend error: {0}")]
    Backend(String),

    /// Bluetooth permission was denied by the platform.
    #[error("bluetooth permission denied")]
    PermissionDenied,

    /// The host actor has shut down and no longer accepts commands.
    #[error("service host is stopped")]
    HostStopped,
}

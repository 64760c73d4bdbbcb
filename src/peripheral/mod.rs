#[cfg(all(target_os = "linux", feature = "bluez"))]
pub mod bluez;
pub mod loopback;

use crate::gatt::Service;
use crate::Error;
use async_trait::async_trait;
use uuid::Uuid;

/// Backend contract over the platform peripheral-manager API.
///
/// Implementations are handed a `tokio::sync::mpsc::Sender` for
/// [`PeripheralEvent`](crate::gatt::PeripheralEvent)s at construction
/// and report everything asynchronous through it: power transitions,
/// add-service outcomes, restored sessions and incoming reads. The
/// methods here are the request side only.
///
/// `add_service` is an asynchronous round trip: the call returning `Ok`
/// means the request was handed to the platform stack, and acceptance
/// or rejection arrives later as `DidAddService`. `remove_service` has
/// no confirmation event at all; the platform guarantees that no
/// further reads are routed to the removed service once the call
/// returns.
#[async_trait]
pub trait PeripheralAdapter: Send + Sync {
    async fn is_powered(&self) -> Result<bool, Error>;

    async fn is_advertising(&self) -> Result<bool, Error>;

    /// Advertise exactly `uuids`. The platform advertising set is not
    /// additive; each call replaces the previous one. Idempotent.
    async fn start_advertising(&self, name: &str, uuids: &[Uuid]) -> Result<(), Error>;

    async fn stop_advertising(&self) -> Result<(), Error>;

    /// Request registration of a service. Outcome arrives as a
    /// `DidAddService` event.
    async fn add_service(&self, service: &Service) -> Result<(), Error>;

    /// Unregister the service with this UUID. Fire and forget.
    async fn remove_service(&self, service_uuid: Uuid) -> Result<(), Error>;

    /// Drop every registration this process left in the platform stack,
    /// including stale ones from a previous session.
    async fn remove_all_services(&self) -> Result<(), Error>;
}

//! BlueZ peripheral backend (Linux, feature `bluez`).
//!
//! BlueZ registers GATT applications as a unit, so topology changes are
//! realized by dropping the registration handle and re-serving the
//! remaining services. Adds are confirmed through `DidAddService` after
//! the re-registration round trip, which preserves the asynchronous
//! contract of [`PeripheralAdapter`]. BlueZ performs no OS-driven state
//! restoration, so this backend never emits `WillRestoreServices`.

use crate::gatt::{self, PeripheralEvent, RadioState};
use crate::peripheral::PeripheralAdapter;
use crate::Error;
use async_trait::async_trait;
use bluer::adv::{Advertisement, AdvertisementHandle};
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicRead, CharacteristicReadRequest,
    ReqError, Service,
};
use bluer::{Adapter, AdapterEvent, AdapterProperty};
use futures::{FutureExt, StreamExt};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use uuid::Uuid;

/// How long a read handler waits for the response bytes before failing
/// the ATT request.
const READ_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

fn backend_err(err: bluer::Error) -> Error {
    Error::Backend(err.to_string())
}

#[derive(Default)]
struct Registrations {
    services: Vec<gatt::Service>,
    application: Option<ApplicationHandle>,
    advertisement: Option<AdvertisementHandle>,
}

pub struct BluezPeripheral {
    adapter: Adapter,
    events: mpsc::Sender<PeripheralEvent>,
    shared: Mutex<Registrations>,
}

impl BluezPeripheral {
    pub async fn new(events: mpsc::Sender<PeripheralEvent>) -> Result<Self, Error> {
        let session = bluer::Session::new().await.map_err(backend_err)?;
        let adapter = session.default_adapter().await.map_err(backend_err)?;
        info!("using bluetooth adapter {}", adapter.name());

        watch_power_state(&adapter, events.clone()).await?;

        Ok(BluezPeripheral {
            adapter,
            events,
            shared: Mutex::new(Registrations::default()),
        })
    }

    /// Re-register the current service set, replacing any previous
    /// registration.
    async fn republish(&self, registrations: &mut Registrations) -> Result<(), Error> {
        registrations.application = None;
        if registrations.services.is_empty() {
            return Ok(());
        }
        let services = registrations
            .services
            .iter()
            .map(|service| build_service(service, self.events.clone()))
            .collect();
        let application = Application {
            services,
            ..Default::default()
        };
        let handle = self
            .adapter
            .serve_gatt_application(application)
            .await
            .map_err(backend_err)?;
        registrations.application = Some(handle);
        Ok(())
    }
}

#[async_trait]
impl PeripheralAdapter for BluezPeripheral {
    async fn is_powered(&self) -> Result<bool, Error> {
        self.adapter.is_powered().await.map_err(backend_err)
    }

    async fn is_advertising(&self) -> Result<bool, Error> {
        let instances = self
            .adapter
            .active_advertising_instances()
            .await
            .map_err(backend_err)?;
        Ok(instances > 0)
    }

    async fn start_advertising(&self, name: &str, uuids: &[Uuid]) -> Result<(), Error> {
        let advertisement = Advertisement {
            service_uuids: uuids.iter().copied().collect::<BTreeSet<Uuid>>(),
            discoverable: Some(true),
            local_name: Some(name.to_string()),
            ..Default::default()
        };
        let mut shared = self.shared.lock().await;
        shared.advertisement = None;
        let result = self.adapter.advertise(advertisement).await;
        let error = match result {
            Ok(handle) => {
                shared.advertisement = Some(handle);
                None
            }
            Err(err) => Some(err.to_string()),
        };
        drop(shared);
        if let Err(err) = self
            .events
            .send(PeripheralEvent::DidStartAdvertising { error })
            .await
        {
            warn!("dropping advertising event, receiver is gone: {}", err);
        }
        Ok(())
    }

    async fn stop_advertising(&self) -> Result<(), Error> {
        self.shared.lock().await.advertisement = None;
        Ok(())
    }

    async fn add_service(&self, service: &gatt::Service) -> Result<(), Error> {
        let mut shared = self.shared.lock().await;
        shared.services.push(service.clone());
        let error = match self.republish(&mut shared).await {
            Ok(()) => None,
            Err(err) => {
                shared.services.retain(|s| s.uuid != service.uuid);
                Some(err.to_string())
            }
        };
        drop(shared);
        if let Err(err) = self
            .events
            .send(PeripheralEvent::DidAddService {
                service: service.uuid,
                error,
            })
            .await
        {
            warn!("dropping add-service event, receiver is gone: {}", err);
        }
        Ok(())
    }

    async fn remove_service(&self, service_uuid: Uuid) -> Result<(), Error> {
        let mut shared = self.shared.lock().await;
        shared.services.retain(|s| s.uuid != service_uuid);
        self.republish(&mut shared).await
    }

    async fn remove_all_services(&self) -> Result<(), Error> {
        let mut shared = self.shared.lock().await;
        shared.services.clear();
        shared.application = None;
        Ok(())
    }
}

/// Forward the adapter's initial power state and every later change as
/// `DidUpdateState` events. BlueZ only reports powered on or off.
async fn watch_power_state(
    adapter: &Adapter,
    events: mpsc::Sender<PeripheralEvent>,
) -> Result<(), Error> {
    let powered = adapter.is_powered().await.map_err(backend_err)?;
    let mut stream = adapter.events().await.map_err(backend_err)?;
    tokio::spawn(async move {
        let state = if powered {
            RadioState::PoweredOn
        } else {
            RadioState::PoweredOff
        };
        if events
            .send(PeripheralEvent::DidUpdateState { state })
            .await
            .is_err()
        {
            return;
        }
        while let Some(event) = stream.next().await {
            if let AdapterEvent::PropertyChanged(AdapterProperty::Powered(powered)) = event {
                let state = if powered {
                    RadioState::PoweredOn
                } else {
                    RadioState::PoweredOff
                };
                if events
                    .send(PeripheralEvent::DidUpdateState { state })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
        debug!("adapter event stream ended");
    });
    Ok(())
}

fn build_service(service: &gatt::Service, events: mpsc::Sender<PeripheralEvent>) -> Service {
    let characteristics = service
        .characteristics
        .iter()
        .map(|characteristic| {
            build_characteristic(characteristic.uuid, service.uuid, events.clone())
        })
        .collect();
    Service {
        uuid: service.uuid,
        primary: service.primary,
        characteristics,
        ..Default::default()
    }
}

fn build_characteristic(
    characteristic_uuid: Uuid,
    service_uuid: Uuid,
    events: mpsc::Sender<PeripheralEvent>,
) -> Characteristic {
    Characteristic {
        uuid: characteristic_uuid,
        read: Some(CharacteristicRead {
            read: true,
            fun: Box::new(move |request: CharacteristicReadRequest| {
                let events = events.clone();
                async move {
                    on_read_request(events, request, service_uuid, characteristic_uuid).await
                }
                .boxed()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Bridge a BlueZ read callback onto the event channel and wait for the
/// host to answer through the oneshot responder.
async fn on_read_request(
    events: mpsc::Sender<PeripheralEvent>,
    request: CharacteristicReadRequest,
    service_uuid: Uuid,
    characteristic_uuid: Uuid,
) -> Result<Vec<u8>, ReqError> {
    let (responder, response) = oneshot::channel();
    events
        .send(PeripheralEvent::DidReceiveReadRequest {
            client: request.device_address.to_string(),
            service: service_uuid,
            characteristic: characteristic_uuid,
            responder,
        })
        .await
        .map_err(|_| ReqError::Failed)?;
    match tokio::time::timeout(READ_RESPONSE_TIMEOUT, response).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(ReqError::Failed),
        Err(_) => {
            warn!("read of {} timed out waiting for a response", characteristic_uuid);
            Err(ReqError::Failed)
        }
    }
}

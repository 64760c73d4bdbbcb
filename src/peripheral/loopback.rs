//! In-process peripheral backend.
//!
//! Simulates the platform Bluetooth stack well enough to drive the host
//! end to end: asynchronous add confirmations, a replace-only
//! advertising set, GATT state dropped on power loss, session
//! restoration matched by restore token, and reads answered through the
//! event channel. Used by the test suite and the demo; also usable as a
//! stand-in backend on machines without a radio.

use crate::gatt::{PeripheralEvent, RadioState, Service};
use crate::peripheral::PeripheralAdapter;
use crate::Error;
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use uuid::Uuid;

#[derive(Debug)]
struct LoopbackState {
    state: RadioState,
    services: Vec<Service>,
    advertised: Vec<Uuid>,
    advertising: bool,
    local_name: Option<String>,
    reject_next_add: bool,
    defer_add_results: bool,
    deferred: Vec<PeripheralEvent>,
}

/// Simulated platform peripheral stack. Cloning yields another handle
/// to the same stack, so a test can drive the radio while the host owns
/// the adapter.
#[derive(Debug, Clone)]
pub struct LoopbackPeripheral {
    events: mpsc::Sender<PeripheralEvent>,
    restore_token: String,
    shared: Arc<Mutex<LoopbackState>>,
}

impl LoopbackPeripheral {
    pub fn new(events: mpsc::Sender<PeripheralEvent>, restore_token: impl Into<String>) -> Self {
        LoopbackPeripheral {
            events,
            restore_token: restore_token.into(),
            shared: Arc::new(Mutex::new(LoopbackState {
                state: RadioState::Unknown,
                services: Vec::new(),
                advertised: Vec::new(),
                advertising: false,
                local_name: None,
                reject_next_add: false,
                defer_add_results: false,
                deferred: Vec::new(),
            })),
        }
    }

    async fn send(&self, event: PeripheralEvent) {
        if let Err(err) = self.events.send(event).await {
            warn!("dropping peripheral event, receiver is gone: {}", err);
        }
    }

    /// Drive the simulated radio into `state`, dropping GATT and
    /// advertising state on power loss the way the platform does.
    pub async fn set_state(&self, state: RadioState) {
        {
            let mut shared = self.shared.lock().await;
            if shared.state == state {
                return;
            }
            shared.state = state;
            if state == RadioState::PoweredOff {
                shared.services.clear();
                shared.advertised.clear();
                shared.advertising = false;
            }
        }
        self.send(PeripheralEvent::DidUpdateState { state }).await;
    }

    pub async fn power_on(&self) {
        self.set_state(RadioState::PoweredOn).await;
    }

    pub async fn power_off(&self) {
        self.set_state(RadioState::PoweredOff).await;
    }

    /// Make the next `add_service` fail the way a platform rejection
    /// does: accepted call, error in the confirmation event.
    pub async fn reject_next_add(&self) {
        self.shared.lock().await.reject_next_add = true;
    }

    /// Hold back add confirmations until `flush_add_results` is
    /// called, simulating a platform stack that is slow to answer.
    pub async fn defer_add_results(&self, defer: bool) {
        self.shared.lock().await.defer_add_results = defer;
    }

    /// Deliver every held-back add confirmation, in order.
    pub async fn flush_add_results(&self) {
        let deferred = std::mem::take(&mut self.shared.lock().await.deferred);
        for event in deferred {
            self.send(event).await;
        }
    }

    /// Hand a previous session's registrations back to the process, as
    /// the OS does when it relaunches a peripheral app. Ignored unless
    /// `token` matches the one this stack was created with.
    pub async fn restore_session(&self, token: &str, services: Vec<Service>) {
        if token != self.restore_token {
            warn!("ignoring restore for unknown token '{}'", token);
            return;
        }
        self.shared.lock().await.services = services.clone();
        self.send(PeripheralEvent::WillRestoreServices { services })
            .await;
    }

    /// Read a characteristic as a connected central would. Returns the
    /// response bytes, or `None` if nothing answers (unknown
    /// characteristic, radio off, or the responder was dropped).
    pub async fn read(&self, characteristic_uuid: Uuid) -> Option<Vec<u8>> {
        let service_uuid = {
            let shared = self.shared.lock().await;
            if shared.state != RadioState::PoweredOn {
                return None;
            }
            shared
                .services
                .iter()
                .find(|service| {
                    service
                        .characteristics
                        .iter()
                        .any(|c| c.uuid == characteristic_uuid)
                })
                .map(|service| service.uuid)?
        };
        let (responder, response) = oneshot::channel();
        self.send(PeripheralEvent::DidReceiveReadRequest {
            client: "loopback-central".to_string(),
            service: service_uuid,
            characteristic: characteristic_uuid,
            responder,
        })
        .await;
        response.await.ok()
    }

    /// UUIDs currently in the advertisement packet.
    pub async fn advertised_services(&self) -> Vec<Uuid> {
        self.shared.lock().await.advertised.clone()
    }

    /// Local name most recently placed in the advertisement packet.
    pub async fn advertised_name(&self) -> Option<String> {
        self.shared.lock().await.local_name.clone()
    }

    /// UUIDs of every service registered in the simulated stack.
    pub async fn registered_services(&self) -> Vec<Uuid> {
        self.shared
            .lock()
            .await
            .services
            .iter()
            .map(|service| service.uuid)
            .collect()
    }
}

#[async_trait]
impl PeripheralAdapter for LoopbackPeripheral {
    async fn is_powered(&self) -> Result<bool, Error> {
        Ok(self.shared.lock().await.state == RadioState::PoweredOn)
    }

    async fn is_advertising(&self) -> Result<bool, Error> {
        Ok(self.shared.lock().await.advertising)
    }

    async fn start_advertising(&self, name: &str, uuids: &[Uuid]) -> Result<(), Error> {
        let error = {
            let mut shared = self.shared.lock().await;
            if shared.state == RadioState::PoweredOn {
                shared.advertising = true;
                shared.advertised = uuids.to_vec();
                shared.local_name = Some(name.to_string());
                None
            } else {
                Some("radio is not powered on".to_string())
            }
        };
        self.send(PeripheralEvent::DidStartAdvertising { error })
            .await;
        Ok(())
    }

    async fn stop_advertising(&self) -> Result<(), Error> {
        let mut shared = self.shared.lock().await;
        shared.advertising = false;
        shared.advertised.clear();
        Ok(())
    }

    async fn add_service(&self, service: &Service) -> Result<(), Error> {
        let mut shared = self.shared.lock().await;
        let error = if shared.state != RadioState::PoweredOn {
            Some("radio is not powered on".to_string())
        } else if shared.reject_next_add {
            shared.reject_next_add = false;
            Some("rejected by simulated platform stack".to_string())
        } else if shared.services.iter().any(|s| s.uuid == service.uuid) {
            Some("service is already registered".to_string())
        } else {
            shared.services.push(service.clone());
            None
        };
        let event = PeripheralEvent::DidAddService {
            service: service.uuid,
            error,
        };
        if shared.defer_add_results {
            shared.deferred.push(event);
            return Ok(());
        }
        drop(shared);
        self.send(event).await;
        Ok(())
    }

    async fn remove_service(&self, service_uuid: Uuid) -> Result<(), Error> {
        let mut shared = self.shared.lock().await;
        // No confirmation event for removal; once the lock is released
        // no further reads resolve against this service.
        shared.services.retain(|service| service.uuid != service_uuid);
        Ok(())
    }

    async fn remove_all_services(&self) -> Result<(), Error> {
        let mut shared = self.shared.lock().await;
        if !shared.services.is_empty() {
            debug!(
                "clearing {} stale service registration(s)",
                shared.services.len()
            );
        }
        shared.services.clear();
        Ok(())
    }
}

use super::{Command, HostConfig};
use crate::catalog::ServiceCatalog;
use crate::error::Error;
use crate::gatt::{PeripheralEvent, RadioState, Service};
use crate::guard::BackgroundTask;
use crate::peripheral::PeripheralAdapter;
use crate::sink::NotificationSink;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// A slot with a live registration in the platform stack. The service
/// definition doubles as the removal handle; the platform's parallel
/// object never outlives this record.
struct RunningService {
    slot: usize,
    service: Service,
}

/// The state machine. Owns the running set exclusively; only
/// [`run`](HostActor::run) ever touches it, from one task.
pub(crate) struct HostActor {
    adapter: Box<dyn PeripheralAdapter>,
    catalog: ServiceCatalog,
    sink: Arc<dyn NotificationSink>,
    config: HostConfig,
    radio_state: RadioState,
    running: Vec<RunningService>,
    /// Slots with an add in flight, keyed to the submitted service so
    /// the confirmation can promote the exact object that was
    /// registered. Keeps a second start for the same slot out while the
    /// first is still unanswered.
    pending: BTreeMap<usize, Service>,
}

impl HostActor {
    pub(crate) fn new(
        adapter: Box<dyn PeripheralAdapter>,
        catalog: ServiceCatalog,
        sink: Arc<dyn NotificationSink>,
        config: HostConfig,
    ) -> Self {
        HostActor {
            adapter,
            catalog,
            sink,
            config,
            radio_state: RadioState::Unknown,
            running: Vec::new(),
            pending: BTreeMap::new(),
        }
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::Receiver<PeripheralEvent>,
    ) {
        loop {
            // Backend events first, so a command issued after an event
            // always observes its effect.
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        warn!("peripheral event channel closed, stopping host");
                        break;
                    }
                },
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartService { index, reply } => {
                let _ = reply.send(self.start_service(index).await);
            }
            Command::StopService { index, reply } => {
                let _ = reply.send(self.stop_service(index).await);
            }
            Command::RunningServices { reply } => {
                let _ = reply.send(self.running_indices());
            }
            Command::Shutdown => {}
        }
    }

    async fn handle_event(&mut self, event: PeripheralEvent) {
        match event {
            PeripheralEvent::DidUpdateState { state } => self.on_state_updated(state).await,
            PeripheralEvent::DidStartAdvertising { error } => match error {
                None => debug!("advertising started"),
                Some(reason) => warn!("advertising failed to start: {}", reason),
            },
            PeripheralEvent::DidAddService { service, error } => {
                self.on_service_added(service, error).await
            }
            PeripheralEvent::WillRestoreServices { services } => self.on_restore(services),
            PeripheralEvent::DidReceiveReadRequest {
                client,
                characteristic,
                responder,
                ..
            } => self.on_read(client, characteristic, responder),
        }
    }

    async fn start_service(&mut self, index: usize) -> Result<(), Error> {
        info!("start service {}", index);
        if !self.radio_state.is_powered_on() {
            warn!("rejecting start of service {}: radio is {}", index, self.radio_state);
            return Err(Error::NotPoweredOn);
        }
        let service = self.catalog.gatt_service(index).ok_or_else(|| {
            warn!("rejecting start: index {} is out of range", index);
            Error::IndexOutOfRange(index)
        })?;
        if self.pending.contains_key(&index) || self.is_running(index) {
            warn!("rejecting start: service {} is already running", index);
            return Err(Error::AlreadyRunning(index));
        }
        self.pending.insert(index, service.clone());
        if let Err(err) = self.adapter.add_service(&service).await {
            self.pending.remove(&index);
            warn!("add of service {} failed: {}", index, err);
            return Err(err);
        }
        Ok(())
    }

    async fn stop_service(&mut self, index: usize) -> Result<(), Error> {
        info!("stop service {}", index);
        if !self.radio_state.is_powered_on() {
            warn!("rejecting stop of service {}: radio is {}", index, self.radio_state);
            return Err(Error::NotPoweredOn);
        }
        if index >= self.catalog.slot_count() {
            warn!("rejecting stop: index {} is out of range", index);
            return Err(Error::IndexOutOfRange(index));
        }
        let position = self
            .running
            .iter()
            .position(|record| record.slot == index)
            .ok_or_else(|| {
                warn!("rejecting stop: service {} is not running", index);
                Error::NotRunning(index)
            })?;
        // Removal is never confirmed by the platform, so the local
        // record goes optimistically.
        let record = self.running.remove(position);
        if let Err(err) = self.adapter.remove_service(record.service.uuid).await {
            warn!("remove of service {} failed: {}", index, err);
        }
        self.notify();
        self.refresh_advertising().await;
        Ok(())
    }

    async fn on_service_added(&mut self, service_uuid: Uuid, error: Option<String>) {
        let Some(index) = self.catalog.index_of_service(service_uuid) else {
            warn!("add result for service {} not in the catalog", service_uuid);
            return;
        };
        let submitted = self.pending.remove(&index);
        if let Some(reason) = error {
            warn!(
                "{}",
                Error::AdapterRejected {
                    service: service_uuid,
                    reason,
                }
            );
            return;
        }
        if self.is_running(index) {
            debug!("service {} is already running", index);
            return;
        }
        let Some(service) = submitted.or_else(|| self.catalog.gatt_service(index)) else {
            return;
        };
        self.running.push(RunningService { slot: index, service });
        self.notify();
        // The platform advertising set is replace-only; fold the new
        // service in by restarting over the full running set.
        self.refresh_advertising().await;
    }

    async fn on_state_updated(&mut self, state: RadioState) {
        info!("radio state changed to {}", state);
        self.radio_state = state;
        match state {
            RadioState::PoweredOn => {
                if self.running.is_empty() {
                    // A previous session may have left registrations
                    // behind in the platform stack.
                    if let Err(err) = self.adapter.remove_all_services().await {
                        warn!("cleanup of stale services failed: {}", err);
                    }
                } else {
                    match self.adapter.is_advertising().await {
                        Ok(true) => {}
                        Ok(false) => {
                            let uuids = self.running_uuids();
                            if let Err(err) = self
                                .adapter
                                .start_advertising(&self.config.local_name, &uuids)
                                .await
                            {
                                warn!("start advertising failed: {}", err);
                            }
                        }
                        Err(err) => warn!("advertising query failed: {}", err),
                    }
                }
            }
            RadioState::PoweredOff => {
                if let Err(err) = self.adapter.stop_advertising().await {
                    warn!("stop advertising failed: {}", err);
                }
                // The platform has dropped all GATT state; stale
                // records must not survive to the next power cycle.
                self.pending.clear();
                if !self.running.is_empty() {
                    self.running.clear();
                    self.notify();
                }
            }
            _ => {}
        }
    }

    fn on_restore(&mut self, services: Vec<Service>) {
        info!("restoring {} service(s) from a previous session", services.len());
        self.pending.clear();
        let mut restored: Vec<RunningService> = Vec::new();
        for service in services {
            match self.catalog.index_of_service(service.uuid) {
                Some(slot) if restored.iter().any(|record| record.slot == slot) => {
                    warn!("dropping duplicate restored service {}", slot);
                }
                Some(slot) => restored.push(RunningService { slot, service }),
                None => warn!("{}", Error::UnknownRestoredService(service.uuid)),
            }
        }
        // The restored list replaces the running set outright.
        self.running = restored;
        self.notify();
    }

    fn on_read(&self, client: String, characteristic: Uuid, responder: oneshot::Sender<Vec<u8>>) {
        let Some(index) = self.catalog.index_of_characteristic(characteristic) else {
            warn!("read of characteristic {} not in the catalog", characteristic);
            return;
        };
        debug!("read request from {} for service {}", client, index);
        let task = BackgroundTask::begin(
            format!("read of service {}", index),
            self.config.read_grace,
        );
        let payload = format!("Hello from service {}!", index).into_bytes();
        if responder.send(payload).is_err() {
            warn!("read responder for service {} was dropped", index);
        }
        task.end();
    }

    /// Stop advertising and, if any service is still running, start
    /// again over the full set. The two-step restart is the only way to
    /// change the advertised UUID set on the platform.
    async fn refresh_advertising(&self) {
        if let Err(err) = self.adapter.stop_advertising().await {
            warn!("stop advertising failed: {}", err);
        }
        let uuids = self.running_uuids();
        if uuids.is_empty() {
            return;
        }
        if let Err(err) = self
            .adapter
            .start_advertising(&self.config.local_name, &uuids)
            .await
        {
            warn!("start advertising failed: {}", err);
        }
    }

    fn notify(&self) {
        let indices = self.running_indices();
        info!("services changed to {:?}", indices);
        self.sink.services_changed(&indices);
    }

    fn is_running(&self, index: usize) -> bool {
        self.running.iter().any(|record| record.slot == index)
    }

    fn running_indices(&self) -> Vec<usize> {
        self.running.iter().map(|record| record.slot).collect()
    }

    fn running_uuids(&self) -> Vec<Uuid> {
        self.running
            .iter()
            .map(|record| record.service.uuid)
            .collect()
    }
}

//! Scenario tests driving the public host API against the loopback
//! backend. The host drains backend events before commands, so every
//! query issued after an intent observes the settled topology.

use ble_service_host::catalog::ServiceCatalog;
use ble_service_host::gatt::{PeripheralEvent, Service};
use ble_service_host::host::{HostConfig, ServiceHost};
use ble_service_host::peripheral::loopback::LoopbackPeripheral;
use ble_service_host::peripheral::PeripheralAdapter;
use ble_service_host::sink::{NotificationSink, NullSink};
use ble_service_host::Error;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

const EVENT_BUFFER: usize = 16;

#[derive(Default)]
struct RecordingSink {
    changes: Mutex<Vec<Vec<usize>>>,
}

impl RecordingSink {
    fn changes(&self) -> Vec<Vec<usize>> {
        self.changes.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn services_changed(&self, indices: &[usize]) {
        self.changes.lock().unwrap().push(indices.to_vec());
    }
}

struct Fixture {
    host: ServiceHost,
    radio: LoopbackPeripheral,
    sink: Arc<RecordingSink>,
    catalog: ServiceCatalog,
    restore_token: String,
}

fn fixture() -> Fixture {
    let catalog = ServiceCatalog::default();
    let config = HostConfig::default();
    let restore_token = config.restore_token.clone();
    let (sender_tx, receiver_rx) = mpsc::channel::<PeripheralEvent>(EVENT_BUFFER);
    let radio = LoopbackPeripheral::new(sender_tx, restore_token.clone());
    let sink = Arc::new(RecordingSink::default());
    let host = ServiceHost::spawn(
        Box::new(radio.clone()),
        receiver_rx,
        catalog.clone(),
        sink.clone(),
        config,
    );
    Fixture {
        host,
        radio,
        sink,
        catalog,
        restore_token,
    }
}

fn service_uuid(catalog: &ServiceCatalog, index: usize) -> Uuid {
    catalog.slot(index).unwrap().service_uuid
}

#[tokio::test]
async fn second_start_of_a_running_service_is_rejected() {
    let f = fixture();
    f.radio.power_on().await;

    f.host.start_service(0).await.unwrap();
    assert_eq!(f.host.running_services().await.unwrap(), vec![0]);

    let err = f.host.start_service(0).await.unwrap_err();
    assert_eq!(err, Error::AlreadyRunning(0));
    assert_eq!(f.host.running_services().await.unwrap(), vec![0]);
}

#[tokio::test]
async fn start_is_rejected_while_the_add_is_still_in_flight() {
    let f = fixture();
    f.radio.power_on().await;
    f.radio.defer_add_results(true).await;

    f.host.start_service(0).await.unwrap();
    // The platform has not confirmed yet, so the slot is not running,
    // but a second add for it must still be refused.
    assert_eq!(f.host.running_services().await.unwrap(), Vec::<usize>::new());
    let err = f.host.start_service(0).await.unwrap_err();
    assert_eq!(err, Error::AlreadyRunning(0));

    f.radio.flush_add_results().await;
    assert_eq!(f.host.running_services().await.unwrap(), vec![0]);
}

#[tokio::test]
async fn stop_of_a_service_that_is_not_running_is_a_no_op() {
    let f = fixture();
    f.radio.power_on().await;
    f.host.start_service(0).await.unwrap();

    let err = f.host.stop_service(1).await.unwrap_err();
    assert_eq!(err, Error::NotRunning(1));
    assert_eq!(f.host.running_services().await.unwrap(), vec![0]);
}

#[tokio::test]
async fn out_of_range_indices_are_rejected_without_touching_the_backend() {
    let f = fixture();
    f.radio.power_on().await;

    let count = f.catalog.slot_count();
    assert_eq!(
        f.host.start_service(count).await.unwrap_err(),
        Error::IndexOutOfRange(count)
    );
    assert_eq!(
        f.host.start_service(usize::MAX).await.unwrap_err(),
        Error::IndexOutOfRange(usize::MAX)
    );
    assert_eq!(
        f.host.stop_service(count).await.unwrap_err(),
        Error::IndexOutOfRange(count)
    );
    assert!(f.radio.registered_services().await.is_empty());
}

#[tokio::test]
async fn intents_are_rejected_unless_the_radio_is_powered_on() {
    let f = fixture();

    // Never powered on: the state is still unknown.
    assert_eq!(f.host.start_service(0).await.unwrap_err(), Error::NotPoweredOn);
    assert_eq!(f.host.stop_service(0).await.unwrap_err(), Error::NotPoweredOn);

    f.radio.power_on().await;
    f.host.start_service(0).await.unwrap();
    f.radio.power_off().await;

    assert_eq!(f.host.start_service(1).await.unwrap_err(), Error::NotPoweredOn);
    assert_eq!(f.host.stop_service(0).await.unwrap_err(), Error::NotPoweredOn);
}

#[tokio::test]
async fn advertised_set_tracks_the_running_set_exactly() {
    let f = fixture();
    f.radio.power_on().await;

    f.host.start_service(0).await.unwrap();
    assert_eq!(f.host.running_services().await.unwrap(), vec![0]);
    assert_eq!(
        f.radio.advertised_services().await,
        vec![service_uuid(&f.catalog, 0)]
    );
    assert_eq!(
        f.radio.advertised_name().await.as_deref(),
        Some("ble-service-host")
    );

    f.host.start_service(1).await.unwrap();
    assert_eq!(f.host.running_services().await.unwrap(), vec![0, 1]);
    assert_eq!(
        f.radio.advertised_services().await,
        vec![service_uuid(&f.catalog, 0), service_uuid(&f.catalog, 1)]
    );

    f.host.stop_service(0).await.unwrap();
    assert_eq!(f.host.running_services().await.unwrap(), vec![1]);
    assert_eq!(
        f.radio.advertised_services().await,
        vec![service_uuid(&f.catalog, 1)]
    );

    f.host.stop_service(1).await.unwrap();
    assert_eq!(f.host.running_services().await.unwrap(), Vec::<usize>::new());
    assert!(f.radio.advertised_services().await.is_empty());
}

#[tokio::test]
async fn rejected_add_leaves_the_slot_stopped() {
    let f = fixture();
    f.radio.power_on().await;
    f.radio.reject_next_add().await;

    // Validation passes; the rejection arrives on the event path.
    f.host.start_service(0).await.unwrap();
    assert_eq!(f.host.running_services().await.unwrap(), Vec::<usize>::new());
    assert!(f.sink.changes().is_empty());

    // The slot went back to stopped, so a retry is accepted.
    f.host.start_service(0).await.unwrap();
    assert_eq!(f.host.running_services().await.unwrap(), vec![0]);
}

#[tokio::test]
async fn restore_replaces_the_running_set_instead_of_merging() {
    let f = fixture();
    f.radio.power_on().await;
    f.host.start_service(0).await.unwrap();
    assert_eq!(f.host.running_services().await.unwrap(), vec![0]);

    let restored = f.catalog.gatt_service(1).unwrap();
    f.radio
        .restore_session(&f.restore_token, vec![restored])
        .await;

    assert_eq!(f.host.running_services().await.unwrap(), vec![1]);
    assert_eq!(f.sink.changes().last().unwrap(), &vec![1]);
}

#[tokio::test]
async fn unknown_restored_services_are_dropped() {
    let f = fixture();

    let stranger = Service::read_only(
        Uuid::from_u128(0xABAD_1DEA_0000_0000_0000_0000_0000_0001),
        Uuid::from_u128(0xABAD_1DEA_0000_0000_0000_0000_0000_0002),
    );
    let known = f.catalog.gatt_service(0).unwrap();
    f.radio
        .restore_session(&f.restore_token, vec![stranger, known])
        .await;
    f.radio.power_on().await;

    // Only the catalog service survives the restore.
    assert_eq!(f.host.running_services().await.unwrap(), vec![0]);
    assert_eq!(f.sink.changes().last().unwrap(), &vec![0]);
}

#[tokio::test]
async fn restore_with_a_foreign_token_is_ignored() {
    let f = fixture();
    f.radio.power_on().await;
    f.host.start_service(0).await.unwrap();

    let restored = f.catalog.gatt_service(1).unwrap();
    f.radio.restore_session("someone-else", vec![restored]).await;

    assert_eq!(f.host.running_services().await.unwrap(), vec![0]);
}

#[tokio::test]
async fn power_loss_clears_the_running_set_and_notifies_once() {
    let f = fixture();
    f.radio.power_on().await;
    f.host.start_service(0).await.unwrap();
    f.host.start_service(1).await.unwrap();

    f.radio.power_off().await;
    assert_eq!(f.host.running_services().await.unwrap(), Vec::<usize>::new());
    assert_eq!(f.sink.changes().last().unwrap(), &Vec::<usize>::new());

    let empties = f
        .sink
        .changes()
        .iter()
        .filter(|change| change.is_empty())
        .count();
    assert_eq!(empties, 1);
}

#[tokio::test]
async fn powering_on_with_an_empty_set_clears_stale_registrations() {
    let f = fixture();

    // A service left behind by a previous session that the catalog no
    // longer knows: the host drops the record and, with nothing
    // running, sweeps the platform stack on power-on.
    let stranger = Service::read_only(
        Uuid::from_u128(0xABAD_1DEA_0000_0000_0000_0000_0000_0003),
        Uuid::from_u128(0xABAD_1DEA_0000_0000_0000_0000_0000_0004),
    );
    f.radio
        .restore_session(&f.restore_token, vec![stranger])
        .await;
    f.radio.power_on().await;

    assert_eq!(f.host.running_services().await.unwrap(), Vec::<usize>::new());
    assert!(f.radio.registered_services().await.is_empty());
}

#[tokio::test]
async fn powering_on_resumes_advertising_for_restored_services() {
    let f = fixture();

    let restored = f.catalog.gatt_service(1).unwrap();
    f.radio
        .restore_session(&f.restore_token, vec![restored])
        .await;
    f.radio.power_on().await;

    assert_eq!(f.host.running_services().await.unwrap(), vec![1]);
    assert_eq!(
        f.radio.advertised_services().await,
        vec![service_uuid(&f.catalog, 1)]
    );
}

#[tokio::test]
async fn reads_are_answered_with_the_slot_greeting() {
    let f = fixture();
    f.radio.power_on().await;
    f.host.start_service(0).await.unwrap();
    f.host.start_service(1).await.unwrap();
    let changes_before = f.sink.changes().len();

    let characteristic = f.catalog.slot(1).unwrap().characteristic_uuid;
    let payload = f.radio.read(characteristic).await.unwrap();
    assert_eq!(payload, b"Hello from service 1!".to_vec());

    // A read is not a topology change.
    assert_eq!(f.sink.changes().len(), changes_before);
}

#[tokio::test]
async fn reads_of_unknown_characteristics_are_not_answered() {
    let f = fixture();
    f.radio.power_on().await;

    // A foreign service restored into the platform stack: its
    // characteristic resolves to no catalog slot, so the host drops
    // the responder.
    let foreign_characteristic = Uuid::from_u128(0xABAD_1DEA_0000_0000_0000_0000_0000_0006);
    let stranger = Service::read_only(
        Uuid::from_u128(0xABAD_1DEA_0000_0000_0000_0000_0000_0005),
        foreign_characteristic,
    );
    f.radio
        .restore_session(&f.restore_token, vec![stranger])
        .await;

    assert_eq!(f.radio.read(foreign_characteristic).await, None);
}

/// Backend stub that holds no event sender, so the test controls when
/// the event stream ends.
struct InertAdapter;

#[async_trait::async_trait]
impl PeripheralAdapter for InertAdapter {
    async fn is_powered(&self) -> Result<bool, Error> {
        Ok(false)
    }

    async fn is_advertising(&self) -> Result<bool, Error> {
        Ok(false)
    }

    async fn start_advertising(&self, _name: &str, _uuids: &[Uuid]) -> Result<(), Error> {
        Ok(())
    }

    async fn stop_advertising(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn add_service(&self, _service: &Service) -> Result<(), Error> {
        Ok(())
    }

    async fn remove_service(&self, _service_uuid: Uuid) -> Result<(), Error> {
        Ok(())
    }

    async fn remove_all_services(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[tokio::test]
async fn commands_fail_cleanly_once_the_host_is_gone() {
    let (events_tx, events_rx) = mpsc::channel::<PeripheralEvent>(EVENT_BUFFER);
    let host = ServiceHost::spawn(
        Box::new(InertAdapter),
        events_rx,
        ServiceCatalog::default(),
        Arc::new(NullSink),
        HostConfig::default(),
    );

    // Ending the event stream stops the actor.
    drop(events_tx);

    assert_eq!(host.start_service(0).await.unwrap_err(), Error::HostStopped);
}

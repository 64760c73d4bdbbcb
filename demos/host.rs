//! Walk the service host through its lifecycle against the loopback
//! backend: power on, toggle both services, read them back, lose
//! power, and come back from a restored session.

use ble_service_host::catalog::ServiceCatalog;
use ble_service_host::gatt::PeripheralEvent;
use ble_service_host::host::{HostConfig, ServiceHost};
use ble_service_host::peripheral::loopback::LoopbackPeripheral;
use std::sync::Arc;
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 16;

#[tokio::main]
async fn main() {
    if let Err(err) = pretty_env_logger::try_init() {
        eprintln!("WARNING: failed to initialize logging framework: {}", err);
    }

    let catalog = ServiceCatalog::default();
    let config = HostConfig::default();

    let (sender_tx, receiver_rx) = mpsc::channel::<PeripheralEvent>(EVENT_BUFFER);
    let radio = LoopbackPeripheral::new(sender_tx, config.restore_token.clone());

    let sink = Arc::new(|indices: &[usize]| {
        println!("=> running services: {:?}", indices);
    });

    let host = ServiceHost::spawn(
        Box::new(radio.clone()),
        receiver_rx,
        catalog.clone(),
        sink,
        config.clone(),
    );

    radio.power_on().await;

    host.start_service(0).await.unwrap();
    host.start_service(1).await.unwrap();
    println!("advertising {:?}", radio.advertised_services().await);

    let first = catalog.slot(0).unwrap().characteristic_uuid;
    let second = catalog.slot(1).unwrap().characteristic_uuid;
    let (first, second) = futures::join!(radio.read(first), radio.read(second));
    println!("read service 0: {}", String::from_utf8(first.unwrap()).unwrap());
    println!("read service 1: {}", String::from_utf8(second.unwrap()).unwrap());

    host.stop_service(0).await.unwrap();
    println!("advertising {:?}", radio.advertised_services().await);

    // Power loss drops all platform GATT state and empties the set.
    radio.power_off().await;
    println!("after power loss: {:?}", host.running_services().await.unwrap());

    // Relaunch with service 1 still registered in the platform stack.
    let restored = catalog.gatt_service(1).unwrap();
    radio
        .restore_session(&config.restore_token, vec![restored])
        .await;
    radio.power_on().await;
    println!("after restore: {:?}", host.running_services().await.unwrap());
    println!("advertising {:?}", radio.advertised_services().await);

    host.shutdown().await;
}

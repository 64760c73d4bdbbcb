//! Lifecycle host for the peripheral's service slots.
//!
//! One spawned actor task owns the running set and consumes user
//! commands and backend events from a single serialized loop, so no
//! mutation of the set is ever concurrent with another. The public
//! [`ServiceHost`] handle marshals intents onto that loop and resolves
//! with the synchronous validation outcome; the effect of an accepted
//! intent is observable only through the notification sink and the log.

mod actor;

use crate::catalog::ServiceCatalog;
use crate::error::Error;
use crate::gatt::PeripheralEvent;
use crate::peripheral::PeripheralAdapter;
use crate::sink::NotificationSink;
use actor::HostActor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Token under which backends register for OS state restoration. Must
/// stay stable across releases or the platform cannot match a relaunch
/// to the prior registration session.
pub const DEFAULT_RESTORE_TOKEN: &str = "ble-service-host.restore-token";

const COMMAND_BUFFER: usize = 16;

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Local name placed in the advertisement packet.
    pub local_name: String,
    /// Restore token handed to backends that support OS state
    /// restoration.
    pub restore_token: String,
    /// Soft deadline for the background execution window held open
    /// around a read response.
    pub read_grace: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            local_name: "ble-service-host".to_string(),
            restore_token: DEFAULT_RESTORE_TOKEN.to_string(),
            read_grace: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
pub(crate) enum Command {
    StartService {
        index: usize,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    StopService {
        index: usize,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    RunningServices {
        reply: oneshot::Sender<Vec<usize>>,
    },
    Shutdown,
}

/// Handle to a running service host.
pub struct ServiceHost {
    commands: mpsc::Sender<Command>,
    actor: JoinHandle<()>,
}

impl ServiceHost {
    /// Spawn the host actor over an adapter and the receiving end of
    /// its event channel.
    pub fn spawn(
        adapter: Box<dyn PeripheralAdapter>,
        events: mpsc::Receiver<PeripheralEvent>,
        catalog: ServiceCatalog,
        sink: Arc<dyn NotificationSink>,
        config: HostConfig,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let actor = HostActor::new(adapter, catalog, sink, config);
        let actor = tokio::spawn(actor.run(command_rx, events));
        ServiceHost { commands, actor }
    }

    /// Ask for the slot at `index` to go live. `Ok` means the request
    /// passed validation and was handed to the backend; the service is
    /// running once the sink reports it.
    pub async fn start_service(&self, index: usize) -> Result<(), Error> {
        let (reply, response) = oneshot::channel();
        self.send(Command::StartService { index, reply }).await?;
        response.await.map_err(|_| Error::HostStopped)?
    }

    /// Take the slot at `index` down. Removal is optimistic; by the
    /// time `Ok` is returned the record is gone and advertising has
    /// been re-derived.
    pub async fn stop_service(&self, index: usize) -> Result<(), Error> {
        let (reply, response) = oneshot::channel();
        self.send(Command::StopService { index, reply }).await?;
        response.await.map_err(|_| Error::HostStopped)?
    }

    /// Snapshot of the running slot indices, in start order.
    pub async fn running_services(&self) -> Result<Vec<usize>, Error> {
        let (reply, response) = oneshot::channel();
        self.send(Command::RunningServices { reply }).await?;
        response.await.map_err(|_| Error::HostStopped)
    }

    /// Stop the actor and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        let _ = self.actor.await;
    }

    async fn send(&self, command: Command) -> Result<(), Error> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::HostStopped)
    }
}

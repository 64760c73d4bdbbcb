use super::service::Service;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Power state of the underlying radio as reported by the platform.
///
/// The host only acts on `PoweredOn` and `PoweredOff`; the remaining
/// states gate user intents but trigger no transition of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl RadioState {
    pub fn is_powered_on(self) -> bool {
        self == RadioState::PoweredOn
    }
}

impl std::fmt::Display for RadioState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RadioState::Unknown => "unknown",
            RadioState::Resetting => "resetting",
            RadioState::Unsupported => "unsupported",
            RadioState::Unauthorized => "unauthorized",
            RadioState::PoweredOff => "poweredOff",
            RadioState::PoweredOn => "poweredOn",
        };
        f.write_str(name)
    }
}

/// Events emitted by a peripheral backend on its single event channel.
///
/// Everything the platform reports asynchronously arrives here, in
/// order. The host consumes the stream from one task, so handlers never
/// observe interleaved state.
#[derive(Debug)]
pub enum PeripheralEvent {
    DidUpdateState {
        state: RadioState,
    },
    /// Outcome of the advertising request. Informational only; the host
    /// derives advertising state from its own topology, not from this.
    DidStartAdvertising {
        error: Option<String>,
    },
    /// Asynchronous outcome of an `add_service` call.
    DidAddService {
        service: Uuid,
        error: Option<String>,
    },
    /// The OS relaunched the process with these services still
    /// registered in the platform stack. No user intent precedes this.
    WillRestoreServices {
        services: Vec<Service>,
    },
    /// A central is reading a characteristic. The response bytes must be
    /// sent through `responder`; dropping it answers nothing.
    DidReceiveReadRequest {
        client: String,
        service: Uuid,
        characteristic: Uuid,
        responder: oneshot::Sender<Vec<u8>>,
    },
}

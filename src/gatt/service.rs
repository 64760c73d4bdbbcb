use super::characteristic::Characteristic;
use uuid::Uuid;

/// A GATT service definition as registered with the peripheral backend.
///
/// The service UUID doubles as the handle for removal and advertising;
/// the backend keeps a parallel platform object keyed by it.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub uuid: Uuid,
    pub primary: bool,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn new(uuid: Uuid, primary: bool, characteristics: Vec<Characteristic>) -> Self {
        Service {
            uuid,
            primary,
            characteristics,
        }
    }

    /// Primary service exposing a single read-only characteristic whose
    /// value is produced per request rather than stored statically.
    pub fn read_only(uuid: Uuid, characteristic_uuid: Uuid) -> Self {
        Service::new(uuid, true, vec![Characteristic::read_only(characteristic_uuid)])
    }
}

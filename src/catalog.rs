use crate::gatt::Service;
use uuid::Uuid;

/// One logical service position: a fixed index paired with the UUIDs of
/// the service and its single characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSlot {
    pub index: usize,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
}

/// Static registry of the services this peripheral can expose.
///
/// Fixed at construction. Indices are contiguous from 0 and identify a
/// slot for the whole process lifetime; whether a slot currently has a
/// live service is the host's business, not the catalog's.
#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    slots: Vec<ServiceSlot>,
}

// Built-in slot 0.
const SERVICE_0_UUID: Uuid = Uuid::from_u128(0xA85E0941_9312_43E0_9DF1_AA553F8D1DCC);
const CHARACTERISTIC_0_UUID: Uuid = Uuid::from_u128(0x1C2218C7_C773_4DAC_B52B_DA6061614A56);

// Built-in slot 1.
const SERVICE_1_UUID: Uuid = Uuid::from_u128(0xF1DB91CA_E679_4B74_BB44_64F547E586B5);
const CHARACTERISTIC_1_UUID: Uuid = Uuid::from_u128(0xE96B5F2A_01C5_40B3_8A03_85529693C3DD);

impl ServiceCatalog {
    /// Catalog from (service UUID, characteristic UUID) pairs, indexed
    /// in iteration order.
    pub fn new(pairs: impl IntoIterator<Item = (Uuid, Uuid)>) -> Self {
        let slots = pairs
            .into_iter()
            .enumerate()
            .map(|(index, (service_uuid, characteristic_uuid))| ServiceSlot {
                index,
                service_uuid,
                characteristic_uuid,
            })
            .collect();
        ServiceCatalog { slots }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<&ServiceSlot> {
        self.slots.get(index)
    }

    pub fn index_of_service(&self, service_uuid: Uuid) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.service_uuid == service_uuid)
    }

    pub fn index_of_characteristic(&self, characteristic_uuid: Uuid) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.characteristic_uuid == characteristic_uuid)
    }

    /// Build the GATT service for a slot: primary, one read-only
    /// characteristic, value produced per request.
    pub fn gatt_service(&self, index: usize) -> Option<Service> {
        self.slot(index)
            .map(|slot| Service::read_only(slot.service_uuid, slot.characteristic_uuid))
    }
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        ServiceCatalog::new([
            (SERVICE_0_UUID, CHARACTERISTIC_0_UUID),
            (SERVICE_1_UUID, CHARACTERISTIC_1_UUID),
        ])
    }
}

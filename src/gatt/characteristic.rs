use super::properties::{AttributePermission, CharacteristicProperty};
use uuid::Uuid;

/// A characteristic within a [`Service`](super::service::Service).
///
/// `value` of `None` means the value is supplied per read request by the
/// owning application instead of being a static attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub properties: Vec<CharacteristicProperty>,
    pub permissions: Vec<AttributePermission>,
    pub value: Option<Vec<u8>>,
}

impl Characteristic {
    pub fn new(
        uuid: Uuid,
        properties: Vec<CharacteristicProperty>,
        permissions: Vec<AttributePermission>,
        value: Option<Vec<u8>>,
    ) -> Self {
        Characteristic {
            uuid,
            properties,
            permissions,
            value,
        }
    }

    /// Readable characteristic with no static value.
    pub fn read_only(uuid: Uuid) -> Self {
        Characteristic::new(
            uuid,
            vec![CharacteristicProperty::Read],
            vec![AttributePermission::Readable],
            None,
        )
    }
}

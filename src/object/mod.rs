//! BACnet object types and identifiers.
//!
//! Objects are the fundamental modeling concept in BACnet: every physical
//! input, output, or software value a device exposes is addressed as an
//! object identifier (a type plus an instance number) and read or written
//! through its properties. This client never models a device's full object
//! database — it only needs enough of the type system to name an object in
//! a `ReadProperty`/`WriteProperty` request and recognize one in a reply.

use std::fmt;

/// Result type for object operations.
pub type Result<T> = std::result::Result<T, ObjectError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ObjectError {
    #[error("invalid object type: {0}")]
    InvalidValue(String),
}

/// BACnet object types (ASHRAE 135 clause 12.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ObjectType {
    AnalogInput = 0,
    AnalogOutput = 1,
    AnalogValue = 2,
    BinaryInput = 3,
    BinaryOutput = 4,
    BinaryValue = 5,
    Calendar = 6,
    Command = 7,
    Device = 8,
    EventEnrollment = 9,
    File = 10,
    Group = 11,
    Loop = 12,
    MultiStateInput = 13,
    MultiStateOutput = 14,
    MultiStateValue = 19,
    NotificationClass = 15,
    Program = 16,
    Schedule = 17,
    Averaging = 18,
    TrendLog = 20,
    LifeSafetyPoint = 21,
    LifeSafetyZone = 22,
    Accumulator = 23,
    PulseConverter = 24,
    EventLog = 25,
    GlobalGroup = 26,
    TrendLogMultiple = 27,
    LoadControl = 28,
    StructuredView = 29,
    AccessDoor = 30,
}

impl TryFrom<u16> for ObjectType {
    type Error = ObjectError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(ObjectType::AnalogInput),
            1 => Ok(ObjectType::AnalogOutput),
            2 => Ok(ObjectType::AnalogValue),
            3 => Ok(ObjectType::BinaryInput),
            4 => Ok(ObjectType::BinaryOutput),
            5 => Ok(ObjectType::BinaryValue),
            6 => Ok(ObjectType::Calendar),
            7 => Ok(ObjectType::Command),
            8 => Ok(ObjectType::Device),
            9 => Ok(ObjectType::EventEnrollment),
            10 => Ok(ObjectType::File),
            11 => Ok(ObjectType::Group),
            12 => Ok(ObjectType::Loop),
            13 => Ok(ObjectType::MultiStateInput),
            14 => Ok(ObjectType::MultiStateOutput),
            15 => Ok(ObjectType::NotificationClass),
            16 => Ok(ObjectType::Program),
            17 => Ok(ObjectType::Schedule),
            18 => Ok(ObjectType::Averaging),
            19 => Ok(ObjectType::MultiStateValue),
            20 => Ok(ObjectType::TrendLog),
            21 => Ok(ObjectType::LifeSafetyPoint),
            22 => Ok(ObjectType::LifeSafetyZone),
            23 => Ok(ObjectType::Accumulator),
            24 => Ok(ObjectType::PulseConverter),
            25 => Ok(ObjectType::EventLog),
            26 => Ok(ObjectType::GlobalGroup),
            27 => Ok(ObjectType::TrendLogMultiple),
            28 => Ok(ObjectType::LoadControl),
            29 => Ok(ObjectType::StructuredView),
            30 => Ok(ObjectType::AccessDoor),
            _ => Err(ObjectError::InvalidValue(format!("unknown object type {}", value))),
        }
    }
}

/// BACnet standard property identifiers this client names by value rather
/// than raw integer — the full property table runs past 200 entries; only
/// the ones `ReadProperty`/`WriteProperty` callers actually reach for here
/// are spelled out, the rest are passed as a bare `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PropertyIdentifier {
    ObjectIdentifier = 75,
    ObjectName = 77,
    ObjectType = 79,
    PresentValue = 85,
    Description = 28,
    StatusFlags = 111,
    EventState = 36,
    OutOfService = 81,
    Units = 117,
    Priority = 86,
    PriorityArray = 87,
    VendorIdentifier = 120,
    VendorName = 121,
    ModelName = 70,
    FirmwareRevision = 44,
    ApplicationSoftwareVersion = 12,
    ProtocolVersion = 98,
    ProtocolRevision = 139,
    MaxApduLengthAccepted = 62,
    SegmentationSupported = 107,
    DatabaseRevision = 155,
    SystemStatus = 112,
    ObjectList = 76,
}

/// An object identifier: type plus instance number. Packs into a single u32
/// on the wire as `(type << 22) | instance` (see
/// [`crate::encoding::pack_object_id`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectIdentifier {
    pub object_type: ObjectType,
    pub instance: u32,
}

impl ObjectIdentifier {
    pub fn new(object_type: ObjectType, instance: u32) -> Self {
        Self { object_type, instance }
    }

    /// Instance numbers are 22 bits wide (0-4194302; 4194303 is reserved
    /// for "unspecified instance" in some services).
    pub fn is_valid(&self) -> bool {
        self.instance <= 0x3FFFFF
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.object_type, self.instance)
    }
}

/// Segmentation support, as reported by a device's I-Am and Device object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Segmentation {
    Both = 0,
    Transmit = 1,
    Receive = 2,
    NoSegmentation = 3,
}

impl TryFrom<u32> for Segmentation {
    type Error = ObjectError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Segmentation::Both),
            1 => Ok(Segmentation::Transmit),
            2 => Ok(Segmentation::Receive),
            3 => Ok(Segmentation::NoSegmentation),
            _ => Err(ObjectError::InvalidValue(format!("unknown segmentation value {}", value))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_type_roundtrips_through_try_from() {
        assert_eq!(ObjectType::try_from(8u16).unwrap(), ObjectType::Device);
        assert!(ObjectType::try_from(999u16).is_err());
    }

    #[test]
    fn instance_validity() {
        let valid = ObjectIdentifier::new(ObjectType::AnalogInput, 0x3FFFFF);
        assert!(valid.is_valid());
        let invalid = ObjectIdentifier::new(ObjectType::AnalogInput, 0x400000);
        assert!(!invalid.is_valid());
    }

    #[test]
    fn segmentation_roundtrips() {
        assert_eq!(Segmentation::try_from(3).unwrap(), Segmentation::NoSegmentation);
        assert!(Segmentation::try_from(4).is_err());
    }
}

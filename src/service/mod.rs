//! BACnet application-layer services this client issues and recognizes.
//!
//! A "service" is the payload carried inside a confirmed or unconfirmed
//! APDU: Who-Is/I-Am for device discovery, Read-Property/Write-Property for
//! reading and writing a single property. The full confirmed/unconfirmed
//! service-choice tables are kept in full even though only a handful of
//! variants are ever constructed here, so that a service choice seen on the
//! wire (a COV notification from some other client's subscription, say)
//! decodes to something nameable instead of failing outright.

use crate::encoding::{
    decode_context_enumerated, decode_context_object_id, decode_context_unsigned, decode_enumerated,
    decode_object_identifier, decode_tag, decode_unsigned, encode_context_enumerated, encode_context_object_id,
    encode_context_unsigned, encode_enumerated, encode_object_identifier, encode_unsigned, EncodingError,
    Result as EncodingResult, TagClass, TagKind,
};
use crate::object::{ObjectIdentifier, ObjectType};

/// Result type for service-level decode errors that aren't purely encoding
/// problems (an out-of-table service choice, a caller-supplied argument
/// that can't be expressed on the wire).
pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid service parameters: {0}")]
    InvalidParameters(String),
    #[error("unsupported service choice: {0}")]
    UnsupportedServiceChoice(u8),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// Confirmed service choices (ASHRAE 135 clause 21, confirmed services).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConfirmedServiceChoice {
    AcknowledgeAlarm = 0,
    ConfirmedEventNotification = 2,
    GetAlarmSummary = 3,
    GetEnrollmentSummary = 4,
    GetEventInformation = 29,
    AtomicReadFile = 6,
    AtomicWriteFile = 7,
    AddListElement = 8,
    RemoveListElement = 9,
    CreateObject = 10,
    DeleteObject = 11,
    ReadProperty = 12,
    ReadPropertyMultiple = 14,
    WriteProperty = 15,
    WritePropertyMultiple = 16,
    DeviceCommunicationControl = 17,
    ReinitializeDevice = 20,
    VtOpen = 21,
    VtClose = 22,
    VtData = 23,
    Authenticate = 24,
    RequestKey = 25,
    ReadRange = 26,
    SubscribeCOV = 5,
    SubscribeCOVProperty = 28,
    AuthRequest = 34,
}

impl TryFrom<u8> for ConfirmedServiceChoice {
    type Error = ServiceError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::AcknowledgeAlarm),
            2 => Ok(Self::ConfirmedEventNotification),
            3 => Ok(Self::GetAlarmSummary),
            4 => Ok(Self::GetEnrollmentSummary),
            29 => Ok(Self::GetEventInformation),
            6 => Ok(Self::AtomicReadFile),
            7 => Ok(Self::AtomicWriteFile),
            8 => Ok(Self::AddListElement),
            9 => Ok(Self::RemoveListElement),
            10 => Ok(Self::CreateObject),
            11 => Ok(Self::DeleteObject),
            12 => Ok(Self::ReadProperty),
            14 => Ok(Self::ReadPropertyMultiple),
            15 => Ok(Self::WriteProperty),
            16 => Ok(Self::WritePropertyMultiple),
            17 => Ok(Self::DeviceCommunicationControl),
            20 => Ok(Self::ReinitializeDevice),
            21 => Ok(Self::VtOpen),
            22 => Ok(Self::VtClose),
            23 => Ok(Self::VtData),
            24 => Ok(Self::Authenticate),
            25 => Ok(Self::RequestKey),
            26 => Ok(Self::ReadRange),
            5 => Ok(Self::SubscribeCOV),
            28 => Ok(Self::SubscribeCOVProperty),
            34 => Ok(Self::AuthRequest),
            other => Err(ServiceError::UnsupportedServiceChoice(other)),
        }
    }
}

/// Unconfirmed service choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UnconfirmedServiceChoice {
    IAm = 0,
    IHave = 1,
    UnconfirmedCOVNotification = 2,
    UnconfirmedEventNotification = 3,
    UnconfirmedPrivateTransfer = 4,
    UnconfirmedTextMessage = 5,
    TimeSynchronization = 6,
    WhoHas = 7,
    WhoIs = 8,
    UtcTimeSynchronization = 9,
    WriteGroup = 10,
    UnconfirmedCOVNotificationMultiple = 11,
    UnconfirmedAuditNotification = 12,
    WhoAmI = 13,
    YouAre = 14,
}

impl TryFrom<u8> for UnconfirmedServiceChoice {
    type Error = ServiceError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::IAm),
            1 => Ok(Self::IHave),
            2 => Ok(Self::UnconfirmedCOVNotification),
            3 => Ok(Self::UnconfirmedEventNotification),
            4 => Ok(Self::UnconfirmedPrivateTransfer),
            5 => Ok(Self::UnconfirmedTextMessage),
            6 => Ok(Self::TimeSynchronization),
            7 => Ok(Self::WhoHas),
            8 => Ok(Self::WhoIs),
            9 => Ok(Self::UtcTimeSynchronization),
            10 => Ok(Self::WriteGroup),
            11 => Ok(Self::UnconfirmedCOVNotificationMultiple),
            12 => Ok(Self::UnconfirmedAuditNotification),
            13 => Ok(Self::WhoAmI),
            14 => Ok(Self::YouAre),
            other => Err(ServiceError::UnsupportedServiceChoice(other)),
        }
    }
}

/// Reject reason codes (ASHRAE 135 clause 21, Reject-PDU).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Other,
    BufferOverflow,
    InconsistentParameters,
    InvalidParameterDataType,
    InvalidTag,
    MissingRequiredParameter,
    ParameterOutOfRange,
    TooManyArguments,
    UndefinedEnumeration,
    UnrecognizedService,
    Unknown(u8),
}

impl From<u8> for RejectReason {
    fn from(value: u8) -> Self {
        match value {
            0 => RejectReason::Other,
            1 => RejectReason::BufferOverflow,
            2 => RejectReason::InconsistentParameters,
            3 => RejectReason::InvalidParameterDataType,
            4 => RejectReason::InvalidTag,
            5 => RejectReason::MissingRequiredParameter,
            6 => RejectReason::ParameterOutOfRange,
            7 => RejectReason::TooManyArguments,
            8 => RejectReason::UndefinedEnumeration,
            9 => RejectReason::UnrecognizedService,
            other => RejectReason::Unknown(other),
        }
    }
}

/// Abort reason codes (ASHRAE 135 clause 21, Abort-PDU).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Other,
    BufferOverflow,
    InvalidApduInThisState,
    PreemptedByHigherPriorityTask,
    SegmentationNotSupported,
    Unknown(u8),
}

impl From<u8> for AbortReason {
    fn from(value: u8) -> Self {
        match value {
            0 => AbortReason::Other,
            1 => AbortReason::BufferOverflow,
            2 => AbortReason::InvalidApduInThisState,
            3 => AbortReason::PreemptedByHigherPriorityTask,
            4 => AbortReason::SegmentationNotSupported,
            other => AbortReason::Unknown(other),
        }
    }
}

/// The error-class/error-code pair carried by an Error-PDU.
///
/// BACnet encodes both as application-tagged Enumerated values, but some
/// stacks wrap the pair in a context-0 opening/closing tag pair instead of
/// sending them bare; `decode` accepts either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacnetError {
    pub error_class: u32,
    pub error_code: u32,
}

impl BacnetError {
    pub fn decode(data: &[u8]) -> EncodingResult<Self> {
        let (tag, header) = decode_tag(data)?;
        if tag.class == TagClass::Context && tag.number == 0 && tag.kind == TagKind::Opening {
            let mut pos = header;
            let (error_class, consumed) = decode_error_value(&data[pos..])?;
            pos += consumed;
            let (error_code, consumed) = decode_error_value(&data[pos..])?;
            pos += consumed;
            let (closing, _) = decode_tag(&data[pos..])?;
            if closing.class != TagClass::Context || closing.number != 0 || closing.kind != TagKind::Closing {
                return Err(EncodingError::InvalidTag);
            }
            Ok(Self { error_class, error_code })
        } else {
            let (error_class, consumed) = decode_error_value(data)?;
            let (error_code, _) = decode_error_value(&data[consumed..])?;
            Ok(Self { error_class, error_code })
        }
    }
}

/// Decode one error-class/error-code element, which arrives either as a
/// bare application-tagged enumerated or (within an opening/closing-0
/// wrapper) as a context-tagged one. Context tag numbers are positional
/// (0 for error-class, 1 for error-code) but accepting either here keeps
/// this tolerant of stacks that tag the context form inconsistently.
fn decode_error_value(data: &[u8]) -> EncodingResult<(u32, usize)> {
    if let Ok((value, consumed)) = decode_context_enumerated(data, 0) {
        return Ok((value, consumed));
    }
    if let Ok((value, consumed)) = decode_context_enumerated(data, 1) {
        return Ok((value, consumed));
    }
    decode_enumerated(data)
}

/// Read the raw bytes between a context opening tag and its matching
/// closing tag, tracking nesting depth so extended tag numbers and
/// further nested constructed data inside don't get mistaken for the
/// closing bracket. Returns the inner bytes and the total length consumed
/// (opening tag through closing tag, inclusive).
fn decode_constructed_value(data: &[u8], tag_number: u8) -> EncodingResult<(Vec<u8>, usize)> {
    let (open, open_header) = decode_tag(data)?;
    if open.class != TagClass::Context || open.number != tag_number || open.kind != TagKind::Opening {
        return Err(EncodingError::InvalidTag);
    }

    let value_start = open_header;
    let mut pos = open_header;
    let mut depth = 1usize;

    loop {
        if pos >= data.len() {
            return Err(EncodingError::BufferUnderflow);
        }
        let (tag, header) = decode_tag(&data[pos..])?;
        match tag.kind {
            TagKind::Opening => {
                depth += 1;
                pos += header;
            }
            TagKind::Closing => {
                depth -= 1;
                if depth == 0 {
                    let value_end = pos;
                    pos += header;
                    return Ok((data[value_start..value_end].to_vec(), pos));
                }
                pos += header;
            }
            TagKind::Primitive(length) => {
                if data.len() < pos + header + length {
                    return Err(EncodingError::BufferUnderflow);
                }
                pos += header + length;
            }
        }
    }
}

/// Wrap `value` in a context opening/closing tag pair for `tag_number`.
fn encode_constructed_value(buffer: &mut Vec<u8>, tag_number: u8, value: &[u8]) -> EncodingResult<()> {
    crate::encoding::context::encode_opening_tag(buffer, tag_number)?;
    buffer.extend_from_slice(value);
    crate::encoding::context::encode_closing_tag(buffer, tag_number)?;
    Ok(())
}

/// Special array index value meaning "all elements" / "not an array".
pub const BACNET_ARRAY_ALL: u32 = 0xFFFFFFFF;

fn object_type_or_device(raw: u16) -> ObjectType {
    ObjectType::try_from(raw).unwrap_or(ObjectType::Device)
}

/// Who-Is request (unconfirmed service). An empty range broadcasts to
/// every device; a populated range narrows discovery to a single instance
/// or a span of instances.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WhoIsRequest {
    pub device_instance_range_low_limit: Option<u32>,
    pub device_instance_range_high_limit: Option<u32>,
}

impl WhoIsRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_device(device_instance: u32) -> Self {
        Self {
            device_instance_range_low_limit: Some(device_instance),
            device_instance_range_high_limit: Some(device_instance),
        }
    }

    pub fn for_range(low: u32, high: u32) -> Self {
        Self {
            device_instance_range_low_limit: Some(low),
            device_instance_range_high_limit: Some(high),
        }
    }

    /// Both limits are present together or not at all — a lone limit isn't
    /// representable on the wire, so it's treated the same as "no range".
    pub fn encode(&self, buffer: &mut Vec<u8>) -> EncodingResult<()> {
        if let (Some(low), Some(high)) = (self.device_instance_range_low_limit, self.device_instance_range_high_limit)
        {
            encode_context_unsigned(buffer, 0, low)?;
            encode_context_unsigned(buffer, 1, high)?;
        }
        Ok(())
    }

    pub fn decode(data: &[u8]) -> EncodingResult<Self> {
        let mut request = WhoIsRequest::new();

        match decode_context_unsigned(data, 0) {
            Ok((low, consumed)) => {
                request.device_instance_range_low_limit = Some(low);
                let (high, _) = decode_context_unsigned(&data[consumed..], 1).map_err(|_| {
                    EncodingError::InvalidFormat("Who-Is request has low limit without high limit".to_string())
                })?;
                request.device_instance_range_high_limit = Some(high);
            }
            Err(_) => {}
        }

        Ok(request)
    }

    pub fn matches(&self, device_instance: u32) -> bool {
        match (self.device_instance_range_low_limit, self.device_instance_range_high_limit) {
            (None, None) => true,
            (Some(low), Some(high)) => device_instance >= low && device_instance <= high,
            (Some(low), None) => device_instance >= low,
            (None, Some(high)) => device_instance <= high,
        }
    }
}

/// I-Am request (unconfirmed service) — a device's reply to Who-Is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IAmRequest {
    pub device_identifier: ObjectIdentifier,
    pub max_apdu_length_accepted: u32,
    pub segmentation_supported: u32,
    pub vendor_identifier: u32,
}

impl IAmRequest {
    pub fn new(
        device_identifier: ObjectIdentifier,
        max_apdu_length_accepted: u32,
        segmentation_supported: u32,
        vendor_identifier: u32,
    ) -> Self {
        Self {
            device_identifier,
            max_apdu_length_accepted,
            segmentation_supported,
            vendor_identifier,
        }
    }

    pub fn encode(&self, buffer: &mut Vec<u8>) -> EncodingResult<()> {
        encode_object_identifier(buffer, self.device_identifier.object_type as u16, self.device_identifier.instance)?;
        encode_unsigned(buffer, self.max_apdu_length_accepted)?;
        encode_enumerated(buffer, self.segmentation_supported)?;
        encode_unsigned(buffer, self.vendor_identifier)?;
        Ok(())
    }

    pub fn decode(data: &[u8]) -> EncodingResult<Self> {
        let mut pos = 0;

        let ((object_type, instance), consumed) = decode_object_identifier(&data[pos..])?;
        let device_identifier = ObjectIdentifier::new(object_type_or_device(object_type), instance);
        pos += consumed;

        let (max_apdu_length_accepted, consumed) = decode_unsigned(&data[pos..])?;
        pos += consumed;

        let (segmentation_supported, consumed) = decode_enumerated(&data[pos..])?;
        pos += consumed;

        let (vendor_identifier, _) = decode_unsigned(&data[pos..])?;

        Ok(IAmRequest::new(device_identifier, max_apdu_length_accepted, segmentation_supported, vendor_identifier))
    }
}

/// Read-Property request (confirmed service).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPropertyRequest {
    pub object_identifier: ObjectIdentifier,
    pub property_identifier: u32,
    pub property_array_index: Option<u32>,
}

impl ReadPropertyRequest {
    pub fn new(object_identifier: ObjectIdentifier, property_identifier: u32) -> Self {
        Self { object_identifier, property_identifier, property_array_index: None }
    }

    pub fn with_array_index(object_identifier: ObjectIdentifier, property_identifier: u32, array_index: u32) -> Self {
        Self { object_identifier, property_identifier, property_array_index: Some(array_index) }
    }

    pub fn encode(&self, buffer: &mut Vec<u8>) -> EncodingResult<()> {
        encode_context_object_id(buffer, 0, self.object_identifier.object_type as u16, self.object_identifier.instance)?;
        encode_context_enumerated(buffer, 1, self.property_identifier)?;
        if let Some(array_index) = self.property_array_index {
            encode_context_unsigned(buffer, 2, array_index)?;
        }
        Ok(())
    }

    pub fn decode(data: &[u8]) -> EncodingResult<Self> {
        let ((object_type, instance), mut pos) = decode_context_object_id(data, 0)?;
        let object_identifier = ObjectIdentifier::new(object_type_or_device(object_type), instance);

        let (property_identifier, consumed) = decode_context_enumerated(&data[pos..], 1)?;
        pos += consumed;

        let property_array_index = match decode_context_unsigned(&data[pos..], 2) {
            Ok((array_index, _)) => Some(array_index),
            Err(_) => None,
        };

        Ok(Self { object_identifier, property_identifier, property_array_index })
    }
}

/// Read-Property response (the ComplexAck service data for a Read-Property
/// request). `property_value` is left as the raw application-tagged bytes
/// between the context-3 opening and closing tags — callers decode it with
/// [`crate::encoding::decode_application_value`] once they know the
/// property's expected type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPropertyResponse {
    pub object_identifier: ObjectIdentifier,
    pub property_identifier: u32,
    pub property_array_index: Option<u32>,
    pub property_value: Vec<u8>,
}

impl ReadPropertyResponse {
    pub fn new(object_identifier: ObjectIdentifier, property_identifier: u32, property_value: Vec<u8>) -> Self {
        Self { object_identifier, property_identifier, property_array_index: None, property_value }
    }

    pub fn encode(&self, buffer: &mut Vec<u8>) -> EncodingResult<()> {
        encode_context_object_id(buffer, 0, self.object_identifier.object_type as u16, self.object_identifier.instance)?;
        encode_context_enumerated(buffer, 1, self.property_identifier)?;
        if let Some(array_index) = self.property_array_index {
            encode_context_unsigned(buffer, 2, array_index)?;
        }
        encode_constructed_value(buffer, 3, &self.property_value)?;
        Ok(())
    }

    pub fn decode(data: &[u8]) -> EncodingResult<Self> {
        let ((object_type, instance), mut pos) = decode_context_object_id(data, 0)?;
        let object_identifier = ObjectIdentifier::new(object_type_or_device(object_type), instance);

        let (property_identifier, consumed) = decode_context_enumerated(&data[pos..], 1)?;
        pos += consumed;

        let property_array_index = match decode_context_unsigned(&data[pos..], 2) {
            Ok((array_index, consumed)) => {
                pos += consumed;
                if array_index == BACNET_ARRAY_ALL {
                    None
                } else {
                    Some(array_index)
                }
            }
            Err(_) => None,
        };

        let (property_value, _) = decode_constructed_value(&data[pos..], 3)?;

        Ok(Self { object_identifier, property_identifier, property_array_index, property_value })
    }
}

/// Write-Property request (confirmed service).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePropertyRequest {
    pub object_identifier: ObjectIdentifier,
    pub property_identifier: u32,
    pub property_array_index: Option<u32>,
    pub property_value: Vec<u8>,
    pub priority: Option<u8>,
}

impl WritePropertyRequest {
    pub fn new(object_identifier: ObjectIdentifier, property_identifier: u32, property_value: Vec<u8>) -> Self {
        Self {
            object_identifier,
            property_identifier,
            property_array_index: None,
            property_value,
            priority: None,
        }
    }

    pub fn with_priority(
        object_identifier: ObjectIdentifier,
        property_identifier: u32,
        property_value: Vec<u8>,
        priority: u8,
    ) -> Self {
        Self {
            object_identifier,
            property_identifier,
            property_array_index: None,
            property_value,
            priority: Some(priority),
        }
    }

    pub fn with_array_index(
        object_identifier: ObjectIdentifier,
        property_identifier: u32,
        array_index: u32,
        property_value: Vec<u8>,
    ) -> Self {
        Self {
            object_identifier,
            property_identifier,
            property_array_index: Some(array_index),
            property_value,
            priority: None,
        }
    }

    pub fn encode(&self, buffer: &mut Vec<u8>) -> EncodingResult<()> {
        encode_context_object_id(buffer, 0, self.object_identifier.object_type as u16, self.object_identifier.instance)?;
        encode_context_enumerated(buffer, 1, self.property_identifier)?;
        if let Some(array_index) = self.property_array_index {
            encode_context_unsigned(buffer, 2, array_index)?;
        }
        encode_constructed_value(buffer, 3, &self.property_value)?;
        if let Some(priority) = self.priority {
            encode_context_unsigned(buffer, 4, priority as u32)?;
        }
        Ok(())
    }

    pub fn decode(data: &[u8]) -> EncodingResult<Self> {
        let ((object_type, instance), mut pos) = decode_context_object_id(data, 0)?;
        let object_identifier = ObjectIdentifier::new(object_type_or_device(object_type), instance);

        let (property_identifier, consumed) = decode_context_enumerated(&data[pos..], 1)?;
        pos += consumed;

        let property_array_index = match decode_context_unsigned(&data[pos..], 2) {
            Ok((array_index, consumed)) => {
                pos += consumed;
                Some(array_index)
            }
            Err(_) => None,
        };

        let (property_value, consumed) = decode_constructed_value(&data[pos..], 3)?;
        pos += consumed;

        let priority = match decode_context_unsigned(&data[pos..], 4) {
            Ok((priority, _)) => Some(priority as u8),
            Err(_) => None,
        };

        Ok(Self { object_identifier, property_identifier, property_array_index, property_value, priority })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::encode_real;

    #[test]
    fn who_is_broadcast_encodes_empty() {
        let mut buf = Vec::new();
        WhoIsRequest::new().encode(&mut buf).unwrap();
        assert!(buf.is_empty());
        assert_eq!(WhoIsRequest::decode(&buf).unwrap(), WhoIsRequest::new());
    }

    #[test]
    fn who_is_for_device_roundtrips() {
        let request = WhoIsRequest::for_device(1234);
        let mut buf = Vec::new();
        request.encode(&mut buf).unwrap();
        let decoded = WhoIsRequest::decode(&buf).unwrap();
        assert_eq!(decoded, request);
        assert!(decoded.matches(1234));
        assert!(!decoded.matches(1235));
    }

    #[test]
    fn i_am_roundtrips() {
        let request = IAmRequest::new(ObjectIdentifier::new(ObjectType::Device, 1001), 1476, 3, 260);
        let mut buf = Vec::new();
        request.encode(&mut buf).unwrap();
        assert_eq!(IAmRequest::decode(&buf).unwrap(), request);
    }

    #[test]
    fn read_property_request_roundtrips_with_array_index() {
        let request =
            ReadPropertyRequest::with_array_index(ObjectIdentifier::new(ObjectType::AnalogInput, 3), 85, 0);
        let mut buf = Vec::new();
        request.encode(&mut buf).unwrap();
        assert_eq!(ReadPropertyRequest::decode(&buf).unwrap(), request);
    }

    #[test]
    fn read_property_response_roundtrips() {
        let mut value = Vec::new();
        encode_unsigned(&mut value, 72).unwrap();
        let response = ReadPropertyResponse::new(ObjectIdentifier::new(ObjectType::AnalogInput, 3), 85, value);
        let mut buf = Vec::new();
        response.encode(&mut buf).unwrap();
        assert_eq!(ReadPropertyResponse::decode(&buf).unwrap(), response);
    }

    #[test]
    fn read_property_response_value_may_contain_0x3f_byte() {
        // A naive "scan for the first 0x3F byte" closing-tag search would
        // stop here, inside the octet string payload rather than at the
        // real closing tag.
        let mut value = Vec::new();
        crate::encoding::encode_octet_string(&mut value, &[0x3F, 0x00, 0x3F]).unwrap();
        let response = ReadPropertyResponse::new(ObjectIdentifier::new(ObjectType::AnalogInput, 3), 85, value.clone());
        let mut buf = Vec::new();
        response.encode(&mut buf).unwrap();
        let decoded = ReadPropertyResponse::decode(&buf).unwrap();
        assert_eq!(decoded.property_value, value);
    }

    #[test]
    fn write_property_request_roundtrips_with_priority() {
        let mut value = Vec::new();
        encode_real(&mut value, 21.5).unwrap();
        let request = WritePropertyRequest::with_priority(
            ObjectIdentifier::new(ObjectType::AnalogOutput, 2),
            85,
            value,
            8,
        );
        let mut buf = Vec::new();
        request.encode(&mut buf).unwrap();
        assert_eq!(WritePropertyRequest::decode(&buf).unwrap(), request);
    }

    #[test]
    fn write_property_request_preserves_property_identifier_above_255() {
        // A service id like a vendor-proprietary property (> 255) would be
        // silently truncated by a single-byte-only encoding.
        let mut value = Vec::new();
        encode_unsigned(&mut value, 1).unwrap();
        let request = WritePropertyRequest::new(ObjectIdentifier::new(ObjectType::AnalogOutput, 2), 512, value);
        let mut buf = Vec::new();
        request.encode(&mut buf).unwrap();
        let decoded = WritePropertyRequest::decode(&buf).unwrap();
        assert_eq!(decoded.property_identifier, 512);
    }

    #[test]
    fn bacnet_error_decodes_bare_application_tags() {
        let mut data = Vec::new();
        encode_enumerated(&mut data, 2).unwrap();
        encode_enumerated(&mut data, 31).unwrap();
        let error = BacnetError::decode(&data).unwrap();
        assert_eq!(error, BacnetError { error_class: 2, error_code: 31 });
    }

    #[test]
    fn bacnet_error_decodes_context_0_wrapped_tags() {
        let mut data = Vec::new();
        crate::encoding::context::encode_opening_tag(&mut data, 0).unwrap();
        encode_context_unsigned(&mut data, 0, 2).unwrap();
        encode_context_unsigned(&mut data, 1, 31).unwrap();
        crate::encoding::context::encode_closing_tag(&mut data, 0).unwrap();
        let error = BacnetError::decode(&data).unwrap();
        assert_eq!(error, BacnetError { error_class: 2, error_code: 31 });
    }

    #[test]
    fn reject_reason_falls_back_to_unknown() {
        assert_eq!(RejectReason::from(9), RejectReason::UnrecognizedService);
        assert_eq!(RejectReason::from(200), RejectReason::Unknown(200));
    }
}

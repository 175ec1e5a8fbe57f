//! BACnet application-layer tag encoding and decoding.
//!
//! BACnet primitive and constructed data is carried on the wire as a sequence
//! of tag-length-value elements. A tag byte identifies whether the following
//! bytes are an *application* tag (the data's own type, tag numbers 0-15 per
//! the table below) or a *context* tag (a service-defined slot number, whose
//! type is implied by position rather than carried on the wire), and whether
//! the element is primitive data or an opening/closing bracket around a
//! constructed sub-sequence.
//!
//! | Tag | Type | Description |
//! |-----|------|-------------|
//! | 0 | Null | No value |
//! | 1 | Boolean | True/False |
//! | 2 | Unsigned Integer | 8, 16, 24, or 32-bit unsigned |
//! | 3 | Signed Integer | 8, 16, 24, or 32-bit signed |
//! | 4 | Real | 32-bit IEEE 754 float |
//! | 5 | Double | 64-bit IEEE 754 double |
//! | 6 | Octet String | Arbitrary byte sequence |
//! | 7 | Character String | Text with encoding indicator |
//! | 8 | Bit String | Bit field with unused bits count |
//! | 9 | Enumerated | Unsigned integer representing enumeration |
//! | 10 | Date | Year, month, day, day-of-week |
//! | 11 | Time | Hour, minute, second, hundredths |
//! | 12 | Object Identifier | Object type and instance |
//!
//! Context-tagged values one level of a request are typically optional:
//! decoding them should never consume bytes it can't account for when the
//! tag number doesn't match what the caller expected. The `decode_context_*`
//! functions below return an error without having advanced the caller's
//! cursor in that case, so callers can simply skip the field on failure
//! rather than treat a tag-number mismatch as a hard parse error.


/// Result type for encoding operations.
pub type Result<T> = std::result::Result<T, EncodingError>;

/// Errors that can occur during encoding/decoding operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EncodingError {
    #[error("buffer overflow during encoding")]
    BufferOverflow,
    #[error("buffer underflow during decoding")]
    BufferUnderflow,
    #[error("invalid tag number encountered")]
    InvalidTag,
    #[error("invalid length value")]
    InvalidLength,
    #[error("unexpected end of data")]
    UnexpectedEndOfData,
    #[error("invalid encoding format: {0}")]
    InvalidFormat(String),
    #[error("value out of valid range")]
    ValueOutOfRange,
}

/// BACnet application tag numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ApplicationTag {
    Null = 0,
    Boolean = 1,
    UnsignedInt = 2,
    SignedInt = 3,
    Real = 4,
    Double = 5,
    OctetString = 6,
    CharacterString = 7,
    BitString = 8,
    Enumerated = 9,
    Date = 10,
    Time = 11,
    ObjectIdentifier = 12,
}

impl TryFrom<u8> for ApplicationTag {
    type Error = EncodingError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ApplicationTag::Null),
            1 => Ok(ApplicationTag::Boolean),
            2 => Ok(ApplicationTag::UnsignedInt),
            3 => Ok(ApplicationTag::SignedInt),
            4 => Ok(ApplicationTag::Real),
            5 => Ok(ApplicationTag::Double),
            6 => Ok(ApplicationTag::OctetString),
            7 => Ok(ApplicationTag::CharacterString),
            8 => Ok(ApplicationTag::BitString),
            9 => Ok(ApplicationTag::Enumerated),
            10 => Ok(ApplicationTag::Date),
            11 => Ok(ApplicationTag::Time),
            12 => Ok(ApplicationTag::ObjectIdentifier),
            _ => Err(EncodingError::InvalidTag),
        }
    }
}

/// Application vs. context tag class, per the class bit in a tag's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Application,
    Context,
}

/// What a decoded tag introduces: a primitive value of the given length, or
/// an opening/closing bracket around a constructed (context-tagged) sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Primitive(usize),
    Opening,
    Closing,
}

/// A decoded tag header, without its value bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub number: u8,
    pub class: TagClass,
    pub kind: TagKind,
}

/// Decode a tag header (application or context, primitive or bracket) from
/// the front of `data`. Returns the tag plus the number of bytes the header
/// itself occupied; value bytes (for `TagKind::Primitive`) follow immediately.
pub fn decode_tag(data: &[u8]) -> Result<(Tag, usize)> {
    if data.is_empty() {
        return Err(EncodingError::BufferUnderflow);
    }

    let first = data[0];
    let class = if first & 0x08 != 0 {
        TagClass::Context
    } else {
        TagClass::Application
    };

    let mut number = (first >> 4) & 0x0F;
    let mut consumed = 1;

    if number == 15 {
        if data.len() < consumed + 1 {
            return Err(EncodingError::BufferUnderflow);
        }
        number = data[consumed];
        consumed += 1;
    }

    let selector = first & 0x07;
    let kind = match selector {
        6 => TagKind::Opening,
        7 => TagKind::Closing,
        5 => {
            if data.len() < consumed + 1 {
                return Err(EncodingError::BufferUnderflow);
            }
            let len_byte = data[consumed];
            consumed += 1;

            let length = if len_byte < 254 {
                len_byte as usize
            } else if len_byte == 254 {
                if data.len() < consumed + 2 {
                    return Err(EncodingError::BufferUnderflow);
                }
                let v = u16::from_be_bytes([data[consumed], data[consumed + 1]]) as usize;
                consumed += 2;
                v
            } else {
                if data.len() < consumed + 4 {
                    return Err(EncodingError::BufferUnderflow);
                }
                let v = u32::from_be_bytes([
                    data[consumed],
                    data[consumed + 1],
                    data[consumed + 2],
                    data[consumed + 3],
                ]) as usize;
                consumed += 4;
                v
            };
            TagKind::Primitive(length)
        }
        n => TagKind::Primitive(n as usize),
    };

    Ok((Tag { number, class, kind }, consumed))
}

/// Encode a tag header. For `TagKind::Primitive`, the caller still needs to
/// append the value bytes themselves.
pub fn encode_tag(buffer: &mut Vec<u8>, class: TagClass, number: u8, kind: TagKind) -> Result<()> {
    let class_bit = if class == TagClass::Context { 0x08 } else { 0x00 };
    let (nibble, extended) = if number < 15 { (number, None) } else { (15, Some(number)) };

    match kind {
        TagKind::Opening => {
            buffer.push((nibble << 4) | class_bit | 0x06);
            if let Some(n) = extended {
                buffer.push(n);
            }
        }
        TagKind::Closing => {
            buffer.push((nibble << 4) | class_bit | 0x07);
            if let Some(n) = extended {
                buffer.push(n);
            }
        }
        TagKind::Primitive(length) => {
            let selector = if length < 5 { length as u8 } else { 5 };
            buffer.push((nibble << 4) | class_bit | selector);
            if let Some(n) = extended {
                buffer.push(n);
            }
            if length >= 5 {
                if length < 254 {
                    buffer.push(length as u8);
                } else if length < 65536 {
                    buffer.push(254);
                    buffer.extend_from_slice(&(length as u16).to_be_bytes());
                } else {
                    buffer.push(255);
                    buffer.extend_from_slice(&(length as u32).to_be_bytes());
                }
            }
        }
    }

    Ok(())
}

/// Encode a BACnet application tag header (value bytes follow separately).
pub fn encode_application_tag(buffer: &mut Vec<u8>, tag: ApplicationTag, length: usize) -> Result<()> {
    encode_tag(buffer, TagClass::Application, tag as u8, TagKind::Primitive(length))
}

/// Decode a BACnet application tag header.
pub fn decode_application_tag(data: &[u8]) -> Result<(ApplicationTag, usize, usize)> {
    let (tag, consumed) = decode_tag(data)?;
    if tag.class != TagClass::Application {
        return Err(EncodingError::InvalidTag);
    }
    let length = match tag.kind {
        TagKind::Primitive(length) => length,
        _ => return Err(EncodingError::InvalidTag),
    };
    Ok((ApplicationTag::try_from(tag.number)?, length, consumed))
}

fn unsigned_to_bytes(value: u32) -> Vec<u8> {
    if value == 0 {
        vec![0]
    } else if value <= 0xFF {
        vec![value as u8]
    } else if value <= 0xFFFF {
        (value as u16).to_be_bytes().to_vec()
    } else if value <= 0xFFFFFF {
        value.to_be_bytes()[1..].to_vec()
    } else {
        value.to_be_bytes().to_vec()
    }
}

fn bytes_to_unsigned(data: &[u8]) -> Result<u32> {
    match data.len() {
        1 => Ok(data[0] as u32),
        2 => Ok(u16::from_be_bytes([data[0], data[1]]) as u32),
        3 => Ok(u32::from_be_bytes([0, data[0], data[1], data[2]])),
        4 => Ok(u32::from_be_bytes([data[0], data[1], data[2], data[3]])),
        _ => Err(EncodingError::InvalidLength),
    }
}

fn signed_to_bytes(value: i32) -> Vec<u8> {
    if (-128..=127).contains(&value) {
        vec![value as u8]
    } else if (-32768..=32767).contains(&value) {
        (value as i16).to_be_bytes().to_vec()
    } else if (-8388608..=8388607).contains(&value) {
        value.to_be_bytes()[1..].to_vec()
    } else {
        value.to_be_bytes().to_vec()
    }
}

fn bytes_to_signed(data: &[u8]) -> Result<i32> {
    match data.len() {
        1 => Ok(data[0] as i8 as i32),
        2 => Ok(i16::from_be_bytes([data[0], data[1]]) as i32),
        3 => {
            let sign = if data[0] & 0x80 != 0 { 0xFF } else { 0x00 };
            Ok(i32::from_be_bytes([sign, data[0], data[1], data[2]]))
        }
        4 => Ok(i32::from_be_bytes([data[0], data[1], data[2], data[3]])),
        _ => Err(EncodingError::InvalidLength),
    }
}

/// Encode a BACnet boolean value.
pub fn encode_boolean(buffer: &mut Vec<u8>, value: bool) -> Result<()> {
    encode_application_tag(buffer, ApplicationTag::Boolean, if value { 1 } else { 0 })
}

/// Decode a BACnet boolean value.
pub fn decode_boolean(data: &[u8]) -> Result<(bool, usize)> {
    let (tag, length, consumed) = decode_application_tag(data)?;
    if tag != ApplicationTag::Boolean {
        return Err(EncodingError::InvalidTag);
    }
    match length {
        0 => Ok((false, consumed)),
        1 => Ok((true, consumed)),
        _ => Err(EncodingError::InvalidLength),
    }
}

/// Encode a BACnet unsigned integer.
pub fn encode_unsigned(buffer: &mut Vec<u8>, value: u32) -> Result<()> {
    let bytes = unsigned_to_bytes(value);
    encode_application_tag(buffer, ApplicationTag::UnsignedInt, bytes.len())?;
    buffer.extend_from_slice(&bytes);
    Ok(())
}

/// Decode a BACnet unsigned integer.
pub fn decode_unsigned(data: &[u8]) -> Result<(u32, usize)> {
    let (tag, length, consumed) = decode_application_tag(data)?;
    if tag != ApplicationTag::UnsignedInt {
        return Err(EncodingError::InvalidTag);
    }
    if data.len() < consumed + length {
        return Err(EncodingError::BufferUnderflow);
    }
    let value = bytes_to_unsigned(&data[consumed..consumed + length])?;
    Ok((value, consumed + length))
}

/// Encode a BACnet signed integer.
pub fn encode_signed(buffer: &mut Vec<u8>, value: i32) -> Result<()> {
    let bytes = signed_to_bytes(value);
    encode_application_tag(buffer, ApplicationTag::SignedInt, bytes.len())?;
    buffer.extend_from_slice(&bytes);
    Ok(())
}

/// Decode a BACnet signed integer.
pub fn decode_signed(data: &[u8]) -> Result<(i32, usize)> {
    let (tag, length, consumed) = decode_application_tag(data)?;
    if tag != ApplicationTag::SignedInt {
        return Err(EncodingError::InvalidTag);
    }
    if data.len() < consumed + length {
        return Err(EncodingError::BufferUnderflow);
    }
    let value = bytes_to_signed(&data[consumed..consumed + length])?;
    Ok((value, consumed + length))
}

/// Encode a BACnet real (32-bit float) value.
pub fn encode_real(buffer: &mut Vec<u8>, value: f32) -> Result<()> {
    encode_application_tag(buffer, ApplicationTag::Real, 4)?;
    buffer.extend_from_slice(&value.to_be_bytes());
    Ok(())
}

/// Decode a BACnet real (32-bit float) value.
pub fn decode_real(data: &[u8]) -> Result<(f32, usize)> {
    let (tag, length, consumed) = decode_application_tag(data)?;
    if tag != ApplicationTag::Real || length != 4 {
        return Err(EncodingError::InvalidLength);
    }
    if data.len() < consumed + 4 {
        return Err(EncodingError::BufferUnderflow);
    }
    let bytes: [u8; 4] = data[consumed..consumed + 4].try_into().unwrap();
    Ok((f32::from_be_bytes(bytes), consumed + 4))
}

/// Encode a BACnet double (64-bit float) value.
pub fn encode_double(buffer: &mut Vec<u8>, value: f64) -> Result<()> {
    encode_application_tag(buffer, ApplicationTag::Double, 8)?;
    buffer.extend_from_slice(&value.to_be_bytes());
    Ok(())
}

/// Decode a BACnet double (64-bit float) value.
pub fn decode_double(data: &[u8]) -> Result<(f64, usize)> {
    let (tag, length, consumed) = decode_application_tag(data)?;
    if tag != ApplicationTag::Double || length != 8 {
        return Err(EncodingError::InvalidLength);
    }
    if data.len() < consumed + 8 {
        return Err(EncodingError::BufferUnderflow);
    }
    let bytes: [u8; 8] = data[consumed..consumed + 8].try_into().unwrap();
    Ok((f64::from_be_bytes(bytes), consumed + 8))
}

/// Encode a BACnet octet string.
pub fn encode_octet_string(buffer: &mut Vec<u8>, value: &[u8]) -> Result<()> {
    encode_application_tag(buffer, ApplicationTag::OctetString, value.len())?;
    buffer.extend_from_slice(value);
    Ok(())
}

/// Decode a BACnet octet string.
pub fn decode_octet_string(data: &[u8]) -> Result<(Vec<u8>, usize)> {
    let (tag, length, consumed) = decode_application_tag(data)?;
    if tag != ApplicationTag::OctetString {
        return Err(EncodingError::InvalidTag);
    }
    if data.len() < consumed + length {
        return Err(EncodingError::BufferUnderflow);
    }
    Ok((data[consumed..consumed + length].to_vec(), consumed + length))
}

/// Encode a BACnet character string (ANSI X3.4 / UTF-8 encoding indicator 0).
pub fn encode_character_string(buffer: &mut Vec<u8>, value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    encode_application_tag(buffer, ApplicationTag::CharacterString, bytes.len() + 1)?;
    buffer.push(0);
    buffer.extend_from_slice(bytes);
    Ok(())
}

/// Decode a BACnet character string.
pub fn decode_character_string(data: &[u8]) -> Result<(String, usize)> {
    let (tag, length, consumed) = decode_application_tag(data)?;
    if tag != ApplicationTag::CharacterString {
        return Err(EncodingError::InvalidTag);
    }
    if length == 0 || data.len() < consumed + length {
        return Err(EncodingError::BufferUnderflow);
    }
    let string_data = &data[consumed + 1..consumed + length];
    let value = String::from_utf8(string_data.to_vec())
        .map_err(|_| EncodingError::InvalidFormat("invalid UTF-8 character string".to_string()))?;
    Ok((value, consumed + length))
}

/// Encode a BACnet enumerated value.
pub fn encode_enumerated(buffer: &mut Vec<u8>, value: u32) -> Result<()> {
    let bytes = unsigned_to_bytes(value);
    encode_application_tag(buffer, ApplicationTag::Enumerated, bytes.len())?;
    buffer.extend_from_slice(&bytes);
    Ok(())
}

/// Decode a BACnet enumerated value.
pub fn decode_enumerated(data: &[u8]) -> Result<(u32, usize)> {
    let (tag, length, consumed) = decode_application_tag(data)?;
    if tag != ApplicationTag::Enumerated {
        return Err(EncodingError::InvalidTag);
    }
    if data.len() < consumed + length {
        return Err(EncodingError::BufferUnderflow);
    }
    Ok((bytes_to_unsigned(&data[consumed..consumed + length])?, consumed + length))
}

/// Encode a BACnet date (year is full, e.g. 2024; 255 = unspecified).
pub fn encode_date(buffer: &mut Vec<u8>, year: u16, month: u8, day: u8, weekday: u8) -> Result<()> {
    encode_application_tag(buffer, ApplicationTag::Date, 4)?;
    buffer.push(if year == 255 { 255 } else { (year.saturating_sub(1900)) as u8 });
    buffer.push(month);
    buffer.push(day);
    buffer.push(weekday);
    Ok(())
}

/// Decode a BACnet date.
pub fn decode_date(data: &[u8]) -> Result<((u16, u8, u8, u8), usize)> {
    let (tag, length, consumed) = decode_application_tag(data)?;
    if tag != ApplicationTag::Date || length != 4 || data.len() < consumed + 4 {
        return Err(EncodingError::InvalidLength);
    }
    let year = if data[consumed] == 255 { 255 } else { 1900 + data[consumed] as u16 };
    Ok(((year, data[consumed + 1], data[consumed + 2], data[consumed + 3]), consumed + 4))
}

/// Encode a BACnet time.
pub fn encode_time(buffer: &mut Vec<u8>, hour: u8, minute: u8, second: u8, hundredths: u8) -> Result<()> {
    encode_application_tag(buffer, ApplicationTag::Time, 4)?;
    buffer.push(hour);
    buffer.push(minute);
    buffer.push(second);
    buffer.push(hundredths);
    Ok(())
}

/// Decode a BACnet time.
pub fn decode_time(data: &[u8]) -> Result<((u8, u8, u8, u8), usize)> {
    let (tag, length, consumed) = decode_application_tag(data)?;
    if tag != ApplicationTag::Time || length != 4 || data.len() < consumed + 4 {
        return Err(EncodingError::InvalidLength);
    }
    Ok(((data[consumed], data[consumed + 1], data[consumed + 2], data[consumed + 3]), consumed + 4))
}

/// Pack a BACnet object identifier into its wire u32 form.
pub fn pack_object_id(object_type: u16, instance: u32) -> Result<u32> {
    if object_type > 0x3FF || instance > 0x3FFFFF {
        return Err(EncodingError::ValueOutOfRange);
    }
    Ok(((object_type as u32) << 22) | instance)
}

/// Unpack a wire-form object identifier u32 into (object_type, instance).
pub fn unpack_object_id(raw: u32) -> (u16, u32) {
    ((raw >> 22) as u16, raw & 0x3FFFFF)
}

/// Encode a BACnet object identifier (application-tagged).
pub fn encode_object_identifier(buffer: &mut Vec<u8>, object_type: u16, instance: u32) -> Result<()> {
    let raw = pack_object_id(object_type, instance)?;
    encode_application_tag(buffer, ApplicationTag::ObjectIdentifier, 4)?;
    buffer.extend_from_slice(&raw.to_be_bytes());
    Ok(())
}

/// Decode a BACnet object identifier (application-tagged).
pub fn decode_object_identifier(data: &[u8]) -> Result<((u16, u32), usize)> {
    let (tag, length, consumed) = decode_application_tag(data)?;
    if tag != ApplicationTag::ObjectIdentifier || length != 4 || data.len() < consumed + 4 {
        return Err(EncodingError::InvalidLength);
    }
    let raw = u32::from_be_bytes(data[consumed..consumed + 4].try_into().unwrap());
    Ok((unpack_object_id(raw), consumed + 4))
}

/// Context-specific tag encoding/decoding: the raw bracket/length mechanics,
/// used when a service needs to hand-roll its own field layout.
pub mod context {
    use super::*;

    pub fn encode_context_tag(buffer: &mut Vec<u8>, tag_number: u8, length: usize) -> Result<()> {
        encode_tag(buffer, TagClass::Context, tag_number, TagKind::Primitive(length))
    }

    pub fn decode_context_tag(data: &[u8]) -> Result<(u8, usize, usize)> {
        let (tag, consumed) = decode_tag(data)?;
        match tag.kind {
            TagKind::Primitive(length) if tag.class == TagClass::Context => Ok((tag.number, length, consumed)),
            _ => Err(EncodingError::InvalidTag),
        }
    }

    pub fn encode_opening_tag(buffer: &mut Vec<u8>, tag_number: u8) -> Result<()> {
        encode_tag(buffer, TagClass::Context, tag_number, TagKind::Opening)
    }

    pub fn encode_closing_tag(buffer: &mut Vec<u8>, tag_number: u8) -> Result<()> {
        encode_tag(buffer, TagClass::Context, tag_number, TagKind::Closing)
    }
}

/// Encode a context-tagged unsigned integer.
pub fn encode_context_unsigned(buffer: &mut Vec<u8>, tag_number: u8, value: u32) -> Result<()> {
    let bytes = unsigned_to_bytes(value);
    context::encode_context_tag(buffer, tag_number, bytes.len())?;
    buffer.extend_from_slice(&bytes);
    Ok(())
}

/// Decode a context-tagged unsigned integer expected at context tag `tag_number`.
/// Does not advance past a mismatched tag: callers can treat `Err` as "field absent".
pub fn decode_context_unsigned(data: &[u8], tag_number: u8) -> Result<(u32, usize)> {
    let (number, length, header) = context::decode_context_tag(data)?;
    if number != tag_number {
        return Err(EncodingError::InvalidTag);
    }
    if data.len() < header + length {
        return Err(EncodingError::BufferUnderflow);
    }
    Ok((bytes_to_unsigned(&data[header..header + length])?, header + length))
}

/// Encode a context-tagged enumerated value.
pub fn encode_context_enumerated(buffer: &mut Vec<u8>, tag_number: u8, value: u32) -> Result<()> {
    encode_context_unsigned(buffer, tag_number, value)
}

/// Decode a context-tagged enumerated value.
pub fn decode_context_enumerated(data: &[u8], tag_number: u8) -> Result<(u32, usize)> {
    decode_context_unsigned(data, tag_number)
}

/// Encode a context-tagged object identifier.
pub fn encode_context_object_id(buffer: &mut Vec<u8>, tag_number: u8, object_type: u16, instance: u32) -> Result<()> {
    let raw = pack_object_id(object_type, instance)?;
    context::encode_context_tag(buffer, tag_number, 4)?;
    buffer.extend_from_slice(&raw.to_be_bytes());
    Ok(())
}

/// Decode a context-tagged object identifier.
pub fn decode_context_object_id(data: &[u8], tag_number: u8) -> Result<((u16, u32), usize)> {
    let (number, length, header) = context::decode_context_tag(data)?;
    if number != tag_number || length != 4 || data.len() < header + 4 {
        return Err(EncodingError::InvalidTag);
    }
    let raw = u32::from_be_bytes(data[header..header + 4].try_into().unwrap());
    Ok((unpack_object_id(raw), header + 4))
}

/// Bit string encoding/decoding utilities.
pub mod bitstring {
    use super::*;

    fn pack_bits(bits: &[bool]) -> (u8, Vec<u8>) {
        let unused_bits = if bits.len() % 8 == 0 { 0 } else { 8 - (bits.len() % 8) };
        let mut bytes = Vec::with_capacity((bits.len() + 7) / 8);
        let mut current = 0u8;
        let mut pos = 0;
        for &bit in bits {
            if bit {
                current |= 1 << (7 - pos);
            }
            pos += 1;
            if pos == 8 {
                bytes.push(current);
                current = 0;
                pos = 0;
            }
        }
        if pos > 0 {
            bytes.push(current);
        }
        (unused_bits as u8, bytes)
    }

    pub(crate) fn unpack_bits(unused_bits: u8, bytes: &[u8]) -> Result<Vec<bool>> {
        if unused_bits > 7 {
            return Err(EncodingError::InvalidFormat("invalid unused bits count".to_string()));
        }
        let mut bits = Vec::new();
        for (i, &byte) in bytes.iter().enumerate() {
            let bits_in_byte = if i == bytes.len() - 1 { 8 - unused_bits as usize } else { 8 };
            for bit_pos in 0..bits_in_byte {
                bits.push((byte & (1 << (7 - bit_pos))) != 0);
            }
        }
        Ok(bits)
    }

    pub fn encode_bit_string(buffer: &mut Vec<u8>, bits: &[bool]) -> Result<()> {
        let (unused_bits, bytes) = pack_bits(bits);
        encode_application_tag(buffer, ApplicationTag::BitString, bytes.len() + 1)?;
        buffer.push(unused_bits);
        buffer.extend_from_slice(&bytes);
        Ok(())
    }

    pub fn decode_bit_string(data: &[u8]) -> Result<(Vec<bool>, usize)> {
        let (tag, length, consumed) = decode_application_tag(data)?;
        if tag != ApplicationTag::BitString {
            return Err(EncodingError::InvalidTag);
        }
        if length == 0 || data.len() < consumed + length {
            return Err(EncodingError::BufferUnderflow);
        }
        let unused_bits = data[consumed];
        let bits = unpack_bits(unused_bits, &data[consumed + 1..consumed + length])?;
        Ok((bits, consumed + length))
    }
}

/// A decoded BACnet application-tagged primitive, type-erased so that a
/// service decoder doesn't need to know in advance which primitive type a
/// property value holds. Completes the application-tag sum even though the
/// services in this crate only ever construct a handful of these variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Unsigned(u32),
    Signed(i32),
    Real(f32),
    Double(f64),
    OctetString(Vec<u8>),
    CharacterString(String),
    BitString(Vec<bool>),
    Enumerated(u32),
    Date(u16, u8, u8, u8),
    Time(u8, u8, u8, u8),
    ObjectId(u16, u32),
}

/// Decode a single application-tagged value, dispatching on its tag number.
pub fn decode_application_value(data: &[u8]) -> Result<(Value, usize)> {
    let (tag, header) = decode_tag(data)?;
    if tag.class != TagClass::Application {
        return Err(EncodingError::InvalidTag);
    }
    let length = match tag.kind {
        TagKind::Primitive(length) => length,
        _ => return Err(EncodingError::InvalidTag),
    };
    let app_tag = ApplicationTag::try_from(tag.number)?;

    // Boolean carries its value in the length nibble itself (0 = false,
    // 1 = true) and has no body bytes, unlike every other primitive tag.
    if app_tag == ApplicationTag::Boolean {
        let value = match length {
            0 => Value::Boolean(false),
            1 => Value::Boolean(true),
            _ => return Err(EncodingError::InvalidLength),
        };
        return Ok((value, header));
    }

    if data.len() < header + length {
        return Err(EncodingError::BufferUnderflow);
    }
    let body = &data[header..header + length];

    let value = match app_tag {
        ApplicationTag::Null => Value::Null,
        ApplicationTag::Boolean => unreachable!("handled above"),
        ApplicationTag::UnsignedInt => Value::Unsigned(bytes_to_unsigned(body)?),
        ApplicationTag::SignedInt => Value::Signed(bytes_to_signed(body)?),
        ApplicationTag::Real => {
            if length != 4 {
                return Err(EncodingError::InvalidLength);
            }
            Value::Real(f32::from_be_bytes(body.try_into().unwrap()))
        }
        ApplicationTag::Double => {
            if length != 8 {
                return Err(EncodingError::InvalidLength);
            }
            Value::Double(f64::from_be_bytes(body.try_into().unwrap()))
        }
        ApplicationTag::OctetString => Value::OctetString(body.to_vec()),
        ApplicationTag::CharacterString => {
            if body.is_empty() {
                return Err(EncodingError::InvalidLength);
            }
            Value::CharacterString(
                String::from_utf8(body[1..].to_vec())
                    .map_err(|_| EncodingError::InvalidFormat("invalid UTF-8 character string".to_string()))?,
            )
        }
        ApplicationTag::BitString => {
            if body.is_empty() {
                return Err(EncodingError::InvalidLength);
            }
            Value::BitString(bitstring::unpack_bits(body[0], &body[1..])?)
        }
        ApplicationTag::Enumerated => Value::Enumerated(bytes_to_unsigned(body)?),
        ApplicationTag::Date => {
            if length != 4 {
                return Err(EncodingError::InvalidLength);
            }
            let year = if body[0] == 255 { 255 } else { 1900 + body[0] as u16 };
            Value::Date(year, body[1], body[2], body[3])
        }
        ApplicationTag::Time => {
            if length != 4 {
                return Err(EncodingError::InvalidLength);
            }
            Value::Time(body[0], body[1], body[2], body[3])
        }
        ApplicationTag::ObjectIdentifier => {
            if length != 4 {
                return Err(EncodingError::InvalidLength);
            }
            let raw = u32::from_be_bytes(body.try_into().unwrap());
            let (object_type, instance) = unpack_object_id(raw);
            Value::ObjectId(object_type, instance)
        }
    };

    Ok((value, header + length))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_unsigned() {
        let mut buf = Vec::new();
        encode_unsigned(&mut buf, 0x1234).unwrap();
        let (value, consumed) = decode_unsigned(&buf).unwrap();
        assert_eq!(value, 0x1234);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn roundtrip_signed_negative() {
        let mut buf = Vec::new();
        encode_signed(&mut buf, -4000).unwrap();
        let (value, _) = decode_signed(&buf).unwrap();
        assert_eq!(value, -4000);
    }

    #[test]
    fn roundtrip_character_string() {
        let mut buf = Vec::new();
        encode_character_string(&mut buf, "hello").unwrap();
        let (value, consumed) = decode_character_string(&buf).unwrap();
        assert_eq!(value, "hello");
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn roundtrip_object_identifier() {
        let mut buf = Vec::new();
        encode_object_identifier(&mut buf, 8, 1234).unwrap();
        let ((object_type, instance), _) = decode_object_identifier(&buf).unwrap();
        assert_eq!(object_type, 8);
        assert_eq!(instance, 1234);
    }

    #[test]
    fn context_tag_mismatch_does_not_confuse_rewind() {
        let mut buf = Vec::new();
        encode_context_unsigned(&mut buf, 1, 42).unwrap();
        // tag present is number 1, caller expects 0 -> Err, not a panic or
        // a misparsed value.
        assert!(decode_context_unsigned(&buf, 0).is_err());
        let (value, _) = decode_context_unsigned(&buf, 1).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn opening_closing_tags_roundtrip() {
        let mut buf = Vec::new();
        context::encode_opening_tag(&mut buf, 3).unwrap();
        encode_unsigned(&mut buf, 7).unwrap();
        context::encode_closing_tag(&mut buf, 3).unwrap();

        let (open, c1) = decode_tag(&buf).unwrap();
        assert_eq!(open.kind, TagKind::Opening);
        assert_eq!(open.number, 3);

        let (value, c2) = decode_unsigned(&buf[c1..]).unwrap();
        assert_eq!(value, 7);

        let (close, _) = decode_tag(&buf[c1 + c2..]).unwrap();
        assert_eq!(close.kind, TagKind::Closing);
        assert_eq!(close.number, 3);
    }

    #[test]
    fn extended_tag_number_roundtrip() {
        let mut buf = Vec::new();
        encode_tag(&mut buf, TagClass::Context, 20, TagKind::Primitive(2)).unwrap();
        buf.extend_from_slice(&[0xAB, 0xCD]);
        let (tag, consumed) = decode_tag(&buf).unwrap();
        assert_eq!(tag.number, 20);
        assert_eq!(tag.class, TagClass::Context);
        assert_eq!(tag.kind, TagKind::Primitive(2));
        assert_eq!(consumed, 2);
    }

    #[test]
    fn decode_application_value_dispatches_by_tag() {
        let mut buf = Vec::new();
        encode_real(&mut buf, 72.5).unwrap();
        let (value, _) = decode_application_value(&buf).unwrap();
        assert_eq!(value, Value::Real(72.5));
    }

    #[test]
    fn decode_application_value_reads_boolean_from_the_length_nibble() {
        let mut buf = Vec::new();
        encode_boolean(&mut buf, true).unwrap();
        assert_eq!(buf.len(), 1, "a boolean tag carries no body bytes");
        let (value, consumed) = decode_application_value(&buf).unwrap();
        assert_eq!(value, Value::Boolean(true));
        assert_eq!(consumed, buf.len());

        let mut buf = Vec::new();
        encode_boolean(&mut buf, false).unwrap();
        let (value, consumed) = decode_application_value(&buf).unwrap();
        assert_eq!(value, Value::Boolean(false));
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn decode_application_value_stops_at_the_boolean_and_leaves_trailing_bytes() {
        let mut buf = Vec::new();
        encode_boolean(&mut buf, true).unwrap();
        let boolean_len = buf.len();
        encode_unsigned(&mut buf, 7).unwrap();

        let (value, consumed) = decode_application_value(&buf).unwrap();
        assert_eq!(value, Value::Boolean(true));
        assert_eq!(consumed, boolean_len);

        let (next, _) = decode_application_value(&buf[consumed..]).unwrap();
        assert_eq!(next, Value::Unsigned(7));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn unsigned_roundtrips(value: u32) {
            let mut buf = Vec::new();
            encode_unsigned(&mut buf, value).unwrap();
            let (decoded, consumed) = decode_unsigned(&buf).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(consumed, buf.len());
        }

        #[test]
        fn signed_roundtrips(value: i32) {
            let mut buf = Vec::new();
            encode_signed(&mut buf, value).unwrap();
            let (decoded, consumed) = decode_signed(&buf).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(consumed, buf.len());
        }

        #[test]
        fn real_roundtrips(value in any::<f32>().prop_filter("finite", |v| v.is_finite())) {
            let mut buf = Vec::new();
            encode_real(&mut buf, value).unwrap();
            let (decoded, _) = decode_real(&buf).unwrap();
            prop_assert_eq!(decoded.to_bits(), value.to_bits());
        }

        #[test]
        fn double_roundtrips(value in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
            let mut buf = Vec::new();
            encode_double(&mut buf, value).unwrap();
            let (decoded, _) = decode_double(&buf).unwrap();
            prop_assert_eq!(decoded.to_bits(), value.to_bits());
        }

        #[test]
        fn octet_string_roundtrips(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let mut buf = Vec::new();
            encode_octet_string(&mut buf, &bytes).unwrap();
            let (decoded, consumed) = decode_octet_string(&buf).unwrap();
            prop_assert_eq!(decoded, bytes);
            prop_assert_eq!(consumed, buf.len());
        }

        #[test]
        fn character_string_roundtrips(s in "[ -~]{0,64}") {
            let mut buf = Vec::new();
            encode_character_string(&mut buf, &s).unwrap();
            let (decoded, consumed) = decode_character_string(&buf).unwrap();
            prop_assert_eq!(decoded, s);
            prop_assert_eq!(consumed, buf.len());
        }

        #[test]
        fn context_unsigned_roundtrips(tag_number in 0u8..15, value: u32) {
            let mut buf = Vec::new();
            encode_context_unsigned(&mut buf, tag_number, value).unwrap();
            let (decoded, consumed) = decode_context_unsigned(&buf, tag_number).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(consumed, buf.len());
        }

        #[test]
        fn object_identifier_roundtrips(object_type in 0u16..1024, instance in 0u32..0x3FFFFF) {
            let mut buf = Vec::new();
            encode_object_identifier(&mut buf, object_type, instance).unwrap();
            let ((decoded_type, decoded_instance), consumed) = decode_object_identifier(&buf).unwrap();
            prop_assert_eq!(decoded_type, object_type);
            prop_assert_eq!(decoded_instance, instance);
            prop_assert_eq!(consumed, buf.len());
        }
    }
}

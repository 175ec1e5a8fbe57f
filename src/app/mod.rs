//! BACnet Application Protocol Data Unit (APDU) and invoke-id management.
//!
//! The APDU sits above the NPDU and carries the actual service request or
//! response. Its first byte's upper nibble selects one of eight PDU types;
//! the lower nibble (and, for confirmed requests, a second byte) carries
//! type-specific flags. Segmented PDUs are decoded structurally (the
//! sequence-number/window-size fields are parsed) but this client never
//! sets `segmented_response_accepted` and never reassembles a segmented
//! response — segmentation is out of scope.

use std::vec::Vec;

pub type Result<T> = std::result::Result<T, ApplicationError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ApplicationError {
    #[error("invalid APDU: {0}")]
    InvalidApdu(String),
    #[error("unsupported APDU type")]
    UnsupportedApduType,
}

/// The eight APDU PDU types, carried in the upper nibble of byte 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ApduType {
    ConfirmedRequest = 0,
    UnconfirmedRequest = 1,
    SimpleAck = 2,
    ComplexAck = 3,
    SegmentAck = 4,
    Error = 5,
    Reject = 6,
    Abort = 7,
}

/// Application Protocol Data Unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Apdu {
    ConfirmedRequest {
        segmented: bool,
        more_follows: bool,
        segmented_response_accepted: bool,
        max_segments: MaxSegments,
        max_response_size: MaxApduSize,
        invoke_id: u8,
        sequence_number: Option<u8>,
        proposed_window_size: Option<u8>,
        service_choice: u8,
        service_data: Vec<u8>,
    },

    UnconfirmedRequest {
        service_choice: u8,
        service_data: Vec<u8>,
    },

    SimpleAck {
        invoke_id: u8,
        service_choice: u8,
    },

    ComplexAck {
        segmented: bool,
        more_follows: bool,
        invoke_id: u8,
        sequence_number: Option<u8>,
        proposed_window_size: Option<u8>,
        service_choice: u8,
        service_data: Vec<u8>,
    },

    SegmentAck {
        negative: bool,
        server: bool,
        invoke_id: u8,
        sequence_number: u8,
        window_size: u8,
    },

    /// `error_data` is the application-tagged error-class/error-code pair
    /// (and any service-specific error parameters after it) exactly as
    /// received; BACnet encodes error-class/error-code as enumerated values
    /// of variable length, sometimes wrapped in a context-0 opening/closing
    /// tag pair, so a fixed-width field here would misparse them. See
    /// [`crate::service::BacnetError::decode`].
    Error {
        invoke_id: u8,
        service_choice: u8,
        error_data: Vec<u8>,
    },

    Reject {
        invoke_id: u8,
        reject_reason: u8,
    },

    Abort {
        server: bool,
        invoke_id: u8,
        abort_reason: u8,
    },
}

impl Apdu {
    /// The invoke-id carried by PDU types that have one (every type except
    /// `UnconfirmedRequest`).
    pub fn invoke_id(&self) -> Option<u8> {
        match self {
            Apdu::ConfirmedRequest { invoke_id, .. }
            | Apdu::SimpleAck { invoke_id, .. }
            | Apdu::ComplexAck { invoke_id, .. }
            | Apdu::SegmentAck { invoke_id, .. }
            | Apdu::Error { invoke_id, .. }
            | Apdu::Reject { invoke_id, .. }
            | Apdu::Abort { invoke_id, .. } => Some(*invoke_id),
            Apdu::UnconfirmedRequest { .. } => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::new();

        match self {
            Apdu::ConfirmedRequest {
                segmented,
                more_follows,
                segmented_response_accepted,
                max_segments,
                max_response_size,
                invoke_id,
                sequence_number,
                proposed_window_size,
                service_choice,
                service_data,
            } => {
                let mut pdu_type = (ApduType::ConfirmedRequest as u8) << 4;
                if *segmented {
                    pdu_type |= 0x08;
                }
                if *more_follows {
                    pdu_type |= 0x04;
                }
                if *segmented_response_accepted {
                    pdu_type |= 0x02;
                }
                buffer.push(pdu_type);

                let max_info = ((*max_segments as u8) << 4) | (*max_response_size as u8);
                buffer.push(max_info);
                buffer.push(*invoke_id);

                if *segmented {
                    if let Some(seq_num) = sequence_number {
                        buffer.push(*seq_num);
                    }
                    if let Some(window_size) = proposed_window_size {
                        buffer.push(*window_size);
                    }
                }

                buffer.push(*service_choice);
                buffer.extend_from_slice(service_data);
            }

            Apdu::UnconfirmedRequest {
                service_choice,
                service_data,
            } => {
                buffer.push((ApduType::UnconfirmedRequest as u8) << 4);
                buffer.push(*service_choice);
                buffer.extend_from_slice(service_data);
            }

            Apdu::SimpleAck {
                invoke_id,
                service_choice,
            } => {
                buffer.push((ApduType::SimpleAck as u8) << 4);
                buffer.push(*invoke_id);
                buffer.push(*service_choice);
            }

            Apdu::ComplexAck {
                segmented,
                more_follows,
                invoke_id,
                sequence_number,
                proposed_window_size,
                service_choice,
                service_data,
            } => {
                let mut pdu_type = (ApduType::ComplexAck as u8) << 4;
                if *segmented {
                    pdu_type |= 0x08;
                }
                if *more_follows {
                    pdu_type |= 0x04;
                }
                buffer.push(pdu_type);
                buffer.push(*invoke_id);

                if *segmented {
                    if let Some(seq_num) = sequence_number {
                        buffer.push(*seq_num);
                    }
                    if let Some(window_size) = proposed_window_size {
                        buffer.push(*window_size);
                    }
                }

                buffer.push(*service_choice);
                buffer.extend_from_slice(service_data);
            }

            Apdu::SegmentAck {
                negative,
                server,
                invoke_id,
                sequence_number,
                window_size,
            } => {
                let mut pdu_type = (ApduType::SegmentAck as u8) << 4;
                if *negative {
                    pdu_type |= 0x02;
                }
                if *server {
                    pdu_type |= 0x01;
                }
                buffer.push(pdu_type);
                buffer.push(*invoke_id);
                buffer.push(*sequence_number);
                buffer.push(*window_size);
            }

            Apdu::Error {
                invoke_id,
                service_choice,
                error_data,
            } => {
                buffer.push((ApduType::Error as u8) << 4);
                buffer.push(*invoke_id);
                buffer.push(*service_choice);
                buffer.extend_from_slice(error_data);
            }

            Apdu::Reject {
                invoke_id,
                reject_reason,
            } => {
                buffer.push((ApduType::Reject as u8) << 4);
                buffer.push(*invoke_id);
                buffer.push(*reject_reason);
            }

            Apdu::Abort {
                server,
                invoke_id,
                abort_reason,
            } => {
                let mut pdu_type = (ApduType::Abort as u8) << 4;
                if *server {
                    pdu_type |= 0x01;
                }
                buffer.push(pdu_type);
                buffer.push(*invoke_id);
                buffer.push(*abort_reason);
            }
        }

        buffer
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(ApplicationError::InvalidApdu("empty APDU".to_string()));
        }

        let pdu_type_byte = data[0];
        let pdu_type = match (pdu_type_byte >> 4) & 0x0F {
            0 => ApduType::ConfirmedRequest,
            1 => ApduType::UnconfirmedRequest,
            2 => ApduType::SimpleAck,
            3 => ApduType::ComplexAck,
            4 => ApduType::SegmentAck,
            5 => ApduType::Error,
            6 => ApduType::Reject,
            7 => ApduType::Abort,
            _ => return Err(ApplicationError::UnsupportedApduType),
        };

        match pdu_type {
            ApduType::ConfirmedRequest => {
                if data.len() < 4 {
                    return Err(ApplicationError::InvalidApdu("confirmed request too short".to_string()));
                }

                let segmented = (pdu_type_byte & 0x08) != 0;
                let more_follows = (pdu_type_byte & 0x04) != 0;
                let segmented_response_accepted = (pdu_type_byte & 0x02) != 0;

                let max_info = data[1];
                let max_segments = MaxSegments::from_nibble((max_info >> 4) & 0x07);
                let max_response_size = MaxApduSize::from_nibble(max_info & 0x0F);

                let invoke_id = data[2];
                let mut pos = 3;

                let (sequence_number, proposed_window_size) = if segmented {
                    let seq_num = data.get(pos).copied();
                    pos += 1;
                    let win_size = data.get(pos).copied();
                    pos += 1;
                    (seq_num, win_size)
                } else {
                    (None, None)
                };

                if pos >= data.len() {
                    return Err(ApplicationError::InvalidApdu("missing service choice".to_string()));
                }
                let service_choice = data[pos];
                pos += 1;
                let service_data = data.get(pos..).unwrap_or(&[]).to_vec();

                Ok(Apdu::ConfirmedRequest {
                    segmented,
                    more_follows,
                    segmented_response_accepted,
                    max_segments,
                    max_response_size,
                    invoke_id,
                    sequence_number,
                    proposed_window_size,
                    service_choice,
                    service_data,
                })
            }

            ApduType::UnconfirmedRequest => {
                if data.len() < 2 {
                    return Err(ApplicationError::InvalidApdu("unconfirmed request too short".to_string()));
                }
                let service_choice = data[1];
                let service_data = data.get(2..).unwrap_or(&[]).to_vec();
                Ok(Apdu::UnconfirmedRequest {
                    service_choice,
                    service_data,
                })
            }

            ApduType::SimpleAck => {
                if data.len() < 3 {
                    return Err(ApplicationError::InvalidApdu("SimpleAck too short".to_string()));
                }
                Ok(Apdu::SimpleAck {
                    invoke_id: data[1],
                    service_choice: data[2],
                })
            }

            ApduType::ComplexAck => {
                if data.len() < 3 {
                    return Err(ApplicationError::InvalidApdu("ComplexAck too short".to_string()));
                }

                let segmented = (pdu_type_byte & 0x08) != 0;
                let more_follows = (pdu_type_byte & 0x04) != 0;
                let invoke_id = data[1];
                let mut pos = 2;

                let (sequence_number, proposed_window_size) = if segmented {
                    let seq_num = data.get(pos).copied();
                    pos += 1;
                    let win_size = data.get(pos).copied();
                    pos += 1;
                    (seq_num, win_size)
                } else {
                    (None, None)
                };

                if pos >= data.len() {
                    return Err(ApplicationError::InvalidApdu("missing service choice".to_string()));
                }
                let service_choice = data[pos];
                pos += 1;
                let service_data = data.get(pos..).unwrap_or(&[]).to_vec();

                Ok(Apdu::ComplexAck {
                    segmented,
                    more_follows,
                    invoke_id,
                    sequence_number,
                    proposed_window_size,
                    service_choice,
                    service_data,
                })
            }

            ApduType::SegmentAck => {
                if data.len() < 4 {
                    return Err(ApplicationError::InvalidApdu("SegmentAck too short".to_string()));
                }
                Ok(Apdu::SegmentAck {
                    negative: (pdu_type_byte & 0x02) != 0,
                    server: (pdu_type_byte & 0x01) != 0,
                    invoke_id: data[1],
                    sequence_number: data[2],
                    window_size: data[3],
                })
            }

            ApduType::Error => {
                if data.len() < 3 {
                    return Err(ApplicationError::InvalidApdu("Error PDU too short".to_string()));
                }
                Ok(Apdu::Error {
                    invoke_id: data[1],
                    service_choice: data[2],
                    error_data: data[3..].to_vec(),
                })
            }

            ApduType::Reject => {
                if data.len() < 3 {
                    return Err(ApplicationError::InvalidApdu("Reject PDU too short".to_string()));
                }
                Ok(Apdu::Reject {
                    invoke_id: data[1],
                    reject_reason: data[2],
                })
            }

            ApduType::Abort => {
                if data.len() < 3 {
                    return Err(ApplicationError::InvalidApdu("Abort PDU too short".to_string()));
                }
                Ok(Apdu::Abort {
                    server: (pdu_type_byte & 0x01) != 0,
                    invoke_id: data[1],
                    abort_reason: data[2],
                })
            }
        }
    }
}

/// Maximum number of segments a sender can accept. This client always
/// encodes `Unspecified`; the variant set exists so received values decode
/// meaningfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MaxSegments {
    Unspecified = 0,
    Two = 1,
    Four = 2,
    Eight = 3,
    Sixteen = 4,
    ThirtyTwo = 5,
    SixtyFour = 6,
    GreaterThan64 = 7,
}

impl MaxSegments {
    fn from_nibble(nibble: u8) -> Self {
        match nibble {
            1 => MaxSegments::Two,
            2 => MaxSegments::Four,
            3 => MaxSegments::Eight,
            4 => MaxSegments::Sixteen,
            5 => MaxSegments::ThirtyTwo,
            6 => MaxSegments::SixtyFour,
            7 => MaxSegments::GreaterThan64,
            _ => MaxSegments::Unspecified,
        }
    }
}

/// Maximum APDU size a sender can accept, encoded in the low nibble of the
/// confirmed-request control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MaxApduSize {
    Up50 = 0,
    Up128 = 1,
    Up206 = 2,
    Up480 = 3,
    Up1024 = 4,
    Up1476 = 5,
}

impl MaxApduSize {
    pub fn size(&self) -> usize {
        match self {
            MaxApduSize::Up50 => 50,
            MaxApduSize::Up128 => 128,
            MaxApduSize::Up206 => 206,
            MaxApduSize::Up480 => 480,
            MaxApduSize::Up1024 => 1024,
            MaxApduSize::Up1476 => 1476,
        }
    }

    fn from_nibble(nibble: u8) -> Self {
        match nibble {
            0 => MaxApduSize::Up50,
            1 => MaxApduSize::Up128,
            2 => MaxApduSize::Up206,
            3 => MaxApduSize::Up480,
            4 => MaxApduSize::Up1024,
            5 => MaxApduSize::Up1476,
            _ => MaxApduSize::Up1476,
        }
    }
}

/// A bag of the 256 possible invoke-ids, implemented as a pre-filled
/// bounded channel: `acquire` blocks until an id is available, `release`
/// returns one. This mirrors a buffered channel pre-loaded with every byte
/// 0..=255, which blocks a sender once drained and never needs a separate
/// "is it already in use" check.
pub struct InvokeIdPool {
    tx: tokio::sync::mpsc::Sender<u8>,
    rx: tokio::sync::Mutex<tokio::sync::mpsc::Receiver<u8>>,
}

impl InvokeIdPool {
    pub fn new() -> Self {
        let (tx, rx) = tokio::sync::mpsc::channel(256);
        for id in 0..=255u8 {
            tx.try_send(id).expect("channel capacity matches id space");
        }
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Wait for an invoke-id to become available.
    pub async fn acquire(&self) -> u8 {
        let mut rx = self.rx.lock().await;
        rx.recv().await.expect("sender half kept alive by self.tx")
    }

    /// Return an invoke-id to the pool.
    pub async fn release(&self, id: u8) {
        let _ = self.tx.send(id).await;
    }
}

impl Default for InvokeIdPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmed_request_roundtrips() {
        let apdu = Apdu::ConfirmedRequest {
            segmented: false,
            more_follows: false,
            segmented_response_accepted: true,
            max_segments: MaxSegments::Unspecified,
            max_response_size: MaxApduSize::Up1476,
            invoke_id: 7,
            sequence_number: None,
            proposed_window_size: None,
            service_choice: 12,
            service_data: vec![0x0C, 0x02, 0x00, 0x00, 0x01],
        };
        let encoded = apdu.encode();
        let decoded = Apdu::decode(&encoded).unwrap();
        assert_eq!(decoded, apdu);
    }

    #[test]
    fn unconfirmed_request_roundtrips() {
        let apdu = Apdu::UnconfirmedRequest {
            service_choice: 8,
            service_data: vec![],
        };
        let encoded = apdu.encode();
        assert_eq!(encoded, vec![0x10, 0x08]);
        assert_eq!(Apdu::decode(&encoded).unwrap(), apdu);
    }

    #[test]
    fn error_pdu_roundtrips() {
        let apdu = Apdu::Error {
            invoke_id: 3,
            service_choice: 12,
            error_data: vec![0x91, 0x01, 0x91, 0x1F],
        };
        let encoded = apdu.encode();
        assert_eq!(Apdu::decode(&encoded).unwrap(), apdu);
    }

    #[test]
    fn max_apdu_size_table() {
        assert_eq!(MaxApduSize::Up1476.size(), 1476);
        assert_eq!(MaxApduSize::Up50.size(), 50);
    }

    #[tokio::test]
    async fn invoke_id_pool_exhausts_and_releases() {
        let pool = InvokeIdPool::new();
        let mut ids = Vec::new();
        for _ in 0..256 {
            ids.push(pool.acquire().await);
        }

        let acquire_more = tokio::time::timeout(std::time::Duration::from_millis(50), pool.acquire()).await;
        assert!(acquire_more.is_err(), "pool should be empty after taking all 256 ids");

        pool.release(ids[0]).await;
        let reacquired = tokio::time::timeout(std::time::Duration::from_millis(50), pool.acquire())
            .await
            .expect("id should be available again after release");
        assert_eq!(reacquired, ids[0]);
    }

    #[tokio::test]
    async fn invoke_id_pool_never_hands_out_duplicates_concurrently() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let pool = Arc::new(InvokeIdPool::new());
        let mut handles = Vec::new();
        for _ in 0..256 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.acquire().await }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            let id = handle.await.unwrap();
            assert!(seen.insert(id), "invoke id {} handed out twice", id);
        }
    }
}

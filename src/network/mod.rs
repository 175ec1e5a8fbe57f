//! BACnet Network Protocol Data Unit (NPDU).
//!
//! The NPDU sits between the data link (BVLC) header and the application
//! layer (APDU). Its control byte tells a reader which optional address
//! fields follow: a destination network address (and, only then, a hop
//! count), a source network address, whether this NPDU carries a network
//! layer message instead of an APDU, and the requested priority.
//!
//! Routing an NPDU across BACnet networks (resolving a destination network
//! number to a router, network-layer messages like Who-Is-Router) is out of
//! scope for this client — it only ever talks to devices on its own
//! broadcast domain, so `destination`/`source` addresses are carried for
//! wire fidelity but never resolved or forwarded.

pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    #[error("invalid NPDU: {0}")]
    InvalidNpdu(String),
}

/// NPDU control byte flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NpduControl {
    /// This NPDU carries a network layer message, not an APDU.
    pub network_message: bool,
    /// A destination network address follows the control byte.
    pub destination_present: bool,
    /// A source network address follows (after any destination).
    pub source_present: bool,
    /// Sender expects a reply (set on confirmed-service NPDUs).
    pub expecting_reply: bool,
    /// Network priority, 0 (normal) - 3 (life safety).
    pub priority: u8,
}

impl NpduControl {
    pub fn to_byte(&self) -> u8 {
        let mut byte = 0u8;
        if self.network_message {
            byte |= 0x80;
        }
        if self.destination_present {
            byte |= 0x20;
        }
        if self.source_present {
            byte |= 0x08;
        }
        if self.expecting_reply {
            byte |= 0x04;
        }
        byte |= self.priority & 0x03;
        byte
    }

    pub fn from_byte(byte: u8) -> Self {
        Self {
            network_message: (byte & 0x80) != 0,
            destination_present: (byte & 0x20) != 0,
            source_present: (byte & 0x08) != 0,
            expecting_reply: (byte & 0x04) != 0,
            priority: byte & 0x03,
        }
    }
}

/// A BACnet network-layer address: a network number plus a MAC address on
/// that network. The wire encoding is network number (u16 BE), an address
/// length byte, then that many address bytes — `len()` derives the length
/// byte from `adr` rather than storing it separately, so the two can't drift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub net: u16,
    pub adr: Vec<u8>,
}

impl Address {
    pub fn new(net: u16, adr: Vec<u8>) -> Self {
        Self { net, adr }
    }

    pub fn len(&self) -> u8 {
        self.adr.len() as u8
    }

    pub fn is_empty(&self) -> bool {
        self.adr.is_empty()
    }

    pub fn is_broadcast(&self) -> bool {
        self.net == 0xFFFF
    }

    pub fn is_local(&self) -> bool {
        self.net == 0
    }
}

/// Network Protocol Data Unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Npdu {
    pub version: u8,
    pub control: NpduControl,
    pub destination: Option<Address>,
    pub source: Option<Address>,
    /// Present if and only if `destination` is present.
    pub hop_count: Option<u8>,
}

impl Npdu {
    pub fn new() -> Self {
        Self {
            version: 1,
            control: NpduControl::default(),
            destination: None,
            source: None,
            hop_count: None,
        }
    }

    /// An NPDU addressed to the global broadcast network (0xFFFF), as used
    /// for Who-Is/I-Am discovery traffic.
    pub fn global_broadcast() -> Self {
        Self {
            version: 1,
            control: NpduControl {
                destination_present: true,
                ..Default::default()
            },
            destination: Some(Address::new(0xFFFF, Vec::new())),
            source: None,
            hop_count: Some(255),
        }
    }

    pub fn is_network_message(&self) -> bool {
        self.control.network_message
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.push(self.version);
        buffer.push(self.control.to_byte());

        if let Some(ref dest) = self.destination {
            buffer.extend_from_slice(&dest.net.to_be_bytes());
            buffer.push(dest.len());
            buffer.extend_from_slice(&dest.adr);
        }

        if let Some(ref src) = self.source {
            buffer.extend_from_slice(&src.net.to_be_bytes());
            buffer.push(src.len());
            buffer.extend_from_slice(&src.adr);
        }

        if self.destination.is_some() {
            buffer.push(self.hop_count.unwrap_or(255));
        }

        buffer
    }

    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 2 {
            return Err(NetworkError::InvalidNpdu("shorter than the fixed header".to_string()));
        }

        let version = data[0];
        if version != 1 {
            return Err(NetworkError::InvalidNpdu(format!("unsupported version {}", version)));
        }
        let control = NpduControl::from_byte(data[1]);
        let mut pos = 2;

        let decode_address = |data: &[u8], pos: &mut usize| -> Result<Address> {
            if *pos + 3 > data.len() {
                return Err(NetworkError::InvalidNpdu("truncated network address".to_string()));
            }
            let net = u16::from_be_bytes([data[*pos], data[*pos + 1]]);
            let addr_len = data[*pos + 2] as usize;
            *pos += 3;
            if *pos + addr_len > data.len() {
                return Err(NetworkError::InvalidNpdu("truncated network address bytes".to_string()));
            }
            let adr = data[*pos..*pos + addr_len].to_vec();
            *pos += addr_len;
            Ok(Address::new(net, adr))
        };

        let destination = if control.destination_present {
            Some(decode_address(data, &mut pos)?)
        } else {
            None
        };

        let source = if control.source_present {
            Some(decode_address(data, &mut pos)?)
        } else {
            None
        };

        let hop_count = if destination.is_some() {
            if pos >= data.len() {
                return Err(NetworkError::InvalidNpdu("missing hop count".to_string()));
            }
            let hc = data[pos];
            pos += 1;
            Some(hc)
        } else {
            None
        };

        Ok((
            Npdu {
                version,
                control,
                destination,
                source,
                hop_count,
            },
            pos,
        ))
    }
}

impl Default for Npdu {
    fn default() -> Self {
        Self::new()
    }
}

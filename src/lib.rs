#![doc = include_str!("../README.md")]

pub mod app;
pub mod client;
pub mod datalink;
pub mod encoding;
pub mod error;
pub mod network;
pub mod object;
pub mod service;

pub use client::{Client, ClientConfig, ClientConfigBuilder, Device, ReadPropertyReq, WritePropertyReq};
pub use encoding::{EncodingError, Value};
pub use error::{ClientError, Result};
pub use object::{ObjectIdentifier, ObjectType, PropertyIdentifier, Segmentation};
pub use service::{ConfirmedServiceChoice, ServiceError, UnconfirmedServiceChoice};

/// BACnet protocol version carried in every NPDU.
pub const BACNET_PROTOCOL_VERSION: u8 = 1;
/// Maximum APDU size this client ever advertises (`MaxApduSize::Up1476`).
pub const BACNET_MAX_APDU: usize = 1476;
/// Default BACnet/IP UDP port.
pub const BACNET_IP_PORT: u16 = datalink::bip::BACNET_IP_PORT;

#[cfg(test)]
mod tests {
    use crate::object::{ObjectIdentifier, ObjectType};

    #[test]
    fn object_identifier_round_trips_through_the_public_surface() {
        let obj_id = ObjectIdentifier::new(ObjectType::Device, 123);
        assert_eq!(obj_id.instance, 123);
        assert!(obj_id.is_valid());
    }

    #[test]
    fn crate_constants_match_the_protocol() {
        assert_eq!(crate::BACNET_PROTOCOL_VERSION, 1);
        assert_eq!(crate::BACNET_MAX_APDU, 1476);
        assert_eq!(crate::BACNET_IP_PORT, 47808);
    }
}

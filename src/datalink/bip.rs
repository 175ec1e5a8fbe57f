//! BACnet/IP (Annex J) framing and the UDP socket wrapper around it.
//!
//! BACnet/IP prefixes every NPDU with a 4-byte BVLC (BACnet Virtual Link
//! Control) header: a type byte (always 0x81), a function byte selecting
//! unicast vs. broadcast delivery, and a big-endian total-length field
//! covering the header itself. This client only emits and recognizes
//! Original-Unicast-NPDU and Original-Broadcast-NPDU; BBMD/foreign-device
//! functions are decoded (so an unexpected one doesn't look like garbage)
//! but otherwise ignored, since BBMD traffic forwarding is out of scope.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;

use crate::datalink::{DataLinkError, Result};

/// BACnet/IP well-known UDP port (0xBAC0).
pub const BACNET_IP_PORT: u16 = 47808;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BvlcFunction {
    ReadBroadcastDistributionTable = 0x02,
    ReadBroadcastDistributionTableAck = 0x03,
    ForwardedNpdu = 0x04,
    RegisterForeignDevice = 0x05,
    ReadForeignDeviceTable = 0x06,
    ReadForeignDeviceTableAck = 0x07,
    DeleteForeignDeviceTableEntry = 0x08,
    DistributeBroadcastToNetwork = 0x09,
    OriginalUnicastNpdu = 0x0A,
    OriginalBroadcastNpdu = 0x0B,
    ForwardedNpduFromDevice = 0x0C,
    SecureBvll = 0x0D,
}

impl BvlcFunction {
    fn from_byte(byte: u8) -> Result<Self> {
        Ok(match byte {
            0x02 => BvlcFunction::ReadBroadcastDistributionTable,
            0x03 => BvlcFunction::ReadBroadcastDistributionTableAck,
            0x04 => BvlcFunction::ForwardedNpdu,
            0x05 => BvlcFunction::RegisterForeignDevice,
            0x06 => BvlcFunction::ReadForeignDeviceTable,
            0x07 => BvlcFunction::ReadForeignDeviceTableAck,
            0x08 => BvlcFunction::DeleteForeignDeviceTableEntry,
            0x09 => BvlcFunction::DistributeBroadcastToNetwork,
            0x0A => BvlcFunction::OriginalUnicastNpdu,
            0x0B => BvlcFunction::OriginalBroadcastNpdu,
            0x0C => BvlcFunction::ForwardedNpduFromDevice,
            0x0D => BvlcFunction::SecureBvll,
            other => return Err(DataLinkError::invalid_frame(format!("unrecognized BVLC function 0x{:02X}", other))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BvlcHeader {
    pub function: BvlcFunction,
    /// Total frame length, header included.
    pub length: u16,
}

impl BvlcHeader {
    pub fn new(function: BvlcFunction, length: u16) -> Self {
        Self { function, length }
    }

    pub fn encode(&self) -> [u8; 4] {
        let len = self.length.to_be_bytes();
        [0x81, self.function as u8, len[0], len[1]]
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(DataLinkError::invalid_frame("shorter than the BVLC header"));
        }
        if data[0] != 0x81 {
            return Err(DataLinkError::invalid_frame(format!("bad BVLC type 0x{:02X}", data[0])));
        }
        let function = BvlcFunction::from_byte(data[1])?;
        let length = u16::from_be_bytes([data[2], data[3]]);
        Ok(BvlcHeader { function, length })
    }
}

/// A bound, broadcast-enabled BACnet/IP UDP socket.
///
/// Wraps a single [`tokio::net::UdpSocket`] this client uses for both
/// unicast confirmed requests and Who-Is/I-Am broadcast traffic — BACnet/IP
/// multiplexes everything onto one port.
pub struct BacnetIpSocket {
    socket: UdpSocket,
    local_addr: SocketAddr,
    broadcast_addr: SocketAddr,
}

impl BacnetIpSocket {
    /// Bind to `bind_addr` and compute the local broadcast address from
    /// `host_ip`/`netmask` (host address OR'd with the bitwise-NOT of the
    /// netmask), matching a standard IPv4 directed-broadcast calculation.
    /// Broadcasts always target `BACNET_IP_PORT`, regardless of which port
    /// this socket is bound to.
    pub async fn bind(bind_addr: SocketAddr, host_ip: Ipv4Addr, netmask: Ipv4Addr) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.set_broadcast(true)?;
        let local_addr = socket.local_addr()?;

        let host = u32::from(host_ip);
        let mask = u32::from(netmask);
        let broadcast_ip = Ipv4Addr::from(host | !mask);
        let broadcast_addr = SocketAddr::V4(SocketAddrV4::new(broadcast_ip, BACNET_IP_PORT));

        Ok(Self {
            socket,
            local_addr,
            broadcast_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn broadcast_addr(&self) -> SocketAddr {
        self.broadcast_addr
    }

    pub async fn send_unicast_npdu(&self, npdu: &[u8], dest: SocketAddr) -> Result<()> {
        self.send_framed(BvlcFunction::OriginalUnicastNpdu, npdu, dest).await
    }

    pub async fn send_broadcast_npdu(&self, npdu: &[u8]) -> Result<()> {
        let dest = self.broadcast_addr;
        self.send_framed(BvlcFunction::OriginalBroadcastNpdu, npdu, dest).await
    }

    async fn send_framed(&self, function: BvlcFunction, npdu: &[u8], dest: SocketAddr) -> Result<()> {
        let header = BvlcHeader::new(function, 4 + npdu.len() as u16);
        let mut frame = Vec::with_capacity(4 + npdu.len());
        frame.extend_from_slice(&header.encode());
        frame.extend_from_slice(npdu);
        self.socket.send_to(&frame, dest).await?;
        Ok(())
    }

    /// Receive one datagram, returning its NPDU payload and source address.
    /// BVLC functions other than Original-Unicast/Broadcast-NPDU decode
    /// successfully but return `Ok(None)` — there is no payload to hand up.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<(Option<(usize, SocketAddr)>, BvlcFunction)> {
        let (n, source) = self.socket.recv_from(buf).await?;
        let header = BvlcHeader::decode(&buf[..n])?;
        if header.length as usize != n {
            return Err(DataLinkError::invalid_frame(format!(
                "BVLC length {} does not match datagram size {}",
                header.length, n
            )));
        }

        match header.function {
            BvlcFunction::OriginalUnicastNpdu | BvlcFunction::OriginalBroadcastNpdu => {
                if n <= 4 {
                    return Err(DataLinkError::invalid_frame("BVLC frame carries no NPDU"));
                }
                buf.copy_within(4..n, 0);
                Ok((Some((n - 4, source)), header.function))
            }
            other => Ok((None, other)),
        }
    }
}

/// Compute a directed-broadcast address for the interface carrying `ip`
/// masked by `netmask`.
pub fn broadcast_address(ip: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) | !u32::from(netmask))
}

/// Resolve a bind target given as a bare IPv4 address, an interface name,
/// or a CIDR block, returning the host address and netmask to bind with.
/// A bare address (no interface enumeration needed) is tried first.
pub fn resolve_bind_interface(spec: &str) -> Result<(Ipv4Addr, Ipv4Addr)> {
    if let Ok(IpAddr::V4(ip)) = spec.parse::<IpAddr>() {
        return Ok((ip, Ipv4Addr::new(255, 255, 255, 0)));
    }

    let interfaces = if_addrs::get_if_addrs()
        .map_err(|e| DataLinkError::address_error(format!("enumerating interfaces: {}", e)))?;

    if let Some((network, prefix)) = spec.split_once('/') {
        let network: Ipv4Addr = network
            .parse()
            .map_err(|_| DataLinkError::address_error(format!("invalid CIDR network '{}'", network)))?;
        let prefix: u32 = prefix
            .parse()
            .map_err(|_| DataLinkError::address_error(format!("invalid CIDR prefix '{}'", prefix)))?;
        let mask = if prefix == 0 { 0 } else { !0u32 << (32 - prefix) };
        let network_bits = u32::from(network) & mask;

        for iface in &interfaces {
            if let IpAddr::V4(addr) = iface.ip() {
                if u32::from(addr) & mask == network_bits {
                    let netmask = match &iface.addr {
                        if_addrs::IfAddr::V4(v4) => v4.netmask,
                        _ => Ipv4Addr::from(mask),
                    };
                    return Ok((addr, netmask));
                }
            }
        }
        return Err(DataLinkError::address_error(format!("no interface matches CIDR {}", spec)));
    }

    for iface in &interfaces {
        if iface.name == spec {
            if let IpAddr::V4(addr) = iface.ip() {
                let netmask = match &iface.addr {
                    if_addrs::IfAddr::V4(v4) => v4.netmask,
                    _ => Ipv4Addr::new(255, 255, 255, 0),
                };
                return Ok((addr, netmask));
            }
        }
    }

    Err(DataLinkError::address_error(format!("no IPv4 address found for interface '{}'", spec)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bvlc_header_roundtrips() {
        let header = BvlcHeader::new(BvlcFunction::OriginalUnicastNpdu, 1024);
        let encoded = header.encode();
        assert_eq!(encoded, [0x81, 0x0A, 0x04, 0x00]);
        let decoded = BvlcHeader::decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn rejects_non_bacnet_ip_type_byte() {
        let data = [0x82, 0x0A, 0x00, 0x04];
        assert!(BvlcHeader::decode(&data).is_err());
    }

    #[test]
    fn directed_broadcast_matches_slash_24() {
        let ip = Ipv4Addr::new(192, 168, 1, 42);
        let mask = Ipv4Addr::new(255, 255, 255, 0);
        assert_eq!(broadcast_address(ip, mask), Ipv4Addr::new(192, 168, 1, 255));
    }

    #[tokio::test]
    async fn broadcast_targets_the_default_port_even_when_bound_elsewhere() {
        let socket = BacnetIpSocket::bind(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            Ipv4Addr::new(192, 168, 1, 42),
            Ipv4Addr::new(255, 255, 255, 0),
        )
        .await
        .unwrap();

        assert_ne!(socket.local_addr().port(), BACNET_IP_PORT);
        assert_eq!(socket.broadcast_addr().port(), BACNET_IP_PORT);
        assert_eq!(
            socket.broadcast_addr().ip(),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 255))
        );
    }

    #[tokio::test]
    async fn unicast_roundtrip_over_loopback() {
        let a = BacnetIpSocket::bind(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            Ipv4Addr::LOCALHOST,
            Ipv4Addr::new(255, 0, 0, 0),
        )
        .await
        .unwrap();
        let b = BacnetIpSocket::bind(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            Ipv4Addr::LOCALHOST,
            Ipv4Addr::new(255, 0, 0, 0),
        )
        .await
        .unwrap();

        a.send_unicast_npdu(&[1, 2, 3], b.local_addr()).await.unwrap();

        let mut buf = [0u8; 1500];
        let (result, function) = b.recv(&mut buf).await.unwrap();
        assert_eq!(function, BvlcFunction::OriginalUnicastNpdu);
        let (len, source) = result.unwrap();
        assert_eq!(&buf[..len], &[1, 2, 3]);
        assert_eq!(source, a.local_addr());
    }
}

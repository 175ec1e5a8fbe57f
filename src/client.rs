//! High-level BACnet client: discovery and property access.
//!
//! This is the composition point for the layers below it: it owns the UDP
//! socket, the invoke-id pool, the transaction registry, and the
//! broadcast-subscriber list, and exposes `who_is`, `read_property`, and
//! `write_property` as the three operations an application actually calls.
//! A background task drives the receive loop for the lifetime of the
//! `Client`; it is aborted when the `Client` drops.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use crate::app::{Apdu, InvokeIdPool, MaxApduSize, MaxSegments};
use crate::datalink::bip::{resolve_bind_interface, BacnetIpSocket, BACNET_IP_PORT};
use crate::error::{ClientError, Result};
use crate::network::Npdu;
use crate::object::{ObjectIdentifier, ObjectType, Segmentation};
use crate::service::{
    BacnetError, ConfirmedServiceChoice, IAmRequest, ReadPropertyRequest, ReadPropertyResponse,
    UnconfirmedServiceChoice, WhoIsRequest, WritePropertyRequest,
};

/// A device discovered by `Client::who_is`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Device {
    pub object_id: ObjectIdentifier,
    pub address: SocketAddr,
    pub max_apdu: u32,
    pub segmentation: u32,
    pub vendor_id: u32,
}

impl Device {
    /// Best-effort decode of `segmentation` into the named enum; devices
    /// advertising an out-of-range value are still reachable, so this
    /// never blocks discovery on a malformed I-Am.
    pub fn segmentation(&self) -> Option<Segmentation> {
        Segmentation::try_from(self.segmentation).ok()
    }
}

/// Read/write request shapes mirroring the wire-level service messages,
/// minus the bits the client fills in itself (invoke-id, object encoding).
#[derive(Debug, Clone)]
pub struct ReadPropertyReq {
    pub object_id: ObjectIdentifier,
    pub property_id: u32,
    pub array_index: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct WritePropertyReq {
    pub object_id: ObjectIdentifier,
    pub property_id: u32,
    pub array_index: Option<u32>,
    pub value: Vec<u8>,
    pub priority: Option<u8>,
}

/// Client construction parameters.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bare IPv4 address, interface name, or CIDR block to bind on.
    pub interface: String,
    /// UDP port to bind and to broadcast to. `0` means the default
    /// BACnet/IP port (47808).
    pub port: u16,
    pub default_request_timeout: Duration,
    pub receive_buffer_size: usize,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    fn resolved_port(&self) -> u16 {
        if self.port == 0 {
            BACNET_IP_PORT
        } else {
            self.port
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            interface: "0.0.0.0".to_string(),
            port: BACNET_IP_PORT,
            default_request_timeout: Duration::from_secs(3),
            receive_buffer_size: 2048,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    interface: Option<String>,
    port: Option<u16>,
    default_request_timeout: Option<Duration>,
    receive_buffer_size: Option<usize>,
}

impl ClientConfigBuilder {
    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn default_request_timeout(mut self, timeout: Duration) -> Self {
        self.default_request_timeout = Some(timeout);
        self
    }

    pub fn receive_buffer_size(mut self, size: usize) -> Self {
        self.receive_buffer_size = Some(size);
        self
    }

    pub fn build(self) -> ClientConfig {
        let default = ClientConfig::default();
        ClientConfig {
            interface: self.interface.unwrap_or(default.interface),
            port: self.port.unwrap_or(default.port),
            default_request_timeout: self.default_request_timeout.unwrap_or(default.default_request_timeout),
            receive_buffer_size: self.receive_buffer_size.unwrap_or(default.receive_buffer_size),
        }
    }
}

/// Maps an invoke-id to the caller waiting on it. Delivery is one-shot; a
/// reply for an invoke-id nobody is waiting for (already timed out, already
/// delivered) is logged and dropped.
#[derive(Default)]
struct TransactionRegistry {
    current: Mutex<HashMap<u8, oneshot::Sender<Apdu>>>,
}

impl TransactionRegistry {
    async fn register(&self, id: u8, slot: oneshot::Sender<Apdu>) {
        self.current.lock().await.insert(id, slot);
    }

    async fn deliver(&self, id: u8, apdu: Apdu) {
        let slot = self.current.lock().await.remove(&id);
        match slot {
            Some(slot) => {
                let _ = slot.send(apdu);
            }
            None => {
                log::warn!("dropping reply for unknown invoke-id {}", id);
            }
        }
    }

    async fn unregister(&self, id: u8) {
        self.current.lock().await.remove(&id);
    }
}

/// Every live `who_is` call gets its own subscriber entry; every incoming
/// I-Am is fanned out to all of them. No subscription ever overwrites
/// another's.
#[derive(Default)]
struct BroadcastHub {
    subscribers: Mutex<Vec<mpsc::Sender<(IAmRequest, SocketAddr)>>>,
}

impl BroadcastHub {
    async fn subscribe(&self) -> mpsc::Receiver<(IAmRequest, SocketAddr)> {
        let (tx, rx) = mpsc::channel(64);
        self.subscribers.lock().await.push(tx);
        rx
    }

    async fn publish(&self, iam: IAmRequest, source: SocketAddr) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|tx| tx.try_send((iam.clone(), source)).is_ok());
    }
}

/// BACnet/IP client: discovery plus confirmed `ReadProperty`/`WriteProperty`.
pub struct Client {
    socket: Arc<BacnetIpSocket>,
    invoke_ids: InvokeIdPool,
    transactions: Arc<TransactionRegistry>,
    broadcasts: Arc<BroadcastHub>,
    default_timeout: Duration,
    receive_loop: AbortHandle,
}

impl Client {
    /// Bind the socket, resolve the broadcast address, and spawn the
    /// receive loop.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let (host_ip, netmask) = resolve_bind_interface(&config.interface)?;
        let port = config.resolved_port();
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let socket = Arc::new(BacnetIpSocket::bind(bind_addr, host_ip, netmask).await?);

        let transactions = Arc::new(TransactionRegistry::default());
        let broadcasts = Arc::new(BroadcastHub::default());

        let receive_loop = tokio::spawn(receive_loop(
            socket.clone(),
            transactions.clone(),
            broadcasts.clone(),
            config.receive_buffer_size,
        ))
        .abort_handle();

        Ok(Self {
            socket,
            invoke_ids: InvokeIdPool::new(),
            transactions,
            broadcasts,
            default_timeout: config.default_request_timeout,
            receive_loop,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    /// Broadcast a Who-Is, collect I-Am replies for `timeout`, deduplicate,
    /// and return them. Never fails on zero replies.
    pub async fn who_is(&self, range: Option<(u32, u32)>, timeout: Duration) -> Result<Vec<Device>> {
        let request = match range {
            Some((low, high)) => WhoIsRequest::for_range(low, high),
            None => WhoIsRequest::new(),
        };

        let mut service_data = Vec::new();
        request
            .encode(&mut service_data)
            .map_err(|e| ClientError::InvalidArgument(e.to_string()))?;

        let mut rx = self.broadcasts.subscribe().await;

        let npdu = Npdu::global_broadcast();
        let mut frame = npdu.encode();
        frame.extend_from_slice(
            &Apdu::UnconfirmedRequest {
                service_choice: UnconfirmedServiceChoice::WhoIs as u8,
                service_data,
            }
            .encode(),
        );
        self.socket.send_broadcast_npdu(&frame).await?;

        let mut seen = std::collections::HashSet::new();
        let mut devices = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Some((iam, source))) => {
                    let device = Device {
                        object_id: iam.device_identifier,
                        address: source,
                        max_apdu: iam.max_apdu_length_accepted,
                        segmentation: iam.segmentation_supported,
                        vendor_id: iam.vendor_identifier,
                    };
                    let key = (device.object_id, device.max_apdu, device.segmentation, device.vendor_id);
                    if seen.insert(key) {
                        devices.push(device);
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }

        Ok(devices)
    }

    /// Send a confirmed `ReadProperty` request and wait for its `ComplexAck`.
    pub async fn read_property(
        &self,
        cancel: &CancellationToken,
        device: &Device,
        req: ReadPropertyReq,
    ) -> Result<crate::encoding::Value> {
        let request = match req.array_index {
            Some(idx) => ReadPropertyRequest::with_array_index(req.object_id, req.property_id, idx),
            None => ReadPropertyRequest::new(req.object_id, req.property_id),
        };
        let mut service_data = Vec::new();
        request
            .encode(&mut service_data)
            .map_err(|e| ClientError::InvalidArgument(e.to_string()))?;

        let reply = self
            .confirmed_request(cancel, device.address, ConfirmedServiceChoice::ReadProperty, service_data)
            .await?;

        let response = ReadPropertyResponse::decode(&reply).map_err(|e| ClientError::Malformed(e.to_string()))?;
        let (value, _) = crate::encoding::decode_application_value(&response.property_value)?;
        Ok(value)
    }

    /// Send a confirmed `WriteProperty` request and wait for its `SimpleAck`.
    pub async fn write_property(&self, cancel: &CancellationToken, device: &Device, req: WritePropertyReq) -> Result<()> {
        let request = match (req.array_index, req.priority) {
            (Some(idx), _) => WritePropertyRequest::with_array_index(req.object_id, req.property_id, idx, req.value),
            (None, Some(priority)) => {
                WritePropertyRequest::with_priority(req.object_id, req.property_id, req.value, priority)
            }
            (None, None) => WritePropertyRequest::new(req.object_id, req.property_id, req.value),
        };
        let mut service_data = Vec::new();
        request
            .encode(&mut service_data)
            .map_err(|e| ClientError::InvalidArgument(e.to_string()))?;

        self.confirmed_request(cancel, device.address, ConfirmedServiceChoice::WriteProperty, service_data)
            .await?;
        Ok(())
    }

    /// Allocate an invoke-id, register a reply slot, send, and wait for
    /// either a matching reply, cancellation, or the default timeout. The
    /// invoke-id is always returned to the pool, on every exit path.
    async fn confirmed_request(
        &self,
        cancel: &CancellationToken,
        target: SocketAddr,
        service_choice: ConfirmedServiceChoice,
        service_data: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let invoke_id = self.invoke_ids.acquire().await;
        let (tx, rx) = oneshot::channel();
        self.transactions.register(invoke_id, tx).await;

        let result = self
            .send_and_wait(cancel, target, invoke_id, service_choice, service_data, rx)
            .await;

        self.transactions.unregister(invoke_id).await;
        self.invoke_ids.release(invoke_id).await;
        result
    }

    async fn send_and_wait(
        &self,
        cancel: &CancellationToken,
        target: SocketAddr,
        invoke_id: u8,
        service_choice: ConfirmedServiceChoice,
        service_data: Vec<u8>,
        rx: oneshot::Receiver<Apdu>,
    ) -> Result<Vec<u8>> {
        let mut npdu = Npdu::new();
        npdu.control.expecting_reply = true;
        let mut frame = npdu.encode();
        frame.extend_from_slice(
            &Apdu::ConfirmedRequest {
                segmented: false,
                more_follows: false,
                segmented_response_accepted: true,
                max_segments: MaxSegments::Unspecified,
                max_response_size: MaxApduSize::Up1476,
                invoke_id,
                sequence_number: None,
                proposed_window_size: None,
                service_choice: service_choice as u8,
                service_data,
            }
            .encode(),
        );
        self.socket.send_unicast_npdu(&frame, target).await?;

        tokio::select! {
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            _ = tokio::time::sleep(self.default_timeout) => Err(ClientError::Timeout),
            reply = rx => {
                let apdu = reply.map_err(|_| ClientError::Timeout)?;
                match apdu {
                    Apdu::ComplexAck { service_data, .. } => Ok(service_data),
                    Apdu::SimpleAck { .. } => Ok(Vec::new()),
                    Apdu::Error { error_data, .. } => {
                        let error = BacnetError::decode(&error_data)?;
                        Err(ClientError::ApduError {
                            class: error.error_class,
                            code: error.error_code,
                        })
                    }
                    Apdu::Reject { reject_reason, .. } => {
                        Err(ClientError::Malformed(format!("request rejected: reason {}", reject_reason)))
                    }
                    Apdu::Abort { abort_reason, .. } => {
                        Err(ClientError::Malformed(format!("request aborted: reason {}", abort_reason)))
                    }
                    other => Err(ClientError::Malformed(format!("unexpected reply PDU: {:?}", other))),
                }
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.receive_loop.abort();
    }
}

/// Background task: loop `recv`, parse BVLC/NPDU/APDU, and route to either
/// the transaction registry or the broadcast hub. Every failure here is
/// logged and the packet dropped — a malformed or unexpected frame must
/// never take the loop down.
async fn receive_loop(
    socket: Arc<BacnetIpSocket>,
    transactions: Arc<TransactionRegistry>,
    broadcasts: Arc<BroadcastHub>,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size];
    loop {
        let (result, function) = match socket.recv(&mut buf).await {
            Ok(result) => result,
            Err(e) => {
                log::warn!("datalink receive error: {}", e);
                continue;
            }
        };

        let (len, source) = match result {
            Some(payload) => payload,
            None => {
                log::trace!("ignoring BVLC function {:?} with no NPDU payload", function);
                continue;
            }
        };

        handle_datagram(&buf[..len], source, &transactions, &broadcasts).await;
    }
}

async fn handle_datagram(data: &[u8], source: SocketAddr, transactions: &TransactionRegistry, broadcasts: &BroadcastHub) {
    let (npdu, npdu_len) = match Npdu::decode(data) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::warn!("dropping frame from {}: bad NPDU: {}", source, e);
            return;
        }
    };

    if npdu.is_network_message() {
        log::trace!("dropping network-layer message from {}", source);
        return;
    }

    let apdu = match Apdu::decode(&data[npdu_len..]) {
        Ok(apdu) => apdu,
        Err(e) => {
            log::warn!("dropping frame from {}: bad APDU: {}", source, e);
            return;
        }
    };

    match apdu {
        Apdu::UnconfirmedRequest {
            service_choice,
            service_data,
        } if service_choice == UnconfirmedServiceChoice::IAm as u8 => match IAmRequest::decode(&service_data) {
            Ok(iam) => broadcasts.publish(iam, source).await,
            Err(e) => log::warn!("dropping malformed I-Am from {}: {}", source, e),
        },

        Apdu::UnconfirmedRequest { .. } => {
            log::trace!("ignoring unconfirmed service from {}", source);
        }

        Apdu::ComplexAck { invoke_id, .. }
        | Apdu::SimpleAck { invoke_id, .. }
        | Apdu::Error { invoke_id, .. }
        | Apdu::Reject { invoke_id, .. }
        | Apdu::Abort { invoke_id, .. } => {
            transactions.deliver(invoke_id, apdu).await;
        }

        Apdu::SegmentAck { .. } => {
            log::trace!("dropping SegmentAck from {} (segmentation unsupported)", source);
        }

        Apdu::ConfirmedRequest { .. } => {
            log::trace!("dropping confirmed request from {} (this client never serves requests)", source);
        }
    }
}

#[allow(dead_code)]
fn object_type_name(object_type: ObjectType) -> &'static str {
    match object_type {
        ObjectType::Device => "Device",
        ObjectType::AnalogInput => "Analog Input",
        ObjectType::AnalogOutput => "Analog Output",
        ObjectType::AnalogValue => "Analog Value",
        ObjectType::BinaryInput => "Binary Input",
        ObjectType::BinaryOutput => "Binary Output",
        ObjectType::BinaryValue => "Binary Value",
        ObjectType::MultiStateInput => "Multi-State Input",
        ObjectType::MultiStateOutput => "Multi-State Output",
        ObjectType::MultiStateValue => "Multi-State Value",
        ObjectType::Calendar => "Calendar",
        ObjectType::Command => "Command",
        ObjectType::EventEnrollment => "Event Enrollment",
        ObjectType::File => "File",
        ObjectType::Group => "Group",
        ObjectType::Loop => "Loop",
        ObjectType::NotificationClass => "Notification Class",
        ObjectType::Program => "Program",
        ObjectType::Schedule => "Schedule",
        ObjectType::Averaging => "Averaging",
        ObjectType::TrendLog => "Trend Log",
        ObjectType::LifeSafetyPoint => "Life Safety Point",
        ObjectType::LifeSafetyZone => "Life Safety Zone",
        ObjectType::Accumulator => "Accumulator",
        ObjectType::PulseConverter => "Pulse Converter",
        ObjectType::EventLog => "Event Log",
        ObjectType::GlobalGroup => "Global Group",
        ObjectType::TrendLogMultiple => "Trend Log Multiple",
        ObjectType::LoadControl => "Load Control",
        ObjectType::StructuredView => "Structured View",
        ObjectType::AccessDoor => "Access Door",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Value;
    use crate::service::ConfirmedServiceChoice as Choice;
    use tokio::net::UdpSocket;

    fn loopback_config(port_hint: u16) -> ClientConfig {
        ClientConfig {
            interface: "127.0.0.1".to_string(),
            port: port_hint,
            default_request_timeout: Duration::from_millis(500),
            receive_buffer_size: 2048,
        }
    }

    #[tokio::test]
    async fn client_binds_and_reports_local_addr() {
        let client = Client::new(loopback_config(0)).await.unwrap();
        assert!(client.local_addr().ip().is_loopback());
    }

    /// Same check driven through a plain `#[test]`, for code paths that
    /// build a client outside of an already-running `#[tokio::test]`
    /// harness (a synchronous `main`, a non-async test helper).
    #[test]
    fn client_binds_via_block_on() {
        let client = tokio_test::block_on(Client::new(loopback_config(0))).unwrap();
        assert!(client.local_addr().ip().is_loopback());
    }

    #[tokio::test]
    async fn who_is_times_out_with_no_replies() {
        let client = Client::new(loopback_config(0)).await.unwrap();
        let devices = client.who_is(None, Duration::from_millis(50)).await.unwrap();
        assert!(devices.is_empty());
    }

    #[tokio::test]
    async fn read_property_reflects_off_a_raw_socket_and_decodes_the_value() {
        let client = Client::new(loopback_config(0)).await.unwrap();

        let reflector = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let reflector_addr = reflector.local_addr().unwrap();

        let device = Device {
            object_id: ObjectIdentifier::new(ObjectType::Device, 1),
            address: reflector_addr,
            max_apdu: 1476,
            segmentation: 3,
            vendor_id: 0,
        };

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            let (n, from) = reflector.recv_from(&mut buf).await.unwrap();
            let (_npdu, npdu_len) = Npdu::decode(&buf[4..n]).unwrap();
            let apdu = Apdu::decode(&buf[4 + npdu_len..n]).unwrap();
            let invoke_id = apdu.invoke_id().unwrap();

            let mut value_bytes = Vec::new();
            crate::encoding::encode_real(&mut value_bytes, 21.5).unwrap();

            let response =
                ReadPropertyResponse::new(ObjectIdentifier::new(ObjectType::AnalogInput, 1), 85, value_bytes);
            let mut service_data = Vec::new();
            response.encode(&mut service_data).unwrap();

            let reply_npdu = Npdu::new().encode();
            let reply_apdu = Apdu::ComplexAck {
                segmented: false,
                more_follows: false,
                invoke_id,
                sequence_number: None,
                proposed_window_size: None,
                service_choice: Choice::ReadProperty as u8,
                service_data,
            }
            .encode();

            let mut npdu_and_apdu = reply_npdu;
            npdu_and_apdu.extend_from_slice(&reply_apdu);
            let mut frame = vec![0x81, 0x0A, 0, 0];
            let total_len = (4 + npdu_and_apdu.len()) as u16;
            frame[2..4].copy_from_slice(&total_len.to_be_bytes());
            frame.extend_from_slice(&npdu_and_apdu);

            reflector.send_to(&frame, from).await.unwrap();
        });

        let cancel = CancellationToken::new();
        let value = client
            .read_property(
                &cancel,
                &device,
                ReadPropertyReq {
                    object_id: ObjectIdentifier::new(ObjectType::AnalogInput, 1),
                    property_id: 85,
                    array_index: None,
                },
            )
            .await
            .unwrap();

        responder.await.unwrap();
        assert!(matches!(value, Value::Real(v) if (v - 21.5).abs() < 0.001));
    }

    #[tokio::test]
    async fn read_property_times_out_against_a_silent_peer() {
        let client = Client::new(loopback_config(0)).await.unwrap();
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let device = Device {
            object_id: ObjectIdentifier::new(ObjectType::Device, 2),
            address: silent.local_addr().unwrap(),
            max_apdu: 1476,
            segmentation: 3,
            vendor_id: 0,
        };

        let cancel = CancellationToken::new();
        let result = client
            .read_property(
                &cancel,
                &device,
                ReadPropertyReq {
                    object_id: ObjectIdentifier::new(ObjectType::AnalogInput, 1),
                    property_id: 85,
                    array_index: None,
                },
            )
            .await;

        assert!(matches!(result, Err(ClientError::Timeout)));
    }

    #[tokio::test]
    async fn read_property_returns_cancelled_when_token_fires_first() {
        let client = Client::new(loopback_config(0)).await.unwrap();
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let device = Device {
            object_id: ObjectIdentifier::new(ObjectType::Device, 3),
            address: silent.local_addr().unwrap(),
            max_apdu: 1476,
            segmentation: 3,
            vendor_id: 0,
        };

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = client
            .read_property(
                &cancel,
                &device,
                ReadPropertyReq {
                    object_id: ObjectIdentifier::new(ObjectType::AnalogInput, 1),
                    property_id: 85,
                    array_index: None,
                },
            )
            .await;

        assert!(matches!(result, Err(ClientError::Cancelled)));
    }

    #[test]
    fn object_type_names() {
        assert_eq!(object_type_name(ObjectType::AnalogInput), "Analog Input");
        assert_eq!(object_type_name(ObjectType::Device), "Device");
    }

    #[test]
    fn client_config_builder_fills_defaults() {
        let config = ClientConfig::builder().interface("eth0").build();
        assert_eq!(config.interface, "eth0");
        assert_eq!(config.port, BACNET_IP_PORT);
        assert_eq!(config.default_request_timeout, Duration::from_secs(3));
    }

    /// 256 simultaneous `read_property` calls each get their own invoke-id,
    /// each reply is correlated back to the right caller, and the pool is
    /// exactly full again once every call has returned (no invoke-id
    /// leaked, none double-allocated).
    #[tokio::test]
    async fn two_hundred_fifty_six_concurrent_reads_are_each_correctly_correlated() {
        let client = Arc::new(Client::new(loopback_config(0)).await.unwrap());

        let reflector = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let reflector_addr = reflector.local_addr().unwrap();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            for _ in 0..256u32 {
                let (n, from) = reflector.recv_from(&mut buf).await.unwrap();
                let (_npdu, npdu_len) = Npdu::decode(&buf[4..n]).unwrap();
                let apdu = Apdu::decode(&buf[4 + npdu_len..n]).unwrap();
                let invoke_id = apdu.invoke_id().unwrap();

                let instance = match apdu {
                    Apdu::ConfirmedRequest { service_data, .. } => {
                        let request = ReadPropertyRequest::decode(&service_data).unwrap();
                        request.object_identifier.instance
                    }
                    _ => panic!("expected a confirmed request"),
                };

                let mut value_bytes = Vec::new();
                crate::encoding::encode_unsigned(&mut value_bytes, instance).unwrap();
                let response =
                    ReadPropertyResponse::new(ObjectIdentifier::new(ObjectType::AnalogInput, instance), 85, value_bytes);
                let mut service_data = Vec::new();
                response.encode(&mut service_data).unwrap();

                let reply_apdu = Apdu::ComplexAck {
                    segmented: false,
                    more_follows: false,
                    invoke_id,
                    sequence_number: None,
                    proposed_window_size: None,
                    service_choice: Choice::ReadProperty as u8,
                    service_data,
                }
                .encode();

                let mut npdu_and_apdu = Npdu::new().encode();
                npdu_and_apdu.extend_from_slice(&reply_apdu);
                let mut frame = vec![0x81, 0x0A, 0, 0];
                let total_len = (4 + npdu_and_apdu.len()) as u16;
                frame[2..4].copy_from_slice(&total_len.to_be_bytes());
                frame.extend_from_slice(&npdu_and_apdu);

                reflector.send_to(&frame, from).await.unwrap();
            }
        });

        let device = Device {
            object_id: ObjectIdentifier::new(ObjectType::Device, 1),
            address: reflector_addr,
            max_apdu: 1476,
            segmentation: 3,
            vendor_id: 0,
        };

        let calls = (0..256u32).map(|instance| {
            let client = client.clone();
            let device = device;
            async move {
                let cancel = CancellationToken::new();
                let value = client
                    .read_property(
                        &cancel,
                        &device,
                        ReadPropertyReq {
                            object_id: ObjectIdentifier::new(ObjectType::AnalogInput, instance),
                            property_id: 85,
                            array_index: None,
                        },
                    )
                    .await
                    .unwrap();
                (instance, value)
            }
        });

        let results = join_all(calls).await;
        responder.await.unwrap();

        for (instance, value) in results {
            assert!(matches!(value, Value::Unsigned(v) if v == instance));
        }

        // every invoke-id returned to the pool: acquiring all 256 again must
        // not block.
        let mut reacquired = Vec::with_capacity(256);
        for _ in 0..256u32 {
            let id = tokio::time::timeout(Duration::from_millis(200), client.invoke_ids.acquire())
                .await
                .expect("invoke-id pool did not refill after 256 round trips");
            reacquired.push(id);
        }
        reacquired.sort_unstable();
        reacquired.dedup();
        assert_eq!(reacquired.len(), 256, "each invoke-id must be distinct");
    }

    /// Stands in for `futures::future::join_all`: spawn every future and
    /// collect results in submission order.
    async fn join_all<I, F, T>(iter: I) -> Vec<T>
    where
        I: IntoIterator<Item = F>,
        F: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handles: Vec<_> = iter.into_iter().map(tokio::spawn).collect();
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        results
    }
}

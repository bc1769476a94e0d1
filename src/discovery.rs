//! UDP broadcast discovery.
//! Sends one probe to the broadcast address and classifies every reply that
//! arrives before the receive timeout.

use crate::crypto;
use crate::device::{Device, DeviceCore, DeviceFamily};
use crate::diagnostics::{DiagnosticSink, default_sink};
use crate::error::{Result, SmartHomeError};
use crate::protocol::{self, CMD_GET_SYSINFO, DEFAULT_PORT, NS_SYSTEM};
use crate::query::{TcpTransport, Transport};
use serde_json::Value;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::time::{Duration, timeout};

const RECV_BUFFER_LEN: usize = 4096;

/// Addresses mapped to the device found there.
pub type DiscoveryResult = HashMap<Ipv4Addr, Device>;

/// Discover finds Smart Home devices on the local network.
pub struct Discover {
    /// How long to wait for each reply before giving up
    pub timeout: Duration,
    /// UDP port the probe is sent to
    pub port: u16,
    /// Where the probe is sent; the limited broadcast address by default
    pub target: IpAddr,
    transport: Option<Arc<dyn Transport>>,
    sink: Arc<dyn DiagnosticSink>,
}

impl Default for Discover {
    fn default() -> Self {
        Self::new()
    }
}

impl Discover {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            port: DEFAULT_PORT,
            target: IpAddr::V4(Ipv4Addr::BROADCAST),
            transport: None,
            sink: default_sink(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_target(mut self, target: IpAddr) -> Self {
        self.target = target;
        self
    }

    /// Transport handed to every discovered device. Without one, devices get
    /// a [`TcpTransport`] reporting to this discovery's sink.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    fn device_transport(&self) -> Arc<dyn Transport> {
        match &self.transport {
            Some(transport) => transport.clone(),
            None => Arc::new(TcpTransport::new().with_sink(self.sink.clone())),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Create an unconnected UDP socket allowed to broadcast.
    fn create_socket(&self) -> Result<UdpSocket> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        if let Err(e) = socket.set_reuse_address(true) {
            self.sink.warn(&format!("Failed to set reuse_address: {}", e));
        }
        socket.set_broadcast(true)?;
        socket.bind(&SockAddr::from(addr))?;
        socket.set_nonblocking(true)?;

        let std_socket: std::net::UdpSocket = socket.into();
        Ok(UdpSocket::from_std(std_socket)?)
    }

    /// Broadcast once and collect replies until a receive times out.
    ///
    /// Unclassifiable replies are reported to the sink and skipped. Socket
    /// failures abort the call.
    pub async fn discover(&self) -> Result<DiscoveryResult> {
        let socket = self.create_socket()?;
        let target = SocketAddr::new(self.target, self.port);

        let probe = serde_json::to_vec(&protocol::discovery_request())?;
        self.sink.debug(&format!("Sending discovery to {}", target));
        socket.send_to(&crypto::encrypt(&probe), target).await?;

        let transport = self.device_transport();
        let mut devices = DiscoveryResult::new();
        let mut buf = vec![0u8; RECV_BUFFER_LEN];
        self.sink
            .debug(&format!("Waiting {:?} for responses...", self.timeout));

        loop {
            let (len, addr) = match timeout(self.timeout, socket.recv_from(&mut buf)).await {
                Ok(res) => res?,
                Err(_) => {
                    self.sink.debug("Receive timed out, discovery finished");
                    break;
                }
            };

            let IpAddr::V4(ip) = addr.ip() else {
                self.sink.debug(&format!("Ignoring reply from non-IPv4 {}", addr));
                continue;
            };

            match parse_reply(&buf[..len]) {
                Ok(family) => {
                    self.sink.debug(&format!("Found {:?} at {}", family, ip));
                    let core = DeviceCore::new(
                        &ip.to_string(),
                        family.emeter(),
                        transport.clone(),
                    )?
                    .with_sink(self.sink.clone());
                    devices.insert(ip, Device::from_core(family, core));
                }
                Err(e) => self
                    .sink
                    .error(&format!("Skipping reply from {}: {}", addr, e)),
            }
        }

        Ok(devices)
    }
}

/// Decode a discovery datagram and classify the sender.
///
/// Datagrams carry the obfuscated payload without a length prefix.
pub fn parse_reply(data: &[u8]) -> Result<DeviceFamily> {
    let info: Value = serde_json::from_slice(&crypto::decrypt(data))?;
    classify(&info)
}

/// Classify a decoded discovery reply by its declared device type.
pub fn classify(info: &Value) -> Result<DeviceFamily> {
    let sysinfo = info
        .get(NS_SYSTEM)
        .and_then(|s| s.get(CMD_GET_SYSINFO))
        .ok_or_else(|| {
            SmartHomeError::InvalidPayload("No 'system' nor 'get_sysinfo' in response".into())
        })?;

    let device_type = sysinfo
        .get("type")
        .or_else(|| sysinfo.get("mic_type"))
        .and_then(Value::as_str)
        .ok_or_else(|| SmartHomeError::InvalidPayload("Unable to find the device type field".into()))?;

    DeviceFamily::from_type(device_type).ok_or_else(|| {
        SmartHomeError::InvalidPayload(format!("Unsupported device type {}", device_type))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_primary_type_field() {
        let reply = json!({"system": {"get_sysinfo": {"type": "IOT.SMARTPLUGSWITCH", "err_code": 0}}});
        assert_eq!(classify(&reply).unwrap(), DeviceFamily::Plug);
    }

    #[test]
    fn test_classify_legacy_mic_type() {
        let reply = json!({"system": {"get_sysinfo": {"mic_type": "IOT.SMARTBULB"}}});
        assert_eq!(classify(&reply).unwrap(), DeviceFamily::Bulb);
    }

    #[test]
    fn test_classify_rejects_unknown_and_malformed() {
        assert!(classify(&json!({"system": {"get_sysinfo": {"type": "IOT.RANGEEXTENDER"}}})).is_err());
        assert!(classify(&json!({"system": {"get_sysinfo": {}}})).is_err());
        assert!(classify(&json!({"emeter": {}})).is_err());
    }

    #[test]
    fn test_parse_reply_without_prefix() {
        let payload = json!({"system": {"get_sysinfo": {"type": "smartplug"}}}).to_string();
        let data = crypto::encrypt(payload.as_bytes());
        assert_eq!(parse_reply(&data).unwrap(), DeviceFamily::Plug);
        assert!(parse_reply(b"\x01\x02garbage").is_err());
    }
}

//! Request/response exchange with a single device.
//! Opens one TCP connection per query, sends one frame, reads one frame and
//! validates the answer before handing it back.

use crate::diagnostics::{DiagnosticSink, default_sink};
use crate::error::{Result, SmartHomeError};
use crate::protocol::{self, DEFAULT_PORT, Request};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};

const KEY_ERR_CODE: &str = "err_code";

/// Raw exchange of one JSON request for one JSON response.
///
/// Implementations must not retry on their own. A retry or backoff policy can
/// be added by wrapping another `Transport`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(&self, host: Ipv4Addr, request: &Value) -> Result<Value>;
}

/// TCP transport speaking the framed Smart Home protocol.
pub struct TcpTransport {
    /// Control port on the device
    pub port: u16,
    /// Bound on connect, write and each read
    pub timeout: Duration,
    sink: Arc<dyn DiagnosticSink>,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: Duration::from_secs(5),
            sink: default_sink(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    async fn connect(&self, addr: SocketAddr) -> Result<TcpStream> {
        self.sink.debug(&format!("Connecting to {}", addr));
        timeout(self.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| SmartHomeError::Timeout)?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::ConnectionRefused => {
                    SmartHomeError::ConnectionFailed(addr.to_string())
                }
                _ => SmartHomeError::from(e),
            })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn exchange(&self, host: Ipv4Addr, request: &Value) -> Result<Value> {
        let addr = SocketAddr::new(host.into(), self.port);
        let payload = serde_json::to_vec(request)?;
        let frame = protocol::encode(&payload)?;

        // The stream is dropped, and the connection closed, on every return path.
        let mut stream = self.connect(addr).await?;

        self.sink
            .debug(&format!(">> {}: {}", addr, String::from_utf8_lossy(&payload)));
        timeout(self.timeout, stream.write_all(&frame))
            .await
            .map_err(|_| SmartHomeError::Timeout)??;

        let plain = timeout(self.timeout, protocol::read_frame(&mut stream))
            .await
            .map_err(|_| SmartHomeError::Timeout)??;
        self.sink
            .debug(&format!("<< {}: {}", addr, String::from_utf8_lossy(&plain)));

        serde_json::from_slice(&plain).map_err(|e| {
            self.sink.debug(&format!(
                "Undecodable response from {} (hex): {}",
                addr,
                hex::encode(&plain)
            ));
            SmartHomeError::from(e)
        })
    }
}

/// Issues validated queries through a [`Transport`].
#[derive(Clone)]
pub struct QueryEngine {
    transport: Arc<dyn Transport>,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new(Arc::new(TcpTransport::new()))
    }
}

impl QueryEngine {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Send one request and return the command's result with `err_code` removed.
    pub async fn query(&self, host: Ipv4Addr, request: &Request) -> Result<Map<String, Value>> {
        let response = self.transport.exchange(host, &request.to_value()).await?;
        unwrap_response(request, response)
    }
}

/// Validate a raw response against the request that produced it.
pub fn unwrap_response(request: &Request, mut response: Value) -> Result<Map<String, Value>> {
    let ns = &request.namespace;
    let cmd = &request.command;

    if response.get(ns.as_str()).is_none() {
        return Err(SmartHomeError::MissingNamespace {
            namespace: ns.clone(),
            response,
        });
    }
    let target = &mut response[ns.as_str()];

    // Some firmwares reject an unknown namespace at this level.
    if err_code(target).is_some_and(|c| c != 0) {
        return Err(device_error(request, target.take()));
    }

    let mut result = match target.get_mut(cmd.as_str()).map(Value::take) {
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(SmartHomeError::InvalidPayload(format!(
                "{}.{} is not an object: {}",
                ns, cmd, other
            )));
        }
        None => {
            return Err(SmartHomeError::InvalidPayload(format!(
                "No {} in {} response",
                cmd, ns
            )));
        }
    };

    match result.get(KEY_ERR_CODE).and_then(Value::as_i64) {
        Some(0) => {
            result.remove(KEY_ERR_CODE);
            Ok(result)
        }
        Some(_) => Err(device_error(request, Value::Object(result))),
        None => Err(SmartHomeError::InvalidPayload(format!(
            "No {} in {}.{} response",
            KEY_ERR_CODE, ns, cmd
        ))),
    }
}

fn err_code(value: &Value) -> Option<i64> {
    value.get(KEY_ERR_CODE).and_then(Value::as_i64)
}

fn device_error(request: &Request, result: Value) -> SmartHomeError {
    SmartHomeError::Device {
        namespace: request.namespace.clone(),
        command: request.command.clone(),
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sysinfo_request() -> Request {
        Request::new("system", "get_sysinfo", None)
    }

    #[test]
    fn test_success_strips_err_code() {
        let resp = json!({"system": {"get_sysinfo": {"err_code": 0, "alias": "lamp"}}});
        let result = unwrap_response(&sysinfo_request(), resp).unwrap();
        assert_eq!(result.get("alias"), Some(&json!("lamp")));
        assert!(!result.contains_key("err_code"));
    }

    #[test]
    fn test_nonzero_err_code_is_device_error() {
        let resp = json!({"system": {"get_sysinfo": {"err_code": -3, "err_msg": "invalid argument"}}});
        match unwrap_response(&sysinfo_request(), resp) {
            Err(SmartHomeError::Device {
                namespace,
                command,
                result,
            }) => {
                assert_eq!(namespace, "system");
                assert_eq!(command, "get_sysinfo");
                assert_eq!(result["err_msg"], json!("invalid argument"));
            }
            other => panic!("expected device error, got {:?}", other),
        }
    }

    #[test]
    fn test_namespace_level_err_code() {
        let req = Request::new("smartlife.iot.common.emeter", "get_realtime", None);
        let resp = json!({"smartlife.iot.common.emeter": {"err_code": -1, "err_msg": "module not support"}});
        assert!(unwrap_response(&req, resp).unwrap_err().is_device());
    }

    #[test]
    fn test_missing_namespace_is_protocol_error() {
        let resp = json!({"time": {"get_time": {"err_code": 0}}});
        let err = unwrap_response(&sysinfo_request(), resp).unwrap_err();
        assert!(matches!(err, SmartHomeError::MissingNamespace { .. }));
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);
    }

    #[test]
    fn test_missing_err_code_is_protocol_error() {
        let resp = json!({"system": {"get_sysinfo": {"alias": "lamp"}}});
        let err = unwrap_response(&sysinfo_request(), resp).unwrap_err();
        assert!(matches!(err, SmartHomeError::InvalidPayload(_)));
    }
}

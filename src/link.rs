/// Device link implementations
///
/// One link owns one live Modbus TCP session to one device. The trait is
/// the single seam the step executor and the phases depend on: register
/// access and device identification travel through the same interface, so
/// the rest of the crate never touches the transport crate directly.
///
/// Device identification uses the MEI Read Device Identification function
/// (0x2B / 0x0E) as a custom-function call on the same session; only the
/// response payload is interpreted here, the framing stays inside the
/// transport.

use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_modbus::client::{tcp, Client as _, Context, Reader, Writer};
use tokio_modbus::slave::Slave;
use tokio_modbus::{Request, Response};

use crate::error::{BreakerError, BreakerResult};
use crate::utils::format;
use crate::{DEVICE_ID_FIRST_OBJECT, DEVICE_ID_FUNCTION, DEVICE_ID_MEI_TYPE, DEVICE_ID_READ_BASIC};

/// Connection parameters of one device on the field bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// IPv4 address or resolvable host name
    pub host: String,
    /// TCP port, conventionally 502
    pub port: u16,
    /// Unit identifier on the bus segment
    pub unit_id: u8,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new<S: Into<String>>(host: S, port: u16, unit_id: u8) -> Self {
        Self {
            host: host.into(),
            port,
            unit_id,
        }
    }

    fn socket_addr(&self) -> BreakerResult<SocketAddr> {
        format!("{}:{}", self.host, self.port).parse().map_err(|e| {
            BreakerError::configuration(format!(
                "Invalid device address {}:{}: {}",
                self.host, self.port, e
            ))
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} (unit {})", self.host, self.port, self.unit_id)
    }
}

/// Trait defining one field-bus session to one device
///
/// All register traffic of a phase runs over a single live session; the
/// session is opened once and reused across the phase's steps.
#[async_trait]
pub trait DeviceLink: Send {
    /// Write one holding register (function code 0x06)
    async fn write_single_register(&mut self, address: u16, value: u16) -> BreakerResult<()>;

    /// Read `count` holding registers starting at `address` (function code 0x03)
    ///
    /// A short response is a read error; callers always receive exactly
    /// `count` values on success.
    async fn read_holding_registers(&mut self, address: u16, count: u16) -> BreakerResult<Vec<u16>>;

    /// Read the vendor identification objects (function code 0x2B)
    ///
    /// Returns the identification strings in response order. A response
    /// with an unexpected shape is a decode error, which consumers treat
    /// as a degraded (empty) identification.
    async fn read_device_identification(&mut self) -> BreakerResult<Vec<String>>;

    /// The endpoint this session talks to
    fn endpoint(&self) -> &Endpoint;

    /// Close the session
    async fn close(&mut self) -> BreakerResult<()>;
}

/// Device link over a tokio-modbus TCP context
pub struct ModbusDeviceLink {
    ctx: Context,
    endpoint: Endpoint,
}

impl ModbusDeviceLink {
    /// Open a session to the device
    ///
    /// Fails with a connection error when the endpoint does not accept
    /// the session within `connect_timeout`; the orchestrator treats
    /// that as fatal to the run.
    pub async fn connect(endpoint: Endpoint, connect_timeout: Duration) -> BreakerResult<Self> {
        let addr = endpoint.socket_addr()?;
        let slave = Slave(endpoint.unit_id);
        let ctx = timeout(connect_timeout, tcp::connect_slave(addr, slave))
            .await
            .map_err(|_| {
                BreakerError::connection(format!(
                    "Connection to {} timed out after {}ms",
                    endpoint,
                    connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| {
                BreakerError::connection(format!("Failed to connect to {}: {}", endpoint, e))
            })?;
        debug!("Session open to {}", endpoint);
        Ok(Self { ctx, endpoint })
    }
}

#[async_trait]
impl DeviceLink for ModbusDeviceLink {
    async fn write_single_register(&mut self, address: u16, value: u16) -> BreakerResult<()> {
        match self.ctx.write_single_register(address, value).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(exception)) => Err(BreakerError::write(
                address,
                format!("device exception: {:?}", exception),
            )),
            Err(e) => Err(BreakerError::write(address, e.to_string())),
        }
    }

    async fn read_holding_registers(&mut self, address: u16, count: u16) -> BreakerResult<Vec<u16>> {
        let values = match self.ctx.read_holding_registers(address, count).await {
            Ok(Ok(values)) => values,
            Ok(Err(exception)) => {
                return Err(BreakerError::read(
                    address,
                    count,
                    format!("device exception: {:?}", exception),
                ));
            }
            Err(e) => return Err(BreakerError::read(address, count, e.to_string())),
        };
        if values.len() != count as usize {
            return Err(BreakerError::read(
                address,
                count,
                format!("short response: {} register(s)", values.len()),
            ));
        }
        Ok(values)
    }

    async fn read_device_identification(&mut self) -> BreakerResult<Vec<String>> {
        let payload = [DEVICE_ID_MEI_TYPE, DEVICE_ID_READ_BASIC, DEVICE_ID_FIRST_OBJECT];
        let request = Request::Custom(DEVICE_ID_FUNCTION, Cow::Borrowed(&payload));
        match self.ctx.call(request).await {
            Ok(Ok(Response::Custom(_, data))) => parse_device_identification(&data),
            Ok(Ok(response)) => Err(BreakerError::decode(format!(
                "unexpected identification response: {:?}",
                response
            ))),
            Ok(Err(exception)) => Err(BreakerError::decode(format!(
                "device exception: {:?}",
                exception
            ))),
            Err(e) => Err(BreakerError::decode(format!(
                "identification request failed: {}",
                e
            ))),
        }
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn close(&mut self) -> BreakerResult<()> {
        self.ctx
            .disconnect()
            .await
            .map_err(|e| BreakerError::connection(format!("Failed to close session: {}", e)))?;
        debug!("Session to {} closed", self.endpoint);
        Ok(())
    }
}

/// Parse the MEI Read Device Identification response payload
///
/// Payload layout after the function code: MEI type, read device id
/// code, conformity level, more-follows flag, next object id, object
/// count, then `{object id, length, value}` entries. Object values are
/// collected as UTF-8 strings in response order.
fn parse_device_identification(payload: &[u8]) -> BreakerResult<Vec<String>> {
    if payload.len() < 6 {
        return Err(BreakerError::decode(format!(
            "identification payload too short: {}",
            format::bytes_to_hex(payload)
        )));
    }
    if payload[0] != DEVICE_ID_MEI_TYPE {
        return Err(BreakerError::decode(format!(
            "unexpected MEI type 0x{:02X}",
            payload[0]
        )));
    }

    let object_count = payload[5] as usize;
    let mut objects = Vec::with_capacity(object_count);
    let mut offset = 6;
    for _ in 0..object_count {
        if offset + 2 > payload.len() {
            return Err(BreakerError::decode(
                "identification object header truncated".to_string(),
            ));
        }
        let length = payload[offset + 1] as usize;
        let start = offset + 2;
        let end = start + length;
        if end > payload.len() {
            return Err(BreakerError::decode(
                "identification object value truncated".to_string(),
            ));
        }
        objects.push(String::from_utf8_lossy(&payload[start..end]).into_owned());
        offset = end;
    }
    Ok(objects)
}

/// Trait for opening sessions and probing endpoint reachability
///
/// The orchestrator depends on this seam instead of concrete sockets, so
/// tests can substitute scripted links.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Plain TCP reachability check, true when the endpoint accepts connections
    async fn probe(&self, endpoint: &Endpoint, connect_timeout: Duration) -> bool;

    /// Open a session for the phases to drive
    async fn connect(
        &self,
        endpoint: &Endpoint,
        connect_timeout: Duration,
    ) -> BreakerResult<Box<dyn DeviceLink>>;
}

/// Production connector over TCP
pub struct TcpConnector;

#[async_trait]
impl DeviceConnector for TcpConnector {
    async fn probe(&self, endpoint: &Endpoint, connect_timeout: Duration) -> bool {
        let addr = match endpoint.socket_addr() {
            Ok(addr) => addr,
            Err(_) => return false,
        };
        match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!("Probe of {} failed: {}", endpoint, e);
                false
            }
            Err(_) => {
                debug!("Probe of {} timed out", endpoint);
                false
            }
        }
    }

    async fn connect(
        &self,
        endpoint: &Endpoint,
        connect_timeout: Duration,
    ) -> BreakerResult<Box<dyn DeviceLink>> {
        let link = ModbusDeviceLink::connect(endpoint.clone(), connect_timeout).await?;
        Ok(Box::new(link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identification_payload() -> Vec<u8> {
        // MEI type, read code, conformity, more follows, next object, count
        let mut payload = vec![0x0E, 0x01, 0x01, 0x00, 0x00, 0x02];
        payload.extend_from_slice(&[0x00, 0x09]); // object 0, length 9
        payload.extend_from_slice(b"Schneider");
        payload.extend_from_slice(&[0x01, 0x08]); // object 1, length 8
        payload.extend_from_slice(b"NSX-CTRL");
        payload
    }

    #[test]
    fn test_parse_identification_objects_in_order() {
        let objects = parse_device_identification(&identification_payload()).unwrap();
        assert_eq!(objects, vec!["Schneider".to_string(), "NSX-CTRL".to_string()]);
    }

    #[test]
    fn test_parse_identification_rejects_wrong_mei_type() {
        let mut payload = identification_payload();
        payload[0] = 0x0D;
        let err = parse_device_identification(&payload).unwrap_err();
        assert!(err.is_degraded());
        assert!(format!("{}", err).contains("MEI type"));
    }

    #[test]
    fn test_parse_identification_rejects_short_payload() {
        let err = parse_device_identification(&[0x0E, 0x01]).unwrap_err();
        assert!(err.is_degraded());
    }

    #[test]
    fn test_parse_identification_rejects_truncated_value() {
        let mut payload = identification_payload();
        payload.truncate(payload.len() - 3);
        let err = parse_device_identification(&payload).unwrap_err();
        assert!(format!("{}", err).contains("truncated"));
    }

    #[test]
    fn test_parse_identification_empty_object_list() {
        let payload = vec![0x0E, 0x01, 0x01, 0x00, 0x00, 0x00];
        let objects = parse_device_identification(&payload).unwrap();
        assert!(objects.is_empty());
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint::new("192.168.1.50", 502, 255);
        assert_eq!(format!("{}", endpoint), "192.168.1.50:502 (unit 255)");
    }

    #[test]
    fn test_endpoint_rejects_unparseable_address() {
        let endpoint = Endpoint::new("not an address", 502, 255);
        let err = endpoint.socket_addr().unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_probe_unreachable_endpoint() {
        // Port 1 on localhost is assumed closed
        let endpoint = Endpoint::new("127.0.0.1", 1, 255);
        let reachable = TcpConnector
            .probe(&endpoint, Duration::from_millis(200))
            .await;
        assert!(!reachable);
    }
}

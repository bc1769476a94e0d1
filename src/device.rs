//! Capability model shared by every Smart Home device.
//!
//! Each family implements [`SmartDevice`]; everything that only needs the
//! generic query mechanism is a provided method on the trait. [`Device`] is the
//! closed set of families produced by discovery.

use crate::bulb::SmartBulb;
use crate::diagnostics::{DiagnosticSink, default_sink};
use crate::emeter::EmeterConfig;
use crate::error::{Result, SmartHomeError};
use crate::plug::SmartPlug;
use crate::protocol::{CMD_GET_SYSINFO, NS_SYSTEM, NS_TIME, Request};
use crate::query::{QueryEngine, TcpTransport, Transport};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

pub const FEATURE_ENERGY_METER: &str = "ENE";
pub const FEATURE_TIMER: &str = "TIM";
const ALL_FEATURES: &[&str] = &[FEATURE_ENERGY_METER, FEATURE_TIMER];

const HW_INFO_KEYS: &[&str] = &[
    "sw_ver", "hw_ver", "mac", "mic_mac", "type", "mic_type", "hwId", "fwId", "oemId", "dev_name",
];

/// Point-in-time copy of the device's `get_sysinfo` answer.
///
/// Lookups of keys the device did not report yield `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SysInfo(Map<String, Value>);

impl SysInfo {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    /// Truthiness of a capability flag; absent means false.
    pub fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            _ => false,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Device geolocation as reported in sysinfo.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Location {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Deserialize)]
struct DeviceTime {
    year: i32,
    month: u32,
    mday: u32,
    hour: u32,
    min: u32,
    sec: u32,
}

/// Addressing and configuration shared by every family.
#[derive(Clone)]
pub struct DeviceCore {
    host: Ipv4Addr,
    engine: QueryEngine,
    emeter: EmeterConfig,
    sink: Arc<dyn DiagnosticSink>,
}

impl fmt::Debug for DeviceCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCore")
            .field("host", &self.host)
            .field("emeter", &self.emeter)
            .finish()
    }
}

impl DeviceCore {
    /// Validate `host` and bind it to a transport. Nothing is sent.
    pub fn new(host: &str, emeter: EmeterConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let host: Ipv4Addr = host
            .parse()
            .map_err(|_| SmartHomeError::InvalidAddress(host.to_string()))?;
        Ok(Self {
            host,
            engine: QueryEngine::new(transport),
            emeter,
            sink: default_sink(),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn host(&self) -> Ipv4Addr {
        self.host
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn emeter(&self) -> EmeterConfig {
        self.emeter
    }

    pub fn sink(&self) -> &Arc<dyn DiagnosticSink> {
        &self.sink
    }

    pub async fn query(
        &self,
        namespace: &str,
        command: &str,
        args: Option<Value>,
    ) -> Result<Map<String, Value>> {
        self.engine
            .query(self.host, &Request::new(namespace, command, args))
            .await
    }

    pub async fn sys_info(&self) -> Result<SysInfo> {
        self.query(NS_SYSTEM, CMD_GET_SYSINFO, None)
            .await
            .map(SysInfo::new)
    }
}

/// Capability set implemented by every device family.
#[async_trait]
pub trait SmartDevice: Send + Sync {
    fn core(&self) -> &DeviceCore;

    async fn is_on(&self) -> Result<bool>;

    async fn turn_on(&self) -> Result<()>;

    async fn turn_off(&self) -> Result<()>;

    async fn has_emeter(&self) -> Result<bool>;

    /// Family-specific, human-oriented snapshot.
    async fn state_information(&self) -> Result<BTreeMap<String, Value>>;

    fn host(&self) -> Ipv4Addr {
        self.core().host()
    }

    /// Send an arbitrary command and return its validated result.
    async fn query(
        &self,
        namespace: &str,
        command: &str,
        args: Option<Value>,
    ) -> Result<Map<String, Value>> {
        self.core().query(namespace, command, args).await
    }

    async fn is_off(&self) -> Result<bool> {
        Ok(!self.is_on().await?)
    }

    /// Read the state and flip it. Two separate exchanges, not atomic.
    async fn toggle(&self) -> Result<()> {
        if self.is_on().await? {
            self.turn_off().await
        } else {
            self.turn_on().await
        }
    }

    /// Fresh sysinfo; never cached.
    async fn sys_info(&self) -> Result<SysInfo> {
        self.core().sys_info().await
    }

    async fn alias(&self) -> Result<Option<String>> {
        Ok(self.sys_info().await?.str("alias").map(str::to_string))
    }

    async fn set_alias(&self, alias: &str) -> Result<()> {
        self.query(NS_SYSTEM, "set_dev_alias", Some(json!({"alias": alias})))
            .await?;
        Ok(())
    }

    async fn model(&self) -> Result<Option<String>> {
        Ok(self.sys_info().await?.str("model").map(str::to_string))
    }

    /// Colon-separated feature tokens from sysinfo. Empty for bulbs.
    async fn features(&self) -> Result<Vec<String>> {
        let info = self.sys_info().await?;
        let Some(raw) = info.str("feature") else {
            return Ok(Vec::new());
        };
        let features: Vec<String> = raw
            .split(':')
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        for feature in &features {
            if !ALL_FEATURES.contains(&feature.as_str()) {
                self.core().sink().warn(&format!(
                    "Unknown feature {} on device {}",
                    feature,
                    self.host()
                ));
            }
        }
        Ok(features)
    }

    async fn icon(&self) -> Result<Map<String, Value>> {
        self.query(NS_SYSTEM, "get_dev_icon", None).await
    }

    /// Device clock, or `None` if the device refuses to report it.
    async fn time(&self) -> Result<Option<NaiveDateTime>> {
        let res = match self.query(NS_TIME, "get_time", None).await {
            Ok(res) => res,
            Err(SmartHomeError::Device { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let t: DeviceTime = serde_json::from_value(Value::Object(res))?;
        NaiveDate::from_ymd_opt(t.year, t.month, t.mday)
            .and_then(|d| d.and_hms_opt(t.hour, t.min, t.sec))
            .map(Some)
            .ok_or_else(|| SmartHomeError::InvalidPayload("Device reported an invalid time".into()))
    }

    async fn timezone(&self) -> Result<Map<String, Value>> {
        self.query(NS_TIME, "get_timezone", None).await
    }

    async fn hw_info(&self) -> Result<Map<String, Value>> {
        let info = self.sys_info().await?;
        Ok(HW_INFO_KEYS
            .iter()
            .filter_map(|&k| info.get(k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn location(&self) -> Result<Location> {
        let info = self.sys_info().await?;
        if let (Some(lat), Some(lon)) = (info.f64("latitude"), info.f64("longitude")) {
            return Ok(Location {
                latitude: Some(lat),
                longitude: Some(lon),
            });
        }
        if let (Some(lat), Some(lon)) = (info.f64("latitude_i"), info.f64("longitude_i")) {
            return Ok(Location {
                latitude: Some(lat / 10000.0),
                longitude: Some(lon / 10000.0),
            });
        }
        self.core().sink().warn("Unsupported device location.");
        Ok(Location::default())
    }

    async fn rssi(&self) -> Result<Option<i64>> {
        Ok(self.sys_info().await?.i64("rssi"))
    }

    async fn mac(&self) -> Result<String> {
        let info = self.sys_info().await?;
        info.str("mac")
            .or_else(|| info.str("mic_mac"))
            .map(str::to_string)
            .ok_or_else(|| SmartHomeError::InvalidPayload("Unknown mac in sysinfo".into()))
    }

    async fn set_mac(&self, mac: &str) -> Result<()> {
        self.query(NS_SYSTEM, "set_mac_addr", Some(json!({"mac": mac})))
            .await?;
        Ok(())
    }

    async fn emeter_realtime(&self) -> Result<Option<Map<String, Value>>> {
        if !self.has_emeter().await? {
            return Ok(None);
        }
        let core = self.core();
        core.emeter().realtime(core.engine(), core.host()).await.map(Some)
    }

    /// Energy per day of month. `None` if the device has no meter.
    async fn emeter_daily(
        &self,
        year: Option<i32>,
        month: Option<u32>,
    ) -> Result<Option<BTreeMap<u32, f64>>> {
        if let Some(m) = month
            && !(1..=12).contains(&m)
        {
            return Err(SmartHomeError::OutOfRange(format!("month {}", m)));
        }
        if !self.has_emeter().await? {
            return Ok(None);
        }
        let core = self.core();
        core.emeter()
            .daily(core.engine(), core.host(), year, month)
            .await
            .map(Some)
    }

    /// Energy per month of year. `None` if the device has no meter.
    async fn emeter_monthly(&self, year: Option<i32>) -> Result<Option<BTreeMap<u32, f64>>> {
        if !self.has_emeter().await? {
            return Ok(None);
        }
        let core = self.core();
        core.emeter()
            .monthly(core.engine(), core.host(), year)
            .await
            .map(Some)
    }

    /// Returns false, without erasing anything, if the device has no meter.
    async fn erase_emeter_stats(&self) -> Result<bool> {
        if !self.has_emeter().await? {
            return Ok(false);
        }
        let core = self.core();
        core.emeter().erase(core.engine(), core.host()).await?;
        Ok(true)
    }

    /// Current draw in watts.
    async fn current_consumption(&self) -> Result<Option<f64>> {
        if !self.has_emeter().await? {
            return Ok(None);
        }
        let core = self.core();
        core.emeter()
            .current_consumption(core.engine(), core.host())
            .await
            .map(Some)
    }
}

/// Device family as declared in the sysinfo type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFamily {
    Plug,
    Bulb,
}

impl DeviceFamily {
    /// Case-insensitive substring match against the known family markers.
    pub fn from_type(device_type: &str) -> Option<Self> {
        let t = device_type.to_lowercase();
        if t.contains("smartplug") {
            Some(DeviceFamily::Plug)
        } else if t.contains("smartbulb") {
            Some(DeviceFamily::Bulb)
        } else {
            None
        }
    }

    pub fn emeter(&self) -> EmeterConfig {
        match self {
            DeviceFamily::Plug => EmeterConfig::PLUG,
            DeviceFamily::Bulb => EmeterConfig::BULB,
        }
    }
}

/// A concrete device of one of the supported families.
#[derive(Debug, Clone)]
pub enum Device {
    Plug(SmartPlug),
    Bulb(SmartBulb),
}

impl Device {
    pub fn new(family: DeviceFamily, host: &str) -> Result<Self> {
        Self::with_transport(family, host, Arc::new(TcpTransport::new()))
    }

    pub fn with_transport(
        family: DeviceFamily,
        host: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let core = DeviceCore::new(host, family.emeter(), transport)?;
        Ok(Self::from_core(family, core))
    }

    pub(crate) fn from_core(family: DeviceFamily, core: DeviceCore) -> Self {
        match family {
            DeviceFamily::Plug => Device::Plug(SmartPlug::from_core(core)),
            DeviceFamily::Bulb => Device::Bulb(SmartBulb::from_core(core)),
        }
    }

    pub fn family(&self) -> DeviceFamily {
        match self {
            Device::Plug(_) => DeviceFamily::Plug,
            Device::Bulb(_) => DeviceFamily::Bulb,
        }
    }

    pub fn as_plug(&self) -> Option<&SmartPlug> {
        match self {
            Device::Plug(p) => Some(p),
            Device::Bulb(_) => None,
        }
    }

    pub fn as_bulb(&self) -> Option<&SmartBulb> {
        match self {
            Device::Bulb(b) => Some(b),
            Device::Plug(_) => None,
        }
    }

    fn inner(&self) -> &dyn SmartDevice {
        match self {
            Device::Plug(p) => p,
            Device::Bulb(b) => b,
        }
    }
}

#[async_trait]
impl SmartDevice for Device {
    fn core(&self) -> &DeviceCore {
        self.inner().core()
    }

    async fn is_on(&self) -> Result<bool> {
        self.inner().is_on().await
    }

    async fn turn_on(&self) -> Result<()> {
        self.inner().turn_on().await
    }

    async fn turn_off(&self) -> Result<()> {
        self.inner().turn_off().await
    }

    async fn has_emeter(&self) -> Result<bool> {
        self.inner().has_emeter().await
    }

    async fn state_information(&self) -> Result<BTreeMap<String, Value>> {
        self.inner().state_information().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sysinfo_missing_keys_are_none() {
        let info = SysInfo::new(
            json!({"alias": "desk", "led_off": 0, "rssi": -52, "latitude": null})
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert_eq!(info.str("alias"), Some("desk"));
        assert_eq!(info.i64("rssi"), Some(-52));
        assert!(info.get("mic_mac").is_none());
        assert!(info.get("latitude").is_none());
        assert!(!info.flag("is_color"));
        assert!(!info.flag("led_off"));
    }

    #[test]
    fn test_family_markers() {
        assert_eq!(
            DeviceFamily::from_type("IOT.SMARTPLUGSWITCH"),
            Some(DeviceFamily::Plug)
        );
        assert_eq!(
            DeviceFamily::from_type("IOT.SMARTBULB"),
            Some(DeviceFamily::Bulb)
        );
        assert_eq!(DeviceFamily::from_type("IOT.ROUTER"), None);
    }

    #[test]
    fn test_address_validation() {
        assert!(matches!(
            Device::new(DeviceFamily::Plug, "192.168.1.300"),
            Err(SmartHomeError::InvalidAddress(_))
        ));
        assert!(Device::new(DeviceFamily::Plug, "not-an-ip").is_err());
        assert!(matches!(
            Device::new(DeviceFamily::Plug, " 10.0.0.1 "),
            Err(SmartHomeError::InvalidAddress(_))
        ));
        let dev = Device::new(DeviceFamily::Bulb, "192.168.1.42").unwrap();
        assert_eq!(dev.host(), Ipv4Addr::new(192, 168, 1, 42));
        assert_eq!(dev.family(), DeviceFamily::Bulb);
        assert!(dev.as_bulb().is_some());
        assert!(dev.as_plug().is_none());
    }
}

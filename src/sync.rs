//! Blocking API.
//!
//! Wraps the async core in a shared multi-thread runtime so callers without
//! an executor can use plain function calls. These functions must not be
//! called from inside an async context.

use crate::bulb::{BulbState, Hsv, LightState, SmartBulb};
use crate::device::{self, DeviceFamily, Location, SmartDevice, SysInfo};
use crate::discovery::{self, Discover};
use crate::error::{Result, SmartHomeError};
use crate::plug::{PlugState, SmartPlug};
use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn runtime() -> Result<&'static Runtime> {
    if let Some(rt) = RUNTIME.get() {
        return Ok(rt);
    }
    let rt = Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;
    Ok(RUNTIME.get_or_init(|| rt))
}

/// Drive any async operation of this crate to completion on the shared runtime.
pub fn block_on<F: Future<Output = Result<T>>, T>(fut: F) -> Result<T> {
    runtime()?.block_on(fut)
}

/// Discover devices with the given receive timeout and UDP port.
pub fn discover(timeout: Duration, port: u16) -> Result<HashMap<Ipv4Addr, Device>> {
    discover_with(Discover::new().with_timeout(timeout).with_port(port))
}

/// Run a preconfigured discovery.
pub fn discover_with(discover: Discover) -> Result<HashMap<Ipv4Addr, Device>> {
    let found: discovery::DiscoveryResult = block_on(async move { discover.discover().await })?;
    Ok(found
        .into_iter()
        .map(|(ip, inner)| (ip, Device { inner }))
        .collect())
}

/// Blocking handle to a plug or bulb.
#[derive(Debug, Clone)]
pub struct Device {
    inner: device::Device,
}

impl From<device::Device> for Device {
    fn from(inner: device::Device) -> Self {
        Self { inner }
    }
}

impl Device {
    pub fn new(family: DeviceFamily, host: &str) -> Result<Self> {
        device::Device::new(family, host).map(Self::from)
    }

    /// The async device this handle drives.
    pub fn inner(&self) -> &device::Device {
        &self.inner
    }

    pub fn family(&self) -> DeviceFamily {
        self.inner.family()
    }

    pub fn host(&self) -> Ipv4Addr {
        self.inner.host()
    }

    pub fn query(
        &self,
        namespace: &str,
        command: &str,
        args: Option<Value>,
    ) -> Result<Map<String, Value>> {
        block_on(self.inner.query(namespace, command, args))
    }

    pub fn sys_info(&self) -> Result<SysInfo> {
        block_on(self.inner.sys_info())
    }

    pub fn alias(&self) -> Result<Option<String>> {
        block_on(self.inner.alias())
    }

    pub fn model(&self) -> Result<Option<String>> {
        block_on(self.inner.model())
    }

    pub fn is_on(&self) -> Result<bool> {
        block_on(self.inner.is_on())
    }

    pub fn is_off(&self) -> Result<bool> {
        block_on(self.inner.is_off())
    }

    pub fn set_alias(&self, alias: &str) -> Result<()> {
        block_on(self.inner.set_alias(alias))
    }

    pub fn features(&self) -> Result<Vec<String>> {
        block_on(self.inner.features())
    }

    pub fn icon(&self) -> Result<Map<String, Value>> {
        block_on(self.inner.icon())
    }

    pub fn time(&self) -> Result<Option<NaiveDateTime>> {
        block_on(self.inner.time())
    }

    pub fn timezone(&self) -> Result<Map<String, Value>> {
        block_on(self.inner.timezone())
    }

    pub fn hw_info(&self) -> Result<Map<String, Value>> {
        block_on(self.inner.hw_info())
    }

    pub fn location(&self) -> Result<Location> {
        block_on(self.inner.location())
    }

    pub fn rssi(&self) -> Result<Option<i64>> {
        block_on(self.inner.rssi())
    }

    pub fn mac(&self) -> Result<String> {
        block_on(self.inner.mac())
    }

    pub fn set_mac(&self, mac: &str) -> Result<()> {
        block_on(self.inner.set_mac(mac))
    }

    pub fn turn_on(&self) -> Result<()> {
        block_on(self.inner.turn_on())
    }

    pub fn turn_off(&self) -> Result<()> {
        block_on(self.inner.turn_off())
    }

    pub fn toggle(&self) -> Result<()> {
        block_on(self.inner.toggle())
    }

    pub fn has_emeter(&self) -> Result<bool> {
        block_on(self.inner.has_emeter())
    }

    pub fn state_information(&self) -> Result<BTreeMap<String, Value>> {
        block_on(self.inner.state_information())
    }

    pub fn emeter_realtime(&self) -> Result<Option<Map<String, Value>>> {
        block_on(self.inner.emeter_realtime())
    }

    pub fn emeter_daily(
        &self,
        year: Option<i32>,
        month: Option<u32>,
    ) -> Result<Option<BTreeMap<u32, f64>>> {
        block_on(self.inner.emeter_daily(year, month))
    }

    pub fn emeter_monthly(&self, year: Option<i32>) -> Result<Option<BTreeMap<u32, f64>>> {
        block_on(self.inner.emeter_monthly(year))
    }

    pub fn erase_emeter_stats(&self) -> Result<bool> {
        block_on(self.inner.erase_emeter_stats())
    }

    pub fn current_consumption(&self) -> Result<Option<f64>> {
        block_on(self.inner.current_consumption())
    }

    /// Relay position. Fails on bulbs.
    pub fn plug_state(&self) -> Result<PlugState> {
        block_on(self.plug("relay state")?.state())
    }

    pub fn set_plug_state(&self, state: PlugState) -> Result<()> {
        block_on(self.plug("relay state")?.set_state(state))
    }

    /// True when the plug LED is lit. Fails on bulbs.
    pub fn led(&self) -> Result<bool> {
        block_on(self.plug("LED")?.led())
    }

    /// Set the plug LED. Fails on bulbs.
    pub fn set_led(&self, on: bool) -> Result<()> {
        block_on(self.plug("LED")?.set_led(on))
    }

    pub fn on_since(&self) -> Result<Option<NaiveDateTime>> {
        block_on(self.plug("on-since")?.on_since())
    }

    /// Bulb power from the lighting service. Fails on plugs.
    pub fn bulb_state(&self) -> Result<BulbState> {
        block_on(self.bulb("light state")?.state())
    }

    pub fn set_bulb_state(&self, state: BulbState) -> Result<()> {
        block_on(self.bulb("light state")?.set_state(state))
    }

    pub fn is_color(&self) -> Result<bool> {
        block_on(self.bulb("color")?.is_color())
    }

    pub fn is_dimmable(&self) -> Result<bool> {
        block_on(self.bulb("brightness")?.is_dimmable())
    }

    pub fn is_variable_color_temp(&self) -> Result<bool> {
        block_on(self.bulb("color temperature")?.is_variable_color_temp())
    }

    pub fn set_light_state(&self, state: Value) -> Result<Map<String, Value>> {
        block_on(self.bulb("light state")?.set_light_state(state))
    }

    pub fn brightness(&self) -> Result<Option<u8>> {
        block_on(self.bulb("brightness")?.brightness())
    }

    pub fn hsv(&self) -> Result<Option<Hsv>> {
        block_on(self.bulb("color")?.hsv())
    }

    pub fn color_temp(&self) -> Result<Option<u32>> {
        block_on(self.bulb("color temperature")?.color_temp())
    }

    pub fn light_state(&self) -> Result<LightState> {
        let bulb = self.bulb("light state")?;
        block_on(bulb.light_state())
    }

    pub fn set_brightness(&self, percent: u8) -> Result<()> {
        let bulb = self.bulb("brightness")?;
        block_on(bulb.set_brightness(percent))
    }

    pub fn set_hsv(&self, hsv: Hsv) -> Result<()> {
        let bulb = self.bulb("color")?;
        block_on(bulb.set_hsv(hsv))
    }

    pub fn set_color_temp(&self, kelvin: u32) -> Result<()> {
        let bulb = self.bulb("color temperature")?;
        block_on(bulb.set_color_temp(kelvin))
    }

    fn plug(&self, what: &str) -> Result<&SmartPlug> {
        self.inner.as_plug().ok_or_else(|| not_supported(what, self))
    }

    fn bulb(&self, what: &str) -> Result<&SmartBulb> {
        self.inner.as_bulb().ok_or_else(|| not_supported(what, self))
    }
}

fn not_supported(what: &str, dev: &Device) -> SmartHomeError {
    SmartHomeError::InvalidState(format!(
        "{} is not available on {:?} at {}",
        what,
        dev.family(),
        dev.host()
    ))
}

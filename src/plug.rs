//! Smart plugs and switches: a single relay, a status LED and, on some
//! models, an energy meter.

use crate::device::{DeviceCore, FEATURE_ENERGY_METER, SmartDevice, SysInfo};
use crate::diagnostics::DiagnosticSink;
use crate::emeter::EmeterConfig;
use crate::error::{Result, SmartHomeError};
use crate::protocol::NS_SYSTEM;
use crate::query::{TcpTransport, Transport};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, TimeDelta};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Relay position as reported by `relay_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlugState {
    On,
    Off,
    /// Any value other than 0 or 1
    Unknown,
}

impl PlugState {
    pub fn from_relay(relay_state: Option<i64>) -> Self {
        match relay_state {
            Some(0) => PlugState::Off,
            Some(1) => PlugState::On,
            _ => PlugState::Unknown,
        }
    }
}

impl fmt::Display for PlugState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlugState::On => write!(f, "ON"),
            PlugState::Off => write!(f, "OFF"),
            PlugState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A TP-Link smart plug or wall switch.
#[derive(Debug, Clone)]
pub struct SmartPlug {
    core: DeviceCore,
}

impl SmartPlug {
    /// Address a plug at `host` over the default TCP transport.
    pub fn new(host: &str) -> Result<Self> {
        Self::with_transport(host, Arc::new(TcpTransport::new()))
    }

    pub fn with_transport(host: &str, transport: Arc<dyn Transport>) -> Result<Self> {
        DeviceCore::new(host, EmeterConfig::PLUG, transport).map(Self::from_core)
    }

    pub(crate) fn from_core(core: DeviceCore) -> Self {
        Self { core }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.core = self.core.with_sink(sink);
        self
    }

    fn state_of(&self, info: &SysInfo) -> PlugState {
        let raw = info.get("relay_state");
        let state = PlugState::from_relay(raw.and_then(Value::as_i64));
        if state == PlugState::Unknown {
            self.core.sink().warn(&format!(
                "Unknown relay state {:?} returned by {}",
                raw,
                self.core.host()
            ));
        }
        state
    }

    pub async fn state(&self) -> Result<PlugState> {
        let info = self.sys_info().await?;
        Ok(self.state_of(&info))
    }

    pub async fn set_state(&self, state: PlugState) -> Result<()> {
        match state {
            PlugState::On => self.turn_on().await,
            PlugState::Off => self.turn_off().await,
            PlugState::Unknown => Err(SmartHomeError::InvalidState(format!(
                "cannot set plug to {}",
                state
            ))),
        }
    }

    async fn set_relay(&self, on: bool) -> Result<()> {
        self.query(NS_SYSTEM, "set_relay_state", Some(json!({"state": on as u8})))
            .await?;
        Ok(())
    }

    fn led_of(info: &SysInfo) -> Result<bool> {
        info.i64("led_off")
            .map(|off| off == 0)
            .ok_or_else(|| SmartHomeError::InvalidPayload("No led_off in sysinfo".into()))
    }

    /// True when the status LED is lit.
    pub async fn led(&self) -> Result<bool> {
        Self::led_of(&self.sys_info().await?)
    }

    /// Turn the status LED (night mode) on or off.
    pub async fn set_led(&self, on: bool) -> Result<()> {
        self.query(NS_SYSTEM, "set_led_off", Some(json!({"off": (!on) as u8})))
            .await?;
        Ok(())
    }

    fn on_since_of(info: &SysInfo) -> Option<NaiveDateTime> {
        let secs = info.i64("on_time")?;
        Some(Local::now().naive_local() - TimeDelta::seconds(secs))
    }

    /// Local time the relay was last switched on.
    pub async fn on_since(&self) -> Result<Option<NaiveDateTime>> {
        Ok(Self::on_since_of(&self.sys_info().await?))
    }

    pub fn has_emeter_in(info: &SysInfo) -> bool {
        info.str("feature")
            .is_some_and(|f| f.split(':').any(|t| t == FEATURE_ENERGY_METER))
    }
}

#[async_trait]
impl SmartDevice for SmartPlug {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    async fn is_on(&self) -> Result<bool> {
        Ok(self.state().await? == PlugState::On)
    }

    async fn turn_on(&self) -> Result<()> {
        self.set_relay(true).await
    }

    async fn turn_off(&self) -> Result<()> {
        self.set_relay(false).await
    }

    async fn has_emeter(&self) -> Result<bool> {
        Ok(Self::has_emeter_in(&self.sys_info().await?))
    }

    async fn state_information(&self) -> Result<BTreeMap<String, Value>> {
        let info = self.sys_info().await?;
        let on_since = Self::on_since_of(&info)
            .map(|t| Value::String(t.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null);
        Ok(BTreeMap::from([
            ("LED state".to_string(), Value::Bool(Self::led_of(&info)?)),
            ("On since".to_string(), on_since),
        ]))
    }
}

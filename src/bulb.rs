//! Smart bulbs: dimmable, color and tunable-white lights.
//!
//! Light attributes come from the lighting service rather than sysinfo. While a
//! bulb is off it reports its look in a nested `dft_on_state` object instead of
//! the top-level fields; [`LightState::active`] is the single place that picks
//! between the two.

use crate::device::{DeviceCore, SmartDevice, SysInfo};
use crate::diagnostics::DiagnosticSink;
use crate::emeter::EmeterConfig;
use crate::error::{Result, SmartHomeError};
use crate::protocol::NS_LIGHTING;
use crate::query::{TcpTransport, Transport};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

const CMD_GET_LIGHT_STATE: &str = "get_light_state";
const CMD_TRANSITION: &str = "transition_light_state";

/// Accepted color temperatures, in Kelvin.
pub const COLOR_TEMP_RANGE: RangeInclusive<u32> = 2700..=6500;

/// Convert an 8-bit brightness to the device's percent scale (truncating).
pub fn brightness_to_native(external: u8) -> u8 {
    (external as u32 * 100 / 255) as u8
}

/// Convert a device percent to the 8-bit scale (truncating).
pub fn brightness_from_native(native: u8) -> u8 {
    (native as u32 * 255 / 100).min(255) as u8
}

/// Light attributes as reported by the lighting service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LightAttributes {
    pub hue: Option<u32>,
    pub saturation: Option<u32>,
    pub color_temp: Option<u32>,
    /// Percent, 0-100
    pub brightness: Option<u32>,
}

/// Result of `get_light_state`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LightState {
    pub on_off: u8,
    #[serde(flatten)]
    pub current: LightAttributes,
    #[serde(default)]
    pub dft_on_state: Option<LightAttributes>,
}

impl LightState {
    pub fn is_on(&self) -> bool {
        self.on_off != 0
    }

    /// Attributes describing the light's look: the live values while on, the
    /// default on-state while off.
    pub fn active(&self) -> Result<&LightAttributes> {
        if self.is_on() {
            return Ok(&self.current);
        }
        self.dft_on_state.as_ref().ok_or_else(|| {
            SmartHomeError::InvalidPayload("Bulb is off but reports no dft_on_state".into())
        })
    }
}

/// Bulb power as reported by `on_off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulbState {
    On,
    Off,
}

impl fmt::Display for BulbState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulbState::On => write!(f, "ON"),
            BulbState::Off => write!(f, "OFF"),
        }
    }
}

/// Hue in degrees, saturation in percent, value on the 8-bit scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsv {
    pub hue: u16,
    pub saturation: u8,
    pub value: u8,
}

impl Hsv {
    fn from_attributes(attrs: &LightAttributes) -> Result<Self> {
        match (attrs.hue, attrs.saturation, attrs.brightness) {
            (Some(h), Some(s), Some(b)) => Ok(Hsv {
                hue: reported("hue", h, 360)? as u16,
                saturation: reported("saturation", s, 100)? as u8,
                value: brightness_from_native(reported("brightness", b, 100)? as u8),
            }),
            _ => Err(SmartHomeError::InvalidPayload(
                "Light state lacks hue, saturation or brightness".into(),
            )),
        }
    }
}

/// A device-reported value, rejected if it exceeds `max`.
fn reported(field: &str, value: u32, max: u32) -> Result<u32> {
    if value > max {
        return Err(SmartHomeError::InvalidPayload(format!(
            "Device reported {} {} above {}",
            field, value, max
        )));
    }
    Ok(value)
}

/// A TP-Link smart bulb.
#[derive(Debug, Clone)]
pub struct SmartBulb {
    core: DeviceCore,
}

impl SmartBulb {
    pub fn new(host: &str) -> Result<Self> {
        Self::with_transport(host, Arc::new(TcpTransport::new()))
    }

    pub fn with_transport(host: &str, transport: Arc<dyn Transport>) -> Result<Self> {
        DeviceCore::new(host, EmeterConfig::BULB, transport).map(Self::from_core)
    }

    pub(crate) fn from_core(core: DeviceCore) -> Self {
        Self { core }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.core = self.core.with_sink(sink);
        self
    }

    pub async fn is_color(&self) -> Result<bool> {
        Ok(self.sys_info().await?.flag("is_color"))
    }

    pub async fn is_dimmable(&self) -> Result<bool> {
        Ok(self.sys_info().await?.flag("is_dimmable"))
    }

    pub async fn is_variable_color_temp(&self) -> Result<bool> {
        Ok(self.sys_info().await?.flag("is_variable_color_temp"))
    }

    pub async fn light_state(&self) -> Result<LightState> {
        let res = self.query(NS_LIGHTING, CMD_GET_LIGHT_STATE, None).await?;
        Ok(serde_json::from_value(Value::Object(res))?)
    }

    pub async fn set_light_state(&self, state: Value) -> Result<Map<String, Value>> {
        self.query(NS_LIGHTING, CMD_TRANSITION, Some(state)).await
    }

    pub async fn state(&self) -> Result<BulbState> {
        Ok(if self.light_state().await?.is_on() {
            BulbState::On
        } else {
            BulbState::Off
        })
    }

    pub async fn set_state(&self, state: BulbState) -> Result<()> {
        let on_off = match state {
            BulbState::On => 1,
            BulbState::Off => 0,
        };
        self.set_light_state(json!({"on_off": on_off})).await?;
        Ok(())
    }

    /// Current color, or `None` on bulbs without color support.
    pub async fn hsv(&self) -> Result<Option<Hsv>> {
        if !self.is_color().await? {
            return Ok(None);
        }
        let state = self.light_state().await?;
        Hsv::from_attributes(state.active()?).map(Some)
    }

    /// Set color. Does nothing on bulbs without color support.
    pub async fn set_hsv(&self, hsv: Hsv) -> Result<()> {
        if hsv.hue > 360 {
            return Err(SmartHomeError::OutOfRange(format!("hue {}", hsv.hue)));
        }
        if hsv.saturation > 100 {
            return Err(SmartHomeError::OutOfRange(format!(
                "saturation {}",
                hsv.saturation
            )));
        }
        if !self.is_color().await? {
            return Ok(());
        }
        self.set_light_state(json!({
            "hue": hsv.hue,
            "saturation": hsv.saturation,
            "brightness": brightness_to_native(hsv.value),
            "color_temp": 0,
        }))
        .await?;
        Ok(())
    }

    /// Color temperature in Kelvin, or `None` on fixed-white bulbs.
    pub async fn color_temp(&self) -> Result<Option<u32>> {
        if !self.is_variable_color_temp().await? {
            return Ok(None);
        }
        Ok(self.light_state().await?.active()?.color_temp)
    }

    /// Set color temperature. Does nothing on fixed-white bulbs.
    pub async fn set_color_temp(&self, kelvin: u32) -> Result<()> {
        if !COLOR_TEMP_RANGE.contains(&kelvin) {
            return Err(SmartHomeError::OutOfRange(format!("color temperature {}K", kelvin)));
        }
        if !self.is_variable_color_temp().await? {
            return Ok(());
        }
        self.set_light_state(json!({"color_temp": kelvin})).await?;
        Ok(())
    }

    /// Brightness in percent, or `None` on non-dimmable bulbs.
    pub async fn brightness(&self) -> Result<Option<u8>> {
        if !self.is_dimmable().await? {
            return Ok(None);
        }
        let state = self.light_state().await?;
        state
            .active()?
            .brightness
            .map(|b| reported("brightness", b, 100).map(|b| b as u8))
            .transpose()
    }

    /// Set brightness in percent. Does nothing on non-dimmable bulbs.
    pub async fn set_brightness(&self, percent: u8) -> Result<()> {
        if percent > 100 {
            return Err(SmartHomeError::OutOfRange(format!("brightness {}", percent)));
        }
        if !self.is_dimmable().await? {
            return Ok(());
        }
        self.set_light_state(json!({"brightness": percent})).await?;
        Ok(())
    }

    fn describe(info: &SysInfo, state: &LightState) -> Result<BTreeMap<String, Value>> {
        let attrs = state.active()?;
        let dimmable = info.flag("is_dimmable");
        let mut out = BTreeMap::new();
        out.insert(
            "Brightness".to_string(),
            match attrs.brightness {
                Some(b) if dimmable => json!(b),
                _ => Value::Null,
            },
        );
        out.insert("Is dimmable".to_string(), Value::Bool(dimmable));
        if info.flag("is_variable_color_temp") {
            out.insert("Color temperature".to_string(), json!(attrs.color_temp));
        }
        if info.flag("is_color") {
            let hsv = Hsv::from_attributes(attrs)?;
            out.insert(
                "HSV".to_string(),
                json!([hsv.hue, hsv.saturation, hsv.value]),
            );
        }
        Ok(out)
    }
}

#[async_trait]
impl SmartDevice for SmartBulb {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    async fn is_on(&self) -> Result<bool> {
        Ok(self.state().await? == BulbState::On)
    }

    async fn turn_on(&self) -> Result<()> {
        self.set_state(BulbState::On).await
    }

    async fn turn_off(&self) -> Result<()> {
        self.set_state(BulbState::Off).await
    }

    /// Every bulb family carries a meter.
    async fn has_emeter(&self) -> Result<bool> {
        Ok(true)
    }

    async fn state_information(&self) -> Result<BTreeMap<String, Value>> {
        let info = self.sys_info().await?;
        let state = self.light_state().await?;
        Self::describe(&info, &state)
    }
}

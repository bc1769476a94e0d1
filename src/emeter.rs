//! Energy meter queries shared by every device family.
//!
//! Families differ only in the namespace they expose metering under and in
//! whether they report scaled (`_wh`, `_mw`) or raw values; both are captured
//! by [`EmeterConfig`].

use crate::error::{Result, SmartHomeError};
use crate::protocol::{CMD_GET_REALTIME, NS_BULB_EMETER, NS_EMETER, Request};
use crate::query::QueryEngine;
use chrono::Datelike;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

const CMD_GET_DAYSTAT: &str = "get_daystat";
const CMD_GET_MONTHSTAT: &str = "get_monthstat";
const CMD_ERASE: &str = "erase_emeter_stat";

/// Per-family metering layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmeterConfig {
    /// Namespace carrying the metering commands
    pub namespace: &'static str,
    /// True if the family reports `energy_wh`/`power_mw` instead of `energy`/`power`
    pub scaled_units: bool,
}

impl EmeterConfig {
    pub const PLUG: EmeterConfig = EmeterConfig {
        namespace: NS_EMETER,
        scaled_units: false,
    };

    pub const BULB: EmeterConfig = EmeterConfig {
        namespace: NS_BULB_EMETER,
        scaled_units: true,
    };

    pub fn energy_key(&self) -> &'static str {
        if self.scaled_units { "energy_wh" } else { "energy" }
    }

    fn request(&self, command: &str, args: Option<Value>) -> Request {
        Request::new(self.namespace, command, args)
    }

    pub async fn realtime(&self, engine: &QueryEngine, host: Ipv4Addr) -> Result<Map<String, Value>> {
        engine.query(host, &self.request(CMD_GET_REALTIME, None)).await
    }

    /// Instantaneous power draw in watts.
    pub async fn current_consumption(&self, engine: &QueryEngine, host: Ipv4Addr) -> Result<f64> {
        let reading = self.realtime(engine, host).await?;
        self.power_watts(&reading)
    }

    pub fn power_watts(&self, reading: &Map<String, Value>) -> Result<f64> {
        let (key, divisor) = if self.scaled_units {
            ("power_mw", 1000.0)
        } else {
            ("power", 1.0)
        };
        reading
            .get(key)
            .and_then(Value::as_f64)
            .map(|p| p / divisor)
            .ok_or_else(|| SmartHomeError::InvalidPayload(format!("No {} in realtime reading", key)))
    }

    /// Energy per day of the given month. Defaults to the current month.
    pub async fn daily(
        &self,
        engine: &QueryEngine,
        host: Ipv4Addr,
        year: Option<i32>,
        month: Option<u32>,
    ) -> Result<BTreeMap<u32, f64>> {
        let today = chrono::Local::now();
        let year = year.unwrap_or_else(|| today.year());
        let month = month.unwrap_or_else(|| today.month());
        let response = engine
            .query(
                host,
                &self.request(CMD_GET_DAYSTAT, Some(json!({"month": month, "year": year}))),
            )
            .await?;
        self.period_map(&response, "day_list", "day")
    }

    /// Energy per month of the given year. Defaults to the current year.
    pub async fn monthly(
        &self,
        engine: &QueryEngine,
        host: Ipv4Addr,
        year: Option<i32>,
    ) -> Result<BTreeMap<u32, f64>> {
        let year = year.unwrap_or_else(|| chrono::Local::now().year());
        let response = engine
            .query(host, &self.request(CMD_GET_MONTHSTAT, Some(json!({"year": year}))))
            .await?;
        self.period_map(&response, "month_list", "month")
    }

    /// Irreversibly clear the stored statistics.
    pub async fn erase(&self, engine: &QueryEngine, host: Ipv4Addr) -> Result<()> {
        engine.query(host, &self.request(CMD_ERASE, None)).await?;
        Ok(())
    }

    /// Turn a `*_list` of per-period entries into `period -> energy`.
    pub fn period_map(
        &self,
        response: &Map<String, Value>,
        list_key: &str,
        period_key: &str,
    ) -> Result<BTreeMap<u32, f64>> {
        let entries = response
            .get(list_key)
            .and_then(Value::as_array)
            .ok_or_else(|| SmartHomeError::InvalidPayload(format!("No {} in response", list_key)))?;

        let energy_key = self.energy_key();
        entries
            .iter()
            .map(|entry| {
                let period = entry.get(period_key).and_then(Value::as_u64);
                let energy = entry.get(energy_key).and_then(Value::as_f64);
                match (period, energy) {
                    (Some(p), Some(e)) => Ok((p as u32, e)),
                    _ => Err(SmartHomeError::InvalidPayload(format!(
                        "Malformed {} entry: {}",
                        list_key, entry
                    ))),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_daily_map_scaled() {
        let resp = as_map(json!({"day_list": [
            {"year": 2024, "month": 3, "day": 1, "energy_wh": 120},
            {"year": 2024, "month": 3, "day": 2, "energy_wh": 80},
        ]}));
        let map = EmeterConfig::BULB.period_map(&resp, "day_list", "day").unwrap();
        assert_eq!(map, BTreeMap::from([(1, 120.0), (2, 80.0)]));
    }

    #[test]
    fn test_daily_map_raw_uses_energy_field() {
        let resp = as_map(json!({"day_list": [
            {"day": 1, "energy": 0.12, "energy_wh": 999},
            {"day": 2, "energy": 0.08},
        ]}));
        let map = EmeterConfig::PLUG.period_map(&resp, "day_list", "day").unwrap();
        assert_eq!(map, BTreeMap::from([(1, 0.12), (2, 0.08)]));
    }

    #[test]
    fn test_missing_energy_field_is_rejected() {
        let resp = as_map(json!({"month_list": [{"month": 1, "energy": 3.5}]}));
        assert!(EmeterConfig::BULB.period_map(&resp, "month_list", "month").is_err());
        assert!(EmeterConfig::PLUG.period_map(&resp, "day_list", "day").is_err());
    }

    #[test]
    fn test_power_units() {
        let plug = as_map(json!({"power": 12.5, "voltage": 230.1}));
        assert_eq!(EmeterConfig::PLUG.power_watts(&plug).unwrap(), 12.5);
        let bulb = as_map(json!({"power_mw": 9000}));
        assert_eq!(EmeterConfig::BULB.power_watts(&bulb).unwrap(), 9.0);
        assert!(EmeterConfig::BULB.power_watts(&plug).is_err());
    }
}

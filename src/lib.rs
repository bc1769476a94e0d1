//! # tplink-smarthome
//!
//! Local-network client for TP-Link Smart Home plugs and bulbs. Discovers
//! devices by UDP broadcast and talks to them over the framed, XOR-obfuscated
//! JSON protocol on port 9999, without any cloud service.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tplink_smarthome::{SmartDevice, SmartPlug};
//!
//! # async fn run() -> tplink_smarthome::Result<()> {
//! let plug = SmartPlug::new("192.168.1.105")?;
//! plug.turn_on().await?;
//! println!("alias: {:?}, on: {}", plug.alias().await?, plug.is_on().await?);
//! # Ok(())
//! # }
//! ```
//!
//! A blocking API lives in [`sync`].
pub mod bulb;
pub mod crypto;
pub mod device;
pub mod diagnostics;
pub mod discovery;
pub mod emeter;
pub mod error;
pub mod plug;
pub mod protocol;
pub mod query;
pub mod sync;

pub use bulb::{BulbState, Hsv, LightState, SmartBulb};
pub use device::{Device, DeviceFamily, Location, SmartDevice, SysInfo};
pub use diagnostics::{DiagnosticSink, LogSink};
pub use discovery::{Discover, DiscoveryResult};
pub use emeter::EmeterConfig;
pub use error::{ErrorKind, Result, SmartHomeError};
pub use plug::{PlugState, SmartPlug};
pub use protocol::Request;
pub use query::{QueryEngine, TcpTransport, Transport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version() -> &'static str {
    VERSION
}

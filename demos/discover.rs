/**
 * Discovery Example (Sync)
 *
 * Broadcasts a discovery probe and prints every plug and bulb that answers,
 * using the blocking API. Run with RUST_LOG=debug to see the exchange.
 */
use std::time::Duration;
use tplink_smarthome::sync;

fn main() {
    env_logger::init();
    println!("--- tplink-smarthome - Discovery (Sync) ---");
    println!("[INFO] Broadcasting on the local network...");

    let devices = match sync::discover(Duration::from_secs(3), 9999) {
        Ok(devices) => devices,
        Err(e) => {
            println!("[ERROR] Discovery failed: {}", e);
            return;
        }
    };

    for (count, (ip, device)) in devices.iter().enumerate() {
        let alias = device.alias().ok().flatten().unwrap_or_default();
        let state = match device.is_on() {
            Ok(true) => "ON",
            Ok(false) => "OFF",
            Err(_) => "?",
        };
        println!(
            "[{}] Found {:?} at {}: alias={:?}, state={}",
            count + 1,
            device.family(),
            ip,
            alias,
            state
        );
    }

    println!("[INFO] Discovery finished. Total devices found: {}", devices.len());
}

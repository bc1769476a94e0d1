/**
 * Plug Control Example (Async)
 *
 * Reads the state of a single plug, toggles its relay and prints the energy
 * meter readings when the model has one.
 *
 * Usage: cargo run --example plug_control -- 192.168.1.105
 */
use tplink_smarthome::{SmartDevice, SmartPlug};

#[tokio::main]
async fn main() {
    env_logger::init();
    let host = std::env::args().nth(1).unwrap_or_else(|| "192.168.1.105".to_string());
    println!("--- tplink-smarthome - Plug Control (Async) ---");

    let plug = match SmartPlug::new(&host) {
        Ok(plug) => plug,
        Err(e) => {
            println!("[ERROR] {}", e);
            return;
        }
    };

    match plug.alias().await {
        Ok(alias) => println!("[INFO] Connected to {:?} at {}", alias, host),
        Err(e) => {
            println!("[ERROR] Device unreachable: {}", e);
            return;
        }
    }

    match plug.state().await {
        Ok(state) => println!("[INFO] Relay is {}", state),
        Err(e) => println!("[ERROR] State failed: {}", e),
    }

    println!("[INFO] Toggling relay...");
    if let Err(e) = plug.toggle().await {
        println!("[ERROR] Toggle failed: {}", e);
    }

    match plug.current_consumption().await {
        Ok(Some(watts)) => println!("[INFO] Drawing {:.1} W", watts),
        Ok(None) => println!("[INFO] No energy meter on this model"),
        Err(e) => println!("[ERROR] Realtime reading failed: {}", e),
    }

    if let Ok(Some(daily)) = plug.emeter_daily(None, None).await {
        for (day, kwh) in daily {
            println!("  day {:>2}: {:.3} kWh", day, kwh);
        }
    }

    println!("[INFO] Done.");
}

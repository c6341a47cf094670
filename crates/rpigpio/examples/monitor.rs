//! Print every level change on a few GPIOs for ten seconds.
//!
//! Run with:
//!   cargo run --example monitor -- 4 17 27

use std::thread;
use std::time::Duration;

use rpigpio::Edge;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let gpios: Vec<u32> = std::env::args()
        .skip(1)
        .map(|arg| arg.parse())
        .collect::<Result<_, _>>()?;
    let gpios = if gpios.is_empty() { vec![4] } else { gpios };

    let pi = rpigpio::connect()?;
    let listener = pi.notifier()?;

    let mut subscriptions = Vec::new();
    for gpio in gpios {
        subscriptions.push(listener.register(gpio, Edge::Either, |event| {
            println!("gpio={} level={} tick={}", event.gpio, event.level, event.tick);
        })?);
    }
    eprintln!("Watching mask {:#010x}", listener.monitor_mask());

    thread::sleep(Duration::from_secs(10));

    for id in subscriptions {
        listener.unregister(id)?;
    }
    pi.close();
    Ok(())
}

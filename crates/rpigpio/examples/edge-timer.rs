//! Measure the time from a falling edge on GPIO 19 to a rising edge on GPIO 26.
//!
//! Run with:
//!   PIGPIO_ADDR=raspberrypi.local cargo run --example edge-timer
//!
//! Repeats ten measurements with a one second guard each.

use std::time::Duration;

use rpigpio::{Edge, EdgeTrigger};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let pi = rpigpio::connect()?;
    eprintln!("Connected to {}", pi.config().endpoint);

    let timer = pi.event_timer()?;
    timer.configure(
        EdgeTrigger::new(19, Edge::Falling),
        EdgeTrigger::new(26, Edge::Rising),
    )?;

    for attempt in 1..=10 {
        let result = timer.run(Duration::from_secs(1))?;
        if result.is_success() {
            eprintln!("#{attempt}: {} us", result.elapsed_us);
        } else {
            eprintln!("#{attempt}: timed out ({:?})", result.state);
        }
    }

    pi.close();
    Ok(())
}

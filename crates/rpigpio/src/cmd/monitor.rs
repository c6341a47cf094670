use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use tracing::debug;

use crate::cmd::{DaemonArgs, MonitorArgs};
use crate::exit::{pigpio_error, CliError, CliResult, INTERNAL, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_record, EdgeOutput, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: MonitorArgs, daemon: &DaemonArgs, format: OutputFormat) -> CliResult<i32> {
    let pi = daemon.connect()?;
    let listener = pi
        .notifier()
        .map_err(|err| pigpio_error("start notifications", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (tx, rx) = mpsc::channel();
    let mut subscriptions = Vec::with_capacity(args.gpios.len());
    for &gpio in &args.gpios {
        let tx = tx.clone();
        let id = listener
            .register(gpio, args.edge, move |event| {
                let _ = tx.send(event);
            })
            .map_err(|err| pigpio_error(&format!("monitor GPIO {gpio}"), err))?;
        subscriptions.push(id);
    }
    drop(tx);

    let mut printed = 0usize;
    let mut code = SUCCESS;
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                print_record(&EdgeOutput::from(event), format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if !listener.is_running() {
                    let reason = listener.last_fault().unwrap_or_default();
                    eprintln!("error: notification stream lost: {reason}");
                    code = TRANSPORT_ERROR;
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(printed, "monitor finished");
    for id in subscriptions {
        let _ = listener.unregister(id);
    }
    Ok(code)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

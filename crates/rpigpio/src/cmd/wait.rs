use crate::cmd::{parse_duration, DaemonArgs, WaitArgs};
use crate::exit::{pigpio_error, CliResult, SUCCESS};
use crate::output::{print_record, EdgeOutput, OutputFormat};

pub fn run(args: WaitArgs, daemon: &DaemonArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let pi = daemon.connect()?;
    let listener = pi
        .notifier()
        .map_err(|err| pigpio_error("start notifications", err))?;

    let context = format!("wait for {} edge on GPIO {}", args.edge, args.gpio);
    let event = listener
        .wait_for_edge(args.gpio, args.edge, timeout)
        .map_err(|err| pigpio_error(&context, err))?;

    print_record(&EdgeOutput::from(event), format);
    Ok(SUCCESS)
}

use serde::Serialize;

use rpigpio_client::{TimerOutcome, TimerResult, TimerState};

use crate::cmd::{parse_duration, DaemonArgs, TimeArgs};
use crate::exit::{pigpio_error, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_record, OutputFormat, Record};

#[derive(Serialize)]
struct TimeOutput {
    start: String,
    stop: String,
    outcome: &'static str,
    state: &'static str,
    elapsed_us: u32,
}

impl TimeOutput {
    fn new(args: &TimeArgs, result: &TimerResult) -> Self {
        Self {
            start: args.start.to_string(),
            stop: args.stop.to_string(),
            outcome: outcome_name(result.outcome),
            state: state_name(result.state),
            elapsed_us: result.elapsed_us,
        }
    }
}

impl Record for TimeOutput {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("start", self.start.clone()),
            ("stop", self.stop.clone()),
            ("outcome", self.outcome.to_string()),
            ("state", self.state.to_string()),
            ("elapsed_us", self.elapsed_us.to_string()),
        ]
    }
}

pub fn run(args: TimeArgs, daemon: &DaemonArgs, format: OutputFormat) -> CliResult<i32> {
    let guard = parse_duration(&args.timeout)?;
    let pi = daemon.connect()?;
    let timer = pi
        .event_timer()
        .map_err(|err| pigpio_error("start notifications", err))?;
    timer
        .configure(args.start, args.stop)
        .map_err(|err| pigpio_error("configure timer", err))?;

    let result = timer
        .run(guard)
        .map_err(|err| pigpio_error("measure", err))?;

    print_record(&TimeOutput::new(&args, &result), format);
    if result.is_success() {
        Ok(SUCCESS)
    } else {
        Ok(TIMEOUT)
    }
}

fn outcome_name(outcome: TimerOutcome) -> &'static str {
    match outcome {
        TimerOutcome::Success => "success",
        TimerOutcome::Timeout => "timeout",
    }
}

fn state_name(state: TimerState) -> &'static str {
    match state {
        TimerState::NeverStarted => "never_started",
        TimerState::OnlyStartedNeverStopped => "only_started_never_stopped",
        TimerState::Success => "success",
    }
}

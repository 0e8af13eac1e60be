use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use saycount_core::{
    Announcer, CommandAnnouncer, Config, CountdownEngine, CountdownEvent, EngineOptions,
    LogAnnouncer, RunOutcome, SystemClock,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Args)]
pub struct RunArgs {
    /// Countdown length in whole seconds (defaults to countdown.default_seconds)
    #[arg(allow_hyphen_values = true)]
    seconds: Option<String>,
    /// Print events as JSON lines instead of the progress line
    #[arg(long)]
    json: bool,
    /// Log utterances instead of speaking them
    #[arg(long)]
    silent: bool,
}

/// Parse the duration argument, falling back to the configured default.
fn resolve_seconds(arg: Option<&str>, default: u32) -> (u32, bool) {
    match arg.map(|raw| raw.trim().parse::<u32>()) {
        None => (default, false),
        Some(Ok(seconds)) if seconds > 0 => (seconds, false),
        Some(_) => (default, true),
    }
}

fn build_announcer(config: &Config, silent: bool) -> Box<dyn Announcer> {
    if silent || !config.announcer.enabled {
        return Box::new(LogAnnouncer);
    }
    match CommandAnnouncer::from_config(&config.announcer) {
        Ok(announcer) => {
            tracing::debug!(program = %announcer.program().display(), "using speech program");
            Box::new(announcer)
        }
        Err(e) => {
            tracing::warn!(error = %e, "speech unavailable; counting silently");
            Box::new(LogAnnouncer)
        }
    }
}

fn print_event(event: &CountdownEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, "failed to serialize event"),
    }
}

/// Poll until the run ends or Ctrl+C arrives. Returns `true` on interrupt.
fn wait_or_interrupt(engine: &CountdownEngine) -> Result<bool, Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let interrupted = rt.block_on(async {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "failed to listen for Ctrl+C");
                }
                true
            }
            () = async {
                while engine.is_running() {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            } => false,
        }
    });
    Ok(interrupted)
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let default = config.countdown.default_seconds;
    let (seconds, fell_back) = resolve_seconds(args.seconds.as_deref(), default);
    if fell_back {
        println!("Invalid duration. Using default {default} seconds.");
    }

    let engine = CountdownEngine::with_options(
        build_announcer(&config, args.silent),
        Arc::new(SystemClock),
        EngineOptions::from(&config),
    )?;

    let json = args.json;
    if !json {
        println!("\nStarting {seconds}-second countdown...\n");
    }
    let countdown = engine.scoped();
    let started = countdown.start_with(seconds, move |count| {
        if json {
            // The initial tick is printed after the Started event.
            if count < seconds {
                print_event(&CountdownEvent::tick(count));
            }
            if count == 0 {
                print_event(&CountdownEvent::completed());
            }
        } else {
            print!("\rCountdown: {count} ");
            let _ = std::io::stdout().flush();
        }
    })?;
    if json {
        print_event(&started);
        print_event(&CountdownEvent::tick(seconds));
    }

    if wait_or_interrupt(&countdown)? {
        let stopped = countdown.stop();
        if json {
            if let Some(event) = stopped {
                print_event(&event);
            }
        } else {
            println!("\n\nCountdown interrupted by user");
        }
    }
    countdown.wait();
    drop(countdown);

    let outcome = engine.outcome();
    for e in engine.shutdown() {
        tracing::warn!(error = %e, "countdown reported an error");
    }
    match outcome {
        Some(RunOutcome::Completed) => {
            if !json {
                println!("\n\nCountdown complete!");
            }
            Ok(())
        }
        Some(RunOutcome::Stopped) => Ok(()),
        Some(RunOutcome::Failed) | None => Err("countdown failed before completion".into()),
    }
}

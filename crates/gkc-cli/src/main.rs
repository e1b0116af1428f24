//! `gkc-cli` – go-kart controller command line
//!
//! Runs the full controller stack against the simulated CAN bus:
//!
//! 1. Loads `~/.gkc/config.toml` (written with defaults on first run) and
//!    applies `GKC_*` environment overrides.
//! 2. Wires the actuation controller, lifecycle state machine, command link,
//!    and watchdog, then initializes and activates the vehicle.
//! 3. A demo pilot thread feeds the command link; with
//!    `--silence-link-after <n>` it goes quiet after `n` cycles so the watchdog
//!    trips the emergency stop.
//! 4. Intercepts **Ctrl-C** to stop the control loop and shut down in order.

mod config;

use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use gkc_hal::{ActuationController, SimCanBus};
use gkc_kernel::{
    AtomicIndicator, Clock, GkcStateMachine, LifecycleHooks, ProcessReset, SharedStateMachine,
    SystemClock, Watchdog,
};
use gkc_runtime::{CommandLink, ControlLoop, DriveCommand, VehicleHooks, share_actuation};
use gkc_types::{GkcError, GkcLifecycle, StateTransitionResult};

#[derive(Parser, Debug)]
#[command(name = "gkc", version, about = "Go-kart controller on a simulated CAN bus")]
struct Cli {
    /// Config file to use instead of ~/.gkc/config.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many control cycles (default: run until Ctrl-C).
    #[arg(long)]
    cycles: Option<u64>,

    /// Stop feeding the command link after this many cycles.
    #[arg(long)]
    silence_link_after: Option<u64>,
}

fn main() -> ExitCode {
    gkc_runtime::init_tracing();
    let cli = Cli::parse();
    print_banner();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    // ── Configuration ─────────────────────────────────────────────────────
    let path = cli.config.unwrap_or_else(config::config_path);
    let (mut cfg, created) = config::load_or_init(&path)?;
    if created {
        println!(
            "  {} Default config written to {}",
            "✓".green().bold(),
            path.display().to_string().bold()
        );
    } else {
        println!("  Config loaded from {}", path.display().to_string().bold());
    }
    config::apply_env_overrides(&mut cfg);
    cfg.validate()?;
    let period = Duration::from_millis(cfg.control_period_ms);

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the kart …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Wiring ────────────────────────────────────────────────────────────
    let bus = SimCanBus::new();
    let actuation = share_actuation(ActuationController::new(cfg.vehicle.clone(), bus.clone())?);
    let ready_led = Arc::new(AtomicIndicator::new());
    let state_machine = GkcStateMachine::new(
        VehicleHooks::new(actuation.clone()),
        ready_led.clone(),
        Arc::new(ProcessReset),
    )
    .into_shared();

    let link = Arc::new(CommandLink::from_config(&cfg.watchdog));
    link.wire_emergency_stop(state_machine.clone());

    let watchdog = Arc::new(Watchdog::from_config(&cfg.watchdog, Arc::new(ProcessReset)));
    watchdog.add_to_watchlist(link.clone());

    // ── Bring-up ──────────────────────────────────────────────────────────
    bring_up(&state_machine)?;
    println!("  Vehicle {}", "ACTIVE".green().bold());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    watchdog.arm();
    let supervisor = watchdog.clone().spawn(clock.clone())?;
    let pilot = spawn_pilot(link.clone(), period, shutdown.clone(), cli.silence_link_after)?;

    // ── Control loop ──────────────────────────────────────────────────────
    let control = ControlLoop::new(state_machine.clone(), actuation, link);
    let cycles = control.run(clock.as_ref(), period, &shutdown, cli.cycles);

    // ── Orderly shutdown ──────────────────────────────────────────────────
    shutdown.store(true, Ordering::SeqCst);
    if pilot.join().is_err() {
        warn!("pilot thread panicked");
    }
    watchdog.disarm();
    supervisor.stop();

    let final_state = {
        let mut sm = state_machine.lock().unwrap_or_else(PoisonError::into_inner);
        if sm.state() == GkcLifecycle::Active {
            sm.deactivate();
        }
        sm.state()
    };
    info!(cycles, state = %final_state, "controller stopped");

    println!();
    println!("  Control cycles : {}", cycles.to_string().bold());
    println!("  Frames sent    : {}", bus.sent_count().to_string().bold());
    println!("  Bus resets     : {}", bus.reset_count().to_string().bold());
    println!("  Final state    : {}", state_label(final_state));
    println!("  Ready LED      : {}", if ready_led.is_ready() { "on".green() } else { "off".dimmed() });
    Ok(())
}

/// Initialize and activate the vehicle.
///
/// # Errors
///
/// Returns [`GkcError::Lifecycle`] naming the first transition that did not
/// succeed, its result, and the state the vehicle was left in.
fn bring_up<H: LifecycleHooks>(state_machine: &SharedStateMachine<H>) -> Result<(), GkcError> {
    let mut sm = state_machine.lock().unwrap_or_else(PoisonError::into_inner);
    let (transition, result) = match sm.initialize() {
        StateTransitionResult::Success => ("activate", sm.activate()),
        other => ("initialize", other),
    };
    if result != StateTransitionResult::Success {
        return Err(GkcError::Lifecycle(format!(
            "{transition} returned {result:?}; vehicle left {}",
            sm.state()
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Demo pilot
// ─────────────────────────────────────────────────────────────────────────────

/// Feed the command link with a gentle slalom at 2 m/s, one command per
/// control period, until shutdown or `silence_after` commands.
fn spawn_pilot(
    link: Arc<CommandLink>,
    period: Duration,
    shutdown: Arc<AtomicBool>,
    silence_after: Option<u64>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("gkc-pilot".into())
        .spawn(move || {
            let mut sent: u64 = 0;
            while !shutdown.load(Ordering::SeqCst) {
                if silence_after.is_some_and(|limit| sent >= limit) {
                    info!(sent, "pilot going silent");
                    break;
                }
                let steering = 0.2 * (sent as f32 * 0.1).sin();
                link.submit(DriveCommand::new(2.0, steering, 0.0));
                sent += 1;
                thread::sleep(period);
            }
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn state_label(state: GkcLifecycle) -> colored::ColoredString {
    match state {
        GkcLifecycle::Active => state.to_string().green().bold(),
        GkcLifecycle::Emergency => state.to_string().red().bold(),
        _ => state.to_string().yellow(),
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   ____ _  ______"#.bold().cyan());
    println!("{}", r#"  / ___| |/ / ___|"#.bold().cyan());
    println!("{}", r#" | |  _| ' / |    "#.bold().cyan());
    println!("{}", r#" | |_| | . \ |___ "#.bold().cyan());
    println!("{}", r#"  \____|_|\_\____|"#.bold().cyan());
    println!();
    println!("  {} {}",
        "gkc".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Go-kart controller");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use gkc_kernel::RecordingReset;

    fn vehicle(bus: &SimCanBus) -> SharedStateMachine<VehicleHooks<SimCanBus>> {
        let act = ActuationController::new(Default::default(), bus.clone()).unwrap();
        GkcStateMachine::new(
            VehicleHooks::new(share_actuation(act)),
            Arc::new(AtomicIndicator::new()),
            Arc::new(RecordingReset::new()),
        )
        .into_shared()
    }

    #[test]
    fn bring_up_activates_the_vehicle() {
        let sm = vehicle(&SimCanBus::new());
        bring_up(&sm).unwrap();
        assert_eq!(sm.lock().unwrap().state(), GkcLifecycle::Active);
    }

    #[test]
    fn failed_initialize_is_a_lifecycle_error() {
        let bus = SimCanBus::new();
        let sm = vehicle(&bus);
        bus.reject_next(1);

        let err = bring_up(&sm).unwrap_err();
        let GkcError::Lifecycle(message) = &err else {
            panic!("expected a lifecycle error, got {err:?}");
        };
        assert!(message.starts_with("initialize returned Error"), "{message}");
        assert!(message.ends_with("uninitialized"), "{message}");
    }

    #[test]
    fn repeated_bring_up_reports_the_rejected_transition() {
        let sm = vehicle(&SimCanBus::new());
        bring_up(&sm).unwrap();
        let err = bring_up(&sm).unwrap_err();
        assert_eq!(
            err,
            GkcError::Lifecycle(
                "initialize returned FailureInvalidTransition; vehicle left active".into()
            )
        );
    }
}

//! Operator signal listeners
//!
//! Ctrl-C asks for a graceful stop. Typing `s`/`save` on stdin (or sending
//! `SIGUSR1` on Unix) asks for a checkpoint save; `q`/`quit` asks for a
//! stop. Listeners only enqueue requests; the run loop acts on them at the
//! next model boundary.
//!
//! Stdin is read on a detached OS thread: a blocking read cannot be
//! cancelled, and a runtime task stuck in one would hold up runtime shutdown.

use std::io::{BufRead, BufReader};
use std::thread;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::run_loop::{RunSignal, RunSignalSender};

/// Map one stdin line to a request.
pub fn parse_command(line: &str) -> Option<RunSignal> {
    match line.trim().to_ascii_lowercase().as_str() {
        "s" | "save" => Some(RunSignal::Save),
        "q" | "quit" | "stop" => Some(RunSignal::Stop),
        _ => None,
    }
}

fn dispatch(sender: &RunSignalSender, signal: RunSignal) {
    match signal {
        RunSignal::Save => {
            info!("💾 Save requested; it will run after the current model");
            sender.request_save();
        }
        RunSignal::Stop => {
            info!("🛑 Stop requested; finishing the current model first");
            sender.request_stop();
        }
    }
}

/// Spawn every listener. Handles of the runtime tasks are returned so callers
/// can abort them once the run is over; the stdin thread is left detached.
pub fn spawn_listeners(sender: &RunSignalSender) -> Vec<JoinHandle<()>> {
    spawn_stdin(sender.clone());
    let mut handles = vec![spawn_ctrl_c(sender.clone())];
    #[cfg(unix)]
    handles.push(spawn_sigusr1(sender.clone()));
    handles
}

fn spawn_ctrl_c(sender: RunSignalSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => dispatch(&sender, RunSignal::Stop),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    })
}

fn spawn_stdin(sender: RunSignalSender) {
    let spawned = thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || read_commands(BufReader::new(std::io::stdin()), &sender));
    if let Err(e) = spawned {
        warn!("Failed to start stdin listener: {}", e);
    }
}

/// Dispatch commands line by line until the input ends or the run is gone.
pub fn read_commands<R: BufRead>(reader: R, sender: &RunSignalSender) {
    for line in reader.lines() {
        if sender.is_closed() {
            return;
        }
        match line {
            Ok(line) => match parse_command(&line) {
                Some(signal) => dispatch(sender, signal),
                None if line.trim().is_empty() => {}
                None => info!("Unknown command '{}' (use 's' to save, 'q' to stop)", line.trim()),
            },
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                return;
            }
        }
    }
    debug!("stdin closed; manual commands disabled");
}

#[cfg(unix)]
fn spawn_sigusr1(sender: RunSignalSender) -> JoinHandle<()> {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let mut stream = match signal(SignalKind::user_defined1()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to listen for SIGUSR1: {}", e);
                return;
            }
        };
        while stream.recv().await.is_some() {
            dispatch(&sender, RunSignal::Save);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::run_loop::RunSignals;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command(" S "), Some(RunSignal::Save));
        assert_eq!(parse_command("save"), Some(RunSignal::Save));
        assert_eq!(parse_command("q"), Some(RunSignal::Stop));
        assert_eq!(parse_command("QUIT"), Some(RunSignal::Stop));
        assert_eq!(parse_command("status"), None);
    }

    #[test]
    fn test_dispatch_enqueues_requests() {
        let (tx, mut signals) = RunSignals::channel();
        dispatch(&tx, RunSignal::Save);
        dispatch(&tx, RunSignal::Stop);
        let requests = signals.poll();
        assert!(requests.save && requests.stop);
    }

    #[test]
    fn test_read_commands_from_lines() {
        let (tx, mut signals) = RunSignals::channel();
        read_commands(std::io::Cursor::new("\nstatus\ns\n"), &tx);
        let requests = signals.poll();
        assert!(requests.save);
        assert!(!requests.stop);

        read_commands(std::io::Cursor::new("quit\n"), &tx);
        assert!(signals.poll().stop);
    }

    #[test]
    fn test_read_commands_stops_once_run_is_gone() {
        let (tx, signals) = RunSignals::channel();
        drop(signals);
        read_commands(std::io::Cursor::new("q\n"), &tx);
        assert!(!tx.cancellation().is_cancelled());
    }

    #[test]
    fn test_runtime_shuts_down_promptly_after_listeners_abort() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let (tx, _signals) = RunSignals::channel();
        let handles = runtime.block_on(async { spawn_listeners(&tx) });
        for handle in handles {
            handle.abort();
        }

        let started = std::time::Instant::now();
        drop(runtime);
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }
}

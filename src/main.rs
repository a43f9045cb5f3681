use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::{ArgAction, Parser};

use nimd::logger::Logger;
use nimd::server;

/// nimd -- a concurrent subtraction-game server.
///
/// Two players connect, OPEN with a name, and alternate MOVE requests
/// against a shared five-pile board until one of them empties it.
#[derive(Parser, Debug)]
#[command(name = "nimd", version, about)]
struct Args {
    /// TCP port to listen on.
    port: u16,

    /// Address to bind the listener to.
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Increase log verbosity; repeat for more detail (-v, -vv, -vvv).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Maximum number of concurrent game sessions the registry may grow to.
    #[arg(long, default_value_t = 1024)]
    max_sessions: usize,
}

fn main() -> std::process::ExitCode {
    let args = Args::parse();
    let log = Arc::new(Logger::new(args.verbose));

    // A write to a peer that already closed its end must surface as an
    // `io::Error`, not kill the process outright; ignoring SIGPIPE is what
    // makes that true.
    if let Err(e) = unsafe { signal_hook::low_level::register(signal_hook::consts::SIGPIPE, || {}) } {
        log.warn(format!("failed to ignore SIGPIPE: {e}"));
    }

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        // Best-effort: if registration fails the server still runs, it just
        // won't shut down cleanly on that signal.
        if let Err(e) = signal_hook::flag::register(sig, Arc::clone(&shutdown_requested)) {
            log.warn(format!("failed to register signal handler for {sig}: {e}"));
        }
    }

    let addr = format!("{}:{}", args.bind, args.port);
    if let Err(e) = server::bind_and_serve(&addr, args.max_sessions, shutdown_requested, Arc::clone(&log)) {
        log.warn(format!("{e}"));
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

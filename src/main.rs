use scoringd::config::DaemonConfig;
use scoringd::{ipc, telemetry};
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let daemon = DaemonConfig::from_env();
    if let Err(e) = telemetry::init(&daemon.log_level) {
        eprintln!("scoringd: {e}");
        return ExitCode::FAILURE;
    }

    let default_config = match daemon.default_scoring() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "scoring configuration rejected");
            return ExitCode::FAILURE;
        }
    };

    let mut state = ipc::AppState::new(default_config);
    if let Some(path) = daemon.workspace.as_deref() {
        if let Err(e) = state.open_workspace(path) {
            warn!(workspace = %path.display(), error = %e, "startup workspace not opened");
        }
    }
    info!(version = env!("CARGO_PKG_VERSION"), "scoringd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to reply to; answer anyway so the host does not hang.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{resp}");
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    ExitCode::SUCCESS
}

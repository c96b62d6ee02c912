// Console entry point for the live quiz client
//
// Usage: live-quiz [CONFIG] [SESSION_ID] [DISPLAY_NAME]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::{error, info};

use live_quiz_client::client::config::Config;
use live_quiz_client::client::console::{spawn_stdin_reader, ConsoleRenderer};
use live_quiz_client::client::logging::init_logging;
use live_quiz_client::client::runner::QuizRunner;
use live_quiz_client::client::websocket::WebSocketTransport;
use live_quiz_client::core::clock::SystemClock;
use live_quiz_client::core::session::QuizSession;

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let config_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let session_id = args.next();
    let display_name = args.next();

    let mut config = match Config::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    config.apply_overrides(session_id, display_name);

    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    if let Err(e) = init_logging(config.logging.console, config.log_file_path(&base_dir)) {
        eprintln!("Logging unavailable: {}", e);
    }
    info!(path = %config_path.display(), "Live quiz client starting...");

    if let Err(e) = config.validate() {
        error!(error = %e, "Config is invalid");
        eprintln!("{}", e);
        eprintln!("Usage: live-quiz [CONFIG] [SESSION_ID] [DISPLAY_NAME]");
        return ExitCode::FAILURE;
    }

    let transport = WebSocketTransport::new(config.server.clone());
    let session = QuizSession::new(transport, SystemClock::new(), config.engine.settings());
    let mut runner = QuizRunner::new(
        session,
        ConsoleRenderer::new(config.countdown.clone()),
        spawn_stdin_reader(),
        config.engine.frame_interval(),
    );

    match runner.run(&config.server.session_id, &config.server.display_name) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Console output failed");
            ExitCode::FAILURE
        }
    }
}

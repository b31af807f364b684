use jobmux::logging::{self, LogConfig};
use jobmux::ui::{MessageBlock, NoticeLevel, OutputMode, PlainRenderer, Renderer};
use jobmux::{parse_command, print_usage, Command};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let output_mode = OutputMode::from_env();
    let cmd = match parse_command(args) {
        Ok(cmd) => cmd,
        Err(err) => {
            let mut renderer = PlainRenderer::stderr(output_mode);
            let _ = renderer.error_block(
                &MessageBlock::new("Invalid command arguments", err.to_string())
                    .with_hint("Run `jobmux --help` to see supported command forms"),
            );
            print_usage();
            std::process::exit(2);
        }
    };

    if let Command::Help = cmd {
        print_usage();
        return;
    }

    let log_guard = LogConfig::from_env().and_then(|config| match logging::init(&config) {
        Ok(guard) => {
            tracing::debug!(path = %guard.path().display(), "logging enabled");
            Some(guard)
        }
        Err(err) => {
            let mut renderer = PlainRenderer::stderr(output_mode);
            let _ = renderer.notice(NoticeLevel::Warning, &format!("logging disabled: {err}"));
            None
        }
    });

    let code = match jobmux::app::run_command(cmd) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(%err, "command failed");
            let mut block = MessageBlock::new(err.title(), err.to_string());
            if let Some(hint) = err.hint() {
                block = block.with_hint(hint);
            }
            let mut renderer = PlainRenderer::stderr(output_mode);
            let _ = renderer.error_block(&block);
            1
        }
    };
    // `exit` skips destructors; flush the log writer first.
    drop(log_guard);
    std::process::exit(code);
}

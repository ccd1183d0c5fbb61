use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

/// Install a stderr logger at `level`.
///
/// Optional: without it the library logs nowhere. Later calls are ignored.
pub fn init_logging(level: LevelFilter) {
    TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto).ok();
}

//! Terminal (and optionally file) logger for the binary. Library code only uses the `log` macros.
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::File;
use std::path::Path;

pub fn level_from_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Installs the global logger; a second call is reported as an error by `log` and ignored.
pub fn init_logger(level: LevelFilter, log_file: Option<&Path>) -> Result<(), String> {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let Some(path) = log_file {
        let file = File::create(path)
            .map_err(|e| format!("cannot create log file {}: {}", path.display(), e))?;
        loggers.push(WriteLogger::new(LevelFilter::Debug, Config::default(), file));
    }
    CombinedLogger::init(loggers).map_err(|e| e.to_string())
}

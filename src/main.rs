use GibbsGC::Examples::gc_examples::gc_examples;
use GibbsGC::Utils::logger::{init_logger, level_from_verbosity};
use GibbsGC::cli::cli_main::run_interactive_menu;
use GibbsGC::settings::with_settings;
use std::path::PathBuf;

pub fn main() {
    let (verbosity, log_file) = with_settings(|m| {
        let config = m.get_config();
        (config.verbosity, config.log_file.clone().map(PathBuf::from))
    });
    if let Err(e) = init_logger(level_from_verbosity(verbosity), log_file.as_deref()) {
        eprintln!("logger not installed: {}", e);
    }
    // `GibbsGC example <n>` runs one worked example, no arguments opens the menu
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("example") => {
            let task = args.get(2).and_then(|t| t.parse().ok()).unwrap_or(0);
            gc_examples(task);
        }
        _ => run_interactive_menu(),
    }
}

/// examples submenu
pub mod cli_examples;
/// main interactive menu
pub mod cli_main;

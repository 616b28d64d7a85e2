pub mod base_commands;
pub mod context_cmd;
pub mod list_cmd;
pub mod place_cmd;
pub mod report_format;
pub mod runtime;
pub mod show_cmd;
pub mod simulate_cmd;

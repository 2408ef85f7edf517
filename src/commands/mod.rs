//! Application command handlers for tessio.
//!
//! This module organizes command handling into separate submodules, each
//! responsible for a specific application command.
//!
//! # Commands
//! - `run`: Interactive attempt of a module definition
//! - `steps`: Print the flattened step plan of a module (also `check`)
//! - `config`: Open configuration file in user's preferred editor
//! - `list_devices`: List available audio input devices
//! - `logs`: Display recent log entries

pub mod config;
pub mod list_devices;
pub mod logs;
pub mod run;
pub mod steps;

pub use config::handle_config;
pub use list_devices::handle_list_devices;
pub use logs::handle_logs;
pub use run::handle_run;
pub use steps::{handle_check, handle_steps};

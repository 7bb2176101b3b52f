//! Supervisor request handlers

pub mod health;
pub mod tasks;
pub mod ws;

pub use health::health_check;
pub use tasks::{
    get_task, list_tasks, run_script, send_command, start_package, update_status, CommandRequest,
    PackageRequest,
};
pub use ws::ws_handler;

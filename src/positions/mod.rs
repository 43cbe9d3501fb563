pub mod manager;
pub mod monitor;

pub use manager::PositionManager;
pub use monitor::{evaluate_exit, open_position, progress_stops, update_peak, ExitContext, ExitReason};

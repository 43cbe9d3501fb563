pub mod generator;
pub mod indicators;
pub mod ranker;
pub mod red_day;

pub use generator::SignalGenerator;
pub use red_day::{apply as apply_red_day_filter, RedDayPattern, RedDayResult};

pub mod clock;
pub mod holidays;
pub mod phase;

pub use clock::{Clock, FakeClock, SystemClock};
pub use holidays::HolidayCalendar;
pub use phase::{Phase, Schedule};

use chrono_tz::Tz;

/// Scheduling reasoning runs in Pacific time; market semantics (session
/// windows, "today") run in Eastern time (§1, §4.1).
pub const SCHEDULING_ZONE: Tz = chrono_tz::America::Los_Angeles;
pub const MARKET_ZONE: Tz = chrono_tz::America::New_York;

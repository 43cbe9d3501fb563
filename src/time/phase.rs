/// The phase FSM and its wall-clock schedule (§4.1).
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum Phase {
    Idle,
    MorningAlert,
    OrbCapture,
    SoPrefetch,
    SoCollection,
    BatchExecution,
    Monitoring,
    EodClose,
    EodReport,
    /// Auth failure in live mode: monitoring continues, no new orders (§7).
    ReadOnly,
    /// SIGTERM/SIGINT: stop scanners, flush monitor intents, persist markers (§5).
    Drain,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::MorningAlert => "MORNING_ALERT",
            Phase::OrbCapture => "ORB_CAPTURE",
            Phase::SoPrefetch => "SO_PREFETCH",
            Phase::SoCollection => "SO_COLLECTION",
            Phase::BatchExecution => "BATCH_EXECUTION",
            Phase::Monitoring => "MONITORING",
            Phase::EodClose => "EOD_CLOSE",
            Phase::EodReport => "EOD_REPORT",
            Phase::ReadOnly => "READ_ONLY",
            Phase::Drain => "DRAIN",
        }
    }
}

/// Wall-clock boundaries (America/Los_Angeles) that drive the FSM.
///
/// SO_PREFETCH and BATCH_EXECUTION and EOD_REPORT are instantaneous,
/// edge-triggered phases: the orchestrator runs their one-shot action when
/// it observes the steady-state phase change (e.g. SoCollection ->
/// Monitoring triggers BatchExecution), gated by the DailyMarker so a
/// restart mid-window never repeats the action.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub morning_alert: NaiveTime,
    pub orb_capture_start: NaiveTime,
    pub orb_capture_fire: NaiveTime,
    pub so_collection_start: NaiveTime,
    pub so_collection_end: NaiveTime,
    pub forced_close: NaiveTime,
    pub eod_close_end: NaiveTime,
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule {
            morning_alert: NaiveTime::from_hms_opt(5, 30, 0).unwrap(),
            orb_capture_start: NaiveTime::from_hms_opt(6, 30, 0).unwrap(),
            orb_capture_fire: NaiveTime::from_hms_opt(6, 45, 0).unwrap(),
            so_collection_start: NaiveTime::from_hms_opt(7, 15, 0).unwrap(),
            so_collection_end: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            forced_close: NaiveTime::from_hms_opt(12, 55, 0).unwrap(),
            eod_close_end: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        }
    }
}

impl Schedule {
    /// Pure lookup of the steady-state phase for a given local (Pacific)
    /// time, independent of what the FSM currently believes. A holiday
    /// collapses the whole day to Idle (checked by the caller at 05:30).
    pub fn phase_for_time(&self, local_time: NaiveTime) -> Phase {
        if local_time < self.morning_alert {
            Phase::Idle
        } else if local_time < self.orb_capture_start {
            Phase::MorningAlert
        } else if local_time < self.so_collection_start {
            Phase::OrbCapture
        } else if local_time < self.so_collection_end {
            Phase::SoCollection
        } else if local_time < self.forced_close {
            Phase::Monitoring
        } else if local_time < self.eod_close_end {
            Phase::EodClose
        } else {
            Phase::Idle
        }
    }

    /// Whether `local_time` is exactly at or past the ORB capture firing
    /// instant, i.e. one minute after the 15-minute post-open bar closes.
    pub fn should_fire_orb_capture(&self, local_time: NaiveTime) -> bool {
        local_time >= self.orb_capture_fire && local_time < self.so_collection_start
    }

    pub fn should_force_close(&self, local_time: NaiveTime) -> bool {
        local_time >= self.forced_close
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn steady_state_phases_follow_boundaries() {
        let sched = Schedule::default();
        assert_eq!(sched.phase_for_time(t(5, 0)), Phase::Idle);
        assert_eq!(sched.phase_for_time(t(5, 45)), Phase::MorningAlert);
        assert_eq!(sched.phase_for_time(t(6, 50)), Phase::OrbCapture);
        assert_eq!(sched.phase_for_time(t(7, 20)), Phase::SoCollection);
        assert_eq!(sched.phase_for_time(t(9, 0)), Phase::Monitoring);
        assert_eq!(sched.phase_for_time(t(12, 56)), Phase::EodClose);
        assert_eq!(sched.phase_for_time(t(13, 1)), Phase::Idle);
    }

    #[test]
    fn forced_close_is_at_or_after_cadence_tick() {
        let sched = Schedule::default();
        assert!(!sched.should_force_close(t(12, 54)));
        assert!(sched.should_force_close(t(12, 55)));
        assert!(sched.should_force_close(t(12, 56)));
    }
}

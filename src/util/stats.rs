// Transfer statistics
// (c) 2024 sendplz contributors

use human_repr::{HumanCount as _, HumanDuration as _, HumanThroughput as _};
use std::{fmt::Display, time::Duration};

/// Average throughput of a transfer, printed in human units
#[derive(Debug, Clone, Copy)]
pub struct DataRate(Option<f64>);

impl DataRate {
    /// Bytes over time. An instantaneous transfer has no meaningful rate.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(bytes: u64, time: Duration) -> Self {
        Self((!time.is_zero()).then(|| bytes as f64 / time.as_secs_f64()))
    }

    /// Bytes per second, if known
    #[must_use]
    pub fn per_second(self) -> Option<f64> {
        self.0
    }
}

impl Display for DataRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            None => f.write_str("unknown"),
            Some(rate) => rate.human_throughput_bytes().fmt(f),
        }
    }
}

/// One-line transfer summary, e.g. `11B in 1s; average 11B/s`
#[must_use]
pub fn summary(payload_bytes: u64, elapsed: Duration) -> String {
    format!(
        "{size} in {time}; average {rate}",
        size = payload_bytes.human_count_bytes(),
        time = elapsed.human_duration(),
        rate = DataRate::new(payload_bytes, elapsed),
    )
}

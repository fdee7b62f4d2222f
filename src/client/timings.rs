use std::time::Duration;

use hdrhistogram::Histogram;

/// Percentile view over one recorded latency series, in microseconds.
#[derive(Clone, Copy, Debug, Default)]
pub struct LatencySnapshot {
    pub samples: u64,
    pub p50_us: u64,
    pub p99_us: u64,
}

/// Latency series kept by the wire client: ping round-trip and publish-ack.
pub(crate) struct ClientTimings {
    ping_rtt: Histogram<u64>,
    publish_ack: Histogram<u64>,
}

fn new_histogram() -> Histogram<u64> {
    // One microsecond to one hundred seconds covers both series.
    Histogram::new_with_bounds(1, 100_000_000, 3).expect("histogram bounds are valid")
}

fn snapshot(histogram: &Histogram<u64>) -> LatencySnapshot {
    let samples = histogram.len();
    if samples == 0 {
        return LatencySnapshot::default();
    }
    LatencySnapshot {
        samples,
        p50_us: histogram.value_at_percentile(50.0),
        p99_us: histogram.value_at_percentile(99.0),
    }
}

fn as_micros(duration: Duration) -> u64 {
    duration.as_micros().min(u64::MAX as u128) as u64
}

impl ClientTimings {
    pub(crate) fn new() -> Self {
        Self {
            ping_rtt: new_histogram(),
            publish_ack: new_histogram(),
        }
    }

    pub(crate) fn record_ping_rtt(&mut self, rtt: Duration) {
        let _ = self.ping_rtt.record(as_micros(rtt));
    }

    pub(crate) fn record_publish_ack(&mut self, latency: Duration) {
        let _ = self.publish_ack.record(as_micros(latency));
    }

    pub(crate) fn ping_rtt(&self) -> LatencySnapshot {
        snapshot(&self.ping_rtt)
    }

    pub(crate) fn publish_ack(&self) -> LatencySnapshot {
        snapshot(&self.publish_ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_series_snapshots_to_zero() {
        let timings = ClientTimings::new();
        assert_eq!(timings.ping_rtt().samples, 0);
        assert_eq!(timings.publish_ack().p50_us, 0);
    }

    #[test]
    fn percentiles_track_recorded_values() {
        let mut timings = ClientTimings::new();
        timings.record_ping_rtt(Duration::from_micros(100));
        timings.record_ping_rtt(Duration::from_micros(200));
        timings.record_ping_rtt(Duration::from_micros(300));

        let rtt = timings.ping_rtt();
        assert_eq!(rtt.samples, 3);
        assert_eq!(rtt.p50_us, 200);
        assert_eq!(rtt.p99_us, 300);
    }
}

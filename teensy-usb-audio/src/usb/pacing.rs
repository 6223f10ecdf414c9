//! Packet-size pacing for the transmit endpoint.
//!
//! A nominal rate of, say, 44 100 Hz at 1 000 packets per second is 44.1
//! samples per packet. [`RateAdapter`] emits 44 most of the time and 45
//! whenever an integer carry accumulator runs out, so the long-run average
//! is exact without floating point.

/// Integer-carry packet sizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateAdapter {
    /// Samples every packet carries.
    base: usize,
    /// `sample_rate % packets_per_second`: fractional excess per packet,
    /// in units of 1/`period` samples.
    remainder: u32,
    period: u32,
    accumulator: i32,
}

impl RateAdapter {
    pub const fn new(sample_rate: u32, packets_per_second: u32) -> Self {
        let period = if packets_per_second == 0 { 1 } else { packets_per_second };
        RateAdapter {
            base: (sample_rate / period) as usize,
            remainder: sample_rate % period,
            period,
            accumulator: Self::half_scale(period),
        }
    }

    // Carry cycles start at half scale.
    const fn half_scale(period: u32) -> i32 {
        period.div_ceil(2) as i32
    }

    /// Sample count for the next packet.
    pub fn next_target(&mut self) -> usize {
        self.accumulator -= self.remainder as i32;
        if self.accumulator <= 0 {
            self.accumulator += self.period as i32;
            self.base + 1
        } else {
            self.base
        }
    }

    /// Largest value [`next_target`](Self::next_target) can return.
    pub const fn max_target(&self) -> usize {
        if self.remainder == 0 {
            self.base
        } else {
            self.base + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn cd_rate_carries_once_per_ten_packets() {
        let mut pacer = RateAdapter::new(44_100, 1_000);
        let cycle: [usize; 10] = core::array::from_fn(|_| pacer.next_target());
        assert_eq!(cycle.iter().filter(|&&n| n == 45).count(), 1);
        assert_eq!(cycle.iter().filter(|&&n| n == 44).count(), 9);
        assert_eq!(cycle.iter().sum::<usize>(), 441);
        assert_eq!(pacer.max_target(), 45);
    }

    #[test]
    fn integer_rate_never_carries() {
        let mut pacer = RateAdapter::new(48_000, 1_000);
        for _ in 0..5_000 {
            assert_eq!(pacer.next_target(), 48);
        }
        assert_eq!(pacer.max_target(), 48);
    }

    #[test]
    fn single_packet_per_second() {
        let mut pacer = RateAdapter::new(100, 1);
        assert_eq!(pacer.next_target(), 100);
        assert_eq!(pacer.next_target(), 100);
    }

    proptest! {
        #[test]
        fn long_run_average_is_exact(
            rate in 1u32..=127_000,
            packets_per_second in prop::sample::select(vec![1_000u32, 8_000]),
            window in 1usize..4_000,
        ) {
            let mut pacer = RateAdapter::new(rate, packets_per_second);
            let emitted: u64 = (0..window).map(|_| pacer.next_target() as u64).sum();

            let exact_num = window as u64 * rate as u64;
            let den = packets_per_second as u64;
            let rounded = (2 * exact_num + den) / (2 * den);
            prop_assert!(emitted.abs_diff(rounded) <= 1,
                "rate {rate}/{packets_per_second}: {emitted} emitted over {window} packets, expected {rounded}");
        }

        #[test]
        fn every_prefix_stays_within_one_sample(rate in 8_000u32..=96_000) {
            let mut pacer = RateAdapter::new(rate, 1_000);
            let mut emitted = 0u64;
            for k in 1..=2_000u64 {
                emitted += pacer.next_target() as u64;
                let ideal_milli = k * rate as u64;
                let scaled = emitted * 1_000;
                prop_assert!(scaled.abs_diff(ideal_milli) <= 1_000,
                    "drifted at packet {k}: {emitted} vs {}", ideal_milli as f64 / 1_000.0);
            }
        }
    }
}

/// Bus Timing Model
///
/// Converts simulated rounds into milliseconds for a given bit rate. Two
/// models coexist: a coarse per-round step scaled from a reference speed, and
/// a bit-accurate collision model (two frames, inter-frame space, error flag)
/// with bounded random jitter.
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Timing constants, calibrated at the reference speed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingProfile {
    /// One round at the reference speed (one ~111-bit frame at 500 kbps)
    pub base_step_ms: f64,
    pub base_speed_kbps: u32,
    pub bits_per_frame: u32,
    /// Inter-frame space
    pub bits_ifs: u32,
    /// 6 dominant bits + 8 delimiter bits
    pub bits_error_flag: u32,
    /// Relative jitter applied to collision time, e.g. 0.1 for ±10%
    pub jitter: f64,
    /// Stretch applied to phase-2 points of the single-run TEC timeline
    pub phase2_time_scale: f64,
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self {
            base_step_ms: 0.222,
            base_speed_kbps: 500,
            bits_per_frame: 111,
            bits_ifs: 3,
            bits_error_flag: 14,
            jitter: 0.1,
            phase2_time_scale: 5.0,
        }
    }
}

/// Round to 3 decimals, the precision of all reported times
pub fn round_ms(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[derive(Debug, Clone)]
pub struct BusTiming {
    bus_speed_kbps: u32,
    profile: TimingProfile,
}

impl BusTiming {
    /// `bus_speed_kbps` must be non-zero; configs are validated before use
    pub fn new(bus_speed_kbps: u32, profile: TimingProfile) -> Self {
        Self {
            bus_speed_kbps: bus_speed_kbps.max(1),
            profile,
        }
    }

    pub fn bus_speed_kbps(&self) -> u32 {
        self.bus_speed_kbps
    }

    pub fn profile(&self) -> &TimingProfile {
        &self.profile
    }

    /// Simulated time per round; faster bus, shorter rounds
    pub fn step_ms(&self) -> f64 {
        self.profile.base_step_ms * (self.profile.base_speed_kbps as f64 / self.bus_speed_kbps as f64)
    }

    pub fn bit_time_ms(&self) -> f64 {
        1.0 / self.bus_speed_kbps as f64
    }

    pub fn frame_time_ms(&self) -> f64 {
        self.profile.bits_per_frame as f64 * self.bit_time_ms()
    }

    /// Victim attempt + attacker frame + IFS + error flag
    pub fn collision_time_ms(&self) -> f64 {
        let bit = self.bit_time_ms();
        2.0 * self.frame_time_ms()
            + self.profile.bits_ifs as f64 * bit
            + self.profile.bits_error_flag as f64 * bit
    }

    /// Wire time of `collisions` collision cycles, with one jitter draw
    pub fn bus_time_ms<R: Rng + ?Sized>(&self, collisions: u64, rng: &mut R) -> f64 {
        let jitter = self.profile.jitter;
        let factor = rng.gen_range((1.0 - jitter)..=(1.0 + jitter));
        collisions as f64 * self.collision_time_ms() * factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_step_scales_inversely_with_speed() {
        let profile = TimingProfile::default();
        assert!((BusTiming::new(500, profile.clone()).step_ms() - 0.222).abs() < 1e-9);
        assert!((BusTiming::new(1000, profile.clone()).step_ms() - 0.111).abs() < 1e-9);
        assert!((BusTiming::new(250, profile).step_ms() - 0.444).abs() < 1e-9);
    }

    #[test]
    fn test_collision_time_at_500kbps() {
        let timing = BusTiming::new(500, TimingProfile::default());
        // (2 * 111 + 3 + 14) bits at 2 us per bit
        assert!((timing.collision_time_ms() - 0.478).abs() < 1e-9);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let timing = BusTiming::new(500, TimingProfile::default());
        let mut rng = StdRng::seed_from_u64(3);
        let nominal = 176.0 * timing.collision_time_ms();

        for _ in 0..100 {
            let value = timing.bus_time_ms(176, &mut rng);
            assert!(value >= nominal * 0.9 - 1e-9);
            assert!(value <= nominal * 1.1 + 1e-9);
        }
    }

    #[test]
    fn test_no_jitter_is_exact() {
        let profile = TimingProfile {
            jitter: 0.0,
            ..Default::default()
        };
        let timing = BusTiming::new(250, profile);
        let mut rng = StdRng::seed_from_u64(3);
        let expected = 10.0 * timing.collision_time_ms();
        assert!((timing.bus_time_ms(10, &mut rng) - expected).abs() < 1e-12);
        assert_eq!(timing.bus_time_ms(0, &mut rng), 0.0);
    }

    #[test]
    fn test_round_ms() {
        assert_eq!(round_ms(1.23456), 1.235);
        assert_eq!(round_ms(0.2220001), 0.222);
    }
}

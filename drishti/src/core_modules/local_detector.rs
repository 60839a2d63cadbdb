// THEORY:
// The `LocalDetector` is the offline stand-in for the detection service. It is
// used in demo mode and as the per-cycle fallback when the remote call fails.
// It does no image analysis; it synthesizes plausible signals from random draws
// so the dashboard keeps moving.
//
// The mapping from the primary draw `r` to signals is fixed:
//   threat   = floor(r * 100)
//   weapons  = one synthetic entry iff r > 0.85
//   violence = true iff 0.75 < r <= 0.85
// and an independent draw above 0.7 reports a fresh people count in 1..=5.

use crate::core_modules::detection::{DetectionResult, WeaponTag};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

const WEAPON_THRESHOLD: f64 = 0.85;
const VIOLENCE_THRESHOLD: f64 = 0.75;
const PEOPLE_UPDATE_THRESHOLD: f64 = 0.7;
const MAX_SIMULATED_PEOPLE: f64 = 5.0;
const SYNTHETIC_WEAPON: &str = "Weapon";

pub struct LocalDetector {
    rng: Mutex<StdRng>,
}

impl LocalDetector {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// A detector with a reproducible draw sequence.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn detect(&self) -> DetectionResult {
        let (threat_draw, people_draw, count_draw) = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            (
                rng.r#gen::<f64>(),
                rng.r#gen::<f64>(),
                rng.r#gen::<f64>(),
            )
        };
        synthesize(threat_draw, people_draw, count_draw)
    }
}

impl Default for LocalDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a result from three draws in `[0, 1)`.
pub fn synthesize(threat_draw: f64, people_draw: f64, count_draw: f64) -> DetectionResult {
    let people_count = (people_draw > PEOPLE_UPDATE_THRESHOLD)
        .then(|| (count_draw * MAX_SIMULATED_PEOPLE).floor() as u32 + 1);

    let weapons_detected = if threat_draw > WEAPON_THRESHOLD {
        vec![WeaponTag::named(SYNTHETIC_WEAPON)]
    } else {
        Vec::new()
    };

    DetectionResult {
        threat_level: (threat_draw * 100.0).floor(),
        people_count,
        weapons_detected,
        violence_detected: threat_draw > VIOLENCE_THRESHOLD && threat_draw <= WEAPON_THRESHOLD,
    }
}

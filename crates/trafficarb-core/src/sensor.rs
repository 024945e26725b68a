//! Lane detectors.
//!
//! A `LaneSensor` produces one reading per call and may block (serial
//! loop detectors, camera pipelines). The runtime calls every sensor on the
//! blocking pool once per tick and bounds the wait, so implementations do
//! not need to be async.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimulationConfig;
use crate::engine::LaneReading;
use crate::error::SensorError;

/// Source of per-lane vehicle and emergency counts.
pub trait LaneSensor: Send + Sync {
    /// Lane this sensor reports for.
    fn lane(&self) -> usize;

    /// Take one reading. May block.
    fn sample(&self) -> Result<LaneReading, SensorError>;
}

/// Random feed for demos and soak runs.
#[derive(Debug)]
pub struct SimulatedSensor {
    lane: usize,
    max_vehicles: u32,
    emergency_probability: f64,
    rng: Mutex<StdRng>,
}

impl SimulatedSensor {
    /// Sensor with its own RNG. With a seed, lane `n` uses `seed + n` so a
    /// bank of sensors is reproducible but not identical across lanes.
    #[must_use]
    pub fn new(lane: usize, config: &SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(lane as u64)),
            None => StdRng::from_os_rng(),
        };
        Self {
            lane,
            max_vehicles: config.max_vehicles,
            emergency_probability: config.emergency_probability.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }
}

impl LaneSensor for SimulatedSensor {
    fn lane(&self) -> usize {
        self.lane
    }

    fn sample(&self) -> Result<LaneReading, SensorError> {
        let mut rng = self.rng.lock().map_err(|_| SensorError::Failed {
            lane: self.lane,
            reason: "rng lock poisoned".to_string(),
        })?;
        let vehicles = rng.random_range(0..=self.max_vehicles);
        let emergencies = u32::from(rng.random_bool(self.emergency_probability));
        Ok(LaneReading::new(vehicles, emergencies))
    }
}

/// One simulated sensor per lane.
#[must_use]
pub fn simulated_bank(num_lanes: usize, config: &SimulationConfig) -> Vec<Box<dyn LaneSensor>> {
    (0..num_lanes)
        .map(|lane| Box::new(SimulatedSensor::new(lane, config)) as Box<dyn LaneSensor>)
        .collect()
}

/// Replays a fixed sequence, then keeps returning the last reading.
#[derive(Debug)]
pub struct ScriptedSensor {
    lane: usize,
    readings: Vec<LaneReading>,
    cursor: AtomicUsize,
}

impl ScriptedSensor {
    #[must_use]
    pub fn new(lane: usize, readings: Vec<LaneReading>) -> Self {
        Self {
            lane,
            readings,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Script of vehicle counts with no emergencies.
    #[must_use]
    pub fn from_counts(lane: usize, counts: &[u32]) -> Self {
        Self::new(
            lane,
            counts.iter().map(|&c| LaneReading::new(c, 0)).collect(),
        )
    }

    /// Readings handed out so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }
}

impl LaneSensor for ScriptedSensor {
    fn lane(&self) -> usize {
        self.lane
    }

    fn sample(&self) -> Result<LaneReading, SensorError> {
        let last = self
            .readings
            .len()
            .checked_sub(1)
            .ok_or(SensorError::Exhausted { lane: self.lane })?;
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed).min(last);
        Ok(self.readings[idx])
    }
}

use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;
use crate::vector::Order;

/// Drive value at one sample, one entry per kinematic order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DriveSample {
    pub position: f64,
    pub velocity: f64,
    pub acceleration: f64,
}

impl DriveSample {
    pub fn new(position: f64, velocity: f64, acceleration: f64) -> Self {
        Self {
            position,
            velocity,
            acceleration,
        }
    }

    pub fn get(&self, order: Order) -> f64 {
        match order {
            Order::Position => self.position,
            Order::Velocity => self.velocity,
            Order::Acceleration => self.acceleration,
        }
    }
}

/// The known input motion over `N` samples (e.g. a crank angle and its
/// derivatives). All series share one length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveInput {
    position: Vec<f64>,
    velocity: Vec<f64>,
    acceleration: Vec<f64>,
    times: Option<Vec<f64>>,
}

impl DriveInput {
    pub fn new(
        position: Vec<f64>,
        velocity: Vec<f64>,
        acceleration: Vec<f64>,
    ) -> Result<Self, DefinitionError> {
        let expected = position.len();
        for (order, series) in [
            (Order::Velocity, &velocity),
            (Order::Acceleration, &acceleration),
        ] {
            if series.len() != expected {
                return Err(DefinitionError::DriveLengthMismatch {
                    order,
                    expected,
                    got: series.len(),
                });
            }
        }
        Ok(Self {
            position,
            velocity,
            acceleration,
            times: None,
        })
    }

    /// Constant angular speed `omega` from `start`, sampled at `times`.
    pub fn constant_speed(start: f64, omega: f64, times: &[f64]) -> Self {
        Self {
            position: times.iter().map(|t| start + omega * t).collect(),
            velocity: vec![omega; times.len()],
            acceleration: vec![0.0; times.len()],
            times: Some(times.to_vec()),
        }
    }

    /// Attach sample time stamps for consumers of the trajectory.
    pub fn with_times(mut self, times: Vec<f64>) -> Result<Self, DefinitionError> {
        if times.len() != self.len() {
            return Err(DefinitionError::DriveLengthMismatch {
                order: Order::Position,
                expected: self.len(),
                got: times.len(),
            });
        }
        self.times = Some(times);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// Drive values at sample `i`, or `None` past the end.
    pub fn get(&self, i: usize) -> Option<DriveSample> {
        Some(DriveSample::new(
            *self.position.get(i)?,
            *self.velocity.get(i)?,
            *self.acceleration.get(i)?,
        ))
    }

    pub fn samples(&self) -> impl Iterator<Item = DriveSample> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    pub fn series(&self, order: Order) -> &[f64] {
        match order {
            Order::Position => &self.position,
            Order::Velocity => &self.velocity,
            Order::Acceleration => &self.acceleration,
        }
    }

    pub fn times(&self) -> Option<&[f64]> {
        self.times.as_deref()
    }
}

/// Starting unknown vectors for the first sample.
///
/// Rate equations are linear and solved directly, so the velocity and
/// acceleration guesses only fix the expected unknown count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialGuess {
    pub position: Vec<f64>,
    pub velocity: Vec<f64>,
    pub acceleration: Vec<f64>,
}

impl InitialGuess {
    pub fn new(position: Vec<f64>, velocity: Vec<f64>, acceleration: Vec<f64>) -> Self {
        Self {
            position,
            velocity,
            acceleration,
        }
    }

    /// Position guess with zeroed rate guesses of matching length.
    pub fn position_only(position: Vec<f64>) -> Self {
        let n = position.len();
        Self::new(position, vec![0.0; n], vec![0.0; n])
    }
}

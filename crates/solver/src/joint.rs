use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::vector::Order;

new_key_type! {
    pub struct JointId;
}

/// A named point in the plane whose motion is tracked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    /// Excluded joints take part in solving but are left out of downstream
    /// consumption (rendering, plotting).
    pub excluded: bool,
}

impl Joint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            excluded: false,
        }
    }

    pub fn excluded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            excluded: true,
        }
    }
}

/// Position, velocity and acceleration of a joint at one sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointState {
    pub position: Vector2<f64>,
    pub velocity: Vector2<f64>,
    pub acceleration: Vector2<f64>,
}

impl JointState {
    pub fn get(&self, order: Order) -> Vector2<f64> {
        match order {
            Order::Position => self.position,
            Order::Velocity => self.velocity,
            Order::Acceleration => self.acceleration,
        }
    }

    pub(crate) fn accumulate(&mut self, order: Order, value: Vector2<f64>) {
        match order {
            Order::Position => self.position += value,
            Order::Velocity => self.velocity += value,
            Order::Acceleration => self.acceleration += value,
        }
    }
}

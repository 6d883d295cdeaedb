//! Vector elements and rotating-vector calculus.
//!
//! A [`VectorElement`] is a directed segment between two joints in polar form
//! `r·(cos θ, sin θ)`. Either parameter is fixed (constant over time, so its
//! derivatives vanish) or free (supplied by the loop equations at each order).
//! One evaluation routine serves all three kinematic orders:
//!
//! ```text
//! position      (r cos θ, r sin θ)
//! velocity      ṙ·e_r + r θ̇·e_θ
//! acceleration  (r̈ − r θ̇²)·e_r + (r θ̈ + 2 ṙ θ̇)·e_θ
//! ```
//!
//! where `e_r = (cos θ, sin θ)` and `e_θ = (−sin θ, cos θ)`.

use std::fmt;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::error::DefinitionError;
use crate::joint::JointId;

new_key_type! {
    pub struct VectorId;
}

/// Kinematic order: position, first or second time derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Order {
    Position,
    Velocity,
    Acceleration,
}

impl Order {
    pub const ALL: [Order; 3] = [Order::Position, Order::Velocity, Order::Acceleration];
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Order::Position => "position",
            Order::Velocity => "velocity",
            Order::Acceleration => "acceleration",
        })
    }
}

/// A polar parameter: either a declared constant or solved for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Param {
    Fixed(f64),
    Free,
}

impl Param {
    pub fn is_free(&self) -> bool {
        matches!(self, Param::Free)
    }

    pub fn fixed(&self) -> Option<f64> {
        match self {
            Param::Fixed(value) => Some(*value),
            Param::Free => None,
        }
    }
}

/// How an element takes part in the mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Style {
    /// An ordinary rigid link.
    #[default]
    Normal,
    /// A direction anchored to the fixed frame. Always has a fixed angle.
    Ground,
    /// Construction vector used only inside the loop equations. Never used
    /// to locate joints.
    Dotted,
}

/// Polar coordinates `(r, θ)` or their derivatives `(ṙ, θ̇)`, `(r̈, θ̈)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Polar {
    pub r: f64,
    pub theta: f64,
}

impl Polar {
    pub fn new(r: f64, theta: f64) -> Self {
        Self { r, theta }
    }
}

/// Polar parameters of one element at one sample, at every order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PolarState {
    pub position: Polar,
    pub velocity: Polar,
    pub acceleration: Polar,
}

impl PolarState {
    pub fn get(&self, order: Order) -> Polar {
        match order {
            Order::Position => self.position,
            Order::Velocity => self.velocity,
            Order::Acceleration => self.acceleration,
        }
    }

    pub fn set(&mut self, order: Order, value: Polar) {
        match order {
            Order::Position => self.position = value,
            Order::Velocity => self.velocity = value,
            Order::Acceleration => self.acceleration = value,
        }
    }

    /// Cartesian contribution of the element at `order`.
    ///
    /// Uses only the orders up to and including `order`.
    pub fn cartesian(&self, order: Order) -> Vector2<f64> {
        let Polar { r, theta } = self.position;
        let (sin, cos) = theta.sin_cos();
        let radial = Vector2::new(cos, sin);
        let tangential = Vector2::new(-sin, cos);
        match order {
            Order::Position => radial * r,
            Order::Velocity => {
                let Polar { r: rd, theta: td } = self.velocity;
                radial * rd + tangential * (r * td)
            }
            Order::Acceleration => {
                let Polar { r: rd, theta: td } = self.velocity;
                let Polar { r: rdd, theta: tdd } = self.acceleration;
                radial * (rdd - r * td * td) + tangential * (r * tdd + 2.0 * rd * td)
            }
        }
    }
}

/// A directed segment from `tail` to `head`.
///
/// Elements reference joints by id and never change after the mechanism is
/// built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorElement {
    pub name: String,
    pub tail: JointId,
    pub head: JointId,
    pub magnitude: Param,
    pub angle: Param,
    pub style: Style,
    pub visible: bool,
}

impl VectorElement {
    /// A visible, normal-style element with both parameters free.
    pub fn new(name: impl Into<String>, tail: JointId, head: JointId) -> Self {
        Self {
            name: name.into(),
            tail,
            head,
            magnitude: Param::Free,
            angle: Param::Free,
            style: Style::Normal,
            visible: true,
        }
    }

    /// Fix the magnitude.
    pub fn magnitude(mut self, r: f64) -> Self {
        self.magnitude = Param::Fixed(r);
        self
    }

    /// Fix the angle (radians, measured from +x).
    pub fn angle(mut self, theta: f64) -> Self {
        self.angle = Param::Fixed(theta);
        self
    }

    pub fn style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Number of overrides a loop-equation call must supply for this element.
    pub fn free_count(&self) -> usize {
        usize::from(self.magnitude.is_free()) + usize::from(self.angle.is_free())
    }

    pub fn is_fully_fixed(&self) -> bool {
        self.free_count() == 0
    }

    /// Whether the element may be used to locate joints.
    pub fn derives_joints(&self) -> bool {
        self.style != Style::Dotted
    }

    /// State implied by the declaration alone: fixed values at the position
    /// order, zero rates. Free parameters start at zero.
    pub fn declared_state(&self) -> PolarState {
        PolarState {
            position: Polar::new(
                self.magnitude.fixed().unwrap_or(0.0),
                self.angle.fixed().unwrap_or(0.0),
            ),
            ..PolarState::default()
        }
    }

    /// Resolve the element's polar values at `order`.
    ///
    /// `overrides` fill the free parameters in `(magnitude, angle)` order.
    /// Fixed parameters take their declared value at the position order and
    /// zero at the rate orders.
    pub fn resolve(&self, order: Order, overrides: &[f64]) -> Result<Polar, DefinitionError> {
        let expected = self.free_count();
        if overrides.len() != expected {
            return Err(DefinitionError::OverrideArity {
                vector: self.name.clone(),
                expected,
                got: overrides.len(),
            });
        }

        let mut supplied = overrides.iter().copied();
        let mut take = |param: Param| match (param, order) {
            (Param::Fixed(value), Order::Position) => value,
            (Param::Fixed(_), _) => 0.0,
            (Param::Free, _) => supplied.next().unwrap_or_default(),
        };
        let r = take(self.magnitude);
        let theta = take(self.angle);
        Ok(Polar::new(r, theta))
    }

    /// Evaluate the element at `order`, given its already-known lower orders
    /// in `known` and the free-parameter `overrides` for this order.
    pub fn evaluate(
        &self,
        order: Order,
        known: &PolarState,
        overrides: &[f64],
    ) -> Result<(Polar, Vector2<f64>), DefinitionError> {
        let values = self.resolve(order, overrides)?;
        let mut state = *known;
        state.set(order, values);
        Ok((values, state.cartesian(order)))
    }
}

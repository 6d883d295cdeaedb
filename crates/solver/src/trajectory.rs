//! Accumulated solver output.
//!
//! A [`TrajectoryStore`] is appended to once per solved sample and then
//! frozen into a read-only [`Trajectory`] for rendering and plotting
//! consumers.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::driver::Snapshot;
use crate::joint::{JointId, JointState};
use crate::loops::ElementStates;
use crate::mechanism::Mechanism;
use crate::vector::{Order, PolarState, Style, VectorId};

/// Newton statistics for one sample's position solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleReport {
    pub sample: usize,
    pub iterations: usize,
    /// Residual 2-norm at convergence.
    pub residual: f64,
}

/// Solved unknown vectors of one sample, one per order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleSolution {
    pub position: Vec<f64>,
    pub velocity: Vec<f64>,
    pub acceleration: Vec<f64>,
}

impl SampleSolution {
    pub fn get(&self, order: Order) -> &[f64] {
        match order {
            Order::Position => &self.position,
            Order::Velocity => &self.velocity,
            Order::Acceleration => &self.acceleration,
        }
    }
}

/// Motion history of one joint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointTrack {
    pub id: JointId,
    pub name: String,
    pub excluded: bool,
    pub position: Vec<Vector2<f64>>,
    pub velocity: Vec<Vector2<f64>>,
    pub acceleration: Vec<Vector2<f64>>,
}

impl JointTrack {
    pub fn series(&self, order: Order) -> &[Vector2<f64>] {
        match order {
            Order::Position => &self.position,
            Order::Velocity => &self.velocity,
            Order::Acceleration => &self.acceleration,
        }
    }

    pub fn xs(&self, order: Order) -> Vec<f64> {
        self.series(order).iter().map(|v| v.x).collect()
    }

    pub fn ys(&self, order: Order) -> Vec<f64> {
        self.series(order).iter().map(|v| v.y).collect()
    }

    /// Euclidean norms, e.g. speeds for [`Order::Velocity`].
    pub fn magnitudes(&self, order: Order) -> Vec<f64> {
        self.series(order).iter().map(|v| v.norm()).collect()
    }

    pub fn state(&self, sample: usize) -> Option<JointState> {
        Some(JointState {
            position: *self.position.get(sample)?,
            velocity: *self.velocity.get(sample)?,
            acceleration: *self.acceleration.get(sample)?,
        })
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }
}

/// Polar history of one vector element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementTrack {
    pub id: VectorId,
    pub name: String,
    pub style: Style,
    pub visible: bool,
    pub states: Vec<PolarState>,
}

impl ElementTrack {
    /// `r`, `ṙ` or `r̈` per sample.
    pub fn magnitudes(&self, order: Order) -> Vec<f64> {
        self.states.iter().map(|s| s.get(order).r).collect()
    }

    /// `θ`, `θ̇` or `θ̈` per sample.
    pub fn angles(&self, order: Order) -> Vec<f64> {
        self.states.iter().map(|s| s.get(order).theta).collect()
    }
}

/// Read-only solver output: every joint and element at every sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    joints: Vec<JointTrack>,
    elements: Vec<ElementTrack>,
    solutions: Vec<SampleSolution>,
    reports: Vec<SampleReport>,
    times: Option<Vec<f64>>,
}

impl Trajectory {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// All joints, including excluded ones.
    pub fn joints(&self) -> impl Iterator<Item = &JointTrack> {
        self.joints.iter()
    }

    /// Joints meant for downstream consumers.
    pub fn visible_joints(&self) -> impl Iterator<Item = &JointTrack> {
        self.joints.iter().filter(|j| !j.excluded)
    }

    pub fn joint(&self, name: &str) -> Option<&JointTrack> {
        self.joints.iter().find(|j| j.name == name)
    }

    pub fn series(&self, joint: &str, order: Order) -> Option<&[Vector2<f64>]> {
        self.joint(joint).map(|j| j.series(order))
    }

    pub fn elements(&self) -> impl Iterator<Item = &ElementTrack> {
        self.elements.iter()
    }

    pub fn element(&self, name: &str) -> Option<&ElementTrack> {
        self.elements.iter().find(|e| e.name == name)
    }

    /// Element states of one sample, as used to evaluate the loops.
    pub fn element_states(&self, sample: usize) -> Option<ElementStates> {
        self.elements
            .iter()
            .map(|e| e.states.get(sample).map(|s| (e.id, *s)))
            .collect()
    }

    pub fn solutions(&self) -> &[SampleSolution] {
        &self.solutions
    }

    pub fn reports(&self) -> &[SampleReport] {
        &self.reports
    }

    pub fn times(&self) -> Option<&[f64]> {
        self.times.as_deref()
    }

    /// Newton iterations summed over all samples.
    pub fn total_iterations(&self) -> usize {
        self.reports.iter().map(|r| r.iterations).sum()
    }
}

/// Append-only accumulator filled by the driver, one sample at a time.
#[derive(Debug)]
pub struct TrajectoryStore {
    inner: Trajectory,
}

impl TrajectoryStore {
    pub fn new(mechanism: &Mechanism, capacity: usize, times: Option<&[f64]>) -> Self {
        let joints = mechanism
            .joints()
            .map(|(id, joint)| JointTrack {
                id,
                name: joint.name.clone(),
                excluded: joint.excluded,
                position: Vec::with_capacity(capacity),
                velocity: Vec::with_capacity(capacity),
                acceleration: Vec::with_capacity(capacity),
            })
            .collect();
        let elements = mechanism
            .vectors()
            .map(|(id, v)| ElementTrack {
                id,
                name: v.name.clone(),
                style: v.style,
                visible: v.visible,
                states: Vec::with_capacity(capacity),
            })
            .collect();
        Self {
            inner: Trajectory {
                joints,
                elements,
                solutions: Vec::with_capacity(capacity),
                reports: Vec::with_capacity(capacity),
                times: times.map(<[f64]>::to_vec),
            },
        }
    }

    pub fn append(&mut self, snapshot: &Snapshot) {
        for track in &mut self.inner.joints {
            let state = snapshot.joints.get(track.id).copied().unwrap_or_default();
            track.position.push(state.position);
            track.velocity.push(state.velocity);
            track.acceleration.push(state.acceleration);
        }
        for track in &mut self.inner.elements {
            let state = snapshot.elements.get(track.id).copied().unwrap_or_default();
            track.states.push(state);
        }
        self.inner.solutions.push(snapshot.unknowns.clone());
        self.inner.reports.push(snapshot.report);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn finish(self) -> Trajectory {
        self.inner
    }
}

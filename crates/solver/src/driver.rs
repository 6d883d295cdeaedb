//! Time-stepped kinematic analysis.
//!
//! For every drive sample the [`TimeStepDriver`] solves positions by Newton
//! iteration (warm-started from the previous sample), then the linear
//! velocity and acceleration systems at that configuration, and finally
//! derives joint kinematics along the mechanism's joint paths.

use nalgebra::DVector;
use slotmap::SecondaryMap;
use tracing::{debug, info, instrument};

use crate::drive::{DriveInput, DriveSample, InitialGuess};
use crate::error::{KinematicsError, SolverError};
use crate::jacobian::{FiniteDifference, JacobianProvider};
use crate::joint::{JointId, JointState};
use crate::loops::ElementStates;
use crate::mechanism::Mechanism;
use crate::solver::{self, SolverConfig, SolverResult};
use crate::trajectory::{SampleReport, SampleSolution, Trajectory, TrajectoryStore};
use crate::vector::Order;

/// Everything solved at one drive sample.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub sample: usize,
    pub drive: DriveSample,
    pub unknowns: SampleSolution,
    pub elements: ElementStates,
    pub joints: SecondaryMap<JointId, JointState>,
    pub report: SampleReport,
}

impl Snapshot {
    pub fn joint(&self, id: JointId) -> Option<&JointState> {
        self.joints.get(id)
    }
}

/// Drives a [`Mechanism`] through a sequence of drive samples.
pub struct TimeStepDriver<'m> {
    mechanism: &'m Mechanism,
    config: SolverConfig,
    length_scale: f64,
    position_jacobian: Box<dyn JacobianProvider>,
    rate_jacobian: Box<dyn JacobianProvider>,
}

impl<'m> TimeStepDriver<'m> {
    pub fn new(mechanism: &'m Mechanism, config: SolverConfig) -> Self {
        Self {
            mechanism,
            length_scale: mechanism.length_scale(),
            position_jacobian: Box::new(config.difference),
            rate_jacobian: Box::new(FiniteDifference::unit()),
            config,
        }
    }

    /// Replace the Jacobian used by the position solve.
    pub fn with_jacobian(mut self, provider: impl JacobianProvider + 'static) -> Self {
        self.position_jacobian = Box::new(provider);
        self
    }

    /// Replace the Jacobian used to assemble the rate systems.
    pub fn with_rate_jacobian(mut self, provider: impl JacobianProvider + 'static) -> Self {
        self.rate_jacobian = Box::new(provider);
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    fn residual_fn<'a>(
        &'a self,
        order: Order,
        states: &'a ElementStates,
        drive: f64,
    ) -> impl FnMut(&[f64]) -> Result<DVector<f64>, SolverError> + 'a {
        move |unknowns: &[f64]| {
            let residual = self.mechanism.residual(order, states, unknowns, drive)?;
            if residual.iter().all(|v| v.is_finite()) {
                Ok(residual)
            } else {
                Err(SolverError::NonFinite)
            }
        }
    }

    /// Solve the position loop equations of one sample from `guess`.
    pub fn solve_position(
        &self,
        sample: usize,
        drive: f64,
        guess: &[f64],
    ) -> Result<SolverResult, KinematicsError> {
        let states = ElementStates::new();
        solver::solve_position_scaled(
            self.residual_fn(Order::Position, &states, drive),
            guess,
            &self.config,
            self.position_jacobian.as_ref(),
            self.length_scale,
        )
        .map_err(|e| KinematicsError::at(sample, Order::Position, e))
    }

    /// Solve the velocity or acceleration unknowns of one sample.
    ///
    /// `states` must already hold every lower order of the sample.
    pub fn solve_rate(
        &self,
        sample: usize,
        order: Order,
        states: &ElementStates,
        unknowns: usize,
        drive: f64,
    ) -> Result<Vec<f64>, KinematicsError> {
        debug_assert_ne!(order, Order::Position);
        solver::solve_rates(
            self.residual_fn(order, states, drive),
            unknowns,
            &self.config,
            self.rate_jacobian.as_ref(),
        )
        .map_err(|e| KinematicsError::at(sample, order, e))
    }

    /// Full pipeline for one sample: position, velocity, acceleration and
    /// joint kinematics.
    #[instrument(level = "debug", skip(self, guess), fields(drive = drive.position))]
    pub fn solve_sample(
        &self,
        sample: usize,
        drive: DriveSample,
        guess: &[f64],
    ) -> Result<Snapshot, KinematicsError> {
        let unknowns = guess.len();
        let position = self.solve_position(sample, drive.position, guess)?;

        let mut elements = self.mechanism.initial_states();
        self.mechanism
            .observe(Order::Position, &mut elements, &position.params, drive.position)?;

        let velocity =
            self.solve_rate(sample, Order::Velocity, &elements, unknowns, drive.velocity)?;
        self.mechanism
            .observe(Order::Velocity, &mut elements, &velocity, drive.velocity)?;

        let acceleration = self.solve_rate(
            sample,
            Order::Acceleration,
            &elements,
            unknowns,
            drive.acceleration,
        )?;
        self.mechanism.observe(
            Order::Acceleration,
            &mut elements,
            &acceleration,
            drive.acceleration,
        )?;

        let joints = self.mechanism.joint_kinematics(&elements);
        debug!(
            iterations = position.iterations,
            residual = position.final_residual,
            "sample solved"
        );
        Ok(Snapshot {
            sample,
            drive,
            report: SampleReport {
                sample,
                iterations: position.iterations,
                residual: position.final_residual,
            },
            unknowns: SampleSolution {
                position: position.params,
                velocity,
                acceleration,
            },
            elements,
            joints,
        })
    }

    /// Solve every drive sample in order, each position solve starting from
    /// the previous sample's solution. Stops at the first failing sample.
    #[instrument(skip_all, fields(samples = drive.len(), unknowns = guess.position.len()))]
    pub fn run(&self, drive: &DriveInput, guess: &InitialGuess) -> Result<Trajectory, KinematicsError> {
        self.mechanism.validate(drive, guess)?;

        let mut store = TrajectoryStore::new(self.mechanism, drive.len(), drive.times());
        let mut warm = guess.position.clone();
        for (i, sample) in drive.samples().enumerate() {
            let snapshot = self.solve_sample(i, sample, &warm)?;
            warm.clone_from(&snapshot.unknowns.position);
            store.append(&snapshot);
        }

        let trajectory = store.finish();
        info!(
            samples = trajectory.len(),
            total_iterations = trajectory.total_iterations(),
            "trajectory solved"
        );
        Ok(trajectory)
    }
}

impl Mechanism {
    /// Solve the whole drive sequence with the default [`SolverConfig`].
    pub fn iterate(
        &self,
        drive: &DriveInput,
        guess: &InitialGuess,
    ) -> Result<Trajectory, KinematicsError> {
        TimeStepDriver::new(self, SolverConfig::default()).run(drive, guess)
    }

    /// Solve a single configuration with the default [`SolverConfig`].
    pub fn solve_sample(&self, drive: DriveSample, guess: &[f64]) -> Result<Snapshot, KinematicsError> {
        let input = DriveInput::new(
            vec![drive.position],
            vec![drive.velocity],
            vec![drive.acceleration],
        )?;
        self.validate(&input, &InitialGuess::position_only(guess.to_vec()))?;
        TimeStepDriver::new(self, SolverConfig::default()).solve_sample(0, drive, guess)
    }
}

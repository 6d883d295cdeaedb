//! Structured text motion reports.
//!
//! A report summarises a solved trajectory per joint together with the
//! oracle verdicts, readable as text or serialised to JSON.

use std::fmt;

use linkage_solver::{Order, Trajectory};
use serde::Serialize;

use crate::helpers::{peak_norm, HarnessError};
use crate::oracle::{run_trajectory_checks, OracleVerdict, Tolerances};
use crate::scenarios::Scenario;

/// A complete motion report.
#[derive(Debug, Clone, Serialize)]
pub struct MotionReport {
    pub scenario: String,
    pub samples: usize,
    pub total_iterations: usize,
    pub max_iterations: usize,
    pub joints: Vec<JointSummary>,
    pub oracle_results: Vec<OracleVerdict>,
}

/// Extents and peak rates of one joint.
#[derive(Debug, Clone, Serialize)]
pub struct JointSummary {
    pub name: String,
    pub min: [f64; 2],
    pub max: [f64; 2],
    pub peak_speed: f64,
    pub peak_acceleration: f64,
}

impl JointSummary {
    fn from_track(track: &linkage_solver::JointTrack) -> Self {
        let mut min = [f64::INFINITY; 2];
        let mut max = [f64::NEG_INFINITY; 2];
        for p in track.series(Order::Position) {
            min = [min[0].min(p.x), min[1].min(p.y)];
            max = [max[0].max(p.x), max[1].max(p.y)];
        }
        Self {
            name: track.name.clone(),
            min,
            max,
            peak_speed: peak_norm(track.series(Order::Velocity)),
            peak_acceleration: peak_norm(track.series(Order::Acceleration)),
        }
    }
}

impl MotionReport {
    pub fn new(scenario: &str, trajectory: &Trajectory, oracle_results: Vec<OracleVerdict>) -> Self {
        Self {
            scenario: scenario.to_string(),
            samples: trajectory.len(),
            total_iterations: trajectory.total_iterations(),
            max_iterations: trajectory
                .reports()
                .iter()
                .map(|r| r.iterations)
                .max()
                .unwrap_or(0),
            joints: trajectory
                .visible_joints()
                .filter(|j| !j.is_empty())
                .map(JointSummary::from_track)
                .collect(),
            oracle_results,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.oracle_results.iter().all(|v| v.passed)
    }

    pub fn joint(&self, name: &str) -> Option<&JointSummary> {
        self.joints.iter().find(|j| j.name == name)
    }

    /// Format the report as text.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("=== Motion Report: {} ===\n\n", self.scenario));
        out.push_str(&format!(
            "Samples: {} | Newton iterations: {} total, {} max per sample\n",
            self.samples, self.total_iterations, self.max_iterations,
        ));

        out.push_str(&format!("\nJoints ({}):\n", self.joints.len()));
        for j in &self.joints {
            out.push_str(&format!(
                "  {}: x [{:.3}, {:.3}] y [{:.3}, {:.3}] | peak speed {:.3} | peak accel {:.3}\n",
                j.name, j.min[0], j.max[0], j.min[1], j.max[1], j.peak_speed, j.peak_acceleration,
            ));
        }

        if !self.oracle_results.is_empty() {
            out.push_str(&format!(
                "\nOracle Results ({} checks):\n",
                self.oracle_results.len()
            ));
            for v in &self.oracle_results {
                let status = if v.passed { "PASS" } else { "FAIL" };
                out.push_str(&format!("  [{}] {}: {}\n", status, v.oracle_name, v.detail));
            }
        }

        out
    }

    pub fn to_json(&self) -> Result<String, HarnessError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for MotionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

impl Scenario {
    /// Solve the scenario and check the result with every trajectory oracle.
    pub fn report(&self) -> Result<MotionReport, HarnessError> {
        let trajectory = self.run()?;
        let verdicts = run_trajectory_checks(
            &self.mechanism,
            &trajectory,
            &self.drive,
            Tolerances::default(),
        );
        Ok(MotionReport::new(self.name, &trajectory, verdicts))
    }
}

//! Test harness for the linkage solver.
//!
//! Provides reference mechanisms, verification of solved trajectories and
//! diagnostic output.
//!
//! # Key Components
//!
//! - [`Scenario`]: A mechanism bundled with its drive and initial guess
//! - [`scenarios`]: Reference mechanisms (rotating link, slider-crank, four-bar, Whitworth)
//! - [`oracle`]: Verification functions returning pass/fail verdicts
//! - [`report`]: Structured text motion summaries
//! - [`helpers`]: Error type, sampling and differencing utilities
//! - [`assertions`]: Assertion helpers with diagnostics

pub mod assertions;
pub mod helpers;
pub mod oracle;
pub mod report;
pub mod scenarios;

pub use helpers::HarnessError;
pub use oracle::OracleVerdict;
pub use report::MotionReport;
pub use scenarios::Scenario;

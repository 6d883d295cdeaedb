//! Planar linkage kinematics by vector-loop closure.
//!
//! A [`Mechanism`] is a set of joints connected by polar [`VectorElement`]s
//! plus loop equations that must sum to zero. Given a drive sequence, the
//! [`TimeStepDriver`] solves positions, velocities and accelerations of every
//! element and joint at each sample and collects them into a [`Trajectory`].

pub mod drive;
pub mod driver;
pub mod error;
pub mod jacobian;
pub mod joint;
pub mod linalg;
pub mod loops;
pub mod mechanism;
pub mod solver;
pub mod trajectory;
pub mod vector;

pub use drive::*;
pub use driver::*;
pub use error::*;
pub use jacobian::*;
pub use joint::*;
pub use loops::*;
pub use mechanism::*;
pub use solver::*;
pub use trajectory::*;
pub use vector::*;

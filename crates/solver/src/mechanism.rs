use std::collections::{HashSet, VecDeque};
use std::fmt;

use nalgebra::{DVector, Vector2};
use slotmap::{SecondaryMap, SlotMap};
use tracing::debug;

use crate::drive::{DriveInput, InitialGuess};
use crate::error::DefinitionError;
use crate::joint::{Joint, JointId, JointState};
use crate::loops::{ElementStates, LoopContext, LoopEquationSystem};
use crate::vector::{Order, Polar, Style, VectorElement, VectorId};

/// Signed walk from the origin to a joint: `+1` follows an element tail to
/// head, `-1` head to tail.
pub type JointPath = Vec<(VectorId, f64)>;

/// An immutable planar mechanism: joints, vector elements, the origin and
/// the loop-closure equations.
pub struct Mechanism {
    joints: SlotMap<JointId, Joint>,
    vectors: SlotMap<VectorId, VectorElement>,
    origin: JointId,
    paths: SecondaryMap<JointId, JointPath>,
    loops: Box<dyn LoopEquationSystem + Send + Sync>,
}

impl fmt::Debug for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mechanism")
            .field("joints", &self.joints)
            .field("vectors", &self.vectors)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl Mechanism {
    pub fn builder() -> MechanismBuilder {
        MechanismBuilder::default()
    }

    pub fn origin(&self) -> JointId {
        self.origin
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointId, &Joint)> {
        self.joints.iter()
    }

    pub fn joint(&self, id: JointId) -> Option<&Joint> {
        self.joints.get(id)
    }

    pub fn joint_id(&self, name: &str) -> Option<JointId> {
        self.joints
            .iter()
            .find(|(_, j)| j.name == name)
            .map(|(id, _)| id)
    }

    pub fn vectors(&self) -> impl Iterator<Item = (VectorId, &VectorElement)> {
        self.vectors.iter()
    }

    pub fn vector(&self, id: VectorId) -> Option<&VectorElement> {
        self.vectors.get(id)
    }

    pub fn vector_id(&self, name: &str) -> Option<VectorId> {
        self.vectors
            .iter()
            .find(|(_, v)| v.name == name)
            .map(|(id, _)| id)
    }

    /// The elements summed to locate `joint` relative to the origin.
    pub fn path(&self, joint: JointId) -> Option<&[(VectorId, f64)]> {
        self.paths.get(joint).map(Vec::as_slice)
    }

    /// Element states implied by the declarations alone.
    pub fn initial_states(&self) -> ElementStates {
        self.vectors
            .iter()
            .map(|(id, v)| (id, v.declared_state()))
            .collect()
    }

    /// Largest fixed magnitude, never below `1.0`. Residuals carry length
    /// units, so their floating-point floor grows with this value.
    pub fn length_scale(&self) -> f64 {
        self.vectors
            .values()
            .filter_map(|v| v.magnitude.fixed())
            .map(f64::abs)
            .fold(1.0, f64::max)
    }

    fn evaluate(
        &self,
        order: Order,
        states: &ElementStates,
        unknowns: &[f64],
        drive: f64,
    ) -> Result<(DVector<f64>, SecondaryMap<VectorId, Polar>), DefinitionError> {
        let ctx = LoopContext::new(&self.vectors, states, order);
        let residual = ctx.residual(self.loops.as_ref(), unknowns, drive)?;
        Ok((residual, ctx.into_observed()))
    }

    /// Flattened loop residual at `order`.
    ///
    /// `states` must hold the already-solved lower orders of the sample; at
    /// the position order it is ignored.
    pub fn residual(
        &self,
        order: Order,
        states: &ElementStates,
        unknowns: &[f64],
        drive: f64,
    ) -> Result<DVector<f64>, DefinitionError> {
        self.evaluate(order, states, unknowns, drive)
            .map(|(residual, _)| residual)
    }

    /// Evaluate the loops with solved `unknowns` and store every element's
    /// polar values at `order` into `states`. Returns the residual.
    pub fn observe(
        &self,
        order: Order,
        states: &mut ElementStates,
        unknowns: &[f64],
        drive: f64,
    ) -> Result<DVector<f64>, DefinitionError> {
        let (residual, observed) = self.evaluate(order, states, unknowns, drive)?;
        for (id, values) in observed {
            if let Some(state) = states.get_mut(id) {
                state.set(order, values);
            }
        }
        Ok(residual)
    }

    /// Check drive and guess against the mechanism before any solving.
    ///
    /// Evaluates the loop equations once at the position guess to confirm the
    /// system is square, every override count is right and every element
    /// with a free parameter is reached.
    pub fn validate(&self, drive: &DriveInput, guess: &InitialGuess) -> Result<(), DefinitionError> {
        let first = drive.get(0).ok_or(DefinitionError::EmptyDrive)?;
        let unknowns = guess.position.len();
        for (order, rates) in [
            (Order::Velocity, &guess.velocity),
            (Order::Acceleration, &guess.acceleration),
        ] {
            if rates.len() != unknowns {
                return Err(DefinitionError::GuessLengthMismatch {
                    order,
                    expected: unknowns,
                    got: rates.len(),
                });
            }
        }

        let states = self.initial_states();
        let (residual, observed) = self.evaluate(
            Order::Position,
            &states,
            &guess.position,
            first.position,
        )?;
        if residual.len() != unknowns {
            return Err(DefinitionError::ResidualCountMismatch {
                residuals: residual.len(),
                unknowns,
            });
        }
        if let Some((_, v)) = self
            .vectors
            .iter()
            .find(|(id, v)| !v.is_fully_fixed() && !observed.contains_key(*id))
        {
            return Err(DefinitionError::UnresolvedVector {
                vector: v.name.clone(),
            });
        }
        Ok(())
    }

    /// Joint position, velocity and acceleration from solved element states.
    pub fn joint_kinematics(&self, states: &ElementStates) -> SecondaryMap<JointId, JointState> {
        let mut out = SecondaryMap::new();
        for (joint, path) in &self.paths {
            let mut state = JointState::default();
            for &(vector, sign) in path {
                let Some(polar) = states.get(vector) else {
                    continue;
                };
                for order in Order::ALL {
                    state.accumulate(order, polar.cartesian(order) * sign);
                }
            }
            out.insert(joint, state);
        }
        out
    }
}

/// Collects joints and vector elements, then validates them into a
/// [`Mechanism`].
#[derive(Debug, Default)]
pub struct MechanismBuilder {
    joints: SlotMap<JointId, Joint>,
    vectors: SlotMap<VectorId, VectorElement>,
    origin: Option<JointId>,
}

impl MechanismBuilder {
    pub fn joint(&mut self, name: impl Into<String>) -> JointId {
        self.joints.insert(Joint::new(name))
    }

    /// A joint that is solved for but left out of downstream output.
    pub fn excluded_joint(&mut self, name: impl Into<String>) -> JointId {
        self.joints.insert(Joint::excluded(name))
    }

    /// Declare several joints at once.
    pub fn joints<const N: usize>(&mut self, names: [&str; N]) -> [JointId; N] {
        names.map(|name| self.joint(name))
    }

    pub fn vector(&mut self, element: VectorElement) -> VectorId {
        self.vectors.insert(element)
    }

    pub fn origin(&mut self, joint: JointId) -> &mut Self {
        self.origin = Some(joint);
        self
    }

    /// Validate the definition and attach the loop equations.
    pub fn build<F>(self, loops: F) -> Result<Mechanism, DefinitionError>
    where
        F: Fn(&LoopContext<'_>, &[f64], f64) -> Vec<Vector2<f64>> + Send + Sync + 'static,
    {
        self.build_system(loops)
    }

    /// Like [`build`](Self::build), for loop equations implemented on a type.
    pub fn build_system<L>(self, system: L) -> Result<Mechanism, DefinitionError>
    where
        L: LoopEquationSystem + Send + Sync + 'static,
    {
        let origin = self
            .origin
            .filter(|o| self.joints.contains_key(*o))
            .ok_or(DefinitionError::MissingOrigin)?;

        let mut names = HashSet::new();
        for joint in self.joints.values() {
            if !names.insert(joint.name.as_str()) {
                return Err(DefinitionError::DuplicateJoint(joint.name.clone()));
            }
        }
        let mut names = HashSet::new();
        for v in self.vectors.values() {
            if !names.insert(v.name.as_str()) {
                return Err(DefinitionError::DuplicateVector(v.name.clone()));
            }
            check_element(v, &self.joints)?;
        }

        let paths = joint_paths(origin, &self.vectors);
        if let Some(joint) = self.joints.iter().find(|(id, _)| !paths.contains_key(*id)) {
            return Err(DefinitionError::UnreachableJoint {
                joint: joint.1.name.clone(),
            });
        }

        debug!(
            joints = self.joints.len(),
            vectors = self.vectors.len(),
            "mechanism built"
        );
        Ok(Mechanism {
            joints: self.joints,
            vectors: self.vectors,
            origin,
            paths,
            loops: Box::new(system),
        })
    }
}

fn check_element(
    v: &VectorElement,
    joints: &SlotMap<JointId, Joint>,
) -> Result<(), DefinitionError> {
    let vector = || v.name.clone();
    if !joints.contains_key(v.tail) || !joints.contains_key(v.head) {
        return Err(DefinitionError::UnknownJoint { vector: vector() });
    }
    if v.tail == v.head {
        return Err(DefinitionError::DegenerateVector { vector: vector() });
    }
    if let Some(r) = v.magnitude.fixed() {
        if !r.is_finite() {
            return Err(DefinitionError::NonFiniteParameter { vector: vector() });
        }
        if r <= 0.0 {
            return Err(DefinitionError::NonPositiveMagnitude {
                vector: vector(),
                value: r,
            });
        }
    }
    if v.angle.fixed().is_some_and(|theta| !theta.is_finite()) {
        return Err(DefinitionError::NonFiniteParameter { vector: vector() });
    }
    if v.style == Style::Ground && v.angle.is_free() {
        return Err(DefinitionError::GroundWithoutAngle { vector: vector() });
    }
    Ok(())
}

/// Breadth-first walk from the origin over joint-deriving elements, in
/// either direction.
fn joint_paths(
    origin: JointId,
    vectors: &SlotMap<VectorId, VectorElement>,
) -> SecondaryMap<JointId, JointPath> {
    let mut paths: SecondaryMap<JointId, JointPath> = SecondaryMap::new();
    paths.insert(origin, Vec::new());
    let mut queue = VecDeque::from([origin]);

    while let Some(joint) = queue.pop_front() {
        let base = paths.get(joint).cloned().unwrap_or_default();
        for (id, v) in vectors.iter().filter(|(_, v)| v.derives_joints()) {
            let (next, sign) = if v.tail == joint {
                (v.head, 1.0)
            } else if v.head == joint {
                (v.tail, -1.0)
            } else {
                continue;
            };
            if paths.contains_key(next) {
                continue;
            }
            let mut path = base.clone();
            path.push((id, sign));
            paths.insert(next, path);
            queue.push_back(next);
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn crank_slider() -> (MechanismBuilder, [JointId; 3], [VectorId; 3]) {
        let mut b = Mechanism::builder();
        let [o, a, s] = b.joints(["O", "A", "B"]);
        let crank = b.vector(VectorElement::new("a", o, a).magnitude(1.0));
        let rod = b.vector(VectorElement::new("b", a, s).magnitude(3.0));
        let slider = b.vector(VectorElement::new("c", o, s).angle(0.0).style(Style::Ground));
        b.origin(o);
        (b, [o, a, s], [crank, rod, slider])
    }

    fn build_crank_slider() -> (Mechanism, [VectorId; 3]) {
        let (b, _, [crank, rod, slider]) = crank_slider();
        let m = b
            .build(move |ctx: &LoopContext<'_>, x: &[f64], drive: f64| {
                vec![ctx.eval(crank, &[drive]) + ctx.eval(rod, &[x[0]]) - ctx.eval(slider, &[x[1]])]
            })
            .unwrap();
        (m, [crank, rod, slider])
    }

    #[test]
    fn test_build_and_lookup() {
        let (m, [crank, ..]) = build_crank_slider();
        assert_eq!(m.joints().count(), 3);
        assert_eq!(m.vector_id("a"), Some(crank));
        assert_eq!(m.joint(m.origin()).map(|j| j.name.as_str()), Some("O"));
        assert!(m.joint_id("nope").is_none());
        assert!(format!("{m:?}").contains("Mechanism"));
    }

    #[test]
    fn test_paths_walk_from_origin() {
        let (m, [crank, _, slider]) = build_crank_slider();
        let a = m.joint_id("A").unwrap();
        let s = m.joint_id("B").unwrap();
        assert!(m.path(m.origin()).unwrap().is_empty());
        assert_eq!(m.path(a).unwrap(), &[(crank, 1.0)]);
        // The slider leaves the origin directly, so it wins over crank + rod.
        assert_eq!(m.path(s).unwrap(), &[(slider, 1.0)]);
    }

    #[test]
    fn test_reverse_edges_are_negated() {
        let mut b = Mechanism::builder();
        let [o, a] = b.joints(["O", "A"]);
        let f = b.vector(VectorElement::new("f", a, o).magnitude(2.0).angle(0.0));
        b.origin(o);
        let m = b.build(|_: &LoopContext<'_>, _: &[f64], _: f64| Vec::new()).unwrap();
        assert_eq!(m.path(a).unwrap(), &[(f, -1.0)]);

        let joints = m.joint_kinematics(&m.initial_states());
        assert_relative_eq!(joints[a].position.x, -2.0);
    }

    #[test]
    fn test_missing_origin() {
        let mut b = Mechanism::builder();
        b.joint("O");
        let err = b.build(|_: &LoopContext<'_>, _: &[f64], _: f64| Vec::new()).unwrap_err();
        assert_eq!(err, DefinitionError::MissingOrigin);
    }

    #[test]
    fn test_duplicate_joint_names() {
        let mut b = Mechanism::builder();
        let o = b.joint("O");
        b.joint("O");
        b.origin(o);
        let err = b.build(|_: &LoopContext<'_>, _: &[f64], _: f64| Vec::new()).unwrap_err();
        assert_eq!(err, DefinitionError::DuplicateJoint("O".into()));
    }

    #[test]
    fn test_ground_requires_angle() {
        let mut b = Mechanism::builder();
        let [o, a] = b.joints(["O", "A"]);
        b.vector(VectorElement::new("g", o, a).style(Style::Ground));
        b.origin(o);
        let err = b.build(|_: &LoopContext<'_>, _: &[f64], _: f64| Vec::new()).unwrap_err();
        assert_eq!(err, DefinitionError::GroundWithoutAngle { vector: "g".into() });
    }

    #[test]
    fn test_non_positive_magnitude() {
        let mut b = Mechanism::builder();
        let [o, a] = b.joints(["O", "A"]);
        b.vector(VectorElement::new("z", o, a).magnitude(0.0));
        b.origin(o);
        let err = b.build(|_: &LoopContext<'_>, _: &[f64], _: f64| Vec::new()).unwrap_err();
        assert!(matches!(err, DefinitionError::NonPositiveMagnitude { .. }));
    }

    #[test]
    fn test_dotted_elements_do_not_locate_joints() {
        let mut b = Mechanism::builder();
        let [o, a] = b.joints(["O", "A"]);
        b.vector(VectorElement::new("e", o, a).magnitude(1.0).angle(0.0).style(Style::Dotted));
        b.origin(o);
        let err = b.build(|_: &LoopContext<'_>, _: &[f64], _: f64| Vec::new()).unwrap_err();
        assert_eq!(err, DefinitionError::UnreachableJoint { joint: "A".into() });
    }

    #[test]
    fn test_validate_counts_residuals() {
        let (b, _, [crank, rod, _]) = crank_slider();
        let m = b
            .build(move |ctx: &LoopContext<'_>, x: &[f64], drive: f64| {
                vec![ctx.eval(crank, &[drive]) + ctx.eval(rod, &[x[0]])]
            })
            .unwrap();
        let drive = DriveInput::new(vec![0.0], vec![1.0], vec![0.0]).unwrap();
        let guess = InitialGuess::position_only(vec![0.0]);
        assert_eq!(
            m.validate(&drive, &guess).unwrap_err(),
            DefinitionError::ResidualCountMismatch {
                residuals: 2,
                unknowns: 1
            }
        );
    }

    #[test]
    fn test_validate_finds_unresolved_vectors() {
        let (b, _, [crank, rod, _]) = crank_slider();
        let m = b
            .build(move |ctx: &LoopContext<'_>, x: &[f64], drive: f64| {
                vec![ctx.eval(crank, &[drive]) + ctx.eval(rod, &[x[0]]) - Vector2::new(x[1], 0.0)]
            })
            .unwrap();
        let drive = DriveInput::new(vec![0.0], vec![1.0], vec![0.0]).unwrap();
        let guess = InitialGuess::position_only(vec![0.0, 4.0]);
        assert_eq!(
            m.validate(&drive, &guess).unwrap_err(),
            DefinitionError::UnresolvedVector { vector: "c".into() }
        );
    }

    #[test]
    fn test_validate_guess_lengths() {
        let (m, _) = build_crank_slider();
        let drive = DriveInput::new(vec![0.0], vec![1.0], vec![0.0]).unwrap();
        let guess = InitialGuess::new(vec![0.0, 4.0], vec![0.0, 0.0], vec![0.0]);
        assert!(matches!(
            m.validate(&drive, &guess).unwrap_err(),
            DefinitionError::GuessLengthMismatch {
                order: Order::Acceleration,
                expected: 2,
                got: 1
            }
        ));
        assert!(m.validate(&drive, &InitialGuess::position_only(vec![0.0, 4.0])).is_ok());
    }

    #[test]
    fn test_observe_records_solution() {
        let (m, [_, rod, slider]) = build_crank_slider();
        let mut states = m.initial_states();
        let r = m.observe(Order::Position, &mut states, &[0.0, 4.0], 0.0).unwrap();
        assert!(r.norm() < 1e-12);
        assert_eq!(states[slider].position, Polar::new(4.0, 0.0));
        assert_eq!(states[rod].position, Polar::new(3.0, 0.0));

        let joints = m.joint_kinematics(&states);
        let s = m.joint_id("B").unwrap();
        assert_relative_eq!(joints[s].position.x, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_length_scale_tracks_fixed_magnitudes() {
        let (m, _) = build_crank_slider();
        assert_eq!(m.length_scale(), 3.0);

        let mut b = Mechanism::builder();
        let [o, a] = b.joints(["O", "A"]);
        let tiny = b.vector(VectorElement::new("t", o, a).magnitude(1e-3));
        b.origin(o);
        let m = b
            .build(move |ctx: &LoopContext<'_>, _: &[f64], drive: f64| {
                vec![ctx.eval(tiny, &[drive])]
            })
            .unwrap();
        assert_eq!(m.length_scale(), 1.0);
    }
}

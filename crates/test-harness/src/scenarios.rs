//! Reference mechanisms with known behaviour.
//!
//! Each constructor returns a [`Scenario`]: a built mechanism together with
//! the drive sequence and initial guess it is meant to be solved with.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, TAU};

use linkage_solver::{
    DriveInput, InitialGuess, LoopContext, Mechanism, SolverConfig, Style, TimeStepDriver,
    Trajectory, VectorElement,
};

use crate::helpers::{linspace, HarnessError};

/// A mechanism ready to be driven.
#[derive(Debug)]
pub struct Scenario {
    pub name: &'static str,
    pub mechanism: Mechanism,
    pub drive: DriveInput,
    pub guess: InitialGuess,
}

impl Scenario {
    /// Solve with the default solver configuration.
    pub fn run(&self) -> Result<Trajectory, HarnessError> {
        self.run_with(SolverConfig::default())
    }

    pub fn run_with(&self, config: SolverConfig) -> Result<Trajectory, HarnessError> {
        Ok(TimeStepDriver::new(&self.mechanism, config).run(&self.drive, &self.guess)?)
    }

    /// Replace the drive sequence, keeping mechanism and guess.
    pub fn with_drive(mut self, drive: DriveInput) -> Self {
        self.drive = drive;
        self
    }
}

// ── Rotating link ───────────────────────────────────────────────────────────

/// A unit link turning about the origin at `omega` rad/s over one revolution.
///
/// The link end is followed by a dotted element whose free magnitude and angle
/// are the unknowns, so the expected motion is `(cos ωt, sin ωt)`.
pub fn rotating_link(start: f64, omega: f64, samples: usize) -> Result<Scenario, HarnessError> {
    let mut b = Mechanism::builder();
    let [o, a] = b.joints(["O", "A"]);
    let link = b.vector(VectorElement::new("a", o, a).magnitude(1.0));
    let tracer = b.vector(VectorElement::new("s", o, a).style(Style::Dotted));
    b.origin(o);
    let mechanism = b
        .build(move |ctx: &LoopContext<'_>, x: &[f64], drive: f64| {
            vec![ctx.eval(link, &[drive]) - ctx.eval(tracer, &[x[0], x[1]])]
        })?;

    let period = TAU / omega.abs().max(f64::EPSILON);
    Ok(Scenario {
        name: "rotating link",
        mechanism,
        drive: DriveInput::constant_speed(start, omega, &linspace(0.0, period, samples)),
        guess: InitialGuess::position_only(vec![1.0, start]),
    })
}

// ── Slider-crank ────────────────────────────────────────────────────────────

/// In-line slider-crank: crank `O→A`, connecting rod `A→B`, slider `O→B`
/// along the x axis. Unknowns are the rod angle and the slider position.
pub fn slider_crank(crank: f64, rod: f64, samples: usize) -> Result<Scenario, HarnessError> {
    let mut b = Mechanism::builder();
    let [o, a, s] = b.joints(["O", "A", "B"]);
    let crank_v = b.vector(VectorElement::new("a", o, a).magnitude(crank));
    let rod_v = b.vector(VectorElement::new("b", a, s).magnitude(rod));
    let slide = b.vector(VectorElement::new("c", o, s).angle(0.0).style(Style::Ground));
    b.origin(o);
    let mechanism = b
        .build(move |ctx: &LoopContext<'_>, x: &[f64], drive: f64| {
            vec![ctx.eval(crank_v, &[drive]) + ctx.eval(rod_v, &[x[0]]) - ctx.eval(slide, &[x[1]])]
        })?;

    Ok(Scenario {
        name: "slider-crank",
        mechanism,
        drive: DriveInput::constant_speed(0.0, 1.0, &linspace(0.0, TAU, samples)),
        guess: InitialGuess::position_only(vec![0.0, crank + rod]),
    })
}

/// Slider-crank with crank and rod of equal length, stopped at top dead
/// centre where the slider direction is lost.
pub fn singular_slider_crank() -> Result<Scenario, HarnessError> {
    let scenario = slider_crank(1.0, 1.0, 2)?;
    Ok(Scenario {
        name: "singular slider-crank",
        drive: DriveInput::constant_speed(FRAC_PI_2, 1.0, &[0.0]),
        guess: InitialGuess::position_only(vec![-FRAC_PI_2, 0.0]),
        ..scenario
    })
}

// ── Unreachable loop ────────────────────────────────────────────────────────

/// Two unit links asked to reach a point five units away.
pub fn unreachable_loop() -> Result<Scenario, HarnessError> {
    let mut b = Mechanism::builder();
    let [o, a, t] = b.joints(["O", "A", "B"]);
    let first = b.vector(VectorElement::new("a", o, a).magnitude(1.0));
    let second = b.vector(VectorElement::new("b", a, t).magnitude(1.0));
    let target = b.vector(
        VectorElement::new("g", o, t)
            .magnitude(5.0)
            .angle(0.0)
            .style(Style::Dotted),
    );
    b.origin(o);
    let mechanism = b
        .build(move |ctx: &LoopContext<'_>, x: &[f64], _: f64| {
            vec![ctx.eval(first, &[x[0]]) + ctx.eval(second, &[x[1]]) - ctx.eval(target, &[])]
        })?;

    Ok(Scenario {
        name: "unreachable loop",
        mechanism,
        drive: DriveInput::constant_speed(0.0, 1.0, &[0.0, 0.1]),
        guess: InitialGuess::position_only(vec![0.3, -0.3]),
    })
}

// ── Four-bar ────────────────────────────────────────────────────────────────

/// Crank-rocker four-bar: ground 6, crank 2, coupler 7, rocker 9.
pub fn four_bar(samples: usize) -> Result<Scenario, HarnessError> {
    let mut b = Mechanism::builder();
    let [o, a, c, d] = b.joints(["O", "A", "B", "D"]);
    let ground = b.vector(
        VectorElement::new("ground", o, d)
            .magnitude(6.0)
            .angle(0.0)
            .style(Style::Ground),
    );
    let crank = b.vector(VectorElement::new("a", o, a).magnitude(2.0));
    let coupler = b.vector(VectorElement::new("b", a, c).magnitude(7.0));
    let rocker = b.vector(VectorElement::new("c", d, c).magnitude(9.0));
    b.origin(o);
    let mechanism = b
        .build(move |ctx: &LoopContext<'_>, x: &[f64], drive: f64| {
            vec![
                ctx.eval(crank, &[drive]) + ctx.eval(coupler, &[x[0]])
                    - ctx.eval(rocker, &[x[1]])
                    - ctx.eval(ground, &[]),
            ]
        })?;

    Ok(Scenario {
        name: "four-bar",
        mechanism,
        drive: DriveInput::constant_speed(0.0, 1.0, &linspace(0.0, TAU, samples)),
        guess: InitialGuess::position_only(vec![1.86, 2.30]),
    })
}

// ── Whitworth quick-return ──────────────────────────────────────────────────

/// Whitworth quick-return: a 2.5 crank about `A` slides a block along the
/// slotted arm `O→D`; link `C→D` pushes the ram `C` along the line through
/// `Q`. The crank turns once every five seconds.
///
/// `B` (the sliding block) and `D` (arm tip) are solved but excluded from
/// output. The arm angle is shared between `b`, `c` and `h`.
pub fn whitworth(samples: usize) -> Result<Scenario, HarnessError> {
    let mut m = Mechanism::builder();
    let [o, a, c, q] = m.joints(["O", "A", "C", "Q"]);
    let d = m.excluded_joint("D");
    let b = m.excluded_joint("B");

    let crank = m.vector(VectorElement::new("a", a, b).magnitude(2.5));
    let arm_lower = m.vector(VectorElement::new("b", o, b));
    let arm_upper = m.vector(VectorElement::new("c", b, c));
    let ram = m.vector(VectorElement::new("d", q, c).angle(0.0).style(Style::Ground));
    let to_ram_line = m.vector(
        VectorElement::new("e", a, q)
            .magnitude(6.5)
            .angle(FRAC_PI_2)
            .style(Style::Dotted),
    );
    let to_pivot = m.vector(
        VectorElement::new("f", a, o)
            .magnitude(3.25)
            .angle(-FRAC_PI_2)
            .style(Style::Dotted),
    );
    let link = m.vector(VectorElement::new("g", c, d).hidden());
    let arm = m.vector(VectorElement::new("h", o, d).magnitude(16.0));
    m.origin(o);

    let mechanism = m
        .build(move |ctx: &LoopContext<'_>, x: &[f64], drive: f64| {
            vec![
                ctx.eval(ram, &[x[3]]) - ctx.eval(arm_upper, &[x[2], x[0]]) - ctx.eval(crank, &[drive])
                    + ctx.eval(to_ram_line, &[]),
                ctx.eval(crank, &[drive]) - ctx.eval(arm_lower, &[x[1], x[0]]) - ctx.eval(to_pivot, &[]),
                ctx.eval(arm, &[x[0]])
                    - ctx.eval(link, &[x[4], x[5]])
                    - ctx.eval(arm_upper, &[x[2], x[0]])
                    - ctx.eval(arm_lower, &[x[1], x[0]]),
            ]
        })?;

    let times = linspace(0.0, 5.0, samples);
    Ok(Scenario {
        name: "whitworth quick-return",
        mechanism,
        drive: DriveInput::constant_speed(0.0, TAU / 5.0, &times),
        guess: InitialGuess::position_only(vec![FRAC_PI_4, 3.0, 6.0, 6.0, 6.0, 0.12]),
    })
}

//! Constraint kinds and the value-typed constraint list.
//!
//! Every constraint contributes one Jacobian row (`effect`) and one scalar
//! (`desired_acceleration`): the value `J·a` must take once the external
//! field is accounted for. The force solver treats all kinds uniformly
//! through [`ConstraintModel`].
//!
//! Coordinates follow screen conventions: y grows downwards, and the
//! external field is stored as the acceleration it induces.

use crate::linalg::SparseRow;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Read-only view of the flattened particle state.
#[derive(Debug, Clone, Copy)]
pub struct Kinematics<'a> {
    pub positions: &'a [f64],
    pub velocities: &'a [f64],
}

impl<'a> Kinematics<'a> {
    pub fn new(positions: &'a [f64], velocities: &'a [f64]) -> Self {
        Self {
            positions,
            velocities,
        }
    }

    /// Splits a `positions ++ velocities` state vector in half.
    pub fn from_state(state: &'a [f64]) -> Self {
        let (positions, velocities) = state.split_at(state.len() / 2);
        Self::new(positions, velocities)
    }

    pub fn position(&self, particle: usize) -> Vector2<f64> {
        Vector2::new(self.positions[2 * particle], self.positions[2 * particle + 1])
    }

    pub fn velocity(&self, particle: usize) -> Vector2<f64> {
        Vector2::new(
            self.velocities[2 * particle],
            self.velocities[2 * particle + 1],
        )
    }

    pub fn particle_count(&self) -> usize {
        self.positions.len() / 2
    }
}

/// 2D cross product.
pub fn wedge(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Normalizes without guarding against zero length; a degenerate input
/// yields NaN components.
fn unit(v: Vector2<f64>) -> Vector2<f64> {
    v / (v.x * v.x + v.y * v.y).sqrt()
}

/// Jacobian row and acceleration target for one constraint.
pub trait ConstraintModel {
    /// Writes this constraint's Jacobian row into `row` (cleared first).
    fn effect(&self, kin: &Kinematics, row: &mut SparseRow);

    /// Acceleration target the solved multipliers must reproduce along the
    /// row, including the projection of the external field.
    fn desired_acceleration(&self, kin: &Kinematics, gravity: Vector2<f64>) -> f64;
}

/// Enforcement state of a constraint that may be one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Always enforced.
    Bilateral,
    /// Enforced while it pushes; released once it would have to pull.
    OneWay,
    /// Permanently inactive for the rest of the run.
    Released,
}

impl Activation {
    pub fn from_oneway(oneway: bool) -> Self {
        if oneway {
            Activation::OneWay
        } else {
            Activation::Bilateral
        }
    }

    pub fn is_released(self) -> bool {
        self == Activation::Released
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rod {
    pub p1: usize,
    pub p2: usize,
    pub activation: Activation,
}

impl ConstraintModel for Rod {
    fn effect(&self, kin: &Kinematics, row: &mut SparseRow) {
        row.clear();
        let direction = unit(kin.position(self.p1) - kin.position(self.p2));
        row.set(self.p2, direction);
        row.set(self.p1, -direction);
    }

    fn desired_acceleration(&self, kin: &Kinematics, _gravity: Vector2<f64>) -> f64 {
        let r = kin.position(self.p1) - kin.position(self.p2);
        let v = kin.velocity(self.p1) - kin.velocity(self.p2);
        v.norm_squared() / r.norm()
    }
}

/// Keeps particle `p` on the line through its position perpendicular to
/// `normal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slider {
    pub p: usize,
    pub normal: Vector2<f64>,
    pub activation: Activation,
}

impl Slider {
    /// Builds a slider, normalizing `normal`.
    pub fn new(p: usize, normal: Vector2<f64>, activation: Activation) -> Self {
        Self {
            p,
            normal: unit(normal),
            activation,
        }
    }
}

impl ConstraintModel for Slider {
    fn effect(&self, _kin: &Kinematics, row: &mut SparseRow) {
        row.clear();
        row.set(self.p, self.normal);
    }

    fn desired_acceleration(&self, _kin: &Kinematics, gravity: Vector2<f64>) -> f64 {
        -self.normal.dot(&gravity)
    }
}

/// Relative coordinates shared by the track-following joints: slider and
/// reference positions/velocities measured from `base`.
#[derive(Clone, Copy)]
struct TrackFrame {
    x: f64,
    y: f64,
    h: f64,
    v: f64,
    xref: f64,
    yref: f64,
    href: f64,
    vref: f64,
}

impl TrackFrame {
    fn new(kin: &Kinematics, reference: usize, slider: usize, base: usize) -> Self {
        let base_pos = kin.position(base);
        let base_vel = kin.velocity(base);
        let s = kin.position(slider) - base_pos;
        let sv = kin.velocity(slider) - base_vel;
        let r = kin.position(reference) - base_pos;
        let rv = kin.velocity(reference) - base_vel;
        Self {
            x: s.x,
            y: s.y,
            h: sv.x,
            v: sv.y,
            xref: r.x,
            yref: r.y,
            href: rv.x,
            vref: rv.y,
        }
    }

    /// Partials of the signed distance of the slider from the
    /// base→reference line.
    fn effect(&self, reference: usize, slider: usize, base: usize, row: &mut SparseRow) {
        let Self {
            x, y, xref, yref, ..
        } = *self;
        let denom = (xref * xref + yref * yref).sqrt();
        let denom3 = denom * denom * denom;

        let e = Vector2::new(-yref / denom, xref / denom);
        let e_ref = Vector2::new(
            (x * xref * yref + y * yref * yref) / denom3,
            -(x * xref * xref + xref * y * yref) / denom3,
        );
        let e_base = -e - e_ref;

        row.clear();
        row.set(slider, e);
        row.set(reference, e_ref);
        row.set(base, e_base);
    }
}

/// Roller-on-track joint: `slider` stays on the line through `base` and
/// `reference`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Colinear {
    pub reference: usize,
    pub slider: usize,
    pub base: usize,
    pub activation: Activation,
}

impl ConstraintModel for Colinear {
    fn effect(&self, kin: &Kinematics, row: &mut SparseRow) {
        TrackFrame::new(kin, self.reference, self.slider, self.base).effect(
            self.reference,
            self.slider,
            self.base,
            row,
        );
    }

    fn desired_acceleration(&self, kin: &Kinematics, _gravity: Vector2<f64>) -> f64 {
        let TrackFrame {
            x,
            y,
            h,
            v,
            xref,
            yref,
            href,
            vref,
        } = TrackFrame::new(kin, self.reference, self.slider, self.base);

        let denom = (xref * xref + yref * yref).sqrt();
        let xrefh = xref / denom;
        let yrefh = yref / denom;

        let accel = (vref * xrefh - href * yrefh)
            * (((2.0 * href * x - vref * y) * xrefh * xrefh
                + (vref * x + href * y) * 3.0 * xrefh * yrefh
                + (2.0 * vref * y - href * x) * yrefh * yrefh)
                / (denom * denom)
                - (2.0 * (h * xrefh + v * yrefh)) / denom);

        -accel
    }
}

/// Operating mode of a [`CamTrack`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CamMode {
    /// Behaves like a colinear joint.
    TrackFollowing,
    /// Past the end of the track: a lever with a frozen base/tip ratio.
    FixedRatio { ratio: f64 },
}

/// Track-follower joint that becomes a fixed-ratio lever once the reference
/// point passes the end of its track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CamTrack {
    pub reference: usize,
    pub slider: usize,
    pub base: usize,
    pub mode: CamMode,
}

impl CamTrack {
    pub fn new(reference: usize, slider: usize, base: usize) -> Self {
        Self {
            reference,
            slider,
            base,
            mode: CamMode::TrackFollowing,
        }
    }

    pub fn is_fixed_ratio(&self) -> bool {
        matches!(self.mode, CamMode::FixedRatio { .. })
    }
}

impl ConstraintModel for CamTrack {
    fn effect(&self, kin: &Kinematics, row: &mut SparseRow) {
        match self.mode {
            CamMode::FixedRatio { ratio } => {
                row.clear();
                row.set(self.base, Vector2::new(0.0, 1.0));
                row.set(self.reference, Vector2::new(0.0, ratio));
            }
            CamMode::TrackFollowing => {
                TrackFrame::new(kin, self.reference, self.slider, self.base).effect(
                    self.reference,
                    self.slider,
                    self.base,
                    row,
                );
            }
        }
    }

    fn desired_acceleration(&self, kin: &Kinematics, gravity: Vector2<f64>) -> f64 {
        if let CamMode::FixedRatio { ratio } = self.mode {
            return -(1.0 + ratio) * gravity.y;
        }
        let TrackFrame {
            x,
            y,
            h,
            v,
            xref,
            yref,
            href,
            vref,
        } = TrackFrame::new(kin, self.reference, self.slider, self.base);

        let denom = (xref * xref + yref * yref).sqrt();
        let numerator = 2.0 * href * x * xref * xref
            - 2.0 * h * xref * xref * xref
            - vref * xref * xref * y
            + 3.0 * vref * x * xref * yref
            - 2.0 * v * xref * xref * yref
            + 3.0 * href * xref * y * yref
            - href * x * yref * yref
            - 2.0 * h * xref * yref * yref
            + 2.0 * vref * y * yref * yref
            - 2.0 * v * yref * yref * yref;
        let accel = numerator * (vref * xref - href * yref)
            / (denom * denom * denom * denom * denom);

        -accel
    }
}

/// How a rope segment meets a pulley.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wrapping {
    /// Wrapped clockwise; lifts off when the rope stops bending against it.
    Cw,
    /// Wrapped counter-clockwise; lifts off likewise.
    Ccw,
    /// Not yet touching the rope; engages when the rope falls onto it.
    CwDrop,
    CcwDrop,
    /// Engaged permanently.
    Both,
}

impl Wrapping {
    pub fn is_dropped(self) -> bool {
        matches!(self, Wrapping::CwDrop | Wrapping::CcwDrop)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pulley {
    pub idx: usize,
    pub wrapping: Wrapping,
}

/// Inextensible rope from `p1` to `p3` through an ordered list of pulleys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RopePulley {
    pub p1: usize,
    pub pulleys: Vec<Pulley>,
    pub p3: usize,
}

impl RopePulley {
    /// Particle indices the rope currently runs through, endpoints included.
    pub fn engaged_path(&self) -> Vec<usize> {
        let mut path = Vec::with_capacity(self.pulleys.len() + 2);
        path.push(self.p1);
        path.extend(
            self.pulleys
                .iter()
                .filter(|p| !p.wrapping.is_dropped())
                .map(|p| p.idx),
        );
        path.push(self.p3);
        path
    }

    /// Number of pulleys the rope is currently wrapped around.
    pub fn engaged_count(&self) -> usize {
        self.pulleys
            .iter()
            .filter(|p| !p.wrapping.is_dropped())
            .count()
    }
}

impl ConstraintModel for RopePulley {
    fn effect(&self, kin: &Kinematics, row: &mut SparseRow) {
        row.clear();
        for segment in self.engaged_path().windows(2) {
            let (a, b) = (segment[0], segment[1]);
            let direction = unit(kin.position(a) - kin.position(b));
            row.add(a, -direction);
            row.set(b, direction);
        }
    }

    fn desired_acceleration(&self, kin: &Kinematics, _gravity: Vector2<f64>) -> f64 {
        self.engaged_path()
            .windows(2)
            .map(|segment| {
                let r = kin.position(segment[0]) - kin.position(segment[1]);
                let v = kin.velocity(segment[0]) - kin.velocity(segment[1]);
                let l = r.norm();
                wedge(r, v).powi(2) / (l * l * l)
            })
            .sum()
    }
}

/// Rope from the free end `p1` wrapped around a drum centred at `p2`, with
/// `p3` a point on the drum's rim. `length` is the total detour length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RopeDrum {
    pub p1: usize,
    pub p2: usize,
    pub p3: usize,
    pub length: f64,
}

impl ConstraintModel for RopeDrum {
    fn effect(&self, kin: &Kinematics, row: &mut SparseRow) {
        // Gradient of |p1 - p2| + |p2 - p3| - |p1 - p3|.
        let (pos1, pos2, pos3) = (
            kin.position(self.p1),
            kin.position(self.p2),
            kin.position(self.p3),
        );
        let n12 = unit(pos1 - pos2);
        let n23 = unit(pos2 - pos3);
        let n13 = unit(pos1 - pos3);

        row.clear();
        row.set(self.p1, n12 - n13);
        row.set(self.p2, n23 - n12);
        row.set(self.p3, n13 - n23);
    }

    /// The row is `+∇C`, so the target is minus the curvature term
    /// `vᵀ∇²C v`: each segment contributes its squared tangential relative
    /// speed over its length.
    fn desired_acceleration(&self, kin: &Kinematics, _gravity: Vector2<f64>) -> f64 {
        let tangential = |a: usize, b: usize| {
            let r = kin.position(a) - kin.position(b);
            let v = kin.velocity(a) - kin.velocity(b);
            let l = r.norm();
            wedge(r, v).powi(2) / (l * l * l)
        };
        -(tangential(self.p1, self.p2) + tangential(self.p2, self.p3)
            - tangential(self.p1, self.p3))
    }
}

/// Tagged union over every constraint kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    Rod(Rod),
    Slider(Slider),
    Colinear(Colinear),
    CamTrack(CamTrack),
    RopePulley(RopePulley),
    RopeDrum(RopeDrum),
}

impl Constraint {
    pub fn kind(&self) -> &'static str {
        match self {
            Constraint::Rod(_) => "rod",
            Constraint::Slider(_) => "slider",
            Constraint::Colinear(_) => "colinear",
            Constraint::CamTrack(_) => "f2k",
            Constraint::RopePulley(_) => "rope",
            Constraint::RopeDrum(_) => "ropedrum",
        }
    }

    /// Activation state; kinds without a one-way option are always bilateral.
    pub fn activation(&self) -> Activation {
        match self {
            Constraint::Rod(c) => c.activation,
            Constraint::Slider(c) => c.activation,
            Constraint::Colinear(c) => c.activation,
            _ => Activation::Bilateral,
        }
    }

    pub(crate) fn activation_mut(&mut self) -> Option<&mut Activation> {
        match self {
            Constraint::Rod(c) => Some(&mut c.activation),
            Constraint::Slider(c) => Some(&mut c.activation),
            Constraint::Colinear(c) => Some(&mut c.activation),
            _ => None,
        }
    }

    pub fn is_released(&self) -> bool {
        self.activation().is_released()
    }

    /// Every particle index the constraint refers to.
    pub fn particles(&self) -> Vec<usize> {
        match self {
            Constraint::Rod(c) => vec![c.p1, c.p2],
            Constraint::Slider(c) => vec![c.p],
            Constraint::Colinear(c) => vec![c.reference, c.slider, c.base],
            Constraint::CamTrack(c) => vec![c.reference, c.slider, c.base],
            Constraint::RopePulley(c) => {
                let mut all = vec![c.p1];
                all.extend(c.pulleys.iter().map(|p| p.idx));
                all.push(c.p3);
                all
            }
            Constraint::RopeDrum(c) => vec![c.p1, c.p2, c.p3],
        }
    }

    /// Whether the constraint holds `particle` by one of its endpoints
    /// (`p1`/`p2`/`p3`-style links, as opposed to sliders or track joints).
    pub fn attaches_endpoint(&self, particle: usize) -> bool {
        match self {
            Constraint::Rod(c) => c.p1 == particle || c.p2 == particle,
            Constraint::RopePulley(c) => c.p1 == particle || c.p3 == particle,
            Constraint::RopeDrum(c) => {
                c.p1 == particle || c.p2 == particle || c.p3 == particle
            }
            _ => false,
        }
    }

    fn model(&self) -> &dyn ConstraintModel {
        match self {
            Constraint::Rod(c) => c,
            Constraint::Slider(c) => c,
            Constraint::Colinear(c) => c,
            Constraint::CamTrack(c) => c,
            Constraint::RopePulley(c) => c,
            Constraint::RopeDrum(c) => c,
        }
    }
}

impl ConstraintModel for Constraint {
    /// Released constraints contribute an empty row.
    fn effect(&self, kin: &Kinematics, row: &mut SparseRow) {
        if self.is_released() {
            row.clear();
            return;
        }
        self.model().effect(kin, row);
    }

    fn desired_acceleration(&self, kin: &Kinematics, gravity: Vector2<f64>) -> f64 {
        self.model().desired_acceleration(kin, gravity)
    }
}

/// The live constraint list plus the one-shot projectile release flag.
///
/// This is the unit of snapshotting: the dynamics log stores clones of it
/// and rewinding restores one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    pub constraints: Vec<Constraint>,
    pub projectile_released: bool,
}

impl ConstraintSet {
    pub fn new(constraints: Vec<Constraint>) -> Self {
        Self {
            constraints,
            projectile_released: false,
        }
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    /// Count of constraints currently enforced (not released).
    pub fn active_count(&self) -> usize {
        self.constraints.iter().filter(|c| !c.is_released()).count()
    }
}

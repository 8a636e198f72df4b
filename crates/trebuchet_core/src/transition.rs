//! Irreversible constraint transitions.
//!
//! All transitions move one way within a run:
//! - one-way rods/sliders/colinear joints go `OneWay → Released`,
//! - dropped pulleys go `CwDrop/CcwDrop → Both`,
//! - wrapped pulleys go `Cw/Ccw → removed`,
//! - cam tracks go `TrackFollowing → FixedRatio`,
//! - the constraint holding the projectile is removed once.
//!
//! The only way back is the dynamics log restoring an earlier snapshot.

use crate::constraint::{
    wedge, Activation, CamMode, CamTrack, Constraint, ConstraintSet, Kinematics, RopePulley,
    Wrapping,
};
use serde::Serialize;

/// A single state change, reported for logging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum Transition {
    Released { constraint: usize },
    PulleyEngaged { constraint: usize, pulley: usize },
    PulleyLifted { constraint: usize, pulley: usize },
    CamSwitched { constraint: usize, ratio: f64 },
    ProjectileReleased { constraint: Option<usize> },
}

impl RopePulley {
    /// Engages at most one dropped pulley whose neighbours now bend the rope
    /// onto it, then lifts at most one wrapped pulley the rope no longer
    /// bends against. Returns the pulley indices (into `self.pulleys`) that
    /// changed.
    pub fn update_wrapping(&mut self, kin: &Kinematics) -> (Option<usize>, Option<usize>) {
        (self.engage_dropped(kin), self.lift_unwrapped(kin))
    }

    fn engage_dropped(&mut self, kin: &Kinematics) -> Option<usize> {
        // Slots over every pulley, dropped or not: 0 is p1, k + 1 is pulley k.
        let last = self.pulleys.len() + 1;
        let point = |slot: usize| -> usize {
            if slot == 0 {
                self.p1
            } else if slot == last {
                self.p3
            } else {
                self.pulleys[slot - 1].idx
            }
        };
        let dropped = |slot: usize| {
            slot != 0 && slot != last && self.pulleys[slot - 1].wrapping.is_dropped()
        };

        let engaged = (1..last).find_map(|slot| {
            let wrapping = self.pulleys[slot - 1].wrapping;
            if !wrapping.is_dropped() {
                return None;
            }
            let mut before = slot - 1;
            while dropped(before) {
                before -= 1;
            }
            // The forward search stops at the last pulley even when it is
            // dropped; it never skips through to p3.
            let mut after = slot + 1;
            while after + 1 < last && dropped(after) {
                after += 1;
            }

            let (a, b, c) = (
                kin.position(point(before)),
                kin.position(point(slot)),
                kin.position(point(after)),
            );
            let bend = wedge(a - b, b - c);
            let falls_on = (bend > 0.0 && wrapping == Wrapping::CcwDrop)
                || (bend < 0.0 && wrapping == Wrapping::CwDrop);
            falls_on.then_some(slot - 1)
        })?;

        self.pulleys[engaged].wrapping = Wrapping::Both;
        Some(engaged)
    }

    fn lift_unwrapped(&mut self, kin: &Kinematics) -> Option<usize> {
        let engaged: Vec<usize> = (0..self.pulleys.len())
            .filter(|&k| !self.pulleys[k].wrapping.is_dropped())
            .collect();

        for (i, &k) in engaged.iter().enumerate() {
            let prev = if i == 0 {
                self.p1
            } else {
                self.pulleys[engaged[i - 1]].idx
            };
            let next = engaged
                .get(i + 1)
                .map(|&n| self.pulleys[n].idx)
                .unwrap_or(self.p3);

            let (a, b, c) = (
                kin.position(prev),
                kin.position(self.pulleys[k].idx),
                kin.position(next),
            );
            let bend = wedge(a - b, b - c);
            let wrapping = self.pulleys[k].wrapping;
            if (bend > 0.0 && wrapping == Wrapping::Ccw)
                || (bend < 0.0 && wrapping == Wrapping::Cw)
            {
                self.pulleys.remove(k);
                return Some(k);
            }
        }
        None
    }
}

impl CamTrack {
    /// Freezes the lever ratio the first time the reference point drops
    /// below the base (relative y negative). Returns the ratio on the switch.
    pub fn update_mode(&mut self, kin: &Kinematics) -> Option<f64> {
        if self.is_fixed_ratio() {
            return None;
        }
        let base = kin.position(self.base);
        let reference = kin.position(self.reference) - base;
        if reference.y < 0.0 {
            let slider = kin.position(self.slider) - base;
            let base_length = slider.x;
            let tip_length = reference.x - slider.x;
            let ratio = base_length / tip_length;
            self.mode = CamMode::FixedRatio { ratio };
            return Some(ratio);
        }
        None
    }
}

impl ConstraintSet {
    /// Applies the geometry-triggered transitions (rope wrapping, cam mode)
    /// for the current state, in list order.
    pub fn advance_geometry(&mut self, kin: &Kinematics, out: &mut Vec<Transition>) {
        for (index, constraint) in self.constraints.iter_mut().enumerate() {
            match constraint {
                Constraint::RopePulley(rope) => {
                    let (engaged, lifted) = rope.update_wrapping(kin);
                    if let Some(pulley) = engaged {
                        out.push(Transition::PulleyEngaged {
                            constraint: index,
                            pulley,
                        });
                    }
                    if let Some(pulley) = lifted {
                        out.push(Transition::PulleyLifted {
                            constraint: index,
                            pulley,
                        });
                    }
                }
                Constraint::CamTrack(cam) => {
                    if let Some(ratio) = cam.update_mode(kin) {
                        out.push(Transition::CamSwitched {
                            constraint: index,
                            ratio,
                        });
                    }
                }
                _ => {}
            }
        }
    }

    /// Releases the first one-way constraint whose solved force is positive
    /// (it would have to pull). At most one release per call.
    pub fn release_one_way(&mut self, forces: &[f64]) -> Option<Transition> {
        for (index, (constraint, &force)) in self.constraints.iter_mut().zip(forces).enumerate() {
            if force > 0.0 && constraint.activation() == Activation::OneWay {
                if let Some(activation) = constraint.activation_mut() {
                    *activation = Activation::Released;
                }
                return Some(Transition::Released { constraint: index });
            }
        }
        None
    }

    /// Removes the first constraint holding `projectile` by an endpoint and
    /// marks the release as done. No-op after the first call.
    pub fn release_projectile(&mut self, projectile: usize) -> Option<Transition> {
        if self.projectile_released {
            return None;
        }
        self.projectile_released = true;
        let position = self
            .constraints
            .iter()
            .position(|c| c.attaches_endpoint(projectile));
        if let Some(index) = position {
            self.constraints.remove(index);
        }
        Some(Transition::ProjectileReleased {
            constraint: position,
        })
    }
}

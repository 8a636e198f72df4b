//! Input records: the per-kind constraints record, role indices and the
//! full scene (preset) format.
//!
//! A record is what front ends and optimizers edit. It is normalized, then
//! compiled into the [`ConstraintSet`] the engine runs on; a logged
//! snapshot can be converted back into a record.

use crate::constraint::{
    Activation, CamTrack, Colinear, Constraint, ConstraintSet, Pulley, Rod, RopeDrum, RopePulley,
    Slider,
};
use crate::error::{Error, Result};
use crate::system::Particle;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normal {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RodSpec {
    pub p1: usize,
    pub p2: usize,
    #[serde(default)]
    pub oneway: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliderSpec {
    pub p: usize,
    pub normal: Normal,
    #[serde(default)]
    pub oneway: bool,
}

/// Two orthogonal sliders on one particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinSpec {
    pub p: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColinearSpec {
    pub reference: usize,
    pub slider: usize,
    pub base: usize,
    #[serde(default)]
    pub oneway: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct F2kSpec {
    pub reference: usize,
    pub slider: usize,
    pub base: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RopeSpec {
    pub p1: usize,
    pub pulleys: Vec<Pulley>,
    pub p3: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RopeDrumSpec {
    pub p1: usize,
    pub p2: usize,
    pub p3: usize,
    pub length: f64,
}

/// Constraints grouped by kind. Omitted kinds deserialize as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintsSpec {
    pub rod: Vec<RodSpec>,
    pub slider: Vec<SliderSpec>,
    pub pin: Vec<PinSpec>,
    pub colinear: Vec<ColinearSpec>,
    pub f2k: Vec<F2kSpec>,
    pub rope: Vec<RopeSpec>,
    pub ropedrum: Vec<RopeDrumSpec>,
}

impl ConstraintsSpec {
    /// Turns every particle held by two or more bilateral sliders into a
    /// pin. All sliders on such a particle are dropped, one-way ones
    /// included.
    pub fn normalize(&mut self, particle_count: usize) {
        let mut counts = vec![0usize; particle_count];
        for slider in self.slider.iter().filter(|s| !s.oneway) {
            if let Some(count) = counts.get_mut(slider.p) {
                *count += 1;
            }
        }
        self.slider
            .retain(|s| counts.get(s.p).map_or(true, |&count| count < 2));
        self.pin.extend(
            counts
                .iter()
                .enumerate()
                .filter(|&(_, &count)| count > 1)
                .map(|(p, _)| PinSpec { p }),
        );
    }

    /// Builds the engine's constraint list, in the order rods, sliders,
    /// pins, colinear joints, cam tracks, ropes, rope drums.
    pub fn compile(&self, particle_count: usize) -> Result<ConstraintSet> {
        self.validate(particle_count)?;

        let mut constraints = Vec::new();
        constraints.extend(self.rod.iter().map(|r| {
            Constraint::Rod(Rod {
                p1: r.p1,
                p2: r.p2,
                activation: Activation::from_oneway(r.oneway),
            })
        }));
        constraints.extend(self.slider.iter().map(|s| {
            Constraint::Slider(Slider::new(
                s.p,
                Vector2::new(s.normal.x, s.normal.y),
                Activation::from_oneway(s.oneway),
            ))
        }));
        for pin in &self.pin {
            for normal in [Vector2::new(0.0, 1.0), Vector2::new(1.0, 0.0)] {
                constraints.push(Constraint::Slider(Slider::new(
                    pin.p,
                    normal,
                    Activation::Bilateral,
                )));
            }
        }
        constraints.extend(self.colinear.iter().map(|c| {
            Constraint::Colinear(Colinear {
                reference: c.reference,
                slider: c.slider,
                base: c.base,
                activation: Activation::from_oneway(c.oneway),
            })
        }));
        constraints.extend(
            self.f2k
                .iter()
                .map(|c| Constraint::CamTrack(CamTrack::new(c.reference, c.slider, c.base))),
        );
        constraints.extend(self.rope.iter().map(|r| {
            Constraint::RopePulley(RopePulley {
                p1: r.p1,
                pulleys: r.pulleys.clone(),
                p3: r.p3,
            })
        }));
        constraints.extend(self.ropedrum.iter().map(|d| {
            Constraint::RopeDrum(RopeDrum {
                p1: d.p1,
                p2: d.p2,
                p3: d.p3,
                length: d.length,
            })
        }));

        Ok(ConstraintSet::new(constraints))
    }

    /// Rebuilds a record from a live or logged constraint list.
    ///
    /// Released constraints and pulleys the rope has not reached are left
    /// out. Pins come back as two sliders and cam tracks lose their mode.
    pub fn from_constraint_set(set: &ConstraintSet) -> Self {
        let mut spec = Self::default();
        for constraint in set.iter().filter(|c| !c.is_released()) {
            let oneway = constraint.activation() == Activation::OneWay;
            match constraint {
                Constraint::Rod(r) => spec.rod.push(RodSpec {
                    p1: r.p1,
                    p2: r.p2,
                    oneway,
                }),
                Constraint::Slider(s) => spec.slider.push(SliderSpec {
                    p: s.p,
                    normal: Normal {
                        x: s.normal.x,
                        y: s.normal.y,
                    },
                    oneway,
                }),
                Constraint::Colinear(c) => spec.colinear.push(ColinearSpec {
                    reference: c.reference,
                    slider: c.slider,
                    base: c.base,
                    oneway,
                }),
                Constraint::CamTrack(c) => spec.f2k.push(F2kSpec {
                    reference: c.reference,
                    slider: c.slider,
                    base: c.base,
                }),
                Constraint::RopePulley(r) => spec.rope.push(RopeSpec {
                    p1: r.p1,
                    pulleys: r
                        .pulleys
                        .iter()
                        .filter(|p| !p.wrapping.is_dropped())
                        .copied()
                        .collect(),
                    p3: r.p3,
                }),
                Constraint::RopeDrum(d) => spec.ropedrum.push(RopeDrumSpec {
                    p1: d.p1,
                    p2: d.p2,
                    p3: d.p3,
                    length: d.length,
                }),
            }
        }
        spec
    }

    fn validate(&self, count: usize) -> Result<()> {
        fn check(
            kind: &'static str,
            index: usize,
            particles: &[usize],
            count: usize,
        ) -> Result<()> {
            match particles.iter().find(|&&p| p >= count) {
                Some(&particle) => Err(Error::ParticleOutOfRange {
                    kind,
                    index,
                    particle,
                    count,
                }),
                None => Ok(()),
            }
        }

        for (i, r) in self.rod.iter().enumerate() {
            check("rod", i, &[r.p1, r.p2], count)?;
        }
        for (i, s) in self.slider.iter().enumerate() {
            check("slider", i, &[s.p], count)?;
        }
        for (i, p) in self.pin.iter().enumerate() {
            check("pin", i, &[p.p], count)?;
        }
        for (i, c) in self.colinear.iter().enumerate() {
            check("colinear", i, &[c.reference, c.slider, c.base], count)?;
        }
        for (i, c) in self.f2k.iter().enumerate() {
            check("f2k", i, &[c.reference, c.slider, c.base], count)?;
        }
        for (i, r) in self.rope.iter().enumerate() {
            let mut particles = vec![r.p1, r.p3];
            particles.extend(r.pulleys.iter().map(|p| p.idx));
            check("rope", i, &particles, count)?;
        }
        for (i, d) in self.ropedrum.iter().enumerate() {
            check("ropedrum", i, &[d.p1, d.p2, d.p3], count)?;
        }
        Ok(())
    }
}

/// The three particles post-processing and launch detection refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
    pub projectile: usize,
    pub mainaxle: usize,
    pub armtip: usize,
}

impl Roles {
    pub fn validate(&self, particle_count: usize) -> Result<()> {
        for (role, index) in [
            ("projectile", self.projectile),
            ("mainaxle", self.mainaxle),
            ("armtip", self.armtip),
        ] {
            if index >= particle_count {
                return Err(Error::RoleOutOfRange {
                    role,
                    index,
                    count: particle_count,
                });
            }
        }
        Ok(())
    }

    /// State-vector predicate that fires once the projectile moves right
    /// faster than `min_vx` while still descending (y grows downwards).
    pub fn launch_predicate(&self, min_vx: f64) -> impl FnMut(&[f64]) -> bool {
        let projectile = self.projectile;
        move |state: &[f64]| {
            let half = state.len() / 2;
            let vx = state[half + 2 * projectile];
            let vy = state[half + 2 * projectile + 1];
            vx > min_vx && vy > 0.0
        }
    }
}

/// A complete trebuchet design as stored in presets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(flatten)]
    pub roles: Roles,
    pub axleheight: f64,
    pub timestep: f64,
    pub duration: f64,
    pub particles: Vec<Particle>,
    #[serde(default)]
    pub constraints: ConstraintsSpec,
}

impl Scene {
    /// Parses a scene and normalizes its constraints record.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut scene: Scene = serde_json::from_str(json)?;
        scene.normalize();
        Ok(scene)
    }

    pub fn normalize(&mut self) {
        self.constraints.normalize(self.particles.len());
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Wrapping;

    fn assert_err_contains(result: Result<impl std::fmt::Debug>, needle: &str) {
        match result {
            Ok(value) => panic!("expected error containing '{needle}', got {value:?}"),
            Err(err) => {
                let message = err.to_string();
                assert!(
                    message.contains(needle),
                    "expected '{needle}' in '{message}'"
                );
            }
        }
    }

    #[test]
    fn omitted_kinds_default_to_empty() {
        let spec: ConstraintsSpec =
            serde_json::from_str(r#"{"rod":[{"p1":0,"p2":1}]}"#).expect("parse");
        assert_eq!(spec.rod.len(), 1);
        assert!(!spec.rod[0].oneway);
        assert!(spec.slider.is_empty() && spec.pin.is_empty() && spec.ropedrum.is_empty());
    }

    #[test]
    fn doubled_bilateral_sliders_become_a_pin() {
        let mut spec: ConstraintsSpec = serde_json::from_str(
            r#"{"slider":[
                {"p":0,"normal":{"x":0,"y":1}},
                {"p":0,"normal":{"x":0.6,"y":1}},
                {"p":0,"normal":{"x":1,"y":0},"oneway":true},
                {"p":3,"normal":{"x":0,"y":1},"oneway":true},
                {"p":2,"normal":{"x":0,"y":1}}
            ]}"#,
        )
        .expect("parse");
        spec.normalize(4);
        assert_eq!(spec.pin, vec![PinSpec { p: 0 }]);
        let kept: Vec<usize> = spec.slider.iter().map(|s| s.p).collect();
        assert_eq!(kept, vec![3, 2]);
    }

    #[test]
    fn compile_orders_kinds_and_expands_pins() {
        let spec = ConstraintsSpec {
            rod: vec![RodSpec {
                p1: 0,
                p2: 1,
                oneway: true,
            }],
            pin: vec![PinSpec { p: 0 }],
            f2k: vec![F2kSpec {
                reference: 0,
                slider: 1,
                base: 2,
            }],
            slider: vec![SliderSpec {
                p: 2,
                normal: Normal { x: 0.0, y: 2.0 },
                oneway: false,
            }],
            ..Default::default()
        };
        let set = spec.compile(3).expect("compile");
        let kinds: Vec<&str> = set.iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, vec!["rod", "slider", "slider", "slider", "f2k"]);
        assert_eq!(set.constraints[0].activation(), Activation::OneWay);
        match &set.constraints[1] {
            Constraint::Slider(s) => assert_eq!(s.normal, Vector2::new(0.0, 1.0)),
            other => panic!("unexpected {other:?}"),
        }
        match &set.constraints[3] {
            Constraint::Slider(s) => assert_eq!((s.p, s.normal), (0, Vector2::new(1.0, 0.0))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn compile_rejects_unknown_particles() {
        let spec = ConstraintsSpec {
            rope: vec![RopeSpec {
                p1: 0,
                pulleys: vec![Pulley {
                    idx: 7,
                    wrapping: Wrapping::Cw,
                }],
                p3: 1,
            }],
            ..Default::default()
        };
        assert_err_contains(spec.compile(2), "rope constraint #0 references particle 7");
    }

    #[test]
    fn convert_back_skips_released_constraints_and_dropped_pulleys() {
        let mut set = ConstraintsSpec {
            rod: vec![
                RodSpec {
                    p1: 0,
                    p2: 1,
                    oneway: true,
                },
                RodSpec {
                    p1: 1,
                    p2: 2,
                    oneway: true,
                },
            ],
            rope: vec![RopeSpec {
                p1: 0,
                pulleys: vec![
                    Pulley {
                        idx: 1,
                        wrapping: Wrapping::CwDrop,
                    },
                    Pulley {
                        idx: 2,
                        wrapping: Wrapping::Ccw,
                    },
                ],
                p3: 3,
            }],
            ..Default::default()
        }
        .compile(4)
        .expect("compile");
        set.release_one_way(&[1.0, 0.0, 0.0]);

        let back = ConstraintsSpec::from_constraint_set(&set);
        assert_eq!(
            back.rod,
            vec![RodSpec {
                p1: 1,
                p2: 2,
                oneway: true
            }]
        );
        assert_eq!(back.rope[0].pulleys.len(), 1);
        assert_eq!(back.rope[0].pulleys[0].idx, 2);
    }

    #[test]
    fn scene_json_carries_roles_and_is_normalized() {
        let scene = Scene::from_json(
            r#"{"projectile":3,"mainaxle":0,"armtip":1,"axleheight":8,"timestep":0.3,
                "duration":35,"particles":[{"x":0,"y":0,"mass":1},{"x":1,"y":0,"mass":1},
                {"x":2,"y":0,"mass":1},{"x":3,"y":0,"mass":1}],
                "constraints":{"slider":[{"p":0,"normal":{"x":0,"y":1}},
                {"p":0,"normal":{"x":1,"y":0}}]}}"#,
        )
        .expect("scene");
        assert_eq!(
            scene.roles,
            Roles {
                projectile: 3,
                mainaxle: 0,
                armtip: 1
            }
        );
        assert!(scene.constraints.slider.is_empty());
        assert_eq!(scene.constraints.pin, vec![PinSpec { p: 0 }]);
    }

    #[test]
    fn malformed_scene_is_a_json_error() {
        assert_err_contains(Scene::from_json(r#"{"projectile":"x"}"#), "scene JSON error");
    }

    #[test]
    fn roles_are_checked_against_particle_count() {
        let roles = Roles {
            projectile: 5,
            mainaxle: 0,
            armtip: 1,
        };
        assert_err_contains(roles.validate(3).map(|_| ()), "projectile index 5");
    }

    #[test]
    fn launch_predicate_needs_rightward_descending_projectile() {
        let roles = Roles {
            projectile: 1,
            mainaxle: 0,
            armtip: 0,
        };
        let mut launched = roles.launch_predicate(40.0);
        let mut state = vec![0.0; 8];
        state[6] = 50.0;
        state[7] = -1.0;
        assert!(!launched(&state));
        state[7] = 1.0;
        assert!(launched(&state));
        state[6] = 30.0;
        assert!(!launched(&state));
    }
}

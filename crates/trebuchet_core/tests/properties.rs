mod common;

use approx::assert_relative_eq;
use nalgebra::Vector2;
use trebuchet_core::constraint::{Constraint, Pulley, Wrapping};
use trebuchet_core::dynamics::{LinkageDynamics, Never};
use trebuchet_core::integrator::Dopri5;
use trebuchet_core::scene::{ColinearSpec, F2kSpec, PinSpec, RodSpec, RopeDrumSpec, RopeSpec};
use trebuchet_core::scoring::mechanical_energy;
use trebuchet_core::system::System;
use trebuchet_core::traits::DynamicalSystem;
use trebuchet_core::{simulate, ConstraintsSpec, Particle, Roles, SimulationSettings};

#[test]
fn rods_stay_rigid() {
    let scene = common::hinged_counterweight();
    let output = scene.simulate(|_| false).expect("simulate");
    let initial = output.trajectory[0].clone();
    for rod in &scene.constraints.rod {
        let length = common::distance(&initial, rod.p1, rod.p2);
        for state in &output.trajectory {
            assert_relative_eq!(
                common::distance(state, rod.p1, rod.p2),
                length,
                max_relative = 1e-2
            );
        }
    }
}

#[test]
fn one_way_release_never_reverts() {
    let scene = common::hinged_counterweight();
    let output = scene.simulate(|_| false).expect("simulate");

    // Rods first, then the surviving one-way slider under the projectile.
    let floor = scene.constraints.rod.len();
    let released: Vec<bool> = output
        .log
        .snapshots
        .iter()
        .map(|s| s.constraints[floor].is_released())
        .collect();
    assert!(!released[0]);
    assert!(released.windows(2).all(|w| w[0] <= w[1]));
    assert!(
        released.last().copied().unwrap_or(false),
        "the sling lifts the projectile off the floor"
    );
}

fn rope_pulleys(output: &trebuchet_core::SimulationOutput) -> Vec<(f64, Vec<Pulley>)> {
    output
        .log
        .times
        .iter()
        .zip(&output.log.snapshots)
        .filter_map(|(&t, s)| {
            s.iter().find_map(|c| match c {
                Constraint::RopePulley(rope) => Some((t, rope.pulleys.clone())),
                _ => None,
            })
        })
        .collect()
}

#[test]
fn rope_pulley_count_never_grows() {
    // Atwood machine over pinned pulley 1; pulley 2 sits where the rope
    // does not bend around it and is lifted straight away.
    let particles = vec![
        Particle::new(-5.0, 10.0, 1.0),
        Particle::new(0.0, 0.0, 1.0),
        Particle::new(5.0, 0.5, 1.0),
        Particle::new(5.0, 10.0, 2.0),
    ];
    let constraints = ConstraintsSpec {
        pin: vec![PinSpec { p: 1 }, PinSpec { p: 2 }],
        rope: vec![RopeSpec {
            p1: 0,
            pulleys: vec![
                Pulley {
                    idx: 1,
                    wrapping: Wrapping::Cw,
                },
                Pulley {
                    idx: 2,
                    wrapping: Wrapping::Ccw,
                },
            ],
            p3: 3,
        }],
        ..Default::default()
    };
    let roles = Roles {
        projectile: 0,
        mainaxle: 1,
        armtip: 1,
    };
    let output = simulate(
        &particles,
        &constraints,
        &roles,
        &SimulationSettings::new(0.5, 6.0),
        |_| false,
    )
    .expect("simulate");

    let logged = rope_pulleys(&output);
    let counts: Vec<usize> = logged.iter().map(|(_, pulleys)| pulleys.len()).collect();
    assert_eq!(counts.first(), Some(&2));
    assert!(counts.windows(2).all(|w| w[1] <= w[0]));

    // Pulley 2 goes first, early in the run.
    let (t, remaining) = logged
        .iter()
        .find(|(_, pulleys)| pulleys.len() == 1)
        .expect("a pulley lifts");
    assert!(*t < 1.0, "pulley 2 lifted late, at {t}");
    assert_eq!(remaining[0].idx, 1);

    // The heavier side wins while the rope runs over a single pulley.
    let end = output.trajectory.last().expect("samples");
    assert!(end[7] > 10.0);
    assert!(end[1] < 10.0);
}

#[test]
fn dropped_pulley_engages_once_the_rope_swings_onto_it() {
    // A pendulum on a rope from anchor 0; peg 1 sits below the rope and
    // catches it once the bob swings past 45 degrees.
    let particles = vec![
        Particle::new(0.0, 0.0, 1.0),
        Particle::new(3.0, 3.0, 1.0),
        Particle::new(10.0, 0.0, 1.0),
    ];
    let constraints = ConstraintsSpec {
        pin: vec![PinSpec { p: 0 }, PinSpec { p: 1 }],
        rope: vec![RopeSpec {
            p1: 0,
            pulleys: vec![Pulley {
                idx: 1,
                wrapping: Wrapping::CcwDrop,
            }],
            p3: 2,
        }],
        ..Default::default()
    };
    let roles = Roles {
        projectile: 2,
        mainaxle: 0,
        armtip: 2,
    };
    let output = simulate(
        &particles,
        &constraints,
        &roles,
        &SimulationSettings::new(0.5, 10.0),
        |_| false,
    )
    .expect("simulate");

    let logged = rope_pulleys(&output);
    assert!(logged.iter().all(|(_, pulleys)| pulleys.len() == 1));
    let engaged: Vec<bool> = logged
        .iter()
        .map(|(_, pulleys)| pulleys[0].wrapping == Wrapping::Both)
        .collect();
    assert!(!engaged[0]);
    assert!(engaged.windows(2).all(|w| w[0] <= w[1]));
    assert!(engaged.last().copied().unwrap_or(false), "the peg never caught the rope");

    // Swinging around the peg, the bob bottoms out near 3 + (10 - 3√2)
    // instead of 10 directly under the anchor.
    let lowest = output
        .trajectory
        .iter()
        .map(|state| state[5])
        .fold(f64::NEG_INFINITY, f64::max);
    assert!(lowest < 9.8, "bob reached y = {lowest}");
}

#[test]
fn colinear_slider_stays_on_its_track() {
    let particles = vec![
        Particle::new(0.0, 0.0, 1.0),
        Particle::new(10.0, 10.0, 1.0),
        Particle::new(2.0, 2.0, 1.0),
    ];
    let constraints = ConstraintsSpec {
        pin: vec![PinSpec { p: 0 }, PinSpec { p: 1 }],
        colinear: vec![ColinearSpec {
            reference: 1,
            slider: 2,
            base: 0,
            oneway: false,
        }],
        ..Default::default()
    };
    let roles = Roles {
        projectile: 2,
        mainaxle: 0,
        armtip: 1,
    };
    let output = simulate(
        &particles,
        &constraints,
        &roles,
        &SimulationSettings::new(0.5, 5.0),
        |_| false,
    )
    .expect("simulate");

    for state in &output.trajectory {
        // Signed offset from the base-reference diagonal.
        let offset = (state[5] - state[4]) / 2f64.sqrt();
        assert!(offset.abs() < 1e-3, "slider left its track by {offset}");
    }
    let end = output.trajectory.last().expect("samples");
    assert!(end[5] > 5.0, "slider should run down the incline");
}

#[test]
fn cam_track_switches_to_a_fixed_ratio_for_good() {
    // Rigid lever pinned at 0 with the heavy end on the right; the track
    // end 1 rises through the axle height while roller 3 rides the track.
    let particles = vec![
        Particle::new(0.0, 0.0, 1.0),
        Particle::new(-10.0, 0.2, 1.0),
        Particle::new(4.0, 1.0, 10.0),
        Particle::new(-5.0, 0.1, 1.0),
    ];
    let rod = |p1, p2| RodSpec {
        p1,
        p2,
        oneway: false,
    };
    let constraints = ConstraintsSpec {
        rod: vec![rod(1, 0), rod(2, 0), rod(1, 2)],
        pin: vec![PinSpec { p: 0 }],
        f2k: vec![F2kSpec {
            reference: 1,
            slider: 3,
            base: 0,
        }],
        ..Default::default()
    };
    let roles = Roles {
        projectile: 3,
        mainaxle: 0,
        armtip: 1,
    };
    let output = simulate(
        &particles,
        &constraints,
        &roles,
        &SimulationSettings::new(0.25, 3.0),
        |_| false,
    )
    .expect("simulate");

    let fixed: Vec<bool> = output
        .log
        .snapshots
        .iter()
        .filter_map(|s| {
            s.iter().find_map(|c| match c {
                Constraint::CamTrack(cam) => Some(cam.is_fixed_ratio()),
                _ => None,
            })
        })
        .collect();
    assert_eq!(fixed.len(), output.log.len());
    assert!(!fixed[0]);
    assert!(fixed.windows(2).all(|w| w[0] <= w[1]));
    assert!(fixed.last().copied().unwrap_or(false), "the cam never switched");

    let end = output.trajectory.last().expect("samples");
    assert!(end[3] < 0.0, "the track end should have risen above the axle");
}

#[test]
fn rope_drum_holds_its_detour_length() {
    // Drum centre 0 and rim point 1 held fixed; the free end slides along
    // the hyperbola of constant detour.
    let particles = vec![
        Particle::new(0.0, 0.0, 1.0),
        Particle::new(1.0, 0.0, 1.0),
        Particle::new(5.0, 3.0, 1.0),
    ];
    let constraints = ConstraintsSpec {
        pin: vec![PinSpec { p: 0 }, PinSpec { p: 1 }],
        ropedrum: vec![RopeDrumSpec {
            p1: 2,
            p2: 0,
            p3: 1,
            length: 1.0,
        }],
        ..Default::default()
    };
    let roles = Roles {
        projectile: 2,
        mainaxle: 0,
        armtip: 1,
    };
    let output = simulate(
        &particles,
        &constraints,
        &roles,
        &SimulationSettings::new(0.5, 6.0),
        |_| false,
    )
    .expect("simulate");

    let detour = |state: &[f64]| {
        common::distance(state, 2, 0) + common::distance(state, 0, 1)
            - common::distance(state, 2, 1)
    };
    let initial = detour(&output.trajectory[0]);
    for state in &output.trajectory {
        assert_relative_eq!(detour(state), initial, max_relative = 1e-3);
    }
    let end = output.trajectory.last().expect("samples");
    assert!(end[5] > 3.5, "the free end should fall along the drum's curve");
}

#[test]
fn identical_inputs_give_identical_outputs() {
    let scene = common::hinged_counterweight();
    let a = scene.simulate(|_| false).expect("simulate");
    let b = scene.simulate(|_| false).expect("simulate");

    let bits = |trajectory: &[Vec<f64>]| -> Vec<u64> {
        trajectory.iter().flatten().map(|v| v.to_bits()).collect()
    };
    assert_eq!(bits(&a.trajectory), bits(&b.trajectory));
    assert_eq!(a.log.times, b.log.times);
    assert_eq!(a.log.forces, b.log.forces);
    assert_eq!(a.log.snapshots, b.log.snapshots);
}

#[test]
fn closed_system_conserves_energy() {
    // Double pendulum hung from a pin, released from horizontal.
    let particles = vec![
        Particle::new(0.0, 100.0, 1.0),
        Particle::new(10.0, 100.0, 2.0),
        Particle::new(20.0, 100.0, 1.0),
    ];
    let constraints = ConstraintsSpec {
        rod: vec![
            RodSpec {
                p1: 0,
                p2: 1,
                oneway: false,
            },
            RodSpec {
                p1: 1,
                p2: 2,
                oneway: false,
            },
        ],
        pin: vec![PinSpec { p: 0 }],
        ..Default::default()
    };
    let roles = Roles {
        projectile: 2,
        mainaxle: 0,
        armtip: 1,
    };
    let settings = SimulationSettings::new(0.25, 20.0);
    let output =
        simulate(&particles, &constraints, &roles, &settings, |_| false).expect("simulate");

    let initial = mechanical_energy(&output.trajectory[0], &particles, settings.gravity);
    for state in &output.trajectory {
        let energy = mechanical_energy(state, &particles, settings.gravity);
        assert_relative_eq!(energy, initial, max_relative = 1e-2);
    }
}

#[test]
fn rewind_restores_the_constraints_in_force_after_t() {
    let scene = common::hinged_counterweight();
    let constraints = scene
        .constraints
        .compile(scene.particles.len())
        .expect("compile");
    let system = System::new(&scene.particles, constraints, Vector2::new(0.0, 1.0));
    let initial = system.state();
    let mut dynamics = LinkageDynamics::new(system, scene.roles.projectile, Never);
    let solution = Dopri5::new(initial.len()).integrate(
        &mut dynamics,
        0.0,
        scene.duration,
        &initial,
        &Default::default(),
    );

    let before = dynamics.log().clone();
    let changed = before
        .snapshots
        .windows(2)
        .position(|w| w[0] != w[1])
        .expect("the floor releases during the run");
    let next = (changed + 1..before.len())
        .find(|&i| before.times[i] > before.times[changed])
        .expect("later evaluations");
    // Revisit a time after the releasing evaluation but before the next
    // logged time.
    let t = 0.5 * (before.times[changed] + before.times[next]);
    let mut out = vec![0.0; initial.len()];
    dynamics.apply(t, &solution.at(t), &mut out);

    let after = dynamics.log();
    assert_eq!(after.len(), next + 1);
    assert_eq!(&after.times[..next], &before.times[..next]);
    assert_ne!(before.snapshots[next], before.snapshots[changed]);
    assert_eq!(after.snapshots[next], before.snapshots[next]);
    assert_eq!(dynamics.system().constraints, *before.snapshots[next]);
}

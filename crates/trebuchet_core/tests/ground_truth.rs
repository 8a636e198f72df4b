mod common;

use trebuchet_core::scoring::{peak_load, range};

#[test]
fn hinged_counterweight_matches_reference_scores() {
    let scene = common::hinged_counterweight();
    let output = scene.simulate(|_| false).expect("simulation runs");
    assert_eq!(output.trajectory.len(), 117);

    let range = range(
        &output.trajectory,
        &scene.particles,
        &scene.roles,
        scene.axleheight,
    );
    let peak = peak_load(output.forces());
    assert!((range - 331.2).abs() < 5.0, "range {range}");
    assert!((peak - 1020.3).abs() < 5.0, "peak load {peak}");
}

#[test]
fn scene_score_agrees_with_the_free_functions() {
    let scene = common::hinged_counterweight();
    let output = scene.simulate(|_| false).expect("simulation runs");
    let score = scene.score(&output);
    assert_eq!(score.peak_load, peak_load(output.forces()));
    assert_eq!(
        score.range,
        range(
            &output.trajectory,
            &scene.particles,
            &scene.roles,
            scene.axleheight
        )
    );
}

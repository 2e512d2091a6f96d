use pretty_assertions::assert_eq;
use std::sync::Arc;

use crate::test_support::{
    Row, assert_approx, kinds, record, skeleton_data, skeleton_for, state, state_with,
};
use crate::{
    Animation, AnimationStateConfig, AnimationStateData, BoneTimeline, Curve, Error, MixBlend,
    MixConfig, RotateFrame, RotateTimeline, Timeline,
};

fn ended(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .filter(|row| row.kind == "end")
        .map(|row| row.animation.clone())
        .collect()
}

#[test]
fn crossfade_weights_the_outgoing_pose_by_the_remaining_mix() {
    let mut state = state_with(|data| data.set_mix("move", "rotate", 1.0).unwrap());
    let mut skeleton = skeleton_for(&state);

    state.set_animation(0, "move", false).unwrap();
    state.update(0.5);
    state.apply(&mut skeleton);
    assert_approx(skeleton.bones[1].x, 60.0);

    let rotate = state.set_animation(0, "rotate", false).unwrap();
    assert_eq!(rotate.mix_duration(&state), Some(1.0));
    state.update(0.25);
    assert!(state.apply(&mut skeleton));

    // `move` is at 0.75 with 75% weight left; `rotate` is at 0.25 with 25% weight.
    assert_approx(skeleton.bones[1].x, 10.0 + 75.0 * 0.75);
    assert_approx(skeleton.bones[1].rotation, 22.5 * 0.25);
}

fn rotation_after_interrupt(hold_previous: bool) -> f32 {
    let mut state = state_with(|data| data.set_mix("rotate", "move", 1.0).unwrap());
    let mut skeleton = skeleton_for(&state);

    state.set_animation(0, "rotate", false).unwrap();
    state.update(0.5);
    let entry = state.set_animation(0, "move", false).unwrap();
    entry.set_hold_previous(&mut state, hold_previous);
    state.update(0.25);
    state.apply(&mut skeleton);
    skeleton.bones[1].rotation
}

#[test]
fn hold_previous_keeps_the_outgoing_pose_at_full_weight() {
    assert_approx(rotation_after_interrupt(false), 67.5 * 0.75);
    assert_approx(rotation_after_interrupt(true), 67.5);
}

#[test]
fn additive_track_adds_onto_lower_tracks() {
    let mut state = state();
    let mut skeleton = skeleton_for(&state);

    state.set_animation(0, "move", false).unwrap();
    let layer = state.set_animation(1, "move", false).unwrap();
    layer.set_mix_blend(&mut state, MixBlend::Add);
    layer.set_alpha(&mut state, 0.5);
    state.update(0.5);
    state.apply(&mut skeleton);

    assert_approx(skeleton.bones[1].x, 60.0 + 50.0 * 0.5);
}

#[test]
fn empty_animations_mix_every_track_out() {
    let mut state = state();
    let rows = record(&mut state);
    let mut skeleton = skeleton_for(&state);

    state.set_animation(0, "move", true).unwrap();
    state.set_animation(1, "rotate", true).unwrap();
    state.update(0.5);
    state.set_empty_animations(0.5).unwrap();
    for track in 0..2 {
        let current = state.current(track).unwrap();
        assert_eq!(current.animation(&state).unwrap().name, "<empty>");
        assert_eq!(current.mix_duration(&state), Some(0.5));
    }

    for _ in 0..30 {
        state.update(0.1);
    }

    assert!(state.tracks().all(|track| track.is_none()));
    let mut ended = ended(&rows.take());
    ended.sort();
    assert_eq!(ended, vec!["<empty>", "<empty>", "move", "rotate"]);

    skeleton.bones[1].x = 0.0;
    assert!(!state.apply(&mut skeleton));
    assert_approx(skeleton.bones[1].x, 0.0);
}

#[test]
fn queued_empty_animation_mixes_out_after_completion() {
    let mut state = state();
    let rows = record(&mut state);

    state.set_animation(0, "move", false).unwrap();
    let empty = state.add_empty_animation(0, 0.5, 0.0).unwrap();
    assert_eq!(empty.delay(&state), Some(0.5));
    assert_eq!(empty.track_end(&state), Some(0.5));

    for _ in 0..40 {
        state.update(0.1);
    }

    assert!(state.current(0).is_none());
    assert_eq!(ended(&rows.take()), vec!["move", "<empty>"]);
}

#[test]
fn time_scales_multiply() {
    let mut state = state();
    state.set_time_scale(2.0);
    let entry = state.set_animation(0, "move", false).unwrap();
    entry.set_time_scale(&mut state, 0.5);

    state.update(0.25);

    assert_eq!(state.time(), 0.5);
    assert_eq!(entry.track_time(&state), Some(0.25));
}

#[test]
fn delayed_entry_waits_before_posing() {
    let mut state = state();
    let mut skeleton = skeleton_for(&state);
    let entry = state.add_animation(0, "move", false, 0.5).unwrap();
    assert_eq!(state.current(0), Some(entry));

    state.update(0.25);
    assert!(!state.apply(&mut skeleton));
    assert_eq!(entry.track_time(&state), Some(0.0));

    state.update(0.5);
    assert!(state.apply(&mut skeleton));
    assert_eq!(entry.track_time(&state), Some(0.25));
}

#[test]
fn clear_next_disposes_the_queue() {
    let mut state = state();
    let rows = record(&mut state);
    let first = state.set_animation(0, "events0", false).unwrap();
    let second = state.add_animation(0, "events1", false, 0.0).unwrap();
    let third = state.add_animation(0, "move", false, 0.0).unwrap();
    assert_eq!(first.next(&state), Some(second));

    let before = rows.borrow().len();
    state.clear_next(first);

    assert_eq!(
        rows.borrow()[before..].to_vec(),
        vec![
            Row::new("dispose", "events1", 0.0, 0.0),
            Row::new("dispose", "move", 0.0, 0.0),
        ]
    );
    assert!(first.next(&state).is_none());
    assert!(!second.is_valid(&state));
    assert!(!third.is_valid(&state));
    assert_eq!(state.current(0), Some(first));
}

#[test]
fn reverse_plays_from_the_end() {
    let mut state = state();
    let mut skeleton = skeleton_for(&state);
    let entry = state.set_animation(0, "move", false).unwrap();
    entry.set_reverse(&mut state, true);

    state.update(0.25);
    state.apply(&mut skeleton);

    assert_approx(skeleton.bones[1].x, 10.0 + 75.0);
}

#[test]
fn looping_within_an_animation_window() {
    let mut state = state();
    let mut skeleton = skeleton_for(&state);
    let entry = state.set_animation(0, "move", true).unwrap();
    entry.set_animation_end(&mut state, 0.5);

    state.update(0.75);
    assert_eq!(entry.animation_time(&state), Some(0.25));
    state.apply(&mut skeleton);

    assert_approx(skeleton.bones[1].x, 10.0 + 25.0);
}

#[test]
fn animations_outside_the_skeleton_data_can_be_played() {
    let mut state = state_with(|data| data.default_mix = 0.3);
    let mut skeleton = skeleton_for(&state);
    let spin = Animation::new(
        "spin",
        1.0,
        vec![Timeline::Bone(BoneTimeline::Rotate(RotateTimeline {
            bone_index: 1,
            frames: vec![RotateFrame {
                time: 0.0,
                angle: 30.0,
                curve: Curve::Linear,
            }],
        }))],
    )
    .unwrap();

    state.set_animation(0, "move", false).unwrap();
    state.update(0.1);
    let entry = state.set_animation_with(0, Arc::new(spin), false).unwrap();
    assert_eq!(entry.mix_duration(&state), Some(0.3));

    entry.set_mix_duration(&mut state, 0.0);
    state.update(0.1);
    state.apply(&mut skeleton);
    assert_approx(skeleton.bones[1].rotation, 30.0);
}

#[test]
fn config_builds_the_mix_table() {
    let skeleton_data = Arc::new(skeleton_data());
    let config = AnimationStateConfig {
        default_mix: 0.2,
        event_threshold: 0.1,
        mixes: vec![MixConfig {
            from: "move".to_string(),
            to: "rotate".to_string(),
            duration: 0.5,
        }],
        ..AnimationStateConfig::default()
    };

    let data = AnimationStateData::from_config(Arc::clone(&skeleton_data), &config).unwrap();
    let index = |name: &str| skeleton_data.animation(name).map(|(index, _)| index);

    assert_eq!(data.mix_duration(index("move"), index("rotate")), 0.5);
    assert_eq!(data.mix_duration(index("rotate"), index("move")), 0.2);
    assert_eq!(data.mix_duration(index("move"), None), 0.2);
    assert_eq!(data.event_threshold, 0.1);
}

#[test]
fn config_rejects_unknown_animations_and_bad_values() {
    let skeleton_data = Arc::new(skeleton_data());

    let unknown = AnimationStateConfig {
        mixes: vec![MixConfig {
            from: "move".to_string(),
            to: "missing".to_string(),
            duration: 0.5,
        }],
        ..AnimationStateConfig::default()
    };
    assert!(matches!(
        AnimationStateData::from_config(Arc::clone(&skeleton_data), &unknown),
        Err(Error::UnknownAnimation { ref name }) if name == "missing"
    ));

    let negative = AnimationStateConfig {
        default_mix: -1.0,
        ..AnimationStateConfig::default()
    };
    assert!(matches!(
        AnimationStateData::from_config(Arc::clone(&skeleton_data), &negative),
        Err(Error::InvalidValue { .. })
    ));

    let mut data = AnimationStateData::new(skeleton_data);
    assert!(matches!(
        data.set_mix("move", "rotate", f32::NAN),
        Err(Error::InvalidValue { .. })
    ));
}

#[test]
fn interrupt_start_order_when_replacing_a_playing_entry() {
    let mut state = state();
    let rows = record(&mut state);
    state.set_animation(0, "move", false).unwrap();
    state.update(0.1);
    state.set_animation(0, "rotate", false).unwrap();

    assert_eq!(kinds(&rows), vec!["start", "interrupt", "start"]);
}

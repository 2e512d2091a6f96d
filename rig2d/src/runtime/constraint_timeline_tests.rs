use std::sync::Arc;

use crate::test_support::assert_approx;
use crate::{
    Animation, BoneData, Curve, FloatFrame, IkConstraintData, IkConstraintTimeline, IkFrame,
    MixBlend, MixDirection, PathConstraintData, PathConstraintPositionTimeline,
    PathConstraintTimeline, Rgba2Frame, Rgba2Timeline, Skeleton, SkeletonData, SlotData,
    Timeline, TransformConstraintData, TransformConstraintTimeline, TransformFrame,
};

fn constrained_skeleton() -> Skeleton {
    let mut slot = SlotData::new("slot", 0);
    slot.has_dark = true;
    let mut data = SkeletonData::new(vec![BoneData::new("root", None)], vec![slot]).unwrap();
    data.ik_constraints.push(IkConstraintData {
        name: "ik".to_string(),
        skin_required: false,
        bones: vec![0],
        mix: 1.0,
        softness: 0.0,
        compress: false,
        stretch: false,
        bend_direction: 1,
    });
    data.transform_constraints.push(TransformConstraintData {
        name: "transform".to_string(),
        skin_required: false,
        bones: vec![0],
        mix_rotate: 1.0,
        mix_x: 1.0,
        mix_y: 1.0,
        mix_scale_x: 1.0,
        mix_scale_y: 1.0,
        mix_shear_y: 1.0,
    });
    data.path_constraints.push(PathConstraintData {
        name: "path".to_string(),
        skin_required: false,
        bones: vec![0],
        position: 0.0,
        spacing: 0.0,
        mix_rotate: 1.0,
        mix_x: 1.0,
        mix_y: 1.0,
    });
    Skeleton::new(Arc::new(data))
}

fn ik_frame(time: f32, mix: f32, softness: f32, bend_direction: i32) -> IkFrame {
    IkFrame {
        time,
        mix,
        softness,
        bend_direction,
        compress: bend_direction < 0,
        stretch: false,
        curve: [Curve::Linear; 2],
    }
}

fn ik_animation() -> Animation {
    Animation::new(
        "ik",
        1.0,
        vec![Timeline::IkConstraint(IkConstraintTimeline {
            constraint_index: 0,
            frames: vec![ik_frame(0.0, 0.0, 0.0, 1), ik_frame(1.0, 1.0, 10.0, -1)],
        })],
    )
    .unwrap()
}

#[test]
fn ik_timeline_mixes_values_and_steps_flags() {
    let mut skeleton = constrained_skeleton();
    let animation = ik_animation();

    animation.apply(&mut skeleton, 0.5, 0.5, false, None, 1.0, MixBlend::Setup, MixDirection::In);
    let ik = &skeleton.ik_constraints[0];
    assert_approx(ik.mix, 0.5);
    assert_approx(ik.softness, 5.0);
    assert_eq!(ik.bend_direction, 1);
    assert!(!ik.compress);

    animation.apply(&mut skeleton, 1.0, 1.0, false, None, 1.0, MixBlend::Setup, MixDirection::In);
    let ik = &skeleton.ik_constraints[0];
    assert_eq!(ik.bend_direction, -1);
    assert!(ik.compress);
}

#[test]
fn ik_flags_return_to_setup_when_mixed_out() {
    let mut skeleton = constrained_skeleton();
    let animation = ik_animation();
    animation.apply(&mut skeleton, 1.0, 1.0, false, None, 1.0, MixBlend::Setup, MixDirection::In);

    animation.apply(&mut skeleton, 1.0, 1.0, false, None, 0.5, MixBlend::Setup, MixDirection::Out);
    let ik = &skeleton.ik_constraints[0];
    assert_eq!(ik.bend_direction, 1);
    assert!(!ik.compress);
    assert_approx(ik.mix, 1.0);
    assert_approx(ik.softness, 5.0);
}

#[test]
fn additive_constraint_mix_replaces_instead() {
    let mut skeleton = constrained_skeleton();
    let animation = Animation::new(
        "transform",
        1.0,
        vec![Timeline::TransformConstraint(TransformConstraintTimeline {
            constraint_index: 0,
            frames: vec![TransformFrame {
                time: 0.0,
                mix_rotate: 0.0,
                mix_x: 0.5,
                mix_y: 0.5,
                mix_scale_x: 0.0,
                mix_scale_y: 0.0,
                mix_shear_y: 0.0,
                curve: [Curve::Linear; 6],
            }],
        })],
    )
    .unwrap();

    animation.apply(&mut skeleton, 0.0, 0.0, false, None, 0.5, MixBlend::Add, MixDirection::In);
    let transform = &skeleton.transform_constraints[0];
    assert_approx(transform.mix_rotate, 0.5);
    assert_approx(transform.mix_x, 0.75);
    assert_approx(transform.mix_shear_y, 0.5);
}

#[test]
fn path_position_moves_toward_setup_before_the_first_key() {
    let mut skeleton = constrained_skeleton();
    skeleton.path_constraints[0].position = 10.0;
    let animation = Animation::new(
        "path",
        1.0,
        vec![Timeline::PathConstraint(PathConstraintTimeline::Position(
            PathConstraintPositionTimeline {
                constraint_index: 0,
                frames: vec![FloatFrame {
                    time: 0.5,
                    value: 40.0,
                    curve: Curve::Linear,
                }],
            },
        ))],
    )
    .unwrap();

    animation.apply(&mut skeleton, 0.0, 0.0, false, None, 0.5, MixBlend::First, MixDirection::In);
    assert_approx(skeleton.path_constraints[0].position, 5.0);

    animation.apply(&mut skeleton, 0.0, 0.0, false, None, 0.5, MixBlend::Replace, MixDirection::In);
    assert_approx(skeleton.path_constraints[0].position, 5.0);

    animation.apply(&mut skeleton, 1.0, 1.0, false, None, 1.0, MixBlend::Replace, MixDirection::In);
    assert_approx(skeleton.path_constraints[0].position, 40.0);
}

#[test]
fn two_color_timeline_tints_light_and_dark() {
    let mut skeleton = constrained_skeleton();
    let frame = |time: f32, value: f32| Rgba2Frame {
        time,
        light: [value, value, value, 1.0],
        dark: [value, 0.0, 0.0],
        curve: [Curve::Linear; 7],
    };
    let animation = Animation::new(
        "tint",
        1.0,
        vec![Timeline::Rgba2(Rgba2Timeline {
            slot_index: 0,
            frames: vec![frame(0.0, 0.0), frame(1.0, 1.0)],
        })],
    )
    .unwrap();

    animation.apply(&mut skeleton, 0.25, 0.25, false, None, 1.0, MixBlend::Setup, MixDirection::In);
    let slot = &skeleton.slots[0];
    assert_approx(slot.color[0], 0.25);
    assert_approx(slot.color[3], 1.0);
    assert_approx(slot.dark_color[0], 0.25);

    animation.apply(&mut skeleton, 0.0, 0.0, false, None, 0.5, MixBlend::Setup, MixDirection::In);
    let slot = &skeleton.slots[0];
    assert_approx(slot.color[0], 0.5);
    assert_approx(slot.dark_color[0], 0.0);
}

use pretty_assertions::assert_eq;
use std::sync::Arc;

use crate::test_support::{assert_approx, skeleton_data};
use crate::{
    AlphaFrame, AlphaTimeline, Animation, BoneData, BoneTimeline, Curve, DrawOrderFrame,
    DrawOrderTimeline, Error, Event, EventData, EventTimeline, FloatFrame, MixBlend,
    MixDirection, Property, RotateFrame, RotateTimeline, ScaleXTimeline, Skeleton, SkeletonData,
    SlotData, Timeline, TranslateTimeline, TranslateXTimeline, Vec2Frame,
};

fn single_bone(configure: impl FnOnce(&mut BoneData)) -> Arc<SkeletonData> {
    let mut root = BoneData::new("root", None);
    configure(&mut root);
    Arc::new(SkeletonData::new(vec![root], Vec::new()).unwrap())
}

fn animation(timeline: Timeline) -> Animation {
    Animation::new("test", 1.0, vec![timeline]).unwrap()
}

fn translate_x(frames: &[(f32, f32)], curve: Curve) -> Timeline {
    Timeline::Bone(BoneTimeline::TranslateX(TranslateXTimeline {
        bone_index: 0,
        frames: frames
            .iter()
            .map(|&(time, value)| FloatFrame { time, value, curve })
            .collect(),
    }))
}

fn pose(animation: &Animation, skeleton: &mut Skeleton, time: f32, alpha: f32, blend: MixBlend) {
    animation.apply(skeleton, time, time, false, None, alpha, blend, MixDirection::In);
}

#[test]
fn translate_interpolates_linearly_from_setup() {
    let data = single_bone(|b| {
        b.x = 2.0;
        b.y = 3.0;
    });
    let mut skeleton = Skeleton::new(data);
    let anim = animation(Timeline::Bone(BoneTimeline::Translate(TranslateTimeline {
        bone_index: 0,
        frames: vec![
            Vec2Frame {
                time: 0.0,
                x: 0.0,
                y: 0.0,
                curve: [Curve::Linear; 2],
            },
            Vec2Frame {
                time: 1.0,
                x: 10.0,
                y: 20.0,
                curve: [Curve::Linear; 2],
            },
        ],
    })));

    pose(&anim, &mut skeleton, 0.5, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[0].x, 7.0);
    assert_approx(skeleton.bones[0].y, 13.0);

    pose(&anim, &mut skeleton, 0.5, 0.5, MixBlend::Setup);
    assert_approx(skeleton.bones[0].x, 4.5);
    assert_approx(skeleton.bones[0].y, 8.0);
}

#[test]
fn rotation_takes_the_shorter_arc_between_keys() {
    let mut skeleton = Skeleton::new(single_bone(|_| {}));
    let anim = animation(Timeline::Bone(BoneTimeline::Rotate(RotateTimeline {
        bone_index: 0,
        frames: vec![
            RotateFrame {
                time: 0.0,
                angle: 350.0,
                curve: Curve::Linear,
            },
            RotateFrame {
                time: 1.0,
                angle: 10.0,
                curve: Curve::Linear,
            },
        ],
    })));

    pose(&anim, &mut skeleton, 0.25, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[0].rotation, 355.0);
    pose(&anim, &mut skeleton, 0.75, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[0].rotation, 365.0);
}

#[test]
fn values_before_the_first_key_depend_on_blend() {
    let mut skeleton = Skeleton::new(single_bone(|b| b.x = 2.0));
    let anim = animation(translate_x(&[(0.5, 10.0), (1.0, 20.0)], Curve::Linear));

    skeleton.bones[0].x = 50.0;
    pose(&anim, &mut skeleton, 0.25, 1.0, MixBlend::Replace);
    assert_approx(skeleton.bones[0].x, 50.0);

    pose(&anim, &mut skeleton, 0.25, 0.5, MixBlend::First);
    assert_approx(skeleton.bones[0].x, 26.0);

    pose(&anim, &mut skeleton, 0.25, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[0].x, 2.0);
}

#[test]
fn last_key_holds_past_the_end() {
    let mut skeleton = Skeleton::new(single_bone(|b| b.x = 2.0));
    let anim = animation(translate_x(&[(0.0, 0.0), (1.0, 20.0)], Curve::Linear));

    pose(&anim, &mut skeleton, 5.0, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[0].x, 22.0);
}

#[test]
fn add_blend_accumulates_onto_the_current_pose() {
    let mut skeleton = Skeleton::new(single_bone(|_| {}));
    let anim = animation(translate_x(&[(0.0, 10.0)], Curve::Linear));

    skeleton.bones[0].x = 5.0;
    pose(&anim, &mut skeleton, 0.0, 0.5, MixBlend::Add);
    assert_approx(skeleton.bones[0].x, 10.0);
    pose(&anim, &mut skeleton, 0.0, 0.5, MixBlend::Add);
    assert_approx(skeleton.bones[0].x, 15.0);
}

#[test]
fn stepped_curve_holds_until_the_next_key() {
    let mut skeleton = Skeleton::new(single_bone(|_| {}));
    let anim = animation(translate_x(&[(0.0, 0.0), (1.0, 10.0)], Curve::Stepped));

    pose(&anim, &mut skeleton, 0.99, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[0].x, 0.0);
    pose(&anim, &mut skeleton, 1.0, 1.0, MixBlend::Setup);
    assert_approx(skeleton.bones[0].x, 10.0);
}

#[test]
fn bezier_curve_spans_zero_to_one_and_is_monotonic() {
    let curve = Curve::bezier(0.25, 0.1, 0.25, 1.0);
    assert_approx(curve.percent(0.0), 0.0);
    assert_approx(curve.percent(1.0), 1.0);

    let mut previous = 0.0;
    for step in 0..=20 {
        let value = curve.percent(step as f32 / 20.0);
        assert!(value >= previous - 1.0e-6, "step {step}: {value} < {previous}");
        previous = value;
    }

    let linear = Curve::bezier(1.0 / 3.0, 1.0 / 3.0, 2.0 / 3.0, 2.0 / 3.0);
    assert_approx(linear.percent(0.5), 0.5);
}

#[test]
fn mixing_out_a_flipped_scale_keeps_the_setup_sign() {
    let mut skeleton = Skeleton::new(single_bone(|b| b.scale_x = 2.0));
    let anim = animation(Timeline::Bone(BoneTimeline::ScaleX(ScaleXTimeline {
        bone_index: 0,
        frames: vec![FloatFrame {
            time: 0.0,
            value: -1.0,
            curve: Curve::Linear,
        }],
    })));

    anim.apply(&mut skeleton, 0.0, 0.0, false, None, 0.5, MixBlend::Setup, MixDirection::Out);
    assert_approx(skeleton.bones[0].scale_x, 2.0);

    anim.apply(&mut skeleton, 0.0, 0.0, false, None, 0.5, MixBlend::Setup, MixDirection::In);
    assert_approx(skeleton.bones[0].scale_x, -2.0);
}

#[test]
fn alpha_timeline_mixes_slot_alpha_from_setup() {
    let bones = vec![BoneData::new("root", None)];
    let data = Arc::new(SkeletonData::new(bones, vec![SlotData::new("slot", 0)]).unwrap());
    let mut skeleton = Skeleton::new(data);
    let anim = animation(Timeline::Alpha(AlphaTimeline {
        slot_index: 0,
        frames: vec![AlphaFrame {
            time: 0.0,
            alpha: 0.0,
            curve: Curve::Linear,
        }],
    }));

    pose(&anim, &mut skeleton, 0.0, 0.5, MixBlend::Setup);
    assert_approx(skeleton.slots[0].color[3], 0.5);
    assert_approx(skeleton.slots[0].color[0], 1.0);
}

fn event_animation() -> Animation {
    let data = EventData::new("hit");
    let events = [0.0, 0.5, 1.0]
        .into_iter()
        .map(|time| Event::new(time, &data))
        .collect();
    Animation::new("events", 1.0, vec![Timeline::Event(EventTimeline { events })]).unwrap()
}

fn fired(animation: &Animation, last_time: f32, time: f32, looped: bool) -> Vec<f32> {
    let mut skeleton = Skeleton::new(single_bone(|_| {}));
    let mut events = Vec::new();
    animation.apply(
        &mut skeleton,
        last_time,
        time,
        looped,
        Some(&mut events),
        1.0,
        MixBlend::Setup,
        MixDirection::In,
    );
    events.iter().map(|e| e.time).collect()
}

#[test]
fn events_fire_in_the_half_open_interval() {
    let anim = event_animation();
    assert_eq!(fired(&anim, -1.0, 0.0, false), vec![0.0]);
    assert_eq!(fired(&anim, 0.0, 0.5, false), vec![0.5]);
    assert_eq!(fired(&anim, 0.5, 0.75, false), Vec::<f32>::new());
    assert_eq!(fired(&anim, 0.75, 2.0, false), vec![1.0]);
    assert_eq!(fired(&anim, 1.0, 3.0, false), Vec::<f32>::new());
}

#[test]
fn events_wrap_when_a_loop_restarts() {
    let anim = event_animation();
    assert_eq!(fired(&anim, 0.8, 1.2, true), vec![1.0, 0.0]);
}

#[test]
fn attachment_timeline_restores_setup_when_mixed_out() {
    let data = Arc::new(skeleton_data());
    let mut skeleton = Skeleton::new(Arc::clone(&data));
    let (_, swap) = data.animation("swap").unwrap();

    swap.apply(&mut skeleton, -1.0, 0.0, false, None, 1.0, MixBlend::Setup, MixDirection::In);
    assert_eq!(skeleton.slots[0].attachment_name(), Some("b"));

    swap.apply(&mut skeleton, 0.0, 0.0, false, None, 1.0, MixBlend::Setup, MixDirection::Out);
    assert_eq!(skeleton.slots[0].attachment_name(), Some("a"));
}

#[test]
fn draw_order_timeline_reorders_and_restores() {
    let bones = vec![BoneData::new("root", None)];
    let slots = vec![SlotData::new("back", 0), SlotData::new("front", 0)];
    let data = Arc::new(SkeletonData::new(bones, slots).unwrap());
    let mut skeleton = Skeleton::new(data);
    let anim = animation(Timeline::DrawOrder(DrawOrderTimeline {
        frames: vec![
            DrawOrderFrame {
                time: 0.0,
                draw_order_to_setup_index: Some(vec![1, 0]),
            },
            DrawOrderFrame {
                time: 0.5,
                draw_order_to_setup_index: None,
            },
        ],
    }));

    pose(&anim, &mut skeleton, 0.25, 1.0, MixBlend::Setup);
    assert_eq!(skeleton.draw_order, vec![1, 0]);
    pose(&anim, &mut skeleton, 0.75, 1.0, MixBlend::Setup);
    assert_eq!(skeleton.draw_order, vec![0, 1]);

    pose(&anim, &mut skeleton, 0.25, 1.0, MixBlend::Setup);
    anim.apply(&mut skeleton, 0.25, 0.25, false, None, 1.0, MixBlend::Setup, MixDirection::Out);
    assert_eq!(skeleton.draw_order, vec![0, 1]);
}

#[test]
fn animation_construction_is_validated() {
    let frames = |times: &[f32]| {
        translate_x(
            &times.iter().map(|&t| (t, 0.0)).collect::<Vec<_>>(),
            Curve::Linear,
        )
    };

    assert!(matches!(
        Animation::new("", 1.0, Vec::new()),
        Err(Error::InvalidValue { .. })
    ));
    assert!(matches!(
        Animation::new("a", -1.0, Vec::new()),
        Err(Error::InvalidValue { .. })
    ));
    assert!(matches!(
        Animation::new("a", f32::INFINITY, Vec::new()),
        Err(Error::InvalidValue { .. })
    ));
    assert!(matches!(
        Animation::new("a", 1.0, vec![frames(&[0.5, 0.5])]),
        Err(Error::InvalidValue { .. })
    ));
    assert!(matches!(
        Animation::new("a", 1.0, vec![frames(&[])]),
        Err(Error::InvalidValue { .. })
    ));
    assert!(Animation::new("a", 1.0, vec![frames(&[0.0, 0.5, 1.0])]).is_ok());
}

#[test]
fn events_may_share_a_key_time() {
    let data = EventData::new("hit");
    let events = vec![Event::new(0.5, &data), Event::new(0.5, &data)];
    let anim =
        Animation::new("events", 1.0, vec![Timeline::Event(EventTimeline { events })]).unwrap();
    assert_eq!(fired(&anim, 0.0, 1.0, false), vec![0.5, 0.5]);
}

#[test]
fn property_ids_cover_every_keyed_channel() {
    let anim = Animation::new(
        "a",
        1.0,
        vec![
            translate_x(&[(0.0, 0.0)], Curve::Linear),
            Timeline::Event(EventTimeline { events: Vec::new() }),
        ],
    );
    // An event timeline with no keys is rejected like any other empty timeline.
    assert!(anim.is_err());

    let anim = animation(translate_x(&[(0.0, 0.0)], Curve::Linear));
    assert!(anim.has_property(&Property::X(0)));
    assert!(!anim.has_property(&Property::Y(0)));
    assert!(!anim.has_property(&Property::X(1)));
    assert!(Animation::empty().timelines().is_empty());
}

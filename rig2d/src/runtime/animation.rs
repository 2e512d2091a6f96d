use std::sync::Arc;

use crate::{
    AlphaFrame, Animation, AttachmentTimeline, BoneTimeline, ColorFrame, Curve, DeformFrame,
    DeformTimeline, DrawOrderFrame, DrawOrderTimeline, Event, EventTimeline, FloatFrame, IkFrame,
    IkConstraintTimeline, PathConstraintTimeline, PathMixFrame, Rgb2Frame, RgbFrame, Rgba2Frame,
    RotateFrame, RotateTimeline, Skeleton, Timeline, TransformConstraintTimeline, TransformFrame,
    Vec2Frame,
};

/// How a timeline value combines with the current pose.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MixBlend {
    /// Blend from the setup pose, replacing the current value.
    Setup,
    /// Like `Setup` for the lowest track: before the first key, moves toward setup.
    First,
    Replace,
    Add,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MixDirection {
    In,
    Out,
}

pub(crate) const ANIMATION_STATE_CURRENT: i32 = 2;
pub(crate) const ANIMATION_STATE_SETUP: i32 = 1;

impl Animation {
    /// Poses `skeleton` at `time`. Event keys crossed since `last_time` are appended to
    /// `events` when provided.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &self,
        skeleton: &mut Skeleton,
        mut last_time: f32,
        mut time: f32,
        looped: bool,
        mut events: Option<&mut Vec<Event>>,
        alpha: f32,
        blend: MixBlend,
        direction: MixDirection,
    ) {
        if looped && self.duration != 0.0 {
            time %= self.duration;
            if last_time > 0.0 {
                last_time %= self.duration;
            }
        }
        for timeline in self.timelines() {
            timeline.apply(
                skeleton,
                last_time,
                time,
                events.as_deref_mut(),
                alpha,
                blend,
                direction,
            );
        }
    }
}

impl Timeline {
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &self,
        skeleton: &mut Skeleton,
        last_time: f32,
        time: f32,
        events: Option<&mut Vec<Event>>,
        alpha: f32,
        blend: MixBlend,
        direction: MixDirection,
    ) {
        match self {
            Timeline::Bone(t) => apply_bone_timeline(t, skeleton, time, alpha, blend, direction),
            Timeline::Attachment(t) => apply_attachment(t, skeleton, time, blend, direction),
            Timeline::Color(t) => {
                apply_slot_color(skeleton, t.slot_index, sample_color(&t.frames, time), alpha, blend)
            }
            Timeline::Rgb(t) => {
                apply_slot_rgb(skeleton, t.slot_index, sample_rgb(&t.frames, time), alpha, blend)
            }
            Timeline::Alpha(t) => {
                apply_slot_alpha(skeleton, t.slot_index, sample_alpha(&t.frames, time), alpha, blend)
            }
            Timeline::Rgba2(t) => {
                let sampled = sample_rgba2(&t.frames, time);
                apply_slot_rgba2(skeleton, t.slot_index, sampled, alpha, blend);
            }
            Timeline::Rgb2(t) => {
                let sampled = sample_rgb2(&t.frames, time);
                apply_slot_rgb2(skeleton, t.slot_index, sampled, alpha, blend);
            }
            Timeline::Deform(t) => apply_deform(t, skeleton, time, alpha, blend),
            Timeline::DrawOrder(t) => apply_draw_order(t, skeleton, time, blend, direction),
            Timeline::Event(t) => {
                if let Some(events) = events {
                    fire_events(t, last_time, time, events);
                }
            }
            Timeline::IkConstraint(t) => {
                apply_ik_constraint_timeline(t, skeleton, time, alpha, blend, direction)
            }
            Timeline::TransformConstraint(t) => {
                apply_transform_constraint_timeline(t, skeleton, time, alpha, blend)
            }
            Timeline::PathConstraint(t) => {
                apply_path_constraint_timeline(t, skeleton, time, alpha, blend)
            }
        }
    }
}

trait Keyframe {
    fn time(&self) -> f32;
}

macro_rules! keyframes {
    ($($frame:ty),* $(,)?) => {
        $(impl Keyframe for $frame {
            fn time(&self) -> f32 {
                self.time
            }
        })*
    };
}

keyframes!(
    RotateFrame,
    Vec2Frame,
    FloatFrame,
    ColorFrame,
    RgbFrame,
    AlphaFrame,
    Rgba2Frame,
    Rgb2Frame,
    DeformFrame,
    DrawOrderFrame,
    IkFrame,
    TransformFrame,
    PathMixFrame,
    Event,
);

/// Position of a time within a keyframe array.
enum Span {
    /// Hold the value of this frame.
    Hold(usize),
    /// Interpolate from this frame to the next one at normalized time `t`.
    Between(usize, f32),
}

/// Returns `None` before the first frame.
fn locate<F: Keyframe>(frames: &[F], time: f32) -> Option<Span> {
    let first = frames.first()?;
    if time < first.time() {
        return None;
    }
    let index = frames.partition_point(|f| f.time() <= time);
    if index >= frames.len() {
        return Some(Span::Hold(frames.len() - 1));
    }
    let prev = &frames[index - 1];
    let next = &frames[index];
    let denom = next.time() - prev.time();
    if denom.abs() <= 1.0e-12 {
        return Some(Span::Hold(index));
    }
    Some(Span::Between(index - 1, (time - prev.time()) / denom))
}

/// Index of the last frame at or before `time`.
fn frame_at<F: Keyframe>(frames: &[F], time: f32) -> usize {
    frames.partition_point(|f| f.time() <= time).saturating_sub(1)
}

fn curve_mix(curve: &Curve, t: f32, from: f32, to: f32) -> f32 {
    from + (to - from) * curve.percent(t)
}

fn sample_float(frames: &[FloatFrame], time: f32) -> Option<f32> {
    Some(match locate(frames, time)? {
        Span::Hold(i) => frames[i].value,
        Span::Between(i, t) => curve_mix(&frames[i].curve, t, frames[i].value, frames[i + 1].value),
    })
}

/// Keys are degrees; consecutive keys interpolate along the shorter arc.
fn sample_rotate(frames: &[RotateFrame], time: f32) -> Option<f32> {
    Some(match locate(frames, time)? {
        Span::Hold(i) => frames[i].angle,
        Span::Between(i, t) => {
            let prev = &frames[i];
            let delta = normalize_degrees(frames[i + 1].angle - prev.angle);
            prev.angle + delta * prev.curve.percent(t)
        }
    })
}

/// Wraps an angle delta into (-180, 180].
fn normalize_degrees(delta: f32) -> f32 {
    let delta = delta % 360.0;
    if delta > 180.0 {
        delta - 360.0
    } else if delta <= -180.0 {
        delta + 360.0
    } else {
        delta
    }
}

fn sample_vec2(frames: &[Vec2Frame], time: f32) -> Option<(f32, f32)> {
    Some(match locate(frames, time)? {
        Span::Hold(i) => (frames[i].x, frames[i].y),
        Span::Between(i, t) => {
            let (prev, next) = (&frames[i], &frames[i + 1]);
            (
                curve_mix(&prev.curve[0], t, prev.x, next.x),
                curve_mix(&prev.curve[1], t, prev.y, next.y),
            )
        }
    })
}

fn sample_channels<const N: usize>(
    curves: &[Curve],
    t: f32,
    from: &[f32],
    to: &[f32],
) -> [f32; N] {
    let mut out = [0.0f32; N];
    for (i, out) in out.iter_mut().enumerate() {
        *out = curve_mix(&curves[i], t, from[i], to[i]);
    }
    out
}

fn sample_color(frames: &[ColorFrame], time: f32) -> Option<[f32; 4]> {
    Some(match locate(frames, time)? {
        Span::Hold(i) => frames[i].color,
        Span::Between(i, t) => {
            sample_channels(&frames[i].curve, t, &frames[i].color, &frames[i + 1].color)
        }
    })
}

fn sample_rgb(frames: &[RgbFrame], time: f32) -> Option<[f32; 3]> {
    Some(match locate(frames, time)? {
        Span::Hold(i) => frames[i].color,
        Span::Between(i, t) => {
            sample_channels(&frames[i].curve, t, &frames[i].color, &frames[i + 1].color)
        }
    })
}

fn sample_alpha(frames: &[AlphaFrame], time: f32) -> Option<f32> {
    Some(match locate(frames, time)? {
        Span::Hold(i) => frames[i].alpha,
        Span::Between(i, t) => curve_mix(&frames[i].curve, t, frames[i].alpha, frames[i + 1].alpha),
    })
}

fn sample_rgba2(frames: &[Rgba2Frame], time: f32) -> Option<([f32; 4], [f32; 3])> {
    Some(match locate(frames, time)? {
        Span::Hold(i) => (frames[i].light, frames[i].dark),
        Span::Between(i, t) => {
            let (prev, next) = (&frames[i], &frames[i + 1]);
            (
                sample_channels(&prev.curve[..4], t, &prev.light, &next.light),
                sample_channels(&prev.curve[4..], t, &prev.dark, &next.dark),
            )
        }
    })
}

fn sample_rgb2(frames: &[Rgb2Frame], time: f32) -> Option<([f32; 3], [f32; 3])> {
    Some(match locate(frames, time)? {
        Span::Hold(i) => (frames[i].light, frames[i].dark),
        Span::Between(i, t) => {
            let (prev, next) = (&frames[i], &frames[i + 1]);
            (
                sample_channels(&prev.curve[..3], t, &prev.light, &next.light),
                sample_channels(&prev.curve[3..], t, &prev.dark, &next.dark),
            )
        }
    })
}

/// Mixes a bone value keyed relative to its setup value. `sampled` is `None` before the
/// first key.
fn mix_relative(current: &mut f32, setup: f32, sampled: Option<f32>, alpha: f32, blend: MixBlend) {
    let Some(value) = sampled else {
        match blend {
            MixBlend::Setup => *current = setup,
            MixBlend::First => *current += (setup - *current) * alpha,
            MixBlend::Replace | MixBlend::Add => {}
        }
        return;
    };
    match blend {
        MixBlend::Setup => *current = setup + value * alpha,
        MixBlend::First | MixBlend::Replace => *current += (value + setup - *current) * alpha,
        MixBlend::Add => *current += value * alpha,
    }
}

/// Mixes a scale keyed as a multiplier of setup. Mixing keeps the sign of the pose being
/// mixed toward so a flip does not pass through zero.
fn mix_scale(
    current: &mut f32,
    setup: f32,
    sampled: Option<f32>,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    let Some(mult) = sampled else {
        match blend {
            MixBlend::Setup => *current = setup,
            MixBlend::First => *current += (setup - *current) * alpha,
            MixBlend::Replace | MixBlend::Add => {}
        }
        return;
    };
    let value = setup * mult;

    if alpha >= 1.0 {
        match blend {
            MixBlend::Add => *current += value - setup,
            _ => *current = value,
        }
        return;
    }

    match (direction, blend) {
        (_, MixBlend::Add) => *current += (value - setup) * alpha,
        (MixDirection::Out, MixBlend::Setup) => {
            *current = setup + (value.abs() * sign(setup) - setup) * alpha;
        }
        (MixDirection::Out, MixBlend::First | MixBlend::Replace) => {
            let base = *current;
            *current = base + (value.abs() * sign(base) - base) * alpha;
        }
        (MixDirection::In, MixBlend::Setup) => {
            let base = setup.abs() * sign(value);
            *current = base + (value - base) * alpha;
        }
        (MixDirection::In, MixBlend::First | MixBlend::Replace) => {
            let base = current.abs() * sign(value);
            *current = base + (value - base) * alpha;
        }
    }
}

/// Mixes a value keyed in absolute terms, such as a constraint mix.
fn mix_absolute(current: &mut f32, setup: f32, sampled: Option<f32>, alpha: f32, blend: MixBlend) {
    let Some(value) = sampled else {
        match blend {
            MixBlend::Setup => *current = setup,
            MixBlend::First => *current += (setup - *current) * alpha,
            MixBlend::Replace | MixBlend::Add => {}
        }
        return;
    };
    match blend {
        MixBlend::Setup => *current = setup + (value - setup) * alpha,
        MixBlend::First | MixBlend::Replace => *current += (value - *current) * alpha,
        MixBlend::Add => *current += value * alpha,
    }
}

fn non_additive(blend: MixBlend) -> MixBlend {
    if blend == MixBlend::Add {
        MixBlend::Replace
    } else {
        blend
    }
}

fn sign(value: f32) -> f32 {
    if value < 0.0 {
        -1.0
    } else if value > 0.0 {
        1.0
    } else {
        0.0
    }
}

fn bone_timeline_index(timeline: &BoneTimeline) -> usize {
    match timeline {
        BoneTimeline::Rotate(t) => t.bone_index,
        BoneTimeline::Translate(t) => t.bone_index,
        BoneTimeline::TranslateX(t) => t.bone_index,
        BoneTimeline::TranslateY(t) => t.bone_index,
        BoneTimeline::Scale(t) => t.bone_index,
        BoneTimeline::ScaleX(t) => t.bone_index,
        BoneTimeline::ScaleY(t) => t.bone_index,
        BoneTimeline::Shear(t) => t.bone_index,
        BoneTimeline::ShearX(t) => t.bone_index,
        BoneTimeline::ShearY(t) => t.bone_index,
    }
}

fn apply_bone_timeline(
    timeline: &BoneTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    let bone_index = bone_timeline_index(timeline);
    let data = Arc::clone(&skeleton.data);
    let Some(setup) = data.bones.get(bone_index) else {
        return;
    };
    let Some(bone) = skeleton.bones.get_mut(bone_index) else {
        return;
    };
    if !bone.active {
        return;
    }

    match timeline {
        BoneTimeline::Rotate(t) => {
            let value = sample_rotate(&t.frames, time);
            mix_relative(&mut bone.rotation, setup.rotation, value, alpha, blend);
        }
        BoneTimeline::Translate(t) => {
            let value = sample_vec2(&t.frames, time);
            mix_relative(&mut bone.x, setup.x, value.map(|v| v.0), alpha, blend);
            mix_relative(&mut bone.y, setup.y, value.map(|v| v.1), alpha, blend);
        }
        BoneTimeline::TranslateX(t) => {
            let value = sample_float(&t.frames, time);
            mix_relative(&mut bone.x, setup.x, value, alpha, blend);
        }
        BoneTimeline::TranslateY(t) => {
            let value = sample_float(&t.frames, time);
            mix_relative(&mut bone.y, setup.y, value, alpha, blend);
        }
        BoneTimeline::Scale(t) => {
            let value = sample_vec2(&t.frames, time);
            let x = value.map(|v| v.0);
            let y = value.map(|v| v.1);
            mix_scale(&mut bone.scale_x, setup.scale_x, x, alpha, blend, direction);
            mix_scale(&mut bone.scale_y, setup.scale_y, y, alpha, blend, direction);
        }
        BoneTimeline::ScaleX(t) => {
            let value = sample_float(&t.frames, time);
            mix_scale(&mut bone.scale_x, setup.scale_x, value, alpha, blend, direction);
        }
        BoneTimeline::ScaleY(t) => {
            let value = sample_float(&t.frames, time);
            mix_scale(&mut bone.scale_y, setup.scale_y, value, alpha, blend, direction);
        }
        BoneTimeline::Shear(t) => {
            let value = sample_vec2(&t.frames, time);
            mix_relative(&mut bone.shear_x, setup.shear_x, value.map(|v| v.0), alpha, blend);
            mix_relative(&mut bone.shear_y, setup.shear_y, value.map(|v| v.1), alpha, blend);
        }
        BoneTimeline::ShearX(t) => {
            let value = sample_float(&t.frames, time);
            mix_relative(&mut bone.shear_x, setup.shear_x, value, alpha, blend);
        }
        BoneTimeline::ShearY(t) => {
            let value = sample_float(&t.frames, time);
            mix_relative(&mut bone.shear_y, setup.shear_y, value, alpha, blend);
        }
    }
}

/// Rotation for a mixing track entry. Remembers the direction chosen on earlier frames in
/// `state` so the bone does not flip when the shortest path crosses 180 degrees mid-mix.
#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_rotate_mixed(
    timeline: &RotateTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    state: &mut [f32],
    timeline_index: usize,
    first_frame: bool,
) {
    let data = Arc::clone(&skeleton.data);
    let Some(setup) = data.bones.get(timeline.bone_index).map(|b| b.rotation) else {
        return;
    };
    let Some(bone) = skeleton.bones.get_mut(timeline.bone_index) else {
        return;
    };
    if !bone.active {
        return;
    }
    let sampled = sample_rotate(&timeline.frames, time);

    let base = timeline_index * 2;
    if base + 1 >= state.len() {
        mix_relative(&mut bone.rotation, setup, sampled, alpha, blend);
        return;
    }
    if first_frame {
        state[base] = 0.0;
    }
    if alpha >= 1.0 {
        mix_relative(&mut bone.rotation, setup, sampled, 1.0, blend);
        return;
    }

    let (r1, r2) = match sampled {
        None => match blend {
            MixBlend::Setup => {
                bone.rotation = setup;
                return;
            }
            MixBlend::First => (bone.rotation, setup),
            MixBlend::Replace | MixBlend::Add => return,
        },
        Some(value) => {
            let r1 = if blend == MixBlend::Setup {
                setup
            } else {
                bone.rotation
            };
            (r1, setup + value)
        }
    };

    let mut total;
    let mut diff = r2 - r1;
    diff -= ((diff / 360.0 - 0.5).ceil()) * 360.0;

    if diff == 0.0 {
        total = state[base];
    } else {
        let (last_total, last_diff) = if first_frame {
            (0.0, diff)
        } else {
            (state[base], state[base + 1])
        };

        let loops = last_total - (last_total % 360.0);
        total = diff + loops;

        let current = diff >= 0.0;
        let mut dir = last_total >= 0.0;

        if last_diff.abs() <= 90.0 && sign(last_diff) != sign(diff) {
            if (last_total - loops).abs() > 180.0 {
                total += 360.0 * sign(last_total);
                dir = current;
            } else if loops != 0.0 {
                total -= 360.0 * sign(last_total);
            } else {
                dir = current;
            }
        }

        if dir != current {
            total += 360.0 * sign(last_total);
        }
    }

    state[base] = total;
    state[base + 1] = diff;

    bone.rotation = r1 + total * alpha;
}

/// Mixes `current` toward `sampled` for slot colors; `Add` behaves like `Replace`.
fn mix_color(current: &mut [f32], setup: &[f32], sampled: Option<&[f32]>, alpha: f32, blend: MixBlend) {
    match sampled {
        None => match blend {
            MixBlend::Setup => current.copy_from_slice(setup),
            MixBlend::First => {
                for (c, s) in current.iter_mut().zip(setup) {
                    *c += (s - *c) * alpha;
                }
            }
            MixBlend::Replace | MixBlend::Add => {}
        },
        Some(value) => {
            if alpha >= 1.0 {
                current.copy_from_slice(value);
            } else {
                if blend == MixBlend::Setup {
                    current.copy_from_slice(setup);
                }
                for (c, v) in current.iter_mut().zip(value) {
                    *c += (v - *c) * alpha;
                }
            }
        }
    }
    for c in current {
        *c = c.clamp(0.0, 1.0);
    }
}

fn slot_is_active(skeleton: &Skeleton, slot_index: usize) -> bool {
    skeleton
        .slots
        .get(slot_index)
        .and_then(|slot| skeleton.bones.get(slot.bone))
        .is_some_and(|bone| bone.active)
}

fn apply_slot_color(
    skeleton: &mut Skeleton,
    slot_index: usize,
    sampled: Option<[f32; 4]>,
    alpha: f32,
    blend: MixBlend,
) {
    if !slot_is_active(skeleton, slot_index) {
        return;
    }
    let data = Arc::clone(&skeleton.data);
    let (Some(slot), Some(setup)) = (skeleton.slots.get_mut(slot_index), data.slots.get(slot_index))
    else {
        return;
    };
    mix_color(&mut slot.color, &setup.color, sampled.as_ref().map(|c| &c[..]), alpha, blend);
}

fn apply_slot_rgb(
    skeleton: &mut Skeleton,
    slot_index: usize,
    sampled: Option<[f32; 3]>,
    alpha: f32,
    blend: MixBlend,
) {
    if !slot_is_active(skeleton, slot_index) {
        return;
    }
    let data = Arc::clone(&skeleton.data);
    let (Some(slot), Some(setup)) = (skeleton.slots.get_mut(slot_index), data.slots.get(slot_index))
    else {
        return;
    };
    mix_color(
        &mut slot.color[..3],
        &setup.color[..3],
        sampled.as_ref().map(|c| &c[..]),
        alpha,
        blend,
    );
}

fn apply_slot_alpha(
    skeleton: &mut Skeleton,
    slot_index: usize,
    sampled: Option<f32>,
    alpha: f32,
    blend: MixBlend,
) {
    if !slot_is_active(skeleton, slot_index) {
        return;
    }
    let data = Arc::clone(&skeleton.data);
    let (Some(slot), Some(setup)) = (skeleton.slots.get_mut(slot_index), data.slots.get(slot_index))
    else {
        return;
    };
    let sampled = sampled.map(|a| [a]);
    mix_color(
        &mut slot.color[3..],
        &setup.color[3..],
        sampled.as_ref().map(|a| &a[..]),
        alpha,
        blend,
    );
}

fn apply_slot_rgba2(
    skeleton: &mut Skeleton,
    slot_index: usize,
    sampled: Option<([f32; 4], [f32; 3])>,
    alpha: f32,
    blend: MixBlend,
) {
    if !slot_is_active(skeleton, slot_index) {
        return;
    }
    let data = Arc::clone(&skeleton.data);
    let (Some(slot), Some(setup)) = (skeleton.slots.get_mut(slot_index), data.slots.get(slot_index))
    else {
        return;
    };
    let (light, dark) = match sampled.as_ref() {
        Some((light, dark)) => (Some(&light[..]), Some(&dark[..])),
        None => (None, None),
    };
    mix_color(&mut slot.color, &setup.color, light, alpha, blend);
    mix_color(&mut slot.dark_color, &setup.dark_color, dark, alpha, blend);
}

fn apply_slot_rgb2(
    skeleton: &mut Skeleton,
    slot_index: usize,
    sampled: Option<([f32; 3], [f32; 3])>,
    alpha: f32,
    blend: MixBlend,
) {
    if !slot_is_active(skeleton, slot_index) {
        return;
    }
    let data = Arc::clone(&skeleton.data);
    let (Some(slot), Some(setup)) = (skeleton.slots.get_mut(slot_index), data.slots.get(slot_index))
    else {
        return;
    };
    let (light, dark) = match sampled.as_ref() {
        Some((light, dark)) => (Some(&light[..]), Some(&dark[..])),
        None => (None, None),
    };
    mix_color(&mut slot.color[..3], &setup.color[..3], light, alpha, blend);
    mix_color(&mut slot.dark_color, &setup.dark_color, dark, alpha, blend);
}

fn apply_attachment(
    timeline: &AttachmentTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    if !slot_is_active(skeleton, timeline.slot_index) {
        return;
    }
    let data = Arc::clone(&skeleton.data);
    let setup = data
        .slots
        .get(timeline.slot_index)
        .and_then(|s| s.attachment.as_deref());

    if direction == MixDirection::Out {
        if blend == MixBlend::Setup {
            skeleton.assign_attachment(timeline.slot_index, setup);
        }
        return;
    }
    let Some(first) = timeline.frames.first() else {
        return;
    };
    if time < first.time {
        if matches!(blend, MixBlend::Setup | MixBlend::First) {
            skeleton.assign_attachment(timeline.slot_index, setup);
        }
        return;
    }
    let index = timeline.frames.partition_point(|f| f.time <= time) - 1;
    skeleton.assign_attachment(timeline.slot_index, timeline.frames[index].name.as_deref());
}

/// Attachment keys as applied by a track entry. The attachment is always set; the slot is
/// only claimed for this frame when `attachments` is true, otherwise it reverts to setup
/// once every track has been applied.
pub(crate) fn apply_attachment_mixing(
    timeline: &AttachmentTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    blend: MixBlend,
    attachments: bool,
    unkeyed_state: i32,
) {
    if !slot_is_active(skeleton, timeline.slot_index) {
        return;
    }
    let Some(first) = timeline.frames.first() else {
        return;
    };

    if time < first.time {
        if matches!(blend, MixBlend::Setup | MixBlend::First) {
            let data = Arc::clone(&skeleton.data);
            let setup = data
                .slots
                .get(timeline.slot_index)
                .and_then(|s| s.attachment.as_deref());
            set_attachment(skeleton, timeline.slot_index, setup, attachments, unkeyed_state);
        }
    } else {
        let index = timeline.frames.partition_point(|f| f.time <= time) - 1;
        let name = timeline.frames[index].name.as_deref();
        set_attachment(skeleton, timeline.slot_index, name, attachments, unkeyed_state);
    }

    if let Some(slot) = skeleton.slots.get_mut(timeline.slot_index) {
        if slot.attachment_state <= unkeyed_state {
            slot.attachment_state = unkeyed_state + ANIMATION_STATE_SETUP;
        }
    }
}

fn set_attachment(
    skeleton: &mut Skeleton,
    slot_index: usize,
    name: Option<&str>,
    attachments: bool,
    unkeyed_state: i32,
) {
    skeleton.assign_attachment(slot_index, name);
    if attachments {
        if let Some(slot) = skeleton.slots.get_mut(slot_index) {
            slot.attachment_state = unkeyed_state + ANIMATION_STATE_CURRENT;
        }
    }
}

fn setup_draw_order(skeleton: &mut Skeleton) {
    skeleton.draw_order.clear();
    skeleton.draw_order.extend(0..skeleton.slots.len());
}

fn apply_draw_order(
    timeline: &DrawOrderTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    if direction == MixDirection::Out {
        if blend == MixBlend::Setup {
            setup_draw_order(skeleton);
        }
        return;
    }

    let Some(first) = timeline.frames.first() else {
        return;
    };
    if time < first.time {
        if matches!(blend, MixBlend::Setup | MixBlend::First) {
            setup_draw_order(skeleton);
        }
        return;
    }

    let frame = &timeline.frames[frame_at(&timeline.frames, time)];
    match frame.draw_order_to_setup_index.as_ref() {
        Some(order) if order.len() == skeleton.slots.len() => {
            skeleton.draw_order.clone_from(order);
        }
        Some(_) => {}
        None => setup_draw_order(skeleton),
    }
}

/// Fires events keyed in `(last_time, time]`. When `last_time > time` the animation
/// looped, so events after `last_time` fire first.
pub(crate) fn fire_events(
    timeline: &EventTimeline,
    last_time: f32,
    time: f32,
    out: &mut Vec<Event>,
) {
    let frames = &timeline.events;
    let Some(last) = frames.last() else {
        return;
    };

    let mut last_time = last_time;
    if last_time > time {
        fire_events(timeline, last_time, f32::MAX, out);
        last_time = -1.0;
    } else if last_time >= last.time {
        return;
    }
    if time < frames[0].time {
        return;
    }

    let start = if last_time < frames[0].time {
        0
    } else {
        frames.partition_point(|e| e.time <= last_time)
    };
    out.extend(
        frames[start..]
            .iter()
            .take_while(|e| e.time <= time)
            .cloned(),
    );
}

fn apply_deform(
    timeline: &DeformTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    if !slot_is_active(skeleton, timeline.slot_index) {
        return;
    }
    let targets_slot = skeleton
        .deform_target(timeline.slot_index)
        .is_some_and(|(skin, attachment)| {
            skin == timeline.skin.as_str() && attachment == timeline.attachment.as_str()
        });
    if !targets_slot || timeline.vertex_count == 0 {
        return;
    }
    let Some(slot) = skeleton.slots.get_mut(timeline.slot_index) else {
        return;
    };
    let Some(first) = timeline.frames.first() else {
        return;
    };

    let mut blend = blend;
    if slot.deform.is_empty() {
        blend = MixBlend::Setup;
    }

    if time < first.time {
        match blend {
            MixBlend::Setup => slot.deform.clear(),
            MixBlend::First => {
                if alpha >= 1.0 {
                    slot.deform.clear();
                    return;
                }
                ensure_len_with_zeros(&mut slot.deform, timeline.vertex_count);
                if let Some(setup) = timeline.setup_vertices.as_ref() {
                    for (d, s) in slot.deform.iter_mut().zip(setup) {
                        *d += (*s - *d) * alpha;
                    }
                } else {
                    let m = 1.0 - alpha;
                    for d in &mut slot.deform {
                        *d *= m;
                    }
                }
            }
            MixBlend::Replace | MixBlend::Add => {}
        }
        return;
    }

    ensure_len_with_zeros(&mut slot.deform, timeline.vertex_count);

    let frames = &timeline.frames;
    let mixed;
    let value: &[f32] = match locate(frames, time) {
        None => return,
        Some(Span::Hold(i)) => &frames[i].vertices,
        Some(Span::Between(i, t)) => {
            let (prev, next) = (&frames[i], &frames[i + 1]);
            let percent = prev.curve.percent(t);
            mixed = (0..timeline.vertex_count)
                .map(|v| {
                    let pv = prev.vertices.get(v).copied().unwrap_or(0.0);
                    let nv = next.vertices.get(v).copied().unwrap_or(pv);
                    pv + (nv - pv) * percent
                })
                .collect::<Vec<_>>();
            &mixed
        }
    };

    apply_deform_vertices(
        &mut slot.deform,
        timeline.setup_vertices.as_deref(),
        value,
        alpha,
        blend,
    );
}

fn ensure_len_with_zeros(buf: &mut Vec<f32>, len: usize) {
    if buf.len() != len {
        buf.clear();
        buf.resize(len, 0.0);
    }
}

fn apply_deform_vertices(
    deform: &mut [f32],
    setup: Option<&[f32]>,
    value: &[f32],
    alpha: f32,
    blend: MixBlend,
) {
    let value_at = |i: usize| value.get(i).copied().unwrap_or(0.0);
    let setup_at = |i: usize| setup.and_then(|s| s.get(i).copied()).unwrap_or(0.0);

    if alpha >= 1.0 {
        for (i, d) in deform.iter_mut().enumerate() {
            match blend {
                MixBlend::Add => *d += value_at(i) - setup_at(i),
                _ => *d = value_at(i),
            }
        }
        return;
    }

    for (i, d) in deform.iter_mut().enumerate() {
        match blend {
            MixBlend::Setup => match setup {
                Some(_) => *d = setup_at(i) + (value_at(i) - setup_at(i)) * alpha,
                None => *d = value_at(i) * alpha,
            },
            MixBlend::First | MixBlend::Replace => *d += (value_at(i) - *d) * alpha,
            MixBlend::Add => *d += (value_at(i) - setup_at(i)) * alpha,
        }
    }
}

fn apply_ik_constraint_timeline(
    timeline: &IkConstraintTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
    direction: MixDirection,
) {
    let data = Arc::clone(&skeleton.data);
    let Some(setup) = data.ik_constraints.get(timeline.constraint_index) else {
        return;
    };
    let Some(constraint) = skeleton.ik_constraints.get_mut(timeline.constraint_index) else {
        return;
    };
    if !constraint.active {
        return;
    }

    let frames = &timeline.frames;
    let sampled = locate(frames, time).map(|span| match span {
        Span::Hold(i) => (frames[i].mix, frames[i].softness),
        Span::Between(i, t) => {
            let (prev, next) = (&frames[i], &frames[i + 1]);
            (
                curve_mix(&prev.curve[0], t, prev.mix, next.mix),
                curve_mix(&prev.curve[1], t, prev.softness, next.softness),
            )
        }
    });

    // Constraint mixes have no additive form.
    let blend = non_additive(blend);
    let Some((mix, softness)) = sampled else {
        mix_absolute(&mut constraint.mix, setup.mix, None, alpha, blend);
        mix_absolute(&mut constraint.softness, setup.softness, None, alpha, blend);
        if matches!(blend, MixBlend::Setup | MixBlend::First) {
            constraint.bend_direction = setup.bend_direction;
            constraint.compress = setup.compress;
            constraint.stretch = setup.stretch;
        }
        return;
    };

    mix_absolute(&mut constraint.mix, setup.mix, Some(mix), alpha, blend);
    mix_absolute(&mut constraint.softness, setup.softness, Some(softness), alpha, blend);

    if direction == MixDirection::Out {
        if blend == MixBlend::Setup {
            constraint.bend_direction = setup.bend_direction;
            constraint.compress = setup.compress;
            constraint.stretch = setup.stretch;
        }
        return;
    }
    let frame = &frames[frame_at(frames, time)];
    constraint.bend_direction = frame.bend_direction;
    constraint.compress = frame.compress;
    constraint.stretch = frame.stretch;
}

fn apply_transform_constraint_timeline(
    timeline: &TransformConstraintTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let data = Arc::clone(&skeleton.data);
    let Some(setup) = data.transform_constraints.get(timeline.constraint_index) else {
        return;
    };
    let Some(constraint) = skeleton
        .transform_constraints
        .get_mut(timeline.constraint_index)
    else {
        return;
    };
    if !constraint.active {
        return;
    }

    let frames = &timeline.frames;
    let values = |f: &TransformFrame| {
        [
            f.mix_rotate,
            f.mix_x,
            f.mix_y,
            f.mix_scale_x,
            f.mix_scale_y,
            f.mix_shear_y,
        ]
    };
    let sampled: Option<[f32; 6]> = locate(frames, time).map(|span| match span {
        Span::Hold(i) => values(&frames[i]),
        Span::Between(i, t) => {
            sample_channels(&frames[i].curve, t, &values(&frames[i]), &values(&frames[i + 1]))
        }
    });

    let setup_values = [
        setup.mix_rotate,
        setup.mix_x,
        setup.mix_y,
        setup.mix_scale_x,
        setup.mix_scale_y,
        setup.mix_shear_y,
    ];
    let current = [
        &mut constraint.mix_rotate,
        &mut constraint.mix_x,
        &mut constraint.mix_y,
        &mut constraint.mix_scale_x,
        &mut constraint.mix_scale_y,
        &mut constraint.mix_shear_y,
    ];
    let blend = non_additive(blend);
    for (i, value) in current.into_iter().enumerate() {
        mix_absolute(value, setup_values[i], sampled.map(|s| s[i]), alpha, blend);
    }
}

fn apply_path_constraint_timeline(
    timeline: &PathConstraintTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    let constraint_index = match timeline {
        PathConstraintTimeline::Position(t) => t.constraint_index,
        PathConstraintTimeline::Spacing(t) => t.constraint_index,
        PathConstraintTimeline::Mix(t) => t.constraint_index,
    };
    let data = Arc::clone(&skeleton.data);
    let Some(setup) = data.path_constraints.get(constraint_index) else {
        return;
    };
    let Some(constraint) = skeleton.path_constraints.get_mut(constraint_index) else {
        return;
    };
    if !constraint.active {
        return;
    }

    match timeline {
        PathConstraintTimeline::Position(t) => {
            let value = sample_float(&t.frames, time);
            mix_absolute(&mut constraint.position, setup.position, value, alpha, blend);
        }
        PathConstraintTimeline::Spacing(t) => {
            let value = sample_float(&t.frames, time);
            mix_absolute(&mut constraint.spacing, setup.spacing, value, alpha, blend);
        }
        PathConstraintTimeline::Mix(t) => {
            let frames = &t.frames;
            let values = |f: &PathMixFrame| [f.mix_rotate, f.mix_x, f.mix_y];
            let sampled: Option<[f32; 3]> = locate(frames, time).map(|span| match span {
                Span::Hold(i) => values(&frames[i]),
                Span::Between(i, t) => sample_channels(
                    &frames[i].curve,
                    t,
                    &values(&frames[i]),
                    &values(&frames[i + 1]),
                ),
            });
            let blend = non_additive(blend);
            let setup_values = [setup.mix_rotate, setup.mix_x, setup.mix_y];
            let current = [
                &mut constraint.mix_rotate,
                &mut constraint.mix_x,
                &mut constraint.mix_y,
            ];
            for (i, value) in current.into_iter().enumerate() {
                mix_absolute(value, setup_values[i], sampled.map(|s| s[i]), alpha, blend);
            }
        }
    }
}

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::{
    Animation, AnimationState, AnimationStateData, AnimationStateEvent, AttachmentData,
    AttachmentFrame, AttachmentTimeline, BoneData, BoneTimeline, Curve, Event, EventData,
    EventTimeline, FloatFrame, RegionAttachmentData, RotateFrame, RotateTimeline, Skeleton,
    SkeletonData, SkinData, SlotData, Timeline, TrackEntrySnapshot, TranslateXTimeline,
};

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-4,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

pub(crate) fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

/// One delivered notification, with times rounded to milliseconds.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Row {
    pub kind: String,
    pub animation: String,
    pub track_time: f32,
    pub state_time: f32,
}

impl Row {
    pub(crate) fn new(kind: &str, animation: &str, track_time: f32, state_time: f32) -> Self {
        Self {
            kind: kind.to_string(),
            animation: animation.to_string(),
            track_time,
            state_time,
        }
    }

    fn from_event(entry: &TrackEntrySnapshot, event: &AnimationStateEvent) -> Self {
        let kind = match event {
            AnimationStateEvent::Start => "start".to_string(),
            AnimationStateEvent::Interrupt => "interrupt".to_string(),
            AnimationStateEvent::End => "end".to_string(),
            AnimationStateEvent::Dispose => "dispose".to_string(),
            AnimationStateEvent::Complete => "complete".to_string(),
            AnimationStateEvent::Event(event) => format!("event {}", event.string),
        };
        Self {
            kind,
            animation: entry.animation_name.clone(),
            track_time: round3(entry.track_time),
            state_time: round3(entry.state_time),
        }
    }
}

pub(crate) type Rows = Rc<RefCell<Vec<Row>>>;

/// Registers a state listener that records every notification.
pub(crate) fn record(state: &mut AnimationState) -> Rows {
    let rows: Rows = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&rows);
    state.add_listener(
        move |_: &mut AnimationState, entry: &TrackEntrySnapshot, event: &AnimationStateEvent| {
            sink.borrow_mut().push(Row::from_event(entry, event));
        },
    );
    rows
}

pub(crate) fn kinds(rows: &Rows) -> Vec<String> {
    rows.borrow().iter().map(|row| row.kind.clone()).collect()
}

fn event_timeline(event: &EventData) -> Timeline {
    let keys = [(0.0, "0"), (0.5, "14"), (1.0, "30")];
    Timeline::Event(EventTimeline {
        events: keys
            .iter()
            .map(|&(time, label)| {
                let mut key = Event::new(time, event);
                key.string = label.to_string();
                key
            })
            .collect(),
    })
}

/// Root plus one child bone with a single slot showing region `a`; region `b` is the
/// alternative. Animations:
/// - `events0`, `events1`: 1s, event keys at 0, 0.5 and 1.
/// - `rotate`: child rotation 0 to 90 over 1s.
/// - `move`: child x 0 to 100 over 1s.
/// - `swap`: shows `b` from time 0, 1s long.
pub(crate) fn skeleton_data() -> SkeletonData {
    let mut child = BoneData::new("child", Some(0));
    child.x = 10.0;
    child.length = 5.0;
    let bones = vec![BoneData::new("root", None), child];

    let mut slot = SlotData::new("slot", 1);
    slot.attachment = Some("a".to_string());

    let mut data = match SkeletonData::new(bones, vec![slot]) {
        Ok(data) => data,
        Err(e) => panic!("fixture skeleton data is invalid: {e}"),
    };

    let mut skin = SkinData::new("default");
    skin.set_attachment(
        0,
        "a",
        AttachmentData::Region(RegionAttachmentData::new("a", 2.0, 2.0)),
    );
    skin.set_attachment(
        0,
        "b",
        AttachmentData::Region(RegionAttachmentData::new("b", 4.0, 4.0)),
    );
    data.add_skin(skin).expect("default skin");

    let event = EventData::new("event");
    data.add_event(event.clone());

    let animations = [
        Animation::new("events0", 1.0, vec![event_timeline(&event)]),
        Animation::new("events1", 1.0, vec![event_timeline(&event)]),
        Animation::new(
            "rotate",
            1.0,
            vec![Timeline::Bone(BoneTimeline::Rotate(RotateTimeline {
                bone_index: 1,
                frames: vec![
                    RotateFrame {
                        time: 0.0,
                        angle: 0.0,
                        curve: Curve::Linear,
                    },
                    RotateFrame {
                        time: 1.0,
                        angle: 90.0,
                        curve: Curve::Linear,
                    },
                ],
            }))],
        ),
        Animation::new(
            "move",
            1.0,
            vec![Timeline::Bone(BoneTimeline::TranslateX(TranslateXTimeline {
                bone_index: 1,
                frames: vec![
                    FloatFrame {
                        time: 0.0,
                        value: 0.0,
                        curve: Curve::Linear,
                    },
                    FloatFrame {
                        time: 1.0,
                        value: 100.0,
                        curve: Curve::Linear,
                    },
                ],
            }))],
        ),
        Animation::new(
            "swap",
            1.0,
            vec![Timeline::Attachment(AttachmentTimeline {
                slot_index: 0,
                frames: vec![AttachmentFrame {
                    time: 0.0,
                    name: Some("b".to_string()),
                }],
            })],
        ),
    ];
    for animation in animations {
        data.add_animation(animation.expect("fixture animation"));
    }
    data
}

pub(crate) fn state_with(configure: impl FnOnce(&mut AnimationStateData)) -> AnimationState {
    init_logging();
    let mut data = AnimationStateData::new(Arc::new(skeleton_data()));
    configure(&mut data);
    let mut state = AnimationState::new(Arc::new(data));
    state.set_round_times_for_tests(true);
    state
}

pub(crate) fn state() -> AnimationState {
    state_with(|_| {})
}

pub(crate) fn skeleton_for(state: &AnimationState) -> Skeleton {
    Skeleton::new(Arc::clone(&state.data().skeleton_data))
}

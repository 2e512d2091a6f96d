use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::runtime::animation::{
    apply_attachment_mixing, apply_rotate_mixed, fire_events, ANIMATION_STATE_SETUP,
};
use crate::{
    Animation, AnimationStateConfig, BoneTimeline, Error, Event, MixBlend, MixDirection,
    Property, Skeleton, SkeletonData, Timeline,
};

/// Highest track index accepted by the scheduling calls.
pub const MAX_TRACK_INDEX: usize = 1023;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimelineMode {
    Subsequent,
    First,
    HoldSubsequent,
    HoldFirst,
    HoldMix,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct EntryId {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
struct EntrySlot {
    generation: u32,
    entry: Option<TrackEntry>,
}

/// Crossfade durations between animation pairs, plus defaults for new track entries.
#[derive(Clone, Debug)]
pub struct AnimationStateData {
    pub skeleton_data: Arc<SkeletonData>,
    pub default_mix: f32,
    pub event_threshold: f32,
    pub alpha_attachment_threshold: f32,
    pub mix_attachment_threshold: f32,
    pub mix_draw_order_threshold: f32,
    mixes: HashMap<(usize, usize), f32>,
}

impl AnimationStateData {
    pub fn new(skeleton_data: Arc<SkeletonData>) -> Self {
        Self {
            skeleton_data,
            default_mix: 0.0,
            event_threshold: 0.0,
            alpha_attachment_threshold: 0.0,
            mix_attachment_threshold: 0.0,
            mix_draw_order_threshold: 0.0,
            mixes: HashMap::new(),
        }
    }

    pub fn from_config(
        skeleton_data: Arc<SkeletonData>,
        config: &AnimationStateConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        let mut data = Self::new(skeleton_data);
        data.default_mix = config.default_mix;
        data.event_threshold = config.event_threshold;
        data.alpha_attachment_threshold = config.alpha_attachment_threshold;
        data.mix_attachment_threshold = config.mix_attachment_threshold;
        data.mix_draw_order_threshold = config.mix_draw_order_threshold;
        for mix in &config.mixes {
            data.set_mix(&mix.from, &mix.to, mix.duration)?;
        }
        log::debug!(
            "animation state data configured with {} mixes, default mix {}",
            data.mixes.len(),
            data.default_mix
        );
        Ok(data)
    }

    pub fn set_mix(&mut self, from: &str, to: &str, duration: f32) -> Result<(), Error> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(Error::invalid(format!(
                "mix duration must be finite and >= 0, got {duration}"
            )));
        }
        let from_index = self.animation_index(from)?;
        let to_index = self.animation_index(to)?;
        self.mixes.insert((from_index, to_index), duration);
        Ok(())
    }

    fn animation_index(&self, name: &str) -> Result<usize, Error> {
        match self.skeleton_data.animation(name) {
            Some((index, _)) => Ok(index),
            None => {
                log::warn!("unknown animation '{name}' in mix table");
                Err(Error::UnknownAnimation {
                    name: name.to_string(),
                })
            }
        }
    }

    /// Mix duration between two animations by index. `None` stands for an animation outside
    /// the table, such as the empty animation, and always uses the default.
    pub fn mix_duration(&self, from: Option<usize>, to: Option<usize>) -> f32 {
        match (from, to) {
            (Some(from), Some(to)) => self
                .mixes
                .get(&(from, to))
                .copied()
                .unwrap_or(self.default_mix),
            _ => self.default_mix,
        }
    }
}

struct TrackEntry {
    track_index: usize,
    animation: Arc<Animation>,
    animation_index: Option<usize>,
    looped: bool,
    reverse: bool,
    shortest_rotation: bool,
    hold_previous: bool,

    animation_start: f32,
    animation_end: f32,
    animation_last: f32,
    next_animation_last: f32,
    delay: f32,
    track_time: f32,
    track_last: f32,
    next_track_last: f32,
    track_end: f32,
    time_scale: f32,

    alpha: f32,
    mix_time: f32,
    mix_duration: f32,
    interrupt_alpha: f32,
    total_alpha: f32,
    mix_blend: MixBlend,

    event_threshold: f32,
    alpha_attachment_threshold: f32,
    mix_attachment_threshold: f32,
    mix_draw_order_threshold: f32,

    next: Option<EntryId>,
    mixing_from: Option<EntryId>,
    mixing_to: Option<EntryId>,

    listener: Option<Box<dyn TrackEntryListener>>,

    timeline_mode: Vec<TimelineMode>,
    timeline_hold_mix: Vec<Option<EntryId>>,
    rotation_state: Vec<f32>,
}

impl std::fmt::Debug for TrackEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackEntry")
            .field("track_index", &self.track_index)
            .field("animation", &self.animation.name)
            .field("looped", &self.looped)
            .field("delay", &self.delay)
            .field("track_time", &self.track_time)
            .field("track_end", &self.track_end)
            .field("mix_time", &self.mix_time)
            .field("mix_duration", &self.mix_duration)
            .field("next", &self.next)
            .field("mixing_from", &self.mixing_from)
            .field("mixing_to", &self.mixing_to)
            .finish()
    }
}

impl TrackEntry {
    fn new(
        track_index: usize,
        animation: Arc<Animation>,
        animation_index: Option<usize>,
        looped: bool,
        mix_duration: f32,
        data: &AnimationStateData,
    ) -> Self {
        let animation_end = animation.duration;
        Self {
            track_index,
            animation,
            animation_index,
            looped,
            reverse: false,
            shortest_rotation: false,
            hold_previous: false,
            animation_start: 0.0,
            animation_end,
            animation_last: -1.0,
            next_animation_last: -1.0,
            delay: 0.0,
            track_time: 0.0,
            track_last: -1.0,
            next_track_last: -1.0,
            track_end: f32::MAX,
            time_scale: 1.0,
            alpha: 1.0,
            mix_time: 0.0,
            mix_duration,
            interrupt_alpha: 1.0,
            total_alpha: 0.0,
            mix_blend: MixBlend::Replace,
            event_threshold: data.event_threshold,
            alpha_attachment_threshold: data.alpha_attachment_threshold,
            mix_attachment_threshold: data.mix_attachment_threshold,
            mix_draw_order_threshold: data.mix_draw_order_threshold,
            next: None,
            mixing_from: None,
            mixing_to: None,
            listener: None,
            timeline_mode: Vec::new(),
            timeline_hold_mix: Vec::new(),
            rotation_state: Vec::new(),
        }
    }

    /// True once an update has recorded where this entry's last pass ended.
    fn scanned(&self) -> bool {
        self.next_track_last != -1.0
    }

    fn animation_time(&self) -> f32 {
        if self.looped {
            let duration = self.animation_end - self.animation_start;
            if duration == 0.0 {
                return self.animation_start;
            }
            return self.track_time % duration + self.animation_start;
        }
        (self.track_time + self.animation_start).min(self.animation_end)
    }

    fn track_complete(&self) -> f32 {
        let duration = self.animation_end - self.animation_start;
        if duration != 0.0 {
            if self.looped {
                return duration * (1.0 + (self.track_time / duration).floor());
            }
            if self.track_time < duration {
                return duration;
            }
        }
        self.track_time
    }

    fn is_complete(&self) -> bool {
        self.track_time >= self.animation_end - self.animation_start
    }
}

/// A generation-checked reference to a track entry. Handles to disposed entries are ignored
/// by every setter and return `None` from every getter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TrackEntryHandle {
    id: EntryId,
}

macro_rules! entry_getters {
    ($($(#[$meta:meta])* $name:ident: $ty:ty => |$e:ident| $body:expr;)*) => {
        $(
            $(#[$meta])*
            pub fn $name(&self, state: &AnimationState) -> Option<$ty> {
                state.entry(self.id).map(|$e| $body)
            }
        )*
    };
}

macro_rules! entry_setters {
    ($($name:ident($value:ident: $ty:ty) => |$e:ident| $body:expr;)*) => {
        $(
            pub fn $name(&self, state: &mut AnimationState, $value: $ty) {
                self.with_entry_mut(state, |$e| $body);
            }
        )*
    };
}

impl TrackEntryHandle {
    fn with_entry_mut(&self, state: &mut AnimationState, f: impl FnOnce(&mut TrackEntry)) {
        match state.entry_mut(self.id) {
            Some(entry) => f(entry),
            None => log::warn!("ignoring change to a disposed track entry"),
        }
    }

    pub fn is_valid(&self, state: &AnimationState) -> bool {
        state.entry(self.id).is_some()
    }

    entry_getters! {
        track_index: usize => |e| e.track_index;
        animation: Arc<Animation> => |e| Arc::clone(&e.animation);
        looped: bool => |e| e.looped;
        delay: f32 => |e| e.delay;
        track_time: f32 => |e| e.track_time;
        track_end: f32 => |e| e.track_end;
        time_scale: f32 => |e| e.time_scale;
        alpha: f32 => |e| e.alpha;
        mix_time: f32 => |e| e.mix_time;
        mix_duration: f32 => |e| e.mix_duration;
        mix_blend: MixBlend => |e| e.mix_blend;
        animation_start: f32 => |e| e.animation_start;
        animation_end: f32 => |e| e.animation_end;
        animation_last: f32 => |e| e.animation_last;
        /// Current time within the animation, wrapped for looping entries.
        animation_time: f32 => |e| e.animation_time();
        /// Track time at which the animation next completes.
        track_complete: f32 => |e| e.track_complete();
        is_complete: bool => |e| e.is_complete();
    }

    pub fn next(&self, state: &AnimationState) -> Option<TrackEntryHandle> {
        let id = state.entry(self.id)?.next?;
        Some(TrackEntryHandle { id })
    }

    pub fn mixing_from(&self, state: &AnimationState) -> Option<TrackEntryHandle> {
        let id = state.entry(self.id)?.mixing_from?;
        Some(TrackEntryHandle { id })
    }

    pub fn mixing_to(&self, state: &AnimationState) -> Option<TrackEntryHandle> {
        let id = state.entry(self.id)?.mixing_to?;
        Some(TrackEntryHandle { id })
    }

    pub fn set_listener<L: TrackEntryListener + 'static>(
        &self,
        state: &mut AnimationState,
        listener: L,
    ) {
        self.with_entry_mut(state, |entry| {
            entry.listener = Some(Box::new(listener));
        });
    }

    pub fn clear_listener(&self, state: &mut AnimationState) {
        self.with_entry_mut(state, |entry| entry.listener = None);
    }

    entry_setters! {
        set_loop(looped: bool) => |e| e.looped = looped;
        set_delay(delay: f32) => |e| e.delay = delay;
        set_track_time(track_time: f32) => |e| e.track_time = track_time;
        set_track_end(track_end: f32) => |e| e.track_end = track_end;
        set_time_scale(time_scale: f32) => |e| e.time_scale = time_scale;
        set_alpha(alpha: f32) => |e| e.alpha = alpha;
        set_mix_duration(mix_duration: f32) => |e| e.mix_duration = mix_duration;
        set_mix_blend(mix_blend: MixBlend) => |e| e.mix_blend = mix_blend;
        set_animation_start(animation_start: f32) => |e| e.animation_start = animation_start;
        set_animation_end(animation_end: f32) => |e| e.animation_end = animation_end;
        set_reverse(reverse: bool) => |e| e.reverse = reverse;
        set_shortest_rotation(shortest_rotation: bool) => |e| e.shortest_rotation = shortest_rotation;
        set_event_threshold(threshold: f32) => |e| e.event_threshold = threshold;
        set_alpha_attachment_threshold(threshold: f32) => |e| e.alpha_attachment_threshold = threshold;
        set_mix_attachment_threshold(threshold: f32) => |e| e.mix_attachment_threshold = threshold;
        set_mix_draw_order_threshold(threshold: f32) => |e| e.mix_draw_order_threshold = threshold;
    }

    /// Holds the previous entry's pose on properties this entry keys while mixing in.
    /// Takes effect at the next apply.
    pub fn set_hold_previous(&self, state: &mut AnimationState, hold_previous: bool) {
        self.with_entry_mut(state, |entry| entry.hold_previous = hold_previous);
        state.animations_changed = true;
    }

    pub fn set_animation_last(&self, state: &mut AnimationState, animation_last: f32) {
        self.with_entry_mut(state, |entry| {
            entry.animation_last = animation_last;
            entry.next_animation_last = animation_last;
        });
    }

    /// Forgets the rotation direction chosen while mixing, so the next apply picks the
    /// shortest path again.
    pub fn reset_rotation_directions(&self, state: &mut AnimationState) {
        self.with_entry_mut(state, |entry| entry.rotation_state.clear());
    }
}

/// Entry state captured when a notification was queued.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackEntrySnapshot {
    pub handle: TrackEntryHandle,
    pub track_index: usize,
    /// Index into [`SkeletonData::animations`]; `None` for the empty animation and for
    /// animations that are not part of the skeleton data.
    pub animation_index: Option<usize>,
    pub animation_name: String,
    pub track_time: f32,
    pub state_time: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnimationStateEvent {
    Start,
    Interrupt,
    End,
    Dispose,
    Complete,
    Event(Event),
}

pub trait TrackEntryListener {
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: &TrackEntrySnapshot,
        event: &AnimationStateEvent,
    );
}

pub trait AnimationStateListener {
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: &TrackEntrySnapshot,
        event: &AnimationStateEvent,
    );
}

impl<F> TrackEntryListener for F
where
    F: FnMut(&mut AnimationState, &TrackEntrySnapshot, &AnimationStateEvent),
{
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: &TrackEntrySnapshot,
        event: &AnimationStateEvent,
    ) {
        self(state, entry, event);
    }
}

impl<F> AnimationStateListener for F
where
    F: FnMut(&mut AnimationState, &TrackEntrySnapshot, &AnimationStateEvent),
{
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: &TrackEntrySnapshot,
        event: &AnimationStateEvent,
    ) {
        self(state, entry, event);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone, Debug)]
struct QueuedEvent {
    entry: EntryId,
    snapshot: TrackEntrySnapshot,
    event: AnimationStateEvent,
    /// Seconds before the end of the update at which a scanned key was crossed.
    occurred: f32,
}

/// Applies animations over time, queues animations for later playback, and mixes between
/// animations on each track.
pub struct AnimationState {
    data: Arc<AnimationStateData>,
    tracks: Vec<Option<EntryId>>,
    entries: Vec<EntrySlot>,
    free_list: Vec<usize>,
    queue: VecDeque<QueuedEvent>,
    listeners: Vec<(ListenerId, Box<dyn AnimationStateListener>)>,
    next_listener_id: u64,
    delivering: bool,
    removed_listeners: Vec<ListenerId>,
    listeners_cleared: bool,
    draining: bool,
    drain_disabled: bool,
    animations_changed: bool,
    property_ids: HashSet<Property>,
    unkeyed_state: i32,
    time: f32,
    time_scale: f32,
    empty_animation: Arc<Animation>,
    #[cfg(test)]
    round_for_tests: bool,
}

impl AnimationState {
    pub fn new(data: Arc<AnimationStateData>) -> Self {
        Self {
            data,
            tracks: Vec::new(),
            entries: Vec::new(),
            free_list: Vec::new(),
            queue: VecDeque::new(),
            listeners: Vec::new(),
            next_listener_id: 0,
            delivering: false,
            removed_listeners: Vec::new(),
            listeners_cleared: false,
            draining: false,
            drain_disabled: false,
            animations_changed: false,
            property_ids: HashSet::new(),
            unkeyed_state: 0,
            time: 0.0,
            time_scale: 1.0,
            empty_animation: Arc::new(Animation::empty()),
            #[cfg(test)]
            round_for_tests: false,
        }
    }

    pub fn data(&self) -> &Arc<AnimationStateData> {
        &self.data
    }

    /// Total scaled time advanced by [`AnimationState::update`].
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    pub fn set_time_scale(&mut self, time_scale: f32) {
        self.time_scale = time_scale;
    }

    pub fn current(&self, track_index: usize) -> Option<TrackEntryHandle> {
        let id = (*self.tracks.get(track_index)?)?;
        Some(TrackEntryHandle { id })
    }

    pub fn tracks(&self) -> impl Iterator<Item = Option<TrackEntryHandle>> + '_ {
        self.tracks
            .iter()
            .map(|track| track.map(|id| TrackEntryHandle { id }))
    }

    pub fn add_listener<L: AnimationStateListener + 'static>(&mut self, listener: L) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) {
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        if self.delivering {
            self.removed_listeners.push(id);
        }
    }

    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
        if self.delivering {
            self.listeners_cleared = true;
        }
    }

    /// Drops notifications that have been queued but not yet delivered.
    pub fn clear_listener_notifications(&mut self) {
        for queued in std::mem::take(&mut self.queue) {
            if matches!(queued.event, AnimationStateEvent::Dispose) {
                self.free_entry(queued.entry);
            }
        }
    }

    pub fn set_animation(
        &mut self,
        track_index: usize,
        animation_name: &str,
        looped: bool,
    ) -> Result<TrackEntryHandle, Error> {
        let (index, animation) = self.find_animation(animation_name)?;
        check_track_index(track_index)?;
        Ok(self.set_animation_entry(track_index, animation, Some(index), looped))
    }

    /// Like [`AnimationState::set_animation`] for an animation that need not be registered
    /// in the skeleton data.
    pub fn set_animation_with(
        &mut self,
        track_index: usize,
        animation: Arc<Animation>,
        looped: bool,
    ) -> Result<TrackEntryHandle, Error> {
        check_track_index(track_index)?;
        let index = self.data.skeleton_data.animation_position(&animation);
        Ok(self.set_animation_entry(track_index, animation, index, looped))
    }

    pub fn add_animation(
        &mut self,
        track_index: usize,
        animation_name: &str,
        looped: bool,
        delay: f32,
    ) -> Result<TrackEntryHandle, Error> {
        let (index, animation) = self.find_animation(animation_name)?;
        check_track_index(track_index)?;
        check_delay(delay)?;
        Ok(self.add_animation_entry(track_index, animation, Some(index), looped, delay))
    }

    pub fn add_animation_with(
        &mut self,
        track_index: usize,
        animation: Arc<Animation>,
        looped: bool,
        delay: f32,
    ) -> Result<TrackEntryHandle, Error> {
        check_track_index(track_index)?;
        check_delay(delay)?;
        let index = self.data.skeleton_data.animation_position(&animation);
        Ok(self.add_animation_entry(track_index, animation, index, looped, delay))
    }

    /// Mixes the current animation out to the setup pose over `mix_duration` seconds.
    pub fn set_empty_animation(
        &mut self,
        track_index: usize,
        mix_duration: f32,
    ) -> Result<TrackEntryHandle, Error> {
        check_track_index(track_index)?;
        check_mix_duration(mix_duration)?;
        Ok(self.set_empty_animation_entry(track_index, mix_duration))
    }

    pub fn add_empty_animation(
        &mut self,
        track_index: usize,
        mix_duration: f32,
        delay: f32,
    ) -> Result<TrackEntryHandle, Error> {
        check_track_index(track_index)?;
        check_mix_duration(mix_duration)?;
        check_delay(delay)?;
        let handle = self.add_animation_entry(
            track_index,
            Arc::clone(&self.empty_animation),
            None,
            false,
            delay,
        );
        handle.with_entry_mut(self, |entry| {
            if delay <= 0.0 {
                entry.delay = (entry.delay + entry.mix_duration - mix_duration).max(0.0);
            }
            entry.mix_duration = mix_duration;
            entry.track_end = mix_duration;
        });
        Ok(handle)
    }

    pub fn set_empty_animations(&mut self, mix_duration: f32) -> Result<(), Error> {
        check_mix_duration(mix_duration)?;
        let old_drain_disabled = self.drain_disabled;
        self.drain_disabled = true;
        for track_index in 0..self.tracks.len() {
            if self.tracks[track_index].is_some() {
                self.set_empty_animation_entry(track_index, mix_duration);
            }
        }
        self.drain_disabled = old_drain_disabled;
        self.drain();
        Ok(())
    }

    /// Ends the track's current entry and everything it mixes from, and disposes queued
    /// entries. The track is left empty.
    pub fn clear_track(&mut self, track_index: usize) {
        self.clear_track_internal(track_index);
        self.drain();
    }

    pub fn clear_tracks(&mut self) {
        let old_drain_disabled = self.drain_disabled;
        self.drain_disabled = true;
        for track_index in 0..self.tracks.len() {
            self.clear_track_internal(track_index);
        }
        self.tracks.clear();
        self.drain_disabled = old_drain_disabled;
        self.drain();
    }

    /// Disposes every entry queued after `entry`.
    pub fn clear_next(&mut self, entry: TrackEntryHandle) {
        if self.entry(entry.id).is_none() {
            log::warn!("ignoring clear_next on a disposed track entry");
            return;
        }
        self.clear_next_internal(entry.id);
        self.drain();
    }

    /// Advances every track by `delta` seconds scaled by the state time scale, then queues
    /// the notifications the advance produced and delivers them.
    pub fn update(&mut self, delta: f32) {
        if !delta.is_finite() || delta < 0.0 {
            log::warn!("ignoring update with invalid delta {delta}");
            return;
        }
        let delta = delta * self.time_scale;

        self.scan_unscanned_entries();
        self.time += delta;

        for track_index in 0..self.tracks.len() {
            self.update_track(track_index, delta);
        }

        #[cfg(test)]
        if self.round_for_tests {
            self.round_track_times();
        }

        self.scan_tracks();
        self.drain();
    }

    /// Poses `skeleton` from every track. Returns true when any track contributed.
    ///
    /// Applying never advances time or queues notifications, so repeated calls without an
    /// intervening update leave the skeleton in the same state.
    pub fn apply(&mut self, skeleton: &mut Skeleton) -> bool {
        if self.animations_changed {
            self.recompute_timeline_modes();
        }

        let mut applied = false;
        for track_index in 0..self.tracks.len() {
            let Some(current_id) = self.tracks[track_index] else {
                continue;
            };
            let Some(current) = self.entry(current_id) else {
                continue;
            };
            if current.delay > 0.0 {
                continue;
            }
            applied = true;

            let blend = if track_index == 0 {
                MixBlend::First
            } else {
                current.mix_blend
            };
            let mut alpha = current.alpha;
            if current.mixing_from.is_some() {
                alpha *= self.apply_mixing_from(current_id, skeleton, blend);
            } else if current.track_time >= current.track_end && current.next.is_none() {
                alpha = 0.0;
            }
            self.apply_current(current_id, track_index, skeleton, alpha, blend);
        }

        let setup_state = self.unkeyed_state + ANIMATION_STATE_SETUP;
        let data = Arc::clone(&skeleton.data);
        for slot_index in 0..skeleton.slots.len() {
            if skeleton.slots[slot_index].attachment_state == setup_state {
                let setup = data
                    .slots
                    .get(slot_index)
                    .and_then(|slot| slot.attachment.as_deref());
                skeleton.assign_attachment(slot_index, setup);
            }
        }
        self.unkeyed_state += 2;
        applied
    }

    fn find_animation(&self, name: &str) -> Result<(usize, Arc<Animation>), Error> {
        if name.is_empty() {
            return Err(Error::invalid("animation name must not be empty"));
        }
        match self.data.skeleton_data.animation(name) {
            Some((index, animation)) => Ok((index, Arc::clone(animation))),
            None => {
                log::warn!("unknown animation '{name}'");
                Err(Error::UnknownAnimation {
                    name: name.to_string(),
                })
            }
        }
    }

    fn ensure_track(&mut self, track_index: usize) {
        if track_index >= self.tracks.len() {
            self.tracks.resize(track_index + 1, None);
        }
    }

    fn new_entry(
        &mut self,
        track_index: usize,
        animation: Arc<Animation>,
        animation_index: Option<usize>,
        looped: bool,
        last: Option<EntryId>,
    ) -> EntryId {
        let mix_duration = last
            .and_then(|id| self.entry(id))
            .map(|last| self.data.mix_duration(last.animation_index, animation_index))
            .unwrap_or(0.0);
        let entry = TrackEntry::new(
            track_index,
            animation,
            animation_index,
            looped,
            mix_duration,
            &self.data,
        );
        self.alloc_entry(entry)
    }

    fn set_animation_entry(
        &mut self,
        track_index: usize,
        animation: Arc<Animation>,
        animation_index: Option<usize>,
        looped: bool,
    ) -> TrackEntryHandle {
        self.ensure_track(track_index);
        let mut interrupt = true;
        let mut last = self.tracks[track_index];
        if let Some(current) = last {
            let (scanned, mixing_from) = self
                .entry(current)
                .map(|entry| (entry.scanned(), entry.mixing_from))
                .unwrap_or((true, None));
            if !scanned {
                // Never reached by an update: replace it outright instead of mixing from it.
                self.tracks[track_index] = mixing_from;
                self.queue_event(current, AnimationStateEvent::Interrupt);
                self.queue_end(current);
                self.clear_next_internal(current);
                last = mixing_from;
                interrupt = false;
            } else {
                self.clear_next_internal(current);
            }
        }

        let id = self.new_entry(track_index, animation, animation_index, looped, last);
        log::debug!(
            "track {track_index}: set {}",
            self.entry(id).map_or("", |e| e.animation.name.as_str())
        );
        self.set_current(track_index, id, interrupt);
        self.drain();
        TrackEntryHandle { id }
    }

    fn add_animation_entry(
        &mut self,
        track_index: usize,
        animation: Arc<Animation>,
        animation_index: Option<usize>,
        looped: bool,
        mut delay: f32,
    ) -> TrackEntryHandle {
        self.ensure_track(track_index);
        let mut last = self.tracks[track_index];
        while let Some(next) = last.and_then(|id| self.entry(id)).and_then(|e| e.next) {
            last = Some(next);
        }

        let id = self.new_entry(track_index, animation, animation_index, looped, last);
        match last {
            None => {
                self.set_current(track_index, id, true);
                self.drain();
                if delay < 0.0 {
                    delay = 0.0;
                }
            }
            Some(last) => {
                let last_complete = self.entry(last).map_or(0.0, TrackEntry::track_complete);
                if let Some(last) = self.entry_mut(last) {
                    last.next = Some(id);
                }
                if delay <= 0.0 {
                    let mix_duration = self.entry(id).map_or(0.0, |e| e.mix_duration);
                    delay = (delay + last_complete - mix_duration).max(0.0);
                }
            }
        }
        if let Some(entry) = self.entry_mut(id) {
            entry.delay = delay;
            log::debug!(
                "track {track_index}: queued {} with delay {delay}",
                entry.animation.name
            );
        }
        TrackEntryHandle { id }
    }

    fn set_empty_animation_entry(&mut self, track_index: usize, mix_duration: f32) -> TrackEntryHandle {
        let handle = self.set_animation_entry(
            track_index,
            Arc::clone(&self.empty_animation),
            None,
            false,
        );
        handle.with_entry_mut(self, |entry| {
            entry.mix_duration = mix_duration;
            entry.track_end = mix_duration;
        });
        handle
    }

    fn set_current(&mut self, track_index: usize, id: EntryId, interrupt: bool) {
        let from = self.tracks[track_index].replace(id);
        if let Some(from) = from {
            if interrupt {
                self.queue_event(from, AnimationStateEvent::Interrupt);
            }
            let interrupt_mix = self.entry(from).and_then(|from| {
                (from.mixing_from.is_some() && from.mix_duration > 0.0)
                    .then(|| (from.mix_time / from.mix_duration).min(1.0))
            });
            if let Some(current) = self.entry_mut(id) {
                current.mixing_from = Some(from);
                current.mix_time = 0.0;
                if let Some(mix) = interrupt_mix {
                    // Interrupting a crossfade holds the pose it had reached.
                    current.interrupt_alpha *= mix;
                }
            }
            if let Some(from) = self.entry_mut(from) {
                from.mixing_to = Some(id);
                from.rotation_state.clear();
            }
        }
        self.queue_event(id, AnimationStateEvent::Start);
        self.animations_changed = true;
    }

    fn clear_next_internal(&mut self, id: EntryId) {
        let mut next = self.entry_mut(id).and_then(|entry| entry.next.take());
        while let Some(next_id) = next {
            next = self.entry(next_id).and_then(|entry| entry.next);
            self.queue_event(next_id, AnimationStateEvent::Dispose);
        }
    }

    fn clear_track_internal(&mut self, track_index: usize) {
        let Some(current) = self.tracks.get(track_index).copied().flatten() else {
            return;
        };
        log::debug!("track {track_index}: cleared");
        self.queue_end(current);
        self.clear_next_internal(current);

        let mut entry = current;
        loop {
            let Some(from) = self.entry(entry).and_then(|e| e.mixing_from) else {
                break;
            };
            self.queue_end(from);
            if let Some(e) = self.entry_mut(entry) {
                e.mixing_from = None;
                e.mixing_to = None;
            }
            entry = from;
        }
        self.tracks[track_index] = None;
    }

    fn update_track(&mut self, track_index: usize, delta: f32) {
        let Some(current_id) = self.tracks[track_index] else {
            return;
        };
        let Some(current) = self.entry_mut(current_id) else {
            self.tracks[track_index] = None;
            return;
        };

        current.animation_last = current.next_animation_last;
        current.track_last = current.next_track_last;

        let mut current_delta = delta * current.time_scale;
        if current.delay > 0.0 {
            current.delay -= current_delta;
            if current.delay > 0.0 {
                return;
            }
            current_delta = -current.delay;
            current.delay = 0.0;
        }

        let next = current.next;
        let track_last = current.track_last;
        let track_end = current.track_end;
        let time_scale = current.time_scale;
        let mixing_from = current.mixing_from;

        if let Some(next_id) = next {
            // Promote the next entry once the previous one has played up to its delay.
            let next_delay = self.entry(next_id).map_or(0.0, |e| e.delay);
            let next_time = track_last - next_delay;
            if next_time >= 0.0 {
                if let Some(next) = self.entry_mut(next_id) {
                    next.delay = 0.0;
                    next.track_time += if time_scale == 0.0 {
                        0.0
                    } else {
                        (next_time / time_scale + delta) * next.time_scale
                    };
                }
                if let Some(current) = self.entry_mut(current_id) {
                    current.track_time += current_delta;
                    current.next = None;
                }
                log::debug!("track {track_index}: promoted queued entry");
                self.set_current(track_index, next_id, true);

                let mut link = next_id;
                while let Some(entry) = self.entry_mut(link) {
                    let Some(from) = entry.mixing_from else {
                        break;
                    };
                    entry.mix_time += delta;
                    link = from;
                }
                return;
            }
        } else if track_last >= track_end && mixing_from.is_none() {
            log::debug!("track {track_index}: reached track end");
            self.tracks[track_index] = None;
            self.queue_end(current_id);
            self.clear_next_internal(current_id);
            return;
        }

        if mixing_from.is_some() && self.update_mixing_from(current_id, delta) {
            // Every entry the current one mixes from has finished.
            let from = self
                .entry_mut(current_id)
                .and_then(|current| current.mixing_from.take());
            if let Some(from_entry) = from.and_then(|id| self.entry_mut(id)) {
                from_entry.mixing_to = None;
            }
            let mut link = from;
            while let Some(id) = link {
                link = self.entry(id).and_then(|e| e.mixing_from);
                self.queue_end(id);
            }
        }

        if let Some(current) = self.entry_mut(current_id) {
            current.track_time += current_delta;
        }
    }

    /// Returns true when `to` no longer mixes from anything that still contributes.
    fn update_mixing_from(&mut self, to: EntryId, delta: f32) -> bool {
        let Some(from) = self.entry(to).and_then(|entry| entry.mixing_from) else {
            return true;
        };

        let finished = self.update_mixing_from(from, delta);

        let Some(from_entry) = self.entry_mut(from) else {
            return finished;
        };
        from_entry.animation_last = from_entry.next_animation_last;
        from_entry.track_last = from_entry.next_track_last;
        let from_total_alpha = from_entry.total_alpha;
        let from_interrupt_alpha = from_entry.interrupt_alpha;
        let from_mixing_from = from_entry.mixing_from;

        let Some(to_entry) = self.entry_mut(to) else {
            return finished;
        };
        if to_entry.scanned() && to_entry.mix_time >= to_entry.mix_duration {
            if from_total_alpha == 0.0 || to_entry.mix_duration == 0.0 {
                to_entry.mixing_from = from_mixing_from;
                to_entry.interrupt_alpha = from_interrupt_alpha;
                if let Some(next_from) = from_mixing_from.and_then(|id| self.entry_mut(id)) {
                    next_from.mixing_to = Some(to);
                }
                log::debug!("mix out finished");
                self.queue_end(from);
            }
            return finished;
        }

        to_entry.mix_time += delta;
        if let Some(from_entry) = self.entry_mut(from) {
            from_entry.track_time += delta * from_entry.time_scale;
        }
        false
    }

    /// Records the starting point of entries that became current outside an update, so
    /// keys at their first frame are reported at the time they were set.
    fn scan_unscanned_entries(&mut self) {
        for track_index in 0..self.tracks.len() {
            let Some(id) = self.tracks[track_index] else {
                continue;
            };
            if self
                .entry(id)
                .is_some_and(|entry| entry.delay <= 0.0 && !entry.scanned())
            {
                self.scan_current(id);
            }
        }
    }

    /// Queues the event keys and completions crossed by every track since the last scan,
    /// ordered by when they occurred within the update.
    fn scan_tracks(&mut self) {
        if self.animations_changed {
            self.recompute_timeline_modes();
        }
        let scanned_from = self.queue.len();
        for track_index in 0..self.tracks.len() {
            let Some(id) = self.tracks[track_index] else {
                continue;
            };
            let Some(current) = self.entry(id) else {
                continue;
            };
            if current.delay > 0.0 {
                continue;
            }
            let blend = if track_index == 0 {
                MixBlend::First
            } else {
                current.mix_blend
            };
            if current.mixing_from.is_some() {
                self.scan_mixing_from(id, blend);
            }
            self.scan_current(id);
        }

        // Stable, so keys crossed at the same moment keep track order.
        self.queue.make_contiguous()[scanned_from..]
            .sort_by(|a, b| a.occurred.total_cmp(&b.occurred));
    }

    fn scan_current(&mut self, id: EntryId) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        let animation_time = entry.animation_time();
        let mut events = Vec::new();
        if !entry.reverse {
            collect_entry_events(entry, animation_time, &mut events);
        }
        self.queue_entry_events(id, animation_time, &events);
        if let Some(entry) = self.entry_mut(id) {
            entry.next_animation_last = animation_time;
            entry.next_track_last = entry.track_time;
        }
    }

    fn scan_mixing_from(&mut self, to: EntryId, blend: MixBlend) {
        let Some(from) = self.entry(to).and_then(|entry| entry.mixing_from) else {
            return;
        };
        if self.entry(from).is_some_and(|e| e.mixing_from.is_some()) {
            self.scan_mixing_from(from, blend);
        }

        let Some((to_mix_duration, to_interrupt_alpha)) = self
            .entry(to)
            .map(|to| (to.mix_duration, to.interrupt_alpha))
        else {
            return;
        };
        let Some(from_entry) = self.entry(from) else {
            return;
        };
        let (mix, blend) = self.mix_percent(to, from_entry, blend);

        let total_alpha = if blend == MixBlend::Add {
            0.0
        } else {
            let alpha_hold = from_entry.alpha * to_interrupt_alpha;
            let alpha_mix = alpha_hold * (1.0 - mix);
            let draw_order = mix < from_entry.mix_draw_order_threshold;
            from_entry
                .animation
                .timelines()
                .iter()
                .enumerate()
                .filter_map(|(i, timeline)| {
                    self.mixing_out_weight(from_entry, i, timeline, blend, alpha_mix, alpha_hold, draw_order)
                })
                .map(|(_, alpha)| alpha)
                .sum()
        };

        let animation_time = from_entry.animation_time();
        let mut events = Vec::new();
        if !from_entry.reverse && mix < from_entry.event_threshold {
            collect_entry_events(from_entry, animation_time, &mut events);
        }
        if to_mix_duration > 0.0 {
            self.queue_entry_events(from, animation_time, &events);
        }
        if let Some(from_entry) = self.entry_mut(from) {
            from_entry.total_alpha = total_alpha;
            from_entry.next_animation_last = animation_time;
            from_entry.next_track_last = from_entry.track_time;
        }
    }

    /// Mix percent of `to` over `from`, and the blend `from` is applied with.
    fn mix_percent(&self, to: EntryId, from: &TrackEntry, blend: MixBlend) -> (f32, MixBlend) {
        let (mix_time, mix_duration) = self
            .entry(to)
            .map_or((0.0, 0.0), |to| (to.mix_time, to.mix_duration));
        if mix_duration == 0.0 {
            let blend = if blend == MixBlend::First {
                MixBlend::Setup
            } else {
                blend
            };
            return (1.0, blend);
        }
        let blend = if blend == MixBlend::First {
            blend
        } else {
            from.mix_blend
        };
        ((mix_time / mix_duration).min(1.0), blend)
    }

    /// Blend and alpha for one timeline of an entry being mixed out, or `None` when the
    /// timeline is skipped this frame.
    #[allow(clippy::too_many_arguments)]
    fn mixing_out_weight(
        &self,
        from: &TrackEntry,
        timeline_index: usize,
        timeline: &Timeline,
        blend: MixBlend,
        alpha_mix: f32,
        alpha_hold: f32,
        draw_order: bool,
    ) -> Option<(MixBlend, f32)> {
        let mode = from
            .timeline_mode
            .get(timeline_index)
            .copied()
            .unwrap_or(TimelineMode::First);
        match mode {
            TimelineMode::Subsequent => {
                if !draw_order && timeline.is_draw_order() {
                    return None;
                }
                Some((blend, alpha_mix))
            }
            TimelineMode::First => Some((MixBlend::Setup, alpha_mix)),
            TimelineMode::HoldSubsequent => Some((blend, alpha_hold)),
            TimelineMode::HoldFirst => Some((MixBlend::Setup, alpha_hold)),
            TimelineMode::HoldMix => {
                let hold = from
                    .timeline_hold_mix
                    .get(timeline_index)
                    .copied()
                    .flatten()
                    .and_then(|id| self.entry(id))
                    .map_or(0.0, |hold| {
                        if hold.mix_duration > 0.0 {
                            (1.0 - hold.mix_time / hold.mix_duration).max(0.0)
                        } else {
                            0.0
                        }
                    });
                Some((MixBlend::Setup, alpha_hold * hold))
            }
        }
    }

    fn queue_entry_events(&mut self, id: EntryId, animation_time: f32, events: &[Event]) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        let animation_start = entry.animation_start;
        let animation_end = entry.animation_end;
        let duration = animation_end - animation_start;
        let track_last_wrapped = entry.track_last % duration;

        let track_time = entry.track_time;
        let time_scale = entry.time_scale.abs();
        let cycle_start = |track: f32| {
            if duration > 0.0 {
                (track / duration).floor() * duration
            } else {
                0.0
            }
        };
        let occurred = |track: f32| {
            if time_scale > 0.0 {
                ((track - track_time) / time_scale).min(0.0)
            } else {
                0.0
            }
        };
        let last_cycle = cycle_start(entry.track_last.max(0.0));
        let current_cycle = cycle_start(track_time);
        let complete_at = if entry.looped {
            occurred(current_cycle)
        } else {
            occurred(duration)
        };

        // Events before the loop point come before the completion.
        let mut split = events.len();
        let mut before = Vec::new();
        for (i, event) in events.iter().enumerate() {
            if event.time < track_last_wrapped {
                split = i;
                break;
            }
            if event.time > animation_end {
                continue;
            }
            before.push(event.clone());
        }

        let complete = if entry.looped {
            duration == 0.0 || {
                let cycles = (entry.track_time / duration).floor();
                cycles > 0.0 && cycles > (entry.track_last / duration).floor()
            }
        } else {
            animation_time >= animation_end && entry.animation_last < animation_end
        };

        for event in before {
            let at = occurred(last_cycle + event.time - animation_start);
            self.queue_event_at(id, AnimationStateEvent::Event(event), at);
        }
        if complete {
            log::trace!("entry completed at state time {}", self.time);
            self.queue_event_at(id, AnimationStateEvent::Complete, complete_at);
        }
        for event in &events[split..] {
            if event.time < animation_start {
                continue;
            }
            let at = occurred(current_cycle + event.time - animation_start);
            self.queue_event_at(id, AnimationStateEvent::Event(event.clone()), at);
        }
    }

    fn apply_current(
        &mut self,
        id: EntryId,
        track_index: usize,
        skeleton: &mut Skeleton,
        alpha: f32,
        blend: MixBlend,
    ) {
        let unkeyed_state = self.unkeyed_state;
        let Some(entry) = self.entry_mut(id) else {
            return;
        };
        let animation = Arc::clone(&entry.animation);
        let animation_last = entry.animation_last;
        let animation_time = entry.animation_time();
        let apply_time = if entry.reverse {
            animation.duration - animation_time
        } else {
            animation_time
        };
        let shortest_rotation = entry.shortest_rotation;
        let mut attachments = alpha >= entry.alpha_attachment_threshold;
        let timelines = animation.timelines();

        if (track_index == 0 && alpha == 1.0) || blend == MixBlend::Add {
            if track_index == 0 {
                attachments = true;
            }
            for (i, timeline) in timelines.iter().enumerate() {
                // Nothing below keys a first-mode property, so adding onto the
                // current value would accumulate across applies.
                let timeline_blend = match entry.timeline_mode.get(i) {
                    Some(TimelineMode::First | TimelineMode::HoldFirst)
                        if blend == MixBlend::Add =>
                    {
                        MixBlend::Setup
                    }
                    _ => blend,
                };
                match timeline {
                    Timeline::Attachment(t) => apply_attachment_mixing(
                        t,
                        skeleton,
                        apply_time,
                        blend,
                        attachments,
                        unkeyed_state,
                    ),
                    _ => timeline.apply(
                        skeleton,
                        animation_last,
                        apply_time,
                        None,
                        alpha,
                        timeline_blend,
                        MixDirection::In,
                    ),
                }
            }
            return;
        }

        let modes = entry.timeline_mode.clone();
        let mut rotation_state = std::mem::take(&mut entry.rotation_state);
        let first_frame = !shortest_rotation && rotation_state.len() != timelines.len() * 2;
        if first_frame {
            rotation_state.clear();
            rotation_state.resize(timelines.len() * 2, 0.0);
        }

        for (i, timeline) in timelines.iter().enumerate() {
            let timeline_blend = if modes.get(i) == Some(&TimelineMode::Subsequent) {
                blend
            } else {
                MixBlend::Setup
            };
            match timeline {
                Timeline::Bone(BoneTimeline::Rotate(t)) if !shortest_rotation => {
                    apply_rotate_mixed(
                        t,
                        skeleton,
                        apply_time,
                        alpha,
                        timeline_blend,
                        &mut rotation_state,
                        i,
                        first_frame,
                    );
                }
                Timeline::Attachment(t) => apply_attachment_mixing(
                    t,
                    skeleton,
                    apply_time,
                    blend,
                    attachments,
                    unkeyed_state,
                ),
                _ => timeline.apply(
                    skeleton,
                    animation_last,
                    apply_time,
                    None,
                    alpha,
                    timeline_blend,
                    MixDirection::In,
                ),
            }
        }

        if let Some(entry) = self.entry_mut(id) {
            entry.rotation_state = rotation_state;
        }
    }

    /// Applies the entries `to` mixes from, deepest first, and returns the mix percent of
    /// `to`.
    fn apply_mixing_from(&mut self, to: EntryId, skeleton: &mut Skeleton, blend: MixBlend) -> f32 {
        let Some(from) = self.entry(to).and_then(|entry| entry.mixing_from) else {
            return 1.0;
        };
        if self.entry(from).is_some_and(|e| e.mixing_from.is_some()) {
            self.apply_mixing_from(from, skeleton, blend);
        }

        let to_interrupt_alpha = self.entry(to).map_or(1.0, |to| to.interrupt_alpha);
        let Some(from_entry) = self.entry(from) else {
            return 1.0;
        };
        let (mix, blend) = self.mix_percent(to, from_entry, blend);

        let animation = Arc::clone(&from_entry.animation);
        let attachments = mix < from_entry.mix_attachment_threshold;
        let draw_order = mix < from_entry.mix_draw_order_threshold;
        let alpha_hold = from_entry.alpha * to_interrupt_alpha;
        let alpha_mix = alpha_hold * (1.0 - mix);
        let animation_last = from_entry.animation_last;
        let animation_time = from_entry.animation_time();
        let apply_time = if from_entry.reverse {
            animation.duration - animation_time
        } else {
            animation_time
        };
        let unkeyed_state = self.unkeyed_state;
        let timelines = animation.timelines();

        if blend == MixBlend::Add {
            for timeline in timelines {
                timeline.apply(
                    skeleton,
                    animation_last,
                    apply_time,
                    None,
                    alpha_mix,
                    blend,
                    MixDirection::Out,
                );
            }
            return mix;
        }

        let weights = timelines
            .iter()
            .enumerate()
            .map(|(i, timeline)| {
                self.mixing_out_weight(from_entry, i, timeline, blend, alpha_mix, alpha_hold, draw_order)
            })
            .collect::<Vec<_>>();
        let shortest_rotation = from_entry.shortest_rotation;
        let alpha_attachment_threshold = from_entry.alpha_attachment_threshold;

        let Some(from_entry) = self.entry_mut(from) else {
            return mix;
        };
        let mut rotation_state = std::mem::take(&mut from_entry.rotation_state);
        let first_frame = !shortest_rotation && rotation_state.len() != timelines.len() * 2;
        if first_frame {
            rotation_state.clear();
            rotation_state.resize(timelines.len() * 2, 0.0);
        }

        for (i, (timeline, weight)) in timelines.iter().zip(weights).enumerate() {
            let Some((timeline_blend, alpha)) = weight else {
                continue;
            };
            match timeline {
                Timeline::Bone(BoneTimeline::Rotate(t)) if !shortest_rotation => {
                    apply_rotate_mixed(
                        t,
                        skeleton,
                        apply_time,
                        alpha,
                        timeline_blend,
                        &mut rotation_state,
                        i,
                        first_frame,
                    );
                }
                Timeline::Attachment(t) => apply_attachment_mixing(
                    t,
                    skeleton,
                    apply_time,
                    timeline_blend,
                    attachments && alpha >= alpha_attachment_threshold,
                    unkeyed_state,
                ),
                _ => {
                    let direction = if draw_order
                        && timeline.is_draw_order()
                        && timeline_blend == MixBlend::Setup
                    {
                        MixDirection::In
                    } else {
                        MixDirection::Out
                    };
                    timeline.apply(
                        skeleton,
                        animation_last,
                        apply_time,
                        None,
                        alpha,
                        timeline_blend,
                        direction,
                    );
                }
            }
        }

        if let Some(from_entry) = self.entry_mut(from) {
            from_entry.rotation_state = rotation_state;
        }
        mix
    }

    fn recompute_timeline_modes(&mut self) {
        self.animations_changed = false;
        self.property_ids.clear();

        for track_index in 0..self.tracks.len() {
            let Some(mut id) = self.tracks[track_index] else {
                continue;
            };
            while let Some(from) = self.entry(id).and_then(|e| e.mixing_from) {
                id = from;
            }
            let mut link = Some(id);
            while let Some(id) = link {
                let Some(entry) = self.entry(id) else {
                    break;
                };
                link = entry.mixing_to;
                if entry.mixing_to.is_none() || entry.mix_blend != MixBlend::Add {
                    self.compute_hold(id);
                } else if let Some(entry) = self.entry_mut(id) {
                    let count = entry.animation.timelines().len();
                    entry.timeline_mode = vec![TimelineMode::Subsequent; count];
                    entry.timeline_hold_mix = vec![None; count];
                }
            }
        }
    }

    fn compute_hold(&mut self, id: EntryId) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        let animation = Arc::clone(&entry.animation);
        let to = entry.mixing_to;
        let hold_previous = to
            .and_then(|to| self.entry(to))
            .is_some_and(|to| to.hold_previous);
        let timelines = animation.timelines();
        let mut modes = Vec::with_capacity(timelines.len());
        let mut hold_mix = vec![None; timelines.len()];

        for (i, timeline) in timelines.iter().enumerate() {
            let ids = timeline.property_ids();
            let first = self.add_property_ids(&ids);
            if hold_previous {
                modes.push(if first {
                    TimelineMode::HoldFirst
                } else {
                    TimelineMode::HoldSubsequent
                });
                continue;
            }
            if !first {
                modes.push(TimelineMode::Subsequent);
                continue;
            }
            let Some(to_entry) = to.and_then(|to| self.entry(to)) else {
                modes.push(TimelineMode::First);
                continue;
            };
            let special = timeline.is_attachment()
                || timeline.is_draw_order()
                || matches!(timeline, Timeline::Event(_));
            if special || !has_any_property(&to_entry.animation, &ids) {
                modes.push(TimelineMode::First);
                continue;
            }

            let mut mode = TimelineMode::HoldFirst;
            let mut next = to_entry.mixing_to;
            while let Some(next_id) = next {
                let Some(next_entry) = self.entry(next_id) else {
                    break;
                };
                if has_any_property(&next_entry.animation, &ids) {
                    next = next_entry.mixing_to;
                    continue;
                }
                if next_entry.mix_duration > 0.0 {
                    mode = TimelineMode::HoldMix;
                    hold_mix[i] = Some(next_id);
                }
                break;
            }
            modes.push(mode);
        }

        if let Some(entry) = self.entry_mut(id) {
            entry.timeline_mode = modes;
            entry.timeline_hold_mix = hold_mix;
        }
    }

    /// Adds `ids` to the set of keyed properties. Returns true when any was new.
    fn add_property_ids(&mut self, ids: &[Property]) -> bool {
        let mut added = false;
        for id in ids {
            added |= self.property_ids.insert(id.clone());
        }
        added
    }

    fn alloc_entry(&mut self, entry: TrackEntry) -> EntryId {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.entries[index];
            slot.entry = Some(entry);
            EntryId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.entries.len();
            self.entries.push(EntrySlot {
                generation: 0,
                entry: Some(entry),
            });
            EntryId {
                index,
                generation: 0,
            }
        }
    }

    fn entry(&self, id: EntryId) -> Option<&TrackEntry> {
        let slot = self.entries.get(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, id: EntryId) -> Option<&mut TrackEntry> {
        let slot = self.entries.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    fn free_entry(&mut self, id: EntryId) {
        let Some(slot) = self.entries.get_mut(id.index) else {
            return;
        };
        if slot.generation != id.generation || slot.entry.is_none() {
            return;
        }
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
    }

    fn queue_event(&mut self, id: EntryId, event: AnimationStateEvent) {
        self.queue_event_at(id, event, 0.0);
    }

    fn queue_event_at(&mut self, id: EntryId, event: AnimationStateEvent, occurred: f32) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        let snapshot = TrackEntrySnapshot {
            handle: TrackEntryHandle { id },
            track_index: entry.track_index,
            animation_index: entry.animation_index,
            animation_name: entry.animation.name.clone(),
            track_time: entry.track_time,
            state_time: self.time,
        };
        log::trace!(
            "queued {event:?} for '{}' on track {}",
            snapshot.animation_name,
            snapshot.track_index
        );
        self.queue.push_back(QueuedEvent {
            entry: id,
            snapshot,
            event,
            occurred,
        });
    }

    /// Ending an entry also disposes it.
    fn queue_end(&mut self, id: EntryId) {
        self.queue_event(id, AnimationStateEvent::End);
        self.queue_event(id, AnimationStateEvent::Dispose);
        self.animations_changed = true;
    }

    fn drain(&mut self) {
        if self.drain_disabled || self.draining {
            return;
        }
        self.draining = true;

        while let Some(queued) = self.queue.pop_front() {
            let mut entry_listener = self
                .entry_mut(queued.entry)
                .and_then(|entry| entry.listener.take());
            if let Some(listener) = entry_listener.as_mut() {
                listener.on_event(self, &queued.snapshot, &queued.event);
            }

            self.notify_listeners(&queued.snapshot, &queued.event);

            if matches!(queued.event, AnimationStateEvent::Dispose) {
                self.free_entry(queued.entry);
            } else if let Some(listener) = entry_listener {
                if let Some(entry) = self.entry_mut(queued.entry) {
                    if entry.listener.is_none() {
                        entry.listener = Some(listener);
                    }
                }
            }
        }

        self.draining = false;
    }

    fn notify_listeners(&mut self, snapshot: &TrackEntrySnapshot, event: &AnimationStateEvent) {
        if self.listeners.is_empty() {
            return;
        }
        let mut listeners = std::mem::take(&mut self.listeners);
        self.delivering = true;
        for (_, listener) in listeners.iter_mut() {
            listener.on_event(self, snapshot, event);
        }
        self.delivering = false;

        if std::mem::take(&mut self.listeners_cleared) {
            listeners.clear();
        }
        let removed = std::mem::take(&mut self.removed_listeners);
        listeners.retain(|(id, _)| !removed.contains(id));
        listeners.append(&mut self.listeners);
        self.listeners = listeners;
    }

    #[cfg(test)]
    pub(crate) fn set_round_times_for_tests(&mut self, enabled: bool) {
        self.round_for_tests = enabled;
    }

    #[cfg(test)]
    fn round_track_times(&mut self) {
        fn round_decimals(value: f32, decimals: i32) -> f32 {
            let factor = 10_f32.powi(decimals);
            (value * factor).round() / factor
        }

        for track_index in 0..self.tracks.len() {
            let Some(id) = self.tracks[track_index] else {
                continue;
            };
            let Some(entry) = self.entry_mut(id) else {
                continue;
            };
            entry.track_time = round_decimals(entry.track_time, 6);
            entry.delay = round_decimals(entry.delay, 3);
            if let Some(from) = entry.mixing_from.and_then(|from| self.entry_mut(from)) {
                from.track_time = round_decimals(from.track_time, 6);
            }
        }
    }
}

fn check_track_index(track_index: usize) -> Result<(), Error> {
    if track_index > MAX_TRACK_INDEX {
        return Err(Error::InvalidTrackIndex { index: track_index });
    }
    Ok(())
}

fn check_delay(delay: f32) -> Result<(), Error> {
    if !delay.is_finite() {
        return Err(Error::invalid(format!("delay must be finite, got {delay}")));
    }
    Ok(())
}

fn check_mix_duration(mix_duration: f32) -> Result<(), Error> {
    if !mix_duration.is_finite() || mix_duration < 0.0 {
        return Err(Error::invalid(format!(
            "mix duration must be finite and >= 0, got {mix_duration}"
        )));
    }
    Ok(())
}

fn has_any_property(animation: &Animation, ids: &[Property]) -> bool {
    ids.iter().any(|id| animation.has_property(id))
}

fn collect_entry_events(entry: &TrackEntry, animation_time: f32, out: &mut Vec<Event>) {
    for timeline in entry.animation.timelines() {
        if let Timeline::Event(t) = timeline {
            fire_events(t, entry.animation_last, animation_time, out);
        }
    }
}

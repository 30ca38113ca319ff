//! Keyframe animation tracks imported from model files.

use cgmath::{Quaternion, Vector3};

/// Values of one animation channel, one entry per timestamp.
#[derive(Clone, Debug)]
pub enum Keyframes {
    Translation(Vec<Vector3<f32>>),
    Rotation(Vec<Quaternion<f32>>),
    Scale(Vec<Vector3<f32>>),
    /// One weight vector per timestamp, one entry per morph target.
    MorphWeights(Vec<Vec<f32>>),
}

/// What a track drives: a skeleton joint (by joint index) or the model root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackTarget {
    Root,
    Bone(usize),
}

/// One channel's keyframe sequence. Timestamps are non-decreasing.
#[derive(Clone, Debug)]
pub struct AnimationTrack {
    pub target: TrackTarget,
    pub timestamps: Vec<f32>,
    pub keyframes: Keyframes,
}

impl AnimationTrack {
    pub fn new(target: TrackTarget, timestamps: Vec<f32>, keyframes: Keyframes) -> Self {
        debug_assert!(
            timestamps.windows(2).all(|w| w[0] <= w[1]),
            "keyframe times must be non-decreasing"
        );
        Self {
            target,
            timestamps,
            keyframes,
        }
    }

    pub fn start_time(&self) -> f32 {
        self.timestamps.first().copied().unwrap_or(0.0)
    }

    pub fn end_time(&self) -> f32 {
        self.timestamps.last().copied().unwrap_or(0.0)
    }

    pub fn duration(&self) -> f32 {
        self.end_time() - self.start_time()
    }
}

/// A named clip grouping all tracks of one animation.
#[derive(Clone, Debug)]
pub struct AnimationClip {
    pub name: String,
    pub tracks: Vec<AnimationTrack>,
    start_time: f32,
    end_time: f32,
}

impl AnimationClip {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tracks: Vec::new(),
            start_time: f32::MAX,
            end_time: f32::MIN,
        }
    }

    /// Add a track and widen the clip bounds to cover it. Channel bounds only
    /// ever widen the clip, never narrow it.
    pub fn add_track(&mut self, track: AnimationTrack) {
        if !track.timestamps.is_empty() {
            self.start_time = self.start_time.min(track.start_time());
            self.end_time = self.end_time.max(track.end_time());
        }
        self.tracks.push(track);
    }

    /// Zero until a track with keyframes has widened the bounds.
    pub fn start_time(&self) -> f32 {
        if self.start_time > self.end_time { 0.0 } else { self.start_time }
    }

    pub fn end_time(&self) -> f32 {
        if self.start_time > self.end_time { 0.0 } else { self.end_time }
    }

    pub fn duration(&self) -> f32 {
        self.end_time() - self.start_time()
    }
}

//! Pose evaluation and multi-track animation mixing for 2D skeletons.
//!
//! Skeleton data is built in code (or by a loader living elsewhere) and shared through
//! `Arc`. A frame is `AnimationState::update`, `AnimationState::apply`,
//! `Skeleton::update_world_transform`, then `build_draw_list`.

#![forbid(unsafe_code)]

mod config;
mod error;
mod model;
mod render;
mod runtime;

pub use config::*;
pub use error::*;
pub use model::*;
pub use render::*;
pub use runtime::*;

#[cfg(test)]
mod test_support;


#[cfg(test)]
mod config_tests;

//! Mesh processing algorithms.
//!
//! This module contains the stages of control cage recovery:
//!
//! - **Un-subdivision**: topological reversal of Catmull-Clark levels
//! - **Correspondence**: nearest fine vertex for every coarse vertex
//! - **Limit relaxation**: control positions whose limit hits given points
//! - **Cage fitting**: the full pipeline and its quality measure
//! - **Subdivision**: forward Catmull-Clark, used to check a fitted cage

pub mod cage;
pub mod correspond;
pub mod limit;
pub mod subdivide;
pub mod unsubdivide;

mod progress;

pub use progress::Progress;

//! Pure Rust decoder for Havok packfile (`.hkx`) scene data (unofficial).
//!
//! The decoder is IO-free: [`HavokFile::from_bytes`] takes an in-memory byte
//! slice, resolves the file's pointer fixups, walks the virtual-fixup table to
//! discover typed root objects, and exposes them through an address-keyed
//! query API. Skeletons, spline-compressed animations, animation bindings and
//! containers, rigid bodies and the collision shape hierarchy are decoded;
//! rendering and physics simulation are out of scope for this crate.
//!
//! Decoding is all-or-nothing: a structurally invalid file fails fast with a
//! descriptive [`Error`] rather than returning partial results. Two
//! irregularities are tolerated by design: class names the decoder does not
//! know are skipped with a warning, and pointer-shaped fields without a
//! recorded fixup read as null.

#![forbid(unsafe_code)]

mod animation;
mod bitstream;
mod error;
mod model;
mod nurbs;
mod packfile;
mod physics;
mod skeleton;

pub use bitstream::*;
pub use error::*;
pub use model::*;
pub use nurbs::*;
pub use packfile::{HavokFile, PackfileVersion, Section};




#[cfg(test)]
mod animation_tests;

#[cfg(test)]
mod physics_tests;

//! Flint Core - Foundational types for the Flint animation graph evaluator
//!
//! This crate provides the small set of math and error types shared by the
//! graph evaluator:
//! - `Vec3` / `Quat` / `mat4_mul` - spatial primitives
//! - Error types and Result alias
//! - Pure spline math used by target-warp path generation

mod error;
mod types;

pub mod spline;

pub use error::{FlintError, Result};
pub use types::{mat4_mul, Quat, Vec3, IDENTITY_4X4};

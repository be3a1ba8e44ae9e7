//! # strand-core
//!
//! Substrate-neutral building blocks of the strand transform engine.
//!
//! This crate provides:
//! - [`Shape`] / [`Layout`] — extents, signed strides, offset and storage order
//! - [`Element`] / [`DType`] — the float types engines operate on
//! - [`TransformOp`] — the opcode catalogue and its per-element math
//! - [`special`] — whole-array routines (softmax family, arg-max, im2col)
//! - [`concat`] — concatenation planning
//! - [`Backend`] trait — the interface the host and grid substrates implement
//! - [`ExecConfig`] — engine tuning knobs
//!
//! Both substrates compute through the same functions here, which is what
//! makes their output bit-identical.

pub mod backend;
pub mod concat;
pub mod config;
pub mod dtype;
pub mod error;
pub mod layout;
pub mod shape;
pub mod special;
pub mod transform;

pub use backend::{Backend, BackendBuffer};
pub use concat::{ConcatPart, ConcatPlan, ConcatStrategy};
pub use config::ExecConfig;
pub use dtype::{DType, Element};
pub use error::{Error, Result};
pub use layout::{Layout, Order, TadSet, MAX_RANK};
pub use shape::Shape;
pub use special::{SpecialKind, SpecialPlan};
pub use transform::{resolve, Dispatch, Transform, TransformOp};

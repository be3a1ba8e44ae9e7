//! # strand
//!
//! Elementwise transform execution over strided N-dimensional arrays.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use strand::prelude::*;
//!
//! let cpu = CpuBackend::default();
//! let src = cpu.upload(&[-2.0f32, 3.5, 0.0]).unwrap();
//! let mut dst = cpu.zeros::<f32>(3).unwrap();
//! let op = TransformOp::Abs.opcode();
//! cpu.transform_linear(op, &src, 1, &mut dst, 1, &[], 3).unwrap();
//! assert_eq!(cpu.download(&dst).unwrap(), vec![2.0, 3.5, 0.0]);
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `strand-core` | Shape, Layout, Element, opcode catalogue, special routines, concat planning, Backend trait |
//! | `strand-cpu` | Host substrate: linear, N-d, indexed and concat engines on rayon |
//! | `strand-grid` | Cooperative grid substrate: thread-groups, barriers, launch-scoped contexts |
//!
//! Both substrates implement [`Backend`] and produce bit-identical results.

/// Re-export core types.
pub use strand_core::{
    backend::{Backend, BackendBuffer},
    concat::{ConcatPart, ConcatPlan, ConcatStrategy},
    special::{SpecialKind, SpecialPlan},
    transform::{resolve, Dispatch, Transform, TransformOp},
    DType, Element, Error, ExecConfig, Layout, Order, Result, Shape, TadSet, MAX_RANK,
};

/// Planning and layout modules, for callers driving the engines directly.
pub use strand_core::{concat, layout, special};

/// Re-export the per-operation types used with the generic engines.
pub mod ops {
    pub use strand_core::transform::ops::*;
}

/// Re-export the host substrate.
pub use strand_cpu::CpuBackend;

/// Re-export the grid substrate.
pub use strand_grid::{DeviceBuffer, GridDevice, LaunchConfig};

/// Host engines over plain slices.
pub mod cpu {
    pub use strand_cpu::{concat, indexed, linear, nd, special};
}

/// Grid launch primitives and kernels.
pub mod grid {
    pub use strand_grid::*;
}

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::{
        Backend, CpuBackend, Dispatch, Element, Error, ExecConfig, GridDevice, Layout, Order,
        Result, Shape, TransformOp,
    };
}

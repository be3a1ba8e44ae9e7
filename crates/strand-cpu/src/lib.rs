// CPU Backend — host substrate for strand
//
// Buffers are plain `Vec<T>`. Each transform entry point resolves the
// opcode once, then dispatches to a monomorphic engine through
// `dispatch_transform!`:
//
//   linear   — strided 1-D passes (rayon above the parallel threshold)
//   nd       — arbitrary layouts: fast linear path or coordinate walk
//   indexed  — gather/transform/scatter through index arrays
//   special  — whole-array routines (softmax family, arg-max, im2col)
//   concat   — planned slab copies built on the N-d engine
//
// The engine modules are public so callers holding plain slices can skip
// the Backend trait and its Vec buffers.

pub mod concat;
pub mod indexed;
pub mod linear;
pub mod nd;
pub mod special;

use strand_core::transform::resolve;
use strand_core::{dispatch_transform, Backend, Dispatch, Element, ExecConfig, Layout, Result};

/// The host substrate.
#[derive(Debug, Clone, Default)]
pub struct CpuBackend {
    config: ExecConfig,
}

impl CpuBackend {
    pub fn new(config: ExecConfig) -> Result<Self> {
        config.validate()?;
        Ok(CpuBackend { config })
    }
}

impl Backend for CpuBackend {
    type Buffer<T: Element> = Vec<T>;

    fn name(&self) -> String {
        "cpu".to_string()
    }

    fn config(&self) -> &ExecConfig {
        &self.config
    }

    fn upload<T: Element>(&self, data: &[T]) -> Result<Vec<T>> {
        Ok(data.to_vec())
    }

    fn zeros<T: Element>(&self, len: usize) -> Result<Vec<T>> {
        Ok(vec![T::zero(); len])
    }

    fn download<T: Element>(&self, buf: &Vec<T>) -> Result<Vec<T>> {
        Ok(buf.clone())
    }

    fn transform_linear<T: Element>(
        &self,
        opcode: i32,
        src: &Vec<T>,
        src_stride: usize,
        dst: &mut Vec<T>,
        dst_stride: usize,
        params: &[T],
        n: usize,
    ) -> Result<Dispatch> {
        let Some(op) = resolve(opcode) else {
            return Ok(Dispatch::UnknownOpcode(opcode));
        };
        dispatch_transform!(op, O => linear::exec::<O, T>(
            src,
            src_stride,
            dst,
            dst_stride,
            params,
            n,
            &self.config,
        ))?;
        Ok(Dispatch::Applied)
    }

    fn transform<T: Element>(
        &self,
        opcode: i32,
        src: &Vec<T>,
        src_layout: &Layout,
        dst: &mut Vec<T>,
        dst_layout: &Layout,
        params: &[T],
    ) -> Result<Dispatch> {
        let Some(op) = resolve(opcode) else {
            return Ok(Dispatch::UnknownOpcode(opcode));
        };
        dispatch_transform!(op, O => nd::exec::<O, T>(
            src,
            src_layout,
            dst,
            dst_layout,
            params,
            &self.config,
        ))?;
        Ok(Dispatch::Applied)
    }

    fn transform_indexed<T: Element>(
        &self,
        opcode: i32,
        src: &Vec<T>,
        src_indexes: &[usize],
        dst: &mut Vec<T>,
        dst_indexes: &[usize],
        params: &[T],
    ) -> Result<Dispatch> {
        let Some(op) = resolve(opcode) else {
            return Ok(Dispatch::UnknownOpcode(opcode));
        };
        dispatch_transform!(op, O => indexed::exec::<O, T>(
            src,
            src_indexes,
            dst,
            dst_indexes,
            params,
            &self.config,
        ))?;
        Ok(Dispatch::Applied)
    }

    fn concat<T: Element>(
        &self,
        dim: usize,
        inputs: &[(&Vec<T>, &Layout)],
        dst: &mut Vec<T>,
        dst_layout: &Layout,
    ) -> Result<()> {
        let slices: Vec<(&[T], &Layout)> = inputs.iter().map(|(b, l)| (b.as_slice(), *l)).collect();
        concat::exec(dim, &slices, dst, dst_layout, &self.config)
    }
}

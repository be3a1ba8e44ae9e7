// Grid Backend — cooperative-parallel accelerator substrate for strand
//
// This crate executes the transform and concatenation engines on a software
// grid that reproduces the accelerator execution model: a launch is a grid
// of thread-groups, lanes within a group synchronise through a barrier and
// share a scratch region and a per-launch execution context.
//
// ARCHITECTURE:
// - GridDevice owns the launch configuration and validates every call on
//   the host side before launching, exactly as the host substrate does
// - DeviceBuffer<T> is device memory: atomic cells lanes write concurrently
// - Kernels (kernels.rs, concat.rs) are plain functions over a `Lane`
// - Opcodes dispatch through `strand_core::dispatch_transform!`, the same
//   table the host uses, so both substrates run identical per-element code
//
// USAGE:
//   let device = GridDevice::new(ExecConfig::default())?;
//   let src = device.htod_copy(&[1.0f32, -2.0])?;
//   let mut dst = device.alloc_zeros::<f32>(2)?;
//   device.transform_linear(0, &src, 1, &mut dst, 1, &[], 2)?;

pub mod concat;
pub mod context;
pub mod kernels;
pub mod launch;
pub mod memory;

pub use context::{ExecContext, Path};
pub use launch::{launch, Lane, LaunchConfig};
pub use memory::{DeviceBuffer, SharedMemory};

use strand_core::layout::linear_strides;
use strand_core::special::{self, SpecialKind, SpecialPlan};
use strand_core::transform::resolve;
use strand_core::{
    concat as planner, dispatch_transform, Backend, Dispatch, Element, Error, ExecConfig, Layout,
    Order, Result, Transform,
};

/// The grid substrate.
#[derive(Debug, Clone, Default)]
pub struct GridDevice {
    config: ExecConfig,
}

impl GridDevice {
    pub fn new(config: ExecConfig) -> Result<Self> {
        config.validate()?;
        Ok(GridDevice { config })
    }

    /// Copy host data to a new device buffer.
    pub fn htod_copy<T: Element>(&self, data: &[T]) -> Result<DeviceBuffer<T>> {
        Ok(DeviceBuffer::from_host(data))
    }

    /// Allocate a zero-filled device buffer.
    pub fn alloc_zeros<T: Element>(&self, len: usize) -> Result<DeviceBuffer<T>> {
        Ok(DeviceBuffer::zeroed(len))
    }

    /// Copy a device buffer back to the host.
    pub fn dtoh_vec<T: Element>(&self, buf: &DeviceBuffer<T>) -> Result<Vec<T>> {
        Ok(buf.to_host())
    }

    #[allow(clippy::too_many_arguments)]
    fn linear<O: Transform, T: Element>(
        &self,
        src: &DeviceBuffer<T>,
        ss: usize,
        dst: &DeviceBuffer<T>,
        ds: usize,
        params: &[T],
        n: usize,
    ) -> Result<()> {
        if ss == 0 || ds == 0 {
            return Err(Error::ZeroStride);
        }
        O::OP.check_params(params.len())?;
        let sl = Layout::new(n, vec![ss as isize], 0, Order::C)?;
        let dl = Layout::new(n, vec![ds as isize], 0, Order::C)?;
        sl.check_buffer(src.len())?;
        dl.check_buffer(dst.len())?;
        if n == 0 {
            return Ok(());
        }
        if let Some(kind) = O::SPECIAL {
            return self.special(kind, src, &sl, dst, &dl, params);
        }
        let cfg = LaunchConfig::for_num_elems(&self.config, n);
        launch::<(), _>(cfg, |lane| {
            kernels::transform_linear::<O, T>(lane, src, ss, dst, ds, params, n)
        });
        Ok(())
    }

    fn strided<O: Transform, T: Element>(
        &self,
        src: &DeviceBuffer<T>,
        src_layout: &Layout,
        dst: &DeviceBuffer<T>,
        dst_layout: &Layout,
        params: &[T],
    ) -> Result<()> {
        if src_layout.shape() != dst_layout.shape() {
            return Err(Error::ShapeMismatch {
                expected: src_layout.shape().clone(),
                got: dst_layout.shape().clone(),
            });
        }
        src_layout.check_buffer(src.len())?;
        dst_layout.check_buffer(dst.len())?;
        O::OP.check_params(params.len())?;
        let n = src_layout.elem_count();
        if src_layout.rank() == 0 || n == 0 {
            return Ok(());
        }
        if let Some(kind) = O::SPECIAL {
            return self.special(kind, src, src_layout, dst, dst_layout, params);
        }
        tracing::debug!(
            op = O::OP.name(),
            n,
            fast = linear_strides(src_layout, dst_layout).is_some(),
            "grid transform"
        );
        let cfg = LaunchConfig::for_num_elems(&self.config, n);
        launch::<ExecContext, _>(cfg, |lane| {
            kernels::transform_strided::<O, T>(lane, src, src_layout, dst, dst_layout, params)
        });
        Ok(())
    }

    fn indexed<O: Transform, T: Element>(
        &self,
        src: &DeviceBuffer<T>,
        src_indexes: &[usize],
        dst: &DeviceBuffer<T>,
        dst_indexes: &[usize],
        params: &[T],
    ) -> Result<()> {
        if O::REQUIRES_SPECIAL {
            return Err(Error::NotIndexable { op: O::OP.name() });
        }
        O::OP.check_params(params.len())?;
        if src_indexes.len() != dst_indexes.len() {
            return Err(Error::IndexLengthMismatch {
                src: src_indexes.len(),
                dst: dst_indexes.len(),
            });
        }
        for (indexes, len) in [(src_indexes, src.len()), (dst_indexes, dst.len())] {
            if let Some(position) = indexes.iter().position(|&i| i >= len) {
                return Err(Error::IndexOutOfBounds {
                    index: indexes[position],
                    position,
                    len,
                });
            }
        }
        let n = src_indexes.len();
        if n == 0 {
            return Ok(());
        }
        // The last position naming a destination is the one that writes it.
        let mut last = vec![usize::MAX; dst.len()];
        for (i, &d) in dst_indexes.iter().enumerate() {
            last[d] = i;
        }
        let winners: Vec<bool> = dst_indexes
            .iter()
            .enumerate()
            .map(|(i, &d)| last[d] == i)
            .collect();
        let cfg = LaunchConfig::for_num_elems(&self.config, n);
        launch::<(), _>(cfg, |lane| {
            kernels::transform_indexed::<O, T>(lane, src, src_indexes, dst, dst_indexes, &winners, params)
        });
        Ok(())
    }

    fn special<T: Element>(
        &self,
        kind: SpecialKind,
        src: &DeviceBuffer<T>,
        src_layout: &Layout,
        dst: &DeviceBuffer<T>,
        dst_layout: &Layout,
        params: &[T],
    ) -> Result<()> {
        src_layout.check_buffer(src.len())?;
        dst_layout.check_buffer(dst.len())?;
        match special::plan(kind, src_layout, dst_layout, params)? {
            SpecialPlan::Segments {
                kind,
                src: src_tads,
                dst: dst_tads,
            } => {
                tracing::debug!(op = kind.name(), segments = src_tads.len(), "grid special segments");
                let cfg = LaunchConfig {
                    grid_dim: self.config.grid_dim.min(src_tads.len()).max(1),
                    block_dim: self.config.block_dim,
                    shared_words: kernels::SEGMENT_SHARED_WORDS,
                };
                launch::<(), _>(cfg, |lane| {
                    kernels::special_segments(lane, kind, src, &src_tads, dst, &dst_tads)
                });
            }
            SpecialPlan::Im2col(geom) => {
                let cfg = LaunchConfig::for_num_elems(&self.config, dst_layout.elem_count());
                launch::<(), _>(cfg, |lane| {
                    kernels::im2col(lane, &geom, src, src_layout, dst, dst_layout)
                });
            }
            SpecialPlan::Col2Im(geom) => {
                let cfg = LaunchConfig::for_num_elems(&self.config, dst_layout.elem_count());
                launch::<(), _>(cfg, |lane| {
                    kernels::col2im(lane, &geom, src, src_layout, dst, dst_layout)
                });
            }
        }
        Ok(())
    }
}

impl Backend for GridDevice {
    type Buffer<T: Element> = DeviceBuffer<T>;

    fn name(&self) -> String {
        format!("grid:{}x{}", self.config.grid_dim, self.config.block_dim)
    }

    fn config(&self) -> &ExecConfig {
        &self.config
    }

    fn upload<T: Element>(&self, data: &[T]) -> Result<DeviceBuffer<T>> {
        self.htod_copy(data)
    }

    fn zeros<T: Element>(&self, len: usize) -> Result<DeviceBuffer<T>> {
        self.alloc_zeros(len)
    }

    fn download<T: Element>(&self, buf: &DeviceBuffer<T>) -> Result<Vec<T>> {
        self.dtoh_vec(buf)
    }

    fn transform_linear<T: Element>(
        &self,
        opcode: i32,
        src: &DeviceBuffer<T>,
        src_stride: usize,
        dst: &mut DeviceBuffer<T>,
        dst_stride: usize,
        params: &[T],
        n: usize,
    ) -> Result<Dispatch> {
        let Some(op) = resolve(opcode) else {
            return Ok(Dispatch::UnknownOpcode(opcode));
        };
        dispatch_transform!(op, O => self.linear::<O, T>(src, src_stride, dst, dst_stride, params, n))?;
        Ok(Dispatch::Applied)
    }

    fn transform<T: Element>(
        &self,
        opcode: i32,
        src: &DeviceBuffer<T>,
        src_layout: &Layout,
        dst: &mut DeviceBuffer<T>,
        dst_layout: &Layout,
        params: &[T],
    ) -> Result<Dispatch> {
        let Some(op) = resolve(opcode) else {
            return Ok(Dispatch::UnknownOpcode(opcode));
        };
        dispatch_transform!(op, O => self.strided::<O, T>(src, src_layout, dst, dst_layout, params))?;
        Ok(Dispatch::Applied)
    }

    fn transform_indexed<T: Element>(
        &self,
        opcode: i32,
        src: &DeviceBuffer<T>,
        src_indexes: &[usize],
        dst: &mut DeviceBuffer<T>,
        dst_indexes: &[usize],
        params: &[T],
    ) -> Result<Dispatch> {
        let Some(op) = resolve(opcode) else {
            return Ok(Dispatch::UnknownOpcode(opcode));
        };
        dispatch_transform!(op, O => self.indexed::<O, T>(src, src_indexes, dst, dst_indexes, params))?;
        Ok(Dispatch::Applied)
    }

    fn concat<T: Element>(
        &self,
        dim: usize,
        inputs: &[(&DeviceBuffer<T>, &Layout)],
        dst: &mut DeviceBuffer<T>,
        dst_layout: &Layout,
    ) -> Result<()> {
        let layouts: Vec<&Layout> = inputs.iter().map(|(_, l)| *l).collect();
        let plan = planner::plan(dim, &layouts, dst_layout)?;
        if plan.is_empty() {
            return Ok(());
        }
        dst_layout.check_buffer(dst.len())?;
        for (part, (buf, _)) in plan.parts.iter().zip(inputs) {
            part.src.check_buffer(buf.len())?;
            part.dst.check_buffer(dst.len())?;
        }
        tracing::debug!(
            strategy = ?plan.strategy,
            sources = plan.parts.len(),
            "grid concat"
        );
        let sources: Vec<&DeviceBuffer<T>> = inputs.iter().map(|(b, _)| *b).collect();
        let dst: &DeviceBuffer<T> = dst;
        let cfg = LaunchConfig {
            grid_dim: self.config.grid_dim.min(plan.parts.len()).max(1),
            block_dim: self.config.block_dim,
            shared_words: 0,
        };
        launch::<Vec<ExecContext>, _>(cfg, |lane| concat::kernel(lane, &plan, &sources, dst));
        Ok(())
    }
}

use std::fmt;

use crate::config::ExecConfig;
use crate::dtype::Element;
use crate::error::Result;
use crate::layout::Layout;
use crate::transform::Dispatch;

// Backend — Abstraction over execution substrates (host, grid)
//
// Every substrate implements the same five entry points: the three
// transform engines (linear, N-d, index-indirected), concatenation, and the
// buffer transfers that move host data in and out of its memory.
//
// Buffers are an associated type generic over the element, so the host can
// use plain `Vec<T>` while the grid keeps its own device allocation. The
// parity tests are written once against this trait and run on both.
//
// Transform entry points take the integer opcode. An opcode outside the
// catalogue is not an error: the call returns `Dispatch::UnknownOpcode`
// and leaves the destination untouched.

/// A buffer of elements owned by a substrate.
pub trait BackendBuffer: Send + Sync {
    /// Number of elements the buffer holds.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Element> BackendBuffer for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// The interface every execution substrate implements.
pub trait Backend: Clone + Send + Sync + fmt::Debug + 'static {
    /// Storage for elements of type `T`.
    type Buffer<T: Element>: BackendBuffer;

    /// A human-readable name for this substrate (e.g., "cpu", "grid").
    fn name(&self) -> String;

    fn config(&self) -> &ExecConfig;

    //  Transfers

    /// Copy host data into a new buffer.
    fn upload<T: Element>(&self, data: &[T]) -> Result<Self::Buffer<T>>;

    /// Allocate a zero-filled buffer of `len` elements.
    fn zeros<T: Element>(&self, len: usize) -> Result<Self::Buffer<T>>;

    /// Copy a buffer back to the host.
    fn download<T: Element>(&self, buf: &Self::Buffer<T>) -> Result<Vec<T>>;

    //  Transform engines

    /// `dst[i * dst_stride] = op(src[i * src_stride])` for `i` in `0..n`.
    #[allow(clippy::too_many_arguments)]
    fn transform_linear<T: Element>(
        &self,
        opcode: i32,
        src: &Self::Buffer<T>,
        src_stride: usize,
        dst: &mut Self::Buffer<T>,
        dst_stride: usize,
        params: &[T],
        n: usize,
    ) -> Result<Dispatch>;

    /// Apply `opcode` to every element of `src` (as described by
    /// `src_layout`), writing the same logical position of `dst`.
    fn transform<T: Element>(
        &self,
        opcode: i32,
        src: &Self::Buffer<T>,
        src_layout: &Layout,
        dst: &mut Self::Buffer<T>,
        dst_layout: &Layout,
        params: &[T],
    ) -> Result<Dispatch>;

    /// `dst[dst_indexes[i]] = op(src[src_indexes[i]])`.
    fn transform_indexed<T: Element>(
        &self,
        opcode: i32,
        src: &Self::Buffer<T>,
        src_indexes: &[usize],
        dst: &mut Self::Buffer<T>,
        dst_indexes: &[usize],
        params: &[T],
    ) -> Result<Dispatch>;

    //  Concatenation

    /// Stack `inputs` along `dim` into `dst`.
    fn concat<T: Element>(
        &self,
        dim: usize,
        inputs: &[(&Self::Buffer<T>, &Layout)],
        dst: &mut Self::Buffer<T>,
        dst_layout: &Layout,
    ) -> Result<()>;
}

// Grid kernels
//
// Each kernel is the body one lane runs. All of them use grid-stride loops
// (start at the lane's global id, advance by the total lane count), so any
// launch shape covers any problem size. Per-element math comes from the
// same `Transform` types and `strand_core::special` functions the host
// uses, which is what keeps the two substrates bit-identical.
//
// Segment kernels hand whole segments to thread-groups instead: lane 0
// reduces the segment into shared memory, the barrier publishes the stats,
// and the group's lanes write the segment's outputs.

use strand_core::special::{self, ConvGeometry, SegmentStats, SpecialKind};
use strand_core::{Element, Layout, Order, TadSet, Transform, MAX_RANK};

use crate::context::ExecContext;
use crate::launch::Lane;
use crate::memory::DeviceBuffer;

/// Shared words used by the segment kernel: max, sum, argmax.
pub const SEGMENT_SHARED_WORDS: usize = 3;

const SHM_MAX: usize = 0;
const SHM_SUM: usize = 1;
const SHM_ARGMAX: usize = 2;

#[inline]
fn grid_stride<C>(lane: &Lane<'_, C>, n: usize) -> impl Iterator<Item = usize> {
    (lane.global_id()..n).step_by(lane.total_lanes())
}

#[inline]
fn block_stride<C>(lane: &Lane<'_, C>, n: usize) -> impl Iterator<Item = usize> {
    (lane.thread_idx..n).step_by(lane.block_dim)
}

/// `dst[i * ds] = op(src[i * ss])` for `i` in `0..n`.
#[allow(clippy::too_many_arguments)]
pub fn transform_linear<O: Transform, T: Element>(
    lane: &Lane<'_, ()>,
    src: &DeviceBuffer<T>,
    ss: usize,
    dst: &DeviceBuffer<T>,
    ds: usize,
    params: &[T],
    n: usize,
) {
    for i in grid_stride(lane, n) {
        dst.write(i * ds, O::op(src.read(i * ss), params));
    }
}

/// Layout-aware transform; the path is chosen once per group in the
/// shared execution context.
pub fn transform_strided<O: Transform, T: Element>(
    lane: &Lane<'_, ExecContext>,
    src: &DeviceBuffer<T>,
    src_layout: &Layout,
    dst: &DeviceBuffer<T>,
    dst_layout: &Layout,
    params: &[T],
) {
    let ctx = lane.shared_context(|| ExecContext::new(src_layout, dst_layout));
    for i in grid_stride(lane, ctx.len) {
        let (s, d) = ctx.offsets(i);
        dst.write(d, O::op(src.read(s), params));
    }
}

/// Index-indirected transform. Only positions flagged in `winners` write,
/// so duplicate destinations resolve to the last position like on the host.
#[allow(clippy::too_many_arguments)]
pub fn transform_indexed<O: Transform, T: Element>(
    lane: &Lane<'_, ()>,
    src: &DeviceBuffer<T>,
    src_indexes: &[usize],
    dst: &DeviceBuffer<T>,
    dst_indexes: &[usize],
    winners: &[bool],
    params: &[T],
) {
    for i in grid_stride(lane, src_indexes.len()) {
        if winners[i] {
            dst.write(dst_indexes[i], O::op(src.read(src_indexes[i]), params));
        }
    }
}

/// Segment routines (softmax family, arg-max). Segments are distributed
/// over thread-groups; needs `SEGMENT_SHARED_WORDS` of shared memory.
pub fn special_segments<T: Element>(
    lane: &Lane<'_, ()>,
    kind: SpecialKind,
    src: &DeviceBuffer<T>,
    src_tads: &TadSet,
    dst: &DeviceBuffer<T>,
    dst_tads: &TadSet,
) {
    let len = src_tads.tad_len();
    let shm = lane.shared();
    for t in (lane.block_idx..src_tads.len()).step_by(lane.grid_dim) {
        if lane.thread_idx == 0 {
            let stats = special::segment_stats(kind, len, |j| src.read(src_tads.element_offset(t, j)));
            shm.store_elem(SHM_MAX, stats.max);
            shm.store_elem(SHM_SUM, stats.sum);
            shm.store(SHM_ARGMAX, stats.argmax as u64);
        }
        lane.sync_threads();
        let stats = SegmentStats {
            max: shm.load_elem::<T>(SHM_MAX),
            sum: shm.load_elem::<T>(SHM_SUM),
            argmax: shm.load(SHM_ARGMAX) as usize,
        };
        for j in block_stride(lane, len) {
            let x = src.read(src_tads.element_offset(t, j));
            dst.write(dst_tads.element_offset(t, j), special::segment_apply(kind, x, j, &stats));
        }
        // Keep lane 0 from overwriting the stats while the group still reads.
        lane.sync_threads();
    }
}

fn for_each_coord<C>(lane: &Lane<'_, C>, layout: &Layout, mut f: impl FnMut(&[usize])) {
    let rank = layout.rank();
    let mut coords = [0usize; MAX_RANK];
    for i in grid_stride(lane, layout.elem_count()) {
        layout.coords_of(i, Order::C, &mut coords[..rank]);
        f(&coords[..rank]);
    }
}

pub fn im2col<T: Element>(
    lane: &Lane<'_, ()>,
    geom: &ConvGeometry,
    src: &DeviceBuffer<T>,
    src_layout: &Layout,
    dst: &DeviceBuffer<T>,
    dst_layout: &Layout,
) {
    for_each_coord(lane, dst_layout, |col| {
        let v = geom.im2col_value(col, |img: &[usize]| src.read(src_layout.flat_index(img)));
        dst.write(dst_layout.flat_index(col), v);
    });
}

pub fn col2im<T: Element>(
    lane: &Lane<'_, ()>,
    geom: &ConvGeometry,
    src: &DeviceBuffer<T>,
    src_layout: &Layout,
    dst: &DeviceBuffer<T>,
    dst_layout: &Layout,
) {
    for_each_coord(lane, dst_layout, |img| {
        let v = geom.col2im_value(img, |col: &[usize]| src.read(src_layout.flat_index(col)));
        dst.write(dst_layout.flat_index(img), v);
    });
}

// ExecContext — decoded descriptors for one launch
//
// Built by lane 0 of each thread-group from the two layouts and published
// through the group barrier. Lanes then only read fixed-size arrays, so the
// per-element work is index arithmetic with no allocation.

use strand_core::layout::{self, Layout};
use strand_core::{Order, MAX_RANK};

/// How lanes walk the two arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Path {
    /// One linear pass with the element-wise strides of both arrays.
    Linear { src_stride: usize, dst_stride: usize },
    /// Element index → coordinates in source order → both offsets.
    General,
}

#[derive(Debug, Clone)]
pub struct ExecContext {
    pub len: usize,
    pub rank: usize,
    pub dims: [usize; MAX_RANK],
    pub src_strides: [isize; MAX_RANK],
    pub dst_strides: [isize; MAX_RANK],
    pub src_offset: usize,
    pub dst_offset: usize,
    pub src_ews: Option<usize>,
    pub dst_ews: Option<usize>,
    pub src_order: Order,
    pub dst_order: Order,
    pub path: Path,
}

impl ExecContext {
    /// Decode a pair of equally shaped layouts with rank at most `MAX_RANK`.
    pub fn new(src: &Layout, dst: &Layout) -> Self {
        let rank = src.rank().min(MAX_RANK);
        let mut dims = [0usize; MAX_RANK];
        let mut src_strides = [0isize; MAX_RANK];
        let mut dst_strides = [0isize; MAX_RANK];
        dims[..rank].copy_from_slice(&src.dims()[..rank]);
        src_strides[..rank].copy_from_slice(&src.strides()[..rank]);
        dst_strides[..rank].copy_from_slice(&dst.strides()[..rank]);
        let path = match layout::linear_strides(src, dst) {
            Some((src_stride, dst_stride)) => Path::Linear {
                src_stride,
                dst_stride,
            },
            None => Path::General,
        };
        ExecContext {
            len: src.elem_count(),
            rank,
            dims,
            src_strides,
            dst_strides,
            src_offset: src.offset(),
            dst_offset: dst.offset(),
            src_ews: src.element_wise_stride(),
            dst_ews: dst.element_wise_stride(),
            src_order: src.order(),
            dst_order: dst.order(),
            path,
        }
    }

    /// Source and destination offsets of element `i`.
    #[inline]
    pub fn offsets(&self, i: usize) -> (usize, usize) {
        match self.path {
            Path::Linear {
                src_stride,
                dst_stride,
            } => (self.src_offset + i * src_stride, self.dst_offset + i * dst_stride),
            Path::General => {
                let r = self.rank;
                let mut coords = [0usize; MAX_RANK];
                layout::coords_of(&self.dims[..r], i, self.src_order, &mut coords[..r]);
                let mut s = self.src_offset as isize;
                let mut d = self.dst_offset as isize;
                let strides = self.src_strides[..r].iter().zip(&self.dst_strides[..r]);
                for (&c, (&ss, &ds)) in coords[..r].iter().zip(strides) {
                    s += c as isize * ss;
                    d += c as isize * ds;
                }
                (s as usize, d as usize)
            }
        }
    }
}

use crate::error::{Error, Result};
use crate::layout::{Layout, Order};
use crate::shape::Shape;

// Concatenation planning
//
// A concat job copies every source into its own slab of the destination,
// stacked along `dim`. Planning is shared by both substrates and decides two
// things up front:
//
//   1. Whether the job is valid. Ranks, off-axis extents and the along-axis
//      sum are all checked before anything is written.
//   2. How each source is copied. Scalar, row-stack and column-stack jobs
//      collapse to one flat strided copy per source; everything else copies
//      through an N-d view of the destination carved with `Layout::narrow`.
//
// The resulting `ConcatPart`s pair a source view with a destination view of
// the same shape, so a substrate only needs its N-d identity copy to run
// any strategy.

/// How a concatenation is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcatStrategy {
    /// Every source holds one element; the destination is a vector of them.
    Scalar,
    /// Vectors stacked as the rows of a rank-2 destination.
    RowStack,
    /// Vectors laid end to end in a vector destination.
    ColumnStack,
    /// Slabs along an arbitrary dimension.
    General,
}

/// One source's copy: `src` and `dst` have the same shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatPart {
    pub src: Layout,
    pub dst: Layout,
    /// Position of the slab along the concatenation axis.
    pub start: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatPlan {
    pub strategy: ConcatStrategy,
    pub parts: Vec<ConcatPart>,
}

impl ConcatPlan {
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Elements written in total.
    pub fn elem_count(&self) -> usize {
        self.parts.iter().map(|p| p.src.elem_count()).sum()
    }
}

/// One-dimensional view over the elements of a vector(-like) layout.
fn flat_view(layout: &Layout) -> Result<Layout> {
    let stride = layout.vector_stride().unwrap_or(1);
    Layout::new(
        Shape::from(layout.elem_count()),
        vec![stride],
        layout.offset(),
        Order::C,
    )
}

fn flat_slab(base: isize, stride: isize, len: usize) -> Result<Layout> {
    if base < 0 {
        return Err(Error::NegativeOffset { offset: base });
    }
    Layout::new(Shape::from(len), vec![stride], base as usize, Order::C)
}

fn mismatch(source_index: usize, src: &Layout, dst: &Layout, dim: usize) -> Error {
    Error::ConcatShapeMismatch {
        source_index,
        expected: dst.shape().clone(),
        got: src.shape().clone(),
        dim,
    }
}

/// A source of the destination's rank must match it off the axis.
fn check_off_axis(i: usize, dim: usize, src: &Layout, dst: &Layout) -> Result<()> {
    let ok = src
        .dims()
        .iter()
        .zip(dst.dims())
        .enumerate()
        .all(|(d, (a, b))| d == dim || a == b);
    if ok {
        Ok(())
    } else {
        Err(mismatch(i, src, dst, dim))
    }
}

/// Check ranks, off-axis extents and the axis sum.
///
/// No sources are valid only for a destination that is empty along `dim`.
pub fn validate(dim: usize, sources: &[&Layout], dst: &Layout) -> Result<()> {
    let rank = dst.rank();
    if dim >= rank {
        return Err(Error::DimOutOfRange { dim, rank });
    }
    let mut along = 0usize;
    for (i, src) in sources.iter().enumerate() {
        if src.rank() != rank {
            return Err(mismatch(i, src, dst, dim));
        }
        check_off_axis(i, dim, src, dst)?;
        along += src.dims()[dim];
    }
    if along != dst.dims()[dim] {
        return Err(match sources.last() {
            Some(last) => mismatch(sources.len() - 1, last, dst, dim),
            None => Error::ConcatShapeMismatch {
                source_index: 0,
                expected: dst.shape().clone(),
                got: Shape::default(),
                dim,
            },
        });
    }
    Ok(())
}

/// Full validation when every source has the destination's rank, otherwise
/// the off-axis check for those that do.
fn check_flat_sources(dim: usize, sources: &[&Layout], dst: &Layout) -> Result<bool> {
    if sources.iter().all(|s| s.rank() == dst.rank()) {
        validate(dim, sources, dst)?;
        return Ok(true);
    }
    for (i, src) in sources.iter().enumerate() {
        if src.rank() == dst.rank() {
            check_off_axis(i, dim, src, dst)?;
        }
    }
    Ok(false)
}

/// A vector that can fill one row: rank 1, or rank 2 shaped `[1, L]`.
fn is_row(src: &Layout) -> bool {
    src.is_vector() && (src.rank() != 2 || src.dims()[0] == 1)
}

/// Decide how `sources` are concatenated into `dst` along `dim`.
///
/// Zero sources give an empty plan.
pub fn plan(dim: usize, sources: &[&Layout], dst: &Layout) -> Result<ConcatPlan> {
    if sources.is_empty() {
        return Ok(ConcatPlan {
            strategy: ConcatStrategy::General,
            parts: Vec::new(),
        });
    }
    dst.check_rank()?;
    for src in sources {
        src.check_rank()?;
    }
    let rank = dst.rank();
    if dim >= rank {
        return Err(Error::DimOutOfRange { dim, rank });
    }
    let k = sources.len();
    let all_vectors = sources.iter().all(|s| s.is_vector());

    if sources.iter().all(|s| s.elem_count() == 1) && dst.is_vector() && dst.elem_count() == k {
        check_flat_sources(dim, sources, dst)?;
        let stride = dst.vector_stride().unwrap_or(1);
        let parts = sources
            .iter()
            .enumerate()
            .map(|(i, src)| {
                Ok(ConcatPart {
                    src: flat_view(src)?,
                    dst: flat_slab(dst.offset() as isize + i as isize * stride, stride, 1)?,
                    start: i,
                })
            })
            .collect::<Result<_>>()?;
        return Ok(ConcatPlan {
            strategy: ConcatStrategy::Scalar,
            parts,
        });
    }

    if rank == 2 && dim == 0 && dst.dims()[0] == k && sources.iter().all(|s| is_row(s)) {
        let row_len = dst.dims()[1];
        let (row_stride, col_stride) = (dst.strides()[0], dst.strides()[1]);
        let parts = sources
            .iter()
            .enumerate()
            .map(|(i, src)| {
                if src.elem_count() != row_len {
                    return Err(Error::ConcatRowLength {
                        source_index: i,
                        expected: row_len,
                        got: src.elem_count(),
                    });
                }
                Ok(ConcatPart {
                    src: flat_view(src)?,
                    dst: flat_slab(dst.offset() as isize + i as isize * row_stride, col_stride, row_len)?,
                    start: i,
                })
            })
            .collect::<Result<_>>()?;
        return Ok(ConcatPlan {
            strategy: ConcatStrategy::RowStack,
            parts,
        });
    }

    if dst.is_vector() && all_vectors {
        if !check_flat_sources(dim, sources, dst)? {
            let total: usize = sources.iter().map(|s| s.elem_count()).sum();
            if total != dst.elem_count() {
                return Err(mismatch(k - 1, sources[k - 1], dst, dim));
            }
        }
        let stride = dst.vector_stride().unwrap_or(1);
        let mut start = 0usize;
        let mut parts = Vec::with_capacity(k);
        for src in sources {
            let len = src.elem_count();
            parts.push(ConcatPart {
                src: flat_view(src)?,
                dst: flat_slab(dst.offset() as isize + start as isize * stride, stride, len)?,
                start,
            });
            start += len;
        }
        return Ok(ConcatPlan {
            strategy: ConcatStrategy::ColumnStack,
            parts,
        });
    }

    validate(dim, sources, dst)?;
    let mut start = 0usize;
    let mut parts = Vec::with_capacity(k);
    for src in sources {
        let len = src.dims()[dim];
        parts.push(ConcatPart {
            src: (*src).clone(),
            dst: dst.narrow(dim, start, len)?,
            start,
        });
        start += len;
    }
    Ok(ConcatPlan {
        strategy: ConcatStrategy::General,
        parts,
    })
}

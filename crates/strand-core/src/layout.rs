use crate::error::{Error, Result};
use crate::shape::Shape;

// Layout — Array descriptor (shape + strides + offset + storage order)
//
// The Layout decouples the *logical* shape of an array from how its data is
// arranged in a flat buffer. Every engine in strand consumes arrays through
// this descriptor and never copies to make them contiguous.
//
// KEY CONCEPTS:
//
// 1. **Strides**: How many elements to skip in the flat buffer to move one
//    step along each dimension. They are signed: a reversed view has a
//    negative stride and an offset pointing at its last element.
//
// 2. **Order**: The iteration order the descriptor was created for. C order
//    walks the last dimension fastest, F order the first. Two descriptors
//    with the same shape but different orders visit elements in different
//    sequences, so the linear fast path is only valid when they agree.
//
// 3. **Element-wise stride**: A single stride `s` such that element `i` of
//    the array (in its own order) sits at `offset + i * s`. It exists for
//    contiguous arrays and for simple strided views; `None` is the sentinel
//    for everything else (transposed or sliced inner dimensions).
//
// 4. **TADs**: The sub-arrays obtained by fixing every coordinate except a
//    chosen set of dimensions. Whole-dimension operations (softmax per row,
//    arg-max per column) iterate over these.

/// Maximum rank supported by the fixed-size coordinate scratch buffers.
pub const MAX_RANK: usize = 32;

/// Storage-order tag of an array descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Order {
    /// Row-major: the last dimension varies fastest.
    #[default]
    C,
    /// Column-major: the first dimension varies fastest.
    F,
}

/// Layout describes how an array's logical shape maps to flat storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    shape: Shape,
    strides: Vec<isize>,
    /// Offset into the buffer of the element at coordinate [0, 0, ...].
    offset: usize,
    order: Order,
}

impl Layout {
    /// Create a new contiguous row-major layout for the given shape.
    pub fn contiguous(shape: impl Into<Shape>) -> Self {
        Self::with_order(shape, Order::C)
    }

    /// Create a new contiguous column-major layout for the given shape.
    pub fn fortran(shape: impl Into<Shape>) -> Self {
        Self::with_order(shape, Order::F)
    }

    /// Contiguous layout in the requested storage order.
    pub fn with_order(shape: impl Into<Shape>, order: Order) -> Self {
        let shape = shape.into();
        Layout {
            strides: shape.packed_strides(order),
            shape,
            offset: 0,
            order,
        }
    }

    /// Create a layout with explicit strides, offset and order (for views).
    pub fn new(
        shape: impl Into<Shape>,
        strides: Vec<isize>,
        offset: usize,
        order: Order,
    ) -> Result<Self> {
        let shape = shape.into();
        if strides.len() != shape.rank() {
            return Err(Error::RankMismatch {
                expected: shape.rank(),
                got: strides.len(),
            });
        }
        Ok(Layout {
            shape,
            strides,
            offset,
            order,
        })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    pub fn is_vector(&self) -> bool {
        self.shape.is_vector()
    }

    /// The single stride valid along this layout's iteration order, or
    /// `None` if the array is not uniformly strided.
    ///
    /// Unit extents are ignored, so `[1, n]` and `[n, 1]` vectors always
    /// have one whenever their non-unit stride is positive.
    pub fn element_wise_stride(&self) -> Option<usize> {
        if self.elem_count() <= 1 {
            return Some(1);
        }
        let dims = self.dims();
        let rank = dims.len();
        let fastest_first: Box<dyn Iterator<Item = usize>> = match self.order {
            Order::C => Box::new((0..rank).rev()),
            Order::F => Box::new(0..rank),
        };
        let mut ews: Option<isize> = None;
        let mut expected = 0isize;
        for i in fastest_first.filter(|&i| dims[i] > 1) {
            let s = self.strides[i];
            match ews {
                None => {
                    if s <= 0 {
                        return None;
                    }
                    ews = Some(s);
                }
                Some(_) if s != expected => return None,
                Some(_) => {}
            }
            expected = s * dims[i] as isize;
        }
        ews.map(|s| s as usize)
    }

    /// Stride of the single non-unit dimension of a vector layout.
    /// Returns `None` when the layout is not a vector.
    pub fn vector_stride(&self) -> Option<isize> {
        if !self.is_vector() {
            return None;
        }
        Some(
            self.dims()
                .iter()
                .zip(self.strides.iter())
                .find(|(&d, _)| d > 1)
                .map(|(_, &s)| s)
                .unwrap_or(1),
        )
    }

    /// Reject ranks that do not fit the fixed coordinate scratch.
    pub fn check_rank(&self) -> Result<()> {
        if self.rank() > MAX_RANK {
            return Err(Error::RankTooLarge {
                rank: self.rank(),
                max: MAX_RANK,
            });
        }
        Ok(())
    }

    /// Smallest and largest buffer offsets this layout can address.
    /// `None` for arrays without elements.
    pub fn offset_bounds(&self) -> Option<(isize, isize)> {
        if self.elem_count() == 0 {
            return None;
        }
        let mut lo = self.offset as isize;
        let mut hi = self.offset as isize;
        for (&d, &s) in self.dims().iter().zip(self.strides.iter()) {
            let span = s * (d as isize - 1);
            if span < 0 {
                lo += span;
            } else {
                hi += span;
            }
        }
        Some((lo, hi))
    }

    /// Verify that every element of this layout lies inside a buffer of `len`.
    pub fn check_buffer(&self, len: usize) -> Result<()> {
        self.check_rank()?;
        match self.offset_bounds() {
            None => Ok(()),
            Some((lo, _)) if lo < 0 => Err(Error::NegativeOffset { offset: lo }),
            Some((_, hi)) if hi as usize >= len => Err(Error::BufferTooSmall {
                required: hi as usize + 1,
                len,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Convert a linear index into coordinates, walking dimensions in
    /// `order` (ind2sub). `coords` must hold at least `rank` entries.
    pub fn coords_of(&self, index: usize, order: Order, coords: &mut [usize]) {
        coords_of(self.dims(), index, order, coords);
    }

    /// Compute the buffer offset for a multi-dimensional index:
    /// `offset + sum(index[i] * stride[i])`.
    pub fn flat_index(&self, index: &[usize]) -> usize {
        self.signed_index(index) as usize
    }

    /// Same as [`Layout::flat_index`] without the final cast, for callers
    /// that have not validated the layout yet.
    pub fn signed_index(&self, index: &[usize]) -> isize {
        let mut flat = self.offset as isize;
        for (i, &idx) in index.iter().enumerate() {
            flat += idx as isize * self.strides[i];
        }
        flat
    }

    /// Buffer offset of the element at linear position `index` in `order`.
    pub fn offset_of(&self, index: usize, order: Order) -> usize {
        let mut coords = [0usize; MAX_RANK];
        let rank = self.rank();
        self.coords_of(index, order, &mut coords[..rank]);
        self.flat_index(&coords[..rank])
    }

    /// Swap two axes. Storage and the order tag are untouched, so a
    /// transposed C array loses its element-wise stride.
    pub fn transpose(&self, a: usize, b: usize) -> Result<Layout> {
        let rank = self.rank();
        if let Some(&dim) = [a, b].iter().find(|&&d| d >= rank) {
            return Err(Error::DimOutOfRange { dim, rank });
        }
        let mut view = self.clone();
        let mut dims = view.dims().to_vec();
        dims.swap(a, b);
        view.shape = Shape::new(dims);
        view.strides.swap(a, b);
        Ok(view)
    }

    /// View of `len` positions along `dim` starting at `start`, over the same
    /// buffer: `[4, 6]` narrowed to `(1, 2, 3)` is `[4, 3]` at
    /// `offset + 2 * strides[1]`.
    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Result<Layout> {
        let rank = self.rank();
        if dim >= rank {
            return Err(Error::DimOutOfRange { dim, rank });
        }
        let dim_size = self.dims()[dim];
        if start + len > dim_size {
            return Err(Error::NarrowOutOfBounds {
                dim,
                start,
                len,
                dim_size,
            });
        }
        let offset = self.offset as isize + start as isize * self.strides[dim];
        if offset < 0 {
            return Err(Error::NegativeOffset { offset });
        }
        let mut dims = self.dims().to_vec();
        dims[dim] = len;
        Ok(Layout {
            shape: Shape::new(dims),
            strides: self.strides.clone(),
            offset: offset as usize,
            order: self.order,
        })
    }

    /// Split the array into the sub-arrays spanning `dims`.
    ///
    /// The result has one entry per coordinate of the remaining dimensions,
    /// enumerated in row-major order of those dimensions. Inside each TAD
    /// elements are enumerated in row-major order of `dims` (sorted).
    pub fn tads(&self, dims: &[usize]) -> Result<TadSet> {
        self.check_rank()?;
        let rank = self.rank();
        let mut inner: Vec<usize> = dims.to_vec();
        inner.sort_unstable();
        inner.dedup();
        if let Some(&bad) = inner.iter().find(|&&d| d >= rank) {
            return Err(Error::DimOutOfRange { dim: bad, rank });
        }
        let outer: Vec<usize> = (0..rank).filter(|d| !inner.contains(d)).collect();

        let tad_dims: Vec<usize> = inner.iter().map(|&d| self.dims()[d]).collect();
        let tad_strides: Vec<isize> = inner.iter().map(|&d| self.strides[d]).collect();
        let outer_dims: Vec<usize> = outer.iter().map(|&d| self.dims()[d]).collect();
        let outer_strides: Vec<isize> = outer.iter().map(|&d| self.strides[d]).collect();

        let num_tads: usize = outer_dims.iter().product();
        let tad_len: usize = tad_dims.iter().product();
        let mut offsets = Vec::with_capacity(if tad_len == 0 { 0 } else { num_tads });
        if tad_len > 0 {
            let mut coords = [0usize; MAX_RANK];
            for t in 0..num_tads {
                coords_of(&outer_dims, t, Order::C, &mut coords[..outer.len()]);
                let mut base = self.offset as isize;
                for (c, s) in coords[..outer.len()].iter().zip(outer_strides.iter()) {
                    base += *c as isize * s;
                }
                if base < 0 {
                    return Err(Error::NegativeOffset { offset: base });
                }
                offsets.push(base);
            }
        }
        Ok(TadSet {
            shape: Shape::new(tad_dims),
            strides: tad_strides,
            offsets,
        })
    }
}

/// Free-standing ind2sub over raw extents.
pub fn coords_of(dims: &[usize], index: usize, order: Order, coords: &mut [usize]) {
    let mut rem = index;
    let rank = dims.len();
    match order {
        Order::C => {
            for i in (0..rank).rev() {
                let d = dims[i].max(1);
                coords[i] = rem % d;
                rem /= d;
            }
        }
        Order::F => {
            for i in 0..rank {
                let d = dims[i].max(1);
                coords[i] = rem % d;
                rem /= d;
            }
        }
    }
}

/// Element-wise strides for walking two equally shaped layouts with one
/// linear loop, or `None` when their storage orders disagree.
///
/// Vectors match regardless of their order tags.
pub fn linear_strides(a: &Layout, b: &Layout) -> Option<(usize, usize)> {
    let (sa, sb) = (a.element_wise_stride()?, b.element_wise_stride()?);
    if a.order() == b.order() || (a.is_vector() && b.is_vector()) {
        Some((sa, sb))
    } else {
        None
    }
}

/// The sub-arrays of a layout along a set of dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TadSet {
    /// Shape shared by every TAD.
    pub shape: Shape,
    /// Strides of the TAD dimensions in the parent layout.
    pub strides: Vec<isize>,
    /// Buffer offset of element 0 of each TAD.
    pub offsets: Vec<isize>,
}

impl TadSet {
    /// Number of TADs.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Elements in each TAD.
    pub fn tad_len(&self) -> usize {
        self.shape.elem_count()
    }

    /// Buffer offset of element `j` (row-major within the TAD) of TAD `t`.
    pub fn element_offset(&self, t: usize, j: usize) -> usize {
        let mut coords = [0usize; MAX_RANK];
        let rank = self.shape.rank();
        coords_of(self.shape.dims(), j, Order::C, &mut coords[..rank]);
        let mut off = self.offsets[t];
        for (c, s) in coords[..rank].iter().zip(self.strides.iter()) {
            off += *c as isize * s;
        }
        off as usize
    }
}

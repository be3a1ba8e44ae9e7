use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::layout::{Layout, TadSet};
use crate::shape::Shape;

// Special routines — operations that need more than one element
//
// Softmax, log-softmax, the softmax derivative and arg-max reduce over a
// segment (the whole array, or the vectors along chosen dimensions) before
// any element can be written. Im2col and col2im rearrange image patches.
//
// This module holds the substrate-neutral half of that work: planning
// (which segments, which patch geometry) and the arithmetic (segment stats,
// per-element apply, patch gathers). The host and the grid both call these
// functions, in the same order per segment, so results are bit-identical.

/// The whole-array routine selected by a special operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialKind {
    Col2Im,
    Im2col,
    SoftMax,
    SoftMaxDerivative,
    LogSoftMax,
    IsMax,
}

impl SpecialKind {
    pub fn name(&self) -> &'static str {
        match self {
            SpecialKind::Col2Im => "col2im",
            SpecialKind::Im2col => "im2col",
            SpecialKind::SoftMax => "softmax",
            SpecialKind::SoftMaxDerivative => "softmax_derivative",
            SpecialKind::LogSoftMax => "log_softmax",
            SpecialKind::IsMax => "is_max",
        }
    }

    /// Whether the routine needs `Σ exp(x - max)` per segment.
    pub fn needs_exp_sum(&self) -> bool {
        matches!(
            self,
            SpecialKind::SoftMax | SpecialKind::SoftMaxDerivative | SpecialKind::LogSoftMax
        )
    }
}

/// Reduction results for one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentStats<T> {
    pub max: T,
    /// `Σ exp(x - max)`; zero when the routine does not need it.
    pub sum: T,
    /// Position of the first maximum inside the segment.
    pub argmax: usize,
}

/// Reduce one segment of `len` elements. `value_at(j)` reads element `j`.
///
/// Both passes run sequentially in segment order; callers parallelise across
/// segments, never inside one, which keeps the floating-point sum order fixed.
pub fn segment_stats<T: Element>(
    kind: SpecialKind,
    len: usize,
    value_at: impl Fn(usize) -> T,
) -> SegmentStats<T> {
    let mut max = T::neg_infinity();
    let mut argmax = 0usize;
    for j in 0..len {
        let v = value_at(j);
        if j == 0 || v > max {
            max = v;
            argmax = j;
        }
    }
    let mut sum = T::zero();
    if kind.needs_exp_sum() {
        for j in 0..len {
            sum = sum + (value_at(j) - max).exp();
        }
    }
    SegmentStats { max, sum, argmax }
}

/// Output for element `x` at position `j` of a segment with `stats`.
#[inline]
pub fn segment_apply<T: Element>(kind: SpecialKind, x: T, j: usize, stats: &SegmentStats<T>) -> T {
    match kind {
        SpecialKind::SoftMax => (x - stats.max).exp() / stats.sum,
        SpecialKind::LogSoftMax => (x - stats.max) - stats.sum.ln(),
        SpecialKind::SoftMaxDerivative => {
            let s = (x - stats.max).exp() / stats.sum;
            s * (T::one() - s)
        }
        SpecialKind::IsMax => {
            if j == stats.argmax {
                T::one()
            } else {
                T::zero()
            }
        }
        SpecialKind::Im2col | SpecialKind::Col2Im => x,
    }
}

/// Read a parameter that must hold a non-negative integer.
pub fn param_usize<T: Element>(op: &'static str, params: &[T], i: usize) -> Result<usize> {
    let v = params
        .get(i)
        .copied()
        .ok_or(Error::MissingParams {
            op,
            required: i + 1,
            got: params.len(),
        })?
        .as_f64();
    if !v.is_finite() || v < 0.0 || v.fract() != 0.0 {
        return Err(Error::InvalidParam {
            op,
            msg: format!("parameter {i} must be a non-negative integer, got {v}"),
        });
    }
    Ok(v as usize)
}

fn param_dim<T: Element>(op: &'static str, params: &[T], i: usize, rank: usize) -> Result<usize> {
    let v = params
        .get(i)
        .copied()
        .ok_or(Error::MissingParams {
            op,
            required: i + 1,
            got: params.len(),
        })?
        .as_f64();
    if !v.is_finite() || v.fract() != 0.0 {
        return Err(Error::InvalidParam {
            op,
            msg: format!("dimension must be an integer, got {v}"),
        });
    }
    let d = v as isize;
    let wrapped = if d < 0 { d + rank as isize } else { d };
    if wrapped < 0 || wrapped as usize >= rank {
        return Err(Error::DimOutOfRange {
            dim: d.unsigned_abs(),
            rank,
        });
    }
    Ok(wrapped as usize)
}

/// Dimensions each segment spans.
///
/// Softmax family: the whole array for vectors, the last dimension
/// otherwise. IsMax: the whole array when `params` is empty or starts with
/// zero, otherwise `params = [k, d0, .., dk-1]` (negative dims wrap).
pub fn segment_dims<T: Element>(kind: SpecialKind, layout: &Layout, params: &[T]) -> Result<Vec<usize>> {
    let rank = layout.rank();
    let whole: Vec<usize> = (0..rank).collect();
    match kind {
        SpecialKind::IsMax => {
            let k = match params.first() {
                None => 0,
                Some(_) => param_usize(kind.name(), params, 0)?,
            };
            if k == 0 {
                return Ok(whole);
            }
            (1..=k).map(|i| param_dim(kind.name(), params, i, rank)).collect()
        }
        _ if layout.is_vector() || rank <= 1 => Ok(whole),
        _ => Ok(vec![rank - 1]),
    }
}

/// Patch geometry shared by im2col and col2im.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub n: usize,
    pub c: usize,
    pub h: usize,
    pub w: usize,
    pub kh: usize,
    pub kw: usize,
    pub sy: usize,
    pub sx: usize,
    pub ph: usize,
    pub pw: usize,
    pub oh: usize,
    pub ow: usize,
}

impl ConvGeometry {
    fn new(op: &'static str, n: usize, c: usize, image: [usize; 2], kernel: [usize; 2], stride: [usize; 2], pad: [usize; 2]) -> Result<Self> {
        let [h, w] = image;
        let [kh, kw] = kernel;
        let [sy, sx] = stride;
        let [ph, pw] = pad;
        if kh == 0 || kw == 0 || sy == 0 || sx == 0 {
            return Err(Error::InvalidParam {
                op,
                msg: "kernel and stride extents must be at least 1".into(),
            });
        }
        if h + 2 * ph < kh || w + 2 * pw < kw {
            return Err(Error::InvalidParam {
                op,
                msg: format!("kernel {kh}x{kw} does not fit padded image {h}x{w}"),
            });
        }
        Ok(ConvGeometry {
            n,
            c,
            h,
            w,
            kh,
            kw,
            sy,
            sx,
            ph,
            pw,
            oh: (h + 2 * ph - kh) / sy + 1,
            ow: (w + 2 * pw - kw) / sx + 1,
        })
    }

    pub fn image_shape(&self) -> Shape {
        Shape::from((self.n, self.c, self.h, self.w))
    }

    pub fn column_shape(&self) -> Shape {
        Shape::new(vec![self.n, self.c, self.kh, self.kw, self.oh, self.ow])
    }

    /// Image coordinate read by column element `[n, c, ky, kx, oy, ox]`,
    /// or `None` for a tap that falls in the padding.
    #[inline]
    pub fn im2col_source(&self, col: &[usize]) -> Option<[usize; 4]> {
        let iy = (col[4] * self.sy + col[2]).checked_sub(self.ph)?;
        let ix = (col[5] * self.sx + col[3]).checked_sub(self.pw)?;
        if iy >= self.h || ix >= self.w {
            return None;
        }
        Some([col[0], col[1], iy, ix])
    }

    /// Value of column element `col`: the image tap, or zero in the padding.
    #[inline]
    pub fn im2col_value<T: Element>(&self, col: &[usize], image_at: impl Fn(&[usize]) -> T) -> T {
        match self.im2col_source(col) {
            Some(src) => image_at(&src),
            None => T::zero(),
        }
    }

    /// Image pixel `[n, c, y, x]` reassembled from columns: the sum of every
    /// tap covering it, accumulated in `(ky, kx)` order.
    pub fn col2im_value<T: Element>(&self, img: &[usize], column_at: impl Fn(&[usize]) -> T) -> T {
        let (y, x) = (img[2] + self.ph, img[3] + self.pw);
        let mut acc = T::zero();
        for ky in 0..self.kh {
            let Some(dy) = y.checked_sub(ky) else { break };
            if dy % self.sy != 0 || dy / self.sy >= self.oh {
                continue;
            }
            for kx in 0..self.kw {
                let Some(dx) = x.checked_sub(kx) else { break };
                if dx % self.sx != 0 || dx / self.sx >= self.ow {
                    continue;
                }
                acc = acc + column_at(&[img[0], img[1], ky, kx, dy / self.sy, dx / self.sx]);
            }
        }
        acc
    }
}

fn expect_shape(expected: Shape, got: &Shape) -> Result<()> {
    if &expected != got {
        return Err(Error::ShapeMismatch {
            expected,
            got: got.clone(),
        });
    }
    Ok(())
}

fn expect_rank(layout: &Layout, rank: usize) -> Result<()> {
    if layout.rank() != rank {
        return Err(Error::RankMismatch {
            expected: rank,
            got: layout.rank(),
        });
    }
    Ok(())
}

/// Geometry of an im2col call: source `[n, c, h, w]`, destination
/// `[n, c, kh, kw, oh, ow]`, params `[kh, kw, sy, sx, ph, pw]`.
pub fn im2col_geometry<T: Element>(src: &Layout, dst: &Layout, params: &[T]) -> Result<ConvGeometry> {
    let op = SpecialKind::Im2col.name();
    expect_rank(src, 4)?;
    let p: Vec<usize> = (0..6).map(|i| param_usize(op, params, i)).collect::<Result<_>>()?;
    let d = src.dims();
    let geom = ConvGeometry::new(op, d[0], d[1], [d[2], d[3]], [p[0], p[1]], [p[2], p[3]], [p[4], p[5]])?;
    expect_shape(geom.column_shape(), dst.shape())?;
    Ok(geom)
}

/// Geometry of a col2im call: source `[n, c, kh, kw, oh, ow]`, destination
/// `[n, c, h, w]`, params `[sy, sx, ph, pw, h, w]`.
pub fn col2im_geometry<T: Element>(src: &Layout, dst: &Layout, params: &[T]) -> Result<ConvGeometry> {
    let op = SpecialKind::Col2Im.name();
    expect_rank(src, 6)?;
    let p: Vec<usize> = (0..6).map(|i| param_usize(op, params, i)).collect::<Result<_>>()?;
    let d = src.dims();
    let geom = ConvGeometry::new(op, d[0], d[1], [p[4], p[5]], [d[2], d[3]], [p[0], p[1]], [p[2], p[3]])?;
    expect_shape(geom.column_shape(), src.shape())?;
    expect_shape(geom.image_shape(), dst.shape())?;
    Ok(geom)
}

/// Everything a substrate needs to run a special routine.
#[derive(Debug, Clone, PartialEq)]
pub enum SpecialPlan {
    /// Reduce each source segment, then write the matching destination
    /// segment element by element.
    Segments {
        kind: SpecialKind,
        src: TadSet,
        dst: TadSet,
    },
    Im2col(ConvGeometry),
    Col2Im(ConvGeometry),
}

/// Validate a special call and decide how it runs.
pub fn plan<T: Element>(kind: SpecialKind, src: &Layout, dst: &Layout, params: &[T]) -> Result<SpecialPlan> {
    src.check_rank()?;
    dst.check_rank()?;
    match kind {
        SpecialKind::Im2col => im2col_geometry(src, dst, params).map(SpecialPlan::Im2col),
        SpecialKind::Col2Im => col2im_geometry(src, dst, params).map(SpecialPlan::Col2Im),
        _ => {
            expect_shape(src.shape().clone(), dst.shape())?;
            let dims = segment_dims(kind, src, params)?;
            Ok(SpecialPlan::Segments {
                kind,
                src: src.tads(&dims)?,
                dst: dst.tads(&dims)?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_of(kind: SpecialKind, xs: &[f64]) -> SegmentStats<f64> {
        segment_stats(kind, xs.len(), |j| xs[j])
    }

    #[test]
    fn test_softmax_stats_and_apply() {
        let xs = [1.0, 2.0, 3.0];
        let st = stats_of(SpecialKind::SoftMax, &xs);
        assert_eq!(st.max, 3.0);
        assert_eq!(st.argmax, 2);
        let out: Vec<f64> = xs
            .iter()
            .enumerate()
            .map(|(j, &x)| segment_apply(SpecialKind::SoftMax, x, j, &st))
            .collect();
        let total: f64 = out.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(out[2] > out[1] && out[1] > out[0]);
    }

    #[test]
    fn test_log_softmax_matches_ln_of_softmax() {
        let xs = [0.5, -1.0, 2.0, 0.0];
        let st = stats_of(SpecialKind::LogSoftMax, &xs);
        for (j, &x) in xs.iter().enumerate() {
            let ls = segment_apply(SpecialKind::LogSoftMax, x, j, &st);
            let s = segment_apply(SpecialKind::SoftMax, x, j, &st);
            assert!((ls - s.ln()).abs() < 1e-12);
        }
    }

    #[test]
    fn test_is_max_picks_first_maximum() {
        let xs = [1.0, 5.0, 5.0, 2.0];
        let st = stats_of(SpecialKind::IsMax, &xs);
        assert_eq!(st.argmax, 1);
        let out: Vec<f64> = xs
            .iter()
            .enumerate()
            .map(|(j, &x)| segment_apply(SpecialKind::IsMax, x, j, &st))
            .collect();
        assert_eq!(out, vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_segment_dims() {
        let m = Layout::contiguous((2, 3));
        let v = Layout::contiguous((1, 5));
        let none: [f64; 0] = [];
        assert_eq!(segment_dims(SpecialKind::SoftMax, &m, &none).unwrap(), vec![1]);
        assert_eq!(segment_dims(SpecialKind::SoftMax, &v, &none).unwrap(), vec![0, 1]);
        assert_eq!(segment_dims(SpecialKind::IsMax, &m, &none).unwrap(), vec![0, 1]);
        assert_eq!(segment_dims(SpecialKind::IsMax, &m, &[0.0]).unwrap(), vec![0, 1]);
        assert_eq!(segment_dims(SpecialKind::IsMax, &m, &[1.0, 0.0]).unwrap(), vec![0]);
        assert_eq!(segment_dims(SpecialKind::IsMax, &m, &[1.0, -1.0]).unwrap(), vec![1]);
        assert!(matches!(
            segment_dims(SpecialKind::IsMax, &m, &[1.0, 2.0]),
            Err(Error::DimOutOfRange { .. })
        ));
        assert!(matches!(
            segment_dims(SpecialKind::IsMax, &m, &[2.0, 0.0]),
            Err(Error::MissingParams { .. })
        ));
    }

    #[test]
    fn test_im2col_geometry() {
        let src = Layout::contiguous((1, 1, 3, 3));
        let dst = Layout::contiguous(vec![1, 1, 2, 2, 2, 2]);
        let g = im2col_geometry(&src, &dst, &[2.0, 2.0, 1.0, 1.0, 0.0, 0.0]).unwrap();
        assert_eq!((g.oh, g.ow), (2, 2));
        assert_eq!(g.im2col_source(&[0, 0, 1, 1, 1, 1]), Some([0, 0, 2, 2]));

        let bad = Layout::contiguous(vec![1, 1, 2, 2, 3, 3]);
        assert!(matches!(
            im2col_geometry(&src, &bad, &[2.0, 2.0, 1.0, 1.0, 0.0, 0.0]),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            im2col_geometry(&src, &dst, &[2.0, 2.0, 1.0]),
            Err(Error::MissingParams { .. })
        ));
        assert!(matches!(
            im2col_geometry(&src, &dst, &[2.0, 2.0, 0.0, 1.0, 0.0, 0.0]),
            Err(Error::InvalidParam { .. })
        ));
    }

    #[test]
    fn test_padding_taps_read_zero() {
        let src = Layout::contiguous((1, 1, 2, 2));
        let dst = Layout::contiguous(vec![1, 1, 3, 3, 2, 2]);
        let g = im2col_geometry(&src, &dst, &[3.0, 3.0, 1.0, 1.0, 1.0, 1.0]).unwrap();
        assert_eq!(g.im2col_source(&[0, 0, 0, 0, 0, 0]), None);
        let v: f64 = g.im2col_value(&[0, 0, 0, 0, 0, 0], |_| 7.0);
        assert_eq!(v, 0.0);
    }

    #[test]
    fn test_col2im_counts_overlapping_taps() {
        // 3x3 image, 2x2 kernel, stride 1: the centre pixel is covered by
        // all four kernel positions.
        let col = Layout::contiguous(vec![1, 1, 2, 2, 2, 2]);
        let img = Layout::contiguous((1, 1, 3, 3));
        let g = col2im_geometry(&col, &img, &[1.0, 1.0, 0.0, 0.0, 3.0, 3.0]).unwrap();
        let ones = |_: &[usize]| 1.0f64;
        assert_eq!(g.col2im_value(&[0, 0, 1, 1], ones), 4.0);
        assert_eq!(g.col2im_value(&[0, 0, 0, 0], ones), 1.0);
        assert_eq!(g.col2im_value(&[0, 0, 0, 1], ones), 2.0);
    }

    #[test]
    fn test_plan_rejects_shape_mismatch() {
        let a = Layout::contiguous((2, 3));
        let b = Layout::contiguous((3, 2));
        let none: [f32; 0] = [];
        assert!(matches!(
            plan(SpecialKind::SoftMax, &a, &b, &none),
            Err(Error::ShapeMismatch { .. })
        ));
        match plan(SpecialKind::SoftMax, &a, &a, &none).unwrap() {
            SpecialPlan::Segments { src, .. } => {
                assert_eq!(src.len(), 2);
                assert_eq!(src.tad_len(), 3);
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }
}

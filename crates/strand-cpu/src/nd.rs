// N-d engine — transforms over arbitrary strided layouts
//
// Path selection, in order:
//
//   1. rank 0 or zero elements: nothing to do.
//   2. Special operations go to the whole-array routines.
//   3. Fast path: both layouts have an element-wise stride and walk in the
//      same order (or are both vectors). One linear pass from each offset.
//   4. General path: an inner run along the source order's fastest
//      dimension, driven by an outer coordinate counter over the rest.
//      Source and destination offsets are resolved independently, so the
//      two layouts may differ in order, strides and offset.

use strand_core::layout::{self, Layout};
use strand_core::{Element, Error, ExecConfig, Order, Result, Transform, MAX_RANK};

use crate::linear;

pub fn exec<O: Transform, T: Element>(
    src: &[T],
    src_layout: &Layout,
    dst: &mut [T],
    dst_layout: &Layout,
    params: &[T],
    cfg: &ExecConfig,
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
        return crate::special::exec(kind, src, src_layout, dst, dst_layout, params, cfg);
    }
    match layout::linear_strides(src_layout, dst_layout) {
        Some((ss, ds)) => {
            tracing::debug!(op = O::OP.name(), n, ss, ds, "nd fast path");
            let src = &src[src_layout.offset()..];
            let dst = &mut dst[dst_layout.offset()..];
            linear::run::<O, T>(src, ss, dst, ds, params, n, cfg.is_parallel(n));
        }
        None => {
            tracing::debug!(op = O::OP.name(), n, "nd general path");
            general::<O, T>(src, src_layout, dst, dst_layout, params);
        }
    }
    Ok(())
}

/// Sequential walk for layouts with no shared element-wise stride.
fn general<O: Transform, T: Element>(src: &[T], sl: &Layout, dst: &mut [T], dl: &Layout, params: &[T]) {
    let rank = sl.rank();
    let order = sl.order();
    let inner = match order {
        Order::C => rank - 1,
        Order::F => 0,
    };
    let inner_len = sl.dims()[inner];
    let (ss, ds) = (sl.strides()[inner], dl.strides()[inner]);

    let mut outer_dims = [1usize; MAX_RANK];
    outer_dims[..rank].copy_from_slice(sl.dims());
    outer_dims[inner] = 1;
    let outer_count = sl.elem_count() / inner_len;

    let mut coords = [0usize; MAX_RANK];
    for o in 0..outer_count {
        layout::coords_of(&outer_dims[..rank], o, order, &mut coords[..rank]);
        let mut s = sl.signed_index(&coords[..rank]);
        let mut d = dl.signed_index(&coords[..rank]);
        for _ in 0..inner_len {
            dst[d as usize] = O::op(src[s as usize], params);
            s += ss;
            d += ds;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::transform::ops;

    fn cfg() -> ExecConfig {
        ExecConfig::default()
    }

    #[test]
    fn test_c_into_fortran() -> Result<()> {
        // [[1, 2, 3], [4, 5, 6]] copied into column-major storage.
        let src = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut dst = [0.0f32; 6];
        exec::<ops::Identity, f32>(
            &src,
            &Layout::contiguous((2, 3)),
            &mut dst,
            &Layout::fortran((2, 3)),
            &[],
            &cfg(),
        )?;
        assert_eq!(dst, [1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        Ok(())
    }

    #[test]
    fn test_transposed_view_with_offset() -> Result<()> {
        // Source is the transpose of [[0, 1, 2], [3, 4, 5]] starting at offset 1.
        let src = [99.0f64, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let sl = Layout::new((3, 2), vec![1, 3], 1, Order::C)?;
        let mut dst = [0.0f64; 6];
        exec::<ops::Neg, f64>(&src, &sl, &mut dst, &Layout::contiguous((3, 2)), &[], &cfg())?;
        assert_eq!(dst, [-0.0, -3.0, -1.0, -4.0, -2.0, -5.0]);
        Ok(())
    }

    #[test]
    fn test_reversed_vector() -> Result<()> {
        let src = [1.0f32, 2.0, 3.0];
        let sl = Layout::new(3, vec![-1], 2, Order::C)?;
        let mut dst = [0.0f32; 3];
        exec::<ops::Identity, f32>(&src, &sl, &mut dst, &Layout::contiguous(3), &[], &cfg())?;
        assert_eq!(dst, [3.0, 2.0, 1.0]);
        Ok(())
    }

    #[test]
    fn test_degenerate_vectors_take_fast_path() -> Result<()> {
        let src = [1.0f32, -2.0, 3.0];
        let mut dst = [0.0f32; 3];
        exec::<ops::Abs, f32>(
            &src,
            &Layout::contiguous((1, 3)),
            &mut dst,
            &Layout::fortran((1, 3)),
            &[],
            &cfg(),
        )?;
        assert_eq!(dst, [1.0, 2.0, 3.0]);
        Ok(())
    }

    #[test]
    fn test_shape_mismatch_and_empty() {
        let mut dst = [0.0f32; 6];
        assert!(matches!(
            exec::<ops::Abs, f32>(&[0.0; 6], &Layout::contiguous((2, 3)), &mut dst, &Layout::contiguous((3, 2)), &[], &cfg()),
            Err(Error::ShapeMismatch { .. })
        ));
        let empty = Layout::contiguous((2, 0));
        assert!(exec::<ops::Ones, f32>(&[], &empty, &mut dst, &empty, &[], &cfg()).is_ok());
        assert_eq!(dst, [0.0; 6]);
    }

    #[test]
    fn test_small_destination_rejected() {
        let mut dst = [0.0f32; 5];
        assert!(matches!(
            exec::<ops::Abs, f32>(&[0.0; 6], &Layout::contiguous((2, 3)), &mut dst, &Layout::contiguous((2, 3)), &[], &cfg()),
            Err(Error::BufferTooSmall { .. })
        ));
    }
}

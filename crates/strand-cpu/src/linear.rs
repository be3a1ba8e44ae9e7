// Linear engine — strided 1-D passes over flat buffers
//
// The workhorse of the host substrate. Writes exactly `n` elements:
//
//   dst[i * dst_stride] = op(src[i * src_stride])
//
// With both strides 1 this is a tight slice loop the compiler vectorises.
// Above `ExecConfig::parallel_threshold` elements the pass runs on rayon;
// element `i` only ever touches `src[i * ss]` and `dst[i * ds]`, so workers
// never share a destination element.
//
// The N-d engine lands here too once it has proven both layouts walk with a
// single element-wise stride.

use rayon::prelude::*;

use strand_core::layout::Layout;
use strand_core::{Element, Error, ExecConfig, Order, Result, Transform};

/// Elements a strided pass over `n` items spans.
fn span(n: usize, stride: usize) -> usize {
    if n == 0 {
        0
    } else {
        (n - 1) * stride + 1
    }
}

/// Validate strides and buffer lengths, then run the pass.
#[allow(clippy::too_many_arguments)]
pub fn exec<O: Transform, T: Element>(
    src: &[T],
    src_stride: usize,
    dst: &mut [T],
    dst_stride: usize,
    params: &[T],
    n: usize,
    cfg: &ExecConfig,
) -> Result<()> {
    if src_stride == 0 || dst_stride == 0 {
        return Err(Error::ZeroStride);
    }
    O::OP.check_params(params.len())?;
    for (stride, len) in [(src_stride, src.len()), (dst_stride, dst.len())] {
        let required = span(n, stride);
        if required > len {
            return Err(Error::BufferTooSmall { required, len });
        }
    }
    if n == 0 {
        return Ok(());
    }
    if let Some(kind) = O::SPECIAL {
        // A linear call over a special op treats the run as one vector.
        let sl = Layout::new(n, vec![src_stride as isize], 0, Order::C)?;
        let dl = Layout::new(n, vec![dst_stride as isize], 0, Order::C)?;
        return crate::special::exec(kind, src, &sl, dst, &dl, params, cfg);
    }
    run::<O, T>(src, src_stride, dst, dst_stride, params, n, cfg.is_parallel(n));
    Ok(())
}

/// The unchecked pass. Callers guarantee both spans fit their buffers.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run<O: Transform, T: Element>(
    src: &[T],
    ss: usize,
    dst: &mut [T],
    ds: usize,
    params: &[T],
    n: usize,
    parallel: bool,
) {
    match (ss, ds, parallel) {
        (1, 1, false) => {
            for (d, &s) in dst[..n].iter_mut().zip(&src[..n]) {
                *d = O::op(s, params);
            }
        }
        (1, 1, true) => {
            dst[..n]
                .par_iter_mut()
                .zip(src[..n].par_iter())
                .for_each(|(d, &s)| *d = O::op(s, params));
        }
        (_, _, false) => {
            for i in 0..n {
                dst[i * ds] = O::op(src[i * ss], params);
            }
        }
        (_, _, true) => {
            dst.par_chunks_mut(ds)
                .zip(src.par_chunks(ss))
                .take(n)
                .for_each(|(d, s)| d[0] = O::op(s[0], params));
        }
    }
}

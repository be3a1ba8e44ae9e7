// Index-indirected engine
//
//   dst[dst_indexes[i]] = op(src[src_indexes[i]])
//
// Every index is bounds-checked before the first write. Duplicate
// destination indexes are allowed; the last write in index order wins.
// Above the parallel threshold the gather and transform run on rayon into
// a scratch vector and the scatter follows sequentially, which keeps the
// last-write-wins rule intact.

use rayon::prelude::*;

use strand_core::{Element, Error, ExecConfig, Result, Transform};

fn check_indexes(indexes: &[usize], len: usize) -> Result<()> {
    match indexes.iter().position(|&i| i >= len) {
        Some(position) => Err(Error::IndexOutOfBounds {
            index: indexes[position],
            position,
            len,
        }),
        None => Ok(()),
    }
}

pub fn exec<O: Transform, T: Element>(
    src: &[T],
    src_indexes: &[usize],
    dst: &mut [T],
    dst_indexes: &[usize],
    params: &[T],
    cfg: &ExecConfig,
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
    check_indexes(src_indexes, src.len())?;
    check_indexes(dst_indexes, dst.len())?;

    let n = src_indexes.len();
    if cfg.is_parallel(n) {
        let values: Vec<T> = src_indexes
            .par_iter()
            .map(|&s| O::op(src[s], params))
            .collect();
        for (&d, v) in dst_indexes.iter().zip(values) {
            dst[d] = v;
        }
    } else {
        for (&s, &d) in src_indexes.iter().zip(dst_indexes) {
            dst[d] = O::op(src[s], params);
        }
    }
    Ok(())
}

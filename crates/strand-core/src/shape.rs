use std::fmt;

use crate::layout::Order;

// Shape — extents of an array descriptor
//
// Rank 0 is a scalar holding one element; any zero extent makes the array
// empty. Strides, offset and storage order belong to `Layout`; a Shape only
// knows the packed strides each storage order would give it.

/// Extents along each dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn elem_count(&self) -> usize {
        self.0.iter().product()
    }

    /// At most one extent above one, so a single stride walks the array
    /// whatever its order tag says.
    pub fn is_vector(&self) -> bool {
        !self.0.is_empty() && self.0.iter().filter(|&&d| d > 1).count() <= 1
    }

    /// Packed strides for `order`: `[12, 4, 1]` in C and `[1, 2, 6]` in F
    /// for extents `[2, 3, 4]`. Zero extents count as one so every stride
    /// stays positive.
    pub fn packed_strides(&self, order: Order) -> Vec<isize> {
        let mut strides = vec![0isize; self.rank()];
        let mut acc = 1isize;
        let mut place = |i: usize| {
            strides[i] = acc;
            acc *= self.0[i].max(1) as isize;
        };
        match order {
            Order::C => (0..self.rank()).rev().for_each(&mut place),
            Order::F => (0..self.rank()).for_each(&mut place),
        }
        strides
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.0).finish()
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

macro_rules! shape_from_tuple {
    (@usize $d:ident) => { usize };
    ($($d:ident),*) => {
        impl From<($(shape_from_tuple!(@usize $d),)*)> for Shape {
            fn from(($($d,)*): ($(shape_from_tuple!(@usize $d),)*)) -> Self {
                Shape(vec![$($d),*])
            }
        }
    };
}

shape_from_tuple!();
shape_from_tuple!(d0);
shape_from_tuple!(d0, d1);
shape_from_tuple!(d0, d1, d2);
shape_from_tuple!(d0, d1, d2, d3);

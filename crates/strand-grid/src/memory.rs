// Device memory — buffers every lane of a launch may read and write
//
// Lanes run on real threads, so device memory is a slice of atomic 64-bit
// cells. Elements are stored as their raw bit pattern (`Element::to_bits64`),
// which keeps every value (NaN payloads, signed zeros) exact. Relaxed
// ordering is enough: lanes never write the same cell concurrently, and the
// group barrier and the end of a launch order everything else.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use strand_core::{BackendBuffer, Element};

/// A device allocation of `T` elements.
pub struct DeviceBuffer<T: Element> {
    cells: Box<[AtomicU64]>,
    _marker: PhantomData<T>,
}

impl<T: Element> DeviceBuffer<T> {
    pub(crate) fn zeroed(len: usize) -> Self {
        let zero = T::zero().to_bits64();
        DeviceBuffer {
            cells: (0..len).map(|_| AtomicU64::new(zero)).collect(),
            _marker: PhantomData,
        }
    }

    pub(crate) fn from_host(data: &[T]) -> Self {
        DeviceBuffer {
            cells: data.iter().map(|v| AtomicU64::new(v.to_bits64())).collect(),
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub(crate) fn read(&self, i: usize) -> T {
        T::from_bits64(self.cells[i].load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn write(&self, i: usize, v: T) {
        self.cells[i].store(v.to_bits64(), Ordering::Relaxed);
    }

    pub(crate) fn to_host(&self) -> Vec<T> {
        (0..self.len()).map(|i| self.read(i)).collect()
    }
}

impl<T: Element> BackendBuffer for DeviceBuffer<T> {
    fn len(&self) -> usize {
        self.cells.len()
    }
}

impl<T: Element> std::fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeviceBuffer<{}>({})", T::DTYPE, self.len())
    }
}

/// Per-group scratch words, visible to every lane of one thread-group.
pub struct SharedMemory {
    words: Box<[AtomicU64]>,
}

impl SharedMemory {
    pub(crate) fn new(words: usize) -> Self {
        SharedMemory {
            words: (0..words).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[inline]
    pub fn load(&self, i: usize) -> u64 {
        self.words[i].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn store(&self, i: usize, v: u64) {
        self.words[i].store(v, Ordering::Relaxed);
    }

    #[inline]
    pub fn load_elem<T: Element>(&self, i: usize) -> T {
        T::from_bits64(self.load(i))
    }

    #[inline]
    pub fn store_elem<T: Element>(&self, i: usize, v: T) {
        self.store(i, v.to_bits64());
    }
}

// Grid launches — the cooperative execution model
//
// A launch runs `grid_dim` thread-groups of `block_dim` lanes each. Every
// lane is a scoped OS thread running the same kernel closure. Lanes of one
// group share:
//
//   - a barrier (`Lane::sync_threads`)
//   - a scratch region of atomic words (`Lane::shared`)
//   - one execution context, built once by lane 0 and published to the
//     rest of the group through the barrier (`Lane::shared_context`)
//
// Groups never synchronise with each other; a kernel that needs all groups
// to finish splits into two launches. Everything a group owns is dropped
// when the launch returns.

use std::sync::{Barrier, OnceLock};

use strand_core::ExecConfig;

use crate::memory::SharedMemory;

/// Shape of one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub grid_dim: usize,
    pub block_dim: usize,
    /// Scratch words per thread-group.
    pub shared_words: usize,
}

impl LaunchConfig {
    /// Launch covering `n` elements with at most `cfg.grid_dim` groups.
    /// Small jobs get fewer groups; every launch has at least one.
    pub fn for_num_elems(cfg: &ExecConfig, n: usize) -> Self {
        let block_dim = cfg.block_dim.max(1);
        LaunchConfig {
            grid_dim: n.div_ceil(block_dim).clamp(1, cfg.grid_dim.max(1)),
            block_dim,
            shared_words: 0,
        }
    }

    /// Launch with exactly the configured number of groups.
    pub fn full(cfg: &ExecConfig) -> Self {
        LaunchConfig {
            grid_dim: cfg.grid_dim.max(1),
            block_dim: cfg.block_dim.max(1),
            shared_words: 0,
        }
    }

    pub fn with_shared_words(mut self, words: usize) -> Self {
        self.shared_words = words;
        self
    }

    pub fn total_lanes(&self) -> usize {
        self.grid_dim * self.block_dim
    }
}

/// State shared by the lanes of one thread-group.
struct Group<C> {
    barrier: Barrier,
    shared: SharedMemory,
    context: OnceLock<C>,
}

/// One lane's view of the launch.
pub struct Lane<'a, C> {
    pub thread_idx: usize,
    pub block_idx: usize,
    pub block_dim: usize,
    pub grid_dim: usize,
    group: &'a Group<C>,
}

impl<C> Lane<'_, C> {
    #[inline]
    pub fn global_id(&self) -> usize {
        self.block_idx * self.block_dim + self.thread_idx
    }

    #[inline]
    pub fn total_lanes(&self) -> usize {
        self.grid_dim * self.block_dim
    }

    /// Wait until every lane of this group reaches the barrier.
    pub fn sync_threads(&self) {
        self.group.barrier.wait();
    }

    pub fn shared(&self) -> &SharedMemory {
        &self.group.shared
    }

    /// The group's execution context. Lane 0 runs `build`; every lane waits
    /// at the barrier and then reads the published value. Must be reached
    /// by all lanes of the group.
    pub fn shared_context(&self, build: impl Fn() -> C) -> &C {
        if self.thread_idx == 0 {
            self.group.context.get_or_init(&build);
        }
        self.sync_threads();
        self.group.context.get_or_init(build)
    }
}

/// Run `kernel` on every lane of a launch and wait for all of them.
pub fn launch<C, F>(cfg: LaunchConfig, kernel: F)
where
    C: Send + Sync,
    F: Fn(&Lane<'_, C>) + Sync,
{
    tracing::trace!(
        grid_dim = cfg.grid_dim,
        block_dim = cfg.block_dim,
        shared_words = cfg.shared_words,
        "grid launch"
    );
    let groups: Vec<Group<C>> = (0..cfg.grid_dim)
        .map(|_| Group {
            barrier: Barrier::new(cfg.block_dim),
            shared: SharedMemory::new(cfg.shared_words),
            context: OnceLock::new(),
        })
        .collect();
    let kernel = &kernel;
    std::thread::scope(|s| {
        for (block_idx, group) in groups.iter().enumerate() {
            for thread_idx in 0..cfg.block_dim {
                s.spawn(move || {
                    kernel(&Lane {
                        thread_idx,
                        block_idx,
                        block_dim: cfg.block_dim,
                        grid_dim: cfg.grid_dim,
                        group,
                    })
                });
            }
        }
    });
}

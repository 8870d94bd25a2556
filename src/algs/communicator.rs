//! Thin façade over intra-process (Rayon) or inter-process (MPI) message passing.
//!
//! Messages are contiguous byte slices. Sends never block; a receive handle
//! blocks in `.wait()` until the matching message arrives. Messages between
//! one `(src, dst, tag)` triple are delivered in the order they were sent.

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Non-blocking communication interface.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of at most `buf.len()` bytes.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Message tag namespace. Each exchange phase offsets its base by level.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(base: u16) -> Self {
        Self(base)
    }
    pub const fn base(self) -> u16 {
        self.0
    }
    pub const fn offset(self, k: u16) -> Self {
        Self(self.0.wrapping_add(k))
    }
}

pub const SPLIT_FLAGS_TAG: CommTag = CommTag::new(0xA000);
pub const CELL_STATE_TAG: CommTag = CommTag::new(0xB000);
pub const REDUCE_TAG: CommTag = CommTag::new(0xC000);
pub const INDICATOR_TAG: CommTag = CommTag::new(0xD000);

/// Single-process comm for serial runs: no peers, nothing ever moves.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}
}

// --- RayonComm: intra-process / multi-thread ---
type Key = (usize, usize, u16); // (src, dst, tag)

/// Shared mailbox plus a generation counter that wakes blocked receivers.
#[derive(Default)]
struct Postbox {
    queues: DashMap<Key, VecDeque<Bytes>>,
    generation: Mutex<u64>,
    posted: Condvar,
}

impl Postbox {
    fn post(&self, key: Key, data: Bytes) {
        self.queues.entry(key).or_default().push_back(data);
        *self.generation.lock() += 1;
        self.posted.notify_all();
    }

    fn pop(&self, key: &Key) -> Option<Bytes> {
        self.queues.get_mut(key).and_then(|mut q| q.pop_front())
    }
}

static MAILBOX: Lazy<Arc<Postbox>> = Lazy::new(|| Arc::new(Postbox::default()));

/// A receive blocked longer than this is reported as failed.
const RECV_TIMEOUT: Duration = Duration::from_secs(30);

pub struct LocalHandle {
    postbox: Arc<Postbox>,
    key: Key,
    len: usize,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let deadline = Instant::now() + RECV_TIMEOUT;
        let take = |bytes: Bytes| bytes[..self.len.min(bytes.len())].to_vec();
        loop {
            let seen = *self.postbox.generation.lock();
            if let Some(bytes) = self.postbox.pop(&self.key) {
                return Some(take(bytes));
            }
            let mut generation = self.postbox.generation.lock();
            while *generation == seen {
                if self
                    .postbox
                    .posted
                    .wait_until(&mut generation, deadline)
                    .timed_out()
                {
                    drop(generation);
                    return self.postbox.pop(&self.key).map(take);
                }
            }
        }
    }
}

/// Ranks simulated by threads of one process.
///
/// `new` attaches to the process-wide mailbox; `world` creates an isolated
/// set of ranks that cannot see messages of any other set.
#[derive(Clone)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    postbox: Arc<Postbox>,
}

impl std::fmt::Debug for RayonComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayonComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl RayonComm {
    pub fn new(rank: usize, size: usize) -> Self {
        Self {
            rank,
            size,
            postbox: Arc::clone(&MAILBOX),
        }
    }

    /// `size` ranks sharing a private mailbox.
    pub fn world(size: usize) -> Vec<Self> {
        let postbox = Arc::new(Postbox::default());
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                postbox: Arc::clone(&postbox),
            })
            .collect()
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        self.postbox
            .post((self.rank, peer, tag), Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> LocalHandle {
        LocalHandle {
            postbox: Arc::clone(&self.postbox),
            key: (peer, self.rank, tag),
            len: buf.len(),
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use mpi::environment::Universe;
    use mpi::request::StaticScope;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;
    use std::sync::Arc;

    pub struct MpiComm {
        world: Arc<SimpleCommunicator>,
        rank: usize,
        size: usize,
        _universe: Universe,
    }

    impl MpiComm {
        /// Initialise MPI; `None` if it was already initialised.
        pub fn new() -> Option<Self> {
            let universe = mpi::initialize()?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Some(Self {
                world: Arc::new(world),
                rank,
                size,
                _universe: universe,
            })
        }
    }

    pub struct MpiSendHandle {
        finish: Option<Box<dyn FnOnce()>>,
    }

    impl Wait for MpiSendHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(finish) = self.finish.take() {
                finish();
            }
            None
        }
    }

    pub struct MpiRecvHandle {
        world: Arc<SimpleCommunicator>,
        peer: i32,
        tag: i32,
        len: usize,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let (mut data, _status) = self
                .world
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            data.truncate(self.len);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            let data: &'static [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let raw = data as *const [u8] as *mut [u8];
            let req = self.world.process_at_rank(peer as i32).immediate_send_with_tag(
                StaticScope,
                data,
                i32::from(tag),
            );
            MpiSendHandle {
                finish: Some(Box::new(move || {
                    req.wait();
                    // SAFETY: `raw` came from `Box::leak` above and the request
                    // that borrowed it has completed.
                    unsafe { drop(Box::from_raw(raw)) };
                })),
            }
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiRecvHandle {
            MpiRecvHandle {
                world: Arc::clone(&self.world),
                peer: peer as i32,
                tag: i32::from(tag),
                len: buf.len(),
            }
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rayon_roundtrip_two_ranks() {
        let comms = RayonComm::world(2);
        let mut recv_buf = [0u8; 4];
        let recv_handle = comms[1].irecv(0, 7, &mut recv_buf);
        comms[0].isend(1, 7, &[1, 2, 3, 4]).wait();
        let data = recv_handle
            .wait()
            .expect("Expected to receive data from rank 0");
        recv_buf.copy_from_slice(&data);
        assert_eq!(&recv_buf, &[1, 2, 3, 4]);
    }

    #[test]
    fn worlds_are_isolated() {
        let a = RayonComm::world(2);
        let b = RayonComm::world(2);
        a[0].isend(1, 3, b"a");
        b[0].isend(1, 3, b"b");
        let mut buf = [0u8; 1];
        assert_eq!(b[1].irecv(0, 3, &mut buf).wait().unwrap(), b"b");
        assert_eq!(a[1].irecv(0, 3, &mut buf).wait().unwrap(), b"a");
    }

    #[test]
    fn receive_posted_before_send_from_another_thread() {
        let comms = RayonComm::world(2);
        let sender = comms[0].clone();
        let mut buf = [0u8; 2];
        let h = comms[1].irecv(0, 11, &mut buf);
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            sender.isend(1, 11, &[9, 8]);
        });
        assert_eq!(h.wait().unwrap(), vec![9, 8]);
        t.join().unwrap();
    }

    #[test]
    fn no_comm_is_serial() {
        let c = NoComm;
        assert_eq!((c.rank(), c.size()), (0, 1));
        assert!(c.irecv(0, 1, &mut []).wait().is_none());
    }

    #[test]
    fn tags_offset_by_level() {
        assert_eq!(SPLIT_FLAGS_TAG.offset(3).base(), 0xA003);
        assert_ne!(SPLIT_FLAGS_TAG.offset(1), CELL_STATE_TAG);
    }
}

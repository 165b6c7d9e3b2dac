//! The transactional KV store abstraction.
//!
//! Spec §1 treats "the transactional KV store itself" as an external
//! collaborator, assumed to provide serializable transactions, ordered
//! keys, and atomic multi-key commit, with hard per-operation limits (a
//! ~5 second transaction window, a 10 MB per-transaction byte budget, a
//! 100 kB per-value budget — see [`crate::RingConfig`]). `KvBackend` and
//! `KvTransaction` are that collaborator's interface as seen by this
//! workspace; a real deployment plugs in a client for such a store, and
//! `ringtsdb-storage::testing` ships an in-memory reference implementation
//! that enforces the same limits for tests.
//!
//! Every method is `async` because every backend round-trip may suspend —
//! no caller may hold a process-local lock across one of these calls.

use crate::error::Result;
use async_trait::async_trait;

/// A single serializable transaction against the backend.
///
/// Reads observe a single snapshot for the lifetime of the transaction.
/// Writes are buffered and become visible to other transactions only on
/// `commit`. Dropping a transaction without committing aborts it.
#[async_trait]
pub trait KvTransaction: Send {
    /// Point read. `None` if the key is absent.
    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Range read over `[begin, end)`, in key order. `limit` caps the
    /// number of pairs returned in this single round-trip; callers that
    /// need more must re-issue from the last key returned.
    async fn get_range(
        &mut self,
        begin: &[u8],
        end: &[u8],
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Buffer a write. Not visible to other transactions until commit.
    async fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;

    /// Buffer a point delete.
    async fn clear(&mut self, key: &[u8]) -> Result<()>;

    /// Buffer a range delete over `[begin, end)`. Idempotent: clearing an
    /// already-empty range is a no-op, which is what makes multi-step
    /// `delete`/`retention_rewrite` safe to resume.
    async fn clear_range(&mut self, begin: &[u8], end: &[u8]) -> Result<()>;

    /// Commit all buffered writes atomically. Returns
    /// `Error::Conflict` if a concurrent transaction invalidated this
    /// one's read set, or `Error::BackendTransient` if the transaction
    /// exceeded the backend's time/byte budget.
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// A process-wide handle to the backend. Stateless across requests: all
/// coordination is delegated to the backend's serializable transactions.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Start a read-write transaction.
    async fn begin(&self) -> Result<Box<dyn KvTransaction>>;

    /// Start a read-only snapshot transaction. Implementations may
    /// optimize this path (e.g. no read-set tracking), but it must still
    /// observe a single consistent snapshot.
    async fn begin_read_only(&self) -> Result<Box<dyn KvTransaction>>;
}

//! Memo handles.

use super::typed_handle;

typed_handle! {
    /// Handle to a memo holding a `T`.
    ///
    /// # How Memos Work
    ///
    /// 1. On first access, the memo runs its function and caches the result
    ///    along with a fingerprint of its dependency values.
    ///
    /// 2. When a dependency changes, the memo is marked "maybe dirty".
    ///
    /// 3. On next access, the memo brings its dependencies up to date and
    ///    re-fingerprints them. An unchanged fingerprint keeps the cache.
    ///
    /// 4. Otherwise it recomputes. A failed recomputation leaves the memo
    ///    dirty and surfaces the error; a stale value is never returned.
    Memo
}

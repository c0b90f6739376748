//! Scope variables.
//!
//! An [`ArgScope`] is declared by exactly one slot of one owner node and
//! referenced elsewhere by identity. Two scopes with the same kind and type
//! are still distinct; equality and hashing only look at the identity.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::DType;

static NEXT_SCOPE_ID: AtomicU32 = AtomicU32::new(0);

/// Kind of a scope variable, fixed by the declaring owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// Current item of an iterated sequence.
    SeqItem,
    /// Position of the current item; declared next to a `SeqItem`.
    SeqIndex,
    /// Current item of an iterated tensor.
    TenItem,
    /// Current element of a grouped iteration.
    Iter,
    /// Value tested by a guard.
    Guard,
    /// Value bound once by a `With`.
    With,
    /// Bound of a range.
    Range,
}

impl ScopeKind {
    /// Whether the owner re-evaluates the scoped argument once per element.
    pub fn is_loop(self) -> bool {
        matches!(
            self,
            ScopeKind::SeqItem | ScopeKind::SeqIndex | ScopeKind::TenItem | ScopeKind::Iter
        )
    }

    /// Short prefix used when printing trees.
    pub fn prefix(self) -> &'static str {
        match self {
            ScopeKind::SeqItem => "it",
            ScopeKind::SeqIndex => "ix",
            ScopeKind::TenItem => "ti",
            ScopeKind::Iter => "g",
            ScopeKind::Guard => "gd",
            ScopeKind::With => "w",
            ScopeKind::Range => "r",
        }
    }
}

struct ScopeData {
    id: u32,
    kind: ScopeKind,
    ty: DType,
}

/// A scope variable identity.
#[derive(Clone)]
pub struct ArgScope(Arc<ScopeData>);

impl ArgScope {
    /// Create a fresh scope with a process-unique identity.
    pub fn new(kind: ScopeKind, ty: DType) -> Self {
        let id = NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed);
        ArgScope(Arc::new(ScopeData { id, kind, ty }))
    }

    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn kind(&self) -> ScopeKind {
        self.0.kind
    }

    pub fn ty(&self) -> &DType {
        &self.0.ty
    }

    pub fn is_loop(&self) -> bool {
        self.0.kind.is_loop()
    }
}

impl PartialEq for ArgScope {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for ArgScope {}

impl Hash for ArgScope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for ArgScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}: {}", self.kind().prefix(), self.id(), self.ty())
    }
}

impl fmt::Display for ArgScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind().prefix(), self.id())
    }
}

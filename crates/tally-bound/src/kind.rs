//! Node kind tags and subtree kind masks.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Kind tag of a bound node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeKind {
    Const,
    Default,
    This,
    Error,
    Missing,
    Global,
    FreeVar,
    Namespace,
    ScopeRef,
    Unary,
    Cast,
    Binary,
    Compare,
    Variadic,
    Sequence,
    Tensor,
    Tuple,
    Record,
    GetField,
    GetSlot,
    If,
    Slice,
    Call,
    With,
    GroupBy,
    SetFields,
    ModuleProjection,
}

impl NodeKind {
    pub fn is_leaf(self) -> bool {
        matches!(
            self,
            NodeKind::Const
                | NodeKind::Default
                | NodeKind::This
                | NodeKind::Error
                | NodeKind::Missing
                | NodeKind::Global
                | NodeKind::FreeVar
                | NodeKind::Namespace
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Set of node kinds, unioned over a whole subtree at construction.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KindMask(u64);

impl KindMask {
    pub const EMPTY: KindMask = KindMask(0);

    pub const fn of(kind: NodeKind) -> Self {
        KindMask(1 << kind as u8)
    }

    pub const fn with(self, kind: NodeKind) -> Self {
        KindMask(self.0 | 1 << kind as u8)
    }

    pub const fn contains(self, kind: NodeKind) -> bool {
        self.0 & (1 << kind as u8) != 0
    }

    pub const fn intersects(self, other: KindMask) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl From<NodeKind> for KindMask {
    fn from(kind: NodeKind) -> Self {
        KindMask::of(kind)
    }
}

impl BitOr for KindMask {
    type Output = KindMask;

    fn bitor(self, rhs: KindMask) -> KindMask {
        KindMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for KindMask {
    fn bitor_assign(&mut self, rhs: KindMask) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for KindMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KindMask(")?;
        let mut first = true;
        for bit in 0..=NodeKind::ModuleProjection as u8 {
            if self.0 & (1 << bit) != 0 {
                if !first {
                    f.write_str(" | ")?;
                }
                first = false;
                write!(f, "{bit}")?;
            }
        }
        f.write_str(")")
    }
}

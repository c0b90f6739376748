//! Operators and function references carried by bound nodes.

use std::fmt;
use std::sync::Arc;

use crate::types::{DType, Name};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CastOp {
    /// Numeric conversion.
    Num,
    /// Reference conversion between compatible structural types.
    Ref,
    /// Wrap into an optional.
    Opt,
    /// Box into `General`.
    Box,
}

impl CastOp {
    pub fn name(self) -> &'static str {
        match self {
            CastOp::Num => "num",
            CastOp::Ref => "ref",
            CastOp::Opt => "opt",
            CastOp::Box => "box",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Power,
    IntDiv,
    Mod,
    Shl,
    Shr,
    Coalesce,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Power => "^",
            BinaryOp::IntDiv => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Coalesce => "??",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Operators taking two or more operands of one family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VariadicOp {
    Add,
    Mul,
    Min,
    Max,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    TextConcat,
    SeqConcat,
    TupleConcat,
    RecordConcat,
}

/// How the operands of a variadic node may be regrouped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VariadicFamily {
    /// Associative and commutative: operands may be reordered freely.
    Commutative,
    /// Associative but order-sensitive in rounding: only leading runs group.
    Associative,
    /// Associative concatenation: any contiguous run groups.
    Ordered,
    /// Operands are never merged.
    NonAssociative,
}

impl VariadicOp {
    /// Regrouping family for a node of result type `ty`.
    pub fn family(self, ty: &DType) -> VariadicFamily {
        match self {
            VariadicOp::Add | VariadicOp::Mul | VariadicOp::Min | VariadicOp::Max => {
                if ty.is_fractional() {
                    VariadicFamily::Associative
                } else {
                    VariadicFamily::Commutative
                }
            }
            VariadicOp::BitAnd | VariadicOp::BitOr | VariadicOp::BitXor => {
                VariadicFamily::Commutative
            }
            VariadicOp::And | VariadicOp::Or | VariadicOp::TextConcat | VariadicOp::SeqConcat => {
                VariadicFamily::Ordered
            }
            VariadicOp::TupleConcat | VariadicOp::RecordConcat => VariadicFamily::NonAssociative,
        }
    }

    /// Whether operands may carry the inverted flag. `Add` inverts to
    /// subtraction for any numeric type, `Mul` to division for fractions.
    pub fn allows_inverted(self, ty: &DType) -> bool {
        match self {
            VariadicOp::Add => ty.is_numeric(),
            VariadicOp::Mul => ty.is_fractional(),
            _ => false,
        }
    }

    /// Whether every operand has the node's own result type.
    pub fn is_homogeneous(self) -> bool {
        !matches!(self, VariadicOp::TupleConcat | VariadicOp::RecordConcat)
    }

    /// Infix symbol, or `None` for operators printed in call form.
    pub fn symbol(self) -> Option<&'static str> {
        match self {
            VariadicOp::Add => Some("+"),
            VariadicOp::Mul => Some("*"),
            VariadicOp::And => Some("and"),
            VariadicOp::Or => Some("or"),
            VariadicOp::TextConcat => Some("&"),
            VariadicOp::SeqConcat => Some("++"),
            _ => None,
        }
    }

    pub fn inverted_symbol(self) -> &'static str {
        match self {
            VariadicOp::Mul => "/",
            _ => "-",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VariadicOp::Add => "add",
            VariadicOp::Mul => "mul",
            VariadicOp::Min => "min",
            VariadicOp::Max => "max",
            VariadicOp::BitAnd => "bitand",
            VariadicOp::BitOr => "bitor",
            VariadicOp::BitXor => "bitxor",
            VariadicOp::And => "and",
            VariadicOp::Or => "or",
            VariadicOp::TextConcat => "concat",
            VariadicOp::SeqConcat => "seqconcat",
            VariadicOp::TupleConcat => "tupleconcat",
            VariadicOp::RecordConcat => "recordconcat",
        }
    }
}

/// Which parts of one slice dimension are present.
///
/// The present parts appear in the flattened value list in the order
/// index, start, stop, step.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SliceShape(u8);

impl SliceShape {
    pub const INDEX: SliceShape = SliceShape(1 << 0);
    pub const INDEX_BACK: SliceShape = SliceShape(1 << 1);
    pub const START: SliceShape = SliceShape(1 << 2);
    pub const START_BACK: SliceShape = SliceShape(1 << 3);
    pub const STOP: SliceShape = SliceShape(1 << 4);
    pub const STOP_BACK: SliceShape = SliceShape(1 << 5);
    /// Stop is the wildcard `*` and carries no value.
    pub const STOP_STAR: SliceShape = SliceShape(1 << 6);
    pub const STEP: SliceShape = SliceShape(1 << 7);

    pub const fn empty() -> Self {
        SliceShape(0)
    }

    pub const fn contains(self, other: SliceShape) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: SliceShape) -> Self {
        SliceShape(self.0 | other.0)
    }

    /// Number of values this dimension contributes to the flattened list.
    pub fn value_count(self) -> usize {
        [Self::INDEX, Self::START, Self::STOP, Self::STEP]
            .into_iter()
            .filter(|part| self.contains(*part))
            .count()
    }

    /// Whether the flag combination describes a well-formed dimension.
    pub fn is_valid(self) -> bool {
        let index = self.contains(Self::INDEX);
        let range = self.intersects(Self::START.union(Self::STOP).union(Self::STEP));
        let star = self.contains(Self::STOP_STAR);
        !(index && (range || star))
            && !(self.contains(Self::INDEX_BACK) && !index)
            && !(self.contains(Self::START_BACK) && !self.contains(Self::START))
            && !(self.contains(Self::STOP_BACK) && !self.contains(Self::STOP))
            && !(star && self.contains(Self::STOP))
    }

    const fn intersects(self, other: SliceShape) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for SliceShape {
    type Output = SliceShape;

    fn bitor(self, rhs: SliceShape) -> SliceShape {
        self.union(rhs)
    }
}

impl fmt::Debug for SliceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SliceShape({:#010b})", self.0)
    }
}

/// Flags describing the effects of a function.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FuncFlags(u8);

impl FuncFlags {
    pub const NONE: FuncFlags = FuncFlags(0);
    /// May return a different value on each evaluation.
    pub const VOLATILE: FuncFlags = FuncFlags(1 << 0);
    /// Performs an externally observable action.
    pub const PROCEDURE: FuncFlags = FuncFlags(1 << 1);

    pub const fn contains(self, other: FuncFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: FuncFlags) -> Self {
        FuncFlags(self.0 | other.0)
    }
}

/// A resolved function or operator.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Func {
    pub name: Name,
    pub flags: FuncFlags,
}

pub type FuncRef = Arc<Func>;

impl Func {
    pub fn new(name: impl Into<Name>, flags: FuncFlags) -> FuncRef {
        Arc::new(Func {
            name: name.into(),
            flags,
        })
    }

    pub fn pure(name: impl Into<Name>) -> FuncRef {
        Func::new(name, FuncFlags::NONE)
    }

    /// Whether calls must never be duplicated, moved or merged.
    pub fn has_effects(&self) -> bool {
        self.flags.contains(FuncFlags::VOLATILE) || self.flags.contains(FuncFlags::PROCEDURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_depends_on_domain() {
        assert_eq!(
            VariadicOp::Add.family(&DType::Int),
            VariadicFamily::Commutative
        );
        assert_eq!(
            VariadicOp::Add.family(&DType::R8),
            VariadicFamily::Associative
        );
        assert_eq!(
            VariadicOp::TextConcat.family(&DType::Text),
            VariadicFamily::Ordered
        );
        assert_eq!(
            VariadicOp::TupleConcat.family(&DType::General),
            VariadicFamily::NonAssociative
        );
    }

    #[test]
    fn inversion_rules() {
        assert!(VariadicOp::Add.allows_inverted(&DType::I4));
        assert!(VariadicOp::Mul.allows_inverted(&DType::R8));
        assert!(!VariadicOp::Mul.allows_inverted(&DType::Int));
        assert!(!VariadicOp::Max.allows_inverted(&DType::R8));
    }

    #[test]
    fn slice_shape_counts() {
        let range = SliceShape::START | SliceShape::STOP | SliceShape::STEP;
        assert_eq!(range.value_count(), 3);
        assert!(range.is_valid());

        let star = SliceShape::START | SliceShape::STOP_STAR;
        assert_eq!(star.value_count(), 1);
        assert!(star.is_valid());

        let back = SliceShape::INDEX | SliceShape::INDEX_BACK;
        assert_eq!(back.value_count(), 1);
        assert!(back.is_valid());

        assert!(!(SliceShape::INDEX | SliceShape::STOP).is_valid());
        assert!(!SliceShape::STOP_BACK.is_valid());
    }

    #[test]
    fn effects() {
        assert!(!Func::pure("Sum").has_effects());
        assert!(Func::new("Now", FuncFlags::VOLATILE).has_effects());
        assert!(Func::new("Set", FuncFlags::PROCEDURE).has_effects());
    }
}

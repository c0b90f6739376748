//! Result types of bound nodes.
//!
//! `DType` is the structural type the binder assigns to every node. The
//! optimizer only compares and queries types; conversions are delegated to a
//! [`TypeService`](crate::typesvc::TypeService).

use std::fmt;
use std::sync::Arc;

/// Shared immutable name, used for fields, globals and function names.
pub type Name = Arc<str>;

/// A bound type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    /// Signed fixed-width integers, width in bytes.
    I1,
    I2,
    I4,
    I8,
    /// Unsigned fixed-width integers, width in bytes.
    U1,
    U2,
    U4,
    U8,
    /// Arbitrary integer.
    Int,
    R4,
    R8,
    Text,
    Seq(Arc<DType>),
    Tensor(Arc<DType>, u8),
    Tuple(Arc<[DType]>),
    Record(Arc<[(Name, DType)]>),
    Opt(Arc<DType>),
    Module(Arc<[(Name, DType)]>),
    /// The top type; every value converts to it by boxing.
    General,
}

impl DType {
    pub fn seq(item: DType) -> Self {
        DType::Seq(Arc::new(item))
    }

    pub fn tensor(item: DType, rank: u8) -> Self {
        DType::Tensor(Arc::new(item), rank)
    }

    pub fn opt(inner: DType) -> Self {
        DType::Opt(Arc::new(inner))
    }

    pub fn tuple(items: impl IntoIterator<Item = DType>) -> Self {
        DType::Tuple(items.into_iter().collect())
    }

    pub fn record<N: Into<Name>>(fields: impl IntoIterator<Item = (N, DType)>) -> Self {
        DType::Record(fields.into_iter().map(|(n, t)| (n.into(), t)).collect())
    }

    pub fn module<N: Into<Name>>(fields: impl IntoIterator<Item = (N, DType)>) -> Self {
        DType::Module(fields.into_iter().map(|(n, t)| (n.into(), t)).collect())
    }

    pub fn is_fractional(&self) -> bool {
        matches!(self, DType::R4 | DType::R8)
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            DType::I1
                | DType::I2
                | DType::I4
                | DType::I8
                | DType::U1
                | DType::U2
                | DType::U4
                | DType::U8
                | DType::Int
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || self.is_fractional()
    }

    /// Width in bytes and signedness of a fixed-width integer type.
    pub fn int_width(&self) -> Option<(u8, bool)> {
        match self {
            DType::I1 => Some((1, true)),
            DType::I2 => Some((2, true)),
            DType::I4 => Some((4, true)),
            DType::I8 => Some((8, true)),
            DType::U1 => Some((1, false)),
            DType::U2 => Some((2, false)),
            DType::U4 => Some((4, false)),
            DType::U8 => Some((8, false)),
            _ => None,
        }
    }

    /// Element type of a sequence or tensor.
    pub fn item_type(&self) -> Option<&DType> {
        match self {
            DType::Seq(item) | DType::Tensor(item, _) => Some(item),
            _ => None,
        }
    }

    /// Field type of a record or module.
    pub fn field_type(&self, name: &str) -> Option<&DType> {
        match self {
            DType::Record(fields) | DType::Module(fields) => fields
                .iter()
                .find(|(field, _)| &**field == name)
                .map(|(_, ty)| ty),
            _ => None,
        }
    }

    pub fn slot_type(&self, slot: usize) -> Option<&DType> {
        match self {
            DType::Tuple(items) => items.get(slot),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Bool => f.write_str("bool"),
            DType::I1 => f.write_str("i1"),
            DType::I2 => f.write_str("i2"),
            DType::I4 => f.write_str("i4"),
            DType::I8 => f.write_str("i8"),
            DType::U1 => f.write_str("u1"),
            DType::U2 => f.write_str("u2"),
            DType::U4 => f.write_str("u4"),
            DType::U8 => f.write_str("u8"),
            DType::Int => f.write_str("int"),
            DType::R4 => f.write_str("r4"),
            DType::R8 => f.write_str("r8"),
            DType::Text => f.write_str("text"),
            DType::Seq(item) => write!(f, "{item}*"),
            DType::Tensor(item, rank) => write!(f, "{item}[{rank}]"),
            DType::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            DType::Record(fields) | DType::Module(fields) => {
                if matches!(self, DType::Module(_)) {
                    f.write_str("module")?;
                }
                f.write_str("{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                f.write_str("}")
            }
            DType::Opt(inner) => write!(f, "{inner}?"),
            DType::General => f.write_str("g"),
        }
    }
}

/// Wrapper for f64 that implements Eq and Hash using bit representation.
#[derive(Clone, Copy, Debug)]
pub struct FloatBits(f64);

impl FloatBits {
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for FloatBits {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatBits {}

impl std::hash::Hash for FloatBits {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl From<f64> for FloatBits {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

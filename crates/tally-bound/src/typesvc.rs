//! Type-system collaborator contract.
//!
//! Rewrites that substitute one expression for another may need a conversion
//! when the substituted value's type differs from the slot it fills. The
//! type system proper lives in the host; passes reach it through
//! [`TypeService`]. [`BasicTypeService`] is a structural default good enough
//! for hosts without their own conversion rules, and for tests.

use derive_more::{Display, Error};

use crate::node::Node;
use crate::ops::CastOp;
use crate::reduce::ReduceHost;
use crate::types::DType;

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum CastError {
    #[display("cannot convert {from} to {to}")]
    Incompatible { from: DType, to: DType },
}

/// Type equality, acceptance and explicit conversion.
pub trait TypeService {
    fn types_equal(&self, a: &DType, b: &DType) -> bool;

    /// Whether a value of type `src` may stand where `dst` is expected,
    /// possibly after a conversion.
    fn accepts(&self, dst: &DType, src: &DType) -> bool;

    /// Convert `node` to `target`. Narrowing numeric conversions are
    /// reported through `host.warn`.
    fn cast(
        &self,
        node: &Node,
        target: &DType,
        host: &mut dyn ReduceHost,
    ) -> Result<Node, CastError>;
}

/// Structural conversions: numeric conversions, wrapping into optionals and
/// boxing into `General`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicTypeService;

impl BasicTypeService {
    fn is_narrowing(src: &DType, dst: &DType) -> bool {
        if src.is_fractional() && dst.is_integral() {
            return true;
        }
        match (src, dst) {
            (DType::R8, DType::R4) => true,
            (DType::Int, dst) => dst.int_width().is_some(),
            _ => match (src.int_width(), dst.int_width()) {
                (Some((ws, ss)), Some((wd, sd))) => wd < ws || (ss != sd && wd == ws) || (ss && !sd),
                _ => false,
            },
        }
    }
}

impl TypeService for BasicTypeService {
    fn types_equal(&self, a: &DType, b: &DType) -> bool {
        a == b
    }

    fn accepts(&self, dst: &DType, src: &DType) -> bool {
        if self.types_equal(dst, src) || *dst == DType::General {
            return true;
        }
        match (dst, src) {
            (DType::Opt(to), DType::Opt(from)) => self.accepts(to, from),
            (DType::Opt(to), src) => self.accepts(to, src),
            _ => dst.is_numeric() && src.is_numeric(),
        }
    }

    fn cast(
        &self,
        node: &Node,
        target: &DType,
        host: &mut dyn ReduceHost,
    ) -> Result<Node, CastError> {
        let source = node.ty();
        if self.types_equal(source, target) {
            return Ok(node.clone());
        }
        match (target, source) {
            (DType::General, _) => Ok(Node::cast(CastOp::Box, node.clone(), DType::General)),
            (DType::Opt(to), DType::Opt(from)) if self.accepts(to, from) => {
                Ok(Node::cast(CastOp::Ref, node.clone(), target.clone()))
            }
            (DType::Opt(inner), src) if !matches!(src, DType::Opt(_)) => {
                let converted = self.cast(node, inner, host)?;
                Ok(Node::cast(CastOp::Opt, converted, target.clone()))
            }
            _ if source.is_numeric() && target.is_numeric() => {
                if Self::is_narrowing(source, target) {
                    tracing::debug!(%source, %target, "narrowing numeric cast");
                    host.warn(
                        node,
                        &format!("narrowing conversion from {source} to {target}"),
                    );
                }
                Ok(Node::cast(CastOp::Num, node.clone(), target.clone()))
            }
            _ => Err(CastError::Incompatible {
                from: source.clone(),
                to: target.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::Warnings;

    #[test]
    fn accepts_structural_conversions() {
        let svc = BasicTypeService;
        assert!(svc.accepts(&DType::Int, &DType::I4));
        assert!(svc.accepts(&DType::R8, &DType::Int));
        assert!(svc.accepts(&DType::opt(DType::Int), &DType::Int));
        assert!(svc.accepts(&DType::General, &DType::Text));
        assert!(!svc.accepts(&DType::Int, &DType::Text));
        assert!(!svc.accepts(&DType::Int, &DType::opt(DType::Int)));
    }

    #[test]
    fn widening_is_silent() {
        let mut warnings = Warnings::default();
        let x = Node::global("x", DType::I2);
        let cast = BasicTypeService
            .cast(&x, &DType::I8, &mut warnings)
            .unwrap();
        assert_eq!(cast.ty(), &DType::I8);
        assert_eq!(cast.to_string(), "num(x)");
        assert!(warnings.messages.is_empty());
    }

    #[test]
    fn narrowing_warns() {
        let mut warnings = Warnings::default();
        let x = Node::global("x", DType::R8);
        let cast = BasicTypeService
            .cast(&x, &DType::I4, &mut warnings)
            .unwrap();
        assert_eq!(cast.ty(), &DType::I4);
        assert_eq!(
            warnings.messages,
            vec!["narrowing conversion from r8 to i4".to_owned()]
        );
    }

    #[test]
    fn wraps_and_boxes() {
        let mut host = Warnings::default();
        let x = Node::global("x", DType::I4);
        let opt = BasicTypeService
            .cast(&x, &DType::opt(DType::Int), &mut host)
            .unwrap();
        assert_eq!(opt.to_string(), "opt(num(x))");
        let boxed = BasicTypeService
            .cast(&x, &DType::General, &mut host)
            .unwrap();
        assert_eq!(boxed.to_string(), "box(x)");
    }

    #[test]
    fn incompatible_is_an_error() {
        let err = BasicTypeService
            .cast(&Node::text("a"), &DType::Int, &mut Warnings::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot convert text to int");
    }
}

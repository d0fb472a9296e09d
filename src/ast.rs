//! Typed AST: one discriminated union of node kinds, plus the constant
//! evaluator and the type-tagging pass.
//!
//! Address generation is only meaningful for the addressable subset (variable
//! references, dereferences, member accesses, assignments); the parser
//! enforces addressability at assignment and address-of sites, and the
//! generator treats any other kind reaching `gen_addr` as unreachable.

use anyhow::{anyhow, bail, Result};

use crate::ty::{TypeId, TypeKind, TypeTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
    PtrAdd,
    PtrSub,
    PtrDiff,
    AddEq,
    SubEq,
    MulEq,
    DivEq,
    PtrAddEq,
    PtrSubEq,
    BitOr,
    BitXor,
    BitAnd,
    LogOr,
    LogAnd,
    Shl,
    Shr,
    ShlEq,
    ShrEq,
}

impl BinOp {
    /// Compound-assignment forms store back through the left operand.
    pub fn is_compound(self) -> bool {
        matches!(
            self,
            BinOp::AddEq
                | BinOp::SubEq
                | BinOp::MulEq
                | BinOp::DivEq
                | BinOp::PtrAddEq
                | BinOp::PtrSubEq
                | BinOp::ShlEq
                | BinOp::ShrEq
        )
    }
}

/// Where a variable reference resolves to. Local types are copied in at
/// parse time; offsets are read from the owning function's table during
/// generation because they are only finalized at scope rewind.
#[derive(Debug, Clone, PartialEq)]
pub enum VarRef {
    Local { id: usize, ty: TypeId },
    Global { label: String, ty: TypeId },
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// Comparison value; -1 and unused for the default clause.
    pub cmp: i64,
    pub body: Vec<Node>,
    pub idx: usize,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// Memoized result of [`Node::load_type`].
    pub ty: Option<TypeId>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Num(i64),
    Var(VarRef),
    Null,
    Addr(Box<Node>),
    Deref(Box<Node>),
    BitNot(Box<Node>),
    Not(Box<Node>),
    Cast {
        base: Box<Node>,
        to: TypeId,
    },
    Inc {
        body: Box<Node>,
        is_pre: bool,
    },
    Dec {
        body: Box<Node>,
        is_pre: bool,
    },
    Assign {
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Block(Vec<Node>),
    ExprStmt(Box<Node>),
    Return(Option<Box<Node>>),
    FnCall {
        name: String,
        args: Vec<Node>,
        ret_ty: TypeId,
    },
    Member {
        base: Box<Node>,
        offset: i64,
        member_ty: TypeId,
    },
    If {
        cond: Box<Node>,
        then: Box<Node>,
        els: Option<Box<Node>>,
    },
    While {
        cond: Box<Node>,
        body: Box<Node>,
    },
    DoWhile {
        cond: Box<Node>,
        body: Box<Node>,
    },
    For {
        init: Option<Box<Node>>,
        cond: Option<Box<Node>>,
        inc: Option<Box<Node>>,
        body: Box<Node>,
    },
    Switch {
        target: Box<Node>,
        cases: Vec<SwitchCase>,
        default_idx: Option<usize>,
    },
    Break,
    Continue,
    Ternary {
        cond: Box<Node>,
        then: Box<Node>,
        els: Box<Node>,
    },
    /// Block that yields its last expression's value.
    StmtExpr(Vec<Node>),
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self { kind, ty: None }
    }

    pub fn num(val: i64) -> Self {
        Self::new(NodeKind::Num(val))
    }

    pub fn null() -> Self {
        Self::new(NodeKind::Null)
    }

    /// Whether the node denotes a storage location.
    pub fn is_addressable(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Var(_) | NodeKind::Deref(_) | NodeKind::Member { .. } | NodeKind::Assign { .. }
        )
    }

    /// Compute and memoize this node's type, recursively tagging the whole
    /// subtree. Idempotent: a second call returns the memoized type.
    pub fn load_type(&mut self, types: &mut TypeTable) -> Result<TypeId> {
        if let Some(ty) = self.ty {
            return Ok(ty);
        }
        let ty = match &mut self.kind {
            NodeKind::Num(_) => TypeTable::LONG,
            NodeKind::Var(VarRef::Local { ty, .. }) | NodeKind::Var(VarRef::Global { ty, .. }) => {
                *ty
            }
            NodeKind::Null | NodeKind::Break | NodeKind::Continue => TypeTable::EMPTY,
            NodeKind::Addr(body) => {
                let t = body.load_type(types)?;
                // taking the address of an array yields a pointer to its
                // element, not to the array
                let pointee = types.base(t).filter(|_| matches!(types.kind(t), TypeKind::Arr { .. }));
                types.ptr_to(pointee.unwrap_or(t))
            }
            NodeKind::Deref(ptr) => {
                let t = ptr.load_type(types)?;
                types
                    .base(t)
                    .ok_or_else(|| anyhow!("cannot dereference a non-pointer"))?
            }
            NodeKind::BitNot(body) => body.load_type(types)?,
            NodeKind::Not(body) => {
                body.load_type(types)?;
                TypeTable::BOOL
            }
            NodeKind::Cast { base, to } => {
                base.load_type(types)?;
                *to
            }
            NodeKind::Inc { body, .. } | NodeKind::Dec { body, .. } => body.load_type(types)?,
            NodeKind::Assign { lhs, rhs } => {
                let t = lhs.load_type(types)?;
                rhs.load_type(types)?;
                t
            }
            NodeKind::Binary { lhs, rhs, .. } => {
                let t = lhs.load_type(types)?;
                rhs.load_type(types)?;
                t
            }
            NodeKind::Block(body) => {
                for node in body.iter_mut() {
                    node.load_type(types)?;
                }
                TypeTable::EMPTY
            }
            NodeKind::StmtExpr(body) => {
                let mut last = TypeTable::EMPTY;
                for node in body.iter_mut() {
                    last = node.load_type(types)?;
                }
                last
            }
            NodeKind::ExprStmt(body) => {
                body.load_type(types)?;
                TypeTable::EMPTY
            }
            NodeKind::Return(rhs) => match rhs {
                Some(r) => r.load_type(types)?,
                None => TypeTable::EMPTY,
            },
            NodeKind::FnCall { args, ret_ty, .. } => {
                for arg in args.iter_mut() {
                    arg.load_type(types)?;
                }
                *ret_ty
            }
            NodeKind::Member {
                base, member_ty, ..
            } => {
                base.load_type(types)?;
                *member_ty
            }
            NodeKind::If { cond, then, els } => {
                cond.load_type(types)?;
                then.load_type(types)?;
                if let Some(els) = els {
                    els.load_type(types)?;
                }
                TypeTable::EMPTY
            }
            NodeKind::While { cond, body } | NodeKind::DoWhile { cond, body } => {
                cond.load_type(types)?;
                body.load_type(types)?;
                TypeTable::EMPTY
            }
            NodeKind::For {
                init,
                cond,
                inc,
                body,
            } => {
                for n in [init, cond, inc].into_iter().flatten() {
                    n.load_type(types)?;
                }
                body.load_type(types)?;
                TypeTable::EMPTY
            }
            NodeKind::Switch { target, cases, .. } => {
                target.load_type(types)?;
                for case in cases.iter_mut() {
                    for node in case.body.iter_mut() {
                        node.load_type(types)?;
                    }
                }
                TypeTable::EMPTY
            }
            NodeKind::Ternary { cond, then, els } => {
                cond.load_type(types)?;
                els.load_type(types)?;
                then.load_type(types)?
            }
        };
        self.ty = Some(ty);
        Ok(ty)
    }
}

/// `lhs + rhs`, picking integer or pointer addition from the operand types.
/// The pointer side is forced to the left so the generator can scale the
/// right operand.
pub fn new_add(types: &mut TypeTable, mut lhs: Node, mut rhs: Node) -> Result<Node> {
    let lt = lhs.load_type(types)?;
    let rt = rhs.load_type(types)?;
    let kind = if types.is_integer(lt) && types.is_integer(rt) {
        NodeKind::Binary {
            op: BinOp::Add,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    } else if types.is_integer(lt) && types.is_pointing(rt) {
        NodeKind::Binary {
            op: BinOp::PtrAdd,
            lhs: Box::new(rhs),
            rhs: Box::new(lhs),
        }
    } else if types.is_pointing(lt) && types.is_integer(rt) {
        NodeKind::Binary {
            op: BinOp::PtrAdd,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    } else {
        bail!("unexpected operand types for addition");
    };
    Ok(Node::new(kind))
}

/// `lhs - rhs`: int-int, ptr-int, or ptr-ptr (scaled element distance).
pub fn new_sub(types: &mut TypeTable, mut lhs: Node, mut rhs: Node) -> Result<Node> {
    let lt = lhs.load_type(types)?;
    let rt = rhs.load_type(types)?;
    let op = if types.is_integer(lt) && types.is_integer(rt) {
        BinOp::Sub
    } else if types.is_pointing(lt) && types.is_integer(rt) {
        BinOp::PtrSub
    } else if types.is_pointing(lt) && types.is_pointing(rt) {
        BinOp::PtrDiff
    } else {
        bail!("unexpected operand types for subtraction");
    };
    Ok(Node::new(NodeKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }))
}

/// Reduce a constant expression to its value at parse time. Required for
/// array bounds, case labels and enumerator values.
pub fn eval(n: &Node) -> Result<i64> {
    match &n.kind {
        NodeKind::Num(val) => Ok(*val),
        NodeKind::BitNot(body) => Ok(!eval(body)?),
        NodeKind::Not(body) => Ok((eval(body)? == 0) as i64),
        NodeKind::Ternary { cond, then, els } => {
            if eval(cond)? != 0 {
                eval(then)
            } else {
                eval(els)
            }
        }
        NodeKind::Binary { op, lhs, rhs } => {
            let l = eval(lhs)?;
            let r = eval(rhs)?;
            Ok(match op {
                BinOp::Add => l.wrapping_add(r),
                BinOp::Sub => l.wrapping_sub(r),
                BinOp::Mul => l.wrapping_mul(r),
                BinOp::Div => {
                    if r == 0 {
                        bail!("division by zero in a constant expression");
                    }
                    l.wrapping_div(r)
                }
                BinOp::BitOr => l | r,
                BinOp::BitXor => l ^ r,
                BinOp::BitAnd => l & r,
                BinOp::Shl => l.wrapping_shl(r as u32),
                BinOp::Shr => l.wrapping_shr(r as u32),
                BinOp::Eq => (l == r) as i64,
                BinOp::Neq => (l != r) as i64,
                BinOp::Lt => (l < r) as i64,
                BinOp::Leq => (l <= r) as i64,
                BinOp::Gt => (l > r) as i64,
                BinOp::Geq => (l >= r) as i64,
                BinOp::LogAnd => (l != 0 && r != 0) as i64,
                BinOp::LogOr => (l != 0 || r != 0) as i64,
                _ => bail!("not a constant expression"),
            })
        }
        _ => bail!("not a constant expression"),
    }
}

/// Local variable; the offset is from the frame pointer and is finalized
/// during scope rewind.
#[derive(Debug, Clone)]
pub struct LVar {
    pub name: String,
    pub ty: TypeId,
    pub offset: i64,
}

/// Global variable or anonymous data object. `emit` is false for `extern`
/// declarations, which get a symbol but no storage here.
#[derive(Debug, Clone)]
pub struct GVar {
    pub label: String,
    pub ty: TypeId,
    pub emit: bool,
    pub init: Option<GVarInit>,
}

/// Link-time-constant initializer tree, serialized into `.data` directives.
#[derive(Debug, Clone, PartialEq)]
pub enum GVarInit {
    Arr(Vec<GVarInit>),
    /// Reference to another global's label.
    Label(String),
    Str(Vec<u8>),
    Int { val: i64, size: i64 },
    Zero(i64),
}

#[derive(Debug)]
pub struct FnDef {
    pub name: String,
    pub is_static: bool,
    pub ret_ty: TypeId,
    /// Indices into `lvars`, in declaration order.
    pub params: Vec<usize>,
    pub lvars: Vec<LVar>,
    pub body: Vec<Node>,
    pub stack_size: i64,
}

#[derive(Debug)]
pub struct Program {
    pub fns: Vec<FnDef>,
    pub gvars: Vec<GVar>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn bin(op: BinOp, l: i64, r: i64) -> Node {
        Node::new(NodeKind::Binary {
            op,
            lhs: Box::new(Node::num(l)),
            rhs: Box::new(Node::num(r)),
        })
    }

    #[rstest]
    #[case(BinOp::Add, 2, 3, 5)]
    #[case(BinOp::Sub, 2, 3, -1)]
    #[case(BinOp::Mul, 4, 3, 12)]
    #[case(BinOp::Div, 7, 2, 3)]
    #[case(BinOp::BitOr, 0b100, 0b001, 0b101)]
    #[case(BinOp::BitXor, 0b110, 0b011, 0b101)]
    #[case(BinOp::BitAnd, 0b110, 0b011, 0b010)]
    #[case(BinOp::Shl, 1, 4, 16)]
    #[case(BinOp::Shr, 16, 2, 4)]
    #[case(BinOp::Eq, 3, 3, 1)]
    #[case(BinOp::Neq, 3, 3, 0)]
    #[case(BinOp::Lt, 2, 3, 1)]
    #[case(BinOp::Leq, 3, 3, 1)]
    #[case(BinOp::Gt, 2, 3, 0)]
    #[case(BinOp::Geq, 3, 3, 1)]
    #[case(BinOp::Geq, 4, 3, 1)]
    #[case(BinOp::Geq, 2, 3, 0)]
    #[case(BinOp::LogAnd, 2, 1, 1)]
    #[case(BinOp::LogAnd, 2, 0, 0)]
    #[case(BinOp::LogOr, 0, 2, 1)]
    #[case(BinOp::LogOr, 0, 0, 0)]
    fn eval_binary(#[case] op: BinOp, #[case] l: i64, #[case] r: i64, #[case] expected: i64) {
        assert_eq!(eval(&bin(op, l, r)).unwrap(), expected);
    }

    #[test]
    fn eval_unary_and_ternary() {
        assert_eq!(eval(&Node::new(NodeKind::BitNot(Box::new(Node::num(0))))).unwrap(), -1);
        assert_eq!(eval(&Node::new(NodeKind::Not(Box::new(Node::num(0))))).unwrap(), 1);
        assert_eq!(eval(&Node::new(NodeKind::Not(Box::new(Node::num(7))))).unwrap(), 0);
        let t = Node::new(NodeKind::Ternary {
            cond: Box::new(Node::num(0)),
            then: Box::new(Node::num(1)),
            els: Box::new(Node::num(2)),
        });
        assert_eq!(eval(&t).unwrap(), 2);
    }

    #[test]
    fn eval_rejects_non_constants() {
        let var = Node::new(NodeKind::Var(VarRef::Local {
            id: 0,
            ty: TypeTable::INT,
        }));
        assert!(eval(&var).is_err());
        assert!(eval(&bin(BinOp::Div, 1, 0)).is_err());
    }

    #[test]
    fn add_picks_pointer_variants() {
        let mut types = TypeTable::new();
        let ptr = types.ptr_to(TypeTable::INT);
        let var = Node::new(NodeKind::Var(VarRef::Local { id: 0, ty: ptr }));

        let n = new_add(&mut types, var.clone(), Node::num(1)).unwrap();
        assert!(matches!(n.kind, NodeKind::Binary { op: BinOp::PtrAdd, .. }));

        // the pointer side is forced to the left
        let n = new_add(&mut types, Node::num(1), var.clone()).unwrap();
        match n.kind {
            NodeKind::Binary { op, lhs, .. } => {
                assert_eq!(op, BinOp::PtrAdd);
                assert!(matches!(lhs.kind, NodeKind::Var(_)));
            }
            other => panic!("unexpected node {other:?}"),
        }

        let n = new_sub(&mut types, var.clone(), var.clone()).unwrap();
        assert!(matches!(n.kind, NodeKind::Binary { op: BinOp::PtrDiff, .. }));

        assert!(new_add(&mut types, var.clone(), var).is_err());
    }

    #[test]
    fn load_type_is_idempotent_and_decays_addr_of_array() {
        let mut types = TypeTable::new();
        let arr = types.arr_of(TypeTable::INT, 4);
        let mut addr = Node::new(NodeKind::Addr(Box::new(Node::new(NodeKind::Var(
            VarRef::Local { id: 0, ty: arr },
        )))));
        let t1 = addr.load_type(&mut types).unwrap();
        let t2 = addr.load_type(&mut types).unwrap();
        assert_eq!(t1, t2);
        assert_eq!(types.base(t1), Some(TypeTable::INT));
    }
}

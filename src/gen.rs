//! Stack-machine code generator: AST to x86-64 assembly in GNU assembler
//! Intel dialect.
//!
//! Every generated expression pushes exactly one value; statements leave the
//! stack balanced. `rax` is the scratch top-of-stack register and `rdi`
//! holds the second operand of binary operations. Assembly is accumulated in
//! memory so nothing reaches stdout unless the whole compilation succeeds.

use std::fmt::Write;

use anyhow::{anyhow, bail, ensure, Result};

use crate::ast::{BinOp, FnDef, GVarInit, LVar, Node, NodeKind, Program, VarRef};
use crate::ty::{TypeId, TypeKind, TypeTable};

const PARAM_REGS_1: [&str; 6] = ["dil", "sil", "dl", "cl", "r8b", "r9b"];
const PARAM_REGS_2: [&str; 6] = ["di", "si", "dx", "cx", "r8w", "r9w"];
const PARAM_REGS_4: [&str; 6] = ["edi", "esi", "edx", "ecx", "r8d", "r9d"];
const PARAM_REGS_8: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];

/// Lower a whole program: `.intel_syntax noprefix`, the `.data` section with
/// every emitted global, then `.text` with every function.
pub fn gen_program(prog: &Program, types: &TypeTable) -> Result<String> {
    let mut g = Gen {
        types,
        out: String::new(),
        label_count: 0,
        jmp_label: None,
        cur_fn: "",
        cur_lvars: &[],
    };
    writeln!(g.out, ".intel_syntax noprefix")?;
    g.gen_data(prog)?;
    g.gen_text(prog)?;
    Ok(g.out)
}

struct Gen<'a> {
    types: &'a TypeTable,
    out: String,
    /// One monotonic counter for every control-flow label.
    label_count: usize,
    /// Label id of the innermost enclosing loop or switch, the target of
    /// `break`/`continue`. Saved and restored around each nested construct.
    jmp_label: Option<usize>,
    cur_fn: &'a str,
    cur_lvars: &'a [LVar],
}

impl<'a> Gen<'a> {
    fn new_label(&mut self) -> usize {
        let c = self.label_count;
        self.label_count += 1;
        c
    }

    fn node_ty(&self, n: &Node) -> Result<TypeId> {
        n.ty
            .ok_or_else(|| anyhow!("internal error: untyped node reached the generator"))
    }

    fn is_arr(&self, ty: TypeId) -> bool {
        matches!(self.types.kind(ty), TypeKind::Arr { .. })
    }

    /// Element size behind a pointer-like type, the scale factor of pointer
    /// arithmetic and `++`/`--`.
    fn base_size(&self, ty: TypeId) -> Result<i64> {
        let base = self
            .types
            .base(ty)
            .ok_or_else(|| anyhow!("internal error: pointer arithmetic on a non-pointer"))?;
        Ok(self.types.size(base))
    }

    // ---- data section ----

    fn gen_data(&mut self, prog: &Program) -> Result<()> {
        writeln!(self.out, ".data")?;
        for g in prog.gvars.iter().filter(|g| g.emit) {
            writeln!(self.out, "{}:", g.label)?;
            match &g.init {
                None => writeln!(self.out, "\t.zero {}", self.types.size(g.ty))?,
                Some(init) => self.gen_gvar_init(init, g.ty)?,
            }
        }
        Ok(())
    }

    fn gen_gvar_init(&mut self, init: &GVarInit, ty: TypeId) -> Result<()> {
        match init {
            GVarInit::Arr(body) => {
                let kind = self.types.kind(ty).clone();
                for (i, e) in body.iter().enumerate() {
                    let elem_ty = match &kind {
                        TypeKind::Arr { base, .. } => *base,
                        TypeKind::Struct { members, .. } => {
                            members.get(i).map(|m| m.ty).unwrap_or(ty)
                        }
                        _ => ty,
                    };
                    self.gen_gvar_init(e, elem_ty)?;
                }
            }
            GVarInit::Label(label) => writeln!(self.out, "\t.quad {label}")?,
            GVarInit::Str(content) => {
                let data_len = content
                    .iter()
                    .rposition(|&b| b != 0)
                    .map(|p| p + 1)
                    .unwrap_or(0);
                writeln!(self.out, "\t.string \"{}\"", escape_string(&content[..data_len]))?;
                // `.string` itself stores one NUL; pad the rest
                let pad = content.len() as i64 - data_len as i64 - 1;
                writeln!(self.out, "\t.zero {}", pad.max(0))?;
            }
            GVarInit::Int { val, size } => match size {
                1 => writeln!(self.out, "\t.byte {val}")?,
                2 => writeln!(self.out, "\t.value {val}")?,
                4 => writeln!(self.out, "\t.long {val}")?,
                8 => writeln!(self.out, "\t.quad {val}")?,
                _ => bail!("unhandled type size {size} in a global initializer"),
            },
            GVarInit::Zero(len) => writeln!(self.out, "\t.zero {len}")?,
        }
        Ok(())
    }

    // ---- text section ----

    fn gen_text(&mut self, prog: &'a Program) -> Result<()> {
        writeln!(self.out, ".text")?;
        for f in &prog.fns {
            self.cur_fn = &f.name;
            self.cur_lvars = &f.lvars;
            self.gen_fn(f)?;
        }
        Ok(())
    }

    fn gen_fn(&mut self, f: &FnDef) -> Result<()> {
        ensure!(
            f.params.len() <= PARAM_REGS_8.len(),
            "too many parameters in function {}",
            f.name
        );
        if !f.is_static {
            writeln!(self.out, ".globl {}", f.name)?;
        }
        writeln!(self.out, "{}:", f.name)?;
        writeln!(self.out, "\tpush rbp")?;
        writeln!(self.out, "\tmov rbp, rsp")?;
        writeln!(self.out, "\tsub rsp, {}", f.stack_size)?;
        for (i, &id) in f.params.iter().enumerate() {
            let v = &f.lvars[id];
            let regs = match self.types.size(v.ty) {
                1 => PARAM_REGS_1,
                2 => PARAM_REGS_2,
                4 => PARAM_REGS_4,
                8 => PARAM_REGS_8,
                n => bail!("unhandled type size {n} for parameter {}", v.name),
            };
            writeln!(self.out, "\tmov [rbp-{}], {}", v.offset, regs[i])?;
        }
        for node in &f.body {
            self.gen(node)?;
        }
        writeln!(self.out, ".L.return.{}:", f.name)?;
        writeln!(self.out, "\tmov rsp, rbp")?;
        writeln!(self.out, "\tpop rbp")?;
        writeln!(self.out, "\tret")?;
        Ok(())
    }

    // ---- memory access ----

    /// Pop an address, push the sign-extended value behind it.
    fn load(&mut self, ty: TypeId) -> Result<()> {
        writeln!(self.out, "\tpop rax")?;
        match self.types.size(ty) {
            1 => writeln!(self.out, "\tmovsx rax, byte ptr [rax]")?,
            2 => writeln!(self.out, "\tmovsx rax, word ptr [rax]")?,
            4 => writeln!(self.out, "\tmovsxd rax, dword ptr [rax]")?,
            8 => writeln!(self.out, "\tmov rax, [rax]")?,
            n => bail!("unhandled type size {n} in load"),
        }
        writeln!(self.out, "\tpush rax")?;
        Ok(())
    }

    /// Pop a value then an address, store by width, push the value back.
    /// `_Bool` stores normalize the value to 0/1 first.
    fn store(&mut self, ty: TypeId) -> Result<()> {
        writeln!(self.out, "\tpop rdi")?;
        writeln!(self.out, "\tpop rax")?;
        if matches!(self.types.kind(ty), TypeKind::Bool) {
            writeln!(self.out, "\tcmp rdi, 0")?;
            writeln!(self.out, "\tsetne dil")?;
            writeln!(self.out, "\tmovzb rdi, dil")?;
        }
        let reg = match self.types.size(ty) {
            1 => "dil",
            2 => "di",
            4 => "edi",
            8 => "rdi",
            n => bail!("unhandled type size {n} in store"),
        };
        writeln!(self.out, "\tmov [rax], {reg}")?;
        writeln!(self.out, "\tpush rdi")?;
        Ok(())
    }

    /// Push the address a storage-denoting node refers to. Reaching this
    /// with any other node kind means the parser let a non-addressable
    /// expression through.
    fn gen_addr(&mut self, node: &Node) -> Result<()> {
        match &node.kind {
            NodeKind::Var(VarRef::Local { id, .. }) => {
                writeln!(self.out, "\tlea rax, [rbp-{}]", self.cur_lvars[*id].offset)?;
                writeln!(self.out, "\tpush rax")?;
            }
            NodeKind::Var(VarRef::Global { label, .. }) => {
                writeln!(self.out, "\tpush offset {label}")?;
            }
            NodeKind::Deref(ptr) => self.gen(ptr)?,
            NodeKind::Member { base, offset, .. } => {
                self.gen_addr(base)?;
                writeln!(self.out, "\tpop rax")?;
                writeln!(self.out, "\tadd rax, {offset}")?;
                writeln!(self.out, "\tpush rax")?;
            }
            _ => bail!("internal error: node is not addressable"),
        }
        Ok(())
    }

    // ---- expression and statement lowering ----

    fn gen(&mut self, node: &Node) -> Result<()> {
        match &node.kind {
            NodeKind::Null => {}
            NodeKind::Num(val) => {
                if *val > i32::MAX as i64 {
                    writeln!(self.out, "\tmovabs rax, {val}")?;
                    writeln!(self.out, "\tpush rax")?;
                } else {
                    writeln!(self.out, "\tpush {val}")?;
                }
            }
            NodeKind::Var(_) | NodeKind::Member { .. } => {
                self.gen_addr(node)?;
                let ty = self.node_ty(node)?;
                // array rvalues stay addresses: decay at the use site
                if !self.is_arr(ty) {
                    self.load(ty)?;
                }
            }
            NodeKind::Addr(body) => self.gen_addr(body)?,
            NodeKind::Deref(ptr) => {
                self.gen(ptr)?;
                let ty = self.node_ty(node)?;
                if !self.is_arr(ty) {
                    self.load(ty)?;
                }
            }
            NodeKind::BitNot(body) => {
                self.gen(body)?;
                writeln!(self.out, "\tpop rax")?;
                writeln!(self.out, "\tnot rax")?;
                writeln!(self.out, "\tpush rax")?;
            }
            NodeKind::Not(body) => {
                self.gen(body)?;
                writeln!(self.out, "\tpop rax")?;
                writeln!(self.out, "\tcmp rax, 0")?;
                writeln!(self.out, "\tsete al")?;
                writeln!(self.out, "\tmovzb rax, al")?;
                writeln!(self.out, "\tpush rax")?;
            }
            NodeKind::Cast { base, to } => {
                self.gen(base)?;
                writeln!(self.out, "\tpop rax")?;
                if matches!(self.types.kind(*to), TypeKind::Bool) {
                    writeln!(self.out, "\tcmp rax, 0")?;
                    writeln!(self.out, "\tsetne al")?;
                }
                match self.types.size(*to) {
                    1 => writeln!(self.out, "\tmovsx rax, al")?,
                    2 => writeln!(self.out, "\tmovsx rax, ax")?,
                    4 => writeln!(self.out, "\tmovsxd rax, eax")?,
                    8 => {}
                    n => bail!("unhandled type size {n} in cast"),
                }
                writeln!(self.out, "\tpush rax")?;
            }
            NodeKind::Inc { body, is_pre } => self.gen_incdec(node, body, *is_pre, true)?,
            NodeKind::Dec { body, is_pre } => self.gen_incdec(node, body, *is_pre, false)?,
            NodeKind::Assign { lhs, rhs } => {
                self.gen_addr(lhs)?;
                self.gen(rhs)?;
                self.store(self.node_ty(node)?)?;
            }
            NodeKind::Binary { op, lhs, rhs } => self.gen_binary(node, *op, lhs, rhs)?,
            NodeKind::Block(body) => {
                for n in body {
                    self.gen(n)?;
                }
            }
            NodeKind::ExprStmt(body) => {
                self.gen(body)?;
                writeln!(self.out, "\tadd rsp, 8")?;
            }
            NodeKind::StmtExpr(body) => {
                for n in body {
                    self.gen(n)?;
                }
            }
            NodeKind::Return(rhs) => {
                if let Some(rhs) = rhs {
                    self.gen(rhs)?;
                    writeln!(self.out, "\tpop rax")?;
                }
                writeln!(self.out, "\tjmp .L.return.{}", self.cur_fn)?;
            }
            NodeKind::FnCall { name, args, .. } => {
                ensure!(
                    args.len() <= PARAM_REGS_8.len(),
                    "too many arguments in call to {name}"
                );
                for arg in args {
                    self.gen(arg)?;
                }
                for i in (0..args.len()).rev() {
                    writeln!(self.out, "\tpop {}", PARAM_REGS_8[i])?;
                }
                // the stack pointer must sit on a 16-byte boundary at the
                // call; check at runtime and pad if not
                let c = self.new_label();
                writeln!(self.out, "\tmov rax, rsp")?;
                writeln!(self.out, "\tand rax, 15")?;
                writeln!(self.out, "\tjz .L.func.call.{c}")?;
                writeln!(self.out, "\tmov rax, 0")?;
                writeln!(self.out, "\tcall {name}")?;
                writeln!(self.out, "\tjmp .L.func.end.{c}")?;
                writeln!(self.out, ".L.func.call.{c}:")?;
                writeln!(self.out, "\tsub rsp, 8")?;
                writeln!(self.out, "\tmov rax, 0")?;
                writeln!(self.out, "\tcall {name}")?;
                writeln!(self.out, "\tadd rsp, 8")?;
                writeln!(self.out, ".L.func.end.{c}:")?;
                writeln!(self.out, "\tpush rax")?;
            }
            NodeKind::If { cond, then, els } => {
                let c = self.new_label();
                self.gen(cond)?;
                writeln!(self.out, "\tpop rax")?;
                writeln!(self.out, "\tcmp rax, 0")?;
                if let Some(els) = els {
                    writeln!(self.out, "\tje .L.else.{c}")?;
                    self.gen(then)?;
                    writeln!(self.out, "\tjmp .L.end.{c}")?;
                    writeln!(self.out, ".L.else.{c}:")?;
                    self.gen(els)?;
                } else {
                    writeln!(self.out, "\tje .L.end.{c}")?;
                    self.gen(then)?;
                }
                writeln!(self.out, ".L.end.{c}:")?;
            }
            NodeKind::While { cond, body } => {
                let c = self.new_label();
                let prev = self.jmp_label.replace(c);
                writeln!(self.out, ".L.continue.{c}:")?;
                self.gen(cond)?;
                writeln!(self.out, "\tpop rax")?;
                writeln!(self.out, "\tcmp rax, 0")?;
                writeln!(self.out, "\tje .L.break.{c}")?;
                self.gen(body)?;
                writeln!(self.out, "\tjmp .L.continue.{c}")?;
                writeln!(self.out, ".L.break.{c}:")?;
                self.jmp_label = prev;
            }
            NodeKind::DoWhile { cond, body } => {
                let c = self.new_label();
                let prev = self.jmp_label.replace(c);
                writeln!(self.out, ".L.do.while.{c}:")?;
                self.gen(body)?;
                writeln!(self.out, ".L.continue.{c}:")?;
                self.gen(cond)?;
                writeln!(self.out, "\tpop rax")?;
                writeln!(self.out, "\tcmp rax, 0")?;
                writeln!(self.out, "\tjne .L.do.while.{c}")?;
                writeln!(self.out, ".L.break.{c}:")?;
                self.jmp_label = prev;
            }
            NodeKind::For {
                init,
                cond,
                inc,
                body,
            } => {
                let c = self.new_label();
                let prev = self.jmp_label.replace(c);
                if let Some(init) = init {
                    self.gen(init)?;
                }
                writeln!(self.out, ".L.begin.{c}:")?;
                if let Some(cond) = cond {
                    self.gen(cond)?;
                    writeln!(self.out, "\tpop rax")?;
                    writeln!(self.out, "\tcmp rax, 0")?;
                    writeln!(self.out, "\tje .L.break.{c}")?;
                }
                self.gen(body)?;
                writeln!(self.out, ".L.continue.{c}:")?;
                if let Some(inc) = inc {
                    self.gen(inc)?;
                }
                writeln!(self.out, "\tjmp .L.begin.{c}")?;
                writeln!(self.out, ".L.break.{c}:")?;
                self.jmp_label = prev;
            }
            NodeKind::Switch {
                target,
                cases,
                default_idx,
            } => {
                let c = self.new_label();
                let prev = self.jmp_label.replace(c);
                self.gen(target)?;
                writeln!(self.out, "\tpop rax")?;
                for case in cases {
                    if *default_idx == Some(case.idx) {
                        continue;
                    }
                    writeln!(self.out, "\tcmp rax, {}", case.cmp)?;
                    writeln!(self.out, "\tje .L.case.{c}.{}", case.idx)?;
                }
                match default_idx {
                    Some(idx) => writeln!(self.out, "\tjmp .L.case.{c}.{idx}")?,
                    None => writeln!(self.out, "\tjmp .L.break.{c}")?,
                }
                // bodies in source order so fall-through is the raw jump
                // order
                for case in cases {
                    writeln!(self.out, ".L.case.{c}.{}:", case.idx)?;
                    for n in &case.body {
                        self.gen(n)?;
                    }
                }
                writeln!(self.out, ".L.break.{c}:")?;
                self.jmp_label = prev;
            }
            NodeKind::Break => match self.jmp_label {
                Some(c) => writeln!(self.out, "\tjmp .L.break.{c}")?,
                None => bail!("invalid break statement"),
            },
            NodeKind::Continue => match self.jmp_label {
                Some(c) => writeln!(self.out, "\tjmp .L.continue.{c}")?,
                None => bail!("invalid continue statement"),
            },
            NodeKind::Ternary { cond, then, els } => {
                let c = self.new_label();
                self.gen(cond)?;
                writeln!(self.out, "\tpop rax")?;
                writeln!(self.out, "\tcmp rax, 0")?;
                writeln!(self.out, "\tje .L.ternary.{c}.rhs")?;
                self.gen(then)?;
                writeln!(self.out, "\tjmp .L.ternary.{c}.end")?;
                writeln!(self.out, ".L.ternary.{c}.rhs:")?;
                self.gen(els)?;
                writeln!(self.out, ".L.ternary.{c}.end:")?;
            }
        }
        Ok(())
    }

    /// `++`/`--`: duplicate the address, load, bump by 1 (or the element
    /// size for pointer-likes), store; postfix forms then undo the bump on
    /// the value left behind.
    fn gen_incdec(&mut self, node: &Node, body: &Node, is_pre: bool, is_inc: bool) -> Result<()> {
        let ty = self.node_ty(node)?;
        let diff = if self.types.is_pointing(ty) {
            self.base_size(ty)?
        } else {
            1
        };
        let (op, undo) = if is_inc { ("add", "sub") } else { ("sub", "add") };
        self.gen_addr(body)?;
        writeln!(self.out, "\tpush qword ptr [rsp]")?;
        self.load(ty)?;
        writeln!(self.out, "\tpop rax")?;
        writeln!(self.out, "\t{op} rax, {diff}")?;
        writeln!(self.out, "\tpush rax")?;
        self.store(ty)?;
        if !is_pre {
            writeln!(self.out, "\tpop rax")?;
            writeln!(self.out, "\t{undo} rax, {diff}")?;
            writeln!(self.out, "\tpush rax")?;
        }
        Ok(())
    }

    fn gen_binary(&mut self, node: &Node, op: BinOp, lhs: &Node, rhs: &Node) -> Result<()> {
        if op.is_compound() {
            self.gen_addr(lhs)?;
        }
        self.gen(lhs)?;
        self.gen(rhs)?;

        writeln!(self.out, "\tpop rdi")?;
        writeln!(self.out, "\tpop rax")?;

        match op {
            BinOp::Add | BinOp::AddEq => writeln!(self.out, "\tadd rax, rdi")?,
            BinOp::Sub | BinOp::SubEq => writeln!(self.out, "\tsub rax, rdi")?,
            BinOp::Mul | BinOp::MulEq => writeln!(self.out, "\timul rax, rdi")?,
            BinOp::Div | BinOp::DivEq => {
                writeln!(self.out, "\tcqo")?;
                writeln!(self.out, "\tidiv rdi")?;
            }
            BinOp::Eq => self.gen_cmp("sete", false)?,
            BinOp::Neq => self.gen_cmp("setne", false)?,
            BinOp::Lt => self.gen_cmp("setl", false)?,
            BinOp::Leq => self.gen_cmp("setle", false)?,
            BinOp::Gt => self.gen_cmp("setl", true)?,
            BinOp::Geq => self.gen_cmp("setle", true)?,
            BinOp::PtrAdd | BinOp::PtrAddEq => {
                let scale = self.base_size(self.node_ty(node)?)?;
                writeln!(self.out, "\timul rdi, {scale}")?;
                writeln!(self.out, "\tadd rax, rdi")?;
            }
            BinOp::PtrSub | BinOp::PtrSubEq => {
                let scale = self.base_size(self.node_ty(node)?)?;
                writeln!(self.out, "\timul rdi, {scale}")?;
                writeln!(self.out, "\tsub rax, rdi")?;
            }
            BinOp::PtrDiff => {
                let scale = self.base_size(self.node_ty(lhs)?)?;
                writeln!(self.out, "\tsub rax, rdi")?;
                writeln!(self.out, "\tcqo")?;
                writeln!(self.out, "\tmov rdi, {scale}")?;
                writeln!(self.out, "\tidiv rdi")?;
            }
            BinOp::BitOr => writeln!(self.out, "\tor rax, rdi")?,
            BinOp::BitXor => writeln!(self.out, "\txor rax, rdi")?,
            BinOp::BitAnd => writeln!(self.out, "\tand rax, rdi")?,
            BinOp::LogOr => {
                let c = self.new_label();
                writeln!(self.out, "\tcmp rax, 0")?;
                writeln!(self.out, "\tjne .L.true.{c}")?;
                writeln!(self.out, "\tcmp rdi, 0")?;
                writeln!(self.out, "\tjne .L.true.{c}")?;
                writeln!(self.out, "\tsetne al")?;
                writeln!(self.out, "\tmovzb rax, al")?;
                writeln!(self.out, "\tjmp .L.end.{c}")?;
                writeln!(self.out, ".L.true.{c}:")?;
                writeln!(self.out, "\tsetne al")?;
                writeln!(self.out, "\tmovzb rax, al")?;
                writeln!(self.out, ".L.end.{c}:")?;
            }
            BinOp::LogAnd => {
                let c = self.new_label();
                writeln!(self.out, "\tcmp rax, 0")?;
                writeln!(self.out, "\tje .L.false.{c}")?;
                writeln!(self.out, "\tcmp rdi, 0")?;
                writeln!(self.out, "\tje .L.false.{c}")?;
                writeln!(self.out, "\tsetne al")?;
                writeln!(self.out, "\tmovzb rax, al")?;
                writeln!(self.out, "\tjmp .L.end.{c}")?;
                writeln!(self.out, ".L.false.{c}:")?;
                writeln!(self.out, "\tsetne al")?;
                writeln!(self.out, "\tmovzb rax, al")?;
                writeln!(self.out, ".L.end.{c}:")?;
            }
            BinOp::Shl | BinOp::ShlEq => {
                writeln!(self.out, "\tmov cl, dil")?;
                writeln!(self.out, "\tsal rax, cl")?;
            }
            BinOp::Shr | BinOp::ShrEq => {
                writeln!(self.out, "\tmov cl, dil")?;
                writeln!(self.out, "\tsar rax, cl")?;
            }
        }

        writeln!(self.out, "\tpush rax")?;

        if op.is_compound() {
            self.store(self.node_ty(node)?)?;
        }
        Ok(())
    }

    /// `cmp` plus a `set*`; `swapped` compares `rdi, rax` for the `>`/`>=`
    /// forms.
    fn gen_cmp(&mut self, set: &str, swapped: bool) -> Result<()> {
        if swapped {
            writeln!(self.out, "\tcmp rdi, rax")?;
        } else {
            writeln!(self.out, "\tcmp rax, rdi")?;
        }
        writeln!(self.out, "\t{set} al")?;
        writeln!(self.out, "\tmovzb rax, al")?;
        Ok(())
    }
}

fn escape_string(bytes: &[u8]) -> String {
    let mut s = String::new();
    for &b in bytes {
        match b {
            b'\\' => s.push_str("\\\\"),
            b'"' => s.push_str("\\\""),
            b'\n' => s.push_str("\\n"),
            b'\t' => s.push_str("\\t"),
            b'\r' => s.push_str("\\r"),
            0x20..=0x7e => s.push(b as char),
            _ => {
                s.push_str(&format!("\\{b:03o}"));
            }
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use crate::compile_str;

    #[test]
    fn loads_sign_extend_by_width() {
        let asm = compile_str("int main() { char c; c = 1; return c; }").unwrap();
        assert!(asm.contains("movsx rax, byte ptr [rax]"));
        assert!(asm.contains("mov [rax], dil"));

        let asm = compile_str("int main() { short s; s = 1; return s; }").unwrap();
        assert!(asm.contains("movsx rax, word ptr [rax]"));
        assert!(asm.contains("mov [rax], di"));

        let asm = compile_str("int main() { long l; l = 1; return l; }").unwrap();
        assert!(asm.contains("mov [rax], rdi"));
    }

    #[test]
    fn bool_stores_normalize_to_zero_or_one() {
        let asm = compile_str("int main() { _Bool b; b = 5; return b; }").unwrap();
        assert!(asm.contains("setne dil"));
        assert!(asm.contains("movzb rdi, dil"));
    }

    #[test]
    fn pointer_arithmetic_scales_by_element_size() {
        let asm =
            compile_str("int main() { int a[4]; int *p; p = a; return *(p + 2); }").unwrap();
        assert!(asm.contains("imul rdi, 4"));
        let asm = compile_str("int main() { long a[2]; return *(a + 1); }").unwrap();
        assert!(asm.contains("imul rdi, 8"));
    }

    #[test]
    fn pointer_difference_divides_by_element_size() {
        let asm = compile_str("int main() { int a[4]; return (a + 3) - a; }").unwrap();
        assert!(asm.contains("mov rdi, 4"));
        assert!(asm.contains("idiv rdi"));
    }

    #[test]
    fn break_and_continue_outside_a_loop_are_fatal() {
        assert!(compile_str("int main() { break; return 0; }").is_err());
        assert!(compile_str("int main() { continue; return 0; }").is_err());
    }

    #[test]
    fn break_targets_the_innermost_construct() {
        let asm = compile_str(
            "int main() { while (1) { while (1) { break; } break; } return 0; }",
        )
        .unwrap();
        // outer loop gets label 0, inner loop label 1; the first break
        // belongs to the inner loop
        let inner = asm.find("jmp .L.break.1").unwrap();
        let outer = asm.find("jmp .L.break.0").unwrap();
        assert!(inner < outer);
    }

    #[test]
    fn calls_keep_sixteen_byte_alignment_at_runtime() {
        let asm = compile_str("int f() { return 1; } int main() { return f(); }").unwrap();
        assert!(asm.contains("and rax, 15"));
        assert!(asm.contains("sub rsp, 8"));
        assert!(asm.contains("add rsp, 8"));
    }

    #[test]
    fn too_many_call_arguments_are_rejected() {
        assert!(compile_str("int main() { return f(1, 2, 3, 4, 5, 6, 7); }").is_err());
    }

    #[test]
    fn static_functions_get_no_globl() {
        let asm = compile_str("static int f() { return 1; } int main() { return f(); }").unwrap();
        assert!(!asm.contains(".globl f"));
        assert!(asm.contains(".globl main"));
    }

    #[test]
    fn extern_globals_emit_no_data() {
        let asm = compile_str("extern int g; int main() { return g; }").unwrap();
        assert!(!asm.contains("g:"));
        assert!(asm.contains("push offset g"));
    }

    #[test]
    fn string_data_is_escaped() {
        let asm = compile_str("char *s = \"a\\\"b\\n\"; int main() { return 0; }").unwrap();
        assert!(asm.contains(".string \"a\\\"b\\n\""));
    }

    #[test]
    fn if_without_else_jumps_straight_to_end() {
        let asm = compile_str("int main() { int a = 1; if (a) a = 2; return a; }").unwrap();
        assert!(asm.contains("\tje .L.end.0\n"));
        assert!(!asm.contains(".L.else.0"));
    }

    #[test]
    fn if_else_gets_both_labels() {
        let asm =
            compile_str("int main() { int a = 1; if (a) a = 2; else a = 3; return a; }").unwrap();
        assert!(asm.contains("\tje .L.else.0\n"));
        assert!(asm.contains("\tjmp .L.end.0\n"));
        assert!(asm.contains(".L.else.0:"));
    }

    #[test]
    fn returns_jump_to_the_shared_epilogue() {
        let asm = compile_str(
            "int pick(int c) { if (c) return 1; return 2; } int main() { return pick(0); }",
        )
        .unwrap();
        assert_eq!(asm.matches("\tjmp .L.return.pick\n").count(), 2);
        assert_eq!(asm.matches(".L.return.pick:\n").count(), 1);
    }

    #[test]
    fn data_comes_before_text_and_in_declaration_order() {
        let asm = compile_str(
            "int first = 1; int second = 2; int main() { return first + second; }",
        )
        .unwrap();
        let data = asm.find(".data\n").unwrap();
        let first = asm.find("first:").unwrap();
        let second = asm.find("second:").unwrap();
        let text = asm.find(".text\n").unwrap();
        assert!(data < first && first < second && second < text);
    }

    #[test]
    fn uninitialized_globals_reserve_zeroed_storage() {
        let asm = compile_str(
            "int scalar; long wide[4]; struct S { int a; int b; } pair; int main() { return 0; }",
        )
        .unwrap();
        assert!(asm.contains("scalar:\n\t.zero 4\n"));
        assert!(asm.contains("wide:\n\t.zero 32\n"));
        assert!(asm.contains("pair:\n\t.zero 8\n"));
    }
}

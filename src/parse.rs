//! Recursive-descent parser: token stream to typed AST.
//!
//! The parser owns the scope stack and the type table. Declarations,
//! statements and the expression precedence chain mirror the grammar in the
//! crate documentation; `is_type` consults the scope so `A * b` parses as a
//! declaration exactly when `A` is a typedef in some enclosing scope.

mod scope;

use std::mem;

use anyhow::{anyhow, bail, ensure, Result};

use crate::ast::{
    self, eval, BinOp, FnDef, GVar, GVarInit, LVar, Node, NodeKind, Program, SwitchCase, VarRef,
};
use crate::token::Token;
use crate::ty::{align_to, Member, TypeId, TypeKind, TypeTable};
use scope::{Scope, ScopeVar};

const STATIC: u8 = 0b01;
const EXTERN: u8 = 0b10;

/// Parse a preprocessed token stream into a program plus the type table the
/// generator needs for sizes and member offsets.
pub fn parse(toks: Vec<Token>) -> Result<(Program, TypeTable)> {
    let mut p = Parser {
        toks,
        pos: 0,
        types: TypeTable::new(),
        scopes: vec![Scope::default()],
        lvars: Vec::new(),
        gvars: Vec::new(),
        fns: Vec::new(),
        gvar_label_count: 0,
    };
    p.run()?;
    Ok((
        Program {
            fns: p.fns,
            gvars: p.gvars,
        },
        p.types,
    ))
}

static EOF: Token = Token::Eof;

struct Parser {
    toks: Vec<Token>,
    pos: usize,
    types: TypeTable,
    scopes: Vec<Scope>,
    /// Current function's locals; drained into the finished `FnDef`.
    lvars: Vec<LVar>,
    gvars: Vec<GVar>,
    fns: Vec<FnDef>,
    gvar_label_count: usize,
}

fn expr_stmt(e: Node) -> Node {
    Node::new(NodeKind::ExprStmt(Box::new(e)))
}

fn assign_node(lhs: Node, rhs: Node) -> Node {
    Node::new(NodeKind::Assign {
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

fn deref(e: Node) -> Node {
    Node::new(NodeKind::Deref(Box::new(e)))
}

fn binary(op: BinOp, lhs: Node, rhs: Node) -> Node {
    Node::new(NodeKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

impl Parser {
    // ---- token cursor ----

    fn peek(&self) -> &Token {
        self.toks.get(self.pos).unwrap_or(&EOF)
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn begins_with(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Reserved { word: w, .. } if w == word)
    }

    fn consume(&mut self, word: &str) -> bool {
        if self.begins_with(word) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, word: &str) -> Result<()> {
        ensure!(
            self.begins_with(word),
            "`{}` was expected but got `{}`",
            word,
            self.peek().text()
        );
        self.pos += 1;
        Ok(())
    }

    fn consume_ident(&mut self) -> Option<String> {
        if let Token::Ident { name, .. } = self.peek() {
            let name = name.clone();
            self.pos += 1;
            return Some(name);
        }
        None
    }

    fn expect_ident(&mut self) -> Result<String> {
        self.consume_ident()
            .ok_or_else(|| anyhow!("identifier was expected but got `{}`", self.peek().text()))
    }

    fn consume_str(&mut self) -> Option<Vec<u8>> {
        if let Token::Str(content) = self.peek() {
            let content = content.clone();
            self.pos += 1;
            return Some(content);
        }
        None
    }

    fn expect_num(&mut self) -> Result<i64> {
        match self.peek() {
            Token::Num(val) => {
                let val = *val;
                self.pos += 1;
                Ok(val)
            }
            other => bail!("number was expected but got `{}`", other.text()),
        }
    }

    // ---- scope handling ----

    fn cur_scope(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("scope stack is never empty")
    }

    fn spawn_scope(&mut self) {
        let child = Scope::spawn_from(self.scopes.last().expect("scope stack is never empty"));
        self.scopes.push(child);
    }

    /// Leave the current scope: finalize the frame offsets of its locals and
    /// hand the running total back to the parent, so sibling scopes keep
    /// stacking onto the same frame. Returns the running total.
    fn rewind_scope(&mut self) -> i64 {
        let child = self.scopes.pop().expect("unbalanced scope rewind");
        let mut running = child.cur_offset;
        for id in child.local_ids() {
            let ty = self.lvars[id].ty;
            running = align_to(running, self.types.align(ty)) + self.types.size(ty);
            self.lvars[id].offset = running;
        }
        // the global scope carries no frame; function scopes start fresh
        if self.scopes.len() > 1 {
            self.cur_scope().cur_offset = running;
        }
        running
    }

    fn find_var(&self, name: &str) -> Option<ScopeVar> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.search_var(name))
            .cloned()
    }

    fn search_struct_tag(&self, tag: &str) -> Option<TypeId> {
        self.scopes.iter().rev().find_map(|s| s.search_struct_tag(tag))
    }

    fn search_enum_tag(&self, tag: &str) -> Option<TypeId> {
        self.scopes.iter().rev().find_map(|s| s.search_enum_tag(tag))
    }

    fn add_lvar(&mut self, name: &str, ty: TypeId) -> Result<usize> {
        let id = self.lvars.len();
        self.cur_scope().add_lvar(name, id, ty)?;
        self.lvars.push(LVar {
            name: name.to_owned(),
            ty,
            offset: 0,
        });
        Ok(id)
    }

    fn var_node(&self, name: &str) -> Result<Node> {
        match self.find_var(name) {
            Some(ScopeVar::Local { id, ty }) => Ok(Node::new(NodeKind::Var(VarRef::Local { id, ty }))),
            Some(ScopeVar::Global { label, ty }) => {
                Ok(Node::new(NodeKind::Var(VarRef::Global { label, ty })))
            }
            _ => bail!("undefined variable {name}"),
        }
    }

    fn new_gvar_label(&mut self) -> String {
        let label = format!(".L.data.{}", self.gvar_label_count);
        self.gvar_label_count += 1;
        label
    }

    /// Function-scope statics share the flat symbol namespace, so their
    /// labels are uniquified.
    fn static_label(&mut self, name: &str) -> String {
        let label = format!("{}.{}", name, self.gvar_label_count);
        self.gvar_label_count += 1;
        label
    }

    fn ensure_addressable(&self, node: &Node) -> Result<()> {
        ensure!(node.is_addressable(), "expression is not addressable");
        Ok(())
    }

    // ---- disambiguation ----

    /// True when the next token names a type: a type keyword, or an
    /// identifier bound as a typedef in some enclosing scope.
    fn is_type(&self) -> bool {
        match self.peek() {
            Token::Ident { name, .. } => {
                matches!(self.find_var(name), Some(ScopeVar::TypeDef(_)))
            }
            Token::Reserved { is_type, .. } => *is_type,
            _ => false,
        }
    }

    /// Speculative look-ahead deciding whether a top-level construct is a
    /// function. Purely token-shaped — no scope mutation — and fully
    /// restored on exit.
    fn is_function(&mut self) -> bool {
        let save = self.pos;
        let ok = self.fn_shape();
        self.pos = save;
        ok
    }

    fn fn_shape(&mut self) -> bool {
        while self.consume("typedef") || self.consume("static") || self.consume("extern") {}
        if self.consume("struct") || self.consume("enum") {
            self.consume_ident();
            if self.begins_with("{") && !self.skip_braces() {
                return false;
            }
        } else if matches!(self.peek(), Token::Reserved { is_type: true, .. }) {
            // a run of simple type keywords: `unsigned long long int` etc.
            while matches!(
                self.peek(),
                Token::Reserved { word, is_type: true, .. }
                    if word != "struct" && word != "enum" && word != "typedef"
                        && word != "static" && word != "extern"
            ) {
                self.pos += 1;
            }
        } else if self.is_type() {
            // typedef-bound identifier
            self.pos += 1;
        } else {
            return false;
        }
        while self.consume("*") {}
        self.consume_ident().is_some() && self.begins_with("(")
    }

    fn skip_braces(&mut self) -> bool {
        if !self.consume("{") {
            return false;
        }
        let mut depth = 1usize;
        while depth > 0 {
            if self.is_eof() {
                return false;
            }
            if self.begins_with("{") {
                depth += 1;
            } else if self.begins_with("}") {
                depth -= 1;
            }
            self.pos += 1;
        }
        true
    }

    // ---- declarations ----

    fn run(&mut self) -> Result<()> {
        while !self.is_eof() {
            if self.is_function() {
                if let Some(f) = self.function()? {
                    self.fns.push(f);
                }
            } else {
                let (ty, id, rhs, sc) = self.decl()?;
                let Some(ty) = ty else { continue };
                if id.is_empty() {
                    // a bare `struct S {…};` or `enum E {…};` declares a tag only
                    continue;
                }
                let init = self.build_gvar_init(ty, rhs)?;
                let emit = sc & EXTERN == 0;
                self.cur_scope().add_gvar(&id, &id, ty, false)?;
                self.gvars.push(GVar {
                    label: id,
                    ty,
                    emit,
                    init,
                });
            }
        }
        Ok(())
    }

    fn function(&mut self) -> Result<Option<FnDef>> {
        let (base, _, sc) = self.base_type()?;
        let (name, ret_ty) = self.ty_decl(base)?;
        let fn_ty = self.types.fn_returning(ret_ty);
        self.cur_scope().add_gvar(&name, &name, fn_ty, true)?;

        let mut f = FnDef {
            name,
            is_static: sc & STATIC != 0,
            ret_ty,
            params: Vec::new(),
            lvars: Vec::new(),
            body: Vec::new(),
            stack_size: 0,
        };
        self.spawn_scope();
        self.read_fn_params(&mut f)?;
        if self.consume(";") {
            // declaration only
            self.rewind_scope();
            self.lvars.clear();
            return Ok(None);
        }
        self.expect("{")?;
        while !self.consume("}") {
            let s = self.stmt()?;
            f.body.push(s);
        }
        let frame = self.rewind_scope();
        f.stack_size = align_to(frame, 8);
        f.lvars = mem::take(&mut self.lvars);
        for node in &mut f.body {
            node.load_type(&mut self.types)?;
        }
        Ok(Some(f))
    }

    fn read_fn_params(&mut self, f: &mut FnDef) -> Result<()> {
        self.expect("(")?;
        let save = self.pos;
        if self.consume("void") && self.consume(")") {
            return Ok(());
        }
        self.pos = save;
        let mut first = true;
        while !self.consume(")") {
            if !first {
                self.expect(",")?;
            }
            first = false;
            let (base, _, _) = self.base_type()?;
            let (id, mut ty) = self.ty_decl(base)?;
            // parameter arrays decay to pointer-to-element
            let decayed = match self.types.kind(ty) {
                TypeKind::Arr { base, .. } => Some(*base),
                _ => None,
            };
            if let Some(b) = decayed {
                ty = self.types.ptr_to(b);
            }
            let id = self.add_lvar(&id, ty)?;
            f.params.push(id);
        }
        Ok(())
    }

    /// `baseType tyDecl ("[" constExpr "]")* ("=" initializer)? ";"`, also
    /// covering typedef registration and bare type declarations.
    #[allow(clippy::type_complexity)]
    fn decl(&mut self) -> Result<(Option<TypeId>, String, Option<Node>, u8)> {
        let (base, is_typedef, sc) = self.base_type()?;
        if self.consume(";") {
            return Ok((Some(base), String::new(), None, sc));
        }
        let (id, ty) = self.ty_decl(base)?;
        if is_typedef {
            self.expect(";")?;
            self.cur_scope().add_typedef(&id, ty)?;
            return Ok((None, String::new(), None, sc));
        }
        let ty = self.ty_suffix(ty)?;
        if self.consume(";") {
            return Ok((Some(ty), id, None, sc));
        }
        if sc & EXTERN != 0 {
            self.expect(";")?;
            return Ok((Some(ty), id, None, sc));
        }
        self.expect("=")?;
        let rhs = self.initializer(ty, sc)?;
        self.expect(";")?;
        Ok((Some(ty), id, Some(rhs), sc))
    }

    fn base_type(&mut self) -> Result<(TypeId, bool, u8)> {
        let mut is_typedef = false;
        let mut sc = 0u8;
        if self.consume("typedef") {
            is_typedef = true;
        }
        if self.consume("static") {
            sc |= STATIC;
        }
        if self.consume("extern") {
            sc |= EXTERN;
        }
        if is_typedef && sc != 0 || sc == STATIC | EXTERN {
            bail!("typedef, static and extern should not be used together");
        }
        let ty = match self.peek() {
            Token::Ident { name, .. } => {
                let name = name.clone();
                match self.find_var(&name) {
                    Some(ScopeVar::TypeDef(t)) => {
                        self.pos += 1;
                        t
                    }
                    _ => bail!("type was expected but got `{name}`"),
                }
            }
            Token::Reserved { is_type: true, .. } => {
                if self.begins_with("struct") {
                    self.struct_decl()?
                } else if self.begins_with("enum") {
                    self.enum_decl()?
                } else if self.consume("void") {
                    TypeTable::VOID
                } else if self.consume("_Bool") {
                    TypeTable::BOOL
                } else {
                    // no codegen distinction for these qualifiers yet
                    self.consume("volatile");
                    self.consume("unsigned");
                    self.consume("signed");
                    if self.consume("char") {
                        TypeTable::CHAR
                    } else if self.consume("short") {
                        self.consume("int");
                        TypeTable::SHORT
                    } else if self.consume("int") {
                        TypeTable::INT
                    } else if self.consume("long") {
                        self.consume("long");
                        self.consume("int");
                        TypeTable::LONG
                    } else {
                        TypeTable::INT
                    }
                }
            }
            other => bail!("type was expected but got `{}`", other.text()),
        };
        Ok((ty, is_typedef, sc))
    }

    /// `"*"* (ident | "(" tyDecl ")") tySuffix`. A parenthesized inner
    /// declarator is parsed against a placeholder cell which is redirected to
    /// the outer type once the suffix is known, so `int (*x)[3]` resolves at
    /// any nesting depth.
    fn ty_decl(&mut self, base: TypeId) -> Result<(String, TypeId)> {
        let mut base = base;
        while self.consume("*") {
            base = self.types.ptr_to(base);
        }
        if self.consume("(") {
            let hole = self.types.placeholder();
            let (id, inner) = self.ty_decl(hole)?;
            self.expect(")")?;
            let outer = self.ty_suffix(base)?;
            self.types.resolve_placeholder(hole, outer);
            return Ok((id, inner));
        }
        let id = self.expect_ident()?;
        let ty = self.ty_suffix(base)?;
        Ok((id, ty))
    }

    fn ty_suffix(&mut self, t: TypeId) -> Result<TypeId> {
        if !self.consume("[") {
            return Ok(t);
        }
        let mut len = -1;
        if !self.consume("]") {
            len = self.const_expr()?;
            self.expect("]")?;
        }
        let inner = self.ty_suffix(t)?;
        Ok(self.types.arr_of(inner, len))
    }

    fn const_expr(&mut self) -> Result<i64> {
        let node = self.ternary()?;
        eval(&node)
    }

    fn struct_decl(&mut self) -> Result<TypeId> {
        self.expect("struct")?;
        let tag = self.consume_ident();
        if let Some(tag) = &tag {
            if !self.begins_with("{") {
                return self
                    .search_struct_tag(tag)
                    .ok_or_else(|| anyhow!("no such struct tag {tag}"));
            }
        }
        self.expect("{")?;
        // the tag binds to an open cell first, so members may point back at
        // the struct being defined
        let cell = self.types.new_struct_cell();
        if let Some(tag) = &tag {
            self.cur_scope().add_struct_tag(tag, cell)?;
        }
        let mut members = Vec::new();
        let mut offset = 0i64;
        let mut align = 1i64;
        while !self.consume("}") {
            let (ty, name, _, _) = self.decl()?;
            let Some(ty) = ty else { continue };
            if name.is_empty() {
                continue;
            }
            ensure!(ty != cell, "member {name} has incomplete type");
            let al = self.types.align(ty);
            offset = align_to(offset, al);
            members.push(Member {
                name,
                offset,
                ty,
            });
            offset += self.types.size(ty);
            align = align.max(al);
        }
        self.types
            .fill_struct(cell, members, align, align_to(offset, align));
        Ok(cell)
    }

    fn enum_decl(&mut self) -> Result<TypeId> {
        self.expect("enum")?;
        let tag = self.consume_ident();
        if let Some(tag) = &tag {
            if !self.begins_with("{") {
                return self
                    .search_enum_tag(tag)
                    .ok_or_else(|| anyhow!("no such enum tag {tag}"));
            }
        }
        self.expect("{")?;
        let mut val = 0i64;
        loop {
            let id = self.expect_ident()?;
            if self.consume("=") {
                val = self.const_expr()?;
            }
            self.cur_scope().add_enum_const(&id, val)?;
            val += 1;
            if self.consume("}") {
                break;
            }
            self.expect(",")?;
            if self.consume("}") {
                break;
            }
        }
        if let Some(tag) = &tag {
            self.cur_scope().add_enum_tag(tag, TypeTable::ENUM)?;
        }
        Ok(TypeTable::ENUM)
    }

    // ---- initializers ----

    fn initializer(&mut self, ty: TypeId, sc: u8) -> Result<Node> {
        match self.types.kind(ty).clone() {
            TypeKind::Arr { base, .. } => {
                if let Some(content) = self.consume_str() {
                    let len = content.len() as i64;
                    let label = self.new_gvar_label();
                    let aty = self.types.arr_of(TypeTable::CHAR, len);
                    self.gvars.push(GVar {
                        label: label.clone(),
                        ty: aty,
                        emit: sc & STATIC != 0,
                        init: Some(GVarInit::Str(content)),
                    });
                    return Ok(Node::new(NodeKind::Var(VarRef::Global { label, ty: aty })));
                }
                self.expect("{")?;
                let mut nodes = Vec::new();
                while !self.consume("}") {
                    nodes.push(self.initializer(base, sc)?);
                    if !self.consume(",") {
                        self.expect("}")?;
                        break;
                    }
                }
                Ok(Node::new(NodeKind::Block(nodes)))
            }
            TypeKind::Struct { members, .. } => {
                self.expect("{")?;
                let mut nodes = vec![Node::null(); members.len()];
                let mut idx = 0usize;
                while !self.consume("}") {
                    if self.consume(".") {
                        // designated initializer
                        let id = self.expect_ident()?;
                        self.expect("=")?;
                        idx = members
                            .iter()
                            .position(|m| m.name == id)
                            .ok_or_else(|| anyhow!("no member {id}"))?;
                    }
                    ensure!(idx < members.len(), "too many initializers");
                    nodes[idx] = self.initializer(members[idx].ty, sc)?;
                    if !self.consume(",") {
                        self.expect("}")?;
                        break;
                    }
                    idx += 1;
                }
                Ok(Node::new(NodeKind::Block(nodes)))
            }
            _ => self.assign(),
        }
    }

    /// Content of a global string object referenced by `n`, if that is what
    /// it is.
    fn str_node_content(&self, n: &Node) -> Option<Vec<u8>> {
        let NodeKind::Var(VarRef::Global { label, ty }) = &n.kind else {
            return None;
        };
        let base = self.types.base(*ty)?;
        if !matches!(self.types.kind(*ty), TypeKind::Arr { .. })
            || !matches!(self.types.kind(base), TypeKind::Char)
        {
            return None;
        }
        match &self.gvars.iter().find(|g| &g.label == label)?.init {
            Some(GVarInit::Str(content)) => Some(content.clone()),
            _ => None,
        }
    }

    fn elem_addr(&mut self, dst: &Node, i: i64) -> Result<Node> {
        let add = ast::new_add(&mut self.types, dst.clone(), Node::num(i))?;
        Ok(deref(add))
    }

    /// Lower a brace (or string) initializer for a local into a block of
    /// assignments to successive element addresses. Missing trailing
    /// elements are zero-filled.
    fn store_init(&mut self, ty: TypeId, dst: Node, rhs: Node) -> Result<Node> {
        match self.types.kind(ty).clone() {
            TypeKind::Arr { base, len } => {
                let mut body = Vec::new();
                let given;
                let is_char = matches!(self.types.kind(base), TypeKind::Char);
                let content = if is_char { self.str_node_content(&rhs) } else { None };
                if let Some(bytes) = content {
                    for (i, b) in bytes.iter().enumerate() {
                        let addr = self.elem_addr(&dst, i as i64)?;
                        body.push(expr_stmt(assign_node(addr, Node::num(*b as i64))));
                    }
                    given = bytes.len() as i64;
                } else if let NodeKind::Block(els) = rhs.kind {
                    given = els.len() as i64;
                    for (i, el) in els.into_iter().enumerate() {
                        let addr = self.elem_addr(&dst, i as i64)?;
                        body.push(self.store_init(base, addr, el)?);
                    }
                } else {
                    bail!("brace or string initializer expected for an array");
                }
                let declared = if len < 0 {
                    self.types.set_arr_len(ty, given);
                    given
                } else {
                    len
                };
                ensure!(given <= declared, "too many initializers");
                for i in given..declared {
                    let addr = self.elem_addr(&dst, i)?;
                    body.push(self.zero_init(base, addr)?);
                }
                Ok(Node::new(NodeKind::Block(body)))
            }
            TypeKind::Struct { members, .. } => {
                let NodeKind::Block(mut els) = rhs.kind else {
                    bail!("brace initializer expected for a struct");
                };
                ensure!(els.len() <= members.len(), "too many initializers");
                while els.len() < members.len() {
                    els.push(Node::null());
                }
                let mut body = Vec::new();
                for (el, mem) in els.into_iter().zip(&members) {
                    let field = Node::new(NodeKind::Member {
                        base: Box::new(dst.clone()),
                        offset: mem.offset,
                        member_ty: mem.ty,
                    });
                    if matches!(el.kind, NodeKind::Null) {
                        body.push(self.zero_init(mem.ty, field)?);
                    } else if matches!(
                        self.types.kind(mem.ty),
                        TypeKind::Arr { .. } | TypeKind::Struct { .. }
                    ) {
                        body.push(self.store_init(mem.ty, field, el)?);
                    } else {
                        body.push(expr_stmt(assign_node(field, el)));
                    }
                }
                Ok(Node::new(NodeKind::Block(body)))
            }
            _ => Ok(expr_stmt(assign_node(dst, rhs))),
        }
    }

    fn zero_init(&mut self, ty: TypeId, dst: Node) -> Result<Node> {
        match self.types.kind(ty).clone() {
            TypeKind::Arr { base, len } => {
                let mut body = Vec::new();
                for i in 0..len.max(0) {
                    let addr = self.elem_addr(&dst, i)?;
                    body.push(self.zero_init(base, addr)?);
                }
                Ok(Node::new(NodeKind::Block(body)))
            }
            TypeKind::Struct { members, .. } => {
                let mut body = Vec::new();
                for mem in &members {
                    let field = Node::new(NodeKind::Member {
                        base: Box::new(dst.clone()),
                        offset: mem.offset,
                        member_ty: mem.ty,
                    });
                    body.push(self.zero_init(mem.ty, field)?);
                }
                Ok(Node::new(NodeKind::Block(body)))
            }
            _ => Ok(expr_stmt(assign_node(dst, Node::num(0)))),
        }
    }

    /// Global initializers must be link-time constants: a literal value, the
    /// address of a global, or a global array's name.
    fn build_gvar_init(&mut self, ty: TypeId, rhs: Option<Node>) -> Result<Option<GVarInit>> {
        match rhs {
            None => Ok(None),
            Some(rhs) => Ok(Some(self.gvar_init(ty, rhs)?)),
        }
    }

    fn gvar_init(&mut self, ty: TypeId, rhs: Node) -> Result<GVarInit> {
        match self.types.kind(ty).clone() {
            TypeKind::Arr { base, len } => {
                if let NodeKind::Block(els) = rhs.kind {
                    let given = els.len() as i64;
                    let mut body = Vec::new();
                    for el in els {
                        body.push(self.gvar_init(base, el)?);
                    }
                    let declared = if len < 0 {
                        self.types.set_arr_len(ty, given);
                        given
                    } else {
                        len
                    };
                    ensure!(given <= declared, "too many initializers");
                    for _ in given..declared {
                        body.push(GVarInit::Zero(self.types.size(base)));
                    }
                    Ok(GVarInit::Arr(body))
                } else if let Some(mut bytes) = self.str_node_content(&rhs) {
                    let declared = if len < 0 {
                        self.types.set_arr_len(ty, bytes.len() as i64);
                        bytes.len() as i64
                    } else {
                        len
                    };
                    ensure!(
                        bytes.len() as i64 <= declared,
                        "initializer string is longer than the array"
                    );
                    bytes.resize(declared as usize, 0);
                    Ok(GVarInit::Str(bytes))
                } else {
                    bail!("unhandled global array initializer");
                }
            }
            TypeKind::Struct { members, size, .. } => {
                let NodeKind::Block(mut els) = rhs.kind else {
                    bail!("brace initializer expected for a struct");
                };
                ensure!(els.len() <= members.len(), "too many initializers");
                while els.len() < members.len() {
                    els.push(Node::null());
                }
                let mut body = Vec::new();
                for (i, (el, mem)) in els.into_iter().zip(&members).enumerate() {
                    let end = members.get(i + 1).map(|m| m.offset).unwrap_or(size);
                    if matches!(el.kind, NodeKind::Null) {
                        body.push(GVarInit::Zero(end - mem.offset));
                        continue;
                    }
                    let pad = end - (mem.offset + self.types.size(mem.ty));
                    let mut parts = vec![self.gvar_init(mem.ty, el)?];
                    if pad > 0 {
                        parts.push(GVarInit::Zero(pad));
                    }
                    body.push(GVarInit::Arr(parts));
                }
                Ok(GVarInit::Arr(body))
            }
            _ => {
                if let NodeKind::Addr(inner) = &rhs.kind {
                    if let NodeKind::Var(VarRef::Global { label, .. }) = &inner.kind {
                        return Ok(GVarInit::Label(label.clone()));
                    }
                }
                if let NodeKind::Var(VarRef::Global { label, ty: vt }) = &rhs.kind {
                    if matches!(self.types.kind(*vt), TypeKind::Arr { .. }) {
                        return Ok(GVarInit::Label(label.clone()));
                    }
                }
                Ok(GVarInit::Int {
                    val: eval(&rhs)?,
                    size: self.types.size(ty),
                })
            }
        }
    }

    // ---- statements ----

    fn stmt(&mut self) -> Result<Node> {
        if self.consume("{") {
            self.spawn_scope();
            let mut body = Vec::new();
            while !self.consume("}") {
                body.push(self.stmt()?);
            }
            self.rewind_scope();
            return Ok(Node::new(NodeKind::Block(body)));
        }

        if self.consume(";") {
            return Ok(Node::null());
        }

        if self.consume("return") {
            if self.consume(";") {
                return Ok(Node::new(NodeKind::Return(None)));
            }
            let e = self.expr()?;
            self.expect(";")?;
            return Ok(Node::new(NodeKind::Return(Some(Box::new(e)))));
        }

        if self.consume("break") {
            self.expect(";")?;
            return Ok(Node::new(NodeKind::Break));
        }

        if self.consume("continue") {
            self.expect(";")?;
            return Ok(Node::new(NodeKind::Continue));
        }

        if self.consume("if") {
            self.expect("(")?;
            let cond = self.expr()?;
            self.expect(")")?;
            let then = self.stmt()?;
            let els = if self.consume("else") {
                Some(Box::new(self.stmt()?))
            } else {
                None
            };
            return Ok(Node::new(NodeKind::If {
                cond: Box::new(cond),
                then: Box::new(then),
                els,
            }));
        }

        if self.consume("while") {
            self.expect("(")?;
            let cond = self.expr()?;
            self.expect(")")?;
            let body = self.stmt()?;
            return Ok(Node::new(NodeKind::While {
                cond: Box::new(cond),
                body: Box::new(body),
            }));
        }

        if self.consume("do") {
            let body = self.stmt()?;
            self.expect("while")?;
            self.expect("(")?;
            let cond = self.expr()?;
            self.expect(")")?;
            self.expect(";")?;
            return Ok(Node::new(NodeKind::DoWhile {
                cond: Box::new(cond),
                body: Box::new(body),
            }));
        }

        if self.consume("for") {
            return self.for_stmt();
        }

        if self.consume("switch") {
            return self.switch_stmt();
        }

        if self.is_type() {
            let (ty, id, rhs, sc) = self.decl()?;
            let Some(ty) = ty else { return Ok(Node::null()) };
            if id.is_empty() {
                return Ok(Node::null());
            }
            if sc & STATIC != 0 {
                let label = self.static_label(&id);
                let init = self.build_gvar_init(ty, rhs)?;
                self.cur_scope().add_gvar(&id, &label, ty, false)?;
                self.gvars.push(GVar {
                    label,
                    ty,
                    emit: true,
                    init,
                });
                return Ok(Node::null());
            }
            if sc & EXTERN != 0 {
                self.cur_scope().add_gvar(&id, &id, ty, false)?;
                return Ok(Node::null());
            }
            self.add_lvar(&id, ty)?;
            let Some(rhs) = rhs else { return Ok(Node::null()) };
            let dst = self.var_node(&id)?;
            return self.store_init(ty, dst, rhs);
        }

        let e = self.expr()?;
        self.expect(";")?;
        Ok(expr_stmt(e))
    }

    fn for_stmt(&mut self) -> Result<Node> {
        self.expect("(")?;
        self.spawn_scope();

        let mut init = None;
        if !self.consume(";") {
            if self.is_type() {
                let (ty, id, rhs, _) = self.decl()?;
                match ty {
                    Some(ty) if !id.is_empty() => {
                        self.add_lvar(&id, ty)?;
                        init = Some(match rhs {
                            None => Node::null(),
                            Some(rhs) => {
                                let dst = self.var_node(&id)?;
                                self.store_init(ty, dst, rhs)?
                            }
                        });
                    }
                    _ => init = Some(Node::null()),
                }
            } else {
                let e = self.expr()?;
                self.expect(";")?;
                init = Some(expr_stmt(e));
            }
        }

        let mut cond = None;
        if !self.consume(";") {
            cond = Some(Box::new(self.expr()?));
            self.expect(";")?;
        }

        let mut inc = None;
        if !self.consume(")") {
            inc = Some(Box::new(expr_stmt(self.expr()?)));
            self.expect(")")?;
        }

        let body = self.stmt()?;
        self.rewind_scope();
        Ok(Node::new(NodeKind::For {
            init: init.map(Box::new),
            cond,
            inc,
            body: Box::new(body),
        }))
    }

    fn switch_stmt(&mut self) -> Result<Node> {
        self.expect("(")?;
        let target = self.expr()?;
        self.expect(")")?;
        self.expect("{")?;

        let mut cases = Vec::new();
        let mut default_idx = None;
        let mut idx = 0usize;
        loop {
            if self.consume("case") {
                let cmp = self.const_expr()?;
                self.expect(":")?;
                let body = self.case_body()?;
                cases.push(SwitchCase { cmp, body, idx });
            } else if self.consume("default") {
                ensure!(
                    default_idx.is_none(),
                    "multiple definition of default clause"
                );
                self.expect(":")?;
                let body = self.case_body()?;
                cases.push(SwitchCase { cmp: -1, body, idx });
                default_idx = Some(idx);
            } else {
                break;
            }
            idx += 1;
        }
        self.expect("}")?;
        Ok(Node::new(NodeKind::Switch {
            target: Box::new(target),
            cases,
            default_idx,
        }))
    }

    fn case_body(&mut self) -> Result<Vec<Node>> {
        let mut body = Vec::new();
        while !self.begins_with("case") && !self.begins_with("default") && !self.begins_with("}") {
            body.push(self.stmt()?);
        }
        Ok(body)
    }

    // ---- expressions ----

    fn expr(&mut self) -> Result<Node> {
        self.assign()
    }

    fn assign(&mut self) -> Result<Node> {
        let node = self.ternary()?;
        if self.consume("=") {
            self.ensure_addressable(&node)?;
            let rhs = self.assign()?;
            return Ok(assign_node(node, rhs));
        }
        if self.consume("+=") {
            return self.compound_assign(node, BinOp::AddEq, BinOp::PtrAddEq);
        }
        if self.consume("-=") {
            return self.compound_assign(node, BinOp::SubEq, BinOp::PtrSubEq);
        }
        if self.consume("*=") {
            return self.compound_assign(node, BinOp::MulEq, BinOp::MulEq);
        }
        if self.consume("/=") {
            return self.compound_assign(node, BinOp::DivEq, BinOp::DivEq);
        }
        Ok(node)
    }

    fn compound_assign(&mut self, mut lhs: Node, int_op: BinOp, ptr_op: BinOp) -> Result<Node> {
        self.ensure_addressable(&lhs)?;
        let t = lhs.load_type(&mut self.types)?;
        let op = if self.types.is_pointing(t) { ptr_op } else { int_op };
        let rhs = self.assign()?;
        Ok(binary(op, lhs, rhs))
    }

    fn ternary(&mut self) -> Result<Node> {
        let cond = self.log_or()?;
        if !self.consume("?") {
            return Ok(cond);
        }
        let then = self.expr()?;
        self.expect(":")?;
        let els = self.ternary()?;
        Ok(Node::new(NodeKind::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            els: Box::new(els),
        }))
    }

    fn log_or(&mut self) -> Result<Node> {
        let mut node = self.log_and()?;
        while self.consume("||") {
            node = binary(BinOp::LogOr, node, self.log_and()?);
        }
        Ok(node)
    }

    fn log_and(&mut self) -> Result<Node> {
        let mut node = self.bit_or()?;
        while self.consume("&&") {
            node = binary(BinOp::LogAnd, node, self.bit_or()?);
        }
        Ok(node)
    }

    fn bit_or(&mut self) -> Result<Node> {
        let mut node = self.bit_xor()?;
        while self.consume("|") {
            node = binary(BinOp::BitOr, node, self.bit_xor()?);
        }
        Ok(node)
    }

    fn bit_xor(&mut self) -> Result<Node> {
        let mut node = self.bit_and()?;
        while self.consume("^") {
            node = binary(BinOp::BitXor, node, self.bit_and()?);
        }
        Ok(node)
    }

    fn bit_and(&mut self) -> Result<Node> {
        let mut node = self.equality()?;
        while self.consume("&") {
            node = binary(BinOp::BitAnd, node, self.equality()?);
        }
        Ok(node)
    }

    fn equality(&mut self) -> Result<Node> {
        let mut node = self.relational()?;
        loop {
            if self.consume("==") {
                node = binary(BinOp::Eq, node, self.relational()?);
            } else if self.consume("!=") {
                node = binary(BinOp::Neq, node, self.relational()?);
            } else {
                return Ok(node);
            }
        }
    }

    fn relational(&mut self) -> Result<Node> {
        let mut node = self.shift()?;
        loop {
            if self.consume("<=") {
                node = binary(BinOp::Leq, node, self.shift()?);
            } else if self.consume(">=") {
                node = binary(BinOp::Geq, node, self.shift()?);
            } else if self.consume("<") {
                node = binary(BinOp::Lt, node, self.shift()?);
            } else if self.consume(">") {
                node = binary(BinOp::Gt, node, self.shift()?);
            } else {
                return Ok(node);
            }
        }
    }

    fn shift(&mut self) -> Result<Node> {
        let mut node = self.add_sub()?;
        loop {
            if self.consume("<<") {
                node = binary(BinOp::Shl, node, self.add_sub()?);
            } else if self.consume(">>") {
                node = binary(BinOp::Shr, node, self.add_sub()?);
            } else if self.consume("<<=") {
                self.ensure_addressable(&node)?;
                node = binary(BinOp::ShlEq, node, self.add_sub()?);
            } else if self.consume(">>=") {
                self.ensure_addressable(&node)?;
                node = binary(BinOp::ShrEq, node, self.add_sub()?);
            } else {
                return Ok(node);
            }
        }
    }

    fn add_sub(&mut self) -> Result<Node> {
        let mut node = self.mul_div()?;
        loop {
            if self.consume("+") {
                let rhs = self.mul_div()?;
                node = ast::new_add(&mut self.types, node, rhs)?;
            } else if self.consume("-") {
                let rhs = self.mul_div()?;
                node = ast::new_sub(&mut self.types, node, rhs)?;
            } else {
                return Ok(node);
            }
        }
    }

    fn mul_div(&mut self) -> Result<Node> {
        let mut node = self.cast()?;
        loop {
            if self.consume("*") {
                node = binary(BinOp::Mul, node, self.cast()?);
            } else if self.consume("/") {
                node = binary(BinOp::Div, node, self.cast()?);
            } else {
                return Ok(node);
            }
        }
    }

    fn cast(&mut self) -> Result<Node> {
        let save = self.pos;
        if self.consume("(") {
            if self.is_type() {
                let (mut t, _, _) = self.base_type()?;
                while self.consume("*") {
                    t = self.types.ptr_to(t);
                }
                self.expect(")")?;
                let base = self.cast()?;
                return Ok(Node::new(NodeKind::Cast {
                    base: Box::new(base),
                    to: t,
                }));
            }
            self.pos = save;
        }
        self.unary()
    }

    fn unary(&mut self) -> Result<Node> {
        if self.consume("+") {
            return self.cast();
        }
        if self.consume("-") {
            let rhs = self.cast()?;
            return ast::new_sub(&mut self.types, Node::num(0), rhs);
        }
        if self.consume("*") {
            return Ok(deref(self.cast()?));
        }
        if self.consume("&") {
            let body = self.cast()?;
            self.ensure_addressable(&body)?;
            return Ok(Node::new(NodeKind::Addr(Box::new(body))));
        }
        if self.consume("!") {
            return Ok(Node::new(NodeKind::Not(Box::new(self.cast()?))));
        }
        if self.consume("~") {
            return Ok(Node::new(NodeKind::BitNot(Box::new(self.cast()?))));
        }
        if self.consume("++") {
            let body = self.unary()?;
            self.ensure_addressable(&body)?;
            return Ok(Node::new(NodeKind::Inc {
                body: Box::new(body),
                is_pre: true,
            }));
        }
        if self.consume("--") {
            let body = self.unary()?;
            self.ensure_addressable(&body)?;
            return Ok(Node::new(NodeKind::Dec {
                body: Box::new(body),
                is_pre: true,
            }));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Node> {
        let mut node = self.primary()?;
        loop {
            if self.consume("[") {
                let idx = self.expr()?;
                let add = ast::new_add(&mut self.types, node, idx)?;
                node = deref(add);
                self.expect("]")?;
                continue;
            }
            if self.consume(".") {
                self.ensure_addressable(&node)?;
                let t = node.load_type(&mut self.types)?;
                ensure!(
                    matches!(self.types.kind(t), TypeKind::Struct { .. }),
                    "member access on a non-struct"
                );
                node = self.member_node(node, t)?;
                continue;
            }
            if self.consume("->") {
                let t = node.load_type(&mut self.types)?;
                let base = match self.types.kind(t) {
                    TypeKind::Ptr { base } => *base,
                    _ => bail!("`->` on a non-pointer"),
                };
                ensure!(
                    matches!(self.types.kind(base), TypeKind::Struct { .. }),
                    "`->` on a non-pointer-to-struct"
                );
                node = self.member_node(deref(node), base)?;
                continue;
            }
            if self.consume("++") {
                self.ensure_addressable(&node)?;
                node = Node::new(NodeKind::Inc {
                    body: Box::new(node),
                    is_pre: false,
                });
                continue;
            }
            if self.consume("--") {
                self.ensure_addressable(&node)?;
                node = Node::new(NodeKind::Dec {
                    body: Box::new(node),
                    is_pre: false,
                });
                continue;
            }
            return Ok(node);
        }
    }

    fn member_node(&mut self, base: Node, struct_ty: TypeId) -> Result<Node> {
        let name = self.expect_ident()?;
        let mem = self
            .types
            .find_member(struct_ty, &name)
            .cloned()
            .ok_or_else(|| anyhow!("no member {name}"))?;
        Ok(Node::new(NodeKind::Member {
            base: Box::new(base),
            offset: mem.offset,
            member_ty: mem.ty,
        }))
    }

    fn stmt_expr(&mut self) -> Result<Node> {
        // `(` and `{` are already consumed
        self.spawn_scope();
        let mut body = vec![self.stmt()?];
        while !self.consume("}") {
            body.push(self.stmt()?);
        }
        self.expect(")")?;
        let last = body.pop().expect("statement expression has a statement");
        match last.kind {
            NodeKind::ExprStmt(inner) => body.push(*inner),
            _ => bail!("statement expression returning void is not supported"),
        }
        self.rewind_scope();
        Ok(Node::new(NodeKind::StmtExpr(body)))
    }

    fn primary(&mut self) -> Result<Node> {
        if self.consume("(") {
            if self.consume("{") {
                return self.stmt_expr();
            }
            let node = self.expr()?;
            self.expect(")")?;
            return Ok(node);
        }

        if self.consume("sizeof") {
            let save = self.pos;
            if self.consume("(") {
                if self.is_type() {
                    let (t, _, _) = self.base_type()?;
                    let n = self.types.size(t);
                    self.expect(")")?;
                    return Ok(Node::num(n));
                }
                self.pos = save;
            }
            let mut operand = self.unary()?;
            let t = operand.load_type(&mut self.types)?;
            return Ok(Node::num(self.types.size(t)));
        }

        if let Some(name) = self.consume_ident() {
            if self.consume("(") {
                // calls to names without a visible declaration default to int
                let ret_ty = match self.find_var(&name) {
                    Some(ScopeVar::Global { ty, .. }) => match self.types.kind(ty) {
                        TypeKind::Fn { ret } => *ret,
                        _ => TypeTable::INT,
                    },
                    _ => TypeTable::INT,
                };
                let mut args = Vec::new();
                if !self.consume(")") {
                    args.push(self.expr()?);
                    while self.consume(",") {
                        args.push(self.expr()?);
                    }
                    self.expect(")")?;
                }
                return Ok(Node::new(NodeKind::FnCall { name, args, ret_ty }));
            }
            return match self.find_var(&name) {
                Some(ScopeVar::EnumConst { val }) => Ok(Node::num(val)),
                Some(ScopeVar::Local { .. }) | Some(ScopeVar::Global { .. }) => {
                    self.var_node(&name)
                }
                Some(ScopeVar::TypeDef(_)) => bail!("unexpected type name {name}"),
                None => bail!("undefined variable {name}"),
            };
        }

        if let Some(content) = self.consume_str() {
            let len = content.len() as i64;
            let label = self.new_gvar_label();
            let aty = self.types.arr_of(TypeTable::CHAR, len);
            self.gvars.push(GVar {
                label: label.clone(),
                ty: aty,
                emit: true,
                init: Some(GVarInit::Str(content)),
            });
            return Ok(Node::new(NodeKind::Var(VarRef::Global { label, ty: aty })));
        }

        let n = self.expect_num()?;
        Ok(Node::num(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::MacroTable;
    use crate::token;
    use std::path::Path;

    fn parse_src(src: &str) -> Result<(Program, TypeTable)> {
        let mut macros = MacroTable::new();
        let toks = token::tokenize_source(Path::new("test.c"), src, &mut macros, true)?;
        parse(toks)
    }

    fn lvar<'a>(f: &'a FnDef, name: &str) -> &'a LVar {
        f.lvars.iter().find(|v| v.name == name).unwrap()
    }

    #[test]
    fn typedef_disambiguates_declaration_from_multiplication() {
        let (prog, _) = parse_src("typedef int A; int main() { A x; x = 2; int a; int b; a = b = 1; return a * b + x; }").unwrap();
        assert_eq!(prog.fns.len(), 1);
    }

    #[test]
    fn frame_offsets_accumulate_across_sibling_scopes() {
        let (prog, _) = parse_src(
            "int main() { int a; { int b; } { int c; } return 0; }",
        )
        .unwrap();
        let f = &prog.fns[0];
        // distinct slots for every local, rewound children first
        assert_eq!(lvar(f, "b").offset, 4);
        assert_eq!(lvar(f, "c").offset, 8);
        assert_eq!(lvar(f, "a").offset, 12);
        assert_eq!(f.stack_size, 16);
    }

    #[test]
    fn frame_offsets_respect_alignment() {
        let (prog, _) = parse_src("int main() { char c; long l; char d; return 0; }").unwrap();
        let f = &prog.fns[0];
        assert_eq!(lvar(f, "c").offset, 1);
        assert_eq!(lvar(f, "l").offset, 16);
        assert_eq!(lvar(f, "d").offset, 17);
        assert_eq!(f.stack_size, 24);
    }

    #[test]
    fn struct_layout_and_member_lookup() {
        let (prog, types) = parse_src(
            "int main() { struct S { char c; int i; char d; } s; s.i = 1; return s.i; }",
        )
        .unwrap();
        let s = lvar(&prog.fns[0], "s").ty;
        // offsets 0, 4, 8; size padded to alignment 4
        assert_eq!(types.find_member(s, "c").unwrap().offset, 0);
        assert_eq!(types.find_member(s, "i").unwrap().offset, 4);
        assert_eq!(types.find_member(s, "d").unwrap().offset, 8);
        assert_eq!(types.size(s), 12);
        assert_eq!(types.align(s), 4);
    }

    #[test]
    fn self_referential_struct_resolves_through_the_tag_cell() {
        let (prog, types) = parse_src(
            "int main() { struct node { struct node *next; int v; } n; n.v = 1; return n.v; }",
        )
        .unwrap();
        let f = &prog.fns[0];
        let s = lvar(f, "n").ty;
        assert_eq!(types.size(s), 16);
        let next = types.find_member(s, "next").unwrap();
        assert_eq!(types.base(next.ty), Some(s));
    }

    #[test]
    fn function_scoped_tags_do_not_leak_from_lookahead() {
        // the speculative isFunction scan must not register `struct P`
        assert!(parse_src("struct P { int x; int y; }; int main() { struct P p; p.x = 1; return p.x; }").is_ok());
    }

    #[test]
    fn enum_constants_auto_increment() {
        let (prog, _) =
            parse_src("enum E { A, B = 5, C }; int main() { return C; }").unwrap();
        let body = &prog.fns[0].body;
        match &body[0].kind {
            NodeKind::Return(Some(r)) => assert!(matches!(r.kind, NodeKind::Num(6))),
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn parameter_arrays_decay_but_local_arrays_do_not() {
        let (prog, types) = parse_src(
            "int f(int a[3]) { return 0; } int main() { int b[3]; return f(b); }",
        )
        .unwrap();
        let f = &prog.fns[0];
        let param = lvar(f, "a");
        assert!(matches!(types.kind(param.ty), TypeKind::Ptr { .. }));
        let main = &prog.fns[1];
        assert!(matches!(types.kind(lvar(main, "b").ty), TypeKind::Arr { .. }));
    }

    #[test]
    fn nested_declarators_resolve_through_placeholders() {
        let (prog, types) = parse_src("int main() { int (*x)[3]; return 0; }").unwrap();
        let f = &prog.fns[0];
        let ty = lvar(f, "x").ty;
        assert!(matches!(types.kind(ty), TypeKind::Ptr { .. }));
        let pointee = types.base(ty).unwrap();
        assert!(matches!(types.kind(pointee), TypeKind::Arr { len: 3, .. }));
    }

    #[test]
    fn inferred_array_length_comes_from_the_initializer() {
        let (prog, types) = parse_src("int a[] = {1, 2, 3}; int main() { return 0; }").unwrap();
        assert_eq!(types.size(prog.gvars[0].ty), 12);
    }

    #[test]
    fn string_literals_become_anonymous_globals() {
        let (prog, _) = parse_src("int main() { char *s; s = \"hi\"; return 0; }").unwrap();
        let anon = prog.gvars.iter().find(|g| g.label == ".L.data.0").unwrap();
        assert!(anon.emit);
        assert_eq!(anon.init, Some(GVarInit::Str(b"hi\0".to_vec())));
    }

    #[test]
    fn global_initializers_must_be_link_time_constants() {
        assert!(parse_src("int g = 1 + 2 * 3; int main() { return g; }").is_ok());
        assert!(parse_src("int x; int *p = &x; int main() { return 0; }").is_ok());
        assert!(parse_src("int f(); int g = f(); int main() { return 0; }").is_err());
    }

    #[test]
    fn storage_class_combinations_are_restricted() {
        assert!(parse_src("static extern int x; int main() { return 0; }").is_err());
        assert!(parse_src("typedef static int T; int main() { return 0; }").is_err());
    }

    #[test]
    fn assignment_targets_must_be_addressable() {
        assert!(parse_src("int main() { 1 = 2; return 0; }").is_err());
        assert!(parse_src("int main() { int a; &(a + 1); return 0; }").is_err());
        assert!(parse_src("int main() { int a; (a = 1) = 2; return a; }").is_ok());
    }

    #[test]
    fn undefined_identifiers_are_fatal() {
        assert!(parse_src("int main() { return x; }").is_err());
    }

    #[test]
    fn duplicate_default_clauses_are_fatal() {
        assert!(parse_src(
            "int main() { switch (1) { default: return 1; default: return 2; } }"
        )
        .is_err());
    }

    #[test]
    fn prototype_then_definition_is_accepted() {
        assert!(parse_src("int f(); int f() { return 1; } int main() { return f(); }").is_ok());
    }

    #[test]
    fn typedefs_carry_full_declarator_types() {
        let (prog, types) = parse_src(
            "typedef int *IntPtr; typedef struct P { int x; } Point; int main() { IntPtr p; Point pt; pt.x = 1; return pt.x; }",
        )
        .unwrap();
        let f = &prog.fns[0];
        assert!(matches!(types.kind(lvar(f, "p").ty), TypeKind::Ptr { .. }));
        assert!(matches!(types.kind(lvar(f, "pt").ty), TypeKind::Struct { .. }));
    }

    #[test]
    fn shadowed_names_get_distinct_slots() {
        let (prog, _) = parse_src(
            "int main() { int a; { int a; } return a; }",
        )
        .unwrap();
        let f = &prog.fns[0];
        let offsets: Vec<_> = f
            .lvars
            .iter()
            .filter(|v| v.name == "a")
            .map(|v| v.offset)
            .collect();
        assert_eq!(offsets.len(), 2);
        assert_ne!(offsets[0], offsets[1]);
    }

    #[test]
    fn extern_locals_resolve_to_the_global_symbol() {
        let (prog, _) = parse_src(
            "int main() { extern int errno_like; return errno_like; }",
        )
        .unwrap();
        let f = &prog.fns[0];
        // no frame slot was allocated for it
        assert!(f.lvars.iter().all(|v| v.name != "errno_like"));
        match &f.body[1].kind {
            NodeKind::Return(Some(r)) => {
                assert!(matches!(&r.kind, NodeKind::Var(VarRef::Global { label, .. }) if label == "errno_like"));
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn array_bounds_accept_constant_expressions() {
        let (prog, types) = parse_src(
            "int main() { int a[2 * 3 + (1 ? 2 : 7)]; return sizeof(a); }",
        )
        .unwrap();
        let f = &prog.fns[0];
        assert_eq!(types.size(lvar(f, "a").ty), 32);
        assert!(parse_src("int main() { int n; int a[n]; return 0; }").is_err());
    }

    #[test]
    fn load_type_is_idempotent_across_the_tree() {
        let (mut prog, mut types) = parse_src(
            "int main() { int a; int *p; p = &a; *p = 2; return a + *p; }",
        )
        .unwrap();
        let body = &mut prog.fns[0].body;
        let before: Vec<_> = body.iter().map(|n| n.ty).collect();
        for node in body.iter_mut() {
            node.load_type(&mut types).unwrap();
        }
        let after: Vec<_> = body.iter().map(|n| n.ty).collect();
        assert_eq!(before, after);
    }
}

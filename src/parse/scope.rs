//! Lexically nested scopes: one namespace shared by variables, typedefs and
//! enum constants, plus separate struct and enum tag namespaces.
//!
//! Scopes spawn on `{` and rewind on `}`. `base_offset` records the parent's
//! running frame offset at spawn time; `cur_offset` is the running total,
//! advanced by rewinding children so the overall frame accumulates
//! monotonically and every local keeps a distinct slot.

use anyhow::{bail, Result};

use crate::ty::TypeId;

/// One entry in a scope's variable namespace.
#[derive(Debug, Clone)]
pub(crate) enum ScopeVar {
    Local { id: usize, ty: TypeId },
    Global { label: String, ty: TypeId },
    TypeDef(TypeId),
    EnumConst { val: i64 },
}

#[derive(Debug, Default)]
pub(crate) struct Scope {
    pub base_offset: i64,
    pub cur_offset: i64,
    vars: Vec<(String, ScopeVar)>,
    struct_tags: Vec<(String, TypeId)>,
    enum_tags: Vec<(String, TypeId)>,
}

impl Scope {
    pub fn spawn_from(parent: &Scope) -> Self {
        Self {
            base_offset: parent.cur_offset,
            cur_offset: parent.cur_offset,
            ..Self::default()
        }
    }

    pub fn search_var(&self, name: &str) -> Option<&ScopeVar> {
        self.vars.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn search_struct_tag(&self, tag: &str) -> Option<TypeId> {
        self.struct_tags
            .iter()
            .find(|(n, _)| n == tag)
            .map(|&(_, ty)| ty)
    }

    pub fn search_enum_tag(&self, tag: &str) -> Option<TypeId> {
        self.enum_tags
            .iter()
            .find(|(n, _)| n == tag)
            .map(|&(_, ty)| ty)
    }

    pub fn add_lvar(&mut self, name: &str, id: usize, ty: TypeId) -> Result<()> {
        if matches!(self.search_var(name), Some(ScopeVar::Local { .. })) {
            bail!("variable {name} is already defined");
        }
        self.vars.push((name.to_owned(), ScopeVar::Local { id, ty }));
        Ok(())
    }

    /// Register a global. Function entries may be re-registered (a prototype
    /// followed by the definition names the same symbol); data globals may
    /// not.
    pub fn add_gvar(&mut self, name: &str, label: &str, ty: TypeId, is_fn: bool) -> Result<()> {
        if let Some(pos) = self
            .vars
            .iter()
            .position(|(n, v)| n == name && matches!(v, ScopeVar::Global { .. }))
        {
            if !is_fn {
                bail!("identifier {name} is already defined");
            }
            self.vars.remove(pos);
        }
        self.vars.push((
            name.to_owned(),
            ScopeVar::Global {
                label: label.to_owned(),
                ty,
            },
        ));
        Ok(())
    }

    pub fn add_typedef(&mut self, name: &str, ty: TypeId) -> Result<()> {
        if matches!(self.search_var(name), Some(ScopeVar::TypeDef(_))) {
            bail!("typedef {name} is already defined");
        }
        self.vars.push((name.to_owned(), ScopeVar::TypeDef(ty)));
        Ok(())
    }

    pub fn add_enum_const(&mut self, name: &str, val: i64) -> Result<()> {
        if matches!(self.search_var(name), Some(ScopeVar::EnumConst { .. })) {
            bail!("enum constant {name} is already defined");
        }
        self.vars
            .push((name.to_owned(), ScopeVar::EnumConst { val }));
        Ok(())
    }

    pub fn add_struct_tag(&mut self, tag: &str, ty: TypeId) -> Result<()> {
        if self.search_struct_tag(tag).is_some() {
            bail!("struct tag {tag} already exists");
        }
        self.struct_tags.push((tag.to_owned(), ty));
        Ok(())
    }

    pub fn add_enum_tag(&mut self, tag: &str, ty: TypeId) -> Result<()> {
        if self.search_enum_tag(tag).is_some() {
            bail!("enum tag {tag} already exists");
        }
        self.enum_tags.push((tag.to_owned(), ty));
        Ok(())
    }

    /// Ids of the locals declared directly in this scope, in declaration
    /// order, for offset finalization at rewind.
    pub fn local_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.vars.iter().filter_map(|(_, v)| match v {
            ScopeVar::Local { id, .. } => Some(*id),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::TypeTable;

    #[test]
    fn one_namespace_for_vars_typedefs_and_enum_consts() {
        let mut s = Scope::default();
        s.add_lvar("x", 0, TypeTable::INT).unwrap();
        s.add_typedef("T", TypeTable::LONG).unwrap();
        s.add_enum_const("RED", 2).unwrap();
        assert!(matches!(s.search_var("x"), Some(ScopeVar::Local { .. })));
        assert!(matches!(s.search_var("T"), Some(ScopeVar::TypeDef(_))));
        assert!(matches!(
            s.search_var("RED"),
            Some(ScopeVar::EnumConst { val: 2 })
        ));
        assert!(s.search_var("y").is_none());
    }

    #[test]
    fn duplicate_locals_in_one_scope_are_rejected() {
        let mut s = Scope::default();
        s.add_lvar("x", 0, TypeTable::INT).unwrap();
        assert!(s.add_lvar("x", 1, TypeTable::INT).is_err());
    }

    #[test]
    fn function_globals_may_be_redeclared_but_data_globals_not() {
        let mut s = Scope::default();
        s.add_gvar("f", "f", TypeTable::INT, true).unwrap();
        s.add_gvar("f", "f", TypeTable::INT, true).unwrap();
        s.add_gvar("g", "g", TypeTable::INT, false).unwrap();
        assert!(s.add_gvar("g", "g", TypeTable::INT, false).is_err());
    }

    #[test]
    fn tag_namespaces_are_separate_from_variables() {
        let mut s = Scope::default();
        let mut types = TypeTable::new();
        let cell = types.new_struct_cell();
        s.add_struct_tag("node", cell).unwrap();
        s.add_lvar("node", 0, TypeTable::INT).unwrap();
        assert!(s.search_struct_tag("node").is_some());
        assert!(s.add_struct_tag("node", cell).is_err());
        assert!(s.search_enum_tag("node").is_none());
    }

    #[test]
    fn spawn_inherits_the_parent_offset() {
        let mut parent = Scope::default();
        parent.cur_offset = 24;
        let child = Scope::spawn_from(&parent);
        assert_eq!(child.base_offset, 24);
        assert_eq!(child.cur_offset, 24);
    }
}

//! Type representation and layout rules for the compiled subset of C.
//!
//! Types live in a [`TypeTable`] arena and are referenced by [`TypeId`]
//! indices, so recursive types (`struct node { struct node *next; }`) are
//! expressed by index without reference cycles: the tag namespace binds a
//! struct cell before its member list is filled.

/// Index of a type inside a [`TypeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

/// A member of a struct type.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub offset: i64,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Void,
    Bool,
    Char,
    Short,
    Int,
    Long,
    Enum,
    /// The type of statements.
    Empty,
    Ptr {
        base: TypeId,
    },
    /// `len` is -1 while the length is still to be inferred from an
    /// initializer; it is finalized before code generation begins.
    Arr {
        base: TypeId,
        len: i64,
    },
    Struct {
        align: i64,
        size: i64,
        members: Vec<Member>,
    },
    Fn {
        ret: TypeId,
    },
}

/// Arena of every type mentioned by the translation unit.
///
/// The scalar types are interned once at construction; compound types are
/// appended as the parser encounters them.
#[derive(Debug)]
pub struct TypeTable {
    kinds: Vec<TypeKind>,
}

impl TypeTable {
    pub const VOID: TypeId = TypeId(0);
    pub const BOOL: TypeId = TypeId(1);
    pub const CHAR: TypeId = TypeId(2);
    pub const SHORT: TypeId = TypeId(3);
    pub const INT: TypeId = TypeId(4);
    pub const LONG: TypeId = TypeId(5);
    pub const ENUM: TypeId = TypeId(6);
    pub const EMPTY: TypeId = TypeId(7);

    pub fn new() -> Self {
        Self {
            kinds: vec![
                TypeKind::Void,
                TypeKind::Bool,
                TypeKind::Char,
                TypeKind::Short,
                TypeKind::Int,
                TypeKind::Long,
                TypeKind::Enum,
                TypeKind::Empty,
            ],
        }
    }

    fn add(&mut self, kind: TypeKind) -> TypeId {
        let id = TypeId(self.kinds.len() as u32);
        self.kinds.push(kind);
        id
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id.0 as usize]
    }

    pub fn ptr_to(&mut self, base: TypeId) -> TypeId {
        self.add(TypeKind::Ptr { base })
    }

    pub fn arr_of(&mut self, base: TypeId, len: i64) -> TypeId {
        self.add(TypeKind::Arr { base, len })
    }

    pub fn fn_returning(&mut self, ret: TypeId) -> TypeId {
        self.add(TypeKind::Fn { ret })
    }

    /// Open a struct cell that can be referenced (by tag) before its member
    /// list is known.
    pub fn new_struct_cell(&mut self) -> TypeId {
        self.add(TypeKind::Struct {
            align: 1,
            size: 0,
            members: Vec::new(),
        })
    }

    pub fn fill_struct(&mut self, id: TypeId, members: Vec<Member>, align: i64, size: i64) {
        self.kinds[id.0 as usize] = TypeKind::Struct {
            align,
            size,
            members,
        };
    }

    /// Fresh cell standing in for a not-yet-known type, used while parsing
    /// parenthesized declarators such as `int (*x)[3]`.
    pub fn placeholder(&mut self) -> TypeId {
        self.add(TypeKind::Void)
    }

    /// Redirect a placeholder cell to the now-known type. Every earlier
    /// reference to `hole` observes the resolved type afterwards.
    pub fn resolve_placeholder(&mut self, hole: TypeId, target: TypeId) {
        self.kinds[hole.0 as usize] = self.kind(target).clone();
    }

    /// Finalize an inferred array length. Arrays are one cell per
    /// declaration, so this only affects the declared object.
    pub fn set_arr_len(&mut self, id: TypeId, len: i64) {
        if let TypeKind::Arr { len: l, .. } = &mut self.kinds[id.0 as usize] {
            *l = len;
        }
    }

    pub fn size(&self, id: TypeId) -> i64 {
        match self.kind(id) {
            TypeKind::Void => 1,
            TypeKind::Bool => 1,
            TypeKind::Char => 1,
            TypeKind::Short => 2,
            TypeKind::Int => 4,
            TypeKind::Long => 8,
            TypeKind::Enum => 4,
            TypeKind::Empty => 0,
            TypeKind::Ptr { .. } => 8,
            TypeKind::Arr { base, len } => len * self.size(*base),
            TypeKind::Struct { size, .. } => *size,
            TypeKind::Fn { .. } => 1,
        }
    }

    pub fn align(&self, id: TypeId) -> i64 {
        match self.kind(id) {
            TypeKind::Void => 1,
            TypeKind::Bool => 1,
            TypeKind::Char => 1,
            TypeKind::Short => 2,
            TypeKind::Int => 4,
            TypeKind::Long => 8,
            TypeKind::Enum => 4,
            TypeKind::Empty => 0,
            TypeKind::Ptr { .. } => 8,
            TypeKind::Arr { base, .. } => self.align(*base),
            TypeKind::Struct { align, .. } => *align,
            TypeKind::Fn { .. } => 1,
        }
    }

    /// Pointee (or element) type of a pointer-like type.
    pub fn base(&self, id: TypeId) -> Option<TypeId> {
        match self.kind(id) {
            TypeKind::Ptr { base } | TypeKind::Arr { base, .. } => Some(*base),
            _ => None,
        }
    }

    pub fn is_pointing(&self, id: TypeId) -> bool {
        matches!(
            self.kind(id),
            TypeKind::Ptr { .. } | TypeKind::Arr { .. }
        )
    }

    pub fn is_integer(&self, id: TypeId) -> bool {
        matches!(
            self.kind(id),
            TypeKind::Bool
                | TypeKind::Char
                | TypeKind::Short
                | TypeKind::Int
                | TypeKind::Long
                | TypeKind::Enum
        )
    }

    pub fn find_member(&self, id: TypeId, name: &str) -> Option<&Member> {
        match self.kind(id) {
            TypeKind::Struct { members, .. } => members.iter().find(|m| m.name == name),
            _ => None,
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

pub fn align_to(n: i64, align: i64) -> i64 {
    (n + align - 1) / align * align
}

//! Pre-extracted public member table of the trusted assemblies.
//!
//! The heuristic detectors and the facade resolver need to know which members the host's
//! current types actually declare. Instead of reflecting over live types, the member
//! catalog is a plain data table extracted ahead of time (one per host release) and
//! queried by structural name.
//!
//! # Example
//!
//! ```rust
//! use cilshim::{
//!     model::TypeRef,
//!     symbols::{CatalogMethod, CatalogType, MemberCatalog},
//! };
//!
//! let mut catalog = MemberCatalog::new();
//! catalog.insert(
//!     CatalogType::new("Stardew Valley", "StardewValley.Game1")
//!         .static_field("player", TypeRef::new("Stardew Valley", "StardewValley.Farmer"))
//!         .method(
//!             CatalogMethod::new("getCharacterFromName", TypeRef::new("Stardew Valley", "StardewValley.NPC"))
//!                 .static_()
//!                 .param(TypeRef::system("System.String"))
//!                 .param(TypeRef::system("System.Boolean")),
//!         ),
//! );
//!
//! assert!(catalog.find_field("StardewValley.Game1", "player").is_some());
//! assert_eq!(catalog.methods_named("StardewValley.Game1", "getCharacterFromName").len(), 1);
//! ```

use std::collections::HashMap;

use bitflags::bitflags;

use crate::model::{Constant, FieldRef, MethodRef, TypeRef, CONSTRUCTOR_NAME};

bitflags! {
    /// Attributes of a catalogued member.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemberFlags: u8 {
        /// Member is static (no `this`)
        const STATIC = 0x01;
        /// Method is virtual
        const VIRTUAL = 0x02;
        /// Method is a property accessor (`get_X`/`set_X`)
        const ACCESSOR = 0x04;
        /// Field is a compile-time literal
        const LITERAL = 0x08;
    }
}

/// A catalogued parameter, with its default value if it is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogParameter {
    /// Declared parameter type
    pub ty: TypeRef,
    /// Default value of an optional parameter
    pub default: Option<Constant>,
}

/// A catalogued field.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogField {
    /// Field name
    pub name: String,
    /// Declared field type
    pub field_type: TypeRef,
    /// Member attributes
    pub flags: MemberFlags,
}

impl CatalogField {
    /// Returns true for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MemberFlags::STATIC)
    }

    /// Builds a field reference against `declaring_type`.
    #[must_use]
    pub fn to_field_ref(&self, declaring_type: TypeRef) -> FieldRef {
        FieldRef::new(declaring_type, self.name.clone(), self.field_type.clone())
    }
}

/// A catalogued method or constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogMethod {
    /// Method name
    pub name: String,
    /// Declared return type
    pub return_type: TypeRef,
    /// Declared parameters
    pub parameters: Vec<CatalogParameter>,
    /// Member attributes
    pub flags: MemberFlags,
}

impl CatalogMethod {
    /// Starts an instance method entry.
    pub fn new(name: impl Into<String>, return_type: TypeRef) -> Self {
        CatalogMethod {
            name: name.into(),
            return_type,
            parameters: Vec::new(),
            flags: MemberFlags::empty(),
        }
    }

    /// Starts a constructor entry.
    #[must_use]
    pub fn constructor() -> Self {
        CatalogMethod::new(CONSTRUCTOR_NAME, TypeRef::void())
    }

    /// Marks the method static.
    #[must_use]
    pub fn static_(mut self) -> Self {
        self.flags |= MemberFlags::STATIC;
        self
    }

    /// Marks the method virtual.
    #[must_use]
    pub fn virtual_(mut self) -> Self {
        self.flags |= MemberFlags::VIRTUAL;
        self
    }

    /// Adds attribute flags.
    #[must_use]
    pub fn with_flags(mut self, flags: MemberFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Appends a required parameter.
    #[must_use]
    pub fn param(mut self, ty: TypeRef) -> Self {
        self.parameters.push(CatalogParameter { ty, default: None });
        self
    }

    /// Appends an optional parameter with its default value.
    #[must_use]
    pub fn optional(mut self, ty: TypeRef, default: Constant) -> Self {
        self.parameters.push(CatalogParameter {
            ty,
            default: Some(default),
        });
        self
    }

    /// Returns true for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MemberFlags::STATIC)
    }

    /// Returns true for instance constructors.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// Returns true if the declared parameter types equal `parameters`, by full name.
    #[must_use]
    pub fn parameters_match(&self, parameters: &[TypeRef]) -> bool {
        self.parameters.len() == parameters.len()
            && self
                .parameters
                .iter()
                .zip(parameters)
                .all(|(declared, used)| declared.ty.full_name() == used.full_name())
    }

    /// Builds a method reference against `declaring_type`.
    #[must_use]
    pub fn to_method_ref(&self, declaring_type: TypeRef) -> MethodRef {
        MethodRef {
            declaring_type,
            name: self.name.clone(),
            has_this: !self.is_static(),
            return_type: self.return_type.clone(),
            parameters: self.parameters.iter().map(|p| p.ty.clone()).collect(),
            generic_arguments: Vec::new(),
        }
    }
}

/// A catalogued type and the members it declares.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogType {
    /// Defining assembly
    pub scope: String,
    /// Full name without generic arguments
    pub name: String,
    /// Base type name, for inherited member lookup
    pub base: Option<String>,
    /// Declared fields
    pub fields: Vec<CatalogField>,
    /// Declared methods, constructors and property accessors
    pub methods: Vec<CatalogMethod>,
}

impl CatalogType {
    /// Starts a type entry.
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        CatalogType {
            scope: scope.into(),
            name: name.into(),
            base: None,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Sets the base type.
    #[must_use]
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Adds an instance field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field_type: TypeRef) -> Self {
        self.fields.push(CatalogField {
            name: name.into(),
            field_type,
            flags: MemberFlags::empty(),
        });
        self
    }

    /// Adds a static field.
    #[must_use]
    pub fn static_field(mut self, name: impl Into<String>, field_type: TypeRef) -> Self {
        self.fields.push(CatalogField {
            name: name.into(),
            field_type,
            flags: MemberFlags::STATIC,
        });
        self
    }

    /// Adds a method or constructor.
    #[must_use]
    pub fn method(mut self, method: CatalogMethod) -> Self {
        self.methods.push(method);
        self
    }

    /// Adds an instance property as its `get_`/`set_` accessor pair.
    #[must_use]
    pub fn property(self, name: &str, ty: TypeRef) -> Self {
        self.accessors(name, ty, MemberFlags::ACCESSOR)
    }

    /// Adds a static property as its `get_`/`set_` accessor pair.
    #[must_use]
    pub fn static_property(self, name: &str, ty: TypeRef) -> Self {
        self.accessors(name, ty, MemberFlags::ACCESSOR | MemberFlags::STATIC)
    }

    fn accessors(self, name: &str, ty: TypeRef, flags: MemberFlags) -> Self {
        self.method(CatalogMethod::new(format!("get_{name}"), ty.clone()).with_flags(flags))
            .method(
                CatalogMethod::new(format!("set_{name}"), TypeRef::void())
                    .param(ty)
                    .with_flags(flags),
            )
    }

    /// Returns a reference to this type, without generic arguments.
    #[must_use]
    pub fn type_ref(&self) -> TypeRef {
        TypeRef::new(self.scope.clone(), self.name.clone())
    }
}

/// The member table of every catalogued type, keyed by open full name.
#[derive(Debug, Clone, Default)]
pub struct MemberCatalog {
    types: HashMap<String, CatalogType>,
}

impl MemberCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a type entry.
    pub fn insert(&mut self, ty: CatalogType) {
        self.types.insert(ty.name.clone(), ty);
    }

    /// Returns the number of catalogued types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if nothing is catalogued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Returns the entry for a type by open full name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CatalogType> {
        self.types.get(name)
    }

    /// Returns true if the type is catalogued.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Iterates over all entries.
    pub fn types(&self) -> impl Iterator<Item = &CatalogType> {
        self.types.values()
    }

    /// Walks `name` and its catalogued base types, most derived first.
    ///
    /// The walk is bounded by the catalog size so a malformed base cycle terminates.
    pub fn hierarchy<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a CatalogType> + 'a {
        let mut next = self.types.get(name);
        let mut remaining = self.types.len();
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            let current = next?;
            next = current.base.as_deref().and_then(|base| self.types.get(base));
            Some(current)
        })
    }

    /// Finds a field declared by `type_name` or one of its base types.
    #[must_use]
    pub fn find_field(&self, type_name: &str, field: &str) -> Option<(&CatalogType, &CatalogField)> {
        self.hierarchy(type_name)
            .find_map(|ty| ty.fields.iter().find(|f| f.name == field).map(|f| (ty, f)))
    }

    /// Returns every method named `name` on `type_name` and its base types.
    ///
    /// Constructors are never inherited, so `.ctor` only searches the type itself.
    #[must_use]
    pub fn methods_named(&self, type_name: &str, name: &str) -> Vec<(&CatalogType, &CatalogMethod)> {
        let mut found = Vec::new();
        for ty in self.hierarchy(type_name) {
            found.extend(ty.methods.iter().filter(|m| m.name == name).map(|m| (ty, m)));
            if name == CONSTRUCTOR_NAME {
                break;
            }
        }
        found
    }

    /// Finds a method by name, exact parameter list and static-ness.
    #[must_use]
    pub fn find_method(
        &self,
        type_name: &str,
        name: &str,
        parameters: &[TypeRef],
        is_static: bool,
    ) -> Option<(&CatalogType, &CatalogMethod)> {
        self.methods_named(type_name, name)
            .into_iter()
            .find(|(_, m)| m.is_static() == is_static && m.parameters_match(parameters))
    }

    /// Finds the property accessor replacing a field access, if the type declares one.
    #[must_use]
    pub fn find_accessor(
        &self,
        type_name: &str,
        field: &str,
        load: bool,
        is_static: bool,
    ) -> Option<(&CatalogType, &CatalogMethod)> {
        let accessor = if load {
            format!("get_{field}")
        } else {
            format!("set_{field}")
        };
        let arity = usize::from(!load);
        self.methods_named(type_name, &accessor)
            .into_iter()
            .find(|(_, m)| m.is_static() == is_static && m.parameters.len() == arity)
    }
}

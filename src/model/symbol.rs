//! Structural symbol references carried by instruction operands.
//!
//! A symbol reference names an external type, field or method purely by its structure
//! (declaring type full name, member name, member kind and signature). References are
//! compared structurally and never through a live type handle, because the referenced
//! type may not exist in the current process at all; detecting exactly that is one of
//! the jobs of this crate.
//!
//! # Key Components
//!
//! - [`TypeRef`] - A type, optionally instantiated with generic arguments
//! - [`MethodRef`] - A method or constructor referenced by `call`, `callvirt` or `newobj`
//! - [`FieldRef`] - A field referenced by the field access instructions
//! - [`SymbolRef`] - The tagged union of the three, as seen by the handlers
//!
//! # Canonical Names
//!
//! All references print in the canonical IL form used by the declarative rule tables:
//!
//! ```text
//! System.Void StardewValley.Game1::drawDialogue(StardewValley.NPC,System.String)
//! Netcode.NetCollection`1<StardewValley.Objects.Furniture> StardewValley.Locations.DecoratableLocation::furniture
//! StardewValley.Network.OverlaidDictionary/KeysCollection
//! ```
//!
//! The inverse operation lives in [`crate::symbols::signature`].

use std::fmt;

/// The name of the void type, used for methods that push nothing.
pub const VOID_TYPE: &str = "System.Void";

/// The member name used by instance constructors.
pub const CONSTRUCTOR_NAME: &str = ".ctor";

/// Kinds of symbol that an instruction can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// A type (type tokens, or the declaring type of a member)
    Type,
    /// A field
    Field,
    /// A method or constructor
    Method,
}

/// A reference to a type by structural name.
///
/// `name` is the full name without generic arguments but including the generic arity
/// suffix (e.g. ``Netcode.NetFieldBase`2``); nested types are separated with `/`.
/// `scope` is the name of the assembly expected to define the type, which is what the
/// heuristic detectors use to decide whether a reference is trusted. Generic parameter
/// placeholders such as `!0` have an empty scope.
///
/// # Examples
///
/// ```rust
/// use cilshim::model::TypeRef;
///
/// let color = TypeRef::new("MonoGame.Framework", "Microsoft.Xna.Framework.Color");
/// let field = TypeRef::generic(
///     "Netcode",
///     "Netcode.NetFieldBase`2",
///     vec![color, TypeRef::new("Netcode", "Netcode.NetColor")],
/// );
///
/// assert_eq!(
///     field.full_name(),
///     "Netcode.NetFieldBase`2<Microsoft.Xna.Framework.Color,Netcode.NetColor>"
/// );
/// assert_eq!(field.generic_arity(), 2);
/// assert_eq!(field.namespace(), "Netcode");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    /// Name of the assembly expected to define this type
    pub scope: String,
    /// Full name without generic arguments
    pub name: String,
    /// Generic arguments, if this is an instantiated generic type
    pub generic_arguments: Vec<TypeRef>,
}

impl TypeRef {
    /// Creates a non-generic type reference.
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        TypeRef {
            scope: scope.into(),
            name: name.into(),
            generic_arguments: Vec::new(),
        }
    }

    /// Creates an instantiated generic type reference.
    pub fn generic(
        scope: impl Into<String>,
        name: impl Into<String>,
        generic_arguments: Vec<TypeRef>,
    ) -> Self {
        TypeRef {
            scope: scope.into(),
            name: name.into(),
            generic_arguments,
        }
    }

    /// Creates a reference to a core library type (`System.*`).
    pub fn system(name: impl Into<String>) -> Self {
        TypeRef::new("System.Runtime", name)
    }

    /// Creates a reference to `System.Void`.
    #[must_use]
    pub fn void() -> Self {
        TypeRef::system(VOID_TYPE)
    }

    /// Returns true if this is `System.Void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        self.name == VOID_TYPE
    }

    /// Returns true if this is a generic parameter placeholder (`!0`, `!!0`).
    #[must_use]
    pub fn is_generic_parameter(&self) -> bool {
        self.name.starts_with('!')
    }

    /// Returns the full name including generic arguments.
    #[must_use]
    pub fn full_name(&self) -> String {
        let mut out = String::new();
        self.write_full_name(&mut out);
        out
    }

    fn write_full_name(&self, out: &mut String) {
        out.push_str(&self.name);
        if !self.generic_arguments.is_empty() {
            out.push('<');
            for (i, arg) in self.generic_arguments.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                arg.write_full_name(out);
            }
            out.push('>');
        }
    }

    /// Returns the namespace of the outermost declaring type, or an empty string.
    #[must_use]
    pub fn namespace(&self) -> &str {
        let outer = self.name.split('/').next().unwrap_or(&self.name);
        match outer.rfind('.') {
            Some(pos) => &outer[..pos],
            None => "",
        }
    }

    /// Returns the generic arity encoded in the name suffix (``Name`N``), or 0.
    #[must_use]
    pub fn generic_arity(&self) -> usize {
        let last = self.name.rsplit('/').next().unwrap_or(&self.name);
        last.rsplit_once('`')
            .and_then(|(_, arity)| arity.parse().ok())
            .unwrap_or(0)
    }

    /// Returns this type with all generic arguments stripped (recursively irrelevant,
    /// since only the head is kept).
    #[must_use]
    pub fn open(&self) -> TypeRef {
        TypeRef::new(self.scope.clone(), self.name.clone())
    }

    /// Returns true if this type or any of its generic arguments satisfies `pred`.
    pub fn any(&self, pred: &mut impl FnMut(&TypeRef) -> bool) -> bool {
        pred(self) || self.generic_arguments.iter().any(|arg| arg.any(pred))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// A reference to a method or constructor.
///
/// The signature is kept as declared: parameters and return type may refer to the
/// declaring type's generic parameters (`!0`), exactly as the canonical name prints.
///
/// # Examples
///
/// ```rust
/// use cilshim::model::{MethodRef, TypeRef};
///
/// let method = MethodRef::new_static(
///     TypeRef::new("Stardew Valley", "StardewValley.Game1"),
///     "drawDialogue",
///     TypeRef::void(),
///     vec![
///         TypeRef::new("Stardew Valley", "StardewValley.NPC"),
///         TypeRef::system("System.String"),
///     ],
/// );
///
/// assert_eq!(
///     method.full_name(),
///     "System.Void StardewValley.Game1::drawDialogue(StardewValley.NPC,System.String)"
/// );
/// assert_eq!(method.stack_pops(), 2);
/// assert_eq!(method.stack_pushes(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// The type declaring the method
    pub declaring_type: TypeRef,
    /// The method name (`.ctor` for constructors)
    pub name: String,
    /// Whether the method takes an implicit `this` argument
    pub has_this: bool,
    /// The declared return type
    pub return_type: TypeRef,
    /// The declared parameter types, in order
    pub parameters: Vec<TypeRef>,
    /// Generic method arguments, if this is an instantiated generic method
    pub generic_arguments: Vec<TypeRef>,
}

impl MethodRef {
    /// Creates a reference to an instance method.
    pub fn new_instance(
        declaring_type: TypeRef,
        name: impl Into<String>,
        return_type: TypeRef,
        parameters: Vec<TypeRef>,
    ) -> Self {
        MethodRef {
            declaring_type,
            name: name.into(),
            has_this: true,
            return_type,
            parameters,
            generic_arguments: Vec::new(),
        }
    }

    /// Creates a reference to a static method.
    pub fn new_static(
        declaring_type: TypeRef,
        name: impl Into<String>,
        return_type: TypeRef,
        parameters: Vec<TypeRef>,
    ) -> Self {
        MethodRef {
            has_this: false,
            ..MethodRef::new_instance(declaring_type, name, return_type, parameters)
        }
    }

    /// Creates a reference to an instance constructor.
    #[must_use]
    pub fn constructor(declaring_type: TypeRef, parameters: Vec<TypeRef>) -> Self {
        MethodRef::new_instance(declaring_type, CONSTRUCTOR_NAME, TypeRef::void(), parameters)
    }

    /// Adds generic method arguments.
    #[must_use]
    pub fn with_generic_arguments(mut self, arguments: Vec<TypeRef>) -> Self {
        self.generic_arguments = arguments;
        self
    }

    /// Returns true for instance constructors.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// Number of stack slots taken by the explicit parameters, saturating at `u16::MAX`.
    #[must_use]
    pub fn parameter_slots(&self) -> u16 {
        u16::try_from(self.parameters.len()).unwrap_or(u16::MAX)
    }

    /// Number of stack slots consumed by `call`/`callvirt` of this method.
    #[must_use]
    pub fn stack_pops(&self) -> u16 {
        self.parameter_slots().saturating_add(u16::from(self.has_this))
    }

    /// Number of stack slots produced by `call`/`callvirt` of this method.
    #[must_use]
    pub fn stack_pushes(&self) -> u16 {
        u16::from(!self.return_type.is_void())
    }

    /// Returns the canonical full name.
    #[must_use]
    pub fn full_name(&self) -> String {
        let mut out = format!(
            "{} {}::{}",
            self.return_type.full_name(),
            self.declaring_type.full_name(),
            self.name
        );
        if !self.generic_arguments.is_empty() {
            out.push('<');
            out.push_str(&join_types(&self.generic_arguments));
            out.push('>');
        }
        out.push('(');
        out.push_str(&join_types(&self.parameters));
        out.push(')');
        out
    }

    /// Returns the human-oriented short form `Type.Name(params)`, used in messages.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!(
            "{}.{}({})",
            self.declaring_type.name,
            self.name,
            join_types(&self.parameters)
        )
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// A reference to a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// The type declaring the field
    pub declaring_type: TypeRef,
    /// The field name
    pub name: String,
    /// The declared field type
    pub field_type: TypeRef,
}

impl FieldRef {
    /// Creates a field reference.
    pub fn new(declaring_type: TypeRef, name: impl Into<String>, field_type: TypeRef) -> Self {
        FieldRef {
            declaring_type,
            name: name.into(),
            field_type,
        }
    }

    /// Returns the canonical full name.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!(
            "{} {}::{}",
            self.field_type.full_name(),
            self.declaring_type.full_name(),
            self.name
        )
    }

    /// Returns the human-oriented short form `Type.name`, used in messages.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.declaring_type.name, self.name)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Any symbol an instruction operand can reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymbolRef {
    /// A type token
    Type(TypeRef),
    /// A field
    Field(FieldRef),
    /// A method or constructor
    Method(MethodRef),
}

impl SymbolRef {
    /// Returns the kind of member referenced.
    #[must_use]
    pub fn kind(&self) -> MemberKind {
        match self {
            SymbolRef::Type(_) => MemberKind::Type,
            SymbolRef::Field(_) => MemberKind::Field,
            SymbolRef::Method(_) => MemberKind::Method,
        }
    }

    /// Returns the declaring type, or the type itself for type tokens.
    #[must_use]
    pub fn declaring_type(&self) -> &TypeRef {
        match self {
            SymbolRef::Type(ty) => ty,
            SymbolRef::Field(field) => &field.declaring_type,
            SymbolRef::Method(method) => &method.declaring_type,
        }
    }

    /// Returns the member name (the type name for type tokens).
    #[must_use]
    pub fn member_name(&self) -> &str {
        match self {
            SymbolRef::Type(ty) => &ty.name,
            SymbolRef::Field(field) => &field.name,
            SymbolRef::Method(method) => &method.name,
        }
    }

    /// Returns the canonical full name.
    #[must_use]
    pub fn full_name(&self) -> String {
        match self {
            SymbolRef::Type(ty) => ty.full_name(),
            SymbolRef::Field(field) => field.full_name(),
            SymbolRef::Method(method) => method.full_name(),
        }
    }

    /// Returns the short form used in messages (`Type.Member(params)`).
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            SymbolRef::Type(ty) => ty.full_name(),
            SymbolRef::Field(field) => field.display_name(),
            SymbolRef::Method(method) => method.display_name(),
        }
    }

    /// Returns true if any type mentioned anywhere in this reference satisfies `pred`.
    pub fn mentions(&self, mut pred: impl FnMut(&TypeRef) -> bool) -> bool {
        match self {
            SymbolRef::Type(ty) => ty.any(&mut pred),
            SymbolRef::Field(field) => {
                field.declaring_type.any(&mut pred) || field.field_type.any(&mut pred)
            }
            SymbolRef::Method(method) => {
                method.declaring_type.any(&mut pred)
                    || method.return_type.any(&mut pred)
                    || method.parameters.iter().any(|p| p.any(&mut pred))
                    || method.generic_arguments.iter().any(|g| g.any(&mut pred))
            }
        }
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

pub(crate) fn join_types(types: &[TypeRef]) -> String {
    types
        .iter()
        .map(TypeRef::full_name)
        .collect::<Vec<_>>()
        .join(",")
}

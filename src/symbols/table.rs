//! The symbol reference table: old-signature to replacement mapping.
//!
//! The table is populated through [`SymbolTableBuilder`], which only records registrations
//! in order. [`SymbolTableBuilder::build`] parses every signature, validates the targets
//! against the [`MemberCatalog`] and produces an immutable [`SymbolTable`] that is shared
//! read-only by every module pipeline.
//!
//! # Resolution Precedence
//!
//! For an instruction operand, [`SymbolTable::resolve`] applies, highest first:
//!
//! 1. an exact field/method rule keyed by the operand's canonical signature, then the same
//!    lookup with generic arguments stripped (first registered wins; more than one
//!    candidate is reported as ambiguous)
//! 2. a facade registered for the operand's declaring type, if the facade declares a
//!    matching member
//! 3. type rules, applied to every type mentioned by the (possibly already rewritten)
//!    operand
//!
//! Type rules are applied to the operand before the member lookups of steps 1 and 2, so a
//! member rule may be keyed by the mapped signature. Keys written against the unmapped
//! signature are tried next.
//!
//! Anything else passes through unchanged. Because precedence is decided at lookup time,
//! the order of registrations only matters for identical keys (the last one wins) and for
//! ambiguous normalized lookups (the first one wins).
//!
//! # Examples
//!
//! ```rust
//! use cilshim::{
//!     model::{MethodRef, Op, TypeRef},
//!     symbols::{MemberCatalog, Resolution, SymbolTableBuilder},
//! };
//!
//! let mut builder = SymbolTableBuilder::new();
//! builder.register_method("System.Void OldType::Foo()", TypeRef::new("Host", "NewType"), "Bar");
//! let table = builder.build(MemberCatalog::new()).unwrap();
//!
//! let foo = MethodRef::new_static(TypeRef::new("Host", "OldType"), "Foo", TypeRef::void(), vec![]);
//! match table.resolve(&Op::Call(foo)) {
//!     Resolution::Rewrite { op: Op::Call(bar), .. } => {
//!         assert_eq!(bar.full_name(), "System.Void NewType::Bar()");
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

use std::collections::{HashMap, HashSet};

use strum::IntoStaticStr;

use crate::{
    model::{join_types, FieldRef, MethodRef, Op, SymbolRef, TypeRef, CONSTRUCTOR_NAME},
    report::Severity,
    symbols::{
        catalog::{CatalogMethod, CatalogType, MemberCatalog},
        signature::{parse_signature, parse_type},
    },
    Result,
};

/// Name of the static facade method that stands in for a constructor.
pub const FACADE_CONSTRUCTOR: &str = "Constructor";

/// The kind of rule that produced a rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum RuleKind {
    /// An exact or normalized field rule
    Field,
    /// An exact or normalized method rule
    Method,
    /// A facade member match
    Facade,
    /// A bare type rule
    Type,
}

/// The result of looking up one instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// No rule applies, or applying the rules changes nothing
    Unchanged,
    /// The operand should be replaced
    Rewrite {
        /// The replacement operation, with all type rules applied
        op: Op,
        /// The highest-precedence rule that applied
        rule: RuleKind,
        /// Number of candidates if the member rule was chosen among several
        ambiguous: Option<usize>,
    },
    /// A member rule matched, but its target cannot take the call
    Unresolved {
        /// Explanation to report
        message: String,
    },
    /// The operand matched a detect-only rule
    Detect {
        /// Severity to report
        severity: Severity,
        /// Explanation to report
        message: String,
    },
}

#[derive(Debug, Clone)]
enum Registration {
    Type {
        old: String,
        new: TypeRef,
    },
    Field {
        old: String,
        new_type: TypeRef,
        new_name: String,
    },
    Method {
        old: String,
        new_type: TypeRef,
        new_name: String,
    },
    Facade {
        old: String,
        facade: TypeRef,
    },
    Detect {
        old: String,
        severity: Severity,
        message: String,
    },
}

/// Collects rule registrations in order; see the module documentation for precedence.
#[derive(Debug, Clone, Default)]
pub struct SymbolTableBuilder {
    registrations: Vec<Registration>,
}

impl SymbolTableBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every occurrence of the type `old_full_name` with `new_type`.
    ///
    /// An open generic name (``Netcode.NetRef`1``) matches every instantiation and keeps
    /// its arguments.
    pub fn register_type(&mut self, old_full_name: impl Into<String>, new_type: TypeRef) -> &mut Self {
        self.registrations.push(Registration::Type {
            old: old_full_name.into(),
            new: new_type,
        });
        self
    }

    /// Redirects accesses to the field `old_signature` to `new_name` on `new_declaring_type`.
    pub fn register_field(
        &mut self,
        old_signature: impl Into<String>,
        new_declaring_type: TypeRef,
        new_name: impl Into<String>,
    ) -> &mut Self {
        self.registrations.push(Registration::Field {
            old: old_signature.into(),
            new_type: new_declaring_type,
            new_name: new_name.into(),
        });
        self
    }

    /// Retargets calls to the method `old_signature` to `new_name` on `new_declaring_type`.
    pub fn register_method(
        &mut self,
        old_signature: impl Into<String>,
        new_declaring_type: TypeRef,
        new_name: impl Into<String>,
    ) -> &mut Self {
        self.registrations.push(Registration::Method {
            old: old_signature.into(),
            new_type: new_declaring_type,
            new_name: new_name.into(),
        });
        self
    }

    /// Maps every member access against `old_type` to the like-named member of `facade`.
    pub fn register_facade(&mut self, old_type: impl Into<String>, facade: TypeRef) -> &mut Self {
        self.registrations.push(Registration::Facade {
            old: old_type.into(),
            facade,
        });
        self
    }

    /// Reports references to `old_signature` without rewriting them.
    pub fn register_detection(
        &mut self,
        old_signature: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> &mut Self {
        self.registrations.push(Registration::Detect {
            old: old_signature.into(),
            severity,
            message: message.into(),
        });
        self
    }

    /// Appends all registrations of `other`, after the ones already recorded.
    pub fn extend(&mut self, other: &SymbolTableBuilder) -> &mut Self {
        self.registrations.extend(other.registrations.iter().cloned());
        self
    }

    /// Returns the number of recorded registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Returns true if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Parses, validates and indexes the registrations.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Signature`] for unparsable signatures and
    /// [`crate::Error::Configuration`] when:
    /// - a field rule names a method signature or vice versa
    /// - a facade type is not in the catalog
    /// - a rule targets a catalogued type that does not declare the named member
    /// - a rule's target is itself the key of another rule
    pub fn build(&self, catalog: MemberCatalog) -> Result<SymbolTable> {
        let mut members: HashMap<String, MemberRule> = HashMap::new();
        let mut types: HashMap<String, TypeRef> = HashMap::new();
        let mut facades: HashMap<String, TypeRef> = HashMap::new();

        for (order, registration) in self.registrations.iter().enumerate() {
            match registration {
                Registration::Type { old, new } => {
                    types.insert(parse_type(old)?.full_name(), new.clone());
                }
                Registration::Facade { old, facade } => {
                    let old = parse_type(old)?;
                    if !catalog.contains(&facade.name) {
                        return Err(config_error!(
                            "Facade {} for {} is not in the member catalog",
                            facade.name,
                            old.name
                        ));
                    }
                    facades.insert(old.name, facade.clone());
                }
                Registration::Field {
                    old,
                    new_type,
                    new_name,
                } => {
                    let SymbolRef::Field(_) = parse_signature(old)? else {
                        return Err(config_error!("Field rule key '{}' is not a field signature", old));
                    };
                    let rule = MemberRule::new(
                        old,
                        order,
                        MemberAction::Field {
                            new_type: new_type.clone(),
                            new_name: new_name.clone(),
                        },
                    )?;
                    members.insert(rule.key.clone(), rule);
                }
                Registration::Method {
                    old,
                    new_type,
                    new_name,
                } => {
                    let SymbolRef::Method(_) = parse_signature(old)? else {
                        return Err(config_error!("Method rule key '{}' is not a method signature", old));
                    };
                    let rule = MemberRule::new(
                        old,
                        order,
                        MemberAction::Method {
                            new_type: new_type.clone(),
                            new_name: new_name.clone(),
                        },
                    )?;
                    members.insert(rule.key.clone(), rule);
                }
                Registration::Detect {
                    old,
                    severity,
                    message,
                } => {
                    let rule = MemberRule::new(
                        old,
                        order,
                        MemberAction::Detect {
                            severity: *severity,
                            message: message.clone(),
                        },
                    )?;
                    members.insert(rule.key.clone(), rule);
                }
            }
        }

        let mut rules: Vec<MemberRule> = members.into_values().collect();
        rules.sort_by_key(|rule| rule.order);

        let mut table = SymbolTable {
            exact: HashMap::with_capacity(rules.len()),
            normalized: HashMap::new(),
            rules,
            types,
            facades,
            catalog,
        };
        table.validate()?;

        for (index, rule) in table.rules.iter().enumerate() {
            table.exact.insert(rule.key.clone(), index);
            table
                .normalized
                .entry(normalized_key(&rule.old))
                .or_default()
                .push(index);
        }

        Ok(table)
    }
}

#[derive(Debug, Clone)]
enum MemberAction {
    Field { new_type: TypeRef, new_name: String },
    Method { new_type: TypeRef, new_name: String },
    Detect { severity: Severity, message: String },
}

#[derive(Debug, Clone)]
struct MemberRule {
    key: String,
    old: SymbolRef,
    order: usize,
    action: MemberAction,
}

impl MemberRule {
    fn new(signature: &str, order: usize, action: MemberAction) -> Result<Self> {
        let old = parse_signature(signature)?;
        Ok(MemberRule {
            key: old.full_name(),
            old,
            order,
            action,
        })
    }
}

/// The read-only, validated symbol reference table.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    rules: Vec<MemberRule>,
    exact: HashMap<String, usize>,
    normalized: HashMap<String, Vec<usize>>,
    types: HashMap<String, TypeRef>,
    facades: HashMap<String, TypeRef>,
    catalog: MemberCatalog,
}

impl SymbolTable {
    /// Returns the member catalog the table was validated against.
    #[must_use]
    pub fn catalog(&self) -> &MemberCatalog {
        &self.catalog
    }

    /// Returns the number of field, method and detection rules.
    #[must_use]
    pub fn member_rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Returns the facade registered for a type, by open full name.
    #[must_use]
    pub fn facade_for(&self, type_name: &str) -> Option<&TypeRef> {
        self.facades.get(type_name)
    }

    /// Resolves the replacement for one instruction operation.
    ///
    /// Type rules are applied to the operand before member rules are looked up, so a
    /// member key may name types in their mapped form. A key written against the
    /// unmapped operand still matches.
    #[must_use]
    pub fn resolve(&self, op: &Op) -> Resolution {
        let Some(original) = operand_symbol(op) else {
            return Resolution::Unchanged;
        };
        let mapped_op = self.map_op(op);
        let Some(mapped) = operand_symbol(&mapped_op) else {
            return Resolution::Unchanged;
        };

        let mut rule = RuleKind::Type;
        let mut ambiguous = None;

        let found = self
            .find_member_rule(&mapped)
            .or_else(|| self.find_member_rule(&original));
        let rewritten = if let Some((member_rule, candidates)) = found {
            if candidates > 1 {
                ambiguous = Some(candidates);
            }
            match (&member_rule.action, &mapped) {
                (MemberAction::Detect { severity, message }, _) => {
                    return Resolution::Detect {
                        severity: *severity,
                        message: message.clone(),
                    };
                }
                (MemberAction::Field { new_type, new_name }, SymbolRef::Field(field)) => {
                    rule = RuleKind::Field;
                    self.retarget_field(&mapped_op, field, new_type, new_name)
                }
                (MemberAction::Method { new_type, new_name }, SymbolRef::Method(method)) => {
                    rule = RuleKind::Method;
                    match self.retarget_method(&mapped_op, method, new_type, new_name) {
                        Some(retargeted) => retargeted,
                        None => {
                            return Resolution::Unresolved {
                                message: format!(
                                    "rule for {} targets {}::{}, but no catalogued overload fits the call",
                                    member_rule.key, new_type.name, new_name
                                ),
                            };
                        }
                    }
                }
                _ => mapped_op,
            }
        } else if let Some(facade_op) = self.apply_facade(&mapped_op).or_else(|| self.apply_facade(op)) {
            rule = RuleKind::Facade;
            facade_op
        } else {
            mapped_op
        };

        let rewritten = self.map_op(&rewritten);
        if rewritten == *op {
            return Resolution::Unchanged;
        }

        Resolution::Rewrite {
            op: rewritten,
            rule,
            ambiguous,
        }
    }

    /// Applies the type rules to a single type reference.
    #[must_use]
    pub fn map_type(&self, ty: &TypeRef) -> TypeRef {
        if self.types.is_empty() {
            return ty.clone();
        }
        if let Some(replacement) = self.types.get(&ty.full_name()) {
            return replacement.clone();
        }

        let arguments: Vec<TypeRef> = ty.generic_arguments.iter().map(|a| self.map_type(a)).collect();
        if !ty.generic_arguments.is_empty() {
            if let Some(replacement) = self.types.get(&ty.name) {
                let mut replacement = replacement.clone();
                if replacement.generic_arguments.is_empty() {
                    replacement.generic_arguments = arguments;
                }
                return replacement;
            }
        }

        TypeRef {
            scope: ty.scope.clone(),
            name: ty.name.clone(),
            generic_arguments: arguments,
        }
    }

    fn find_member_rule(&self, symbol: &SymbolRef) -> Option<(&MemberRule, usize)> {
        if let SymbolRef::Type(_) = symbol {
            return None;
        }
        if let Some(&index) = self.exact.get(&symbol.full_name()) {
            return Some((&self.rules[index], 1));
        }
        let candidates = self.normalized.get(&normalized_key(symbol))?;
        let first = *candidates.first()?;
        Some((&self.rules[first], candidates.len()))
    }

    /// Places `target` in its catalogued scope and reapplies the reference's generic
    /// arguments when the arity allows it.
    fn retarget_type(&self, reference: &TypeRef, target: &TypeRef) -> TypeRef {
        let mut ty = target.clone();
        if let Some(entry) = self.catalog.get(&target.name) {
            ty.scope.clone_from(&entry.scope);
        }
        if ty.generic_arguments.is_empty()
            && !reference.generic_arguments.is_empty()
            && ty.generic_arity() == reference.generic_arguments.len()
        {
            ty.generic_arguments = reference.generic_arguments.clone();
        }
        ty
    }

    /// Returns `None` when the target type is catalogued with overloads of `new_name`
    /// but none of them fits the call.
    fn retarget_method(&self, op: &Op, method: &MethodRef, new_type: &TypeRef, new_name: &str) -> Option<Op> {
        let declaring_type = self.retarget_type(&method.declaring_type, new_type);

        let candidates: Vec<MethodRef> = self
            .catalog
            .methods_named(&new_type.name, new_name)
            .into_iter()
            .map(|(_, m)| m.to_method_ref(declaring_type.clone()))
            .collect();

        let target = if candidates.is_empty() {
            MethodRef {
                declaring_type,
                name: new_name.to_string(),
                ..method.clone()
            }
        } else {
            let original_stack = op.stack_behavior();
            candidates
                .iter()
                .find(|c| c.has_this == method.has_this && join_types(&c.parameters) == join_types(&method.parameters))
                .or_else(|| {
                    candidates
                        .iter()
                        .find(|c| call_op(op, (*c).clone()).stack_behavior() == original_stack)
                })?
                .clone()
        };

        Some(call_op(op, target.with_generic_arguments(method.generic_arguments.clone())))
    }

    fn retarget_field(&self, op: &Op, field: &FieldRef, new_type: &TypeRef, new_name: &str) -> Op {
        let declaring_type = self.retarget_type(&field.declaring_type, new_type);
        let field_type = self
            .catalog
            .find_field(&new_type.name, new_name)
            .map_or_else(|| field.field_type.clone(), |(_, f)| f.field_type.clone());
        field_op(op, FieldRef::new(declaring_type, new_name, field_type))
    }

    fn apply_facade(&self, op: &Op) -> Option<Op> {
        let owner = match op {
            Op::Call(method) | Op::CallVirtual(method) | Op::Construct(method) => &method.declaring_type,
            Op::LoadField(field)
            | Op::StoreField(field)
            | Op::LoadStaticField(field)
            | Op::StoreStaticField(field) => &field.declaring_type,
            Op::TypeToken(..) | Op::LoadConstant(_) | Op::Other(_) => return None,
        };
        let facade = self.facades.get(&owner.name)?;
        let facade_type = self.retarget_type(owner, facade);

        match op {
            Op::Construct(ctor) => {
                if let Some((_, m)) = self.find_facade_method(&facade.name, FACADE_CONSTRUCTOR, &ctor.parameters, true) {
                    return Some(Op::Call(m.to_method_ref(facade_type)));
                }
                self.find_facade_method(&facade.name, CONSTRUCTOR_NAME, &ctor.parameters, false)
                    .map(|(_, m)| Op::Construct(m.to_method_ref(facade_type)))
            }
            Op::Call(method) | Op::CallVirtual(method) => {
                let (_, found) =
                    self.find_facade_method(&facade.name, &method.name, &method.parameters, !method.has_this)?;
                let target = found
                    .to_method_ref(facade_type)
                    .with_generic_arguments(method.generic_arguments.clone());
                Some(call_op(op, target))
            }
            Op::LoadField(field)
            | Op::StoreField(field)
            | Op::LoadStaticField(field)
            | Op::StoreStaticField(field) => {
                let load = matches!(op, Op::LoadField(_) | Op::LoadStaticField(_));
                let is_static = matches!(op, Op::LoadStaticField(_) | Op::StoreStaticField(_));
                if let Some((_, accessor)) = self.catalog.find_accessor(&facade.name, &field.name, load, is_static) {
                    let target = accessor.to_method_ref(facade_type);
                    return Some(if is_static {
                        Op::Call(target)
                    } else {
                        Op::CallVirtual(target)
                    });
                }
                let (_, declared) = self.catalog.find_field(&facade.name, &field.name)?;
                (declared.is_static() == is_static).then(|| field_op(op, declared.to_field_ref(facade_type)))
            }
            Op::TypeToken(..) | Op::LoadConstant(_) | Op::Other(_) => None,
        }
    }

    /// Facade members may be declared with either the old or the already-mapped parameter
    /// types.
    fn find_facade_method(
        &self,
        facade: &str,
        name: &str,
        parameters: &[TypeRef],
        is_static: bool,
    ) -> Option<(&CatalogType, &CatalogMethod)> {
        self.catalog
            .find_method(facade, name, parameters, is_static)
            .or_else(|| {
                let mapped: Vec<TypeRef> = parameters.iter().map(|p| self.map_type(p)).collect();
                self.catalog.find_method(facade, name, &mapped, is_static)
            })
    }

    fn map_op(&self, op: &Op) -> Op {
        if self.types.is_empty() {
            return op.clone();
        }
        op.map_types(&|ty| self.map_type(ty))
    }

    fn is_type_key(&self, ty: &TypeRef) -> bool {
        self.types.contains_key(&ty.full_name()) || self.types.contains_key(&ty.name) || self.facades.contains_key(&ty.name)
    }

    fn validate(&self) -> Result<()> {
        for (old, new) in &self.types {
            if self.is_type_key(new) {
                return Err(config_error!("Type rule {} targets {}, which is itself remapped", old, new));
            }
        }
        for (old, facade) in &self.facades {
            if self.is_type_key(facade) {
                return Err(config_error!("Facade for {} targets {}, which is itself remapped", old, facade));
            }
        }

        let members: HashSet<&str> = self.rules.iter().map(|r| r.key.as_str()).collect();
        for rule in &self.rules {
            let (new_type, retargeted) = match (&rule.action, &rule.old) {
                (MemberAction::Method { new_type, new_name }, SymbolRef::Method(method)) => {
                    if self.catalog.contains(&new_type.name)
                        && self.catalog.methods_named(&new_type.name, new_name).is_empty()
                    {
                        return Err(config_error!(
                            "Rule for {} targets {}::{}, which the catalog does not declare",
                            rule.key,
                            new_type.name,
                            new_name
                        ));
                    }
                    let retargeted = MethodRef {
                        declaring_type: new_type.clone(),
                        name: new_name.clone(),
                        ..method.clone()
                    };
                    (new_type, retargeted.full_name())
                }
                (MemberAction::Field { new_type, new_name }, SymbolRef::Field(field)) => {
                    if self.catalog.contains(&new_type.name)
                        && self.catalog.find_field(&new_type.name, new_name).is_none()
                    {
                        return Err(config_error!(
                            "Rule for {} targets {}::{}, which the catalog does not declare",
                            rule.key,
                            new_type.name,
                            new_name
                        ));
                    }
                    let retargeted = FieldRef::new(new_type.clone(), new_name.clone(), field.field_type.clone());
                    (new_type, retargeted.full_name())
                }
                _ => continue,
            };

            if self.is_type_key(new_type) || members.contains(retargeted.as_str()) {
                return Err(config_error!(
                    "Rule for {} targets {}, which is itself remapped",
                    rule.key,
                    retargeted
                ));
            }
        }
        Ok(())
    }
}

/// The lookup key of a member with all generic arguments of its declaring type and of
/// the method itself removed.
fn normalized_key(symbol: &SymbolRef) -> String {
    match symbol {
        SymbolRef::Method(method) => MethodRef {
            declaring_type: method.declaring_type.open(),
            generic_arguments: Vec::new(),
            ..method.clone()
        }
        .full_name(),
        SymbolRef::Field(field) => FieldRef::new(
            field.declaring_type.open(),
            field.name.clone(),
            field.field_type.clone(),
        )
        .full_name(),
        SymbolRef::Type(ty) => ty.name.clone(),
    }
}

/// The symbol an operation references, if it references one.
fn operand_symbol(op: &Op) -> Option<SymbolRef> {
    match op {
        Op::Call(method) | Op::CallVirtual(method) | Op::Construct(method) => Some(SymbolRef::Method(method.clone())),
        Op::LoadField(field) | Op::StoreField(field) | Op::LoadStaticField(field) | Op::StoreStaticField(field) => {
            Some(SymbolRef::Field(field.clone()))
        }
        Op::TypeToken(_, ty) => Some(SymbolRef::Type(ty.clone())),
        Op::LoadConstant(_) | Op::Other(_) => None,
    }
}

/// Chooses the call opcode for `target`, keeping the original where it is still valid.
fn call_op(original: &Op, target: MethodRef) -> Op {
    match original {
        Op::Construct(_) if target.is_constructor() => Op::Construct(target),
        Op::CallVirtual(_) if target.has_this => Op::CallVirtual(target),
        _ => Op::Call(target),
    }
}

fn field_op(original: &Op, field: FieldRef) -> Op {
    match original {
        Op::LoadField(_) => Op::LoadField(field),
        Op::StoreField(_) => Op::StoreField(field),
        Op::LoadStaticField(_) => Op::LoadStaticField(field),
        Op::StoreStaticField(_) => Op::StoreStaticField(field),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::TypeOp,
        Error,
    };

    fn old_type() -> TypeRef {
        TypeRef::new("Host", "OldType")
    }

    fn foo() -> MethodRef {
        MethodRef::new_static(old_type(), "Foo", TypeRef::void(), vec![])
    }

    fn facade_catalog() -> MemberCatalog {
        let mut catalog = MemberCatalog::new();
        catalog.insert(
            CatalogType::new("Shim", "Shim.OldTypeFacade")
                .method(CatalogMethod::new("Foo", TypeRef::void()).static_())
                .method(
                    CatalogMethod::new(FACADE_CONSTRUCTOR, TypeRef::new("Host", "OldType"))
                        .static_()
                        .param(TypeRef::system("System.String")),
                )
                .property("Name", TypeRef::system("System.String")),
        );
        catalog
    }

    #[test]
    fn test_method_rule_beats_facade_in_any_order() {
        let mut first = SymbolTableBuilder::new();
        first
            .register_method("System.Void OldType::Foo()", TypeRef::new("Host", "NewType"), "Bar")
            .register_facade("OldType", TypeRef::new("Shim", "Shim.OldTypeFacade"));

        let mut second = SymbolTableBuilder::new();
        second
            .register_facade("OldType", TypeRef::new("Shim", "Shim.OldTypeFacade"))
            .register_method("System.Void OldType::Foo()", TypeRef::new("Host", "NewType"), "Bar");

        for builder in [first, second] {
            let table = builder.build(facade_catalog()).unwrap();
            match table.resolve(&Op::Call(foo())) {
                Resolution::Rewrite {
                    op: Op::Call(target),
                    rule,
                    ambiguous,
                } => {
                    assert_eq!(target.declaring_type.name, "NewType");
                    assert_eq!(target.name, "Bar");
                    assert_eq!(rule, RuleKind::Method);
                    assert_eq!(ambiguous, None);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_last_registration_wins_for_same_key() {
        let mut builder = SymbolTableBuilder::new();
        builder
            .register_method("System.Void OldType::Foo()", TypeRef::new("Host", "A"), "First")
            .register_method("System.Void  OldType::Foo( )", TypeRef::new("Host", "B"), "Second");
        let table = builder.build(MemberCatalog::new()).unwrap();
        assert_eq!(table.member_rule_count(), 1);

        let Resolution::Rewrite { op: Op::Call(target), .. } = table.resolve(&Op::Call(foo())) else {
            panic!("expected rewrite");
        };
        assert_eq!(target.name, "Second");
    }

    #[test]
    fn test_facade_constructor_and_accessor() {
        let mut builder = SymbolTableBuilder::new();
        builder.register_facade("OldType", TypeRef::new("Shim", "Shim.OldTypeFacade"));
        let table = builder.build(facade_catalog()).unwrap();

        let ctor = MethodRef::constructor(old_type(), vec![TypeRef::system("System.String")]);
        let Resolution::Rewrite { op, rule, .. } = table.resolve(&Op::Construct(ctor.clone())) else {
            panic!("expected rewrite");
        };
        assert_eq!(rule, RuleKind::Facade);
        assert_eq!(op.stack_behavior(), Op::Construct(ctor).stack_behavior());
        let Op::Call(target) = op else {
            panic!("expected static call");
        };
        assert_eq!(target.name, FACADE_CONSTRUCTOR);
        assert!(!target.has_this);

        let name = FieldRef::new(old_type(), "Name", TypeRef::system("System.String"));
        let Resolution::Rewrite { op, .. } = table.resolve(&Op::StoreField(name.clone())) else {
            panic!("expected rewrite");
        };
        assert_eq!(op.stack_behavior(), Op::StoreField(name).stack_behavior());
        assert!(matches!(op, Op::CallVirtual(ref m) if m.name == "set_Name"));

        // the facade does not declare this member
        let other = MethodRef::new_static(old_type(), "Unknown", TypeRef::void(), vec![]);
        assert_eq!(table.resolve(&Op::Call(other)), Resolution::Unchanged);
    }

    #[test]
    fn test_type_rule_reaches_generic_arguments() {
        let mut builder = SymbolTableBuilder::new();
        builder.register_type("OldType", TypeRef::new("Host", "NewType"));
        let table = builder.build(MemberCatalog::new()).unwrap();

        let list = TypeRef::generic("System.Runtime", "System.Collections.Generic.List`1", vec![old_type()]);
        let Resolution::Rewrite { op, rule, .. } = table.resolve(&Op::TypeToken(TypeOp::CastClass, list)) else {
            panic!("expected rewrite");
        };
        assert_eq!(rule, RuleKind::Type);
        let Op::TypeToken(_, ty) = op else {
            panic!("expected type token");
        };
        assert_eq!(ty.full_name(), "System.Collections.Generic.List`1<NewType>");

        let unrelated = Op::TypeToken(TypeOp::Box, TypeRef::system("System.Int32"));
        assert_eq!(table.resolve(&unrelated), Resolution::Unchanged);
    }

    #[test]
    fn test_open_generic_type_rule_keeps_arguments() {
        let mut builder = SymbolTableBuilder::new();
        builder.register_type("Netcode.NetObjectList`1", TypeRef::new("Netcode", "Netcode.NetList`1"));
        let table = builder.build(MemberCatalog::new()).unwrap();

        let ty = TypeRef::generic("Netcode", "Netcode.NetObjectList`1", vec![TypeRef::new("Host", "Item")]);
        assert_eq!(table.map_type(&ty).full_name(), "Netcode.NetList`1<Item>");
    }

    #[test]
    fn test_normalized_lookup_reports_ambiguity() {
        let mut builder = SymbolTableBuilder::new();
        builder
            .register_method(
                "System.Int32 Lib.Box`1<System.Int32>::Get()",
                TypeRef::new("Lib", "Lib.NewBox`1"),
                "Read",
            )
            .register_method(
                "System.Int32 Lib.Box`1<System.String>::Get()",
                TypeRef::new("Lib", "Lib.OtherBox`1"),
                "Read",
            );
        let table = builder.build(MemberCatalog::new()).unwrap();

        let float_box = TypeRef::generic("Lib", "Lib.Box`1", vec![TypeRef::system("System.Single")]);
        let get = MethodRef::new_instance(float_box, "Get", TypeRef::system("System.Int32"), vec![]);
        let Resolution::Rewrite {
            op: Op::CallVirtual(target),
            ambiguous,
            ..
        } = table.resolve(&Op::CallVirtual(get))
        else {
            panic!("expected rewrite");
        };
        assert_eq!(ambiguous, Some(2));
        assert_eq!(target.declaring_type.full_name(), "Lib.NewBox`1<System.Single>");
    }

    #[test]
    fn test_detection_rule() {
        let mut builder = SymbolTableBuilder::new();
        builder.register_detection("System.Void OldType::Foo()", Severity::Broken, "removed in 1.6");
        let table = builder.build(MemberCatalog::new()).unwrap();
        assert_eq!(
            table.resolve(&Op::Call(foo())),
            Resolution::Detect {
                severity: Severity::Broken,
                message: "removed in 1.6".to_string()
            }
        );
    }

    #[test]
    fn test_build_validation() {
        let mut missing_facade = SymbolTableBuilder::new();
        missing_facade.register_facade("OldType", TypeRef::new("Shim", "Shim.Nowhere"));
        assert!(matches!(
            missing_facade.build(MemberCatalog::new()),
            Err(Error::Configuration { .. })
        ));

        let mut missing_member = SymbolTableBuilder::new();
        missing_member.register_method(
            "System.Void OldType::Foo()",
            TypeRef::new("Shim", "Shim.OldTypeFacade"),
            "Nope",
        );
        assert!(matches!(
            missing_member.build(facade_catalog()),
            Err(Error::Configuration { .. })
        ));

        let mut chained = SymbolTableBuilder::new();
        chained
            .register_type("A", TypeRef::new("Host", "B"))
            .register_type("B", TypeRef::new("Host", "C"));
        assert!(matches!(chained.build(MemberCatalog::new()), Err(Error::Configuration { .. })));

        let mut wrong_kind = SymbolTableBuilder::new();
        wrong_kind.register_field("System.Void OldType::Foo()", TypeRef::new("Host", "B"), "x");
        assert!(matches!(wrong_kind.build(MemberCatalog::new()), Err(Error::Configuration { .. })));

        let mut unparsable = SymbolTableBuilder::new();
        unparsable.register_method("System.Void OldType::Foo(", TypeRef::new("Host", "B"), "x");
        assert!(matches!(unparsable.build(MemberCatalog::new()), Err(Error::Signature(_))));
    }

    #[test]
    fn test_member_rule_keyed_by_mapped_signature() {
        let mut builder = SymbolTableBuilder::new();
        builder
            .register_type(
                "StardewValley.Network.OverlaidDictionary/KeysCollection",
                TypeRef::new("Shim", "OverlaidDictionaryFacade/KeysCollection"),
            )
            .register_method(
                "OverlaidDictionaryFacade/KeysCollection StardewValley.Network.OverlaidDictionary::get_Keys()",
                TypeRef::new("Shim", "OverlaidDictionaryFacade"),
                "get_Keys",
            );
        let table = builder.build(MemberCatalog::new()).unwrap();

        let dictionary = TypeRef::new("Stardew Valley", "StardewValley.Network.OverlaidDictionary");
        let keys = TypeRef::new("Stardew Valley", "StardewValley.Network.OverlaidDictionary/KeysCollection");
        let get_keys = MethodRef::new_instance(dictionary, "get_Keys", keys, vec![]);

        let Resolution::Rewrite {
            op: Op::CallVirtual(target),
            rule,
            ..
        } = table.resolve(&Op::CallVirtual(get_keys))
        else {
            panic!("expected rewrite");
        };
        assert_eq!(rule, RuleKind::Method);
        assert_eq!(target.declaring_type.name, "OverlaidDictionaryFacade");
        assert_eq!(target.return_type.name, "OverlaidDictionaryFacade/KeysCollection");
        assert_eq!(table.resolve(&Op::CallVirtual(target)), Resolution::Unchanged);
    }

    #[test]
    fn test_member_rule_keyed_by_unmapped_signature() {
        let mut builder = SymbolTableBuilder::new();
        builder
            .register_type("Lib.OldResult", TypeRef::new("Lib", "Lib.NewResult"))
            .register_method("Lib.OldResult OldType::Foo()", TypeRef::new("Host", "NewType"), "Bar");
        let table = builder.build(MemberCatalog::new()).unwrap();

        let foo = MethodRef::new_static(old_type(), "Foo", TypeRef::new("Lib", "Lib.OldResult"), vec![]);
        let Resolution::Rewrite { op: Op::Call(target), rule, .. } = table.resolve(&Op::Call(foo)) else {
            panic!("expected rewrite");
        };
        assert_eq!(rule, RuleKind::Method);
        assert_eq!(target.full_name(), "Lib.NewResult NewType::Bar()");
    }

    #[test]
    fn test_no_fitting_overload_is_unresolved() {
        let mut catalog = MemberCatalog::new();
        catalog.insert(
            CatalogType::new("Host", "NewType").method(
                CatalogMethod::new("Bar", TypeRef::void())
                    .static_()
                    .param(TypeRef::system("System.String")),
            ),
        );
        let mut builder = SymbolTableBuilder::new();
        builder.register_method("System.Void OldType::Foo()", TypeRef::new("Host", "NewType"), "Bar");
        let table = builder.build(catalog).unwrap();

        let Resolution::Unresolved { message } = table.resolve(&Op::Call(foo())) else {
            panic!("expected unresolved");
        };
        assert!(message.contains("NewType::Bar"));
    }

    #[test]
    fn test_rewritten_operand_is_fixed_point() {
        let mut builder = SymbolTableBuilder::new();
        builder
            .register_method("System.Void OldType::Foo()", TypeRef::new("Host", "NewType"), "Bar")
            .register_type("OldType", TypeRef::new("Host", "NewType"));
        let table = builder.build(MemberCatalog::new()).unwrap();

        let Resolution::Rewrite { op, .. } = table.resolve(&Op::Call(foo())) else {
            panic!("expected rewrite");
        };
        assert_eq!(table.resolve(&op), Resolution::Unchanged);
    }
}

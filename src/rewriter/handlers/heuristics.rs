//! Handlers that reason about trusted types through the member catalog.
//!
//! Two of them rewrite, two only report:
//!
//! - a field that became a property is redirected to its accessor
//! - a method that gained trailing optional parameters is called with their defaults
//! - a member that does not exist at all is flagged `broken`
//! - a member that exists with a different type is flagged `suspicious`
//!
//! All four only look at references whose declaring type passes
//! [`RewriteContext::is_trusted`]. Anything else (the module's own types, third-party
//! libraries, uncatalogued types) is invisible to them.

use crate::{
    model::{Instruction, MethodRef, Op, TypeRef},
    report::{Finding, FindingKind},
    rewriter::{
        context::{InstructionCursor, RewriteContext},
        handler::{describe, Outcome},
    },
    symbols::{CatalogMethod, MemberCatalog},
    Error, Result,
};

/// Members every type inherits from `System.Object`.
const OBJECT_MEMBERS: &[&str] = &[
    "Equals",
    "Finalize",
    "GetHashCode",
    "GetType",
    "MemberwiseClone",
    "ReferenceEquals",
    "ToString",
];

fn declaring_type(instruction: &Instruction) -> Option<&TypeRef> {
    instruction
        .method_ref()
        .map(|m| &m.declaring_type)
        .or_else(|| instruction.field_ref().map(|f| &f.declaring_type))
}

pub(crate) fn matches_member(ctx: &RewriteContext<'_>, instruction: &Instruction) -> bool {
    declaring_type(instruction).is_some_and(|ty| ctx.is_trusted(ty))
}

pub(crate) fn matches_field(ctx: &RewriteContext<'_>, instruction: &Instruction) -> bool {
    instruction
        .field_ref()
        .is_some_and(|f| ctx.is_trusted(&f.declaring_type))
}

pub(crate) fn matches_method(ctx: &RewriteContext<'_>, instruction: &Instruction) -> bool {
    instruction
        .method_ref()
        .is_some_and(|m| ctx.is_trusted(&m.declaring_type))
}

/// True if every base type of `type_name` is catalogued, so absence of a member is
/// meaningful.
fn hierarchy_is_complete(catalog: &MemberCatalog, type_name: &str) -> bool {
    catalog
        .hierarchy(type_name)
        .last()
        .is_some_and(|ty| ty.base.as_deref().map_or(true, |base| catalog.contains(base)))
}

fn with_method(op: &Op, method: MethodRef) -> Op {
    match op {
        Op::Construct(_) => Op::Construct(method),
        Op::CallVirtual(_) => Op::CallVirtual(method),
        _ => Op::Call(method),
    }
}

fn same_types(declared: &TypeRef, used: &TypeRef) -> bool {
    declared.full_name() == used.full_name()
}

/// Rewrites an access to a field that now only exists as a property.
pub(crate) fn rewrite_field(
    ctx: &RewriteContext<'_>,
    cursor: &mut InstructionCursor<'_>,
) -> Result<Outcome> {
    let current = cursor.current().clone();
    let Some(field) = current.field_ref() else {
        return Ok(Outcome::NoMatch);
    };

    let catalog = ctx.catalog();
    let type_name = &field.declaring_type.name;
    if catalog.find_field(type_name, &field.name).is_some() {
        return Ok(Outcome::NoMatch);
    }

    let is_static = current.is_static_field_access();
    let Some((_, accessor)) =
        catalog.find_accessor(type_name, &field.name, current.is_field_load(), is_static)
    else {
        return Ok(Outcome::NoMatch);
    };

    let target = accessor.to_method_ref(field.declaring_type.clone());
    let replacement = current.with_op(if is_static {
        Op::Call(target)
    } else {
        Op::CallVirtual(target)
    });
    let message = format!(
        "{} -> {} (field is now a property)",
        describe(&current),
        describe(&replacement)
    );
    cursor.replace(replacement)?;
    Ok(Outcome::Rewritten {
        message,
        finding: None,
    })
}

/// Finds the overload that extends `method`'s parameter list with optional parameters
/// only, preferring the shortest.
fn optional_overload<'c>(catalog: &'c MemberCatalog, method: &MethodRef) -> Option<&'c CatalogMethod> {
    let candidates = catalog.methods_named(&method.declaring_type.name, &method.name);
    if candidates
        .iter()
        .any(|(_, m)| m.parameters_match(&method.parameters))
    {
        return None;
    }

    let used = method.parameters.len();
    candidates
        .into_iter()
        .map(|(_, m)| m)
        .filter(|m| m.is_constructor() == method.is_constructor())
        .filter(|m| m.is_constructor() || m.is_static() != method.has_this)
        .filter(|m| same_types(&m.return_type, &method.return_type))
        .filter(|m| m.parameters.len() > used)
        .filter(|m| {
            m.parameters
                .iter()
                .zip(&method.parameters)
                .all(|(declared, given)| same_types(&declared.ty, given))
        })
        .filter(|m| m.parameters[used..].iter().all(|p| p.default.is_some()))
        .min_by_key(|m| m.parameters.len())
}

/// Rewrites a call to an overload that was replaced by one with optional parameters.
pub(crate) fn rewrite_method(
    ctx: &RewriteContext<'_>,
    cursor: &mut InstructionCursor<'_>,
) -> Result<Outcome> {
    let current = cursor.current().clone();
    let Some(method) = current.method_ref() else {
        return Ok(Outcome::NoMatch);
    };
    let Some(overload) = optional_overload(ctx.catalog(), method) else {
        return Ok(Outcome::NoMatch);
    };

    let mut replacement: Vec<Instruction> = overload.parameters[method.parameters.len()..]
        .iter()
        .filter_map(|p| p.default.clone())
        .map(|value| Instruction::constant(current.offset, value))
        .collect();
    let primary = replacement.len();

    let target = overload
        .to_method_ref(method.declaring_type.clone())
        .with_generic_arguments(method.generic_arguments.clone());
    let call = current.with_op(with_method(&current.op, target));
    let message = format!(
        "{} -> {} ({} default argument(s) supplied)",
        describe(&current),
        describe(&call),
        primary
    );
    replacement.push(call);

    cursor.replace_current(replacement, primary)?;
    Ok(Outcome::Rewritten {
        message,
        finding: None,
    })
}

/// Flags references to trusted members that do not exist.
pub(crate) fn find_missing(ctx: &RewriteContext<'_>, instruction: &Instruction) -> Outcome {
    let catalog = ctx.catalog();

    let missing = if let Some(field) = instruction.field_ref() {
        catalog
            .find_field(&field.declaring_type.name, &field.name)
            .is_none()
            .then(|| format!("{} (no such field)", field.display_name()))
    } else if let Some(method) = instruction.method_ref() {
        let inherited = !method.is_constructor() && OBJECT_MEMBERS.contains(&method.name.as_str());
        let found = catalog
            .methods_named(&method.declaring_type.name, &method.name)
            .iter()
            .any(|(_, m)| m.parameters_match(&method.parameters));
        (!inherited && !found).then(|| format!("{} (no such method)", method.display_name()))
    } else {
        None
    };

    match (missing, declaring_type(instruction)) {
        (Some(message), Some(ty)) if hierarchy_is_complete(catalog, &ty.name) => {
            Outcome::Detected(Finding::broken(
                FindingKind::BrokenReference,
                Error::UnresolvedSymbol(message).to_string(),
            ))
        }
        _ => Outcome::NoMatch,
    }
}

/// Flags references to trusted members whose declared type differs from the one the
/// instruction was compiled against.
pub(crate) fn find_unexpected_type(ctx: &RewriteContext<'_>, instruction: &Instruction) -> Outcome {
    let catalog = ctx.catalog();

    if let Some(field) = instruction.field_ref() {
        if let Some((_, declared)) = catalog.find_field(&field.declaring_type.name, &field.name) {
            if !same_types(&declared.field_type, &field.field_type) {
                return Outcome::Detected(Finding::suspicious(
                    FindingKind::UnexpectedType,
                    format!(
                        "{} is now {}, was compiled against {}",
                        field.display_name(),
                        declared.field_type.full_name(),
                        field.field_type.full_name()
                    ),
                ));
            }
        }
        return Outcome::NoMatch;
    }

    if let Some(method) = instruction.method_ref() {
        let overloads: Vec<&CatalogMethod> = catalog
            .methods_named(&method.declaring_type.name, &method.name)
            .into_iter()
            .map(|(_, m)| m)
            .filter(|m| m.parameters_match(&method.parameters))
            .collect();

        if let Some(declared) = overloads.first() {
            if !overloads
                .iter()
                .any(|m| same_types(&m.return_type, &method.return_type))
            {
                return Outcome::Detected(Finding::suspicious(
                    FindingKind::UnexpectedType,
                    format!(
                        "{} now returns {}, was compiled against {}",
                        method.display_name(),
                        declared.return_type.full_name(),
                        method.return_type.full_name()
                    ),
                ));
            }
        }
    }
    Outcome::NoMatch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{Constant, FieldRef, Method, Module, Version},
        test::{farmer, farmer_catalog, ContextFixture, HOST},
    };

    fn int32() -> TypeRef {
        TypeRef::system("System.Int32")
    }

    fn check<T>(module_name: &str, f: impl FnOnce(&RewriteContext<'_>) -> T) -> T {
        let fixture = ContextFixture::new()
            .with_catalog(farmer_catalog())
            .trust(HOST)
            .for_module(&Module::new(module_name, Version::new(1, 0)));
        f(&fixture.context())
    }

    #[test]
    fn test_field_to_property() {
        check("Mod", |ctx| {
            let load = Instruction::ldfld(4, FieldRef::new(farmer(), "money", int32()));
            let mut method = Method::new("M", vec![Instruction::other(0, "ldarg.0", 0, 1), load]);
            assert!(matches_field(ctx, &method.instructions()[1]));

            let mut cursor = InstructionCursor::new(&mut method, 1);
            let outcome = rewrite_field(ctx, &mut cursor).unwrap();
            assert!(matches!(outcome, Outcome::Rewritten { .. }));
            let call = method.instructions()[1].method_ref().unwrap();
            assert_eq!(call.name, "get_money");
            assert!(call.has_this);
            assert_eq!(method.instructions()[1].mnemonic(), "callvirt");
        });
    }

    #[test]
    fn test_optional_parameter_padding() {
        check("Mod", |ctx| {
            let old = MethodRef::new_instance(
                farmer(),
                "addItem",
                TypeRef::system("System.Boolean"),
                vec![TypeRef::new(HOST, "StardewValley.Item")],
            );
            let mut method = Method::new("M", vec![Instruction::callvirt(8, old)]);
            let mut cursor = InstructionCursor::new(&mut method, 0);
            rewrite_method(ctx, &mut cursor).unwrap();

            assert_eq!(cursor.index(), 1);
            assert_eq!(method.len(), 2);
            assert_eq!(method.instructions()[0].constant_value(), Some(&Constant::I4(0)));
            assert_eq!(method.instructions()[1].method_ref().unwrap().parameters.len(), 2);
            assert_eq!(method.instructions()[0].offset, 8);
        });
    }

    #[test]
    fn test_missing_and_mismatched() {
        check("Mod", |ctx| {
            let missing = Instruction::call(
                0,
                MethodRef::new_instance(farmer(), "Missing", TypeRef::void(), vec![]),
            );
            match find_missing(ctx, &missing) {
                Outcome::Detected(finding) => {
                    assert_eq!(finding.kind, FindingKind::BrokenReference);
                    assert!(finding.message.contains("StardewValley.Farmer.Missing()"));
                }
                other => panic!("unexpected {other:?}"),
            }

            let present = Instruction::ldfld(0, FieldRef::new(farmer(), "Name", TypeRef::system("System.String")));
            assert_eq!(find_missing(ctx, &present), Outcome::NoMatch);
            assert_eq!(find_unexpected_type(ctx, &present), Outcome::NoMatch);

            let retyped = Instruction::ldfld(0, FieldRef::new(farmer(), "stamina", int32()));
            assert!(matches!(
                find_unexpected_type(ctx, &retyped),
                Outcome::Detected(Finding { kind: FindingKind::UnexpectedType, .. })
            ));

            let to_string = Instruction::callvirt(
                0,
                MethodRef::new_instance(farmer(), "ToString", TypeRef::system("System.String"), vec![]),
            );
            assert_eq!(find_missing(ctx, &to_string), Outcome::NoMatch);
        });
    }

    #[test]
    fn test_untrusted_scope_is_invisible() {
        check("Stardew Valley", |ctx| {
            let own = Instruction::call(
                0,
                MethodRef::new_instance(farmer(), "Missing", TypeRef::void(), vec![]),
            );
            assert!(!matches_member(ctx, &own));
        });
        check("Mod", |ctx| {
            let other = Instruction::call(
                0,
                MethodRef::new_static(TypeRef::new("SpaceCore", "SpaceCore.Api"), "Missing", TypeRef::void(), vec![]),
            );
            assert!(!matches_member(ctx, &other));
        });
    }
}

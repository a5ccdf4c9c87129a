//! Read-only per-module context and the mutable per-instruction cursor.

use std::collections::BTreeSet;

use crate::{
    model::{AssemblyReference, Instruction, Method, Module, Platform, TypeRef},
    symbols::{MemberCatalog, RuleSet, SymbolTable},
    Error, Result,
};

/// The parts of a module handlers may inspect while its method bodies are being edited.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleInfo {
    /// Module name
    pub name: String,
    /// Pointer width the module was compiled for
    pub platform: Platform,
    /// Assembly references, as loaded
    pub references: Vec<AssemblyReference>,
}

impl ModuleInfo {
    /// Snapshots the metadata of `module`.
    #[must_use]
    pub fn of(module: &Module) -> Self {
        ModuleInfo {
            name: module.name().to_string(),
            platform: module.platform(),
            references: module.references().to_vec(),
        }
    }

    /// Returns the reference to the named assembly.
    #[must_use]
    pub fn reference(&self, name: &str) -> Option<&AssemblyReference> {
        self.references.iter().find(|r| r.name == name)
    }
}

/// Shared state passed to every handler while one module is processed.
///
/// Everything reachable from here is immutable; handlers communicate only through the
/// instruction stream.
#[derive(Debug)]
pub struct RewriteContext<'a> {
    /// Resolved symbol rules
    pub table: &'a SymbolTable,
    /// The rule set the table was built from
    pub rules: &'a RuleSet,
    /// Assemblies the heuristic detectors may reason about
    pub trusted: &'a BTreeSet<String>,
    /// Pointer width of the host process
    pub host_platform: Platform,
    /// The module being processed
    pub module: ModuleInfo,
}

impl RewriteContext<'_> {
    /// Returns the member catalog of the trusted assemblies.
    #[must_use]
    pub fn catalog(&self) -> &MemberCatalog {
        self.table.catalog()
    }

    /// Returns true if the heuristic detectors may reason about members of `ty`.
    ///
    /// The type must come from a trusted assembly other than the module itself, and its
    /// member list must be catalogued.
    #[must_use]
    pub fn is_trusted(&self, ty: &TypeRef) -> bool {
        !ty.scope.is_empty()
            && ty.scope != self.module.name
            && self.trusted.contains(&ty.scope)
            && self.catalog().contains(&ty.name)
    }
}

/// A position in one method body, handed to a handler for one instruction.
///
/// The cursor owns the bookkeeping of window replacements: after a handler grows or
/// shrinks the body, [`InstructionCursor::index`] points at the instruction that took the
/// original's place and [`InstructionCursor::next`] past everything that replaced it.
#[derive(Debug)]
pub struct InstructionCursor<'m> {
    method: &'m mut Method,
    index: usize,
    next: usize,
}

impl<'m> InstructionCursor<'m> {
    /// Places a cursor on `index`, which owns the single slot `index..index + 1`.
    pub fn new(method: &'m mut Method, index: usize) -> Self {
        InstructionCursor {
            method,
            index,
            next: index + 1,
        }
    }

    /// Places a cursor on `index` owning the slots up to `next`.
    pub(crate) fn resume(method: &'m mut Method, index: usize, next: usize) -> Self {
        InstructionCursor { method, index, next }
    }

    /// Full name of the method.
    #[must_use]
    pub fn method_name(&self) -> &str {
        self.method.name()
    }

    /// Index of the current instruction.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Index of the first instruction not produced from the current one.
    #[must_use]
    pub fn next(&self) -> usize {
        self.next
    }

    /// Returns true if the cursor points at an existing instruction.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.index < self.method.len()
    }

    /// The current instruction.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is not valid; the pipeline never hands out invalid cursors.
    #[must_use]
    pub fn current(&self) -> &Instruction {
        &self.method.instructions()[self.index]
    }

    /// The instruction immediately before the current one.
    #[must_use]
    pub fn previous(&self) -> Option<&Instruction> {
        self.index.checked_sub(1).and_then(|i| self.method.get(i))
    }

    /// Replaces the current instruction with one of identical stack effect.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error::StackImbalance`]; the body is unchanged on error.
    pub fn replace(&mut self, instruction: Instruction) -> Result<()> {
        self.method.replace(self.index, instruction)
    }

    /// Replaces the current instruction with a sequence of identical net stack effect.
    ///
    /// `primary` is the position within `replacement` of the instruction that takes over
    /// the role of the current one; later handlers see that instruction.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error::StackImbalance`]; the body is unchanged on error. An
    /// empty `replacement` is refused with [`crate::Error::WindowOutOfBounds`], as the
    /// current instruction must keep a slot for the handlers after this one.
    pub fn replace_current(&mut self, replacement: Vec<Instruction>, primary: usize) -> Result<()> {
        let len = replacement.len();
        if len == 0 {
            return Err(Error::WindowOutOfBounds {
                method: self.method.name().to_string(),
                start: self.index,
                end: self.index,
                len: self.method.len(),
            });
        }
        self.method
            .replace_range(self.index..self.index + 1, replacement)?;
        self.next = self.next + len - 1;
        self.index += primary.min(len - 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MethodRef, TypeRef};

    fn method() -> Method {
        let to_int = MethodRef::new_instance(
            TypeRef::system("System.IntPtr"),
            "ToInt32",
            TypeRef::system("System.Int32"),
            vec![],
        );
        Method::new(
            "System.Int32 Mod.Entry::Size(System.IntPtr)",
            vec![
                Instruction::other(0, "ldarg.0", 0, 1),
                Instruction::call(1, to_int),
                Instruction::ret(6, true),
            ],
        )
    }

    #[test]
    fn test_replace_current_moves_to_primary() {
        let mut method = method();
        let to_long = MethodRef::new_instance(
            TypeRef::system("System.IntPtr"),
            "ToInt64",
            TypeRef::system("System.Int64"),
            vec![],
        );

        let mut cursor = InstructionCursor::new(&mut method, 1);
        assert_eq!(cursor.previous().map(Instruction::mnemonic), Some("ldarg.0"));
        cursor
            .replace_current(
                vec![Instruction::call(1, to_long), Instruction::other(1, "conv.ovf.i4", 1, 1)],
                0,
            )
            .unwrap();

        assert_eq!(cursor.index(), 1);
        assert_eq!(cursor.next(), 3);
        assert_eq!(cursor.current().method_ref().unwrap().name, "ToInt64");
        assert_eq!(method.len(), 4);
    }

    #[test]
    fn test_failed_replace_keeps_cursor() {
        let mut method = method();
        let mut cursor = InstructionCursor::new(&mut method, 1);
        assert!(cursor.replace(Instruction::ldnull(1)).is_err());
        assert!(cursor
            .replace_current(vec![Instruction::ldnull(1), Instruction::ldnull(1)], 1)
            .is_err());
        assert_eq!(cursor.index(), 1);
        assert_eq!(cursor.next(), 2);
        assert_eq!(method.len(), 3);
    }

    #[test]
    fn test_empty_replacement_is_refused() {
        let mut method = Method::new(
            "System.Void Mod.Entry::Run()",
            vec![Instruction::other(0, "nop", 0, 0), Instruction::ret(1, false)],
        );
        let mut cursor = InstructionCursor::new(&mut method, 0);
        assert!(matches!(
            cursor.replace_current(vec![], 0),
            Err(Error::WindowOutOfBounds { start: 0, end: 0, .. })
        ));
        assert_eq!(cursor.index(), 0);
        assert_eq!(cursor.next(), 1);
        assert_eq!(method.len(), 2);
    }

    #[test]
    fn test_module_info_reference() {
        let module = Module::new("Mod", crate::model::Version::new(1, 0)).with_reference(
            AssemblyReference::new("0Harmony", crate::model::Version::new(1, 2)),
        );
        let info = ModuleInfo::of(&module);
        assert_eq!(info.reference("0Harmony").unwrap().version.major, 1);
        assert!(info.reference("Netcode").is_none());
    }
}

use std::collections::BTreeSet;

use crate::{
    model::{Constant, Module, Platform, TypeRef, Version},
    rewriter::{ModuleInfo, RewriteContext},
    symbols::{CatalogMethod, CatalogType, MemberCatalog, RuleSet, SymbolTable, SymbolTableBuilder},
};

pub const HOST: &str = "Stardew Valley";

pub fn host_type(name: &str) -> TypeRef {
    TypeRef::new(HOST, name)
}

pub fn farmer() -> TypeRef {
    host_type("StardewValley.Farmer")
}

/// A small slice of the host's public surface, enough for the heuristic handlers.
pub fn farmer_catalog() -> MemberCatalog {
    let mut catalog = MemberCatalog::new();
    catalog.insert(
        CatalogType::new(HOST, "StardewValley.Farmer")
            .field("Name", TypeRef::system("System.String"))
            .field("stamina", TypeRef::system("System.Single"))
            .property("money", TypeRef::system("System.Int32"))
            .method(
                CatalogMethod::new("addItem", TypeRef::system("System.Boolean"))
                    .param(host_type("StardewValley.Item"))
                    .optional(TypeRef::system("System.Boolean"), Constant::I4(0)),
            ),
    );
    catalog
}

/// Owns everything a [`RewriteContext`] borrows.
#[derive(Debug)]
pub struct ContextFixture {
    table: SymbolTable,
    rules: RuleSet,
    trusted: BTreeSet<String>,
    module: ModuleInfo,
}

impl Default for ContextFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextFixture {
    /// Empty rules, nothing trusted, an `AnyCpu` module named `Mod`.
    pub fn new() -> Self {
        ContextFixture {
            table: SymbolTableBuilder::new().build(MemberCatalog::new()).unwrap(),
            rules: RuleSet::default(),
            trusted: BTreeSet::new(),
            module: ModuleInfo::of(&Module::new("Mod", Version::new(1, 0))),
        }
    }

    pub fn with_table(mut self, table: SymbolTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_catalog(self, catalog: MemberCatalog) -> Self {
        self.with_table(SymbolTableBuilder::new().build(catalog).unwrap())
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn trust(mut self, assembly: &str) -> Self {
        self.trusted.insert(assembly.to_string());
        self
    }

    pub fn for_module(mut self, module: &Module) -> Self {
        self.module = ModuleInfo::of(module);
        self
    }

    pub fn context(&self) -> RewriteContext<'_> {
        RewriteContext {
            table: &self.table,
            rules: &self.rules,
            trusted: &self.trusted,
            host_platform: Platform::X64,
            module: self.module.clone(),
        }
    }
}

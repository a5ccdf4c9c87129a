//! Versioned declarative rule sets.
//!
//! A [`RuleSet`] is everything the engine needs to know about one host release: the
//! symbol rules, the member catalog, the trusted assemblies and the data consumed by the
//! finders and the structural rewriters. Rule sets are plain data; supporting a new host
//! release means loading a different document, not changing code.
//!
//! # XML Format
//!
//! ```xml
//! <rules host="1.6.0">
//!   <trusted assembly="Stardew Valley"/>
//!   <type old="StardewValley.ModHooks" new="StardewValley.Mods.ModHooks" scope="Stardew Valley"/>
//!   <field old="Netcode.NetCollection`1&lt;StardewValley.Objects.Furniture&gt; StardewValley.Locations.DecoratableLocation::furniture"
//!          type="StardewValley.GameLocation" scope="Stardew Valley" name="furniture"/>
//!   <method old="System.Void OldType::Foo()" type="NewType" scope="Host" name="Bar"/>
//!   <facade type="StardewValley.Farmer" facade="Shim.FarmerFacade" scope="Shim"/>
//!   <detect old="System.Void OldType::Gone()" severity="broken" message="removed"/>
//!   <find kind="console-access" types="System.Console"/>
//!   <find kind="save-serializer" type="StardewValley.SaveGame" fields="serializer,farmerSerializer"/>
//!   <platform old="System.Int32 System.IntPtr::ToInt32()" new="System.Int64 System.IntPtr::ToInt64()" after="conv.ovf.i4"/>
//!   <content loader="StardewValley.LocalizedContentManager" method="Load"/>
//!   <asset name="Data/Fish" type="System.Collections.Generic.Dictionary`2&lt;System.String,System.String&gt;"/>
//!   <catalog>
//!     <class name="StardewValley.Game1" scope="Stardew Valley" base="Microsoft.Xna.Framework.Game">
//!       <field name="player" type="StardewValley.Farmer" static="true"/>
//!       <property name="IsMultiplayer" type="System.Boolean" static="true"/>
//!       <method name="drawDialogue" returns="System.Void" params="StardewValley.NPC,System.String" static="true"/>
//!       <method name="warpFarmer" returns="System.Void" static="true">
//!         <param type="System.String"/>
//!         <param type="System.Boolean" default="false"/>
//!       </method>
//!     </class>
//!   </catalog>
//! </rules>
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};

use crate::{
    model::{Constant, TypeRef, Version},
    report::{FindingKind, Severity},
    symbols::{
        catalog::{CatalogMethod, CatalogType, MemberCatalog},
        signature::{canonicalize, parse_type, parse_type_list},
        table::SymbolTableBuilder,
    },
    Result,
};

/// What a finder rule matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinderTarget {
    /// Any reference mentioning one of these types
    Types(Vec<String>),
    /// Accesses to the named fields of a type
    Fields {
        /// Declaring type full name
        type_name: String,
        /// Field names
        fields: Vec<String>,
    },
    /// Subscriptions to the named events of a type (`add_`/`remove_` calls)
    Events {
        /// Declaring type full name
        type_name: String,
        /// Event names
        events: Vec<String>,
    },
}

/// A detect-only rule consumed by the type, field and event finders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinderRule {
    /// What to look for
    pub target: FinderTarget,
    /// Category of the resulting finding
    pub kind: FindingKind,
    /// Severity of the resulting finding
    pub severity: Severity,
    /// Only active in paranoid mode
    pub paranoid: bool,
}

impl FinderRule {
    /// Matches references to any of `types`.
    pub fn types<S: Into<String>>(kind: FindingKind, types: impl IntoIterator<Item = S>) -> Self {
        FinderRule {
            target: FinderTarget::Types(types.into_iter().map(Into::into).collect()),
            kind,
            severity: Severity::Suspicious,
            paranoid: false,
        }
    }

    /// Matches accesses to the named fields of `type_name`.
    pub fn fields<S: Into<String>>(
        kind: FindingKind,
        type_name: impl Into<String>,
        fields: impl IntoIterator<Item = S>,
    ) -> Self {
        FinderRule {
            target: FinderTarget::Fields {
                type_name: type_name.into(),
                fields: fields.into_iter().map(Into::into).collect(),
            },
            kind,
            severity: Severity::Suspicious,
            paranoid: false,
        }
    }

    /// Matches subscriptions to the named events of `type_name`.
    pub fn events<S: Into<String>>(
        kind: FindingKind,
        type_name: impl Into<String>,
        events: impl IntoIterator<Item = S>,
    ) -> Self {
        FinderRule {
            target: FinderTarget::Events {
                type_name: type_name.into(),
                events: events.into_iter().map(Into::into).collect(),
            },
            kind,
            severity: Severity::Suspicious,
            paranoid: false,
        }
    }

    /// Sets the reported severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Restricts the rule to paranoid mode.
    #[must_use]
    pub fn paranoid(mut self) -> Self {
        self.paranoid = true;
        self
    }

    /// The finders every host release ships with.
    #[must_use]
    pub fn standard() -> Vec<FinderRule> {
        vec![
            FinderRule::fields(
                FindingKind::SaveSerializer,
                "StardewValley.SaveGame",
                ["serializer", "farmerSerializer", "locationSerializer"],
            ),
            FinderRule::events(
                FindingKind::UnvalidatedUpdateTick,
                "StardewModdingAPI.Events.ISpecializedEvents",
                ["UnvalidatedUpdateTicked", "UnvalidatedUpdateTicking"],
            ),
            FinderRule::types(FindingKind::ConsoleAccess, ["System.Console"]),
            FinderRule::types(
                FindingKind::FilesystemAccess,
                [
                    "System.IO.File",
                    "System.IO.FileStream",
                    "System.IO.FileInfo",
                    "System.IO.Directory",
                    "System.IO.DirectoryInfo",
                    "System.IO.DriveInfo",
                    "System.IO.FileSystemWatcher",
                ],
            )
            .paranoid(),
            FinderRule::types(FindingKind::ShellAccess, ["System.Diagnostics.Process"]).paranoid(),
        ]
    }
}

/// A pointer-width dependent call and its replacement for a host of different width.
///
/// The replacement is `before` conversions, the call to `new`, then `after` conversions.
/// Conversions pop and push one slot, so the rewrite keeps the window balanced as long as
/// `old` and `new` have the same stack shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformRule {
    /// Canonical signature of the width-dependent method
    pub old: String,
    /// Canonical signature of the replacement method
    pub new: String,
    /// Conversion mnemonics inserted before the call
    pub before: Vec<String>,
    /// Conversion mnemonics inserted after the call
    pub after: Vec<String>,
}

impl PlatformRule {
    /// Creates a rule with no conversions.
    pub fn new(old: impl Into<String>, new: impl Into<String>) -> Self {
        PlatformRule {
            old: old.into(),
            new: new.into(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Adds a conversion before the call.
    #[must_use]
    pub fn before(mut self, mnemonic: impl Into<String>) -> Self {
        self.before.push(mnemonic.into());
        self
    }

    /// Adds a conversion after the call.
    #[must_use]
    pub fn after(mut self, mnemonic: impl Into<String>) -> Self {
        self.after.push(mnemonic.into());
        self
    }

    /// Rewrites of 32-bit pointer conversions for a 64-bit host.
    #[must_use]
    pub fn standard() -> Vec<PlatformRule> {
        vec![
            PlatformRule::new(
                "System.Int32 System.IntPtr::ToInt32()",
                "System.Int64 System.IntPtr::ToInt64()",
            )
            .after("conv.ovf.i4"),
            PlatformRule::new(
                "System.Int32 System.IntPtr::op_Explicit(System.IntPtr)",
                "System.Int64 System.IntPtr::op_Explicit(System.IntPtr)",
            )
            .after("conv.ovf.i4"),
            PlatformRule::new(
                "System.IntPtr System.IntPtr::op_Explicit(System.Int32)",
                "System.IntPtr System.IntPtr::op_Explicit(System.Int64)",
            )
            .before("conv.i8"),
            PlatformRule::new(
                "System.UInt32 System.UIntPtr::ToUInt32()",
                "System.UInt64 System.UIntPtr::ToUInt64()",
            )
            .after("conv.ovf.u4"),
            PlatformRule::new(
                "System.UInt32 System.UIntPtr::op_Explicit(System.UIntPtr)",
                "System.UInt64 System.UIntPtr::op_Explicit(System.UIntPtr)",
            )
            .after("conv.ovf.u4"),
            PlatformRule::new(
                "System.UIntPtr System.UIntPtr::op_Explicit(System.UInt32)",
                "System.UIntPtr System.UIntPtr::op_Explicit(System.UInt64)",
            )
            .before("conv.u8"),
        ]
    }
}

/// The asset-to-type map consumed by the content-load detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRules {
    /// Full names of the content manager types whose loads are checked
    pub loaders: Vec<String>,
    /// Name of the generic load method
    pub method: String,
    types: BTreeMap<String, String>,
}

impl Default for AssetRules {
    fn default() -> Self {
        AssetRules {
            loaders: vec![
                "StardewValley.LocalizedContentManager".to_string(),
                "StardewModdingAPI.Framework.ContentManagers.IContentManager".to_string(),
            ],
            method: "Load".to_string(),
            types: BTreeMap::new(),
        }
    }
}

impl AssetRules {
    /// Declares the type an asset must be loaded as.
    pub fn insert(&mut self, asset: &str, type_name: impl Into<String>) {
        self.types.insert(Self::normalize(asset), type_name.into());
    }

    /// Returns the type declared for an asset, if any.
    #[must_use]
    pub fn expected_type(&self, asset: &str) -> Option<&str> {
        self.types.get(&Self::normalize(asset)).map(String::as_str)
    }

    /// Returns the number of declared assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if no assets are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Asset names compare case-insensitively with either path separator.
    fn normalize(asset: &str) -> String {
        asset.trim().replace('\\', "/").to_ascii_lowercase()
    }
}

/// Describes the runtime patching library and its breaking major-version change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchLibraryRules {
    /// Assembly name of the library
    pub assembly: String,
    /// Major version whose call sites need rewriting
    pub legacy_major: u16,
    /// Version the assembly reference is bumped to after rewriting
    pub current_version: Version,
    /// Namespace of the legacy API
    pub legacy_namespace: String,
    /// Namespace of the current API
    pub current_namespace: String,
    /// Legacy type names (without namespace) renamed in the current API
    pub renamed_types: Vec<(String, String)>,
    /// Canonical signature of the legacy factory, replaced by a constructor call
    pub factory: String,
    /// Name of the patch entry point
    pub patch_method: String,
    /// Number of parameters of the legacy patch overload
    pub legacy_patch_arity: usize,
    /// Return type of the current patch overload
    pub patch_return: String,
}

impl PatchLibraryRules {
    /// Harmony 1.x to 2.x.
    #[must_use]
    pub fn harmony() -> Self {
        PatchLibraryRules {
            assembly: "0Harmony".to_string(),
            legacy_major: 1,
            current_version: Version::new(2, 0),
            legacy_namespace: "Harmony".to_string(),
            current_namespace: "HarmonyLib".to_string(),
            renamed_types: vec![("HarmonyInstance".to_string(), "Harmony".to_string())],
            factory: "Harmony.HarmonyInstance Harmony.HarmonyInstance::Create(System.String)".to_string(),
            patch_method: "Patch".to_string(),
            legacy_patch_arity: 4,
            patch_return: "System.Reflection.MethodInfo".to_string(),
        }
    }
}

impl Default for PatchLibraryRules {
    fn default() -> Self {
        PatchLibraryRules::harmony()
    }
}

/// The complete declarative input for one host release.
///
/// # Examples
///
/// ```rust
/// use cilshim::symbols::RuleSet;
///
/// let rules = RuleSet::from_xml(r#"
///     <rules host="1.6.0">
///       <trusted assembly="Stardew Valley"/>
///       <method old="System.Void OldType::Foo()" type="NewType" scope="Host" name="Bar"/>
///     </rules>
/// "#).unwrap();
///
/// assert_eq!(rules.host_version, "1.6.0");
/// assert!(rules.trusted_assemblies.contains("Stardew Valley"));
/// assert_eq!(rules.symbols.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct RuleSet {
    /// Host release the rules were written for
    pub host_version: String,
    /// Assemblies the heuristic detectors may assume are always present
    pub trusted_assemblies: BTreeSet<String>,
    /// Symbol rules, in registration order
    pub symbols: SymbolTableBuilder,
    /// Public members of the trusted assemblies
    pub catalog: MemberCatalog,
    /// Detect-only finder rules
    pub finders: Vec<FinderRule>,
    /// Pointer-width rewrites
    pub platform: Vec<PlatformRule>,
    /// Asset type expectations
    pub assets: AssetRules,
    /// Patch library migration
    pub patch_library: PatchLibraryRules,
}

impl Default for RuleSet {
    fn default() -> Self {
        RuleSet::new("")
    }
}

impl RuleSet {
    /// Creates a rule set with the standard finders, platform rewrites and patch library
    /// migration, and no symbol rules.
    pub fn new(host_version: impl Into<String>) -> Self {
        RuleSet {
            host_version: host_version.into(),
            trusted_assemblies: BTreeSet::new(),
            symbols: SymbolTableBuilder::new(),
            catalog: MemberCatalog::new(),
            finders: FinderRule::standard(),
            platform: PlatformRule::standard(),
            assets: AssetRules::default(),
            patch_library: PatchLibraryRules::harmony(),
        }
    }

    /// Loads a rule set from an XML document, on top of [`RuleSet::new`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Xml`] for malformed XML, [`crate::Error::Signature`] for
    /// unparsable type names and [`crate::Error::Configuration`] for unknown elements,
    /// missing attributes or invalid values.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut loader = Loader {
            rules: RuleSet::new(""),
            class: None,
            method: None,
            in_catalog: false,
            seen_root: false,
        };

        loop {
            match reader.read_event()? {
                Event::Start(e) => loader.element(&e, false)?,
                Event::Empty(e) => loader.element(&e, true)?,
                Event::End(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    loader.end(&name);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !loader.seen_root {
            return Err(config_error!("Rule document has no <rules> element"));
        }
        Ok(loader.rules)
    }
}

struct Attributes {
    element: String,
    values: HashMap<String, String>,
}

impl Attributes {
    fn read(element: &str, start: &BytesStart) -> Result<Self> {
        let mut values = HashMap::new();
        for attribute in start.attributes() {
            let attribute = attribute?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value()?.into_owned();
            values.insert(key, value);
        }
        Ok(Attributes {
            element: element.to_string(),
            values,
        })
    }

    fn optional(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn required(&self, key: &str) -> Result<&str> {
        self.optional(key).ok_or_else(|| {
            config_error!("<{}> is missing the '{}' attribute", self.element, key)
        })
    }

    fn flag(&self, key: &str) -> Result<bool> {
        match self.optional(key) {
            None | Some("false") => Ok(false),
            Some("true") => Ok(true),
            Some(other) => Err(config_error!(
                "<{}> attribute '{}' must be true or false, not '{}'",
                self.element,
                key,
                other
            )),
        }
    }

    fn list(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .required(key)?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn conversions(&self, key: &str) -> Vec<String> {
        self.optional(key)
            .map(|text| {
                text.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A target type: `type`/`new` name plus the optional `scope`.
    fn target(&self, key: &str) -> Result<TypeRef> {
        let mut ty = parse_type(self.required(key)?)?;
        ty.scope = self.optional("scope").unwrap_or_default().to_string();
        Ok(ty)
    }

    fn severity(&self) -> Result<Severity> {
        match self.optional("severity") {
            None => Ok(Severity::Suspicious),
            Some(text) => Severity::parse(text)
                .ok_or_else(|| config_error!("<{}> has unknown severity '{}'", self.element, text)),
        }
    }
}

struct Loader {
    rules: RuleSet,
    class: Option<CatalogType>,
    method: Option<CatalogMethod>,
    in_catalog: bool,
    seen_root: bool,
}

impl Loader {
    fn element(&mut self, start: &BytesStart, empty: bool) -> Result<()> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let attrs = Attributes::read(&name, start)?;

        if self.class.is_some() {
            return self.class_member(&name, &attrs, empty);
        }

        match name.as_str() {
            "rules" => {
                self.seen_root = true;
                if let Some(host) = attrs.optional("host") {
                    self.rules.host_version = host.to_string();
                }
            }
            "trusted" => {
                let assembly = attrs.required("assembly")?.trim();
                if assembly.is_empty() {
                    return Err(config_error!("<trusted> assembly name is empty"));
                }
                self.rules.trusted_assemblies.insert(assembly.to_string());
            }
            "type" => {
                let target = attrs.target("new")?;
                self.rules.symbols.register_type(attrs.required("old")?, target);
            }
            "field" => {
                let target = attrs.target("type")?;
                self.rules
                    .symbols
                    .register_field(attrs.required("old")?, target, attrs.required("name")?);
            }
            "method" => {
                let target = attrs.target("type")?;
                self.rules
                    .symbols
                    .register_method(attrs.required("old")?, target, attrs.required("name")?);
            }
            "facade" => {
                let facade = attrs.target("facade")?;
                self.rules.symbols.register_facade(attrs.required("type")?, facade);
            }
            "detect" => {
                let severity = attrs.severity()?;
                self.rules.symbols.register_detection(
                    attrs.required("old")?,
                    severity,
                    attrs.required("message")?,
                );
            }
            "find" => {
                let rule = Self::finder(&attrs)?;
                self.rules.finders.push(rule);
            }
            "platform" => self.rules.platform.push(PlatformRule {
                old: canonicalize(attrs.required("old")?)?,
                new: canonicalize(attrs.required("new")?)?,
                before: attrs.conversions("before"),
                after: attrs.conversions("after"),
            }),
            "content" => {
                let loader = attrs.required("loader")?.to_string();
                if !self.rules.assets.loaders.contains(&loader) {
                    self.rules.assets.loaders.push(loader);
                }
                if let Some(method) = attrs.optional("method") {
                    self.rules.assets.method = method.to_string();
                }
            }
            "asset" => {
                let ty = canonicalize(attrs.required("type")?)?;
                self.rules.assets.insert(attrs.required("name")?, ty);
            }
            "catalog" => self.in_catalog = !empty,
            "class" if self.in_catalog => {
                let mut class = CatalogType::new(
                    attrs.optional("scope").unwrap_or_default(),
                    attrs.required("name")?,
                );
                class.base = attrs.optional("base").map(str::to_string);
                if empty {
                    self.rules.catalog.insert(class);
                } else {
                    self.class = Some(class);
                }
            }
            other => return Err(config_error!("Unknown rule element <{}>", other)),
        }
        Ok(())
    }

    fn class_member(&mut self, name: &str, attrs: &Attributes, empty: bool) -> Result<()> {
        let Some(class) = self.class.take() else {
            return Ok(());
        };

        let class = match name {
            "field" => {
                let ty = parse_type(attrs.required("type")?)?;
                if attrs.flag("static")? {
                    class.static_field(attrs.required("name")?, ty)
                } else {
                    class.field(attrs.required("name")?, ty)
                }
            }
            "property" => {
                let ty = parse_type(attrs.required("type")?)?;
                if attrs.flag("static")? {
                    class.static_property(attrs.required("name")?, ty)
                } else {
                    class.property(attrs.required("name")?, ty)
                }
            }
            "method" | "constructor" => {
                let mut method = if name == "constructor" {
                    CatalogMethod::constructor()
                } else {
                    let returns = attrs.optional("returns").map_or_else(|| Ok(TypeRef::void()), parse_type)?;
                    CatalogMethod::new(attrs.required("name")?, returns)
                };
                if attrs.flag("static")? {
                    method = method.static_();
                }
                if attrs.flag("virtual")? {
                    method = method.virtual_();
                }
                if let Some(params) = attrs.optional("params") {
                    for ty in parse_type_list(params)? {
                        method = method.param(ty);
                    }
                }
                if empty {
                    class.method(method)
                } else {
                    self.method = Some(method);
                    class
                }
            }
            "param" => {
                let Some(method) = self.method.take() else {
                    self.class = Some(class);
                    return Err(config_error!("<param> outside of <method>"));
                };
                let ty = parse_type(attrs.required("type")?)?;
                self.method = Some(match attrs.optional("default") {
                    Some(text) => method.optional(ty.clone(), parse_default(text, &ty)?),
                    None => method.param(ty),
                });
                class
            }
            other => {
                self.class = Some(class);
                return Err(config_error!("Unknown catalog element <{}>", other));
            }
        };

        self.class = Some(class);
        Ok(())
    }

    fn end(&mut self, name: &str) {
        match name {
            "method" | "constructor" => {
                if let (Some(class), Some(method)) = (self.class.take(), self.method.take()) {
                    self.class = Some(class.method(method));
                }
            }
            "class" => {
                if let Some(class) = self.class.take() {
                    self.rules.catalog.insert(class);
                }
            }
            "catalog" => self.in_catalog = false,
            _ => {}
        }
    }

    fn finder(attrs: &Attributes) -> Result<FinderRule> {
        let kind_text = attrs.required("kind")?;
        let kind = FindingKind::parse(kind_text)
            .ok_or_else(|| config_error!("<find> has unknown kind '{}'", kind_text))?;

        let mut rule = if attrs.optional("types").is_some() {
            FinderRule::types(kind, attrs.list("types")?)
        } else if attrs.optional("fields").is_some() {
            FinderRule::fields(kind, attrs.required("type")?, attrs.list("fields")?)
        } else if attrs.optional("events").is_some() {
            FinderRule::events(kind, attrs.required("type")?, attrs.list("events")?)
        } else {
            return Err(config_error!("<find> needs one of 'types', 'fields' or 'events'"));
        };

        rule.severity = attrs.severity()?;
        rule.paranoid = attrs.flag("paranoid")?;
        Ok(rule)
    }
}

/// Parses the default value of an optional parameter according to its type.
fn parse_default(text: &str, ty: &TypeRef) -> Result<Constant> {
    let invalid = || config_error!("Invalid default '{}' for parameter of type {}", text, ty);
    let constant = match ty.name.as_str() {
        _ if text == "null" => Constant::Null,
        "System.Boolean" => match text {
            "true" => Constant::I4(1),
            "false" => Constant::I4(0),
            _ => return Err(invalid()),
        },
        "System.Int64" | "System.UInt64" => Constant::I8(text.parse().map_err(|_| invalid())?),
        "System.Single" => Constant::R4(text.parse().map_err(|_| invalid())?),
        "System.Double" => Constant::R8(text.parse().map_err(|_| invalid())?),
        "System.String" => Constant::Str(text.to_string()),
        _ => Constant::I4(text.parse().map_err(|_| invalid())?),
    };
    Ok(constant)
}

//! Href resolution: string identifier → live component.
//!
//! An href is `<module>:<nested.name>`. An empty module means the built-in
//! namespace (`":MemoryRouter"`); a non-empty one names a plugin module that
//! was registered at startup. The nested name is a dotted path into the
//! module, or empty when the module itself is the component.
//!
//! Components are produced by factories held in a [`Registry`]. Nothing is
//! loaded from disk; a plugin becomes resolvable only through
//! [`Registry::register_module`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Member name tried when a namespace is instantiated directly.
pub const DEFAULT_EXPORT: &str = "default";

// ---------------------------------------------------------------------------
// Href
// ---------------------------------------------------------------------------

/// A parsed identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Href {
    /// Module locator. `None` means the built-in namespace.
    pub locator: Option<String>,
    /// Dotted path inside the module. `None` means the whole module.
    pub nested_name: Option<String>,
}

impl Href {
    /// Split an identifier at its first `:`.
    pub fn parse(identifier: &str) -> Result<Self> {
        let (locator, nested) = identifier
            .split_once(':')
            .ok_or_else(|| Error::HrefFormat(identifier.to_string()))?;
        Ok(Self {
            locator: non_empty(locator),
            nested_name: non_empty(nested),
        })
    }

    /// Like [`Href::parse`], but a bare name is taken as a whole module.
    ///
    /// Work items name their behavior this way (`"calculator"`).
    pub fn parse_lenient(identifier: &str) -> Result<Self> {
        if identifier.contains(':') {
            return Self::parse(identifier);
        }
        if identifier.is_empty() {
            return Err(Error::HrefFormat(identifier.to_string()));
        }
        Ok(Self {
            locator: Some(identifier.to_string()),
            nested_name: None,
        })
    }

    pub fn is_builtin(&self) -> bool {
        self.locator.is_none()
    }

    fn module_name(&self) -> &str {
        self.locator.as_deref().unwrap_or("<builtin>")
    }
}

impl fmt::Display for Href {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.locator.as_deref().unwrap_or(""),
            self.nested_name.as_deref().unwrap_or("")
        )
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

// ---------------------------------------------------------------------------
// Modules
// ---------------------------------------------------------------------------

/// Builds one instance of a component.
pub type Factory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Something a module exposes under a name.
pub enum Export<T> {
    /// An instantiable component.
    Component(Factory<T>),
    /// A nested namespace of further exports.
    Namespace(Module<T>),
}

impl<T> Clone for Export<T> {
    fn clone(&self) -> Self {
        match self {
            Export::Component(factory) => Export::Component(Arc::clone(factory)),
            Export::Namespace(module) => Export::Namespace(module.clone()),
        }
    }
}

impl<T> fmt::Debug for Export<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Export::Component(_) => f.write_str("Component"),
            Export::Namespace(module) => f.debug_tuple("Namespace").field(module).finish(),
        }
    }
}

/// A named set of exports.
pub struct Module<T> {
    members: HashMap<String, Export<T>>,
}

impl<T> Clone for Module<T> {
    fn clone(&self) -> Self {
        Self {
            members: self.members.clone(),
        }
    }
}

impl<T> fmt::Debug for Module<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.members.keys().collect();
        names.sort();
        f.debug_struct("Module").field("members", &names).finish()
    }
}

impl<T> Default for Module<T> {
    fn default() -> Self {
        Self {
            members: HashMap::new(),
        }
    }
}

impl<T> Module<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component under `name`.
    pub fn component<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.members
            .insert(name.into(), Export::Component(Arc::new(factory)));
        self
    }

    /// Add a component as this module's default export.
    pub fn default_component<F>(self, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.component(DEFAULT_EXPORT, factory)
    }

    /// Add a nested namespace under `name`.
    pub fn namespace(mut self, name: impl Into<String>, module: Module<T>) -> Self {
        self.members.insert(name.into(), Export::Namespace(module));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, export: Export<T>) {
        self.members.insert(name.into(), export);
    }

    pub fn get(&self, name: &str) -> Option<&Export<T>> {
        self.members.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }
}

/// Instantiate an export.
///
/// A namespace is not itself instantiable; its `default` member is tried
/// once instead. Returns `None` when nothing instantiable is found.
pub fn instantiate<T>(export: &Export<T>) -> Option<T> {
    match export {
        Export::Component(factory) => Some(factory()),
        Export::Namespace(module) => match module.get(DEFAULT_EXPORT) {
            Some(Export::Component(factory)) => Some(factory()),
            _ => None,
        },
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Resolves hrefs to components of type `T`.
pub struct Registry<T> {
    builtins: Export<T>,
    modules: HashMap<String, Export<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new(Module::new())
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modules: Vec<_> = self.modules.keys().collect();
        modules.sort();
        f.debug_struct("Registry")
            .field("builtins", &self.builtins)
            .field("modules", &modules)
            .finish()
    }
}

impl<T> Registry<T> {
    /// Create a registry whose built-in namespace is `builtins`.
    pub fn new(builtins: Module<T>) -> Self {
        Self {
            builtins: Export::Namespace(builtins),
            modules: HashMap::new(),
        }
    }

    /// Make a plugin module resolvable under `locator`.
    ///
    /// Replaces any module previously registered there.
    pub fn register_module(&mut self, locator: impl Into<String>, module: Module<T>) {
        self.register_export(locator, Export::Namespace(module));
    }

    /// Register a module that is itself a single component.
    pub fn register_component<F>(&mut self, locator: impl Into<String>, factory: F)
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register_export(locator, Export::Component(Arc::new(factory)));
    }

    pub fn register_export(&mut self, locator: impl Into<String>, export: Export<T>) {
        let locator = locator.into();
        tracing::debug!(module = %locator, "registered module");
        self.modules.insert(locator, export);
    }

    /// Add a member to the built-in namespace.
    pub fn register_builtin<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        if let Export::Namespace(module) = &mut self.builtins {
            module.insert(name, Export::Component(Arc::new(factory)));
        }
    }

    pub fn has_module(&self, locator: &str) -> bool {
        self.modules.contains_key(locator)
    }

    /// Find the export an href points at.
    pub fn resolve(&self, href: &Href) -> Result<&Export<T>> {
        let mut current = match href.locator.as_deref() {
            None => &self.builtins,
            Some(locator) => self
                .modules
                .get(locator)
                .ok_or_else(|| Error::ModuleNotFound(locator.to_string()))?,
        };

        let Some(nested) = href.nested_name.as_deref() else {
            return Ok(current);
        };

        let member_not_found = || Error::MemberNotFound {
            member: nested.to_string(),
            module: href.module_name().to_string(),
        };
        for segment in nested.split('.') {
            current = match current {
                Export::Namespace(module) => module.get(segment).ok_or_else(member_not_found)?,
                Export::Component(_) => return Err(member_not_found()),
            };
        }
        Ok(current)
    }

    /// Parse, resolve and instantiate in one go.
    pub fn instantiate_from_path(&self, identifier: &str) -> Result<T> {
        let href = Href::parse(identifier)?;
        self.instantiate_href(identifier, &href)
    }

    /// As [`Registry::instantiate_from_path`], accepting bare module names.
    pub fn instantiate_lenient(&self, identifier: &str) -> Result<T> {
        let href = Href::parse_lenient(identifier)?;
        self.instantiate_href(identifier, &href)
    }

    fn instantiate_href(&self, identifier: &str, href: &Href) -> Result<T> {
        let export = self.resolve(href)?;
        instantiate(export).ok_or_else(|| Error::NotInstantiable(identifier.to_string()))
    }
}

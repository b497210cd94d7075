//! Symbol and alias resolution for one Python file.
//!
//! A single forward pass records every name binding the extractors care
//! about: imports, assignments, `with ... as` targets, parameters, type
//! aliases and definitions. Lookups are position-aware: a use site only sees
//! bindings that precede it, and the last one wins.

use std::collections::HashMap;

use crate::parser::{Node, NodeId, SyntaxTree};

use super::catalog::{Catalog, Role};
use super::values::{unwrap_await, unwrap_parens, CallArgs};

pub type ScopeId = usize;

/// The module scope.
pub const MODULE_SCOPE: ScopeId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Function,
    Class,
}

/// `import module` / `from module import name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub module: String,
    pub name: Option<String>,
}

impl ImportBinding {
    /// Dotted path the bound name stands for.
    pub fn path(&self) -> String {
        match &self.name {
            None => self.module.clone(),
            Some(name) if self.module.ends_with('.') => format!("{}{}", self.module, name),
            Some(name) => format!("{}.{}", self.module, name),
        }
    }
}

/// A variable bound to the result of an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueBinding {
    pub variable: String,
    /// Qualified callee when the value came from a call.
    pub callee: Option<String>,
    pub role: Option<Role>,
    /// The value expression (the call node for constructed objects).
    pub origin: NodeId,
    /// The statement or `with` item that introduced the binding.
    pub declared_at: NodeId,
    pub scoped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterBinding {
    pub function: NodeId,
    pub parameter: NodeId,
    pub annotation: Option<NodeId>,
    pub annotation_path: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeAliasBinding {
    pub target: NodeId,
    pub new_type: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Function,
    Class,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionBinding {
    pub kind: DefinitionKind,
    pub node: NodeId,
    /// Decorators applied through a route group or tool server, in source order.
    pub registrations: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Import(ImportBinding),
    Value(ValueBinding),
    Parameter(ParameterBinding),
    TypeAlias(TypeAliasBinding),
    Definition(DefinitionBinding),
}

#[derive(Debug, Clone)]
struct Entry {
    visible_from: usize,
    visible_until: Option<usize>,
    binding: Binding,
}

impl Entry {
    fn visible_at(&self, pos: usize) -> bool {
        self.visible_from <= pos && self.visible_until.map_or(true, |end| pos < end)
    }
}

#[derive(Debug, Clone)]
struct Scope {
    kind: ScopeKind,
    parent: Option<ScopeId>,
    node: NodeId,
    entries: HashMap<String, Vec<Entry>>,
}

/// An object with a catalog role reached from some expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub role: Role,
    pub variable: Option<String>,
    pub constructor: String,
    /// Constructing call, when there is one.
    pub origin: Option<NodeId>,
    /// Node whose span identifies the binding (assignment, with item, parameter).
    pub declared_at: NodeId,
    pub scoped: bool,
}

/// Per-file binding table.
#[derive(Debug, Clone)]
pub struct BindingTable {
    scopes: Vec<Scope>,
    node_scope: Vec<ScopeId>,
}

/// Strip the grammar's `type` wrapper around annotations.
pub fn unwrap_type(mut node: Node<'_>) -> Node<'_> {
    while node.kind() == "type" {
        match node.named_children().next() {
            Some(inner) => node = inner,
            None => break,
        }
    }
    unwrap_parens(node)
}

impl BindingTable {
    /// Run the binding pre-pass over a tree.
    pub fn build(tree: &SyntaxTree, catalog: &Catalog) -> Self {
        let mut table = BindingTable {
            scopes: vec![Scope {
                kind: ScopeKind::Module,
                parent: None,
                node: tree.root().id(),
                entries: HashMap::new(),
            }],
            node_scope: vec![MODULE_SCOPE; tree.len()],
        };

        let mut stack: Vec<(NodeId, ScopeId)> = vec![(tree.root().id(), MODULE_SCOPE)];
        while let Some((id, scope)) = stack.pop() {
            let node = tree.node(id);
            table.node_scope[id] = scope;
            table.record(node, scope, catalog);

            let inner = match node.kind() {
                "function_definition" => Some(table.push_scope(ScopeKind::Function, scope, node)),
                "class_definition" => Some(table.push_scope(ScopeKind::Class, scope, node)),
                _ => None,
            };
            if let Some(inner) = inner {
                if node.kind() == "function_definition" {
                    table.bind_parameters(node, inner, catalog);
                }
            }

            let children: Vec<Node<'_>> = node.children().collect();
            for child in children.into_iter().rev() {
                let child_scope = match (inner, child.field()) {
                    (Some(inner), Some("body" | "parameters" | "type_parameters")) => inner,
                    _ => scope,
                };
                stack.push((child.id(), child_scope));
            }
        }
        table
    }

    fn push_scope(&mut self, kind: ScopeKind, parent: ScopeId, node: Node<'_>) -> ScopeId {
        self.scopes.push(Scope {
            kind,
            parent: Some(parent),
            node: node.id(),
            entries: HashMap::new(),
        });
        self.scopes.len() - 1
    }

    fn insert(&mut self, scope: ScopeId, name: &str, visible_from: usize, until: Option<usize>, binding: Binding) {
        self.scopes[scope]
            .entries
            .entry(name.to_string())
            .or_default()
            .push(Entry {
                visible_from,
                visible_until: until,
                binding,
            });
    }

    fn record(&mut self, node: Node<'_>, scope: ScopeId, catalog: &Catalog) {
        match node.kind() {
            "import_statement" => self.record_import(node, scope),
            "import_from_statement" => self.record_import_from(node, scope),
            "assignment" => self.record_assignment(node, scope, catalog),
            "with_statement" => self.record_with(node, scope, catalog),
            "for_statement" => {
                if let Some(left) = node.child_by_field("left") {
                    self.shadow_targets(left, scope, left.end_byte());
                }
            }
            "type_alias_statement" => {
                let named: Vec<_> = node.named_children().collect();
                if let (Some(left), Some(right)) = (named.first(), named.last()) {
                    let name = unwrap_type(*left).text().to_string();
                    self.insert(
                        scope,
                        &name,
                        node.end_byte(),
                        None,
                        Binding::TypeAlias(TypeAliasBinding {
                            target: right.id(),
                            new_type: false,
                        }),
                    );
                }
            }
            "function_definition" | "class_definition" => {
                if let Some(name) = node.child_by_field("name") {
                    let kind = if node.kind() == "function_definition" {
                        DefinitionKind::Function
                    } else {
                        DefinitionKind::Class
                    };
                    let end = node.end_byte();
                    let registrations = self.registrations(node, catalog);
                    self.insert(
                        scope,
                        name.text(),
                        end,
                        None,
                        Binding::Definition(DefinitionBinding {
                            kind,
                            node: node.id(),
                            registrations,
                        }),
                    );
                }
            }
            _ => {}
        }
    }

    /// Decorators of `definition` whose target object is a route group or
    /// tool server. Decorators precede the definition, so their names are
    /// already bound.
    fn registrations(&self, definition: Node<'_>, catalog: &Catalog) -> Vec<NodeId> {
        let Some(decorated) = definition
            .parent()
            .filter(|p| p.kind() == "decorated_definition")
        else {
            return Vec::new();
        };
        decorated
            .children()
            .filter(|c| c.kind() == "decorator")
            .filter(|decorator| {
                let Some(expr) = decorator.named_children().next().map(unwrap_parens) else {
                    return false;
                };
                let target = if expr.kind() == "call" {
                    match expr.child_by_field("function") {
                        Some(f) => unwrap_parens(f),
                        None => return false,
                    }
                } else {
                    expr
                };
                if target.kind() != "attribute" {
                    return false;
                }
                target
                    .child_by_field("object")
                    .and_then(|object| self.resolve_instance(object, catalog))
                    .map(|instance| {
                        instance.role.is_route_group()
                            || matches!(instance.role, Role::ToolServer { .. })
                    })
                    .unwrap_or(false)
            })
            .map(|decorator| decorator.id())
            .collect()
    }

    fn record_import(&mut self, node: Node<'_>, scope: ScopeId) {
        let at = node.end_byte();
        for item in node.children_by_field("name") {
            match item.kind() {
                "dotted_name" => {
                    let full = item.text();
                    let first = full.split('.').next().unwrap_or(full).trim();
                    self.insert(
                        scope,
                        first,
                        at,
                        None,
                        Binding::Import(ImportBinding {
                            module: first.to_string(),
                            name: None,
                        }),
                    );
                }
                "aliased_import" => {
                    if let (Some(module), Some(alias)) =
                        (item.child_by_field("name"), item.child_by_field("alias"))
                    {
                        self.insert(
                            scope,
                            alias.text(),
                            at,
                            None,
                            Binding::Import(ImportBinding {
                                module: compact(module.text()),
                                name: None,
                            }),
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn record_import_from(&mut self, node: Node<'_>, scope: ScopeId) {
        let Some(module) = node.child_by_field("module_name") else {
            return;
        };
        let module = compact(module.text());
        let at = node.end_byte();
        for item in node.children_by_field("name") {
            let (name, bound) = match item.kind() {
                "aliased_import" => match (item.child_by_field("name"), item.child_by_field("alias")) {
                    (Some(name), Some(alias)) => (compact(name.text()), alias.text().to_string()),
                    _ => continue,
                },
                _ => (compact(item.text()), compact(item.text())),
            };
            self.insert(
                scope,
                &bound,
                at,
                None,
                Binding::Import(ImportBinding {
                    module: module.clone(),
                    name: Some(name),
                }),
            );
        }
    }

    fn record_assignment(&mut self, node: Node<'_>, scope: ScopeId, catalog: &Catalog) {
        let Some(left) = node.child_by_field("left") else {
            return;
        };
        let at = node.end_byte();
        if left.kind() != "identifier" {
            if left.kind() != "attribute" && left.kind() != "subscript" {
                self.shadow_targets(left, scope, at);
            }
            return;
        }
        let name = left.text();

        let explicit_alias = node
            .child_by_field("type")
            .map(|t| {
                let text = unwrap_type(t).text();
                text == "TypeAlias" || text.ends_with(".TypeAlias")
            })
            .unwrap_or(false);

        // `a = b = value`: every target binds the innermost value.
        let mut right = node.child_by_field("right");
        while let Some(r) = right {
            if r.kind() != "assignment" {
                break;
            }
            right = r.child_by_field("right");
        }
        let Some(right) = right else {
            return;
        };

        if explicit_alias {
            let binding = Binding::TypeAlias(TypeAliasBinding {
                target: right.id(),
                new_type: false,
            });
            self.insert(scope, name, at, None, binding);
            return;
        }

        let value = unwrap_await(right);
        let binding = match value.kind() {
            "call" => self.binding_for_call(name, value, node, scope, catalog),
            "identifier" => match self.lookup_at(value.text(), scope, value.start_byte()) {
                Some(Binding::Value(v)) => Binding::Value(ValueBinding {
                    variable: name.to_string(),
                    declared_at: node.id(),
                    ..v.clone()
                }),
                Some(other @ (Binding::Import(_) | Binding::TypeAlias(_))) => other.clone(),
                _ => self.plain_value(name, value, node),
            },
            "subscript" | "generic_type" | "binary_operator"
                if self.looks_like_type(value, scope) =>
            {
                Binding::TypeAlias(TypeAliasBinding {
                    target: value.id(),
                    new_type: false,
                })
            }
            _ => self.plain_value(name, value, node),
        };
        self.insert(scope, name, at, None, binding);
    }

    fn plain_value(&self, name: &str, value: Node<'_>, statement: Node<'_>) -> Binding {
        Binding::Value(ValueBinding {
            variable: name.to_string(),
            callee: None,
            role: None,
            origin: value.id(),
            declared_at: statement.id(),
            scoped: false,
        })
    }

    fn binding_for_call(
        &self,
        name: &str,
        call: Node<'_>,
        statement: Node<'_>,
        scope: ScopeId,
        catalog: &Catalog,
    ) -> Binding {
        let callee = call
            .child_by_field("function")
            .and_then(|f| self.qualify_at(f, scope, call.start_byte()));
        if let Some(path) = callee.as_deref() {
            if path == "typing.NewType" || path == "typing_extensions.NewType" || path == "NewType" {
                if let Some(target) = CallArgs::of(call).positional(1) {
                    return Binding::TypeAlias(TypeAliasBinding {
                        target: target.id(),
                        new_type: true,
                    });
                }
            }
        }
        let role = callee.as_deref().and_then(|p| catalog.constructor_role(p));
        Binding::Value(ValueBinding {
            variable: name.to_string(),
            callee,
            role,
            origin: call.id(),
            declared_at: statement.id(),
            scoped: false,
        })
    }

    /// Implicit type alias: `Pet = Union[Cat, Dog]`, `Ids = list[int]`, `X = A | None`.
    fn looks_like_type(&self, value: Node<'_>, scope: ScopeId) -> bool {
        match value.kind() {
            "subscript" | "generic_type" => {
                let base = value
                    .child_by_field("value")
                    .or_else(|| value.named_children().next());
                base.and_then(|b| self.qualify_at(b, scope, value.start_byte()))
                    .map(|path| super::annotations::is_type_constructor(&path))
                    .unwrap_or(false)
            }
            "binary_operator" => {
                value.has_token("|")
                    && [value.child_by_field("left"), value.child_by_field("right")]
                        .into_iter()
                        .flatten()
                        .all(|side| match side.kind() {
                            "none" => true,
                            "binary_operator" | "subscript" | "generic_type" => {
                                self.looks_like_type(side, scope)
                            }
                            "identifier" | "attribute" => self
                                .qualify_at(side, scope, side.start_byte())
                                .map(|p| super::annotations::is_type_name(&p))
                                .unwrap_or(false),
                            _ => false,
                        })
            }
            _ => false,
        }
    }

    fn record_with(&mut self, node: Node<'_>, scope: ScopeId, catalog: &Catalog) {
        let until = node.end_byte();
        let items: Vec<Node<'_>> = node
            .descendants()
            .filter(|n| n.kind() == "with_item" && n.ancestor("with_statement") == Some(node))
            .collect();
        for item in items {
            let Some(value) = item.child_by_field("value") else {
                continue;
            };
            let (expr, target) = if value.kind() == "as_pattern" {
                let expr = value.named_children().next();
                let target = value.child_by_field("alias").map(|a| {
                    a.named_children()
                        .find(|c| c.kind() == "identifier")
                        .unwrap_or(a)
                });
                (expr, target)
            } else {
                (Some(value), item.child_by_field("alias"))
            };
            let (Some(expr), Some(target)) = (expr, target) else {
                continue;
            };
            if target.kind() != "identifier" {
                continue;
            }
            let expr = unwrap_await(expr);
            let binding = if expr.kind() == "call" {
                match self.binding_for_call(target.text(), expr, item, scope, catalog) {
                    Binding::Value(mut v) => {
                        v.scoped = true;
                        Binding::Value(v)
                    }
                    other => other,
                }
            } else {
                self.plain_value(target.text(), expr, item)
            };
            self.insert(scope, target.text(), item.end_byte(), Some(until), binding);
        }
    }

    fn bind_parameters(&mut self, function: Node<'_>, scope: ScopeId, catalog: &Catalog) {
        let Some(parameters) = function.child_by_field("parameters") else {
            return;
        };
        let at = parameters.start_byte();
        let outer = self.scopes[scope].parent.unwrap_or(MODULE_SCOPE);
        for param in parameters.named_children() {
            let Some((name, annotation)) = parameter_parts(param) else {
                continue;
            };
            let annotation_path = annotation.and_then(|a| {
                let a = unwrap_type(a);
                let a = self.strip_optional(a, outer);
                self.qualify_at(a, outer, a.start_byte())
            });
            let role = annotation_path
                .as_deref()
                .and_then(|p| catalog.constructor_role(p));
            self.insert(
                scope,
                name.text(),
                at,
                None,
                Binding::Parameter(ParameterBinding {
                    function: function.id(),
                    parameter: param.id(),
                    annotation: annotation.map(|a| a.id()),
                    annotation_path,
                    role,
                }),
            );
        }
    }

    /// `Optional[X]` -> `X` for annotation role lookup.
    fn strip_optional<'t>(&self, node: Node<'t>, scope: ScopeId) -> Node<'t> {
        if node.kind() == "subscript" {
            let is_optional = node
                .child_by_field("value")
                .and_then(|v| self.qualify_at(v, scope, v.start_byte()))
                .map(|p| p == "typing.Optional" || p == "Optional")
                .unwrap_or(false);
            if is_optional {
                if let Some(inner) = node.child_by_field("subscript") {
                    return unwrap_type(inner);
                }
            }
        }
        node
    }

    fn shadow_targets(&mut self, target: Node<'_>, scope: ScopeId, at: usize) {
        let names: Vec<(String, NodeId)> = target
            .descendants()
            .filter(|n| n.kind() == "identifier")
            .filter(|n| n.parent().map(|p| p.kind() != "attribute").unwrap_or(true))
            .map(|n| (n.text().to_string(), n.id()))
            .collect();
        for (name, id) in names {
            self.insert(
                scope,
                &name,
                at,
                None,
                Binding::Value(ValueBinding {
                    variable: name.clone(),
                    callee: None,
                    role: None,
                    origin: id,
                    declared_at: id,
                    scoped: false,
                }),
            );
        }
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Scope a node belongs to.
    pub fn scope_of(&self, node: Node<'_>) -> ScopeId {
        self.node_scope.get(node.id()).copied().unwrap_or(MODULE_SCOPE)
    }

    pub fn scope_kind(&self, scope: ScopeId) -> ScopeKind {
        self.scopes[scope].kind
    }

    /// Node that opened a scope (module, function or class definition).
    pub fn scope_node(&self, scope: ScopeId) -> NodeId {
        self.scopes[scope].node
    }

    /// Binding visible for `name` at `at`.
    pub fn lookup(&self, name: &str, at: Node<'_>) -> Option<&Binding> {
        self.lookup_at(name, self.scope_of(at), at.start_byte())
    }

    /// Binding visible for `name` at byte `pos` inside `scope`.
    pub fn lookup_at(&self, name: &str, scope: ScopeId, pos: usize) -> Option<&Binding> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = &self.scopes[id];
            if s.kind != ScopeKind::Class || id == scope {
                if let Some(entry) = s
                    .entries
                    .get(name)
                    .and_then(|entries| entries.iter().rev().find(|e| e.visible_at(pos)))
                {
                    return Some(&entry.binding);
                }
            }
            current = s.parent;
        }
        None
    }

    /// Canonical dotted name of an identifier or attribute chain.
    ///
    /// Imports are followed (`rq.get` after `import requests as rq` becomes
    /// `requests.get`); unbound names stand for themselves. Expressions that
    /// go through a local value have no qualified name.
    pub fn qualify(&self, node: Node<'_>) -> Option<String> {
        self.qualify_at(node, self.scope_of(node), node.start_byte())
    }

    pub fn qualify_at(&self, node: Node<'_>, scope: ScopeId, pos: usize) -> Option<String> {
        let mut attrs: Vec<&str> = Vec::new();
        let mut base = unwrap_parens(node);
        while base.kind() == "attribute" {
            attrs.push(base.child_by_field("attribute")?.text());
            base = unwrap_parens(base.child_by_field("object")?);
        }
        let mut path = match base.kind() {
            "identifier" => match self.lookup_at(base.text(), scope, pos) {
                Some(Binding::Import(import)) => import.path(),
                Some(Binding::Value(_)) | Some(Binding::Parameter(_)) => return None,
                _ => base.text().to_string(),
            },
            _ => return None,
        };
        for attr in attrs.iter().rev() {
            path.push('.');
            path.push_str(attr);
        }
        Some(path)
    }

    /// Resolve an expression to an object with a catalog role.
    pub fn resolve_instance(&self, node: Node<'_>, catalog: &Catalog) -> Option<Instance> {
        let node = unwrap_await(node);
        match node.kind() {
            "identifier" => match self.lookup(node.text(), node)? {
                Binding::Value(v) => Some(Instance {
                    role: v.role.clone()?,
                    variable: Some(v.variable.clone()),
                    constructor: v.callee.clone()?,
                    origin: Some(v.origin),
                    declared_at: v.declared_at,
                    scoped: v.scoped,
                }),
                Binding::Parameter(p) => Some(Instance {
                    role: p.role.clone()?,
                    variable: Some(node.text().to_string()),
                    constructor: p.annotation_path.clone()?,
                    origin: None,
                    declared_at: p.parameter,
                    scoped: false,
                }),
                _ => None,
            },
            "call" => {
                let callee = self.qualify(node.child_by_field("function")?)?;
                let role = catalog.constructor_role(&callee)?;
                Some(Instance {
                    role,
                    variable: None,
                    constructor: callee,
                    origin: Some(node.id()),
                    declared_at: node.id(),
                    scoped: false,
                })
            }
            _ => None,
        }
    }

    /// Definition node a name refers to at a use site.
    pub fn definition(&self, name: &str, at: Node<'_>) -> Option<DefinitionBinding> {
        match self.lookup(name, at)? {
            Binding::Definition(def) => Some(def.clone()),
            _ => None,
        }
    }

    /// Binding recorded for a function or class definition node.
    pub fn definition_of(&self, definition: Node<'_>) -> Option<&DefinitionBinding> {
        let name = definition.child_by_field("name")?.text();
        self.scopes[self.scope_of(definition)]
            .entries
            .get(name)?
            .iter()
            .find_map(|e| match &e.binding {
                Binding::Definition(def) if def.node == definition.id() => Some(def),
                _ => None,
            })
    }

    /// Every value binding with a role, in scope-then-position order.
    pub fn role_bindings(&self) -> impl Iterator<Item = &ValueBinding> {
        self.scopes.iter().flat_map(|s| {
            let mut found: Vec<(usize, &ValueBinding)> = s
                .entries
                .values()
                .flatten()
                .filter_map(|e| match &e.binding {
                    Binding::Value(v) if v.role.is_some() => Some((e.visible_from, v)),
                    _ => None,
                })
                .collect();
            found.sort_by(|a, b| (a.0, &a.1.variable).cmp(&(b.0, &b.1.variable)));
            found.into_iter().map(|(_, v)| v)
        })
    }
}

/// Name and annotation of a parameter node; `None` for separators and splats.
pub fn parameter_parts(param: Node<'_>) -> Option<(Node<'_>, Option<Node<'_>>)> {
    match param.kind() {
        "identifier" => Some((param, None)),
        "typed_parameter" => {
            let name = param.named_children().next()?;
            if name.kind() != "identifier" {
                return None;
            }
            Some((name, param.child_by_field("type")))
        }
        "default_parameter" | "typed_default_parameter" => {
            let name = param.child_by_field("name")?;
            if name.kind() != "identifier" {
                return None;
            }
            Some((name, param.child_by_field("type")))
        }
        _ => None,
    }
}

fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

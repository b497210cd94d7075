//! Type annotation normalizer.
//!
//! Maps the open-ended grammar of Python annotations onto [`TypeDescriptor`].
//! Unions are flattened and deduplicated in written order, and every spelling
//! of "X or None" collapses to `Optional(X)`. Aliases resolve through the
//! binding table with a cycle guard. Recursion is capped at
//! [`MAX_TYPE_DEPTH`]; anything deeper becomes `Unknown`.

use phf::phf_map;

use crate::analysis::facts::Constraints;
use crate::analysis::types::{LiteralValue, TypeDescriptor, TypeInfo};
use crate::parser::{parse_python, Node, NodeId, SyntaxTree};

use super::bindings::{unwrap_type, Binding, BindingTable, ScopeId, TypeAliasBinding};
use super::catalog;
use super::values::{constraints_from, literal_value, string_literal, CallArgs};

/// Nesting depth past which an annotation is reported as `Unknown`.
pub const MAX_TYPE_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Special {
    List,
    Dict,
    Set,
    Tuple,
    Optional,
    Union,
    Literal,
    Callable,
    Annotated,
    Type,
    /// `Final[X]`, `ClassVar[X]`...: unwrap and keep the name as metadata.
    Qualifier(&'static str),
}

static SPECIAL_FORMS: phf::Map<&'static str, Special> = phf_map! {
    "list" => Special::List,
    "typing.List" => Special::List,
    "typing.Sequence" => Special::List,
    "typing.MutableSequence" => Special::List,
    "typing.Collection" => Special::List,
    "collections.abc.Sequence" => Special::List,
    "collections.abc.MutableSequence" => Special::List,
    "collections.abc.Collection" => Special::List,
    "dict" => Special::Dict,
    "typing.Dict" => Special::Dict,
    "typing.Mapping" => Special::Dict,
    "typing.MutableMapping" => Special::Dict,
    "typing.DefaultDict" => Special::Dict,
    "typing.OrderedDict" => Special::Dict,
    "collections.defaultdict" => Special::Dict,
    "collections.OrderedDict" => Special::Dict,
    "collections.abc.Mapping" => Special::Dict,
    "collections.abc.MutableMapping" => Special::Dict,
    "set" => Special::Set,
    "frozenset" => Special::Set,
    "typing.Set" => Special::Set,
    "typing.FrozenSet" => Special::Set,
    "typing.AbstractSet" => Special::Set,
    "typing.MutableSet" => Special::Set,
    "collections.abc.Set" => Special::Set,
    "collections.abc.MutableSet" => Special::Set,
    "tuple" => Special::Tuple,
    "typing.Tuple" => Special::Tuple,
    "typing.Optional" => Special::Optional,
    "typing.Union" => Special::Union,
    "typing.Literal" => Special::Literal,
    "typing_extensions.Literal" => Special::Literal,
    "typing.Callable" => Special::Callable,
    "collections.abc.Callable" => Special::Callable,
    "typing.Annotated" => Special::Annotated,
    "typing_extensions.Annotated" => Special::Annotated,
    "type" => Special::Type,
    "typing.Type" => Special::Type,
    "typing.Final" => Special::Qualifier("Final"),
    "typing.ClassVar" => Special::Qualifier("ClassVar"),
    "typing.Required" => Special::Qualifier("Required"),
    "typing.NotRequired" => Special::Qualifier("NotRequired"),
    "typing.ReadOnly" => Special::Qualifier("ReadOnly"),
    "typing_extensions.Required" => Special::Qualifier("Required"),
    "typing_extensions.NotRequired" => Special::Qualifier("NotRequired"),
    "typing_extensions.ReadOnly" => Special::Qualifier("ReadOnly"),
};

static PRIMITIVES: phf::Map<&'static str, &'static str> = phf_map! {
    "str" => "string",
    "int" => "int",
    "float" => "float",
    "bool" => "bool",
    "bytes" => "bytes",
    "bytearray" => "bytes",
    "complex" => "complex",
    "None" => "none",
    "NoneType" => "none",
    "object" => "any",
    "typing.Any" => "any",
    "typing_extensions.Any" => "any",
    "typing.Text" => "string",
    "typing.AnyStr" => "string",
    "typing.LiteralString" => "string",
    "datetime.datetime" => "datetime",
    "datetime.date" => "date",
    "datetime.time" => "time",
    "datetime.timedelta" => "timedelta",
    "decimal.Decimal" => "decimal",
    "uuid.UUID" => "uuid",
    "pathlib.Path" => "path",
    "pydantic.EmailStr" => "string",
    "pydantic.NameEmail" => "string",
    "pydantic.HttpUrl" => "string",
    "pydantic.AnyUrl" => "string",
    "pydantic.AnyHttpUrl" => "string",
    "pydantic.SecretStr" => "string",
    "pydantic.StrictStr" => "string",
    "pydantic.SecretBytes" => "bytes",
    "pydantic.StrictBytes" => "bytes",
    "pydantic.StrictInt" => "int",
    "pydantic.PositiveInt" => "int",
    "pydantic.NegativeInt" => "int",
    "pydantic.NonNegativeInt" => "int",
    "pydantic.NonPositiveInt" => "int",
    "pydantic.StrictFloat" => "float",
    "pydantic.PositiveFloat" => "float",
    "pydantic.NegativeFloat" => "float",
    "pydantic.StrictBool" => "bool",
    "pydantic.UUID4" => "uuid",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Constrained {
    Scalar(&'static str),
    List,
    Set,
}

static CONSTRAINED_TYPES: phf::Map<&'static str, Constrained> = phf_map! {
    "pydantic.constr" => Constrained::Scalar("string"),
    "pydantic.conint" => Constrained::Scalar("int"),
    "pydantic.confloat" => Constrained::Scalar("float"),
    "pydantic.conbytes" => Constrained::Scalar("bytes"),
    "pydantic.condecimal" => Constrained::Scalar("decimal"),
    "pydantic.condate" => Constrained::Scalar("date"),
    "pydantic.conlist" => Constrained::List,
    "pydantic.conset" => Constrained::Set,
    "pydantic.confrozenset" => Constrained::Set,
};

fn lookup_with_typing<T: Copy>(map: &phf::Map<&'static str, T>, path: &str) -> Option<T> {
    map.get(path).copied().or_else(|| {
        if path.contains('.') {
            None
        } else {
            map.get(format!("typing.{}", path).as_str()).copied()
        }
    })
}

/// Whether `path` names a typing construct that can head a type alias.
pub fn is_type_constructor(path: &str) -> bool {
    lookup_with_typing(&SPECIAL_FORMS, path).is_some()
}

/// Whether `path` names a type usable as a union member in an implicit alias.
pub fn is_type_name(path: &str) -> bool {
    is_type_constructor(path) || lookup_with_typing(&PRIMITIVES, path).is_some()
}

/// Where name lookups happen when the node itself is not in the file's tree
/// (re-parsed forward references).
#[derive(Debug, Clone, Copy)]
struct Anchor {
    scope: ScopeId,
    pos: usize,
}

#[derive(Debug, Default)]
struct Ctx {
    depth: usize,
    visiting: Vec<NodeId>,
    anchor: Option<Anchor>,
}

/// Annotation normalizer bound to one file's tree and bindings.
pub struct Normalizer<'a> {
    tree: &'a SyntaxTree,
    table: &'a BindingTable,
}

impl<'a> Normalizer<'a> {
    pub fn new(tree: &'a SyntaxTree, table: &'a BindingTable) -> Self {
        Self { tree, table }
    }

    /// Normalize an annotation expression.
    pub fn normalize(&self, node: Node<'_>) -> TypeInfo {
        let mut ctx = Ctx::default();
        self.info(node, &mut ctx)
    }

    /// Constraints carried by constrained types or `Annotated[..., Field(...)]`.
    pub fn constraints(&self, node: Node<'_>) -> Constraints {
        for candidate in node.descendants().take(256) {
            if candidate.kind() != "call" {
                continue;
            }
            let Some(path) = candidate
                .child_by_field("function")
                .and_then(|f| self.table.qualify(f))
            else {
                continue;
            };
            if CONSTRAINED_TYPES.contains_key(path.as_str()) || catalog::is_field_factory(&path) {
                return constraints_from(&CallArgs::of(candidate));
            }
        }
        Constraints::default()
    }

    fn anchor(&self, node: Node<'_>, ctx: &Ctx) -> Anchor {
        ctx.anchor.unwrap_or_else(|| Anchor {
            scope: self.table.scope_of(node),
            pos: node.start_byte(),
        })
    }

    fn info(&self, node: Node<'_>, ctx: &mut Ctx) -> TypeInfo {
        if ctx.depth >= MAX_TYPE_DEPTH {
            return TypeInfo::unknown();
        }
        ctx.depth += 1;
        let info = self.info_inner(unwrap_type(node), ctx);
        ctx.depth -= 1;
        info
    }

    fn descriptor(&self, node: Node<'_>, ctx: &mut Ctx) -> TypeDescriptor {
        self.info(node, ctx).descriptor
    }

    fn info_inner(&self, node: Node<'_>, ctx: &mut Ctx) -> TypeInfo {
        match node.kind() {
            "none" => TypeDescriptor::primitive("none").into(),
            "identifier" | "attribute" | "member_type" => self.named(node, ctx),
            "string" | "concatenated_string" => self.forward_ref(node, ctx),
            "subscript" | "generic_type" => self.subscript(node, ctx),
            "binary_operator" if node.has_token("|") => self.union_expr(node, ctx).into(),
            "union_type" => self.union_expr(node, ctx).into(),
            "call" => self.constrained(node, ctx),
            _ => TypeInfo::unknown(),
        }
    }

    /// Dotted path of a name, following the import bindings of its first segment.
    fn path_of(&self, text: &str, anchor: Anchor) -> Option<String> {
        let (first, rest) = match text.split_once('.') {
            Some((first, rest)) => (first, Some(rest)),
            None => (text, None),
        };
        let base = match self.table.lookup_at(first, anchor.scope, anchor.pos) {
            Some(Binding::Import(import)) => import.path(),
            Some(Binding::Value(_)) | Some(Binding::Parameter(_)) => return None,
            _ => first.to_string(),
        };
        Some(match rest {
            Some(rest) => format!("{}.{}", base, rest),
            None => base,
        })
    }

    fn named(&self, node: Node<'_>, ctx: &mut Ctx) -> TypeInfo {
        let text: String = node.text().chars().filter(|c| !c.is_whitespace()).collect();
        let anchor = self.anchor(node, ctx);

        if !text.contains('.') {
            match self.table.lookup_at(&text, anchor.scope, anchor.pos) {
                Some(Binding::TypeAlias(alias)) => return self.alias(&text, *alias, ctx),
                Some(Binding::Value(value)) => {
                    let is_type_var = value
                        .callee
                        .as_deref()
                        .map(|c| c.ends_with("TypeVar") || c.ends_with("ParamSpec"))
                        .unwrap_or(false);
                    return if is_type_var {
                        TypeDescriptor::reference(&text).into()
                    } else {
                        TypeInfo::unknown()
                    };
                }
                Some(Binding::Parameter(_)) => return TypeInfo::unknown(),
                _ => {}
            }
        }

        match self.path_of(&text, anchor) {
            Some(path) => path_info(&path, &text),
            None => TypeInfo::unknown(),
        }
    }

    fn alias(&self, name: &str, alias: TypeAliasBinding, ctx: &mut Ctx) -> TypeInfo {
        if ctx.visiting.contains(&alias.target) {
            return TypeInfo::unknown().with_alias(name);
        }
        ctx.visiting.push(alias.target);
        let saved = ctx.anchor.take();
        let mut info = self.info(self.tree.node(alias.target), ctx);
        ctx.anchor = saved;
        ctx.visiting.pop();
        info.alias = Some(name.to_string());
        info
    }

    /// `"Node"` / `"List[Node]"`: re-parse the text and resolve names where
    /// the string appeared.
    fn forward_ref(&self, node: Node<'_>, ctx: &mut Ctx) -> TypeInfo {
        let Some(text) = string_literal(node) else {
            return TypeInfo::unknown();
        };
        let Ok(tree) = parse_python(text.trim()) else {
            return TypeInfo::unknown();
        };
        let expr = tree
            .root()
            .named_children()
            .next()
            .and_then(|stmt| stmt.named_children().next());
        let Some(expr) = expr else {
            return TypeInfo::unknown();
        };
        if tree.has_errors() {
            return TypeInfo::unknown().with_alias(text.trim());
        }
        let saved = ctx.anchor;
        ctx.anchor = Some(self.anchor(node, ctx));
        let info = self.info(expr, ctx);
        ctx.anchor = saved;
        info
    }

    fn subscript(&self, node: Node<'_>, ctx: &mut Ctx) -> TypeInfo {
        let (base, args): (Option<Node<'_>>, Vec<Node<'_>>) = if node.kind() == "subscript" {
            (
                node.child_by_field("value"),
                node.children_by_field("subscript").collect(),
            )
        } else {
            let mut named = node.named_children();
            let base = named.next();
            let args = named
                .find(|c| c.kind() == "type_parameter")
                .map(|tp| tp.named_children().collect())
                .unwrap_or_default();
            (base, args)
        };
        let Some(base) = base else {
            return TypeInfo::unknown();
        };
        let written: String = base.text().chars().filter(|c| !c.is_whitespace()).collect();
        let anchor = self.anchor(base, ctx);
        let Some(path) = self.path_of(&written, anchor) else {
            return TypeInfo::unknown();
        };
        let last = written.rsplit('.').next().unwrap_or(&written).to_string();

        let Some(special) = lookup_with_typing(&SPECIAL_FORMS, &path) else {
            let args = args.iter().map(|a| self.descriptor(*a, ctx)).collect();
            return TypeDescriptor::Generic { base: last, args }.into();
        };

        let hint = match special {
            Special::List | Special::Dict | Special::Set => {
                let canonical = matches!(
                    last.as_str(),
                    "List" | "list" | "Dict" | "dict" | "Set" | "set"
                );
                (!canonical).then(|| last.clone())
            }
            _ => None,
        };

        let arg = |i: usize, ctx: &mut Ctx| -> TypeDescriptor {
            args.get(i)
                .map(|a| self.descriptor(*a, ctx))
                .unwrap_or_else(|| TypeDescriptor::primitive("any"))
        };

        let descriptor = match special {
            Special::List => TypeDescriptor::list(arg(0, ctx)),
            Special::Set => TypeDescriptor::set(arg(0, ctx)),
            Special::Dict => {
                let key = arg(0, ctx);
                let value = arg(1, ctx);
                TypeDescriptor::dict(key, value)
            }
            Special::Tuple => self.tuple(&args, ctx),
            Special::Optional => {
                let inner = arg(0, ctx);
                union_of(vec![inner, TypeDescriptor::primitive("none")])
            }
            Special::Union => {
                let members = args.iter().map(|a| self.descriptor(*a, ctx)).collect();
                union_of(members)
            }
            Special::Literal => TypeDescriptor::Literal {
                values: args.iter().flat_map(|a| literal_values(*a)).collect(),
            },
            Special::Callable => self.callable(&args, ctx),
            Special::Type => TypeDescriptor::Generic {
                base: "type".to_string(),
                args: vec![arg(0, ctx)],
            },
            Special::Annotated => {
                let Some(first) = args.first() else {
                    return TypeInfo::unknown();
                };
                let mut info = self.info(*first, ctx);
                info.metadata
                    .extend(args[1..].iter().map(|a| a.text().to_string()));
                return info;
            }
            Special::Qualifier(name) => {
                let Some(first) = args.first() else {
                    return TypeInfo::unknown();
                };
                let mut info = self.info(*first, ctx);
                info.metadata.insert(0, name.to_string());
                return info;
            }
        };

        let mut info = TypeInfo::new(descriptor);
        info.alias = hint;
        info
    }

    fn tuple(&self, args: &[Node<'_>], ctx: &mut Ctx) -> TypeDescriptor {
        let is_ellipsis = |n: &Node<'_>| unwrap_type(*n).kind() == "ellipsis";
        if args.len() == 2 && is_ellipsis(&args[1]) {
            return TypeDescriptor::Tuple {
                elements: vec![self.descriptor(args[0], ctx)],
                variadic: true,
            };
        }
        if args.len() == 1 && unwrap_type(args[0]).kind() == "tuple" {
            // Tuple[()]
            return TypeDescriptor::Tuple {
                elements: Vec::new(),
                variadic: false,
            };
        }
        TypeDescriptor::Tuple {
            elements: args.iter().map(|a| self.descriptor(*a, ctx)).collect(),
            variadic: false,
        }
    }

    fn callable(&self, args: &[Node<'_>], ctx: &mut Ctx) -> TypeDescriptor {
        let returns = args
            .get(1)
            .map(|r| self.descriptor(*r, ctx))
            .unwrap_or_else(|| TypeDescriptor::primitive("any"));
        let params_node = args.first().map(|p| unwrap_type(*p));
        let (params, any_params) = match params_node {
            Some(p) if p.kind() == "list" => (
                p.named_children().map(|c| self.descriptor(c, ctx)).collect(),
                false,
            ),
            _ => (Vec::new(), true),
        };
        TypeDescriptor::Callable {
            params,
            any_params,
            returns: Box::new(returns),
        }
    }

    /// Flatten a `|` chain without recursing on its spine.
    fn union_expr(&self, node: Node<'_>, ctx: &mut Ctx) -> TypeDescriptor {
        let mut leaves = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let current = unwrap_type(current);
            let is_union = (current.kind() == "binary_operator" && current.has_token("|"))
                || current.kind() == "union_type";
            if is_union {
                let parts: Vec<Node<'_>> = current.named_children().collect();
                stack.extend(parts.into_iter().rev());
            } else {
                leaves.push(current);
            }
        }
        let members = leaves.into_iter().map(|l| self.descriptor(l, ctx)).collect();
        union_of(members)
    }

    fn constrained(&self, node: Node<'_>, ctx: &mut Ctx) -> TypeInfo {
        let Some(function) = node.child_by_field("function") else {
            return TypeInfo::unknown();
        };
        let anchor = self.anchor(function, ctx);
        let written: String = function.text().chars().filter(|c| !c.is_whitespace()).collect();
        let Some(path) = self.path_of(&written, anchor) else {
            return TypeInfo::unknown();
        };
        let Some(kind) = CONSTRAINED_TYPES.get(path.as_str()).copied() else {
            return TypeInfo::unknown();
        };
        let args = CallArgs::of(node);
        let descriptor = match kind {
            Constrained::Scalar(name) => TypeDescriptor::primitive(name),
            Constrained::List | Constrained::Set => {
                let element = args
                    .arg(0, "item_type")
                    .map(|a| self.descriptor(a, ctx))
                    .unwrap_or_else(|| TypeDescriptor::primitive("any"));
                if kind == Constrained::List {
                    TypeDescriptor::list(element)
                } else {
                    TypeDescriptor::set(element)
                }
            }
        };
        TypeInfo::new(descriptor).with_alias(written)
    }
}

fn path_info(path: &str, written: &str) -> TypeInfo {
    if let Some(name) = lookup_with_typing(&PRIMITIVES, path) {
        let info = TypeInfo::new(TypeDescriptor::primitive(name));
        return if path.starts_with("pydantic.") {
            info.with_alias(path.rsplit('.').next().unwrap_or(path))
        } else {
            info
        };
    }
    if let Some(special) = lookup_with_typing(&SPECIAL_FORMS, path) {
        let any = || TypeDescriptor::primitive("any");
        let descriptor = match special {
            Special::List => TypeDescriptor::list(any()),
            Special::Set => TypeDescriptor::set(any()),
            Special::Dict => TypeDescriptor::dict(any(), any()),
            Special::Tuple => TypeDescriptor::Tuple {
                elements: vec![any()],
                variadic: true,
            },
            Special::Callable => TypeDescriptor::Callable {
                params: Vec::new(),
                any_params: true,
                returns: Box::new(any()),
            },
            Special::Type => TypeDescriptor::Generic {
                base: "type".to_string(),
                args: vec![any()],
            },
            _ => TypeDescriptor::Unknown,
        };
        return descriptor.into();
    }
    let last = written.rsplit('.').next().unwrap_or(written);
    TypeDescriptor::reference(last).into()
}

fn literal_values(node: Node<'_>) -> Vec<LiteralValue> {
    let node = unwrap_type(node);
    match literal_value(node) {
        Some(value) => vec![value],
        None => vec![LiteralValue::Other(node.text().to_string())],
    }
}

/// Canonical union: flattened, deduplicated, `None` lifted into `Optional`.
pub fn union_of(members: Vec<TypeDescriptor>) -> TypeDescriptor {
    let mut flat: Vec<TypeDescriptor> = Vec::new();
    let mut has_none = false;
    let mut pending = members;
    pending.reverse();
    while let Some(member) = pending.pop() {
        match member {
            TypeDescriptor::Union { members } => pending.extend(members.into_iter().rev()),
            TypeDescriptor::Optional { inner } => {
                has_none = true;
                pending.push(*inner);
            }
            m if m.is_none() => has_none = true,
            m => {
                if !flat.contains(&m) {
                    flat.push(m);
                }
            }
        }
    }
    let inner = match flat.len() {
        0 => {
            return if has_none {
                TypeDescriptor::primitive("none")
            } else {
                TypeDescriptor::Unknown
            }
        }
        1 => flat.remove(0),
        _ => TypeDescriptor::Union { members: flat },
    };
    if has_none {
        TypeDescriptor::optional(inner)
    } else {
        inner
    }
}

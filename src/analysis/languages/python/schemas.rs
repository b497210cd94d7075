//! Class declarations for schema recognition.
//!
//! Every class is recorded here, model or not: whether a class is a schema
//! can depend on classes in other files, so recognition and inheritance
//! happen in the unit pass.

use crate::analysis::facts::{
    BaseRef, ClassDecl, Constraints, SchemaConfig, SchemaField, SchemaKind, Validator,
};
use crate::analysis::types::{LiteralValue, TypeDescriptor, TypeInfo};
use crate::parser::Node;

use super::bindings::{unwrap_type, Binding};
use super::catalog;
use super::docstring::{docstring_of, parse as parse_docstring};
use super::values::{
    bool_value, constraints_from, default_summary, literal_value, string_list, string_literal,
    unwrap_parens, CallArgs,
};
use super::FileContext;

pub fn extract(cx: &FileContext<'_>) -> Vec<ClassDecl> {
    cx.tree
        .root()
        .descendants()
        .filter(|n| n.kind() == "class_definition")
        .filter_map(|class| class_decl(cx, class))
        .collect()
}

fn class_decl(cx: &FileContext<'_>, class: Node<'_>) -> Option<ClassDecl> {
    let name = class.child_by_field("name")?.text().to_string();
    let body = class.child_by_field("body");

    let mut decl = ClassDecl {
        name,
        span: class.span(),
        bases: Vec::new(),
        direct_kind: None,
        is_enum: false,
        enum_values: Vec::new(),
        type_params: Vec::new(),
        fields: Vec::new(),
        config: SchemaConfig::default(),
        validators: Vec::new(),
        doc: body
            .and_then(docstring_of)
            .and_then(|doc| parse_docstring(&doc).summary),
    };

    if let Some(params) = class.child_by_field("type_parameters") {
        decl.type_params
            .extend(params.named_children().map(|p| unwrap_type(p).text().to_string()));
    }
    if let Some(superclasses) = class.child_by_field("superclasses") {
        read_bases(cx, superclasses, &mut decl);
    }
    read_decorators(cx, class, &mut decl);
    if let Some(body) = body {
        read_body(cx, body, &mut decl);
    }
    Some(decl)
}

fn read_bases(cx: &FileContext<'_>, superclasses: Node<'_>, decl: &mut ClassDecl) {
    let args = CallArgs::of_arguments(superclasses);
    for base in &args.positional {
        let base = unwrap_parens(*base);
        let (head, subscript_args): (Node<'_>, Vec<Node<'_>>) = match base.kind() {
            "subscript" => match base.child_by_field("value") {
                Some(value) => (value, base.children_by_field("subscript").collect()),
                None => continue,
            },
            "identifier" | "attribute" => (base, Vec::new()),
            _ => continue,
        };

        let qualified = cx.table.qualify(head);
        let head_path = qualified.as_deref().unwrap_or_else(|| head.text());
        if head_path == "typing.Generic" || head_path == "Generic" {
            for arg in subscript_args {
                let param = unwrap_type(arg).text().to_string();
                if !decl.type_params.contains(&param) {
                    decl.type_params.push(param);
                }
            }
            continue;
        }

        if let Some(path) = qualified.as_deref() {
            if let Some(kind) = cx.catalog.model_base(path) {
                decl.direct_kind.get_or_insert(kind);
            }
            if catalog::is_enum_base(path) {
                decl.is_enum = true;
            }
        }
        decl.bases.push(base_ref(cx, base, head, qualified));
    }

    for (keyword, value) in &args.keywords {
        if *keyword != "metaclass" {
            apply_config(&mut decl.config, keyword, *value);
        }
    }
}

/// Describe a base so the unit pass can find it in another file.
fn base_ref(cx: &FileContext<'_>, base: Node<'_>, head: Node<'_>, qualified: Option<String>) -> BaseRef {
    let written = base.text().to_string();
    let head_text = head.text();
    let first = head_text.split('.').next().unwrap_or(head_text).trim();
    let imported = matches!(cx.table.lookup(first, head), Some(Binding::Import(_)));
    match qualified {
        Some(path) if imported => {
            let (module, symbol) = match path.rsplit_once('.') {
                Some((module, symbol)) => (Some(module.to_string()), symbol.to_string()),
                None => (None, path.clone()),
            };
            BaseRef {
                written,
                symbol,
                module,
                qualified: Some(path),
            }
        }
        _ => BaseRef {
            written,
            symbol: head_text.rsplit('.').next().unwrap_or(head_text).to_string(),
            module: None,
            qualified: None,
        },
    }
}

fn read_decorators(cx: &FileContext<'_>, class: Node<'_>, decl: &mut ClassDecl) {
    let Some(decorated) = class.parent().filter(|p| p.kind() == "decorated_definition") else {
        return;
    };
    for decorator in decorated.children().filter(|c| c.kind() == "decorator") {
        let Some(expr) = decorator.named_children().next().map(unwrap_parens) else {
            continue;
        };
        let (target, call) = if expr.kind() == "call" {
            match expr.child_by_field("function") {
                Some(function) => (function, Some(expr)),
                None => continue,
            }
        } else {
            (expr, None)
        };
        let is_dataclass = cx
            .table
            .qualify(target)
            .map(|p| catalog::is_model_decorator(&p))
            .unwrap_or(false);
        if !is_dataclass {
            continue;
        }
        decl.direct_kind.get_or_insert(SchemaKind::Dataclass);
        if let Some(call) = call {
            if let Some(frozen) = CallArgs::of(call).keyword("frozen").and_then(bool_value) {
                decl.config.frozen = frozen;
            }
        }
    }
}

fn read_body(cx: &FileContext<'_>, body: Node<'_>, decl: &mut ClassDecl) {
    for statement in body.named_children() {
        match statement.kind() {
            "expression_statement" => {
                let Some(assignment) = statement
                    .named_children()
                    .next()
                    .filter(|n| n.kind() == "assignment")
                else {
                    continue;
                };
                read_assignment(cx, assignment, decl);
            }
            "class_definition" => {
                let is_config = statement
                    .child_by_field("name")
                    .map(|n| n.text() == "Config")
                    .unwrap_or(false);
                if is_config {
                    read_config_class(statement, &mut decl.config);
                }
            }
            "decorated_definition" => {
                if let Some(validator) = validator(cx, statement) {
                    decl.validators.push(validator);
                }
            }
            _ => {}
        }
    }
}

fn read_assignment(cx: &FileContext<'_>, assignment: Node<'_>, decl: &mut ClassDecl) {
    let Some(left) = assignment.child_by_field("left") else {
        return;
    };
    if left.kind() != "identifier" {
        return;
    }
    let name = left.text();
    let value = assignment.child_by_field("right");

    if name == "model_config" {
        if let Some(value) = value.map(unwrap_parens) {
            read_config_value(value, &mut decl.config);
        }
        return;
    }
    if name.starts_with('_') {
        return;
    }
    if decl.is_enum {
        if let Some(value) = value {
            decl.enum_values.push(
                literal_value(value).unwrap_or_else(|| LiteralValue::Other(value.text().to_string())),
            );
        }
        return;
    }

    let annotation = assignment.child_by_field("type");
    let normalizer = cx.normalizer();
    let (ty, mut constraints) = match annotation {
        Some(annotation) => (normalizer.normalize(annotation), normalizer.constraints(annotation)),
        None => {
            // Plain assignments only count when they look like field values.
            let Some(value) = value else {
                return;
            };
            if field_factory(cx, value).is_none() && literal_value(value).is_none() {
                return;
            }
            (literal_type(value), Constraints::default())
        }
    };
    if ty.metadata.iter().any(|m| m == "ClassVar") {
        return;
    }

    let mut has_default = false;
    let mut default = None;
    let mut alias = None;
    let mut description = None;
    match value.map(|v| (v, field_factory(cx, v))) {
        Some((_, Some(call))) => {
            let args = CallArgs::of(call);
            let mut from_call = constraints_from(&args);
            from_call.merge_missing(&constraints);
            constraints = from_call;
            alias = args.keyword("alias").and_then(string_literal);
            description = args.keyword("description").and_then(string_literal);
            if let Some(factory) = args.keyword("default_factory") {
                has_default = true;
                default = Some(format!("factory:{}", factory.text()));
            } else if let Some(value) = args.arg(0, "default") {
                if !super::values::is_ellipsis(value) {
                    has_default = true;
                    default = Some(default_summary(value));
                }
            }
        }
        Some((value, None)) => {
            has_default = true;
            default = Some(default_summary(value));
        }
        None => {}
    }

    if let TypeDescriptor::Literal { values } = ty.descriptor.unwrap_optional() {
        if constraints.enum_values.is_empty() {
            constraints.enum_values = values.clone();
        }
    }

    let required = if ty.metadata.iter().any(|m| m == "NotRequired") {
        false
    } else if ty.metadata.iter().any(|m| m == "Required") {
        true
    } else if decl.config.total == Some(false) {
        false
    } else {
        !has_default && !ty.descriptor.is_optional()
    };

    let field = SchemaField {
        name: name.to_string(),
        ty,
        required,
        default,
        alias,
        description,
        constraints,
        inherited_from: None,
    };
    // Re-declaration in the same class body replaces the earlier entry.
    match decl.fields.iter_mut().find(|f| f.name == field.name) {
        Some(existing) => *existing = field,
        None => decl.fields.push(field),
    }
}

/// `Field(...)` / `field(...)` call behind a field value.
fn field_factory<'t>(cx: &FileContext<'_>, value: Node<'t>) -> Option<Node<'t>> {
    let value = unwrap_parens(value);
    if value.kind() != "call" {
        return None;
    }
    let path = cx.table.qualify(value.child_by_field("function")?)?;
    catalog::is_field_factory(&path).then_some(value)
}

fn literal_type(value: Node<'_>) -> TypeInfo {
    let name = match unwrap_parens(value).kind() {
        "string" | "concatenated_string" => "string",
        "integer" => "int",
        "float" => "float",
        "true" | "false" => "bool",
        "none" => "none",
        _ => return TypeInfo::unknown(),
    };
    TypeDescriptor::primitive(name).into()
}

fn apply_config(config: &mut SchemaConfig, key: &str, value: Node<'_>) {
    let flag = bool_value(value);
    match (key, flag) {
        ("frozen", Some(v)) => config.frozen = v,
        ("allow_mutation", Some(v)) => config.frozen = !v,
        ("populate_by_name" | "allow_population_by_field_name", Some(v)) => {
            config.populate_by_name = v
        }
        ("use_enum_values", Some(v)) => config.use_enum_values = v,
        ("from_attributes" | "orm_mode", Some(v)) => config.from_attributes = v,
        ("total", Some(v)) => config.total = Some(v),
        ("extra", _) => {
            let text = string_literal(value).unwrap_or_else(|| {
                let text = unwrap_parens(value).text();
                text.rsplit('.').next().unwrap_or(text).to_string()
            });
            config.extra = Some(text);
        }
        _ => {
            let summary = string_list(value)
                .filter(|items| items.len() == 1)
                .and_then(|mut items| items.pop())
                .unwrap_or_else(|| default_summary(value));
            config.other.insert(key.to_string(), summary);
        }
    }
}

/// `class Config:` body of a pydantic v1 model.
fn read_config_class(class: Node<'_>, config: &mut SchemaConfig) {
    let Some(body) = class.child_by_field("body") else {
        return;
    };
    for statement in body.named_children() {
        let Some(assignment) = statement
            .named_children()
            .next()
            .filter(|n| n.kind() == "assignment")
        else {
            continue;
        };
        let (Some(left), Some(right)) = (
            assignment.child_by_field("left"),
            assignment.child_by_field("right"),
        ) else {
            continue;
        };
        if left.kind() == "identifier" {
            apply_config(config, left.text(), right);
        }
    }
}

/// `model_config = ConfigDict(...)` or a dict literal.
fn read_config_value(value: Node<'_>, config: &mut SchemaConfig) {
    match value.kind() {
        "call" => {
            for (key, node) in CallArgs::of(value).keywords {
                apply_config(config, key, node);
            }
        }
        "dictionary" => {
            for (key, node) in super::values::dict_entries(value) {
                apply_config(config, &key, node);
            }
        }
        _ => {}
    }
}

fn validator(cx: &FileContext<'_>, decorated: Node<'_>) -> Option<Validator> {
    let definition = decorated.child_by_field("definition")?;
    if definition.kind() != "function_definition" {
        return None;
    }
    let method = definition.child_by_field("name")?.text().to_string();
    for decorator in decorated.children().filter(|c| c.kind() == "decorator") {
        let Some(expr) = decorator.named_children().next().map(unwrap_parens) else {
            continue;
        };
        let (target, call) = if expr.kind() == "call" {
            (expr.child_by_field("function")?, Some(expr))
        } else {
            (expr, None)
        };
        let path = cx
            .table
            .qualify(target)
            .unwrap_or_else(|| target.text().to_string());
        let Some(kind) = catalog::validator_kind(&path) else {
            continue;
        };
        let fields = call
            .map(|c| {
                CallArgs::of(c)
                    .positional
                    .iter()
                    .filter_map(|a| string_literal(*a))
                    .collect()
            })
            .unwrap_or_default();
        return Some(Validator {
            method,
            kind: kind.to_string(),
            fields,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::languages::python::test_support::with_context;

    fn classes(source: &str) -> Vec<ClassDecl> {
        with_context(source, extract)
    }

    fn field<'a>(decl: &'a ClassDecl, name: &str) -> &'a SchemaField {
        decl.fields
            .iter()
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("no field {}", name))
    }

    #[test]
    fn test_pydantic_model_fields() {
        let decls = classes(
            r#"
from typing import List, Optional, ClassVar
from pydantic import BaseModel, Field

class User(BaseModel):
    """A registered user.

    Longer description.
    """
    id: int
    name: str = Field(..., min_length=1, max_length=50, description="Display name")
    email: Optional[str] = None
    tags: List[str] = []
    scores: List[int] = Field(default_factory=list)
    registry: ClassVar[int] = 0
    _private: str = "x"
"#,
        );
        assert_eq!(decls.len(), 1);
        let user = &decls[0];
        assert_eq!(user.direct_kind, Some(SchemaKind::Pydantic));
        assert_eq!(user.doc.as_deref(), Some("A registered user."));
        assert_eq!(
            user.fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            vec!["id", "name", "email", "tags", "scores"]
        );

        assert!(field(user, "id").required);
        let name = field(user, "name");
        assert!(name.required);
        assert_eq!(name.constraints.min_length, Some(1));
        assert_eq!(name.description.as_deref(), Some("Display name"));
        assert!(!field(user, "email").required);

        let tags = field(user, "tags");
        assert!(!tags.required);
        assert_eq!(tags.ty.descriptor, TypeDescriptor::list(TypeDescriptor::primitive("string")));
        assert_eq!(tags.default.as_deref(), Some("empty"));

        let scores = field(user, "scores");
        assert!(!scores.required);
        assert_eq!(scores.default.as_deref(), Some("factory:list"));
    }

    #[test]
    fn test_bases_and_imports() {
        let decls = classes(
            "from .base import Base as Root\nimport models\nclass A(Root):\n    x: int\nclass B(models.Mixin, A):\n    pass\n",
        );
        let a = &decls[0];
        assert_eq!(a.bases[0].symbol, "Base");
        assert_eq!(a.bases[0].module.as_deref(), Some(".base"));
        assert_eq!(a.direct_kind, None);
        let b = &decls[1];
        assert_eq!(b.bases[0].symbol, "Mixin");
        assert_eq!(b.bases[0].qualified.as_deref(), Some("models.Mixin"));
        assert_eq!(b.bases[1].symbol, "A");
        assert_eq!(b.bases[1].qualified, None);
    }

    #[test]
    fn test_config_forms() {
        let decls = classes(
            r#"
from pydantic import BaseModel, ConfigDict

class V1(BaseModel):
    class Config:
        orm_mode = True
        allow_population_by_field_name = True
        allow_mutation = False
        extra = "forbid"

class V2(BaseModel):
    model_config = ConfigDict(from_attributes=True, use_enum_values=True, str_strip_whitespace=True)

class Kw(BaseModel, frozen=True):
    pass
"#,
        );
        let v1 = decls.iter().find(|d| d.name == "V1").unwrap();
        assert!(v1.config.from_attributes);
        assert!(v1.config.populate_by_name);
        assert!(v1.config.frozen);
        assert_eq!(v1.config.extra.as_deref(), Some("forbid"));

        let v2 = decls.iter().find(|d| d.name == "V2").unwrap();
        assert!(v2.config.from_attributes);
        assert!(v2.config.use_enum_values);
        assert_eq!(v2.config.other["str_strip_whitespace"], "True");
        assert!(v2.fields.is_empty());

        let kw = decls.iter().find(|d| d.name == "Kw").unwrap();
        assert!(kw.config.frozen);
    }

    #[test]
    fn test_dataclass_typed_dict_and_enum() {
        let decls = classes(
            r#"
from dataclasses import dataclass, field
from enum import Enum
from typing import TypedDict, Generic, TypeVar, Literal

T = TypeVar("T")

@dataclass(frozen=True)
class Point:
    x: float
    y: float = 0.0
    labels: list = field(default_factory=list)

class Movie(TypedDict, total=False):
    title: str

class Color(str, Enum):
    RED = "red"
    GREEN = "green"

class Page(Generic[T]):
    items: list[T]
    mode: Literal["a", "b"] = "a"
"#,
        );
        let point = decls.iter().find(|d| d.name == "Point").unwrap();
        assert_eq!(point.direct_kind, Some(SchemaKind::Dataclass));
        assert!(point.config.frozen);
        assert!(field(point, "x").required);
        assert!(!field(point, "y").required);
        assert_eq!(field(point, "labels").default.as_deref(), Some("factory:list"));

        let movie = decls.iter().find(|d| d.name == "Movie").unwrap();
        assert_eq!(movie.direct_kind, Some(SchemaKind::TypedDict));
        assert!(!field(movie, "title").required);

        let color = decls.iter().find(|d| d.name == "Color").unwrap();
        assert!(color.is_enum);
        assert_eq!(
            color.enum_values,
            vec![LiteralValue::Str("red".into()), LiteralValue::Str("green".into())]
        );

        let page = decls.iter().find(|d| d.name == "Page").unwrap();
        assert_eq!(page.type_params, vec!["T".to_string()]);
        assert!(page.bases.is_empty());
        assert_eq!(field(page, "mode").constraints.enum_values.len(), 2);
    }

    #[test]
    fn test_validators() {
        let decls = classes(
            r#"
from pydantic import BaseModel, field_validator, model_validator

class Signup(BaseModel):
    password: str

    @field_validator("password", "confirm")
    @classmethod
    def strong(cls, v):
        return v

    @model_validator(mode="after")
    def check(self):
        return self
"#,
        );
        let validators = &decls[0].validators;
        assert_eq!(validators.len(), 2);
        assert_eq!(validators[0].method, "strong");
        assert_eq!(validators[0].kind, "field");
        assert_eq!(validators[0].fields, vec!["password".to_string(), "confirm".to_string()]);
        assert_eq!(validators[1].kind, "model");
    }
}

//! Normalized type descriptors shared by every fact family.

use std::fmt;

use serde::Serialize;

/// A literal value appearing in `Literal[...]` or an enum member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Str(String),
    Int(i64),
    Bool(bool),
    /// `None`, serialized as JSON null.
    Null,
    /// Anything else, kept as source text (`Color.RED`, `1.5`).
    Other(String),
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Str(s) => write!(f, "{:?}", s),
            LiteralValue::Int(i) => write!(f, "{}", i),
            LiteralValue::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            LiteralValue::Null => write!(f, "None"),
            LiteralValue::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Canonical, language-neutral shape of a type annotation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDescriptor {
    Primitive {
        name: String,
    },
    Optional {
        inner: Box<TypeDescriptor>,
    },
    /// Members in written order, deduplicated.
    Union {
        members: Vec<TypeDescriptor>,
    },
    List {
        element: Box<TypeDescriptor>,
    },
    Dict {
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
    Set {
        element: Box<TypeDescriptor>,
    },
    Tuple {
        elements: Vec<TypeDescriptor>,
        variadic: bool,
    },
    Literal {
        values: Vec<LiteralValue>,
    },
    Callable {
        params: Vec<TypeDescriptor>,
        any_params: bool,
        returns: Box<TypeDescriptor>,
    },
    Generic {
        base: String,
        args: Vec<TypeDescriptor>,
    },
    Reference {
        name: String,
    },
    Unknown,
}

impl TypeDescriptor {
    pub fn primitive(name: &str) -> Self {
        TypeDescriptor::Primitive {
            name: name.to_string(),
        }
    }

    pub fn reference(name: &str) -> Self {
        TypeDescriptor::Reference {
            name: name.to_string(),
        }
    }

    pub fn optional(inner: TypeDescriptor) -> Self {
        if inner.is_optional() {
            return inner;
        }
        TypeDescriptor::Optional {
            inner: Box::new(inner),
        }
    }

    pub fn list(element: TypeDescriptor) -> Self {
        TypeDescriptor::List {
            element: Box::new(element),
        }
    }

    pub fn set(element: TypeDescriptor) -> Self {
        TypeDescriptor::Set {
            element: Box::new(element),
        }
    }

    pub fn dict(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        TypeDescriptor::Dict {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, TypeDescriptor::Unknown)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, TypeDescriptor::Primitive { name } if name == "none")
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, TypeDescriptor::Optional { .. }) || self.is_none()
    }

    /// Strip one `Optional` layer.
    pub fn unwrap_optional(&self) -> &TypeDescriptor {
        match self {
            TypeDescriptor::Optional { inner } => inner,
            other => other,
        }
    }

    /// Name of the referenced class, looking through `Optional`.
    pub fn referenced_name(&self) -> Option<&str> {
        match self.unwrap_optional() {
            TypeDescriptor::Reference { name } => Some(name),
            _ => None,
        }
    }

    /// Whether this is a reference, or a list/set/optional wrapping one.
    pub fn mentions_reference(&self) -> bool {
        match self {
            TypeDescriptor::Reference { .. } => true,
            TypeDescriptor::Optional { inner }
            | TypeDescriptor::List { element: inner }
            | TypeDescriptor::Set { element: inner } => inner.mentions_reference(),
            TypeDescriptor::Union { members } => members.iter().any(|m| m.mentions_reference()),
            _ => false,
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[TypeDescriptor]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Primitive { name } => write!(f, "{}", name),
            TypeDescriptor::Optional { inner } => write!(f, "Optional[{}]", inner),
            TypeDescriptor::Union { members } => {
                write!(f, "Union[")?;
                write_list(f, members)?;
                write!(f, "]")
            }
            TypeDescriptor::List { element } => write!(f, "List[{}]", element),
            TypeDescriptor::Dict { key, value } => write!(f, "Dict[{}, {}]", key, value),
            TypeDescriptor::Set { element } => write!(f, "Set[{}]", element),
            TypeDescriptor::Tuple { elements, variadic } => {
                write!(f, "Tuple[")?;
                write_list(f, elements)?;
                if *variadic {
                    write!(f, ", ...")?;
                }
                write!(f, "]")
            }
            TypeDescriptor::Literal { values } => {
                write!(f, "Literal[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            TypeDescriptor::Callable {
                params,
                any_params,
                returns,
            } => {
                if *any_params {
                    write!(f, "Callable[..., {}]", returns)
                } else {
                    write!(f, "Callable[[")?;
                    write_list(f, params)?;
                    write!(f, "], {}]", returns)
                }
            }
            TypeDescriptor::Generic { base, args } => {
                write!(f, "{}[", base)?;
                write_list(f, args)?;
                write!(f, "]")
            }
            TypeDescriptor::Reference { name } => write!(f, "{}", name),
            TypeDescriptor::Unknown => write!(f, "?"),
        }
    }
}

/// A normalized annotation plus its side channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeInfo {
    pub descriptor: TypeDescriptor,
    /// Display alias: alias or NewType name, or the original spelling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// `Annotated` metadata and qualifiers such as `Final`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<String>,
}

impl TypeInfo {
    pub fn new(descriptor: TypeDescriptor) -> Self {
        Self {
            descriptor,
            alias: None,
            metadata: Vec::new(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(TypeDescriptor::Unknown)
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        if self.alias.is_none() {
            self.alias = Some(alias.into());
        }
        self
    }
}

impl From<TypeDescriptor> for TypeInfo {
    fn from(descriptor: TypeDescriptor) -> Self {
        TypeInfo::new(descriptor)
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor)
    }
}

//! Field and method references, and the resolved operand variant.

use std::fmt;

use crate::metadata::typesig::TypeSig;

/// A field reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Declaring type, possibly a generic instantiation
    pub declaring: TypeSig,
    /// Field name
    pub name: String,
    /// Field type, when known
    pub field_type: Option<TypeSig>,
}

impl FieldRef {
    /// Creates a field reference without a known field type.
    pub fn new(declaring: TypeSig, name: impl Into<String>) -> Self {
        FieldRef {
            declaring,
            name: name.into(),
            field_type: None,
        }
    }

    /// Returns a copy with the field type set.
    #[must_use]
    pub fn with_type(mut self, field_type: TypeSig) -> Self {
        self.field_type = Some(field_type);
        self
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(field_type) = &self.field_type {
            write!(f, "{field_type} ")?;
        }
        write!(f, "{}::{}", self.declaring, self.name)
    }
}

/// A method signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSig {
    /// Instance method (`this` is passed implicitly)
    pub has_this: bool,
    /// Return type
    pub ret: TypeSig,
    /// Parameter types, excluding `this`
    pub params: Vec<TypeSig>,
    /// Number of method generic parameters
    pub generic_param_count: u32,
}

impl MethodSig {
    /// Creates a non-generic static signature.
    #[must_use]
    pub fn new_static(ret: TypeSig, params: Vec<TypeSig>) -> Self {
        MethodSig {
            has_this: false,
            ret,
            params,
            generic_param_count: 0,
        }
    }

    /// Creates a non-generic instance signature.
    #[must_use]
    pub fn new_instance(ret: TypeSig, params: Vec<TypeSig>) -> Self {
        MethodSig {
            has_this: true,
            ret,
            params,
            generic_param_count: 0,
        }
    }
}

/// A method reference, optionally instantiated with generic arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Declaring type, possibly a generic instantiation
    pub declaring: TypeSig,
    /// Method name
    pub name: String,
    /// Signature in terms of the open generic definition
    pub sig: MethodSig,
    /// Method generic arguments, empty unless this is a method instantiation
    pub generic_args: Vec<TypeSig>,
}

impl MethodRef {
    /// Creates a non-instantiated method reference.
    pub fn new(declaring: TypeSig, name: impl Into<String>, sig: MethodSig) -> Self {
        MethodRef {
            declaring,
            name: name.into(),
            sig,
            generic_args: Vec::new(),
        }
    }

    /// Returns `true` for constructors.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor" || self.name == ".cctor"
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.sig.ret, self.declaring, self.name)?;
        if !self.generic_args.is_empty() {
            let args: Vec<String> = self.generic_args.iter().map(TypeSig::full_name).collect();
            write!(f, "<{}>", args.join(","))?;
        }
        let params: Vec<String> = self.sig.params.iter().map(TypeSig::full_name).collect();
        write!(f, "({})", params.join(","))
    }
}

/// A fully resolved operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resolved {
    /// A type
    Type(TypeSig),
    /// A field
    Field(FieldRef),
    /// A method
    Method(MethodRef),
    /// A user string literal
    String(String),
}

impl Resolved {
    /// Short name of the variant for diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Resolved::Type(_) => "type",
            Resolved::Field(_) => "field",
            Resolved::Method(_) => "method",
            Resolved::String(_) => "string",
        }
    }
}

impl fmt::Display for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolved::Type(sig) => write!(f, "{sig}"),
            Resolved::Field(field) => write!(f, "{field}"),
            Resolved::Method(method) => write!(f, "{method}"),
            Resolved::String(value) => write!(f, "{value:?}"),
        }
    }
}

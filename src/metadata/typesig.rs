//! Type signatures and type references.
//!
//! [`TypeSig`] is the shape every reconstructed type takes: corlib primitives are
//! folded into their element types (`System.Int32` becomes [`TypeSig::I4`]), other
//! named types are a [`TypeRef`] wrapped as class or value type, and generic
//! parameters, instantiations, arrays, pointers and by-refs nest around them.
//!
//! # Examples
//!
//! ```rust
//! use eazdevirt::metadata::typesig::{TypeRef, TypeSig};
//!
//! let list = TypeRef::new("System.Collections.Generic", "List`1");
//! let sig = TypeSig::GenericInst {
//!     generic: Box::new(TypeSig::Class(list)),
//!     args: vec![TypeSig::I4],
//! };
//! assert_eq!(sig.full_name(), "System.Collections.Generic.List`1<System.Int32>");
//! assert_eq!(TypeSig::SzArray(Box::new(sig)).full_name(), "System.Collections.Generic.List`1<System.Int32>[]");
//! ```

use std::fmt;

/// Four-part assembly version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Version {
    /// Major component
    pub major: u16,
    /// Minor component
    pub minor: u16,
    /// Build component
    pub build: u16,
    /// Revision component
    pub revision: u16,
}

impl Version {
    /// Creates a new version.
    #[must_use]
    pub fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Version {
            major,
            minor,
            build,
            revision,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// Identity of a referenced assembly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AssemblyIdentity {
    /// Simple name
    pub name: String,
    /// Version, if recorded
    pub version: Option<Version>,
    /// Culture, `None` for neutral
    pub culture: Option<String>,
    /// Public key token, if the assembly is strong named
    pub public_key_token: Option<Vec<u8>>,
}

impl AssemblyIdentity {
    /// Creates an identity with only a simple name.
    pub fn new(name: impl Into<String>) -> Self {
        AssemblyIdentity {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl fmt::Display for AssemblyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(version) = &self.version {
            write!(f, ", Version={version}")?;
        }
        if let Some(culture) = &self.culture {
            write!(f, ", Culture={culture}")?;
        }
        if let Some(token) = &self.public_key_token {
            write!(f, ", PublicKeyToken=")?;
            for byte in token {
                write!(f, "{byte:02x}")?;
            }
        }
        Ok(())
    }
}

/// Where a type reference points to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ResolutionScope {
    /// The module being devirtualized
    #[default]
    Module,
    /// An external assembly
    Assembly(AssemblyIdentity),
}

/// A named type, possibly nested.
///
/// Nested types carry an empty namespace and point to their enclosing type through
/// `declaring`; the scope of a nested type is the scope of its outermost type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Simple name, including a generic arity suffix such as `` `1 ``
    pub name: String,
    /// Enclosing type for nested types
    pub declaring: Option<Box<TypeRef>>,
    /// Defining module or assembly
    pub scope: ResolutionScope,
}

impl TypeRef {
    /// Creates a top-level type reference in the current module.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeRef {
            namespace: namespace.into(),
            name: name.into(),
            declaring: None,
            scope: ResolutionScope::Module,
        }
    }

    /// Creates a type nested in `outer`.
    pub fn nested(outer: TypeRef, name: impl Into<String>) -> Self {
        let scope = outer.scope.clone();
        TypeRef {
            namespace: String::new(),
            name: name.into(),
            declaring: Some(Box::new(outer)),
            scope,
        }
    }

    /// Returns a copy scoped to `scope`, applied through the whole nesting chain.
    #[must_use]
    pub fn with_scope(mut self, scope: ResolutionScope) -> Self {
        if let Some(outer) = self.declaring.take() {
            self.declaring = Some(Box::new(outer.with_scope(scope.clone())));
        }
        self.scope = scope;
        self
    }

    /// Returns the full name with `/` between nesting levels (`Foo.Bar/Inner`).
    #[must_use]
    pub fn full_name(&self) -> String {
        match &self.declaring {
            Some(outer) => format!("{}/{}", outer.full_name(), self.name),
            None if self.namespace.is_empty() => self.name.clone(),
            None => format!("{}.{}", self.namespace, self.name),
        }
    }

    /// Returns the generic arity encoded in the name (`` List`1 `` is 1).
    #[must_use]
    pub fn generic_arity(&self) -> u32 {
        self.name
            .rsplit_once('`')
            .and_then(|(_, arity)| arity.parse().ok())
            .unwrap_or(0)
    }

    /// Returns `true` if the type lives outside the current module.
    #[must_use]
    pub fn is_external(&self) -> bool {
        matches!(self.scope, ResolutionScope::Assembly(_))
    }

    /// Compares two references by name and nesting, ignoring scope.
    #[must_use]
    pub fn same_name(&self, other: &TypeRef) -> bool {
        self.namespace == other.namespace
            && self.name == other.name
            && match (&self.declaring, &other.declaring) {
                (Some(a), Some(b)) => a.same_name(b),
                (None, None) => true,
                _ => false,
            }
    }
}

/// A type signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSig {
    /// `System.Void`
    Void,
    /// `System.Boolean`
    Boolean,
    /// `System.Char`
    Char,
    /// `System.SByte`
    I1,
    /// `System.Byte`
    U1,
    /// `System.Int16`
    I2,
    /// `System.UInt16`
    U2,
    /// `System.Int32`
    I4,
    /// `System.UInt32`
    U4,
    /// `System.Int64`
    I8,
    /// `System.UInt64`
    U8,
    /// `System.Single`
    R4,
    /// `System.Double`
    R8,
    /// `System.IntPtr`
    I,
    /// `System.UIntPtr`
    U,
    /// `System.String`
    String,
    /// `System.Object`
    Object,
    /// `System.TypedReference`
    TypedByRef,
    /// A reference type
    Class(TypeRef),
    /// A value type
    ValueType(TypeRef),
    /// Generic parameter of the declaring type, by index
    Var(u32),
    /// Generic parameter of the method, by index
    MVar(u32),
    /// Generic instantiation
    GenericInst {
        /// The open generic type, `Class` or `ValueType`
        generic: Box<TypeSig>,
        /// Type arguments
        args: Vec<TypeSig>,
    },
    /// Single-dimensional zero-based array (`T[]`)
    SzArray(Box<TypeSig>),
    /// Multi-dimensional array (`T[,]`)
    Array {
        /// Element type
        element: Box<TypeSig>,
        /// Number of dimensions
        rank: u32,
    },
    /// Unmanaged pointer (`T*`)
    Ptr(Box<TypeSig>),
    /// Managed reference (`T&`)
    ByRef(Box<TypeSig>),
}

const CORLIB_PRIMITIVES: &[(&str, TypeSig)] = &[
    ("Void", TypeSig::Void),
    ("Boolean", TypeSig::Boolean),
    ("Char", TypeSig::Char),
    ("SByte", TypeSig::I1),
    ("Byte", TypeSig::U1),
    ("Int16", TypeSig::I2),
    ("UInt16", TypeSig::U2),
    ("Int32", TypeSig::I4),
    ("UInt32", TypeSig::U4),
    ("Int64", TypeSig::I8),
    ("UInt64", TypeSig::U8),
    ("Single", TypeSig::R4),
    ("Double", TypeSig::R8),
    ("IntPtr", TypeSig::I),
    ("UIntPtr", TypeSig::U),
    ("String", TypeSig::String),
    ("Object", TypeSig::Object),
    ("TypedReference", TypeSig::TypedByRef),
];

impl TypeSig {
    /// Returns the element type for a corlib primitive name in namespace `System`.
    #[must_use]
    pub fn primitive(namespace: &str, name: &str) -> Option<TypeSig> {
        if namespace != "System" {
            return None;
        }
        CORLIB_PRIMITIVES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, sig)| sig.clone())
    }

    /// Wraps a type reference as class or value type.
    #[must_use]
    pub fn from_ref(type_ref: TypeRef, is_value_type: bool) -> TypeSig {
        if type_ref.declaring.is_none() {
            if let Some(primitive) = TypeSig::primitive(&type_ref.namespace, &type_ref.name) {
                return primitive;
            }
        }
        if is_value_type {
            TypeSig::ValueType(type_ref)
        } else {
            TypeSig::Class(type_ref)
        }
    }

    /// Returns the named type this signature is built on, looking through generic
    /// instantiations but not through arrays or pointers.
    #[must_use]
    pub fn type_ref(&self) -> Option<&TypeRef> {
        match self {
            TypeSig::Class(r) | TypeSig::ValueType(r) => Some(r),
            TypeSig::GenericInst { generic, .. } => generic.type_ref(),
            _ => None,
        }
    }

    /// Returns the generic arguments of an instantiation, empty otherwise.
    #[must_use]
    pub fn generic_args(&self) -> &[TypeSig] {
        match self {
            TypeSig::GenericInst { args, .. } => args,
            _ => &[],
        }
    }

    /// Compares two signatures, treating generic parameters and instantiations on
    /// either side as wildcards.
    #[must_use]
    pub fn compatible_with(&self, other: &TypeSig) -> bool {
        match (self, other) {
            (TypeSig::Var(_) | TypeSig::MVar(_) | TypeSig::GenericInst { .. }, _) => true,
            (_, TypeSig::Var(_) | TypeSig::MVar(_) | TypeSig::GenericInst { .. }) => true,
            (TypeSig::SzArray(a), TypeSig::SzArray(b))
            | (TypeSig::Ptr(a), TypeSig::Ptr(b))
            | (TypeSig::ByRef(a), TypeSig::ByRef(b)) => a.compatible_with(b),
            (
                TypeSig::Array {
                    element: a,
                    rank: ra,
                },
                TypeSig::Array {
                    element: b,
                    rank: rb,
                },
            ) => ra == rb && a.compatible_with(b),
            (
                TypeSig::Class(a) | TypeSig::ValueType(a),
                TypeSig::Class(b) | TypeSig::ValueType(b),
            ) => a.same_name(b),

            _ => self == other,
        }
    }

    /// Returns the display name, e.g. `System.Int32`, `Foo.Bar[]` or `!!0`.
    #[must_use]
    pub fn full_name(&self) -> String {
        if let Some((name, _)) = CORLIB_PRIMITIVES.iter().find(|(_, sig)| sig == self) {
            return format!("System.{name}");
        }
        match self {
            TypeSig::Class(r) | TypeSig::ValueType(r) => r.full_name(),
            TypeSig::Var(index) => format!("!{index}"),
            TypeSig::MVar(index) => format!("!!{index}"),
            TypeSig::GenericInst { generic, args } => {
                let args: Vec<String> = args.iter().map(TypeSig::full_name).collect();
                format!("{}<{}>", generic.full_name(), args.join(","))
            }
            TypeSig::SzArray(inner) => format!("{}[]", inner.full_name()),
            TypeSig::Array { element, rank } => {
                format!("{}[{}]", element.full_name(), ",".repeat(rank.saturating_sub(1) as usize))
            }
            TypeSig::Ptr(inner) => format!("{}*", inner.full_name()),
            TypeSig::ByRef(inner) => format!("{}&", inner.full_name()),
            _ => String::new(),
        }
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

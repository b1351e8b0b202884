//! The seam to the metadata library that owns the module being devirtualized.
//!
//! Loading, writing and token lookup of .NET assemblies is not done by this crate.
//! Everything the engine needs from the target module goes through
//! [`MetadataHost`]: token lookup, type definitions with their fields and methods,
//! already-imported member references, bodies of the unvirtualized interpreter
//! methods, and finally the replacement of virtualized bodies.
//!
//! [`crate::metadata::ModuleModel`] is an in-memory implementation.

use crate::{
    assembly::{Instruction, MethodBody},
    metadata::{FieldRef, MethodRef, MethodSig, Resolved, Token, TypeRef, TypeSig},
    Result,
};

/// A field declared by a type known to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefInfo {
    /// Field token
    pub token: Token,
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: TypeSig,
    /// Static field
    pub is_static: bool,
}

/// A method declared by a type known to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDefInfo {
    /// Method token
    pub token: Token,
    /// Method name
    pub name: String,
    /// Declared signature, generic parameters as [`TypeSig::Var`]/[`TypeSig::MVar`]
    pub sig: MethodSig,
}

/// A type definition known to the host.
///
/// `external` is set for types defined in referenced assemblies that the host was
/// able to load; those can be searched for members like internal types, but any
/// member found must be imported before use.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefInfo {
    /// The type, scoped to its defining module or assembly
    pub type_ref: TypeRef,
    /// Value type
    pub is_value_type: bool,
    /// Defined outside the module being devirtualized
    pub external: bool,
    /// Number of generic parameters
    pub generic_param_count: u32,
    /// Declared fields
    pub fields: Vec<FieldDefInfo>,
    /// Declared methods
    pub methods: Vec<MethodDefInfo>,
}

impl TypeDefInfo {
    /// Creates an empty internal reference type definition.
    #[must_use]
    pub fn new(type_ref: TypeRef) -> Self {
        TypeDefInfo {
            generic_param_count: type_ref.generic_arity(),
            type_ref,
            is_value_type: false,
            external: false,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Returns the signature of the open type.
    #[must_use]
    pub fn sig(&self) -> TypeSig {
        TypeSig::from_ref(self.type_ref.clone(), self.is_value_type)
    }

    /// Finds a declared field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDefInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Access to the destination module.
///
/// All methods take `&self`; implementations that record imports or replaced
/// bodies use interior mutability. Implementations must be `Send + Sync` because
/// handler classification may run on a thread pool.
pub trait MetadataHost: Send + Sync {
    /// Resolves a token of the destination module.
    fn lookup_token(&self, token: Token) -> Option<Resolved>;

    /// Finds a type definition by name, ignoring the scope of `type_ref`.
    fn find_type(&self, type_ref: &TypeRef) -> Option<TypeDefInfo>;

    /// Returns the member references already imported into the module.
    fn imported_methods(&self) -> Vec<MethodRef>;

    /// Returns the field references already imported into the module.
    fn imported_fields(&self) -> Vec<FieldRef>;

    /// Imports a method reference into the module.
    ///
    /// # Errors
    /// Returns an error if the host cannot represent the reference.
    fn import_method(&self, method: &MethodRef) -> Result<()>;

    /// Imports a field reference into the module.
    ///
    /// # Errors
    /// Returns an error if the host cannot represent the reference.
    fn import_field(&self, field: &FieldRef) -> Result<()>;

    /// Returns the CIL body of a method defined in the module.
    fn method_body(&self, token: Token) -> Option<Vec<Instruction>>;

    /// Returns the definition token of a method of the module.
    fn method_token(&self, method: &MethodRef) -> Option<Token>;

    /// Replaces the body of a method wholesale.
    ///
    /// # Errors
    /// Returns an error if `token` is not a method of the module.
    fn replace_body(&self, token: Token, body: MethodBody) -> Result<()>;

    /// Returns `true` if the named type is a known value type.
    fn is_value_type(&self, type_ref: &TypeRef) -> bool {
        self.find_type(type_ref).is_some_and(|def| def.is_value_type)
    }

    /// Returns the body of the method called by `method`, if it is defined in the
    /// module.
    fn callee_body(&self, method: &MethodRef) -> Option<Vec<Instruction>> {
        self.method_token(method)
            .and_then(|token| self.method_body(token))
    }
}

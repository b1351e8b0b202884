//! In-memory module model implementing [`MetadataHost`].
//!
//! [`ModuleModel`] holds everything the engine asks of a destination module: types
//! with their members, method bodies, a token table, imported member references and
//! replaced bodies. Front-ends that bridge a real metadata library populate it once
//! and read the replaced bodies back after a run; the test suite builds protected
//! modules with it.
//!
//! # Examples
//!
//! ```rust
//! use eazdevirt::assembly::{Instruction, OpCode};
//! use eazdevirt::metadata::{MetadataHost, MethodRef, MethodSig, ModuleModel, TypeDefInfo, TypeRef, TypeSig};
//!
//! let mut module = ModuleModel::new("Target.dll");
//! let program = TypeRef::new("App", "Program");
//! module.add_type(TypeDefInfo::new(program.clone()));
//!
//! let main = MethodRef::new(
//!     TypeSig::Class(program),
//!     "Main",
//!     MethodSig::new_static(TypeSig::Void, vec![]),
//! );
//! let token = module.define_method(main.clone(), vec![Instruction::new(OpCode::Ret)]);
//!
//! assert_eq!(module.method_token(&main), Some(token));
//! assert_eq!(module.method_body(token).unwrap().len(), 1);
//! ```

use std::{collections::HashMap, sync::RwLock};

use crate::{
    assembly::{Instruction, MethodBody},
    metadata::{
        FieldDefInfo, FieldRef, MetadataHost, MethodDefInfo, MethodRef, Resolved, Token,
        TypeDefInfo, TypeRef, TypeSig,
    },
    Result,
};

const TABLE_TYPEDEF: u32 = 0x0200_0000;
const TABLE_FIELD: u32 = 0x0400_0000;
const TABLE_METHODDEF: u32 = 0x0600_0000;
const TABLE_USERSTRING: u32 = 0x7000_0000;

/// An in-memory destination module.
#[derive(Debug, Default)]
pub struct ModuleModel {
    name: String,
    types: Vec<TypeDefInfo>,
    tokens: HashMap<Token, Resolved>,
    method_tokens: HashMap<MethodRef, Token>,
    bodies: HashMap<Token, Vec<Instruction>>,
    next_row: HashMap<u32, u32>,
    imported_methods: RwLock<Vec<MethodRef>>,
    imported_fields: RwLock<Vec<FieldRef>>,
    replaced: RwLock<HashMap<Token, MethodBody>>,
}

impl ModuleModel {
    /// Creates an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        ModuleModel {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Returns the module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&mut self, table: u32) -> Token {
        let row = self.next_row.entry(table).or_insert(0);
        *row += 1;
        Token(table | *row)
    }

    /// Adds a type definition and returns its token.
    ///
    /// Fields and methods already listed on `def` keep their tokens and are
    /// registered in the token table.
    pub fn add_type(&mut self, def: TypeDefInfo) -> Token {
        let token = self.allocate(TABLE_TYPEDEF);
        let sig = def.sig();
        for field in &def.fields {
            let field_ref = FieldRef::new(sig.clone(), field.name.clone())
                .with_type(field.field_type.clone());
            self.tokens.insert(field.token, Resolved::Field(field_ref));
        }
        for method in &def.methods {
            let method_ref = MethodRef::new(sig.clone(), method.name.clone(), method.sig.clone());
            self.tokens
                .insert(method.token, Resolved::Method(method_ref.clone()));
            self.method_tokens.insert(method_ref, method.token);
        }
        self.tokens.insert(token, Resolved::Type(sig));
        self.types.push(def);
        token
    }

    /// Defines a method with a body.
    ///
    /// If the declaring type of `method` was added before, the method is also listed
    /// among its declared methods.
    pub fn define_method(&mut self, method: MethodRef, body: Vec<Instruction>) -> Token {
        let token = self.allocate(TABLE_METHODDEF);
        if let Some(def) = method
            .declaring
            .type_ref()
            .and_then(|declaring| self.types.iter_mut().find(|t| t.type_ref.same_name(declaring)))
        {
            def.methods.push(MethodDefInfo {
                token,
                name: method.name.clone(),
                sig: method.sig.clone(),
            });
        }
        self.tokens.insert(token, Resolved::Method(method.clone()));
        self.method_tokens.insert(method, token);
        self.bodies.insert(token, body);
        token
    }

    /// Defines a field on a previously added type.
    pub fn define_field(
        &mut self,
        declaring: &TypeRef,
        name: impl Into<String>,
        field_type: TypeSig,
        is_static: bool,
    ) -> FieldRef {
        let token = self.allocate(TABLE_FIELD);
        let name = name.into();
        let mut declaring_sig = TypeSig::Class(declaring.clone());
        if let Some(def) = self
            .types
            .iter_mut()
            .find(|t| t.type_ref.same_name(declaring))
        {
            declaring_sig = def.sig();
            def.fields.push(FieldDefInfo {
                token,
                name: name.clone(),
                field_type: field_type.clone(),
                is_static,
            });
        }
        let field = FieldRef::new(declaring_sig, name).with_type(field_type);
        self.tokens.insert(token, Resolved::Field(field.clone()));
        field
    }

    /// Adds a user string and returns its token.
    pub fn add_user_string(&mut self, value: impl Into<String>) -> Token {
        let token = self.allocate(TABLE_USERSTRING);
        self.tokens.insert(token, Resolved::String(value.into()));
        token
    }

    /// Registers an arbitrary token, e.g. a `TypeRef` or `MemberRef` row.
    pub fn add_token(&mut self, token: Token, resolved: Resolved) {
        if let Resolved::Method(method) = &resolved {
            self.method_tokens.insert(method.clone(), token);
        }
        self.tokens.insert(token, resolved);
    }

    /// Returns the body that replaced the method `token`, if any.
    #[must_use]
    pub fn replaced_body(&self, token: Token) -> Option<MethodBody> {
        read_lock!(self.replaced)
            .ok()
            .and_then(|replaced| replaced.get(&token).cloned())
    }

    /// Returns the number of replaced bodies.
    #[must_use]
    pub fn replaced_count(&self) -> usize {
        read_lock!(self.replaced).map(|r| r.len()).unwrap_or(0)
    }
}

impl MetadataHost for ModuleModel {
    fn lookup_token(&self, token: Token) -> Option<Resolved> {
        self.tokens.get(&token).cloned()
    }

    fn find_type(&self, type_ref: &TypeRef) -> Option<TypeDefInfo> {
        self.types
            .iter()
            .find(|def| def.type_ref.same_name(type_ref))
            .cloned()
    }

    fn imported_methods(&self) -> Vec<MethodRef> {
        read_lock!(self.imported_methods)
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    fn imported_fields(&self) -> Vec<FieldRef> {
        read_lock!(self.imported_fields)
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    fn import_method(&self, method: &MethodRef) -> Result<()> {
        let mut imported = write_lock!(self.imported_methods)?;
        if !imported.contains(method) {
            imported.push(method.clone());
        }
        Ok(())
    }

    fn import_field(&self, field: &FieldRef) -> Result<()> {
        let mut imported = write_lock!(self.imported_fields)?;
        if !imported.contains(field) {
            imported.push(field.clone());
        }
        Ok(())
    }

    fn method_body(&self, token: Token) -> Option<Vec<Instruction>> {
        self.bodies.get(&token).cloned()
    }

    fn method_token(&self, method: &MethodRef) -> Option<Token> {
        self.method_tokens.get(method).copied()
    }

    fn replace_body(&self, token: Token, body: MethodBody) -> Result<()> {
        if !self.bodies.contains_key(&token) {
            return Err(malformed_error!("Method {} is not defined in {}", token, self.name));
        }
        write_lock!(self.replaced)?.insert(token, body);
        Ok(())
    }
}

//! Resolution of operand records into destination-module references.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use log::{debug, trace};

use crate::{
    crypto::{CounterSeed, LayeredStream, ProgramStream},
    decoder::{PrimitiveReader, ProfileKind, ScrambledProfiles},
    metadata::{FieldRef, MetadataHost, MethodRef, MethodSig, Resolved, TypeDefInfo, TypeSig},
    resolver::{
        operand::{EazCallRecord, FieldRecord, MethodRecord, OperandRecord, TypeRecord},
        typename::TypeName,
    },
    vm::OperandLayout,
    Error, Result,
};

/// Default bound on nested record references.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Resolves operand positions of the resolver stream.
///
/// Every lookup seeks before it reads, so the stream holds no state between
/// calls; the cursor sits behind a mutex to make seek and read one step. Results
/// are memoised per position, including absent ones, which makes resolution
/// idempotent and lets several methods share one resolver.
///
/// A resolution that fails to find a type or member yields `Ok(None)`. Errors
/// are reserved for malformed records, I/O failures and runaway nesting.
pub struct Resolver<'a> {
    host: &'a dyn MetadataHost,
    stream: Mutex<PrimitiveReader<ProgramStream>>,
    layout: OperandLayout,
    max_depth: usize,
    cache: DashMap<u32, Option<Resolved>>,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over `stream`.
    ///
    /// # Errors
    /// Returns an error if a cursor cannot be created on the stream.
    pub fn new(
        host: &'a dyn MetadataHost,
        stream: &LayeredStream,
        profiles: Arc<ScrambledProfiles>,
        seed: CounterSeed,
        layout: OperandLayout,
    ) -> Result<Self> {
        let mut reader = PrimitiveReader::new(stream.cursor(seed)?, profiles);
        reader.set_profile(ProfileKind::General);
        Ok(Resolver {
            host,
            stream: Mutex::new(reader),
            layout,
            max_depth: DEFAULT_MAX_DEPTH,
            cache: DashMap::new(),
        })
    }

    /// Sets the bound on nested record references.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Returns the operand layout records are read with.
    #[must_use]
    pub fn layout(&self) -> OperandLayout {
        self.layout
    }

    /// Returns the number of memoised positions.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Reads the raw record at `position`.
    ///
    /// # Errors
    /// Returns an error if the record is malformed or runs past the stream.
    pub fn read_record(&self, position: u32) -> Result<OperandRecord> {
        let mut reader = lock!(self.stream)?;
        reader.seek(u64::from(position))?;
        OperandRecord::read(&mut reader, self.layout)
    }

    /// Resolves the record at `position`.
    ///
    /// # Errors
    /// Returns an error for malformed records or when nesting exceeds the depth
    /// bound.
    pub fn resolve(&self, position: u32) -> Result<Option<Resolved>> {
        self.resolve_at(position as i32, 0)
    }

    /// Resolves a type position; negative positions are absent.
    ///
    /// # Errors
    /// See [`Resolver::resolve`].
    pub fn resolve_type(&self, position: i32) -> Result<Option<TypeSig>> {
        self.type_at(position, 0)
    }

    /// Resolves a field position.
    ///
    /// # Errors
    /// See [`Resolver::resolve`].
    pub fn resolve_field(&self, position: u32) -> Result<Option<FieldRef>> {
        Ok(match self.resolve(position)? {
            Some(Resolved::Field(field)) => Some(field),
            _ => None,
        })
    }

    /// Resolves a method position.
    ///
    /// # Errors
    /// See [`Resolver::resolve`].
    pub fn resolve_method(&self, position: u32) -> Result<Option<MethodRef>> {
        self.method_at(position as i32, 0)
    }

    /// Resolves the target of an inlined call and whether it dispatches
    /// virtually.
    ///
    /// The position may hold a packed call record or a plain method record, in
    /// which case the record's own virtual flag decides.
    ///
    /// # Errors
    /// See [`Resolver::resolve`].
    pub fn resolve_call(&self, position: u32) -> Result<Option<(MethodRef, bool)>> {
        match self.read_record(position)? {
            OperandRecord::EazCall(call) => self.eaz_call(&call, 0),
            OperandRecord::Method(record) => Ok(self
                .resolve_method(position)?
                .map(|method| (method, record.is_virtual()))),
            other => {
                debug!("Call operand at 0x{:x} is a {} record", position, other.kind());
                Ok(None)
            }
        }
    }

    fn resolve_at(&self, position: i32, depth: usize) -> Result<Option<Resolved>> {
        if depth > self.max_depth {
            return Err(Error::RecursionLimit(self.max_depth));
        }
        let Ok(key) = u32::try_from(position) else {
            return Ok(None);
        };
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }

        let record = self.read_record(key)?;
        let resolved = self.resolve_record(&record, depth)?;
        match &resolved {
            Some(value) => {
                trace!("Operand 0x{:x} resolved to {} {}", key, value.kind_name(), value)
            }
            None => debug!("Operand 0x{:x} ({} record) did not resolve", key, record.kind()),
        }
        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    fn resolve_record(&self, record: &OperandRecord, depth: usize) -> Result<Option<Resolved>> {
        if let Some(hinted) = record.token_hint().and_then(|token| self.host.lookup_token(token)) {
            let same_kind = matches!(
                (record, &hinted),
                (OperandRecord::Type(_), Resolved::Type(_))
                    | (OperandRecord::Field(_), Resolved::Field(_))
                    | (OperandRecord::Method(_), Resolved::Method(_))
            );
            if same_kind {
                return Ok(Some(hinted));
            }
        }

        Ok(match record {
            OperandRecord::Token(token) => self.host.lookup_token(*token),
            OperandRecord::UserString(value) => Some(Resolved::String(value.clone())),
            OperandRecord::Type(r) => self.type_record(r, depth)?.map(Resolved::Type),
            OperandRecord::Field(r) => self.field_record(r, depth)?.map(Resolved::Field),
            OperandRecord::Method(r) => self.method_record(r, depth)?.map(Resolved::Method),
            OperandRecord::EazCall(r) => self
                .eaz_call(r, depth)?
                .map(|(method, _)| Resolved::Method(method)),
        })
    }

    fn type_at(&self, position: i32, depth: usize) -> Result<Option<TypeSig>> {
        Ok(match self.resolve_at(position, depth)? {
            Some(Resolved::Type(sig)) => Some(sig),
            _ => None,
        })
    }

    fn method_at(&self, position: i32, depth: usize) -> Result<Option<MethodRef>> {
        Ok(match self.resolve_at(position, depth)? {
            Some(Resolved::Method(method)) => Some(method),
            _ => None,
        })
    }

    fn types_at(&self, positions: &[i32], depth: usize) -> Result<Option<Vec<TypeSig>>> {
        let mut types = Vec::with_capacity(positions.len());
        for &position in positions {
            match self.type_at(position, depth)? {
                Some(sig) => types.push(sig),
                None => return Ok(None),
            }
        }
        Ok(Some(types))
    }

    fn type_record(&self, record: &TypeRecord, depth: usize) -> Result<Option<TypeSig>> {
        if let Some(param) = record.generic_param {
            return Ok(Some(if param.on_method {
                TypeSig::MVar(param.index)
            } else {
                TypeSig::Var(param.index)
            }));
        }

        let name = TypeName::parse(&record.name)?;
        let Some(args) = self.types_at(&record.generic_args, depth + 1)? else {
            return Ok(None);
        };
        self.named_type(&name, args, depth).map(Some)
    }

    /// Builds the signature of a parsed name; arguments spelled in the name are
    /// used when the record lists none.
    fn named_type(&self, name: &TypeName, mut args: Vec<TypeSig>, depth: usize) -> Result<TypeSig> {
        if depth > self.max_depth {
            return Err(Error::RecursionLimit(self.max_depth));
        }
        if args.is_empty() {
            for arg in &name.generic_args {
                args.push(self.named_type(arg, Vec::new(), depth + 1)?);
            }
        }

        let parsed = name.type_ref();
        let (type_ref, is_value_type) = match self.host.find_type(&parsed) {
            Some(def) => (def.type_ref, def.is_value_type),
            None => {
                let value_type = self.host.is_value_type(&parsed);
                (parsed, value_type)
            }
        };

        let mut sig = TypeSig::from_ref(type_ref, is_value_type);
        if !args.is_empty() {
            sig = TypeSig::GenericInst {
                generic: Box::new(sig),
                args,
            };
        }
        Ok(name.apply_modifiers(sig))
    }

    fn field_record(&self, record: &FieldRecord, depth: usize) -> Result<Option<FieldRef>> {
        let Some(declaring) = self.type_at(record.declaring, depth + 1)? else {
            return Ok(None);
        };
        let Some(declaring_ref) = declaring.type_ref() else {
            return Ok(None);
        };

        match self.host.find_type(declaring_ref) {
            Some(def) => {
                let Some(field) = def.field(&record.name) else {
                    return Ok(None);
                };
                let field = FieldRef::new(declaring.clone(), record.name.clone())
                    .with_type(field.field_type.clone());
                if def.external {
                    self.host.import_field(&field)?;
                }
                Ok(Some(field))
            }
            None => Ok(self.host.imported_fields().into_iter().find(|field| {
                field.name == record.name && same_declaring(&field.declaring, &declaring)
            })),
        }
    }

    fn method_record(&self, record: &MethodRecord, depth: usize) -> Result<Option<MethodRef>> {
        let next = depth + 1;
        let Some(declaring) = self.type_at(record.declaring, next)? else {
            return Ok(None);
        };
        let Some(ret) = self.type_at(record.return_type, next)? else {
            return Ok(None);
        };
        let Some(params) = self.types_at(&record.params, next)? else {
            return Ok(None);
        };
        let Some(generic_args) = self.types_at(&record.generic_args, next)? else {
            return Ok(None);
        };

        let query = MethodQuery {
            declaring: &declaring,
            name: &record.name,
            is_static: record.is_static(),
            ret: &ret,
            params: &params,
            generic_count: generic_args.len(),
        };
        let def = declaring.type_ref().and_then(|t| self.host.find_type(t));
        let internal = def.as_ref().is_some_and(|d| !d.external);

        let found = if internal {
            def.as_ref().and_then(|d| query.find_declared(d))
        } else {
            query
                .find_imported(&self.host.imported_methods())
                .or_else(|| def.as_ref().and_then(|d| query.find_declared(d)))
        };

        let method = match found {
            Some(sig) => MethodRef {
                declaring: declaring.clone(),
                name: record.name.clone(),
                sig,
                generic_args,
            },
            None => {
                debug!(
                    "No method {} on {} matches the record, synthesizing",
                    record.name, declaring
                );
                query.synthesize(generic_args)
            }
        };

        if !internal {
            self.host.import_method(&method)?;
        }
        Ok(Some(method))
    }

    fn eaz_call(&self, record: &EazCallRecord, depth: usize) -> Result<Option<(MethodRef, bool)>> {
        let Some(mut method) = self.method_at(record.method, depth + 1)? else {
            return Ok(None);
        };
        if !record.generic_args.is_empty() {
            let Some(args) = self.types_at(&record.generic_args, depth + 1)? else {
                return Ok(None);
            };
            if args != method.generic_args {
                let type_args = method.declaring.generic_args();
                method.sig = MethodSig {
                    has_this: method.sig.has_this,
                    ret: generalize(&method.sig.ret, &args, type_args),
                    params: method
                        .sig
                        .params
                        .iter()
                        .map(|param| generalize(param, &args, type_args))
                        .collect(),
                    generic_param_count: args.len() as u32,
                };
                method.generic_args = args;
            }
        }
        Ok(Some((method, record.virtual_call)))
    }
}

impl std::fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("layout", &self.layout)
            .field("max_depth", &self.max_depth)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

fn same_declaring(a: &TypeSig, b: &TypeSig) -> bool {
    match (a.type_ref(), b.type_ref()) {
        (Some(x), Some(y)) => x.same_name(y),
        _ => a == b,
    }
}

struct MethodQuery<'q> {
    declaring: &'q TypeSig,
    name: &'q str,
    is_static: bool,
    ret: &'q TypeSig,
    params: &'q [TypeSig],
    generic_count: usize,
}

impl MethodQuery<'_> {
    fn params_match(&self, declared: &[TypeSig]) -> bool {
        let recorded = if !self.is_static
            && self.params.len() == declared.len() + 1
            && self.params[0].compatible_with(self.declaring)
        {
            // instance calls may record `this` as a leading parameter
            &self.params[1..]
        } else {
            self.params
        };
        recorded.len() == declared.len()
            && recorded
                .iter()
                .zip(declared)
                .all(|(a, b)| a.compatible_with(b))
    }

    fn matches(&self, name: &str, sig: &MethodSig) -> bool {
        name == self.name
            && sig.has_this != self.is_static
            && sig.generic_param_count as usize == self.generic_count
            && sig.ret.compatible_with(self.ret)
            && self.params_match(&sig.params)
    }

    fn find_imported(&self, imported: &[MethodRef]) -> Option<MethodSig> {
        imported
            .iter()
            .find(|m| same_declaring(&m.declaring, self.declaring) && self.matches(&m.name, &m.sig))
            .map(|m| m.sig.clone())
    }

    fn find_declared(&self, def: &TypeDefInfo) -> Option<MethodSig> {
        def.methods
            .iter()
            .find(|m| self.matches(&m.name, &m.sig))
            .map(|m| m.sig.clone())
    }

    /// Builds a reference from the recorded types, turning types equal to a
    /// generic argument back into the generic parameter they instantiate.
    fn synthesize(&self, generic_args: Vec<TypeSig>) -> MethodRef {
        let type_args = self.declaring.generic_args();
        let generalize = |sig: &TypeSig| generalize(sig, &generic_args, type_args);
        let sig = MethodSig {
            has_this: !self.is_static,
            ret: generalize(self.ret),
            params: self.params.iter().map(generalize).collect(),
            generic_param_count: generic_args.len() as u32,
        };
        MethodRef {
            declaring: self.declaring.clone(),
            name: self.name.to_string(),
            sig,
            generic_args,
        }
    }
}

fn generalize(sig: &TypeSig, method_args: &[TypeSig], type_args: &[TypeSig]) -> TypeSig {
    if let Some(index) = method_args.iter().position(|a| a == sig) {
        return TypeSig::MVar(index as u32);
    }
    if let Some(index) = type_args.iter().position(|a| a == sig) {
        return TypeSig::Var(index as u32);
    }
    let inner = |s: &TypeSig| Box::new(generalize(s, method_args, type_args));
    match sig {
        TypeSig::GenericInst { generic, args } => TypeSig::GenericInst {
            generic: generic.clone(),
            args: args
                .iter()
                .map(|a| generalize(a, method_args, type_args))
                .collect(),
        },
        TypeSig::SzArray(element) => TypeSig::SzArray(inner(element)),
        TypeSig::Ptr(element) => TypeSig::Ptr(inner(element)),
        TypeSig::ByRef(element) => TypeSig::ByRef(inner(element)),
        TypeSig::Array { element, rank } => TypeSig::Array {
            element: inner(element),
            rank: *rank,
        },
        other => other.clone(),
    }
}

//! The devirtualization pipeline.
//!
//! A run has two phases. Bootstrap turns the [`Bootstrap`] description of the
//! interpreter into everything decoding needs: byte permutations, record layouts,
//! the opcode catalog and opened program streams. Any failure there aborts the
//! run with [`Error::Bootstrap`]. Afterwards every virtualized method goes
//! through the per-method state machine ([`DevirtState`]); failures are caught
//! per method and only affect that method's [`MethodReport`].

use std::{
    collections::HashMap,
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use crate::{
    assembly::MethodBody,
    crypto::{LayeredStream, StreamSpec},
    decoder::{PrimitiveReader, ProfileKind, ProfileSource, ScrambledProfiles},
    devirt::{
        config::{CounterMode, DevirtConfig, OutputOptions},
        decode::{DecodedBody, InstructionDecoder},
        fixup::{fix_branches, fix_exception_handlers},
        method::{MethodHeader, PositionKey, RawExceptionHandler, RecoveryStatus, VirtualMethod},
        state::{DevirtState, StateTracker},
    },
    metadata::{MetadataHost, Token, TypeSig},
    pattern::InterpreterAnchors,
    resolver::Resolver,
    vm::{HandlerEntry, LayoutSource, OpcodeCatalog, RecordLayout},
    Error, FailureKind, Result,
};

/// A virtualized method as found in the destination module: its stub token and
/// the key string the stub passes to the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualizedStub {
    /// Stub method
    pub token: Token,
    /// Encrypted position key
    pub key: String,
}

impl VirtualizedStub {
    /// Creates a stub entry.
    pub fn new(token: Token, key: impl Into<String>) -> Self {
        VirtualizedStub {
            token,
            key: key.into(),
        }
    }
}

/// Interpreter structure located in the protected module.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    /// Resource holding the operand records
    pub resolver_stream: StreamSpec,
    /// Resource holding the method records
    pub method_stream: StreamSpec,
    /// The interpreter's handler table
    pub handlers: Vec<HandlerEntry>,
    /// Interpreter members handler signatures refer to
    pub anchors: InterpreterAnchors,
    /// Byte order of headers and records
    pub general: ProfileSource,
    /// Byte order of instruction streams
    pub instruction: ProfileSource,
    /// Header and operand record layout
    pub layout: LayoutSource,
    /// Mask applied to both halves of position keys
    pub position_mask: u32,
    /// Methods to devirtualize
    pub methods: Vec<VirtualizedStub>,
}

/// Outcome of one method.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodReport {
    /// Stub method
    pub token: Token,
    /// Method name from the header, if it was read
    pub name: Option<String>,
    /// Recovery status
    pub status: RecoveryStatus,
    /// Final state
    pub state: DevirtState,
    /// Classification of the failure, if any
    pub failure: Option<FailureKind>,
    /// Failure or stop description
    pub message: Option<String>,
    /// Recovered instruction count
    pub instructions: usize,
    /// Placeholder count
    pub placeholders: usize,
    /// The body was written back to the host
    pub spliced: bool,
}

impl fmt::Display for MethodReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.token)?;
        if let Some(name) = &self.name {
            write!(f, "{name} ")?;
        }
        write!(f, "{} ({} instructions", self.status, self.instructions)?;
        if self.placeholders > 0 {
            write!(f, ", {} placeholders", self.placeholders)?;
        }
        f.write_str(")")?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DevirtReport {
    /// Per-method outcomes, in input order
    pub methods: Vec<MethodReport>,
    /// Handler table size
    pub opcodes: usize,
    /// Identified handlers
    pub identified: usize,
    /// Wall time of the run
    pub total_time: Duration,
}

impl DevirtReport {
    fn count(&self, status: RecoveryStatus) -> usize {
        self.methods.iter().filter(|m| m.status == status).count()
    }

    /// Fully recovered methods.
    #[must_use]
    pub fn full_count(&self) -> usize {
        self.count(RecoveryStatus::Full)
    }

    /// Degraded methods.
    #[must_use]
    pub fn degraded_count(&self) -> usize {
        self.count(RecoveryStatus::Degraded)
    }

    /// Unrecoverable methods.
    #[must_use]
    pub fn unrecoverable_count(&self) -> usize {
        self.count(RecoveryStatus::Unrecoverable)
    }

    /// Methods whose body was written back.
    #[must_use]
    pub fn spliced_count(&self) -> usize {
        self.methods.iter().filter(|m| m.spliced).count()
    }

    /// Returns `true` if every method was fully recovered.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.methods.iter().all(|m| m.status == RecoveryStatus::Full)
    }

    /// Counts failures per kind.
    #[must_use]
    pub fn failures(&self) -> HashMap<FailureKind, usize> {
        let mut counts = HashMap::new();
        for kind in self.methods.iter().filter_map(|m| m.failure) {
            *counts.entry(kind).or_insert(0) += 1;
        }
        counts
    }

    /// Returns the report of `token`.
    #[must_use]
    pub fn method(&self, token: Token) -> Option<&MethodReport> {
        self.methods.iter().find(|m| m.token == token)
    }

    /// Decides whether a front-end should write the output assembly.
    ///
    /// Complete runs are always saved. Otherwise the output is written when
    /// failures are accepted (`save_anyway`) or when only fully recovered bodies
    /// were spliced (`only_recovered`).
    #[must_use]
    pub fn should_save(&self, options: &OutputOptions) -> bool {
        self.is_complete() || options.save_anyway || options.only_recovered
    }

    /// One-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} methods: {} recovered, {} degraded, {} unrecoverable; \
             {} of {} opcodes identified in {:.2?}",
            self.methods.len(),
            self.full_count(),
            self.degraded_count(),
            self.unrecoverable_count(),
            self.identified,
            self.opcodes,
            self.total_time
        )
    }
}

/// Everything derived from [`Bootstrap`].
struct Prepared<'a> {
    profiles: Arc<ScrambledProfiles>,
    layout: RecordLayout,
    catalog: OpcodeCatalog,
    resolver_stream: LayeredStream,
    method_stream: LayeredStream,
    shared_resolver: Option<Resolver<'a>>,
    position_mask: u32,
}

/// Runs devirtualization against a host module.
///
/// # Examples
///
/// ```rust,ignore
/// use eazdevirt::devirt::{DevirtConfig, Devirtualizer};
///
/// let config = DevirtConfig::lenient().with_password("0x06000012:hunter2".parse()?);
/// let report = Devirtualizer::new(&module, config).run(&bootstrap)?;
/// println!("{}", report.summary());
/// ```
pub struct Devirtualizer<'a> {
    host: &'a dyn MetadataHost,
    config: DevirtConfig,
}

impl<'a> Devirtualizer<'a> {
    /// Creates a devirtualizer writing into `host`.
    #[must_use]
    pub fn new(host: &'a dyn MetadataHost, config: DevirtConfig) -> Self {
        Devirtualizer { host, config }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &DevirtConfig {
        &self.config
    }

    /// Devirtualizes every method of `bootstrap`.
    ///
    /// # Errors
    /// Returns [`Error::Bootstrap`] if the interpreter description cannot be
    /// turned into decoding inputs. Method failures are reported, not returned.
    pub fn run(&self, bootstrap: &Bootstrap) -> Result<DevirtReport> {
        let started = Instant::now();
        let prepared = self.prepare(bootstrap)?;

        let methods: Vec<MethodReport> = bootstrap
            .methods
            .iter()
            .map(|stub| self.devirtualize(&prepared, stub))
            .collect();

        let report = DevirtReport {
            methods,
            opcodes: prepared.catalog.len(),
            identified: prepared.catalog.identified_count(),
            total_time: started.elapsed(),
        };
        info!("{}", report.summary());
        Ok(report)
    }

    fn prepare(&self, bootstrap: &Bootstrap) -> Result<Prepared<'a>> {
        let general = bootstrap.general.resolve(self.host).map_err(fatal("general byte order"))?;
        let instruction = bootstrap
            .instruction
            .resolve(self.host)
            .map_err(fatal("instruction byte order"))?;
        let profiles = Arc::new(ScrambledProfiles::new(general, instruction));

        let layout = bootstrap.layout.resolve(self.host).map_err(fatal("record layout"))?;
        let catalog = OpcodeCatalog::build(
            self.host,
            &bootstrap.anchors,
            &bootstrap.handlers,
            self.config.parallel_catalog,
        )
        .map_err(fatal("opcode catalog"))?;

        let resolver_stream = bootstrap.resolver_stream.open().map_err(fatal("resolver stream"))?;
        let method_stream = bootstrap.method_stream.open().map_err(fatal("method stream"))?;
        info!(
            "Bootstrap complete: {} opcodes, header order {:?}, {} operands",
            catalog.len(),
            layout.header.order(),
            layout.operand
        );

        let shared_resolver = match self.config.counter_policy.resolver {
            CounterMode::Position => Some(
                self.open_resolver(&resolver_stream, &profiles, &layout, 0)
                    .map_err(fatal("resolver stream"))?,
            ),
            CounterMode::MethodKey => None,
        };

        Ok(Prepared {
            profiles,
            layout,
            catalog,
            resolver_stream,
            method_stream,
            shared_resolver,
            position_mask: bootstrap.position_mask,
        })
    }

    fn open_resolver(
        &self,
        stream: &LayeredStream,
        profiles: &Arc<ScrambledProfiles>,
        layout: &RecordLayout,
        seed: u32,
    ) -> Result<Resolver<'a>> {
        Ok(Resolver::new(
            self.host,
            stream,
            profiles.clone(),
            self.config.counter_policy.resolver_seed(seed),
            layout.operand,
        )?
        .with_max_depth(self.config.max_resolve_depth))
    }

    fn devirtualize(&self, prepared: &Prepared<'a>, stub: &VirtualizedStub) -> MethodReport {
        let mut method = VirtualMethod::new(stub.token, stub.key.clone());
        let mut tracker = StateTracker::new(stub.token);

        let mut report = match self.recover(prepared, &mut method, &mut tracker) {
            Ok(outcome) => {
                let (failure, message) = match outcome.stop {
                    Some((failure, message)) => (failure, Some(message)),
                    None => (None, None),
                };
                MethodReport {
                    token: stub.token,
                    name: None,
                    status: method.status,
                    state: tracker.state(),
                    failure,
                    message,
                    instructions: method.instructions.len(),
                    placeholders: method.instructions.iter().filter(|i| i.is_placeholder()).count(),
                    spliced: outcome.spliced,
                }
            }
            Err(error) => {
                tracker.fail();
                method.status = RecoveryStatus::Unrecoverable;
                warn!("Method {} is unrecoverable: {}", method, error);
                MethodReport {
                    token: stub.token,
                    name: None,
                    status: RecoveryStatus::Unrecoverable,
                    state: tracker.state(),
                    failure: Some(error.kind()),
                    message: Some(error.to_string()),
                    instructions: 0,
                    placeholders: 0,
                    spliced: false,
                }
            }
        };
        report.name = method.name().map(str::to_string);
        if report.status == RecoveryStatus::Degraded {
            warn!("Method {} degraded: {}", method, report.message.as_deref().unwrap_or("stopped"));
        } else {
            debug!("{report}");
        }
        report
    }

    fn recover(
        &self,
        prepared: &Prepared<'a>,
        method: &mut VirtualMethod,
        tracker: &mut StateTracker,
    ) -> Result<Outcome> {
        let position = PositionKey::decode(&method.key, prepared.position_mask)?;
        method.position = Some(position);

        let owned;
        let resolver = match &prepared.shared_resolver {
            Some(shared) => shared,
            None => {
                owned = self.open_resolver(
                    &prepared.resolver_stream,
                    &prepared.profiles,
                    &prepared.layout,
                    position.seed,
                )?;
                &owned
            }
        };

        let origin = u64::from(position.offset);
        let seed = self.config.counter_policy.method_seed(origin, position.seed);
        let mut reader = PrimitiveReader::new(
            prepared.method_stream.cursor(seed)?,
            prepared.profiles.clone(),
        );
        reader.set_profile(ProfileKind::General);
        reader.seek(origin)?;

        // header
        let header = MethodHeader::read(&mut reader, &prepared.layout.header)?;
        method.declaring = Some(required_type(resolver, header.declaring_type, "declaring type")?);
        method.return_type = Some(required_type(resolver, header.return_type, "return type")?);
        method.locals = header
            .locals
            .iter()
            .map(|&local| required_type(resolver, local, "local"))
            .collect::<Result<_>>()?;
        method.parameters = header
            .parameters
            .iter()
            .map(|param| {
                let sig = required_type(resolver, param.type_position, "parameter type")?;
                Ok(if param.by_ref {
                    TypeSig::ByRef(Box::new(sig))
                } else {
                    sig
                })
            })
            .collect::<Result<_>>()?;
        method.header = Some(header);
        method.raw_handlers = RawExceptionHandler::read_table(&mut reader)?;
        tracker.advance(DevirtState::HeaderRead)?;

        // instructions
        method.code_length = reader.read_u32()?;
        let mut decoder = InstructionDecoder::new(&prepared.catalog, resolver, method.token);
        if self.config.chain_cipher {
            decoder = decoder.with_passwords(&self.config.passwords);
        }
        let mut decoded = decoder.decode(&mut reader, method.code_length)?;
        tracker.advance(DevirtState::InstructionDecode)?;

        fix_branches(&mut decoded)?;
        tracker.advance(DevirtState::BranchFixup)?;

        if decoded.is_degraded() {
            self.finish_degraded(method, decoded, tracker)
        } else {
            let handlers = fix_exception_handlers(&method.raw_handlers, &decoded, resolver)?;
            tracker.advance(DevirtState::ExceptionHandlerFixup)?;
            method.status = RecoveryStatus::Full;
            method.instructions = decoded.instructions;

            let body = MethodBody {
                instructions: method.instructions.clone(),
                exception_handlers: handlers,
                locals: method.locals.clone(),
                init_locals: !method.locals.is_empty(),
                skip_verification: self.config.output.skip_verification,
            };
            self.host.replace_body(method.token, body)?;
            tracker.advance(DevirtState::Spliced)?;
            Ok(Outcome {
                stop: None,
                spliced: true,
            })
        }
    }

    fn finish_degraded(
        &self,
        method: &mut VirtualMethod,
        decoded: DecodedBody,
        tracker: &mut StateTracker,
    ) -> Result<Outcome> {
        method.status = RecoveryStatus::Degraded;
        let stop = decoded.stop.map(|stop| match stop.error() {
            Some(error) => (Some(error.kind()), error.to_string()),
            None => (
                None,
                format!(
                    "Unidentified opcode 0x{:x} at virtual offset 0x{:x}",
                    stop.code, stop.offset
                ),
            ),
        });
        method.instructions = decoded.instructions;

        let spliced = !self.config.output.only_recovered;
        if spliced {
            let body = MethodBody {
                instructions: method.instructions.clone(),
                exception_handlers: Vec::new(),
                locals: method.locals.clone(),
                init_locals: !method.locals.is_empty(),
                skip_verification: true,
            };
            self.host.replace_body(method.token, body)?;
        }
        tracker.advance(DevirtState::PartiallyRecovered)?;
        Ok(Outcome { stop, spliced })
    }
}

struct Outcome {
    stop: Option<(Option<FailureKind>, String)>,
    spliced: bool,
}

fn required_type(resolver: &Resolver<'_>, position: i32, what: &str) -> Result<TypeSig> {
    resolver
        .resolve_type(position)?
        .ok_or_else(|| Error::Resolution(format!("The {what} at 0x{position:x} did not resolve")))
}

/// Promotes errors during bootstrap to [`Error::Bootstrap`].
fn fatal(stage: &'static str) -> impl Fn(Error) -> Error {
    move |error| match error {
        Error::Bootstrap(_) => error,
        other => bootstrap_error!("{}: {}", stage, other),
    }
}

//! Matching signatures against CIL bodies.

use crate::{
    assembly::Instruction,
    metadata::{FieldRef, MetadataHost, MethodRef},
    pattern::signature::{MatchMode, Signature},
};

/// Maximum nesting of verifiers that match callee bodies.
pub const MAX_MATCH_DEPTH: usize = 8;

/// Members of the interpreter located during bootstrap.
///
/// Handler signatures are expressed relative to these: a "load local" handler is
/// one that indexes [`InterpreterAnchors::locals_field`], a binary operation pops
/// twice through [`InterpreterAnchors::pop`], and so on.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpreterAnchors {
    /// Pushes a value onto the evaluation stack
    pub push: MethodRef,
    /// Pops a value from the evaluation stack
    pub pop: MethodRef,
    /// Sets the virtual instruction pointer
    pub jump: MethodRef,
    /// Array of local variable slots
    pub locals_field: FieldRef,
    /// Array of argument slots
    pub arguments_field: FieldRef,
}

/// Everything a verifier may consult.
#[derive(Clone, Copy)]
pub struct MatchContext<'a> {
    /// Module hosting the interpreter
    pub host: &'a dyn MetadataHost,
    /// Interpreter anchors
    pub anchors: &'a InterpreterAnchors,
    depth: usize,
}

impl<'a> MatchContext<'a> {
    /// Creates a top-level context.
    #[must_use]
    pub fn new(host: &'a dyn MetadataHost, anchors: &'a InterpreterAnchors) -> Self {
        MatchContext {
            host,
            anchors,
            depth: 0,
        }
    }

    /// Returns the current nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns a context one level deeper, or `None` past [`MAX_MATCH_DEPTH`].
    #[must_use]
    pub fn descend(&self) -> Option<MatchContext<'a>> {
        (self.depth < MAX_MATCH_DEPTH).then(|| MatchContext {
            depth: self.depth + 1,
            ..*self
        })
    }

    /// Returns the body of `method` if it is defined in the host module.
    #[must_use]
    pub fn callee_body(&self, method: &MethodRef) -> Option<Vec<Instruction>> {
        self.host.callee_body(method)
    }

    /// Matches `signature` against the body of `method`, one level deeper.
    ///
    /// Returns `false` for methods without a body and past the depth limit.
    #[must_use]
    pub fn callee_matches(&self, method: &MethodRef, signature: &Signature) -> bool {
        match (self.descend(), self.callee_body(method)) {
            (Some(nested), Some(body)) => nested.matches(signature, &body),
            _ => false,
        }
    }

    /// Returns `true` if `signature` matches `body`.
    #[must_use]
    pub fn matches(&self, signature: &Signature, body: &[Instruction]) -> bool {
        self.find(signature, body).is_some()
    }

    /// Finds the first verified match of `signature` in `body`.
    #[must_use]
    pub fn find<'b>(&self, signature: &Signature, body: &'b [Instruction]) -> Option<Match<'b>> {
        let width = signature.symbols().len();
        match signature.mode() {
            MatchMode::Contiguous => (signature.shape_matches(body)
                && signature.verify(self, body))
            .then_some(Match {
                start: 0,
                instructions: body,
            }),
            MatchMode::Window => {
                if width == 0 || width > body.len() {
                    return None;
                }
                body.windows(width)
                    .enumerate()
                    .find(|(_, window)| {
                        signature.shape_matches(window) && signature.verify(self, window)
                    })
                    .map(|(start, instructions)| Match {
                        start,
                        instructions,
                    })
            }
        }
    }
}

/// A verified match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match<'b> {
    /// Index of the first matched instruction in the body
    pub start: usize,
    /// The matched instructions
    pub instructions: &'b [Instruction],
}

/// Returns `true` if `body` contains the opcode sequence `opcodes` contiguously.
#[must_use]
pub fn contains_sequence(body: &[Instruction], opcodes: &[crate::assembly::OpCode]) -> bool {
    !opcodes.is_empty()
        && body.windows(opcodes.len()).any(|window| {
            window
                .iter()
                .zip(opcodes)
                .all(|(instruction, opcode)| instruction.opcode == *opcode)
        })
}

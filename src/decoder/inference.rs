//! Discovery of byte permutations from the target's reader helpers.
//!
//! The protector reads every multi-byte primitive through small helper methods
//! that assemble the value byte by byte. Those helpers are left unvirtualized, so
//! their CIL bodies reveal the permutation directly. Two shapes are recognised:
//!
//! ```text
//! ldloc buf; ldc.i4 k; ldelem.u1; [conv.*]; ldc.i4 s; shl     // indexed buffer
//! call ReadByte; [conv.*]; ldc.i4 s; shl                      // sequential reads
//! ```
//!
//! Each occurrence places stream byte `k` (or the k-th `ReadByte` call) at
//! little-endian byte `s / 8`; a byte without a following shift lands at byte 0.
//!
//! When a helper does not match either shape, the permutation can instead be
//! pinned down by known test vectors: all `width!` candidates are enumerated and
//! the single one consistent with every vector is kept.

use log::debug;

use crate::{
    assembly::{Instruction, OpCode},
    decoder::permutation::{Permutation, PermutationProfile, WIDTHS},
    metadata::{MetadataHost, Token},
    Result,
};

/// A stream encoding with its known decoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestVector {
    /// Bytes as they appear in the stream
    pub stream: Vec<u8>,
    /// Decoded unsigned value
    pub value: u64,
}

impl TestVector {
    /// Creates a vector.
    #[must_use]
    pub fn new(stream: Vec<u8>, value: u64) -> Self {
        TestVector { stream, value }
    }
}

/// Where the permutations of one profile come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileSource {
    /// Reader helper methods for 16, 32 and 64-bit integers
    Helpers([Token; 3]),
    /// Already known orders
    Known(PermutationProfile),
    /// Test vectors, grouped by their stream length
    Vectors(Vec<TestVector>),
}

impl ProfileSource {
    /// Produces the profile, failing if any width cannot be determined.
    ///
    /// # Errors
    /// Returns [`crate::Error::Bootstrap`] when a helper body is missing or
    /// unrecognised, or when the vectors do not determine a unique permutation.
    pub fn resolve(&self, host: &dyn MetadataHost) -> Result<PermutationProfile> {
        match self {
            ProfileSource::Known(profile) => Ok(profile.clone()),
            ProfileSource::Helpers(tokens) => {
                let mut found = Vec::with_capacity(3);
                for (&width, &token) in WIDTHS.iter().zip(tokens) {
                    let body = host.method_body(token).ok_or_else(|| {
                        bootstrap_error!("Reader helper {} has no body", token)
                    })?;
                    found.push(infer_permutation(&body, width)?);
                }
                let p8 = found.pop();
                let p4 = found.pop();
                let p2 = found.pop();
                match (p2, p4, p8) {
                    (Some(p2), Some(p4), Some(p8)) => PermutationProfile::new(p2, p4, p8),
                    _ => Err(bootstrap_error!("Incomplete reader helper set")),
                }
            }
            ProfileSource::Vectors(vectors) => {
                let pick = |width: usize| -> Result<Permutation> {
                    let matching: Vec<TestVector> = vectors
                        .iter()
                        .filter(|v| v.stream.len() == width)
                        .cloned()
                        .collect();
                    infer_from_vectors(width, &matching)
                };
                PermutationProfile::new(pick(2)?, pick(4)?, pick(8)?)
            }
        }
    }
}

fn is_buffer_load(instruction: &Instruction) -> bool {
    instruction.opcode.is_load_local()
        || instruction.opcode.is_load_arg()
        || matches!(instruction.opcode, OpCode::Ldfld | OpCode::Ldsfld)
}

fn is_read_byte(instruction: &Instruction) -> bool {
    instruction.opcode.is_call() && instruction.method().is_some_and(|m| m.name == "ReadByte")
}

/// Shift applied to the byte produced at `index`, skipping conversions.
fn shift_after(body: &[Instruction], index: usize) -> Option<i32> {
    let mut next = index + 1;
    while body.get(next).is_some_and(|i| i.opcode.is_conversion()) {
        next += 1;
    }
    match (body.get(next), body.get(next + 1)) {
        (Some(constant), Some(shift)) if shift.opcode == OpCode::Shl => constant.i4_constant(),
        _ => Some(0),
    }
}

/// Infers the permutation of `width` bytes from a reader helper body.
///
/// # Errors
/// Returns [`crate::Error::Bootstrap`] if the body does not place exactly `width`
/// distinct bytes.
pub fn infer_permutation(body: &[Instruction], width: usize) -> Result<Permutation> {
    let mut order = vec![None; width];
    let mut sequential = 0usize;
    let mut placed = 0usize;

    for (index, instruction) in body.iter().enumerate() {
        let stream_index = if instruction.opcode == OpCode::LdelemU1 && index >= 2 {
            let constant = body[index - 1].i4_constant();
            match constant {
                Some(k) if is_buffer_load(&body[index - 2]) => usize::try_from(k).ok(),
                _ => None,
            }
        } else if is_read_byte(instruction) {
            sequential += 1;
            Some(sequential - 1)
        } else {
            None
        };

        let Some(stream_index) = stream_index else {
            continue;
        };

        let shift = shift_after(body, index).unwrap_or(-1);
        if shift < 0 || shift % 8 != 0 || (shift / 8) as usize >= width {
            return Err(bootstrap_error!(
                "Reader helper shifts byte {} by {}",
                stream_index,
                shift
            ));
        }
        let target = (shift / 8) as u8;

        match order.get_mut(stream_index) {
            Some(slot @ None) => *slot = Some(target),
            _ => {
                return Err(bootstrap_error!(
                    "Reader helper reads byte {} twice or out of range",
                    stream_index
                ))
            }
        }
        placed += 1;
    }

    if placed != width {
        return Err(bootstrap_error!(
            "Reader helper places {} bytes, expected {}",
            placed,
            width
        ));
    }

    let order: Option<Vec<u8>> = order.into_iter().collect();
    let order = order.ok_or_else(|| bootstrap_error!("Reader helper leaves a byte unplaced"))?;
    let permutation = Permutation::new(order)?;
    debug!("Inferred {}-byte permutation {:?}", width, permutation);
    Ok(permutation)
}

/// Visits every permutation of `items` (Heap's algorithm).
fn for_each_permutation(items: &mut [u8], mut visit: impl FnMut(&[u8])) {
    let n = items.len();
    let mut counters = vec![0usize; n];
    visit(items);

    let mut i = 1;
    while i < n {
        if counters[i] < i {
            if i % 2 == 0 {
                items.swap(0, i);
            } else {
                items.swap(counters[i], i);
            }
            visit(items);
            counters[i] += 1;
            i = 1;
        } else {
            counters[i] = 0;
            i += 1;
        }
    }
}

/// Finds the unique permutation of `width` bytes consistent with `vectors`.
///
/// # Errors
/// Returns [`crate::Error::Bootstrap`] if no candidate or more than one candidate
/// matches.
pub fn infer_from_vectors(width: usize, vectors: &[TestVector]) -> Result<Permutation> {
    if !WIDTHS.contains(&width) {
        return Err(bootstrap_error!("Unsupported primitive width {}", width));
    }
    if vectors.iter().any(|v| v.stream.len() != width) {
        return Err(bootstrap_error!("Test vector width differs from {}", width));
    }

    let mut items: Vec<u8> = (0..width as u8).collect();
    let mut candidates: Vec<Vec<u8>> = Vec::new();
    for_each_permutation(&mut items, |order| {
        let consistent = vectors.iter().all(|vector| {
            let mut le = [0u8; 8];
            for (i, &target) in order.iter().enumerate() {
                le[usize::from(target)] = vector.stream[i];
            }
            u64::from_le_bytes(le) == vector.value
        });
        if consistent && candidates.len() < 2 {
            candidates.push(order.to_vec());
        }
    });

    match candidates.len() {
        1 => Permutation::new(candidates.remove(0)),
        0 => Err(bootstrap_error!(
            "No {}-byte permutation matches the test vectors",
            width
        )),
        _ => Err(bootstrap_error!(
            "Test vectors do not determine a unique {}-byte permutation",
            width
        )),
    }
}

//! Batched inversion of small dense complex matrices.
//!
//! Block-local matrix preparation needs every `n × n` block of a
//! block-diagonal system inverted independently. Blocks are stored
//! contiguously, column-major within each block, and processed in
//! parallel over the batch.

use std::time::{Duration, Instant};

use nalgebra::{ComplexField, DMatrix, Scalar};
use num_complex::{Complex32, Complex64};
use rayon::prelude::*;
use thiserror::Error;

use crate::field::FieldData;
use crate::util::logging::diagnostics_enabled;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinalgError {
    #[error("batch member {index} is singular")]
    SingularBatch { index: usize },

    #[error(
        "batch storage holds {got} values, expected {expected} \
         (n = {n}, batch = {batch})"
    )]
    StorageSize { expected: usize, got: usize, n: usize, batch: usize },

    #[error("batch inversion needs a positive matrix dimension")]
    ZeroDimension,

    #[error("batch inversion requires both operands at one storage precision")]
    MixedPrecision,
}

/// Work accounting for one batched call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    /// Complex flops: (8/3)·n³ + 2n² per inversion
    pub flops: u64,
    pub elapsed: Duration,
}

impl BatchStats {
    pub fn gflops(&self) -> f64 {
        self.flops as f64 / self.elapsed.as_secs_f64() / 1e9
    }
}

fn invert_block<T>(out: &mut [T], input: &[T], n: usize, idx: usize) -> Result<(), LinalgError>
where
    T: Scalar + ComplexField + Copy,
{
    let m = DMatrix::from_iterator(n, n, input.iter().copied());
    match m.try_inverse() {
        Some(inv) => {
            for (o, v) in out.iter_mut().zip(inv.iter()) {
                *o = *v;
            }
            Ok(())
        }
        None => Err(LinalgError::SingularBatch { index: idx }),
    }
}

fn run<T>(out: &mut [T], input: &[T], n: usize, batch: usize) -> Result<BatchStats, LinalgError>
where
    T: Scalar + ComplexField + Copy + Send + Sync,
{
    if n == 0 {
        return Err(LinalgError::ZeroDimension);
    }
    let block = n * n;
    let expected = block * batch;
    if input.len() != expected || out.len() != expected {
        return Err(LinalgError::StorageSize {
            expected,
            got: if input.len() != expected { input.len() } else { out.len() },
            n,
            batch,
        });
    }

    let start = Instant::now();
    out.par_chunks_mut(block)
        .zip(input.par_chunks(block))
        .enumerate()
        .try_for_each(|(idx, (o, i))| invert_block(o, i, n, idx))?;
    let elapsed = start.elapsed();

    let n3 = (n * n * n) as f64;
    let flops = (8.0 / 3.0 * n3 + 2.0 * (n * n) as f64) * batch as f64;
    let stats = BatchStats { flops: flops as u64, elapsed };

    if diagnostics_enabled() {
        eprintln!(
            "batch invert: n={} batch={} {:.3} Gflop/s",
            n,
            batch,
            stats.gflops()
        );
    }
    Ok(stats)
}

/// Invert `batch` double-precision `n × n` blocks of `input` into `out`.
pub fn batch_invert_f64(
    out: &mut [Complex64],
    input: &[Complex64],
    n: usize,
    batch: usize,
) -> Result<BatchStats, LinalgError> {
    run(out, input, n, batch)
}

/// Invert `batch` single-precision `n × n` blocks of `input` into `out`.
pub fn batch_invert_f32(
    out: &mut [Complex32],
    input: &[Complex32],
    n: usize,
    batch: usize,
) -> Result<BatchStats, LinalgError> {
    run(out, input, n, batch)
}

/// Precision-dispatching entry point over tagged storage. Both operands
/// must sit at the same precision.
pub fn batch_invert(
    out: &mut FieldData,
    input: &FieldData,
    n: usize,
    batch: usize,
) -> Result<BatchStats, LinalgError> {
    match (out, input) {
        (FieldData::F64(o), FieldData::F64(i)) => batch_invert_f64(o, i, n, batch),
        (FieldData::F32(o), FieldData::F32(i)) => batch_invert_f32(o, i, n, batch),
        _ => Err(LinalgError::MixedPrecision),
    }
}

//! Vector kernels over lattice fields.
//!
//! The driver's inner loop is built from a handful of fused operations so
//! that each iteration touches every field once. Kernels accept operands
//! at different storage precisions (reads upcast, writes round to the
//! destination's storage); every reduction accumulates in f64 regardless
//! of storage precision. Reducing kernels take a [`ReduceCtx`] so the
//! caller decides whether the sum crosses partitions.

use num_complex::{Complex32, Complex64};

use crate::domain::comm::ReduceCtx;
use crate::field::{Field, FieldData, FieldError, FieldParams};

trait ComplexValue: Copy {
    fn to_c64(self) -> Complex64;
    fn from_c64(v: Complex64) -> Self;
}

impl ComplexValue for Complex64 {
    fn to_c64(self) -> Complex64 {
        self
    }
    fn from_c64(v: Complex64) -> Self {
        v
    }
}

impl ComplexValue for Complex32 {
    fn to_c64(self) -> Complex64 {
        Complex64::new(self.re as f64, self.im as f64)
    }
    fn from_c64(v: Complex64) -> Self {
        Complex32::new(v.re as f32, v.im as f32)
    }
}

fn check_pair(a: &FieldParams, b: &FieldParams) -> Result<(), FieldError> {
    if a.dims != b.dims {
        return Err(FieldError::ShapeMismatch { left: a.dims, right: b.dims });
    }
    if a.subset != b.subset || a.parity != b.parity || a.order != b.order {
        return Err(FieldError::LayoutMismatch(
            "kernel operands must store the same sites in the same order",
        ));
    }
    Ok(())
}

// ===== Elementwise kernels =====

fn convert_slices<X: ComplexValue, Y: ComplexValue>(dst: &mut [Y], src: &[X]) {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d = Y::from_c64(s.to_c64());
    }
}

/// dst = src, converting precision when the storages differ.
pub fn convert_into(dst: &mut Field, src: &Field) -> Result<(), FieldError> {
    check_pair(&dst.params, &src.params)?;
    match (&mut dst.data, &src.data) {
        (FieldData::F64(d), FieldData::F64(s)) => d.copy_from_slice(s),
        (FieldData::F32(d), FieldData::F32(s)) => d.copy_from_slice(s),
        (FieldData::F64(d), FieldData::F32(s)) => convert_slices(d, s),
        (FieldData::F32(d), FieldData::F64(s)) => convert_slices(d, s),
    }
    Ok(())
}

fn axpy_slices<X: ComplexValue, Y: ComplexValue>(a: f64, x: &[X], y: &mut [Y]) {
    for (yi, xi) in y.iter_mut().zip(x.iter()) {
        *yi = Y::from_c64(yi.to_c64() + a * xi.to_c64());
    }
}

/// y += a * x.
pub fn axpy(a: f64, x: &Field, y: &mut Field) -> Result<(), FieldError> {
    check_pair(&x.params, &y.params)?;
    match (&x.data, &mut y.data) {
        (FieldData::F64(x), FieldData::F64(y)) => axpy_slices(a, x, y),
        (FieldData::F64(x), FieldData::F32(y)) => axpy_slices(a, x, y),
        (FieldData::F32(x), FieldData::F64(y)) => axpy_slices(a, x, y),
        (FieldData::F32(x), FieldData::F32(y)) => axpy_slices(a, x, y),
    }
    Ok(())
}

// ===== Reductions =====

fn norm2_slice<X: ComplexValue>(x: &[X]) -> f64 {
    x.iter().map(|v| v.to_c64().norm_sqr()).sum()
}

/// ‖x‖², reduced under the context's scope.
pub fn norm2(x: &Field, rctx: &ReduceCtx) -> f64 {
    let local = match &x.data {
        FieldData::F64(v) => norm2_slice(v),
        FieldData::F32(v) => norm2_slice(v),
    };
    rctx.sum(local)
}

fn re_dot_slices<X: ComplexValue, Y: ComplexValue>(x: &[X], y: &[Y]) -> f64 {
    x.iter()
        .zip(y.iter())
        .map(|(xi, yi)| {
            let xi = xi.to_c64();
            let yi = yi.to_c64();
            xi.re * yi.re + xi.im * yi.im
        })
        .sum()
}

/// Re⟨x, y⟩ with the left argument conjugated, reduced.
pub fn re_dot(x: &Field, y: &Field, rctx: &ReduceCtx) -> Result<f64, FieldError> {
    check_pair(&x.params, &y.params)?;
    let local = match (&x.data, &y.data) {
        (FieldData::F64(x), FieldData::F64(y)) => re_dot_slices(x, y),
        (FieldData::F64(x), FieldData::F32(y)) => re_dot_slices(x, y),
        (FieldData::F32(x), FieldData::F64(y)) => re_dot_slices(x, y),
        (FieldData::F32(x), FieldData::F32(y)) => re_dot_slices(x, y),
    };
    Ok(rctx.sum(local))
}

fn cdot_slices<X: ComplexValue, Y: ComplexValue>(x: &[X], y: &[Y]) -> Complex64 {
    x.iter()
        .zip(y.iter())
        .map(|(xi, yi)| xi.to_c64().conj() * yi.to_c64())
        .sum()
}

/// ⟨x, y⟩ with the left argument conjugated, reduced.
pub fn cdot(x: &Field, y: &Field, rctx: &ReduceCtx) -> Result<Complex64, FieldError> {
    check_pair(&x.params, &y.params)?;
    let local = match (&x.data, &y.data) {
        (FieldData::F64(x), FieldData::F64(y)) => cdot_slices(x, y),
        (FieldData::F64(x), FieldData::F32(y)) => cdot_slices(x, y),
        (FieldData::F32(x), FieldData::F64(y)) => cdot_slices(x, y),
        (FieldData::F32(x), FieldData::F32(y)) => cdot_slices(x, y),
    };
    Ok(rctx.sum_complex(local))
}

// ===== Fused kernels =====

fn xmy_norm_slices<X: ComplexValue, Y: ComplexValue>(x: &[X], y: &mut [Y]) -> f64 {
    let mut norm = 0.0;
    for (yi, xi) in y.iter_mut().zip(x.iter()) {
        let new = xi.to_c64() - yi.to_c64();
        norm += new.norm_sqr();
        *yi = Y::from_c64(new);
    }
    norm
}

/// Fused subtract-and-norm: y = x − y, returns ‖y_new‖² reduced.
pub fn xmy_norm(x: &Field, y: &mut Field, rctx: &ReduceCtx) -> Result<f64, FieldError> {
    check_pair(&x.params, &y.params)?;
    let local = match (&x.data, &mut y.data) {
        (FieldData::F64(x), FieldData::F64(y)) => xmy_norm_slices(x, y),
        (FieldData::F64(x), FieldData::F32(y)) => xmy_norm_slices(x, y),
        (FieldData::F32(x), FieldData::F64(y)) => xmy_norm_slices(x, y),
        (FieldData::F32(x), FieldData::F32(y)) => xmy_norm_slices(x, y),
    };
    Ok(rctx.sum(local))
}

fn axpy_cg_norm_slices<X: ComplexValue, Y: ComplexValue>(
    a: f64,
    x: &[X],
    y: &mut [Y],
) -> Complex64 {
    let mut norm = 0.0;
    let mut dot = 0.0;
    for (yi, xi) in y.iter_mut().zip(x.iter()) {
        let xi = xi.to_c64();
        let new = yi.to_c64() + a * xi;
        norm += new.norm_sqr();
        dot += new.re * xi.re + new.im * xi.im;
        *yi = Y::from_c64(new);
    }
    Complex64::new(norm, dot)
}

/// Fused CG residual update: y += a * x. Returns ‖y_new‖² in the real
/// part and Re⟨y_new, x⟩ in the imaginary part, reduced as one pair.
pub fn axpy_cg_norm(
    a: f64,
    x: &Field,
    y: &mut Field,
    rctx: &ReduceCtx,
) -> Result<Complex64, FieldError> {
    check_pair(&x.params, &y.params)?;
    let local = match (&x.data, &mut y.data) {
        (FieldData::F64(x), FieldData::F64(y)) => axpy_cg_norm_slices(a, x, y),
        (FieldData::F64(x), FieldData::F32(y)) => axpy_cg_norm_slices(a, x, y),
        (FieldData::F32(x), FieldData::F64(y)) => axpy_cg_norm_slices(a, x, y),
        (FieldData::F32(x), FieldData::F32(y)) => axpy_cg_norm_slices(a, x, y),
    };
    Ok(rctx.sum_complex(local))
}

fn axpy_zpbx_slices<T: ComplexValue>(a: f64, p: &mut [T], x: &mut [T], z: &[T], b: f64) {
    for ((pi, xi), zi) in p.iter_mut().zip(x.iter_mut()).zip(z.iter()) {
        let pv = pi.to_c64();
        *xi = T::from_c64(xi.to_c64() + a * pv);
        *pi = T::from_c64(zi.to_c64() + b * pv);
    }
}

/// Fused direction/solution update: x += a * p, then p = z + b * p.
///
/// The three operands never mix tiers in the driver, so one common
/// precision is required.
pub fn axpy_zpbx(
    a: f64,
    p: &mut Field,
    x: &mut Field,
    z: &Field,
    b: f64,
) -> Result<(), FieldError> {
    check_pair(&p.params, &x.params)?;
    check_pair(&p.params, &z.params)?;
    if p.precision() != x.precision() || p.precision() != z.precision() {
        return Err(FieldError::PrecisionMismatch {
            left: p.precision(),
            right: if p.precision() != x.precision() {
                x.precision()
            } else {
                z.precision()
            },
        });
    }
    match (&mut p.data, &mut x.data, &z.data) {
        (FieldData::F64(p), FieldData::F64(x), FieldData::F64(z)) => {
            axpy_zpbx_slices(a, p, x, z, b)
        }
        (FieldData::F32(p), FieldData::F32(x), FieldData::F32(z)) => {
            axpy_zpbx_slices(a, p, x, z, b)
        }
        _ => unreachable!("precision equality checked above"),
    }
    Ok(())
}

//! `<math.h>`, for the functions `f64` provides directly.

use wasmlink::{
    abi::{Args, Ret},
    Host, StubLibrary,
};
use wasmtime::Caller;

use crate::StubResult;

const FP_NAN: i32 = 0;
const FP_INFINITE: i32 = 1;
const FP_ZERO: i32 = 2;
const FP_SUBNORMAL: i32 = 3;
const FP_NORMAL: i32 = 4;

macro_rules! unary {
    ($($name:ident => $f:expr),* $(,)?) => {
        $(
            fn $name(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
                let f: fn(f64) -> f64 = $f;
                Ok(Ret::F64(f(args.f64(0))))
            }
        )*
    };
}

macro_rules! binary {
    ($($name:ident => $f:expr),* $(,)?) => {
        $(
            fn $name(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
                let f: fn(f64, f64) -> f64 = $f;
                Ok(Ret::F64(f(args.f64(0), args.f64(1))))
            }
        )*
    };
}

macro_rules! predicate {
    ($($name:ident => $f:expr),* $(,)?) => {
        $(
            fn $name(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
                let f: fn(f64, f64) -> bool = $f;
                Ok(f(args.f64(0), args.f64(1)).into())
            }
        )*
    };
}

unary! {
    cos => f64::cos,
    sin => f64::sin,
    tan => f64::tan,
    acos => f64::acos,
    asin => f64::asin,
    atan => f64::atan,
    cosh => f64::cosh,
    sinh => f64::sinh,
    tanh => f64::tanh,
    acosh => f64::acosh,
    asinh => f64::asinh,
    atanh => f64::atanh,
    exp => f64::exp,
    exp2 => f64::exp2,
    expm1 => f64::exp_m1,
    log => f64::ln,
    log10 => f64::log10,
    log1p => f64::ln_1p,
    log2 => f64::log2,
    sqrt => f64::sqrt,
    cbrt => f64::cbrt,
    ceil => f64::ceil,
    floor => f64::floor,
    trunc => f64::trunc,
    round => f64::round,
    fabs => f64::abs,
}

binary! {
    atan2 => f64::atan2,
    pow => f64::powf,
    hypot => f64::hypot,
    fmod => |x, y| x % y,
    copysign => f64::copysign,
    fmax => f64::max,
    fmin => f64::min,
    fdim => |x, y| if x > y { x - y } else { 0.0 },
}

predicate! {
    isgreater => |x, y| x > y,
    isgreaterequal => |x, y| x >= y,
    isless => |x, y| x < y,
    islessequal => |x, y| x <= y,
    islessgreater => |x, y| x < y || x > y,
    isunordered => |x, y| x.is_nan() || y.is_nan(),
}

fn lround(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    Ok(Ret::I64(args.f64(0).round() as i64))
}

fn nan(_: &mut Caller<'_, Host>, _: Args<'_>) -> StubResult {
    Ok(Ret::F64(f64::NAN))
}

fn isfinite(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    Ok(args.f64(0).is_finite().into())
}

fn isnan(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    Ok(args.f64(0).is_nan().into())
}

fn isnormal(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    Ok(args.f64(0).is_normal().into())
}

fn signbit(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    Ok(args.f64(0).is_sign_negative().into())
}

/// 1 for positive infinity, -1 for negative infinity, else 0.
fn isinf(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    let x = args.f64(0);
    Ok(Ret::I32(if !x.is_infinite() {
        0
    } else if x.is_sign_positive() {
        1
    } else {
        -1
    }))
}

fn fpclassify(_: &mut Caller<'_, Host>, args: Args<'_>) -> StubResult {
    use std::num::FpCategory;
    Ok(Ret::I32(match args.f64(0).classify() {
        FpCategory::Nan => FP_NAN,
        FpCategory::Infinite => FP_INFINITE,
        FpCategory::Zero => FP_ZERO,
        FpCategory::Subnormal => FP_SUBNORMAL,
        FpCategory::Normal => FP_NORMAL,
    }))
}

pub fn library() -> StubLibrary {
    StubLibrary::new("math")
        // Trigonometric and hyperbolic.
        .func("cos", cos)
        .func("sin", sin)
        .func("tan", tan)
        .func("acos", acos)
        .func("asin", asin)
        .func("atan", atan)
        .func("atan2", atan2)
        .func("cosh", cosh)
        .func("sinh", sinh)
        .func("tanh", tanh)
        .func("acosh", acosh)
        .func("asinh", asinh)
        .func("atanh", atanh)
        // Exponential and logarithmic.
        .func("exp", exp)
        .func("exp2", exp2)
        .func("expm1", expm1)
        .func("log", log)
        .func("log10", log10)
        .func("log1p", log1p)
        .func("log2", log2)
        .nyi_all(&["frexp", "ldexp", "modf", "ilogb", "logb", "scalbn", "scalbln"])
        // Power.
        .func("pow", pow)
        .func("sqrt", sqrt)
        .func("cbrt", cbrt)
        .func("hypot", hypot)
        .nyi_all(&["erf", "erfc", "tgamma", "lgamma"])
        // Rounding and remainder.
        .func("ceil", ceil)
        .func("floor", floor)
        .func("fmod", fmod)
        .func("trunc", trunc)
        .func("round", round)
        .func("lround", lround)
        .func("llround", lround)
        .nyi_all(&[
            "rint",
            "lrint",
            "llrint",
            "nearbyint",
            "remainder",
            "remquo",
        ])
        // Manipulation, min/max and difference.
        .func("copysign", copysign)
        .func("nan", nan)
        .nyi_all(&["nextafter", "nexttoward"])
        .func("fdim", fdim)
        .func("fmax", fmax)
        .func("fmin", fmin)
        .func("fabs", fabs)
        // Classification and comparison.
        .func("fpclassify", fpclassify)
        .func("isfinite", isfinite)
        .func("isfinitef", isfinite)
        .func("isfinitel", isfinite)
        .func("isinf", isinf)
        .func("isinff", isinf)
        .func("isinfl", isinf)
        .func("isnan", isnan)
        .func("isnanf", isnan)
        .func("isnanl", isnan)
        .func("isnormal", isnormal)
        .func("signbit", signbit)
        .func("isgreater", isgreater)
        .func("isgreaterequal", isgreaterequal)
        .func("isless", isless)
        .func("islessequal", islessequal)
        .func("islessgreater", islessgreater)
        .func("isunordered", isunordered)
        // Non-standard.
        .func("finite", isfinite)
        .func("finitef", isfinite)
        .func("finitel", isfinite)
        .func("__builtin_finite", isfinite)
        .func("__builtin_finitef", isfinite)
        .func("__builtin_finitel", isfinite)
        .func("__builtin_isinf", isinf)
        .func("__builtin_isinff", isinf)
        .func("__builtin_isinfl", isinf)
        .func("__builtin_isnan", isnan)
        .func("__builtin_isnanf", isnan)
        .func("__builtin_isnanl", isnan)
        .nyi_all(&["__builtin_clrsb", "__builtin_clrsbl", "__builtin_clrsbll"])
}

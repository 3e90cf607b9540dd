//! Calling convention between wasm callers and host stubs.
//!
//! Stubs are written once and bound to whatever numeric signature the importing module
//! declares. Arguments are read leniently (a missing argument reads as zero, and values are
//! converted between numeric types), and the single return value is converted to the declared
//! result type.

use wasmtime::{AsContextMut, Func, FuncType, Val, ValType};

use crate::{
    fault::Fault,
    host::Host,
    symbol::Stub,
    WasmlinkError, WasmlinkErrorKind,
};

/// Arguments passed to a stub.
#[derive(Clone, Copy)]
pub struct Args<'a>(&'a [Val]);

impl<'a> Args<'a> {
    pub fn new(vals: &'a [Val]) -> Self {
        Self(vals)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn i64(&self, idx: usize) -> i64 {
        match self.0.get(idx) {
            Some(Val::I32(v)) => *v as i64,
            Some(Val::I64(v)) => *v,
            Some(Val::F32(bits)) => f32::from_bits(*bits) as i64,
            Some(Val::F64(bits)) => f64::from_bits(*bits) as i64,
            _ => 0,
        }
    }

    pub fn i32(&self, idx: usize) -> i32 {
        match self.0.get(idx) {
            Some(Val::I32(v)) => *v,
            _ => self.i64(idx) as i32,
        }
    }

    pub fn u32(&self, idx: usize) -> u32 {
        self.i32(idx) as u32
    }

    /// An address in linear memory.
    pub fn ptr(&self, idx: usize) -> u32 {
        self.u32(idx)
    }

    pub fn f64(&self, idx: usize) -> f64 {
        match self.0.get(idx) {
            Some(Val::I32(v)) => *v as f64,
            Some(Val::I64(v)) => *v as f64,
            Some(Val::F32(bits)) => f32::from_bits(*bits) as f64,
            Some(Val::F64(bits)) => f64::from_bits(*bits),
            _ => 0.0,
        }
    }
}

/// The value a stub returns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ret {
    Void,
    I32(i32),
    I64(i64),
    F64(f64),
}

impl Ret {
    fn to_val(self, ty: &ValType) -> Val {
        match ty {
            ValType::I32 => Val::I32(match self {
                Ret::Void => 0,
                Ret::I32(v) => v,
                Ret::I64(v) => v as i32,
                Ret::F64(v) => v as i32,
            }),
            ValType::I64 => Val::I64(match self {
                Ret::Void => 0,
                Ret::I32(v) => v as i64,
                Ret::I64(v) => v,
                Ret::F64(v) => v as i64,
            }),
            ValType::F32 => Val::F32((self.as_f64() as f32).to_bits()),
            _ => Val::F64(self.as_f64().to_bits()),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Ret::Void => 0.0,
            Ret::I32(v) => v as f64,
            Ret::I64(v) => v as f64,
            Ret::F64(v) => v,
        }
    }
}

impl From<()> for Ret {
    fn from(_: ()) -> Self {
        Ret::Void
    }
}

impl From<i32> for Ret {
    fn from(value: i32) -> Self {
        Ret::I32(value)
    }
}

impl From<u32> for Ret {
    fn from(value: u32) -> Self {
        Ret::I32(value as i32)
    }
}

impl From<bool> for Ret {
    fn from(value: bool) -> Self {
        Ret::I32(value as i32)
    }
}

impl From<i64> for Ret {
    fn from(value: i64) -> Self {
        Ret::I64(value)
    }
}

impl From<f64> for Ret {
    fn from(value: f64) -> Self {
        Ret::F64(value)
    }
}

fn is_numeric(ty: &ValType) -> bool {
    matches!(ty, ValType::I32 | ValType::I64 | ValType::F32 | ValType::F64)
}

/// Stubs can be bound to any signature of numeric parameters with at most one numeric result.
pub(crate) fn check_signature(ty: &FuncType) -> bool {
    ty.params().all(|p| is_numeric(&p))
        && ty.results().len() <= 1
        && ty.results().all(|r| is_numeric(&r))
}

/// Create a host function for `stub` with the signature `ty` requested by an importer.
pub(crate) fn bind_stub(
    store: impl AsContextMut<Data = Host>,
    name: &'static str,
    stub: Stub,
    ty: FuncType,
) -> Result<Func, WasmlinkError> {
    if !check_signature(&ty) {
        return Err(WasmlinkErrorKind::StubSignature {
            name: name.to_string(),
            signature: format!("{:?}", ty),
        }
        .into());
    }
    let result_ty: Option<ValType> = ty.results().next();
    let func = match stub {
        Stub::Func(f) => Func::new(store, ty, move |mut caller, params, results| {
            let ret = f(&mut caller, Args::new(params))?;
            if let (Some(slot), Some(rty)) = (results.first_mut(), result_ty.as_ref()) {
                *slot = ret.to_val(rty);
            }
            Ok(())
        }),
        Stub::Unimplemented => Func::new(store, ty, move |_caller, _params, _results| {
            Err(Fault::nyi(name).into_error())
        }),
    };
    Ok(func)
}

#[cfg(test)]
mod tests {
    use wasmtime::Engine;

    use super::*;

    #[test]
    fn args_convert_between_numeric_types() {
        let vals = [Val::I32(-1), Val::F64(2.5f64.to_bits()), Val::I64(1 << 40)];
        let args = Args::new(&vals);
        assert_eq!(args.u32(0), u32::MAX);
        assert_eq!(args.f64(1), 2.5);
        assert_eq!(args.i32(1), 2);
        assert_eq!(args.i64(2), 1 << 40);
        assert_eq!(args.i32(7), 0);
    }

    #[test]
    fn returns_follow_the_declared_type() {
        assert!(matches!(Ret::F64(3.9).to_val(&ValType::I32), Val::I32(3)));
        assert!(matches!(Ret::Void.to_val(&ValType::I64), Val::I64(0)));
        match Ret::I32(2).to_val(&ValType::F64) {
            Val::F64(bits) => assert_eq!(f64::from_bits(bits), 2.0),
            _ => panic!("expected f64"),
        }
    }

    #[test]
    fn only_numeric_signatures_bind() {
        let engine = Engine::default();
        let ok = FuncType::new(&engine, [ValType::I32, ValType::F64], [ValType::I32]);
        let two_results = FuncType::new(&engine, [], [ValType::I32, ValType::I32]);
        let reference = FuncType::new(&engine, [ValType::EXTERNREF], []);
        assert!(check_signature(&ok));
        assert!(!check_signature(&two_results));
        assert!(!check_signature(&reference));
    }
}

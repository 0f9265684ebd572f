//! Typed adapters between host function signatures and script values.
//!
//! The binder API accepts either a raw [`NativeFunction`] or an arbitrary
//! host closure whose parameters implement [`FromValue`] and whose return
//! implements [`IntoCallResult`]; the adapter is generated at define time.

use std::rc::Rc;

use crate::{FunctionCall, NativeFunction, SandboxError, SandboxResult, Value};

pub trait FromValue: Sized {
    fn from_value(value: Value) -> SandboxResult<Self>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> SandboxResult<Self> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> SandboxResult<Self> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(SandboxError::type_error(format!(
                "expected string, got {}",
                other.type_name()
            ))),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> SandboxResult<Self> {
        value.as_number().ok_or_else(|| {
            SandboxError::type_error(format!("expected number, got {}", value.type_name()))
        })
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> SandboxResult<Self> {
        f64::from_value(value).map(|n| n as i64)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> SandboxResult<Self> {
        value.as_bool().ok_or_else(|| {
            SandboxError::type_error(format!("expected boolean, got {}", value.type_name()))
        })
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> SandboxResult<Self> {
        if value.is_defined() {
            T::from_value(value).map(Some)
        } else {
            Ok(None)
        }
    }
}

pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl<T: Into<Value>> IntoValue for T {
    fn into_value(self) -> Value {
        self.into()
    }
}

/// Return position of adapted host functions: plain values or fallible
/// results both work.
pub trait IntoCallResult {
    fn into_call_result(self) -> SandboxResult<Value>;
}

impl<T: IntoValue> IntoCallResult for T {
    fn into_call_result(self) -> SandboxResult<Value> {
        Ok(self.into_value())
    }
}

impl<T: IntoValue> IntoCallResult for SandboxResult<T> {
    fn into_call_result(self) -> SandboxResult<Value> {
        self.map(IntoValue::into_value)
    }
}

/// Host closures adaptable to [`NativeFunction`] at define time. The
/// `Args` parameter disambiguates arities.
pub trait HostFunction<Args> {
    fn into_native(self) -> NativeFunction;
}

macro_rules! impl_host_function {
    ($(($($arg:ident : $idx:tt),*)),+ $(,)?) => {
        $(
            impl<F, R, $($arg,)*> HostFunction<($($arg,)*)> for F
            where
                F: Fn($($arg),*) -> R + 'static,
                R: IntoCallResult,
                $($arg: FromValue,)*
            {
                fn into_native(self) -> NativeFunction {
                    Rc::new(move |call: FunctionCall| {
                        let _ = &call;
                        self($($arg::from_value(call.argument($idx))?),*).into_call_result()
                    })
                }
            }
        )+
    };
}

impl_host_function!(
    (),
    (A0: 0),
    (A0: 0, A1: 1),
    (A0: 0, A1: 1, A2: 2),
    (A0: 0, A1: 1, A2: 2, A3: 3),
);

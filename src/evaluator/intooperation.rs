//! Adapters from typed Rust functions to the erased builtin signature.
//!
//! A builtin is written as an ordinary function, for example
//! `fn builtin_put(map: ValueMap, key: Value, value: Value) -> Value`, and
//! stored as an [`OperationFn`]. Each parameter type decides how one argument
//! is extracted ([`FromParam`]), a trailing [`ValueIter`], [`NumIter`] or
//! [`StringIter`] takes all remaining arguments ([`FromRest`]), and the
//! return type decides how the result becomes a value ([`IntoValueResult`]).
//!
//! Type mismatches surface as `TypeError`s before the function body runs.

use crate::Error;
use crate::value::{Number, Value};
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::sync::Arc;

/// Erased builtin function. Arguments are passed by value so a builtin may
/// consume them.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error> + Send + Sync;

/// Extraction of one positional argument.
///
/// `Param<'a>` may borrow from the argument slot (`&str`) or take it over
/// (`Value`, `Vec<Value>`).
pub trait FromParam {
    type Param<'a>;

    fn from_arg(value: &mut Value) -> Result<Self::Param<'_>, Error>;
}

impl FromParam for Value {
    type Param<'a> = Value;

    fn from_arg(value: &mut Value) -> Result<Value, Error> {
        Ok(std::mem::replace(value, Value::Null))
    }
}

// Scalars and containers with a `TryInto` conversion in `value.rs`:
// `i64`, `Number`, `ValueMap` and `Vec<Value>`.
impl<T> FromParam for T
where
    Value: TryInto<T, Error = Error>,
{
    type Param<'a> = T;

    fn from_arg(value: &mut Value) -> Result<T, Error> {
        std::mem::replace(value, Value::Null).try_into()
    }
}

impl FromParam for &str {
    type Param<'a> = &'a str;

    fn from_arg(value: &mut Value) -> Result<&str, Error> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(Error::TypeError(format!(
                "expected str, got {}",
                other.type_name()
            ))),
        }
    }
}

/// Element type of a rest parameter
#[doc(hidden)]
pub trait ArgKind {
    type Item<'a>;

    fn view(value: &Value) -> Result<Self::Item<'_>, Error>;
}

#[doc(hidden)]
pub struct AnyArg;

impl ArgKind for AnyArg {
    type Item<'a> = &'a Value;

    fn view(value: &Value) -> Result<&Value, Error> {
        Ok(value)
    }
}

#[doc(hidden)]
pub struct NumberArg;

impl ArgKind for NumberArg {
    type Item<'a> = Number;

    fn view(value: &Value) -> Result<Number, Error> {
        value.as_number().ok_or_else(|| {
            Error::TypeError(format!("expected number, got {}", value.type_name()))
        })
    }
}

#[doc(hidden)]
pub struct StrArg;

impl ArgKind for StrArg {
    type Item<'a> = &'a str;

    fn view(value: &Value) -> Result<&str, Error> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(Error::TypeError(format!(
                "expected str, got {}",
                other.type_name()
            ))),
        }
    }
}

/// Iterator over the remaining arguments of a call. Every element is
/// checked when the iterator is built, so iteration itself cannot fail.
pub struct ArgIter<'a, K: ArgKind> {
    rest: std::slice::Iter<'a, Value>,
    kind: PhantomData<K>,
}

impl<'a, K: ArgKind> ArgIter<'a, K> {
    fn new(values: &'a [Value]) -> Result<Self, Error> {
        values.iter().try_for_each(|v| K::view(v).map(drop))?;
        Ok(ArgIter {
            rest: values.iter(),
            kind: PhantomData,
        })
    }
}

impl<'a, K: ArgKind> Iterator for ArgIter<'a, K> {
    type Item = K::Item<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rest.find_map(|v| K::view(v).ok())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rest.size_hint()
    }
}

impl<K: ArgKind> ExactSizeIterator for ArgIter<'_, K> {}
impl<K: ArgKind> FusedIterator for ArgIter<'_, K> {}

/// Remaining arguments as `&Value`
pub type ValueIter<'a> = ArgIter<'a, AnyArg>;

/// Remaining arguments as [`Number`]s
pub type NumIter<'a> = ArgIter<'a, NumberArg>;

/// Remaining arguments as `&str`
pub type StringIter<'a> = ArgIter<'a, StrArg>;

/// Construction of a rest parameter from the trailing argument slice.
/// Registered with a `'static` placeholder lifetime, e.g.
/// `(Number, NumIter<'static>)`.
pub trait FromRest {
    type Param<'a>;

    fn from_rest(rest: &[Value]) -> Result<Self::Param<'_>, Error>;
}

impl<K: ArgKind> FromRest for ArgIter<'static, K> {
    type Param<'a> = ArgIter<'a, K>;

    fn from_rest(rest: &[Value]) -> Result<ArgIter<'_, K>, Error> {
        ArgIter::new(rest)
    }
}

/// Normalizes builtin return types: anything convertible into a `Value`,
/// or a `Result` of one.
pub trait IntoValueResult {
    fn into_value_result(self) -> Result<Value, Error>;
}

impl<T: Into<Value>> IntoValueResult for Result<T, Error> {
    fn into_value_result(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

impl<T: Into<Value>> IntoValueResult for T {
    fn into_value_result(self) -> Result<Value, Error> {
        Ok(self.into())
    }
}

/// Functions with a fixed parameter list, keyed by the tuple of parameter
/// types.
pub trait IntoOperation<Args> {
    fn into_operation(self) -> Arc<OperationFn>;
}

/// Functions whose last parameter collects the remaining arguments, keyed
/// by the tuple of parameter types ending in the rest type.
pub trait IntoVariadicOperation<Args> {
    fn into_variadic_operation(self) -> Arc<OperationFn>;
}

impl<F, R> IntoOperation<()> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoValueResult,
{
    fn into_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| {
            if !args.is_empty() {
                return Err(Error::arity_error("builtin", 0, args.len()));
            }
            (self)().into_value_result()
        })
    }
}

impl<F, I, R> IntoVariadicOperation<(I,)> for F
where
    I: FromRest,
    F: for<'a> Fn(I::Param<'a>) -> R + Send + Sync + 'static,
    R: IntoValueResult,
{
    fn into_variadic_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| (self)(I::from_rest(&args)?).into_value_result())
    }
}

// Both adapter shapes for `n` leading positional parameters
macro_rules! impl_operation_adapters {
    ($n:literal; $( $slot:ident : $A:ident ),+) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            $( $A: FromParam, )+
            F: for<'a> Fn( $( $A::Param<'a> ),+ ) -> R + Send + Sync + 'static,
            R: IntoValueResult,
        {
            fn into_operation(self) -> Arc<OperationFn> {
                Arc::new(move |mut args: Vec<Value>| {
                    let got = args.len();
                    let [ $( $slot ),+ ] = args.as_mut_slice() else {
                        return Err(Error::arity_error("builtin", $n, got));
                    };
                    (self)( $( $A::from_arg($slot)? ),+ ).into_value_result()
                })
            }
        }

        impl<F, I, R, $( $A ),+> IntoVariadicOperation<( $( $A, )+ I, )> for F
        where
            $( $A: FromParam, )+
            I: FromRest,
            F: for<'a> Fn( $( $A::Param<'a>, )+ I::Param<'a> ) -> R + Send + Sync + 'static,
            R: IntoValueResult,
        {
            fn into_variadic_operation(self) -> Arc<OperationFn> {
                Arc::new(move |mut args: Vec<Value>| {
                    let got = args.len();
                    let [ $( $slot, )+ rest @ .. ] = args.as_mut_slice() else {
                        return Err(Error::arity_error("builtin", format!("at least {}", $n), got));
                    };
                    let rest: &[Value] = rest;
                    (self)( $( $A::from_arg($slot)?, )+ I::from_rest(rest)? ).into_value_result()
                })
            }
        }
    };
}

impl_operation_adapters!(1; a1: A1);
impl_operation_adapters!(2; a1: A1, a2: A2);
impl_operation_adapters!(3; a1: A1, a2: A2, a3: A3);
impl_operation_adapters!(4; a1: A1, a2: A2, a3: A3, a4: A4);

//! Tuples of deferred values as composer inputs.
//!
//! `(Deferred<A>, Deferred<B>, ...)` implements [`DeferredTuple`] for up to
//! six elements, so `combine` can hand the continuation `(A, B, ...)` with
//! each element's own type.

use std::any::Any;

use super::composer::{Deferred, Erased, Value};
use crate::domain::ValueId;

/// A fixed-size group of deferred values.
pub trait DeferredTuple {
    /// Owned values handed to the continuation once every input resolved.
    type Values;

    fn ids(&self) -> Vec<ValueId>;

    /// `None` when a slot holds an unexpected type.
    fn extract(values: &[Erased]) -> Option<Self::Values>;
}

pub(crate) fn downcast<T: Value>(value: &Erased) -> Option<&T> {
    let any: &(dyn Any + Send + Sync) = &**value;
    any.downcast_ref::<T>()
}

macro_rules! impl_deferred_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Value),+> DeferredTuple for ($(Deferred<$name>,)+) {
            type Values = ($($name,)+);

            fn ids(&self) -> Vec<ValueId> {
                vec![$(self.$idx.id()),+]
            }

            fn extract(values: &[Erased]) -> Option<Self::Values> {
                Some(($(downcast::<$name>(values.get($idx)?)?.clone(),)+))
            }
        }
    };
}

impl_deferred_tuple!(A: 0);
impl_deferred_tuple!(A: 0, B: 1);
impl_deferred_tuple!(A: 0, B: 1, C: 2);
impl_deferred_tuple!(A: 0, B: 1, C: 2, D: 3);
impl_deferred_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_deferred_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

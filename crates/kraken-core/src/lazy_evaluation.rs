//! Lazily evaluated values ("suppliers") that can be chained together and whose lineage can be
//! walked to discover implicit dependencies between tasks.
//!
//! A [`Supplier`] is a value that may or may not be available yet. Properties (see
//! [`crate::property`]) are the mutable, ownable kind; the combinators here (`map`, `flat_map`,
//! `zip`) build read-only suppliers derived from one or more others.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// An upstream node in a supplier's lineage. Kept separate from [`Supplier<T>`] so that a chain
/// of suppliers over unrelated value types can still be walked without erasing `T` everywhere.
pub trait Lineage: Send + Sync {
    /// The task address that owns this node, if any. Used to infer task relationships from
    /// property assignment without the caller declaring them explicitly.
    fn owner_task(&self) -> Option<crate::address::Address> {
        None
    }

    /// Nodes this one was itself derived from, innermost first.
    fn derived_from(&self) -> Vec<Arc<dyn Lineage>> {
        Vec::new()
    }
}

/// A value that can be produced on demand. See the module docs.
pub trait Supplier<T: Clone + Send + Sync>: Lineage {
    fn missing_message(&self) -> String {
        String::from("no value present")
    }

    fn get(&self) -> T {
        self.try_get().unwrap_or_else(|| panic!("{}", self.missing_message()))
    }

    fn try_get(&self) -> Option<T>;

    fn fallible_get(&self) -> Result<T, SupplierError> {
        self.try_get()
            .ok_or_else(|| SupplierError::new(self.missing_message()))
    }
}

assert_obj_safe!(Supplier<()>);

/// Combinators over [`Supplier`] that aren't object-safe, so live in their own trait.
pub trait SupplierExt<T: Clone + Send + Sync>: Supplier<T> + Sized {
    fn map<R, F>(self, transform: F) -> Map<T, R, F, Self>
    where
        R: Send + Sync + Clone,
        F: Fn(T) -> R + Send + Sync,
        Self: 'static,
    {
        Map::new(self, transform)
    }

    fn flat_map<R, P, F>(self, transform: F) -> FlatMap<T, R, Self, P, F>
    where
        R: Send + Sync + Clone,
        P: Supplier<R>,
        F: Fn(T) -> P + Send + Sync,
        Self: 'static,
    {
        FlatMap::new(self, transform)
    }

    fn flatten<B>(self) -> Flatten<T, B, Self>
    where
        Self: Clone + 'static,
        T: Supplier<B>,
        B: Clone + Send + Sync,
    {
        self.flat_map(|s| s)
    }

    fn zip<P, B, R, F>(self, other: P, func: F) -> Zip<T, B, R, F>
    where
        Self: 'static,
        P: IntoSupplier<B>,
        <P as IntoSupplier<B>>::Supplier: 'static,
        B: Send + Sync + Clone,
        R: Send + Sync + Clone,
        F: Fn(T, B) -> R + Send + Sync,
    {
        Zip::new(self, other, func)
    }
}

impl<P, T> SupplierExt<T> for P
where
    T: Clone + Send + Sync,
    P: Supplier<T> + Send + Sync + 'static,
{
}

/// Things convertible into a [`Supplier`]. Plain values are wrapped in a fixed [`Value`].
pub trait IntoSupplier<T: Send + Sync + Clone> {
    type Supplier: Supplier<T>;

    fn into_supplier(self) -> Self::Supplier;
}

impl<P, T> IntoSupplier<T> for P
where
    T: Clone + Send + Sync,
    P: Supplier<T> + Send + Sync,
{
    type Supplier = Self;

    fn into_supplier(self) -> Self::Supplier {
        self
    }
}

/// A supplier with a single, already-known value. The base case of most supplier chains.
#[derive(Clone, Debug)]
pub struct Value<T: Clone + Send + Sync>(T);

impl<T: Clone + Send + Sync> Value<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T: Clone + Send + Sync> Lineage for Value<T> {}

impl<T: Clone + Send + Sync> Supplier<T> for Value<T> {
    fn try_get(&self) -> Option<T> {
        Some(self.0.clone())
    }
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct SupplierError {
    message: String,
}

impl SupplierError {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

/// See [`SupplierExt::map`].
#[derive(Clone)]
pub struct Map<T, R, F, P>
where
    T: Send + Sync + Clone,
    R: Send + Sync + Clone,
    F: Fn(T) -> R + Send + Sync,
    P: Supplier<T>,
{
    inner: P,
    transform: F,
    _data: PhantomData<(T, R)>,
}

impl<T, R, F, P> Map<T, R, F, P>
where
    T: Send + Sync + Clone,
    R: Send + Sync + Clone,
    F: Fn(T) -> R + Send + Sync,
    P: Supplier<T>,
{
    pub(crate) fn new(inner: P, transform: F) -> Self {
        Self {
            inner,
            transform,
            _data: PhantomData,
        }
    }
}

impl<T, R, F, P> Lineage for Map<T, R, F, P>
where
    T: Send + Sync + Clone,
    R: Send + Sync + Clone,
    F: Fn(T) -> R + Send + Sync,
    P: Supplier<T> + Clone + 'static,
{
    fn derived_from(&self) -> Vec<Arc<dyn Lineage>> {
        vec![Arc::new(self.inner.clone()) as Arc<dyn Lineage>]
    }
}

impl<T, R, F, P> Supplier<R> for Map<T, R, F, P>
where
    T: Send + Sync + Clone,
    R: Send + Sync + Clone,
    F: Fn(T) -> R + Send + Sync,
    P: Supplier<T> + Clone + 'static,
{
    fn missing_message(&self) -> String {
        self.inner.missing_message()
    }

    fn try_get(&self) -> Option<R> {
        self.inner.try_get().map(|v| (self.transform)(v))
    }
}

/// See [`SupplierExt::flat_map`].
#[derive(Clone)]
pub struct FlatMap<T, R, PT, PR, F>
where
    T: Send + Sync + Clone,
    R: Send + Sync + Clone,
    PT: Supplier<T>,
    PR: Supplier<R>,
    F: Fn(T) -> PR + Send + Sync,
{
    inner: PT,
    transform: F,
    _data: PhantomData<(R, T, PR)>,
}

impl<T, R, PT, PR, F> FlatMap<T, R, PT, PR, F>
where
    T: Send + Sync + Clone,
    R: Send + Sync + Clone,
    PT: Supplier<T>,
    PR: Supplier<R>,
    F: Fn(T) -> PR + Send + Sync,
{
    pub(crate) fn new(inner: PT, transform: F) -> Self {
        Self {
            inner,
            transform,
            _data: PhantomData,
        }
    }
}

impl<T, R, PT, PR, F> Lineage for FlatMap<T, R, PT, PR, F>
where
    T: Send + Sync + Clone,
    R: Send + Sync + Clone,
    PT: Supplier<T> + Clone + 'static,
    PR: Supplier<R>,
    F: Fn(T) -> PR + Send + Sync,
{
    fn derived_from(&self) -> Vec<Arc<dyn Lineage>> {
        vec![Arc::new(self.inner.clone()) as Arc<dyn Lineage>]
    }
}

impl<T, R, PT, PR, F> Supplier<R> for FlatMap<T, R, PT, PR, F>
where
    T: Send + Sync + Clone,
    R: Send + Sync + Clone,
    PT: Supplier<T> + Clone + 'static,
    PR: Supplier<R>,
    F: Fn(T) -> PR + Send + Sync,
{
    fn missing_message(&self) -> String {
        self.inner.missing_message()
    }

    fn try_get(&self) -> Option<R> {
        self.inner
            .try_get()
            .and_then(|gotten| (self.transform)(gotten).try_get())
    }
}

/// Flattens a supplier of suppliers into a supplier of the inner value.
pub type Flatten<T, B, P> = FlatMap<T, B, P, T, fn(T) -> T>;

impl<T: Clone + Send + Sync> Lineage for Arc<dyn Supplier<T>> {
    fn owner_task(&self) -> Option<crate::address::Address> {
        self.as_ref().owner_task()
    }

    fn derived_from(&self) -> Vec<Arc<dyn Lineage>> {
        self.as_ref().derived_from()
    }
}

impl<T: Clone + Send + Sync> Supplier<T> for Arc<dyn Supplier<T>> {
    fn missing_message(&self) -> String {
        self.as_ref().missing_message()
    }

    fn try_get(&self) -> Option<T> {
        self.as_ref().try_get()
    }
}

/// See [`SupplierExt::zip`]. Keeps both sides behind an `Arc<dyn Supplier<_>>` so the two halves
/// don't need to share a concrete type.
#[derive(Clone)]
pub struct Zip<T, B, R, F>
where
    T: Send + Sync + Clone,
    B: Send + Sync + Clone,
    R: Send + Sync + Clone,
    F: Fn(T, B) -> R + Send + Sync,
{
    left: Arc<dyn Supplier<T>>,
    right: Arc<dyn Supplier<B>>,
    transform: F,
}

impl<T, B, R, F> Zip<T, B, R, F>
where
    T: Send + Sync + Clone,
    B: Send + Sync + Clone,
    R: Send + Sync + Clone,
    F: Fn(T, B) -> R + Send + Sync,
{
    pub fn new<PL, PR>(left: PL, right: PR, transform: F) -> Self
    where
        PL: IntoSupplier<T>,
        <PL as IntoSupplier<T>>::Supplier: 'static,
        PR: IntoSupplier<B>,
        <PR as IntoSupplier<B>>::Supplier: 'static,
    {
        Self {
            left: Arc::new(left.into_supplier()),
            right: Arc::new(right.into_supplier()),
            transform,
        }
    }
}

impl<T, B, R, F> Lineage for Zip<T, B, R, F>
where
    T: Send + Sync + Clone,
    B: Send + Sync + Clone,
    R: Send + Sync + Clone,
    F: Fn(T, B) -> R + Send + Sync,
{
    fn derived_from(&self) -> Vec<Arc<dyn Lineage>> {
        vec![self.left.clone() as Arc<dyn Lineage>, self.right.clone() as Arc<dyn Lineage>]
    }
}

impl<T, B, R, F> Supplier<R> for Zip<T, B, R, F>
where
    T: Send + Sync + Clone,
    B: Send + Sync + Clone,
    R: Send + Sync + Clone,
    F: Fn(T, B) -> R + Send + Sync,
{
    fn missing_message(&self) -> String {
        format!("{} or {}", self.left.missing_message(), self.right.missing_message())
    }

    fn try_get(&self) -> Option<R> {
        let left = self.left.try_get();
        let right = self.right.try_get();
        left.zip(right).map(|(l, r)| (self.transform)(l, r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Property;

    #[test]
    fn map_reflects_current_value() {
        let mut prop = Property::with_value(5);
        let mapped = prop.clone().map(|v| v * v);
        assert_eq!(mapped.get(), 25);
        prop.set(10).unwrap();
        assert_eq!(mapped.get(), 100);
    }

    #[test]
    fn zip_combines_two_suppliers() {
        let mut left = Property::with_value(5);
        let mut right = Property::with_value(6);
        let zipped = left.clone().zip(right.clone(), |l, r| l * r);
        assert_eq!(zipped.get(), 30);
        left.set(10).unwrap();
        assert_eq!(zipped.get(), 60);
    }

    #[test]
    fn flat_map_chases_nested_supplier() {
        let mut outer = Property::with_value(5u32);
        let chased = outer.clone().flat_map(|v| Value::new(v * v));
        assert_eq!(chased.get(), 25);
        outer.set(10u32).unwrap();
        assert_eq!(chased.get(), 100);
    }

    #[test]
    fn map_keeps_the_inner_supplier_in_its_lineage() {
        let owner: crate::address::Address = ":producer".parse().unwrap();
        let producer = Property::new_output(Some(owner.clone()), "output");
        producer.set(5).unwrap();

        let mapped = producer.clone().map(|v| v * 2);
        let lineage = mapped.derived_from();
        assert_eq!(lineage.len(), 1, "map must not drop the inner supplier from its lineage");
        assert_eq!(lineage[0].owner_task(), Some(owner));
    }

    #[test]
    fn flat_map_keeps_the_inner_supplier_in_its_lineage() {
        let owner: crate::address::Address = ":producer".parse().unwrap();
        let producer = Property::new_output(Some(owner.clone()), "output");
        producer.set(5u32).unwrap();

        let chased = producer.clone().flat_map(|v| Value::new(v * v));
        let lineage = chased.derived_from();
        assert_eq!(lineage.len(), 1, "flat_map must not drop the inner supplier from its lineage");
        assert_eq!(lineage[0].owner_task(), Some(owner));
    }
}

//! Properties: the mutable, lazily evaluated fields that make up a task's or project's public
//! surface. A property starts either empty (an input waiting to be set) or deferred (an output
//! whose value is only known once the owning task has run).

use crate::address::Address;
use crate::error::{KrakenError, Result};
use crate::lazy_evaluation::{IntoSupplier, Lineage, Supplier, SupplierExt, Value};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Object-safe view of a [`Property`] with its type erased, used to walk lineage across an
/// entire task or project without knowing every property's concrete value type.
pub trait AnyProperty: Lineage {
    fn name(&self) -> String;
    fn is_set(&self) -> bool;
}

impl<T: Clone + Send + Sync> Supplier<T> for EmptyOf<T> {
    fn missing_message(&self) -> String {
        format!("{} has no value set", self.label)
    }

    fn try_get(&self) -> Option<T> {
        None
    }
}

struct EmptyOf<T> {
    label: String,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Clone + Send + Sync> Lineage for EmptyOf<T> {}

struct Deferred<T> {
    label: String,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Clone + Send + Sync> Lineage for Deferred<T> {}

impl<T: Clone + Send + Sync> Supplier<T> for Deferred<T> {
    fn missing_message(&self) -> String {
        format!("the value of {} will be known at a later time", self.label)
    }

    fn try_get(&self) -> Option<T> {
        None
    }
}

struct PropertyState<T: Clone + Send + Sync> {
    owner: Option<Address>,
    name: String,
    value: Arc<dyn Supplier<T>>,
    derived_from: Vec<Arc<dyn Lineage>>,
    deferred: bool,
    finalized: bool,
    error_message: Option<String>,
}

/// A lazily evaluated, possibly-finalized field. Cloning a `Property` clones the handle, not the
/// value: both handles observe the same underlying state.
pub struct Property<T: Clone + Send + Sync + 'static> {
    inner: Arc<RwLock<PropertyState<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + fmt::Debug + 'static> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.read();
        write!(f, "Property({})", state.name)
    }
}

impl<T: Clone + Send + Sync + 'static> Property<T> {
    /// A new, empty property owned by `owner`. Plain inputs use this; call [`Property::set`]
    /// before the property is read.
    pub fn new(owner: Option<Address>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            inner: Arc::new(RwLock::new(PropertyState {
                owner,
                value: Arc::new(EmptyOf {
                    label: name.clone(),
                    _marker: std::marker::PhantomData,
                }),
                name,
                derived_from: vec![],
                deferred: false,
                finalized: false,
                error_message: None,
            })),
        }
    }

    /// A property that starts deferred: reading it before it is set raises
    /// [`KrakenError::PropertyDeferred`] rather than [`KrakenError::PropertyEmpty`]. Used for a
    /// task's declared output properties.
    pub fn new_output(owner: Option<Address>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            inner: Arc::new(RwLock::new(PropertyState {
                owner,
                value: Arc::new(Deferred {
                    label: name.clone(),
                    _marker: std::marker::PhantomData,
                }),
                name,
                derived_from: vec![],
                deferred: true,
                finalized: false,
                error_message: None,
            })),
        }
    }

    /// Convenience constructor for a standalone property with no owner, pre-set to `value`.
    /// Mostly useful in tests and for plain supplier chains.
    pub fn with_value(value: T) -> Self {
        let prop = Self::new(None, "<anonymous>");
        prop.set(value).expect("freshly constructed property cannot be finalized");
        prop
    }

    pub fn name(&self) -> String {
        self.inner.read().name.clone()
    }

    pub fn owner(&self) -> Option<Address> {
        self.inner.read().owner.clone()
    }

    /// The currently assigned value as a type-erased supplier, for lineage inspection.
    pub fn value(&self) -> Arc<dyn Supplier<T>> {
        self.inner.read().value.clone()
    }

    fn check_not_finalized(&self) -> Result<()> {
        if self.inner.read().finalized {
            return Err(KrakenError::PropertyFinalized {
                property: self.name(),
            });
        }
        Ok(())
    }

    /// Assigns a concrete value, replacing whatever was there before.
    pub fn set(&self, value: T) -> Result<()> {
        self.check_not_finalized()?;
        let mut state = self.inner.write();
        state.value = Arc::new(Value::new(value));
        state.derived_from = vec![];
        Ok(())
    }

    /// Assigns a value derived from other suppliers, recording them for lineage inspection (this
    /// is how implicit task ordering is inferred: see [`crate::task::Task::relationships`]).
    pub fn set_derived(&self, value: impl Supplier<T> + 'static, derived_from: Vec<Arc<dyn Lineage>>) -> Result<()> {
        self.check_not_finalized()?;
        let mut state = self.inner.write();
        state.value = Arc::new(value);
        state.derived_from = derived_from;
        Ok(())
    }

    /// Assigns the value only if the property is currently unset.
    pub fn set_default(&self, value: T) -> Result<()> {
        if self.is_set() {
            return Ok(());
        }
        self.set(value)
    }

    /// Assigns a value and immediately finalizes the property.
    pub fn set_final(&self, value: T) -> Result<()> {
        self.set(value)?;
        self.finalize();
        Ok(())
    }

    /// Replaces the value with one derived by mapping the current value.
    pub fn set_map(&self, transform: impl Fn(T) -> T + Send + Sync + 'static) -> Result<()> {
        self.check_not_finalized()?;
        let mut state = self.inner.write();
        let mapped = state.value.clone().into_supplier().map(transform);
        state.value = Arc::new(mapped);
        Ok(())
    }

    /// Attaches a message surfaced alongside [`KrakenError::PropertyEmpty`] when the property is
    /// read without a value.
    pub fn set_error_message(&self, message: impl Into<String>) {
        self.inner.write().error_message = Some(message.into());
    }

    pub fn clear(&self) -> Result<()> {
        self.check_not_finalized()?;
        let mut state = self.inner.write();
        state.value = Arc::new(EmptyOf {
            label: state.name.clone(),
            _marker: std::marker::PhantomData,
        });
        state.derived_from = vec![];
        Ok(())
    }

    /// Prevents any further modification. Idempotent.
    pub fn finalize(&self) {
        self.inner.write().finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.inner.read().finalized
    }

    /// True once [`Property::set`] (or similar) has been called, regardless of whether the value
    /// can currently be retrieved. Distinct from [`Property::is_empty`], which forces evaluation.
    pub fn is_set(&self) -> bool {
        !self.inner.read().deferred_or_initial()
    }

    pub fn is_empty(&self) -> bool {
        self.try_get().is_none()
    }

    /// Reads the current value, translating an unset input into
    /// [`KrakenError::PropertyEmpty`] and an unset output into
    /// [`KrakenError::PropertyDeferred`].
    pub fn get(&self) -> Result<T> {
        let (value, deferred, error_message, name) = {
            let state = self.inner.read();
            (state.value.clone(), state.deferred, state.error_message.clone(), state.name.clone())
        };
        value.try_get().ok_or_else(|| {
            if deferred {
                KrakenError::PropertyDeferred { property: name }
            } else {
                KrakenError::PropertyEmpty {
                    property: name,
                    message: error_message,
                }
            }
        })
    }
}

impl<T: Clone + Send + Sync + 'static> PropertyState<T> {
    fn deferred_or_initial(&self) -> bool {
        self.value.try_get().is_none() && self.derived_from.is_empty()
    }
}

impl<T: Clone + Send + Sync + 'static> Lineage for Property<T> {
    fn owner_task(&self) -> Option<Address> {
        self.owner()
    }

    fn derived_from(&self) -> Vec<Arc<dyn Lineage>> {
        let state = self.inner.read();
        let mut out: Vec<Arc<dyn Lineage>> = vec![state.value.clone() as Arc<dyn Lineage>];
        out.extend(state.value.derived_from());
        out.extend(state.derived_from.iter().cloned());
        out
    }
}

impl<T: Clone + Send + Sync + 'static> Supplier<T> for Property<T> {
    fn missing_message(&self) -> String {
        self.inner.read().value.missing_message()
    }

    fn try_get(&self) -> Option<T> {
        self.inner.read().value.try_get()
    }
}

impl<T: Clone + Send + Sync + 'static> AnyProperty for Property<T> {
    fn name(&self) -> String {
        Property::name(self)
    }

    fn is_set(&self) -> bool {
        Property::is_set(self)
    }
}

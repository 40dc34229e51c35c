//! Host objects and the uniform call surface they expose.
//!
//! Every object the host hands out implements [`RemoteObject`]. Most types
//! do so through [`Exposed`], which pairs a textual representation with a
//! static [`MethodTable`] built once per type:
//!
//! ```rust,ignore
//! use daisychain_core::{CallArgs, Exposed, MethodTable, Result, Value};
//! use std::sync::LazyLock;
//!
//! struct Timeline { name: String }
//!
//! static TIMELINE_METHODS: LazyLock<MethodTable<Timeline>> = LazyLock::new(|| {
//!     MethodTable::<Timeline>::new("Timeline").method("GetName", |t, _| Ok(t.name.clone().into()))
//! });
//!
//! impl Exposed for Timeline {
//!     fn repr(&self) -> Result<String> {
//!         Ok(format!("Timeline [name: '{}']", self.name))
//!     }
//!     fn methods() -> &'static MethodTable<Self> {
//!         &TIMELINE_METHODS
//!     }
//! }
//! ```

use crate::value::Value;
use crate::{DaisyError, Result};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Shared handle to a live host object.
pub type ObjectHandle = Arc<dyn RemoteObject>;

/// Capability every object reachable through the bridge provides.
pub trait RemoteObject: Send + Sync {
    /// Textual form the reference id is derived from.
    ///
    /// Fails when the object has no stable representation; the serializer
    /// reports that as a `SerializationError`.
    fn repr(&self) -> Result<String>;

    /// Whether `name` is a method this object answers to.
    fn has_method(&self, name: &str) -> bool;

    /// Invoke method `name`.
    fn invoke(&self, name: &str, args: CallArgs) -> Result<Value>;

    fn as_any(&self) -> &dyn Any;
}

/// Signature of a method stored in a [`MethodTable`].
pub type Method<T> = fn(&T, &CallArgs) -> Result<Value>;

/// Name to function table for one exposed type.
///
/// Names are checked when the table is built: an empty or duplicate name
/// panics, so a broken table fails on first use of the type instead of on
/// some later call.
pub struct MethodTable<T> {
    type_name: &'static str,
    methods: HashMap<&'static str, Method<T>>,
}

impl<T> MethodTable<T> {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            methods: HashMap::new(),
        }
    }

    /// Register `name`. Panics on an empty or already registered name.
    pub fn method(mut self, name: &'static str, method: Method<T>) -> Self {
        assert!(
            !name.is_empty(),
            "{}: method names must not be empty",
            self.type_name
        );
        let previous = self.methods.insert(name, method);
        assert!(
            previous.is_none(),
            "{}: method '{}' registered twice",
            self.type_name,
            name
        );
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Registered method names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.methods.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn call(&self, target: &T, name: &str, args: &CallArgs) -> Result<Value> {
        let method = self.methods.get(name).ok_or_else(|| DaisyError::Attribute {
            type_name: self.type_name.to_string(),
            method: name.to_string(),
        })?;
        method(target, args)
    }
}

/// Shortcut for types whose methods live in a static [`MethodTable`].
pub trait Exposed: Send + Sync + Sized + 'static {
    fn repr(&self) -> Result<String>;

    fn methods() -> &'static MethodTable<Self>;
}

impl<T: Exposed> RemoteObject for T {
    fn repr(&self) -> Result<String> {
        Exposed::repr(self)
    }

    fn has_method(&self, name: &str) -> bool {
        T::methods().contains(name)
    }

    fn invoke(&self, name: &str, args: CallArgs) -> Result<Value> {
        T::methods().call(self, name, &args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Positional and keyword arguments of one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    args: Vec<Value>,
    kwgs: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new(args: Vec<Value>, kwgs: BTreeMap<String, Value>) -> Self {
        Self { args, kwgs }
    }

    pub fn positional(args: Vec<Value>) -> Self {
        Self {
            args,
            kwgs: BTreeMap::new(),
        }
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwgs(&self) -> &BTreeMap<String, Value> {
        &self.kwgs
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwgs.is_empty()
    }

    /// Look a parameter up by position first, then by keyword.
    ///
    /// An explicit `null` counts as absent.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.args
            .get(index)
            .or_else(|| self.kwgs.get(name))
            .filter(|v| !v.is_null())
    }

    /// Fetch a required parameter or return an error.
    pub fn require(&self, index: usize, name: &str) -> Result<&Value> {
        self.get(index, name).ok_or_else(|| {
            DaisyError::invalid_arguments(format!(
                "missing required argument '{}' (position {})",
                name, index
            ))
        })
    }

    pub fn get_str(&self, index: usize, name: &str) -> Option<&str> {
        self.get(index, name).and_then(Value::as_str)
    }

    pub fn require_str(&self, index: usize, name: &str) -> Result<&str> {
        let value = self.require(index, name)?;
        value.as_str().ok_or_else(|| mistyped(name, "a string", value))
    }

    pub fn get_bool(&self, index: usize, name: &str) -> Option<bool> {
        self.get(index, name).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, index: usize, name: &str) -> Option<i64> {
        self.get(index, name).and_then(Value::as_i64)
    }

    pub fn require_i64(&self, index: usize, name: &str) -> Result<i64> {
        let value = self.require(index, name)?;
        value.as_i64().ok_or_else(|| mistyped(name, "an integer", value))
    }

    pub fn require_object(&self, index: usize, name: &str) -> Result<&ObjectHandle> {
        let value = self.require(index, name)?;
        value.as_object().ok_or_else(|| mistyped(name, "an object", value))
    }

    /// Fetch a required object argument of a concrete host type.
    pub fn require_object_of<T: 'static>(&self, index: usize, name: &str) -> Result<&T> {
        self.require_object(index, name)?
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| {
                DaisyError::invalid_arguments(format!(
                    "argument '{}' is not a {}",
                    name,
                    std::any::type_name::<T>()
                        .rsplit("::")
                        .next()
                        .unwrap_or("matching object")
                ))
            })
    }

    /// Reject calls passing more than `max` positional arguments.
    pub fn expect_at_most(&self, max: usize) -> Result<()> {
        if self.args.len() > max {
            return Err(DaisyError::invalid_arguments(format!(
                "takes at most {} positional arguments but {} were given",
                max,
                self.args.len()
            )));
        }
        Ok(())
    }
}

fn mistyped(name: &str, expected: &str, got: &Value) -> DaisyError {
    DaisyError::invalid_arguments(format!(
        "argument '{}' must be {}, got {}",
        name,
        expected,
        got.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::LazyLock;

    struct Counter {
        label: String,
    }

    static COUNTER_METHODS: LazyLock<MethodTable<Counter>> = LazyLock::new(|| {
        MethodTable::<Counter>::new("Counter")
            .method("GetLabel", |c, _| Ok(c.label.clone().into()))
            .method("Add", |_, args| {
                let a = args.require_i64(0, "a")?;
                let b = args.get_i64(1, "b").unwrap_or(1);
                Ok((a + b).into())
            })
    });

    impl Exposed for Counter {
        fn repr(&self) -> Result<String> {
            Ok(format!("Counter [{}]", self.label))
        }

        fn methods() -> &'static MethodTable<Self> {
            &COUNTER_METHODS
        }
    }

    #[test]
    fn test_exposed_type_dispatches_through_table() {
        let counter: ObjectHandle = Arc::new(Counter {
            label: "clips".into(),
        });
        assert!(counter.has_method("Add"));
        assert!(!counter.has_method("Remove"));

        let sum = counter
            .invoke("Add", CallArgs::positional(vec![Value::from(2i64), Value::from(3i64)]))
            .unwrap();
        assert_eq!(sum.as_i64(), Some(5));

        let mut kwgs = BTreeMap::new();
        kwgs.insert("a".to_string(), Value::from(10i64));
        let sum = counter.invoke("Add", CallArgs::new(vec![], kwgs)).unwrap();
        assert_eq!(sum.as_i64(), Some(11));
    }

    #[test]
    fn test_missing_method_is_attribute_error() {
        let counter = Counter { label: "x".into() };
        let err = counter
            .invoke("Remove", CallArgs::default())
            .unwrap_err();
        assert!(matches!(err, DaisyError::Attribute { .. }));
        assert!(err.to_string().contains("Counter"));
    }

    #[test]
    fn test_argument_errors() {
        let counter = Counter { label: "x".into() };
        let err = counter.invoke("Add", CallArgs::default()).unwrap_err();
        assert!(matches!(err, DaisyError::InvalidArguments { .. }));

        let err = counter
            .invoke("Add", CallArgs::positional(vec![Value::from("two")]))
            .unwrap_err();
        assert!(err.to_string().contains("must be an integer, got string"));
    }

    #[test]
    fn test_require_object_of_downcasts() {
        let handle: ObjectHandle = Arc::new(Counter { label: "a".into() });
        let args = CallArgs::positional(vec![Value::Object(handle)]);
        let counter = args.require_object_of::<Counter>(0, "counter").unwrap();
        assert_eq!(counter.label, "a");
        assert!(args.require_object_of::<String>(0, "counter").is_err());
    }

    #[test]
    fn test_expect_at_most() {
        let args = CallArgs::positional(vec![Value::Null, Value::Null]);
        assert!(args.expect_at_most(2).is_ok());
        assert!(args.expect_at_most(1).is_err());
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_method_rejected_at_build_time() {
        let _table = MethodTable::<Counter>::new("Counter")
            .method("GetLabel", |c, _| Ok(c.label.clone().into()))
            .method("GetLabel", |_, _| Ok(Value::Null));
    }
}

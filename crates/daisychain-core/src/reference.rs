//! Remote references and the host-side reference cache.
//!
//! A reference id is the SHA-256 of an object's textual representation, so
//! two objects that print identically share one id. The cache keeps the
//! first object registered under an id and never evicts single entries;
//! [`ReferenceCache::reset`] drops everything at once.

use crate::object::ObjectHandle;
use crate::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

static LEADING_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+").expect("leading word regex must compile"));

/// Type tag used when a representation has no leading word.
const FALLBACK_TYPE: &str = "Object";

/// Wire token naming an object that lives in the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteReference {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: String,
}

impl RemoteReference {
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }

    /// Derive the reference for a textual representation.
    pub fn from_repr(repr: &str) -> Self {
        let type_name = LEADING_WORD
            .find(repr)
            .map(|m| m.as_str())
            .unwrap_or(FALLBACK_TYPE);
        let id = hex::encode(Sha256::digest(repr.as_bytes()));
        Self::new(type_name, id)
    }
}

impl std::fmt::Display for RemoteReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}<{}>", self.type_name, self.id)
    }
}

/// A cached object together with the reference it was issued under.
#[derive(Clone)]
pub struct CacheEntry {
    reference: RemoteReference,
    object: ObjectHandle,
}

impl CacheEntry {
    pub fn reference(&self) -> &RemoteReference {
        &self.reference
    }

    pub fn type_name(&self) -> &str {
        &self.reference.type_name
    }

    pub fn object(&self) -> &ObjectHandle {
        &self.object
    }
}

/// Table of every object handed out since the last reset.
#[derive(Default)]
pub struct ReferenceCache {
    entries: HashMap<String, CacheEntry>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `object` and return its reference.
    ///
    /// Registering an object whose representation is already cached returns
    /// the existing reference and keeps the existing object.
    pub fn register(&mut self, object: &ObjectHandle) -> Result<RemoteReference> {
        let repr = object.repr()?;
        let reference = RemoteReference::from_repr(&repr);

        self.entries
            .entry(reference.id.clone())
            .or_insert_with(|| {
                debug!("Registered {} as {}", reference.type_name, reference.id);
                CacheEntry {
                    reference: reference.clone(),
                    object: object.clone(),
                }
            });

        Ok(reference)
    }

    /// Look up an id. Unknown ids yield `None`.
    pub fn resolve(&self, id: &str) -> Option<&CacheEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Drop every entry.
    pub fn reset(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        debug!("Reference cache reset, dropped {} entries", dropped);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{CallArgs, RemoteObject};
    use crate::{DaisyError, Value};
    use std::any::Any;
    use std::sync::Arc;

    struct Labelled(Option<&'static str>);

    impl RemoteObject for Labelled {
        fn repr(&self) -> Result<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| DaisyError::serialization("Labelled has no representation"))
        }

        fn has_method(&self, _name: &str) -> bool {
            false
        }

        fn invoke(&self, _name: &str, _args: CallArgs) -> Result<Value> {
            Ok(Value::Null)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn handle(repr: &'static str) -> ObjectHandle {
        Arc::new(Labelled(Some(repr)))
    }

    #[test]
    fn test_reference_from_repr() {
        let reference = RemoteReference::from_repr("Timeline (0x7f00) [App: 'Resolve']");
        assert_eq!(reference.type_name, "Timeline");
        assert_eq!(reference.id.len(), 64);
        assert!(reference.id.chars().all(|c| c.is_ascii_hexdigit()));

        let reference = RemoteReference::from_repr("<anonymous>");
        assert_eq!(reference.type_name, "Object");
    }

    #[test]
    fn test_reference_json_shape() {
        let reference = RemoteReference::new("Root", "abc");
        let json = serde_json::to_value(&reference).unwrap();
        assert_eq!(json, serde_json::json!({"type": "Root", "id": "abc"}));
    }

    #[test]
    fn test_register_then_resolve() {
        let mut cache = ReferenceCache::new();
        let object = handle("Project [demo]");
        let reference = cache.register(&object).unwrap();

        let entry = cache.resolve(&reference.id).expect("registered id resolves");
        assert!(Arc::ptr_eq(entry.object(), &object));
        assert_eq!(entry.type_name(), "Project");
    }

    #[test]
    fn test_registration_is_idempotent() {
        let mut cache = ReferenceCache::new();
        let object = handle("Project [demo]");
        let first = cache.register(&object).unwrap();
        let second = cache.register(&object).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_representations_get_distinct_ids() {
        let mut cache = ReferenceCache::new();
        let a = cache.register(&handle("Project [a]")).unwrap();
        let b = cache.register(&handle("Project [b]")).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_identical_representations_collapse_to_first_object() {
        // Two distinct live objects that print the same share one id.
        let mut cache = ReferenceCache::new();
        let first = handle("MediaPoolItem [clip]");
        let second = handle("MediaPoolItem [clip]");
        assert!(!Arc::ptr_eq(&first, &second));

        let a = cache.register(&first).unwrap();
        let b = cache.register(&second).unwrap();
        assert_eq!(a, b);

        let entry = cache.resolve(&a.id).unwrap();
        assert!(Arc::ptr_eq(entry.object(), &first));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut cache = ReferenceCache::new();
        let reference = cache.register(&handle("Gallery [x]")).unwrap();
        assert!(cache.contains(&reference.id));

        cache.reset();
        assert!(cache.is_empty());
        assert!(cache.resolve(&reference.id).is_none());
    }

    #[test]
    fn test_unrepresentable_object_fails_registration() {
        let mut cache = ReferenceCache::new();
        let object: ObjectHandle = Arc::new(Labelled(None));
        let err = cache.register(&object).unwrap_err();
        assert_eq!(err.kind(), "SerializationError");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let cache = ReferenceCache::new();
        assert!(cache.resolve("deadbeef").is_none());
    }
}

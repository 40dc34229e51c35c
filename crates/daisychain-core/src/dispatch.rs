//! Command dispatcher.
//!
//! Turns request bytes into response bytes: validate the envelope, resolve
//! the target, look up the method, decode arguments, invoke, encode the
//! result. Every failure along the way becomes an error response; nothing
//! escapes [`Dispatcher::execute`], including panics raised by host methods.

use crate::config::HostDefaults;
use crate::object::{CallArgs, ObjectHandle};
use crate::reference::{ReferenceCache, RemoteReference};
use crate::serializer::{deserialize, serialize};
use crate::wire::{CallTarget, Request, Response, WireValue};
use crate::{DaisyError, Result};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

/// Fallback body if a response cannot be encoded.
const ENCODE_FAILURE: &[u8] =
    br#"{"value":null,"error":"SerializationError: response could not be encoded"}"#;

/// Owns the reference cache and executes requests against it.
pub struct Dispatcher {
    cache: ReferenceCache,
    anchor: ObjectHandle,
    anchor_reference: RemoteReference,
    bootstrap_command: String,
}

impl Dispatcher {
    /// Create a dispatcher around the anchor object returned by bootstrap.
    ///
    /// The anchor is registered right away, so it must have a representation.
    pub fn new(anchor: ObjectHandle) -> Result<Self> {
        let mut cache = ReferenceCache::new();
        let anchor_reference = cache.register(&anchor)?;
        Ok(Self {
            cache,
            anchor,
            anchor_reference,
            bootstrap_command: HostDefaults::BOOTSTRAP_COMMAND.to_string(),
        })
    }

    pub fn with_bootstrap_command(mut self, command: impl Into<String>) -> Self {
        self.bootstrap_command = command.into();
        self
    }

    pub fn bootstrap_command(&self) -> &str {
        &self.bootstrap_command
    }

    pub fn anchor_reference(&self) -> &RemoteReference {
        &self.anchor_reference
    }

    pub fn cache(&self) -> &ReferenceCache {
        &self.cache
    }

    /// Clear every issued reference, then re-register the anchor.
    pub fn reset(&mut self) {
        self.cache.reset();
        match self.cache.register(&self.anchor) {
            Ok(reference) => self.anchor_reference = reference,
            Err(e) => warn!("Anchor could not be re-registered after reset: {}", e),
        }
    }

    /// Execute one encoded request and return the encoded response.
    pub fn execute(&mut self, request: &[u8]) -> Vec<u8> {
        let response = self.handle(request);
        response.to_vec().unwrap_or_else(|e| {
            warn!("Failed to encode response: {}", e);
            ENCODE_FAILURE.to_vec()
        })
    }

    /// Execute one encoded request.
    pub fn handle(&mut self, request: &[u8]) -> Response {
        match Request::from_slice(request).and_then(|request| self.dispatch(request)) {
            Ok(value) => Response::success(value),
            Err(e) => {
                warn!("Execution error > {}", e);
                Response::failure(&e)
            }
        }
    }

    /// Execute a decoded request.
    pub fn dispatch(&mut self, request: Request) -> Result<WireValue> {
        let Request {
            root,
            method,
            args,
            kwgs,
        } = request;

        if method == self.bootstrap_command {
            debug!("Bootstrap requested");
            return Ok(WireValue::Reference(self.cache.register(&self.anchor)?));
        }

        let reference = match root {
            CallTarget::Object(reference) => reference,
            CallTarget::Unbound => {
                return Err(DaisyError::UnboundRoot {
                    method,
                    bootstrap: self.bootstrap_command.clone(),
                })
            }
        };

        let entry = self
            .cache
            .resolve(&reference.id)
            .ok_or_else(|| DaisyError::Lookup {
                id: reference.id.clone(),
            })?;
        let target = entry.object().clone();
        let type_name = entry.type_name().to_string();

        if !target.has_method(&method) {
            return Err(DaisyError::Attribute { type_name, method });
        }

        let args = args
            .into_iter()
            .map(|arg| deserialize(&self.cache, arg))
            .collect::<Result<Vec<_>>>()?;
        let kwgs = kwgs
            .into_iter()
            .map(|(k, v)| Ok((k, deserialize(&self.cache, v)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        debug!("Running {}.{}", type_name, method);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            target.invoke(&method, CallArgs::new(args, kwgs))
        }));

        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                return Err(DaisyError::Invocation {
                    type_name,
                    method,
                    message: e.to_string(),
                })
            }
            Err(panic) => {
                return Err(DaisyError::Invocation {
                    type_name,
                    method,
                    message: format!("panicked: {}", panic_message(panic.as_ref())),
                })
            }
        };

        let value = serialize(&mut self.cache, value)?;
        debug!("Returning {:?}", value);
        Ok(value)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Exposed, MethodTable};
    use crate::value::Value;
    use serde_json::{json, Value as JsonValue};
    use std::sync::{Arc, LazyLock, Mutex};

    struct Root;

    struct Bin {
        name: Mutex<String>,
    }

    static ROOT_METHODS: LazyLock<MethodTable<Root>> = LazyLock::new(|| {
        MethodTable::<Root>::new("Root")
            .method("GetProductName", |_, _| Ok("DaisyChain".into()))
            .method("CreateBin", |_, args| {
                let name = args.require_str(0, "name")?;
                Ok(Value::object(Bin {
                    name: Mutex::new(name.to_string()),
                }))
            })
            .method("Rename", |_, args| {
                let bin = args.require_object_of::<Bin>(0, "bin")?;
                let name = args.require_str(1, "name")?;
                *bin.name.lock().map_err(|_| DaisyError::Other("poisoned".into()))? = name.to_string();
                Ok(true.into())
            })
            .method("Fail", |_, _| Err(DaisyError::Other("disk full".into())))
            .method("Panic", |_, _| panic!("render thread gone"))
            .method("Echo", |_, args| {
                Ok(Value::List(vec![
                    Value::List(args.args().to_vec()),
                    Value::Map(args.kwgs().clone()),
                ]))
            })
    });

    static BIN_METHODS: LazyLock<MethodTable<Bin>> = LazyLock::new(|| {
        MethodTable::<Bin>::new("Bin").method("GetName", |b, _| {
            let name = b.name.lock().map_err(|_| DaisyError::Other("poisoned".into()))?;
            Ok(name.clone().into())
        })
    });

    impl Exposed for Root {
        fn repr(&self) -> Result<String> {
            Ok("Root [test host]".to_string())
        }

        fn methods() -> &'static MethodTable<Self> {
            &ROOT_METHODS
        }
    }

    impl Exposed for Bin {
        fn repr(&self) -> Result<String> {
            Ok(format!("Bin at {:p}", self))
        }

        fn methods() -> &'static MethodTable<Self> {
            &BIN_METHODS
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(Root)).unwrap()
    }

    fn run(dispatcher: &mut Dispatcher, request: JsonValue) -> JsonValue {
        let bytes = dispatcher.execute(request.to_string().as_bytes());
        serde_json::from_slice(&bytes).unwrap()
    }

    fn call(root: &JsonValue, method: &str, args: JsonValue) -> JsonValue {
        json!({"root": root, "impl": method, "args": args, "kwgs": {}})
    }

    fn bootstrap(dispatcher: &mut Dispatcher) -> JsonValue {
        let response = run(
            dispatcher,
            json!({"root": {}, "impl": "daisychain_init", "args": [], "kwgs": {}}),
        );
        response["value"].clone()
    }

    #[test]
    fn test_bootstrap_returns_root_reference() {
        let mut dispatcher = dispatcher();
        let response = run(
            &mut dispatcher,
            json!({"root": {}, "impl": "daisychain_init", "args": [], "kwgs": {}}),
        );
        assert_eq!(response["error"], JsonValue::Null);
        assert_eq!(response["value"]["type"], "Root");

        let id = response["value"]["id"].as_str().unwrap();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, dispatcher.anchor_reference().id);
    }

    #[test]
    fn test_unknown_reference_names_the_id() {
        let mut dispatcher = dispatcher();
        let response = run(
            &mut dispatcher,
            call(&json!({"type": "Root", "id": "deadbeef"}), "GetProductName", json!([])),
        );
        assert_eq!(response["value"], JsonValue::Null);
        let error = response["error"].as_str().unwrap();
        assert!(error.starts_with("LookupError"));
        assert!(error.contains("deadbeef"));
    }

    #[test]
    fn test_schema_errors_never_escape() {
        let mut dispatcher = dispatcher();
        for request in [
            json!({"impl": "x", "args": [], "kwgs": {}}),
            json!({"root": {}, "args": [], "kwgs": {}}),
            json!({"root": {}, "impl": "x", "kwgs": {}}),
            json!({"root": {}, "impl": "x", "args": []}),
            json!({"root": "Root", "impl": "x", "args": [], "kwgs": {}}),
            json!({"root": {}, "impl": ["x"], "args": [], "kwgs": {}}),
            json!({"root": {}, "impl": "x", "args": {}, "kwgs": {}}),
            json!({"root": {}, "impl": "x", "args": [], "kwgs": "none"}),
        ] {
            let response = run(&mut dispatcher, request);
            assert_eq!(response["value"], JsonValue::Null);
            let error = response["error"].as_str().unwrap();
            assert!(error.starts_with("SchemaError"), "unexpected error: {}", error);
        }

        let response: JsonValue =
            serde_json::from_slice(&dispatcher.execute(b"\x00\x9f not json")).unwrap();
        assert!(!response["error"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_empty_root_without_bootstrap_is_lookup_error() {
        let mut dispatcher = dispatcher();
        let response = run(&mut dispatcher, call(&json!({}), "GetProductName", json!([])));
        assert!(response["error"].as_str().unwrap().starts_with("LookupError"));
    }

    #[test]
    fn test_unknown_method_names_type_and_method() {
        let mut dispatcher = dispatcher();
        let root = bootstrap(&mut dispatcher);
        let response = run(&mut dispatcher, call(&root, "Explode", json!([])));
        let error = response["error"].as_str().unwrap();
        assert!(error.starts_with("AttributeError"));
        assert!(error.contains("Root"));
        assert!(error.contains("Explode"));
    }

    #[test]
    fn test_call_returns_value() {
        let mut dispatcher = dispatcher();
        let root = bootstrap(&mut dispatcher);
        let response = run(&mut dispatcher, call(&root, "GetProductName", json!([])));
        assert_eq!(response, json!({"value": "DaisyChain", "error": null}));
    }

    #[test]
    fn test_returned_objects_become_callable_references() {
        let mut dispatcher = dispatcher();
        let root = bootstrap(&mut dispatcher);

        let created = run(&mut dispatcher, call(&root, "CreateBin", json!(["Dailies"])));
        let bin = created["value"].clone();
        assert_eq!(bin["type"], "Bin");

        let renamed = run(&mut dispatcher, call(&root, "Rename", json!([bin, "Selects"])));
        assert_eq!(renamed["value"], true);

        let name = run(&mut dispatcher, call(&bin, "GetName", json!([])));
        assert_eq!(name["value"], "Selects");
    }

    #[test]
    fn test_kwgs_and_nested_values_pass_through() {
        let mut dispatcher = dispatcher();
        let root = bootstrap(&mut dispatcher);
        let request = json!({
            "root": root,
            "impl": "Echo",
            "args": [1, [true, null], {"k": "v"}],
            "kwgs": {"root": root}
        });
        let response = run(&mut dispatcher, request);
        assert_eq!(response["error"], JsonValue::Null);
        assert_eq!(response["value"][0], json!([1, [true, null], {"k": "v"}]));
        assert_eq!(response["value"][1]["root"], root);
    }

    #[test]
    fn test_invocation_errors_are_contained() {
        let mut dispatcher = dispatcher();
        let root = bootstrap(&mut dispatcher);

        let failed = run(&mut dispatcher, call(&root, "Fail", json!([])));
        let error = failed["error"].as_str().unwrap();
        assert!(error.starts_with("InvocationError"));
        assert!(error.contains("disk full"));

        let bad_args = run(&mut dispatcher, call(&root, "CreateBin", json!([])));
        assert!(bad_args["error"].as_str().unwrap().starts_with("InvocationError"));

        // The dispatcher keeps serving afterwards.
        let ok = run(&mut dispatcher, call(&root, "GetProductName", json!([])));
        assert_eq!(ok["value"], "DaisyChain");
    }

    #[test]
    fn test_panics_are_contained() {
        let mut dispatcher = dispatcher();
        let root = bootstrap(&mut dispatcher);

        let response = run(&mut dispatcher, call(&root, "Panic", json!([])));
        let error = response["error"].as_str().unwrap();
        assert!(error.starts_with("InvocationError"));
        assert!(error.contains("render thread gone"));

        let ok = run(&mut dispatcher, call(&root, "GetProductName", json!([])));
        assert_eq!(ok["value"], "DaisyChain");
    }

    #[test]
    fn test_unknown_reference_in_args_fails_decode() {
        let mut dispatcher = dispatcher();
        let root = bootstrap(&mut dispatcher);
        let response = run(
            &mut dispatcher,
            call(&root, "Rename", json!([{"type": "Bin", "id": "0badf00d"}, "x"])),
        );
        let error = response["error"].as_str().unwrap();
        assert!(error.starts_with("LookupError"));
        assert!(error.contains("0badf00d"));
    }

    #[test]
    fn test_reset_keeps_anchor_and_drops_the_rest() {
        let mut dispatcher = dispatcher();
        let root = bootstrap(&mut dispatcher);
        let bin = run(&mut dispatcher, call(&root, "CreateBin", json!(["Temp"])))["value"].clone();
        assert_eq!(dispatcher.cache().len(), 2);

        dispatcher.reset();
        assert_eq!(dispatcher.cache().len(), 1);

        let stale = run(&mut dispatcher, call(&bin, "GetName", json!([])));
        assert!(stale["error"].as_str().unwrap().starts_with("LookupError"));

        let fresh = run(&mut dispatcher, call(&root, "GetProductName", json!([])));
        assert_eq!(fresh["value"], "DaisyChain");
    }

    #[test]
    fn test_custom_bootstrap_command() {
        let mut dispatcher = dispatcher().with_bootstrap_command("hello");
        let response = run(
            &mut dispatcher,
            json!({"root": {}, "impl": "hello", "args": [], "kwgs": {}}),
        );
        assert_eq!(response["value"]["type"], "Root");
    }
}

//! Cross-bundle security proxy.
//!
//! A caller bundle never holds a raw reference into another bundle's
//! sandbox. Every foreign object is wrapped in an interposition proxy that
//! runs the origin bundle's security interceptor on each trap, denies all
//! mutation, and recursively wraps whatever it hands out. Proxy identity
//! is cached per (origin, caller, raw object) so equality checks inside
//! guest code keep working.

use std::rc::{Rc, Weak};

use log::debug;

use sos_sandbox::{
    object_id, ObjectRef, ObjectTag, PropertyDescriptor, SandboxError, SandboxResult,
    ScriptObject, Value,
};

use crate::bundle::Bundle;

/// Wraps `value` for `caller`. Primitives pass through; objects come back
/// as a [`Value::ProxyOf`] whose checks run against `origin`'s
/// interceptor under `property_path`.
pub fn wrap(value: &Value, property_path: &str, origin: &Rc<Bundle>, caller: &Rc<Bundle>) -> Value {
    let Some(target) = value.as_object() else {
        return value.clone();
    };
    let target_id = object_id(target);
    if let Some(cached) = origin.proxy_cache_get(caller.id(), target_id) {
        return cached;
    }
    debug!(
        "SecurityProxy: wrapping {}::{} for {}",
        origin.name(),
        property_path,
        caller.name()
    );
    let proxy: ObjectRef = Rc::new(SecurityProxy {
        target: target.clone(),
        path: property_path.to_string(),
        origin: Rc::downgrade(origin),
        caller: Rc::downgrade(caller),
    });
    let wrapped = Value::ProxyOf(proxy);
    origin.proxy_cache_put(caller.id(), target_id, wrapped.clone());
    wrapped
}

struct SecurityProxy {
    target: ObjectRef,
    path: String,
    origin: Weak<Bundle>,
    caller: Weak<Bundle>,
}

impl SecurityProxy {
    fn bundles(&self) -> SandboxResult<(Rc<Bundle>, Rc<Bundle>)> {
        let origin = self
            .origin
            .upgrade()
            .ok_or_else(|| SandboxError::Execution("origin bundle is gone".to_string()))?;
        let caller = self
            .caller
            .upgrade()
            .ok_or_else(|| SandboxError::Execution("caller bundle is gone".to_string()))?;
        Ok((origin, caller))
    }

    /// Access check for one trap. Privileged callers bypass the
    /// interceptor; a missing interceptor denies everyone else.
    fn check(&self, property: &str) -> SandboxResult<()> {
        let (origin, caller) = self.bundles()?;
        if caller.privileged() {
            return Ok(());
        }
        let granted = match origin.security_interceptor() {
            Some(interceptor) => interceptor(&caller, property),
            None => false,
        };
        if !granted {
            return Err(SandboxError::AccessDenied {
                caller: caller.name().to_string(),
                origin: origin.name().to_string(),
                property: property.to_string(),
            });
        }
        debug!("SecurityProxy: interceptor check passed for {property}");
        Ok(())
    }

    fn wrap_out(&self, value: &Value, property_path: &str) -> SandboxResult<Value> {
        let (origin, caller) = self.bundles()?;
        Ok(wrap(value, property_path, &origin, &caller))
    }

    /// Role-swapped wrap for values flowing caller -> origin (`this` and
    /// call arguments).
    fn wrap_in(&self, value: &Value, property_path: &str) -> SandboxResult<Value> {
        let (origin, caller) = self.bundles()?;
        Ok(wrap(value, property_path, &caller, &origin))
    }
}

impl ScriptObject for SecurityProxy {
    fn tag(&self) -> ObjectTag {
        ObjectTag::Proxy
    }

    fn get(&self, name: &str) -> SandboxResult<Value> {
        self.check(&format!("{}.{}.get", self.path, name))?;
        let value = self.target.get(name)?;
        if value.is_object() {
            self.wrap_out(&value, &format!("{}.{}", self.path, name))
        } else {
            Ok(value)
        }
    }

    fn set(&self, _name: &str, _value: Value) -> SandboxResult<bool> {
        Ok(false)
    }

    fn has(&self, name: &str) -> SandboxResult<bool> {
        self.check(&format!("{}.{}.has", self.path, name))?;
        self.target.has(name)
    }

    fn keys(&self) -> Vec<String> {
        self.target.keys()
    }

    fn define_property(&self, _name: &str, _descriptor: PropertyDescriptor) -> SandboxResult<bool> {
        Ok(false)
    }

    fn property_descriptor(&self, name: &str) -> SandboxResult<Option<PropertyDescriptor>> {
        if !self.target.has(name)? {
            return Ok(None);
        }
        // Expose a getter resolving to the proxied value; never the raw
        // descriptor of the foreign target.
        let (origin, caller) = self.bundles()?;
        let target = self.target.clone();
        let path = self.path.clone();
        let property = name.to_string();
        let getter: sos_sandbox::NativeFunction = Rc::new(move |_call| {
            let value = target.get(&property)?;
            if value.is_object() {
                Ok(wrap(
                    &value,
                    &format!("{path}.{property}"),
                    &origin,
                    &caller,
                ))
            } else {
                Ok(value)
            }
        });
        let getter_obj: ObjectRef = Rc::new(NativeGetter { getter });
        Ok(Some(PropertyDescriptor {
            value: None,
            getter: Some(Value::Fn(getter_obj)),
            setter: None,
            writable: false,
            enumerable: true,
            configurable: false,
        }))
    }

    fn delete(&self, _name: &str) -> SandboxResult<bool> {
        Ok(false)
    }

    fn prevent_extensions(&self) -> bool {
        true
    }

    fn is_extensible(&self) -> bool {
        false
    }

    fn freeze(&self) {
        // The proxy is already immutable; the foreign target is not ours
        // to freeze.
    }

    fn is_frozen(&self) -> bool {
        true
    }

    fn prototype(&self) -> SandboxResult<Value> {
        Err(SandboxError::type_error("proxies have no prototypes"))
    }

    fn is_callable(&self) -> bool {
        self.target.is_callable()
    }

    fn call(&self, this: Value, args: &[Value]) -> SandboxResult<Value> {
        self.check(&format!("{}.apply", self.path))?;
        let this = if this.is_object() {
            self.wrap_in(&this, &format!("{}.this", self.path))?
        } else {
            this
        };
        let mut wrapped_args = Vec::with_capacity(args.len());
        for arg in args {
            if arg.is_object() {
                wrapped_args.push(self.wrap_in(arg, &format!("{}.arguments", self.path))?);
            } else {
                wrapped_args.push(arg.clone());
            }
        }
        let result = self.target.call(this, &wrapped_args)?;
        if result.is_object() {
            self.wrap_out(&result, &self.path)
        } else {
            Ok(result)
        }
    }

    fn construct(&self, args: &[Value]) -> SandboxResult<Value> {
        self.check(&format!("{}.constructor", self.path))?;
        let mut wrapped_args = Vec::with_capacity(args.len());
        for arg in args {
            if arg.is_object() {
                wrapped_args.push(self.wrap_in(arg, &format!("{}.arguments", self.path))?);
            } else {
                wrapped_args.push(arg.clone());
            }
        }
        let instance = self.target.construct(&wrapped_args)?;
        self.wrap_out(&instance, &format!("{}.constructor", self.path))
    }

    fn elements(&self) -> Option<Vec<Value>> {
        let items = self.target.elements()?;
        let (origin, caller) = match self.bundles() {
            Ok(pair) => pair,
            Err(_) => return None,
        };
        Some(
            items
                .iter()
                .map(|item| {
                    if item.is_object() {
                        wrap(item, &self.path, &origin, &caller)
                    } else {
                        item.clone()
                    }
                })
                .collect(),
        )
    }
}

/// Minimal callable used for synthesized descriptor getters.
struct NativeGetter {
    getter: sos_sandbox::NativeFunction,
}

impl ScriptObject for NativeGetter {
    fn tag(&self) -> ObjectTag {
        ObjectTag::Function
    }

    fn get(&self, _name: &str) -> SandboxResult<Value> {
        Ok(Value::Undefined)
    }

    fn set(&self, _name: &str, _value: Value) -> SandboxResult<bool> {
        Ok(false)
    }

    fn has(&self, _name: &str) -> SandboxResult<bool> {
        Ok(false)
    }

    fn keys(&self) -> Vec<String> {
        Vec::new()
    }

    fn define_property(&self, _name: &str, _descriptor: PropertyDescriptor) -> SandboxResult<bool> {
        Ok(false)
    }

    fn property_descriptor(&self, _name: &str) -> SandboxResult<Option<PropertyDescriptor>> {
        Ok(None)
    }

    fn delete(&self, _name: &str) -> SandboxResult<bool> {
        Ok(false)
    }

    fn prevent_extensions(&self) -> bool {
        true
    }

    fn is_extensible(&self) -> bool {
        false
    }

    fn freeze(&self) {}

    fn is_frozen(&self) -> bool {
        true
    }

    fn prototype(&self) -> SandboxResult<Value> {
        Ok(Value::Undefined)
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, this: Value, args: &[Value]) -> SandboxResult<Value> {
        (self.getter)(sos_sandbox::FunctionCall {
            this,
            args: args.to_vec(),
        })
    }

    fn construct(&self, _args: &[Value]) -> SandboxResult<Value> {
        Err(SandboxError::NotCallable)
    }

    fn elements(&self) -> Option<Vec<Value>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Bundle;
    use sos_sandbox::{FunctionCall, Sandbox};
    use sos_vfs::MemFs;
    use std::rc::Weak as RcWeak;

    fn bundle(name: &str, id: &str, privileges: &[&str], privileged: bool) -> Rc<Bundle> {
        Bundle::new(
            RcWeak::new(),
            "/",
            Rc::new(MemFs::new()),
            id,
            name,
            privileges.iter().map(|p| p.to_string()).collect(),
            privileged,
            sos_engine::standalone(name),
        )
        .expect("bundle")
    }

    /// An exports-like object in the origin sandbox: a constant, a nested
    /// object, and a callable.
    fn service(origin: &Rc<Bundle>) -> Value {
        let sandbox = origin.sandbox().expect("sandbox");
        let object = sandbox.new_object();
        object.set("version", Value::Number(1.0)).expect("set");
        let nested = sandbox.new_object();
        nested.set("deep", Value::Bool(true)).expect("set");
        object.set("inner", Value::Obj(nested)).expect("set");
        let double = sandbox.new_function(
            "double",
            Rc::new(|call: FunctionCall| {
                let n = call.argument(0).as_number().unwrap_or(0.0);
                Ok(Value::Number(n * 2.0))
            }),
        );
        object.set("double", double).expect("set");
        Value::Obj(object)
    }

    #[test]
    fn access_is_gated_by_the_callers_grants() {
        let origin = bundle("origin", "o-1", &[], false);
        let granted = bundle("granted", "c-1", &["PRIVILEGE_SVC"], false);
        let denied = bundle("denied", "c-2", &[], false);
        let exports = service(&origin);

        let for_granted = wrap(&exports, "svc", &origin, &granted);
        let obj = for_granted.as_object().expect("object").clone();
        assert_eq!(obj.get("version").expect("get").as_number(), Some(1.0));
        assert!(obj.has("version").expect("has"));

        let for_denied = wrap(&exports, "svc", &origin, &denied);
        let obj = for_denied.as_object().expect("object").clone();
        let err = obj.get("version").expect_err("must deny");
        assert!(matches!(err, SandboxError::AccessDenied { ref property, .. }
            if property == "svc.version.get"));
    }

    #[test]
    fn privileged_callers_bypass_the_interceptor() {
        let origin = bundle("origin", "o-1", &[], false);
        let root = bundle("root", "c-1", &[], true);
        let exports = service(&origin);
        let proxy = wrap(&exports, "svc", &origin, &root);
        let obj = proxy.as_object().expect("object").clone();
        assert_eq!(obj.get("version").expect("get").as_number(), Some(1.0));
    }

    #[test]
    fn every_mutator_is_a_signalled_noop() {
        let origin = bundle("origin", "o-1", &[], false);
        let caller = bundle("caller", "c-1", &["PRIVILEGE_SVC"], false);
        let exports = service(&origin);
        let proxy = wrap(&exports, "svc", &origin, &caller);
        let obj = proxy.as_object().expect("object").clone();

        assert!(!obj.set("version", Value::Number(9.0)).expect("set"));
        assert!(!obj.delete("version").expect("delete"));
        assert!(!obj
            .define_property(
                "hacked",
                PropertyDescriptor::data(Value::Bool(true), true, true, true),
            )
            .expect("define"));
        assert!(obj.prevent_extensions());
        assert!(!obj.is_extensible());

        let raw = exports.as_object().expect("raw").clone();
        assert_eq!(raw.get("version").expect("get").as_number(), Some(1.0));
        assert!(!raw.has("hacked").expect("has"));
    }

    #[test]
    fn objects_handed_out_are_proxies_with_extended_paths() {
        let origin = bundle("origin", "o-1", &[], false);
        let caller = bundle("caller", "c-1", &["PRIVILEGE_SVC"], false);
        let exports = service(&origin);
        let proxy = wrap(&exports, "svc", &origin, &caller);
        let obj = proxy.as_object().expect("object").clone();

        let inner = obj.get("inner").expect("inner");
        assert!(matches!(inner, Value::ProxyOf(_)));
        let inner = inner.as_object().expect("object").clone();
        assert_eq!(inner.get("deep").expect("deep").as_bool(), Some(true));
    }

    #[test]
    fn proxy_identity_is_cached_per_caller() {
        let origin = bundle("origin", "o-1", &[], false);
        let caller = bundle("caller", "c-1", &[], false);
        let other = bundle("other", "c-2", &[], false);
        let exports = service(&origin);

        let first = wrap(&exports, "svc", &origin, &caller);
        let second = wrap(&exports, "svc", &origin, &caller);
        assert!(first.same_as(&second));

        let foreign = wrap(&exports, "svc", &origin, &other);
        assert!(!first.same_as(&foreign));
    }

    #[test]
    fn apply_marshals_through_the_origin() {
        let origin = bundle("origin", "o-1", &[], false);
        let caller = bundle("caller", "c-1", &["PRIVILEGE_SVC"], false);
        let exports = service(&origin);
        let proxy = wrap(&exports, "svc", &origin, &caller);
        let obj = proxy.as_object().expect("object").clone();

        let double = obj.get("double").expect("double");
        assert!(matches!(double, Value::ProxyOf(_)));
        let result = double
            .call(Value::Undefined, &[Value::Number(21.0)])
            .expect("call");
        assert_eq!(result.as_number(), Some(42.0));
    }

    #[test]
    fn prototypes_are_refused() {
        let origin = bundle("origin", "o-1", &[], false);
        let caller = bundle("caller", "c-1", &[], false);
        let exports = service(&origin);
        let proxy = wrap(&exports, "svc", &origin, &caller);
        let obj = proxy.as_object().expect("object").clone();
        assert!(matches!(obj.prototype(), Err(SandboxError::Type(_))));
    }

    #[test]
    fn own_keys_pass_without_a_check() {
        let origin = bundle("origin", "o-1", &[], false);
        let caller = bundle("caller", "c-1", &[], false);
        let exports = service(&origin);
        let proxy = wrap(&exports, "svc", &origin, &caller);
        let obj = proxy.as_object().expect("object").clone();
        let keys = obj.keys();
        assert!(keys.contains(&"version".to_string()));
        assert!(keys.contains(&"inner".to_string()));
    }
}

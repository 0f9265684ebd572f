//! Heap objects backing the bundled sandbox.
//!
//! Objects are shared, interiorly mutable property maps with JS-like
//! attribute semantics (writable/enumerable/configurable, freezing,
//! extensibility). There is no prototype chain.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

use sos_sandbox::{
    FunctionCall, NativeFunction, ObjectRef, ObjectTag, PropertyDescriptor, SandboxError,
    SandboxResult, ScriptObject, Value,
};

struct Property {
    value: Option<Value>,
    getter: Option<Value>,
    setter: Option<Value>,
    writable: bool,
    enumerable: bool,
    configurable: bool,
}

impl Property {
    fn descriptor(&self) -> PropertyDescriptor {
        PropertyDescriptor {
            value: self.value.clone(),
            getter: self.getter.clone(),
            setter: self.setter.clone(),
            writable: self.writable,
            enumerable: self.enumerable,
            configurable: self.configurable,
        }
    }

    fn from_descriptor(descriptor: PropertyDescriptor) -> Self {
        Self {
            value: descriptor.value,
            getter: descriptor.getter,
            setter: descriptor.setter,
            writable: descriptor.writable,
            enumerable: descriptor.enumerable,
            configurable: descriptor.configurable,
        }
    }
}

pub struct HeapObject {
    tag: ObjectTag,
    name: String,
    props: RefCell<IndexMap<String, Property>>,
    elements: RefCell<Vec<Value>>,
    callable: Option<NativeFunction>,
    frozen: Cell<bool>,
    extensible: Cell<bool>,
}

impl HeapObject {
    fn base(tag: ObjectTag) -> Self {
        Self {
            tag,
            name: String::new(),
            props: RefCell::new(IndexMap::new()),
            elements: RefCell::new(Vec::new()),
            callable: None,
            frozen: Cell::new(false),
            extensible: Cell::new(true),
        }
    }

    pub fn plain() -> Self {
        Self::base(ObjectTag::Plain)
    }

    pub fn array(items: Vec<Value>) -> Self {
        let object = Self::base(ObjectTag::Array);
        *object.elements.borrow_mut() = items;
        object
    }

    pub fn function(name: &str, callable: NativeFunction) -> Self {
        let mut object = Self::base(ObjectTag::Function);
        object.name = name.to_string();
        object.callable = Some(callable);
        object
    }
}

impl ScriptObject for HeapObject {
    fn tag(&self) -> ObjectTag {
        self.tag
    }

    fn get(&self, name: &str) -> SandboxResult<Value> {
        if self.tag == ObjectTag::Array {
            if name == "length" {
                return Ok(Value::Number(self.elements.borrow().len() as f64));
            }
            if let Ok(idx) = name.parse::<usize>() {
                return Ok(self
                    .elements
                    .borrow()
                    .get(idx)
                    .cloned()
                    .unwrap_or(Value::Undefined));
            }
        }
        let getter = {
            let props = self.props.borrow();
            match props.get(name) {
                Some(prop) => match (&prop.value, &prop.getter) {
                    (Some(value), _) => return Ok(value.clone()),
                    (None, Some(getter)) => Some(getter.clone()),
                    (None, None) => return Ok(Value::Undefined),
                },
                None => return Ok(Value::Undefined),
            }
        };
        match getter {
            Some(getter) => getter.call(Value::Undefined, &[]),
            None => Ok(Value::Undefined),
        }
    }

    fn set(&self, name: &str, value: Value) -> SandboxResult<bool> {
        if self.frozen.get() {
            return Ok(false);
        }
        let setter = {
            let props = self.props.borrow();
            match props.get(name) {
                Some(prop) if prop.getter.is_some() || prop.setter.is_some() => {
                    match &prop.setter {
                        Some(setter) => Some(setter.clone()),
                        None => return Ok(false),
                    }
                }
                Some(prop) if !prop.writable => return Ok(false),
                Some(_) => None,
                None if !self.extensible.get() => return Ok(false),
                None => None,
            }
        };
        if let Some(setter) = setter {
            setter.call(Value::Undefined, &[value])?;
            return Ok(true);
        }
        let mut props = self.props.borrow_mut();
        match props.get_mut(name) {
            Some(prop) => prop.value = Some(value),
            None => {
                props.insert(
                    name.to_string(),
                    Property::from_descriptor(PropertyDescriptor::data(value, true, true, true)),
                );
            }
        }
        Ok(true)
    }

    fn has(&self, name: &str) -> SandboxResult<bool> {
        if self.tag == ObjectTag::Array && name == "length" {
            return Ok(true);
        }
        Ok(self.props.borrow().contains_key(name))
    }

    fn keys(&self) -> Vec<String> {
        self.props
            .borrow()
            .iter()
            .filter(|(_, prop)| prop.enumerable)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn define_property(&self, name: &str, descriptor: PropertyDescriptor) -> SandboxResult<bool> {
        if self.frozen.get() {
            return Err(SandboxError::Frozen(name.to_string()));
        }
        let mut props = self.props.borrow_mut();
        if let Some(existing) = props.get(name) {
            if !existing.configurable {
                return Err(SandboxError::AlreadyDefined(name.to_string()));
            }
        } else if !self.extensible.get() {
            return Ok(false);
        }
        props.insert(name.to_string(), Property::from_descriptor(descriptor));
        Ok(true)
    }

    fn property_descriptor(&self, name: &str) -> SandboxResult<Option<PropertyDescriptor>> {
        Ok(self.props.borrow().get(name).map(Property::descriptor))
    }

    fn delete(&self, name: &str) -> SandboxResult<bool> {
        if self.frozen.get() {
            return Ok(false);
        }
        let mut props = self.props.borrow_mut();
        match props.get(name) {
            Some(prop) if prop.configurable => {
                props.shift_remove(name);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(true),
        }
    }

    fn prevent_extensions(&self) -> bool {
        self.extensible.set(false);
        true
    }

    fn is_extensible(&self) -> bool {
        self.extensible.get()
    }

    fn freeze(&self) {
        self.frozen.set(true);
        self.extensible.set(false);
    }

    fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    fn prototype(&self) -> SandboxResult<Value> {
        Ok(Value::Undefined)
    }

    fn is_callable(&self) -> bool {
        self.callable.is_some()
    }

    fn call(&self, this: Value, args: &[Value]) -> SandboxResult<Value> {
        let callable = self.callable.as_ref().ok_or(SandboxError::NotCallable)?;
        callable(FunctionCall {
            this,
            args: args.to_vec(),
        })
    }

    fn construct(&self, args: &[Value]) -> SandboxResult<Value> {
        let callable = self.callable.as_ref().ok_or(SandboxError::NotCallable)?;
        let instance: ObjectRef = Rc::new(HeapObject::plain());
        let result = callable(FunctionCall {
            this: Value::Obj(instance.clone()),
            args: args.to_vec(),
        })?;
        if result.is_object() {
            Ok(result)
        } else {
            Ok(Value::Obj(instance))
        }
    }

    fn elements(&self) -> Option<Vec<Value>> {
        if self.tag == ObjectTag::Array {
            Some(self.elements.borrow().clone())
        } else {
            None
        }
    }
}

/// Fresh plain object.
pub fn new_object() -> ObjectRef {
    Rc::new(HeapObject::plain())
}

/// Fresh array over `items`.
pub fn new_array(items: Vec<Value>) -> ObjectRef {
    Rc::new(HeapObject::array(items))
}

/// Function value wrapping a native callable.
pub fn function_value(name: &str, callable: NativeFunction) -> Value {
    Value::Fn(Rc::new(HeapObject::function(name, callable)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_round_trip() {
        let obj = new_object();
        assert!(obj.set("answer", Value::Number(42.0)).expect("set"));
        assert_eq!(obj.get("answer").expect("get").as_number(), Some(42.0));
        assert!(obj.has("answer").expect("has"));
        assert_eq!(obj.keys(), vec!["answer"]);
    }

    #[test]
    fn frozen_objects_ignore_writes() {
        let obj = new_object();
        obj.set("a", Value::Number(1.0)).expect("set");
        obj.freeze();
        assert!(!obj.set("a", Value::Number(2.0)).expect("set"));
        assert!(!obj.set("b", Value::Number(3.0)).expect("set"));
        assert_eq!(obj.get("a").expect("get").as_number(), Some(1.0));
        assert!(matches!(
            obj.define_property("c", PropertyDescriptor::data(Value::Null, true, true, true)),
            Err(SandboxError::Frozen(_))
        ));
    }

    #[test]
    fn non_configurable_properties_cannot_be_redefined() {
        let obj = new_object();
        obj.define_property(
            "answer",
            PropertyDescriptor::data(Value::Number(42.0), false, true, false),
        )
        .expect("define");
        assert!(matches!(
            obj.define_property(
                "answer",
                PropertyDescriptor::data(Value::Number(7.0), false, true, false)
            ),
            Err(SandboxError::AlreadyDefined(_))
        ));
        assert!(!obj.set("answer", Value::Number(7.0)).expect("set"));
    }

    #[test]
    fn accessor_properties_route_through_getter() {
        let obj = new_object();
        let getter = function_value("get x", Rc::new(|_| Ok(Value::Number(5.0))));
        obj.define_property("x", PropertyDescriptor::accessor(Some(getter), None))
            .expect("define");
        assert_eq!(obj.get("x").expect("get").as_number(), Some(5.0));
        assert!(!obj.set("x", Value::Number(9.0)).expect("set without setter"));
    }

    #[test]
    fn arrays_expose_length_and_elements() {
        let arr = new_array(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(arr.get("length").expect("len").as_number(), Some(2.0));
        assert_eq!(arr.get("1").expect("idx").as_number(), Some(2.0));
        assert_eq!(arr.elements().expect("elements").len(), 2);
    }

    #[test]
    fn construct_returns_instance_when_callable_returns_primitive() {
        let ctor = HeapObject::function(
            "Ctor",
            Rc::new(|call: FunctionCall| {
                call.this
                    .as_object()
                    .expect("this")
                    .set("tagged", Value::Bool(true))?;
                Ok(Value::Undefined)
            }),
        );
        let instance = ctor.construct(&[]).expect("construct");
        let obj = instance.as_object().expect("object");
        assert_eq!(obj.get("tagged").expect("get").as_bool(), Some(true));
    }
}

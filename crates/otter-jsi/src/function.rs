//! Calling JavaScript functions

use std::ops::Deref;
use std::ptr;

use otter_js_sys::*;

use crate::error::JsiResult;
use crate::object::Object;
use crate::runtime::Runtime;
use crate::value::Value;

/// A callable object
#[derive(Clone, Debug)]
pub struct Function(Object);

impl Function {
    pub(crate) fn from_object(object: Object) -> Self {
        Self(object)
    }

    /// Call with `undefined` as the receiver
    pub fn call(&self, rt: &Runtime, args: &[Value]) -> JsiResult<Value> {
        self.invoke(rt, &Value::Undefined, args)
    }

    /// Call with `this` bound to `receiver`
    pub fn call_with_this(&self, rt: &Runtime, receiver: &Object, args: &[Value]) -> JsiResult<Value> {
        self.invoke(rt, &Value::Object(receiver.clone()), args)
    }

    /// `new self(...args)`
    pub fn call_as_constructor(&self, rt: &Runtime, args: &[Value]) -> JsiResult<Value> {
        let _scope = rt.scope();
        let constructor = self.handle(rt);
        let argv: Vec<*mut js_value_t> = args.iter().map(|arg| rt.to_native(arg)).collect();
        let mut result = ptr::null_mut();
        // SAFETY: argv holds argv.len() live handles
        let status = unsafe { js_new_instance(rt.env(), constructor, argv.len(), argv.as_ptr(), &mut result) };
        rt.check(status, "js_new_instance")?;
        Ok(rt.to_embedder(result))
    }

    fn invoke(&self, rt: &Runtime, receiver: &Value, args: &[Value]) -> JsiResult<Value> {
        let _scope = rt.scope();
        let (function, receiver) = (self.handle(rt), rt.to_native(receiver));
        let argv: Vec<*mut js_value_t> = args.iter().map(|arg| rt.to_native(arg)).collect();
        let mut result = ptr::null_mut();
        // SAFETY: argv holds argv.len() live handles
        let status =
            unsafe { js_call_function(rt.env(), receiver, function, argv.len(), argv.as_ptr(), &mut result) };
        rt.check(status, "js_call_function")?;
        Ok(rt.to_embedder(result))
    }

    pub fn into_object(self) -> Object {
        self.0
    }
}

impl Deref for Function {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Platform;

    #[test]
    fn test_call_script_function() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let string = rt.global().get_property_as_function(&rt, "String").unwrap();
        let result = string.call(&rt, &[Value::from(12.5)]).unwrap();
        assert_eq!(result.as_string().unwrap().utf8(&rt).unwrap(), "12.5");
    }

    #[test]
    fn test_call_as_constructor() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let range_error = rt.global().get_property_as_function(&rt, "RangeError").unwrap();
        let message = crate::string::JsString::create_from_ascii(&rt, "too far").unwrap();
        let error = range_error.call_as_constructor(&rt, &[Value::from(message)]).unwrap();
        let error = error.into_object().unwrap();
        assert!(error.instance_of(&rt, &range_error).unwrap());
        let message = error.get_property(&rt, "message").unwrap();
        assert_eq!(message.as_string().unwrap().utf8(&rt).unwrap(), "too far");
    }

    #[test]
    fn test_calling_non_callable_is_type_error() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let not_callable = Function::from_object(Object::new(&rt).unwrap());
        let err = not_callable.call(&rt, &[]).unwrap_err();
        assert_eq!(err.as_js_error().unwrap().name(), "TypeError");
    }
}

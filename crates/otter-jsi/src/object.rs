//! Objects, arrays and weak object handles

use std::ops::Deref;
use std::ptr;

use otter_js_sys::*;

use crate::array_buffer::ArrayBuffer;
use crate::error::{JsiError, JsiResult, assert_ok};
use crate::function::Function;
use crate::reference::WeakReference;
use crate::runtime::Runtime;
use crate::string::AsPropertyKey;
use crate::value::{Value, pointer_type};

pointer_type!(
    /// A JavaScript object
    ///
    /// Functions, arrays and array buffers are objects too; recover the
    /// specific view with [`Object::as_function`], [`Object::as_array`] or
    /// [`Object::as_array_buffer`].
    Object
);

impl Object {
    /// `{}`
    pub fn new(rt: &Runtime) -> JsiResult<Self> {
        let _scope = rt.scope();
        let mut handle = ptr::null_mut();
        // SAFETY: env is live
        let status = unsafe { js_create_object(rt.env(), &mut handle) };
        rt.check(status, "js_create_object")?;
        Ok(Self::from_reference(rt.capture(handle)))
    }

    pub fn get_property<K: AsPropertyKey + ?Sized>(&self, rt: &Runtime, key: &K) -> JsiResult<Value> {
        let _scope = rt.scope();
        let (object, key) = (self.handle(rt), key.key_handle(rt));
        let mut value = ptr::null_mut();
        // SAFETY: all handles are live in the current scope
        let status = unsafe { js_get_property(rt.env(), object, key, &mut value) };
        rt.check(status, "js_get_property")?;
        Ok(rt.to_embedder(value))
    }

    pub fn set_property<K: AsPropertyKey + ?Sized>(
        &self,
        rt: &Runtime,
        key: &K,
        value: impl Into<Value>,
    ) -> JsiResult<()> {
        let _scope = rt.scope();
        let (object, key) = (self.handle(rt), key.key_handle(rt));
        let value = rt.to_native(&value.into());
        // SAFETY: all handles are live in the current scope
        let status = unsafe { js_set_property(rt.env(), object, key, value) };
        rt.check(status, "js_set_property")
    }

    pub fn has_property<K: AsPropertyKey + ?Sized>(&self, rt: &Runtime, key: &K) -> JsiResult<bool> {
        let _scope = rt.scope();
        let (object, key) = (self.handle(rt), key.key_handle(rt));
        let mut found = false;
        // SAFETY: all handles are live in the current scope
        let status = unsafe { js_has_property(rt.env(), object, key, &mut found) };
        rt.check(status, "js_has_property")?;
        Ok(found)
    }

    pub fn delete_property<K: AsPropertyKey + ?Sized>(&self, rt: &Runtime, key: &K) -> JsiResult<bool> {
        let _scope = rt.scope();
        let (object, key) = (self.handle(rt), key.key_handle(rt));
        let mut deleted = false;
        // SAFETY: all handles are live in the current scope
        let status = unsafe { js_delete_property(rt.env(), object, key, &mut deleted) };
        rt.check(status, "js_delete_property")?;
        Ok(deleted)
    }

    /// Own enumerable string keys, in the engine's enumeration order
    pub fn get_property_names(&self, rt: &Runtime) -> JsiResult<Array> {
        let _scope = rt.scope();
        let mut names = ptr::null_mut();
        // SAFETY: the object handle is live in the current scope
        let status = unsafe { js_get_property_names(rt.env(), self.handle(rt), &mut names) };
        rt.check(status, "js_get_property_names")?;
        Ok(Array(Object::from_reference(rt.capture(names))))
    }

    pub fn get_property_as_object<K: AsPropertyKey + ?Sized>(&self, rt: &Runtime, key: &K) -> JsiResult<Object> {
        self.get_property(rt, key)?.into_object()
    }

    pub fn get_property_as_function<K: AsPropertyKey + ?Sized>(&self, rt: &Runtime, key: &K) -> JsiResult<Function> {
        self.get_property_as_object(rt, key)?.as_function(rt)
    }

    pub fn is_array(&self, rt: &Runtime) -> bool {
        self.predicate(rt, js_is_array, "js_is_array")
    }

    pub fn is_array_buffer(&self, rt: &Runtime) -> bool {
        self.predicate(rt, js_is_arraybuffer, "js_is_arraybuffer")
    }

    pub fn is_function(&self, rt: &Runtime) -> bool {
        let _scope = rt.scope();
        let mut kind = js_undefined;
        // SAFETY: the object handle is live in the current scope
        assert_ok(unsafe { js_typeof(rt.env(), self.handle(rt), &mut kind) }, "js_typeof");
        kind == js_function
    }

    pub fn as_array(&self, rt: &Runtime) -> JsiResult<Array> {
        if self.is_array(rt) {
            Ok(Array(self.clone()))
        } else {
            Err(JsiError::type_mismatch("array", "object"))
        }
    }

    pub fn as_function(&self, rt: &Runtime) -> JsiResult<Function> {
        if self.is_function(rt) {
            Ok(Function::from_object(self.clone()))
        } else {
            Err(JsiError::type_mismatch("function", "object"))
        }
    }

    pub fn as_array_buffer(&self, rt: &Runtime) -> JsiResult<ArrayBuffer> {
        if self.is_array_buffer(rt) {
            Ok(ArrayBuffer::from_object(self.clone()))
        } else {
            Err(JsiError::type_mismatch("ArrayBuffer", "object"))
        }
    }

    /// `self instanceof constructor`
    pub fn instance_of(&self, rt: &Runtime, constructor: &Function) -> JsiResult<bool> {
        let _scope = rt.scope();
        let (object, constructor) = (self.handle(rt), constructor.handle(rt));
        let mut result = false;
        // SAFETY: both handles are live in the current scope
        let status = unsafe { js_instanceof(rt.env(), object, constructor, &mut result) };
        rt.check(status, "js_instanceof")?;
        Ok(result)
    }

    /// Identity comparison
    pub fn strict_equals(rt: &Runtime, a: &Object, b: &Object) -> bool {
        rt.strict_equals_references(&a.reference, &b.reference)
    }

    fn predicate(
        &self,
        rt: &Runtime,
        check: unsafe extern "C" fn(*mut js_env_t, *mut js_value_t, *mut bool) -> std::os::raw::c_int,
        operation: &str,
    ) -> bool {
        let _scope = rt.scope();
        let mut result = false;
        // SAFETY: the object handle is live in the current scope
        assert_ok(unsafe { check(rt.env(), self.handle(rt), &mut result) }, operation);
        result
    }
}

/// A JavaScript array
#[derive(Clone, Debug)]
pub struct Array(Object);

impl Array {
    /// An array of `length` undefined elements
    pub fn new(rt: &Runtime, length: usize) -> JsiResult<Self> {
        let _scope = rt.scope();
        let mut handle = ptr::null_mut();
        // SAFETY: env is live
        let status = unsafe { js_create_array_with_length(rt.env(), length, &mut handle) };
        rt.check(status, "js_create_array_with_length")?;
        Ok(Self(Object::from_reference(rt.capture(handle))))
    }

    pub fn size(&self, rt: &Runtime) -> usize {
        let _scope = rt.scope();
        let mut length = 0u32;
        // SAFETY: the array handle is live in the current scope
        let status = unsafe { js_get_array_length(rt.env(), self.handle(rt), &mut length) };
        assert_ok(status, "js_get_array_length");
        length as usize
    }

    pub fn get_value_at_index(&self, rt: &Runtime, index: usize) -> JsiResult<Value> {
        let index = self.checked_index(rt, index)?;
        let _scope = rt.scope();
        let mut value = ptr::null_mut();
        // SAFETY: the array handle is live in the current scope
        let status = unsafe { js_get_element(rt.env(), self.handle(rt), index, &mut value) };
        rt.check(status, "js_get_element")?;
        Ok(rt.to_embedder(value))
    }

    pub fn set_value_at_index(&self, rt: &Runtime, index: usize, value: impl Into<Value>) -> JsiResult<()> {
        let index = self.checked_index(rt, index)?;
        let _scope = rt.scope();
        let (array, value) = (self.handle(rt), rt.to_native(&value.into()));
        // SAFETY: both handles are live in the current scope
        let status = unsafe { js_set_element(rt.env(), array, index, value) };
        rt.check(status, "js_set_element")
    }

    /// Collect every element
    pub fn to_vec(&self, rt: &Runtime) -> JsiResult<Vec<Value>> {
        (0..self.size(rt)).map(|index| self.get_value_at_index(rt, index)).collect()
    }

    pub fn into_object(self) -> Object {
        self.0
    }

    fn checked_index(&self, rt: &Runtime, index: usize) -> JsiResult<u32> {
        let size = self.size(rt);
        if index >= size {
            return Err(JsiError::IndexOutOfRange { index, size });
        }
        // size came from a u32 length
        Ok(index as u32)
    }
}

impl Deref for Array {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.0
    }
}

/// Observes an object without keeping it alive
pub struct WeakObject {
    reference: WeakReference,
}

impl WeakObject {
    pub fn new(rt: &Runtime, object: &Object) -> Self {
        let _scope = rt.scope();
        Self {
            reference: WeakReference::new(rt, object.handle(rt)),
        }
    }

    /// The object if it is still alive, otherwise `Value::Null`
    pub fn lock(&self, rt: &Runtime) -> Value {
        let _scope = rt.scope();
        match self.reference.lock(rt) {
            Some(handle) => rt.to_embedder(handle),
            None => Value::Null,
        }
    }
}

impl std::fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WeakObject(<opaque>)")
    }
}

//! Execution environment: heap, handle scopes, references, exception slot
//! and the property/call semantics shared by the `js_*` surface and the
//! script runner.

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::ptr;
use std::rc::Rc;

use crate::builtins::{self, Intrinsics, number_to_string};
use crate::event_loop::js_loop_t;
use crate::heap::{
    ArrayBufferData, Callable, CellId, ErrorKind, Finalizer, Heap, HeapCell, ObjectClass, ObjectData,
    PropertyKey, SymbolData, Value,
};
use crate::platform::js_platform_t;
use crate::{
    js_bigint, js_boolean, js_callback_info_t, js_delegate_callbacks_t, js_env_options_t, js_external,
    js_function, js_function_cb, js_handle_scope_t, js_null, js_number, js_object, js_ref_t, js_string,
    js_symbol, js_undefined, js_value_t, js_value_type_t,
};

/// Outcome of an operation that may throw; `Err` carries the thrown value.
pub(crate) type Completion<T> = Result<T, Value>;

pub(crate) fn encode<T>(index: usize) -> *mut T {
    ptr::without_provenance_mut(index + 1)
}

pub(crate) fn decode<T>(pointer: *mut T) -> Option<usize> {
    if pointer.is_null() {
        None
    } else {
        Some(pointer.addr() - 1)
    }
}

struct ScopeFrame {
    base: usize,
    escape_slot: Option<usize>,
    escaped: bool,
}

struct RefEntry {
    value: Option<Value>,
    count: u32,
}

#[derive(Default)]
struct ReferenceTable {
    entries: Vec<Option<RefEntry>>,
    free: Vec<usize>,
}

impl ReferenceTable {
    fn insert(&mut self, entry: RefEntry) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.entries[index] = Some(entry);
                index
            }
            None => {
                self.entries.push(Some(entry));
                self.entries.len() - 1
            }
        }
    }

    fn get_mut(&mut self, reference: *mut js_ref_t) -> Option<&mut RefEntry> {
        let index = decode(reference)?;
        self.entries.get_mut(index)?.as_mut()
    }

    fn remove(&mut self, reference: *mut js_ref_t) -> bool {
        let Some(index) = decode(reference) else {
            return false;
        };
        match self.entries.get_mut(index).and_then(Option::take) {
            Some(_) => {
                self.free.push(index);
                true
            }
            None => false,
        }
    }

    fn strong_roots(&self) -> impl Iterator<Item = CellId> + '_ {
        self.entries
            .iter()
            .flatten()
            .filter(|entry| entry.count > 0)
            .filter_map(|entry| entry.value.as_ref().and_then(Value::cell))
    }

    fn clear_collected(&mut self, heap: &Heap) -> usize {
        let mut cleared = 0;
        for entry in self.entries.iter_mut().flatten() {
            let dead = entry
                .value
                .as_ref()
                .and_then(Value::cell)
                .is_some_and(|id| !heap.is_live(id));
            if dead {
                entry.value = None;
                cleared += 1;
            }
        }
        cleared
    }
}

/// A single-threaded execution environment bound to one loop.
pub struct js_env_t {
    pub(crate) heap: RefCell<Heap>,
    handles: RefCell<Vec<Value>>,
    scopes: RefCell<Vec<ScopeFrame>>,
    references: RefCell<ReferenceTable>,
    exception: RefCell<Option<Value>>,
    pub(crate) intrinsics: Intrinsics,
    pub(crate) event_loop: *mut js_loop_t,
    pub(crate) platform: *mut js_platform_t,
    pub(crate) options: js_env_options_t,
    join_stack: RefCell<Vec<CellId>>,
    call_depth: Cell<u32>,
    destroyed: Cell<bool>,
    trace_gc: bool,
}

impl js_env_t {
    pub(crate) fn new(
        event_loop: *mut js_loop_t,
        platform: *mut js_platform_t,
        options: js_env_options_t,
        expose_gc: bool,
        trace_gc: bool,
    ) -> Self {
        let mut heap = Heap::new();
        let intrinsics = builtins::install(&mut heap, expose_gc);
        Self {
            heap: RefCell::new(heap),
            handles: RefCell::new(Vec::new()),
            scopes: RefCell::new(Vec::new()),
            references: RefCell::new(ReferenceTable::default()),
            exception: RefCell::new(None),
            intrinsics,
            event_loop,
            platform,
            options,
            join_stack: RefCell::new(Vec::new()),
            call_depth: Cell::new(0),
            destroyed: Cell::new(false),
            trace_gc,
        }
    }

    /// Resolve a raw env pointer, rejecting null and destroyed envs.
    ///
    /// # Safety
    /// `env` must be null or a pointer returned by `js_create_env` whose
    /// close callback has not run yet.
    pub(crate) unsafe fn from_raw<'a>(env: *mut js_env_t) -> Option<&'a js_env_t> {
        // SAFETY: per the caller contract
        unsafe { env.as_ref() }.filter(|env| !env.destroyed.get())
    }

    pub(crate) fn as_ptr(&self) -> *mut js_env_t {
        self as *const js_env_t as *mut js_env_t
    }

    // Handles and scopes

    pub(crate) fn push_handle(&self, value: Value) -> *mut js_value_t {
        let mut handles = self.handles.borrow_mut();
        handles.push(value);
        encode(handles.len() - 1)
    }

    pub(crate) fn handle(&self, handle: *mut js_value_t) -> Option<Value> {
        let index = decode(handle)?;
        self.handles.borrow().get(index).cloned()
    }

    /// Keep `value` alive until the innermost scope closes.
    pub(crate) fn root(&self, value: Value) -> Value {
        if value.cell().is_some() {
            self.handles.borrow_mut().push(value.clone());
        }
        value
    }

    pub(crate) fn open_scope(&self, escapable: bool) -> *mut js_handle_scope_t {
        let escape_slot = escapable.then(|| {
            let mut handles = self.handles.borrow_mut();
            handles.push(Value::Undefined);
            handles.len() - 1
        });
        let mut scopes = self.scopes.borrow_mut();
        scopes.push(ScopeFrame {
            base: self.handles.borrow().len(),
            escape_slot,
            escaped: false,
        });
        encode(scopes.len() - 1)
    }

    /// Close the innermost scope. Scopes must be closed in LIFO order.
    pub(crate) fn close_scope(&self, scope: *mut js_handle_scope_t) -> bool {
        let mut scopes = self.scopes.borrow_mut();
        if decode(scope) != scopes.len().checked_sub(1) {
            return false;
        }
        if let Some(frame) = scopes.pop() {
            self.handles.borrow_mut().truncate(frame.base);
        }
        true
    }

    /// Copy `value` into the slot reserved by an escapable scope.
    pub(crate) fn escape(&self, scope: *mut js_handle_scope_t, value: Value) -> Option<*mut js_value_t> {
        let index = decode(scope)?;
        let mut scopes = self.scopes.borrow_mut();
        let frame = scopes.get_mut(index)?;
        let slot = frame.escape_slot?;
        if frame.escaped {
            return None;
        }
        frame.escaped = true;
        self.handles.borrow_mut()[slot] = value;
        Some(encode(slot))
    }

    fn scoped<T>(&self, f: impl FnOnce() -> T) -> T {
        let scope = self.open_scope(false);
        let result = f();
        self.close_scope(scope);
        result
    }

    // References

    pub(crate) fn create_reference(&self, value: Value, count: u32) -> *mut js_ref_t {
        let index = self.references.borrow_mut().insert(RefEntry {
            value: Some(value),
            count,
        });
        encode(index)
    }

    pub(crate) fn reference_ref(&self, reference: *mut js_ref_t) -> Option<u32> {
        let mut references = self.references.borrow_mut();
        let entry = references.get_mut(reference)?;
        entry.count += 1;
        Some(entry.count)
    }

    pub(crate) fn reference_unref(&self, reference: *mut js_ref_t) -> Option<u32> {
        let mut references = self.references.borrow_mut();
        let entry = references.get_mut(reference)?;
        entry.count = entry.count.checked_sub(1)?;
        Some(entry.count)
    }

    pub(crate) fn delete_reference(&self, reference: *mut js_ref_t) -> bool {
        self.references.borrow_mut().remove(reference)
    }

    /// `None` for an unknown reference, `Some(None)` once the value was collected.
    pub(crate) fn reference_value(&self, reference: *mut js_ref_t) -> Option<Option<Value>> {
        let mut references = self.references.borrow_mut();
        let entry = references.get_mut(reference)?;
        Some(entry.value.clone())
    }

    // Exceptions

    pub(crate) fn set_exception(&self, value: Value) {
        *self.exception.borrow_mut() = Some(value);
    }

    pub(crate) fn take_exception(&self) -> Option<Value> {
        self.exception.borrow_mut().take()
    }

    pub(crate) fn has_exception(&self) -> bool {
        self.exception.borrow().is_some()
    }

    pub(crate) fn create_error(&self, kind: ErrorKind, message: &str) -> Value {
        let prototype = self.intrinsics.error_prototype(kind);
        let mut data = ObjectData::new(ObjectClass::Error, Some(prototype));
        data.properties
            .insert(PropertyKey::named("message"), Value::string(message));
        let stack = if message.is_empty() {
            kind.name().to_string()
        } else {
            format!("{}: {}", kind.name(), message)
        };
        data.properties
            .insert(PropertyKey::named("stack"), Value::String(Rc::from(stack)));
        Value::Object(self.heap.borrow_mut().alloc_object(data))
    }

    pub(crate) fn throw<T>(&self, kind: ErrorKind, message: impl AsRef<str>) -> Completion<T> {
        Err(self.create_error(kind, message.as_ref()))
    }

    // Allocation

    pub(crate) fn alloc(&self, class: ObjectClass) -> Value {
        let prototype = match &class {
            ObjectClass::Array(_) => self.intrinsics.array_prototype,
            ObjectClass::Function(_) => self.intrinsics.function_prototype,
            ObjectClass::Error => self.intrinsics.error_prototype(ErrorKind::Error),
            _ => self.intrinsics.object_prototype,
        };
        self.alloc_with_prototype(class, Some(prototype))
    }

    pub(crate) fn alloc_with_prototype(&self, class: ObjectClass, prototype: Option<CellId>) -> Value {
        Value::Object(
            self.heap
                .borrow_mut()
                .alloc_object(ObjectData::new(class, prototype)),
        )
    }

    /// Allocate a native function together with its `prototype` object.
    pub(crate) fn alloc_function(&self, cb: js_function_cb, data: *mut c_void, name: &str) -> Value {
        let function = self.alloc(ObjectClass::Function(Callable::Native {
            cb,
            data,
            name: Rc::from(name),
        }));
        let prototype = self.alloc(ObjectClass::Ordinary);
        let mut heap = self.heap.borrow_mut();
        if let (Some(f), Some(p)) = (function.as_object(), prototype.as_object()) {
            if let Some(proto) = heap.object_mut(p) {
                proto
                    .properties
                    .insert(PropertyKey::named("constructor"), function.clone());
            }
            if let Some(func) = heap.object_mut(f) {
                func.properties
                    .insert(PropertyKey::named("prototype"), prototype.clone());
            }
        }
        function
    }

    pub(crate) fn alloc_symbol(&self, description: Option<Rc<str>>) -> Value {
        Value::Symbol(
            self.heap
                .borrow_mut()
                .alloc(HeapCell::Symbol(SymbolData { description })),
        )
    }

    pub(crate) fn with_object<T>(&self, value: &Value, f: impl FnOnce(&ObjectData) -> T) -> Option<T> {
        let id = value.as_object()?;
        let heap = self.heap.borrow();
        heap.object(id).map(f)
    }

    pub(crate) fn with_object_mut<T>(&self, value: &Value, f: impl FnOnce(&mut ObjectData) -> T) -> Option<T> {
        let id = value.as_object()?;
        let mut heap = self.heap.borrow_mut();
        heap.object_mut(id).map(f)
    }

    pub(crate) fn array_buffer_info(&self, value: &Value) -> Option<(*mut u8, usize)> {
        self.with_object_mut(value, |data| match &mut data.class {
            ObjectClass::ArrayBuffer(buffer) => Some(buffer.info()),
            _ => None,
        })
        .flatten()
    }

    pub(crate) fn add_finalizer(&self, value: &Value, finalizer: Finalizer) -> bool {
        self.with_object_mut(value, |data| data.finalizers.push(finalizer))
            .is_some()
    }

    // Introspection

    pub(crate) fn type_of(&self, value: &Value) -> js_value_type_t {
        match value {
            Value::Undefined => js_undefined,
            Value::Null => js_null,
            Value::Bool(_) => js_boolean,
            Value::Number(_) => js_number,
            Value::String(_) => js_string,
            Value::BigInt(_) => js_bigint,
            Value::Symbol(_) => js_symbol,
            Value::Object(_) => self
                .with_object(value, |data| match data.class {
                    ObjectClass::Function(_) => js_function,
                    ObjectClass::External(_) => js_external,
                    _ => js_object,
                })
                .unwrap_or(js_object),
        }
    }

    pub(crate) fn is_callable(&self, value: &Value) -> bool {
        self.callable_of(value).is_some()
    }

    fn callable_of(&self, value: &Value) -> Option<Callable> {
        self.with_object(value, |data| match &data.class {
            ObjectClass::Function(callable) => Some(callable.clone()),
            _ => None,
        })
        .flatten()
    }

    fn delegate_of(&self, id: CellId) -> Option<(js_delegate_callbacks_t, *mut c_void)> {
        let heap = self.heap.borrow();
        match &heap.object(id)?.class {
            ObjectClass::Delegate { callbacks, data } => Some((*callbacks, *data)),
            _ => None,
        }
    }

    pub(crate) fn strict_equals(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Number(x), Value::Number(y)) => x == y,
            (Value::String(x), Value::String(y)) => x == y,
            (Value::BigInt(x), Value::BigInt(y)) => x == y,
            (Value::Symbol(x), Value::Symbol(y)) | (Value::Object(x), Value::Object(y)) => x == y,
            _ => false,
        }
    }

    pub(crate) fn symbol_description(&self, id: CellId) -> Option<Rc<str>> {
        self.heap
            .borrow()
            .symbol(id)
            .and_then(|symbol| symbol.description.clone())
    }

    /// `Symbol(description)`, as produced by `String(symbol)`.
    pub(crate) fn symbol_descriptive_string(&self, id: CellId) -> String {
        format!("Symbol({})", self.symbol_description(id).as_deref().unwrap_or(""))
    }

    fn key_description(&self, key: &PropertyKey) -> String {
        match key {
            PropertyKey::String(s) => s.to_string(),
            PropertyKey::Symbol(id) => self.symbol_descriptive_string(*id),
        }
    }

    // Conversions

    pub(crate) fn to_string(&self, value: &Value) -> Completion<Rc<str>> {
        match value {
            Value::Undefined => Ok(Rc::from("undefined")),
            Value::Null => Ok(Rc::from("null")),
            Value::Bool(b) => Ok(Rc::from(if *b { "true" } else { "false" })),
            Value::Number(n) => Ok(Rc::from(number_to_string(*n))),
            Value::String(s) => Ok(s.clone()),
            Value::BigInt(b) => Ok(Rc::from(b.to_string())),
            Value::Symbol(_) => self.throw(ErrorKind::TypeError, "Cannot convert a Symbol value to a string"),
            Value::Object(id) => self.object_to_string(*id, value),
        }
    }

    fn object_to_string(&self, id: CellId, value: &Value) -> Completion<Rc<str>> {
        enum Shape {
            Error,
            Array(Vec<Value>),
            Function(String),
            Plain,
        }

        let shape = self
            .with_object(value, |data| match &data.class {
                ObjectClass::Error => Shape::Error,
                ObjectClass::Array(elements) => Shape::Array(elements.clone()),
                ObjectClass::Function(callable) => Shape::Function(callable.name().to_string()),
                _ => Shape::Plain,
            })
            .unwrap_or(Shape::Plain);

        match shape {
            Shape::Error => {
                let name = match self.get(value, &PropertyKey::named("name"))? {
                    Value::Undefined => Rc::from("Error"),
                    name => self.to_string(&name)?,
                };
                let message = match self.get(value, &PropertyKey::named("message"))? {
                    Value::Undefined => Rc::from(""),
                    message => self.to_string(&message)?,
                };
                Ok(match (name.is_empty(), message.is_empty()) {
                    (_, true) => name,
                    (true, false) => message,
                    (false, false) => Rc::from(format!("{name}: {message}")),
                })
            }
            Shape::Array(elements) => {
                if self.join_stack.borrow().contains(&id) {
                    return Ok(Rc::from(""));
                }
                self.join_stack.borrow_mut().push(id);
                let joined = elements
                    .iter()
                    .map(|element| match element {
                        Value::Undefined | Value::Null => Ok(String::new()),
                        other => self.to_string(other).map(|s| s.to_string()),
                    })
                    .collect::<Completion<Vec<_>>>();
                self.join_stack.borrow_mut().pop();
                Ok(Rc::from(joined?.join(",")))
            }
            Shape::Function(name) => Ok(Rc::from(format!("function {name}() {{ [native code] }}"))),
            Shape::Plain => Ok(Rc::from("[object Object]")),
        }
    }

    pub(crate) fn to_property_key(&self, value: &Value) -> Completion<PropertyKey> {
        match value {
            Value::Symbol(id) => Ok(PropertyKey::Symbol(*id)),
            other => Ok(PropertyKey::String(self.to_string(other)?)),
        }
    }

    pub(crate) fn to_number(&self, value: &Value) -> Completion<f64> {
        match value {
            Value::Undefined => Ok(f64::NAN),
            Value::Null => Ok(0.0),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => Ok(*n),
            Value::String(s) => {
                let trimmed = s.trim();
                Ok(if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                })
            }
            Value::BigInt(_) => self.throw(ErrorKind::TypeError, "Cannot convert a BigInt value to a number"),
            Value::Symbol(_) => self.throw(ErrorKind::TypeError, "Cannot convert a Symbol value to a number"),
            Value::Object(_) => {
                let primitive = self.to_string(value)?;
                self.to_number(&Value::String(primitive))
            }
        }
    }

    // Property access

    pub(crate) fn get(&self, target: &Value, key: &PropertyKey) -> Completion<Value> {
        match target {
            Value::Undefined | Value::Null => {
                let kind = if matches!(target, Value::Undefined) { "undefined" } else { "null" };
                self.throw(
                    ErrorKind::TypeError,
                    format!(
                        "Cannot read properties of {kind} (reading '{}')",
                        self.key_description(key)
                    ),
                )
            }
            Value::String(s) => Ok(match key {
                PropertyKey::String(name) if &**name == "length" => {
                    Value::Number(s.encode_utf16().count() as f64)
                }
                _ => match key.as_index().and_then(|index| s.chars().nth(index)) {
                    Some(c) => Value::String(Rc::from(c.to_string())),
                    None => Value::Undefined,
                },
            }),
            Value::Symbol(id) => Ok(match key {
                PropertyKey::String(name) if &**name == "description" => self
                    .symbol_description(*id)
                    .map(Value::String)
                    .unwrap_or(Value::Undefined),
                _ => Value::Undefined,
            }),
            Value::Object(id) => self.get_from_object(*id, key),
            _ => Ok(Value::Undefined),
        }
    }

    fn get_from_object(&self, id: CellId, key: &PropertyKey) -> Completion<Value> {
        if let Some((callbacks, data)) = self.delegate_of(id)
            && let Some(get) = callbacks.get
        {
            let intercepted = self.in_callback(|| {
                let property = self.push_handle(key.to_value());
                // SAFETY: delegate callbacks are invoked with the env and data they were registered with
                let result = unsafe { get(self.as_ptr(), property, data) };
                self.callback_outcome(result)
            })?;
            if let Some(value) = intercepted {
                return Ok(value);
            }
        }

        let heap = self.heap.borrow();
        let mut current = Some(id);
        while let Some(cell) = current {
            let Some(data) = heap.object(cell) else { break };
            match &data.class {
                ObjectClass::Array(elements) => {
                    if matches!(key, PropertyKey::String(name) if &**name == "length") {
                        return Ok(Value::Number(elements.len() as f64));
                    }
                    if let Some(element) = key.as_index().and_then(|index| elements.get(index)) {
                        return Ok(element.clone());
                    }
                }
                ObjectClass::Function(callable) => {
                    if matches!(key, PropertyKey::String(name) if &**name == "name") {
                        return Ok(Value::string(callable.name()));
                    }
                }
                ObjectClass::ArrayBuffer(ArrayBufferData::Owned(bytes)) => {
                    if matches!(key, PropertyKey::String(name) if &**name == "byteLength") {
                        return Ok(Value::Number(bytes.len() as f64));
                    }
                }
                ObjectClass::ArrayBuffer(ArrayBufferData::External { len, .. }) => {
                    if matches!(key, PropertyKey::String(name) if &**name == "byteLength") {
                        return Ok(Value::Number(*len as f64));
                    }
                }
                _ => {}
            }
            if let Some(value) = data.properties.get(key) {
                return Ok(value.clone());
            }
            current = data.prototype;
        }
        Ok(Value::Undefined)
    }

    pub(crate) fn set(&self, target: &Value, key: PropertyKey, value: Value) -> Completion<()> {
        match target {
            Value::Undefined | Value::Null => {
                let kind = if matches!(target, Value::Undefined) { "undefined" } else { "null" };
                self.throw(
                    ErrorKind::TypeError,
                    format!(
                        "Cannot set properties of {kind} (setting '{}')",
                        self.key_description(&key)
                    ),
                )
            }
            Value::Object(id) => self.set_on_object(*id, key, value),
            _ => Ok(()),
        }
    }

    fn set_on_object(&self, id: CellId, key: PropertyKey, value: Value) -> Completion<()> {
        if let Some((callbacks, data)) = self.delegate_of(id)
            && let Some(set) = callbacks.set
        {
            let handled = self.in_callback(|| {
                let property = self.push_handle(key.to_value());
                let handle = self.push_handle(value.clone());
                // SAFETY: delegate callbacks are invoked with the env and data they were registered with
                let handled = unsafe { set(self.as_ptr(), property, handle, data) };
                match self.take_exception() {
                    Some(exception) => Err(exception),
                    None => Ok(handled),
                }
            })?;
            if handled {
                return Ok(());
            }
        }

        let new_length = match (&key, &value) {
            (PropertyKey::String(name), Value::Number(n)) if &**name == "length" => Some(*n),
            _ => None,
        };

        let invalid_length = {
            let mut heap = self.heap.borrow_mut();
            let Some(data) = heap.object_mut(id) else {
                return Ok(());
            };
            match &mut data.class {
                ObjectClass::Array(elements) if new_length.is_some() => {
                    let n = new_length.unwrap_or_default();
                    if n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 {
                        elements.resize(n as usize, Value::Undefined);
                        false
                    } else {
                        true
                    }
                }
                ObjectClass::Array(elements)
                    if key
                        .as_index()
                        .is_some_and(|index| index < elements.len() + MAX_ARRAY_GROWTH) =>
                {
                    let index = key.as_index().unwrap_or_default();
                    if index >= elements.len() {
                        elements.resize(index + 1, Value::Undefined);
                    }
                    elements[index] = value;
                    false
                }
                _ => {
                    data.properties.insert(key, value);
                    false
                }
            }
        };

        if invalid_length {
            return self.throw(ErrorKind::RangeError, "Invalid array length");
        }
        Ok(())
    }

    pub(crate) fn has(&self, target: &Value, key: &PropertyKey) -> Completion<bool> {
        let Value::Object(id) = target else {
            return self.throw(ErrorKind::TypeError, "Cannot use 'in' operator on a primitive value");
        };

        if let Some((callbacks, data)) = self.delegate_of(*id)
            && let Some(has) = callbacks.has
        {
            return self.in_callback(|| {
                let property = self.push_handle(key.to_value());
                // SAFETY: delegate callbacks are invoked with the env and data they were registered with
                let found = unsafe { has(self.as_ptr(), property, data) };
                match self.take_exception() {
                    Some(exception) => Err(exception),
                    None => Ok(found),
                }
            });
        }

        let heap = self.heap.borrow();
        let mut current = Some(*id);
        while let Some(cell) = current {
            let Some(data) = heap.object(cell) else { break };
            if let ObjectClass::Array(elements) = &data.class {
                if matches!(key, PropertyKey::String(name) if &**name == "length")
                    || key.as_index().is_some_and(|index| index < elements.len())
                {
                    return Ok(true);
                }
            }
            if data.properties.contains_key(key) {
                return Ok(true);
            }
            current = data.prototype;
        }
        Ok(false)
    }

    pub(crate) fn delete(&self, target: &Value, key: &PropertyKey) -> Completion<bool> {
        let Value::Object(id) = target else {
            return Ok(true);
        };

        if let Some((callbacks, data)) = self.delegate_of(*id)
            && let Some(delete_property) = callbacks.delete_property
        {
            let handled = self.in_callback(|| {
                let property = self.push_handle(key.to_value());
                // SAFETY: delegate callbacks are invoked with the env and data they were registered with
                let handled = unsafe { delete_property(self.as_ptr(), property, data) };
                match self.take_exception() {
                    Some(exception) => Err(exception),
                    None => Ok(handled),
                }
            })?;
            if handled {
                return Ok(true);
            }
        }

        let mut heap = self.heap.borrow_mut();
        let Some(data) = heap.object_mut(*id) else {
            return Ok(true);
        };
        if let ObjectClass::Array(elements) = &mut data.class
            && let Some(slot) = key.as_index().and_then(|index| elements.get_mut(index))
        {
            *slot = Value::Undefined;
            return Ok(true);
        }
        data.properties.shift_remove(key);
        Ok(true)
    }

    /// Own enumerable string keys, in insertion order (array indices first).
    pub(crate) fn own_keys(&self, target: &Value) -> Completion<Vec<Value>> {
        let Value::Object(id) = target else {
            return Ok(Vec::new());
        };

        if let Some((callbacks, data)) = self.delegate_of(*id)
            && let Some(own_keys) = callbacks.own_keys
        {
            let keys = self.in_callback(|| {
                // SAFETY: delegate callbacks are invoked with the env and data they were registered with
                let result = unsafe { own_keys(self.as_ptr(), data) };
                self.callback_outcome(result)
            })?;
            let Some(keys) = keys else {
                return Ok(Vec::new());
            };
            let elements = self
                .with_object(&keys, |data| match &data.class {
                    ObjectClass::Array(elements) => Some(elements.clone()),
                    _ => None,
                })
                .flatten();
            let Some(elements) = elements else {
                return self.throw(ErrorKind::TypeError, "ownKeys result must be an array");
            };
            return elements
                .iter()
                .map(|key| self.to_property_key(key).map(|key| key.to_value()))
                .collect();
        }

        let heap = self.heap.borrow();
        let Some(data) = heap.object(*id) else {
            return Ok(Vec::new());
        };
        let mut keys = Vec::new();
        if let ObjectClass::Array(elements) = &data.class {
            keys.extend((0..elements.len()).map(|index| Value::String(Rc::from(index.to_string()))));
        }
        keys.extend(data.properties.keys().filter_map(|key| match key {
            PropertyKey::String(name) => Some(Value::String(name.clone())),
            PropertyKey::Symbol(_) => None,
        }));
        Ok(keys)
    }

    // Calls

    /// Run a native callback inside its own handle scope, enforcing the call
    /// depth limit.
    fn in_callback<T>(&self, f: impl FnOnce() -> Completion<T>) -> Completion<T> {
        let depth = self.call_depth.get();
        if depth >= self.options.max_call_depth {
            return self.throw(ErrorKind::RangeError, "Maximum call stack size exceeded");
        }
        self.call_depth.set(depth + 1);
        let outcome = self.scoped(f);
        self.call_depth.set(depth);
        outcome
    }

    /// Translate a callback's return into a completion: a pending exception
    /// wins over any returned handle.
    fn callback_outcome(&self, result: *mut js_value_t) -> Completion<Option<Value>> {
        match self.take_exception() {
            Some(exception) => Err(exception),
            None => Ok(self.handle(result)),
        }
    }

    fn invoke_native(
        &self,
        cb: js_function_cb,
        data: *mut c_void,
        receiver: Value,
        args: &[Value],
    ) -> Completion<Value> {
        let Some(cb) = cb else {
            return Ok(Value::Undefined);
        };
        self.in_callback(|| {
            let mut info = js_callback_info_t {
                receiver: self.push_handle(receiver),
                args: args.iter().map(|arg| self.push_handle(arg.clone())).collect(),
                data,
            };
            // SAFETY: native functions are invoked with the env and data they were created with
            let result = unsafe { cb(self.as_ptr(), &mut info) };
            Ok(self.callback_outcome(result)?.unwrap_or(Value::Undefined))
        })
    }

    pub(crate) fn call(&self, function: &Value, receiver: Value, args: &[Value]) -> Completion<Value> {
        match self.callable_of(function) {
            Some(Callable::Native { cb, data, .. }) => self.invoke_native(cb, data, receiver, args),
            Some(Callable::Builtin { builtin, .. }) => {
                self.in_callback(|| builtins::call(self, builtin, receiver, args))
            }
            None => self.throw(ErrorKind::TypeError, format!("{} is not a function", self.describe(function))),
        }
    }

    pub(crate) fn construct(&self, constructor: &Value, args: &[Value]) -> Completion<Value> {
        match self.callable_of(constructor) {
            Some(Callable::Native { cb, data, .. }) => {
                let prototype = match self.get(constructor, &PropertyKey::named("prototype"))? {
                    Value::Object(prototype) => prototype,
                    _ => self.intrinsics.object_prototype,
                };
                let receiver = self.root(self.alloc_with_prototype(ObjectClass::Ordinary, Some(prototype)));
                let result =
                    self.invoke_native(cb, data, receiver.clone(), args)?;
                Ok(match result {
                    Value::Object(_) => result,
                    _ => receiver,
                })
            }
            Some(Callable::Builtin { builtin, .. }) => {
                self.in_callback(|| builtins::construct(self, builtin, args))
            }
            None => self.throw(
                ErrorKind::TypeError,
                format!("{} is not a constructor", self.describe(constructor)),
            ),
        }
    }

    pub(crate) fn instance_of(&self, value: &Value, constructor: &Value) -> Completion<bool> {
        if !self.is_callable(constructor) {
            return self.throw(ErrorKind::TypeError, "Right-hand side of 'instanceof' is not callable");
        }
        let Value::Object(object) = value else {
            return Ok(false);
        };
        let Value::Object(prototype) = self.get(constructor, &PropertyKey::named("prototype"))? else {
            return self.throw(
                ErrorKind::TypeError,
                "Function has non-object prototype in instanceof check",
            );
        };

        let heap = self.heap.borrow();
        let mut current = heap.object(*object).and_then(|data| data.prototype);
        while let Some(cell) = current {
            if cell == prototype {
                return Ok(true);
            }
            current = heap.object(cell).and_then(|data| data.prototype);
        }
        Ok(false)
    }

    fn describe(&self, value: &Value) -> String {
        match value {
            Value::String(s) => format!("\"{s}\""),
            Value::Symbol(id) => self.symbol_descriptive_string(*id),
            Value::Object(_) => "object".to_string(),
            other => self
                .to_string(other)
                .map(|s| s.to_string())
                .unwrap_or_default(),
        }
    }

    // Garbage collection

    pub(crate) fn collect_garbage(&self) {
        let mut roots: Vec<CellId> = self.intrinsics.roots().collect();
        roots.extend(self.handles.borrow().iter().filter_map(Value::cell));
        roots.extend(self.references.borrow().strong_roots());
        if let Some(exception) = self.exception.borrow().as_ref().and_then(Value::cell) {
            roots.push(exception);
        }

        let collection = self.heap.borrow_mut().collect(roots);
        let cleared = self
            .references
            .borrow_mut()
            .clear_collected(&self.heap.borrow());

        #[cfg(feature = "gc_logging")]
        if self.trace_gc {
            let heap = self.heap.borrow();
            tracing::trace!(
                cycle = heap.collections(),
                freed = collection.freed.len(),
                live = heap.live(),
                weak_cleared = cleared,
                finalizers = collection.finalizers.len(),
                "garbage collection"
            );
        }
        #[cfg(not(feature = "gc_logging"))]
        let _ = (cleared, self.trace_gc);

        self.schedule_finalizers(collection.finalizers);
    }

    /// Queue finalizers of collected objects on the env's loop.
    fn schedule_finalizers(&self, finalizers: Vec<Finalizer>) {
        if finalizers.is_empty() {
            return;
        }
        let env = self.as_ptr();
        // SAFETY: the loop outlives the env; the env is freed by a close
        // callback queued behind these finalizers
        unsafe { &*self.event_loop }.enqueue(move || run_finalizers(env, finalizers));
    }

    /// Finalize everything, release the platform slot and queue the close
    /// callback that frees the env.
    ///
    /// # Safety
    /// `env` must come from `js_create_env` and not have been destroyed.
    pub(crate) unsafe fn destroy(env: *mut js_env_t) {
        // SAFETY: per the caller contract
        let env_ref = unsafe { &*env };

        env_ref.destroyed.set(true);
        let finalizers = env_ref.heap.borrow_mut().teardown();
        run_finalizers(env, finalizers);

        env_ref.handles.borrow_mut().clear();
        env_ref.scopes.borrow_mut().clear();
        *env_ref.references.borrow_mut() = ReferenceTable::default();
        env_ref.exception.borrow_mut().take();

        // SAFETY: the platform outlives its envs
        if let Some(platform) = unsafe { env_ref.platform.as_ref() } {
            platform.envs.set(platform.envs.get().saturating_sub(1));
        }

        let event_loop = env_ref.event_loop;
        // SAFETY: the loop outlives the env
        unsafe { &*event_loop }.enqueue(move || {
            // SAFETY: this close callback is the sole owner of the env now
            unsafe {
                drop(Box::from_raw(env));
                (*event_loop).unref_handle();
            }
        });
    }
}

/// Arrays grow by index assignment only this far past their end; further
/// indices become ordinary properties.
const MAX_ARRAY_GROWTH: usize = 1 << 20;

fn run_finalizers(env: *mut js_env_t, finalizers: Vec<Finalizer>) {
    for finalizer in finalizers {
        if let Some(cb) = finalizer.cb {
            // SAFETY: finalizers run with the data and hint they were registered with
            unsafe { cb(env, finalizer.data, finalizer.hint) };
        }
    }
}

//! Precise mark/sweep heap backing objects and symbols.
//!
//! Cells are addressed by `CellId` (a slot index). Freed slots are reused, so
//! a `CellId` is only meaningful while something roots it.

use std::ffi::c_void;
use std::rc::Rc;

use indexmap::IndexMap;
use num_bigint::BigInt;

use crate::{js_delegate_callbacks_t, js_finalize_cb, js_function_cb, js_type_tag_t};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct CellId(u32);

impl CellId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// An engine value. Primitives are stored inline; symbols and objects live
/// in the heap.
#[derive(Clone, Debug)]
pub(crate) enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    BigInt(Rc<BigInt>),
    Symbol(CellId),
    Object(CellId),
}

impl Value {
    pub(crate) fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    pub(crate) fn cell(&self) -> Option<CellId> {
        match self {
            Value::Symbol(id) | Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub(crate) fn as_object(&self) -> Option<CellId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum PropertyKey {
    String(Rc<str>),
    Symbol(CellId),
}

impl PropertyKey {
    pub(crate) fn named(name: &str) -> Self {
        PropertyKey::String(Rc::from(name))
    }

    pub(crate) fn as_index(&self) -> Option<usize> {
        match self {
            PropertyKey::String(s) => {
                if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
                    return None;
                }
                s.parse::<u32>().ok().map(|i| i as usize)
            }
            PropertyKey::Symbol(_) => None,
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            PropertyKey::String(s) => Value::String(s.clone()),
            PropertyKey::Symbol(id) => Value::Symbol(*id),
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) struct Finalizer {
    pub cb: js_finalize_cb,
    pub data: *mut c_void,
    pub hint: *mut c_void,
}

pub(crate) struct Wrap {
    pub data: *mut c_void,
    pub finalizer: Option<Finalizer>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    SyntaxError,
    ReferenceError,
}

impl ErrorKind {
    pub(crate) const ALL: [ErrorKind; 5] = [
        ErrorKind::Error,
        ErrorKind::TypeError,
        ErrorKind::RangeError,
        ErrorKind::SyntaxError,
        ErrorKind::ReferenceError,
    ];

    pub(crate) fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::ReferenceError => "ReferenceError",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Builtin {
    String,
    Symbol,
    Object,
    ObjectKeys,
    Array,
    Error(ErrorKind),
    JsonParse,
    JsonStringify,
    Gc,
}

#[derive(Clone)]
pub(crate) enum Callable {
    Native {
        cb: js_function_cb,
        data: *mut c_void,
        name: Rc<str>,
    },
    Builtin {
        builtin: Builtin,
        name: Rc<str>,
    },
}

impl Callable {
    pub(crate) fn name(&self) -> &str {
        match self {
            Callable::Native { name, .. } | Callable::Builtin { name, .. } => name,
        }
    }
}

pub(crate) enum ArrayBufferData {
    Owned(Box<[u8]>),
    External { data: *mut u8, len: usize },
}

impl ArrayBufferData {
    pub(crate) fn info(&mut self) -> (*mut u8, usize) {
        match self {
            ArrayBufferData::Owned(bytes) => (bytes.as_mut_ptr(), bytes.len()),
            ArrayBufferData::External { data, len } => (*data, *len),
        }
    }
}

pub(crate) enum ObjectClass {
    Ordinary,
    Array(Vec<Value>),
    Error,
    Function(Callable),
    ArrayBuffer(ArrayBufferData),
    Delegate {
        callbacks: js_delegate_callbacks_t,
        data: *mut c_void,
    },
    External(*mut c_void),
}

pub(crate) struct ObjectData {
    pub class: ObjectClass,
    pub properties: IndexMap<PropertyKey, Value>,
    pub prototype: Option<CellId>,
    pub wrap: Option<Wrap>,
    pub type_tag: Option<js_type_tag_t>,
    pub finalizers: Vec<Finalizer>,
}

impl ObjectData {
    pub(crate) fn new(class: ObjectClass, prototype: Option<CellId>) -> Self {
        Self {
            class,
            properties: IndexMap::new(),
            prototype,
            wrap: None,
            type_tag: None,
            finalizers: Vec::new(),
        }
    }

    fn take_finalizers(&mut self) -> Vec<Finalizer> {
        let mut finalizers = std::mem::take(&mut self.finalizers);
        if let Some(finalizer) = self.wrap.take().and_then(|wrap| wrap.finalizer) {
            finalizers.push(finalizer);
        }
        finalizers
    }
}

pub(crate) struct SymbolData {
    pub description: Option<Rc<str>>,
}

pub(crate) enum HeapCell {
    Symbol(SymbolData),
    Object(Box<ObjectData>),
}

struct Slot {
    cell: HeapCell,
    marked: bool,
}

/// Result of one collection cycle.
pub(crate) struct Collection {
    pub freed: Vec<CellId>,
    pub finalizers: Vec<Finalizer>,
}

#[derive(Default)]
pub(crate) struct Heap {
    slots: Vec<Option<Slot>>,
    free: Vec<u32>,
    live: usize,
    collections: usize,
}

impl Heap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alloc(&mut self, cell: HeapCell) -> CellId {
        let slot = Slot {
            cell,
            marked: false,
        };
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(slot);
                CellId(index)
            }
            None => {
                self.slots.push(Some(slot));
                CellId((self.slots.len() - 1) as u32)
            }
        }
    }

    pub(crate) fn alloc_object(&mut self, data: ObjectData) -> CellId {
        self.alloc(HeapCell::Object(Box::new(data)))
    }

    #[cfg(any(test, feature = "gc_logging"))]
    pub(crate) fn live(&self) -> usize {
        self.live
    }

    #[cfg(any(test, feature = "gc_logging"))]
    pub(crate) fn collections(&self) -> usize {
        self.collections
    }

    pub(crate) fn is_live(&self, id: CellId) -> bool {
        matches!(self.slots.get(id.index()), Some(Some(_)))
    }

    pub(crate) fn object(&self, id: CellId) -> Option<&ObjectData> {
        match self.slots.get(id.index()) {
            Some(Some(Slot {
                cell: HeapCell::Object(data),
                ..
            })) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn object_mut(&mut self, id: CellId) -> Option<&mut ObjectData> {
        match self.slots.get_mut(id.index()) {
            Some(Some(Slot {
                cell: HeapCell::Object(data),
                ..
            })) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn symbol(&self, id: CellId) -> Option<&SymbolData> {
        match self.slots.get(id.index()) {
            Some(Some(Slot {
                cell: HeapCell::Symbol(data),
                ..
            })) => Some(data),
            _ => None,
        }
    }

    /// Mark everything reachable from `roots`, free the rest and hand back
    /// the finalizers of every freed object.
    pub(crate) fn collect(&mut self, roots: impl IntoIterator<Item = CellId>) -> Collection {
        let mut worklist: Vec<CellId> = roots.into_iter().collect();

        while let Some(id) = worklist.pop() {
            let Some(Some(slot)) = self.slots.get_mut(id.index()) else {
                continue;
            };
            if slot.marked {
                continue;
            }
            slot.marked = true;

            if let HeapCell::Object(data) = &slot.cell {
                trace_object(data, &mut worklist);
            }
        }

        let mut collection = Collection {
            freed: Vec::new(),
            finalizers: Vec::new(),
        };

        for (index, entry) in self.slots.iter_mut().enumerate() {
            let Some(slot) = entry else { continue };
            if slot.marked {
                slot.marked = false;
                continue;
            }
            if let Some(Slot {
                cell: HeapCell::Object(mut data),
                ..
            }) = entry.take()
            {
                collection.finalizers.extend(data.take_finalizers());
            }
            self.free.push(index as u32);
            collection.freed.push(CellId(index as u32));
        }

        self.live -= collection.freed.len();
        self.collections += 1;
        collection
    }

    /// Free every cell regardless of reachability, returning all finalizers.
    pub(crate) fn teardown(&mut self) -> Vec<Finalizer> {
        let mut finalizers = Vec::new();
        for entry in self.slots.iter_mut() {
            if let Some(Slot {
                cell: HeapCell::Object(mut data),
                ..
            }) = entry.take()
            {
                finalizers.extend(data.take_finalizers());
            }
        }
        self.slots.clear();
        self.free.clear();
        self.live = 0;
        finalizers
    }
}

fn trace_value(value: &Value, worklist: &mut Vec<CellId>) {
    if let Some(id) = value.cell() {
        worklist.push(id);
    }
}

fn trace_object(data: &ObjectData, worklist: &mut Vec<CellId>) {
    if let Some(proto) = data.prototype {
        worklist.push(proto);
    }
    for (key, value) in &data.properties {
        if let PropertyKey::Symbol(id) = key {
            worklist.push(*id);
        }
        trace_value(value, worklist);
    }
    if let ObjectClass::Array(elements) = &data.class {
        for element in elements {
            trace_value(element, worklist);
        }
    }
}

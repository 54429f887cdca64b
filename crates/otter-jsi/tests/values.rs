//! Value kinds crossing the bridge and the lifetime of their references

use std::rc::Rc;

use otter_jsi::{
    Array, BigInt, JsString, NativeState, Object, Platform, PropNameId, Runtime, Scope, StringBuffer, Value,
    WeakObject,
};

struct Marker;
impl NativeState for Marker {}

#[test]
fn test_bigint_to_string() {
    let platform = Platform::new().unwrap();
    let rt = Runtime::new(&platform).unwrap();
    let _scope = Scope::new(&rt);

    let bigint = BigInt::from_i64(&rt, 123456);
    assert_eq!(bigint.to_string(&rt, 10).unwrap(), "123456");
}

#[test]
fn test_symbol_to_string() {
    let platform = Platform::new().unwrap();
    let rt = Runtime::new(&platform).unwrap();
    let _scope = Scope::new(&rt);

    let value = rt
        .evaluate_javascript(&StringBuffer::new("Symbol('foo')"), "test.js")
        .unwrap();
    let symbol = value.as_symbol().unwrap();
    assert_eq!(symbol.to_string(&rt).unwrap(), "Symbol(foo)");
}

#[test]
fn test_prop_name() {
    let platform = Platform::new().unwrap();
    let rt = Runtime::new(&platform).unwrap();
    let _scope = Scope::new(&rt);

    let a = PropNameId::for_ascii(&rt, "hello").unwrap();
    let b = a;
    assert_eq!(b.utf8(&rt).unwrap(), "hello");

    let c = PropNameId::for_ascii(&rt, "world").unwrap();
    assert_eq!(c.utf8(&rt).unwrap(), "world");

    let d = c.clone();
    assert!(PropNameId::compare(&rt, &c, &d));
    assert!(!PropNameId::compare(&rt, &b, &d));

    let e = PropNameId::for_string(&rt, &JsString::create_from_ascii(&rt, "world").unwrap());
    assert!(PropNameId::compare(&rt, &c, &e));
}

#[test]
fn test_values_survive_a_round_trip_through_the_engine() {
    let platform = Platform::new().unwrap();
    let rt = Runtime::new(&platform).unwrap();
    let symbol = rt.eval("Symbol('rt')").unwrap();
    let values = [
        Value::Undefined,
        Value::Null,
        Value::Bool(false),
        Value::Number(1.5),
        Value::from(JsString::create_from_utf8(&rt, "snö".as_bytes()).unwrap()),
        symbol,
        Value::from(BigInt::from_i64(&rt, -9)),
        Value::from(Object::new(&rt).unwrap()),
    ];

    let holder = Array::new(&rt, values.len()).unwrap();
    for (index, value) in values.iter().enumerate() {
        holder.set_value_at_index(&rt, index, value.clone()).unwrap();
    }
    for (index, value) in values.iter().enumerate() {
        let back = holder.get_value_at_index(&rt, index).unwrap();
        assert_eq!(back.kind(), value.kind());
        assert!(Value::strict_equals(&rt, value, &back), "{value:?} came back as {back:?}");
    }
}

#[test]
fn test_values_outlive_the_scope_they_were_read_in() {
    let platform = Platform::new().unwrap();
    let rt = Runtime::new(&platform).unwrap();
    let object = {
        let _inner = Scope::new(&rt);
        rt.eval("({ answer: 42 })").unwrap()
    };
    rt.collect_garbage().unwrap();
    let object = object.as_object().unwrap();
    assert_eq!(object.get_property(&rt, "answer").unwrap().as_number().unwrap(), 42.0);
}

#[test]
fn test_clones_return_to_baseline() {
    let platform = Platform::new().unwrap();
    let rt = Runtime::new(&platform).unwrap();
    let marker = Rc::new(Marker);
    let object = Object::new(&rt).unwrap();
    object.set_native_state(&rt, marker.clone()).unwrap();
    object.set_property(&rt, "kept", true).unwrap();

    for _ in 0..8 {
        let clones: Vec<Object> = (0..4).map(|_| object.clone()).collect();
        drop(clones);
        rt.collect_garbage().unwrap();
        assert!(object.get_property(&rt, "kept").unwrap().as_bool().unwrap());
    }
    assert_eq!(Rc::strong_count(&marker), 3);

    drop(object);
    rt.collect_garbage().unwrap();
    assert_eq!(Rc::strong_count(&marker), 1);
}

#[test]
fn test_weak_object_lock() {
    let platform = Platform::new().unwrap();
    let rt = Runtime::new(&platform).unwrap();
    let object = Object::new(&rt).unwrap();
    object.set_property(&rt, "id", 7).unwrap();
    let weak = WeakObject::new(&rt, &object);

    let locked = weak.lock(&rt);
    assert!(Object::strict_equals(&rt, locked.as_object().unwrap(), &object));
    drop(locked);

    drop(object);
    rt.collect_garbage().unwrap();
    assert!(weak.lock(&rt).is_null());
}

#[test]
fn test_weak_object_held_by_script() {
    let platform = Platform::new().unwrap();
    let rt = Runtime::new(&platform).unwrap();
    let object = Object::new(&rt).unwrap();
    let weak = WeakObject::new(&rt, &object);
    rt.global().set_property(&rt, "held", object).unwrap();

    rt.collect_garbage().unwrap();
    assert!(weak.lock(&rt).is_object());

    rt.eval("held = null").unwrap();
    rt.collect_garbage().unwrap();
    assert!(weak.lock(&rt).is_null());
}

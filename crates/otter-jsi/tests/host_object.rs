//! Host objects seen from the embedder and from script

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use otter_jsi::{HostObject, JsError, JsiResult, Object, Platform, PropNameId, Runtime, Scope, Value};

#[derive(Default)]
struct Recorder {
    get_called: Cell<bool>,
    set_called: Cell<bool>,
}

impl HostObject for Recorder {
    fn get(&self, rt: &Runtime, name: &PropNameId) -> JsiResult<Value> {
        self.get_called.set(true);
        assert_eq!(name.utf8(rt)?, "foo");
        Ok(Value::from(42))
    }

    fn set(&self, rt: &Runtime, name: &PropNameId, value: &Value) -> JsiResult<()> {
        self.set_called.set(true);
        assert_eq!(name.utf8(rt)?, "foo");
        assert!(value.is_number());
        assert_eq!(value.as_number()?, 42.0);
        Ok(())
    }
}

struct Failing;

impl HostObject for Failing {
    fn get(&self, rt: &Runtime, _name: &PropNameId) -> JsiResult<Value> {
        Err(JsError::new(rt, "get failed").into())
    }

    fn set(&self, rt: &Runtime, _name: &PropNameId, _value: &Value) -> JsiResult<()> {
        Err(JsError::new(rt, "set failed").into())
    }
}

/// Records every name it is asked for and reports a fixed key list
struct Keys {
    keys: Vec<&'static str>,
    requested: RefCell<Vec<String>>,
}

impl HostObject for Keys {
    fn get(&self, rt: &Runtime, name: &PropNameId) -> JsiResult<Value> {
        let name = name.utf8(rt)?;
        self.requested.borrow_mut().push(name.clone());
        Ok(Value::from(otter_jsi::JsString::create_from_utf8(rt, name.as_bytes())?))
    }

    fn get_property_names(&self, rt: &Runtime) -> JsiResult<Vec<PropNameId>> {
        self.keys.iter().map(|key| PropNameId::for_ascii(rt, key)).collect()
    }
}

#[test]
fn test_get_and_set_reach_host() {
    let platform = Platform::new().unwrap();
    let rt = Runtime::new(&platform).unwrap();
    let _scope = Scope::new(&rt);

    let recorder = Rc::new(Recorder::default());
    let host: Rc<dyn HostObject> = recorder.clone();
    let object = Object::from_host_object(&rt, host.clone()).unwrap();

    assert!(object.is_host_object(&rt));
    assert!(Rc::ptr_eq(&object.get_host_object(&rt).unwrap(), &host));

    let value = object.get_property(&rt, "foo").unwrap();
    assert!(recorder.get_called.get());
    assert!(value.is_number());
    assert_eq!(value.as_number().unwrap(), 42.0);

    object.set_property(&rt, "foo", 42).unwrap();
    assert!(recorder.set_called.get());
}

#[test]
fn test_host_errors_surface_with_message() {
    let platform = Platform::new().unwrap();
    let rt = Runtime::new(&platform).unwrap();
    let _scope = Scope::new(&rt);

    let object = Object::from_host_object(&rt, Rc::new(Failing)).unwrap();

    let err = object.get_property(&rt, "foo").unwrap_err();
    assert_eq!(err.as_js_error().unwrap().message(), "get failed");

    let err = object.set_property(&rt, "foo", 42).unwrap_err();
    assert_eq!(err.as_js_error().unwrap().message(), "set failed");
}

#[test]
fn test_host_error_thrown_from_script_access() {
    let platform = Platform::new().unwrap();
    let rt = Runtime::new(&platform).unwrap();
    let object = Object::from_host_object(&rt, Rc::new(Failing)).unwrap();
    rt.global().set_property(&rt, "failing", object).unwrap();

    let err = rt.eval("failing.x").unwrap_err();
    let js = err.as_js_error().unwrap();
    assert_eq!(js.name(), "Error");
    assert_eq!(js.message(), "get failed");

    // the exception slot is clear again
    assert_eq!(rt.eval("1 + 1").unwrap().as_number().unwrap(), 2.0);
}

#[test]
fn test_key_order_preserved() {
    let platform = Platform::new().unwrap();
    let rt = Runtime::new(&platform).unwrap();
    let host = Rc::new(Keys {
        keys: vec!["a", "b", "c"],
        requested: RefCell::new(Vec::new()),
    });
    let object = Object::from_host_object(&rt, host.clone()).unwrap();

    let names = object.get_property_names(&rt).unwrap();
    let names: Vec<String> = names
        .to_vec(&rt)
        .unwrap()
        .iter()
        .map(|name| name.as_string().unwrap().utf8(&rt).unwrap())
        .collect();
    assert_eq!(names, ["a", "b", "c"]);

    rt.global().set_property(&rt, "keyed", object).unwrap();
    let joined = rt
        .eval("let k = Object.keys(keyed); k.length + ':' + k[0] + k[1] + k[2]")
        .unwrap();
    assert_eq!(joined.as_string().unwrap().utf8(&rt).unwrap(), "3:abc");
}

#[test]
fn test_get_receives_requested_name() {
    let platform = Platform::new().unwrap();
    let rt = Runtime::new(&platform).unwrap();
    let host = Rc::new(Keys {
        keys: Vec::new(),
        requested: RefCell::new(Vec::new()),
    });
    let object = Object::from_host_object(&rt, host.clone()).unwrap();
    rt.global().set_property(&rt, "echo", object).unwrap();

    let value = rt.eval("echo.first + '/' + echo['sécond']").unwrap();
    assert_eq!(value.as_string().unwrap().utf8(&rt).unwrap(), "first/sécond");
    assert_eq!(host.requested.borrow().as_slice(), ["first", "sécond"]);
}

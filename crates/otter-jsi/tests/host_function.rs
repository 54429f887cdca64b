//! Host functions called from the embedder and from script

use std::cell::Cell;
use std::rc::Rc;

use otter_jsi::{Function, HostFunction, JsError, Platform, PropNameId, Runtime, Scope, Value};

#[test]
fn test_host_function_is_called() {
    let platform = Platform::new().unwrap();
    let rt = Runtime::new(&platform).unwrap();
    let _scope = Scope::new(&rt);

    let called = Rc::new(Cell::new(false));
    let flag = called.clone();
    let host: HostFunction = Rc::new(move |_rt, _this, _args| {
        flag.set(true);
        Ok(Value::from(42))
    });

    let name = PropNameId::for_ascii(&rt, "fn").unwrap();
    let function = Function::create_from_host_function(&rt, &name, 0, host).unwrap();
    assert!(function.is_host_function(&rt));

    let result = function.call(&rt, &[]).unwrap();
    assert!(called.get());
    assert_eq!(result.as_number().unwrap(), 42.0);
}

#[test]
fn test_host_function_throw_keeps_message() {
    let platform = Platform::new().unwrap();
    let rt = Runtime::new(&platform).unwrap();
    let _scope = Scope::new(&rt);

    let host: HostFunction = Rc::new(|rt, _this, _args| Err(JsError::new(rt, "nope").into()));
    let name = PropNameId::for_ascii(&rt, "fn").unwrap();
    let function = Function::create_from_host_function(&rt, &name, 0, host).unwrap();

    let err = function.call(&rt, &[]).unwrap_err();
    assert_eq!(err.as_js_error().unwrap().message(), "nope");

    // an unrelated call afterwards sees no stale exception
    let echo: HostFunction = Rc::new(|_rt, _this, args| Ok(args.first().cloned().unwrap_or_default()));
    let name = PropNameId::for_ascii(&rt, "echo").unwrap();
    let echo = Function::create_from_host_function(&rt, &name, 1, echo).unwrap();
    assert_eq!(echo.call(&rt, &[Value::from(7)]).unwrap().as_number().unwrap(), 7.0);

    let err = function.call(&rt, &[]).unwrap_err();
    assert_eq!(err.as_js_error().unwrap().message(), "nope");
}

#[test]
fn test_native_error_becomes_error_object() {
    let platform = Platform::new().unwrap();
    let rt = Runtime::new(&platform).unwrap();
    let host: HostFunction = Rc::new(|_rt, _this, _args| Err(otter_jsi::JsiError::native("disk full")));
    let name = PropNameId::for_ascii(&rt, "write").unwrap();
    let function = Function::create_from_host_function(&rt, &name, 0, host).unwrap();
    rt.global().set_property(&rt, "write", function).unwrap();

    let err = rt.eval("write()").unwrap_err();
    let js = err.as_js_error().unwrap();
    assert_eq!(js.name(), "Error");
    assert_eq!(js.message(), "disk full");
}

#[test]
fn test_script_passes_arguments_and_receiver() {
    let platform = Platform::new().unwrap();
    let rt = Runtime::new(&platform).unwrap();
    let host: HostFunction = Rc::new(|rt, this, args| {
        let base = this.as_object()?.get_property(rt, "base")?.as_number()?;
        let sum: f64 = args.iter().map(|arg| arg.as_number().unwrap_or(0.0)).sum();
        Ok(Value::from(base + sum))
    });
    let name = PropNameId::for_ascii(&rt, "add").unwrap();
    let function = Function::create_from_host_function(&rt, &name, 2, host).unwrap();
    rt.global().set_property(&rt, "add", function).unwrap();

    let value = rt.eval("let o = { base: 10, add: add }; o.add(1, 2)").unwrap();
    assert_eq!(value.as_number().unwrap(), 13.0);
    assert_eq!(rt.eval("add.length").unwrap().as_number().unwrap(), 2.0);
    let name = rt.eval("add.name").unwrap();
    assert_eq!(name.as_string().unwrap().utf8(&rt).unwrap(), "add");
}

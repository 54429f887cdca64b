//! Global object and built-in functions installed into every environment.

use std::rc::Rc;

use serde_json::ser::PrettyFormatter;

use crate::env::{Completion, js_env_t};
use crate::heap::{Builtin, Callable, CellId, ErrorKind, Heap, ObjectClass, ObjectData, PropertyKey, Value};

/// Objects every environment keeps alive for its whole lifetime.
pub(crate) struct Intrinsics {
    pub global: CellId,
    pub object_prototype: CellId,
    pub function_prototype: CellId,
    pub array_prototype: CellId,
    error_prototypes: [CellId; ErrorKind::ALL.len()],
}

impl Intrinsics {
    pub(crate) fn error_prototype(&self, kind: ErrorKind) -> CellId {
        let index = ErrorKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_default();
        self.error_prototypes[index]
    }

    pub(crate) fn roots(&self) -> impl Iterator<Item = CellId> + '_ {
        [
            self.global,
            self.object_prototype,
            self.function_prototype,
            self.array_prototype,
        ]
        .into_iter()
        .chain(self.error_prototypes.iter().copied())
    }
}

struct Installer<'h> {
    heap: &'h mut Heap,
    object_prototype: CellId,
    function_prototype: CellId,
}

impl Installer<'_> {
    fn object(&mut self, prototype: Option<CellId>) -> CellId {
        self.heap
            .alloc_object(ObjectData::new(ObjectClass::Ordinary, prototype))
    }

    fn define(&mut self, target: CellId, name: &str, value: Value) {
        if let Some(data) = self.heap.object_mut(target) {
            data.properties.insert(PropertyKey::named(name), value);
        }
    }

    /// Allocate a built-in function, linking it with `prototype` when given.
    fn function(&mut self, builtin: Builtin, name: &str, prototype: Option<CellId>) -> CellId {
        let function = self.heap.alloc_object(ObjectData::new(
            ObjectClass::Function(Callable::Builtin {
                builtin,
                name: Rc::from(name),
            }),
            Some(self.function_prototype),
        ));
        if let Some(prototype) = prototype {
            self.define(function, "prototype", Value::Object(prototype));
            self.define(prototype, "constructor", Value::Object(function));
        }
        function
    }
}

pub(crate) fn install(heap: &mut Heap, expose_gc: bool) -> Intrinsics {
    let object_prototype = heap.alloc_object(ObjectData::new(ObjectClass::Ordinary, None));
    let function_prototype = heap.alloc_object(ObjectData::new(ObjectClass::Ordinary, Some(object_prototype)));
    let mut installer = Installer {
        heap,
        object_prototype,
        function_prototype,
    };

    let array_prototype = installer.object(Some(object_prototype));
    let symbol_prototype = installer.object(Some(object_prototype));
    let string_prototype = installer.object(Some(object_prototype));
    let global = installer.object(Some(object_prototype));

    let object = installer.function(Builtin::Object, "Object", Some(object_prototype));
    let keys = installer.function(Builtin::ObjectKeys, "keys", None);
    installer.define(object, "keys", Value::Object(keys));
    installer.define(global, "Object", Value::Object(object));

    let array = installer.function(Builtin::Array, "Array", Some(array_prototype));
    installer.define(global, "Array", Value::Object(array));

    let string = installer.function(Builtin::String, "String", Some(string_prototype));
    installer.define(global, "String", Value::Object(string));

    let symbol = installer.function(Builtin::Symbol, "Symbol", Some(symbol_prototype));
    installer.define(global, "Symbol", Value::Object(symbol));

    let mut error_prototypes = [object_prototype; ErrorKind::ALL.len()];
    for (index, kind) in ErrorKind::ALL.into_iter().enumerate() {
        let parent = match kind {
            ErrorKind::Error => installer.object_prototype,
            _ => error_prototypes[0],
        };
        let prototype = installer.object(Some(parent));
        installer.define(prototype, "name", Value::string(kind.name()));
        installer.define(prototype, "message", Value::string(""));
        let constructor = installer.function(Builtin::Error(kind), kind.name(), Some(prototype));
        installer.define(global, kind.name(), Value::Object(constructor));
        error_prototypes[index] = prototype;
    }

    let json = installer.object(Some(object_prototype));
    let parse = installer.function(Builtin::JsonParse, "parse", None);
    let stringify = installer.function(Builtin::JsonStringify, "stringify", None);
    installer.define(json, "parse", Value::Object(parse));
    installer.define(json, "stringify", Value::Object(stringify));
    installer.define(global, "JSON", Value::Object(json));

    if expose_gc {
        let gc = installer.function(Builtin::Gc, "gc", None);
        installer.define(global, "gc", Value::Object(gc));
    }

    installer.define(global, "globalThis", Value::Object(global));
    installer.define(global, "undefined", Value::Undefined);
    installer.define(global, "NaN", Value::Number(f64::NAN));
    installer.define(global, "Infinity", Value::Number(f64::INFINITY));

    Intrinsics {
        global,
        object_prototype,
        function_prototype,
        array_prototype,
        error_prototypes,
    }
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

pub(crate) fn call(env: &js_env_t, builtin: Builtin, _receiver: Value, args: &[Value]) -> Completion<Value> {
    match builtin {
        Builtin::String => match args.first() {
            None => Ok(Value::string("")),
            Some(Value::Symbol(id)) => Ok(Value::String(Rc::from(env.symbol_descriptive_string(*id)))),
            Some(value) => Ok(Value::String(env.to_string(value)?)),
        },
        Builtin::Symbol => {
            let description = match arg(args, 0) {
                Value::Undefined => None,
                value => Some(env.to_string(&value)?),
            };
            Ok(env.alloc_symbol(description))
        }
        Builtin::Object => match arg(args, 0) {
            value @ Value::Object(_) => Ok(value),
            _ => Ok(env.alloc(ObjectClass::Ordinary)),
        },
        Builtin::ObjectKeys => match arg(args, 0) {
            Value::Undefined | Value::Null => {
                env.throw(ErrorKind::TypeError, "Cannot convert undefined or null to object")
            }
            target => {
                let keys = env.own_keys(&target)?;
                Ok(env.alloc(ObjectClass::Array(keys)))
            }
        },
        Builtin::Array => match args {
            [Value::Number(length)] => {
                if *length < 0.0 || length.fract() != 0.0 || *length > u32::MAX as f64 {
                    return env.throw(ErrorKind::RangeError, "Invalid array length");
                }
                Ok(env.alloc(ObjectClass::Array(vec![Value::Undefined; *length as usize])))
            }
            _ => Ok(env.alloc(ObjectClass::Array(args.to_vec()))),
        },
        Builtin::Error(kind) => construct_error(env, kind, args),
        Builtin::JsonParse => {
            let text = env.to_string(&arg(args, 0))?;
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(json) => Ok(from_json(env, json)),
                Err(error) => env.throw(ErrorKind::SyntaxError, format!("JSON.parse: {error}")),
            }
        }
        Builtin::JsonStringify => stringify(env, &arg(args, 0), &arg(args, 2)),
        Builtin::Gc => {
            env.collect_garbage();
            Ok(Value::Undefined)
        }
    }
}

pub(crate) fn construct(env: &js_env_t, builtin: Builtin, args: &[Value]) -> Completion<Value> {
    match builtin {
        Builtin::Object | Builtin::Array => call(env, builtin, Value::Undefined, args),
        Builtin::Error(kind) => construct_error(env, kind, args),
        Builtin::Symbol => env.throw(ErrorKind::TypeError, "Symbol is not a constructor"),
        Builtin::String => {
            // Primitive wrappers are not modelled; `new String(x)` yields a
            // plain object carrying the converted string.
            let value = call(env, builtin, Value::Undefined, args)?;
            let wrapper = env.alloc(ObjectClass::Ordinary);
            env.set(&wrapper, PropertyKey::named("value"), value)?;
            Ok(wrapper)
        }
        Builtin::ObjectKeys | Builtin::JsonParse | Builtin::JsonStringify | Builtin::Gc => {
            env.throw(ErrorKind::TypeError, "function is not a constructor")
        }
    }
}

fn construct_error(env: &js_env_t, kind: ErrorKind, args: &[Value]) -> Completion<Value> {
    let message = match arg(args, 0) {
        Value::Undefined => Rc::from(""),
        value => env.to_string(&value)?,
    };
    Ok(env.create_error(kind, &message))
}

fn from_json(env: &js_env_t, json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::String(Rc::from(s)),
        serde_json::Value::Array(items) => {
            let elements = items.into_iter().map(|item| from_json(env, item)).collect();
            env.alloc(ObjectClass::Array(elements))
        }
        serde_json::Value::Object(entries) => {
            let object = env.alloc(ObjectClass::Ordinary);
            let properties: Vec<_> = entries
                .into_iter()
                .map(|(key, value)| (PropertyKey::String(Rc::from(key)), from_json(env, value)))
                .collect();
            env.with_object_mut(&object, |data| data.properties.extend(properties));
            object
        }
    }
}

fn stringify(env: &js_env_t, value: &Value, indent: &Value) -> Completion<Value> {
    let mut stack = Vec::new();
    let Some(json) = to_json(env, value, &mut stack)? else {
        return Ok(Value::Undefined);
    };

    let indent = match indent {
        Value::Number(n) if *n >= 1.0 => " ".repeat((*n as usize).min(10)),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };

    let text = if indent.is_empty() {
        serde_json::to_string(&json)
    } else {
        let mut out = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(indent.as_bytes()));
        serde::Serialize::serialize(&json, &mut serializer).map(|()| String::from_utf8_lossy(&out).into_owned())
    };

    match text {
        Ok(text) => Ok(Value::String(Rc::from(text))),
        Err(error) => env.throw(ErrorKind::TypeError, error.to_string()),
    }
}

/// `None` for values JSON omits (undefined, functions, symbols).
fn to_json(env: &js_env_t, value: &Value, stack: &mut Vec<CellId>) -> Completion<Option<serde_json::Value>> {
    Ok(Some(match value {
        Value::Undefined | Value::Symbol(_) => return Ok(None),
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => json_number(*n),
        Value::String(s) => serde_json::Value::String(s.to_string()),
        Value::BigInt(_) => return env.throw(ErrorKind::TypeError, "Do not know how to serialize a BigInt"),
        Value::Object(id) => {
            if env.is_callable(value) {
                return Ok(None);
            }
            if stack.contains(id) {
                return env.throw(ErrorKind::TypeError, "Converting circular structure to JSON");
            }
            stack.push(*id);
            let json = object_to_json(env, value, stack);
            stack.pop();
            json?
        }
    }))
}

fn object_to_json(env: &js_env_t, value: &Value, stack: &mut Vec<CellId>) -> Completion<serde_json::Value> {
    let elements = env
        .with_object(value, |data| match &data.class {
            ObjectClass::Array(elements) => Some(elements.clone()),
            _ => None,
        })
        .flatten();

    if let Some(elements) = elements {
        let items = elements
            .iter()
            .map(|element| Ok(to_json(env, element, stack)?.unwrap_or(serde_json::Value::Null)))
            .collect::<Completion<Vec<_>>>()?;
        return Ok(serde_json::Value::Array(items));
    }

    let mut map = serde_json::Map::new();
    for key in env.own_keys(value)? {
        let property = env.to_property_key(&key)?;
        let entry = env.get(value, &property)?;
        if let Some(json) = to_json(env, &entry, stack)? {
            map.insert(env.to_string(&key)?.to_string(), json);
        }
    }
    Ok(serde_json::Value::Object(map))
}

fn json_number(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

/// Format a number the way `Number.prototype.toString()` does.
pub(crate) fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let sign = if n < 0.0 { "-" } else { "" };
    // Shortest round-trip digits in scientific form, e.g. "1.2345e3".
    let scientific = format!("{:e}", n.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let k = digits.len() as i32;
    let point = exponent + 1;

    let body = if k <= point && point <= 21 {
        format!("{digits}{}", "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(point as usize);
        format!("{int}.{frac}")
    } else if -6 < point && point <= 0 {
        format!("0.{}{digits}", "0".repeat((-point) as usize))
    } else {
        let (first, rest) = digits.split_at(1);
        let sign = if exponent < 0 { '-' } else { '+' };
        if rest.is_empty() {
            format!("{first}e{sign}{}", exponent.abs())
        } else {
            format!("{first}.{rest}e{sign}{}", exponent.abs())
        }
    };
    format!("{sign}{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(number_to_string(42.0), "42");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(-2.25), "-2.25");
        assert_eq!(number_to_string(0.1), "0.1");
        assert_eq!(number_to_string(0.000001), "0.000001");
        assert_eq!(number_to_string(0.0000001), "1e-7");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(123456789012345680000.0), "123456789012345680000");
        assert_eq!(number_to_string(1.5e300), "1.5e+300");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_json_numbers_are_integral_when_possible() {
        assert_eq!(json_number(3.0).to_string(), "3");
        assert_eq!(json_number(3.5).to_string(), "3.5");
        assert_eq!(json_number(f64::NAN), serde_json::Value::Null);
    }
}

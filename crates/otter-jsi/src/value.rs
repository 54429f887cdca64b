//! The embedding interface's value union

use crate::array_buffer::ArrayBuffer;
use crate::bigint::BigInt;
use crate::error::{JsiError, JsiResult};
use crate::function::Function;
use crate::object::{Array, Object};
use crate::runtime::Runtime;
use crate::string::JsString;
use crate::symbol::Symbol;

/// Declare a pointer-like value type backed by one [`Reference`].
///
/// Cloning goes through `Reference::clone`, so every kind shares the same
/// acquire/release discipline.
///
/// [`Reference`]: crate::reference::Reference
macro_rules! pointer_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            pub(crate) reference: $crate::reference::Reference,
        }

        impl $name {
            pub(crate) fn from_reference(reference: $crate::reference::Reference) -> Self {
                Self { reference }
            }

            /// Resolve to a handle escaped into the caller's handle scope
            pub(crate) fn handle(&self, rt: &$crate::runtime::Runtime) -> *mut otter_js_sys::js_value_t {
                rt.escape_reference(&self.reference)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(concat!(stringify!($name), "(<opaque>)"))
            }
        }
    };
}

pub(crate) use pointer_type;

/// A JavaScript value
///
/// Immediate kinds are held by value. String, symbol, bigint and object
/// values each hold one reference slot in the runtime that produced them.
/// Functions, arrays and array buffers are objects; use the `as_*` views on
/// [`Object`] to recover them.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Symbol(Symbol),
    BigInt(BigInt),
    String(JsString),
    Object(Object),
}

impl Value {
    pub fn undefined() -> Self {
        Self::Undefined
    }

    pub fn null() -> Self {
        Self::Null
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, Self::Symbol(_))
    }

    pub fn is_bigint(&self) -> bool {
        matches!(self, Self::BigInt(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Name of the value's kind, as used in type mismatch errors
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Symbol(_) => "symbol",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Object(_) => "object",
        }
    }

    pub fn as_bool(&self) -> JsiResult<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(JsiError::type_mismatch("boolean", other.kind())),
        }
    }

    pub fn as_number(&self) -> JsiResult<f64> {
        match self {
            Self::Number(n) => Ok(*n),
            other => Err(JsiError::type_mismatch("number", other.kind())),
        }
    }

    pub fn as_string(&self) -> JsiResult<&JsString> {
        match self {
            Self::String(s) => Ok(s),
            other => Err(JsiError::type_mismatch("string", other.kind())),
        }
    }

    pub fn as_symbol(&self) -> JsiResult<&Symbol> {
        match self {
            Self::Symbol(s) => Ok(s),
            other => Err(JsiError::type_mismatch("symbol", other.kind())),
        }
    }

    pub fn as_bigint(&self) -> JsiResult<&BigInt> {
        match self {
            Self::BigInt(b) => Ok(b),
            other => Err(JsiError::type_mismatch("bigint", other.kind())),
        }
    }

    pub fn as_object(&self) -> JsiResult<&Object> {
        match self {
            Self::Object(o) => Ok(o),
            other => Err(JsiError::type_mismatch("object", other.kind())),
        }
    }

    pub fn into_object(self) -> JsiResult<Object> {
        match self {
            Self::Object(o) => Ok(o),
            other => Err(JsiError::type_mismatch("object", other.kind())),
        }
    }

    /// `===` semantics
    pub fn strict_equals(rt: &Runtime, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => rt.strict_equals_references(&a.reference, &b.reference),
            (Self::Symbol(a), Self::Symbol(b)) => rt.strict_equals_references(&a.reference, &b.reference),
            (Self::BigInt(a), Self::BigInt(b)) => rt.strict_equals_references(&a.reference, &b.reference),
            (Self::Object(a), Self::Object(b)) => rt.strict_equals_references(&a.reference, &b.reference),
            _ => false,
        }
    }

    /// `String(value)`. Symbols throw, as they do in script.
    pub fn to_js_string(&self, rt: &Runtime) -> JsiResult<JsString> {
        rt.coerce_to_string(self)
    }

    /// Parse JSON text through the engine's `JSON.parse`
    pub fn from_json_utf8(rt: &Runtime, json: &[u8]) -> JsiResult<Value> {
        let parse = rt
            .global()
            .get_property_as_object(rt, "JSON")?
            .get_property_as_function(rt, "parse")?;
        let text = JsString::create_from_utf8(rt, json)?;
        parse.call(rt, &[Value::String(text)])
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<JsString> for Value {
    fn from(s: JsString) -> Self {
        Self::String(s)
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Self::Symbol(s)
    }
}

impl From<BigInt> for Value {
    fn from(b: BigInt) -> Self {
        Self::BigInt(b)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Self::Object(o)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Self::Object(f.into_object())
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Self::Object(a.into_object())
    }
}

impl From<ArrayBuffer> for Value {
    fn from(b: ArrayBuffer) -> Self {
        Self::Object(b.into_object())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Platform;

    #[test]
    fn test_kind_checks() {
        assert!(Value::undefined().is_undefined());
        assert!(Value::null().is_null());
        assert!(Value::from(true).is_bool());
        assert_eq!(Value::from(3).as_number().unwrap(), 3.0);
        assert!(matches!(
            Value::from(1.5).as_bool(),
            Err(JsiError::TypeMismatch {
                expected: "boolean",
                actual: "number"
            })
        ));
    }

    #[test]
    fn test_strict_equals_immediates() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        assert!(Value::strict_equals(&rt, &Value::Undefined, &Value::Undefined));
        assert!(!Value::strict_equals(&rt, &Value::Undefined, &Value::Null));
        assert!(Value::strict_equals(&rt, &Value::from(0.0), &Value::from(-0.0)));
        assert!(!Value::strict_equals(&rt, &Value::from(f64::NAN), &Value::from(f64::NAN)));
    }

    #[test]
    fn test_strict_equals_strings_by_content() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let a = Value::from(JsString::create_from_ascii(&rt, "same").unwrap());
        let b = rt.eval("'sa' + 'me'").unwrap();
        assert!(Value::strict_equals(&rt, &a, &b));
    }

    #[test]
    fn test_from_json_utf8() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let value = Value::from_json_utf8(&rt, br#"{"answer": 42, "tags": ["a"]}"#).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.get_property(&rt, "answer").unwrap().as_number().unwrap(), 42.0);
    }

    #[test]
    fn test_invalid_json_throws_syntax_error() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let err = Value::from_json_utf8(&rt, b"{oops").unwrap_err();
        let js = err.as_js_error().unwrap();
        assert_eq!(js.name(), "SyntaxError");
    }
}

//! Symbols

use crate::error::JsiResult;
use crate::runtime::Runtime;
use crate::value::{Value, pointer_type};

pointer_type!(
    /// A JavaScript symbol
    Symbol
);

impl Symbol {
    /// `Symbol(description)`, through the engine's global `String`
    pub fn to_string(&self, rt: &Runtime) -> JsiResult<String> {
        let string = rt.global().get_property_as_function(rt, "String")?;
        let described = string.call(rt, &[Value::Symbol(self.clone())])?;
        described.as_string()?.utf8(rt)
    }
}

//! Strings and property names

use otter_js_sys::js_value_t;

use crate::error::JsiResult;
use crate::runtime::Runtime;
use crate::symbol::Symbol;
use crate::value::{Value, pointer_type};

pointer_type!(
    /// A JavaScript string held by the runtime
    JsString
);

impl JsString {
    /// Create a string from ASCII text
    pub fn create_from_ascii(rt: &Runtime, ascii: &str) -> JsiResult<Self> {
        debug_assert!(ascii.is_ascii(), "create_from_ascii called with non-ASCII text");
        Self::create_from_utf8(rt, ascii.as_bytes())
    }

    /// Create a string from UTF-8 bytes. Invalid sequences are replaced.
    pub fn create_from_utf8(rt: &Runtime, utf8: &[u8]) -> JsiResult<Self> {
        let _scope = rt.scope();
        let handle = rt.string_handle(utf8);
        Ok(Self::from_reference(rt.capture(handle)))
    }

    /// Copy the content out as UTF-8
    pub fn utf8(&self, rt: &Runtime) -> JsiResult<String> {
        let _scope = rt.scope();
        rt.read_utf8(self.handle(rt))
    }
}

pointer_type!(
    /// A property key: a string or a symbol
    PropNameId
);

impl PropNameId {
    pub fn for_ascii(rt: &Runtime, ascii: &str) -> JsiResult<Self> {
        Ok(Self::for_string(rt, &JsString::create_from_ascii(rt, ascii)?))
    }

    pub fn for_utf8(rt: &Runtime, utf8: &[u8]) -> JsiResult<Self> {
        Ok(Self::for_string(rt, &JsString::create_from_utf8(rt, utf8)?))
    }

    /// Key naming the same string. Shares the string's reference slot.
    pub fn for_string(_rt: &Runtime, string: &JsString) -> Self {
        Self::from_reference(string.reference.clone())
    }

    /// Key naming the same symbol
    pub fn for_symbol(_rt: &Runtime, symbol: &Symbol) -> Self {
        Self::from_reference(symbol.reference.clone())
    }

    /// The key as text. Symbol keys read as `Symbol(description)`.
    pub fn utf8(&self, rt: &Runtime) -> JsiResult<String> {
        let value = {
            let _scope = rt.scope();
            rt.to_embedder(self.handle(rt))
        };
        match value {
            Value::Symbol(symbol) => symbol.to_string(rt),
            other => other.to_js_string(rt)?.utf8(rt),
        }
    }

    /// Whether two keys name the same property
    pub fn compare(rt: &Runtime, a: &PropNameId, b: &PropNameId) -> bool {
        rt.strict_equals_references(&a.reference, &b.reference)
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for str {}
    impl Sealed for String {}
    impl Sealed for super::JsString {}
    impl Sealed for super::PropNameId {}
}

/// Types that can name a property
///
/// Implemented for string slices, [`JsString`] and [`PropNameId`].
pub trait AsPropertyKey: sealed::Sealed {
    /// Key handle in the caller's handle scope
    #[doc(hidden)]
    fn key_handle(&self, rt: &Runtime) -> *mut js_value_t;
}

impl AsPropertyKey for str {
    fn key_handle(&self, rt: &Runtime) -> *mut js_value_t {
        rt.string_handle(self.as_bytes())
    }
}

impl AsPropertyKey for String {
    fn key_handle(&self, rt: &Runtime) -> *mut js_value_t {
        rt.string_handle(self.as_bytes())
    }
}

impl AsPropertyKey for JsString {
    fn key_handle(&self, rt: &Runtime) -> *mut js_value_t {
        self.handle(rt)
    }
}

impl AsPropertyKey for PropNameId {
    fn key_handle(&self, rt: &Runtime) -> *mut js_value_t {
        self.handle(rt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Platform;

    #[test]
    fn test_string_utf8() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let s = JsString::create_from_utf8(&rt, "héllo".as_bytes()).unwrap();
        assert_eq!(s.utf8(&rt).unwrap(), "héllo");

        let empty = JsString::create_from_ascii(&rt, "").unwrap();
        assert_eq!(empty.utf8(&rt).unwrap(), "");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let s = JsString::create_from_utf8(&rt, &[b'a', 0xff, b'b']).unwrap();
        assert_eq!(s.utf8(&rt).unwrap(), "a\u{fffd}b");
    }

    #[test]
    fn test_prop_name_compare() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let a = PropNameId::for_ascii(&rt, "key").unwrap();
        let b = PropNameId::for_utf8(&rt, b"key").unwrap();
        let c = PropNameId::for_ascii(&rt, "other").unwrap();
        assert!(PropNameId::compare(&rt, &a, &b));
        assert!(!PropNameId::compare(&rt, &a, &c));
        assert_eq!(a.utf8(&rt).unwrap(), "key");
    }

    #[test]
    fn test_prop_name_for_symbol() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let symbol = rt.eval("Symbol('tag')").unwrap();
        let symbol = symbol.as_symbol().unwrap();
        let first = PropNameId::for_symbol(&rt, symbol);
        let second = PropNameId::for_symbol(&rt, symbol);
        assert!(PropNameId::compare(&rt, &first, &second));
        assert_eq!(first.utf8(&rt).unwrap(), "Symbol(tag)");
    }
}

//! Script sources

use std::rc::Rc;

/// Script text handed to the runtime
pub trait Buffer {
    fn data(&self) -> &[u8];

    fn size(&self) -> usize {
        self.data().len()
    }
}

/// A [`Buffer`] that owns its text
#[derive(Debug, Clone)]
pub struct StringBuffer {
    text: String,
}

impl StringBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Buffer for StringBuffer {
    fn data(&self) -> &[u8] {
        self.text.as_bytes()
    }
}

/// A script paired with its source URL, evaluated later with
/// [`Runtime::evaluate_prepared_javascript`](crate::Runtime::evaluate_prepared_javascript)
#[derive(Clone)]
pub struct PreparedJavaScript {
    buffer: Rc<dyn Buffer>,
    source_url: String,
}

impl PreparedJavaScript {
    pub(crate) fn new(buffer: Rc<dyn Buffer>, source_url: String) -> Self {
        Self { buffer, source_url }
    }

    pub fn buffer(&self) -> &dyn Buffer {
        self.buffer.as_ref()
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }
}

impl std::fmt::Debug for PreparedJavaScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedJavaScript")
            .field("source_url", &self.source_url)
            .field("size", &self.buffer.size())
            .finish()
    }
}

//! Array buffers over embedder memory

use std::cell::Cell;
use std::ffi::c_void;
use std::ops::Deref;
use std::ptr;
use std::rc::Rc;

use otter_js_sys::*;

use crate::error::{JsiResult, assert_ok};
use crate::object::Object;
use crate::runtime::Runtime;

/// Memory that can back an [`ArrayBuffer`]
///
/// `data()` must stay valid for `size()` bytes, at the same address, for
/// as long as the buffer is alive. The engine reads and writes it in place.
pub trait MutableBuffer {
    fn size(&self) -> usize;
    fn data(&self) -> *mut u8;
}

/// A fixed-size heap buffer
pub struct VecBuffer {
    bytes: Box<[Cell<u8>]>,
}

impl VecBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into_iter().map(Cell::new).collect(),
        }
    }

    pub fn zeroed(size: usize) -> Self {
        Self::new(vec![0; size])
    }

    /// Copy of the current contents
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.iter().map(Cell::get).collect()
    }
}

impl MutableBuffer for VecBuffer {
    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn data(&self) -> *mut u8 {
        // Cell<u8> has the layout of u8 and permits writes through &self
        self.bytes.as_ptr().cast::<u8>().cast_mut()
    }
}

/// An `ArrayBuffer` object
#[derive(Clone, Debug)]
pub struct ArrayBuffer(Object);

impl ArrayBuffer {
    /// Expose `buffer` to script without copying. The buffer is released
    /// when the array buffer is collected or the runtime is torn down.
    pub fn new(rt: &Runtime, buffer: Rc<dyn MutableBuffer>) -> JsiResult<Self> {
        let _scope = rt.scope();
        let (data, size) = (buffer.data(), buffer.size());
        let binding = Box::into_raw(Box::new(buffer));

        let mut handle = ptr::null_mut();
        // SAFETY: data is valid for size bytes while the binding is alive,
        // and the finalizer frees the binding
        let status = unsafe {
            js_create_external_arraybuffer(
                rt.env(),
                data.cast(),
                size,
                Some(finalize_buffer),
                binding.cast(),
                &mut handle,
            )
        };
        if let Err(error) = rt.check(status, "js_create_external_arraybuffer") {
            // SAFETY: the engine did not take the binding
            drop(unsafe { Box::from_raw(binding) });
            return Err(error);
        }
        Ok(Self(Object::from_reference(rt.capture(handle))))
    }

    pub(crate) fn from_object(object: Object) -> Self {
        Self(object)
    }

    pub fn size(&self, rt: &Runtime) -> usize {
        self.info(rt).1
    }

    /// Start of the backing store. Valid while the buffer is alive.
    pub fn data(&self, rt: &Runtime) -> *mut u8 {
        self.info(rt).0
    }

    /// Copy of the current contents
    pub fn to_vec(&self, rt: &Runtime) -> Vec<u8> {
        let (data, size) = self.info(rt);
        if size == 0 {
            return Vec::new();
        }
        // SAFETY: the engine reports size readable bytes at data
        unsafe { std::slice::from_raw_parts(data, size) }.to_vec()
    }

    pub fn into_object(self) -> Object {
        self.0
    }

    fn info(&self, rt: &Runtime) -> (*mut u8, usize) {
        let _scope = rt.scope();
        let mut data = ptr::null_mut();
        let mut size = 0;
        // SAFETY: the handle is a live array buffer
        let status = unsafe { js_get_arraybuffer_info(rt.env(), self.handle(rt), &mut data, &mut size) };
        assert_ok(status, "js_get_arraybuffer_info");
        (data.cast(), size)
    }
}

impl Deref for ArrayBuffer {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.0
    }
}

unsafe extern "C" fn finalize_buffer(_env: *mut js_env_t, _data: *mut c_void, hint: *mut c_void) {
    // SAFETY: hint is the binding leaked in ArrayBuffer::new
    drop(unsafe { Box::from_raw(hint.cast::<Rc<dyn MutableBuffer>>()) });
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::Platform;

    #[test]
    fn test_buffer_shares_memory() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let backing = Rc::new(VecBuffer::new(vec![1, 2, 3, 4]));
        let buffer = ArrayBuffer::new(&rt, backing.clone()).unwrap();

        assert_eq!(buffer.size(&rt), 4);
        assert_eq!(buffer.data(&rt), backing.data());
        assert!(buffer.is_array_buffer(&rt));

        // SAFETY: the buffer is alive and four bytes long
        unsafe { *buffer.data(&rt).add(2) = 9 };
        assert_eq!(backing.to_vec(), [1, 2, 9, 4]);
        assert_eq!(buffer.to_vec(&rt), [1, 2, 9, 4]);
    }

    #[test]
    fn test_empty_buffer() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let buffer = ArrayBuffer::new(&rt, Rc::new(VecBuffer::zeroed(0))).unwrap();
        assert_eq!(buffer.size(&rt), 0);
        assert!(buffer.to_vec(&rt).is_empty());
    }

    #[test]
    fn test_backing_released_on_collection() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let backing = Rc::new(VecBuffer::zeroed(16));
        let buffer = ArrayBuffer::new(&rt, backing.clone()).unwrap();
        assert_eq!(Rc::strong_count(&backing), 2);

        drop(buffer);
        rt.collect_garbage().unwrap();
        assert_eq!(Rc::strong_count(&backing), 1);
    }

    #[test]
    fn test_object_view() {
        let platform = Platform::new().unwrap();
        let rt = Runtime::new(&platform).unwrap();
        let buffer = ArrayBuffer::new(&rt, Rc::new(VecBuffer::zeroed(8))).unwrap();
        let object = buffer.into_object();
        assert_eq!(object.as_array_buffer(&rt).unwrap().size(&rt), 8);
        assert!(Object::new(&rt).unwrap().as_array_buffer(&rt).is_err());
    }
}

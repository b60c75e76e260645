//! Raw views and the slot descriptors that receive them.
//!
//! A [`RawView`] is the (pointer, length, capacity) triple of a contiguous
//! run of elements. Building one is always safe; reading through one is not.
//! [`SlotRef`] erases the element type of a destination so the contract
//! checks in [`crate::convert`] can run against a descriptor instead of a
//! concrete type.

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

/// Pointer, length and capacity of a run of `T`.
///
/// Laid out as three machine words so the header can be inspected or passed
/// across FFI unchanged.
#[repr(C)]
pub struct RawView<T> {
    ptr: *mut T,
    len: usize,
    cap: usize,
}

impl<T> RawView<T> {
    /// The empty view: null pointer, zero length and capacity.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            len: 0,
            cap: 0,
        }
    }

    #[must_use]
    pub fn from_slice(slice: &[T]) -> Self {
        Self {
            ptr: slice.as_ptr().cast_mut(),
            len: slice.len(),
            cap: slice.len(),
        }
    }

    #[must_use]
    pub fn from_mut_slice(slice: &mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            cap: slice.len(),
        }
    }

    /// View over a vector's initialized elements, carrying its spare capacity.
    #[must_use]
    pub fn from_vec(vec: &mut Vec<T>) -> Self {
        Self {
            ptr: vec.as_mut_ptr(),
            len: vec.len(),
            cap: vec.capacity(),
        }
    }

    /// # Safety
    ///
    /// `len <= cap` must hold. Nothing else is checked here; the obligations
    /// of [`RawView::as_slice`] apply when the view is read.
    #[must_use]
    pub const unsafe fn from_raw_parts(ptr: *mut T, len: usize, cap: usize) -> Self {
        Self { ptr, len, cap }
    }

    #[must_use]
    pub const fn as_ptr(&self) -> *mut T {
        self.ptr
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.cap
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow the viewed elements.
    ///
    /// # Safety
    ///
    /// For the chosen lifetime `'a`, `len` initialized, aligned elements must
    /// be readable at the pointer and must not be written through any other
    /// path.
    #[must_use]
    pub unsafe fn as_slice<'a>(&self) -> &'a [T] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY: forwarded to the caller.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Mutably borrow the viewed elements.
    ///
    /// # Safety
    ///
    /// As [`RawView::as_slice`], and the returned slice must be the only live
    /// access to those elements for `'a`.
    #[must_use]
    pub unsafe fn as_mut_slice<'a>(&self) -> &'a mut [T] {
        if self.len == 0 {
            return &mut [];
        }
        // SAFETY: forwarded to the caller.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// Type-erased copy of this view's header.
    #[must_use]
    pub fn erase(&self) -> ErasedView {
        ErasedView {
            addr: self.ptr.cast(),
            len: self.len,
            cap: self.cap,
            elem: ElemLayout::of::<T>(),
        }
    }

    /// Replace the header. The old view is cleared before the new pointer,
    /// capacity and length are written, in that order.
    pub(crate) fn install(&mut self, ptr: *mut T, len: usize, cap: usize) {
        self.len = 0;
        self.cap = 0;
        self.ptr = ptr;
        self.cap = cap;
        self.len = len;
    }
}

impl<T> Clone for RawView<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RawView<T> {}

impl<T> Default for RawView<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> PartialEq for RawView<T> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.ptr, other.ptr) && self.len == other.len && self.cap == other.cap
    }
}

impl<T> Eq for RawView<T> {}

impl<T> fmt::Debug for RawView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawView")
            .field("elem", &type_name::<T>())
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("cap", &self.cap)
            .finish()
    }
}

/// Size, alignment and name of an element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElemLayout {
    pub name: &'static str,
    pub size: usize,
    pub align: usize,
}

impl ElemLayout {
    #[must_use]
    pub fn of<T>() -> Self {
        Self {
            name: type_name::<T>(),
            size: size_of::<T>(),
            align: align_of::<T>(),
        }
    }
}

/// A [`RawView`] header with its element type replaced by a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErasedView {
    pub addr: *mut u8,
    pub len: usize,
    pub cap: usize,
    pub elem: ElemLayout,
}

/// What a [`SlotRef`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// A `RawView` of the given element type.
    View(ElemLayout),
    /// Any other value; names its type.
    Value(&'static str),
}

type Installer = unsafe fn(*mut (), *mut u8, usize, usize);

/// Mutable destination for `set_at` / `convert_at`, with its type erased.
///
/// Only slots built with [`SlotRef::view`] can receive a view. A slot built
/// with [`SlotRef::value`] is rejected with
/// [`crate::ViewError::InvalidDestinationType`].
pub struct SlotRef<'a> {
    target: *mut (),
    kind: SlotKind,
    install: Option<Installer>,
    _borrow: PhantomData<&'a mut ()>,
}

impl<'a> SlotRef<'a> {
    pub fn view<T>(slot: &'a mut RawView<T>) -> Self {
        Self {
            target: std::ptr::from_mut(slot).cast(),
            kind: SlotKind::View(ElemLayout::of::<T>()),
            install: Some(install_view::<T>),
            _borrow: PhantomData,
        }
    }

    pub fn value<T: ?Sized>(slot: &'a mut T) -> Self {
        Self {
            target: std::ptr::from_mut(slot).cast(),
            kind: SlotKind::Value(type_name::<T>()),
            install: None,
            _borrow: PhantomData,
        }
    }

    #[must_use]
    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    /// Element layout of a view slot, or the type name of anything else.
    pub(crate) fn elem(&self) -> Result<ElemLayout, &'static str> {
        match self.kind {
            SlotKind::View(elem) => Ok(elem),
            SlotKind::Value(name) => Err(name),
        }
    }

    /// Write a header into the slot. No-op for value slots, which callers
    /// reject beforehand through [`SlotRef::elem`].
    pub(crate) fn install(self, addr: *mut u8, len: usize, cap: usize) {
        if let Some(install) = self.install {
            // SAFETY: `install` was monomorphized for the type `target`
            // was created from, and `'a` keeps that borrow alive.
            unsafe { install(self.target, addr, len, cap) };
        }
    }
}

impl fmt::Debug for SlotRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotRef")
            .field("target", &self.target)
            .field("kind", &self.kind)
            .finish()
    }
}

unsafe fn install_view<T>(target: *mut (), addr: *mut u8, len: usize, cap: usize) {
    // SAFETY: see `SlotRef::install`.
    let slot = unsafe { &mut *target.cast::<RawView<T>>() };
    slot.install(addr.cast(), len, cap);
}

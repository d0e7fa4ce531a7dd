//! Typed, shaped, non-owning views over model-owned memory.
//!
//! # Memory order
//!
//! Models lay multi-dimensional variables out in **column-major** (Fortran)
//! order: the first index varies fastest. Every view built here carries
//! column-major strides, so `view[[i, j]]` addresses the same element the
//! model calls `(i, j)`; nothing is transposed. Callers that need a
//! row-major buffer should copy with `as_standard_layout()`.
//!
//! # Safety boundary
//!
//! [`bind`] is the single place where an address reported by the model is
//! turned into a typed view. Everything else in the binding works with the
//! views it returns.

use std::ffi::c_void;
use std::fmt;

use bmi_core::{BmiError, ElementType, Result, VariableDescriptor};
use ndarray::{ArrayD, ArrayViewD, ArrayViewMut, ArrayViewMutD, IxDyn, ShapeBuilder};

/// A one-byte C boolean.
///
/// Stored as the raw byte so that values other than 0 and 1 written by the
/// model never become an invalid Rust `bool`. Any non-zero byte reads as true.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CBool(pub u8);

impl CBool {
    /// The C `true` value.
    pub const TRUE: CBool = CBool(1);
    /// The C `false` value.
    pub const FALSE: CBool = CBool(0);

    /// Interpret the byte.
    pub const fn get(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for CBool {
    fn from(value: bool) -> Self {
        CBool(value as u8)
    }
}

impl From<CBool> for bool {
    fn from(value: CBool) -> Self {
        value.get()
    }
}

impl fmt::Debug for CBool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Rust element types that can alias model memory.
pub trait ForeignElement: sealed::Sealed + Copy + Default + PartialEq + fmt::Debug + 'static {
    /// The model type this Rust type stands for.
    const ELEMENT_TYPE: ElementType;

    #[doc(hidden)]
    fn from_view(view: ForeignArrayView<'_>) -> std::result::Result<ArrayViewMutD<'_, Self>, ForeignArrayView<'_>>;

    #[doc(hidden)]
    fn into_owned(array: ArrayD<Self>) -> ForeignArray;
}

macro_rules! foreign_element {
    ($ty:ty, $variant:ident) => {
        impl sealed::Sealed for $ty {}

        impl ForeignElement for $ty {
            const ELEMENT_TYPE: ElementType = ElementType::$variant;

            fn from_view(
                view: ForeignArrayView<'_>,
            ) -> std::result::Result<ArrayViewMutD<'_, Self>, ForeignArrayView<'_>> {
                match view {
                    ForeignArrayView::$variant(v) => Ok(v),
                    other => Err(other),
                }
            }

            fn into_owned(array: ArrayD<Self>) -> ForeignArray {
                ForeignArray::$variant(array)
            }
        }
    };
}

foreign_element!(f64, Double);
foreign_element!(f32, Float);
foreign_element!(i32, Int);
foreign_element!(CBool, Bool);
foreign_element!(u8, Char);

/// Apply the same expression to whichever typed array an enum holds.
macro_rules! dispatch {
    ($value:expr, $enum:ident, $inner:ident => $body:expr) => {
        match $value {
            $enum::Double($inner) => $body,
            $enum::Float($inner) => $body,
            $enum::Int($inner) => $body,
            $enum::Bool($inner) => $body,
            $enum::Char($inner) => $body,
        }
    };
}

/// A view over a model variable, typed by its runtime element type.
///
/// Reads and writes go straight to the model's memory. The view borrows the
/// session that produced it, so it cannot outlive the next `update`,
/// `finalize` or `unload`.
#[derive(Debug)]
pub enum ForeignArrayView<'a> {
    /// `double` variable
    Double(ArrayViewMutD<'a, f64>),
    /// `float` variable
    Float(ArrayViewMutD<'a, f32>),
    /// `int` variable
    Int(ArrayViewMutD<'a, i32>),
    /// `bool` variable
    Bool(ArrayViewMutD<'a, CBool>),
    /// `char` variable
    Char(ArrayViewMutD<'a, u8>),
}

impl<'a> ForeignArrayView<'a> {
    /// Element type of the viewed variable.
    pub fn element_type(&self) -> ElementType {
        match self {
            ForeignArrayView::Double(_) => ElementType::Double,
            ForeignArrayView::Float(_) => ElementType::Float,
            ForeignArrayView::Int(_) => ElementType::Int,
            ForeignArrayView::Bool(_) => ElementType::Bool,
            ForeignArrayView::Char(_) => ElementType::Char,
        }
    }

    /// Extents, in the model's dimension order; empty for a scalar.
    pub fn shape(&self) -> &[usize] {
        dispatch!(self, ForeignArrayView, v => v.shape())
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Number of elements (1 for a scalar).
    pub fn len(&self) -> usize {
        dispatch!(self, ForeignArrayView, v => v.len())
    }

    /// Whether the variable has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the variable out of model memory.
    pub fn to_owned(&self) -> ForeignArray {
        match self {
            ForeignArrayView::Double(v) => ForeignArray::Double(v.to_owned()),
            ForeignArrayView::Float(v) => ForeignArray::Float(v.to_owned()),
            ForeignArrayView::Int(v) => ForeignArray::Int(v.to_owned()),
            ForeignArrayView::Bool(v) => ForeignArray::Bool(v.to_owned()),
            ForeignArrayView::Char(v) => ForeignArray::Char(v.to_owned()),
        }
    }

    /// The typed view, or `self` back if `T` is not the variable's type.
    pub fn into_typed<T: ForeignElement>(self) -> std::result::Result<ArrayViewMutD<'a, T>, Self> {
        T::from_view(self)
    }
}

/// An owned copy of a model variable, in column-major order.
#[derive(Debug, Clone, PartialEq)]
pub enum ForeignArray {
    /// `double` variable
    Double(ArrayD<f64>),
    /// `float` variable
    Float(ArrayD<f32>),
    /// `int` variable
    Int(ArrayD<i32>),
    /// `bool` variable
    Bool(ArrayD<CBool>),
    /// `char` variable
    Char(ArrayD<u8>),
}

impl ForeignArray {
    /// Element type of the copied variable.
    pub fn element_type(&self) -> ElementType {
        match self {
            ForeignArray::Double(_) => ElementType::Double,
            ForeignArray::Float(_) => ElementType::Float,
            ForeignArray::Int(_) => ElementType::Int,
            ForeignArray::Bool(_) => ElementType::Bool,
            ForeignArray::Char(_) => ElementType::Char,
        }
    }

    /// Extents, in the model's dimension order.
    pub fn shape(&self) -> &[usize] {
        dispatch!(self, ForeignArray, a => a.shape())
    }

    /// Wrap a typed array.
    pub fn from_typed<T: ForeignElement>(array: ArrayD<T>) -> Self {
        T::into_owned(array)
    }
}

/// Turn a model-reported address into a typed, shaped view.
///
/// Returns `Ok(None)` when the descriptor has no element type (absent
/// variable) or the address is null. Fails with `InvalidDescriptor` if the
/// element count overflows the address space or the address is misaligned
/// for the element type.
///
/// # Safety
///
/// If `ptr` is non-null it must point to `descriptor.element_count()`
/// initialised elements of `descriptor.element_type`, laid out column-major,
/// valid for reads and writes for `'a`, and not accessed through any other
/// path while the view lives. In the binding this holds because the model
/// owns the storage until its next `update`/`finalize`, and views borrow the
/// session mutably.
pub unsafe fn bind<'a>(
    ptr: *mut c_void,
    descriptor: &VariableDescriptor,
) -> Result<Option<ForeignArrayView<'a>>> {
    let Some(element_type) = descriptor.element_type else {
        return Ok(None);
    };
    if ptr.is_null() {
        return Ok(None);
    }
    descriptor
        .size_in_bytes()
        .filter(|&bytes| bytes <= isize::MAX as usize)
        .ok_or_else(|| {
            BmiError::invalid_descriptor(
                &descriptor.name,
                format!("shape {:?} overflows the address space", descriptor.dims()),
            )
        })?;

    let view = match element_type {
        ElementType::Double => ForeignArrayView::Double(bind_typed(ptr, descriptor)?),
        ElementType::Float => ForeignArrayView::Float(bind_typed(ptr, descriptor)?),
        ElementType::Int => ForeignArrayView::Int(bind_typed(ptr, descriptor)?),
        ElementType::Bool => ForeignArrayView::Bool(bind_typed(ptr, descriptor)?),
        ElementType::Char => ForeignArrayView::Char(bind_typed(ptr, descriptor)?),
    };
    Ok(Some(view))
}

unsafe fn bind_typed<'a, T: ForeignElement>(
    ptr: *mut c_void,
    descriptor: &VariableDescriptor,
) -> Result<ArrayViewMutD<'a, T>> {
    let ptr = ptr.cast::<T>();
    if (ptr as usize) % std::mem::align_of::<T>() != 0 {
        return Err(BmiError::invalid_descriptor(
            &descriptor.name,
            format!("address {:p} is not aligned for {}", ptr, T::ELEMENT_TYPE),
        ));
    }
    let shape = IxDyn(descriptor.dims()).f();
    Ok(ArrayViewMut::from_shape_ptr(shape, ptr))
}

/// Check that `T` is the variable's element type.
pub(crate) fn check_element_type<T: ForeignElement>(descriptor: &VariableDescriptor) -> Result<()> {
    match descriptor.element_type {
        Some(actual) if actual == T::ELEMENT_TYPE => Ok(()),
        Some(actual) => Err(BmiError::TypeMismatch {
            variable: descriptor.name.clone(),
            requested: T::ELEMENT_TYPE,
            actual,
        }),
        None => Err(BmiError::invalid_descriptor(
            &descriptor.name,
            "variable is absent",
        )),
    }
}

/// Check that caller data has the variable's type and shape.
pub(crate) fn check_assignable<T: ForeignElement>(
    descriptor: &VariableDescriptor,
    data: &ArrayViewD<'_, T>,
) -> Result<()> {
    check_element_type::<T>(descriptor)?;
    if data.shape() != descriptor.dims() {
        return Err(BmiError::ShapeMismatch {
            variable: descriptor.name.clone(),
            expected: descriptor.dims().to_vec(),
            actual: data.shape().to_vec(),
        });
    }
    Ok(())
}

/// Copy `data` into a fresh column-major contiguous buffer.
pub(crate) fn to_column_major<T: ForeignElement>(data: &ArrayViewD<'_, T>) -> ArrayD<T> {
    let mut buf = ArrayD::from_elem(IxDyn(data.shape()).f(), T::default());
    buf.assign(data);
    buf
}

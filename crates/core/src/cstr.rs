//! Conversion between Rust strings and fixed-size native character buffers
//!
//! Models exchange names and type tags through bounded `char` arrays. Two
//! padding conventions exist in the wild: NUL-terminated (C) and
//! blank-padded without terminator (Fortran `character(len=n)`). Both
//! directions are explicit about the buffer length; nothing is resized
//! implicitly and overlong input is an error, never silently truncated.

use crate::error::{BmiError, Result};
use crate::limits::{MAXSTRLEN, MAX_NAME_BYTES};
use std::ffi::CString;
use std::os::raw::c_char;

/// How unused bytes at the end of a native buffer are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// NUL bytes; at least one terminator is always present
    Nul,
    /// ASCII blanks; no terminator
    Blank,
}

impl Padding {
    const fn byte(&self) -> u8 {
        match self {
            Padding::Nul => 0,
            Padding::Blank => b' ',
        }
    }

    /// Longest string that fits a buffer of `len` bytes
    pub const fn capacity(&self, len: usize) -> usize {
        match self {
            Padding::Nul => len.saturating_sub(1),
            Padding::Blank => len,
        }
    }
}

/// Encode `s` into a native buffer of exactly `len` bytes.
///
/// Fails with `StringTooLong` when `s` does not fit (for NUL padding the
/// terminator counts against `len`), and with `InvalidString` when `s`
/// contains a NUL byte.
pub fn to_foreign(s: &str, len: usize, padding: Padding) -> Result<Vec<u8>> {
    let bytes = s.as_bytes();
    let max = padding.capacity(len);
    if bytes.len() > max {
        return Err(BmiError::StringTooLong {
            len: bytes.len(),
            max,
        });
    }
    if bytes.contains(&0) {
        return Err(BmiError::InvalidString(format!(
            "interior NUL byte in {:?}",
            s
        )));
    }
    let mut buf = vec![padding.byte(); len];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

/// Decode a native buffer, considering at most `declared_len` bytes.
///
/// Reading stops at the first NUL. With blank padding, trailing blanks are
/// trimmed as well. Invalid UTF-8 is replaced rather than rejected since
/// tags and names are diagnostics, not data.
pub fn from_foreign(buf: &[u8], declared_len: usize, padding: Padding) -> String {
    let window = &buf[..declared_len.min(buf.len())];
    let end = window.iter().position(|&b| b == 0).unwrap_or(window.len());
    let mut text = &window[..end];
    if padding == Padding::Blank {
        while let Some((&b' ', rest)) = text.split_last() {
            text = rest;
        }
    }
    String::from_utf8_lossy(text).into_owned()
}

/// A NUL-terminated name ready to pass as `const char*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CName(CString);

impl CName {
    /// Encode a variable name or path; at most `MAX_NAME_BYTES` bytes.
    pub fn new(s: &str) -> Result<Self> {
        if s.len() > MAX_NAME_BYTES {
            return Err(BmiError::StringTooLong {
                len: s.len(),
                max: MAX_NAME_BYTES,
            });
        }
        CString::new(s)
            .map(CName)
            .map_err(|e| BmiError::InvalidString(e.to_string()))
    }

    /// Pointer valid for as long as `self` lives
    pub fn as_ptr(&self) -> *const c_char {
        self.0.as_ptr()
    }

    /// The name without terminator
    pub fn to_str_lossy(&self) -> String {
        self.0.to_string_lossy().into_owned()
    }
}

/// A zeroed `MAXSTRLEN` output buffer for the model to write a string into.
pub struct StringBuffer {
    buf: Vec<u8>,
}

impl StringBuffer {
    /// Allocate a zero-filled buffer
    pub fn new() -> Self {
        Self {
            buf: vec![0; MAXSTRLEN],
        }
    }

    /// Pointer the model writes through; valid for as long as `self` lives
    pub fn as_mut_ptr(&mut self) -> *mut c_char {
        self.buf.as_mut_ptr().cast()
    }

    /// Decode what the model wrote
    pub fn into_string(self) -> String {
        from_foreign(&self.buf, MAXSTRLEN, Padding::Nul)
    }
}

impl Default for StringBuffer {
    fn default() -> Self {
        Self::new()
    }
}

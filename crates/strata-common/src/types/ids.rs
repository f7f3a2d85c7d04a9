//! Core identifier types for Strata.
//!
//! These types provide type-safe wrappers around numeric identifiers,
//! preventing accidental misuse of different ID types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Page number - identifies a page in the page file.
///
/// Page numbers are 1-based: page `n` lives at byte offset
/// `(n - 1) * PAGE_SIZE`. Page 1 is reserved for the checkpoint marker.
///
/// # Example
///
/// ```rust
/// use strata_common::types::PageNo;
///
/// let page = PageNo::new(42);
/// assert_eq!(page.as_u32(), 42);
/// assert_eq!(page.file_offset(8192), 41 * 8192);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PageNo(u32);

impl PageNo {
    /// Sentinel for "no page".
    pub const INVALID: Self = Self(0);

    /// The checkpoint page.
    pub const CHECKPOINT: Self = Self(1);

    /// Creates a new `PageNo` from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(no: u32) -> Self {
        Self(no)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the next page number.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Checks if this is a valid page number.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }

    /// Byte offset of this page inside the page file.
    #[inline]
    #[must_use]
    pub const fn file_offset(self, page_size: usize) -> u64 {
        (self.0 as u64).saturating_sub(1) * page_size as u64
    }
}

impl fmt::Debug for PageNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "PageNo(INVALID)")
        } else {
            write!(f, "PageNo({})", self.0)
        }
    }
}

impl fmt::Display for PageNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PageNo {
    #[inline]
    fn from(no: u32) -> Self {
        Self::new(no)
    }
}

/// Data item address - packs a page number and an in-page offset.
///
/// Layout: the page number occupies the high 32 bits, the offset the low
/// 16 bits.
///
/// # Example
///
/// ```rust
/// use strata_common::types::{PageNo, Uid};
///
/// let uid = Uid::from_parts(PageNo::new(2), 7);
/// assert_eq!(uid.as_u64(), (2 << 32) | 7);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Uid(u64);

impl Uid {
    /// Sentinel meaning "no item" (also used for "no sibling").
    pub const NONE: Self = Self(0);

    const OFFSET_MASK: u64 = (1 << 16) - 1;

    /// Creates a `Uid` from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Packs a page number and an offset into a `Uid`.
    #[inline]
    #[must_use]
    pub const fn from_parts(page_no: PageNo, offset: u16) -> Self {
        Self(((page_no.as_u32() as u64) << 32) | offset as u64)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Page holding the item.
    #[inline]
    #[must_use]
    pub const fn page_no(self) -> PageNo {
        PageNo::new((self.0 >> 32) as u32)
    }

    /// Offset of the item inside its page.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> u16 {
        (self.0 & Self::OFFSET_MASK) as u16
    }

    /// Returns true for the `NONE` sentinel.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Creates a Uid from bytes (big-endian).
    #[inline]
    #[must_use]
    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }

    /// Converts to bytes (big-endian).
    #[inline]
    #[must_use]
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({}:{})", self.page_no().as_u32(), self.offset())
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Uid {
    #[inline]
    fn from(raw: u64) -> Self {
        Self::new(raw)
    }
}

impl From<Uid> for u64 {
    #[inline]
    fn from(uid: Uid) -> Self {
        uid.0
    }
}

/// Transaction identifier.
///
/// Transaction IDs are allocated sequentially starting at 1. ID 0 is the
/// super transaction: it is always reported as committed and is used for
/// operations that run outside of any user transaction.
///
/// # Example
///
/// ```rust
/// use strata_common::types::Xid;
///
/// let xid = Xid::new(1);
/// assert!(!xid.is_super());
/// assert!(Xid::SUPER.is_super());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Xid(u64);

impl Xid {
    /// The always-committed super transaction.
    pub const SUPER: Self = Self(0);

    /// Creates a new `Xid` from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next transaction ID.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns true for the super transaction.
    #[inline]
    #[must_use]
    pub const fn is_super(self) -> bool {
        self.0 == Self::SUPER.0
    }

    /// Creates an Xid from bytes (big-endian).
    #[inline]
    #[must_use]
    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }

    /// Converts to bytes (big-endian).
    #[inline]
    #[must_use]
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Debug for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_super() {
            write!(f, "Xid(SUPER)")
        } else {
            write!(f, "Xid({})", self.0)
        }
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Xid {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_no_offset() {
        assert_eq!(PageNo::new(1).file_offset(8192), 0);
        assert_eq!(PageNo::new(3).file_offset(8192), 16384);
        assert!(!PageNo::INVALID.is_valid());
        assert_eq!(PageNo::new(4).next(), PageNo::new(5));
    }

    #[test]
    fn test_uid_packing() {
        let uid = Uid::from_parts(PageNo::new(0xABCD), 0x1234);
        assert_eq!(uid.page_no(), PageNo::new(0xABCD));
        assert_eq!(uid.offset(), 0x1234);
        assert_eq!(Uid::from_be_bytes(uid.to_be_bytes()), uid);
        assert!(Uid::NONE.is_none());
    }

    #[test]
    fn test_uid_debug_shows_parts() {
        let uid = Uid::from_parts(PageNo::new(7), 300);
        assert_eq!(format!("{:?}", uid), "Uid(7:300)");
    }

    #[test]
    fn test_xid_ordering() {
        assert!(Xid::new(5) < Xid::new(6));
        assert_eq!(Xid::new(5).next(), Xid::new(6));
        assert_eq!(format!("{:?}", Xid::SUPER), "Xid(SUPER)");
    }
}

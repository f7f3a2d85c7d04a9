//! Log record encoding.
//!
//! ```text
//! Insert: [kind=0 (1)][xid (8)][page_no (4)][offset (2)][raw ...]
//! Update: [kind=1 (1)][xid (8)][uid (8)][old_raw ...][new_raw ...]
//! ```
//!
//! An update carries the before and after image of one data item. Both
//! images have the same length, so the split point is the middle of the
//! remaining bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use strata_common::types::{PageNo, Uid, Xid};

use crate::error::{WalError, WalResult};

const KIND_INSERT: u8 = 0;
const KIND_UPDATE: u8 = 1;

const INSERT_HEADER_SIZE: usize = 1 + 8 + 4 + 2;
const UPDATE_HEADER_SIZE: usize = 1 + 8 + 8;

/// A typed log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// A data item was written into a page.
    Insert {
        /// Inserting transaction.
        xid: Xid,
        /// Target page.
        page_no: PageNo,
        /// Offset of the item in the page.
        offset: u16,
        /// The full data item bytes.
        raw: Bytes,
    },
    /// A data item was changed in place.
    Update {
        /// Updating transaction.
        xid: Xid,
        /// The item.
        uid: Uid,
        /// Item bytes before the change.
        old_raw: Bytes,
        /// Item bytes after the change.
        new_raw: Bytes,
    },
}

impl LogRecord {
    /// Builds an update record. Panics in debug builds if the images differ
    /// in length.
    pub fn update(xid: Xid, uid: Uid, old_raw: Bytes, new_raw: Bytes) -> Self {
        debug_assert_eq!(old_raw.len(), new_raw.len());
        Self::Update {
            xid,
            uid,
            old_raw,
            new_raw,
        }
    }

    /// Transaction that produced the record.
    pub fn xid(&self) -> Xid {
        match self {
            Self::Insert { xid, .. } | Self::Update { xid, .. } => *xid,
        }
    }

    /// Page touched by the record.
    pub fn page_no(&self) -> PageNo {
        match self {
            Self::Insert { page_no, .. } => *page_no,
            Self::Update { uid, .. } => uid.page_no(),
        }
    }

    /// Serializes the record.
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Insert {
                xid,
                page_no,
                offset,
                raw,
            } => {
                let mut buf = BytesMut::with_capacity(INSERT_HEADER_SIZE + raw.len());
                buf.put_u8(KIND_INSERT);
                buf.put_u64(xid.as_u64());
                buf.put_u32(page_no.as_u32());
                buf.put_u16(*offset);
                buf.put_slice(raw);
                buf.freeze()
            }
            Self::Update {
                xid,
                uid,
                old_raw,
                new_raw,
            } => {
                let mut buf =
                    BytesMut::with_capacity(UPDATE_HEADER_SIZE + old_raw.len() + new_raw.len());
                buf.put_u8(KIND_UPDATE);
                buf.put_u64(xid.as_u64());
                buf.put_u64(uid.as_u64());
                buf.put_slice(old_raw);
                buf.put_slice(new_raw);
                buf.freeze()
            }
        }
    }

    /// Parses a record produced by [`LogRecord::encode`].
    pub fn decode(data: &[u8]) -> WalResult<Self> {
        let mut buf = data;
        if !buf.has_remaining() {
            return Err(WalError::malformed("empty record"));
        }

        match buf.get_u8() {
            KIND_INSERT => {
                if data.len() < INSERT_HEADER_SIZE {
                    return Err(WalError::malformed(format!(
                        "insert record of {} bytes",
                        data.len()
                    )));
                }
                let xid = Xid::new(buf.get_u64());
                let page_no = PageNo::new(buf.get_u32());
                let offset = buf.get_u16();
                Ok(Self::Insert {
                    xid,
                    page_no,
                    offset,
                    raw: Bytes::copy_from_slice(buf),
                })
            }
            KIND_UPDATE => {
                if data.len() < UPDATE_HEADER_SIZE || (data.len() - UPDATE_HEADER_SIZE) % 2 != 0 {
                    return Err(WalError::malformed(format!(
                        "update record of {} bytes",
                        data.len()
                    )));
                }
                let xid = Xid::new(buf.get_u64());
                let uid = Uid::new(buf.get_u64());
                let half = buf.len() / 2;
                Ok(Self::Update {
                    xid,
                    uid,
                    old_raw: Bytes::copy_from_slice(&buf[..half]),
                    new_raw: Bytes::copy_from_slice(&buf[half..]),
                })
            }
            kind => Err(WalError::malformed(format!("unknown record kind {}", kind))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_layout() {
        let record = LogRecord::Insert {
            xid: Xid::new(7),
            page_no: PageNo::new(3),
            offset: 0x0102,
            raw: Bytes::from_static(b"\x00\x00\x02hi"),
        };
        let bytes = record.encode();

        assert_eq!(bytes[0], 0);
        assert_eq!(&bytes[1..9], &7u64.to_be_bytes());
        assert_eq!(&bytes[9..13], &3u32.to_be_bytes());
        assert_eq!(&bytes[13..15], &[0x01, 0x02]);
        assert_eq!(&bytes[15..], b"\x00\x00\x02hi");
        assert_eq!(LogRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn test_update_splits_images() {
        let uid = Uid::from_parts(PageNo::new(4), 10);
        let record = LogRecord::update(
            Xid::new(2),
            uid,
            Bytes::from_static(b"old!"),
            Bytes::from_static(b"new!"),
        );
        let decoded = LogRecord::decode(&record.encode()).unwrap();

        assert_eq!(decoded.xid(), Xid::new(2));
        assert_eq!(decoded.page_no(), PageNo::new(4));
        match decoded {
            LogRecord::Update {
                old_raw, new_raw, ..
            } => {
                assert_eq!(old_raw.as_ref(), b"old!");
                assert_eq!(new_raw.as_ref(), b"new!");
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(LogRecord::decode(&[]).is_err());
        assert!(LogRecord::decode(&[9, 0, 0]).is_err());
        assert!(LogRecord::decode(&[0, 1, 2]).is_err());
        // Odd image length.
        let mut odd = vec![1u8];
        odd.extend_from_slice(&[0u8; 16]);
        odd.push(0xFF);
        assert!(LogRecord::decode(&odd).is_err());
    }
}

//! Read-once in-memory buffers addressed like files.
//!
//! # Invariants
//! - A key is written at most once for the lifetime of the registry, even
//!   after its buffer was taken.
//! - Taking a slot moves the buffer out and forgets the entry.

use super::{PatchError, PatchResult};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

/// `<scheme>://<key>` address of one slot, as handed to the host loader.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualPath {
    scheme: String,
    key: String,
}

impl VirtualPath {
    pub fn new(scheme: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            key: key.into(),
        }
    }

    /// Parses `scheme://key`. Returns `None` for anything else.
    pub fn parse(value: &str) -> Option<Self> {
        let (scheme, key) = value.split_once("://")?;
        if scheme.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self::new(scheme, key))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Display for VirtualPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme, self.key)
    }
}

/// Registry of patched sources waiting for the host loader.
#[derive(Debug, Default)]
pub struct VirtualSlots {
    scheme: String,
    buffers: BTreeMap<String, Vec<u8>>,
    consumed: BTreeSet<String>,
}

impl VirtualSlots {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            ..Self::default()
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Stores `bytes` under `key` and returns the path the host should load.
    pub fn write(&mut self, key: &str, bytes: Vec<u8>) -> PatchResult<VirtualPath> {
        let key = key.trim();
        if key.is_empty() {
            return Err(PatchError::InvalidTarget(
                "virtual slot key must not be empty".to_string(),
            ));
        }
        if self.buffers.contains_key(key) || self.consumed.contains(key) {
            return Err(PatchError::SlotOccupied(key.to_string()));
        }
        self.buffers.insert(key.to_string(), bytes);
        Ok(VirtualPath::new(self.scheme.clone(), key))
    }

    /// Moves the buffer behind `path` out of the registry.
    pub fn take(&mut self, path: &VirtualPath) -> PatchResult<Vec<u8>> {
        if path.scheme() != self.scheme {
            return Err(PatchError::SlotMissing(path.to_string()));
        }
        let bytes = self
            .buffers
            .remove(path.key())
            .ok_or_else(|| PatchError::SlotMissing(path.to_string()))?;
        self.consumed.insert(path.key().to_string());
        Ok(bytes)
    }

    /// Drops an unread buffer. Returns whether one was pending.
    pub(crate) fn discard(&mut self, path: &VirtualPath) -> bool {
        let removed = self.buffers.remove(path.key()).is_some();
        if removed {
            self.consumed.insert(path.key().to_string());
        }
        removed
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.buffers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{VirtualPath, VirtualSlots};
    use crate::patch::PatchError;

    #[test]
    fn write_then_take_moves_buffer_out() {
        let mut slots = VirtualSlots::new("buf");
        let path = slots.write("MediaHelper.php", b"<?php".to_vec()).expect("write");
        assert_eq!(path.to_string(), "buf://MediaHelper.php");
        assert!(slots.is_pending("MediaHelper.php"));

        let bytes = slots.take(&path).expect("take");
        assert_eq!(bytes, b"<?php");
        assert!(slots.is_empty());

        let err = slots.take(&path).expect_err("second read must fail");
        assert!(matches!(err, PatchError::SlotMissing(_)));
    }

    #[test]
    fn keys_are_write_once_even_after_take() {
        let mut slots = VirtualSlots::new("buf");
        let path = slots.write("a", vec![1]).expect("write");
        let err = slots.write("a", vec![2]).expect_err("pending key must fail");
        assert!(matches!(err, PatchError::SlotOccupied(_)));

        slots.take(&path).expect("take");
        let err = slots.write("a", vec![3]).expect_err("consumed key must fail");
        assert!(matches!(err, PatchError::SlotOccupied(_)));
    }

    #[test]
    fn take_rejects_foreign_scheme() {
        let mut slots = VirtualSlots::new("buf");
        slots.write("a", vec![1]).expect("write");
        let err = slots
            .take(&VirtualPath::new("other", "a"))
            .expect_err("foreign scheme must fail");
        assert!(matches!(err, PatchError::SlotMissing(_)));
        assert_eq!(slots.len(), 1);
    }

    #[test]
    fn parses_virtual_paths() {
        let path = VirtualPath::parse("buf://Image.php").expect("valid path");
        assert_eq!(path.scheme(), "buf");
        assert_eq!(path.key(), "Image.php");
        assert!(VirtualPath::parse("/var/www/Image.php").is_none());
        assert!(VirtualPath::parse("buf://").is_none());
    }
}

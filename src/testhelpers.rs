//! Some test fixtures only built on `cfg(test)`.

use crate::document::Document;
use crate::store::{ConfigStore, MemoryStore};
use crate::tag::Tag;
use serde_json::json;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Returns a random u64 created with [getrandom::fill()].
pub fn random_u64() -> u64 {
    let mut buf = [0; 8];
    getrandom::fill(&mut buf).unwrap();
    u64::from_le_bytes(buf)
}

/// Returns a random [Tag].
pub fn random_tag() -> Tag {
    Tag::generate().unwrap()
}

/// Returns a [Document] with random content.
pub fn random_document() -> Document {
    Document::new(json!({
        "amount": random_u64(),
        "memo": format!("invoice {}", random_tag()),
        "lines": [random_u64(), random_u64()],
    }))
    .unwrap()
}

/// A [MemoryStore] whose writes, loads and deletes can be made to fail on demand.
#[derive(Debug, Clone, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Arc<AtomicBool>,
}

impl FlakyStore {
    /// An empty store that is not failing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or stop) failing.
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The backing store, which never fails.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check(&self) -> io::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(io::Error::other("injected store failure"))
        } else {
            Ok(())
        }
    }
}

impl ConfigStore for FlakyStore {
    fn exists(&self) -> io::Result<bool> {
        self.inner.exists()
    }

    fn load(&self) -> io::Result<Vec<u8>> {
        self.check()?;
        self.inner.load()
    }

    fn store(&self, buf: &[u8]) -> io::Result<()> {
        self.check()?;
        self.inner.store(buf)
    }

    fn delete(&self) -> io::Result<()> {
        self.check()?;
        self.inner.delete()
    }
}

fn flip_bit(buf: &mut [u8], counter: usize) {
    let i = counter / 8;
    let b = (counter % 8) as u8;
    buf[i] ^= 1 << b; // Flip bit `b` in byte `i`
}

/// Iteration through all 1-bit flip permutations in a buffer.
#[derive(Debug)]
pub struct BitFlipper {
    good: Vec<u8>,
    counter: usize,
}

impl BitFlipper {
    /// Create a new [BitFlipper].
    pub fn new(orig: &[u8]) -> Self {
        BitFlipper {
            good: orig.to_vec(),
            counter: 0,
        }
    }
}

impl Iterator for BitFlipper {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.counter < self.good.len() * 8 {
            let mut bad = self.good.clone();
            flip_bit(&mut bad[..], self.counter);
            self.counter += 1;
            Some(bad)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_bit_flipper() {
        let good: Vec<u8> = vec![0b01010101];
        let badies = Vec::from_iter(BitFlipper::new(&good[..]));
        assert_eq!(badies.len(), 8);
        assert_eq!(
            badies,
            vec![
                vec![0b01010100],
                vec![0b01010111],
                vec![0b01010001],
                vec![0b01011101],
                vec![0b01000101],
                vec![0b01110101],
                vec![0b00010101],
                vec![0b11010101],
            ]
        );
    }

    #[test]
    fn test_flaky_store() {
        let store = FlakyStore::new();
        store.store(b"ok").unwrap();
        store.fail(true);
        assert!(store.store(b"nope").is_err());
        assert!(store.load().is_err());
        assert!(store.delete().is_err());
        assert!(store.exists().unwrap());
        assert_eq!(store.inner().load().unwrap(), b"ok");
        store.fail(false);
        assert_eq!(store.load().unwrap(), b"ok");
    }

    #[test]
    fn test_random_document() {
        let mut hset = HashSet::new();
        for _ in 0..64 {
            assert!(hset.insert(random_document().tag));
        }
    }
}

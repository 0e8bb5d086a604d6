// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

//! named, typed, fixed size tag buffers
//!
//! Tags are looked up through a name index into a slot table; every slot
//! carries its own lock, so operations on different tags never contend.

use crate::{path::TagKey, types::ElemType, Error, Result, Value};
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    convert::TryFrom,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

const MAX_NAME_LEN: usize = 255;

/// a copy of (part of) a tag buffer
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TagData {
    /// tag name as registered
    pub name: String,
    /// element type
    #[cfg_attr(feature = "serde", serde(serialize_with = "ser_type"))]
    pub elem_type: ElemType,
    /// number of elements in `data`
    pub count: usize,
    /// little endian element bytes
    pub data: Vec<u8>,
}

#[cfg(feature = "serde")]
fn ser_type<S: serde::Serializer>(t: &ElemType, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(t.name())
}

impl TagData {
    /// decoded values
    #[inline]
    pub fn values(&self) -> Vec<Value> {
        self.elem_type.decode_all(&self.data)
    }
}

/// tag description without data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    /// tag name as registered
    pub name: String,
    /// element type
    pub elem_type: ElemType,
    /// number of elements
    pub count: usize,
    /// 1 based symbol instance id
    pub instance: u32,
}

#[derive(Debug)]
struct TagSlot {
    name: String,
    elem_type: ElemType,
    count: usize,
    buf: RwLock<Vec<u8>>,
}

impl TagSlot {
    #[inline(always)]
    fn size(&self) -> usize {
        self.count * self.elem_type.width()
    }

    #[inline]
    fn range(&self, offset: usize, len: usize) -> Result<std::ops::Range<usize>> {
        let size = self.size();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(offset..end),
            end => Err(Error::OutOfRange {
                name: self.name.clone(),
                end: end.unwrap_or(usize::MAX),
                size,
            }),
        }
    }

    #[inline]
    fn check_type(&self, wire_type: u16) -> Result<()> {
        let found = ElemType::try_from(wire_type)?;
        if found != self.elem_type {
            return Err(Error::TypeMismatch {
                expected: self.elem_type,
                found: wire_type,
            });
        }
        Ok(())
    }

    fn read(&self, offset: usize, len: usize) -> Result<TagData> {
        let range = self.range(offset, len)?;
        let data = self.buf.read()[range].to_vec();
        Ok(TagData {
            name: self.name.clone(),
            elem_type: self.elem_type,
            count: len / self.elem_type.width(),
            data,
        })
    }

    fn write(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        let range = self.range(offset, bytes.len())?;
        self.buf.write()[range].copy_from_slice(bytes);
        Ok(())
    }
}

/// the tag table
///
/// # Examples
/// ```rust
/// use plcconnector_core::{ElemType, TagRegistry};
///
/// let registry = TagRegistry::new();
/// registry.add_tag("T1", ElemType::Dint, 3).unwrap();
/// registry.update_tag("T1", 1, &99_i32.to_le_bytes()).unwrap();
/// let data = registry.read_tag("t1", 0, 3).unwrap();
/// assert_eq!(data.data, vec![0, 0, 0, 0, 99, 0, 0, 0, 0, 0, 0, 0]);
/// ```
#[derive(Debug, Default)]
pub struct TagRegistry {
    index: RwLock<HashMap<String, usize>>,
    slots: RwLock<Vec<Arc<TagSlot>>>,
    frozen: AtomicBool,
}

impl TagRegistry {
    /// empty registry
    pub fn new() -> Self {
        Default::default()
    }

    /// add a zero filled tag of `count` elements
    pub fn add_tag(&self, name: impl AsRef<str>, elem_type: ElemType, count: usize) -> Result<()> {
        let name = name.as_ref();
        if self.is_frozen() {
            return Err(Error::RegistryFrozen);
        }
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(Error::InvalidTag("name length must be 1..=255"));
        }
        if count == 0 {
            return Err(Error::InvalidTag("count must be at least 1"));
        }
        let size = count
            .checked_mul(elem_type.width())
            .ok_or(Error::InvalidTag("tag too large"))?;

        let key = name.to_lowercase();
        let mut index = self.index.write();
        if index.contains_key(&key) {
            return Err(Error::DuplicateTag(name.to_owned()));
        }
        let mut slots = self.slots.write();
        index.insert(key, slots.len());
        slots.push(Arc::new(TagSlot {
            name: name.to_owned(),
            elem_type,
            count,
            buf: RwLock::new(vec![0; size]),
        }));
        debug!("tag added: {} {}[{}]", name, elem_type, count);
        Ok(())
    }

    #[inline]
    fn slot(&self, name: &str) -> Result<Arc<TagSlot>> {
        let idx = self
            .index
            .read()
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| Error::UnknownTag(name.to_owned()))?;
        self.slots
            .read()
            .get(idx)
            .cloned()
            .ok_or_else(|| Error::UnknownTag(name.to_owned()))
    }

    /// name of the tag addressed by `key`
    pub fn resolve(&self, key: &TagKey) -> Result<String> {
        match key {
            TagKey::Name(name) => self.slot(name).map(|s| s.name.clone()),
            TagKey::Instance(id) => {
                let idx = (*id as usize)
                    .checked_sub(1)
                    .ok_or_else(|| Error::UnknownTag(format!("@{}", id)))?;
                self.slots
                    .read()
                    .get(idx)
                    .map(|s| s.name.clone())
                    .ok_or_else(|| Error::UnknownTag(format!("@{}", id)))
            }
        }
    }

    /// local write of raw element bytes starting at element `elem_offset`
    pub fn update_tag(&self, name: &str, elem_offset: usize, bytes: &[u8]) -> Result<()> {
        let slot = self.slot(name)?;
        let offset = elem_offset
            .checked_mul(slot.elem_type.width())
            .unwrap_or(usize::MAX);
        slot.write(offset, bytes)
    }

    /// copy `count` elements starting at element `elem_offset`
    pub fn read_tag(&self, name: &str, elem_offset: usize, count: usize) -> Result<TagData> {
        let slot = self.slot(name)?;
        let width = slot.elem_type.width();
        let offset = elem_offset.checked_mul(width).unwrap_or(usize::MAX);
        let len = count.checked_mul(width).unwrap_or(usize::MAX);
        slot.read(offset, len)
    }

    /// remote write; the wire type must equal the declared type
    pub fn write_tag(
        &self,
        name: &str,
        elem_offset: usize,
        wire_type: u16,
        bytes: &[u8],
    ) -> Result<()> {
        let slot = self.slot(name)?;
        slot.check_type(wire_type)?;
        let offset = elem_offset
            .checked_mul(slot.elem_type.width())
            .unwrap_or(usize::MAX);
        slot.write(offset, bytes)
    }

    /// copy `len` bytes starting at byte `offset`
    pub fn read_bytes(&self, name: &str, offset: usize, len: usize) -> Result<TagData> {
        self.slot(name)?.read(offset, len)
    }

    /// write bytes starting at byte `offset`; the wire type must equal the declared type
    pub fn write_bytes(&self, name: &str, offset: usize, wire_type: u16, bytes: &[u8]) -> Result<()> {
        let slot = self.slot(name)?;
        slot.check_type(wire_type)?;
        slot.write(offset, bytes)
    }

    /// description of one tag
    pub fn info(&self, name: &str) -> Result<TagInfo> {
        let idx = self
            .index
            .read()
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| Error::UnknownTag(name.to_owned()))?;
        let slot = self.slot(name)?;
        Ok(TagInfo {
            name: slot.name.clone(),
            elem_type: slot.elem_type,
            count: slot.count,
            instance: idx as u32 + 1,
        })
    }

    /// does a tag with that name exist?
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.index.read().contains_key(&name.to_lowercase())
    }

    /// tag names in registration order
    pub fn names(&self) -> Vec<String> {
        self.slots.read().iter().map(|s| s.name.clone()).collect()
    }

    /// copy of every tag, in registration order
    pub fn snapshot(&self) -> Vec<TagData> {
        let slots: Vec<_> = self.slots.read().iter().cloned().collect();
        slots
            .iter()
            .map(|s| TagData {
                name: s.name.clone(),
                elem_type: s.elem_type,
                count: s.count,
                data: s.buf.read().clone(),
            })
            .collect()
    }

    /// number of tags
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// no tags?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// reject further `add_tag` calls
    #[inline]
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    /// frozen?
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Barrier, thread};

    fn registry() -> TagRegistry {
        let r = TagRegistry::new();
        r.add_tag("T1", ElemType::Dint, 3).unwrap();
        r
    }

    #[test]
    fn test_zero_filled() {
        let r = TagRegistry::new();
        for (i, t) in ElemType::ALL.iter().enumerate() {
            let name = format!("tag{}", i);
            let count = i + 1;
            r.add_tag(&name, *t, count).unwrap();
            let data = r.read_tag(&name, 0, count).unwrap();
            assert_eq!(data.data, vec![0; count * t.width()]);
            assert_eq!(data.elem_type, *t);
            assert_eq!(data.count, count);
        }
    }

    #[test]
    fn test_add_errors() {
        let r = registry();
        assert_eq!(
            r.add_tag("t1", ElemType::Int, 1),
            Err(Error::DuplicateTag("t1".into()))
        );
        assert!(matches!(
            r.add_tag("", ElemType::Int, 1),
            Err(Error::InvalidTag(_))
        ));
        assert!(matches!(
            r.add_tag("zero", ElemType::Int, 0),
            Err(Error::InvalidTag(_))
        ));
        r.freeze();
        assert_eq!(r.add_tag("late", ElemType::Int, 1), Err(Error::RegistryFrozen));
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_update_then_read() {
        let r = registry();
        let bytes: Vec<u8> = [1_i32, 2, 3].iter().flat_map(|v| v.to_le_bytes()).collect();
        r.update_tag("T1", 0, &bytes).unwrap();
        assert_eq!(r.read_tag("T1", 0, 3).unwrap().data, bytes);
        // element offset
        r.update_tag("T1", 2, &7_i32.to_le_bytes()).unwrap();
        assert_eq!(r.read_tag("T1", 2, 1).unwrap().data, 7_i32.to_le_bytes().to_vec());
        assert_eq!(r.read_bytes("T1", 4, 4).unwrap().data, 2_i32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_out_of_range() {
        let r = registry();
        let before = r.read_tag("T1", 0, 3).unwrap();
        let err = r.update_tag("T1", 2, &[1; 8]).unwrap_err();
        assert_eq!(
            err,
            Error::OutOfRange {
                name: "T1".into(),
                end: 16,
                size: 12
            }
        );
        assert!(matches!(r.read_tag("T1", 1, 3), Err(Error::OutOfRange { .. })));
        assert!(matches!(
            r.write_tag("T1", usize::MAX, 0xC4, &[0; 4]),
            Err(Error::OutOfRange { .. })
        ));
        assert_eq!(r.read_tag("T1", 0, 3).unwrap(), before);
        assert_eq!(
            r.update_tag("nope", 0, &[]),
            Err(Error::UnknownTag("nope".into()))
        );
    }

    #[test]
    fn test_write_type_mismatch() {
        let r = registry();
        let err = r.write_tag("T1", 0, 0xC3, &[1, 0]).unwrap_err();
        assert_eq!(
            err,
            Error::TypeMismatch {
                expected: ElemType::Dint,
                found: 0xC3
            }
        );
        assert_eq!(
            r.write_tag("T1", 0, 0x02A0, &[1, 0]),
            Err(Error::UnknownType(0x02A0))
        );
        assert_eq!(r.read_tag("T1", 0, 3).unwrap().data, vec![0; 12]);

        r.write_tag("T1", 1, 0xC4, &99_i32.to_le_bytes()).unwrap();
        let values = r.read_tag("T1", 0, 3).unwrap().values();
        assert_eq!(values, vec![Value::Dint(0), Value::Dint(99), Value::Dint(0)]);
    }

    #[test]
    fn test_case_insensitive() {
        let r = TagRegistry::new();
        r.add_tag("MyTag", ElemType::Real, 1).unwrap();
        assert!(r.contains("mytag"));
        assert_eq!(r.read_tag("MYTAG", 0, 1).unwrap().name, "MyTag");
        assert_eq!(r.resolve(&TagKey::Instance(1)).unwrap(), "MyTag");
        assert!(r.resolve(&TagKey::Instance(0)).is_err());
        assert!(r.resolve(&TagKey::Instance(2)).is_err());
        assert_eq!(r.info("mytag").unwrap().instance, 1);
    }

    #[test]
    fn test_disjoint_tags_do_not_block() {
        let r = Arc::new(TagRegistry::new());
        r.add_tag("A", ElemType::Lint, 1000).unwrap();
        r.add_tag("B", ElemType::Lint, 1000).unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = ["A", "B"]
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let r = r.clone();
                let barrier = barrier.clone();
                let name = name.to_string();
                thread::spawn(move || {
                    barrier.wait();
                    let bytes = vec![i as u8 + 1; 8000];
                    for _ in 0..200 {
                        r.write_tag(&name, 0, 0xC5, &bytes).unwrap();
                        let data = r.read_tag(&name, 0, 1000).unwrap();
                        assert_eq!(data.data, bytes);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_no_torn_reads() {
        let r = Arc::new(TagRegistry::new());
        r.add_tag("T", ElemType::Dint, 256).unwrap();
        let writer = {
            let r = r.clone();
            thread::spawn(move || {
                for i in 0..500_u32 {
                    let fill = (i % 2) as u8 * 0xFF;
                    r.update_tag("T", 0, &vec![fill; 1024]).unwrap();
                }
            })
        };
        for _ in 0..500 {
            let data = r.read_tag("T", 0, 256).unwrap().data;
            assert!(data.iter().all(|b| *b == data[0]));
        }
        writer.join().unwrap();
    }
}

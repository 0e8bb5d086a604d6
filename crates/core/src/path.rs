// plcconnector-rs
//
// a CIP/EtherNet/IP tag server, with rust style APIs and useful extensions.
// Copyright: 2022, Joylei <leingliu@gmail.com>
// License: MIT

//! EPATH segments, tag addressing and the textual tag path parser

use crate::{Error, Result};
use bytes::{Buf, BufMut};

/// well known object classes
pub mod class {
    /// identity object
    pub const IDENTITY: u32 = 0x01;
    /// message router
    pub const MESSAGE_ROUTER: u32 = 0x02;
    /// connection manager
    pub const CONNECTION_MANAGER: u32 = 0x06;
    /// symbol object; instance N is the N-th registered tag
    pub const SYMBOL: u32 = 0x6B;
}

const SEG_SYMBOLIC: u8 = 0x91;
const SEG_LOGICAL: u8 = 0x20;

const LOGICAL_CLASS: u8 = 0x00;
const LOGICAL_INSTANCE: u8 = 0x04;
const LOGICAL_ELEMENT: u8 = 0x08;
const LOGICAL_CONN_POINT: u8 = 0x0C;
const LOGICAL_ATTRIBUTE: u8 = 0x10;

/// one path segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// ANSI extended symbol
    Symbol(String),
    /// logical class
    Class(u32),
    /// logical instance
    Instance(u32),
    /// logical attribute
    Attribute(u32),
    /// logical member, array element index
    Element(u32),
    /// logical connection point
    ConnectionPoint(u32),
    /// bit of the addressed element, textual paths only
    Bit(u32),
}

/// decoded request path; port segments are dropped while decoding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EPath(Vec<Segment>);

/// what a tag request path addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagKey {
    /// tag name
    Name(String),
    /// symbol instance id, 1 based registration order
    Instance(u32),
}

/// a resolved tag request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagAddress {
    /// tag
    pub key: TagKey,
    /// first element addressed
    pub element: u32,
}

impl EPath {
    /// path from segments
    #[inline]
    pub fn new(segments: Vec<Segment>) -> Self {
        Self(segments)
    }

    /// segments of this path
    #[inline(always)]
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// is empty?
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// class addressed by the leading segment
    #[inline]
    pub fn class(&self) -> Option<u32> {
        match self.0.first() {
            Some(Segment::Class(c)) => Some(*c),
            _ => None,
        }
    }

    /// first symbol of the path
    #[inline]
    pub fn symbol(&self) -> Option<&str> {
        self.0.iter().find_map(|s| match s {
            Segment::Symbol(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// decode an EPATH of `buf.len()` bytes
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        let mut segments = Vec::with_capacity(4);
        while buf.has_remaining() {
            let head = buf.get_u8();
            match head {
                SEG_SYMBOLIC => {
                    let len = take_u8(&mut buf)? as usize;
                    let padded = len + (len & 1);
                    if buf.remaining() < len {
                        return Err(Error::InvalidPath("symbol segment truncated"));
                    }
                    let name = std::str::from_utf8(&buf[..len])
                        .map_err(|_| Error::InvalidPath("symbol is not utf-8"))?
                        .to_owned();
                    buf.advance(padded.min(buf.remaining()));
                    segments.push(Segment::Symbol(name));
                }
                h if h & 0xE0 == SEG_LOGICAL => {
                    let value = match h & 0x03 {
                        0 => take_u8(&mut buf)? as u32,
                        1 => {
                            take_u8(&mut buf)?;
                            take_u16(&mut buf)? as u32
                        }
                        2 => {
                            take_u8(&mut buf)?;
                            take_u32(&mut buf)?
                        }
                        _ => return Err(Error::InvalidPath("reserved logical format")),
                    };
                    let seg = match h & 0x1C {
                        LOGICAL_CLASS => Segment::Class(value),
                        LOGICAL_INSTANCE => Segment::Instance(value),
                        LOGICAL_ELEMENT => Segment::Element(value),
                        LOGICAL_CONN_POINT => Segment::ConnectionPoint(value),
                        LOGICAL_ATTRIBUTE => Segment::Attribute(value),
                        _ => return Err(Error::InvalidPath("unsupported logical type")),
                    };
                    segments.push(seg);
                }
                h if h & 0xE0 == 0 => skip_port(h, &mut buf)?,
                _ => return Err(Error::InvalidPath("unsupported segment")),
            }
        }
        Ok(Self(segments))
    }

    /// encode into EPATH bytes; bit segments are not encoded
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        for seg in self.0.iter() {
            match seg {
                Segment::Symbol(name) => {
                    let bytes = name.as_bytes();
                    if bytes.len() > 255 {
                        return Err(Error::InvalidPath("symbol too long"));
                    }
                    buf.put_u8(SEG_SYMBOLIC);
                    buf.put_u8(bytes.len() as u8);
                    buf.put_slice(bytes);
                    if bytes.len() & 1 == 1 {
                        buf.put_u8(0);
                    }
                }
                Segment::Class(v) => put_logical(buf, LOGICAL_CLASS, *v),
                Segment::Instance(v) => put_logical(buf, LOGICAL_INSTANCE, *v),
                Segment::Element(v) => put_logical(buf, LOGICAL_ELEMENT, *v),
                Segment::ConnectionPoint(v) => put_logical(buf, LOGICAL_CONN_POINT, *v),
                Segment::Attribute(v) => put_logical(buf, LOGICAL_ATTRIBUTE, *v),
                Segment::Bit(_) => {}
            }
        }
        Ok(())
    }

    /// encoded bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.0.len() * 8);
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// resolve the tag addressed by this path.
    ///
    /// accepted forms: `symbol [element]`, `Program:x symbol [element]`,
    /// `class 0x6B, instance N [element]`
    pub fn tag_address(&self) -> Result<TagAddress> {
        let mut iter = self.0.iter().peekable();
        let key = match iter.next() {
            Some(Segment::Symbol(name)) => {
                let is_program = name
                    .get(..8)
                    .map(|p| p.eq_ignore_ascii_case("Program:"))
                    .unwrap_or(false);
                match iter.peek() {
                    Some(Segment::Symbol(tag)) if is_program => {
                        let joined = format!("{}.{}", name, tag);
                        iter.next();
                        TagKey::Name(joined)
                    }
                    _ => TagKey::Name(name.clone()),
                }
            }
            Some(Segment::Class(class::SYMBOL)) => match iter.next() {
                Some(Segment::Instance(id)) => TagKey::Instance(*id),
                _ => return Err(Error::InvalidPath("symbol instance expected")),
            },
            _ => return Err(Error::InvalidPath("no tag in path")),
        };
        let element = match iter.next() {
            Some(Segment::Element(idx)) => *idx,
            Some(_) => return Err(Error::InvalidPath("unsupported tag path")),
            None => 0,
        };
        if iter.next().is_some() {
            // tags are one dimensional, no members
            return Err(Error::InvalidPath("unsupported tag path"));
        }
        Ok(TagAddress { key, element })
    }
}

impl From<Vec<Segment>> for EPath {
    #[inline]
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}

#[inline]
fn put_logical<B: BufMut>(buf: &mut B, kind: u8, v: u32) {
    if v > 0xFFFF {
        buf.put_u8(SEG_LOGICAL | kind | 2);
        buf.put_u8(0);
        buf.put_u32_le(v);
    } else if v > 0xFF {
        buf.put_u8(SEG_LOGICAL | kind | 1);
        buf.put_u8(0);
        buf.put_u16_le(v as u16);
    } else {
        buf.put_u8(SEG_LOGICAL | kind);
        buf.put_u8(v as u8);
    }
}

/// port segments route through backplanes; a single hop ends here
fn skip_port(head: u8, buf: &mut &[u8]) -> Result<()> {
    let mut len = 1;
    if head & 0x0F == 0x0F {
        take_u16(buf)?;
        len += 2;
    }
    if head & 0x10 != 0 {
        let link_len = take_u8(buf)? as usize;
        len += 1 + link_len;
        if buf.remaining() < link_len {
            return Err(Error::InvalidPath("port segment truncated"));
        }
        buf.advance(link_len);
    } else {
        take_u8(buf)?;
        len += 1;
    }
    if len & 1 == 1 && buf.has_remaining() {
        buf.advance(1);
    }
    Ok(())
}

#[inline]
fn take_u8(buf: &mut &[u8]) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(Error::InvalidPath("segment truncated"));
    }
    Ok(buf.get_u8())
}

#[inline]
fn take_u16(buf: &mut &[u8]) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(Error::InvalidPath("segment truncated"));
    }
    Ok(buf.get_u16_le())
}

#[inline]
fn take_u32(buf: &mut &[u8]) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(Error::InvalidPath("segment truncated"));
    }
    Ok(buf.get_u32_le())
}

/// parse a textual tag path like `Tag[1,2].member.3`.
///
/// `[a,b]` and `[a][b]` give element segments, `.name` a symbol and a
/// trailing `.N` a bit segment.
///
/// # Examples
/// ```rust
/// use plcconnector_core::path::{parse_tag_path, Segment};
///
/// let path = parse_tag_path("tag[41].2").unwrap();
/// assert_eq!(
///     path.segments(),
///     &[Segment::Symbol("tag".into()), Segment::Element(41), Segment::Bit(2)]
/// );
/// ```
pub fn parse_tag_path(text: &str) -> Result<EPath> {
    let invalid = || Error::InvalidPath("invalid tag path");
    let number = |s: &str| s.trim().parse::<u32>().map_err(|_| invalid());

    let mut segments = Vec::with_capacity(4);
    let mut name = String::new();
    let mut no = String::new();
    let mut bit = String::new();
    let mut in_bit = false;
    let mut in_name = true;
    let mut last = '\0';

    for c in text.chars() {
        match c {
            '.' => {
                if name.is_empty() {
                    if last != ']' {
                        return Err(invalid());
                    }
                } else {
                    segments.push(Segment::Symbol(std::mem::take(&mut name)));
                    in_name = true;
                }
            }
            '[' => {
                in_name = false;
                if last != ']' {
                    if name.is_empty() {
                        return Err(invalid());
                    }
                    segments.push(Segment::Symbol(std::mem::take(&mut name)));
                }
            }
            ']' => {
                if no.trim().is_empty() {
                    return Err(invalid());
                }
                in_name = true;
                segments.push(Segment::Element(number(&no)?));
                no.clear();
            }
            ',' => {
                if in_name || no.trim().is_empty() {
                    return Err(invalid());
                }
                segments.push(Segment::Element(number(&no)?));
                no.clear();
            }
            c if c.is_ascii_digit() || c == ' ' => {
                if !in_name {
                    no.push(c);
                } else if c == ' ' {
                    return Err(invalid());
                } else if name.is_empty() && bit.is_empty() {
                    if last != '.' {
                        return Err(invalid());
                    }
                    in_bit = true;
                    bit.push(c);
                } else if in_bit {
                    bit.push(c);
                } else {
                    name.push(c);
                }
            }
            c if c.is_alphabetic() || c == ':' || c == '_' => {
                if !in_name || in_bit {
                    return Err(invalid());
                }
                name.push(c);
            }
            _ => return Err(invalid()),
        }
        last = c;
    }
    if last == '.' || last == '[' || !no.is_empty() {
        return Err(invalid());
    }
    if !name.is_empty() {
        segments.push(Segment::Symbol(name));
    }
    if !bit.is_empty() {
        segments.push(Segment::Bit(number(&bit)?));
    }
    Ok(EPath(segments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use Segment::*;

    fn sym(s: &str) -> Segment {
        Symbol(s.to_owned())
    }

    #[test]
    fn test_parse_invalid() {
        let cases = [
            "[]",
            ".",
            "123",
            "t[]",
            "t[ ]",
            "t[ , ]",
            "t[, ]",
            "ta[.ss[2]",
            "tag1]ss[2]",
            "tag12[3].ss[2][",
            "tag123[3].ss[2]]",
            "tag1234[3].ss[2].",
            "tag12[3].ss[2][2",
            "tag123[3].ss[2]]3",
            "tag1234[3].ss[2].4aa",
            "4tag",
            "tag3.5count",
            "tag3.count.",
            "tag3 .count[",
            "ta g3.count[",
            "tag3,count",
            "tag3.count[,]",
            "tag3.count,",
            "tag3.count]",
            "ta'g1ss[2]",
            "tag3[.].count",
            "tag3[abc].count",
            "tag.30.a",
            "tag.30[12]",
            "tag.30[12].a.1",
        ];
        for case in cases.iter() {
            assert!(parse_tag_path(case).is_err(), "{} should fail", case);
        }
    }

    #[test]
    fn test_parse_valid() {
        let cases: Vec<(&str, Vec<Segment>)> = vec![
            ("tag:8:U", vec![sym("tag:8:U")]),
            ("tag_aa:12:33", vec![sym("tag_aa:12:33")]),
            ("tag", vec![sym("tag")]),
            ("tag.1", vec![sym("tag"), Bit(1)]),
            ("tag.31", vec![sym("tag"), Bit(31)]),
            ("tag[41].2", vec![sym("tag"), Element(41), Bit(2)]),
            ("tag3.count.10", vec![sym("tag3"), sym("count"), Bit(10)]),
            ("tag[ 41  ]", vec![sym("tag"), Element(41)]),
            ("tag[41][11][2]", vec![sym("tag"), Element(41), Element(11), Element(2)]),
            ("tag[41 , 1]", vec![sym("tag"), Element(41), Element(1)]),
            (
                "tag[41,11,2].x",
                vec![sym("tag"), Element(41), Element(11), Element(2), sym("x")],
            ),
            ("tag3[5].count", vec![sym("tag3"), Element(5), sym("count")]),
            (
                "tag[6].count[7]",
                vec![sym("tag"), Element(6), sym("count"), Element(7)],
            ),
        ];
        for (text, want) in cases {
            let path = parse_tag_path(text).unwrap();
            assert_eq!(path.segments(), &want[..], "{}", text);
        }
    }

    #[test]
    fn test_encode() {
        let cases: Vec<(&str, Vec<u8>)> = vec![
            ("tag", vec![0x91, 3, b't', b'a', b'g', 0]),
            ("tag.1", vec![0x91, 3, b't', b'a', b'g', 0]),
            ("tag[41].2", vec![0x91, 3, b't', b'a', b'g', 0, 0x28, 41]),
            (
                "tag3[60000].count",
                vec![
                    0x91, 4, b't', b'a', b'g', b'3', 0x29, 0, 0x60, 0xEA, 0x91, 5, b'c', b'o',
                    b'u', b'n', b't', 0,
                ],
            ),
            (
                "tag3[70000]",
                vec![0x91, 4, b't', b'a', b'g', b'3', 0x2A, 0, 112, 17, 1, 0],
            ),
        ];
        for (text, want) in cases {
            let bytes = parse_tag_path(text).unwrap().to_bytes().unwrap();
            assert_eq!(bytes, want, "{}", text);
        }
    }

    #[test]
    fn test_decode() {
        // port 1 slot 0, message router instance 1
        let path = EPath::decode(&[0x01, 0x00, 0x20, 0x02, 0x24, 0x01]).unwrap();
        assert_eq!(path.segments(), &[Class(2), Instance(1)]);
        assert_eq!(path.class(), Some(class::MESSAGE_ROUTER));

        let path = EPath::decode(&[0x91, 2, b'T', b'1', 0x29, 0, 0x2C, 0x01]).unwrap();
        assert_eq!(path.segments(), &[sym("T1"), Element(300)]);

        let path = EPath::decode(&[0x21, 0, 0x6B, 0, 0x25, 0, 0x02, 0x01]).unwrap();
        assert_eq!(path.segments(), &[Class(0x6B), Instance(0x102)]);

        assert!(EPath::decode(&[0x91, 5, b'a']).is_err());
        assert!(EPath::decode(&[0x29, 0]).is_err());
        assert!(EPath::decode(&[0x80, 0]).is_err());
    }

    #[test]
    fn test_tag_address() {
        let addr = parse_tag_path("T1[2]").unwrap().tag_address().unwrap();
        assert_eq!(addr.key, TagKey::Name("T1".into()));
        assert_eq!(addr.element, 2);

        let addr = parse_tag_path("Program:main.tag")
            .unwrap()
            .tag_address()
            .unwrap();
        assert_eq!(addr.key, TagKey::Name("Program:main.tag".into()));

        let addr = EPath::new(vec![Class(class::SYMBOL), Instance(3)])
            .tag_address()
            .unwrap();
        assert_eq!(addr.key, TagKey::Instance(3));
        assert_eq!(addr.element, 0);

        assert!(parse_tag_path("tag.member").unwrap().tag_address().is_err());
        assert!(parse_tag_path("tag[1,2]").unwrap().tag_address().is_err());
        assert!(EPath::new(vec![Class(2), Instance(1)]).tag_address().is_err());
    }
}

// Copyright 2025 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.

// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

//! A minimal recursive-descent BER/DER reader.
//!
//! This is not a general ASN.1 library: it exists so the receipt extractor
//! can walk one fixed PKCS#7 schema without building a parse tree. The
//! cursor holds a stack of borrowed slice views (`enter` pushes the content
//! of a constructed value, `leave` pops back to the parent's siblings) and
//! nothing is ever copied out of the input buffer.
//!
//! The input is attacker-influenced, so every length is bounds-checked
//! against the current frame and nesting depth is capped.

use thiserror::Error;

/// Nesting bound for `enter`. Genuine receipts are nowhere near this deep.
const MAX_DEPTH: usize = 32;

/// Errors raised while reading BER/DER structure.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum Asn1Error {
    /// A tag, length, or value ran past the end of the enclosing value.
    #[error("value truncated or length out of bounds")]
    Truncated,

    /// A length encoding this reader does not support (more than four
    /// length octets, or an indefinite length outside indefinite-aware
    /// mode).
    #[error("unsupported length encoding")]
    UnsupportedLength,

    /// A tag number too large to represent.
    #[error("unsupported tag encoding")]
    UnsupportedTag,

    /// The value's content does not match its universal type (e.g. an
    /// over-long INTEGER or a string that is not valid UTF-8).
    #[error("invalid value for its tag")]
    InvalidValue,

    /// `enter` was called on a primitive value.
    #[error("cannot enter a primitive value")]
    NotConstructed,

    /// `leave` was called at the outermost frame.
    #[error("no enclosing value to leave")]
    NoEnclosingValue,

    /// More than `MAX_DEPTH` nested `enter` calls.
    #[error("maximum nesting depth exceeded")]
    DepthExceeded,
}

/// Decoded identifier octets of the next value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Tag {
    /// Tag class (0 = universal, 1 = application, 2 = context, 3 =
    /// private).
    pub class: u8,

    /// Whether the constructed bit is set.
    pub constructed: bool,

    /// Tag number.
    pub number: u32,
}

/// Universal tag numbers this reader decodes into native values.
const TAG_INTEGER: u32 = 2;
const TAG_OCTET_STRING: u32 = 4;
const TAG_OBJECT_IDENTIFIER: u32 = 6;
const TAG_UTF8_STRING: u32 = 12;
const TAG_PRINTABLE_STRING: u32 = 19;
const TAG_IA5_STRING: u32 = 22;

/// A decoded value. Content is borrowed from the input buffer.
#[derive(Debug, Eq, PartialEq)]
pub enum Value<'a> {
    /// INTEGER, up to 8 content octets.
    Integer(i64),

    /// Primitive OCTET STRING content.
    OctetString(&'a [u8]),

    /// OBJECT IDENTIFIER in dotted-decimal form.
    ObjectIdentifier(String),

    /// UTF8String, PrintableString, or IA5String content.
    Text(&'a str),

    /// Anything else (including constructed values), as raw content bytes.
    Raw(&'a [u8]),
}

impl<'a> Value<'a> {
    /// Content bytes if this is an OCTET STRING (primitive or, in raw form,
    /// constructed).
    pub fn as_octet_string(&self) -> Option<&'a [u8]> {
        match self {
            Value::OctetString(bytes) | Value::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// One level of nesting: a borrowed slice and a read offset within it.
struct Frame<'a> {
    data: &'a [u8],
    pos: usize,
}

/// Header of the next value within a frame.
struct Header {
    tag: Tag,
    /// Offset of the first content byte, relative to the frame.
    content_start: usize,
    /// Content length in bytes.
    content_len: usize,
}

/// Cursor over nested BER/DER values.
///
/// See the module docs for the traversal model. The cursor borrows the
/// input buffer for its whole lifetime and owns nothing else.
pub struct Asn1Cursor<'a> {
    frames: Vec<Frame<'a>>,
    allow_indefinite: bool,
}

impl<'a> Asn1Cursor<'a> {
    /// A strict reader: definite short- and long-form lengths only.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            frames: vec![Frame { data, pos: 0 }],
            allow_indefinite: false,
        }
    }

    /// An indefinite-aware reader.
    ///
    /// The BER indefinite-length marker is taken to mean "the remainder of
    /// the current value". That is only sound because these readers always
    /// operate on a fully-buffered, externally-bounded blob; the app
    /// receipt format is the one place that needs it.
    pub fn with_indefinite_lengths(data: &'a [u8]) -> Self {
        Self {
            frames: vec![Frame { data, pos: 0 }],
            allow_indefinite: true,
        }
    }

    /// Bytes left unread in the current frame.
    pub fn remaining(&self) -> usize {
        match self.frames.last() {
            Some(frame) => frame.data.len().saturating_sub(frame.pos),
            None => 0,
        }
    }

    /// Inspect the next value's tag without consuming anything.
    pub fn peek(&self) -> Result<Tag, Asn1Error> {
        let frame = self.frames.last().ok_or(Asn1Error::Truncated)?;
        let header = self.read_header(frame)?;
        Ok(header.tag)
    }

    /// Consume the next value (tag, length, and content) and decode its
    /// content where the universal type is one we understand.
    pub fn read(&mut self) -> Result<(Tag, Value<'a>), Asn1Error> {
        let frame = self.frames.last().ok_or(Asn1Error::Truncated)?;
        let header = self.read_header(frame)?;

        let content_start = frame.pos + header.content_start;
        let content = &frame.data[content_start..content_start + header.content_len];
        let consumed = header.content_start + header.content_len;

        let value = if header.tag.class != 0 || header.tag.constructed {
            Value::Raw(content)
        } else {
            match header.tag.number {
                TAG_INTEGER => Value::Integer(decode_integer(content)?),
                TAG_OCTET_STRING => Value::OctetString(content),
                TAG_OBJECT_IDENTIFIER => Value::ObjectIdentifier(decode_oid(content)?),
                TAG_UTF8_STRING | TAG_PRINTABLE_STRING | TAG_IA5_STRING => Value::Text(
                    std::str::from_utf8(content).map_err(|_| Asn1Error::InvalidValue)?,
                ),
                _ => Value::Raw(content),
            }
        };

        if let Some(frame) = self.frames.last_mut() {
            frame.pos += consumed;
        }

        Ok((header.tag, value))
    }

    /// Like `read`, but push the constructed value's content as a new
    /// frame so subsequent calls operate inside it.
    pub fn enter(&mut self) -> Result<Tag, Asn1Error> {
        if self.frames.len() >= MAX_DEPTH {
            return Err(Asn1Error::DepthExceeded);
        }

        let frame = self.frames.last().ok_or(Asn1Error::Truncated)?;
        let header = self.read_header(frame)?;

        if !header.tag.constructed {
            return Err(Asn1Error::NotConstructed);
        }

        let content_start = frame.pos + header.content_start;
        let content = &frame.data[content_start..content_start + header.content_len];
        let consumed = header.content_start + header.content_len;

        if let Some(frame) = self.frames.last_mut() {
            frame.pos += consumed;
        }

        self.frames.push(Frame {
            data: content,
            pos: 0,
        });

        Ok(header.tag)
    }

    /// Pop the current frame, resuming traversal of the parent's siblings.
    pub fn leave(&mut self) -> Result<(), Asn1Error> {
        if self.frames.len() < 2 {
            return Err(Asn1Error::NoEnclosingValue);
        }

        self.frames.pop();
        Ok(())
    }

    /// Decode the identifier and length octets at the frame's current
    /// position. Returns offsets relative to the frame position; nothing is
    /// consumed.
    fn read_header(&self, frame: &Frame<'a>) -> Result<Header, Asn1Error> {
        let data = &frame.data[frame.pos.min(frame.data.len())..];
        let mut offset = 0;

        let first = *data.first().ok_or(Asn1Error::Truncated)?;
        offset += 1;

        let class = first >> 6;
        let constructed = first & 0x20 != 0;

        let number = if first & 0x1F != 0x1F {
            u32::from(first & 0x1F)
        } else {
            // High-tag-number form: base-128, high bit marks continuation.
            let mut number: u32 = 0;
            loop {
                let byte = *data.get(offset).ok_or(Asn1Error::Truncated)?;
                offset += 1;

                number = number
                    .checked_mul(128)
                    .ok_or(Asn1Error::UnsupportedTag)?
                    .checked_add(u32::from(byte & 0x7F))
                    .ok_or(Asn1Error::UnsupportedTag)?;

                if byte & 0x80 == 0 {
                    break;
                }
            }
            number
        };

        let first_len = *data.get(offset).ok_or(Asn1Error::Truncated)?;
        offset += 1;

        let content_len = if first_len < 0x80 {
            usize::from(first_len)
        } else if first_len == 0x80 {
            // Indefinite form. Interpreted as "everything left in the
            // current bounded buffer"; see `with_indefinite_lengths`.
            if !self.allow_indefinite || !constructed {
                return Err(Asn1Error::UnsupportedLength);
            }
            data.len() - offset
        } else {
            let len_octets = usize::from(first_len & 0x7F);
            if len_octets > 4 {
                return Err(Asn1Error::UnsupportedLength);
            }

            let mut len: usize = 0;
            for _ in 0..len_octets {
                let byte = *data.get(offset).ok_or(Asn1Error::Truncated)?;
                offset += 1;
                len = len << 8 | usize::from(byte);
            }
            len
        };

        if content_len > data.len() - offset {
            return Err(Asn1Error::Truncated);
        }

        Ok(Header {
            tag: Tag {
                class,
                constructed,
                number,
            },
            content_start: offset,
            content_len,
        })
    }
}

/// Decode a big-endian two's-complement INTEGER of at most 8 octets.
fn decode_integer(content: &[u8]) -> Result<i64, Asn1Error> {
    if content.is_empty() || content.len() > 8 {
        return Err(Asn1Error::InvalidValue);
    }

    let mut value: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    for &byte in content {
        value = value << 8 | i64::from(byte);
    }

    Ok(value)
}

/// Decode OBJECT IDENTIFIER content into dotted-decimal form.
fn decode_oid(content: &[u8]) -> Result<String, Asn1Error> {
    if content.is_empty() {
        return Err(Asn1Error::InvalidValue);
    }

    let mut components: Vec<u64> = Vec::new();
    let mut accumulator: u64 = 0;

    for (index, &byte) in content.iter().enumerate() {
        accumulator = accumulator
            .checked_mul(128)
            .ok_or(Asn1Error::InvalidValue)?
            .checked_add(u64::from(byte & 0x7F))
            .ok_or(Asn1Error::InvalidValue)?;

        if byte & 0x80 == 0 {
            if components.is_empty() {
                // The first subidentifier packs the first two components.
                components.push(accumulator / 40);
                components.push(accumulator % 40);
            } else {
                components.push(accumulator);
            }
            accumulator = 0;
        } else if index == content.len() - 1 {
            // Trailing continuation byte.
            return Err(Asn1Error::InvalidValue);
        }
    }

    let rendered: Vec<String> = components.iter().map(u64::to_string).collect();
    Ok(rendered.join("."))
}

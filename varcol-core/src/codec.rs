//! Vector encoding.
//!
//! `encode_all` / `decode_all` move elements in and out of a [ValueBuffer],
//! `pack` / `unpack` convert a buffer to and from the persisted byte layout
//! which is shared with the indexing engine reading the same columns.
//!
//! ### Persisted layout
//!
//! ```text
//! bulk:    <bytes>
//! uvector: <element 0><element 1>...        (fixed width, no header)
//! vector:  B(n) B(len 0)..B(len n-1) <body 0>..<body n-1> [footer]
//! footer:  B(weight 0) B(domain 0) .. B(weight n-1) B(domain n-1)
//! ```
//!
//! The footer is only present when the buffer is weighted, elements of an
//! unweighted vector take the domain of the buffer they are unpacked into.
//! `B(v)` is the compact unsigned integer encoding implemented by
//! [encode_compact].

use std::iter::FusedIterator;

use bytes::{BufMut, Bytes, BytesMut};

use crate::buffer::{BufferLayout, ElementRef, ScratchBuffer, ValueBuffer};
use crate::error::{CodecError, ColumnError};
use crate::types::Domain;
use crate::value::{ElementSpec, VectorElement};

/// Encodes every element into `value` in input order.
///
/// Each element is staged through `scratch`, which is rewound before
/// every element. Missing weights are stored as `0` and missing values
/// as a present, empty element. The caller is expected to have
/// reinitialized `value` beforehand.
///
/// Returns the number of elements appended.
pub fn encode_all<'a, I>(
    value: &mut ValueBuffer,
    scratch: &mut ScratchBuffer,
    elements: I,
) -> Result<usize, ColumnError>
where
    I: IntoIterator<Item = &'a ElementSpec>,
{
    let mut appended = 0;
    for element in elements {
        let weight = element.resolved_weight();

        scratch.rewind();
        if let Some(element_value) = element.value.as_ref() {
            scratch.stage(element_value)?;
        }

        value.add_element(scratch.bytes(), weight, scratch.domain())?;
        appended += 1;
    }

    Ok(appended)
}

/// Returns an iterator over the elements of `value` in insertion order.
///
/// Decoding borrows the buffer and never mutates it, calling this again
/// yields the same sequence.
pub fn decode_all(value: &ValueBuffer) -> Elements<'_> {
    Elements {
        buffer: value,
        index: 0,
        len: value.element_count(),
    }
}

/// An iterator over the elements of a [ValueBuffer].
pub struct Elements<'a> {
    buffer: &'a ValueBuffer,
    index: usize,
    len: usize,
}

impl<'a> Iterator for Elements<'a> {
    type Item = ElementRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.len {
            return None;
        }
        let element = self.buffer.element(self.index);
        self.index += 1;
        element
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Elements<'_> {}

impl FusedIterator for Elements<'_> {}

impl From<ElementRef<'_>> for VectorElement {
    fn from(element: ElementRef<'_>) -> Self {
        VectorElement::new(
            Bytes::copy_from_slice(element.bytes),
            element.weight,
            element.domain,
        )
    }
}

/// Serializes the buffer into its persisted layout.
///
/// Fails if an element count or length does not fit the compact encoding.
pub fn pack(value: &ValueBuffer) -> Result<Bytes, CodecError> {
    match value.flags().layout {
        BufferLayout::Bulk | BufferLayout::UVector => Ok(Bytes::copy_from_slice(value.head())),
        BufferLayout::Vector => {
            let n = value.element_count();
            let mut out = BytesMut::with_capacity(value.head().len() + n * 4 + 5);

            encode_compact(compact_len(n)?, &mut out);
            for element in decode_all(value) {
                encode_compact(compact_len(element.bytes.len())?, &mut out);
            }
            for element in decode_all(value) {
                out.put_slice(element.bytes);
            }
            if value.flags().with_weight {
                for element in decode_all(value) {
                    encode_compact(element.weight, &mut out);
                    encode_compact(element.domain.0, &mut out);
                }
            }

            Ok(out.freeze())
        },
    }
}

fn compact_len(len: usize) -> Result<u32, CodecError> {
    u32::try_from(len).map_err(|_| CodecError::TooLarge(len))
}

/// Loads a persisted value into `value` according to the buffer's flags.
///
/// The buffer's existing content is replaced. An empty input leaves the
/// buffer empty.
pub fn unpack(packed: &[u8], value: &mut ValueBuffer) -> Result<(), CodecError> {
    value.rewind();

    if packed.is_empty() {
        return Ok(());
    }

    match value.flags().layout {
        BufferLayout::Bulk => {
            value.extend_from_slice(packed);
            Ok(())
        },
        BufferLayout::UVector => {
            let width = value
                .domain()
                .fixed_size()
                .ok_or(CodecError::NoFixedWidth(value.domain()))?;
            if packed.len() % width != 0 {
                return Err(CodecError::Misaligned {
                    len: packed.len(),
                    width,
                });
            }
            value.extend_from_slice(packed);
            Ok(())
        },
        BufferLayout::Vector => unpack_vector(packed, value),
    }
}

fn unpack_vector(packed: &[u8], value: &mut ValueBuffer) -> Result<(), CodecError> {
    let mut input = packed;
    let n = decode_compact(&mut input)? as usize;

    // Every length takes at least one byte.
    if n > input.len() {
        return Err(CodecError::Truncated);
    }

    let mut lengths = Vec::with_capacity(n);
    for _ in 0..n {
        lengths.push(decode_compact(&mut input)? as usize);
    }

    let expected: usize = lengths.iter().sum();
    let weighted = value.flags().with_weight;
    if input.len() < expected || (!weighted && input.len() != expected) {
        return Err(CodecError::LengthMismatch {
            expected,
            actual: input.len(),
        });
    }
    let (body, mut footer) = input.split_at(expected);

    let mut tags = Vec::with_capacity(n);
    for _ in 0..n {
        if weighted {
            let weight = decode_compact(&mut footer)?;
            let domain = Domain(decode_compact(&mut footer)?);
            tags.push((weight, domain));
        } else {
            tags.push((0, value.domain()));
        }
    }
    if !footer.is_empty() {
        return Err(CodecError::TrailingBytes(footer.len()));
    }

    let mut offset = 0;
    for (length, (weight, domain)) in lengths.into_iter().zip(tags) {
        let bytes = &body[offset..offset + length];
        offset += length;
        // The buffer is a vector so adding cannot fail.
        if value.add_element(bytes, weight, domain).is_err() {
            return Err(CodecError::Truncated);
        }
    }

    Ok(())
}

/// Appends `v` using the compact unsigned encoding.
///
/// | Range                       | Bytes | First byte                 |
/// |-----------------------------|-------|----------------------------|
/// | `0 .. 0x8f`                 | 1     | `v`                        |
/// | `0x8f .. 0x408f`            | 2     | `0xc0 + (v - 0x8f) >> 8`   |
/// | `0x408f .. 0x20408f`        | 3     | `0xa0 + (v - 0x408f) >> 16`|
/// | `0x20408f .. 0x1020408f`    | 4     | `0x90 + (v - 0x20408f) >> 24` |
/// | `0x1020408f ..`             | 5     | `0x8f`, then 4 bytes LE    |
///
/// Trailing bytes of the multi byte forms are big endian.
pub fn encode_compact(v: u32, out: &mut impl BufMut) {
    if v < 0x8f {
        out.put_u8(v as u8);
    } else if v < 0x408f {
        let v = v - 0x8f;
        out.put_u8(0xc0 + (v >> 8) as u8);
        out.put_u8((v & 0xff) as u8);
    } else if v < 0x20408f {
        let v = v - 0x408f;
        out.put_u8(0xa0 + (v >> 16) as u8);
        out.put_u8(((v >> 8) & 0xff) as u8);
        out.put_u8((v & 0xff) as u8);
    } else if v < 0x1020408f {
        let v = v - 0x20408f;
        out.put_u8(0x90 + (v >> 24) as u8);
        out.put_u8(((v >> 16) & 0xff) as u8);
        out.put_u8(((v >> 8) & 0xff) as u8);
        out.put_u8((v & 0xff) as u8);
    } else {
        out.put_u8(0x8f);
        out.put_u32_le(v);
    }
}

/// Reads one compactly encoded integer from the front of `input`,
/// advancing it past the consumed bytes.
pub fn decode_compact(input: &mut &[u8]) -> Result<u32, CodecError> {
    let [first] = take::<1>(input)?;

    let v = match first >> 4 {
        0x08 if first == 0x8f => u32::from_le_bytes(take::<4>(input)?),
        0x09 => {
            let [a, b, c] = take::<3>(input)?;
            (((first - 0x90) as u32) << 24 | (a as u32) << 16 | (b as u32) << 8 | c as u32)
                + 0x20408f
        },
        0x0a | 0x0b => {
            let [a, b] = take::<2>(input)?;
            (((first - 0xa0) as u32) << 16 | (a as u32) << 8 | b as u32) + 0x408f
        },
        0x0c..=0x0f => {
            let [a] = take::<1>(input)?;
            (((first - 0xc0) as u32) << 8 | a as u32) + 0x8f
        },
        _ => first as u32,
    };

    Ok(v)
}

fn take<const N: usize>(input: &mut &[u8]) -> Result<[u8; N], CodecError> {
    if input.len() < N {
        return Err(CodecError::Truncated);
    }
    let (head, rest) = input.split_at(N);
    *input = rest;

    let mut out = [0; N];
    out.copy_from_slice(head);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferFlags, ElementClass};
    use crate::types::Domain;
    use crate::value::Value;

    fn weighted_text_buffer() -> (ValueBuffer, ScratchBuffer) {
        let value = ValueBuffer::open(Domain::SHORT_TEXT, BufferFlags::weighted_vector());
        let scratch = ScratchBuffer::open(ElementClass::Vector {
            domain: Domain::SHORT_TEXT,
        });
        (value, scratch)
    }

    #[test]
    fn test_encode_decode_preserves_order_and_empties() {
        let (mut value, mut scratch) = weighted_text_buffer();
        let elements = vec![
            ElementSpec::new("ruby", 100),
            ElementSpec::builder().value("groonga").build(),
            ElementSpec::builder().weight(7).build(),
            ElementSpec::new(42i64, 0),
        ];

        let appended = encode_all(&mut value, &mut scratch, &elements).unwrap();
        assert_eq!(appended, 4);

        let decoded: Vec<VectorElement> = decode_all(&value).map(VectorElement::from).collect();
        assert_eq!(
            decoded,
            vec![
                VectorElement::new(Bytes::from_static(b"ruby"), 100, Domain::TEXT),
                VectorElement::new(Bytes::from_static(b"groonga"), 0, Domain::TEXT),
                VectorElement::new(Bytes::new(), 7, Domain::SHORT_TEXT),
                VectorElement::new(
                    Bytes::copy_from_slice(&42i32.to_le_bytes()),
                    0,
                    Domain::INT32
                ),
            ]
        );
    }

    #[test]
    fn test_decode_is_repeatable() {
        let (mut value, mut scratch) = weighted_text_buffer();
        let elements = vec![ElementSpec::new("a", 1), ElementSpec::new("b", 2)];
        encode_all(&mut value, &mut scratch, &elements).unwrap();

        let first: Vec<_> = decode_all(&value).collect();
        let second: Vec<_> = decode_all(&value).collect();
        assert_eq!(first, second);
        assert_eq!(decode_all(&value).len(), 2);
    }

    #[test]
    fn test_encode_stops_on_incompatible_key() {
        let mut value = ValueBuffer::open(Domain(256), BufferFlags::weighted_vector());
        let mut scratch = ScratchBuffer::open(ElementClass::UVector {
            table: Domain(256),
            key_domain: Domain::SHORT_TEXT,
        });
        let elements = vec![ElementSpec::new("ok", 1), ElementSpec::new(true, 2)];

        let err = encode_all(&mut value, &mut scratch, &elements).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_pack_weighted_layout() {
        let (mut value, mut scratch) = weighted_text_buffer();
        let elements = vec![ElementSpec::new("ruby", 100), ElementSpec::new(42i64, 7)];
        encode_all(&mut value, &mut scratch, &elements).unwrap();

        let packed = pack(&value).unwrap();
        let mut expected = vec![2, 4, 4];
        expected.extend_from_slice(b"ruby");
        expected.extend_from_slice(&42i32.to_le_bytes());
        expected.extend_from_slice(&[100, Domain::TEXT.0 as u8, 7, Domain::INT32.0 as u8]);
        assert_eq!(packed.as_ref(), expected.as_slice());

        let mut unpacked = ValueBuffer::open(Domain::SHORT_TEXT, BufferFlags::weighted_vector());
        unpack(&packed, &mut unpacked).unwrap();
        let decoded: Vec<_> = decode_all(&unpacked).map(VectorElement::from).collect();
        assert_eq!(
            decoded,
            vec![
                VectorElement::new(Bytes::from_static(b"ruby"), 100, Domain::TEXT),
                VectorElement::new(
                    Bytes::copy_from_slice(&42i32.to_le_bytes()),
                    7,
                    Domain::INT32
                ),
            ]
        );
    }

    #[test]
    fn test_pack_keeps_large_weights_and_domains() {
        let mut value = ValueBuffer::open(Domain(300), BufferFlags::weighted_vector());
        value.add_element(b"key", u32::MAX, Domain(0x408f)).unwrap();

        let packed = pack(&value).unwrap();
        let mut unpacked = ValueBuffer::open(Domain(300), BufferFlags::weighted_vector());
        unpack(&packed, &mut unpacked).unwrap();

        let element = unpacked.element(0).unwrap();
        assert_eq!(element.weight, u32::MAX);
        assert_eq!(element.domain, Domain(0x408f));
    }

    #[test]
    fn test_pack_unweighted_layout_has_no_weights() {
        let mut value = ValueBuffer::open(Domain::TEXT, BufferFlags::vector());
        value.add_element(b"ab", 9, Domain::TEXT).unwrap();
        value.add_element(b"", 9, Domain::TEXT).unwrap();

        let packed = pack(&value).unwrap();
        assert_eq!(packed.as_ref(), &[2, 2, 0, b'a', b'b']);

        let mut unpacked = ValueBuffer::open(Domain::TEXT, BufferFlags::vector());
        unpack(&packed, &mut unpacked).unwrap();
        assert_eq!(unpacked.element_count(), 2);
        assert!(decode_all(&unpacked).all(|e| e.weight == 0));
    }

    #[test]
    fn test_unpack_empty_vector() {
        let (value, _) = weighted_text_buffer();
        let packed = pack(&value).unwrap();
        assert_eq!(packed.as_ref(), &[0]);

        let mut unpacked = ValueBuffer::open(Domain::TEXT, BufferFlags::weighted_vector());
        unpack(&packed, &mut unpacked).unwrap();
        assert_eq!(unpacked.element_count(), 0);
    }

    #[rstest::rstest]
    #[case(&[2, 4], CodecError::Truncated)]
    #[case(&[0x8f, 1, 2], CodecError::Truncated)]
    #[case(&[1, 3, b'a'], CodecError::LengthMismatch { expected: 3, actual: 1 })]
    #[case(&[1, 1, b'a', b'b'], CodecError::LengthMismatch { expected: 1, actual: 2 })]
    fn test_unpack_corrupted_vector(#[case] packed: &[u8], #[case] expected: CodecError) {
        let mut value = ValueBuffer::open(Domain::TEXT, BufferFlags::vector());
        assert_eq!(unpack(packed, &mut value).unwrap_err(), expected);
    }

    #[rstest::rstest]
    #[case(&[1, 1, b'a'], CodecError::Truncated)]
    #[case(&[1, 1, b'a', 5], CodecError::Truncated)]
    #[case(&[1, 1, b'a', 5, 15, 0], CodecError::TrailingBytes(1))]
    #[case(&[1, 5, b'a', 5, 15], CodecError::LengthMismatch { expected: 5, actual: 3 })]
    fn test_unpack_corrupted_weighted_vector(#[case] packed: &[u8], #[case] expected: CodecError) {
        let mut value = ValueBuffer::open(Domain::TEXT, BufferFlags::weighted_vector());
        assert_eq!(unpack(packed, &mut value).unwrap_err(), expected);
    }

    #[test]
    fn test_unpack_misaligned_uvector() {
        let mut value = ValueBuffer::open(Domain(256), BufferFlags::uvector());
        let err = unpack(&[1, 0, 0, 0, 2], &mut value).unwrap_err();
        assert_eq!(err, CodecError::Misaligned { len: 5, width: 4 });
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_oversized_lengths_are_rejected() {
        assert_eq!(compact_len(u32::MAX as usize).unwrap(), u32::MAX);
        let len = u32::MAX as usize + 1;
        assert_eq!(compact_len(len).unwrap_err(), CodecError::TooLarge(len));
    }

    #[rstest::rstest]
    #[case(0, &[0x00])]
    #[case(0x8e, &[0x8e])]
    #[case(0x8f, &[0xc0, 0x00])]
    #[case(0x408e, &[0xff, 0xff])]
    #[case(0x408f, &[0xa0, 0x00, 0x00])]
    #[case(0x20408e, &[0xbf, 0xff, 0xff])]
    #[case(0x20408f, &[0x90, 0x00, 0x00, 0x00])]
    #[case(0x1020408e, &[0x9f, 0xff, 0xff, 0xff])]
    #[case(0x1020408f, &[0x8f, 0x8f, 0x40, 0x20, 0x10])]
    #[case(u32::MAX, &[0x8f, 0xff, 0xff, 0xff, 0xff])]
    fn test_compact_integer_boundaries(#[case] v: u32, #[case] expected: &[u8]) {
        let mut out = BytesMut::new();
        encode_compact(v, &mut out);
        assert_eq!(out.as_ref(), expected);

        let mut input = expected;
        assert_eq!(decode_compact(&mut input).unwrap(), v);
        assert!(input.is_empty(), "Decode should consume every byte");
    }

    #[test]
    fn test_bulk_round_trip() {
        let mut value = ValueBuffer::open(Domain::TEXT, BufferFlags::bulk());
        Value::from("hello").write_natural(value.body_mut());

        let packed = pack(&value).unwrap();
        let mut unpacked = ValueBuffer::open(Domain::TEXT, BufferFlags::bulk());
        unpack(&packed, &mut unpacked).unwrap();
        assert_eq!(unpacked.head(), b"hello");
    }
}

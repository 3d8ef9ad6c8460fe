use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use varcol_core::RecordId;

/// The default number of bits of a segment's capacity, 4 MiB.
pub const DEFAULT_SEGMENT_WIDTH_BITS: u32 = 22;
/// The smallest segment width a store accepts.
pub const MIN_SEGMENT_WIDTH_BITS: u32 = 4;
/// The largest segment width a store accepts.
pub const MAX_SEGMENT_WIDTH_BITS: u32 = 30;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
/// The unique ID of a segment.
pub struct SegmentId(ulid::Ulid);

impl SegmentId {
    #[allow(clippy::new_without_default)]
    /// Creates a new [SegmentId] with a unique ID.
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Display for SegmentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <ulid::Ulid as Display>::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// A run of packed values.
///
/// Overwritten values are never removed from `data`, they only stop
/// counting towards `live_bytes`.
struct Segment {
    data: Vec<u8>,
    live_bytes: u64,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
/// Where the packed value of a record lives.
struct Location {
    segment: SegmentId,
    offset: usize,
    len: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
/// Storage usage of one column.
pub struct ColumnStats {
    /// The number of records holding a value.
    pub records: usize,
    /// The number of allocated segments.
    pub segments: usize,
    /// The segment currently accepting appends.
    pub current_segment: Option<String>,
    /// Bytes referenced by a record.
    pub live_bytes: u64,
    /// Bytes held by all segments, including overwritten values.
    pub allocated_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// The segments and value locations of one column.
pub(crate) struct ColumnData {
    segments: BTreeMap<SegmentId, Segment>,
    current: Option<SegmentId>,
    locations: ahash::HashMap<RecordId, Location>,
}

impl ColumnData {
    /// Returns the packed value of `record` if one is stored.
    pub(crate) fn get(&self, record: RecordId) -> Option<&[u8]> {
        let location = self.locations.get(&record)?;
        let segment = self.segments.get(&location.segment)?;
        segment
            .data
            .get(location.offset..location.offset + location.len)
    }

    /// Replaces the packed value of `record`.
    pub(crate) fn put(&mut self, record: RecordId, packed: &[u8], width_bits: u32) {
        self.release(record);
        let location = self.append(packed, width_bits);
        self.locations.insert(record, location);
    }

    /// Stops counting the current value of `record` as live.
    ///
    /// Segments left without live bytes are freed unless they accept appends.
    fn release(&mut self, record: RecordId) {
        let Some(location) = self.locations.remove(&record) else {
            return;
        };
        let Some(segment) = self.segments.get_mut(&location.segment) else {
            return;
        };

        segment.live_bytes -= location.len as u64;
        if segment.live_bytes == 0 && self.current != Some(location.segment) {
            trace!(segment = %location.segment, "Freeing empty segment");
            self.segments.remove(&location.segment);
        }
    }

    /// Appends a packed value to the current segment, starting a new one
    /// when it would overflow the segment capacity.
    ///
    /// A value larger than the capacity gets a segment of its own.
    fn append(&mut self, packed: &[u8], width_bits: u32) -> Location {
        let capacity = 1usize << width_bits;

        let current = match self.current {
            Some(id) => match self.segments.get(&id) {
                Some(segment)
                    if segment.data.is_empty()
                        || segment.data.len() + packed.len() <= capacity =>
                {
                    id
                },
                _ => self.start_segment(capacity),
            },
            None => self.start_segment(capacity),
        };

        let segment = self.segments.entry(current).or_default();
        let offset = segment.data.len();
        segment.data.extend_from_slice(packed);
        segment.live_bytes += packed.len() as u64;

        Location {
            segment: current,
            offset,
            len: packed.len(),
        }
    }

    fn start_segment(&mut self, capacity: usize) -> SegmentId {
        if let Some(previous) = self.current {
            // The old append segment may have been fully overwritten already.
            if self
                .segments
                .get(&previous)
                .is_some_and(|segment| segment.live_bytes == 0)
            {
                self.segments.remove(&previous);
            }
        }

        let id = SegmentId::new();
        let segment = Segment {
            data: Vec::with_capacity(capacity.min(64 << 10)),
            live_bytes: 0,
        };
        self.segments.insert(id, segment);
        self.current = Some(id);

        debug!(segment = %id, "Started new segment");
        id
    }

    /// Relocates the live values of every sparse segment into the append
    /// segment and frees them, returning the number of segments freed.
    pub(crate) fn defrag(&mut self, threshold: i32, width_bits: u32) -> u32 {
        let Some(limit) = defrag_limit(width_bits, threshold) else {
            return 0;
        };

        let eligible: BTreeSet<SegmentId> = self
            .segments
            .iter()
            .filter(|(id, segment)| {
                Some(**id) != self.current
                    && segment.live_bytes > 0
                    && segment.live_bytes < limit
            })
            .map(|(id, _)| *id)
            .collect();

        if eligible.is_empty() {
            return 0;
        }

        let mut moved: Vec<(RecordId, Location)> = self
            .locations
            .iter()
            .filter(|(_, location)| eligible.contains(&location.segment))
            .map(|(record, location)| (*record, *location))
            .collect();
        moved.sort_by_key(|(record, _)| *record);

        for (record, location) in moved {
            let Some(segment) = self.segments.get(&location.segment) else {
                continue;
            };
            let packed = segment.data[location.offset..location.offset + location.len].to_vec();
            let relocated = self.append(&packed, width_bits);
            self.locations.insert(record, relocated);
        }

        for id in eligible.iter() {
            self.segments.remove(id);
        }

        eligible.len() as u32
    }

    pub(crate) fn stats(&self) -> ColumnStats {
        ColumnStats {
            records: self.locations.len(),
            segments: self.segments.len(),
            current_segment: self.current.map(|id| id.to_string()),
            live_bytes: self.segments.values().map(|s| s.live_bytes).sum(),
            allocated_bytes: self.segments.values().map(|s| s.data.len() as u64).sum(),
        }
    }
}

/// The live byte count below which a segment is defragmented.
///
/// `None` selects no segment.
pub(crate) fn defrag_limit(width_bits: u32, threshold: i32) -> Option<u64> {
    let shift = width_bits as i64 - threshold as i64;
    if shift < 0 {
        None
    } else if shift >= 63 {
        Some(u64::MAX)
    } else {
        Some(1u64 << shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDTH: u32 = 6;

    fn fragmented(records: u32) -> ColumnData {
        let mut data = ColumnData::default();
        // 16 byte values, four per segment.
        for id in 1..=records {
            data.put(RecordId(id), &[id as u8; 16], WIDTH);
        }
        // Overwrite three of every four values so the old segments go sparse.
        for id in 1..=records {
            if id % 4 != 1 {
                data.put(RecordId(id), &[0xff; 16], WIDTH);
            }
        }
        data
    }

    #[rstest::rstest]
    #[case(22, 0, Some(1 << 22))]
    #[case(22, 22, Some(1))]
    #[case(22, -4, Some(1 << 26))]
    #[case(22, 23, None)]
    #[case(4, -60, Some(u64::MAX))]
    fn test_defrag_limit(#[case] width: u32, #[case] threshold: i32, #[case] expected: Option<u64>) {
        assert_eq!(defrag_limit(width, threshold), expected);
    }

    #[test]
    fn test_put_get_and_overwrite() {
        let mut data = ColumnData::default();
        assert!(data.get(RecordId(1)).is_none());

        data.put(RecordId(1), b"hello", WIDTH);
        data.put(RecordId(2), b"world", WIDTH);
        assert_eq!(data.get(RecordId(1)), Some(&b"hello"[..]));

        data.put(RecordId(1), b"bye", WIDTH);
        assert_eq!(data.get(RecordId(1)), Some(&b"bye"[..]));
        assert_eq!(data.get(RecordId(2)), Some(&b"world"[..]));

        let stats = data.stats();
        assert_eq!(stats.records, 2);
        assert_eq!(stats.live_bytes, 8);
        assert_eq!(stats.allocated_bytes, 13);
    }

    #[test]
    fn test_segments_roll_over_at_capacity() {
        let mut data = ColumnData::default();
        for id in 1..=8 {
            data.put(RecordId(id), &[0; 16], WIDTH);
        }
        assert_eq!(data.stats().segments, 2);

        // Larger than the capacity, gets its own segment.
        data.put(RecordId(9), &[0; 100], WIDTH);
        assert_eq!(data.stats().segments, 3);
        assert_eq!(data.get(RecordId(9)).map(<[u8]>::len), Some(100));
    }

    #[test]
    fn test_fully_overwritten_segments_are_freed() {
        let mut data = ColumnData::default();
        for id in 1..=4 {
            data.put(RecordId(id), &[1; 16], WIDTH);
        }
        for id in 1..=4 {
            data.put(RecordId(id), &[2; 16], WIDTH);
        }
        assert_eq!(data.stats().segments, 1, "First segment should be freed eagerly");
        assert_eq!(data.defrag(-4, WIDTH), 0);
    }

    #[test]
    fn test_defrag_reclaims_sparse_segments() {
        let mut data = fragmented(16);
        let before = data.stats();
        let expected: Vec<Vec<u8>> = (1..=16)
            .map(|id| data.get(RecordId(id)).unwrap().to_vec())
            .collect();

        assert_eq!(data.defrag(22, WIDTH), 0);
        let reclaimed = data.defrag(-4, WIDTH);
        assert!(reclaimed > 0);
        assert!(reclaimed as usize <= before.segments);

        let after = data.stats();
        assert_eq!(after.live_bytes, before.live_bytes);
        assert!(after.allocated_bytes < before.allocated_bytes);
        for id in 1..=16 {
            assert_eq!(data.get(RecordId(id)).unwrap(), expected[id as usize - 1].as_slice());
        }
        assert_eq!(data.defrag(22, WIDTH), 0);
    }
}

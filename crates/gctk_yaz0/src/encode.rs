use crate::{Result, Yaz0Error, HEADER_SIZE, LONG_MATCH, MAGIC, MAX_MATCH, MIN_MATCH, WINDOW_SIZE};

const HASH_BITS: u32 = 15;
const HASH_SIZE: usize = 1 << HASH_BITS;
const NIL: usize = usize::MAX;

/// How hard the encoder searches for back-references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    /// Literal-only output. Valid Yaz0, roughly 12.5% larger than the input.
    Store,
    /// Greedy matching with a short search chain.
    Fast,
    /// Lazy matching with a deep search chain, close to Nintendo's own encoder.
    #[default]
    Best,
}

impl CompressionLevel {
    fn max_chain(self) -> usize {
        match self {
            CompressionLevel::Store => 0,
            CompressionLevel::Fast => 16,
            CompressionLevel::Best => 256,
        }
    }
}

/// Compress `src` with [`CompressionLevel::Best`].
pub fn compress(src: &[u8]) -> Result<Vec<u8>> {
    compress_with(src, CompressionLevel::default())
}

/// Compress `src` into a Yaz0 stream using the given search effort.
pub fn compress_with(src: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    let size = u32::try_from(src.len()).map_err(|_| Yaz0Error::InputTooLarge(src.len()))?;

    let mut out = Vec::with_capacity(HEADER_SIZE + src.len() + src.len() / 8 + 1);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(&[0; 8]);

    let mut writer = GroupWriter::new(out);
    let mut finder = MatchFinder::new(src, level.max_chain());

    let mut pos = 0;
    let mut pending: Option<Match> = None;

    while pos < src.len() {
        let current = pending.take().unwrap_or_else(|| finder.find(pos));

        if current.length < MIN_MATCH {
            writer.literal(src[pos]);
            finder.insert(pos);
            pos += 1;
            continue;
        }

        finder.insert(pos);

        // Lazy evaluation: a longer run starting one byte later beats the current one.
        if level == CompressionLevel::Best && pos + 1 < src.len() {
            let next = finder.find(pos + 1);
            if next.length > current.length {
                writer.literal(src[pos]);
                pos += 1;
                pending = Some(next);
                continue;
            }
        }

        writer.back_reference(current);
        for p in pos + 1..pos + current.length {
            finder.insert(p);
        }
        pos += current.length;
    }

    Ok(writer.finish())
}

#[derive(Debug, Clone, Copy)]
struct Match {
    distance: usize,
    length: usize,
}

impl Match {
    const NONE: Match = Match {
        distance: 0,
        length: 0,
    };
}

/// Hash-chain search over the 4 KiB window.
struct MatchFinder<'a> {
    src: &'a [u8],
    head: Vec<usize>,
    prev: Vec<usize>,
    max_chain: usize,
}

impl<'a> MatchFinder<'a> {
    fn new(src: &'a [u8], max_chain: usize) -> Self {
        Self {
            src,
            head: vec![NIL; HASH_SIZE],
            prev: vec![NIL; WINDOW_SIZE],
            max_chain,
        }
    }

    fn hash(&self, pos: usize) -> usize {
        let key = (self.src[pos] as u32) << 16 | (self.src[pos + 1] as u32) << 8 | self.src[pos + 2] as u32;
        (key.wrapping_mul(0x9E37_79B1) >> (32 - HASH_BITS)) as usize
    }

    fn insert(&mut self, pos: usize) {
        if self.max_chain == 0 || pos + MIN_MATCH > self.src.len() {
            return;
        }
        let h = self.hash(pos);
        self.prev[pos % WINDOW_SIZE] = self.head[h];
        self.head[h] = pos;
    }

    /// Longest earlier run matching the bytes at `pos`. Positions must be
    /// searched before they are inserted.
    fn find(&self, pos: usize) -> Match {
        if self.max_chain == 0 || pos + MIN_MATCH > self.src.len() {
            return Match::NONE;
        }

        let max_length = MAX_MATCH.min(self.src.len() - pos);
        let mut best = Match::NONE;
        let mut candidate = self.head[self.hash(pos)];
        let mut chain = 0;

        while candidate != NIL && candidate < pos && chain < self.max_chain {
            let distance = pos - candidate;
            if distance > WINDOW_SIZE {
                break;
            }

            let length = self.src[candidate..]
                .iter()
                .zip(&self.src[pos..pos + max_length])
                .take_while(|(a, b)| a == b)
                .count();

            if length > best.length {
                best = Match { distance, length };
                if length == max_length {
                    break;
                }
            }

            let next = self.prev[candidate % WINDOW_SIZE];
            if next >= candidate {
                break;
            }
            candidate = next;
            chain += 1;
        }

        best
    }
}

/// Accumulates operations into control groups of eight.
struct GroupWriter {
    out: Vec<u8>,
    control_pos: usize,
    ops_in_group: u8,
}

impl GroupWriter {
    fn new(out: Vec<u8>) -> Self {
        Self {
            out,
            control_pos: 0,
            ops_in_group: 8,
        }
    }

    fn begin_op(&mut self) {
        if self.ops_in_group == 8 {
            self.control_pos = self.out.len();
            self.out.push(0);
            self.ops_in_group = 0;
        }
    }

    fn literal(&mut self, byte: u8) {
        self.begin_op();
        self.out[self.control_pos] |= 0x80 >> self.ops_in_group;
        self.out.push(byte);
        self.ops_in_group += 1;
    }

    fn back_reference(&mut self, m: Match) {
        self.begin_op();
        let distance = m.distance - 1;
        if m.length >= LONG_MATCH {
            self.out.push((distance >> 8) as u8);
            self.out.push(distance as u8);
            self.out.push((m.length - LONG_MATCH) as u8);
        } else {
            self.out.push((((m.length - 2) << 4) | (distance >> 8)) as u8);
            self.out.push(distance as u8);
        }
        self.ops_in_group += 1;
    }

    fn finish(self) -> Vec<u8> {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decompress, decompressed_size};
    use proptest::prelude::*;

    #[test]
    fn test_compress_known_stream() {
        let packed = compress(b"abcabc").unwrap();

        let mut expected = MAGIC.to_vec();
        expected.extend_from_slice(&6u32.to_be_bytes());
        expected.extend_from_slice(&[0; 8]);
        expected.extend_from_slice(&[0xE0, b'a', b'b', b'c', 0x10, 0x02]);
        assert_eq!(packed, expected);
    }

    #[test]
    fn test_compress_empty() {
        let packed = compress(&[]).unwrap();
        assert_eq!(packed.len(), HEADER_SIZE);
        assert_eq!(decompressed_size(&packed).unwrap(), 0);
        assert!(decompress(&packed).unwrap().is_empty());
    }

    #[test]
    fn test_compress_shrinks_repetitive_data() {
        let data = b"REL module section ".repeat(512);
        let packed = compress(&data).unwrap();

        assert!(packed.len() < data.len() / 10);
        assert_eq!(decompress(&packed).unwrap(), data);
    }

    #[test]
    fn test_long_runs_use_three_byte_form() {
        let data = vec![0u8; 0x400];
        let packed = compress_with(&data, CompressionLevel::Fast).unwrap();

        assert_eq!(decompress(&packed).unwrap(), data);
        // One literal plus a handful of maximum-length runs.
        assert!(packed.len() < HEADER_SIZE + 24);
    }

    #[test]
    fn test_store_level_is_literal_only() {
        let data = b"aaaaaaaaaaaaaaaa".to_vec();
        let packed = compress_with(&data, CompressionLevel::Store).unwrap();

        assert_eq!(packed.len(), HEADER_SIZE + 2 + data.len());
        assert_eq!(decompress(&packed).unwrap(), data);
    }

    #[test]
    fn test_matches_reach_full_window() {
        let mut data: Vec<u8> = (0..WINDOW_SIZE as u32).map(|i| (i * 7 % 251) as u8).collect();
        let head = data[..64].to_vec();
        data.extend_from_slice(&head);

        let packed = compress(&data).unwrap();
        assert_eq!(decompress(&packed).unwrap(), data);
    }

    proptest! {
        #[test]
        fn round_trip_arbitrary(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            for level in [CompressionLevel::Store, CompressionLevel::Fast, CompressionLevel::Best] {
                let packed = compress_with(&data, level).unwrap();
                prop_assert_eq!(decompress(&packed).unwrap(), data.clone());
            }
        }

        #[test]
        fn round_trip_low_entropy(data in proptest::collection::vec(0u8..4, 0..16384)) {
            let packed = compress(&data).unwrap();
            prop_assert_eq!(decompress(&packed).unwrap(), data);
        }
    }
}

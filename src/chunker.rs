// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::config::size_variation;

/// Multiplier of the rolling polynomial.
const MULT: u64 = 0x0100_0193;

/// Content-defined chunker based on a rolling hash over a byte window.
///
/// The caller feeds buffers; each call reports how many bytes of the
/// buffer belong to the current segment and whether the next byte starts
/// a new one. Segment lengths stay within 1/16 of the configured average.
/// Stream state must be [`reset`](Chunker::reset) between files.
pub struct Chunker {
    window: usize,
    min: usize,
    avg: u64,
    max: usize,

    ring: Vec<u8>,
    ring_pos: usize,
    fingerprint: u64,

    /// MULT^window, used to slide the oldest byte out of the fingerprint
    out_factor: u64,

    seg_len: usize,
}

impl Chunker {
    pub(crate) fn new(window: usize, avg_seg_size: u32) -> Self {
        let window = window.max(1);
        let variation = size_variation(avg_seg_size) as usize;
        let avg = u64::from(avg_seg_size.max(2));

        Self {
            window,
            min: (avg_seg_size as usize).saturating_sub(variation).max(1),
            avg,
            max: avg_seg_size as usize + variation,
            ring: vec![0; window],
            ring_pos: 0,
            fingerprint: 0,
            out_factor: MULT.wrapping_pow(window as u32),
            seg_len: 0,
        }
    }

    /// Clears all stream state.
    pub(crate) fn reset(&mut self) {
        self.ring.fill(0);
        self.ring_pos = 0;
        self.fingerprint = 0;
        self.seg_len = 0;
    }

    /// Consumes bytes from `buf` until a segment boundary or the buffer end.
    ///
    /// Returns `(consumed, boundary)`: `consumed` bytes belong to the
    /// current segment; `boundary` reports whether the segment ends after
    /// them.
    pub(crate) fn next_boundary(&mut self, buf: &[u8]) -> (usize, bool) {
        for (i, &byte) in buf.iter().enumerate() {
            let slot = self
                .ring
                .get_mut(self.ring_pos)
                .expect("ring position stays within the window");
            let out = std::mem::replace(slot, byte);

            self.fingerprint = self
                .fingerprint
                .wrapping_mul(MULT)
                .wrapping_add(u64::from(byte))
                .wrapping_sub(u64::from(out).wrapping_mul(self.out_factor));

            self.ring_pos = (self.ring_pos + 1) % self.window;
            self.seg_len += 1;

            let at_cut_point = self.fingerprint % self.avg == self.avg - 1;

            if (self.seg_len >= self.min && at_cut_point) || self.seg_len >= self.max {
                self.reset();
                return (i + 1, true);
            }
        }

        (buf.len(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundaries(chunker: &mut Chunker, data: &[u8], feed: usize) -> Vec<usize> {
        let mut cuts = vec![];
        let mut seg_len = 0;

        for chunk in data.chunks(feed) {
            let mut window = chunk;
            while !window.is_empty() {
                let (consumed, boundary) = chunker.next_boundary(window);
                seg_len += consumed;
                if boundary {
                    cuts.push(seg_len);
                    seg_len = 0;
                }
                window = window.get(consumed..).unwrap_or_default();
            }
        }

        cuts
    }

    #[test]
    fn boundaries_do_not_depend_on_buffering() {
        let data = (0u32..40_000)
            .flat_map(|x| x.wrapping_mul(2_654_435_761).to_le_bytes())
            .collect::<Vec<_>>();

        let mut chunker = Chunker::new(48, 4_096);
        let one_shot = boundaries(&mut chunker, &data, data.len());

        chunker.reset();
        let dribbled = boundaries(&mut chunker, &data, 7);

        assert_eq!(one_shot, dribbled);
        assert!(!one_shot.is_empty());
    }

    #[test]
    fn segment_lengths_stay_bounded() {
        let data = (0u32..100_000)
            .flat_map(|x| x.wrapping_mul(2_246_822_519).to_le_bytes())
            .collect::<Vec<_>>();

        let mut chunker = Chunker::new(48, 1_024);
        let cuts = boundaries(&mut chunker, &data, 1_024);

        let min = 1_024 - 1_024 / 16;
        let max = 1_024 + 1_024 / 16;

        for len in cuts {
            assert!(len >= min, "segment of {len} bytes under the minimum");
            assert!(len <= max, "segment of {len} bytes over the maximum");
        }
    }
}

//! Ring-buffer feeder that streams a [`WaveformTable`] into transmit transfers.

use std::ops::Range;

use crate::{FillStatus, Transfer, TxSource, WaveformTable};

/// Repeats a waveform table into every transfer, keeping phase across calls.
///
/// The read cursor persists between calls, so consecutive transfers form one continuous
/// stream: the concatenation of everything written is the table repeated end to end,
/// starting at offset 0.
#[derive(Debug)]
pub struct ToneFeeder {
    table: WaveformTable,
    cursor: usize,
}

impl ToneFeeder {
    /// Creates a feeder positioned at the start of `table`.
    pub fn new(table: WaveformTable) -> Self {
        Self { table, cursor: 0 }
    }

    /// Current read offset into the table, always less than the table length.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The table being streamed.
    pub fn table(&self) -> &WaveformTable {
        &self.table
    }

    /// Fills all of `out` with the next `out.len()` bytes of the repeating table.
    pub fn fill_bytes(&mut self, out: &mut [u8]) {
        let mut offset = 0;
        while offset < out.len() {
            let range = self.advance(out.len() - offset);
            let end = offset + range.len();
            out[offset..end].copy_from_slice(&self.table.as_bytes()[range]);
            offset = end;
        }
    }

    /// Takes up to `max` bytes from the cursor without crossing the end of the table.
    fn advance(&mut self, max: usize) -> Range<usize> {
        let len = self.table.len();
        let start = self.cursor;
        let chunk = max.min(len - start);
        self.cursor = (start + chunk) % len;
        start..start + chunk
    }
}

impl TxSource for ToneFeeder {
    fn fill(&mut self, transfer: &mut Transfer<'_>) -> FillStatus {
        while transfer.remaining() > 0 {
            let range = self.advance(transfer.remaining());
            transfer.extend_from_slice(&self.table.as_bytes()[range]);
        }
        FillStatus::Continue
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn feeder(rate: u32, tone: u32) -> ToneFeeder {
        ToneFeeder::new(WaveformTable::new(rate, tone).unwrap())
    }

    /// The table repeated forever, starting at offset 0.
    fn reference(table: &WaveformTable, len: usize) -> Vec<u8> {
        table.as_bytes().iter().copied().cycle().take(len).collect()
    }

    #[test]
    fn concatenated_fills_match_repeated_table() {
        let mut feeder = feeder(48_000, 1_000);
        let lengths = [1, 7, 191, 192, 193, 0, 1000, 384, 2, 5000];

        let mut written = Vec::new();
        for len in lengths {
            let mut out = vec![0xAA; len];
            feeder.fill_bytes(&mut out);
            written.extend_from_slice(&out);
        }

        let total: usize = lengths.iter().sum();
        assert_eq!(written.len(), total);
        assert_eq!(written, reference(feeder.table(), total));
        assert_eq!(feeder.cursor(), total % feeder.table().len());
    }

    #[test]
    fn full_table_fill_returns_cursor() {
        let mut feeder = feeder(8_000, 1_000);
        let len = feeder.table().len();

        let mut skip = vec![0; 5];
        feeder.fill_bytes(&mut skip);
        assert_eq!(feeder.cursor(), 5);

        let mut out = vec![0; len];
        feeder.fill_bytes(&mut out);
        assert_eq!(feeder.cursor(), 5);
    }

    #[test]
    fn zero_length_fill_is_a_no_op() {
        let mut feeder = feeder(8_000, 1_000);
        let mut skip = vec![0; 3];
        feeder.fill_bytes(&mut skip);

        feeder.fill_bytes(&mut []);
        assert_eq!(feeder.cursor(), 3);
    }

    #[test]
    fn eight_megasample_scenario() {
        let mut feeder = feeder(8_000_000, 1_000);
        assert_eq!(feeder.table().samples_per_cycle(), 8000);
        assert_eq!(feeder.table().len(), 32000);

        let mut written = Vec::new();
        for len in [5000, 30000, 2000] {
            let mut out = vec![0; len];
            feeder.fill_bytes(&mut out);
            written.extend_from_slice(&out);
        }

        let table = feeder.table().as_bytes();
        let mut expected = Vec::new();
        expected.extend_from_slice(&table[0..5000]);
        expected.extend_from_slice(&table[5000..32000]);
        expected.extend_from_slice(&table[0..5000]);

        assert_eq!(written.len(), 37000);
        assert_eq!(written, expected);
        assert_eq!(feeder.cursor(), 37000 % 32000);
        assert_eq!(feeder.cursor(), 5000);
    }

    #[test]
    fn transfers_continue_the_stream() {
        let mut feeder = feeder(8_000, 1_000);
        let mut written = Vec::new();
        let mut buf = Vec::new();

        for len in [40, 7, 0, 64] {
            let mut transfer = Transfer::new(&mut buf, len);
            assert_eq!(feeder.fill(&mut transfer), FillStatus::Continue);
            assert_eq!(transfer.remaining(), 0);
            written.extend_from_slice(&buf);
        }

        assert_eq!(written, reference(feeder.table(), 111));
        assert_eq!(feeder.cursor(), 111 % feeder.table().len());
    }
}

//! The MQ arithmetic decoder, described in Annex C.
//!
//! The decoder follows the software conventions of Annex G in
//! <https://www.itu.int/rec/T-REC-T.88-201808-I>, which keep the C-register
//! in complemented form.

/// The adaptive state of one context label.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Context {
    /// Index into the probability estimation table.
    index: u8,
    /// The most probable symbol.
    mps: u8,
}

impl Context {
    pub(crate) const fn new(index: u8) -> Self {
        Self { index, mps: 0 }
    }
}

pub(crate) struct ArithmeticDecoder<'a> {
    data: &'a [u8],
    /// The C-register (see Table C.1).
    c: u32,
    /// The A-register (see Table C.1).
    a: u32,
    /// The position of the current byte.
    position: usize,
    /// The number of bits left before a new byte needs to be read.
    shift_count: u32,
}

impl<'a> ArithmeticDecoder<'a> {
    /// The INITDEC procedure from C.3.5.
    pub(crate) fn new(data: &'a [u8]) -> Self {
        let mut decoder = Self {
            data,
            c: 0,
            a: 0,
            position: 0,
            shift_count: 0,
        };

        decoder.c = ((decoder.byte_at(0) as u32) ^ 0xFF) << 16;
        decoder.read_byte();
        decoder.c <<= 7;
        decoder.shift_count -= 7;
        decoder.a = 0x8000;

        decoder
    }

    /// Decode one bit with the given context (the DECODE procedure from C.3.2).
    #[inline(always)]
    pub(crate) fn read_bit(&mut self, context: &mut Context) -> u32 {
        let (qe, nmps, nlps, switch) = QE_TABLE[context.index as usize];
        let qe = qe as u32;

        self.a -= qe;

        let is_mps_path = (self.c >> 16) < self.a;

        if is_mps_path && self.a & 0x8000 != 0 {
            return context.mps as u32;
        }

        if !is_mps_path {
            self.c -= self.a << 16;
        }

        // The conditional exchange: if the sub-interval of the symbol that
        // was hit is smaller than the other one, the symbols swap roles.
        let takes_mps = (self.a < qe) != is_mps_path;

        let bit = if takes_mps {
            context.index = nmps;
            context.mps
        } else {
            let bit = 1 - context.mps;

            if switch {
                context.mps = 1 - context.mps;
            }

            context.index = nlps;
            bit
        };

        if !is_mps_path {
            self.a = qe;
        }

        self.renormalize();

        bit as u32
    }

    /// The BYTEIN procedure from C.3.4.
    #[inline(always)]
    fn read_byte(&mut self) {
        let current = self.byte_at(self.position);

        if current == 0xFF {
            if self.byte_at(self.position + 1) > 0x8F {
                // A marker, feed 1-bits from now on.
                self.shift_count = 8;
            } else {
                self.position += 1;
                self.c = self.c + 0xFE00 - ((self.byte_at(self.position) as u32) << 9);
                self.shift_count = 7;
            }
        } else {
            self.position += 1;
            self.c = self.c + 0xFF00 - ((self.byte_at(self.position) as u32) << 8);
            self.shift_count = 8;
        }
    }

    /// The RENORMD procedure from C.3.3.
    #[inline(always)]
    fn renormalize(&mut self) {
        loop {
            if self.shift_count == 0 {
                self.read_byte();
            }

            self.a <<= 1;
            self.c <<= 1;
            self.shift_count -= 1;

            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    /// Data past the end is treated as 0xFF (see D.4.1).
    #[inline(always)]
    fn byte_at(&self, position: usize) -> u8 {
        self.data.get(position).copied().unwrap_or(0xFF)
    }
}

/// Qe values with the next states after an MPS and an LPS, and whether
/// the MPS switches after an LPS (Table C.2).
#[rustfmt::skip]
static QE_TABLE: [(u16, u8, u8, bool); 47] = [
    (0x5601, 1, 1, true),
    (0x3401, 2, 6, false),
    (0x1801, 3, 9, false),
    (0x0AC1, 4, 12, false),
    (0x0521, 5, 29, false),
    (0x0221, 38, 33, false),
    (0x5601, 7, 6, true),
    (0x5401, 8, 14, false),
    (0x4801, 9, 14, false),
    (0x3801, 10, 14, false),
    (0x3001, 11, 17, false),
    (0x2401, 12, 18, false),
    (0x1C01, 13, 20, false),
    (0x1601, 29, 21, false),
    (0x5601, 15, 14, true),
    (0x5401, 16, 14, false),
    (0x5101, 17, 15, false),
    (0x4801, 18, 16, false),
    (0x3801, 19, 17, false),
    (0x3401, 20, 18, false),
    (0x3001, 21, 19, false),
    (0x2801, 22, 19, false),
    (0x2401, 23, 20, false),
    (0x2201, 24, 21, false),
    (0x1C01, 25, 22, false),
    (0x1801, 26, 23, false),
    (0x1601, 27, 24, false),
    (0x1401, 28, 25, false),
    (0x1201, 29, 26, false),
    (0x1101, 30, 27, false),
    (0x0AC1, 31, 28, false),
    (0x09C1, 32, 29, false),
    (0x08A1, 33, 30, false),
    (0x0521, 34, 31, false),
    (0x0441, 35, 32, false),
    (0x02A1, 36, 33, false),
    (0x0221, 37, 34, false),
    (0x0141, 38, 35, false),
    (0x0111, 39, 36, false),
    (0x0085, 40, 37, false),
    (0x0049, 41, 38, false),
    (0x0025, 42, 39, false),
    (0x0015, 43, 40, false),
    (0x0009, 44, 41, false),
    (0x0005, 45, 42, false),
    (0x0001, 45, 43, false),
    (0x5601, 46, 46, false),
];

#[cfg(test)]
mod tests {
    use super::*;

    // The test sequence from H.2 in https://www.itu.int/rec/T-REC-T.88-201808-I,
    // decoded with a single context.
    #[test]
    fn t88_test_sequence() {
        let input = [
            0x84, 0xC7, 0x3B, 0xFC, 0xE1, 0xA1, 0x43, 0x04, 0x02, 0x20, 0x00, 0x00, 0x41, 0x0D,
            0xBB, 0x86, 0xF4, 0x31, 0x7F, 0xFF, 0x88, 0xFF, 0x37, 0x47, 0x1A, 0xDB, 0x6A, 0xDF,
            0xFF, 0xAC,
        ];

        let expected = [
            0x00, 0x02, 0x00, 0x51, 0x00, 0x00, 0x00, 0xC0, 0x03, 0x52, 0x87, 0x2A, 0xAA, 0xAA,
            0xAA, 0xAA, 0x82, 0xC0, 0x20, 0x00, 0xFC, 0xD7, 0x9E, 0xF6, 0xBF, 0x7F, 0xED, 0x90,
            0x4F, 0x46, 0xA3, 0xBF,
        ];

        let mut decoder = ArithmeticDecoder::new(&input);
        let mut context = Context::default();

        let decoded = (0..expected.len())
            .map(|_| (0..8).fold(0_u8, |byte, _| (byte << 1) | decoder.read_bit(&mut context) as u8))
            .collect::<Vec<_>>();

        assert_eq!(decoded, expected);
    }

    #[test]
    fn empty_input_is_padded() {
        let mut decoder = ArithmeticDecoder::new(&[]);
        let mut context = Context::new(46);

        // Only checks that decoding past the end doesn't fail.
        for _ in 0..64 {
            assert!(decoder.read_bit(&mut context) <= 1);
        }
    }
}

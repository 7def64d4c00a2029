#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct IntRect {
    pub(crate) x0: u32,
    pub(crate) y0: u32,
    pub(crate) x1: u32,
    pub(crate) y1: u32,
}

impl IntRect {
    pub(crate) fn from_ltrb(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub(crate) fn width(&self) -> u32 {
        // See B-11.
        self.x1.saturating_sub(self.x0)
    }

    pub(crate) fn height(&self) -> u32 {
        // See B-11.
        self.y1.saturating_sub(self.y0)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub(crate) fn intersect(&self, other: Self) -> Self {
        let x0 = u32::max(self.x0, other.x0);
        let y0 = u32::max(self.y0, other.y0);

        Self::from_ltrb(
            x0,
            y0,
            u32::min(self.x1, other.x1).max(x0),
            u32::min(self.y1, other.y1).max(y0),
        )
    }

    /// Divide all coordinates by the given factors, rounding up (B-12).
    pub(crate) fn div_ceil(&self, x_factor: u32, y_factor: u32) -> Self {
        Self::from_ltrb(
            self.x0.div_ceil(x_factor),
            self.y0.div_ceil(y_factor),
            self.x1.div_ceil(x_factor),
            self.y1.div_ceil(y_factor),
        )
    }

    /// Divide all coordinates by `2^shift`, rounding up (B-14).
    pub(crate) fn shr_ceil(&self, shift: u32) -> Self {
        Self::from_ltrb(
            shr_ceil(self.x0, shift),
            shr_ceil(self.y0, shift),
            shr_ceil(self.x1, shift),
            shr_ceil(self.y1, shift),
        )
    }
}

/// `ceil(value / 2^shift)`, for shifts up to 32.
pub(crate) fn shr_ceil(value: u32, shift: u32) -> u32 {
    let divisor = 1_u64 << shift;

    (value as u64).div_ceil(divisor) as u32
}

/// `ceil(value / 2^shift - 0.5)`, the offset sub-band coordinate of B-15.
pub(crate) fn shr_ceil_half(value: u32, shift: u32) -> u32 {
    let divisor = 1_u64 << shift;
    let doubled = 2 * value as u64;

    if doubled <= divisor {
        0
    } else {
        (doubled - divisor).div_ceil(2 * divisor) as u32
    }
}

use crate::config::ChainParams;
use crate::crypto::Hash256;

/// 256-bit unsigned integer, little-endian limbs. Just enough arithmetic
/// for compact-target math and work accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct U256(pub [u64; 4]);

impl U256 {
    pub const ZERO: U256 = U256([0; 4]);
    pub const MAX: U256 = U256([u64::MAX; 4]);

    pub fn from_u64(value: u64) -> Self {
        U256([value, 0, 0, 0])
    }

    pub fn from_be_bytes(bytes: &[u8; 32]) -> Self {
        let mut limbs = [0u64; 4];
        for (i, chunk) in bytes.chunks_exact(8).enumerate() {
            let mut limb = [0u8; 8];
            limb.copy_from_slice(chunk);
            // chunk 0 is the most significant limb
            limbs[3 - i] = u64::from_be_bytes(limb);
        }
        U256(limbs)
    }

    pub fn to_be_bytes(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for i in 0..4 {
            out[i * 8..(i + 1) * 8].copy_from_slice(&self.0[3 - i].to_be_bytes());
        }
        out
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 4]
    }

    fn bit(&self, index: usize) -> bool {
        (self.0[index / 64] >> (index % 64)) & 1 == 1
    }

    fn set_bit(&mut self, index: usize) {
        self.0[index / 64] |= 1 << (index % 64);
    }

    /// Index of the highest set bit plus one, zero for zero.
    fn bit_length(&self) -> u32 {
        for i in (0..4).rev() {
            if self.0[i] != 0 {
                return (i as u32 + 1) * 64 - self.0[i].leading_zeros();
            }
        }
        0
    }

    fn not(self) -> U256 {
        U256([!self.0[0], !self.0[1], !self.0[2], !self.0[3]])
    }

    fn shl1(self) -> U256 {
        let mut out = [0u64; 4];
        let mut carry = 0u64;
        for i in 0..4 {
            out[i] = (self.0[i] << 1) | carry;
            carry = self.0[i] >> 63;
        }
        U256(out)
    }

    fn add_one(self) -> (U256, bool) {
        let mut out = self.0;
        for limb in out.iter_mut() {
            let (v, overflow) = limb.overflowing_add(1);
            *limb = v;
            if !overflow {
                return (U256(out), false);
            }
        }
        (U256(out), true)
    }

    fn sub(self, rhs: U256) -> U256 {
        let mut out = [0u64; 4];
        let mut borrow = 0u64;
        for i in 0..4 {
            let (v, b1) = self.0[i].overflowing_sub(rhs.0[i]);
            let (v, b2) = v.overflowing_sub(borrow);
            out[i] = v;
            borrow = (b1 || b2) as u64;
        }
        U256(out)
    }

    /// Widening multiply by a scalar. Returns the low 256 bits and the
    /// overflow limb.
    fn mul_u64(self, rhs: u64) -> (U256, u64) {
        let mut out = [0u64; 4];
        let mut carry: u128 = 0;
        for i in 0..4 {
            let v = self.0[i] as u128 * rhs as u128 + carry;
            out[i] = v as u64;
            carry = v >> 64;
        }
        (U256(out), carry as u64)
    }

    fn div_u64(self, rhs: u64) -> U256 {
        let mut out = [0u64; 4];
        let mut rem: u128 = 0;
        for i in (0..4).rev() {
            let v = (rem << 64) | self.0[i] as u128;
            out[i] = (v / rhs as u128) as u64;
            rem = v % rhs as u128;
        }
        U256(out)
    }

    /// Restoring long division. `divisor` must be non-zero.
    fn div(self, divisor: U256) -> U256 {
        debug_assert!(!divisor.is_zero());
        let mut quotient = U256::ZERO;
        let mut rem = U256::ZERO;
        for i in (0..self.bit_length() as usize).rev() {
            rem = rem.shl1();
            if self.bit(i) {
                rem.0[0] |= 1;
            }
            if rem >= divisor {
                rem = rem.sub(divisor);
                quotient.set_bit(i);
            }
        }
        quotient
    }

    pub fn to_u128_saturating(self) -> u128 {
        if self.0[2] != 0 || self.0[3] != 0 {
            return u128::MAX;
        }
        (self.0[1] as u128) << 64 | self.0[0] as u128
    }

    fn to_f64(self) -> f64 {
        self.0
            .iter()
            .enumerate()
            .map(|(i, limb)| *limb as f64 * 2f64.powi(64 * i as i32))
            .sum()
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        for i in (0..4).rev() {
            match self.0[i].cmp(&other.0[i]) {
                std::cmp::Ordering::Equal => continue,
                ord => return ord,
            }
        }
        std::cmp::Ordering::Equal
    }
}

/// Decode compact difficulty bits into a full target.
///
/// Returns `None` for a zero mantissa, the sign bit, or an exponent that
/// pushes the mantissa past 256 bits. Such bits never name a valid target.
pub fn bits_to_target(bits: u32) -> Option<U256> {
    let exponent = (bits >> 24) as usize;
    let mantissa = bits & 0x007f_ffff;

    if mantissa == 0 || bits & 0x0080_0000 != 0 {
        return None;
    }
    // Overflow when the mantissa's top byte would shift past byte 32.
    if exponent > 34
        || (exponent > 33 && mantissa > 0xff)
        || (exponent > 32 && mantissa > 0xffff)
    {
        return None;
    }

    if exponent <= 3 {
        Some(U256::from_u64((mantissa >> (8 * (3 - exponent))) as u64))
    } else {
        let mut bytes = [0u8; 32];
        let mantissa_bytes = mantissa.to_be_bytes();
        let top = 32 - exponent;
        bytes[top] = mantissa_bytes[1];
        bytes[top + 1] = mantissa_bytes[2];
        bytes[top + 2] = mantissa_bytes[3];
        Some(U256::from_be_bytes(&bytes))
    }
}

/// Encode a target in compact form, normalizing away the sign bit.
pub fn target_to_bits(target: U256) -> u32 {
    if target.is_zero() {
        return 0;
    }

    let bytes = target.to_be_bytes();
    let mut size = 32 - bytes.iter().position(|b| *b != 0).unwrap_or(32);

    let mut mantissa: u32 = if size <= 3 {
        let mut m = 0u32;
        for b in &bytes[32 - size..] {
            m = (m << 8) | *b as u32;
        }
        m << (8 * (3 - size))
    } else {
        let top = 32 - size;
        (bytes[top] as u32) << 16 | (bytes[top + 1] as u32) << 8 | bytes[top + 2] as u32
    };

    // The high mantissa bit is the sign bit in compact encoding.
    if mantissa & 0x0080_0000 != 0 {
        mantissa >>= 8;
        size += 1;
    }

    mantissa | (size as u32) << 24
}

/// Proof-of-work check: the header hash, read as a big-endian integer,
/// must not exceed the target the bits encode.
pub fn meets_target(hash: &Hash256, bits: u32) -> bool {
    match bits_to_target(bits) {
        Some(target) => U256::from_be_bytes(hash.as_bytes()) <= target,
        None => false,
    }
}

/// Expected hash attempts to find a block at this target: 2^256 / (target + 1).
pub fn work_for_target(target: U256) -> U256 {
    if target == U256::MAX {
        return U256::from_u64(1);
    }
    let (divisor, _) = target.add_one();
    // 2^256 / (t+1)  ==  (~t / (t+1)) + 1
    let (work, _) = target.not().div(divisor).add_one();
    work
}

/// Work the bits encode, folded to u128 for cumulative accounting.
/// Saturates far beyond any reachable difficulty.
pub fn work_for_bits(bits: u32) -> u128 {
    match bits_to_target(bits) {
        Some(target) => work_for_target(target).to_u128_saturating(),
        None => 0,
    }
}

/// Retarget schedule: every `retarget_interval` blocks the target is
/// rescaled by the observed timespan of the completed window, clamped to
/// 4x in either direction and floored at the chain's minimum difficulty.
#[derive(Debug, Clone)]
pub struct DifficultyCalculator {
    pub target_spacing: u64,
    pub retarget_interval: u64,
    pub pow_limit_bits: u32,
}

impl DifficultyCalculator {
    pub fn new(target_spacing: u64, retarget_interval: u64, pow_limit_bits: u32) -> Self {
        Self {
            target_spacing,
            retarget_interval,
            pow_limit_bits,
        }
    }

    pub fn from_params(params: &ChainParams) -> Self {
        Self::new(
            params.target_spacing,
            params.retarget_interval,
            params.pow_limit_bits,
        )
    }

    pub fn expected_timespan(&self) -> u64 {
        self.target_spacing * self.retarget_interval
    }

    /// Heights whose header must carry freshly retargeted bits.
    pub fn is_retarget_height(&self, height: u64) -> bool {
        height > 0 && height % self.retarget_interval == 0
    }

    /// Compute the bits for the interval that starts after a completed
    /// window spanning `first_timestamp..last_timestamp`.
    pub fn next_bits(&self, prev_bits: u32, first_timestamp: u64, last_timestamp: u64) -> u32 {
        let expected = self.expected_timespan();
        let actual = last_timestamp.saturating_sub(first_timestamp).max(1);
        let clamped = actual.clamp(expected / 4, expected * 4);

        let pow_limit = match bits_to_target(self.pow_limit_bits) {
            Some(limit) => limit,
            None => return self.pow_limit_bits,
        };
        let prev_target = match bits_to_target(prev_bits) {
            Some(target) => target,
            None => return self.pow_limit_bits,
        };

        // new = prev * clamped / expected, saturating at the pow limit.
        // Near the pow limit the multiply can overflow 256 bits; dividing
        // first loses only bits the compact encoding drops anyway.
        let (scaled, carry) = prev_target.mul_u64(clamped);
        let mut new_target = if carry == 0 {
            scaled.div_u64(expected)
        } else {
            let (alt, alt_carry) = prev_target.div_u64(expected).mul_u64(clamped);
            if alt_carry != 0 {
                pow_limit
            } else {
                alt
            }
        };
        if new_target > pow_limit {
            new_target = pow_limit;
        }
        if new_target.is_zero() {
            new_target = U256::from_u64(1);
        }

        let new_bits = target_to_bits(new_target);
        log::debug!(
            "🔧 Retarget: bits {:#010x} -> {:#010x} (actual {}s, expected {}s)",
            prev_bits,
            new_bits,
            actual,
            expected
        );
        new_bits
    }

    /// Difficulty relative to the chain's minimum, for display.
    pub fn difficulty_ratio(&self, bits: u32) -> f64 {
        let limit = match bits_to_target(self.pow_limit_bits) {
            Some(t) => t.to_f64(),
            None => return 0.0,
        };
        let current = match bits_to_target(bits) {
            Some(t) if !t.is_zero() => t.to_f64(),
            _ => return 0.0,
        };
        limit / current
    }
}

use tessera_buffer::ByteBuffer;
use tessera_error::{TesseraResult, tessera_bail, tessera_err};

/// Number of bits needed to store every dictId of a dictionary with `cardinality` entries.
///
/// Always at least one bit, so a single-entry dictionary still has addressable entries.
pub fn num_bits_per_value(cardinality: usize) -> u8 {
    if cardinality <= 2 {
        return 1;
    }
    (usize::BITS - (cardinality - 1).leading_zeros()) as u8
}

/// Validate a bit width read from metadata or configuration.
pub fn check_bit_width(bits: u8) -> TesseraResult<u8> {
    if bits == 0 || bits > 32 {
        tessera_bail!("bits per element must be in 1..=32, got {}", bits);
    }
    Ok(bits)
}

/// Bytes needed to pack `num_values` entries of `bits` bits each.
#[inline]
pub const fn packed_len(num_values: usize, bits: u8) -> usize {
    (num_values * bits as usize).div_ceil(8)
}

/// Packs `u32` values LSB-first into a growing byte vector.
pub struct BitPacker {
    bits: u8,
    max_value: u64,
    acc: u64,
    acc_bits: u32,
    out: Vec<u8>,
    len: usize,
}

impl BitPacker {
    pub fn new(bits: u8) -> TesseraResult<Self> {
        let bits = check_bit_width(bits)?;
        Ok(Self {
            bits,
            max_value: (1u64 << bits) - 1,
            acc: 0,
            acc_bits: 0,
            out: Vec::new(),
            len: 0,
        })
    }

    pub fn with_capacity(bits: u8, num_values: usize) -> TesseraResult<Self> {
        let mut packer = Self::new(bits)?;
        packer.out.reserve_exact(packed_len(num_values, bits));
        Ok(packer)
    }

    #[inline]
    pub fn push(&mut self, value: u32) -> TesseraResult<()> {
        if u64::from(value) > self.max_value {
            tessera_bail!("value {} does not fit in {} bits", value, self.bits);
        }
        self.acc |= u64::from(value) << self.acc_bits;
        self.acc_bits += u32::from(self.bits);
        while self.acc_bits >= 8 {
            self.out.push(self.acc as u8);
            self.acc >>= 8;
            self.acc_bits -= 8;
        }
        self.len += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finish(mut self) -> Vec<u8> {
        if self.acc_bits > 0 {
            self.out.push(self.acc as u8);
        }
        self.out
    }
}

/// Random access over a packed region written by [`BitPacker`].
#[derive(Debug, Clone)]
pub struct BitUnpacker {
    bits: u8,
    mask: u64,
    len: usize,
    packed: ByteBuffer,
}

impl BitUnpacker {
    /// Wrap a packed region of `len` entries, rejecting regions too short to hold them.
    pub fn try_new(packed: ByteBuffer, bits: u8, len: usize) -> TesseraResult<Self> {
        let bits = check_bit_width(bits)?;
        let expected = packed_len(len, bits);
        if packed.len() < expected {
            tessera_bail!(
                InvalidSerde: "packed region truncated: {} entries of {} bits need {} bytes, found {}",
                len,
                bits,
                expected,
                packed.len()
            );
        }
        Ok(Self {
            bits,
            mask: (1u64 << bits) - 1,
            len,
            packed,
        })
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the entry at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> TesseraResult<u32> {
        if index >= self.len {
            return Err(tessera_err!(OutOfBounds: index, 0, self.len));
        }
        Ok(self.get_unchecked(index))
    }

    /// Read `out.len()` consecutive entries starting at `start`.
    pub fn get_range(&self, start: usize, out: &mut [u32]) -> TesseraResult<()> {
        let end = start + out.len();
        if end > self.len {
            return Err(tessera_err!(OutOfBounds: end, 0, self.len));
        }
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.get_unchecked(start + i);
        }
        Ok(())
    }

    /// Reads an 8-byte little-endian window so any entry of up to 32 bits is covered after
    /// shifting by at most 7 bits.
    #[inline]
    fn get_unchecked(&self, index: usize) -> u32 {
        let bit = index * self.bits as usize;
        let byte = bit / 8;
        let shift = bit % 8;
        let bytes = self.packed.as_slice();
        let mut window = [0u8; 8];
        let available = bytes.len().saturating_sub(byte).min(8);
        window[..available].copy_from_slice(&bytes[byte..byte + available]);
        ((u64::from_le_bytes(window) >> shift) & self.mask) as u32
    }
}

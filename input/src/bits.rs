use serde::{Deserialize, Serialize};

/// Fixed-size little-endian bitmask, laid out the way evdev fills `EVIOCGBIT`
/// and `EVIOCGPROP` buffers: bit `n` lives in byte `n / 8` at position `n % 8`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitSet<const N: usize>(#[serde(with = "bytes")] [u8; N]);

impl<const N: usize> BitSet<N> {
    pub const BITS: usize = N * 8;

    pub const fn new() -> Self {
        BitSet([0; N])
    }

    pub const fn from_bytes(bytes: [u8; N]) -> Self {
        BitSet(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8; N] {
        &mut self.0
    }

    /// Out of range bits are never set.
    pub fn test(&self, bit: usize) -> bool {
        bit < Self::BITS && self.0[bit / 8] & (1 << (bit % 8)) != 0
    }

    pub fn set(&mut self, bit: usize) {
        if bit < Self::BITS {
            self.0[bit / 8] |= 1 << (bit % 8);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }

    /// Indices of set bits, ascending.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..Self::BITS).filter(move |bit| self.test(*bit))
    }
}

impl<const N: usize> Default for BitSet<N> {
    fn default() -> Self {
        Self::new()
    }
}

// serde only derives arrays up to 32 elements, and the code bitmask is larger.
mod bytes {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        value: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        let len = bytes.len();
        bytes
            .try_into()
            .map_err(|_| D::Error::invalid_length(len, &"a fixed size bitmask"))
    }
}

use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use tessera_error::{TesseraResult, tessera_err};

const ZSTD_LEVEL: i32 = 3;

/// Codec applied to each chunk of a raw forward index.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkCompressionType {
    PassThrough = 0,
    #[default]
    Lz4 = 1,
    Zstd = 2,
}

impl ChunkCompressionType {
    pub fn compress(&self, chunk: &[u8]) -> TesseraResult<Vec<u8>> {
        match self {
            Self::PassThrough => Ok(chunk.to_vec()),
            Self::Lz4 => Ok(lz4_flex::compress_prepend_size(chunk)),
            Self::Zstd => zstd::bulk::compress(chunk, ZSTD_LEVEL).map_err(|e| e.into()),
        }
    }

    /// Decompress `chunk` into `out`, replacing its contents.
    pub fn decompress_into(&self, chunk: &[u8], out: &mut Vec<u8>) -> TesseraResult<()> {
        out.clear();
        match self {
            Self::PassThrough => out.extend_from_slice(chunk),
            Self::Lz4 => {
                *out = lz4_flex::decompress_size_prepended(chunk)
                    .map_err(|e| tessera_err!(InvalidSerde: "lz4 chunk corrupt: {}", e))?;
            }
            Self::Zstd => {
                *out = zstd::stream::decode_all(chunk)
                    .map_err(|e| tessera_err!(InvalidSerde: "zstd chunk corrupt: {}", e))?;
            }
        }
        Ok(())
    }
}

impl Display for ChunkCompressionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PassThrough => write!(f, "PASS_THROUGH"),
            Self::Lz4 => write!(f, "LZ4"),
            Self::Zstd => write!(f, "ZSTD"),
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use crate::ChunkCompressionType;

    #[rstest]
    #[case(ChunkCompressionType::PassThrough)]
    #[case(ChunkCompressionType::Lz4)]
    #[case(ChunkCompressionType::Zstd)]
    fn codec_round_trip(#[case] codec: ChunkCompressionType) {
        let data: Vec<u8> = (0..4096u32).flat_map(|i| (i % 17).to_le_bytes()).collect();
        let compressed = codec.compress(&data).unwrap();
        let mut out = vec![1, 2, 3];
        codec.decompress_into(&compressed, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn corrupt_lz4_rejected() {
        let mut out = Vec::new();
        assert!(
            ChunkCompressionType::Lz4
                .decompress_into(&[0xff, 0xff, 0xff, 0x7f, 1], &mut out)
                .is_err()
        );
    }

    #[test]
    fn serde_names() {
        assert_eq!(
            serde_json::to_string(&ChunkCompressionType::PassThrough).unwrap(),
            "\"PASS_THROUGH\""
        );
        assert_eq!(ChunkCompressionType::default(), ChunkCompressionType::Lz4);
    }
}

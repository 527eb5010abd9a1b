//! 페이로드 압축
//!
//! 송신측은 압축 결과가 원본보다 작을 때만 사용함.
//! 수신측은 압축 해제 실패 시 raw deflate로 몇 가지 바이트 오프셋을 다시 시도함.

use std::io::{Read, Write};

use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::debug;

use crate::{Error, Result};

/// raw inflate 재시도 오프셋
pub const FALLBACK_OFFSETS: [usize; 6] = [0, 2, 4, 6, 8, 10];

/// 압축기 인터페이스
pub trait Compressor: Send + Sync {
    /// 압축
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// 압축 해제
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// 정상 해제 실패 후 대체 경로 (없으면 None)
    fn decompress_fallback(&self, _data: &[u8]) -> Option<Vec<u8>> {
        None
    }
}

/// 해제 → 실패 시 대체 경로
pub fn decompress_with_fallback(compressor: &dyn Compressor, data: &[u8]) -> Result<Vec<u8>> {
    match compressor.decompress(data) {
        Ok(out) => Ok(out),
        Err(err) => {
            debug!("압축 해제 실패, 대체 경로 시도: {}", err);
            compressor.decompress_fallback(data).ok_or(err)
        }
    }
}

/// CRC32 (IEEE)
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// zlib 압축기
#[derive(Debug, Clone, Copy)]
pub struct DeflateCompressor {
    level: Compression,
}

impl DeflateCompressor {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for DeflateCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Compressor for DeflateCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), self.level);
        encoder
            .write_all(data)
            .map_err(|e| Error::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| Error::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 2);
        ZlibDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| Error::Decompression(e.to_string()))?;
        Ok(out)
    }

    fn decompress_fallback(&self, data: &[u8]) -> Option<Vec<u8>> {
        for offset in FALLBACK_OFFSETS {
            if offset > 0 && data.len() <= offset {
                continue;
            }

            let mut out = Vec::new();
            if DeflateDecoder::new(&data[offset..])
                .read_to_end(&mut out)
                .is_ok()
            {
                debug!("raw inflate 성공 (offset={})", offset);
                return Some(out);
            }
        }

        debug!("모든 압축 해제 경로 실패");
        None
    }
}

/// 무압축 (압축 결과가 항상 원본보다 크므로 송신측은 원본을 그대로 보냄)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() + 1);
        out.extend_from_slice(data);
        out.push(0);
        Ok(out)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match data.split_last() {
            Some((0, rest)) => Ok(rest.to_vec()),
            _ => Err(Error::Decompression("무압축 표식 없음".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::DeflateEncoder;

    #[test]
    fn test_crc32_known_vectors() {
        assert_eq!(crc32(b""), 0);
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_deflate_shrinks_repetitive_data() {
        let compressor = DeflateCompressor::default();
        let data = b"hello qrbt ".repeat(200);
        let compressed = compressor.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(compressor.decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_raw_inflate_fallback_with_offset() {
        let data = b"raw deflate stream ".repeat(50);
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&data).unwrap();
        let raw = encoder.finish().unwrap();

        // 앞에 4바이트 쓰레기가 붙은 raw 스트림
        let mut framed = vec![0xFF, 0xFF, 0xFF, 0xFF];
        framed.extend_from_slice(&raw);

        let compressor = DeflateCompressor::default();
        assert!(compressor.decompress(&framed).is_err());
        assert_eq!(decompress_with_fallback(&compressor, &framed).unwrap(), data);
    }

    #[test]
    fn test_fallback_gives_up_on_garbage() {
        let compressor = DeflateCompressor::default();
        let garbage = [0xFFu8; 3];
        assert!(matches!(
            decompress_with_fallback(&compressor, &garbage),
            Err(Error::Decompression(_))
        ));
    }

    #[test]
    fn test_noop_never_shrinks() {
        let compressor = NoopCompressor;
        let data = b"abc";
        let compressed = compressor.compress(data).unwrap();
        assert!(compressed.len() > data.len());
        assert_eq!(compressor.decompress(&compressed).unwrap(), data);
        assert!(compressor.decompress(b"").is_err());
    }
}

//! 프레임 정의 및 바이너리 코덱
//!
//! 모든 정수는 big-endian. 고정 16바이트 헤더 + 페이로드.
//!
//! ```text
//! 0..4   magic "QRBT"
//! 4..8   session_id u32
//! 8..10  type u16 (1=Metadata, 2=Source, 3=Trailer, 4=Fountain)
//! 10..12 index u16
//! 12..14 total u16
//! 14..16 length u16
//! 16..   payload
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, FOUNTAIN_HEADER_LEN, HEADER_LEN, MAGIC};

/// 프레임 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FrameType {
    /// 파일 메타데이터 (JSON)
    Metadata = 1,

    /// 소스 청크
    Source = 2,

    /// 스트림 종료 신호
    Trailer = 3,

    /// fountain 청크
    Fountain = 4,
}

impl FrameType {
    /// 와이어 값에서 변환
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FrameType::Metadata),
            2 => Some(FrameType::Source),
            3 => Some(FrameType::Trailer),
            4 => Some(FrameType::Fountain),
            _ => None,
        }
    }
}

/// 광학 채널을 건너는 프레임 단위
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 세션 ID
    pub session_id: u32,

    /// 프레임 타입
    pub frame_type: FrameType,

    /// 프레임 인덱스 (Source: 청크 인덱스, Fountain: 생성 순번)
    pub index: u16,

    /// 총 소스 청크 수 K
    pub total: u16,

    /// 페이로드
    pub payload: Bytes,
}

impl Frame {
    pub fn new(session_id: u32, frame_type: FrameType, index: u16, total: u16, payload: Bytes) -> Self {
        Self {
            session_id,
            frame_type,
            index,
            total,
            payload,
        }
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Result<Bytes> {
        let len = self.payload.len();
        if len > u16::MAX as usize {
            return Err(Error::PayloadTooLarge {
                len,
                max: u16::MAX as usize,
            });
        }

        let mut buf = BytesMut::with_capacity(HEADER_LEN + len);
        buf.put_slice(&MAGIC);
        buf.put_u32(self.session_id);
        buf.put_u16(self.frame_type as u16);
        buf.put_u16(self.index);
        buf.put_u16(self.total);
        buf.put_u16(len as u16);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// 바이트에서 역직렬화
    ///
    /// 실패는 "프로토콜 프레임이 아님"을 뜻함. 채널에는 오인식 노이즈가 섞여 있으므로
    /// 호출자는 치명적 에러로 취급하면 안 됨.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::FrameTooShort {
                len: bytes.len(),
                min: HEADER_LEN,
            });
        }

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != MAGIC {
            return Err(Error::InvalidMagic { got: magic });
        }

        let session_id = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let raw_type = u16::from_be_bytes([bytes[8], bytes[9]]);
        let index = u16::from_be_bytes([bytes[10], bytes[11]]);
        let total = u16::from_be_bytes([bytes[12], bytes[13]]);
        let len = u16::from_be_bytes([bytes[14], bytes[15]]) as usize;

        let frame_type = FrameType::from_u16(raw_type).ok_or(Error::UnknownFrameType(raw_type))?;

        let available = bytes.len() - HEADER_LEN;
        if available < len {
            return Err(Error::PayloadTruncated {
                declared: len,
                available,
            });
        }

        Ok(Self {
            session_id,
            frame_type,
            index,
            total,
            payload: Bytes::copy_from_slice(&bytes[HEADER_LEN..HEADER_LEN + len]),
        })
    }
}

fn default_soliton_c() -> f64 {
    0.03
}

fn default_soliton_delta() -> f64 {
    0.05
}

/// 파일 메타데이터 (Metadata 프레임의 JSON 페이로드)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// 파일 이름
    pub name: String,

    /// 압축 여부
    pub compressed: bool,

    /// 원본 크기
    pub original_size: u64,

    /// 전송 페이로드 크기 (압축 후, 비압축이면 원본 크기)
    pub compressed_size: u64,

    /// 총 소스 청크 수 K
    pub total_chunks: u32,

    /// 청크 크기
    pub chunk_size: u32,

    /// 원본 CRC32
    pub original_crc: u32,

    /// 전송 페이로드 CRC32
    pub compressed_crc: u32,

    /// fountain 코덱 버전 (0이면 fountain 미지원 송신자)
    #[serde(default)]
    pub lt_version: u32,

    /// soliton c
    #[serde(default = "default_soliton_c")]
    pub c: f64,

    /// soliton delta
    #[serde(default = "default_soliton_delta")]
    pub delta: f64,
}

impl Metadata {
    /// JSON 페이로드로 직렬화
    pub fn to_payload(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// JSON 페이로드에서 역직렬화
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// 청크 배치와 크기 필드가 서로 맞는지 검사
    ///
    /// `(K-1)*chunk_size < compressedSize <= K*chunk_size` 이어야 하고,
    /// 비압축이면 원본 크기와 같고 압축이면 원본보다 작아야 함.
    pub fn validate(&self, max_chunk_size: usize, max_original_size: u64) -> Result<()> {
        if self.total_chunks == 0 {
            return Err(Error::InvalidMetadata("totalChunks=0".into()));
        }
        if self.chunk_size == 0 || self.chunk_size as usize > max_chunk_size {
            return Err(Error::InvalidMetadata(format!(
                "chunkSize={} (최대 {})",
                self.chunk_size, max_chunk_size
            )));
        }

        let k = u64::from(self.total_chunks);
        let chunk_size = u64::from(self.chunk_size);
        let bounds = (k - 1)
            .checked_mul(chunk_size)
            .zip(k.checked_mul(chunk_size));
        match bounds {
            Some((lower, upper)) if self.compressed_size > lower && self.compressed_size <= upper => {}
            _ => {
                return Err(Error::InvalidMetadata(format!(
                    "compressedSize={}가 {}x{} 청크와 맞지 않음",
                    self.compressed_size, self.total_chunks, self.chunk_size
                )))
            }
        }

        let size_ok = if self.compressed {
            self.original_size > self.compressed_size
        } else {
            self.original_size == self.compressed_size
        };
        if !size_ok || self.original_size > max_original_size {
            return Err(Error::InvalidMetadata(format!(
                "originalSize={} (compressedSize={}, compressed={})",
                self.original_size, self.compressed_size, self.compressed
            )));
        }
        Ok(())
    }

    /// 송신 측 soliton 파라미터가 사용 가능한지
    pub fn soliton_params_valid(&self) -> bool {
        self.c > 0.0 && self.delta > 0.0 && self.delta < 1.0
    }
}

/// fountain 프레임 페이로드
///
/// `seed:u32 | degree:u16 | indicesLength:u16 | data`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FountainPayload {
    pub seed: u32,
    pub degree: u16,
    /// 참고용 (인덱스는 seed에서 재계산)
    pub indices_len: u16,
    pub data: Bytes,
}

impl FountainPayload {
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FOUNTAIN_HEADER_LEN + self.data.len());
        buf.put_u32(self.seed);
        buf.put_u16(self.degree);
        buf.put_u16(self.indices_len);
        buf.put_slice(&self.data);
        buf.freeze()
    }

    pub fn from_bytes(bytes: &Bytes) -> Result<Self> {
        if bytes.len() < FOUNTAIN_HEADER_LEN {
            return Err(Error::FountainPayloadTooShort { len: bytes.len() });
        }

        Ok(Self {
            seed: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            degree: u16::from_be_bytes([bytes[4], bytes[5]]),
            indices_len: u16::from_be_bytes([bytes[6], bytes[7]]),
            data: bytes.slice(FOUNTAIN_HEADER_LEN..),
        })
    }
}

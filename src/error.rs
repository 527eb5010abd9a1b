//! 에러 타입 정의

use thiserror::Error;

/// QRBT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("메타데이터 직렬화 에러: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("프레임 길이 부족: {len} bytes (최소 {min} bytes)")]
    FrameTooShort { len: usize, min: usize },

    #[error("유효하지 않은 매직: {got:02X?}")]
    InvalidMagic { got: [u8; 4] },

    #[error("알 수 없는 프레임 타입: {0}")]
    UnknownFrameType(u16),

    #[error("페이로드 잘림: 선언 {declared} bytes, 실제 {available} bytes")]
    PayloadTruncated { declared: usize, available: usize },

    #[error("페이로드 초과: {len} bytes (최대 {max} bytes)")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("필드 범위 초과: {field}={value}")]
    FieldOverflow { field: &'static str, value: usize },

    #[error("fountain 페이로드 길이 부족: {len} bytes")]
    FountainPayloadTooShort { len: usize },

    #[error("degree 불일치: seed={seed:08X}, declared={declared}, expected={expected}")]
    DegreeMismatch {
        seed: u32,
        declared: u16,
        expected: usize,
    },

    #[error("메타데이터 불일치: {0}")]
    InvalidMetadata(String),

    #[error("Latin-1 범위 밖 문자: U+{0:04X}")]
    NonLatin1Symbol(u32),

    #[error("파일 크기 초과: {size} bytes (최대 {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    #[error("빈 페이로드는 전송할 수 없음")]
    EmptyPayload,

    #[error("압축 실패: {0}")]
    Compression(String),

    #[error("압축 해제 실패: {0}")]
    Decompression(String),

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("잘못된 세션 상태: {0}")]
    InvalidState(&'static str),

    #[error("캡처 소스 사용 불가: {0}")]
    CaptureUnavailable(String),

    #[error("채널 에러")]
    ChannelError,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;

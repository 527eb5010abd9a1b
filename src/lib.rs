//! # QRBT (QR Binary Transfer)
//!
//! 화면에 표시되는 바코드 프레임 시퀀스를 통한 단방향 바이너리 전송 프로토콜
//!
//! ## 핵심 특징
//! - **백채널 없음**: 수신자는 ACK/NACK 없이 프레임을 스캔만 함
//! - **LT fountain 코드**: seed 하나로 조합 인덱스를 재현, 인덱스 목록은 전송하지 않음
//! - **Peeling + GF(2) 소거**: degree-1 조각으로 선형 시간 복구, 남은 조각은 가우스 소거
//! - **무한 fountain**: 한 바퀴 이후 새로운 seed로 중복 프레임을 계속 생성
//! - **단일 writer**: 청크 테이블은 스캔 루프 태스크 하나만 수정

pub mod channel;
pub mod chunk;
pub mod compress;
pub mod config;
pub mod elimination;
pub mod error;
pub mod events;
pub mod fountain;
pub mod frame;
pub mod peeling;
pub mod prng;
pub mod receiver;
pub mod sender;
pub mod soliton;
pub mod stats;

pub use chunk::{ChunkLayout, ChunkSplitter, ChunkTable};
pub use compress::{Compressor, DeflateCompressor, NoopCompressor};
pub use config::Config;
pub use error::{Error, Result};
pub use events::{RecordingEvents, SessionEvents, TracingEvents};
pub use fountain::FountainChunk;
pub use frame::{FountainPayload, Frame, FrameType, Metadata};
pub use prng::SeededRng;
pub use receiver::{FrameOutcome, Receiver, ReceiverState, ResultKind, ScanLoop, TransferResult};
pub use sender::{SendLoop, Sender, SenderCmd, SenderState};
pub use soliton::SolitonDistribution;
pub use stats::{ReceiveStats, SendStats};

/// fountain 코덱 버전 (메타데이터 `ltVersion`)
pub const CODEC_VERSION: u32 = 1;

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 800;

/// 프레임 매직 ("QRBT")
pub const MAGIC: [u8; 4] = *b"QRBT";

/// 고정 프레임 헤더 길이
pub const HEADER_LEN: usize = 16;

/// fountain 페이로드 헤더 길이 (seed + degree + indicesLength)
pub const FOUNTAIN_HEADER_LEN: usize = 8;

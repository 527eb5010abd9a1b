//! 수신자
//!
//! - 첫 프레임의 세션 ID에 고정, 다른 세션 프레임은 무시
//! - 새 청크가 들어올 때마다 peeling, 트레일러 관측 시 가우스 소거
//! - 모든 청크 + 메타데이터가 모이면 조합, CRC 확인, 압축 해제, 결과 분류
//!
//! 청크 테이블은 스캔 루프 태스크 하나만 수정함. 속도 타이머는 바이트 카운터만 읽음.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{latin1_encode, BarcodeReader, CaptureSource};
use crate::chunk::{ChunkLayout, ChunkTable};
use crate::compress::{crc32, decompress_with_fallback, Compressor};
use crate::elimination::{self, EliminationOutcome};
use crate::events::SessionEvents;
use crate::fountain::FountainChunk;
use crate::frame::{FountainPayload, Frame, FrameType, Metadata};
use crate::peeling;
use crate::soliton::SolitonDistribution;
use crate::stats::{ByteCounter, ReceiveStats, ThroughputMeter};
use crate::config::MAX_CHUNK_SIZE;
use crate::{Config, Error, Result};

/// 기본 저장 파일 이름
pub const DEFAULT_FILE_NAME: &str = "received_file";

/// 수신 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    Scanning,
    TrailerObserved,
    /// 트레일러 이후에도 누락 청크가 남음 (프레임은 계속 받음)
    Incomplete,
    Finalizing,
    Done,
}

/// 프레임 하나의 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// 프로토콜 프레임이 아님
    Noise,

    /// 수신 중이 아님
    Inactive,

    /// 다른 세션
    ForeignSession,

    Duplicate,

    Accepted,

    /// 프로토콜 프레임이지만 적용하지 않음
    Rejected,

    /// 이 프레임으로 전송 완료
    Completed,
}

/// 결과 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Text,
    Image,
    Document,
    Download,
}

impl ResultKind {
    /// 파일 확장자로 분류
    pub fn from_name(name: &str) -> Self {
        let ext = match name.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return ResultKind::Download,
        };

        match ext.as_str() {
            "txt" | "csv" | "json" | "log" | "md" | "html" | "css" | "js" => ResultKind::Text,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "svg" => ResultKind::Image,
            "pdf" => ResultKind::Document,
            _ => ResultKind::Download,
        }
    }
}

/// 수신 완료 결과
#[derive(Debug, Clone, PartialEq)]
pub struct TransferResult {
    pub name: String,
    pub kind: ResultKind,
    pub data: Bytes,

    /// 전송 페이로드 CRC 일치 여부
    pub compressed_crc_ok: bool,

    /// 원본 CRC 일치 여부
    pub original_crc_ok: bool,
}

impl TransferResult {
    /// 결과 표시용 상태 문자열
    pub fn status_text(&self) -> String {
        match self.kind {
            ResultKind::Text => format!("Text file: {}", self.name),
            ResultKind::Image => format!("Image: {}", self.name),
            ResultKind::Document => format!("PDF: {}", self.name),
            ResultKind::Download => format!("Downloaded: {}", self.name),
        }
    }
}

/// 수신자 (프레임 구동, I/O 없음)
pub struct Receiver {
    config: Config,
    compressor: Box<dyn Compressor>,
    events: Arc<dyn SessionEvents>,
    state: ReceiverState,

    /// false면 모든 프레임을 무시 (정지 이후 도착한 프레임 차단)
    active: bool,

    session_id: Option<u32>,
    table: ChunkTable,
    metadata: Option<Metadata>,
    distribution: Option<SolitonDistribution>,
    trailer_seen: bool,

    /// 마지막으로 실패한 소거 시도 시점의 테이블 revision
    failed_revision: Option<u64>,

    waiting_metadata_reported: bool,
    result: Option<TransferResult>,
    stats: ReceiveStats,
    bytes: ByteCounter,
    meter: ThroughputMeter,
}

impl Receiver {
    pub fn new(config: Config, compressor: Box<dyn Compressor>, events: Arc<dyn SessionEvents>) -> Self {
        let bytes = ByteCounter::new();
        Self {
            config,
            compressor,
            events,
            state: ReceiverState::Idle,
            active: false,
            session_id: None,
            table: ChunkTable::new(),
            metadata: None,
            distribution: None,
            trailer_seen: false,
            failed_revision: None,
            waiting_metadata_reported: false,
            result: None,
            stats: ReceiveStats::new(),
            meter: ThroughputMeter::new(bytes.clone()),
            bytes,
        }
    }

    /// 스캔 시작
    pub fn start(&mut self) {
        self.reset();
        self.active = true;
        self.state = ReceiverState::Scanning;
        self.meter.restart();
        self.events.on_status("Scanning...");
    }

    /// 세션 상태 초기화 (활성 여부는 유지)
    pub fn reset(&mut self) {
        self.session_id = None;
        self.table.clear();
        self.metadata = None;
        self.distribution = None;
        self.trailer_seen = false;
        self.failed_revision = None;
        self.waiting_metadata_reported = false;
        self.result = None;
        self.stats = ReceiveStats::new();
        self.bytes.reset();
        self.meter.restart();
        self.state = if self.active {
            ReceiverState::Scanning
        } else {
            ReceiverState::Idle
        };
    }

    /// 정지 (이후 프레임은 상태를 바꾸지 않음)
    pub fn stop(&mut self) {
        if self.active {
            info!("수신 정지: {}", self.stats.summary());
        }
        self.active = false;
        if matches!(
            self.state,
            ReceiverState::Scanning | ReceiverState::TrailerObserved
        ) {
            self.state = ReceiverState::Idle;
        }
    }

    /// 바코드 리더가 돌려준 문자열 처리
    pub fn handle_scan(&mut self, text: &str) -> FrameOutcome {
        if !self.is_active() {
            return FrameOutcome::Inactive;
        }
        match latin1_encode(text) {
            Some(bytes) => self.handle_frame_bytes(&bytes),
            None => {
                self.stats.noise_frames += 1;
                FrameOutcome::Noise
            }
        }
    }

    /// 프레임 바이트 처리
    ///
    /// 어떤 입력이든 패닉 없이 결과 값으로 끝남.
    pub fn handle_frame_bytes(&mut self, bytes: &[u8]) -> FrameOutcome {
        if !self.is_active() {
            return FrameOutcome::Inactive;
        }

        let frame = match Frame::from_bytes(bytes) {
            Ok(frame) => frame,
            Err(_) => {
                self.stats.noise_frames += 1;
                return FrameOutcome::Noise;
            }
        };
        self.stats.frames_decoded += 1;

        match self.session_id {
            None => {
                self.session_id = Some(frame.session_id);
                info!("세션 {:08X} 수신 시작", frame.session_id);
                self.events
                    .on_status(&format!("Scanning session {:08X}...", frame.session_id));
            }
            Some(id) if id != frame.session_id => {
                self.stats.foreign_frames += 1;
                return FrameOutcome::ForeignSession;
            }
            Some(_) => {}
        }

        if !self.lock_total(frame.total) {
            self.stats.rejected_frames += 1;
            return FrameOutcome::Rejected;
        }

        let outcome = match frame.frame_type {
            FrameType::Metadata => self.on_metadata(&frame),
            FrameType::Source => self.on_source(&frame),
            FrameType::Fountain => self.on_fountain(&frame),
            FrameType::Trailer => self.on_trailer(&frame),
        };

        match outcome {
            FrameOutcome::Duplicate => self.stats.duplicate_frames += 1,
            FrameOutcome::Rejected => self.stats.rejected_frames += 1,
            _ => {}
        }

        if outcome == FrameOutcome::Accepted {
            self.report_progress();
            if self.try_complete() {
                return FrameOutcome::Completed;
            }
        }
        outcome
    }

    /// 총 청크 수 고정 (0이거나 기존 값과 다르면 false)
    fn lock_total(&mut self, total: u16) -> bool {
        if total == 0 {
            return false;
        }
        match self.table.total() {
            None => {
                self.table.set_total(total as usize);
                true
            }
            Some(locked) => locked == total as usize,
        }
    }

    fn on_metadata(&mut self, frame: &Frame) -> FrameOutcome {
        if self.metadata.is_some() {
            return FrameOutcome::Duplicate;
        }

        let metadata = match Metadata::from_payload(&frame.payload) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("메타데이터 파싱 실패: {}", e);
                return FrameOutcome::Rejected;
            }
        };

        if metadata.total_chunks != frame.total as u32 {
            warn!(
                "메타데이터 청크 수 불일치: {} != {}",
                metadata.total_chunks, frame.total
            );
            return FrameOutcome::Rejected;
        }

        if let Err(e) = metadata.validate(MAX_CHUNK_SIZE, self.config.max_file_size as u64) {
            warn!("메타데이터 거부: {}", e);
            self.events.on_debug(&format!("Rejected metadata: {}", e));
            return FrameOutcome::Rejected;
        }

        let evicted = self.table.set_layout(ChunkLayout {
            chunk_size: metadata.chunk_size as usize,
            payload_len: metadata.compressed_size as usize,
        });
        if !evicted.is_empty() {
            warn!("길이가 맞지 않는 청크 {}개 제거: {:?}", evicted.len(), evicted);
            self.stats.rejected_frames += evicted.len() as u64;
        }

        if metadata.lt_version > 0 && metadata.soliton_params_valid() {
            self.distribution = Some(SolitonDistribution::robust(
                metadata.total_chunks as usize,
                metadata.c,
                metadata.delta,
            ));
        } else {
            debug!("fountain 미지원 송신자 (ltVersion={})", metadata.lt_version);
        }

        self.events.on_debug(&format!(
            "Metadata: {} ({} bytes, {} chunks, compressed={})",
            metadata.name, metadata.original_size, metadata.total_chunks, metadata.compressed
        ));
        self.metadata = Some(metadata);
        FrameOutcome::Accepted
    }

    fn on_source(&mut self, frame: &Frame) -> FrameOutcome {
        let index = frame.index as usize;
        if self.table.total().map_or(true, |total| index >= total) {
            return FrameOutcome::Rejected;
        }
        if self.table.contains(index) {
            return FrameOutcome::Duplicate;
        }
        if let Some(expected) = self.table.expected_len(index) {
            if expected != frame.payload.len() {
                warn!(
                    "청크 {} 길이 불일치: {} != {}",
                    index,
                    frame.payload.len(),
                    expected
                );
                return FrameOutcome::Rejected;
            }
        }

        self.bytes.add(frame.payload.len());
        self.table.insert_source(index, frame.payload.clone());
        self.stats.source_chunks += 1;
        self.run_peeling();
        FrameOutcome::Accepted
    }

    fn on_fountain(&mut self, frame: &Frame) -> FrameOutcome {
        let distribution = match &self.distribution {
            Some(distribution) => distribution,
            None => {
                debug!("메타데이터 이전 fountain 프레임 무시");
                return FrameOutcome::Rejected;
            }
        };

        let payload = match FountainPayload::from_bytes(&frame.payload) {
            Ok(payload) => payload,
            Err(_) => return FrameOutcome::Rejected,
        };
        if self.table.contains_fountain(payload.seed) {
            return FrameOutcome::Duplicate;
        }

        let k = self.table.total().unwrap_or(0);
        let chunk = match FountainChunk::from_payload(&payload, k, distribution) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("fountain 청크 거부: {}", e);
                self.events.on_debug(&format!("Rejected fountain chunk: {}", e));
                return FrameOutcome::Rejected;
            }
        };

        self.bytes.add(chunk.data.len());
        self.table.insert_fountain(chunk);
        self.stats.fountain_chunks += 1;
        self.run_peeling();
        FrameOutcome::Accepted
    }

    fn on_trailer(&mut self, frame: &Frame) -> FrameOutcome {
        self.stats.trailers += 1;
        if !self.trailer_seen {
            self.trailer_seen = true;
            self.events
                .on_debug(&format!("Trailer detected: {} chunks", frame.total));
        }
        if self.state == ReceiverState::Scanning {
            self.state = ReceiverState::TrailerObserved;
        }

        if !self.table.is_complete() {
            self.run_peeling();
            self.run_elimination();
        }

        let missing = self.table.missing_indices();
        if !missing.is_empty() {
            let total = self.table.total().unwrap_or(0);
            self.state = ReceiverState::Incomplete;
            self.events.on_status(&format!(
                "Incomplete: {}/{} chunks",
                self.table.known_count(),
                total
            ));
            self.events.on_debug(&format!(
                "Missing chunks: {}",
                missing
                    .iter()
                    .map(|idx| idx.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        FrameOutcome::Accepted
    }

    fn run_peeling(&mut self) {
        if !self.config.peeling_enabled {
            return;
        }
        let outcome = peeling::run(&mut self.table, self.config.max_peeling_rounds);
        if !outcome.recovered.is_empty() {
            self.stats.peeled_chunks += outcome.recovered.len() as u64;
            self.events.on_debug(&format!(
                "Peeling recovered {} chunk(s)",
                outcome.recovered.len()
            ));
        }
    }

    fn run_elimination(&mut self) {
        if !self.config.elimination_enabled || self.table.is_complete() {
            return;
        }
        if self.failed_revision == Some(self.table.revision()) {
            debug!("테이블 변화 없음, 가우스 소거 생략");
            return;
        }

        self.stats.elimination_attempts += 1;
        match elimination::run(&mut self.table, self.config.max_elimination_unknowns) {
            EliminationOutcome::Recovered(recovered) => {
                self.stats.eliminated_chunks += recovered.len() as u64;
                self.events.on_debug(&format!(
                    "Gaussian elimination recovered {} chunk(s)",
                    recovered.len()
                ));
            }
            EliminationOutcome::NothingMissing => {}
            other => {
                self.failed_revision = Some(self.table.revision());
                self.events
                    .on_debug(&format!("Gaussian elimination failed: {:?}", other));
            }
        }
    }

    fn report_progress(&self) {
        let total = match self.table.total() {
            Some(total) => total,
            None => return,
        };
        let known = self.table.known_count();
        self.events.on_progress((known * 100 / total) as u8);
        self.events.on_status(&format!(
            "{}/{} chunks + {} fountain",
            known,
            total,
            self.table.fountain_count()
        ));
    }

    /// 완료 조건 확인 후 조합
    ///
    /// 모든 청크와 메타데이터가 있어야 조합함.
    pub fn try_complete(&mut self) -> bool {
        if !self.table.is_complete() {
            return false;
        }
        if self.metadata.is_none() {
            if !self.waiting_metadata_reported {
                self.waiting_metadata_reported = true;
                self.events.on_status("All chunks received, waiting for metadata");
            }
            return false;
        }
        self.finalize();
        true
    }

    fn finalize(&mut self) {
        self.state = ReceiverState::Finalizing;
        self.events.on_status("Finalizing...");

        let metadata = match self.metadata.clone() {
            Some(metadata) => metadata,
            None => return,
        };
        let assembled = match self.table.assemble() {
            Some(data) => data,
            None => return,
        };

        let compressed_crc_ok = crc32(&assembled) == metadata.compressed_crc;
        if !compressed_crc_ok {
            warn!("전송 페이로드 CRC 불일치");
            self.events.on_debug("CRC mismatch (compressed payload)");
        }

        let data = if metadata.compressed {
            match decompress_with_fallback(self.compressor.as_ref(), &assembled) {
                Ok(data) => data,
                Err(e) => {
                    warn!("압축 해제 실패: {}", e);
                    self.events.on_status("Decompression failed");
                    self.events.on_error(&e.to_string());
                    self.state = ReceiverState::Done;
                    return;
                }
            }
        } else {
            assembled
        };

        let original_crc_ok = crc32(&data) == metadata.original_crc;
        if !original_crc_ok {
            warn!("원본 CRC 불일치");
            self.events.on_debug("CRC mismatch (original)");
        }

        let name = if metadata.name.is_empty() {
            DEFAULT_FILE_NAME.to_string()
        } else {
            metadata.name.clone()
        };
        let result = TransferResult {
            kind: ResultKind::from_name(&name),
            name,
            data: Bytes::from(data),
            compressed_crc_ok,
            original_crc_ok,
        };

        info!(
            "수신 완료: {} ({} bytes), {}",
            result.name,
            result.data.len(),
            self.stats.summary()
        );
        self.events.on_progress(100);
        self.events.on_speed(self.meter.kbps());
        self.events.on_status(&result.status_text());
        self.events.on_result(&result);
        self.result = Some(result);
        self.state = ReceiverState::Done;
    }

    fn is_active(&self) -> bool {
        self.active && self.state != ReceiverState::Done
    }

    pub fn missing_indices(&self) -> Vec<usize> {
        self.table.missing_indices()
    }

    pub fn result(&self) -> Option<&TransferResult> {
        self.result.as_ref()
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn session_id(&self) -> Option<u32> {
        self.session_id
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn table(&self) -> &ChunkTable {
        &self.table
    }

    pub fn stats(&self) -> &ReceiveStats {
        &self.stats
    }

    /// 속도 타이머용 수신 바이트 카운터
    pub fn byte_counter(&self) -> ByteCounter {
        self.bytes.clone()
    }

    pub fn events(&self) -> Arc<dyn SessionEvents> {
        self.events.clone()
    }
}

/// 스캔 루프 핸들
///
/// 태스크 하나가 Receiver를 소유하고 캡처 이벤트를 하나씩 처리함.
/// 속도 태스크는 바이트 카운터만 읽음.
pub struct ScanLoop {
    stop_tx: mpsc::Sender<()>,
    running: Arc<AtomicBool>,
    bytes: ByteCounter,
    handle: JoinHandle<Receiver>,
}

impl ScanLoop {
    /// 캡처 소스를 열고 스캔 시작
    pub fn spawn<C, B>(mut receiver: Receiver, mut capture: C, mut reader: B) -> Result<Self>
    where
        C: CaptureSource + 'static,
        B: BarcodeReader + 'static,
    {
        let events = receiver.events();
        let mut images = match capture.open() {
            Ok(images) => images,
            Err(e) => {
                events.on_error(&e.to_string());
                return Err(e);
            }
        };

        receiver.start();

        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let running = Arc::new(AtomicBool::new(true));
        let bytes = receiver.byte_counter();

        // 속도 태스크
        let running_speed = running.clone();
        let meter = ThroughputMeter::new(bytes.clone());
        let speed_interval = Duration::from_millis(receiver.config.speed_interval_ms.max(1));
        let events_speed = events.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(speed_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !running_speed.load(Ordering::SeqCst) {
                    break;
                }
                events_speed.on_speed(meter.kbps());
            }
        });

        // 스캔 태스크
        let running_main = running.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    image = images.recv() => {
                        let image = match image {
                            Some(image) => image,
                            None => break,
                        };
                        if !running_main.load(Ordering::SeqCst) {
                            break;
                        }

                        if let Some(text) = reader.decode(&image) {
                            receiver.handle_scan(&text);
                        }
                        if receiver.state() == ReceiverState::Done {
                            break;
                        }
                    }
                }
            }

            running_main.store(false, Ordering::SeqCst);
            receiver.stop();
            capture.close();
            receiver
        });

        Ok(Self {
            stop_tx,
            running,
            bytes,
            handle,
        })
    }

    /// 스캔 정지 요청
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.stop_tx.send(()).await;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 지금까지 받은 데이터 바이트
    pub fn bytes_received(&self) -> u64 {
        self.bytes.get()
    }

    /// 루프 종료 대기 후 수신자 반환
    pub async fn join(self) -> Result<Receiver> {
        self.handle.await.map_err(|_| Error::ChannelError)
    }
}

//! 송신자
//!
//! - 페이로드 압축, 청크 분할, 프레임 시퀀스 준비
//! - 틱마다 프레임 하나 생성 (한 바퀴 이후 무한 fountain 모드)
//! - 트레일러 신호: 일반 루프를 멈추고 트레일러를 빠르게 내보낸 뒤 제자리에서 재개

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{latin1_decode, ErrorCorrection, Renderer};
use crate::chunk::ChunkSplitter;
use crate::compress::{crc32, Compressor};
use crate::events::SessionEvents;
use crate::fountain;
use crate::frame::{Frame, FrameType, Metadata};
use crate::soliton::SolitonDistribution;
use crate::stats::SendStats;
use crate::{Config, Error, Result, CODEC_VERSION};

/// 중복 검사에 기억하는 최근 fountain seed 수
///
/// 이보다 오래된 seed는 다시 나올 수 있음 (수신측에서는 중복 프레임으로 처리됨).
pub const SEED_HISTORY: usize = 1 << 16;

/// 송신 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    Preparing,
    Looping,
    SignalingTrailer,
    Stopped,
}

/// 현재 활성 틱 처리기 (한 번에 하나)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Driver {
    /// 준비된 시퀀스 / 무한 fountain
    Normal,

    /// 트레일러 신호 중 (다음에 보낼 트레일러 위치)
    Trailer { next: usize },
}

/// 준비된 전송
#[derive(Debug)]
struct PreparedTransfer {
    metadata: Metadata,

    /// 소스 청크
    chunks: Vec<Bytes>,

    distribution: SolitonDistribution,

    /// 메타데이터 + 소스 + 초기 fountain + 트레일러
    frames: Vec<Bytes>,

    /// 프레임별 타입
    kinds: Vec<FrameType>,

    /// 메타데이터 + 소스 + 트레일러
    base_frames: Vec<Bytes>,

    trailer_frames: Vec<Bytes>,
}

/// 송신자 (틱 구동, I/O 없음)
pub struct Sender {
    config: Config,
    compressor: Box<dyn Compressor>,
    session_id: u32,
    state: SenderState,
    driver: Driver,
    prepared: Option<PreparedTransfer>,

    /// 준비된 시퀀스 내 다음 위치
    send_index: usize,

    /// 한 바퀴를 돌아 무한 fountain 단계에 들어갔는지
    endless_phase: bool,

    /// 무한 단계에서 다음 틱이 기본 프레임 차례인지
    base_turn: bool,

    /// 무한 단계 기본 프레임 순환 위치
    base_cursor: usize,

    /// 생성한 fountain 프레임 수 (프레임 인덱스로 사용)
    fountains_sent: u32,

    used_seeds: HashSet<u32>,
    seed_order: VecDeque<u32>,
    seed_rng: StdRng,
    stats: SendStats,
}

impl Sender {
    /// 새 송신자 생성 (세션 ID는 무작위)
    pub fn new(config: Config, compressor: Box<dyn Compressor>) -> Self {
        Self {
            config,
            compressor,
            session_id: rand::random(),
            state: SenderState::Idle,
            driver: Driver::Normal,
            prepared: None,
            send_index: 0,
            endless_phase: false,
            base_turn: true,
            base_cursor: 0,
            fountains_sent: 0,
            used_seeds: HashSet::new(),
            seed_order: VecDeque::new(),
            seed_rng: StdRng::from_entropy(),
            stats: SendStats::new(),
        }
    }

    /// 세션 ID 지정
    pub fn with_session_id(mut self, session_id: u32) -> Self {
        self.session_id = session_id;
        self
    }

    /// fountain seed 생성기 고정 (재현 가능한 시퀀스)
    pub fn with_seed_rng(mut self, seed: u64) -> Self {
        self.seed_rng = StdRng::seed_from_u64(seed);
        self
    }

    /// 전송 준비
    ///
    /// CRC 계산 → 압축 (줄어들 때만 사용) → 청크 분할 → 분포 계산 →
    /// 메타데이터, 소스, 초기 fountain 배치, 트레일러 순으로 시퀀스 구성.
    pub fn prepare(&mut self, name: &str, payload: &[u8]) -> Result<&Metadata> {
        match self.state {
            SenderState::Idle | SenderState::Stopped => {}
            _ => return Err(Error::InvalidState("송신 중에는 준비할 수 없음")),
        }

        self.state = SenderState::Preparing;
        match self.build(name, payload) {
            Ok(prepared) => {
                self.prepared = Some(prepared);
                self.reset_cursor(0);
                self.state = SenderState::Looping;
                self.stats = SendStats::new();
                self.metadata()
                    .ok_or(Error::InvalidState("준비된 전송 없음"))
            }
            Err(e) => {
                self.state = SenderState::Idle;
                Err(e)
            }
        }
    }

    fn build(&mut self, name: &str, payload: &[u8]) -> Result<PreparedTransfer> {
        self.config.validate()?;

        if payload.is_empty() {
            return Err(Error::EmptyPayload);
        }
        if payload.len() > self.config.max_file_size {
            return Err(Error::FileTooLarge {
                size: payload.len(),
                max: self.config.max_file_size,
            });
        }

        let original_crc = crc32(payload);
        let compressed = self.compressor.compress(payload)?;
        let (data, is_compressed) = if compressed.len() < payload.len() {
            debug!(
                "압축: {} → {} bytes ({}%)",
                payload.len(),
                compressed.len(),
                compressed.len() * 100 / payload.len()
            );
            (Bytes::from(compressed), true)
        } else {
            debug!("압축 생략 (크기 이득 없음)");
            (Bytes::copy_from_slice(payload), false)
        };
        let compressed_crc = if is_compressed { crc32(&data) } else { original_crc };

        let splitter = ChunkSplitter::new(self.config.chunk_size);
        let chunks = splitter.split(&data);
        let k = chunks.len();
        if k > u16::MAX as usize {
            return Err(Error::FieldOverflow {
                field: "total",
                value: k,
            });
        }
        let total = k as u16;

        let distribution =
            SolitonDistribution::robust(k, self.config.soliton_c, self.config.soliton_delta);

        let metadata = Metadata {
            name: name.to_string(),
            compressed: is_compressed,
            original_size: payload.len() as u64,
            compressed_size: data.len() as u64,
            total_chunks: k as u32,
            chunk_size: self.config.chunk_size as u32,
            original_crc,
            compressed_crc,
            lt_version: CODEC_VERSION,
            c: self.config.soliton_c,
            delta: self.config.soliton_delta,
        };

        let mut frames = Vec::new();
        let mut kinds = Vec::new();
        let mut base_frames = Vec::new();
        let mut trailer_frames = Vec::new();

        let meta_frame = Frame::new(
            self.session_id,
            FrameType::Metadata,
            0,
            total,
            metadata.to_payload()?,
        )
        .to_bytes()?;
        frames.push(meta_frame.clone());
        kinds.push(FrameType::Metadata);
        base_frames.push(meta_frame);

        for (idx, chunk) in chunks.iter().enumerate() {
            let frame = Frame::new(self.session_id, FrameType::Source, idx as u16, total, chunk.clone())
                .to_bytes()?;
            frames.push(frame.clone());
            kinds.push(FrameType::Source);
            base_frames.push(frame);
        }

        let initial = self.config.initial_fountain_count(k);
        self.fountains_sent = 0;
        for _ in 0..initial {
            let seed = self.fresh_seed();
            let frame = self.fountain_frame(&chunks, &distribution, seed, total)?;
            frames.push(frame);
            kinds.push(FrameType::Fountain);
        }

        for _ in 0..self.config.trailer_count {
            let frame = Frame::new(self.session_id, FrameType::Trailer, 0, total, Bytes::new())
                .to_bytes()?;
            frames.push(frame.clone());
            kinds.push(FrameType::Trailer);
            base_frames.push(frame.clone());
            trailer_frames.push(frame);
        }

        info!(
            "{} 프레임 준비 완료 (소스 {} + fountain {} + 메타 1 + 트레일러 {}), 세션 {:08X}",
            frames.len(),
            k,
            initial,
            self.config.trailer_count,
            self.session_id
        );

        Ok(PreparedTransfer {
            metadata,
            chunks,
            distribution,
            frames,
            kinds,
            base_frames,
            trailer_frames,
        })
    }

    /// 최근 `SEED_HISTORY`개와 겹치지 않는 0이 아닌 seed
    fn fresh_seed(&mut self) -> u32 {
        let seed = loop {
            let seed: u32 = self.seed_rng.gen();
            if seed != 0 && self.used_seeds.insert(seed) {
                break seed;
            }
        };

        self.seed_order.push_back(seed);
        if self.seed_order.len() > SEED_HISTORY {
            if let Some(oldest) = self.seed_order.pop_front() {
                self.used_seeds.remove(&oldest);
            }
        }
        seed
    }

    fn fountain_frame(
        &mut self,
        chunks: &[Bytes],
        distribution: &SolitonDistribution,
        seed: u32,
        total: u16,
    ) -> Result<Bytes> {
        let chunk = fountain::encode(chunks, chunks.len(), seed, distribution);
        let frame = Frame::new(
            self.session_id,
            FrameType::Fountain,
            self.fountains_sent as u16,
            total,
            chunk.to_payload().to_bytes(),
        )
        .to_bytes()?;
        self.fountains_sent = self.fountains_sent.wrapping_add(1);
        Ok(frame)
    }

    fn reset_cursor(&mut self, send_index: usize) {
        self.driver = Driver::Normal;
        self.send_index = send_index;
        self.endless_phase = false;
        self.base_turn = true;
        self.base_cursor = 0;
    }

    /// 다음 틱에 표시할 프레임 (송신 중이 아니면 None)
    pub fn next_frame(&mut self) -> Option<Bytes> {
        match self.state {
            SenderState::Looping | SenderState::SignalingTrailer => {}
            _ => return None,
        }

        let frame = match self.driver {
            Driver::Trailer { next } => self.next_trailer(next)?,
            Driver::Normal if self.endless_phase => self.next_endless()?,
            Driver::Normal => self.next_prepared()?,
        };

        self.stats.frames_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        Some(frame)
    }

    fn next_trailer(&mut self, next: usize) -> Option<Bytes> {
        let prepared = self.prepared.as_ref()?;
        let frame = prepared.trailer_frames.get(next)?.clone();

        if next + 1 >= prepared.trailer_frames.len() {
            self.driver = Driver::Normal;
            self.state = SenderState::Looping;
            debug!("트레일러 신호 완료, 위치 {}에서 재개", self.send_index);
        } else {
            self.driver = Driver::Trailer { next: next + 1 };
        }
        self.stats.base_frames += 1;
        Some(frame)
    }

    fn next_prepared(&mut self) -> Option<Bytes> {
        let prepared = self.prepared.as_ref()?;
        let frame = prepared.frames.get(self.send_index)?.clone();
        match prepared.kinds[self.send_index] {
            FrameType::Fountain => self.stats.fountain_frames += 1,
            _ => self.stats.base_frames += 1,
        }

        self.send_index += 1;
        if self.send_index >= prepared.frames.len() {
            self.send_index = 0;
            if self.config.endless_fountain {
                self.endless_phase = true;
                info!("첫 순환 완료, 무한 fountain 모드 시작");
            }
        }
        Some(frame)
    }

    fn next_endless(&mut self) -> Option<Bytes> {
        let base_turn = self.base_turn;
        self.base_turn = !base_turn;

        if base_turn {
            let prepared = self.prepared.as_ref()?;
            let frame = prepared.base_frames.get(self.base_cursor)?.clone();
            self.base_cursor = (self.base_cursor + 1) % prepared.base_frames.len();
            self.stats.base_frames += 1;
            return Some(frame);
        }

        let seed = self.fresh_seed();
        let prepared = self.prepared.take()?;
        let result = self.fountain_frame(
            &prepared.chunks,
            &prepared.distribution,
            seed,
            prepared.metadata.total_chunks as u16,
        );
        self.prepared = Some(prepared);

        match result {
            Ok(frame) => {
                self.stats.fountain_frames += 1;
                self.stats.fresh_fountains += 1;
                if self.stats.fresh_fountains % 100 == 0 {
                    debug!("새 fountain 청크 {}개 생성", self.stats.fresh_fountains);
                }
                Some(frame)
            }
            Err(e) => {
                warn!("fountain 프레임 생성 실패: {}", e);
                None
            }
        }
    }

    /// 현재 틱 간격
    pub fn tick_interval(&self) -> Duration {
        match self.state {
            SenderState::SignalingTrailer => Duration::from_millis(self.config.trailer_interval_ms),
            _ => Duration::from_micros(self.config.frame_interval_us()),
        }
    }

    /// 트레일러 신호 시작
    ///
    /// 일반 루프 위치는 그대로 두고 트레일러만 연속으로 내보냄.
    pub fn signal_trailer(&mut self) -> Result<()> {
        match self.state {
            SenderState::Looping | SenderState::SignalingTrailer => {}
            _ => return Err(Error::InvalidState("송신 중이 아님")),
        }
        let has_trailers = self
            .prepared
            .as_ref()
            .map_or(false, |p| !p.trailer_frames.is_empty());
        if !has_trailers {
            return Err(Error::InvalidState("트레일러 프레임 없음"));
        }

        self.driver = Driver::Trailer { next: 0 };
        self.state = SenderState::SignalingTrailer;
        self.stats.trailer_signals += 1;
        debug!("트레일러 신호 시작 (재개 위치 {})", self.send_index);
        Ok(())
    }

    /// 데이터 청크 비율 위치에서 재시작
    ///
    /// 위치는 소스 프레임 수 기준으로 계산하며 메타데이터 프레임 바로 뒤부터 셈.
    pub fn restart(&mut self, percent: f64) -> Result<()> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or(Error::InvalidState("재시작할 데이터 없음"))?;

        let send_index = if percent > 0.0 {
            let data_frames = prepared.chunks.len();
            let position = (data_frames as f64 * (percent.min(100.0) / 100.0)).floor() as usize;
            (position + 1).min(prepared.frames.len() - 1)
        } else {
            0
        };

        self.reset_cursor(send_index);
        self.fountains_sent = 0;
        self.state = SenderState::Looping;
        self.stats.restarts += 1;
        info!("{}% 위치에서 재시작 (프레임 {})", percent, send_index);
        Ok(())
    }

    /// 정지 (준비된 데이터는 재시작을 위해 유지)
    pub fn stop(&mut self) {
        if self.state != SenderState::Stopped {
            info!("송신 정지: {}", self.stats.summary());
        }
        self.driver = Driver::Normal;
        self.state = SenderState::Stopped;
    }

    /// 첫 순환 진행률 (무한 단계에서는 100)
    pub fn progress(&self) -> u8 {
        match &self.prepared {
            Some(_) if self.endless_phase => 100,
            Some(p) if !p.frames.is_empty() => (self.send_index * 100 / p.frames.len()) as u8,
            _ => 0,
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.prepared.as_ref().map(|p| &p.metadata)
    }

    /// 준비된 전체 시퀀스
    pub fn frames(&self) -> &[Bytes] {
        self.prepared.as_ref().map_or(&[], |p| &p.frames)
    }

    /// 메타데이터 + 소스 + 트레일러 프레임
    pub fn base_frames(&self) -> &[Bytes] {
        self.prepared.as_ref().map_or(&[], |p| &p.base_frames)
    }

    pub fn is_endless(&self) -> bool {
        self.endless_phase
    }

    pub fn stats(&self) -> &SendStats {
        &self.stats
    }
}

/// 송신 루프 명령
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SenderCmd {
    SignalTrailer,
    Restart(f64),
    Stop,
}

/// 송신 루프 핸들 (tokio 태스크 하나가 Sender를 소유)
pub struct SendLoop {
    cmd_tx: mpsc::Sender<SenderCmd>,
    running: Arc<AtomicBool>,
    frames_rendered: Arc<AtomicU64>,
    handle: JoinHandle<Sender>,
}

impl SendLoop {
    /// 준비된 송신자로 루프 시작
    pub fn spawn<R>(mut sender: Sender, mut renderer: R, events: Arc<dyn SessionEvents>) -> Result<Self>
    where
        R: Renderer + 'static,
    {
        if sender.state() != SenderState::Looping {
            return Err(Error::InvalidState("prepare 이후에만 시작 가능"));
        }

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<SenderCmd>(16);
        let running = Arc::new(AtomicBool::new(true));
        let frames_rendered = Arc::new(AtomicU64::new(0));

        let running_task = running.clone();
        let rendered_task = frames_rendered.clone();

        events.on_status(&format!("Sending session {:08X}...", sender.session_id()));

        let handle = tokio::spawn(async move {
            let mut last_progress = 0u8;

            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        match cmd {
                            Some(SenderCmd::SignalTrailer) => match sender.signal_trailer() {
                                Ok(()) => events.on_debug("트레일러 신호"),
                                Err(e) => events.on_error(&e.to_string()),
                            },
                            Some(SenderCmd::Restart(percent)) => match sender.restart(percent) {
                                Ok(()) => events.on_status(&format!("Restarted at {}%", percent)),
                                Err(e) => events.on_error(&e.to_string()),
                            },
                            Some(SenderCmd::Stop) | None => {
                                sender.stop();
                                break;
                            }
                        }
                    }
                    _ = tokio::time::sleep(sender.tick_interval()) => {
                        let frame = match sender.next_frame() {
                            Some(frame) => frame,
                            None => continue,
                        };

                        if let Err(e) = renderer.render(&latin1_decode(&frame), ErrorCorrection::Low) {
                            warn!("렌더링 실패: {}", e);
                            events.on_error(&e.to_string());
                            sender.stop();
                            break;
                        }
                        rendered_task.fetch_add(1, Ordering::Relaxed);

                        let progress = sender.progress();
                        if progress != last_progress {
                            last_progress = progress;
                            events.on_progress(progress);
                        }
                    }
                }
            }

            running_task.store(false, Ordering::SeqCst);
            events.on_status("Stopped");
            sender
        });

        Ok(Self {
            cmd_tx,
            running,
            frames_rendered,
            handle,
        })
    }

    pub async fn signal_trailer(&self) -> Result<()> {
        self.send(SenderCmd::SignalTrailer).await
    }

    pub async fn restart(&self, percent: f64) -> Result<()> {
        self.send(SenderCmd::Restart(percent)).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(SenderCmd::Stop).await
    }

    async fn send(&self, cmd: SenderCmd) -> Result<()> {
        self.cmd_tx.send(cmd).await.map_err(|_| Error::ChannelError)
    }

    /// 렌더링한 프레임 수
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 루프 종료 대기 후 송신자 반환
    pub async fn join(self) -> Result<Sender> {
        self.handle.await.map_err(|_| Error::ChannelError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::{DeflateCompressor, NoopCompressor};
    use crate::events::RecordingEvents;
    use crate::frame::FountainPayload;
    use parking_lot::Mutex;

    fn test_config(chunk_size: usize) -> Config {
        Config {
            chunk_size,
            ..Config::default()
        }
    }

    fn prepared_sender(len: usize, chunk_size: usize) -> Sender {
        let payload: Vec<u8> = (0..len).map(|i| (i * 7 % 251) as u8).collect();
        let mut sender = Sender::new(test_config(chunk_size), Box::new(NoopCompressor))
            .with_session_id(0xABCD_0001)
            .with_seed_rng(7);
        sender.prepare("data.bin", &payload).unwrap();
        sender
    }

    fn decode(bytes: &Bytes) -> Frame {
        Frame::from_bytes(bytes).unwrap()
    }

    #[test]
    fn test_prepare_sequence_layout() {
        let sender = prepared_sender(1000, 200);
        let frames: Vec<Frame> = sender.frames().iter().map(decode).collect();

        // 메타 1 + 소스 5 + fountain ceil(2.5)=3 + 트레일러 5
        assert_eq!(frames.len(), 14);
        assert_eq!(frames[0].frame_type, FrameType::Metadata);
        for (i, frame) in frames[1..6].iter().enumerate() {
            assert_eq!(frame.frame_type, FrameType::Source);
            assert_eq!(frame.index as usize, i);
            assert_eq!(frame.total, 5);
        }
        for frame in &frames[6..9] {
            assert_eq!(frame.frame_type, FrameType::Fountain);
        }
        for frame in &frames[9..] {
            assert_eq!(frame.frame_type, FrameType::Trailer);
            assert!(frame.payload.is_empty());
        }
        assert!(frames.iter().all(|f| f.session_id == 0xABCD_0001));
        assert_eq!(sender.base_frames().len(), 11);

        let meta = sender.metadata().unwrap();
        assert!(!meta.compressed);
        assert_eq!(meta.total_chunks, 5);
        assert_eq!(meta.original_crc, meta.compressed_crc);
        assert_eq!(meta.lt_version, CODEC_VERSION);
    }

    #[test]
    fn test_compression_used_only_when_smaller() {
        let payload = b"repeat me ".repeat(300);
        let mut sender = Sender::new(Config::default(), Box::new(DeflateCompressor::default()));
        let meta = sender.prepare("text.txt", &payload).unwrap().clone();
        assert!(meta.compressed);
        assert!(meta.compressed_size < meta.original_size);
        assert_ne!(meta.original_crc, meta.compressed_crc);
    }

    #[test]
    fn test_prepare_rejects_bad_payloads() {
        let mut sender = Sender::new(Config::default(), Box::new(NoopCompressor));
        assert!(matches!(sender.prepare("x", b""), Err(Error::EmptyPayload)));
        assert_eq!(sender.state(), SenderState::Idle);

        let config = Config {
            max_file_size: 10,
            ..Config::default()
        };
        let mut sender = Sender::new(config, Box::new(NoopCompressor));
        assert!(matches!(
            sender.prepare("x", &[1u8; 11]),
            Err(Error::FileTooLarge { size: 11, max: 10 })
        ));
        assert!(sender.next_frame().is_none());
    }

    #[test]
    fn test_cycles_without_endless_mode() {
        let payload = vec![9u8; 300];
        let config = Config {
            chunk_size: 100,
            endless_fountain: false,
            ..Config::default()
        };
        let mut sender = Sender::new(config, Box::new(NoopCompressor));
        sender.prepare("a", &payload).unwrap();

        let prepared: Vec<Bytes> = sender.frames().to_vec();
        for expected in prepared.iter().chain(prepared.iter()) {
            assert_eq!(&sender.next_frame().unwrap(), expected);
        }
        assert!(!sender.is_endless());
    }

    #[test]
    fn test_endless_mode_alternates_fresh_fountains() {
        let mut sender = prepared_sender(1000, 200);
        let cycle = sender.frames().len();
        let mut seeds = HashSet::new();
        for bytes in sender.frames().to_vec() {
            let frame = decode(&bytes);
            if frame.frame_type == FrameType::Fountain {
                seeds.insert(FountainPayload::from_bytes(&frame.payload).unwrap().seed);
            }
        }

        for _ in 0..cycle {
            sender.next_frame().unwrap();
        }
        assert!(sender.is_endless());

        let base = sender.base_frames().to_vec();
        for i in 0..40 {
            let bytes = sender.next_frame().unwrap();
            let frame = decode(&bytes);
            if i % 2 == 0 {
                assert_eq!(bytes, base[(i / 2) % base.len()]);
            } else {
                assert_eq!(frame.frame_type, FrameType::Fountain);
                let payload = FountainPayload::from_bytes(&frame.payload).unwrap();
                assert_ne!(payload.seed, 0);
                assert!(seeds.insert(payload.seed), "seed 중복: {}", payload.seed);
            }
        }
        assert_eq!(sender.stats().fresh_fountains, 20);
        assert_eq!(sender.progress(), 100);
    }

    #[test]
    fn test_seed_history_is_bounded() {
        let mut sender = prepared_sender(1000, 200);
        for _ in 0..SEED_HISTORY + 100 {
            assert_ne!(sender.fresh_seed(), 0);
        }
        assert_eq!(sender.used_seeds.len(), SEED_HISTORY);
        assert_eq!(sender.seed_order.len(), SEED_HISTORY);

        let recent: HashSet<u32> = sender.seed_order.iter().copied().collect();
        assert_eq!(recent, sender.used_seeds);
    }

    #[test]
    fn test_trailer_signal_resumes_in_place() {
        let mut sender = prepared_sender(1000, 200);
        let frames = sender.frames().to_vec();
        let normal_interval = sender.tick_interval();

        sender.next_frame();
        sender.next_frame();
        sender.signal_trailer().unwrap();
        assert_eq!(sender.state(), SenderState::SignalingTrailer);
        assert_eq!(sender.tick_interval(), Duration::from_millis(200));

        for _ in 0..5 {
            let frame = decode(&sender.next_frame().unwrap());
            assert_eq!(frame.frame_type, FrameType::Trailer);
        }
        assert_eq!(sender.state(), SenderState::Looping);
        assert_eq!(sender.tick_interval(), normal_interval);
        assert_eq!(sender.next_frame().unwrap(), frames[2]);
    }

    #[test]
    fn test_restart_from_percentage() {
        let mut sender = prepared_sender(2000, 200);
        sender.stop();
        assert!(sender.next_frame().is_none());

        sender.restart(50.0).unwrap();
        let frame = decode(&sender.next_frame().unwrap());
        assert_eq!(frame.frame_type, FrameType::Source);
        assert_eq!(frame.index, 5);

        sender.restart(0.0).unwrap();
        let frame = decode(&sender.next_frame().unwrap());
        assert_eq!(frame.frame_type, FrameType::Metadata);
    }

    #[test]
    fn test_restart_without_data_fails() {
        let mut sender = Sender::new(Config::default(), Box::new(NoopCompressor));
        assert!(sender.restart(10.0).is_err());
        assert!(sender.signal_trailer().is_err());
    }

    struct CollectingRenderer {
        frames: Arc<Mutex<Vec<String>>>,
    }

    impl Renderer for CollectingRenderer {
        fn render(&mut self, symbol: &str, _level: ErrorCorrection) -> Result<()> {
            self.frames.lock().push(symbol.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_send_loop_renders_and_stops() {
        let config = Config {
            chunk_size: 100,
            fps: 200,
            ..Config::default()
        };
        let mut sender = Sender::new(config, Box::new(NoopCompressor));
        sender.prepare("a", &[5u8; 250]).unwrap();

        let frames = Arc::new(Mutex::new(Vec::new()));
        let renderer = CollectingRenderer {
            frames: frames.clone(),
        };
        let events = Arc::new(RecordingEvents::new());

        let send_loop = SendLoop::spawn(sender, renderer, events.clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        send_loop.signal_trailer().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        send_loop.stop().await.unwrap();

        let sender = send_loop.join().await.unwrap();
        assert_eq!(sender.state(), SenderState::Stopped);
        assert!(!frames.lock().is_empty());
        assert!(events.statuses().iter().any(|s| s.starts_with("Sending session")));
        assert_eq!(sender.stats().trailer_signals, 1);
    }

    #[tokio::test]
    async fn test_send_loop_requires_prepared_sender() {
        let sender = Sender::new(Config::default(), Box::new(NoopCompressor));
        let renderer = CollectingRenderer {
            frames: Arc::new(Mutex::new(Vec::new())),
        };
        assert!(SendLoop::spawn(sender, renderer, Arc::new(RecordingEvents::new())).is_err());
    }
}

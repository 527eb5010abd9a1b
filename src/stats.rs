//! 전송 통계

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 수신 바이트 카운터
///
/// 스캔 루프만 증가시키고 속도 타이머는 읽기만 함.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter {
    inner: Arc<AtomicU64>,
}

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, bytes: usize) {
        self.inner.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.inner.store(0, Ordering::Relaxed);
    }
}

/// 평균 처리율 계산기 (KB/s)
#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    counter: ByteCounter,
    start_time: Instant,
}

impl ThroughputMeter {
    pub fn new(counter: ByteCounter) -> Self {
        Self {
            counter,
            start_time: Instant::now(),
        }
    }

    /// 측정 시작 시점 재설정
    pub fn restart(&mut self) {
        self.start_time = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 시작 이후 평균 KB/s
    pub fn kbps(&self) -> f64 {
        kbps(self.counter.get(), self.elapsed())
    }
}

/// bytes / 경과 초 / 1024
pub fn kbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    bytes as f64 / secs / 1024.0
}

/// 송신 통계
#[derive(Debug, Clone)]
pub struct SendStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 총 송신 프레임 수
    pub frames_sent: u64,

    /// 메타데이터/소스/트레일러 프레임 수
    pub base_frames: u64,

    /// fountain 프레임 수 (초기 배치 재생 포함)
    pub fountain_frames: u64,

    /// 무한 모드에서 새로 만든 fountain 프레임 수
    pub fresh_fountains: u64,

    /// 트레일러 신호 횟수
    pub trailer_signals: u64,

    /// 재시작 횟수
    pub restarts: u64,

    /// 총 송신 바이트 (헤더 포함)
    pub bytes_sent: u64,
}

impl SendStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            frames_sent: 0,
            base_frames: 0,
            fountain_frames: 0,
            fresh_fountains: 0,
            trailer_signals: 0,
            restarts: 0,
            bytes_sent: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Frames: {} (base {}, fountain {}, fresh {}) | Bytes: {} | Trailer signals: {} | Restarts: {}",
            self.elapsed().as_secs_f64(),
            self.frames_sent,
            self.base_frames,
            self.fountain_frames,
            self.fresh_fountains,
            self.bytes_sent,
            self.trailer_signals,
            self.restarts,
        )
    }
}

impl Default for SendStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 수신 통계
#[derive(Debug, Clone)]
pub struct ReceiveStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 디코드된 프로토콜 프레임 수
    pub frames_decoded: u64,

    /// 프로토콜 프레임이 아닌 스캔 수
    pub noise_frames: u64,

    /// 다른 세션 프레임 수
    pub foreign_frames: u64,

    /// 중복 프레임 수
    pub duplicate_frames: u64,

    /// 거부된 프레임 수 (범위 밖, degree 불일치 등)
    pub rejected_frames: u64,

    /// 새로 저장된 소스 청크 수
    pub source_chunks: u64,

    /// 새로 저장된 fountain 청크 수
    pub fountain_chunks: u64,

    /// peeling 복구 청크 수
    pub peeled_chunks: u64,

    /// 가우스 소거 복구 청크 수
    pub eliminated_chunks: u64,

    /// 가우스 소거 시도 수
    pub elimination_attempts: u64,

    /// 관측한 트레일러 수
    pub trailers: u64,
}

impl ReceiveStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            frames_decoded: 0,
            noise_frames: 0,
            foreign_frames: 0,
            duplicate_frames: 0,
            rejected_frames: 0,
            source_chunks: 0,
            fountain_chunks: 0,
            peeled_chunks: 0,
            eliminated_chunks: 0,
            elimination_attempts: 0,
            trailers: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Frames: {} (noise {}, foreign {}, dup {}, rejected {}) | Source: {} | Fountain: {} | Peeled: {} | Eliminated: {} ({} attempts)",
            self.elapsed().as_secs_f64(),
            self.frames_decoded,
            self.noise_frames,
            self.foreign_frames,
            self.duplicate_frames,
            self.rejected_frames,
            self.source_chunks,
            self.fountain_chunks,
            self.peeled_chunks,
            self.eliminated_chunks,
            self.elimination_attempts,
        )
    }
}

impl Default for ReceiveStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_counter_shared() {
        let counter = ByteCounter::new();
        let reader = counter.clone();
        counter.add(1000);
        counter.add(24);
        assert_eq!(reader.get(), 1024);
        reader.reset();
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_kbps() {
        assert_eq!(kbps(2048, Duration::from_secs(2)), 1.0);
        assert_eq!(kbps(2048, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_summary_mentions_counts() {
        let mut stats = ReceiveStats::new();
        stats.source_chunks = 5;
        stats.eliminated_chunks = 2;
        let summary = stats.summary();
        assert!(summary.contains("Source: 5"));
        assert!(summary.contains("Eliminated: 2"));
    }
}

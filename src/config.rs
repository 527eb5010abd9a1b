//! 프로토콜 설정

use crate::{Error, Result, DEFAULT_CHUNK_SIZE, FOUNTAIN_HEADER_LEN};

/// fountain 페이로드가 u16 길이 필드에 들어가기 위한 최대 청크 크기
pub const MAX_CHUNK_SIZE: usize = u16::MAX as usize - FOUNTAIN_HEADER_LEN;

/// QRBT 송수신 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 소스 청크 크기 (바이트)
    pub chunk_size: usize,

    /// 초기 fountain 중복 비율
    /// 예: 0.5 = 소스 청크 수의 50% 만큼 fountain 프레임 추가
    pub redundancy_ratio: f64,

    /// 송신 프레임 속도 (frames/sec)
    pub fps: u32,

    /// 최대 전송 파일 크기 (바이트)
    pub max_file_size: usize,

    /// robust soliton 분포 c 파라미터
    pub soliton_c: f64,

    /// robust soliton 분포 delta 파라미터 (실패 확률 상한)
    pub soliton_delta: f64,

    /// 한 바퀴 이후 새 fountain 프레임을 무한 생성할지 여부
    pub endless_fountain: bool,

    /// 트레일러 프레임 반복 횟수
    pub trailer_count: usize,

    /// 트레일러 신호 시 프레임 간격 (밀리초)
    pub trailer_interval_ms: u64,

    /// peeling 디코더 사용 여부
    pub peeling_enabled: bool,

    /// GF(2) 소거 디코더 사용 여부
    pub elimination_enabled: bool,

    /// peeling 최대 라운드 수
    pub max_peeling_rounds: usize,

    /// 가우스 소거가 허용하는 최대 미지수 (누락 청크) 수
    pub max_elimination_unknowns: usize,

    /// 수신 속도 보고 주기 (밀리초)
    pub speed_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            redundancy_ratio: 0.5,            // 50% 초기 중복
            fps: 20,
            max_file_size: 10 * 1024 * 1024,  // 10MB
            soliton_c: 0.03,
            soliton_delta: 0.05,
            endless_fountain: true,
            trailer_count: 5,
            trailer_interval_ms: 200,         // 5 프레임 = 1초
            peeling_enabled: true,
            elimination_enabled: true,
            max_peeling_rounds: 10,
            max_elimination_unknowns: 50,
            speed_interval_ms: 1000,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 프레임 간격 (마이크로초)
    pub fn frame_interval_us(&self) -> u64 {
        1_000_000 / self.fps.max(1) as u64
    }

    /// 초기 fountain 프레임 수 계산
    pub fn initial_fountain_count(&self, total_chunks: usize) -> usize {
        (total_chunks as f64 * self.redundancy_ratio).ceil() as usize
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "chunk_size {} (1..={} 필요)",
                self.chunk_size, MAX_CHUNK_SIZE
            )));
        }
        if self.fps == 0 {
            return Err(Error::InvalidConfig("fps는 0일 수 없음".into()));
        }
        if !(self.redundancy_ratio >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "redundancy_ratio {}",
                self.redundancy_ratio
            )));
        }
        if !(self.soliton_c > 0.0) {
            return Err(Error::InvalidConfig(format!("soliton_c {}", self.soliton_c)));
        }
        if !(self.soliton_delta > 0.0 && self.soliton_delta < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "soliton_delta {} (0 < delta < 1 필요)",
                self.soliton_delta
            )));
        }
        if self.trailer_count == 0 {
            return Err(Error::InvalidConfig("trailer_count는 0일 수 없음".into()));
        }
        Ok(())
    }

    /// 저사양 카메라용 설정
    pub fn low_spec() -> Self {
        Self {
            chunk_size: 400,                  // 작은 심볼
            redundancy_ratio: 0.8,
            fps: 10,
            trailer_interval_ms: 300,
            max_elimination_unknowns: 30,     // 스캔 루프 지연 최소화
            ..Self::default()
        }
    }

    /// 고밀도 디스플레이용 설정
    pub fn high_density() -> Self {
        Self {
            chunk_size: 1500,
            redundancy_ratio: 0.3,
            fps: 30,
            ..Self::default()
        }
    }

    /// 흔들리는 카메라 등 불안정한 캡처용 설정
    pub fn unstable_capture() -> Self {
        Self {
            chunk_size: 600,
            redundancy_ratio: 1.0,            // 100% 초기 중복
            fps: 15,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for config in [
            Config::default(),
            Config::low_spec(),
            Config::high_density(),
            Config::unstable_capture(),
        ] {
            assert!(config.validate().is_ok(), "{:?}", config);
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.chunk_size = MAX_CHUNK_SIZE + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.soliton_delta = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.fps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_initial_fountain_count() {
        let config = Config::default();
        assert_eq!(config.initial_fountain_count(5), 3);
        assert_eq!(config.initial_fountain_count(4), 2);
        assert_eq!(config.frame_interval_us(), 50_000);
    }
}

//! seed 기반 의사 난수 생성기
//!
//! 송신자와 수신자가 같은 seed로 같은 degree/인덱스를 재현해야 하므로
//! 인덱스 목록 대신 seed만 전송됨. xorshift32 점화식 사용.
//!
//! `>> 17`은 부호 있는 32비트 산술 시프트, 정규화는 `u32::MAX`로 나눔.
//! 둘 중 하나라도 바뀌면 같은 seed에서 다른 인덱스가 나와 기존 송신기와 호환되지 않음.

/// seed 0은 xorshift 고정점이므로 대체 상태 사용
const ZERO_SEED_STATE: u32 = 0x9E37_79B9;

/// next_f64 정규화 분모 (상태가 `u32::MAX`이면 정확히 1.0)
const U32_RANGE: f64 = u32::MAX as f64;

/// 재현 가능한 xorshift32 생성기
#[derive(Debug, Clone)]
pub struct SeededRng {
    state: u32,
}

impl SeededRng {
    /// seed로 생성기 초기화
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { ZERO_SEED_STATE } else { seed },
        }
    }

    /// 다음 32비트 상태
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= ((x as i32) >> 17) as u32;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// [0, 1] 범위 실수
    pub fn next_f64(&mut self) -> f64 {
        self.next_u32() as f64 / U32_RANGE
    }

    /// [0, n) 범위 정수
    ///
    /// `next_f64`가 1.0인 경우 마지막 인덱스로 자름.
    pub fn next_below(&mut self, n: usize) -> usize {
        ((self.next_f64() * n as f64) as usize).min(n.saturating_sub(1))
    }

    /// [0, n) 범위에서 서로 다른 정수 `count`개 선택 (추출 순서 유지)
    ///
    /// `count`는 `n`으로 제한됨. 원하는 개수가 될 때까지 중복은 버리고 다시 뽑음.
    pub fn select_unique(&mut self, count: usize, n: usize) -> Vec<usize> {
        let count = count.min(n);
        let mut selected = Vec::with_capacity(count);

        while selected.len() < count {
            let candidate = self.next_below(n);
            if !selected.contains(&candidate) {
                selected.push(candidate);
            }
        }

        selected
    }
}

//! LT fountain 코덱
//!
//! fountain 청크 = seed로 뽑은 소스 청크들의 XOR.
//! degree와 인덱스는 seed + 분포에서 결정적으로 유도되며 전송되지 않음.

use bytes::Bytes;

use crate::frame::FountainPayload;
use crate::prng::SeededRng;
use crate::soliton::SolitonDistribution;
use crate::{Error, Result};

/// fountain 청크 (수신측에서는 누락 카운트를 함께 관리)
#[derive(Debug, Clone)]
pub struct FountainChunk {
    /// 인덱스 재현용 seed
    pub seed: u32,

    /// 조합된 소스 청크 수
    pub degree: usize,

    /// 조합된 소스 청크 인덱스 (서로 다름, 길이 == degree)
    pub indices: Vec<usize>,

    /// 참여 청크들의 XOR (가장 긴 청크 길이로 0 패딩)
    pub data: Bytes,

    /// 아직 복구되지 않은 인덱스 수
    pub missing_count: usize,
}

impl FountainChunk {
    /// 수신한 fountain 페이로드 검증 및 변환
    ///
    /// seed에서 degree를 다시 계산해 선언된 degree와 다르면 거부함.
    /// `missing_count`는 테이블 삽입 시 계산됨.
    pub fn from_payload(
        payload: &FountainPayload,
        k: usize,
        distribution: &SolitonDistribution,
    ) -> Result<Self> {
        let (degree, indices) = derive_layout(payload.seed, k, distribution);
        if degree != payload.degree as usize {
            return Err(Error::DegreeMismatch {
                seed: payload.seed,
                declared: payload.degree,
                expected: degree,
            });
        }

        Ok(Self {
            seed: payload.seed,
            degree,
            missing_count: indices.len(),
            indices,
            data: payload.data.clone(),
        })
    }

    /// 전송용 페이로드로 변환
    pub fn to_payload(&self) -> FountainPayload {
        FountainPayload {
            seed: self.seed,
            degree: self.degree as u16,
            indices_len: self.indices.len() as u16,
            data: self.data.clone(),
        }
    }

    /// 해당 소스 인덱스를 포함하는지
    pub fn covers(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }
}

/// seed에서 (degree, 인덱스) 유도
///
/// degree를 먼저 뽑고 같은 생성기로 인덱스를 이어서 뽑음. 순서가 바뀌면 호환되지 않음.
pub fn derive_layout(seed: u32, k: usize, distribution: &SolitonDistribution) -> (usize, Vec<usize>) {
    let mut rng = SeededRng::new(seed);
    let degree = distribution.sample_degree(&mut rng);
    let indices = rng.select_unique(degree, k);
    (degree, indices)
}

/// fountain 청크 생성
pub fn encode(
    source_chunks: &[Bytes],
    k: usize,
    seed: u32,
    distribution: &SolitonDistribution,
) -> FountainChunk {
    let (degree, indices) = derive_layout(seed, k, distribution);

    let max_len = indices
        .iter()
        .filter_map(|&idx| source_chunks.get(idx))
        .map(|chunk| chunk.len())
        .max()
        .unwrap_or(0);

    let mut data = vec![0u8; max_len];
    for chunk in indices.iter().filter_map(|&idx| source_chunks.get(idx)) {
        xor_into(&mut data, chunk);
    }

    FountainChunk {
        seed,
        degree,
        missing_count: 0,
        indices,
        data: Bytes::from(data),
    }
}

/// `dst ^= src` (짧은 쪽 길이까지, 나머지는 0 패딩으로 간주)
pub fn xor_into(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d ^= *s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunks() -> Vec<Bytes> {
        vec![
            Bytes::from_static(&[1, 2, 3, 4]),
            Bytes::from_static(&[5, 6, 7, 8]),
            Bytes::from_static(&[9, 10, 11, 12]),
            Bytes::from_static(&[13, 14]),
        ]
    }

    #[test]
    fn test_encode_matches_recomputed_layout() {
        let chunks = sample_chunks();
        let dist = SolitonDistribution::robust(4, 0.03, 0.05);

        for seed in 1..500u32 {
            let chunk = encode(&chunks, 4, seed, &dist);
            let (degree, indices) = derive_layout(seed, 4, &dist);
            assert_eq!(chunk.degree, degree);
            assert_eq!(chunk.indices, indices);
            assert_eq!(chunk.indices.len(), chunk.degree);
            assert!(chunk.degree >= 1);
        }
    }

    #[test]
    fn test_layout_reference_vectors() {
        // K=10 에서 seed별 (degree, 인덱스) 기준값
        let dist = SolitonDistribution::robust(10, 0.03, 0.05);
        let cases: [(u32, usize, &[usize]); 7] = [
            (1, 1, &[0]),
            (42, 1, &[6]),
            (12345, 4, &[3, 6, 4, 8]),
            (0xDEAD_BEEF, 2, &[5, 2]),
            (0x8000_0001, 2, &[4, 9]),
            (99999, 2, &[3, 8]),
            (0xFFFF_FFFF, 1, &[9]),
        ];

        for (seed, degree, indices) in cases {
            let (got_degree, got_indices) = derive_layout(seed, 10, &dist);
            assert_eq!(got_degree, degree, "seed {:08X}", seed);
            assert_eq!(got_indices, indices, "seed {:08X}", seed);
        }
    }

    #[test]
    fn test_encode_xor_with_padding() {
        let chunks = sample_chunks();
        let dist = SolitonDistribution::robust(4, 0.03, 0.05);

        for seed in 1..500u32 {
            let chunk = encode(&chunks, 4, seed, &dist);
            let mut expected = vec![0u8; 4];
            let mut max_len = 0;
            for &idx in &chunk.indices {
                xor_into(&mut expected, &chunks[idx]);
                max_len = max_len.max(chunks[idx].len());
            }
            expected.truncate(max_len);
            assert_eq!(chunk.data.as_ref(), expected.as_slice());
        }
    }

    #[test]
    fn test_payload_validation_rejects_wrong_degree() {
        let chunks = sample_chunks();
        let dist = SolitonDistribution::robust(4, 0.03, 0.05);
        let chunk = encode(&chunks, 4, 99, &dist);

        let mut payload = chunk.to_payload();
        assert!(FountainChunk::from_payload(&payload, 4, &dist).is_ok());

        payload.degree = if chunk.degree == 1 { 2 } else { 1 };
        match FountainChunk::from_payload(&payload, 4, &dist) {
            Err(Error::DegreeMismatch { seed, .. }) => assert_eq!(seed, 99),
            other => panic!("degree 불일치가 거부되지 않음: {:?}", other),
        }
    }
}

//! robust soliton degree 분포
//!
//! 송신자와 수신자가 같은 (K, c, delta)로 동일한 누적 테이블을 계산해야
//! seed로부터 같은 degree를 재현할 수 있음.

use crate::prng::SeededRng;

/// robust soliton 누적 분포 (인덱스 = degree, `cumulative[0] == 0`)
#[derive(Debug, Clone)]
pub struct SolitonDistribution {
    cumulative: Vec<f64>,
}

impl SolitonDistribution {
    /// K개 청크에 대한 robust soliton 분포 계산
    ///
    /// K가 0이면 1로 취급함.
    pub fn robust(k: usize, c: f64, delta: f64) -> Self {
        let k = k.max(1);
        let kf = k as f64;
        let r = c * (kf / delta).ln() * kf.sqrt();
        let s = kf / r;

        let mut dist = vec![0.0f64; k + 1];

        // ideal soliton
        dist[1] = 1.0 / kf;
        for d in 2..=k {
            dist[d] = 1.0 / (d as f64 * (d as f64 - 1.0));
        }

        // robustness 항
        let limit = (kf / s).floor();
        if limit >= 1.0 {
            let limit = (limit as usize).min(k);
            for (d, weight) in dist.iter_mut().enumerate().take(limit + 1).skip(1) {
                *weight += r / (kf * d as f64);
            }
        }

        // floor(S) 위치의 spike
        let spike = s.floor();
        if spike >= 1.0 && spike <= kf {
            dist[spike as usize] += r / kf * (r / delta).ln();
        }

        let total: f64 = dist[1..].iter().sum();
        for weight in dist[1..].iter_mut() {
            *weight /= total;
        }

        for d in 1..=k {
            dist[d] += dist[d - 1];
        }

        Self { cumulative: dist }
    }

    /// 청크 수 K
    pub fn k(&self) -> usize {
        self.cumulative.len() - 1
    }

    /// 누적 테이블
    pub fn cumulative(&self) -> &[f64] {
        &self.cumulative
    }

    /// degree 샘플링: `cumulative[d] > r`인 최소 d, 없으면 1
    pub fn sample_degree(&self, rng: &mut SeededRng) -> usize {
        let r = rng.next_f64();
        self.cumulative
            .iter()
            .skip(1)
            .position(|&c| r < c)
            .map(|pos| pos + 1)
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cumulative_is_valid() {
        for k in [1usize, 2, 3, 4, 5, 10, 50, 100, 1000, 5000] {
            let dist = SolitonDistribution::robust(k, 0.03, 0.05);
            let table = dist.cumulative();
            assert_eq!(table.len(), k + 1);
            assert_eq!(table[0], 0.0);
            for w in table.windows(2) {
                assert!(w[1] >= w[0], "k={} 누적값 감소", k);
            }
            assert!((table[k] - 1.0).abs() < 1e-9, "k={} 합계 {}", k, table[k]);
        }
    }

    #[test]
    fn test_sample_degree_in_range() {
        for k in [1usize, 4, 37, 500] {
            let dist = SolitonDistribution::robust(k, 0.03, 0.05);
            for seed in 1..2000u32 {
                let d = dist.sample_degree(&mut SeededRng::new(seed));
                assert!(d >= 1 && d <= k, "k={} d={}", k, d);
            }
        }
    }

    #[test]
    fn test_small_k_is_ideal_soliton() {
        // K=4 에서는 robustness 항과 spike가 범위를 벗어남
        let dist = SolitonDistribution::robust(4, 0.03, 0.05);
        let table = dist.cumulative();
        assert!((table[1] - 0.25).abs() < 1e-12);
        assert!((table[2] - 0.75).abs() < 1e-12);
        assert!((table[3] - (0.75 + 1.0 / 6.0)).abs() < 1e-12);
    }

    #[test]
    fn test_large_k_has_spike() {
        let k = 10_000;
        let dist = SolitonDistribution::robust(k, 0.03, 0.05);
        let table = dist.cumulative();
        let kf = k as f64;
        let r = 0.03 * (kf / 0.05).ln() * kf.sqrt();
        let spike = (kf / r).floor() as usize;
        let mass_at_spike = table[spike] - table[spike - 1];
        let mass_after = table[spike + 1] - table[spike];
        assert!(mass_at_spike > mass_after * 10.0);
    }
}

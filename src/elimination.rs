//! GF(2) 가우스 소거 디코더 (peeling 보조)
//!
//! peeling이 멈췄을 때 남은 누락 청크를 연립방정식으로 정확히 복구.
//! 각 fountain 청크가 방정식 하나: 계수는 포함한 미지 인덱스에 1, 상수는 fountain 데이터에서
//! 이미 아는 청크들을 XOR로 제거한 값. 상수 벡터의 각 바이트는 같은 계수 행렬을 공유하는
//! 8개의 독립 GF(2) 시스템이므로 바이트 벡터 전체를 한 번에 행 연산함.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::chunk::ChunkTable;
use crate::fountain::xor_into;

/// 기본 최대 미지수 수
pub const MAX_UNKNOWNS: usize = 50;

/// 연립방정식 풀이 실패 원인
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
    /// 방정식 수가 미지수보다 적음
    Underdetermined { equations: usize, unknowns: usize },

    /// 0 = 1 형태의 모순 행 존재
    Inconsistent,

    /// 계수 행렬이 full rank가 아님 (해가 유일하지 않음)
    RankDeficient { rank: usize, unknowns: usize },
}

/// 비트 집합 계수 행
#[derive(Debug, Clone, PartialEq, Eq)]
struct BitRow {
    words: Vec<u64>,
}

impl BitRow {
    fn new(bits: usize) -> Self {
        Self {
            words: vec![0; (bits + 63) / 64],
        }
    }

    fn get(&self, bit: usize) -> bool {
        self.words[bit / 64] >> (bit % 64) & 1 == 1
    }

    fn set(&mut self, bit: usize) {
        self.words[bit / 64] |= 1 << (bit % 64);
    }

    fn xor_assign(&mut self, other: &BitRow) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a ^= *b;
        }
    }

    fn is_zero(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }
}

/// GF(2) 방정식 (계수 행 + 바이트 상수)
#[derive(Debug, Clone)]
pub struct Equation {
    coeffs: BitRow,
    rhs: Vec<u8>,
}

impl Equation {
    /// `columns`에 나열된 미지수의 XOR이 `rhs`와 같다는 방정식
    pub fn new(columns: impl IntoIterator<Item = usize>, unknowns: usize, rhs: Vec<u8>) -> Self {
        let mut coeffs = BitRow::new(unknowns);
        for col in columns {
            if col < unknowns {
                coeffs.set(col);
            }
        }
        Self { coeffs, rhs }
    }

    fn xor_assign(&mut self, other: &Equation) {
        self.coeffs.xor_assign(&other.coeffs);
        xor_into(&mut self.rhs, &other.rhs);
    }
}

/// GF(2) 연립방정식 풀이
///
/// partial pivoting 전진 소거 → 모순 검사 → 후진 대입.
/// 성공 시 미지수 순서대로 값을 반환 (모든 값은 가장 긴 상수 길이로 맞춰짐).
pub fn solve(mut rows: Vec<Equation>, unknowns: usize) -> Result<Vec<Vec<u8>>, SolveError> {
    if rows.len() < unknowns {
        return Err(SolveError::Underdetermined {
            equations: rows.len(),
            unknowns,
        });
    }

    let width = rows.iter().map(|r| r.rhs.len()).max().unwrap_or(0);
    for row in &mut rows {
        row.rhs.resize(width, 0);
    }

    let mut rank = 0;
    let mut pivot_cols = Vec::with_capacity(unknowns);

    for col in 0..unknowns {
        if rank >= rows.len() {
            break;
        }

        let pivot = match (rank..rows.len()).find(|&r| rows[r].coeffs.get(col)) {
            Some(r) => r,
            None => continue,
        };
        rows.swap(rank, pivot);

        let (upper, lower) = rows.split_at_mut(rank + 1);
        let pivot_row = &upper[rank];
        for row in lower.iter_mut() {
            if row.coeffs.get(col) {
                row.xor_assign(pivot_row);
            }
        }

        pivot_cols.push(col);
        rank += 1;
    }

    if rows[rank..]
        .iter()
        .any(|row| row.coeffs.is_zero() && row.rhs.iter().any(|&b| b != 0))
    {
        return Err(SolveError::Inconsistent);
    }

    if rank < unknowns {
        return Err(SolveError::RankDeficient { rank, unknowns });
    }

    let mut solution: Vec<Option<Vec<u8>>> = vec![None; unknowns];
    for row_idx in (0..rank).rev() {
        let col = pivot_cols[row_idx];
        let row = &rows[row_idx];
        let mut value = row.rhs.clone();
        for other in (col + 1)..unknowns {
            if row.coeffs.get(other) {
                if let Some(known) = &solution[other] {
                    xor_into(&mut value, known);
                }
            }
        }
        solution[col] = Some(value);
    }

    Ok(solution
        .into_iter()
        .map(|value| value.unwrap_or_default())
        .collect())
}

/// 테이블 단위 소거 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EliminationOutcome {
    /// 누락 청크 없음
    NothingMissing,

    /// 미지수가 상한 초과
    TooManyUnknowns { missing: usize, limit: usize },

    /// 관련 fountain 청크가 미지수보다 적음
    NotEnoughEquations { equations: usize, unknowns: usize },

    /// 모순 또는 rank 부족
    Unsolvable(SolveError),

    /// 복구된 인덱스
    Recovered(Vec<usize>),
}

/// 테이블의 누락 청크를 가우스 소거로 복구 시도
///
/// 실패는 이번 시도만 중단하며 테이블은 그대로 유지됨.
pub fn run(table: &mut ChunkTable, max_unknowns: usize) -> EliminationOutcome {
    let missing = table.missing_indices();
    if missing.is_empty() {
        return EliminationOutcome::NothingMissing;
    }

    if missing.len() > max_unknowns {
        warn!(
            "가우스 소거 생략: 누락 청크 {}개 (최대 {})",
            missing.len(),
            max_unknowns
        );
        return EliminationOutcome::TooManyUnknowns {
            missing: missing.len(),
            limit: max_unknowns,
        };
    }

    let column_of: HashMap<usize, usize> = missing
        .iter()
        .enumerate()
        .map(|(col, &idx)| (idx, col))
        .collect();

    let relevant: Vec<_> = table
        .fountains()
        .filter(|f| f.indices.iter().any(|idx| column_of.contains_key(idx)))
        .collect();

    if relevant.len() < missing.len() {
        debug!(
            "가우스 소거 불가: 관련 fountain {}개 < 누락 {}개",
            relevant.len(),
            missing.len()
        );
        return EliminationOutcome::NotEnoughEquations {
            equations: relevant.len(),
            unknowns: missing.len(),
        };
    }

    let known_width = (0..table.total().unwrap_or(0))
        .filter_map(|idx| table.get(idx).map(|c| c.len()))
        .max()
        .unwrap_or(0);
    let width = relevant
        .iter()
        .map(|f| f.data.len())
        .max()
        .unwrap_or(0)
        .max(known_width);

    let equations: Vec<Equation> = relevant
        .iter()
        .map(|fountain| {
            let mut rhs = fountain.data.to_vec();
            rhs.resize(width, 0);
            for &idx in &fountain.indices {
                if let Some(chunk) = table.get(idx) {
                    xor_into(&mut rhs, chunk);
                }
            }
            let columns = fountain
                .indices
                .iter()
                .filter_map(|idx| column_of.get(idx).copied());
            Equation::new(columns, missing.len(), rhs)
        })
        .collect();

    match solve(equations, missing.len()) {
        Ok(values) => {
            let mut recovered = Vec::with_capacity(missing.len());
            for (col, value) in values.into_iter().enumerate() {
                let idx = missing[col];
                if table.insert_recovered(idx, value) {
                    debug!("가우스 소거로 청크 {} 복구", idx);
                    recovered.push(idx);
                }
            }
            debug!(
                "가우스 소거 이후: {}/{} 청크",
                table.known_count(),
                table.total().unwrap_or(0)
            );
            EliminationOutcome::Recovered(recovered)
        }
        Err(err) => {
            warn!("가우스 소거 실패: {:?}", err);
            EliminationOutcome::Unsolvable(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fountain::FountainChunk;
    use bytes::Bytes;

    fn check(rows: &[(Vec<usize>, Vec<u8>)], solution: &[Vec<u8>]) {
        for (cols, rhs) in rows {
            let mut acc = vec![0u8; rhs.len()];
            for &c in cols {
                xor_into(&mut acc, &solution[c]);
            }
            assert_eq!(&acc, rhs);
        }
    }

    fn system(rows: &[(Vec<usize>, Vec<u8>)], unknowns: usize) -> Vec<Equation> {
        rows.iter()
            .map(|(cols, rhs)| Equation::new(cols.clone(), unknowns, rhs.clone()))
            .collect()
    }

    #[test]
    fn test_solve_full_rank() {
        // x0=0x11, x1=0x22, x2=0x44
        let rows = vec![
            (vec![0, 1], vec![0x33]),
            (vec![1, 2], vec![0x66]),
            (vec![0, 1, 2], vec![0x77]),
        ];
        let solution = solve(system(&rows, 3), 3).unwrap();
        assert_eq!(solution, vec![vec![0x11], vec![0x22], vec![0x44]]);
        check(&rows, &solution);
    }

    #[test]
    fn test_solve_overdetermined_consistent() {
        let rows = vec![
            (vec![0], vec![1, 2]),
            (vec![0, 1], vec![3, 2]),
            (vec![1], vec![2, 0]),
            (vec![0, 1], vec![3, 2]),
        ];
        let solution = solve(system(&rows, 2), 2).unwrap();
        check(&rows, &solution);
    }

    #[test]
    fn test_solve_inconsistent() {
        let rows = vec![
            (vec![0], vec![1]),
            (vec![1], vec![2]),
            (vec![0, 1], vec![7]),
        ];
        assert_eq!(solve(system(&rows, 2), 2), Err(SolveError::Inconsistent));
    }

    #[test]
    fn test_solve_rank_deficient() {
        let rows = vec![
            (vec![0, 1], vec![1]),
            (vec![1, 2], vec![2]),
            (vec![0, 2], vec![3]),
        ];
        assert_eq!(
            solve(system(&rows, 3), 3),
            Err(SolveError::RankDeficient { rank: 2, unknowns: 3 })
        );
    }

    #[test]
    fn test_solve_underdetermined() {
        let rows = vec![(vec![0, 1], vec![1])];
        assert_eq!(
            solve(system(&rows, 2), 2),
            Err(SolveError::Underdetermined { equations: 1, unknowns: 2 })
        );
    }

    #[test]
    fn test_solve_wide_system() {
        // 64비트 경계를 넘는 미지수
        let unknowns = 70;
        let mut rows = Vec::new();
        for i in 0..unknowns {
            let cols = if i + 1 < unknowns { vec![i, i + 1] } else { vec![i] };
            rows.push((cols, vec![(i % 251) as u8]));
        }
        let solution = solve(system(&rows, unknowns), unknowns).unwrap();
        check(&rows, &solution);
    }

    fn fountain(seed: u32, indices: Vec<usize>, chunks: &[Vec<u8>]) -> FountainChunk {
        let mut data = vec![0u8; chunks[0].len()];
        for &i in &indices {
            xor_into(&mut data, &chunks[i]);
        }
        FountainChunk {
            seed,
            degree: indices.len(),
            indices,
            data: Bytes::from(data),
            missing_count: 0,
        }
    }

    #[test]
    fn test_run_recovers_when_peeling_stalls() {
        let chunks: Vec<Vec<u8>> = (0..4u8).map(|i| vec![i + 1; 6]).collect();
        let mut table = ChunkTable::with_total(4);
        table.insert_source(0, Bytes::from(chunks[0].clone()));
        table.insert_fountain(fountain(1, vec![1, 2], &chunks));
        table.insert_fountain(fountain(2, vec![0, 2, 3], &chunks));
        table.insert_fountain(fountain(3, vec![1, 2, 3], &chunks));

        assert!(crate::peeling::run(&mut table, 10).recovered.is_empty());

        let outcome = run(&mut table, MAX_UNKNOWNS);
        assert_eq!(outcome, EliminationOutcome::Recovered(vec![1, 2, 3]));
        assert_eq!(table.assemble().unwrap(), chunks.concat());
    }

    #[test]
    fn test_run_limits() {
        let chunks: Vec<Vec<u8>> = (0..4u8).map(|i| vec![i + 1; 2]).collect();
        let mut table = ChunkTable::with_total(4);
        table.insert_fountain(fountain(1, vec![0, 1], &chunks));

        assert_eq!(
            run(&mut table, 3),
            EliminationOutcome::TooManyUnknowns { missing: 4, limit: 3 }
        );
        assert_eq!(
            run(&mut table, MAX_UNKNOWNS),
            EliminationOutcome::NotEnoughEquations { equations: 1, unknowns: 4 }
        );
        assert_eq!(table.known_count(), 0);
    }
}

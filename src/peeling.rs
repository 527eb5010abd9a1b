//! peeling 디코더
//!
//! 누락 카운트가 1인 fountain 청크에서 남은 하나의 소스 청크를 XOR로 바로 복구.
//! 복구는 다른 fountain 청크의 누락 카운트를 줄여 연쇄적으로 진행됨.

use tracing::debug;

use crate::chunk::ChunkTable;
use crate::fountain::xor_into;

/// 기본 최대 라운드 수
pub const MAX_ROUNDS: usize = 10;

/// peeling 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeelingOutcome {
    /// 복구된 인덱스 (복구 순서)
    pub recovered: Vec<usize>,

    /// 실행한 라운드 수
    pub rounds: usize,

    /// 전부 0이라 거부된 복구 시도 수
    pub rejected_zero: usize,
}

/// peeling 실행
///
/// 진행이 없거나 모든 청크를 알거나 `max_rounds`에 도달하면 종료.
/// 복구 결과가 전부 0이면 (길이 0 제외) XOR 상쇄 노이즈로 보고 받아들이지 않음.
/// 따라서 실제로 0으로만 된 청크는 peeling으로는 복구되지 않음.
pub fn run(table: &mut ChunkTable, max_rounds: usize) -> PeelingOutcome {
    let mut outcome = PeelingOutcome::default();
    let total = match table.total() {
        Some(total) => total,
        None => return outcome,
    };

    let mut progress = true;
    while progress && table.known_count() < total && outcome.rounds < max_rounds {
        progress = false;
        outcome.rounds += 1;

        for seed in table.fountain_seeds() {
            let (missing_idx, recovered) = {
                let fountain = match table.fountain(seed) {
                    Some(f) if f.missing_count == 1 => f,
                    _ => continue,
                };

                let missing_idx = match fountain.indices.iter().find(|&&idx| !table.contains(idx)) {
                    Some(&idx) => idx,
                    None => continue,
                };

                let mut recovered = fountain.data.to_vec();
                for &idx in &fountain.indices {
                    if idx == missing_idx {
                        continue;
                    }
                    if let Some(chunk) = table.get(idx) {
                        xor_into(&mut recovered, chunk);
                    }
                }
                (missing_idx, recovered)
            };

            let is_valid = recovered.is_empty() || recovered.iter().any(|&b| b != 0);
            if !is_valid {
                outcome.rejected_zero += 1;
                continue;
            }

            if table.insert_recovered(missing_idx, recovered) {
                debug!("peeling으로 청크 {} 복구 (seed={:08X})", missing_idx, seed);
                outcome.recovered.push(missing_idx);
                progress = true;
            }
        }
    }

    debug!(
        "peeling 이후: {}/{} 청크, {} 라운드",
        table.known_count(),
        total,
        outcome.rounds
    );
    outcome
}

//! 소스 청크 분할과 수신측 청크 테이블
//!
//! - ChunkSplitter: 송신 페이로드를 고정 크기 청크로 분할 (마지막 청크만 짧을 수 있음)
//! - ChunkTable: 수신측 소스 청크 + fountain 청크 테이블. 스캔 루프 하나만 수정함

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::fountain::FountainChunk;

/// 청크 분할기 (송신측)
#[derive(Debug, Clone, Copy)]
pub struct ChunkSplitter {
    chunk_size: usize,
}

impl ChunkSplitter {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// 데이터 길이에 대한 청크 수
    pub fn chunk_count(&self, len: usize) -> usize {
        (len + self.chunk_size - 1) / self.chunk_size
    }

    /// 데이터를 청크들로 분할 (복사 없이 슬라이스)
    pub fn split(&self, data: &Bytes) -> Vec<Bytes> {
        (0..self.chunk_count(data.len()))
            .map(|idx| {
                let start = idx * self.chunk_size;
                let end = (start + self.chunk_size).min(data.len());
                data.slice(start..end)
            })
            .collect()
    }
}

/// 메타데이터에서 알게 된 청크 배치 정보
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    /// 청크 크기
    pub chunk_size: usize,

    /// 전송 페이로드 전체 크기
    pub payload_len: usize,
}

impl ChunkLayout {
    /// 인덱스별 기대 길이 (마지막 청크만 짧음)
    pub fn chunk_len(&self, index: usize, total: usize) -> usize {
        if index + 1 < total {
            self.chunk_size
        } else {
            self.payload_len
                .saturating_sub(self.chunk_size * total.saturating_sub(1))
        }
    }
}

/// 수신측 청크 테이블
///
/// 소스 청크(index → bytes)와 fountain 청크(seed → chunk)를 함께 소유하여
/// fountain 청크의 `missing_count == |indices ∩ 미복구 인덱스|` 를 유지함.
#[derive(Debug, Default)]
pub struct ChunkTable {
    total: Option<usize>,
    layout: Option<ChunkLayout>,
    source: BTreeMap<usize, Bytes>,
    fountains: BTreeMap<u32, FountainChunk>,
    revision: u64,
}

impl ChunkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_total(total: usize) -> Self {
        Self {
            total: Some(total),
            ..Self::default()
        }
    }

    /// 총 청크 수 (모르면 None)
    pub fn total(&self) -> Option<usize> {
        self.total
    }

    /// 총 청크 수 설정 (세션 동안 고정)
    pub fn set_total(&mut self, total: usize) {
        self.total = Some(total);
    }

    pub fn layout(&self) -> Option<ChunkLayout> {
        self.layout
    }

    /// 레이아웃 설정
    ///
    /// 이미 들어온 소스 청크 중 기대 길이와 다른 것은 제거하고 그 인덱스를 돌려줌.
    pub fn set_layout(&mut self, layout: ChunkLayout) -> Vec<usize> {
        self.layout = Some(layout);

        let mismatched: Vec<usize> = self
            .source
            .iter()
            .filter(|&(&idx, data)| self.expected_len(idx).map_or(false, |len| len != data.len()))
            .map(|(&idx, _)| idx)
            .collect();

        for &idx in &mismatched {
            self.source.remove(&idx);
            for fountain in self.fountains.values_mut() {
                if fountain.covers(idx) {
                    fountain.missing_count += 1;
                }
            }
        }
        if !mismatched.is_empty() {
            self.revision += 1;
        }
        mismatched
    }

    /// 인덱스의 기대 길이 (레이아웃과 총 청크 수를 알 때만)
    pub fn expected_len(&self, index: usize) -> Option<usize> {
        let total = self.total?;
        self.layout.map(|layout| layout.chunk_len(index, total))
    }

    /// 테이블 변경 횟수
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn contains(&self, index: usize) -> bool {
        self.source.contains_key(&index)
    }

    pub fn get(&self, index: usize) -> Option<&Bytes> {
        self.source.get(&index)
    }

    /// 소스 청크 삽입
    ///
    /// 범위 밖이거나 이미 있으면 false. 삽입 시 해당 인덱스를 포함하는
    /// fountain 청크들의 누락 카운트를 줄임.
    pub fn insert_source(&mut self, index: usize, data: Bytes) -> bool {
        if let Some(total) = self.total {
            if index >= total {
                return false;
            }
        }
        if self.source.contains_key(&index) {
            return false;
        }

        self.source.insert(index, data);
        for fountain in self.fountains.values_mut() {
            if fountain.covers(index) {
                fountain.missing_count = fountain.missing_count.saturating_sub(1);
            }
        }
        self.revision += 1;
        true
    }

    /// 디코더가 복구한 청크 삽입 (레이아웃을 알면 기대 길이로 자름)
    pub fn insert_recovered(&mut self, index: usize, mut data: Vec<u8>) -> bool {
        if let Some(len) = self.expected_len(index) {
            data.resize(len, 0);
        }
        self.insert_source(index, Bytes::from(data))
    }

    /// fountain 청크 삽입 (같은 seed는 한 번만)
    pub fn insert_fountain(&mut self, mut chunk: FountainChunk) -> bool {
        if self.fountains.contains_key(&chunk.seed) {
            return false;
        }

        chunk.missing_count = chunk
            .indices
            .iter()
            .filter(|idx| !self.source.contains_key(idx))
            .count();
        self.fountains.insert(chunk.seed, chunk);
        self.revision += 1;
        true
    }

    pub fn contains_fountain(&self, seed: u32) -> bool {
        self.fountains.contains_key(&seed)
    }

    pub fn fountain(&self, seed: u32) -> Option<&FountainChunk> {
        self.fountains.get(&seed)
    }

    pub fn fountains(&self) -> impl Iterator<Item = &FountainChunk> {
        self.fountains.values()
    }

    /// fountain seed 목록 (삽입 중 순회용 스냅샷)
    pub fn fountain_seeds(&self) -> Vec<u32> {
        self.fountains.keys().copied().collect()
    }

    /// 알고 있는 소스 청크 수
    pub fn known_count(&self) -> usize {
        self.source.len()
    }

    pub fn fountain_count(&self) -> usize {
        self.fountains.len()
    }

    /// 모든 소스 청크가 있는지
    pub fn is_complete(&self) -> bool {
        match self.total {
            Some(total) => (0..total).all(|idx| self.source.contains_key(&idx)),
            None => false,
        }
    }

    /// 누락된 청크 인덱스 목록
    pub fn missing_indices(&self) -> Vec<usize> {
        match self.total {
            Some(total) => (0..total)
                .filter(|idx| !self.source.contains_key(idx))
                .collect(),
            None => Vec::new(),
        }
    }

    /// 수신률 계산
    pub fn receive_ratio(&self) -> f64 {
        match self.total {
            Some(total) if total > 0 => self.source.len() as f64 / total as f64,
            _ => 0.0,
        }
    }

    /// 0..K 순서로 청크 조합 (하나라도 없으면 None)
    pub fn assemble(&self) -> Option<Vec<u8>> {
        let total = self.total?;
        let size: usize = (0..total)
            .map(|idx| self.source.get(&idx).map(|c| c.len()))
            .sum::<Option<usize>>()?;

        let mut result = Vec::with_capacity(size);
        for idx in 0..total {
            result.extend_from_slice(self.source.get(&idx)?);
        }
        Some(result)
    }

    /// 테이블 초기화
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fountain(seed: u32, indices: Vec<usize>, data: &[u8]) -> FountainChunk {
        FountainChunk {
            seed,
            degree: indices.len(),
            indices,
            data: Bytes::copy_from_slice(data),
            missing_count: 0,
        }
    }

    #[test]
    fn test_split_and_assemble() {
        let splitter = ChunkSplitter::new(100);
        let data = Bytes::from((0..250u32).map(|i| i as u8).collect::<Vec<_>>());
        let chunks = splitter.split(&data);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 50);

        let mut table = ChunkTable::with_total(3);
        for (idx, chunk) in chunks.iter().enumerate().rev() {
            assert!(table.insert_source(idx, chunk.clone()));
        }

        assert!(table.is_complete());
        assert_eq!(table.assemble().unwrap(), data.to_vec());
    }

    #[test]
    fn test_layout_chunk_len() {
        let layout = ChunkLayout {
            chunk_size: 200,
            payload_len: 950,
        };
        assert_eq!(layout.chunk_len(0, 5), 200);
        assert_eq!(layout.chunk_len(3, 5), 200);
        assert_eq!(layout.chunk_len(4, 5), 150);
    }

    #[test]
    fn test_missing_count_tracks_resolution() {
        let mut table = ChunkTable::with_total(4);
        table.insert_source(0, Bytes::from_static(b"aa"));
        table.insert_fountain(fountain(10, vec![0, 1, 2], b"xx"));
        table.insert_fountain(fountain(11, vec![2, 3], b"yy"));

        assert_eq!(table.fountain(10).unwrap().missing_count, 2);
        assert_eq!(table.fountain(11).unwrap().missing_count, 2);

        table.insert_source(2, Bytes::from_static(b"cc"));
        assert_eq!(table.fountain(10).unwrap().missing_count, 1);
        assert_eq!(table.fountain(11).unwrap().missing_count, 1);

        // 중복 삽입은 카운트를 바꾸지 않음
        assert!(!table.insert_source(2, Bytes::from_static(b"cc")));
        assert_eq!(table.fountain(10).unwrap().missing_count, 1);
        assert!(!table.insert_fountain(fountain(10, vec![1], b"zz")));
    }

    #[test]
    fn test_rejects_out_of_range_index() {
        let mut table = ChunkTable::with_total(2);
        assert!(!table.insert_source(2, Bytes::from_static(b"x")));
        assert_eq!(table.missing_indices(), vec![0, 1]);
    }

    #[test]
    fn test_recovered_chunk_truncated_to_layout() {
        let mut table = ChunkTable::with_total(3);
        table.set_layout(ChunkLayout {
            chunk_size: 4,
            payload_len: 10,
        });
        assert!(table.insert_recovered(2, vec![1, 2, 0, 0]));
        assert_eq!(table.get(2).unwrap().as_ref(), &[1, 2]);
    }

    #[test]
    fn test_layout_evicts_wrong_length_chunks() {
        let mut table = ChunkTable::with_total(3);
        table.insert_source(0, Bytes::from_static(b"abcd"));
        table.insert_source(1, Bytes::from_static(b"ab"));
        table.insert_source(2, Bytes::from_static(b"xyz"));
        table.insert_fountain(fountain(7, vec![1, 2], b"zz"));
        assert_eq!(table.fountain(7).unwrap().missing_count, 0);
        let before = table.revision();

        let evicted = table.set_layout(ChunkLayout {
            chunk_size: 4,
            payload_len: 10,
        });

        // 1번은 4 bytes, 2번(마지막)은 2 bytes 여야 함
        assert_eq!(evicted, vec![1, 2]);
        assert_eq!(table.missing_indices(), vec![1, 2]);
        assert_eq!(table.get(0).unwrap().as_ref(), b"abcd");
        assert_eq!(table.fountain(7).unwrap().missing_count, 2);
        assert!(table.revision() > before);
        assert!(table.assemble().is_none());
    }
}

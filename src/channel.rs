//! 광학 채널 협력자 인터페이스
//!
//! 바코드 렌더러, 바코드 리더, 캡처 소스는 외부 구현. 여기서는 코어가 필요로 하는
//! 인터페이스와 프레임 파일 디렉터리를 채널로 쓰는 어댑터만 제공함.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{Error, Result};

/// 바코드 오류 정정 레벨 힌트
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorCorrection {
    /// ~7% 복구 (데이터 밀도 최대)
    #[default]
    Low,
    Medium,
    Quartile,
    High,
}

/// 바코드 렌더러
pub trait Renderer: Send {
    /// Latin-1 문자열로 해석된 프레임 바이트를 심볼로 표시
    fn render(&mut self, symbol: &str, level: ErrorCorrection) -> Result<()>;
}

/// 캡처된 이미지
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Bytes,
}

/// 바코드 리더
pub trait BarcodeReader: Send {
    /// 디코드 성공 시 문자열, 심볼이 없으면 None
    fn decode(&mut self, image: &CapturedImage) -> Option<String>;
}

/// 캡처 소스 (카메라, 이미지 업로드 등)
pub trait CaptureSource: Send {
    /// 캡처 시작. 취소될 때까지 프레임 이벤트를 반복 제공
    fn open(&mut self) -> Result<mpsc::Receiver<CapturedImage>>;

    /// 캡처 해제
    fn close(&mut self);
}

/// 바이트 → Latin-1 문자열 (바이트 하나 = 문자 하나)
pub fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Latin-1 문자열 → 바이트 (U+00FF 초과 문자가 있으면 None)
pub fn latin1_encode(text: &str) -> Option<Vec<u8>> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect()
}

/// 프레임 파일 이름
pub fn frame_file_name(seq: u64) -> String {
    format!("frame_{:06}.bin", seq)
}

/// 심볼 대신 프레임 바이트를 그대로 파일로 쓰는 렌더러
#[derive(Debug)]
pub struct FrameDirRenderer {
    dir: PathBuf,
    written: u64,
}

impl FrameDirRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, written: 0 })
    }

    /// 지금까지 쓴 프레임 수
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl Renderer for FrameDirRenderer {
    fn render(&mut self, symbol: &str, _level: ErrorCorrection) -> Result<()> {
        let bytes = latin1_encode(symbol).ok_or_else(|| {
            let code = symbol
                .chars()
                .map(u32::from)
                .find(|&code| code > 0xFF)
                .unwrap_or_default();
            Error::NonLatin1Symbol(code)
        })?;
        fs::write(self.dir.join(frame_file_name(self.written)), bytes)?;
        self.written += 1;
        Ok(())
    }
}

/// 이미지 픽셀 버퍼를 프레임 바이트 자체로 보는 리더
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFrameReader;

impl BarcodeReader for RawFrameReader {
    fn decode(&mut self, image: &CapturedImage) -> Option<String> {
        if image.pixels.is_empty() {
            return None;
        }
        Some(latin1_decode(&image.pixels))
    }
}

/// 프레임 디렉터리 재생 캡처 소스
///
/// 손실(드롭 비율)과 순서 섞기를 흉내낼 수 있음.
#[derive(Debug)]
pub struct FrameDirCapture {
    dir: PathBuf,
    passes: usize,
    loss: f64,
    shuffle: bool,
    seed: u64,
    opened: bool,
}

impl FrameDirCapture {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            passes: 1,
            loss: 0.0,
            shuffle: false,
            seed: 0,
            opened: false,
        }
    }

    /// 전체 프레임을 반복 제공할 횟수
    pub fn with_passes(mut self, passes: usize) -> Self {
        self.passes = passes.max(1);
        self
    }

    /// 프레임 드롭 비율 (0.0 ~ 1.0)
    pub fn with_loss(mut self, loss: f64) -> Self {
        self.loss = loss.clamp(0.0, 1.0);
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn read_frames(dir: &Path) -> Result<Vec<Bytes>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().map_or(false, |ext| ext == "bin"))
            .collect();
        paths.sort();

        paths
            .iter()
            .map(|path| Ok(Bytes::from(fs::read(path)?)))
            .collect()
    }
}

impl CaptureSource for FrameDirCapture {
    fn open(&mut self) -> Result<mpsc::Receiver<CapturedImage>> {
        let frames = Self::read_frames(&self.dir)
            .map_err(|e| Error::CaptureUnavailable(format!("{}: {}", self.dir.display(), e)))?;
        if frames.is_empty() {
            return Err(Error::CaptureUnavailable(format!(
                "{}: 프레임 파일 없음",
                self.dir.display()
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut images = Vec::with_capacity(frames.len() * self.passes);
        for _ in 0..self.passes {
            let mut pass: Vec<&Bytes> = frames.iter().collect();
            if self.shuffle {
                pass.shuffle(&mut rng);
            }
            for frame in pass {
                if self.loss > 0.0 && rng.gen::<f64>() < self.loss {
                    continue;
                }
                images.push(CapturedImage {
                    width: frame.len() as u32,
                    height: 1,
                    pixels: frame.clone(),
                });
            }
        }

        info!(
            "캡처 시작: {} ({}개 프레임, {}회 반복 → {}개 이벤트)",
            self.dir.display(),
            frames.len(),
            self.passes,
            images.len()
        );

        let (tx, rx) = mpsc::channel(images.len().max(1));
        for image in images {
            if tx.try_send(image).is_err() {
                break;
            }
        }
        self.opened = true;
        Ok(rx)
    }

    fn close(&mut self) {
        if self.opened {
            debug!("캡처 해제: {}", self.dir.display());
            self.opened = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_preserves_all_bytes() {
        let bytes: Vec<u8> = (0..=255u8).collect();
        let text = latin1_decode(&bytes);
        assert_eq!(text.chars().count(), 256);
        assert_eq!(latin1_encode(&text).unwrap(), bytes);
        assert!(latin1_encode("한글").is_none());
    }

    #[test]
    fn test_frame_dir_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = FrameDirRenderer::new(dir.path()).unwrap();
        renderer
            .render(&latin1_decode(&[0, 1, 0xFF]), ErrorCorrection::Low)
            .unwrap();
        renderer
            .render(&latin1_decode(b"QRBT"), ErrorCorrection::Low)
            .unwrap();
        assert_eq!(renderer.written(), 2);

        let mut capture = FrameDirCapture::new(dir.path()).with_passes(2);
        let mut rx = capture.open().unwrap();
        let mut reader = RawFrameReader;

        let mut seen = Vec::new();
        while let Ok(image) = rx.try_recv() {
            let text = reader.decode(&image).unwrap();
            seen.push(latin1_encode(&text).unwrap());
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], vec![0, 1, 0xFF]);
        assert_eq!(seen[3], b"QRBT".to_vec());
        capture.close();
    }

    #[test]
    fn test_render_rejects_non_latin1_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = FrameDirRenderer::new(dir.path()).unwrap();
        match renderer.render("ab\u{0100}c", ErrorCorrection::Low) {
            Err(Error::NonLatin1Symbol(code)) => assert_eq!(code, 0x100),
            other => panic!("Latin-1 밖 문자가 통과함: {:?}", other),
        }
        assert_eq!(renderer.written(), 0);
    }

    #[test]
    fn test_empty_dir_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut capture = FrameDirCapture::new(dir.path());
        assert!(matches!(capture.open(), Err(Error::CaptureUnavailable(_))));
    }

    #[test]
    fn test_full_loss_drops_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = FrameDirRenderer::new(dir.path()).unwrap();
        renderer.render("abc", ErrorCorrection::Low).unwrap();

        let mut capture = FrameDirCapture::new(dir.path()).with_loss(1.0);
        let mut rx = capture.open().unwrap();
        assert!(rx.try_recv().is_err());
    }
}

//! QRBT 수신기
//!
//! 프레임 파일 디렉터리를 캡처 소스로 재생하여 파일을 복구함.
//! 손실과 순서 섞기를 흉내내 광학 채널 조건을 재현할 수 있음.
//!
//! 사용법:
//!   cargo run --release --bin qrbt-receiver -- --in-dir <DIR> [OPTIONS]
//!
//! 예시:
//!   # 30% 손실 + 순서 섞기
//!   cargo run --release --bin qrbt-receiver -- -i frames --loss 0.3 --shuffle -o out.bin

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use qrbt::channel::{FrameDirCapture, RawFrameReader};
use qrbt::{Config, DeflateCompressor, Receiver, ReceiverState, ScanLoop, TracingEvents};

/// 수신기 설정
struct ReceiverArgs {
    in_dir: PathBuf,
    output: Option<PathBuf>,
    loss: f64,
    shuffle: bool,
    passes: usize,
    seed: u64,
    config: Config,
}

impl Default for ReceiverArgs {
    fn default() -> Self {
        Self {
            in_dir: PathBuf::from("frames"),
            output: None,
            loss: 0.0,
            shuffle: false,
            passes: 1,
            seed: 0,
            config: Config::default(),
        }
    }
}

fn parse_args() -> ReceiverArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = ReceiverArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--in-dir" | "-i" => {
                if i + 1 < args.len() {
                    parsed.in_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    parsed.output = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--loss" | "-l" => {
                if i + 1 < args.len() {
                    parsed.loss = args[i + 1].parse().expect("유효한 비율 필요");
                    i += 1;
                }
            }
            "--passes" | "-p" => {
                if i + 1 < args.len() {
                    parsed.passes = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--seed" => {
                if i + 1 < args.len() {
                    parsed.seed = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--shuffle" | "-s" => {
                parsed.shuffle = true;
            }
            "--no-peeling" => {
                parsed.config.peeling_enabled = false;
            }
            "--no-elimination" => {
                parsed.config.elimination_enabled = false;
            }
            "--help" | "-h" => {
                println!(
                    r#"QRBT Receiver - 프레임 디렉터리 재생 수신기

사용법:
  cargo run --release --bin qrbt-receiver -- --in-dir <DIR> [OPTIONS]

옵션:
  -i, --in-dir <DIR>     프레임 파일 디렉터리 (기본: frames)
  -o, --output <PATH>    복구 파일 저장 경로 (기본: 메타데이터의 파일 이름)
  -l, --loss <RATIO>     프레임 드롭 비율 0.0 ~ 1.0 (기본: 0)
  -s, --shuffle          프레임 순서 섞기
  -p, --passes <N>       디렉터리 반복 재생 횟수 (기본: 1)
  --seed <N>             손실/섞기 난수 seed
  --no-peeling           peeling 디코더 끄기
  --no-elimination       가우스 소거 끄기
  -h, --help             이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    parsed
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args();

    let capture = FrameDirCapture::new(&args.in_dir)
        .with_loss(args.loss)
        .with_shuffle(args.shuffle)
        .with_passes(args.passes)
        .with_seed(args.seed);
    let receiver = Receiver::new(
        args.config.clone(),
        Box::new(DeflateCompressor::default()),
        Arc::new(TracingEvents),
    );

    let scan = ScanLoop::spawn(receiver, capture, RawFrameReader)?;
    let receiver = scan.join().await?;
    info!("{}", receiver.stats().summary());

    match receiver.result() {
        Some(result) => {
            let path = args
                .output
                .clone()
                .unwrap_or_else(|| PathBuf::from(&result.name));
            std::fs::write(&path, &result.data)?;
            info!("{} bytes 저장 → {}", result.data.len(), path.display());
        }
        None => {
            let missing = receiver.missing_indices();
            warn!(
                "전송 미완료 (상태 {:?}), 누락 청크 {}개: {:?}",
                receiver.state(),
                missing.len(),
                missing
            );
            if receiver.state() != ReceiverState::Done {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

//! QRBT 송신기
//!
//! 파일을 프레임 시퀀스로 준비해 프레임 파일 디렉터리로 내보냄.
//! 각 파일은 바코드 하나에 실릴 바이트 그대로임.
//!
//! 사용법:
//!   cargo run --release --bin qrbt-sender -- --file <PATH> --out-dir <DIR> [OPTIONS]
//!
//! 예시:
//!   # 두 바퀴 분량 프레임 생성
//!   cargo run --release --bin qrbt-sender -- -f report.pdf -o frames --cycles 2
//!
//!   # 실시간 루프 5초 (fps 간격)
//!   cargo run --release --bin qrbt-sender -- -f report.pdf -o frames --duration 5

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use qrbt::channel::{latin1_decode, ErrorCorrection, FrameDirRenderer, Renderer};
use qrbt::{Config, DeflateCompressor, SendLoop, Sender, TracingEvents};

/// 송신기 설정
struct SenderArgs {
    file: Option<PathBuf>,
    out_dir: PathBuf,
    frames: Option<usize>,
    cycles: usize,
    duration: Option<u64>,
    trailer_at: Option<usize>,
    restart_percent: Option<f64>,
    config: Config,
}

impl Default for SenderArgs {
    fn default() -> Self {
        Self {
            file: None,
            out_dir: PathBuf::from("frames"),
            frames: None,
            cycles: 2,
            duration: None,
            trailer_at: None,
            restart_percent: None,
            config: Config::default(),
        }
    }
}

fn parse_args() -> SenderArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = SenderArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--file" | "-f" => {
                if i + 1 < args.len() {
                    parsed.file = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--out-dir" | "-o" => {
                if i + 1 < args.len() {
                    parsed.out_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--frames" | "-n" => {
                if i + 1 < args.len() {
                    parsed.frames = Some(args[i + 1].parse().expect("유효한 숫자 필요"));
                    i += 1;
                }
            }
            "--cycles" => {
                if i + 1 < args.len() {
                    parsed.cycles = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--duration" | "-d" => {
                if i + 1 < args.len() {
                    parsed.duration = Some(args[i + 1].parse().expect("유효한 숫자 필요"));
                    i += 1;
                }
            }
            "--chunk-size" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config.chunk_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--redundancy" | "-r" => {
                if i + 1 < args.len() {
                    parsed.config.redundancy_ratio = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--fps" => {
                if i + 1 < args.len() {
                    parsed.config.fps = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--trailer-at" => {
                if i + 1 < args.len() {
                    parsed.trailer_at = Some(args[i + 1].parse().expect("유효한 숫자 필요"));
                    i += 1;
                }
            }
            "--restart" => {
                if i + 1 < args.len() {
                    parsed.restart_percent = Some(args[i + 1].parse().expect("유효한 숫자 필요"));
                    i += 1;
                }
            }
            "--no-endless" => {
                parsed.config.endless_fountain = false;
            }
            "--preset" => {
                if i + 1 < args.len() {
                    parsed.config = match args[i + 1].as_str() {
                        "low-spec" => Config::low_spec(),
                        "high-density" => Config::high_density(),
                        "unstable" => Config::unstable_capture(),
                        _ => Config::default(),
                    };
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"QRBT Sender - 바코드 프레임 기반 fountain 코드 송신기

사용법:
  cargo run --release --bin qrbt-sender -- --file <PATH> [OPTIONS]

옵션:
  -f, --file <PATH>         전송할 파일
  -o, --out-dir <DIR>       프레임 파일 출력 디렉터리 (기본: frames)
  -n, --frames <N>          생성할 프레임 수 (기본: 준비된 시퀀스 × cycles)
  --cycles <N>              시퀀스 반복 횟수 (기본: 2)
  -d, --duration <SECS>     실시간 루프로 지정 시간 동안 송신
  -c, --chunk-size <BYTES>  청크 크기 (기본: 800)
  -r, --redundancy <RATIO>  초기 fountain 비율 (기본: 0.5)
  --fps <N>                 프레임 속도 (기본: 20)
  --trailer-at <N>          N번째 프레임 이후 트레일러 신호
  --restart <PERCENT>       시작 전에 데이터 비율 위치로 재시작
  --no-endless              무한 fountain 모드 끄기
  --preset <NAME>           low-spec | high-density | unstable
  -h, --help                이 도움말 출력

예시:
  cargo run --release --bin qrbt-sender -- -f photo.jpg -o frames --cycles 3
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
    let path = args.file.clone().ok_or("--file 필요 (--help 참고)")?;
    let data = std::fs::read(&path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file.bin".to_string());

    let mut sender = Sender::new(args.config.clone(), Box::new(DeflateCompressor::default()));
    let metadata = sender.prepare(&name, &data)?.clone();
    info!(
        "{}: {} bytes → {} 청크 (압축={}), 세션 {:08X}",
        metadata.name,
        metadata.original_size,
        metadata.total_chunks,
        metadata.compressed,
        sender.session_id()
    );

    if let Some(percent) = args.restart_percent {
        sender.restart(percent)?;
    }

    let mut renderer = FrameDirRenderer::new(&args.out_dir)?;

    if let Some(secs) = args.duration {
        let send_loop = SendLoop::spawn(sender, renderer, Arc::new(TracingEvents))?;
        if let Some(tick) = args.trailer_at {
            let wait = args.config.frame_interval_us() * tick as u64;
            tokio::time::sleep(Duration::from_micros(wait)).await;
            send_loop.signal_trailer().await?;
        }
        tokio::time::sleep(Duration::from_secs(secs)).await;
        send_loop.stop().await?;

        let rendered = send_loop.frames_rendered();
        let sender = send_loop.join().await?;
        info!("{}개 프레임 기록 → {}", rendered, args.out_dir.display());
        info!("{}", sender.stats().summary());
        return Ok(());
    }

    let count = args
        .frames
        .unwrap_or_else(|| sender.frames().len() * args.cycles.max(1));
    for tick in 0..count {
        if args.trailer_at == Some(tick) {
            sender.signal_trailer()?;
        }
        match sender.next_frame() {
            Some(frame) => renderer.render(&latin1_decode(&frame), ErrorCorrection::Low)?,
            None => break,
        }
    }
    sender.stop();

    info!("{}개 프레임 기록 → {}", renderer.written(), args.out_dir.display());
    info!("{}", sender.stats().summary());
    Ok(())
}

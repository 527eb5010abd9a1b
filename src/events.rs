//! 호스트 UI 이벤트 싱크

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::receiver::TransferResult;

/// 세션이 호스트에 보내는 알림
///
/// 송수신 세션 생성 시 주입됨. 표시 방식은 호스트가 결정.
pub trait SessionEvents: Send + Sync {
    fn on_status(&self, text: &str);

    /// 진행률 (0 ~ 100)
    fn on_progress(&self, percent: u8);

    /// 수신 속도 (KB/s)
    fn on_speed(&self, kbps: f64);

    fn on_debug(&self, text: &str);

    fn on_result(&self, result: &TransferResult);

    /// 자원/환경 실패 (캡처 불가, 압축 실패 등)
    fn on_error(&self, message: &str);
}

/// tracing으로만 내보내는 기본 싱크
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEvents;

impl SessionEvents for TracingEvents {
    fn on_status(&self, text: &str) {
        info!("{}", text);
    }

    fn on_progress(&self, percent: u8) {
        debug!("진행률 {}%", percent);
    }

    fn on_speed(&self, kbps: f64) {
        debug!("속도 {:.1} KB/s", kbps);
    }

    fn on_debug(&self, text: &str) {
        debug!("{}", text);
    }

    fn on_result(&self, result: &TransferResult) {
        info!(
            "전송 완료: {} ({} bytes, {:?})",
            result.name,
            result.data.len(),
            result.kind
        );
    }

    fn on_error(&self, message: &str) {
        warn!("{}", message);
    }
}

/// 기록된 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Status(String),
    Progress(u8),
    Speed(f64),
    Debug(String),
    Result(TransferResult),
    Error(String),
}

/// 이벤트를 순서대로 기록하는 싱크
#[derive(Debug, Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<Event>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// 기록된 이벤트 스냅샷
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Status(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn results(&self) -> Vec<TransferResult> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Result(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Error(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_progress(&self) -> Option<u8> {
        self.events.lock().iter().rev().find_map(|e| match e {
            Event::Progress(p) => Some(*p),
            _ => None,
        })
    }

    fn push(&self, event: Event) {
        self.events.lock().push(event);
    }
}

impl SessionEvents for RecordingEvents {
    fn on_status(&self, text: &str) {
        self.push(Event::Status(text.to_string()));
    }

    fn on_progress(&self, percent: u8) {
        self.push(Event::Progress(percent));
    }

    fn on_speed(&self, kbps: f64) {
        self.push(Event::Speed(kbps));
    }

    fn on_debug(&self, text: &str) {
        self.push(Event::Debug(text.to_string()));
    }

    fn on_result(&self, result: &TransferResult) {
        self.push(Event::Result(result.clone()));
    }

    fn on_error(&self, message: &str) {
        self.push(Event::Error(message.to_string()));
    }
}

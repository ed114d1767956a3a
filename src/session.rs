// Inbound command handling, cached-result replay, and the fire-and-forget
// outbound channel toward the reporting collaborator.
use crate::analysis::Analyzer;
use crate::models::AnalysisResult;
use crate::page::PageSnapshot;
use crate::sanitizer;
use serde::Serialize;
use serde_json::Value as Json;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Discovery only: is a framework root present?
    Detect,
    /// The full orchestrated pipeline, or a cached replay.
    Analyze,
}

/// One-way notifications keyed by a small closed set of type tags.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "VUE_DETECTION_RESULT")]
    Detection { detected: bool, method: String },
    #[serde(rename = "VUE_ROUTER_ANALYSIS_RESULT")]
    RouterAnalysis { result: Json },
    #[serde(rename = "VUE_ROUTER_ANALYSIS_ERROR")]
    AnalysisError { error: String },
}

/// Holds one page capture and replays its analysis for repeated requests
/// within the same page load. `handle` takes `&mut self`, so overlapping
/// runs cannot be issued; that resolves the concurrent-analyze question by
/// construction.
pub struct Session {
    page: PageSnapshot,
    analyzer: Analyzer,
    cached: Option<Json>,
    last: Option<AnalysisResult>,
    tx: UnboundedSender<OutboundMessage>,
}

impl Session {
    pub fn new(page: PageSnapshot, analyzer: Analyzer) -> (Self, UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Session {
                page,
                analyzer,
                cached: None,
                last: None,
                tx,
            },
            rx,
        )
    }

    /// The most recent full analysis, for callers that want the typed record
    /// rather than the sanitized payload.
    pub fn last_result(&self) -> Option<&AnalysisResult> {
        self.last.as_ref()
    }

    pub async fn handle(&mut self, command: Command) {
        match command {
            Command::Detect => {
                let detection = self.analyzer.detect(&self.page).await;
                self.send(OutboundMessage::Detection {
                    detected: detection.detected,
                    method: detection.method,
                });
            }
            Command::Analyze => {
                if let Some(cached) = &self.cached {
                    self.send(OutboundMessage::RouterAnalysis {
                        result: cached.clone(),
                    });
                    return;
                }

                let detection = self.analyzer.detect(&self.page).await;
                let detected = detection.detected;
                self.send(OutboundMessage::Detection {
                    detected,
                    method: detection.method,
                });
                if !detected {
                    return;
                }

                let result = self.analyzer.analyze(&self.page).await;
                if let Some(error) = &result.error {
                    self.send(OutboundMessage::AnalysisError {
                        error: error.clone(),
                    });
                }
                let payload = sanitizer::sanitize_result(&result);
                self.cached = Some(payload.clone());
                self.last = Some(result);
                self.send(OutboundMessage::RouterAnalysis { result: payload });
            }
        }
    }

    fn send(&self, message: OutboundMessage) {
        // fire and forget: a departed receiver never fails the run
        let _ = self.tx.send(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{NodeRef, ObjectRef, Value};

    fn vue_page() -> PageSnapshot {
        let router = ObjectRef::new().with(
            "getRoutes",
            Value::function_returning(
                "getRoutes",
                Value::array(vec![Value::Object(
                    ObjectRef::new().with("path", Value::str("/home")),
                )]),
            ),
        );
        let app = ObjectRef::new().with(
            "config",
            Value::Object(ObjectRef::new().with(
                "globalProperties",
                Value::Object(ObjectRef::new().with("$router", Value::Object(router))),
            )),
        );
        let app_div = NodeRef::build(
            "div",
            vec![],
            ObjectRef::new().with("__vue_app__", Value::Object(app)),
            vec![],
        );
        let body = NodeRef::build("body", vec![], ObjectRef::new(), vec![app_div]);
        PageSnapshot::new("https://x.test/", body)
    }

    fn bare_page() -> PageSnapshot {
        PageSnapshot::new("https://x.test/", NodeRef::element("body"))
    }

    fn drain(rx: &mut UnboundedReceiver<OutboundMessage>) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_detect_command_emits_status() {
        let (mut session, mut rx) = Session::new(bare_page(), Analyzer::new());
        session.handle(Command::Detect).await;

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            OutboundMessage::Detection { detected, method } => {
                assert!(!detected);
                assert!(method.contains("Max retry limit"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_analyze_emits_result_and_caches() {
        let (mut session, mut rx) = Session::new(vue_page(), Analyzer::new());

        session.handle(Command::Analyze).await;
        let first = drain(&mut rx);
        assert_eq!(first.len(), 2);
        assert!(matches!(first[0], OutboundMessage::Detection { detected: true, .. }));
        let payload = match &first[1] {
            OutboundMessage::RouterAnalysis { result } => result.clone(),
            other => panic!("unexpected message: {:?}", other),
        };
        assert_eq!(payload["routerDetected"], true);
        assert!(session.last_result().is_some());

        // a repeated analyze replays the cached payload without re-detecting
        session.handle(Command::Analyze).await;
        let second = drain(&mut rx);
        assert_eq!(second.len(), 1);
        match &second[0] {
            OutboundMessage::RouterAnalysis { result } => assert_eq!(*result, payload),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_analyze_on_undetected_page_stops_after_status() {
        let (mut session, mut rx) = Session::new(bare_page(), Analyzer::new());
        session.handle(Command::Analyze).await;

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        assert!(matches!(
            messages[0],
            OutboundMessage::Detection { detected: false, .. }
        ));
        assert!(session.last_result().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_receiver_does_not_fail_the_run() {
        let (mut session, rx) = Session::new(vue_page(), Analyzer::new());
        drop(rx);
        session.handle(Command::Analyze).await;
        assert!(session.last_result().is_some());
    }
}

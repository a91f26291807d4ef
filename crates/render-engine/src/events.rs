//! Typed job event stream.
//!
//! Four event kinds flow from a render job to its observers: progress,
//! decision, error and complete. Subscribers register per kind and are
//! called synchronously in registration order, on the task that emitted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::policy::Decision;
use crate::request::RenderResult;

/// Lifecycle status carried by progress reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    Queued,
    Rendering,
    Done,
    Failed,
    Cancelled,
}

impl RenderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Rendering => "rendering",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Percent complete in `[0, 100]`.
    pub percent: f64,
    pub status: RenderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressEvent {
    pub fn new(percent: f64, status: RenderStatus) -> Self {
        Self {
            percent,
            status,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompleteEvent {
    pub result: RenderResult,
}

/// One event in a job's stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum RenderEvent {
    Progress(ProgressEvent),
    Decision(Decision),
    Error(ErrorEvent),
    Complete(CompleteEvent),
}

impl RenderEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Progress(_) => EventKind::Progress,
            Self::Decision(_) => EventKind::Decision,
            Self::Error(_) => EventKind::Error,
            Self::Complete(_) => EventKind::Complete,
        }
    }

    /// Complete and error end a job's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Complete(_))
    }
}

/// Event kinds a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Progress,
    Decision,
    Error,
    Complete,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Progress,
        EventKind::Decision,
        EventKind::Error,
        EventKind::Complete,
    ];
}

/// An event tagged with the job that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: JobId,
    #[serde(flatten)]
    pub event: RenderEvent,
}

/// A subscriber callback. The returned `Arc` is the subscription's identity.
pub type Handler = Arc<dyn Fn(&JobEvent) + Send + Sync>;

/// Publish/subscribe surface shared by a coordinator and its observers.
///
/// Clones share the same subscriber table. Handlers run outside the table
/// lock, so a handler may subscribe, unsubscribe or cancel the job.
#[derive(Clone, Default)]
pub struct EventChannel {
    handlers: Arc<RwLock<HashMap<EventKind, Vec<Handler>>>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to `kind`. Keep the returned handle to unsubscribe.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Handler
    where
        F: Fn(&JobEvent) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        self.subscribe(kind, handler.clone());
        handler
    }

    /// Subscribe an existing handle to `kind`.
    pub fn subscribe(&self, kind: EventKind, handler: Handler) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.entry(kind).or_default().push(handler);
    }

    /// Subscribe one handler to every kind.
    pub fn on_all<F>(&self, handler: F) -> Handler
    where
        F: Fn(&JobEvent) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        for kind in EventKind::ALL {
            self.subscribe(kind, handler.clone());
        }
        handler
    }

    /// Remove `handler` from `kind`. Returns false when it was not subscribed.
    pub fn off(&self, kind: EventKind, handler: &Handler) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        match list.iter().position(|h| same_handler(h, handler)) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove `handler` from every kind.
    pub fn off_all(&self, handler: &Handler) {
        for kind in EventKind::ALL {
            self.off(kind, handler);
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to every handler subscribed to its kind.
    pub fn emit(&self, event: &JobEvent) {
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            match handlers.get(&event.event.kind()) {
                Some(list) => list.clone(),
                None => return,
            }
        };
        for handler in snapshot {
            handler(event);
        }
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<EventKind, usize> =
            handlers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventChannel").field("handlers", &counts).finish()
    }
}

fn same_handler(a: &Handler, b: &Handler) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Mirror every job event into `tracing`.
pub fn trace_events(channel: &EventChannel) -> Handler {
    channel.on_all(|event| {
        match &event.event {
            RenderEvent::Progress(p) => tracing::debug!(
                job_id = %event.job_id,
                percent = p.percent,
                status = p.status.as_str(),
                message = p.message.as_deref().unwrap_or(""),
                "Render progress"
            ),
            RenderEvent::Decision(d) => tracing::info!(
                job_id = %event.job_id,
                mode = %d.mode,
                reason = %d.reason,
                confidence = ?d.confidence,
                "Render venue decided"
            ),
            RenderEvent::Error(e) => tracing::warn!(
                job_id = %event.job_id,
                code = e.code.as_deref().unwrap_or(""),
                error = %e.error,
                "Render failed"
            ),
            RenderEvent::Complete(c) => tracing::info!(
                job_id = %event.job_id,
                venue = %c.result.venue(),
                "Render complete"
            ),
        }
    })
}

/// Collects every event it sees, in delivery order.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<JobEvent>>>,
}

impl EventRecorder {
    /// Start recording all kinds on `channel`.
    pub fn attach(channel: &EventChannel) -> Self {
        let recorder = Self::default();
        let sink = recorder.events.clone();
        channel.on_all(move |event| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event.clone());
        });
        recorder
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded events for one job only.
    pub fn for_job(&self, job_id: JobId) -> Vec<RenderEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.job_id == job_id)
            .map(|e| e.event)
            .collect()
    }

    pub fn decisions(&self) -> Vec<Decision> {
        self.events()
            .into_iter()
            .filter_map(|e| match e.event {
                RenderEvent::Decision(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<ProgressEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e.event {
                RenderEvent::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn terminals(&self) -> Vec<RenderEvent> {
        self.events()
            .into_iter()
            .map(|e| e.event)
            .filter(RenderEvent::is_terminal)
            .collect()
    }
}

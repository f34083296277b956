//! Scripted vision client for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use snapfeedback_state::Subject;
use tokio::sync::{Barrier, Semaphore};

use crate::error::{FeedbackError, Result};
use crate::vision::{RequestKind, VisionClient, VisionRequest};

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    ServiceError(String),
}

/// A [`VisionClient`] that answers from a per-(kind, subject) script.
///
/// Replies for a tag are consumed in order; once the queue is empty the last
/// served reply repeats. A tag with no script fails with
/// [`FeedbackError::Service`].
///
/// - `with_rendezvous(n)` makes every evaluation call wait until `n`
///   evaluation calls are in flight. Sequential dispatch of two subjects
///   therefore never completes.
/// - `with_suggestion_gate()` holds every suggestion call until
///   [`ScriptedVisionClient::open_gate`] is called.
#[derive(Default)]
pub struct ScriptedVisionClient {
    replies: Mutex<HashMap<(RequestKind, Subject), VecDeque<Reply>>>,
    last_served: Mutex<HashMap<(RequestKind, Subject), Reply>>,
    calls: Mutex<Vec<VisionRequest>>,
    rendezvous: Option<Arc<Barrier>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedVisionClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, kind: RequestKind, subject: Subject, text: impl Into<String>) -> Self {
        self.push(kind, subject, Reply::Text(text.into()));
        self
    }

    pub fn with_failure(self, kind: RequestKind, subject: Subject, message: impl Into<String>) -> Self {
        self.push(kind, subject, Reply::ServiceError(message.into()));
        self
    }

    pub fn with_rendezvous(mut self, parties: usize) -> Self {
        self.rendezvous = Some(Arc::new(Barrier::new(parties)));
        self
    }

    pub fn with_suggestion_gate(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Script another reply after construction, e.g. between regenerations.
    pub fn push_reply(&self, kind: RequestKind, subject: Subject, text: impl Into<String>) {
        self.push(kind, subject, Reply::Text(text.into()));
    }

    /// Release every current and future suggestion call.
    pub fn open_gate(&self) {
        // Closing wakes every waiter and makes later acquires return at once.
        if let Some(gate) = &self.gate {
            gate.close();
        }
    }

    pub fn calls(&self) -> Vec<VisionRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, kind: RequestKind, subject: Subject) -> Vec<VisionRequest> {
        self.calls()
            .into_iter()
            .filter(|c| c.tag() == (kind, subject))
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn push(&self, kind: RequestKind, subject: Subject, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry((kind, subject))
            .or_default()
            .push_back(reply);
    }

    fn next_reply(&self, tag: (RequestKind, Subject)) -> Option<Reply> {
        let next = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&tag)
            .and_then(VecDeque::pop_front);
        let mut last_served = self.last_served.lock().unwrap();
        match next {
            Some(reply) => {
                last_served.insert(tag, reply.clone());
                Some(reply)
            }
            None => last_served.get(&tag).cloned(),
        }
    }
}

#[async_trait]
impl VisionClient for ScriptedVisionClient {
    async fn call(&self, request: VisionRequest) -> Result<String> {
        let tag = request.tag();
        self.calls.lock().unwrap().push(request);

        match tag.0 {
            RequestKind::Evaluation => {
                if let Some(barrier) = &self.rendezvous {
                    barrier.wait().await;
                }
            }
            RequestKind::Suggestions => {
                if let Some(gate) = &self.gate {
                    // No permits are ever issued; this only returns once closed.
                    let _ = gate.acquire().await;
                }
            }
        }

        match self.next_reply(tag) {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::ServiceError(message)) => Err(FeedbackError::Service(message)),
            None => Err(FeedbackError::Service(format!(
                "no scripted reply for {} {}",
                tag.0.as_str(),
                tag.1
            ))),
        }
    }
}

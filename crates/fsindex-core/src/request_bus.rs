use crate::error::Error;
use crate::storage::{CommandReply, SqlCommand, StoreHandle};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcome of one generic command, keyed by the id `submit` returned.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestEvent {
    /// `{"result": ...}`
    Response { request_id: Uuid, body: Value },
    /// `{"error": "..."}`
    Failed { request_id: Uuid, body: Value },
}

impl RequestEvent {
    pub fn request_id(&self) -> Uuid {
        match self {
            RequestEvent::Response { request_id, .. } | RequestEvent::Failed { request_id, .. } => *request_id,
        }
    }

    pub fn body(&self) -> &Value {
        match self {
            RequestEvent::Response { body, .. } | RequestEvent::Failed { body, .. } => body,
        }
    }
}

type InFlight = Arc<Mutex<HashSet<Uuid>>>;

fn lock(in_flight: &InFlight) -> MutexGuard<'_, HashSet<Uuid>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Correlates asynchronous generic commands with their replies.
///
/// `submit` hands back a fresh id immediately; the matching
/// [`RequestEvent`] arrives later on the events channel.
pub struct RequestBus {
    store: StoreHandle,
    in_flight: InFlight,
    replies: mpsc::Sender<CommandReply>,
}

impl RequestBus {
    pub fn new(store: StoreHandle, events: mpsc::Sender<RequestEvent>) -> Result<Self, Error> {
        let in_flight: InFlight = Arc::new(Mutex::new(HashSet::new()));
        let (replies, reply_rx) = mpsc::channel::<CommandReply>();

        let pump_in_flight = Arc::clone(&in_flight);
        thread::Builder::new()
            .name("request-bus".into())
            .spawn(move || {
                while let Ok(reply) = reply_rx.recv() {
                    lock(&pump_in_flight).remove(&reply.request_id);
                    let event = match reply.result {
                        Ok(output) => RequestEvent::Response {
                            request_id: reply.request_id,
                            body: output.to_json(),
                        },
                        Err(e) => {
                            warn!("Request {} failed: {}", reply.request_id, e);
                            RequestEvent::Failed {
                                request_id: reply.request_id,
                                body: json!({ "error": e.to_string() }),
                            }
                        }
                    };
                    if events.send(event).is_err() {
                        debug!("Request event dropped: no listener");
                    }
                }
            })?;

        Ok(Self {
            store,
            in_flight,
            replies,
        })
    }

    /// Route `payload` to the store and return its request id. Malformed
    /// payloads are answered with a `Failed` event without touching the store.
    pub fn submit(&self, payload: &Value) -> Uuid {
        let request_id = self.allocate_id();
        debug!("Request {}: {}", request_id, payload);

        let dispatched = SqlCommand::parse(payload).and_then(|command| {
            self.store
                .submit_command(request_id, command, self.replies.clone())
        });
        if let Err(e) = dispatched {
            let reply = CommandReply {
                request_id,
                result: Err(e),
            };
            if self.replies.send(reply).is_err() {
                lock(&self.in_flight).remove(&request_id);
            }
        }
        request_id
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    fn allocate_id(&self) -> Uuid {
        let mut in_flight = lock(&self.in_flight);
        loop {
            let id = Uuid::new_v4();
            if in_flight.insert(id) {
                return id;
            }
        }
    }
}

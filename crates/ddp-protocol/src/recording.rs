//! In-memory transport for tests and offline use.

use crate::{RemoteError, Transport, TransportEvent};
use parking_lot::Mutex;
use serde_json::Value;

/// One outbound operation recorded by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Connect,
    Disconnect,
    Method {
        id: String,
        name: String,
        params: Vec<Value>,
    },
    Sub {
        id: String,
        name: String,
        params: Vec<Value>,
    },
    Unsub {
        id: String,
    },
}

#[derive(Debug, Default)]
struct State {
    sent: Vec<Outbound>,
    next_method: u64,
    next_sub: u64,
}

/// Transport that records every outbound operation and never talks to a
/// network. Method ids are `"1"`, `"2"`, …; subscription ids `"sub-1"`, ….
///
/// The `*_event` helpers build the inbound events a real server would send,
/// for feeding back into the client.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    state: Mutex<State>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation so far, in order.
    pub fn sent(&self) -> Vec<Outbound> {
        self.state.lock().sent.clone()
    }

    /// Drain the recorded operations.
    pub fn take_sent(&self) -> Vec<Outbound> {
        std::mem::take(&mut self.state.lock().sent)
    }

    pub fn clear(&self) {
        self.state.lock().sent.clear();
    }

    /// `(id, name, params)` of every method call.
    pub fn methods(&self) -> Vec<(String, String, Vec<Value>)> {
        self.state
            .lock()
            .sent
            .iter()
            .filter_map(|op| match op {
                Outbound::Method { id, name, params } => {
                    Some((id.clone(), name.clone(), params.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// `(id, name, params)` of every subscribe request.
    pub fn subs(&self) -> Vec<(String, String, Vec<Value>)> {
        self.state
            .lock()
            .sent
            .iter()
            .filter_map(|op| match op {
                Outbound::Sub { id, name, params } => {
                    Some((id.clone(), name.clone(), params.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Ids of every unsubscribe request.
    pub fn unsubs(&self) -> Vec<String> {
        self.state
            .lock()
            .sent
            .iter()
            .filter_map(|op| match op {
                Outbound::Unsub { id } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.count(|op| matches!(op, Outbound::Connect))
    }

    pub fn disconnect_count(&self) -> usize {
        self.count(|op| matches!(op, Outbound::Disconnect))
    }

    /// Id of the most recent call to `name`.
    pub fn last_call_id(&self, name: &str) -> Option<String> {
        self.methods()
            .into_iter()
            .rev()
            .find(|(_, method, _)| method == name)
            .map(|(id, _, _)| id)
    }

    pub fn success_event(id: &str, result: Value) -> TransportEvent {
        TransportEvent::Result {
            id: id.to_string(),
            outcome: Ok(result),
        }
    }

    pub fn error_event(id: &str, error: RemoteError) -> TransportEvent {
        TransportEvent::Result {
            id: id.to_string(),
            outcome: Err(error),
        }
    }

    pub fn ready_event(ids: &[&str]) -> TransportEvent {
        TransportEvent::Ready {
            subs: ids.iter().map(|id| id.to_string()).collect(),
        }
    }

    fn count(&self, pred: impl Fn(&Outbound) -> bool) -> usize {
        self.state.lock().sent.iter().filter(|op| pred(op)).count()
    }
}

impl Transport for RecordingTransport {
    fn connect(&self) {
        self.state.lock().sent.push(Outbound::Connect);
    }

    fn disconnect(&self) {
        self.state.lock().sent.push(Outbound::Disconnect);
    }

    fn method(&self, name: &str, params: Vec<Value>) -> String {
        let mut state = self.state.lock();
        state.next_method += 1;
        let id = state.next_method.to_string();
        state.sent.push(Outbound::Method {
            id: id.clone(),
            name: name.to_string(),
            params,
        });
        id
    }

    fn sub(&self, name: &str, params: &[Value]) -> String {
        let mut state = self.state.lock();
        state.next_sub += 1;
        let id = format!("sub-{}", state.next_sub);
        state.sent.push(Outbound::Sub {
            id: id.clone(),
            name: name.to_string(),
            params: params.to_vec(),
        });
        id
    }

    fn unsub(&self, id: &str) {
        self.state
            .lock()
            .sent
            .push(Outbound::Unsub { id: id.to_string() });
    }
}

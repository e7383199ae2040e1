#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use sluice_codec::ack::AckKind;
use sluice_codec::pull::PullRequest;
use sluice_core::{Envelope, DESCRIPTION_HEADER, STATUS_HEADER};
use sluice_node::{ClientConfig, Dispatcher, PullSubscription};
use sluice_transport::adapter::{InMemoryTransport, InboundSink, Transport};

pub const STREAM: &str = "ORDERS";
pub const CONSUMER: &str = "worker";
pub const BASE_TS: u64 = 1_700_000_000_000_000_000;

/// How the fake server answers an expiring pull request it cannot fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnExpiring {
    /// Hold the request open and never answer.
    Hold,
    /// Answer at once with a 408.
    RequestTimeout,
}

#[derive(Debug, Default)]
struct ServerState {
    stream_seq: u64,
    consumer_seq: u64,
    backlog: VecDeque<Vec<u8>>,
    pulls: Vec<PullRequest>,
    acks: Vec<(String, AckKind)>,
}

/// Plays the server side of a pull consumer on top of [`InMemoryTransport`].
///
/// Pull requests are served from an in-memory backlog. No-wait requests
/// that find the backlog short end with a `404 No Messages`.
pub struct FakeServer {
    state: Mutex<ServerState>,
    on_expiring: Mutex<OnExpiring>,
    injected: Mutex<Option<Envelope>>,
    trailer: Mutex<Option<Envelope>>,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::default(),
            on_expiring: Mutex::new(OnExpiring::Hold),
            injected: Mutex::new(None),
            trailer: Mutex::new(None),
        })
    }

    pub fn push(&self, payload: &[u8]) {
        self.state.lock().backlog.push_back(payload.to_vec());
    }

    pub fn set_on_expiring(&self, on_expiring: OnExpiring) {
        *self.on_expiring.lock() = on_expiring;
    }

    /// The next pull request is answered with this status instead of data.
    pub fn fail_next_pull(&self, code: &str, description: &str) {
        *self.injected.lock() = Some(status(code, description));
    }

    /// The next pull request gets its data followed by this status.
    pub fn fail_after_data(&self, code: &str, description: &str) {
        *self.trailer.lock() = Some(status(code, description));
    }

    pub fn pulls(&self) -> Vec<PullRequest> {
        self.state.lock().pulls.clone()
    }

    pub fn acks(&self) -> Vec<(String, AckKind)> {
        self.state.lock().acks.clone()
    }

    fn handle(&self, env: &Envelope, pull_subject: &str) -> Vec<Envelope> {
        if env.subject.starts_with("$JS.ACK.") {
            if let Some(kind) = AckKind::decode(&env.payload) {
                self.state.lock().acks.push((env.subject.clone(), kind));
            }
            return vec![Envelope::new("_INBOX.confirm", Vec::<u8>::new())];
        }
        if env.subject != pull_subject {
            return Vec::new();
        }
        let (Some(inbox), Ok(request)) = (env.reply.clone(), PullRequest::decode(&env.payload))
        else {
            return Vec::new();
        };

        if let Some(injected) = self.injected.lock().take() {
            return vec![Envelope {
                subject: inbox,
                ..injected
            }];
        }

        let mut state = self.state.lock();
        state.pulls.push(request);
        let mut replies = Vec::new();
        while replies.len() < request.batch {
            let Some(payload) = state.backlog.pop_front() else {
                break;
            };
            state.stream_seq += 1;
            state.consumer_seq += 1;
            let reply = format!(
                "$JS.ACK.{STREAM}.{CONSUMER}.1.{}.{}.{}.{}",
                state.stream_seq,
                state.consumer_seq,
                BASE_TS + state.stream_seq,
                state.backlog.len()
            );
            replies.push(Envelope::new(inbox.clone(), payload).with_reply(reply));
        }
        if let Some(trailer) = self.trailer.lock().take() {
            replies.push(Envelope {
                subject: inbox,
                ..trailer
            });
            return replies;
        }
        if replies.len() < request.batch {
            if request.no_wait {
                replies.push(Envelope {
                    subject: inbox,
                    ..status("404", "No Messages")
                });
            } else if replies.is_empty() && *self.on_expiring.lock() == OnExpiring::RequestTimeout {
                replies.push(Envelope {
                    subject: inbox,
                    ..status("408", "Request Timeout")
                });
            }
        }
        replies
    }
}

pub fn status(code: &str, description: &str) -> Envelope {
    Envelope::new("", Vec::<u8>::new())
        .with_header(STATUS_HEADER, code)
        .with_header(DESCRIPTION_HEADER, description)
}

pub struct Harness {
    pub transport: Arc<InMemoryTransport>,
    pub dispatcher: Arc<Dispatcher>,
    pub server: Arc<FakeServer>,
    pub sub: PullSubscription,
}

pub fn harness() -> Harness {
    harness_with(ClientConfig::default())
}

pub fn harness_with(config: ClientConfig) -> Harness {
    let transport = Arc::new(InMemoryTransport::new());
    let dispatcher = Arc::new(Dispatcher::new(&config));
    let sink: Arc<dyn InboundSink> = dispatcher.clone();
    transport.connect(sink);

    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let sub = PullSubscription::subscribe(
        Arc::clone(&dispatcher),
        dyn_transport,
        STREAM,
        CONSUMER,
        &config,
    )
    .expect("pull subscription should be created");

    let server = FakeServer::new();
    let pull_subject = sub.pull_subject().to_string();
    let responder = Arc::clone(&server);
    transport.set_responder(move |env| responder.handle(env, &pull_subject));

    Harness {
        transport,
        dispatcher,
        server,
        sub,
    }
}

pub fn payloads(msgs: &[sluice_node::JsMessage]) -> Vec<Vec<u8>> {
    msgs.iter().map(|m| m.payload().to_vec()).collect()
}

use crate::api::client::{ByteStream, MockNodeBackend};
use crate::types::{JobHandle, Page, SendPayload};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::{stream, StreamExt};
use std::collections::VecDeque;
use std::sync::Mutex;

struct EventScript {
    chunks: Vec<String>,
    /// Transport failure injected after the scripted chunks are delivered.
    trailing_error: Option<String>,
    /// Keep the stream open (pending) after the scripted chunks instead of
    /// ending it, for cancellation and watchdog tests.
    hold_open: bool,
}

/// Scripted node backend: each call pops the next canned response, and the
/// requests seen are recorded for assertions.
#[derive(Default)]
pub struct MockNodeClient {
    send_results: Mutex<VecDeque<Result<JobHandle, String>>>,
    event_scripts: Mutex<VecDeque<EventScript>>,
    pages: Mutex<VecDeque<Result<Page, String>>>,
    stop_results: Mutex<VecDeque<Result<(), String>>>,
    sent_payloads: Mutex<Vec<SendPayload>>,
    page_requests: Mutex<Vec<Option<String>>>,
    stop_requests: Mutex<Vec<JobHandle>>,
}

impl MockNodeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_accepted_send(&self, job: JobHandle) {
        self.send_results.lock().unwrap().push_back(Ok(job));
    }

    pub fn push_rejected_send(&self, reason: &str) {
        self.send_results
            .lock()
            .unwrap()
            .push_back(Err(reason.to_string()));
    }

    /// Queue one SSE stream worth of chunks. Chunks are framed with a
    /// trailing blank line if the script omitted it.
    pub fn push_event_stream(&self, chunks: Vec<String>) {
        self.event_scripts.lock().unwrap().push_back(EventScript {
            chunks,
            trailing_error: None,
            hold_open: false,
        });
    }

    pub fn push_failing_event_stream(&self, chunks: Vec<String>, error: &str) {
        self.event_scripts.lock().unwrap().push_back(EventScript {
            chunks,
            trailing_error: Some(error.to_string()),
            hold_open: false,
        });
    }

    pub fn push_open_event_stream(&self, chunks: Vec<String>) {
        self.event_scripts.lock().unwrap().push_back(EventScript {
            chunks,
            trailing_error: None,
            hold_open: true,
        });
    }

    pub fn push_page(&self, page: Page) {
        self.pages.lock().unwrap().push_back(Ok(page));
    }

    pub fn push_page_error(&self, reason: &str) {
        self.pages.lock().unwrap().push_back(Err(reason.to_string()));
    }

    pub fn push_stop_result(&self, result: Result<(), String>) {
        self.stop_results.lock().unwrap().push_back(result);
    }

    pub fn sent_payloads(&self) -> Vec<SendPayload> {
        self.sent_payloads.lock().unwrap().clone()
    }

    pub fn page_requests(&self) -> Vec<Option<String>> {
        self.page_requests.lock().unwrap().clone()
    }

    pub fn stop_requests(&self) -> Vec<JobHandle> {
        self.stop_requests.lock().unwrap().clone()
    }
}

impl MockNodeBackend for MockNodeClient {
    fn send_turn(&self, _conversation_id: &str, payload: &SendPayload) -> Result<JobHandle> {
        self.sent_payloads.lock().unwrap().push(payload.clone());
        match self.send_results.lock().unwrap().pop_front() {
            Some(Ok(job)) => Ok(job),
            Some(Err(reason)) => Err(anyhow!("{reason}")),
            None => Err(anyhow!("MockNodeClient: no scripted send result")),
        }
    }

    fn open_event_stream(&self, _job: &JobHandle) -> Result<ByteStream> {
        let script = self
            .event_scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("MockNodeClient: no scripted event stream"))?;

        let mut items: Vec<Result<Bytes>> = script
            .chunks
            .into_iter()
            .map(|chunk| {
                let framed = if chunk.ends_with("\n\n") {
                    chunk
                } else {
                    format!("{chunk}\n\n")
                };
                Ok(Bytes::from(framed))
            })
            .collect();
        if let Some(error) = script.trailing_error {
            items.push(Err(anyhow!("{error}")));
        }

        if script.hold_open {
            return Ok(Box::pin(stream::iter(items).chain(stream::pending())));
        }
        Ok(Box::pin(stream::iter(items)))
    }

    fn fetch_page(&self, _conversation_id: &str, cursor: Option<&str>) -> Result<Page> {
        self.page_requests
            .lock()
            .unwrap()
            .push(cursor.map(ToOwned::to_owned));
        match self.pages.lock().unwrap().pop_front() {
            Some(Ok(page)) => Ok(page),
            Some(Err(reason)) => Err(anyhow!("{reason}")),
            None => Ok(Page::default()),
        }
    }

    fn request_stop(&self, job: &JobHandle) -> Result<()> {
        self.stop_requests.lock().unwrap().push(job.clone());
        match self.stop_results.lock().unwrap().pop_front() {
            Some(Ok(())) => Ok(()),
            Some(Err(reason)) => Err(anyhow!("{reason}")),
            None => Ok(()),
        }
    }
}

//! Pending request tracker
//!
//! Correlates outbound GET_ASSETS / GET_STATUS requests with their replies.
//! At most `max_concurrent` requests are in flight; the rest wait in a FIFO
//! queue. Every request ends exactly once: completed by a reply, timed out,
//! or failed. Its callback runs at that moment and never again.

use std::collections::{HashMap, VecDeque};

use crate::clock::SharedClock;
use crate::config::RequestConfig;
use crate::error::RequestError;
use crate::protocol::codec::{parse_asset_response, parse_audio_status};
use crate::protocol::data::{AssetResponseData, AudioStatusData};
use crate::protocol::external::{generate_request_id, ExternalMessage, MessageFactory};
use crate::protocol::types::{fields, ExternalMessageType};
use crate::requests::dispatcher::RequestDispatcher;

/// Completion callback, invoked exactly once
pub type ResponseCallback = Box<dyn FnOnce(Result<ExternalMessage, RequestError>) + Send>;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestKind {
    /// Logo for a process
    Assets { process_name: String },
    /// Full status snapshot
    Status,
}

impl RequestKind {
    fn label(&self) -> &str {
        match self {
            RequestKind::Assets { process_name } => process_name,
            RequestKind::Status => "status",
        }
    }
}

struct PendingRequest {
    request_id: String,
    kind: RequestKind,
    callback: ResponseCallback,
    /// Deadline is measured from submission, queued time included
    request_time: u64,
    timeout_ms: u64,
}

impl PendingRequest {
    fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.request_time) >= self.timeout_ms
    }

    fn finish(self, result: Result<ExternalMessage, RequestError>) {
        (self.callback)(result);
    }
}

/// Tracker statistics, monotonically increasing except the gauges
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestStats {
    pub submitted: u64,
    pub completed: u64,
    pub timed_out: u64,
    pub failed: u64,
    pub in_flight: usize,
    pub queued: usize,
}

pub struct RequestTracker<D: RequestDispatcher> {
    dispatcher: D,
    clock: SharedClock,
    device_id: String,
    config: RequestConfig,
    in_flight: HashMap<String, PendingRequest>,
    queue: VecDeque<PendingRequest>,
    submitted: u64,
    completed: u64,
    timed_out: u64,
    failed: u64,
}

impl<D: RequestDispatcher> RequestTracker<D> {
    pub fn new(dispatcher: D, config: RequestConfig, device_id: &str, clock: SharedClock) -> Self {
        Self {
            dispatcher,
            clock,
            device_id: device_id.to_string(),
            config,
            in_flight: HashMap::new(),
            queue: VecDeque::new(),
            submitted: 0,
            completed: 0,
            timed_out: 0,
            failed: 0,
        }
    }

    /// Submit a request and return its id
    ///
    /// Dispatched immediately when a slot is free, queued otherwise. When
    /// the queue is full or dispatch fails, the callback receives the error
    /// before this returns.
    pub fn submit(
        &mut self,
        kind: RequestKind,
        callback: ResponseCallback,
        timeout_ms: Option<u64>,
    ) -> String {
        let request = PendingRequest {
            request_id: generate_request_id(),
            kind,
            callback,
            request_time: self.clock.now_ms(),
            timeout_ms: timeout_ms.unwrap_or(self.config.timeout_ms),
        };
        let request_id = request.request_id.clone();
        self.submitted += 1;

        if self.in_flight.len() < self.config.max_concurrent {
            self.dispatch(request);
        } else if self.queue.len() < self.config.max_queued {
            tracing::info!(
                "Request {} queued for {} (queue size: {})",
                request_id,
                request.kind.label(),
                self.queue.len() + 1
            );
            self.queue.push_back(request);
        } else {
            tracing::warn!("Request queue full, rejecting {}", request.kind.label());
            self.failed += 1;
            request.finish(Err(RequestError::DispatchFailed("request queue full".into())));
        }

        request_id
    }

    /// Request the logo for `process_name`
    ///
    /// A reply with `success = false` is delivered as [`RequestError::Rejected`].
    pub fn submit_asset_request<F>(
        &mut self,
        process_name: &str,
        callback: F,
        timeout_ms: Option<u64>,
    ) -> String
    where
        F: FnOnce(Result<AssetResponseData, RequestError>) + Send + 'static,
    {
        let wrapped: ResponseCallback = Box::new(move |result| {
            callback(result.and_then(|message| {
                let data = parse_asset_response(&message)
                    .map_err(|e| RequestError::InvalidResponse(e.to_string()))?;
                if data.success {
                    Ok(data)
                } else {
                    Err(RequestError::Rejected(data.error_message))
                }
            }))
        });
        self.submit(
            RequestKind::Assets {
                process_name: process_name.to_string(),
            },
            wrapped,
            timeout_ms,
        )
    }

    /// Ask the host for a full snapshot
    pub fn submit_status_request<F>(&mut self, callback: F, timeout_ms: Option<u64>) -> String
    where
        F: FnOnce(Result<AudioStatusData, RequestError>) + Send + 'static,
    {
        let wrapped: ResponseCallback = Box::new(move |result| {
            callback(result.and_then(|message| {
                parse_audio_status(&message).map_err(|e| RequestError::InvalidResponse(e.to_string()))
            }))
        });
        self.submit(RequestKind::Status, wrapped, timeout_ms)
    }

    fn build_message(&self, request: &PendingRequest) -> ExternalMessage {
        let now = self.clock.now_ms();
        match &request.kind {
            RequestKind::Assets { process_name } => {
                MessageFactory::asset_request(&request.request_id, process_name, &self.device_id, now)
            }
            RequestKind::Status => ExternalMessage::new(
                ExternalMessageType::GetStatus,
                request.request_id.as_str(),
                self.device_id.as_str(),
                now,
            ),
        }
    }

    fn dispatch(&mut self, request: PendingRequest) {
        let message = self.build_message(&request);
        match self.dispatcher.dispatch(message) {
            Ok(()) => {
                tracing::info!(
                    "Request {} sent for {}",
                    request.request_id,
                    request.kind.label()
                );
                self.in_flight.insert(request.request_id.clone(), request);
            }
            Err(e) => {
                tracing::error!("Failed to send request {}: {}", request.request_id, e);
                self.failed += 1;
                request.finish(Err(e));
            }
        }
    }

    /// Deliver a reply; unknown and already-finished ids are ignored
    pub fn complete(&mut self, request_id: &str, response: ExternalMessage) -> bool {
        let Some(request) = self.in_flight.remove(request_id) else {
            tracing::warn!("Response for unknown request: {}", request_id);
            return false;
        };

        let success = match request.kind {
            RequestKind::Assets { .. } => response.get_bool(fields::SUCCESS).unwrap_or(false),
            RequestKind::Status => parse_audio_status(&response).is_ok(),
        };
        if success {
            self.completed += 1;
            tracing::info!("Request {} completed", request_id);
        } else {
            self.failed += 1;
            tracing::warn!(
                "Request {} failed: {}",
                request_id,
                response.get_str(fields::ERROR_MESSAGE).unwrap_or("unknown error")
            );
        }
        request.finish(Ok(response));

        self.process_next_queued_request();
        true
    }

    /// Fail one outstanding request, in flight or queued
    ///
    /// Used when a dispatched request never reaches the wire. Frees its slot
    /// for the next queued request. Returns `false` for unknown ids.
    pub fn fail(&mut self, request_id: &str, error: RequestError) -> bool {
        let removed = self.in_flight.remove(request_id).or_else(|| {
            let index = self.queue.iter().position(|r| r.request_id == request_id)?;
            self.queue.remove(index)
        });
        let Some(request) = removed else {
            return false;
        };

        tracing::warn!(
            "Request {} failed ({}): {}",
            request_id,
            request.kind.label(),
            error
        );
        self.failed += 1;
        request.finish(Err(error));

        self.process_next_queued_request();
        true
    }

    pub fn is_pending(&self, request_id: &str) -> bool {
        self.in_flight.contains_key(request_id)
            || self.queue.iter().any(|r| r.request_id == request_id)
    }

    /// Fail every request past its deadline; returns how many expired
    pub fn timeout_expired_requests(&mut self) -> usize {
        let now = self.clock.now_ms();

        let expired_ids: Vec<String> = self
            .in_flight
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.request_id.clone())
            .collect();
        let mut expired: Vec<PendingRequest> = expired_ids
            .iter()
            .filter_map(|id| self.in_flight.remove(id))
            .collect();

        let (stale, waiting): (VecDeque<_>, VecDeque<_>) =
            std::mem::take(&mut self.queue)
                .into_iter()
                .partition(|r| r.is_expired(now));
        self.queue = waiting;
        expired.extend(stale);

        let count = expired.len();
        for request in expired {
            tracing::warn!(
                "Request timed out: {} ({})",
                request.request_id,
                request.kind.label()
            );
            self.timed_out += 1;
            let request_id = request.request_id.clone();
            request.finish(Err(RequestError::TimedOut { request_id }));
        }

        if count > 0 {
            self.process_next_queued_request();
        }
        count
    }

    /// Dispatch queued requests while slots are free
    pub fn process_next_queued_request(&mut self) {
        while self.in_flight.len() < self.config.max_concurrent {
            let Some(request) = self.queue.pop_front() else {
                break;
            };
            self.dispatch(request);
        }
    }

    /// Fail everything outstanding with [`RequestError::ShuttingDown`]
    pub fn shutdown(&mut self) {
        let pending: Vec<PendingRequest> = self
            .in_flight
            .drain()
            .map(|(_, r)| r)
            .chain(self.queue.drain(..))
            .collect();

        if !pending.is_empty() {
            tracing::info!("Failing {} outstanding requests on shutdown", pending.len());
        }
        for request in pending {
            self.failed += 1;
            request.finish(Err(RequestError::ShuttingDown));
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// Whether a new request would be sent right away
    pub fn is_ready(&self) -> bool {
        self.in_flight.len() < self.config.max_concurrent
    }

    pub fn stats(&self) -> RequestStats {
        RequestStats {
            submitted: self.submitted,
            completed: self.completed,
            timed_out: self.timed_out,
            failed: self.failed,
            in_flight: self.in_flight.len(),
            queued: self.queue.len(),
        }
    }
}

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::App;
use crate::core::session::SessionId;
use crate::core::store::{LastError, RequestFence, RequestStatus};
use crate::core::transport::TransportError;

impl App {
    /// The triple fence: the completing request is the tracked one, for the
    /// tracked session, and that session is still focused.
    pub fn is_current_request(&self, fence: RequestFence) -> bool {
        let runtime = self.store.runtime();
        runtime.in_flight == Some(fence)
            && self.store.active_session_id() == Some(fence.session_id)
    }

    /// Open a new request for `session_id`, cancelling any previous task.
    pub(crate) fn start_request(
        &mut self,
        session_id: SessionId,
    ) -> (RequestFence, CancellationToken) {
        if let Some(previous) = self.cancel_token.take() {
            previous.cancel();
        }

        self.next_request_id += 1;
        let fence = RequestFence {
            request_id: self.next_request_id,
            session_id,
        };
        let token = CancellationToken::new();
        self.cancel_token = Some(token.clone());

        self.store.update_runtime(|runtime| {
            runtime.status = RequestStatus::Sending;
            runtime.is_sending = true;
            runtime.is_typing = true;
            runtime.in_flight = Some(fence);
            runtime.last_error = None;
            runtime.status_text = Some("Sending…".to_string());
        });
        info!(
            request_id = fence.request_id,
            session_id = %fence.session_id,
            "Request started"
        );
        (fence, token)
    }

    pub(crate) fn request_token(&self) -> Option<CancellationToken> {
        self.cancel_token.clone()
    }

    /// Clear request tracking after a fenced completion.
    pub(crate) fn finish_request(&mut self, status: RequestStatus, error: Option<LastError>) {
        self.cancel_token = None;
        self.store.update_runtime(|runtime| {
            runtime.status_text = match (&status, &error) {
                (_, Some(err)) => Some(format!("Error: {}", err.message)),
                (RequestStatus::Done, None) => Some("Done".to_string()),
                _ => None,
            };
            runtime.status = status;
            runtime.is_sending = false;
            runtime.is_typing = false;
            runtime.in_flight = None;
            runtime.last_error = error;
        });
    }

    /// Cancel the in-flight request. No-op when nothing is running.
    pub fn stop_sending(&mut self) -> bool {
        if self.store.runtime().in_flight.is_none() && !self.store.runtime().is_sending {
            return false;
        }
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.store.update_runtime(|runtime| {
            runtime.status = RequestStatus::Stopped;
            runtime.is_sending = false;
            runtime.is_typing = false;
            runtime.in_flight = None;
            runtime.last_error = None;
            runtime.status_text = Some("Stopped".to_string());
        });
        info!("Request stopped");
        true
    }

    pub(crate) fn discard(&self, fence: RequestFence, what: &str) {
        debug!(
            request_id = fence.request_id,
            session_id = %fence.session_id,
            tracked = ?self.store.runtime().in_flight,
            active = ?self.store.active_session_id(),
            "Discarding stale {what}"
        );
    }
}

pub(crate) fn last_error_from(err: &TransportError) -> LastError {
    LastError {
        kind: err.kind(),
        message: err.to_string(),
    }
}

use castor_schema::{ContinuationToken, LocationMode, StorageLocation};
use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use super::{LogicalRequest, Pipeline, PipelineResponse};
use crate::error::{AttemptFailure, CastorError, TransportError};
use crate::history::{AttemptContext, AttemptOutcome, AttemptRecord, RequestSnapshot};
use crate::location::resolve;
use crate::retry::{FailedAttempt, RetryReason};
use crate::transport::{TransportRequest, TransportResponse};
use crate::utils::logging::body_preview;

/// Resolves when the caller cancels or the operation deadline passes.
async fn interrupted(cancel: &CancellationToken, deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep_until(deadline) => {}
            }
        }
        None => cancel.cancelled().await,
    }
}

impl Pipeline {
    /// Runs `request` to success or terminal failure.
    ///
    /// `mode` overrides the pipeline's default location mode for this call. A `continuation`
    /// token that carries a location pins the whole call to that endpoint, whatever the mode.
    pub async fn execute(
        &self,
        request: &LogicalRequest,
        mode: Option<LocationMode>,
        continuation: Option<&ContinuationToken>,
    ) -> Result<PipelineResponse, CastorError> {
        self.execute_with_cancel(request, mode, continuation, &CancellationToken::new())
            .await
    }

    /// [`Pipeline::execute`] with an encoded token as produced by [`ContinuationToken::encode`].
    /// A blank string starts from the first page; a malformed one fails before any attempt.
    pub async fn resume(
        &self,
        request: &LogicalRequest,
        mode: Option<LocationMode>,
        encoded_token: &str,
    ) -> Result<PipelineResponse, CastorError> {
        let token = ContinuationToken::decode_optional(encoded_token)?;
        self.execute(request, mode, token.as_ref()).await
    }

    /// [`Pipeline::execute`] that stops as soon as `cancel` fires, whether an attempt is in
    /// flight or the pipeline is waiting to retry.
    pub async fn execute_with_cancel(
        &self,
        request: &LogicalRequest,
        mode: Option<LocationMode>,
        continuation: Option<&ContinuationToken>,
        cancel: &CancellationToken,
    ) -> Result<PipelineResponse, CastorError> {
        let operation_id = Uuid::new_v4();
        let span = info_span!(
            "storage_op",
            op_id = %operation_id,
            method = %request.method,
            path = %request.path,
        );

        self.run(operation_id, request, mode, continuation, cancel)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        operation_id: Uuid,
        request: &LogicalRequest,
        mode: Option<LocationMode>,
        continuation: Option<&ContinuationToken>,
        cancel: &CancellationToken,
    ) -> Result<PipelineResponse, CastorError> {
        let deadline = self.operation_timeout.map(|timeout| Instant::now() + timeout);
        let mode = mode.unwrap_or(self.location_mode);
        let mut candidates = resolve(
            mode,
            &self.endpoints,
            continuation.and_then(ContinuationToken::location),
            request.idempotent,
        )?;

        if cancel.is_cancelled() {
            return Err(CastorError::Cancelled { attempts: 0 });
        }

        let mut location = candidates.first();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let ctx = AttemptContext {
                operation_id,
                attempt,
                location,
            };

            let mut transport_request = self.build_request(request, location, continuation)?;
            for observer in &self.observers {
                observer.before_send(&ctx, &mut transport_request);
            }
            let snapshot = RequestSnapshot::from(&transport_request);

            debug!(
                attempt,
                %location,
                url = %transport_request.url,
                "[Pipeline] Sending attempt"
            );

            let started_at = Utc::now();
            let started = Instant::now();
            let result = tokio::select! {
                biased;
                () = interrupted(cancel, deadline) => {
                    warn!(attempt, %location, "[Pipeline] Cancelled during attempt");
                    return Err(CastorError::Cancelled { attempts: attempt });
                }
                result = self.send_once(transport_request) => result,
            };
            let elapsed = started.elapsed();

            let failure = match result {
                Ok(response) if response.status.is_success() => {
                    self.notify(AttemptRecord::new(
                        ctx,
                        snapshot,
                        AttemptOutcome::success(&response),
                        started_at,
                        elapsed,
                    ));
                    return Ok(self.finish(operation_id, request, location, attempt, response));
                }
                Ok(response) => AttemptFailure::Service {
                    status: response.status,
                    body_preview: body_preview(&response.body),
                },
                Err(err) => AttemptFailure::Transport(err),
            };

            self.notify(AttemptRecord::new(
                ctx,
                snapshot,
                AttemptOutcome::Failure(failure.clone()),
                started_at,
                elapsed,
            ));

            let decision = self.policy.decide(
                &FailedAttempt {
                    number: attempt,
                    location,
                    failure: &failure,
                },
                request.idempotent,
                &candidates,
            );

            let Some(next) = decision.action.target() else {
                warn!(
                    attempt,
                    %location,
                    status = ?failure.status(),
                    error = %failure,
                    "[Pipeline] Giving up"
                );
                return Err(CastorError::Terminal {
                    attempts: attempt,
                    transient: self.policy.is_retryable(&failure),
                    failure,
                });
            };

            if decision.reason == RetryReason::StaleSecondary {
                candidates.narrow_to(StorageLocation::Primary);
            }

            warn!(
                attempt,
                %location,
                next = %next,
                wait_ms = u64::try_from(decision.wait.as_millis()).unwrap_or(u64::MAX),
                reason = ?decision.reason,
                error = %failure,
                "[Pipeline] Retrying after error"
            );

            if !decision.wait.is_zero() {
                tokio::select! {
                    biased;
                    () = interrupted(cancel, deadline) => {
                        warn!(attempt, "[Pipeline] Cancelled during backoff");
                        return Err(CastorError::Cancelled { attempts: attempt });
                    }
                    () = tokio::time::sleep(decision.wait) => {}
                }
            }

            location = next;
        }
    }

    fn build_request(
        &self,
        request: &LogicalRequest,
        location: StorageLocation,
        continuation: Option<&ContinuationToken>,
    ) -> Result<TransportRequest, CastorError> {
        let url = self
            .endpoints
            .request_url(location, &request.path, &request.query)?;

        let mut transport_request = TransportRequest {
            method: request.method.clone(),
            url,
            headers: request.headers.clone(),
            body: request.body.clone(),
            timeout: self.attempt_timeout,
        };

        if let (Some(paging), Some(token)) = (request.paging.as_ref(), continuation) {
            paging.apply(token.markers(), &mut transport_request);
        }

        Ok(transport_request)
    }

    async fn send_once(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        match self.attempt_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.transport.send(request))
                .await
                .unwrap_or_else(|_| {
                    Err(TransportError::timeout(format!(
                        "attempt exceeded {}ms",
                        timeout.as_millis()
                    )))
                }),
            None => self.transport.send(request).await,
        }
    }

    fn notify(&self, record: AttemptRecord) {
        for observer in &self.observers {
            observer.after_receive(&record);
        }
    }

    fn finish(
        &self,
        operation_id: Uuid,
        request: &LogicalRequest,
        location: StorageLocation,
        attempts: u32,
        response: TransportResponse,
    ) -> PipelineResponse {
        let continuation = request.paging.as_ref().and_then(|paging| {
            ContinuationToken::from_markers(paging.extract(&response), Some(location))
        });

        debug!(
            attempts,
            %location,
            status = %response.status,
            has_more = continuation.is_some(),
            "[Pipeline] Completed"
        );

        PipelineResponse {
            operation_id,
            status: response.status,
            headers: response.headers,
            body: response.body,
            location,
            attempts,
            continuation,
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::domain::{
    consultation_fee, Consultation, ConsultationId, ConsultationStatus, ConsultationType, Lawyer,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    session::UserSession,
    timing::{FlowTimings, Navigation},
};

pub const DEFAULT_DURATION_MINUTES: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingState {
    Form,
    Submitting,
    Success,
}

/// What the user filled into the booking form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingDraft {
    pub kind: ConsultationType,
    pub time_slot: Option<DateTime<Utc>>,
    pub duration_minutes: u32,
    pub description: String,
}

impl BookingDraft {
    pub fn new(kind: ConsultationType, description: impl Into<String>) -> Self {
        Self {
            kind,
            time_slot: None,
            duration_minutes: DEFAULT_DURATION_MINUTES,
            description: description.into(),
        }
    }

    pub fn at(mut self, slot: DateTime<Utc>) -> Self {
        self.time_slot = Some(slot);
        self
    }

    pub fn lasting(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BookingError {
    #[error("please sign in before booking a consultation")]
    NotSignedIn,
    #[error("please choose a time slot for phone or video consultations")]
    MissingTimeSlot,
    #[error("please describe your legal problem")]
    MissingDescription,
    #[error("this booking has already been submitted")]
    NotEditable,
    #[error("booking was cancelled")]
    Cancelled,
}

/// A locally confirmed booking. The consultation id stays `0` because
/// nothing is persisted server side.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingReceipt {
    pub reference: Uuid,
    pub consultation: Consultation,
}

/// Form -> Submitting -> Success for one lawyer.
///
/// Every simulated delay races the flow's cancellation token; dropping the
/// flow cancels it, so nothing fires after the user has navigated away.
/// Reaching `Success` schedules the redirect on its own and publishes it on
/// [`BookingFlow::redirects`], the same way a room broadcasts its `Navigate`.
pub struct BookingFlow {
    lawyer: Lawyer,
    state: BookingState,
    notice: Option<String>,
    timings: FlowTimings,
    cancel: CancellationToken,
    redirect: Arc<watch::Sender<Option<Navigation>>>,
}

/// Holds the flow in `Submitting` and puts it back to `Form` when dropped,
/// including when the caller drops the `submit` future mid-delay.
struct SubmittingGuard<'a> {
    state: &'a mut BookingState,
    armed: bool,
}

impl<'a> SubmittingGuard<'a> {
    fn enter(state: &'a mut BookingState) -> Self {
        *state = BookingState::Submitting;
        Self { state, armed: true }
    }

    fn succeed(mut self) {
        *self.state = BookingState::Success;
        self.armed = false;
    }
}

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.state = BookingState::Form;
        }
    }
}

impl BookingFlow {
    pub fn new(lawyer: Lawyer, timings: FlowTimings) -> Self {
        let (redirect, _) = watch::channel(None);
        Self {
            lawyer,
            state: BookingState::Form,
            notice: None,
            timings,
            cancel: CancellationToken::new(),
            redirect: Arc::new(redirect),
        }
    }

    pub fn lawyer(&self) -> &Lawyer {
        &self.lawyer
    }

    pub fn state(&self) -> BookingState {
        self.state
    }

    /// Last user-visible message, if any.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Handle other tasks can use to abort a pending submission or redirect.
    ///
    /// A cancelled handle is spent: the next submission from `Form` runs
    /// under a fresh token, so take a new handle after a cancellation.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Receives `Some(target)` once the post-success redirect fires.
    pub fn redirects(&self) -> watch::Receiver<Option<Navigation>> {
        self.redirect.subscribe()
    }

    /// Fee the form would show for the given duration.
    pub fn quote(&self, duration_minutes: u32) -> u32 {
        consultation_fee(self.lawyer.hourly_rate, duration_minutes)
    }

    pub async fn submit(
        &mut self,
        session: Option<&UserSession>,
        draft: BookingDraft,
    ) -> Result<BookingReceipt, BookingError> {
        if self.state != BookingState::Form {
            return Err(BookingError::NotEditable);
        }
        let session = match self.check(session, &draft) {
            Ok(session) => session,
            Err(err) => {
                self.notice = Some(err.to_string());
                return Err(err);
            }
        };
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        self.notice = None;
        debug!(lawyer_id = self.lawyer.id.0, kind = draft.kind.as_str(), "submitting booking");
        let guard = SubmittingGuard::enter(&mut self.state);

        let cancelled = tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(self.timings.submit_delay) => false,
        };
        if cancelled {
            self.notice = Some(BookingError::Cancelled.to_string());
            info!(lawyer_id = self.lawyer.id.0, "booking submission cancelled");
            return Err(BookingError::Cancelled);
        }

        let receipt = BookingReceipt {
            reference: Uuid::new_v4(),
            consultation: Consultation {
                id: ConsultationId(0),
                lawyer_id: self.lawyer.id,
                client_id: session.user.id,
                kind: draft.kind,
                status: ConsultationStatus::Pending,
                scheduled_at: draft.time_slot.filter(|_| draft.kind.requires_time_slot()),
                duration_minutes: draft.duration_minutes,
                fee: consultation_fee(self.lawyer.hourly_rate, draft.duration_minutes),
                description: draft.description.trim().to_string(),
                created_at: Utc::now(),
            },
        };
        guard.succeed();
        self.notice = Some("booking submitted, the lawyer will confirm shortly".into());
        info!(
            reference = %receipt.reference,
            lawyer_id = self.lawyer.id.0,
            fee = receipt.consultation.fee,
            "booking succeeded"
        );
        self.schedule_redirect();
        Ok(receipt)
    }

    /// Waits for the redirect scheduled on success. `None` when the flow was
    /// cancelled first or has not succeeded.
    pub async fn await_redirect(&self) -> Option<Navigation> {
        if self.state != BookingState::Success {
            return None;
        }
        let mut redirects = self.redirects();
        tokio::select! {
            biased;
            target = redirects.wait_for(Option::is_some) => target.ok().and_then(|target| *target),
            _ = self.cancel.cancelled() => None,
        }
    }

    fn schedule_redirect(&self) {
        let cancel = self.cancel.clone();
        let redirect = Arc::clone(&self.redirect);
        let delay = self.timings.success_redirect_delay;
        let lawyer_id = self.lawyer.id.0;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => debug!(lawyer_id, "booking redirect cancelled"),
                _ = tokio::time::sleep(delay) => {
                    redirect.send_replace(Some(Navigation::MyConsultations));
                }
            }
        });
    }

    fn check<'s>(
        &self,
        session: Option<&'s UserSession>,
        draft: &BookingDraft,
    ) -> Result<&'s UserSession, BookingError> {
        let session = session.ok_or(BookingError::NotSignedIn)?;
        if draft.kind.requires_time_slot() && draft.time_slot.is_none() {
            return Err(BookingError::MissingTimeSlot);
        }
        if draft.description.trim().is_empty() {
            return Err(BookingError::MissingDescription);
        }
        Ok(session)
    }
}

impl Drop for BookingFlow {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[path = "tests/booking_tests.rs"]
mod tests;

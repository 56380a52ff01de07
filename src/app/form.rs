//! Submission state machine.
//!
//! `FormState` is a snapshot: every transition takes the current state by
//! value and hands back the next one, so the flow can be driven without a
//! window.

use chrono::Utc;
use thiserror::Error;

use crate::app::local_ref::{LocalRef, LocalRefs};
use crate::app::slots::{LoadError, Slots};
use crate::app::webhook::{Submission, SubmitError, Webhook, WebhookReply, extract_result};

pub const LOADING_MESSAGE: &str = "GENERANDO...";
pub const RETRY_MESSAGE: &str = "Ocurrió un error al enviar. Por favor intenta de nuevo.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Por favor, sube ambas imágenes (Personaje y Producto)")]
    MissingImages,
    #[error("Por favor, introduce un email válido")]
    InvalidEmail,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusKind {
    #[default]
    None,
    Loading,
    Success,
    Error,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Status {
    pub message: String,
    pub kind: StatusKind,
}

impl Status {
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Error, message)
    }

    pub fn is_visible(&self) -> bool {
        !self.message.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormState {
    pub instructions: String,
    pub email: String,
    pub status: Status,
    pub loading: bool,
    pub result: Option<String>,
}

impl FormState {
    pub fn with_status(self, status: Status) -> Self {
        Self { status, ..self }
    }

    /// Outcome of offering a file to one of the slots.
    pub fn after_load(self, outcome: Result<(), LoadError>) -> Self {
        match outcome {
            Ok(()) => self.with_status(Status::default()),
            Err(err) => {
                log::warn!("image rejected: {err}");
                self.with_status(Status::error(err.to_string()))
            }
        }
    }

    pub fn validate(&self, slots: &Slots) -> Result<Submission, ValidationError> {
        let (character, product) = slots.pair().ok_or(ValidationError::MissingImages)?;
        if !self.email.contains('@') {
            return Err(ValidationError::InvalidEmail);
        }
        Ok(Submission {
            character,
            product,
            instructions: self.instructions.clone(),
            email: self.email.clone(),
            client_timestamp: Utc::now(),
        })
    }

    /// Validates and enters the loading state. On failure the returned state
    /// carries the validation message and no submission is produced.
    pub fn begin_submit(
        self,
        slots: &Slots,
        refs: &mut LocalRefs,
    ) -> (Self, Option<Submission>) {
        match self.validate(slots) {
            Err(err) => (self.with_status(Status::error(err.to_string())), None),
            Ok(submission) => {
                if let Some(old) = &self.result {
                    refs.revoke_uri(old);
                }
                let next = Self {
                    loading: true,
                    status: Status::new(StatusKind::Loading, LOADING_MESSAGE),
                    result: None,
                    ..self
                };
                (next, Some(submission))
            }
        }
    }

    pub fn apply_reply(
        self,
        outcome: Result<WebhookReply, SubmitError>,
        refs: &mut LocalRefs,
    ) -> Self {
        match outcome {
            Err(err) => {
                log::error!("submission failed: {err}");
                self.with_status(Status::error(RETRY_MESSAGE))
            }
            Ok(reply) => {
                let status = Status::new(
                    StatusKind::Success,
                    format!("¡Perfecto! Recibirás el anuncio en: {}", self.email),
                );
                let result = match extract_result(reply) {
                    Ok(image) => Some(image.into_reference(refs)),
                    Err(err) => {
                        log::warn!("no image in webhook reply: {err}");
                        None
                    }
                };
                Self {
                    status,
                    result,
                    ..self
                }
            }
        }
    }

    /// Always leaves the loading state; a status stuck on loading is cleared.
    pub fn settle(self) -> Self {
        let status = if self.status.kind == StatusKind::Loading {
            Status::default()
        } else {
            self.status
        };
        Self {
            loading: false,
            status,
            ..self
        }
    }

    pub fn can_submit(&self) -> bool {
        !self.loading
    }

    pub fn result_is_local(&self) -> bool {
        self.result.as_deref().is_some_and(LocalRef::is_local)
    }
}

/// Runs validation, the request and settling on the calling thread.
pub fn submit_blocking<W: Webhook>(
    state: FormState,
    slots: &Slots,
    webhook: &W,
    refs: &mut LocalRefs,
) -> FormState {
    let (state, submission) = state.begin_submit(slots, refs);
    let Some(submission) = submission else {
        return state;
    };
    let outcome = webhook.post(&submission);
    state.apply_reply(outcome, refs).settle()
}

//! An HTTP client that uploads evaluation batches to the intake.
use std::sync::{Arc, Mutex};

use reqwest::{StatusCode, Url};

use crate::{Error, EventWriter, Result};

use super::events::{BatchContext, EvaluationBatch, EvaluationEvent};

/// Configuration for [`EvaluationIntake`].
#[derive(Debug, Clone)]
pub struct EvaluationIntakeConfig {
    /// Intake site suffix, e.g. `"example.com"`. The full endpoint is derived from it.
    pub site: String,
    /// Client token identifying the application to the intake.
    pub client_token: String,
    /// Application-level identity attached to every uploaded batch.
    pub context: BatchContext,
}

fn evaluation_intake_url(site: &str, client_token: &str) -> Result<Url> {
    Url::parse_with_params(
        &format!("https://browser-intake-{site}/api/v2/flagevaluation"),
        &[("apiKey", client_token)],
    )
    .map_err(Error::InvalidBaseUrl)
}

/// A client that uploads batches of evaluation events to the intake.
///
/// Events written through [`EventWriter`] are buffered in memory;
/// [`upload`][EvaluationIntake::upload] posts everything buffered so far as one batch envelope.
/// There is no retry: a failed upload drops its batch and surfaces the error to the caller.
///
/// Cloning is cheap and clones share the same buffer.
#[derive(Clone)]
pub struct EvaluationIntake {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
    url: Url,
    context: BatchContext,
    runtime: Arc<tokio::runtime::Runtime>,
    pending: Arc<Mutex<Vec<EvaluationEvent>>>,
}

impl EvaluationIntake {
    /// Creates an intake client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBaseUrl`] if the site suffix does not produce a valid URL, or an
    /// IO error if the async runtime failed to start.
    pub fn new(config: EvaluationIntakeConfig) -> Result<EvaluationIntake> {
        let url = evaluation_intake_url(&config.site, &config.client_token)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(EvaluationIntake {
            client: reqwest::Client::new(),
            url,
            context: config.context,
            runtime: Arc::new(runtime),
            pending: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Number of events buffered and not yet uploaded.
    pub fn queued_event_count(&self) -> usize {
        self.pending
            .lock()
            .expect("thread holding pending-events lock should not panic")
            .len()
    }

    /// Posts all buffered events as a single batch envelope.
    ///
    /// A no-op when the buffer is empty.
    pub fn upload(&self) -> Result<()> {
        let events = {
            let mut pending = self
                .pending
                .lock()
                .expect("thread holding pending-events lock should not panic");
            std::mem::take(&mut *pending)
        };
        if events.is_empty() {
            return Ok(());
        }

        let batch = EvaluationBatch {
            context: self.context.clone(),
            flag_evaluations: events,
        };
        log::debug!(target: "rum", batch_size = batch.flag_evaluations.len(); "uploading evaluation batch");

        self.runtime.block_on(async {
            let response = self.client.post(self.url.clone()).json(&batch).send().await?;
            response.error_for_status().map_err(|err| {
                if err.status() == Some(StatusCode::UNAUTHORIZED) {
                    log::warn!(target: "rum", "intake rejected the client token");
                    Error::Unauthorized
                } else {
                    log::warn!(target: "rum", "received non-success response from evaluation intake: {:?}", err);
                    Error::from(err)
                }
            })?;
            Ok(())
        })
    }
}

impl EventWriter<EvaluationEvent> for EvaluationIntake {
    fn write(&self, event: EvaluationEvent) {
        self.pending
            .lock()
            .expect("thread holding pending-events lock should not panic")
            .push(event);
    }
}

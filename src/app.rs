pub mod backdrop;
pub mod download;
pub mod form;
mod gui;
pub mod local_ref;
pub mod slots;
pub mod webhook;

use std::sync::mpsc;

use eframe::CreationContext;

use crate::app::backdrop::Backdrop;
use crate::app::download::{DownloadStatus, ResultSource};
use crate::app::form::FormState;
use crate::app::local_ref::LocalRefs;
use crate::app::slots::{ImageFile, LoadError, SlotRole, Slots};
use crate::app::webhook::{SubmitError, Webhook, WebhookClient, WebhookReply};

const WORKER_CHANNEL_SIZE: usize = 8;
const SCROLL_DELAY_SECS: f64 = 0.1;

/// Results sent back by worker threads.
pub enum WorkerMsg {
    Submitted(Result<WebhookReply, SubmitError>),
    Fetched(Result<Vec<u8>, SubmitError>),
}

pub struct AnexoApp {
    form: FormState,
    slots: Slots,
    refs: LocalRefs,
    // spawned on the first frame, once the window size is known
    backdrop: Option<Backdrop>,
    webhook: Option<WebhookClient>,
    download: DownloadStatus,

    worker_tx: mpsc::SyncSender<WorkerMsg>,
    worker_rx: mpsc::Receiver<WorkerMsg>,

    gui: gui::GuiState,
}

impl AnexoApp {
    pub fn new(cc: &CreationContext<'_>) -> Self {
        egui_extras::install_image_loaders(&cc.egui_ctx);
        cc.egui_ctx.set_visuals(egui::Visuals::dark());

        let webhook = match WebhookClient::from_env() {
            Ok(client) => Some(client),
            Err(err) => {
                log::error!("could not create webhook client: {err}");
                None
            }
        };
        let (worker_tx, worker_rx) = mpsc::sync_channel(WORKER_CHANNEL_SIZE);

        Self {
            form: FormState::default(),
            slots: Slots::default(),
            refs: LocalRefs::new(),
            backdrop: None,
            webhook,
            download: DownloadStatus::None,
            worker_tx,
            worker_rx,
            gui: gui::GuiState::default(),
        }
    }

    pub fn get_latest_msg(&mut self) -> Option<WorkerMsg> {
        match self.worker_rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => {
                log::error!("worker channel disconnected");
                None
            }
        }
    }

    fn offer_file(&mut self, role: SlotRole, file: Result<ImageFile, LoadError>) {
        let outcome = file.and_then(|file| self.slots.accept(role, file, &mut self.refs));
        self.form = std::mem::take(&mut self.form).after_load(outcome);
    }

    /// Starts a submission with whatever the form currently holds. Used by
    /// both the submit and the regenerate controls.
    fn submit(&mut self, ctx: &egui::Context) {
        if !self.form.can_submit() {
            return;
        }
        let (state, submission) =
            std::mem::take(&mut self.form).begin_submit(&self.slots, &mut self.refs);
        self.form = state;
        let Some(submission) = submission else {
            return;
        };

        let Some(webhook) = self.webhook.clone() else {
            let err = SubmitError::Form("webhook client unavailable".to_owned());
            self.finish_submission(Err(err), ctx);
            return;
        };

        log::info!(
            "submitting {} + {} for {}",
            submission.character.name,
            submission.product.name,
            submission.email
        );
        std::thread::spawn({
            let tx = self.worker_tx.clone();
            let ctx = ctx.clone();
            move || {
                let outcome = webhook.post(&submission);
                if tx.send(WorkerMsg::Submitted(outcome)).is_err() {
                    log::error!("failed to send submission result");
                }
                ctx.request_repaint();
            }
        });
    }

    fn finish_submission(
        &mut self,
        outcome: Result<WebhookReply, SubmitError>,
        ctx: &egui::Context,
    ) {
        self.form = std::mem::take(&mut self.form)
            .apply_reply(outcome, &mut self.refs)
            .settle();
        if self.form.result.is_some() {
            let now = ctx.input(|i| i.time);
            self.gui.scroll_result_at = Some(now + SCROLL_DELAY_SECS);
        }
    }

    fn start_download(&mut self, ctx: &egui::Context) {
        let Some(result) = self.form.result.clone() else {
            return;
        };
        match download::resolve(&result, &self.refs) {
            Ok(ResultSource::Ready(bytes)) => self.save_download(&bytes),
            Ok(ResultSource::Remote(url)) => {
                let Some(client) = self.webhook.clone() else {
                    self.download = DownloadStatus::Error("cliente http no disponible".to_owned());
                    return;
                };
                self.download = DownloadStatus::Fetching;
                std::thread::spawn({
                    let tx = self.worker_tx.clone();
                    let ctx = ctx.clone();
                    move || {
                        let outcome = client.fetch(&url);
                        if tx.send(WorkerMsg::Fetched(outcome)).is_err() {
                            log::error!("failed to send download result");
                        }
                        ctx.request_repaint();
                    }
                });
            }
            Err(err) => {
                log::error!("download failed: {err}");
                self.download = DownloadStatus::Error(err.to_string());
            }
        }
    }

    fn save_download(&mut self, bytes: &[u8]) {
        self.download = match download::save_with_dialog(bytes) {
            Ok(Some(path)) => DownloadStatus::Complete(path),
            Ok(None) => DownloadStatus::None,
            Err(err) => {
                log::error!("download failed: {err}");
                DownloadStatus::Error(err.to_string())
            }
        };
    }

    fn handle_worker_msgs(&mut self, ctx: &egui::Context) {
        while let Some(msg) = self.get_latest_msg() {
            match msg {
                WorkerMsg::Submitted(outcome) => self.finish_submission(outcome, ctx),
                WorkerMsg::Fetched(Ok(bytes)) => self.save_download(&bytes),
                WorkerMsg::Fetched(Err(err)) => {
                    let err = download::DownloadError::from(err);
                    log::error!("download failed: {err}");
                    self.download = DownloadStatus::Error(err.to_string());
                }
            }
        }
    }
}

use super::AnexoApp;
use crate::app::backdrop::Backdrop;
use crate::app::download::DownloadStatus;
use crate::app::form::StatusKind;
use crate::app::local_ref::LocalRef;
use crate::app::slots::{ImageFile, LoadError, PICKER_EXTENSIONS, SlotRole, Slots};
use crate::app::webhook::decode_data_uri;
use eframe::App;
use eframe::Frame;
use egui::Color32;
use egui::ImageSource;
use egui::RichText;
use egui::Window;
use egui::load::Bytes;

const BACKGROUND: Color32 = Color32::from_rgb(0x05, 0x05, 0x0f);
const PRIMARY: Color32 = Color32::from_rgb(0x00, 0xf3, 0xff);
const SECONDARY: Color32 = Color32::from_rgb(0xff, 0x00, 0xff);
const SUCCESS: Color32 = Color32::from_rgb(0x3d, 0xff, 0x8b);
const ERROR: Color32 = Color32::from_rgb(0xff, 0x4d, 0x6d);
const CONTENT_WIDTH: f32 = 620.0;
const DROP_TARGET_SIZE: egui::Vec2 = egui::vec2(270.0, 200.0);

#[derive(Default)]
pub(crate) struct GuiState {
    pub scroll_result_at: Option<f64>,
    // drop target rects from the last frame, used to route dropped files
    drop_targets: Vec<(SlotRole, egui::Rect)>,
    // data uri result and the local ref holding its decoded bytes
    decoded_result: Option<(String, Option<LocalRef>)>,
}

impl App for AnexoApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.handle_worker_msgs(ctx);
        self.handle_dropped_files(ctx);
        self.sync_decoded_result();
        for uri in self.refs.drain_revoked() {
            ctx.forget_image(&uri);
        }

        self.paint_backdrop(ctx);

        let (dragging, pointer) =
            ctx.input(|i| (!i.raw.hovered_files.is_empty(), i.pointer.hover_pos()));

        egui::CentralPanel::default()
            .frame(egui::Frame::new().inner_margin(16.0))
            .show(ctx, |ui| {
                egui::ScrollArea::vertical()
                    .auto_shrink([false, false])
                    .show(ui, |ui| {
                        ui.vertical_centered(|ui| {
                            ui.set_max_width(CONTENT_WIDTH);
                            header(ui);
                            ui.add_space(24.0);
                            self.upload_section(ui, dragging, pointer);
                            ui.add_space(16.0);
                            self.form_section(ui, ctx);
                            ui.add_space(16.0);
                            self.result_section(ui, ctx);
                        });
                    });
            });

        self.download_window(ctx);

        // continuous repaint for the backdrop
        ctx.request_repaint();
    }

    fn on_exit(&mut self) {
        self.slots.release(&mut self.refs);
        self.refs.revoke_all();
        log::debug!("released {} local refs", self.refs.drain_revoked().len());
    }
}

fn header(ui: &mut egui::Ui) {
    ui.label(RichText::new("ANEXO").size(56.0).strong().color(PRIMARY));
    ui.label(
        RichText::new("GENERADOR DE ANUNCIOS IA")
            .color(Color32::GRAY)
            .extra_letter_spacing(2.0),
    );
}

fn pick_file(role: SlotRole) -> Option<Result<ImageFile, LoadError>> {
    let path = rfd::FileDialog::new()
        .set_title(format!("Imagen: {}", role.title()))
        .add_filter("image files", &PICKER_EXTENSIONS)
        .pick_file()?;
    Some(ImageFile::from_path(&path))
}

fn dropped_to_image_file(file: egui::DroppedFile) -> Result<ImageFile, LoadError> {
    if let Some(path) = &file.path {
        return ImageFile::from_path(path);
    }
    match file.bytes {
        Some(bytes) => Ok(ImageFile::new(file.name, bytes)),
        None => Err(LoadError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "dropped file has no data",
        ))),
    }
}

/// Picks the slot for a dropped file. Some platforms report no pointer
/// position during an OS drag; the first empty slot is used then.
fn drop_role(
    targets: &[(SlotRole, egui::Rect)],
    pointer: Option<egui::Pos2>,
    slots: &Slots,
) -> Option<SlotRole> {
    match pointer {
        Some(pos) => targets
            .iter()
            .find(|(_, rect)| rect.contains(pos))
            .map(|(role, _)| *role),
        None => Some(slots.fallback_drop_role()),
    }
}

fn bytes_source(uri: &str, bytes: std::sync::Arc<[u8]>) -> ImageSource<'static> {
    ImageSource::Bytes {
        uri: uri.to_owned().into(),
        bytes: Bytes::Shared(bytes),
    }
}

impl AnexoApp {
    fn paint_backdrop(&mut self, ctx: &egui::Context) {
        let screen = ctx.screen_rect();
        let backdrop = Backdrop::fit(&mut self.backdrop, screen.size());
        backdrop.step();

        let painter = ctx.layer_painter(egui::LayerId::background());
        painter.rect_filled(screen, 0.0, BACKGROUND);
        backdrop.paint(&painter);
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let (dropped, pointer) =
            ctx.input(|i| (i.raw.dropped_files.clone(), i.pointer.hover_pos()));
        let Some(file) = dropped.into_iter().next() else {
            return;
        };

        let Some(role) = drop_role(&self.gui.drop_targets, pointer, &self.slots) else {
            log::debug!("ignored {} dropped outside the drop targets", file.name);
            return;
        };
        self.offer_file(role, dropped_to_image_file(file));
    }

    fn upload_section(&mut self, ui: &mut egui::Ui, dragging: bool, pointer: Option<egui::Pos2>) {
        self.gui.drop_targets.clear();
        ui.horizontal_wrapped(|ui| {
            for role in SlotRole::ALL {
                self.slot_card(ui, role, dragging, pointer);
            }
        });
        if dragging && pointer.is_none() {
            let role = self.slots.fallback_drop_role();
            ui.label(
                RichText::new(format!("Suelta el archivo: irá a {}", role.title()))
                    .color(SECONDARY),
            );
        }
    }

    fn slot_card(
        &mut self,
        ui: &mut egui::Ui,
        role: SlotRole,
        dragging: bool,
        pointer: Option<egui::Pos2>,
    ) {
        egui::Frame::group(ui.style())
            .fill(BACKGROUND.gamma_multiply(0.8))
            .show(ui, |ui| {
                ui.vertical_centered(|ui| {
                    ui.label(RichText::new(role.title()).strong().size(18.0).color(PRIMARY));

                    let (rect, response) =
                        ui.allocate_exact_size(DROP_TARGET_SIZE, egui::Sense::click());
                    self.gui.drop_targets.push((role, rect));

                    let dragover = dragging && pointer.is_some_and(|p| rect.contains(p));
                    let stroke = if dragover {
                        egui::Stroke::new(2.0, SECONDARY)
                    } else {
                        egui::Stroke::new(1.0, PRIMARY.gamma_multiply(0.5))
                    };
                    ui.painter()
                        .rect_stroke(rect, 8.0, stroke, egui::StrokeKind::Inside);

                    let preview = self.slots.get(role).preview().and_then(|preview| {
                        self.refs
                            .bytes(preview.uri())
                            .map(|bytes| bytes_source(preview.uri(), bytes))
                    });
                    match preview {
                        Some(source) => {
                            let inner = rect.shrink(6.0);
                            ui.put(
                                inner,
                                egui::Image::new(source)
                                    .max_size(inner.size())
                                    .maintain_aspect_ratio(true),
                            );
                        }
                        None => {
                            ui.painter().text(
                                rect.center(),
                                egui::Align2::CENTER_CENTER,
                                "Arrastra o haz clic\n(Máx 10MB)",
                                egui::FontId::proportional(14.0),
                                Color32::GRAY,
                            );
                        }
                    }

                    let clicked_target = response
                        .on_hover_cursor(egui::CursorIcon::PointingHand)
                        .clicked();
                    let clicked_button = ui.button("Seleccionar Archivo").clicked();
                    if clicked_target || clicked_button {
                        if let Some(file) = pick_file(role) {
                            self.offer_file(role, file);
                        }
                    }
                });
            });
    }

    fn form_section(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.with_layout(egui::Layout::top_down(egui::Align::Min), |ui| {
            ui.label(RichText::new("Instrucciones / Prompt").color(PRIMARY));
            ui.add(
                egui::TextEdit::multiline(&mut self.form.instructions)
                    .hint_text("Describe cómo quieres que sea tu anuncio...")
                    .desired_rows(4)
                    .desired_width(f32::INFINITY),
            );
            ui.add_space(8.0);

            ui.label(RichText::new("Email de Recepción *").color(PRIMARY));
            ui.add(
                egui::TextEdit::singleline(&mut self.form.email)
                    .hint_text("usuario@ejemplo.com")
                    .desired_width(f32::INFINITY),
            );
            ui.add_space(12.0);

            let label = if self.form.loading {
                "GENERANDO..."
            } else {
                "GENERAR ANUNCIO"
            };
            ui.horizontal(|ui| {
                let button = egui::Button::new(RichText::new(label).strong().size(18.0))
                    .min_size(egui::vec2(CONTENT_WIDTH.min(ui.available_width()) - 40.0, 40.0));
                if ui.add_enabled(self.form.can_submit(), button).clicked() {
                    self.submit(ctx);
                }
                if self.form.loading {
                    ui.add(egui::Spinner::new().color(PRIMARY));
                }
            });

            let status = &self.form.status;
            if status.is_visible() {
                let color = match status.kind {
                    StatusKind::Success => SUCCESS,
                    StatusKind::Error => ERROR,
                    StatusKind::Loading => PRIMARY,
                    StatusKind::None => Color32::GRAY,
                };
                ui.add_space(8.0);
                ui.colored_label(color, &status.message);
            }
        });
    }

    fn result_section(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let Some(result) = self.form.result.clone() else {
            return;
        };

        let response = egui::Frame::group(ui.style())
            .fill(BACKGROUND.gamma_multiply(0.8))
            .show(ui, |ui| {
                ui.vertical_centered(|ui| {
                    ui.label(
                        RichText::new("RESULTADO GENERADO")
                            .strong()
                            .size(20.0)
                            .color(PRIMARY),
                    );
                    if let Some(source) = self.result_image_source(&result) {
                        ui.add(
                            egui::Image::new(source)
                                .max_width(ui.available_width())
                                .maintain_aspect_ratio(true)
                                .corner_radius(8.0),
                        );
                    }
                    ui.add_space(8.0);
                    if ui
                        .add_enabled(
                            !self.download.is_busy(),
                            egui::Button::new(RichText::new("Descargar Imagen").strong()),
                        )
                        .clicked()
                    {
                        self.start_download(ctx);
                    }
                    if ui
                        .add_enabled(
                            self.form.can_submit(),
                            egui::Button::new(
                                RichText::new("REGENERAR (Mismos Datos)").color(SECONDARY),
                            ),
                        )
                        .clicked()
                    {
                        self.submit(ctx);
                    }
                });
            })
            .response;

        if let Some(at) = self.gui.scroll_result_at {
            if ctx.input(|i| i.time) >= at {
                response.scroll_to_me(Some(egui::Align::Center));
                self.gui.scroll_result_at = None;
            } else {
                ctx.request_repaint_after(std::time::Duration::from_secs_f64(
                    at - ctx.input(|i| i.time),
                ));
            }
        }
    }

    /// Drops decoded bytes that no longer belong to the current result.
    fn sync_decoded_result(&mut self) {
        let current = self.form.result.as_deref();
        let stale = self
            .gui
            .decoded_result
            .as_ref()
            .is_some_and(|(source, _)| Some(source.as_str()) != current);
        if stale {
            if let Some((_, Some(local))) = self.gui.decoded_result.take() {
                self.refs.revoke(&local);
            }
            self.gui.decoded_result = None;
        }
    }

    fn result_image_source(&mut self, result: &str) -> Option<ImageSource<'static>> {
        if LocalRef::is_local(result) {
            return self.refs.bytes(result).map(|bytes| bytes_source(result, bytes));
        }
        if !result.starts_with("data:") {
            return Some(ImageSource::Uri(result.to_owned().into()));
        }

        if self.gui.decoded_result.is_none() {
            let local = decode_data_uri(result).map(|bytes| self.refs.create(bytes));
            if local.is_none() {
                log::warn!("result data uri is not valid base64");
            }
            self.gui.decoded_result = Some((result.to_owned(), local));
        }
        let local = self.gui.decoded_result.as_ref()?.1.as_ref()?;
        self.refs
            .bytes(local.uri())
            .map(|bytes| bytes_source(local.uri(), bytes))
    }

    fn download_window(&mut self, ctx: &egui::Context) {
        if self.download.is_none() {
            return;
        }
        let mut close = false;
        Window::new("descarga")
            .title_bar(false)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| match &self.download {
                DownloadStatus::Fetching => {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("descargando imagen...");
                    });
                }
                DownloadStatus::Complete(path) => {
                    ui.label("¡imagen guardada!");
                    ui.horizontal(|ui| {
                        if ui.button("abrir carpeta").clicked() {
                            opener::reveal(path).ok();
                        }
                        if ui.button("cerrar").clicked() {
                            close = true;
                        }
                    });
                }
                DownloadStatus::Error(err) => {
                    ui.label(format!("Error: {err}"));
                    if ui.button("cerrar").clicked() {
                        close = true;
                    }
                }
                DownloadStatus::None => {}
            });
        if close {
            self.download = DownloadStatus::None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::local_ref::LocalRefs;
    use egui::{Rect, pos2};

    fn targets() -> Vec<(SlotRole, Rect)> {
        vec![
            (
                SlotRole::Character,
                Rect::from_min_size(pos2(0.0, 0.0), DROP_TARGET_SIZE),
            ),
            (
                SlotRole::Product,
                Rect::from_min_size(pos2(300.0, 0.0), DROP_TARGET_SIZE),
            ),
        ]
    }

    #[test]
    fn drop_goes_to_target_under_pointer() {
        let slots = Slots::default();
        let role = drop_role(&targets(), Some(pos2(350.0, 100.0)), &slots);
        assert_eq!(role, Some(SlotRole::Product));
        let role = drop_role(&targets(), Some(pos2(10.0, 10.0)), &slots);
        assert_eq!(role, Some(SlotRole::Character));
    }

    #[test]
    fn drop_outside_targets_is_ignored() {
        let slots = Slots::default();
        assert_eq!(drop_role(&targets(), Some(pos2(285.0, 100.0)), &slots), None);
        assert_eq!(drop_role(&[], Some(pos2(10.0, 10.0)), &slots), None);
    }

    #[test]
    fn drop_without_pointer_fills_first_empty_slot() {
        let mut slots = Slots::default();
        let mut refs = LocalRefs::new();
        assert_eq!(drop_role(&targets(), None, &slots), Some(SlotRole::Character));

        slots
            .accept(SlotRole::Character, ImageFile::new("c.png", vec![1u8]), &mut refs)
            .unwrap();
        assert_eq!(drop_role(&targets(), None, &slots), Some(SlotRole::Product));
    }
}

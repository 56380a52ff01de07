use anexo::AnexoApp;
use eframe::NativeOptions;
use egui::ViewportBuilder;

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let native_options = NativeOptions {
        viewport: ViewportBuilder::default()
            .with_title("ANEXO")
            .with_inner_size((900.0, 1000.0))
            .with_min_inner_size((420.0, 480.0))
            .with_clamp_size_to_monitor_size(true)
            .with_resizable(true)
            .with_drag_and_drop(true),
        ..Default::default()
    }; // wgpu backend is selected via the `wgpu` feature
    eframe::run_native(
        "ANEXO generador de anuncios",
        native_options,
        Box::new(|cc| Ok(Box::new(AnexoApp::new(cc)))),
    )
}

pub mod app;

pub use app::AnexoApp;

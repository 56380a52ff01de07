use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::app::local_ref::{LocalRef, LocalRefs};

pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024; // 10 MB
pub const PICKER_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Error: La imagen supera los 10MB")]
    TooLarge,
    #[error("No se pudo leer la imagen: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotRole {
    Character,
    Product,
}

impl SlotRole {
    pub const ALL: [SlotRole; 2] = [SlotRole::Character, SlotRole::Product];

    pub fn title(self) -> &'static str {
        match self {
            SlotRole::Character => "Personaje",
            SlotRole::Product => "Producto",
        }
    }

    /// Multipart field carrying this slot's image.
    pub fn field_name(self) -> &'static str {
        match self {
            SlotRole::Character => "character_image",
            SlotRole::Product => "product_image",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ImageFile {
    pub name: String,
    pub mime: &'static str,
    pub bytes: Arc<[u8]>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        let mime = image::ImageFormat::from_path(&name)
            .map(|format| format.to_mime_type())
            .unwrap_or("application/octet-stream");
        Self {
            name,
            mime,
            bytes: bytes.into(),
        }
    }

    /// Reads a file from disk, refusing oversized files before reading them.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        if std::fs::metadata(path)?.len() > MAX_FILE_BYTES {
            return Err(LoadError::TooLarge);
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "imagen".to_owned());
        let bytes = std::fs::read(path)?;
        Ok(Self::new(name, bytes))
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Default)]
pub struct ImageSlot {
    file: Option<ImageFile>,
    preview: Option<LocalRef>,
}

impl ImageSlot {
    pub fn file(&self) -> Option<&ImageFile> {
        self.file.as_ref()
    }

    pub fn preview(&self) -> Option<&LocalRef> {
        self.preview.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_none()
    }
}

#[derive(Default)]
pub struct Slots {
    character: ImageSlot,
    product: ImageSlot,
}

impl Slots {
    pub fn get(&self, role: SlotRole) -> &ImageSlot {
        match role {
            SlotRole::Character => &self.character,
            SlotRole::Product => &self.product,
        }
    }

    fn get_mut(&mut self, role: SlotRole) -> &mut ImageSlot {
        match role {
            SlotRole::Character => &mut self.character,
            SlotRole::Product => &mut self.product,
        }
    }

    /// Stores `file` in the slot for `role`, revoking the old preview first.
    /// Oversized files leave the slot untouched.
    pub fn accept(
        &mut self,
        role: SlotRole,
        file: ImageFile,
        refs: &mut LocalRefs,
    ) -> Result<(), LoadError> {
        if file.len() > MAX_FILE_BYTES {
            log::info!("rejected {} ({} bytes) for {:?}", file.name, file.len(), role);
            return Err(LoadError::TooLarge);
        }

        let slot = self.get_mut(role);
        if let Some(old) = slot.preview.take() {
            refs.revoke(&old);
        }
        slot.preview = Some(refs.create(file.bytes.clone()));
        log::info!("{:?} image set to {} ({} bytes)", role, file.name, file.len());
        slot.file = Some(file);
        Ok(())
    }

    /// Both files when both slots are populated.
    pub fn pair(&self) -> Option<(ImageFile, ImageFile)> {
        Some((self.character.file.clone()?, self.product.file.clone()?))
    }

    /// Where a dropped file goes when the pointer is not over a drop target.
    pub fn fallback_drop_role(&self) -> SlotRole {
        SlotRole::ALL
            .into_iter()
            .find(|role| self.get(*role).is_empty())
            .unwrap_or(SlotRole::Character)
    }

    pub fn release(&mut self, refs: &mut LocalRefs) {
        for role in SlotRole::ALL {
            if let Some(preview) = self.get_mut(role).preview.take() {
                refs.revoke(&preview);
            }
        }
    }
}

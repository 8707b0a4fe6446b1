use crate::application::admin::posts::{Flash, FlashKind};

#[derive(Clone)]
pub struct AdminFlashView {
    pub kind: &'static str,
    pub text: String,
    pub is_error: bool,
}

impl From<&Flash> for AdminFlashView {
    fn from(flash: &Flash) -> Self {
        Self {
            kind: flash.kind.as_str(),
            text: flash.text.clone(),
            is_error: matches!(flash.kind, FlashKind::Error),
        }
    }
}

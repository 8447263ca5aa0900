//! Resolves a public identifier to either a redirect or a paste.

use pasta_core::models::{Paste, Shortlink};
use pasta_core::AppError;
use std::sync::Arc;

use crate::paste::PasteService;
use crate::shortlink::ShortlinkService;

#[derive(Debug, Clone)]
pub enum Resolved {
    Redirect(Shortlink),
    Paste(Paste),
}

pub struct Resolver {
    pastes: Arc<PasteService>,
    shortlinks: Arc<ShortlinkService>,
}

impl Resolver {
    pub fn new(pastes: Arc<PasteService>, shortlinks: Arc<ShortlinkService>) -> Self {
        Self { pastes, shortlinks }
    }

    /// Shortlinks are checked first, then pastes. Both apply lazy expiry.
    pub async fn resolve(&self, id: &str) -> Result<Resolved, AppError> {
        match self.shortlinks.get(id).await {
            Ok(link) => return Ok(Resolved::Redirect(link)),
            Err(AppError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.pastes.get(id).await.map(Resolved::Paste)
    }

    /// Like [`resolve`](Self::resolve), and counts a click in the background
    /// when the id is a shortlink.
    pub async fn resolve_and_track(&self, id: &str) -> Result<Resolved, AppError> {
        let resolved = self.resolve(id).await?;
        if let Resolved::Redirect(link) = &resolved {
            self.shortlinks.spawn_click(link.id.clone());
        }
        Ok(resolved)
    }
}

//! Scoped page handles.

use std::sync::Arc;

use crate::observability::metrics;
use crate::render::engine::{RenderError, RenderPage, RequestInterceptor};
use crate::render::session::RenderSession;

/// Exclusive handle on one page, closed on every exit path.
///
/// Call [`PageLease::release`] on the normal path. If the lease is dropped
/// instead (error propagation, cancelled request future), the close is
/// spawned onto the runtime.
pub struct PageLease {
    page: Option<Box<dyn RenderPage>>,
}

impl PageLease {
    pub async fn open(
        session: &RenderSession,
        interceptor: Arc<dyn RequestInterceptor>,
    ) -> Result<Self, RenderError> {
        let page = session.browser().new_page(interceptor).await?;
        metrics::record_page_opened();
        Ok(Self { page: Some(page) })
    }

    pub fn page(&self) -> Result<&dyn RenderPage, RenderError> {
        self.page
            .as_deref()
            .ok_or_else(|| RenderError::Page("page already released".to_string()))
    }

    /// Close the page and wait for it.
    pub async fn release(mut self) {
        if let Some(page) = self.page.take() {
            page.close().await;
            metrics::record_page_closed();
        }
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    page.close().await;
                    metrics::record_page_closed();
                });
            }
            Err(_) => {
                tracing::warn!("Page dropped outside a runtime; engine will reclaim it on exit");
            }
        }
    }
}

/// Hard cap on backfill page size, matching the query service's limit.
pub const MAX_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// The signed-in user.
    pub viewer_id: String,
    /// This client's live pub/sub connection id, used for self-echo detection.
    pub connection_id: String,
    /// Messages requested per backfill fetch, clamped to [`MAX_PAGE_SIZE`].
    pub page_size: usize,
}

impl CoreConfig {
    pub fn new(viewer_id: impl Into<String>, connection_id: impl Into<String>) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            connection_id: connection_id.into(),
            page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerKey {
    Previous,
    Next,
    Quit,
    Refresh,
    Interrupt,
}

pub(crate) fn next_index(current: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        current.saturating_add(1).min(len - 1)
    }
}

pub(crate) fn prev_index(current: usize) -> usize {
    current.saturating_sub(1)
}

/// Multiplexer-private view state. The scroll offset is derived on every
/// render and always pins the newest line to the bottom of the log area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    selected: usize,
    job_count: usize,
    scroll_offset: usize,
    dimensions: (u16, u16),
}

impl ViewState {
    pub fn new(job_count: usize) -> Self {
        Self {
            selected: 0,
            job_count,
            scroll_offset: 0,
            dimensions: (0, 0),
        }
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    /// `(columns, rows)` seen by the last render.
    pub fn dimensions(&self) -> (u16, u16) {
        self.dimensions
    }

    pub fn select_next(&mut self) {
        self.selected = next_index(self.selected, self.job_count);
    }

    pub fn select_previous(&mut self) {
        self.selected = prev_index(self.selected);
    }

    pub(crate) fn update_layout(
        &mut self,
        dimensions: (u16, u16),
        total_lines: usize,
        log_rows: usize,
    ) {
        self.dimensions = dimensions;
        self.scroll_offset = total_lines.saturating_sub(log_rows);
    }
}

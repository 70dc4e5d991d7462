use crate::element::TreeRow;

/// Write-only projection target for the visible rows of a tree.
///
/// Indices are absolute positions in the pre-order sequence of visible nodes.
pub trait SequenceSink<T> {
    fn splice(&mut self, index: usize, delete_count: usize, rows: Vec<TreeRow<T>>);

    /// Re-issues a single row whose flags changed in place.
    fn rerender(&mut self, index: usize, row: TreeRow<T>) {
        self.splice(index, 1, vec![row]);
    }
}

impl<T> SequenceSink<T> for Vec<TreeRow<T>> {
    fn splice(&mut self, index: usize, delete_count: usize, rows: Vec<TreeRow<T>>) {
        let end = index.saturating_add(delete_count).min(self.len());
        Vec::splice(self, index..end, rows);
    }

    fn rerender(&mut self, index: usize, row: TreeRow<T>) {
        if let Some(slot) = self.get_mut(index) {
            *slot = row;
        }
    }
}

use thiserror::Error;

use crate::ingest::{ImageId, ImageRecord};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ListError {
    #[error("image {0} is already in the list")]
    DuplicateId(ImageId),
    #[error("no image with id {0}")]
    UnknownId(ImageId),
    #[error("position {index} out of bounds for {len} image(s)")]
    OutOfBounds { index: usize, len: usize },
}

/// Ordered working set of images. List order is page order.
///
/// Every mutation returns the resulting id order. Dropping a record, by
/// removal or reset, releases its preview.
#[derive(Debug, Default)]
pub struct ImageList {
    records: Vec<ImageRecord>,
}

impl ImageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImageRecord> {
        self.records.iter()
    }

    pub fn get(&self, id: ImageId) -> Option<&ImageRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn ids(&self) -> Vec<ImageId> {
        self.records.iter().map(|r| r.id).collect()
    }

    fn position(&self, id: ImageId) -> Result<usize, ListError> {
        self.records
            .iter()
            .position(|r| r.id == id)
            .ok_or(ListError::UnknownId(id))
    }

    /// append at the end
    pub fn push(&mut self, record: ImageRecord) -> Result<Vec<ImageId>, ListError> {
        let at = self.records.len();
        self.insert(at, record)
    }

    pub fn extend(
        &mut self,
        records: impl IntoIterator<Item = ImageRecord>,
    ) -> Result<Vec<ImageId>, ListError> {
        for record in records {
            self.push(record)?;
        }
        Ok(self.ids())
    }

    pub fn insert(&mut self, index: usize, record: ImageRecord) -> Result<Vec<ImageId>, ListError> {
        if index > self.records.len() {
            return Err(ListError::OutOfBounds {
                index,
                len: self.records.len(),
            });
        }
        if self.get(record.id).is_some() {
            return Err(ListError::DuplicateId(record.id));
        }
        self.records.insert(index, record);
        Ok(self.ids())
    }

    /// remove one image, releasing its preview
    pub fn remove(&mut self, id: ImageId) -> Result<Vec<ImageId>, ListError> {
        let pos = self.position(id)?;
        let removed = self.records.remove(pos);
        log::debug!("removed {} ({})", removed.id, removed.source.path.display());
        Ok(self.ids())
    }

    /// move an image so that it ends up at `index`
    pub fn move_to(&mut self, id: ImageId, index: usize) -> Result<Vec<ImageId>, ListError> {
        let from = self.position(id)?;
        if index >= self.records.len() {
            return Err(ListError::OutOfBounds {
                index,
                len: self.records.len(),
            });
        }
        let record = self.records.remove(from);
        self.records.insert(index, record);
        Ok(self.ids())
    }

    /// Keep only the images at `positions`, in that order.
    ///
    /// Positions are indices into the current order and must be distinct.
    /// Images left out are removed.
    pub fn select_order(&mut self, positions: &[usize]) -> Result<Vec<ImageId>, ListError> {
        let len = self.records.len();
        if let Some(&index) = positions.iter().find(|&&p| p >= len) {
            return Err(ListError::OutOfBounds { index, len });
        }
        let wanted: Vec<ImageId> = positions.iter().map(|&p| self.records[p].id).collect();
        for (i, id) in wanted.iter().enumerate() {
            if wanted[..i].contains(id) {
                return Err(ListError::DuplicateId(*id));
            }
        }

        let dropped: Vec<ImageId> = self
            .ids()
            .into_iter()
            .filter(|id| !wanted.contains(id))
            .collect();
        for id in dropped {
            self.remove(id)?;
        }
        for (index, id) in wanted.into_iter().enumerate() {
            self.move_to(id, index)?;
        }
        Ok(self.ids())
    }

    /// drop every image
    pub fn reset(&mut self) {
        log::debug!("reset: releasing {} image(s)", self.records.len());
        self.records.clear();
    }
}

impl<'a> IntoIterator for &'a ImageList {
    type Item = &'a ImageRecord;
    type IntoIter = std::slice::Iter<'a, ImageRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::PreviewRegistry;
    use std::io::Cursor;

    fn record(width: u32, previews: &PreviewRegistry) -> ImageRecord {
        let img = image::GrayImage::from_pixel(width, 1, image::Luma([0]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        ImageRecord::from_bytes(format!("{}.png", width), out.into_inner(), previews).unwrap()
    }

    fn widths(list: &ImageList) -> Vec<u32> {
        list.iter().map(|r| r.width).collect()
    }

    fn list_of(n: u32, previews: &PreviewRegistry) -> ImageList {
        let mut list = ImageList::new();
        list.extend((1..=n).map(|w| record(w, previews))).unwrap();
        list
    }

    #[test]
    fn push_keeps_insertion_order() {
        let previews = PreviewRegistry::new();
        let list = list_of(3, &previews);
        assert_eq!(widths(&list), vec![1, 2, 3]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn insert_rejects_out_of_bounds() {
        let previews = PreviewRegistry::new();
        let mut list = list_of(1, &previews);
        let err = list.insert(5, record(9, &previews)).unwrap_err();
        assert_eq!(err, ListError::OutOfBounds { index: 5, len: 1 });
        list.insert(0, record(9, &previews)).unwrap();
        assert_eq!(widths(&list), vec![9, 1]);
    }

    #[test]
    fn remove_releases_preview() {
        let previews = PreviewRegistry::new();
        let mut list = list_of(3, &previews);
        let ids = list.ids();
        let uri = list.get(ids[1]).unwrap().preview.as_str().to_string();

        let order = list.remove(ids[1]).unwrap();
        assert_eq!(order, vec![ids[0], ids[2]]);
        assert!(!previews.is_live(&uri));
        assert_eq!(previews.live_count(), 2);
        assert_eq!(list.remove(ids[1]), Err(ListError::UnknownId(ids[1])));
    }

    #[test]
    fn move_to_front_and_back() {
        let previews = PreviewRegistry::new();
        let mut list = list_of(4, &previews);
        let ids = list.ids();

        list.move_to(ids[3], 0).unwrap();
        assert_eq!(widths(&list), vec![4, 1, 2, 3]);
        list.move_to(ids[3], 3).unwrap();
        assert_eq!(widths(&list), vec![1, 2, 3, 4]);
        assert!(list.move_to(ids[0], 4).is_err());
    }

    #[test]
    fn select_order_reorders_and_drops() {
        let previews = PreviewRegistry::new();
        let mut list = list_of(4, &previews);
        list.select_order(&[2, 0, 3]).unwrap();
        assert_eq!(widths(&list), vec![3, 1, 4]);
        assert_eq!(previews.live_count(), 3);
    }

    #[test]
    fn select_order_validates_before_mutating() {
        let previews = PreviewRegistry::new();
        let mut list = list_of(3, &previews);
        assert!(list.select_order(&[0, 0]).is_err());
        assert!(list.select_order(&[1, 3]).is_err());
        assert_eq!(widths(&list), vec![1, 2, 3]);
    }

    #[test]
    fn reset_releases_everything() {
        let previews = PreviewRegistry::new();
        let mut list = list_of(3, &previews);
        list.reset();
        assert!(list.is_empty());
        assert_eq!(previews.live_count(), 0);
    }
}

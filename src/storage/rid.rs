use crate::storage::page::page::PageId;

/// Record identifier: the page a row lives on and its slot within the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rid {
    pub page_id: PageId,
    pub slot_num: u32,
}

impl Rid {
    pub fn new(page_id: PageId, slot_num: u32) -> Self {
        Rid { page_id, slot_num }
    }
}

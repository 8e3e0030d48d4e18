//! A sparse table of per-instruction entries, keyed by physical address.

use umbra::{Address, system::mem::CODE_PAGES};
use util::boxed_array;

const SLOTS_BITS: usize = 10;
const SLOTS_COUNT: usize = 1 << SLOTS_BITS;
const SLOTS_MASK: usize = SLOTS_COUNT - 1;

type Page<T> = Box<[Option<T>; SLOTS_COUNT]>;

#[inline(always)]
fn addr_to_table_idx(addr: Address) -> (usize, usize) {
    let base = (addr.value() >> 2) as usize;
    (base >> SLOTS_BITS, base & SLOTS_MASK)
}

/// Two level table: a primary level of 4 KiB pages and a secondary level with one slot per word.
/// Secondary levels are only allocated when something is inserted into them.
pub struct Table<T> {
    pages: Box<[Option<Page<T>>]>,
}

impl<T: Clone> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Table<T> {
    pub fn new() -> Self {
        Self {
            pages: std::iter::repeat_with(|| None).take(CODE_PAGES).collect(),
        }
    }

    #[inline(always)]
    pub fn get(&self, addr: Address) -> Option<&T> {
        let (page, slot) = addr_to_table_idx(addr);
        self.pages.get(page)?.as_ref()?[slot].as_ref()
    }

    /// Inserts `value` at `addr`, returning the entry it replaced. Addresses outside of the
    /// tracked range are ignored.
    #[inline(always)]
    pub fn insert(&mut self, addr: Address, value: T) -> Option<T> {
        let (page, slot) = addr_to_table_idx(addr);
        let page = self.pages.get_mut(page)?;

        let page = page.get_or_insert_with(|| boxed_array(None));
        page[slot].replace(value)
    }

    /// Removes every entry in the given 4 KiB page.
    #[inline(always)]
    pub fn remove_page(&mut self, page: u32) {
        if let Some(page) = self.pages.get_mut(page as usize) {
            *page = None;
        }
    }

    /// Removes every entry in the given 4 KiB page, returning them.
    pub fn take_page(&mut self, page: u32) -> Vec<T> {
        let Some(Some(mut removed)) = self.pages.get_mut(page as usize).map(Option::take) else {
            return Vec::new();
        };

        removed.iter_mut().filter_map(Option::take).collect()
    }

    pub fn clear(&mut self) {
        self.pages.iter_mut().for_each(|page| *page = None);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut table = Table::<u32>::new();
        assert_eq!(table.insert(Address(0x1000), 1), None);
        table.insert(Address(0x1FFC), 2);
        table.insert(Address(0x2000), 3);
        assert_eq!(table.insert(Address(0x2000), 4), Some(3));

        assert_eq!(table.get(Address(0x1000)), Some(&1));
        assert_eq!(table.get(Address(0x1FFC)), Some(&2));
        assert_eq!(table.get(Address(0x1004)), None);

        table.remove_page(Address(0x1000).page());
        assert_eq!(table.get(Address(0x1000)), None);
        assert_eq!(table.get(Address(0x1FFC)), None);
        assert_eq!(table.get(Address(0x2000)), Some(&4));

        table.clear();
        assert_eq!(table.get(Address(0x2000)), None);
    }

    #[test]
    fn take_page_returns_entries() {
        let mut table = Table::<u32>::new();
        table.insert(Address(0x3000), 7);
        table.insert(Address(0x3FFC), 8);
        table.insert(Address(0x4000), 9);

        assert_eq!(table.take_page(3), [7, 8]);
        assert_eq!(table.get(Address(0x3000)), None);
        assert_eq!(table.get(Address(0x4000)), Some(&9));
        assert!(table.take_page(3).is_empty());
        assert!(table.take_page(u32::MAX).is_empty());
    }

    #[test]
    fn out_of_range_is_ignored() {
        let mut table = Table::<u32>::new();
        table.insert(Address(0xFFFF_FFFC), 1);
        assert_eq!(table.get(Address(0xFFFF_FFFC)), None);
    }
}

use std::collections::HashMap;

use crate::db::{exists_with, RecordStore};
use crate::Error;

/// Lines of one chunk that still need processing.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Admission {
    /// Distinct lines not in the store, with how many times each occurs in
    /// the chunk. Every copy shares the outcome of the first.
    pub fresh: Vec<(String, usize)>,
    /// Lines already stored.
    pub duplicates: usize,
}

/// Decides whether a trimmed raw line has already been ingested.
pub struct DedupGate<'s> {
    store: &'s RecordStore,
}

impl<'s> DedupGate<'s> {
    pub fn new(store: &'s RecordStore) -> Self {
        DedupGate { store }
    }

    pub fn seen(&self, raw_text: &str) -> Result<bool, Error> {
        self.store.exists(raw_text)
    }

    pub fn admit(&self, lines: Vec<String>) -> Result<Admission, Error> {
        let conn = self.store.connection()?;
        let mut index: HashMap<String, usize> = HashMap::with_capacity(lines.len());
        let mut admission = Admission::default();

        for line in lines {
            if let Some(&i) = index.get(&line) {
                admission.fresh[i].1 += 1;
                continue;
            }
            if exists_with(&conn, &line)? {
                admission.duplicates += 1;
                continue;
            }
            index.insert(line.clone(), admission.fresh.len());
            admission.fresh.push((line, 1));
        }
        Ok(admission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::record;

    #[test]
    fn admits_unseen_lines_with_their_copies() {
        let store = RecordStore::open_in_memory().unwrap();
        store
            .insert(&record("old", "1.1.1.1", "2021-01-01T00:00:00Z", 1))
            .unwrap();
        let gate = DedupGate::new(&store);
        assert!(gate.seen("old").unwrap());
        assert!(!gate.seen("new").unwrap());

        let lines = ["old", "new", "new", "new  two", "old", "new two"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let admission = gate.admit(lines).unwrap();
        assert_eq!(
            admission.fresh,
            vec![
                ("new".to_owned(), 2),
                ("new  two".to_owned(), 1),
                ("new two".to_owned(), 1),
            ]
        );
        assert_eq!(admission.duplicates, 2);
    }
}

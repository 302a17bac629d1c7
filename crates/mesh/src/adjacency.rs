use std::collections::BTreeMap;

/// Which compartments share geometry, computed once from the mesh.
///
/// Two compartments of equal dimension are adjacent when they share a
/// facet; compartments whose dimensions differ by one are adjacent when a
/// cell of the lower one is a facet of the higher one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Adjacency {
    shared: BTreeMap<(String, String), usize>,
}

impl Adjacency {
    fn key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_owned(), b.to_owned())
        } else {
            (b.to_owned(), a.to_owned())
        }
    }

    pub(crate) fn record(&mut self, a: &str, b: &str, shared: usize) {
        if shared > 0 {
            self.shared.insert(Self::key(a, b), shared);
        }
    }

    /// Number of shared entities between two compartments.
    #[must_use]
    pub fn shared(&self, a: &str, b: &str) -> usize {
        self.shared.get(&Self::key(a, b)).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn are_adjacent(&self, a: &str, b: &str) -> bool {
        self.shared(a, b) > 0
    }

    /// All adjacent pairs with their shared entity counts.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str, usize)> {
        self.shared
            .iter()
            .map(|((a, b), &n)| (a.as_str(), b.as_str(), n))
    }

    /// Compartments adjacent to `name`.
    pub fn neighbors<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.shared.keys().filter_map(move |(a, b)| {
            if a == name {
                Some(b.as_str())
            } else if b == name {
                Some(a.as_str())
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric_lookup() {
        let mut adjacency = Adjacency::default();
        adjacency.record("pm", "cyto", 12);
        adjacency.record("cyto", "er", 0);

        assert!(adjacency.are_adjacent("cyto", "pm"));
        assert_eq!(adjacency.shared("pm", "cyto"), 12);
        assert!(!adjacency.are_adjacent("cyto", "er"));
        assert_eq!(adjacency.neighbors("cyto").collect::<Vec<_>>(), vec!["pm"]);
    }
}

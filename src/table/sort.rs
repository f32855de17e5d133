use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    #[inline]
    pub fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// A column a table can be ordered by.
pub trait SortKey: Copy + Eq + std::fmt::Debug {
    /// Direction a freshly selected key starts in.
    fn default_direction(self) -> SortDirection;
}

/// Records that know how to compare themselves on a key.
pub trait Sortable<K: SortKey> {
    fn compare_by(&self, other: &Self, key: K) -> Ordering;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SortState<K> {
    pub key: K,
    pub direction: SortDirection,
}

impl<K: SortKey> SortState<K> {
    pub fn new(key: K) -> Self {
        Self {
            key,
            direction: key.default_direction(),
        }
    }

    /// Re-selecting the current key flips direction; a new key starts over
    /// at its default direction.
    pub fn toggle(&mut self, key: K) {
        if key == self.key {
            self.direction = self.direction.flipped();
        } else {
            *self = Self::new(key);
        }
    }

    /// Stable: records comparing equal keep their relative order in either
    /// direction.
    pub fn apply<R: Sortable<K>>(&self, records: &mut [R]) {
        let key = self.key;
        match self.direction {
            SortDirection::Asc => records.sort_by(|a, b| a.compare_by(b, key)),
            SortDirection::Desc => records.sort_by(|a, b| b.compare_by(a, key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Col {
        Name,
        Score,
    }

    impl SortKey for Col {
        fn default_direction(self) -> SortDirection {
            match self {
                Col::Name => SortDirection::Asc,
                Col::Score => SortDirection::Desc,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Row(&'static str, f64, usize);

    impl Sortable<Col> for Row {
        fn compare_by(&self, other: &Self, key: Col) -> Ordering {
            match key {
                Col::Name => self.0.cmp(other.0),
                Col::Score => self.1.total_cmp(&other.1),
            }
        }
    }

    #[test]
    fn test_toggle_same_key_flips() {
        let mut state = SortState::new(Col::Score);
        assert_eq!(state.direction, SortDirection::Desc);
        state.toggle(Col::Score);
        assert_eq!(state.direction, SortDirection::Asc);
        state.toggle(Col::Score);
        assert_eq!(state.direction, SortDirection::Desc);
    }

    #[test]
    fn test_toggle_new_key_resets() {
        let mut state = SortState::new(Col::Score);
        state.toggle(Col::Score); // asc
        state.toggle(Col::Name);
        assert_eq!(state, SortState { key: Col::Name, direction: SortDirection::Asc });
        state.toggle(Col::Score);
        assert_eq!(state.direction, SortDirection::Desc);
    }

    #[test]
    fn test_sort_is_stable_both_directions() {
        let rows = vec![
            Row("b", 1.0, 0),
            Row("a", 2.0, 1),
            Row("c", 1.0, 2),
            Row("d", 2.0, 3),
        ];

        let mut desc = rows.clone();
        SortState::new(Col::Score).apply(&mut desc);
        let order: Vec<usize> = desc.iter().map(|r| r.2).collect();
        assert_eq!(order, vec![1, 3, 0, 2]);

        let mut asc = rows.clone();
        SortState { key: Col::Score, direction: SortDirection::Asc }.apply(&mut asc);
        let order: Vec<usize> = asc.iter().map(|r| r.2).collect();
        assert_eq!(order, vec![0, 2, 1, 3]);

        // re-sorting an already sorted sequence changes nothing
        let mut again = asc.clone();
        SortState { key: Col::Score, direction: SortDirection::Asc }.apply(&mut again);
        assert_eq!(again, asc);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(SortDirection::parse("DESC"), Some(SortDirection::Desc));
        assert_eq!(SortDirection::parse("up"), None);
    }
}

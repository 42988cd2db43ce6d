//! Ad-hoc plan search over every stored item, with numeric summaries of the
//! matched items' occurrences.

use crate::item::{ItemId, Occurrence};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    pub count: usize,
    /// Keyed by lowercased occurrence label
    pub numeric: BTreeMap<String, NumericSummary>,
}

impl SearchStats {
    /// Summarize the numbers of all occurrences belonging to matched items
    pub fn collect<'a, I>(matched: usize, occurrences: I) -> Self
    where
        I: IntoIterator<Item = &'a Occurrence>,
    {
        let mut sums: BTreeMap<String, (f64, f64, f64, usize)> = BTreeMap::new();
        for occurrence in occurrences {
            let Some(n) = occurrence.number else {
                continue;
            };
            let entry = sums
                .entry(occurrence.name.to_lowercase())
                .or_insert((f64::INFINITY, f64::NEG_INFINITY, 0.0, 0));
            entry.0 = entry.0.min(n);
            entry.1 = entry.1.max(n);
            entry.2 += n;
            entry.3 += 1;
        }

        let numeric = sums
            .into_iter()
            .map(|(label, (min, max, sum, count))| {
                (
                    label,
                    NumericSummary {
                        min,
                        max,
                        avg: sum / count as f64,
                        count,
                    },
                )
            })
            .collect();

        Self {
            count: matched,
            numeric,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    /// Matching item ids in storage order
    pub items: Vec<ItemId>,
    pub stats: SearchStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_per_label() {
        let occ = vec![
            Occurrence::new("a", "Сечение", "2.5").with_number(2.5, Some("мм2")),
            Occurrence::new("b", "сечение", "4").with_number(4.0, Some("мм2")),
            Occurrence::new("b", "сечение", "1.5").with_number(1.5, None),
            Occurrence::new("b", "цвет", "синий"),
        ];
        let stats = SearchStats::collect(2, &occ);

        assert_eq!(stats.count, 2);
        assert_eq!(stats.numeric.len(), 1);
        let s = stats.numeric["сечение"];
        assert_eq!((s.min, s.max, s.count), (1.5, 4.0, 3));
        assert!((s.avg - 8.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_stats() {
        let stats = SearchStats::collect(0, &[]);
        assert_eq!(stats, SearchStats::default());
    }
}

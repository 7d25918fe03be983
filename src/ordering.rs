//! `RuleOrdering`: a user-declared total-order fragment over rule names.
//!
//! Not a total order — most rule pairs are simply unordered (`compare`
//! returns `0`). The DAG builder combines this with numeric `priority`,
//! match specificity, and a final lexicographic tie-breaker; none of
//! that arbitration lives here.

/// An ordered list of priority clauses `r1 > r2 > ... > rk`. Later
/// clauses override earlier ones when both mention the same pair.
#[derive(Debug, Clone, Default)]
pub struct RuleOrdering {
    clauses: Vec<Vec<String>>,
}

impl RuleOrdering {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_clause(&mut self, names: Vec<String>) {
        self.clauses.push(names);
    }

    /// `-1` if `a` precedes `b` in the deciding clause (i.e. `a` is
    /// higher priority), `+1` if `b` precedes `a`, `0` if no clause
    /// mentions both. Scans clauses in reverse insertion order so a
    /// later clause always wins over an earlier, conflicting one.
    pub fn compare(&self, a: &str, b: &str) -> i32 {
        for clause in self.clauses.iter().rev() {
            let pos_a = clause.iter().position(|n| n == a);
            let pos_b = clause.iter().position(|n| n == b);
            if let (Some(i), Some(j)) = (pos_a, pos_b) {
                return match i.cmp(&j) {
                    std::cmp::Ordering::Less => -1,
                    std::cmp::Ordering::Greater => 1,
                    std::cmp::Ordering::Equal => 0,
                };
            }
        }
        0
    }
}

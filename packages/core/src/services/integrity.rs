//! Interval integrity checks
//!
//! Recomputes everything the stored rows claim (nesting, distinct bounds,
//! levels, totals) from the intervals alone and reports each disagreement.
//! Used after recovery operations and by the operator CLI.

use crate::models::CategoryId;
use crate::services::CategoryTree;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IntegrityViolation {
    /// `lft >= rgt`, or a non-positive bound
    InvalidInterval { id: CategoryId, lft: i64, rgt: i64 },
    /// The same bound value is used more than once
    DuplicateBound { bound: i64, ids: Vec<CategoryId> },
    /// Two intervals overlap without one containing the other
    PartialOverlap { first: CategoryId, second: CategoryId },
    WrongLevel {
        id: CategoryId,
        stored: i64,
        expected: i64,
    },
    WrongTotal {
        id: CategoryId,
        stored: i64,
        expected: i64,
    },
}

impl std::fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInterval { id, lft, rgt } => {
                write!(f, "{} has invalid interval ({}, {})", id, lft, rgt)
            }
            Self::DuplicateBound { bound, ids } => {
                let ids: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
                write!(f, "bound {} is shared by {}", bound, ids.join(", "))
            }
            Self::PartialOverlap { first, second } => {
                write!(f, "{} and {} partially overlap", first, second)
            }
            Self::WrongLevel {
                id,
                stored,
                expected,
            } => write!(f, "{} has level {} but is nested {} deep", id, stored, expected),
            Self::WrongTotal {
                id,
                stored,
                expected,
            } => write!(f, "{} has total {} but its subtree holds {}", id, stored, expected),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub categories: usize,
    pub violations: Vec<IntegrityViolation>,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

impl CategoryTree {
    /// Check every structural and counter invariant of the snapshot
    pub fn check_integrity(&self) -> IntegrityReport {
        let rows = self.categories();
        let mut violations = Vec::new();

        for c in rows {
            if c.lft <= 0 || c.lft >= c.rgt {
                violations.push(IntegrityViolation::InvalidInterval {
                    id: c.id.clone(),
                    lft: c.lft,
                    rgt: c.rgt,
                });
            }
        }

        let mut owners: HashMap<i64, Vec<CategoryId>> = HashMap::new();
        for c in rows {
            owners.entry(c.lft).or_default().push(c.id.clone());
            owners.entry(c.rgt).or_default().push(c.id.clone());
        }
        let mut duplicates: Vec<(i64, Vec<CategoryId>)> =
            owners.into_iter().filter(|(_, ids)| ids.len() > 1).collect();
        duplicates.sort_by_key(|(bound, _)| *bound);
        violations.extend(
            duplicates
                .into_iter()
                .map(|(bound, ids)| IntegrityViolation::DuplicateBound { bound, ids }),
        );

        // Rows are sorted by lft: only later rows opening before `outer` closes
        // can overlap it.
        let mut depth = vec![0i64; rows.len()];
        for (i, outer) in rows.iter().enumerate() {
            for (j, inner) in rows.iter().enumerate().skip(i + 1) {
                if inner.lft >= outer.rgt {
                    break;
                }
                if inner.rgt < outer.rgt {
                    depth[j] += 1;
                } else {
                    violations.push(IntegrityViolation::PartialOverlap {
                        first: outer.id.clone(),
                        second: inner.id.clone(),
                    });
                }
            }
        }

        for (c, expected) in rows.iter().zip(&depth) {
            if c.level != *expected {
                violations.push(IntegrityViolation::WrongLevel {
                    id: c.id.clone(),
                    stored: c.level,
                    expected: *expected,
                });
            }
        }

        let mut child_totals = vec![0i64; rows.len()];
        for (c, parent) in rows.iter().zip(self.parent_indices()) {
            if let Some(p) = parent {
                child_totals[*p] += c.total_count;
            }
        }
        for (c, children) in rows.iter().zip(&child_totals) {
            let expected = c.direct_count + children;
            if c.total_count != expected {
                violations.push(IntegrityViolation::WrongTotal {
                    id: c.id.clone(),
                    stored: c.total_count,
                    expected,
                });
            }
        }

        IntegrityReport {
            categories: rows.len(),
            violations,
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pro-rata split of settlement proceeds.
//!
//! Each contribution receives `floor(total * contribution / sum)`. The
//! truncation remainder goes entirely to the contribution with the lowest
//! ticket id, independent of input order, so the shares always sum to
//! `total` exactly.

use crate::ledger::{Amount, TicketId};

/// Split `total` across `contributions` (ticket id, decrypted input).
///
/// Shares are returned in input order. An empty or all-zero contribution
/// list yields all-zero shares.
pub fn allocate_pro_rata(total: Amount, contributions: &[(TicketId, Amount)]) -> Vec<(TicketId, Amount)> {
    let sum: u128 = contributions.iter().map(|(_, c)| *c as u128).sum();
    if sum == 0 {
        return contributions.iter().map(|(id, _)| (*id, 0)).collect();
    }

    let mut shares: Vec<(TicketId, Amount)> = contributions
        .iter()
        .map(|(id, c)| (*id, (total as u128 * *c as u128 / sum) as Amount))
        .collect();

    let allocated: Amount = shares.iter().map(|(_, s)| *s).sum();
    let remainder = total - allocated;
    if let Some(lowest) = shares.iter_mut().min_by_key(|(id, _)| *id) {
        lowest.1 += remainder;
    }
    shares
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(shares: &[(TicketId, Amount)]) -> Amount {
        shares.iter().map(|(_, s)| *s).sum()
    }

    #[test]
    fn exact_split() {
        assert_eq!(allocate_pro_rata(95, &[(1, 60), (2, 40)]), vec![(1, 57), (2, 38)]);
    }

    #[test]
    fn remainder_goes_to_lowest_ticket_id() {
        assert_eq!(
            allocate_pro_rata(10, &[(1, 1), (2, 1), (3, 1)]),
            vec![(1, 4), (2, 3), (3, 3)]
        );
    }

    #[test]
    fn remainder_rule_ignores_input_order() {
        let shares = allocate_pro_rata(10, &[(9, 1), (2, 1), (5, 1)]);
        assert_eq!(shares, vec![(9, 3), (2, 4), (5, 3)]);
    }

    #[test]
    fn shares_always_sum_to_total() {
        let contributions = [(4, 7), (1, 13), (8, 1), (3, 999)];
        for t in [0, 1, 2, 17, 1_000, 1_019, u32::MAX as u64] {
            assert_eq!(total(&allocate_pro_rata(t, &contributions)), t);
        }
    }

    #[test]
    fn tiny_contributions_may_round_to_zero() {
        let shares = allocate_pro_rata(5, &[(1, 1_000), (2, 1)]);
        assert_eq!(shares, vec![(1, 5), (2, 0)]);
    }

    #[test]
    fn large_values_do_not_overflow() {
        let shares = allocate_pro_rata(u64::MAX, &[(1, u64::MAX), (2, u64::MAX)]);
        assert_eq!(total(&shares), u64::MAX);
        assert_eq!(shares[1].1, u64::MAX / 2);
    }

    #[test]
    fn degenerate_inputs() {
        assert!(allocate_pro_rata(10, &[]).is_empty());
        assert_eq!(allocate_pro_rata(10, &[(1, 0)]), vec![(1, 0)]);
    }
}

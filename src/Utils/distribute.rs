//! Enumeration of the ways identical items can be spread over slots.

/// All vectors of `slots` non-negative integers summing to `total`, first slot varying slowest.
pub fn distribute(total: usize, slots: usize) -> Vec<Vec<usize>> {
    match slots {
        0 => {
            if total == 0 {
                vec![Vec::new()]
            } else {
                Vec::new()
            }
        }
        1 => vec![vec![total]],
        _ => {
            let mut out = Vec::new();
            for first in 0..=total {
                for mut rest in distribute(total - first, slots - 1) {
                    rest.insert(0, first);
                    out.push(rest);
                }
            }
            out
        }
    }
}

/// Cartesian product of `distribute(total, slots)` over the given pairs; every result is the
/// concatenation of one distribution per pair.
pub fn multi_distribute(pairs: &[(usize, usize)]) -> Vec<Vec<usize>> {
    let mut acc: Vec<Vec<usize>> = vec![Vec::new()];
    for &(total, slots) in pairs {
        let options = distribute(total, slots);
        let mut next = Vec::with_capacity(acc.len() * options.len());
        for prefix in &acc {
            for option in &options {
                let mut v = prefix.clone();
                v.extend_from_slice(option);
                next.push(v);
            }
        }
        acc = next;
    }
    acc
}

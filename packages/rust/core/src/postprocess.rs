//! Clean-up applied to accepted section payloads.

use rand::Rng;
use rand::seq::SliceRandom;

/// Reshuffles before giving up on random draws and rotating instead.
const MAX_RESHUFFLES: usize = 16;

/// Trim entries and drop blank ones.
pub fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Shuffle a fill-in-the-gap answer key so it is never left in gap order.
///
/// With two or more entries the result is a uniformly random permutation
/// other than the identity: draws that land on the identity are rejected.
/// Keys with fewer than two entries are left alone.
pub fn shuffle_answer_key<R: Rng + ?Sized>(answers: &mut [String], rng: &mut R) {
    if answers.len() < 2 {
        return;
    }

    let mut order: Vec<usize> = (0..answers.len()).collect();
    for _ in 0..MAX_RESHUFFLES {
        order.shuffle(rng);
        if !is_identity(&order) {
            apply(answers, &order);
            return;
        }
    }
    // Practically unreachable (probability at most 2^-16).
    answers.rotate_left(1);
}

fn is_identity(order: &[usize]) -> bool {
    order.iter().enumerate().all(|(i, &j)| i == j)
}

fn apply(answers: &mut [String], order: &[usize]) {
    let original = answers.to_vec();
    for (slot, &from) in answers.iter_mut().zip(order) {
        *slot = original[from].clone();
    }
}

use rand::seq::SliceRandom;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Keys and values the benchmarks can generate deterministically.
pub trait TestData: Clone + Debug + Ord + Eq + Hash {
    fn generate(size: usize) -> Vec<Self>;
}

// `size` distinct values drawn from `next`, seeded so every run agrees.
fn distinct<A: Ord>(size: usize, mut next: impl FnMut(&mut SmallRng) -> A) -> Vec<A> {
    let mut rng = SmallRng::seed_from_u64(1);
    let mut set = BTreeSet::new();
    while set.len() < size {
        set.insert(next(&mut rng));
    }
    set.into_iter().collect()
}

impl TestData for i64 {
    fn generate(size: usize) -> Vec<Self> {
        distinct(size, |rng| rng.random::<i64>())
    }
}

impl TestData for String {
    fn generate(size: usize) -> Vec<Self> {
        distinct(size, |rng| {
            let len = rng.random_range(5..20);
            (0..len)
                .map(|_| rng.random_range(b'a'..=b'z') as char)
                .collect()
        })
    }
}

impl<T> TestData for Arc<T>
where
    T: TestData + 'static,
{
    fn generate(size: usize) -> Vec<Self> {
        T::generate(size).into_iter().map(Arc::new).collect()
    }
}

/// A seeded shuffle of `items`.
pub fn reorder<A: Clone>(items: &[A]) -> Vec<A> {
    let mut rng = SmallRng::seed_from_u64(1);
    let mut out = items.to_vec();
    out.shuffle(&mut rng);
    out
}

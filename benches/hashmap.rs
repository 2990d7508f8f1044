use criterion::{criterion_group, criterion_main, Bencher, BenchmarkId, Criterion};
use compact_hamt::hashmap::HashMap;
use compact_hamt::TransientHashMap;
use std::borrow::Borrow;
use std::collections::HashMap as StdHashMap;
use std::hash::Hash;
use std::hint::black_box;
use std::iter::FromIterator;
use std::sync::Arc;

use archery::ArcTK;
use rpds::HashTrieMapSync;

mod utils;
use utils::*;

// The operations every compared map supports, persistent or not.
trait BenchMap<K, V>: Clone + FromIterator<(K, V)>
where
    K: Clone + Hash + Eq,
    V: Clone,
{
    const PERSISTENT: bool = true;

    fn new() -> Self;
    fn put(&mut self, k: K, v: V);
    fn put_clone(&self, k: K, v: V) -> Self;
    fn delete(&mut self, k: &K);
    fn delete_clone(&self, k: &K) -> Self;
    fn lookup<Q>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized;
    fn walk(&self) -> usize;
}

impl<K, V> BenchMap<K, V> for HashMap<K, V>
where
    K: Clone + Hash + Eq,
    V: Clone + Hash + PartialEq,
{
    fn new() -> Self {
        HashMap::new()
    }

    fn put(&mut self, k: K, v: V) {
        *self = self.update(k, v);
    }

    fn put_clone(&self, k: K, v: V) -> Self {
        self.update(k, v)
    }

    fn delete(&mut self, k: &K) {
        *self = self.without(k);
    }

    fn delete_clone(&self, k: &K) -> Self {
        self.without(k)
    }

    fn lookup<Q>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(k)
    }

    fn walk(&self) -> usize {
        self.iter().map(|p| black_box(p)).count()
    }
}

impl<K, V> BenchMap<K, V> for StdHashMap<K, V>
where
    K: Clone + Hash + Eq,
    V: Clone,
{
    const PERSISTENT: bool = false;

    fn new() -> Self {
        StdHashMap::new()
    }

    fn put(&mut self, k: K, v: V) {
        self.insert(k, v);
    }

    fn put_clone(&self, k: K, v: V) -> Self {
        let mut ret = self.clone();
        ret.insert(k, v);
        ret
    }

    fn delete(&mut self, k: &K) {
        self.remove(k);
    }

    fn delete_clone(&self, k: &K) -> Self {
        let mut ret = self.clone();
        ret.remove(k);
        ret
    }

    fn lookup<Q>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(k)
    }

    fn walk(&self) -> usize {
        self.iter().map(|p| black_box(p)).count()
    }
}

impl<K, V> BenchMap<K, V> for HashTrieMapSync<K, V>
where
    K: Clone + Hash + Eq,
    V: Clone,
{
    fn new() -> Self {
        HashTrieMapSync::new_sync()
    }

    fn put(&mut self, k: K, v: V) {
        self.insert_mut(k, v);
    }

    fn put_clone(&self, k: K, v: V) -> Self {
        self.insert(k, v)
    }

    fn delete(&mut self, k: &K) {
        self.remove_mut(k);
    }

    fn delete_clone(&self, k: &K) -> Self {
        self.remove(k)
    }

    fn lookup<Q>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(k)
    }

    fn walk(&self) -> usize {
        let iter: rpds::map::hash_trie_map::Iter<'_, K, V, ArcTK> = self.iter();
        iter.map(|p| black_box(p)).count()
    }
}

fn bench_lookup<M, K, V>(b: &mut Bencher<'_>, size: usize)
where
    M: BenchMap<K, V>,
    K: TestData,
    V: TestData,
{
    let keys = K::generate(size);
    let values = V::generate(size);
    let order = reorder(&keys);
    let m: M = keys.into_iter().zip(values).collect();
    b.iter(|| {
        for k in &order {
            black_box(m.lookup(k));
        }
    })
}

fn bench_insert<M, K, V>(b: &mut Bencher<'_>, size: usize)
where
    M: BenchMap<K, V>,
    K: TestData,
    V: TestData,
{
    let keys = K::generate(size);
    let values = V::generate(size);
    b.iter(|| {
        let mut m = M::new();
        for (k, v) in keys.clone().into_iter().zip(values.clone()) {
            m = m.put_clone(k, v);
        }
        m
    })
}

fn bench_insert_mut<M, K, V>(b: &mut Bencher<'_>, size: usize)
where
    M: BenchMap<K, V>,
    K: TestData,
    V: TestData,
{
    let keys = K::generate(size);
    let values = V::generate(size);
    b.iter(|| {
        let mut m = M::new();
        for (k, v) in keys.clone().into_iter().zip(values.clone()) {
            m.put(k, v);
        }
        m
    })
}

fn bench_remove<M, K, V>(b: &mut Bencher<'_>, size: usize)
where
    M: BenchMap<K, V>,
    K: TestData,
    V: TestData,
{
    let keys = K::generate(size);
    let values = V::generate(size);
    let order = reorder(&keys);
    let map: M = keys.into_iter().zip(values).collect();
    b.iter(|| {
        let mut m = map.clone();
        for k in &order {
            m = m.delete_clone(k);
        }
        m
    })
}

fn bench_remove_mut<M, K, V>(b: &mut Bencher<'_>, size: usize)
where
    M: BenchMap<K, V>,
    K: TestData,
    V: TestData,
{
    let keys = K::generate(size);
    let values = V::generate(size);
    let order = reorder(&keys);
    let map: M = keys.into_iter().zip(values).collect();
    b.iter(|| {
        let mut m = map.clone();
        for k in &order {
            m.delete(k);
        }
        m
    })
}

fn bench_iter<M, K, V>(b: &mut Bencher<'_>, size: usize)
where
    M: BenchMap<K, V>,
    K: TestData,
    V: TestData,
{
    let keys = K::generate(size);
    let values = V::generate(size);
    let m: M = keys.into_iter().zip(values).collect();
    b.iter(|| m.walk())
}

fn bench_group<M, K, V>(c: &mut Criterion, group_name: &str)
where
    M: BenchMap<K, V>,
    K: TestData,
    V: TestData,
{
    let mut group = c.benchmark_group(group_name);

    for size in &[100, 1000, 10000, 100000] {
        group.bench_with_input(BenchmarkId::new("lookup", size), size, |b, size| {
            bench_lookup::<M, K, V>(b, *size)
        });
        group.bench_with_input(BenchmarkId::new("insert_mut", size), size, |b, size| {
            bench_insert_mut::<M, K, V>(b, *size)
        });
    }

    for size in &[100, 1000, 10000] {
        group.bench_with_input(BenchmarkId::new("remove_mut", size), size, |b, size| {
            bench_remove_mut::<M, K, V>(b, *size)
        });
        group.bench_with_input(BenchmarkId::new("iter", size), size, |b, size| {
            bench_iter::<M, K, V>(b, *size)
        });
    }

    if M::PERSISTENT {
        for size in &[100, 1000, 10000] {
            group.bench_with_input(BenchmarkId::new("insert", size), size, |b, size| {
                bench_insert::<M, K, V>(b, *size)
            });
            group.bench_with_input(BenchmarkId::new("remove", size), size, |b, size| {
                bench_remove::<M, K, V>(b, *size)
            });
        }
    }

    group.finish();
}

// Persistent writes, one transient, and `update_all` loading the same entries.
fn bench_bulk<K, V>(c: &mut Criterion, group_name: &str)
where
    K: TestData,
    V: TestData,
{
    let mut group = c.benchmark_group(group_name);
    for size in &[1000, 10000, 100000] {
        let keys = K::generate(*size);
        let values = V::generate(*size);
        let entries: Vec<(K, V)> = keys.into_iter().zip(values).collect();

        group.bench_with_input(BenchmarkId::new("persistent", size), &entries, |b, entries| {
            b.iter(|| {
                let mut m = HashMap::new();
                for (k, v) in entries.iter().cloned() {
                    m = m.update(k, v);
                }
                m
            })
        });

        group.bench_with_input(BenchmarkId::new("transient", size), &entries, |b, entries| {
            b.iter(|| {
                let mut t = TransientHashMap::new();
                for (k, v) in entries.iter().cloned() {
                    black_box(t.insert(k, v).ok());
                }
                t.into_persistent()
            })
        });

        group.bench_with_input(BenchmarkId::new("update_all", size), &entries, |b, entries| {
            b.iter(|| HashMap::new().update_all(entries.iter().cloned()))
        });

        let map: HashMap<K, V> = entries.iter().cloned().collect();
        let order = reorder(&entries);
        group.bench_with_input(BenchmarkId::new("transient_remove", size), &order, |b, order| {
            b.iter(|| {
                let mut t = map.transient();
                for (k, _) in order {
                    black_box(t.remove(k).ok());
                }
                t.into_persistent()
            })
        });
    }
    group.finish();
}

fn hashmap_benches(c: &mut Criterion) {
    bench_group::<HashMap<i64, i64>, i64, i64>(c, "hashmap_i64");
    bench_group::<HashMap<Arc<String>, Arc<String>>, Arc<String>, Arc<String>>(c, "hashmap_str");
    bench_bulk::<i64, i64>(c, "bulk_i64");
    bench_bulk::<Arc<String>, Arc<String>>(c, "bulk_str");

    if std::env::var("BENCH_STD").is_ok() {
        bench_group::<StdHashMap<i64, i64>, i64, i64>(c, "stdhashmap_i64");
    }

    if std::env::var("BENCH_RPDS").is_ok() {
        bench_group::<HashTrieMapSync<i64, i64>, i64, i64>(c, "rpds_i64");
    }
}

criterion_group!(benches, hashmap_benches);
criterion_main!(benches);

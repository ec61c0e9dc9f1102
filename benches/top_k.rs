#[macro_use]
extern crate bencher;

use bencher::Bencher;
use hashbrown::HashMap;
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use cowatch::io::ItemId;
use cowatch::rank::top_n;
use cowatch::userknn::neighbor_index::Neighbor;
use cowatch::userknn::vote_aggregator::suggestions;

benchmark_group!(benches, top_n_of_large_score_map, vote_aggregation);
benchmark_main!(benches);

const QTY_CANDIDATES: u32 = 100_000;

fn top_n_of_large_score_map(bench: &mut Bencher) {
    let mut rng = Pcg64::seed_from_u64(1);
    let scores: Vec<(ItemId, f64)> = (0..QTY_CANDIDATES)
        .map(|item| (item, rng.gen::<f64>()))
        .collect();

    bench.iter(|| top_n(scores.iter().copied(), 10))
}

fn vote_aggregation(bench: &mut Bencher) {
    let mut rng = Pcg64::seed_from_u64(2);
    let mut neighbors: HashMap<u32, Vec<Neighbor>> = HashMap::new();
    for user in 0..1_000 {
        let user_neighbors = (0..8)
            .map(|_| Neighbor::new(rng.gen_range(0..5_000), rng.gen_range(1..20) as f64))
            .collect();
        neighbors.insert(user, user_neighbors);
    }
    let memberships: Vec<(u32, ItemId)> = (0..50_000)
        .map(|_| (rng.gen_range(0..5_000), rng.gen_range(0..2_000)))
        .collect();

    bench.iter(|| suggestions(memberships.iter().copied(), &neighbors))
}

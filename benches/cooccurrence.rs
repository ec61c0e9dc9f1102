#[macro_use]
extern crate bencher;

use bencher::Bencher;
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use cowatch::io::Membership;
use cowatch::userknn::cooccurrence::build_graph;
use cowatch::userknn::neighbor_index::{NeighborIndex, WeightNormalization};

benchmark_group!(benches, build_cooccurrence_graph, select_neighbors);
benchmark_main!(benches);

fn random_memberships(qty: usize, qty_users: u32, qty_items: u32) -> Vec<Membership> {
    let mut rng = Pcg64::seed_from_u64(17);
    (0..qty)
        .map(|_| (rng.gen_range(0..qty_users), rng.gen_range(0..qty_items)))
        .collect()
}

fn build_cooccurrence_graph(bench: &mut Bencher) {
    let memberships = random_memberships(20_000, 2_000, 1_000);
    bench.iter(|| build_graph(memberships.iter().copied()))
}

fn select_neighbors(bench: &mut Bencher) {
    let memberships = random_memberships(20_000, 2_000, 1_000);
    let graph = build_graph(memberships);
    let query_users: Vec<u32> = (0..500).collect();

    bench.iter(|| {
        NeighborIndex::from_graph(
            &graph,
            query_users.iter().copied(),
            8,
            WeightNormalization::Cosine,
        )
    })
}

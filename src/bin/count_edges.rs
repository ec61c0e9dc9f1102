use anyhow::Result;
use tracing::info;

use cowatch::bootstrap;
use cowatch::io::{output_writer, read_memberships, write_edges};
use cowatch::stats::MembershipStats;
use cowatch::userknn::cooccurrence::build_graph;

fn main() -> Result<()> {
    let config = bootstrap::init()?;

    let memberships = read_memberships(&config.data.membership_path)?;
    MembershipStats::from_memberships(&config.data.membership_path, &memberships).log();

    let mut graph = build_graph(memberships);
    graph.retain_min_weight(config.model.min_edge_weight);

    let writer = output_writer(config.data.edges_path.as_deref())?;
    write_edges(writer, graph.sorted_edges())?;
    info!(
        "wrote {} edges with weight >= {}",
        graph.num_edges(),
        config.model.min_edge_weight
    );
    Ok(())
}

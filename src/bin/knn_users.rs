use std::path::Path;

use anyhow::Result;

use cowatch::bootstrap;
use cowatch::idmap::IdMaps;
use cowatch::io::{input_reader, output_writer, read_edges, read_memberships, read_query_input, write_suggestions};
use cowatch::pipeline::{build_neighbor_index, neighbor_suggestions, ListOptions, ModelData};

fn main() -> Result<()> {
    let config = bootstrap::init()?;

    let data = ModelData::new(read_memberships(&config.data.membership_path)?);
    let id_maps = IdMaps::load(
        config.data.user_map_path.as_deref(),
        config.data.item_map_path.as_deref(),
    )?;
    let query = read_query_input(input_reader(config.data.query_path.as_deref())?)?;
    let query_users = query.users.clone();
    let query = id_maps.to_dense_query(query);

    // Reuse the edge file of an earlier count_edges run when there is one
    let edges = match config.data.edges_path.as_deref() {
        Some(path) if Path::new(path).is_file() => Some(read_edges(path)?),
        _ => None,
    };
    let index = build_neighbor_index(&data, edges, &query.users, &config.model);

    let progress = bootstrap::progress_bar(query.users.len());
    let results = neighbor_suggestions(
        &data,
        &index,
        &query.users,
        &ListOptions::from(&config.model),
        &progress,
    );
    results.latency.log("knn_users");

    let suggestions = id_maps.to_original_suggestions(&query_users, results.suggestions);
    let mut writer = output_writer(config.data.output_path.as_deref())?;
    write_suggestions(&mut writer, &suggestions, true)?;
    Ok(())
}

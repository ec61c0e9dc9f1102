use std::path::Path;

use anyhow::Result;

use cowatch::bootstrap;
use cowatch::idmap::IdMaps;
use cowatch::io::{
    input_reader, output_writer, read_edges, read_memberships, read_query_input,
    write_suggestions,
};
use cowatch::pipeline::{friend_volume_suggestions, ListOptions, ModelData};
use cowatch::userknn::cooccurrence::build_graph;

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

    let edges = match config.data.edges_path.as_deref() {
        Some(path) if Path::new(path).is_file() => read_edges(path)?,
        _ => build_graph(data.memberships.iter().copied()).sorted_edges(),
    };

    let options = ListOptions {
        exclude_known: true,
        ..ListOptions::from(&config.model)
    };
    let progress = bootstrap::progress_bar(query.users.len());
    let results = friend_volume_suggestions(&data, edges, &query.users, &options, &progress);
    results.latency.log("friend_pop");

    let suggestions = id_maps.to_original_suggestions(&query_users, results.suggestions);
    let mut writer = output_writer(config.data.output_path.as_deref())?;
    write_suggestions(&mut writer, &suggestions, false)?;
    Ok(())
}

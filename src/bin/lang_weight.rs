use anyhow::{Context, Result};
use tracing::info;

use cowatch::bootstrap;
use cowatch::content::ContentIndex;
use cowatch::idmap::IdMaps;
use cowatch::io::{
    content_records, input_reader, output_writer, read_memberships, read_query_input,
    write_suggestions,
};
use cowatch::pipeline::{
    build_neighbor_index, content_suggestions, vote_priors, ListOptions, ModelData,
};

fn main() -> Result<()> {
    let config = bootstrap::init()?;
    let content_path = config
        .data
        .content_path
        .as_deref()
        .context("data.content_path is required for content suggestions")?;

    let data = ModelData::new(read_memberships(&config.data.membership_path)?);
    let id_maps = IdMaps::load(
        config.data.user_map_path.as_deref(),
        config.data.item_map_path.as_deref(),
    )?;
    let query = read_query_input(input_reader(config.data.query_path.as_deref())?)?;
    let query_users = query.users.clone();
    let query = id_maps.to_dense_query(query);

    let content_index = ContentIndex::from_records(
        content_records(input_reader(Some(content_path))?),
        &config.content,
    );

    // Without priors in the query file, neighbor votes serve as priors
    let fallback_priors = if query.priors.is_empty() {
        info!("query carries no prior scores, blending with neighbor votes");
        let index = build_neighbor_index(&data, None, &query.users, &config.model);
        Some(vote_priors(&data, &index))
    } else {
        None
    };

    let options = ListOptions {
        how_many: config.content.max_results,
        exclude_known: true,
        backfill: config.model.backfill,
    };
    let progress = bootstrap::progress_bar(query.users.len());
    let results = content_suggestions(
        &data,
        &content_index,
        &config.content,
        &query,
        fallback_priors.as_ref(),
        &options,
        &progress,
    );
    results.latency.log("lang_weight");

    let suggestions = id_maps.to_original_suggestions(&query_users, results.suggestions);
    let mut writer = output_writer(config.data.output_path.as_deref())?;
    write_suggestions(&mut writer, &suggestions, true)?;
    Ok(())
}

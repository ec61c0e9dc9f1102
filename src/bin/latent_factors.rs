use anyhow::{bail, Result};

use cowatch::bootstrap;
use cowatch::idmap::IdMaps;
use cowatch::io::{
    input_reader, output_writer, read_item_factors, read_memberships, read_query_input,
    write_suggestions,
};
use cowatch::latent::CoOccurrenceGram;
use cowatch::pipeline::{latent_suggestions, ListOptions, ModelData};

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

    let options = ListOptions {
        how_many: config.latent.num_items_to_recommend,
        exclude_known: true,
        backfill: config.model.backfill,
    };
    let progress = bootstrap::progress_bar(query.users.len());

    let results = match config.data.factors_path.as_deref() {
        Some(path) => {
            let factors =
                read_item_factors(input_reader(Some(path))?, data.user_items.item_range())?;
            if config.latent.rank != 0 && factors.rank() != config.latent.rank {
                bail!(
                    "factor file {} has rank {}, configured rank is {}",
                    path,
                    factors.rank(),
                    config.latent.rank
                );
            }
            latent_suggestions(&data, &factors, &config.latent, &query.users, &options, &progress)
        }
        None => {
            let gram = CoOccurrenceGram::new(&data.user_items);
            latent_suggestions(&data, &gram, &config.latent, &query.users, &options, &progress)
        }
    };
    results.latency.log("latent_factors");

    let suggestions = id_maps.to_original_suggestions(&query_users, results.suggestions);
    let mut writer = output_writer(config.data.output_path.as_deref())?;
    write_suggestions(&mut writer, &suggestions, false)?;
    Ok(())
}

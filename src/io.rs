use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Terminator, Trim, WriterBuilder};
use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use tracing::{debug, warn};

use crate::error::{RecoError, Result};
use crate::latent::ItemFactors;
use crate::pipeline::Suggestion;
use crate::rank::ItemScore;
use crate::userknn::cooccurrence::Edge;

pub type UserId = u32;
pub type ItemId = u32;
pub type Membership = (UserId, ItemId);

/// Per-user prior scores supplied alongside the query users.
pub type PriorScores = HashMap<UserId, HashMap<ItemId, f64>>;

/// A parsed `user:item;score,item;score` line. Unscored entries carry `None`.
pub type SuggestionLine = (UserId, Vec<(ItemId, Option<f64>)>);

pub(crate) fn colon_separated<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .delimiter(b':')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .trim(Trim::All)
        .from_reader(reader)
}

fn skip_malformed<T>(kind: &'static str, result: csv::Result<T>) -> Option<T> {
    match result {
        Ok(record) => Some(record),
        Err(err) => {
            debug!("skipping malformed {} record: {}", kind, err);
            None
        }
    }
}

/// A raw record with exactly `qty_fields` fields. Shorter and longer records
/// are malformed, so an edge line never passes for a membership.
pub(crate) fn record_with_fields(
    kind: &'static str,
    qty_fields: usize,
    result: csv::Result<StringRecord>,
) -> Option<StringRecord> {
    let record = skip_malformed(kind, result)?;
    if record.len() == qty_fields {
        Some(record)
    } else {
        debug!(
            "skipping {} record with {} fields (expected {})",
            kind,
            record.len(),
            qty_fields
        );
        None
    }
}

fn membership_record(result: csv::Result<StringRecord>) -> Option<Membership> {
    let record = record_with_fields("membership", 2, result)?;
    skip_malformed("membership", record.deserialize::<Membership>(None))
}

/// Lazily parse `user:item` records. Bare user ids, extra fields, non-integer
/// fields and other malformed lines are skipped.
pub fn membership_records<R: Read>(reader: R) -> impl Iterator<Item = Membership> {
    colon_separated(reader)
        .into_records()
        .filter_map(membership_record)
}

pub fn read_memberships<P: AsRef<Path>>(path: P) -> Result<Vec<Membership>> {
    let file = File::open(path.as_ref())?;
    let mut qty_skipped = 0_usize;
    let memberships: Vec<Membership> = colon_separated(file)
        .into_records()
        .filter_map(|result| {
            let parsed = membership_record(result);
            if parsed.is_none() {
                qty_skipped += 1;
            }
            parsed
        })
        .collect();
    if qty_skipped > 0 {
        warn!(
            "skipped {} malformed lines in {}",
            qty_skipped,
            path.as_ref().display()
        );
    }
    Ok(memberships)
}

/// Lazily parse `user1:user2:weight` records into canonical edges. Self-edges
/// and zero weights are treated as malformed.
pub fn edge_records<R: Read>(reader: R) -> impl Iterator<Item = Edge> {
    colon_separated(reader)
        .into_records()
        .filter_map(|result| record_with_fields("edge", 3, result))
        .filter_map(|record| {
            skip_malformed("edge", record.deserialize::<(UserId, UserId, u32)>(None))
        })
        .filter_map(|(source, target, weight)| {
            let edge = Edge::new(source, target, weight);
            if edge.is_none() {
                debug!("skipping degenerate edge {}:{}:{}", source, target, weight);
            }
            edge
        })
}

pub fn read_edges<P: AsRef<Path>>(path: P) -> Result<Vec<Edge>> {
    let file = File::open(path)?;
    Ok(edge_records(file).collect())
}

pub fn write_edges<W, I>(writer: W, edges: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = Edge>,
{
    let mut csv_writer = WriterBuilder::new()
        .delimiter(b':')
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(writer);
    for edge in edges {
        csv_writer.serialize((edge.source, edge.target, edge.weight))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Per-item language composition: `(language, lines of code)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    pub item: ItemId,
    pub languages: Vec<(String, u64)>,
}

/// Parse `item:lang;loc,lang;loc,...`. A repeated language keeps its first
/// line count.
pub fn parse_content_line(line_number: u64, line: &str) -> Result<ContentRecord> {
    let (item, payload) = line
        .trim()
        .split_once(':')
        .ok_or_else(|| RecoError::parse(line_number, "missing ':' delimiter"))?;
    let item = item
        .trim()
        .parse::<ItemId>()
        .map_err(|e| RecoError::parse(line_number, format!("item id: {}", e)))?;

    let mut languages: Vec<(String, u64)> = Vec::new();
    for entry in payload.split(',').filter(|entry| !entry.trim().is_empty()) {
        let (language, loc) = entry
            .split_once(';')
            .ok_or_else(|| RecoError::parse(line_number, format!("entry '{}'", entry)))?;
        let loc = loc
            .trim()
            .parse::<u64>()
            .map_err(|e| RecoError::parse(line_number, format!("line count: {}", e)))?;
        let language = language.trim();
        if languages.iter().any(|(seen, _)| seen == language) {
            continue;
        }
        languages.push((language.to_string(), loc));
    }
    Ok(ContentRecord { item, languages })
}

pub fn content_records<R: BufRead>(reader: R) -> impl Iterator<Item = ContentRecord> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(index, line)| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => match parse_content_line(index as u64 + 1, &line) {
                Ok(record) => Some(record),
                Err(err) => {
                    debug!("skipping content record: {}", err);
                    None
                }
            },
            Err(err) => {
                warn!("unable to read content line {}: {}", index + 1, err);
                None
            }
        })
}

/// Parse `user:item;score,item,...` (scores optional per entry, payload may be
/// empty).
pub fn parse_suggestion_line(line_number: u64, line: &str) -> Result<SuggestionLine> {
    let line = line.trim();
    let (user, payload) = match line.split_once(':') {
        Some((user, payload)) => (user, payload),
        None => (line, ""),
    };
    let user = user
        .trim()
        .parse::<UserId>()
        .map_err(|e| RecoError::parse(line_number, format!("user id: {}", e)))?;

    let entries = payload
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (item, score) = match entry.split_once(';') {
                Some((item, score)) => (item, Some(score)),
                None => (entry, None),
            };
            let item = item
                .trim()
                .parse::<ItemId>()
                .map_err(|e| RecoError::parse(line_number, format!("item id: {}", e)))?;
            let score = score
                .map(|score| score.trim().parse::<f64>())
                .transpose()
                .map_err(|e| RecoError::parse(line_number, format!("score: {}", e)))?;
            if let Some(score) = score.filter(|score| !score.is_finite()) {
                return Err(RecoError::parse(
                    line_number,
                    format!("score {} of item {} is not finite", score, item),
                ));
            }
            Ok((item, score))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((user, entries))
}

/// Query users in input order, plus any prior scores given on their lines.
#[derive(Debug, Default)]
pub struct QueryInput {
    pub users: Vec<UserId>,
    pub priors: PriorScores,
}

pub fn read_query_input<R: BufRead>(reader: R) -> Result<QueryInput> {
    let mut query = QueryInput::default();
    let mut seen_users = HashSet::new();
    let mut qty_skipped = 0_usize;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_suggestion_line(index as u64 + 1, &line) {
            Ok((user, entries)) => {
                if seen_users.insert(user) {
                    query.users.push(user);
                }
                for (item, score) in entries {
                    if let Some(score) = score {
                        query.priors.entry(user).or_default().insert(item, score);
                    }
                }
            }
            Err(err) => {
                debug!("skipping query record: {}", err);
                qty_skipped += 1;
            }
        }
    }
    if qty_skipped > 0 {
        warn!("skipped {} malformed query lines", qty_skipped);
    }
    Ok(query)
}

pub fn read_suggestion_lines<R: BufRead>(reader: R) -> Result<Vec<SuggestionLine>> {
    let mut suggestions = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_suggestion_line(index as u64 + 1, &line) {
            Ok(parsed) => suggestions.push(parsed),
            Err(err) => debug!("skipping suggestion record: {}", err),
        }
    }
    Ok(suggestions)
}

/// Render one output line, `user:item;score,...` or `user:item,...`.
pub fn format_suggestion(user: UserId, items: &[ItemScore], scored: bool) -> String {
    let payload = if scored {
        items
            .iter()
            .map(|scored| format!("{};{:.4}", scored.id, scored.score))
            .join(",")
    } else {
        items.iter().map(|scored| scored.id).join(",")
    };
    format!("{}:{}", user, payload)
}

pub fn write_suggestions<W: Write>(
    writer: &mut W,
    suggestions: &[Suggestion],
    scored: bool,
) -> Result<()> {
    for suggestion in suggestions {
        writeln!(
            writer,
            "{}",
            format_suggestion(suggestion.user, &suggestion.items, scored)
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Dense item factor rows `item:f_1,f_2,...,f_r`. The rank is taken from the
/// first well-formed row; rows of a different length are skipped, as are rows
/// for item ids at or beyond `item_range` (no membership can reach them).
pub fn read_item_factors<R: BufRead>(reader: R, item_range: usize) -> Result<ItemFactors> {
    let mut rows: Vec<(ItemId, Vec<f64>)> = Vec::new();
    let mut rank: Option<usize> = None;
    let mut qty_out_of_range = 0_usize;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index as u64 + 1;
        if line.trim().is_empty() {
            continue;
        }
        let parsed = line
            .split_once(':')
            .ok_or_else(|| RecoError::parse(line_number, "missing ':' delimiter"))
            .and_then(|(item, values)| {
                let item = item
                    .trim()
                    .parse::<ItemId>()
                    .map_err(|e| RecoError::parse(line_number, format!("item id: {}", e)))?;
                let values = values
                    .split(',')
                    .map(|value| value.trim().parse::<f64>())
                    .collect::<std::result::Result<Vec<f64>, _>>()
                    .map_err(|e| RecoError::parse(line_number, format!("factor: {}", e)))?;
                Ok((item, values))
            });
        match parsed {
            Ok((item, _)) if item as usize >= item_range => qty_out_of_range += 1,
            Ok((item, values)) => {
                let expected_rank = *rank.get_or_insert(values.len());
                if values.len() == expected_rank {
                    rows.push((item, values));
                } else {
                    debug!(
                        "skipping factor row {} of rank {} (expected {})",
                        line_number,
                        values.len(),
                        expected_rank
                    );
                }
            }
            Err(err) => debug!("skipping factor row: {}", err),
        }
    }

    if qty_out_of_range > 0 {
        warn!(
            "skipped {} factor rows for item ids at or beyond {}",
            qty_out_of_range, item_range
        );
    }
    match rank {
        Some(rank) if !rows.is_empty() => Ok(ItemFactors::from_rows(rank, item_range, rows)),
        _ => Err(RecoError::MissingKey("item factor rows".into())),
    }
}

/// Buffered reader over a file, or stdin when no path (or `-`) is given.
pub fn input_reader(path: Option<&str>) -> Result<Box<dyn BufRead>> {
    match path {
        Some(path) if path != "-" => Ok(Box::new(BufReader::new(File::open(path)?))),
        _ => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

/// Buffered writer to a file, or stdout when no path (or `-`) is given.
pub fn output_writer(path: Option<&str>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) if path != "-" => Ok(Box::new(BufWriter::new(File::create(path)?))),
        _ => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

#[cfg(test)]
mod io_test {
    use super::*;
    use crate::latent::FactorModel;
    use float_cmp::approx_eq;

    #[test]
    fn should_skip_malformed_membership_lines() {
        let input = "1:10\n 2 : 20 \n7\nabc:1\n3:x\n1:2:3\n\n4:40\n";
        let memberships: Vec<Membership> = membership_records(input.as_bytes()).collect();
        assert_eq!(vec![(1, 10), (2, 20), (4, 40)], memberships);
    }

    #[test]
    fn should_canonicalize_edges_and_drop_self_edges() {
        let input = "5:2:3\n1:1:4\n1:2:0\n1:3:1\nbroken\n6:7\n6:7:1:9\n";
        let edges: Vec<Edge> = edge_records(input.as_bytes()).collect();
        assert_eq!(2, edges.len());
        assert_eq!((2, 5, 3), (edges[0].source, edges[0].target, edges[0].weight));
        assert_eq!((1, 3, 1), (edges[1].source, edges[1].target, edges[1].weight));
    }

    #[test]
    fn should_write_edges_in_colon_format() {
        let mut out = Vec::new();
        let edges = vec![Edge::new(3, 1, 2).unwrap(), Edge::new(2, 4, 1).unwrap()];
        write_edges(&mut out, edges).unwrap();
        assert_eq!("1:3:2\n2:4:1\n", String::from_utf8(out).unwrap());
    }

    #[test]
    fn should_parse_content_line_and_keep_first_duplicate() {
        let record = parse_content_line(1, "42:Ruby;1200,C;300,Ruby;5").unwrap();
        assert_eq!(42, record.item);
        assert_eq!(
            vec![("Ruby".to_string(), 1200), ("C".to_string(), 300)],
            record.languages
        );
        assert!(parse_content_line(2, "42:Ruby").is_err());
        assert!(parse_content_line(3, "Ruby;12").is_err());
    }

    #[test]
    fn should_read_bare_and_scored_query_lines() {
        let input = "5\n6:10;0.5,11;0.25\n7:\nnope\n5\n";
        let query = read_query_input(input.as_bytes()).unwrap();
        assert_eq!(vec![5, 6, 7], query.users);
        assert!(approx_eq!(f64, 0.25, query.priors[&6][&11], ulps = 2));
        assert!(!query.priors.contains_key(&7));
    }

    #[test]
    fn should_reject_non_finite_scores() {
        assert!(parse_suggestion_line(1, "9:10;nan").is_err());
        assert!(parse_suggestion_line(2, "9:4;0.5,10;inf").is_err());
        assert!(parse_suggestion_line(3, "9:10;-inf").is_err());

        let query = read_query_input("6:10;NaN\n7:10;0.5\n".as_bytes()).unwrap();
        assert_eq!(vec![7], query.users);
        assert!(!query.priors.contains_key(&6));
    }

    #[test]
    fn should_parse_unscored_suggestion_line() {
        let (user, items) = parse_suggestion_line(1, "9:4,5;0.5").unwrap();
        assert_eq!(9, user);
        assert_eq!(vec![(4, None), (5, Some(0.5))], items);
    }

    #[test]
    fn should_format_scored_and_unscored_lines() {
        let items = vec![ItemScore::new(10, 0.5), ItemScore::new(3, 0.25)];
        assert_eq!("2:10;0.5000,3;0.2500", format_suggestion(2, &items, true));
        assert_eq!("2:10,3", format_suggestion(2, &items, false));
        assert_eq!("8:", format_suggestion(8, &[], true));
    }

    #[test]
    fn should_read_factor_rows_of_consistent_rank() {
        let input = "0:1.0,0.0\n1:0.0,1.0\n2:1.0\n3:0.5,x\n";
        let factors = read_item_factors(input.as_bytes(), 10).unwrap();
        assert_eq!(2, factors.rank());
        assert_eq!(2, factors.num_items());
        assert!(read_item_factors("garbage\n".as_bytes(), 10).is_err());
    }

    #[test]
    fn should_skip_factor_rows_beyond_item_range() {
        let input = "4000000000:1.0,1.0\n1:0.0,1.0\n";
        let factors = read_item_factors(input.as_bytes(), 2).unwrap();
        assert_eq!(2, factors.num_items());
        assert!(read_item_factors("4000000000:1.0\n".as_bytes(), 2).is_err());
    }
}

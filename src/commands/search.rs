use crate::{CliEntity, OutputFormat};
use anyhow::{Context, Result};
use archindex::{
    backend::{create_backend, Entity, Generation, IndexNames, RecordSink, SearchRequest},
    config::Config,
    query::sanitize,
};
use serde_json::Value;

pub fn search_index(
    config: Config,
    query: String,
    entity: CliEntity,
    filter: Option<String>,
    page: usize,
    per_page: usize,
    format: OutputFormat,
) -> Result<()> {
    let backend = create_backend(&config.backend).context("Failed to create search backend")?;
    let sink = RecordSink::new(
        backend,
        IndexNames::new(config.backend.environment.clone()),
        Generation::Live,
    );

    let entity = match entity {
        CliEntity::File => Entity::File,
        CliEntity::Node => Entity::Node,
        CliEntity::Origin => Entity::Origin,
    };
    let mut request = SearchRequest::new(query.clone()).with_page(page.max(1), per_page.max(1));
    if let Some(filter) = filter {
        request = request.with_filter(filter);
    }

    let response = sink.search(entity, &request)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            if response.hits.is_empty() {
                println!("No results found for: {}", query);
                return Ok(());
            }
            println!("{} results for: {}\n", response.total_hits, query);
            for (i, hit) in response.hits.iter().enumerate() {
                println!("{}. {}", (page.max(1) - 1) * per_page.max(1) + i + 1, describe(hit));
            }
        }
    }
    Ok(())
}

/// One-line label for a hit of any index
fn describe(hit: &Value) -> String {
    let field = |name: &str| hit.get(name).and_then(Value::as_str).unwrap_or("");
    let title = [field("title"), field("name")]
        .into_iter()
        .find(|t| !t.is_empty())
        .unwrap_or("(untitled)");
    let reference = [field("call_number"), field("unit_id")]
        .into_iter()
        .find(|r| !r.is_empty());
    match reference {
        Some(reference) => format!("{} [{}] ({})", title, reference, field("id")),
        None => format!("{} ({})", title, field("id")),
    }
}

pub fn sanitize_query(query: String) -> Result<()> {
    println!("{}", sanitize(&query));
    Ok(())
}

//! Entity lookup: one web search plus one extraction prompt per distinct
//! value of a table column.
//!
//! Failures are contained per entity. A failed search or extraction is
//! logged, recorded in the report, and yields a "No data found" row; the
//! remaining entities are still processed.

use crate::error::{EntityError, ServiceError};
use crate::models::{GenerationConfig, ResultRow, SearchResults};
use crate::traits::{CompletionClient, WebSearch};
use std::collections::HashSet;
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{info, warn};

pub const ENTITY_PLACEHOLDER: &str = "{entity}";
pub const DEFAULT_QUERY_TEMPLATE: &str = "Find information about {entity}";
pub const NO_DATA_FOUND: &str = "No data found";
pub const NO_RELEVANT_DATA: &str = "No relevant data";

#[derive(Debug, Clone)]
pub struct EntityConfig {
    pub query_template: String,
    pub generation: GenerationConfig,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            query_template: DEFAULT_QUERY_TEMPLATE.to_string(),
            generation: GenerationConfig::default(),
        }
    }
}

/// Replaces every `{entity}` in `template` with `entity`.
pub fn render_query(template: &str, entity: &str) -> String {
    template.replace(ENTITY_PLACEHOLDER, entity)
}

pub fn extraction_prompt(results: &SearchResults) -> String {
    format!(
        "Extract relevant information from the following results: {}",
        results.to_prompt_context()
    )
}

/// A delimited table with a header row.
#[derive(Debug, Clone, Default)]
pub struct EntityTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl EntityTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, EntityError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let rows = reader
            .records()
            .map(|record| record.map(|record| record.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, csv::Error>>()?;

        Ok(Self { headers, rows })
    }

    pub fn from_path(path: &Path) -> Result<Self, EntityError> {
        Self::from_reader(std::fs::File::open(path)?)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct non-blank values of `column`, in order of first appearance.
    pub fn unique_values(&self, column: &str) -> Result<Vec<String>, EntityError> {
        let position = self
            .headers
            .iter()
            .position(|header| header == column)
            .ok_or_else(|| EntityError::MissingColumn {
                column: column.to_string(),
                available: self.headers.join(", "),
            })?;

        let mut seen: HashSet<&String> = HashSet::new();
        Ok(self
            .rows
            .iter()
            .filter_map(|row| row.get(position))
            .filter(|value| !value.is_empty())
            .filter(|value| seen.insert(*value))
            .cloned()
            .collect())
    }
}

pub fn write_results<W: Write>(writer: W, rows: &[ResultRow]) -> Result<(), EntityError> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct EntityFailure {
    pub entity: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct EntityReport {
    pub rows: Vec<ResultRow>,
    pub failures: Vec<EntityFailure>,
}

impl EntityReport {
    pub fn to_csv(&self) -> Result<String, EntityError> {
        let mut buffer = Vec::new();
        write_results(&mut buffer, &self.rows)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

enum Lookup {
    Found(String),
    Failed(ServiceError),
}

async fn lookup_one<S, C>(search: &S, client: &C, config: &EntityConfig, entity: &str) -> Lookup
where
    S: WebSearch + ?Sized,
    C: CompletionClient + ?Sized,
{
    let query = render_query(&config.query_template, entity);

    let results = match search.search(&query).await {
        Ok(results) => results,
        Err(error) => return Lookup::Failed(error),
    };
    if results.is_empty() {
        return Lookup::Found(NO_DATA_FOUND.to_string());
    }

    match client.complete(&extraction_prompt(&results), &config.generation).await {
        Ok(text) if text.trim().is_empty() => Lookup::Found(NO_RELEVANT_DATA.to_string()),
        Ok(text) => Lookup::Found(text),
        Err(error) => Lookup::Failed(error),
    }
}

/// Looks up every entity in order. Never aborts: each failure becomes a
/// warning plus a "No data found" row.
pub async fn lookup_entities<S, C>(
    search: &S,
    client: &C,
    config: &EntityConfig,
    entities: &[String],
) -> EntityReport
where
    S: WebSearch + ?Sized,
    C: CompletionClient + ?Sized,
{
    let mut report = EntityReport::default();

    for entity in entities {
        let row = lookup_row(search, client, config, entity, &mut report.failures).await;
        report.rows.push(row);
    }

    report
}

async fn lookup_row<S, C>(
    search: &S,
    client: &C,
    config: &EntityConfig,
    entity: &str,
    failures: &mut Vec<EntityFailure>,
) -> ResultRow
where
    S: WebSearch + ?Sized,
    C: CompletionClient + ?Sized,
{
    info!(entity = %entity, "searching");

    let information = match lookup_one(search, client, config, entity).await {
        Lookup::Found(text) => text,
        Lookup::Failed(error) => {
            let message = error.user_message();
            warn!(entity = %entity, error = %error, "{message}");
            failures.push(EntityFailure {
                entity: entity.to_string(),
                message,
            });
            NO_DATA_FOUND.to_string()
        }
    };

    ResultRow {
        entity: entity.to_string(),
        information,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    AwaitingFileUpload,
    ColumnSelected,
    Processing(usize),
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => f.write_str("idle"),
            RunState::AwaitingFileUpload => f.write_str("awaiting a table"),
            RunState::ColumnSelected => f.write_str("ready to process"),
            RunState::Processing(index) => write!(f, "processing entity {}", index + 1),
            RunState::Done => f.write_str("done"),
        }
    }
}

/// One pass of the lookup flow with its states made explicit:
/// Idle → AwaitingFileUpload → ColumnSelected → Processing(i)… → Done.
pub struct EntityRun<'a, S: ?Sized, C: ?Sized> {
    search: &'a S,
    client: &'a C,
    config: EntityConfig,
    state: RunState,
    table: Option<EntityTable>,
    entities: Vec<String>,
    report: EntityReport,
}

impl<'a, S, C> EntityRun<'a, S, C>
where
    S: WebSearch + ?Sized,
    C: CompletionClient + ?Sized,
{
    pub fn new(search: &'a S, client: &'a C, config: EntityConfig) -> Self {
        Self {
            search,
            client,
            config,
            state: RunState::Idle,
            table: None,
            entities: Vec::new(),
            report: EntityReport::default(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    pub fn report(&self) -> &EntityReport {
        &self.report
    }

    pub fn start(&mut self) -> Result<(), EntityError> {
        self.require_state(RunState::Idle, "start")?;
        self.state = RunState::AwaitingFileUpload;
        Ok(())
    }

    /// A new table may replace the previous one until a column is chosen.
    pub fn upload(&mut self, table: EntityTable) -> Result<(), EntityError> {
        self.require_state(RunState::AwaitingFileUpload, "upload a table")?;
        self.table = Some(table);
        Ok(())
    }

    pub fn select_column(&mut self, column: &str) -> Result<&[String], EntityError> {
        self.require_state(RunState::AwaitingFileUpload, "select a column")?;
        let table = self.table.as_ref().ok_or_else(|| EntityError::InvalidTransition {
            action: "select a column".to_string(),
            state: "awaiting a table with no table uploaded".to_string(),
        })?;

        self.entities = table.unique_values(column)?;
        self.state = RunState::ColumnSelected;
        Ok(&self.entities)
    }

    pub fn set_query_template(&mut self, template: impl Into<String>) -> Result<(), EntityError> {
        if matches!(self.state, RunState::Processing(_) | RunState::Done) {
            return Err(EntityError::InvalidTransition {
                action: "change the query template".to_string(),
                state: self.state.to_string(),
            });
        }
        self.config.query_template = template.into();
        Ok(())
    }

    pub async fn process(&mut self) -> Result<&EntityReport, EntityError> {
        self.require_state(RunState::ColumnSelected, "process entities")?;

        let mut report = EntityReport::default();
        for (position, entity) in self.entities.iter().enumerate() {
            self.state = RunState::Processing(position);
            let row = lookup_row(self.search, self.client, &self.config, entity, &mut report.failures).await;
            report.rows.push(row);
        }

        info!(
            entities = report.rows.len(),
            failures = report.failures.len(),
            "entity lookup finished"
        );

        self.report = report;
        self.state = RunState::Done;
        Ok(&self.report)
    }

    fn require_state(&self, expected: RunState, action: &str) -> Result<(), EntityError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(EntityError::InvalidTransition {
                action: action.to_string(),
                state: self.state.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::fakes::RecordingClient;
    use crate::models::OrganicResult;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Fails for any query mentioning one of `failing`.
    #[derive(Default)]
    struct ScriptedSearch {
        failing: Vec<String>,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WebSearch for ScriptedSearch {
        async fn search(&self, query: &str) -> Result<SearchResults, ServiceError> {
            if let Ok(mut queries) = self.queries.lock() {
                queries.push(query.to_string());
            }
            if self.failing.iter().any(|name| query.contains(name.as_str())) {
                return Err(ServiceError::BackendResponse {
                    backend: "scripted".to_string(),
                    details: "503 Service Unavailable".to_string(),
                });
            }
            Ok(SearchResults {
                query: query.to_string(),
                organic: vec![OrganicResult {
                    position: Some(1),
                    title: format!("{query} homepage"),
                    link: "https://example.com".to_string(),
                    snippet: "contact details".to_string(),
                }],
                raw: json!({"organic_results": []}),
            })
        }
    }

    fn table(csv: &str) -> Result<EntityTable, EntityError> {
        EntityTable::from_reader(csv.as_bytes())
    }

    #[test]
    fn query_substitutes_entity() {
        let query = render_query("Get me the email address of {entity}", "Acme Corp");
        assert_eq!(query, "Get me the email address of Acme Corp");
        assert!(render_query(DEFAULT_QUERY_TEMPLATE, "Acme Corp").contains("Acme Corp"));
        assert_eq!(render_query("{entity} vs {entity}", "A"), "A vs A");
    }

    #[test]
    fn unique_values_keep_first_appearance_order() -> Result<(), EntityError> {
        let table = table("Company,City\nBeta Labs,Oslo\nAlpha Inc,Rome\nBeta Labs,Oslo\n,Nowhere\n")?;
        assert_eq!(table.unique_values("Company")?, vec!["Beta Labs", "Alpha Inc"]);
        assert!(matches!(
            table.unique_values("Missing"),
            Err(EntityError::MissingColumn { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn failed_searches_become_no_data_rows() -> Result<(), EntityError> {
        let search = ScriptedSearch {
            failing: vec!["Mega Corp".to_string(), "Smart Labs".to_string()],
            ..ScriptedSearch::default()
        };
        let client = RecordingClient::replying("email: hello@example.com");
        let entities: Vec<String> = ["Tech Corp", "Mega Corp", "Data Inc", "Smart Labs", "Info Systems"]
            .map(String::from)
            .to_vec();

        let report = lookup_entities(&search, &client, &EntityConfig::default(), &entities).await;

        assert_eq!(report.rows.len(), 5);
        let missing = report
            .rows
            .iter()
            .filter(|row| row.information == NO_DATA_FOUND)
            .count();
        assert_eq!(missing, 2);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.rows[4].entity, "Info Systems");
        assert_eq!(report.rows[4].information, "email: hello@example.com");
        assert_eq!(client.prompts().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn blank_extraction_is_no_relevant_data() {
        let search = ScriptedSearch::default();
        let client = RecordingClient::replying("   ");
        let report = lookup_entities(
            &search,
            &client,
            &EntityConfig::default(),
            &["Acme".to_string()],
        )
        .await;
        assert_eq!(report.rows[0].information, NO_RELEVANT_DATA);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn run_walks_through_every_state() -> Result<(), Box<dyn std::error::Error>> {
        let search = ScriptedSearch {
            failing: vec!["Alpha".to_string()],
            ..ScriptedSearch::default()
        };
        let client = RecordingClient::replying("found it");
        let mut run = EntityRun::new(&search, &client, EntityConfig::default());

        assert_eq!(run.state(), RunState::Idle);
        assert!(run.select_column("Company").is_err());

        run.start()?;
        assert_eq!(run.state(), RunState::AwaitingFileUpload);
        run.upload(table("Company\nAlpha Inc\nBeta Labs\nAlpha Inc\n")?)?;
        run.set_query_template("Contact for {entity}")?;

        let entities = run.select_column("Company")?.to_vec();
        assert_eq!(entities, vec!["Alpha Inc", "Beta Labs"]);
        assert_eq!(run.state(), RunState::ColumnSelected);

        let report = run.process().await?.clone();
        assert_eq!(run.state(), RunState::Done);
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].information, NO_DATA_FOUND);
        assert_eq!(report.rows[1].information, "found it");

        let queries = search.queries.lock().map(|q| q.clone()).unwrap_or_default();
        assert_eq!(queries, vec!["Contact for Alpha Inc", "Contact for Beta Labs"]);

        assert!(run.process().await.is_err());
        Ok(())
    }

    #[test]
    fn report_csv_has_entity_and_information_columns() -> Result<(), EntityError> {
        let report = EntityReport {
            rows: vec![ResultRow {
                entity: "Acme, Inc".to_string(),
                information: NO_DATA_FOUND.to_string(),
            }],
            failures: Vec::new(),
        };
        let csv = report.to_csv()?;
        assert_eq!(csv, "Entity,Information\n\"Acme, Inc\",No data found\n");
        Ok(())
    }
}

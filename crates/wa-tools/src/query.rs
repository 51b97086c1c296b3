//! Warehouse query tool
//!
//! Turns a natural-language question into SQL with the completion model,
//! runs it against the data source and either returns the rows or has the
//! model phrase the answer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use wa_core::warehouse::{DataSource, QueryResult};
use wa_core::{CompletionModel, CompletionRequest, Error, QueryConfig, Result, Tool};

const SQL_RESULT_STOP: &str = "\nSQLResult:";

/// SQL synthesis and execution over one data source
pub struct QueryExecutor {
    source: Arc<dyn DataSource>,
    model: Arc<dyn CompletionModel>,
    row_limit: usize,
    max_attempts: usize,
    return_direct: bool,
    sample_rows: usize,
}

/// What went wrong with the previous synthesis attempt
struct FailedAttempt {
    sql: String,
    error: String,
}

impl QueryExecutor {
    pub fn new(
        source: Arc<dyn DataSource>,
        model: Arc<dyn CompletionModel>,
        config: &QueryConfig,
    ) -> Self {
        Self {
            source,
            model,
            row_limit: config.row_limit.max(1),
            max_attempts: config.max_attempts.max(1),
            return_direct: config.return_direct,
            sample_rows: config.sample_rows,
        }
    }

    pub fn row_limit(&self) -> usize {
        self.row_limit
    }

    /// Answer a question from the warehouse.
    ///
    /// # Errors
    /// `Connection` if the store cannot be reached, `QueryGeneration` if no
    /// runnable read query was produced within `max_attempts`.
    pub async fn answer(&self, question: &str) -> Result<String> {
        let table_info = self.source.table_info(self.sample_rows).await?;
        let preamble = self.synthesis_preamble(&table_info);
        let block = question_block(question);
        let (sql, result) = self.synthesize(&preamble, &block).await?;

        info!(
            "Query returned {} rows{}",
            result.row_count(),
            if result.truncated { " (capped)" } else { "" }
        );

        if self.return_direct {
            return Ok(result.to_string());
        }

        let summary_prompt = format!(
            "{}{} {}\nSQLResult: {}\nAnswer:",
            preamble, block, sql, result
        );
        let summary = self
            .model
            .complete(CompletionRequest::new(summary_prompt))
            .await?;
        Ok(strip_answer_prefix(&summary))
    }

    /// Generate SQL and run it, retrying with the error text on failure.
    async fn synthesize(&self, preamble: &str, block: &str) -> Result<(String, QueryResult)> {
        let mut last_failure: Option<FailedAttempt> = None;

        for attempt in 1..=self.max_attempts {
            let request_prompt = match &last_failure {
                Some(failure) => retry_prompt(preamble, block, failure),
                None => format!("{}{}", preamble, block),
            };

            let raw = self
                .model
                .complete(CompletionRequest::new(request_prompt).stop(SQL_RESULT_STOP))
                .await?;
            let sql = clean_sql(&raw);
            debug!("Attempt {}/{} SQL: {}", attempt, self.max_attempts, sql);

            if let Err(reason) = check_read_only(&sql) {
                warn!("Rejected synthesized statement: {}", reason);
                last_failure = Some(FailedAttempt { sql, error: reason });
                continue;
            }

            match self.source.run_query(&sql, self.row_limit).await {
                Ok(mut result) => {
                    result.cap(self.row_limit);
                    return Ok((sql, result));
                }
                Err(e @ Error::Connection(_)) => return Err(e),
                Err(e) => {
                    warn!("Query attempt {} failed: {}", attempt, e);
                    last_failure = Some(FailedAttempt {
                        sql,
                        error: e.to_string(),
                    });
                }
            }
        }

        let detail = last_failure
            .map(|f| format!("last query `{}` failed: {}", f.sql, f.error))
            .unwrap_or_default();
        Err(Error::QueryGeneration(format!(
            "no runnable query after {} attempts; {}",
            self.max_attempts, detail
        )))
    }

    /// Instructions and schema, up to where the question goes
    fn synthesis_preamble(&self, table_info: &str) -> String {
        format!(
            "Given an input question, first create a syntactically correct {dialect} query to run, \
             then look at the results of the query and return the answer. Unless the user specifies \
             in the question a specific number of examples to obtain, query for at most {top_k} \
             results. Never query for all columns from a table; query only the columns needed to \
             answer the question. Pay attention to use only the column names you can see in the \
             tables below. Only read queries (SELECT) are allowed.\n\n\
             Use the following format:\n\n\
             Question: Question here\n\
             SQLQuery: SQL Query to run\n\
             SQLResult: Result of the SQLQuery\n\
             Answer: Final answer here\n\n\
             Only use the following tables:\n\
             {table_info}\n\n",
            dialect = self.source.dialect(),
            top_k = self.row_limit,
        )
    }
}

fn question_block(question: &str) -> String {
    format!("Question: {}\nSQLQuery:", question)
}

/// The failed attempt goes between the schema and the question.
fn retry_prompt(preamble: &str, block: &str, failure: &FailedAttempt) -> String {
    format!(
        "{}A previous attempt at this question failed.\nSQLQuery: {}\nError: {}\n\
         Write a corrected query.\n\n{}",
        preamble, failure.sql, failure.error, block
    )
}

/// Strip fences, labels and trailing semicolons from model output.
pub fn clean_sql(raw: &str) -> String {
    let mut sql = raw.trim();

    if let Some(pos) = sql.find(SQL_RESULT_STOP.trim_start()) {
        sql = sql[..pos].trim();
    }
    if let Some(rest) = sql.strip_prefix("SQLQuery:") {
        sql = rest.trim();
    }
    if let Some(rest) = sql.strip_prefix("```") {
        let rest = rest.strip_prefix("sql").unwrap_or(rest);
        sql = rest.trim();
    }
    if let Some(rest) = sql.strip_suffix("```") {
        sql = rest.trim();
    }

    sql.trim_end_matches(';').trim().to_string()
}

/// Accept a statement that starts with SELECT, WITH or EXPLAIN.
///
/// Only the leading keyword is checked here. Statement count and write
/// access are enforced by the data source when it prepares the query.
pub fn check_read_only(sql: &str) -> std::result::Result<(), String> {
    let sql = sql.trim().trim_end_matches(';').trim_end();
    if sql.is_empty() {
        return Err("empty query".to_string());
    }

    let first = sql
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match first.as_str() {
        "select" | "with" | "explain" => Ok(()),
        other => Err(format!("only read queries are allowed, got `{}`", other)),
    }
}

fn strip_answer_prefix(text: &str) -> String {
    let text = text.trim();
    text.strip_prefix("Answer:").unwrap_or(text).trim().to_string()
}

/// The query executor exposed to the reasoner
pub struct QueryTool {
    executor: Arc<QueryExecutor>,
}

impl QueryTool {
    pub const NAME: &'static str = "Warehouse Transactions";

    pub fn new(executor: Arc<QueryExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for QueryTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Use this when you want to answer questions about customer orders, spending, purchases, \
         and transactions. The input to this tool should be a complete english sentence."
    }

    async fn invoke(&self, input: &str) -> Result<String> {
        self.executor.answer(input).await
    }
}

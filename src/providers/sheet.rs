//! Quote source backed by a spreadsheet query cell
//!
//! The remote source evaluates a finance formula written into a single
//! well-known cell and publishes the result as a `Date, Close` table.
//! The cell is a system-wide singleton: only one outstanding query is
//! safe at a time, and callers serialize sync operations.

use crate::core::market::ClosePoint;
use crate::core::quote::{FetchOutcome, SeriesFetcher};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, warn};

/// Marker the source writes into the query cell once the table is ready.
const COMPLETION_MARKER: &str = "Date";

/// Reading and writing cells of the shared sheet. Injected so tests can
/// script "completes on attempt N" and "never completes" without a
/// network or a real clock.
#[async_trait]
pub trait CellTransport: Send + Sync {
    async fn write_cell(&self, cell: &str, value: &str) -> Result<()>;
    async fn read_cell(&self, cell: &str) -> Result<Option<String>>;
    async fn read_table(&self) -> Result<Vec<Vec<String>>>;
}

/// Bounds on the completion poll.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            interval: Duration::from_millis(100),
            timeout: Duration::from_secs(5),
        }
    }
}

pub struct SheetSeriesFetcher {
    transport: Arc<dyn CellTransport>,
    query_cell: String,
    policy: PollPolicy,
}

impl SheetSeriesFetcher {
    pub fn new(transport: Arc<dyn CellTransport>, query_cell: &str, policy: PollPolicy) -> Self {
        SheetSeriesFetcher {
            transport,
            query_cell: query_cell.to_string(),
            policy,
        }
    }

    fn formula(search_term: &str, from: NaiveDate, to: NaiveDate) -> String {
        format!(
            "=GOOGLEFINANCE(\"{}\",\"close\",DATE({},{},{}),DATE({},{},{}),\"DAILY\")",
            search_term,
            from.year(),
            from.month(),
            from.day(),
            to.year(),
            to.month(),
            to.day(),
        )
    }

    async fn run_query(&self, search_term: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Vec<String>>> {
        let cell = &self.query_cell;
        self.transport.write_cell(cell, "").await?;
        self.transport
            .write_cell(cell, &Self::formula(search_term, from, to))
            .await?;

        let started = Instant::now();
        loop {
            if started.elapsed() >= self.policy.timeout {
                // Leave the singleton slot empty for the next caller.
                if let Err(e) = self.transport.write_cell(cell, "").await {
                    warn!("failed to clear query cell after timeout: {e}");
                }
                return Err(anyhow!(
                    "remote source did not complete within {:?}",
                    self.policy.timeout
                ));
            }

            if let Some(value) = self.transport.read_cell(cell).await? {
                if value == COMPLETION_MARKER {
                    break;
                }
            }
            sleep(self.policy.interval).await;
        }

        self.transport.read_table().await
    }
}

/// Coerce the raw sheet table into an ascending date-indexed series.
/// Header rows (including duplicated ones) and unparseable cells are
/// dropped; the first occurrence wins for duplicated dates.
fn parse_series(rows: &[Vec<String>]) -> Vec<ClosePoint> {
    let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for row in rows {
        let (Some(date_cell), Some(close_cell)) = (row.first(), row.get(1)) else {
            continue;
        };
        if date_cell == COMPLETION_MARKER {
            continue;
        }
        let Some(date) = parse_date(date_cell) else {
            debug!("skipping row with unparseable date '{date_cell}'");
            continue;
        };
        let Ok(close) = close_cell.trim().parse::<f64>() else {
            debug!("skipping row with non-numeric close '{close_cell}'");
            continue;
        };
        if !close.is_finite() {
            continue;
        }
        by_date.entry(date).or_insert(close);
    }

    by_date
        .into_iter()
        .map(|(date, close)| ClosePoint { date, close })
        .collect()
}

fn parse_date(cell: &str) -> Option<NaiveDate> {
    let cell = cell.trim();
    chrono::NaiveDateTime::parse_from_str(cell, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.date())
        .or_else(|_| NaiveDate::parse_from_str(cell, "%Y-%m-%d"))
        .ok()
}

#[async_trait]
impl SeriesFetcher for SheetSeriesFetcher {
    #[instrument(name = "SheetFetch", skip(self), fields(term = %search_term))]
    async fn fetch(&self, search_term: &str, from: NaiveDate, to: NaiveDate) -> FetchOutcome {
        if from > to {
            return FetchOutcome::unavailable(format!("invalid date range: {from} > {to}"));
        }

        match self.run_query(search_term, from, to).await {
            Ok(rows) => FetchOutcome::Series(parse_series(&rows)),
            Err(e) => {
                warn!("fetch for '{search_term}' failed: {e}");
                FetchOutcome::unavailable(e.to_string())
            }
        }
    }
}

// HTTP transport against a gspread-style REST facade.
pub struct SheetCellClient {
    base_url: String,
    sheet_name: String,
    client: reqwest::Client,
}

impl SheetCellClient {
    pub fn new(base_url: &str, sheet_name: &str) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent("rebal/0.2").build()?;
        Ok(SheetCellClient {
            base_url: base_url.to_string(),
            sheet_name: sheet_name.to_string(),
            client,
        })
    }

    fn cell_url(&self, cell: &str) -> String {
        format!("{}/sheets/{}/cells/{}", self.base_url, self.sheet_name, cell)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CellValue {
    value: Option<String>,
}

#[async_trait]
impl CellTransport for SheetCellClient {
    async fn write_cell(&self, cell: &str, value: &str) -> Result<()> {
        let url = self.cell_url(cell);
        debug!("writing cell {url}");
        let response = self
            .client
            .put(&url)
            .json(&CellValue {
                value: Some(value.to_string()),
            })
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {e} for cell write: {url}"))?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {} writing cell {cell}", response.status()));
        }
        Ok(())
    }

    async fn read_cell(&self, cell: &str) -> Result<Option<String>> {
        let url = self.cell_url(cell);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {e} for cell read: {url}"))?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {} reading cell {cell}", response.status()));
        }

        let cell_value: CellValue = response.json().await?;
        Ok(cell_value.value.filter(|v| !v.is_empty()))
    }

    async fn read_table(&self) -> Result<Vec<Vec<String>>> {
        let url = format!("{}/sheets/{}/values", self.base_url, self.sheet_name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {e} for table read: {url}"))?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {} reading table", response.status()));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Scripted transport: the query cell reads as `None` for the first
    /// `ready_after` polls, then as the completion marker (or never, if
    /// `ready_after` is `None`).
    struct ScriptedTransport {
        ready_after: Option<usize>,
        reads: AtomicUsize,
        writes: Mutex<Vec<String>>,
        table: Vec<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(ready_after: Option<usize>, table: Vec<Vec<String>>) -> Self {
            ScriptedTransport {
                ready_after,
                reads: AtomicUsize::new(0),
                writes: Mutex::new(Vec::new()),
                table,
            }
        }

        fn last_write(&self) -> Option<String> {
            self.writes.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl CellTransport for ScriptedTransport {
        async fn write_cell(&self, _cell: &str, value: &str) -> Result<()> {
            self.writes.lock().unwrap().push(value.to_string());
            Ok(())
        }

        async fn read_cell(&self, _cell: &str) -> Result<Option<String>> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            match self.ready_after {
                Some(ready) if n >= ready => Ok(Some(COMPLETION_MARKER.to_string())),
                _ => Ok(None),
            }
        }

        async fn read_table(&self) -> Result<Vec<Vec<String>>> {
            Ok(self.table.clone())
        }
    }

    fn sample_table() -> Vec<Vec<String>> {
        vec![
            vec!["Date".to_string(), "Close".to_string()],
            vec!["2024-01-10 16:00:00".to_string(), "100.5".to_string()],
            vec!["Date".to_string(), "Close".to_string()],
            vec!["2024-01-11 16:00:00".to_string(), "101.25".to_string()],
            vec!["2024-01-11 16:00:00".to_string(), "999.0".to_string()],
            vec!["2024-01-12 16:00:00".to_string(), "#N/A".to_string()],
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_completes_after_polling() {
        let transport = Arc::new(ScriptedTransport::new(Some(3), sample_table()));
        let fetcher =
            SheetSeriesFetcher::new(Arc::clone(&transport) as _, "A1", PollPolicy::default());

        let outcome = fetcher
            .fetch("SPY", date(2024, 1, 1), date(2024, 1, 31))
            .await;

        let FetchOutcome::Series(points) = outcome else {
            panic!("expected a series");
        };
        // Duplicated headers, duplicated dates and the non-numeric cell
        // are all dropped; first occurrence wins.
        assert_eq!(
            points,
            vec![
                ClosePoint { date: date(2024, 1, 10), close: 100.5 },
                ClosePoint { date: date(2024, 1, 11), close: 101.25 },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_times_out_and_clears_the_slot() {
        let transport = Arc::new(ScriptedTransport::new(None, Vec::new()));
        let fetcher =
            SheetSeriesFetcher::new(Arc::clone(&transport) as _, "A1", PollPolicy::default());

        let outcome = fetcher
            .fetch("SPY", date(2024, 1, 1), date(2024, 1, 31))
            .await;

        assert!(outcome.is_unavailable());
        // clear, formula, clear-after-timeout
        assert_eq!(transport.last_write(), Some(String::new()));
        assert!(transport.writes.lock().unwrap().len() >= 3);
    }

    #[tokio::test]
    async fn inverted_range_is_rejected_without_transport_contact() {
        let transport = Arc::new(ScriptedTransport::new(Some(0), sample_table()));
        let fetcher =
            SheetSeriesFetcher::new(Arc::clone(&transport) as _, "A1", PollPolicy::default());

        let outcome = fetcher
            .fetch("SPY", date(2024, 1, 31), date(2024, 1, 1))
            .await;

        assert!(outcome.is_unavailable());
        assert!(transport.writes.lock().unwrap().is_empty());
        assert_eq!(transport.reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn formula_matches_wire_contract() {
        let formula = SheetSeriesFetcher::formula("NI225", date(2023, 8, 7), date(2024, 8, 6));
        assert_eq!(
            formula,
            "=GOOGLEFINANCE(\"NI225\",\"close\",DATE(2023,8,7),DATE(2024,8,6),\"DAILY\")"
        );
    }

    #[test]
    fn parse_series_accepts_bare_dates() {
        let rows = vec![vec!["2024-02-01".to_string(), "12.5".to_string()]];
        let points = parse_series(&rows);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].date, date(2024, 2, 1));
    }

    #[tokio::test]
    async fn http_transport_round_trip() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/sheets/quotes/cells/A1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sheets/quotes/cells/A1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"value": "Date"}"#),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sheets/quotes/values"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[["Date","Close"],["2024-01-10","100.5"]]"#,
            ))
            .mount(&mock_server)
            .await;

        let client = SheetCellClient::new(&mock_server.uri(), "quotes").unwrap();
        client.write_cell("A1", "=FORMULA").await.unwrap();
        assert_eq!(client.read_cell("A1").await.unwrap(), Some("Date".to_string()));
        let table = client.read_table().await.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[1][1], "100.5");
    }

    #[tokio::test]
    async fn http_transport_surfaces_server_errors() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sheets/quotes/cells/A1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let client = SheetCellClient::new(&mock_server.uri(), "quotes").unwrap();
        assert!(client.read_cell("A1").await.is_err());
    }
}

//! Command execution against a loaded orchestrator

use crate::render;
use konkyo_common::{QueryOrchestrator, QueryResponse};
use std::io::Write;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

const EXIT_WORDS: &[&str] = &["exit", "quit", "q"];

/// Output style for answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

pub struct Session<'a, W: Write> {
    orchestrator: &'a QueryOrchestrator,
    out: W,
    format: OutputFormat,
}

impl<'a, W: Write> Session<'a, W> {
    pub fn new(orchestrator: &'a QueryOrchestrator, out: W, format: OutputFormat) -> Self {
        Self {
            orchestrator,
            out,
            format,
        }
    }

    /// Answer one question and print it
    pub async fn ask(&mut self, query: &str) -> anyhow::Result<()> {
        let start = Instant::now();
        let result = self.orchestrator.query(query).await?;
        let elapsed = start.elapsed();

        match self.format {
            OutputFormat::Text => write!(self.out, "{}", render::render_framed(query, &result, elapsed))?,
            OutputFormat::Json => {
                let response =
                    QueryResponse::from_result(result, elapsed.as_millis() as u64, self.orchestrator.model_name());
                writeln!(self.out, "{}", serde_json::to_string(&response)?)?;
            }
        }
        Ok(())
    }

    /// Answer each query in order; a failing entry is reported and skipped.
    /// Returns the number of failures.
    pub async fn batch(&mut self, queries: &[String]) -> anyhow::Result<usize> {
        let mut failed = 0;
        for (i, query) in queries.iter().enumerate() {
            if self.format == OutputFormat::Text {
                writeln!(self.out, "\n[{}/{}]", i + 1, queries.len())?;
            }
            if let Err(e) = self.ask(query).await {
                failed += 1;
                tracing::warn!(query = %query, error = %e, "Batch entry failed");
                writeln!(self.out, "エラー: {}", e)?;
            }
        }
        Ok(failed)
    }

    /// Read questions line by line until EOF or an exit word
    pub async fn interactive<R: AsyncBufRead + Unpin>(&mut self, input: R) -> anyhow::Result<()> {
        writeln!(self.out, "{}", render::banner())?;
        let mut lines = input.lines();

        loop {
            write!(self.out, "\n質問> ")?;
            self.out.flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let query = line.trim();

            if query.is_empty() {
                continue;
            }
            if EXIT_WORDS.contains(&query.to_lowercase().as_str()) {
                break;
            }
            if query.eq_ignore_ascii_case("help") {
                writeln!(self.out, "{}", render::help())?;
                continue;
            }

            if let Err(e) = self.ask(query).await {
                writeln!(self.out, "エラー: {}", e)?;
            }
        }

        writeln!(self.out, "\n終了します。")?;
        Ok(())
    }
}

/// Queries from a batch file: a JSON array of strings, or one query per
/// line with blank lines and `#` comments ignored
pub fn parse_batch_file(raw: &str) -> anyhow::Result<Vec<String>> {
    if raw.trim_start().starts_with('[') {
        let queries: Vec<String> = serde_json::from_str(raw)?;
        return Ok(queries);
    }

    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

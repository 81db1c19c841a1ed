use crate::row::Row;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// A background thread owns the encoder; callers hand rows off to it.
    #[default]
    Task,
    /// Callers encode on their own thread while holding a mutex.
    Locked,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task => f.write_str("task"),
            Self::Locked => f.write_str("locked"),
        }
    }
}

impl FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "task" | "owning-task" => Ok(Self::Task),
            "locked" | "lock" | "mutex" => Ok(Self::Locked),
            _ => anyhow::bail!("Unknown strategy: {}. Use: task or locked", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuoteStyle {
    #[default]
    Necessary,
    Always,
    NonNumeric,
    Never,
}

impl From<QuoteStyle> for csv::QuoteStyle {
    fn from(style: QuoteStyle) -> Self {
        match style {
            QuoteStyle::Necessary => csv::QuoteStyle::Necessary,
            QuoteStyle::Always => csv::QuoteStyle::Always,
            QuoteStyle::NonNumeric => csv::QuoteStyle::NonNumeric,
            QuoteStyle::Never => csv::QuoteStyle::Never,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Terminator {
    #[default]
    Lf,
    Crlf,
}

impl From<Terminator> for csv::Terminator {
    fn from(term: Terminator) -> Self {
        match term {
            Terminator::Lf => csv::Terminator::Any(b'\n'),
            Terminator::Crlf => csv::Terminator::CRLF,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub strategy: Strategy,
    pub delimiter: u8,
    pub quote_style: QuoteStyle,
    pub terminator: Terminator,
    /// Allow rows with differing field counts.
    pub flexible: bool,
    pub header: Option<Row>,
    pub buffer_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Task,
            delimiter: b',',
            quote_style: QuoteStyle::Necessary,
            terminator: Terminator::Lf,
            flexible: true,
            header: None,
            buffer_capacity: 8 * 1024,
        }
    }
}

impl WriterConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quote_style(mut self, style: QuoteStyle) -> Self {
        self.quote_style = style;
        self
    }

    pub fn with_terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn with_flexible(mut self, flexible: bool) -> Self {
        self.flexible = flexible;
        self
    }

    pub fn with_header(mut self, header: impl Into<Row>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub(crate) fn csv_builder(&self) -> csv::WriterBuilder {
        let mut builder = csv::WriterBuilder::new();
        builder
            .delimiter(self.delimiter)
            .quote_style(self.quote_style.into())
            .terminator(self.terminator.into())
            // Field counts are checked by `Shape` before a row reaches the encoder
            .flexible(true)
            .has_headers(false)
            .buffer_capacity(self.buffer_capacity.max(1));
        builder
    }
}

// Copyright (C) 2025-present The tripstream Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tabular view over aggregator snapshots.

use crate::{engine::Emission, Timestamp};
use serde::Serialize;
use std::fmt;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M";
const MISSING: &str = "-";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub label: String,
    /// `None` for raster windows and empty windows without a value
    pub value: Option<f64>,
}

impl From<&Emission> for ReportRow {
    fn from(emission: &Emission) -> Self {
        let (start, end) = emission.range();
        let label = match emission {
            Emission::Window(window) => window.label().to_string(),
            Emission::Cumulative(result) => format!("{} batches", result.count()),
        };
        Self {
            start,
            end,
            label,
            value: emission.value(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    title: String,
    rows: Vec<ReportRow>,
}

impl Report {
    pub fn new(title: impl Into<String>, rows: Vec<ReportRow>) -> Self {
        Self {
            title: title.into(),
            rows,
        }
    }

    /// Builds a report from a history snapshot, oldest first
    pub fn from_history<'a, I>(title: impl Into<String>, history: I) -> Self
    where
        I: IntoIterator<Item = &'a Emission>,
    {
        Self::new(title, history.into_iter().map(ReportRow::from).collect())
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    /// Renders the report as a left aligned text table with a
    /// `start | end | value` header under the title
    pub fn to_table(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<[String; 3]> = self
            .rows
            .iter()
            .map(|row| {
                [
                    format_ts(row.start),
                    format_ts(row.end),
                    row.value
                        .map(|v| format!("{v:.2}"))
                        .unwrap_or_else(|| MISSING.to_string()),
                ]
            })
            .collect();
        let header = ["start", "end", "value"];
        let mut widths = header.map(str::len);
        for row in &cells {
            for (width, cell) in widths.iter_mut().zip(row.iter()) {
                *width = (*width).max(cell.len());
            }
        }

        writeln!(f, "{}", self.title)?;
        write_row(f, &header, &widths)?;
        writeln!(
            f,
            "{}",
            widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("-+-")
        )?;
        for row in &cells {
            write_row(f, row, &widths)?;
        }
        Ok(())
    }
}

fn format_ts(ts: Option<Timestamp>) -> String {
    ts.map(|ts| ts.format(TS_FORMAT).to_string())
        .unwrap_or_else(|| MISSING.to_string())
}

fn write_row<S: AsRef<str>>(
    f: &mut fmt::Formatter<'_>,
    cells: &[S; 3],
    widths: &[usize; 3],
) -> fmt::Result {
    let line = cells
        .iter()
        .zip(widths.iter())
        .map(|(cell, width)| format!("{:<width$}", cell.as_ref(), width = *width))
        .collect::<Vec<_>>()
        .join(" | ");
    writeln!(f, "{}", line.trim_end())
}

//! Identity of a discovered scrape target.
//!
//! Rendering the collector's task document is left to the caller; this
//! module only derives the ids that name the task and its config file.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::fingerprint::{Fingerprint, avoid_overflow};

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-zA-Z0-9]").expect("static pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeTarget {
    pub data_id: u32,
    pub address: String,
    pub path: String,
    /// Discovered labels, in discovery order.
    pub labels: Vec<Label>,
    pub monitor_index: i64,
    pub namespace: String,
    pub monitor_name: String,
    pub node_name: String,
    pub mask: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl ScrapeTarget {
    /// Collector task id, kept within the positive `i32` range.
    pub fn task_id(&self) -> u64 {
        let mut fp = Fingerprint::new();
        fp.write_display(self.data_id)
            .write_str(&self.address)
            .write_str(&self.path);
        for label in &self.labels {
            fp.write_str(&label.name).write_str(&label.value);
        }
        fp.write_display(self.monitor_index)
            .write_str(&self.namespace)
            .write_str(&self.monitor_name);
        avoid_overflow(fp.finish())
    }

    /// File name for the rendered task document.
    pub fn file_name(&self, rendered: &[u8]) -> String {
        let raw = format!(
            "{}-{}-{}-{}-{}",
            self.node_name,
            self.address,
            self.path,
            Fingerprint::of(rendered),
            self.mask
        );
        sanitize_file_name(&raw)
    }
}

/// Replace every non-alphanumeric character with `-`, then collapse `--`
/// in a single left-to-right pass. `---` becomes `--`.
pub fn sanitize_file_name(raw: &str) -> String {
    NON_ALNUM.replace_all(raw, "-").replace("--", "-")
}

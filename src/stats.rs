//! Per-symbol statistics aggregation
//!
//! Hierarchical sessions accumulate `Metrics` per caller==>callee edge key,
//! optionally with a second, independent aggregation per layer label.
//! Sampled sessions record one rendered stack per sample timestamp.
//! `stop()` turns the store into a `StatsSnapshot`.

use crate::symbol::ROOT_SYMBOL;
use crate::timing::WallTime;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Reserved key under which layer totals are merged into the root entry
pub const LAYERS_KEY: &str = "layers";

/// A single accumulable field of `Metrics`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    CallCount,
    WallTime,
    CpuTime,
    Memory,
    PeakMemory,
}

/// Accumulated measurements for one key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    /// Call count
    pub ct: u64,
    /// Wall time in microseconds
    pub wt: u64,
    /// CPU time in microseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u64>,
    /// Memory usage delta in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mu: Option<i64>,
    /// Peak memory delta in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmu: Option<i64>,
}

impl Metrics {
    /// Add `delta` to one field. Counts and times never go below zero.
    pub fn add(&mut self, field: Metric, delta: i64) {
        let unsigned = delta.max(0) as u64;
        match field {
            Metric::CallCount => self.ct = self.ct.saturating_add(unsigned),
            Metric::WallTime => self.wt = self.wt.saturating_add(unsigned),
            Metric::CpuTime => {
                self.cpu = Some(self.cpu.unwrap_or(0).saturating_add(unsigned));
            }
            Metric::Memory => self.mu = Some(self.mu.unwrap_or(0).saturating_add(delta)),
            Metric::PeakMemory => self.pmu = Some(self.pmu.unwrap_or(0).saturating_add(delta)),
        }
    }

    /// Count one call of `wall_us` microseconds
    pub fn record_call(&mut self, wall_us: u64) {
        self.ct = self.ct.saturating_add(1);
        self.wt = self.wt.saturating_add(wall_us);
    }
}

/// Symbol-keyed metrics store for one session
#[derive(Debug, Default)]
pub struct StatsStore {
    buckets: FnvHashMap<String, Metrics>,
    samples: BTreeMap<WallTime, String>,
}

impl StatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to `field` of `key`, creating the entry if needed
    pub fn accumulate(&mut self, key: &str, field: Metric, delta: i64) {
        if let Some(metrics) = self.buckets.get_mut(key) {
            metrics.add(field, delta);
            return;
        }
        let mut metrics = Metrics::default();
        metrics.add(field, delta);
        self.buckets.insert(key.to_owned(), metrics);
    }

    /// Entry for `key`, created empty if absent
    pub fn get_or_create_bucket(&mut self, key: &str) -> &mut Metrics {
        // Only allocate the owned key on a miss
        if !self.buckets.contains_key(key) {
            self.buckets.insert(key.to_owned(), Metrics::default());
        }
        match self.buckets.get_mut(key) {
            Some(metrics) => metrics,
            None => unreachable!("bucket inserted above"),
        }
    }

    pub fn bucket(&self, key: &str) -> Option<&Metrics> {
        self.buckets.get(key)
    }

    /// Record a sampled stack at `at`
    pub fn record_sample(&mut self, at: WallTime, stack: String) {
        self.samples.insert(at, stack);
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty() && self.samples.is_empty()
    }

    pub(crate) fn into_hierarchical(self, layers: Option<LayerStore>) -> StatsSnapshot {
        StatsSnapshot::Hierarchical {
            edges: self.buckets.into_iter().collect(),
            layers: layers.map(LayerStore::into_sorted),
        }
    }

    pub(crate) fn into_sampled(self) -> StatsSnapshot {
        StatsSnapshot::Sampled {
            samples: self.samples,
        }
    }
}

/// Symbol to layer mapping plus the per-layer totals
#[derive(Debug, Default)]
pub struct LayerStore {
    definitions: FnvHashMap<String, String>,
    totals: FnvHashMap<String, Metrics>,
}

impl LayerStore {
    pub fn new<I, K, V>(definitions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        LayerStore {
            definitions: definitions
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            totals: FnvHashMap::default(),
        }
    }

    /// Layer label for an entry name, if it belongs to one
    pub fn layer_of(&self, entry: &str) -> Option<&str> {
        self.definitions.get(entry).map(String::as_str)
    }

    /// Count one call to `entry` if it maps to a layer
    pub fn record(&mut self, entry: &str, wall_us: u64) {
        let Some(label) = self.definitions.get(entry) else {
            return;
        };
        if let Some(metrics) = self.totals.get_mut(label.as_str()) {
            metrics.record_call(wall_us);
            return;
        }
        let mut metrics = Metrics::default();
        metrics.record_call(wall_us);
        self.totals.insert(label.clone(), metrics);
    }

    pub fn totals(&self, label: &str) -> Option<&Metrics> {
        self.totals.get(label)
    }

    fn into_sorted(self) -> BTreeMap<String, Metrics> {
        self.totals.into_iter().collect()
    }
}

/// Result of a profiling session
#[derive(Debug, Clone, PartialEq)]
pub enum StatsSnapshot {
    Hierarchical {
        /// caller==>callee edge to metrics
        edges: BTreeMap<String, Metrics>,
        /// Per-layer totals, when a layer table was configured
        layers: Option<BTreeMap<String, Metrics>>,
    },
    Sampled {
        /// Sample time to rendered stack
        samples: BTreeMap<WallTime, String>,
    },
}

impl StatsSnapshot {
    pub fn is_empty(&self) -> bool {
        match self {
            StatsSnapshot::Hierarchical { edges, .. } => edges.is_empty(),
            StatsSnapshot::Sampled { samples } => samples.is_empty(),
        }
    }

    /// Metrics for an edge key (hierarchical sessions only)
    pub fn edge(&self, key: &str) -> Option<&Metrics> {
        match self {
            StatsSnapshot::Hierarchical { edges, .. } => edges.get(key),
            StatsSnapshot::Sampled { .. } => None,
        }
    }

    /// Totals for a layer label (hierarchical sessions only)
    pub fn layer(&self, label: &str) -> Option<&Metrics> {
        match self {
            StatsSnapshot::Hierarchical {
                layers: Some(layers),
                ..
            } => layers.get(label),
            _ => None,
        }
    }

    /// JSON form: edge keys to metrics with layers merged into the root
    /// entry, or `"secs.micros"` sample keys to stack strings
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        match self {
            StatsSnapshot::Hierarchical { edges, layers } => {
                for (key, metrics) in edges {
                    let value = serde_json::to_value(metrics).unwrap_or(Value::Null);
                    object.insert(key.clone(), value);
                }
                if let Some(layers) = layers {
                    if let Some(Value::Object(root)) = object.get_mut(ROOT_SYMBOL) {
                        let layers = serde_json::to_value(layers).unwrap_or(Value::Null);
                        root.insert(LAYERS_KEY.to_string(), layers);
                    }
                }
            }
            StatsSnapshot::Sampled { samples } => {
                for (at, stack) in samples {
                    object.insert(at.to_string(), Value::String(stack.clone()));
                }
            }
        }
        Value::Object(object)
    }

    /// Write a human-readable summary table
    pub fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self {
            StatsSnapshot::Hierarchical { edges, layers } => {
                write_edge_table(out, edges)?;
                if let Some(layers) = layers {
                    writeln!(out)?;
                    writeln!(out, "   calls   wall (us) layer")?;
                    writeln!(out, "-------- ----------- ----------------")?;
                    for (label, metrics) in layers {
                        writeln!(out, "{:>8} {:>11} {}", metrics.ct, metrics.wt, label)?;
                    }
                }
            }
            StatsSnapshot::Sampled { samples } => {
                if samples.is_empty() {
                    writeln!(out, "No samples recorded.")?;
                    return Ok(());
                }
                writeln!(out, "sample time       stack")?;
                writeln!(out, "----------------- ----------------")?;
                for (at, stack) in samples {
                    writeln!(out, "{:<17} {}", at.to_string(), stack)?;
                }
            }
        }
        Ok(())
    }

    /// Print the summary to stderr
    pub fn print_summary(&self) {
        let stderr = io::stderr();
        let mut handle = stderr.lock();
        // Nothing useful to do if stderr is gone
        let _ = self.write_summary(&mut handle);
    }
}

fn write_edge_table<W: Write>(out: &mut W, edges: &BTreeMap<String, Metrics>) -> io::Result<()> {
    if edges.is_empty() {
        writeln!(out, "No calls profiled.")?;
        return Ok(());
    }

    // Percentages are relative to the root call when it was recorded
    let total_us = edges
        .get(ROOT_SYMBOL)
        .map(|m| m.wt)
        .unwrap_or_else(|| edges.values().map(|m| m.wt).sum());
    let show_cpu = edges.values().any(|m| m.cpu.is_some());
    let show_memory = edges.values().any(|m| m.mu.is_some());

    let mut sorted: Vec<_> = edges.iter().collect();
    sorted.sort_by(|a, b| b.1.wt.cmp(&a.1.wt).then_with(|| a.0.cmp(b.0)));

    let mut header = String::from("% time     seconds  usecs/call     calls");
    let mut rule = String::from("------ ----------- ----------- ---------");
    if show_cpu {
        header.push_str("    cpu (us)");
        rule.push_str(" -----------");
    }
    if show_memory {
        header.push_str("    mu (bytes)   pmu (bytes)");
        rule.push_str(" ------------- -------------");
    }
    header.push_str(" edge");
    rule.push_str(" ----------------");
    writeln!(out, "{header}")?;
    writeln!(out, "{rule}")?;

    for (key, metrics) in sorted {
        let time_percent = if total_us > 0 {
            (metrics.wt as f64 / total_us as f64) * 100.0
        } else {
            0.0
        };
        let seconds = metrics.wt as f64 / 1_000_000.0;
        let usecs_per_call = if metrics.ct > 0 {
            metrics.wt / metrics.ct
        } else {
            0
        };

        let mut line = format!(
            "{:6.2} {:>11.6} {:>11} {:>9}",
            time_percent, seconds, usecs_per_call, metrics.ct
        );
        if show_cpu {
            line.push_str(&format!(" {:>11}", metrics.cpu.unwrap_or(0)));
        }
        if show_memory {
            line.push_str(&format!(
                " {:>13} {:>13}",
                metrics.mu.unwrap_or(0),
                metrics.pmu.unwrap_or(0)
            ));
        }
        writeln!(out, "{line} {key}")?;
    }

    writeln!(out, "{rule}")?;
    writeln!(
        out,
        "{:>6} {:>11.6} {:>11} {:>9} total",
        "",
        total_us as f64 / 1_000_000.0,
        "",
        edges.values().map(|m| m.ct).sum::<u64>()
    )?;
    Ok(())
}

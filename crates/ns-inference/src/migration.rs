//! Relocation of deprecated configuration keys.
//!
//! Options that used to live under the model propagator (or its sample set)
//! configuration now sit at the top level of the engine document. Each row
//! of [`MIGRATIONS`] moves one of them. Rows are applied in order, once,
//! before typed parsing.

use serde_json::{Map, Value};

/// Sub-document a legacy key is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationSource {
    /// `propagatorConfig`
    Propagator,
    /// `propagatorConfig/sampleSetConfig`
    SampleSet,
}

impl MigrationSource {
    fn pointer(self) -> &'static str {
        match self {
            MigrationSource::Propagator => "/propagatorConfig",
            MigrationSource::SampleSet => "/propagatorConfig/sampleSetConfig",
        }
    }
}

/// One relocation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    /// Where the legacy key is read from.
    pub source: MigrationSource,
    /// Legacy path, relative to the source, `/`-separated.
    pub old_path: &'static str,
    /// New path, relative to the engine document.
    pub new_path: &'static str,
    /// Shown in the deprecation warning.
    pub note: &'static str,
}

/// Relocation table.
///
/// `llhConfig` precedes `llhStatFunction` so that a legacy stat function
/// lands inside a relocated legacy block instead of shadowing it.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        source: MigrationSource::Propagator,
        old_path: "throwAsimovFitParameters",
        new_path: "throwAsimovFitParameters",
        note: "set it at the likelihood level",
    },
    Migration {
        source: MigrationSource::Propagator,
        old_path: "enableStatThrowInToys",
        new_path: "enableStatThrowInToys",
        note: "set it at the likelihood level",
    },
    Migration {
        source: MigrationSource::Propagator,
        old_path: "gaussStatThrowInToys",
        new_path: "gaussStatThrowInToys",
        note: "set it at the likelihood level",
    },
    Migration {
        source: MigrationSource::Propagator,
        old_path: "enableEventMcThrow",
        new_path: "enableEventMcThrow",
        note: "set it at the likelihood level",
    },
    Migration {
        source: MigrationSource::Propagator,
        old_path: "plotGeneratorConfig",
        new_path: "plotGeneratorConfig",
        note: "set it at the likelihood level",
    },
    Migration {
        source: MigrationSource::SampleSet,
        old_path: "plotGeneratorConfig",
        new_path: "plotGeneratorConfig",
        note: "set it at the likelihood level",
    },
    Migration {
        source: MigrationSource::SampleSet,
        old_path: "llhConfig",
        new_path: "jointProbabilityConfig",
        note: "use \"jointProbabilityConfig\"",
    },
    Migration {
        source: MigrationSource::SampleSet,
        old_path: "llhStatFunction",
        new_path: "jointProbabilityConfig/type",
        note: "use \"jointProbabilityConfig/type\"",
    },
    Migration {
        source: MigrationSource::Propagator,
        old_path: "fitSampleSetConfig/dataSetList",
        new_path: "dataSetList",
        note: "set \"dataSetList\" at the likelihood level",
    },
    Migration {
        source: MigrationSource::Propagator,
        old_path: "dataSetList",
        new_path: "dataSetList",
        note: "set \"dataSetList\" at the likelihood level",
    },
];

fn to_pointer(path: &str) -> String {
    format!("/{path}")
}

/// Write `value` at a `/`-separated path, creating intermediate objects.
///
/// Returns `false` (and writes nothing) when an intermediate node is not an object.
fn insert_at(doc: &mut Value, path: &str, value: Value) -> bool {
    let mut node = doc;
    let mut keys = path.split('/').peekable();
    while let Some(key) = keys.next() {
        let Some(map) = node.as_object_mut() else { return false };
        if keys.peek().is_none() {
            map.insert(key.to_string(), value);
            return true;
        }
        node = map.entry(key.to_string()).or_insert_with(|| Value::Object(Map::new()));
    }
    false
}

/// Apply the table to an engine document. Returns the rows that matched a legacy key.
pub fn apply_migrations(doc: &mut Value) -> Vec<&'static Migration> {
    apply_table(doc, MIGRATIONS)
}

/// Apply an arbitrary table.
pub fn apply_table(doc: &mut Value, table: &'static [Migration]) -> Vec<&'static Migration> {
    let mut applied = Vec::new();
    for row in table {
        let old_pointer = format!("{}{}", row.source.pointer(), to_pointer(row.old_path));
        let Some(legacy) = doc.pointer(&old_pointer).cloned() else { continue };
        let new_pointer = to_pointer(row.new_path);

        if doc.pointer(&new_pointer).is_some() {
            log::warn!(
                "deprecated key \"{}\" ignored: \"{}\" is already set ({})",
                &old_pointer[1..],
                row.new_path,
                row.note
            );
        } else if insert_at(doc, row.new_path, legacy) {
            log::warn!(
                "deprecated key \"{}\" relocated to \"{}\" ({})",
                &old_pointer[1..],
                row.new_path,
                row.note
            );
        } else {
            log::warn!(
                "deprecated key \"{}\" could not be relocated to \"{}\"",
                &old_pointer[1..],
                row.new_path
            );
        }
        applied.push(row);
    }
    applied
}

use crate::debugger::engine::{base_name, LineNumberRecord};
use std::collections::{BTreeSet, HashMap};

/// Line breakpoints of a session.
///
/// Breakpoints are keyed by file base name only, so `a/rules.clp:10` and `b/rules.clp:10`
/// are the same breakpoint and both files stop on it.
#[derive(Default, Debug)]
pub struct BreakpointSet {
    lines: HashMap<String, BTreeSet<u32>>,
}

impl BreakpointSet {
    /// Add a breakpoint, return `false` if it already exists.
    pub fn add(&mut self, file: &str, line: u32) -> bool {
        self.lines
            .entry(base_name(file).to_string())
            .or_default()
            .insert(line)
    }

    /// Remove a breakpoint, return `false` if there was no such breakpoint.
    pub fn remove(&mut self, file: &str, line: u32) -> bool {
        let key = base_name(file);
        let Some(lines) = self.lines.get_mut(key) else {
            return false;
        };
        let removed = lines.remove(&line);
        if lines.is_empty() {
            self.lines.remove(key);
        }
        removed
    }

    pub fn contains(&self, file: &str, line: u32) -> bool {
        self.lines
            .get(base_name(file))
            .map(|lines| lines.contains(&line))
            .unwrap_or_default()
    }

    /// Return true if execution at this place must stop.
    pub fn hit(&self, place: &LineNumberRecord) -> bool {
        self.contains(place.base_name(), place.line)
    }

    pub fn len(&self) -> usize {
        self.lines.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

pub mod code_parser;
pub mod intervals;

pub use code_parser::{CodeParser, TreeSitterSplitter};
pub use intervals::IntervalSet;

/// Top-level semantic unit recognized by a language parser
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralUnit {
    pub kind: UnitKind,
    pub name: String,
    /// 1-based, inclusive
    pub line_start: usize,
    /// 1-based, inclusive
    pub line_end: usize,
    pub docstring: Option<String>,
    pub is_async: bool,
    /// Methods of a class, in source order. Always empty for functions.
    pub methods: Vec<StructuralUnit>,
}

/// Type of structural unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Function,
    Class,
}

/// Result of structurally splitting one source file
#[derive(Debug, Clone, Default)]
pub struct Outline {
    /// Top-level units in source order with pairwise disjoint spans
    pub units: Vec<StructuralUnit>,
    pub module_docstring: Option<String>,
}

impl Outline {
    /// Lines covered by top-level units
    pub fn covered(&self) -> IntervalSet {
        let mut set = IntervalSet::new();
        for unit in &self.units {
            set.insert(unit.line_start, unit.line_end);
        }
        set
    }

    /// Lines of a `line_count`-line file not covered by any top-level unit
    pub fn residue(&self, line_count: usize) -> IntervalSet {
        self.covered().complement(1, line_count)
    }
}

/// Per-language structural splitting capability.
///
/// `None` means "unavailable": the source did not parse or the language is
/// not supported. It is an expected outcome, not an error.
pub trait StructuralSplitter: Send + Sync {
    fn language(&self) -> &'static str;
    fn split(&self, source: &str) -> Option<Outline>;
}

/// Splitter for languages without a grammar
pub struct Unavailable;

impl StructuralSplitter for Unavailable {
    fn language(&self) -> &'static str {
        "unknown"
    }

    fn split(&self, _source: &str) -> Option<Outline> {
        None
    }
}

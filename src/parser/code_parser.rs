use super::{Outline, StructuralSplitter, StructuralUnit, UnitKind, Unavailable};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tree_sitter::{Language, Node, Parser};

/// Node kinds that make up the structure of one grammar
struct LanguageRules {
    name: &'static str,
    functions: &'static [&'static str],
    classes: &'static [&'static str],
    methods: &'static [&'static str],
    /// (wrapper kind, field holding the wrapped definition): decorators, exports
    wrappers: &'static [(&'static str, &'static str)],
    /// Containers whose members are treated as top-level units
    namespaces: &'static [&'static str],
    docstrings: bool,
}

const PYTHON: LanguageRules = LanguageRules {
    name: "python",
    functions: &["function_definition"],
    classes: &["class_definition"],
    methods: &["function_definition"],
    wrappers: &[("decorated_definition", "definition")],
    namespaces: &[],
    docstrings: true,
};

const RUST: LanguageRules = LanguageRules {
    name: "rust",
    functions: &["function_item"],
    classes: &["impl_item", "trait_item", "struct_item", "enum_item"],
    methods: &["function_item", "function_signature_item"],
    wrappers: &[],
    namespaces: &["mod_item"],
    docstrings: false,
};

const JAVASCRIPT: LanguageRules = LanguageRules {
    name: "javascript",
    functions: &["function_declaration", "generator_function_declaration"],
    classes: &["class_declaration"],
    methods: &["method_definition"],
    wrappers: &[("export_statement", "declaration")],
    namespaces: &[],
    docstrings: false,
};

const TYPESCRIPT: LanguageRules = LanguageRules {
    name: "typescript",
    functions: &["function_declaration", "generator_function_declaration"],
    classes: &[
        "class_declaration",
        "abstract_class_declaration",
        "interface_declaration",
    ],
    methods: &["method_definition", "method_signature", "abstract_method_signature"],
    wrappers: &[("export_statement", "declaration")],
    namespaces: &[],
    docstrings: false,
};

const GO: LanguageRules = LanguageRules {
    name: "go",
    functions: &["function_declaration", "method_declaration"],
    classes: &["type_declaration"],
    methods: &[],
    wrappers: &[],
    namespaces: &[],
    docstrings: false,
};

const JAVA: LanguageRules = LanguageRules {
    name: "java",
    functions: &[],
    classes: &[
        "class_declaration",
        "interface_declaration",
        "enum_declaration",
        "record_declaration",
    ],
    methods: &["method_declaration", "constructor_declaration"],
    wrappers: &[],
    namespaces: &[],
    docstrings: false,
};

const CPP: LanguageRules = LanguageRules {
    name: "cpp",
    functions: &["function_definition"],
    classes: &["class_specifier", "struct_specifier"],
    methods: &["function_definition"],
    wrappers: &[],
    namespaces: &["namespace_definition"],
    docstrings: false,
};

const CSHARP: LanguageRules = LanguageRules {
    name: "csharp",
    functions: &[],
    classes: &[
        "class_declaration",
        "interface_declaration",
        "struct_declaration",
        "record_declaration",
    ],
    methods: &["method_declaration", "constructor_declaration"],
    wrappers: &[],
    namespaces: &["namespace_declaration"],
    docstrings: false,
};

/// Tree-sitter backed structural splitter for one language
pub struct TreeSitterSplitter {
    language: Language,
    rules: &'static LanguageRules,
}

impl TreeSitterSplitter {
    fn new(language: Language, rules: &'static LanguageRules) -> Self {
        Self { language, rules }
    }

    fn collect_units(&self, container: Node, source: &str, units: &mut Vec<StructuralUnit>) {
        let mut cursor = container.walk();
        for child in container.named_children(&mut cursor) {
            if self.rules.namespaces.contains(&child.kind()) {
                if let Some(body) = child.child_by_field_name("body") {
                    self.collect_units(body, source, units);
                }
                continue;
            }

            if let Some(unit) = self.unit_from(child, source) {
                push_disjoint(units, unit);
            }
        }
    }

    fn unit_from(&self, node: Node, source: &str) -> Option<StructuralUnit> {
        let def = self.unwrap_definition(node)?;
        let kind = if self.rules.functions.contains(&def.kind()) {
            UnitKind::Function
        } else if self.rules.classes.contains(&def.kind()) {
            UnitKind::Class
        } else {
            return None;
        };

        // The wrapper (decorators, `export`) belongs to the unit's span
        let (line_start, line_end) = line_span(node);
        let methods = match kind {
            UnitKind::Class => self.methods_of(def, source),
            UnitKind::Function => Vec::new(),
        };

        Some(StructuralUnit {
            kind,
            name: symbol_name(def, source),
            line_start,
            line_end,
            docstring: self.docstring(def, source),
            is_async: is_async(def, source),
            methods,
        })
    }

    fn methods_of(&self, class: Node, source: &str) -> Vec<StructuralUnit> {
        let mut methods = Vec::new();
        let Some(body) = class.child_by_field_name("body") else {
            return methods;
        };

        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            let Some(def) = self.unwrap_definition(child) else {
                continue;
            };
            if !self.rules.methods.contains(&def.kind()) {
                continue;
            }
            let (line_start, line_end) = line_span(child);
            push_disjoint(
                &mut methods,
                StructuralUnit {
                    kind: UnitKind::Function,
                    name: symbol_name(def, source),
                    line_start,
                    line_end,
                    docstring: self.docstring(def, source),
                    is_async: is_async(def, source),
                    methods: Vec::new(),
                },
            );
        }
        methods
    }

    fn unwrap_definition<'t>(&self, node: Node<'t>) -> Option<Node<'t>> {
        match self.rules.wrappers.iter().find(|(kind, _)| *kind == node.kind()) {
            Some((_, field)) => node
                .child_by_field_name(field)
                .and_then(|inner| self.unwrap_definition(inner)),
            None => Some(node),
        }
    }

    fn docstring(&self, def: Node, source: &str) -> Option<String> {
        if !self.rules.docstrings {
            return None;
        }
        leading_string(def.child_by_field_name("body")?, source)
    }
}

impl StructuralSplitter for TreeSitterSplitter {
    fn language(&self) -> &'static str {
        self.rules.name
    }

    fn split(&self, source: &str) -> Option<Outline> {
        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(self.language) {
            tracing::warn!("Failed to set {} language: {}", self.rules.name, e);
            return None;
        }

        let tree = parser.parse(source, None)?;
        let root = tree.root_node();
        if root.has_error() {
            tracing::debug!("{} source has syntax errors, structure unavailable", self.rules.name);
            return None;
        }

        let mut units = Vec::new();
        self.collect_units(root, source, &mut units);

        let module_docstring = if self.rules.docstrings {
            leading_string(root, source)
        } else {
            None
        };

        Some(Outline {
            units,
            module_docstring,
        })
    }
}

/// Registry of structural splitters keyed by file extension
pub struct CodeParser {
    splitters: HashMap<String, Arc<dyn StructuralSplitter>>,
    unavailable: Arc<dyn StructuralSplitter>,
}

impl CodeParser {
    pub fn new() -> Self {
        let python: Arc<dyn StructuralSplitter> =
            Arc::new(TreeSitterSplitter::new(tree_sitter_python::language(), &PYTHON));
        let rust: Arc<dyn StructuralSplitter> =
            Arc::new(TreeSitterSplitter::new(tree_sitter_rust::language(), &RUST));
        let javascript: Arc<dyn StructuralSplitter> = Arc::new(TreeSitterSplitter::new(
            tree_sitter_javascript::language(),
            &JAVASCRIPT,
        ));
        let typescript: Arc<dyn StructuralSplitter> = Arc::new(TreeSitterSplitter::new(
            tree_sitter_typescript::language_typescript(),
            &TYPESCRIPT,
        ));
        let tsx: Arc<dyn StructuralSplitter> = Arc::new(TreeSitterSplitter::new(
            tree_sitter_typescript::language_tsx(),
            &TYPESCRIPT,
        ));
        let go: Arc<dyn StructuralSplitter> =
            Arc::new(TreeSitterSplitter::new(tree_sitter_go::language(), &GO));
        let java: Arc<dyn StructuralSplitter> =
            Arc::new(TreeSitterSplitter::new(tree_sitter_java::language(), &JAVA));
        let cpp: Arc<dyn StructuralSplitter> =
            Arc::new(TreeSitterSplitter::new(tree_sitter_cpp::language(), &CPP));
        let csharp: Arc<dyn StructuralSplitter> = Arc::new(TreeSitterSplitter::new(
            tree_sitter_c_sharp::language(),
            &CSHARP,
        ));

        let mut splitters = HashMap::new();
        splitters.insert("py".to_string(), python);
        splitters.insert("rs".to_string(), rust);
        splitters.insert("js".to_string(), javascript.clone());
        splitters.insert("jsx".to_string(), javascript.clone());
        splitters.insert("mjs".to_string(), javascript);
        splitters.insert("ts".to_string(), typescript);
        splitters.insert("tsx".to_string(), tsx);
        splitters.insert("go".to_string(), go);
        splitters.insert("java".to_string(), java);
        splitters.insert("cpp".to_string(), cpp.clone());
        splitters.insert("cc".to_string(), cpp.clone());
        splitters.insert("hpp".to_string(), cpp);
        splitters.insert("cs".to_string(), csharp);

        Self {
            splitters,
            unavailable: Arc::new(Unavailable),
        }
    }

    /// Splitter for a path, falling back to one that is always unavailable
    pub fn splitter_for(&self, file_path: &Path) -> &dyn StructuralSplitter {
        extension_of(file_path)
            .and_then(|ext| self.splitters.get(&ext))
            .unwrap_or(&self.unavailable)
            .as_ref()
    }

    pub fn supports(&self, file_path: &Path) -> bool {
        extension_of(file_path).map_or(false, |ext| self.splitters.contains_key(&ext))
    }

    /// Structurally split `source`, or `None` when unavailable
    pub fn split(&self, file_path: &Path, source: &str) -> Option<Outline> {
        self.splitter_for(file_path).split(source)
    }
}

impl Default for CodeParser {
    fn default() -> Self {
        Self::new()
    }
}

fn extension_of(file_path: &Path) -> Option<String> {
    file_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// 1-based inclusive line span. A node ending at column 0 ends on the previous line.
fn line_span(node: Node) -> (usize, usize) {
    let start = node.start_position().row + 1;
    let end_position = node.end_position();
    let mut end = end_position.row + 1;
    if end_position.column == 0 && end > start {
        end -= 1;
    }
    (start, end)
}

/// Keeps spans pairwise disjoint: a unit starting inside the previous one is folded into it
fn push_disjoint(units: &mut Vec<StructuralUnit>, unit: StructuralUnit) {
    if let Some(last) = units.last_mut() {
        if unit.line_start <= last.line_end {
            last.line_end = last.line_end.max(unit.line_end);
            return;
        }
    }
    units.push(unit);
}

fn node_text<'s>(node: Node, source: &'s str) -> &'s str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

fn symbol_name(node: Node, source: &str) -> String {
    if let Some(name) = node.child_by_field_name("name") {
        return node_text(name, source).to_string();
    }

    // impl blocks: `impl Trait for Type`
    if let Some(ty) = node.child_by_field_name("type") {
        return match node.child_by_field_name("trait") {
            Some(tr) => format!("{} for {}", node_text(tr, source), node_text(ty, source)),
            None => node_text(ty, source).to_string(),
        };
    }

    // C-family functions name themselves through nested declarators
    if let Some(mut declarator) = node.child_by_field_name("declarator") {
        while let Some(inner) = declarator.child_by_field_name("declarator") {
            declarator = inner;
        }
        return node_text(declarator, source).to_string();
    }

    // Try to find identifier child
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind().contains("identifier") || child.kind().contains("name") {
            return node_text(child, source).to_string();
        }
        if let Some(name) = child.child_by_field_name("name") {
            return node_text(name, source).to_string();
        }
    }

    "anonymous".to_string()
}

fn is_async(node: Node, source: &str) -> bool {
    let head_end = node
        .child_by_field_name("name")
        .map_or(node.start_byte(), |name| name.start_byte());
    source
        .get(node.start_byte()..head_end)
        .map_or(false, |head| head.split_whitespace().any(|word| word == "async"))
}

/// String literal opening a block or module, i.e. a Python docstring
fn leading_string(block: Node, source: &str) -> Option<String> {
    let mut cursor = block.walk();
    let first = block
        .named_children(&mut cursor)
        .find(|child| child.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0)?;
    if literal.kind() != "string" {
        return None;
    }
    Some(clean_docstring(strip_quotes(node_text(literal, source))))
}

fn strip_quotes(literal: &str) -> &str {
    let body = literal.trim_start_matches(|c: char| "rRbBuUfF".contains(c));
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if body.len() >= 2 * quote.len() && body.starts_with(quote) && body.ends_with(quote) {
            return &body[quote.len()..body.len() - quote.len()];
        }
    }
    body
}

/// Dedent continuation lines and trim surrounding blank lines
fn clean_docstring(raw: &str) -> String {
    let mut lines = raw.lines();
    let first = lines.next().unwrap_or("").trim().to_string();
    let rest: Vec<&str> = lines.collect();
    let indent = rest
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned = vec![first];
    cleaned.extend(
        rest.iter()
            .map(|line| line.get(indent..).unwrap_or("").trim_end().to_string()),
    );
    cleaned.join("\n").trim().to_string()
}

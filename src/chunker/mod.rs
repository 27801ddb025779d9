mod sliding;

use crate::error::{Error, Result};
use crate::parser::{CodeParser, Outline, StructuralUnit, UnitKind};
use crate::source;
use crate::tokenizer::count_tokens;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// String-keyed, string-valued metadata stored next to each vector
pub type Metadata = BTreeMap<String, String>;

/// A contiguous, labeled slice of one source file
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub file_path: String,
    pub chunk_type: ChunkType,
    pub name: String,
    /// 1-based, inclusive
    pub line_start: usize,
    /// 1-based, inclusive
    pub line_end: usize,
    /// Caller-supplied metadata (origin repository, language, ...)
    pub extra: Metadata,
}

impl Chunk {
    pub fn new(
        content: String,
        file_path: &str,
        chunk_type: ChunkType,
        name: String,
        line_start: usize,
        line_end: usize,
    ) -> Self {
        Self {
            content,
            file_path: file_path.to_string(),
            chunk_type,
            name,
            line_start,
            line_end,
            extra: Metadata::new(),
        }
    }

    /// Attach a metadata entry after creation
    pub fn attach(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extra.insert(key.into(), value.into());
    }

    /// Flattened metadata as handed to the vector store
    pub fn metadata(&self) -> Metadata {
        let mut metadata = self.extra.clone();
        metadata.insert("file_path".to_string(), self.file_path.clone());
        metadata.insert("chunk_type".to_string(), self.chunk_type.as_str().to_string());
        metadata.insert("name".to_string(), self.name.clone());
        metadata.insert("line_start".to_string(), self.line_start.to_string());
        metadata.insert("line_end".to_string(), self.line_end.to_string());
        metadata
    }
}

/// Type of chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    File,
    Module,
    Class,
    ClassHeader,
    Method,
    Function,
    Sliding,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::File => "file",
            ChunkType::Module => "module",
            ChunkType::Class => "class",
            ChunkType::ClassHeader => "class_header",
            ChunkType::Method => "method",
            ChunkType::Function => "function",
            ChunkType::Sliding => "sliding",
        }
    }
}

impl FromStr for ChunkType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(ChunkType::File),
            "module" => Ok(ChunkType::Module),
            "class" => Ok(ChunkType::Class),
            "class_header" => Ok(ChunkType::ClassHeader),
            "method" => Ok(ChunkType::Method),
            "function" => Ok(ChunkType::Function),
            "sliding" => Ok(ChunkType::Sliding),
            other => Err(Error::UnknownChunkType(other.to_string())),
        }
    }
}

/// How a file is cut into chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkStrategy {
    /// Whole file as one chunk, whatever its size
    File,
    /// Top-level functions and classes
    #[default]
    Function,
    /// Like `Function`, but oversized classes are split per method
    Class,
    /// Size-based only: whole file if it fits, sliding windows otherwise
    Sliding,
}

impl ChunkStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStrategy::File => "file",
            ChunkStrategy::Function => "function",
            ChunkStrategy::Class => "class",
            ChunkStrategy::Sliding => "sliding",
        }
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(ChunkStrategy::File),
            "function" => Ok(ChunkStrategy::Function),
            "class" => Ok(ChunkStrategy::Class),
            "sliding" => Ok(ChunkStrategy::Sliding),
            _ => Err(Error::UnknownStrategy(s.to_string())),
        }
    }
}

/// Chunking parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkingConfig {
    pub strategy: ChunkStrategy,
    pub max_chunk_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Function,
            max_chunk_tokens: 1000,
            overlap_tokens: 100,
        }
    }
}

/// Splits source files into token-bounded chunks
pub struct Chunker {
    parser: CodeParser,
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            parser: CodeParser::new(),
            config,
        }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Chunk a file with the configured strategy and budgets
    pub fn chunk_file(&self, file_path: &Path) -> Result<Vec<Chunk>> {
        self.chunk(
            file_path,
            self.config.strategy,
            self.config.max_chunk_tokens,
            self.config.overlap_tokens,
        )
    }

    /// Chunk a file.
    ///
    /// An unreadable or empty file yields an empty list; callers doing bulk
    /// work should count it as skipped and move on. Only a zero budget is an
    /// error.
    pub fn chunk(
        &self,
        file_path: &Path,
        strategy: ChunkStrategy,
        max_chunk_tokens: usize,
        overlap_tokens: usize,
    ) -> Result<Vec<Chunk>> {
        if max_chunk_tokens == 0 {
            return Err(Error::invalid_budget("max_chunk_tokens"));
        }
        let Some(content) = source::read_text(file_path) else {
            return Ok(Vec::new());
        };
        self.chunk_source(file_path, &content, strategy, max_chunk_tokens, overlap_tokens)
    }

    /// Chunk already loaded source text; `file_path` selects the language
    pub fn chunk_source(
        &self,
        file_path: &Path,
        content: &str,
        strategy: ChunkStrategy,
        max_chunk_tokens: usize,
        overlap_tokens: usize,
    ) -> Result<Vec<Chunk>> {
        if max_chunk_tokens == 0 {
            return Err(Error::invalid_budget("max_chunk_tokens"));
        }
        if content.is_empty() {
            return Ok(Vec::new());
        }

        let path = file_path.to_string_lossy().to_string();
        let lines: Vec<&str> = content.lines().collect();

        match strategy {
            ChunkStrategy::File => return Ok(vec![file_chunk(&path, file_path, content, &lines)]),
            ChunkStrategy::Function | ChunkStrategy::Class => {
                if let Some(outline) = self.parser.split(file_path, content) {
                    if !outline.units.is_empty() {
                        return Ok(structural_chunks(
                            &path,
                            file_path,
                            &lines,
                            &outline,
                            strategy,
                            max_chunk_tokens,
                        ));
                    }
                }
                let reason = if self.parser.supports(file_path) {
                    "no structural units"
                } else {
                    "no parser for this language"
                };
                tracing::debug!("{}: {}, using size-based chunking", path, reason);
            }
            ChunkStrategy::Sliding => {}
        }

        if count_tokens(content) <= max_chunk_tokens {
            return Ok(vec![file_chunk(&path, file_path, content, &lines)]);
        }
        Ok(sliding::sliding_chunks(
            &path,
            &file_name(file_path),
            &lines,
            max_chunk_tokens,
            overlap_tokens,
        ))
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

fn file_name(file_path: &Path) -> String {
    file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn file_chunk(path: &str, file_path: &Path, content: &str, lines: &[&str]) -> Chunk {
    Chunk::new(
        content.to_string(),
        path,
        ChunkType::File,
        file_name(file_path),
        1,
        lines.len().max(1),
    )
}

/// Lines `start..=end` (1-based) joined back together
fn join_lines(lines: &[&str], start: usize, end: usize) -> String {
    let end = end.min(lines.len());
    lines
        .get(start.saturating_sub(1)..end)
        .map(|slice| slice.join("\n"))
        .unwrap_or_default()
}

fn structural_chunks(
    path: &str,
    file_path: &Path,
    lines: &[&str],
    outline: &Outline,
    strategy: ChunkStrategy,
    max_chunk_tokens: usize,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for unit in &outline.units {
        let content = join_lines(lines, unit.line_start, unit.line_end);

        if strategy == ChunkStrategy::Class
            && unit.kind == UnitKind::Class
            && count_tokens(&content) > max_chunk_tokens
        {
            chunks.extend(split_class(path, unit, lines));
            continue;
        }

        let chunk_type = match unit.kind {
            UnitKind::Function => ChunkType::Function,
            UnitKind::Class => ChunkType::Class,
        };
        let mut chunk = Chunk::new(
            content,
            path,
            chunk_type,
            unit.name.clone(),
            unit.line_start,
            unit.line_end,
        );
        if let Some(doc) = &unit.docstring {
            chunk.attach("docstring", doc.as_str());
        }
        if unit.is_async {
            chunk.attach("is_async", "true");
        }
        chunks.push(chunk);
    }

    if let Some(module) = module_chunk(path, file_path, lines, outline) {
        chunks.insert(0, module);
    }

    tracing::debug!("{}: {} structural chunks", path, chunks.len());
    chunks
}

/// Header (signature plus lines before the first method) and one chunk per method
fn split_class(path: &str, class: &StructuralUnit, lines: &[&str]) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    let header_end = class
        .methods
        .first()
        .map_or(class.line_end, |method| method.line_start - 1);
    if header_end >= class.line_start {
        let mut header = Chunk::new(
            join_lines(lines, class.line_start, header_end),
            path,
            ChunkType::ClassHeader,
            class.name.clone(),
            class.line_start,
            header_end,
        );
        if let Some(doc) = &class.docstring {
            header.attach("docstring", doc.as_str());
        }
        chunks.push(header);
    }

    for method in &class.methods {
        chunks.push(Chunk::new(
            join_lines(lines, method.line_start, method.line_end),
            path,
            ChunkType::Method,
            format!("{}.{}", class.name, method.name),
            method.line_start,
            method.line_end,
        ));
    }

    chunks
}

/// Lines outside every top-level unit (imports, top-level statements)
fn module_chunk(path: &str, file_path: &Path, lines: &[&str], outline: &Outline) -> Option<Chunk> {
    let residue = outline.residue(lines.len());
    let residue_lines: Vec<(usize, &str)> = residue
        .iter()
        .filter_map(|n| lines.get(n - 1).map(|line| (n, *line)))
        .collect();

    let content = residue_lines
        .iter()
        .map(|(_, line)| *line)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    if content.is_empty() {
        return None;
    }

    let mut non_blank = residue_lines
        .iter()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, _)| *n);
    let line_start = non_blank.next()?;
    let line_end = non_blank.last().unwrap_or(line_start);

    let stem = file_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut chunk = Chunk::new(
        content,
        path,
        ChunkType::Module,
        format!("{} (module)", stem),
        line_start,
        line_end,
    );
    if let Some(doc) = &outline.module_docstring {
        chunk.attach("docstring", doc.as_str());
    }
    Some(chunk)
}

//! Source-format detection and chunking.
//!
//! Turns raw bytes into [`Chunk`]s: bounded-size content plus whatever
//! provenance the format carries. Embedding and record assembly happen in
//! the parent module.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{MemoryError, Result};

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Text,
    Json,
    Jsonl,
    Csv,
    ChatExport,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Jsonl => "jsonl",
            Self::Csv => "csv",
            Self::ChatExport => "chat_export",
        }
    }

    /// Resolve from an explicit hint, falling back to the file extension.
    /// Anything unrecognized is treated as plain text.
    pub fn detect(name: &str, hint: Option<&str>) -> Result<Self> {
        if let Some(hint) = hint {
            return hint.parse();
        }
        let ext = Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        Ok(match ext.as_str() {
            "json" => Self::Json,
            "jsonl" | "ndjson" => Self::Jsonl,
            "csv" => Self::Csv,
            _ => Self::Text,
        })
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceFormat {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" | "md" | "markdown" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "jsonl" | "ndjson" => Ok(Self::Jsonl),
            "csv" => Ok(Self::Csv),
            "chat" | "chat_export" | "chatgpt" => Ok(Self::ChatExport),
            other => Err(MemoryError::Configuration(format!(
                "unknown source format: {other}. Supported: text, json, jsonl, csv, chat_export"
            ))),
        }
    }
}

/// Chunking knobs.
#[derive(Debug, Clone)]
pub struct ChunkParams {
    /// Characters per plain-text chunk.
    pub chunk_size: usize,
    /// Plain-text chunks shorter than this are dropped when `filter_short` is set.
    pub min_chunk_len: usize,
    pub filter_short: bool,
    /// Structured items larger than this many bytes are split.
    pub max_chunk_bytes: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            min_chunk_len: 50,
            filter_short: true,
            max_chunk_bytes: 30_000,
        }
    }
}

/// One unit of content before embedding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    pub content: String,
    /// Per-item source from the data (e.g. a JSONL line's `"source"`).
    pub source: Option<String>,
    /// Source-provided Unix timestamp.
    pub timestamp: Option<f64>,
    pub tags: Vec<String>,
    /// Added to the heuristic importance score.
    pub importance_boost: f64,
    /// Provenance and preserved free-form fields.
    pub fields: Map<String, Value>,
}

/// Result of parsing one source.
#[derive(Debug, Default)]
pub struct Parsed {
    /// The format actually used (a `.json` file may turn out to be a chat export).
    pub format: Option<SourceFormat>,
    pub chunks: Vec<Chunk>,
    /// JSONL lines that failed to parse.
    pub lines_skipped: usize,
}

/// Fields lifted out of structured items rather than preserved verbatim.
const RESERVED_FIELDS: &[&str] = &["content", "text", "source", "timestamp", "tags", "importance", "uid"];

/// Parse `bytes` as `format` into chunks. A file that cannot be parsed as a
/// whole fails with [`MemoryError::MalformedInput`].
pub fn parse(bytes: &[u8], format: SourceFormat, params: &ChunkParams) -> Result<Parsed> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| MemoryError::MalformedInput(format!("source is not valid UTF-8: {e}")))?;

    match format {
        SourceFormat::Text => Ok(Parsed {
            format: Some(SourceFormat::Text),
            chunks: chunk_text(text, params),
            lines_skipped: 0,
        }),
        SourceFormat::Jsonl => Ok(chunk_jsonl(text, params)),
        SourceFormat::Csv => Ok(Parsed {
            format: Some(SourceFormat::Csv),
            chunks: chunk_csv(bytes)?,
            lines_skipped: 0,
        }),
        SourceFormat::Json | SourceFormat::ChatExport => {
            let value: Value = serde_json::from_str(text)
                .map_err(|e| MemoryError::MalformedInput(format!("invalid JSON: {e}")))?;
            if format == SourceFormat::ChatExport || is_chat_export(&value) {
                let chunks = chunk_chat_export(&value, params)?;
                return Ok(Parsed {
                    format: Some(SourceFormat::ChatExport),
                    chunks,
                    lines_skipped: 0,
                });
            }
            Ok(Parsed {
                format: Some(SourceFormat::Json),
                chunks: chunk_json(&value, params)?,
                lines_skipped: 0,
            })
        }
    }
}

// ── Splitting primitives ─────────────────────────────────────────────────────

/// Split into pieces of at most `size` characters. Never splits a character.
pub fn split_chars(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (i, _) in text.char_indices() {
        if count == size {
            pieces.push(&text[start..i]);
            start = i;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Split into pieces of at most `max_bytes` bytes on character boundaries.
pub fn split_bytes(text: &str, max_bytes: usize) -> Vec<&str> {
    let max_bytes = max_bytes.max(4);
    let mut pieces = Vec::new();
    let mut rest = text;
    while rest.len() > max_bytes {
        let mut cut = max_bytes;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        pieces.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

// ── Plain text ───────────────────────────────────────────────────────────────

fn chunk_text(text: &str, params: &ChunkParams) -> Vec<Chunk> {
    split_chars(text, params.chunk_size)
        .into_iter()
        .filter(|piece| !piece.trim().is_empty())
        .filter(|piece| !params.filter_short || piece.chars().count() >= params.min_chunk_len)
        .map(|piece| Chunk {
            content: piece.to_string(),
            ..Default::default()
        })
        .collect()
}

// ── JSON / JSONL ─────────────────────────────────────────────────────────────

/// Render a value as chunk text: strings verbatim, `{"content"|"text": ..}`
/// objects by that field, anything else as compact JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => match text_field(map) {
            Some(text) => text.to_string(),
            None => value.to_string(),
        },
        other => other.to_string(),
    }
}

fn text_field(map: &Map<String, Value>) -> Option<&str> {
    map.get("content")
        .or_else(|| map.get("text"))
        .and_then(Value::as_str)
}

/// Build chunks for one structured item, lifting `source`, `timestamp`, and
/// `tags` and preserving other scalar fields when the item carries its own text.
fn item_chunks(value: &Value, provenance: (&str, Value), params: &ChunkParams) -> Vec<Chunk> {
    let rendered = render(value);
    if rendered.trim().is_empty() {
        return Vec::new();
    }

    let mut template = Chunk::default();
    template
        .fields
        .insert(provenance.0.to_string(), provenance.1);

    if let Value::Object(map) = value {
        template.source = map.get("source").and_then(Value::as_str).map(str::to_string);
        template.timestamp = map.get("timestamp").and_then(Value::as_f64);
        if let Some(Value::Array(tags)) = map.get("tags") {
            template.tags = tags
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
        if text_field(map).is_some() {
            for (k, v) in map {
                if !RESERVED_FIELDS.contains(&k.as_str()) && !v.is_object() && !v.is_array() {
                    template.fields.insert(k.clone(), v.clone());
                }
            }
        }
    }

    let pieces = split_bytes(&rendered, params.max_chunk_bytes);
    let parts = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(part, piece)| {
            let mut chunk = template.clone();
            chunk.content = piece.to_string();
            if parts > 1 {
                chunk.fields.insert("sub_chunk".into(), part.into());
                chunk.tags.push("sub_chunked".into());
            }
            chunk
        })
        .collect()
}

fn chunk_json(value: &Value, params: &ChunkParams) -> Result<Vec<Chunk>> {
    match value {
        Value::Array(items) => Ok(items
            .iter()
            .enumerate()
            .flat_map(|(i, item)| item_chunks(item, ("item_index", i.into()), params))
            .collect()),
        Value::Object(map) => Ok(map
            .iter()
            .flat_map(|(key, v)| {
                let line = Value::String(format!("{key}: {}", render(v)));
                item_chunks(&line, ("key", key.clone().into()), params)
            })
            .collect()),
        other => {
            let rendered = render(other);
            Ok(item_chunks(&Value::String(rendered), ("item_index", 0.into()), params))
        }
    }
}

fn chunk_jsonl(text: &str, params: &ChunkParams) -> Parsed {
    let mut parsed = Parsed {
        format: Some(SourceFormat::Jsonl),
        ..Default::default()
    };
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => parsed
                .chunks
                .extend(item_chunks(&value, ("line_number", (i + 1).into()), params)),
            Err(e) => {
                tracing::warn!(line = i + 1, error = %e, "skipping malformed JSONL line");
                parsed.lines_skipped += 1;
            }
        }
    }
    parsed
}

// ── CSV ──────────────────────────────────────────────────────────────────────

fn chunk_csv(bytes: &[u8]) -> Result<Vec<Chunk>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| MemoryError::MalformedInput(format!("invalid CSV header: {e}")))?
        .clone();

    let mut chunks = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| MemoryError::MalformedInput(format!("invalid CSV row {row}: {e}")))?;
        let content = headers
            .iter()
            .zip(record.iter())
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(column, value)| format!("{column}: {value}"))
            .collect::<Vec<_>>()
            .join(", ");
        if content.is_empty() {
            continue;
        }
        let mut chunk = Chunk {
            content,
            ..Default::default()
        };
        chunk.fields.insert("row_index".into(), row.into());
        chunks.push(chunk);
    }
    Ok(chunks)
}

// ── Chat export ──────────────────────────────────────────────────────────────

/// A chat export is a conversation object, or an array of them, carrying a
/// `mapping` of message nodes.
pub fn is_chat_export(value: &Value) -> bool {
    let has_mapping = |v: &Value| v.get("mapping").is_some_and(Value::is_object);
    match value {
        Value::Array(items) => items.first().is_some_and(has_mapping),
        Value::Object(_) => has_mapping(value),
        _ => false,
    }
}

struct ChatMessage {
    role: String,
    text: String,
    create_time: Option<f64>,
    node_id: String,
}

fn chunk_chat_export(value: &Value, params: &ChunkParams) -> Result<Vec<Chunk>> {
    let conversations: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![value],
        _ => {
            return Err(MemoryError::MalformedInput(
                "chat export must be an object or array of conversations".into(),
            ))
        }
    };

    let mut chunks = Vec::new();
    for (conv_index, conversation) in conversations.into_iter().enumerate() {
        let Some(mapping) = conversation.get("mapping").and_then(Value::as_object) else {
            return Err(MemoryError::MalformedInput(format!(
                "conversation {conv_index} has no mapping"
            )));
        };
        let title = conversation
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Untitled")
            .to_string();
        let conversation_id = conversation
            .get("conversation_id")
            .or_else(|| conversation.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("conversation-{conv_index}"));

        let mut messages: Vec<ChatMessage> = mapping
            .iter()
            .filter_map(|(node_id, node)| chat_message(node_id, node))
            .collect();
        messages.sort_by(|a, b| match (a.create_time, b.create_time) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        for (message_index, message) in messages.into_iter().enumerate() {
            for piece in split_bytes(&message.text, params.max_chunk_bytes) {
                let mut chunk = Chunk {
                    content: piece.to_string(),
                    timestamp: message.create_time,
                    tags: vec![
                        format!("role:{}", message.role),
                        format!("conversation:{conversation_id}"),
                        title.clone(),
                    ],
                    importance_boost: super::importance::CHAT_BOOST,
                    ..Default::default()
                };
                chunk.fields.insert("conversation_id".into(), conversation_id.clone().into());
                chunk.fields.insert("conversation_title".into(), title.clone().into());
                chunk.fields.insert("role".into(), message.role.clone().into());
                chunk.fields.insert("message_index".into(), message_index.into());
                chunk.fields.insert("message_id".into(), message.node_id.clone().into());
                chunks.push(chunk);
            }
        }
    }
    Ok(chunks)
}

fn chat_message(node_id: &str, node: &Value) -> Option<ChatMessage> {
    let message = node.get("message").filter(|m| !m.is_null())?;
    let role = message
        .pointer("/author/role")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let parts = message.pointer("/content/parts").and_then(Value::as_array)?;
    let text = parts
        .iter()
        .filter_map(Value::as_str)
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if text.trim().is_empty() {
        return None;
    }
    Some(ChatMessage {
        role,
        text,
        create_time: message.get("create_time").and_then(Value::as_f64),
        node_id: node_id.to_string(),
    })
}

//! Header-aware markdown chunking.
//!
//! Walks a document's lines tracking the most recent h1/h2/h3 to produce
//! header-tagged sections, packs each section's lines into raw chunks
//! against a soft token limit (code fences are kept atomic unless they
//! blow past twice the hard limit), merges any chunk left too small,
//! splits anything still too large, then adds a small head-of-chunk
//! overlap before combining headers and text into the final embeddable
//! string.

use kollektiv_core::models::{Chunk, ChunkHeaders, Document};
use kollektiv_core::tokenizer;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use uuid::Uuid;

/// Tunables for [`MarkdownChunker`].
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Hard ceiling on a single chunk's token count.
    pub max_tokens: u32,
    /// Raw chunking flushes a section once its running total crosses this.
    pub soft_token_limit: u32,
    /// Chunks below this are folded into a neighbor during adjustment.
    pub min_chunk_size: u32,
    /// Fraction of `max_tokens` used to size the overlap carried into the
    /// next chunk, before clamping.
    pub overlap_percentage: f64,
    pub min_overlap_tokens: u32,
    pub max_overlap_tokens: u32,
    /// Batch sizes used by the worker pipeline when it calls this
    /// crate in bulk.
    pub document_batch_size: usize,
    pub chunk_batch_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            soft_token_limit: 400,
            min_chunk_size: 100,
            overlap_percentage: 0.05,
            min_overlap_tokens: 50,
            max_overlap_tokens: 100,
            document_batch_size: 50,
            chunk_batch_size: 500,
        }
    }
}

static HEADER_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,3})\s*(.*)$").unwrap());
static CODE_FENCE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(```|~~~).*$").unwrap());
static INLINE_CODE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").unwrap());
static IMAGE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
static BLANK_RUN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

static BOILERPLATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(
        r"(?:^\s*Search\.\.\.\s*$)|(?:^\s*Ctrl\s*K\s*$)|(?:^\s*Search\s*$)|(?:^\s*English\s*$)|(?:^\s*On this page\s*$)|(?:^\s*\*\s*\*\s*\*\s*$)|(?:^\s*Navigation\s*$)|(?:^\s*\[.*\]\(/.*\)\s*$)",
    )
    .multi_line(true)
    .build()
    .unwrap()
});

/// A header-tagged run of markdown lines identified before chunking.
#[derive(Debug, Clone)]
struct Section {
    headers: ChunkHeaders,
    content: String,
}

/// A chunk still under construction: headers plus raw, uncombined text.
#[derive(Debug, Clone)]
struct RawChunk {
    headers: ChunkHeaders,
    text: String,
}

pub struct MarkdownChunker {
    config: ChunkerConfig,
}

impl Default for MarkdownChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownChunker {
    pub fn new() -> Self {
        Self::with_config(ChunkerConfig::default())
    }

    pub fn with_config(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `documents` into batches of [`ChunkerConfig::document_batch_size`],
    /// the unit the worker pipeline loads and chunks at a time.
    pub fn batch_documents<'a>(&self, documents: &'a [Document]) -> Vec<&'a [Document]> {
        documents.chunks(self.config.document_batch_size.max(1)).collect()
    }

    /// Split `chunks` into batches of [`ChunkerConfig::chunk_batch_size`],
    /// the unit the worker pipeline persists and embeds at a time.
    pub fn batch_chunks<'a>(&self, chunks: &'a [Chunk]) -> Vec<&'a [Chunk]> {
        chunks.chunks(self.config.chunk_batch_size.max(1)).collect()
    }

    /// Top-level entry point: clean, section, chunk, and post-process every
    /// document, returning the flattened list of chunks across all of them.
    pub fn process_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut out = Vec::new();
        for document in documents {
            if document.content.trim().is_empty() {
                continue;
            }
            let cleaned = self.remove_images(&self.remove_boilerplate(&document.content));
            let sections = self.identify_sections(&cleaned);
            let raw_chunks = self.chunk_sections(&sections);
            let chunks = self.finish_chunks(raw_chunks, document);
            out.extend(chunks);
        }
        out
    }

    fn remove_boilerplate(&self, content: &str) -> String {
        let stripped = BOILERPLATE_PATTERN.replace_all(content, "");
        BLANK_RUN_PATTERN.replace_all(&stripped, "\n\n").into_owned()
    }

    fn remove_images(&self, content: &str) -> String {
        IMAGE_PATTERN.replace_all(content, "").into_owned()
    }

    fn clean_header_text(&self, text: &str) -> String {
        INLINE_CODE_PATTERN.replace_all(text.trim(), "<code>$1</code>").into_owned()
    }

    /// Walk the document line by line, tracking the most recent h1/h2/h3.
    /// An h1 resets h2 and h3; an h2 resets h3. Lines inside a fenced code
    /// block never start a new section, even if they look like a header.
    fn identify_sections(&self, content: &str) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut headers = ChunkHeaders::default();
        let mut current = String::new();
        let mut in_code_block = false;
        let mut fence = String::new();

        for line in content.lines() {
            let stripped = line.trim();

            if CODE_FENCE_PATTERN.is_match(stripped) {
                if !in_code_block {
                    in_code_block = true;
                    fence = stripped.chars().take_while(|c| *c == '`' || *c == '~').collect();
                } else if stripped == fence {
                    in_code_block = false;
                    fence.clear();
                }
                current.push_str(line);
                current.push('\n');
                continue;
            }

            if !in_code_block {
                if let Some(caps) = HEADER_PATTERN.captures(stripped) {
                    if !current.trim().is_empty() {
                        sections.push(Section {
                            headers: headers.clone(),
                            content: std::mem::take(&mut current),
                        });
                    }
                    let level = caps[1].len();
                    let text = self.clean_header_text(&caps[2]);
                    match level {
                        1 => {
                            headers.h1 = text;
                            headers.h2.clear();
                            headers.h3.clear();
                        }
                        2 => {
                            headers.h2 = text;
                            headers.h3.clear();
                        }
                        _ => headers.h3 = text,
                    }
                    continue;
                }
            }

            current.push_str(line);
            current.push('\n');
        }

        if !current.trim().is_empty() {
            sections.push(Section { headers, content: current });
        }
        sections
    }

    fn chunk_sections(&self, sections: &[Section]) -> Vec<RawChunk> {
        let mut raw = Vec::new();
        for section in sections {
            raw.extend(self.split_into_raw_chunks(&section.content, &section.headers));
        }
        self.adjust_chunks(raw)
    }

    /// Pack a section's lines into chunks, flushing once the running token
    /// count crosses `soft_token_limit`. A fenced code block is kept atomic
    /// unless it alone exceeds `2 * max_tokens`, in which case it's split at
    /// line boundaries via [`Self::split_code_block`].
    fn split_into_raw_chunks(&self, content: &str, headers: &ChunkHeaders) -> Vec<RawChunk> {
        let mut chunks = Vec::new();
        let mut buffer = String::new();
        let mut buffer_tokens = 0u32;

        let mut flush = |buffer: &mut String, buffer_tokens: &mut u32, chunks: &mut Vec<RawChunk>| {
            if !buffer.trim().is_empty() {
                chunks.push(RawChunk {
                    headers: headers.clone(),
                    text: std::mem::take(buffer),
                });
            }
            *buffer_tokens = 0;
        };

        let mut lines = content.lines().peekable();
        while let Some(line) = lines.next() {
            let stripped = line.trim();
            if CODE_FENCE_PATTERN.is_match(stripped) {
                let fence: String = stripped.chars().take_while(|c| *c == '`' || *c == '~').collect();
                let mut block = String::new();
                block.push_str(line);
                block.push('\n');
                for inner in lines.by_ref() {
                    block.push_str(inner);
                    block.push('\n');
                    if inner.trim() == fence {
                        break;
                    }
                }

                let block_tokens = tokenizer::count_tokens(&block);
                if block_tokens > self.config.max_tokens * 2 {
                    flush(&mut buffer, &mut buffer_tokens, &mut chunks);
                    for piece in self.split_code_block(&block) {
                        chunks.push(RawChunk {
                            headers: headers.clone(),
                            text: piece,
                        });
                    }
                } else {
                    if buffer_tokens + block_tokens > self.config.soft_token_limit {
                        flush(&mut buffer, &mut buffer_tokens, &mut chunks);
                    }
                    buffer.push_str(&block);
                    buffer_tokens += block_tokens;
                }
                continue;
            }

            let mut line_with_break = String::from(line);
            line_with_break.push('\n');
            let line_tokens = tokenizer::count_tokens(&line_with_break);

            if line_tokens > self.config.max_tokens {
                flush(&mut buffer, &mut buffer_tokens, &mut chunks);
                for piece in self.split_long_line(line) {
                    chunks.push(RawChunk {
                        headers: headers.clone(),
                        text: piece,
                    });
                }
                continue;
            }

            if buffer_tokens + line_tokens > self.config.soft_token_limit {
                flush(&mut buffer, &mut buffer_tokens, &mut chunks);
            }
            buffer.push_str(&line_with_break);
            buffer_tokens += line_tokens;
        }
        flush(&mut buffer, &mut buffer_tokens, &mut chunks);
        chunks
    }

    /// Split an oversized fenced code block at line boundaries, packing
    /// lines against `max_tokens` and re-wrapping each piece in the same
    /// fence so it stays valid markdown on its own.
    fn split_code_block(&self, block: &str) -> Vec<String> {
        let mut lines = block.lines();
        let fence_line = lines.next().unwrap_or("```").to_string();
        let fence: String = fence_line
            .trim()
            .chars()
            .take_while(|c| *c == '`' || *c == '~')
            .collect();
        let body: Vec<&str> = lines.collect();
        let closing = body.last().map(|l| l.trim() == fence).unwrap_or(false);
        let body = if closing { &body[..body.len() - 1] } else { &body[..] };

        let mut pieces = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0u32;
        for line in body {
            let with_break = format!("{line}\n");
            let tokens = tokenizer::count_tokens(&with_break);
            if current_tokens + tokens > self.config.max_tokens && !current.is_empty() {
                pieces.push(format!("{fence_line}\n{current}{fence}\n"));
                current.clear();
                current_tokens = 0;
            }
            current.push_str(&with_break);
            current_tokens += tokens;
        }
        if !current.is_empty() {
            pieces.push(format!("{fence_line}\n{current}{fence}\n"));
        }
        if pieces.is_empty() {
            pieces.push(block.to_string());
        }
        pieces
    }

    /// Split a single line too long to fit in one chunk at the token level,
    /// via the shared tokenizer's encode/decode round trip.
    fn split_long_line(&self, line: &str) -> Vec<String> {
        let ids = tokenizer::encode(line);
        if ids.is_empty() {
            return vec![line.to_string()];
        }
        ids.chunks(self.config.max_tokens.max(1) as usize)
            .map(|slice| tokenizer::decode(slice))
            .collect()
    }

    /// Two-pass adjustment: fold undersized chunks into a neighbor (next
    /// chunk preferred, else previous), then split anything left oversized.
    fn adjust_chunks(&self, chunks: Vec<RawChunk>) -> Vec<RawChunk> {
        let merged = self.merge_small_chunks(chunks);
        merged.into_iter().flat_map(|c| self.split_if_large(c)).collect()
    }

    fn merge_small_chunks(&self, chunks: Vec<RawChunk>) -> Vec<RawChunk> {
        let mut result: Vec<RawChunk> = Vec::with_capacity(chunks.len());
        let mut pending: Option<RawChunk> = None;

        for chunk in chunks {
            let mut chunk = chunk;
            if let Some(prev) = pending.take() {
                let prev_tokens = tokenizer::count_tokens(&prev.text);
                let combined_tokens = prev_tokens + tokenizer::count_tokens(&chunk.text);
                if prev_tokens < self.config.min_chunk_size && combined_tokens <= self.config.max_tokens * 2 {
                    chunk = RawChunk {
                        headers: prev.headers.merge(&chunk.headers),
                        text: format!("{}{}", prev.text, chunk.text),
                    };
                } else if prev_tokens < self.config.min_chunk_size {
                    // Forward merge with the successor didn't fit. Fall back to
                    // folding prev into the chunk already pushed to `result`.
                    if let Some(last) = result.last_mut() {
                        let last_tokens = tokenizer::count_tokens(&last.text);
                        if last_tokens + prev_tokens <= self.config.max_tokens * 2 {
                            last.headers = last.headers.merge(&prev.headers);
                            last.text.push_str(&prev.text);
                        } else {
                            result.push(prev);
                        }
                    } else {
                        result.push(prev);
                    }
                } else {
                    result.push(prev);
                }
            }
            pending = Some(chunk);
        }
        if let Some(last) = pending {
            if let Some(prev) = result.last_mut() {
                let last_tokens = tokenizer::count_tokens(&last.text);
                let combined_tokens = tokenizer::count_tokens(&prev.text) + last_tokens;
                if last_tokens < self.config.min_chunk_size && combined_tokens <= self.config.max_tokens * 2 {
                    prev.headers = prev.headers.merge(&last.headers);
                    prev.text.push_str(&last.text);
                } else {
                    result.push(last);
                }
            } else {
                result.push(last);
            }
        }
        result
    }

    fn split_if_large(&self, chunk: RawChunk) -> Vec<RawChunk> {
        let pack_limit = self.config.max_tokens * 2;
        if tokenizer::count_tokens(&chunk.text) <= pack_limit {
            return vec![chunk];
        }
        let mut pieces = Vec::new();
        let mut buffer = String::new();
        let mut buffer_tokens = 0u32;
        for line in chunk.text.lines() {
            let with_break = format!("{line}\n");
            let tokens = tokenizer::count_tokens(&with_break);
            if buffer_tokens + tokens > pack_limit && !buffer.is_empty() {
                pieces.push(RawChunk {
                    headers: chunk.headers.clone(),
                    text: std::mem::take(&mut buffer),
                });
                buffer_tokens = 0;
            }
            buffer.push_str(&with_break);
            buffer_tokens += tokens;
        }
        if !buffer.trim().is_empty() {
            pieces.push(RawChunk {
                headers: chunk.headers.clone(),
                text: buffer,
            });
        }
        if pieces.is_empty() {
            pieces.push(chunk);
        }
        pieces
    }

    /// Turn adjusted raw chunks into the final, persisted [`Chunk`] records:
    /// fall back headers to the page title, prepend overlap from the
    /// previous chunk, and combine headers with text into the embeddable
    /// `content` field.
    fn finish_chunks(&self, raw_chunks: Vec<RawChunk>, document: &Document) -> Vec<Chunk> {
        let page_title = document
            .metadata
            .title
            .clone()
            .unwrap_or_else(|| "Untitled".to_string());
        let page_url = document.metadata.source_url.clone();

        let mut chunks: Vec<Chunk> = raw_chunks
            .into_iter()
            .map(|raw| {
                let mut headers = raw.headers;
                if headers.h1.trim().is_empty() {
                    headers.h1 = page_title.clone();
                }
                let text = raw.text.trim().to_string();
                Chunk {
                    chunk_id: Uuid::new_v4(),
                    source_id: document.source_id,
                    document_id: document.document_id,
                    headers,
                    token_count: tokenizer::count_tokens(&text),
                    text,
                    content: String::new(),
                    page_title: page_title.clone(),
                    page_url: page_url.clone(),
                }
            })
            .collect();

        self.add_overlap(&mut chunks);
        self.combine_headers_and_text(&mut chunks);
        chunks
    }

    /// Prepend a slice of the previous chunk's tail to each chunk after the
    /// first, sized to `overlap_percentage * predecessor_tokens` and
    /// clamped to `[min_overlap_tokens, max_overlap_tokens]` and to
    /// whatever headroom remains below `max_tokens`.
    fn add_overlap(&self, chunks: &mut [Chunk]) {
        for i in (1..chunks.len()).rev() {
            let prev_tokens = tokenizer::count_tokens(&chunks[i - 1].text);
            let target = (prev_tokens as f64 * self.config.overlap_percentage) as u32;
            let target = target.clamp(self.config.min_overlap_tokens, self.config.max_overlap_tokens);

            let headroom = self.config.max_tokens.saturating_sub(chunks[i].token_count);
            if headroom == 0 {
                continue;
            }
            let overlap_tokens = target.min(headroom);
            let overlap = self.last_n_tokens(&chunks[i - 1].text, overlap_tokens);
            if overlap.is_empty() {
                continue;
            }
            chunks[i].text = format!("{overlap}\n\n{}", chunks[i].text);
            chunks[i].token_count = tokenizer::count_tokens(&chunks[i].text);
        }
    }

    fn last_n_tokens(&self, text: &str, n: u32) -> String {
        if n == 0 {
            return String::new();
        }
        let ids = tokenizer::encode(text);
        if ids.len() as u32 <= n {
            return text.to_string();
        }
        let start = ids.len() - n as usize;
        tokenizer::decode(&ids[start..])
    }

    fn combine_headers_and_text(&self, chunks: &mut [Chunk]) {
        for chunk in chunks {
            let mut header_line = String::new();
            if !chunk.headers.h1.is_empty() {
                header_line.push_str(&format!("# {}\n", chunk.headers.h1));
            }
            if !chunk.headers.h2.is_empty() {
                header_line.push_str(&format!("## {}\n", chunk.headers.h2));
            }
            if !chunk.headers.h3.is_empty() {
                header_line.push_str(&format!("### {}\n", chunk.headers.h3));
            }
            chunk.content = if header_line.is_empty() {
                chunk.text.clone()
            } else {
                format!("{header_line}\n{}", chunk.text)
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kollektiv_core::models::DocumentMetadata;

    fn document(content: &str) -> Document {
        Document {
            document_id: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            content: content.to_string(),
            metadata: DocumentMetadata {
                title: Some("Guide".into()),
                description: None,
                source_url: "https://example.com/guide".into(),
                og_url: None,
            },
        }
    }

    #[test]
    fn splits_sections_by_header() {
        let chunker = MarkdownChunker::new();
        let content = "# Intro\nSome intro text.\n\n## Details\nMore detail text here.\n";
        let chunks = chunker.process_documents(&[document(content)]);
        assert!(chunks.iter().any(|c| c.headers.h1 == "Intro" && c.headers.h2.is_empty()));
        assert!(chunks.iter().any(|c| c.headers.h2 == "Details"));
    }

    #[test]
    fn oversized_code_block_is_split_and_kept_valid() {
        let chunker = MarkdownChunker::with_config(ChunkerConfig {
            max_tokens: 20,
            soft_token_limit: 15,
            ..ChunkerConfig::default()
        });
        let body: String = (0..200).map(|i| format!("line_{i} = {i}\n")).collect();
        let content = format!("# Code\n```python\n{body}```\n");
        let chunks = chunker.process_documents(&[document(&content)]);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.token_count <= chunker.config().max_tokens * 2);
        }
    }

    #[test]
    fn small_trailing_chunk_is_merged_into_previous() {
        let chunker = MarkdownChunker::new();
        let content = "# Intro\nA reasonably sized paragraph of introductory text that goes on for a bit.\n\n## Tiny\nshort.\n";
        let chunks = chunker.process_documents(&[document(content)]);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn empty_document_produces_no_chunks() {
        let chunker = MarkdownChunker::new();
        let chunks = chunker.process_documents(&[document("   \n\n  ")]);
        assert!(chunks.is_empty());
    }

    #[test]
    fn headers_fall_back_to_page_title() {
        let chunker = MarkdownChunker::new();
        let content = "Just a paragraph with no headers at all.\n";
        let chunks = chunker.process_documents(&[document(content)]);
        assert_eq!(chunks[0].headers.h1, "Guide");
        assert!(chunks[0].content.contains("# Guide"));
    }

    #[test]
    fn batching_respects_configured_sizes() {
        let chunker = MarkdownChunker::with_config(ChunkerConfig {
            document_batch_size: 2,
            ..ChunkerConfig::default()
        });
        let docs: Vec<Document> = (0..5).map(|_| document("# H\ntext\n")).collect();
        let batches = chunker.batch_documents(&docs);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[2].len(), 1);
    }
}

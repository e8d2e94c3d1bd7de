use crate::error::IngestError;
use regex::Regex;
use std::collections::VecDeque;
use std::ops::Range;

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 1_000;

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters carried over from the end of one chunk into the next.
    pub chunk_overlap: usize,
    /// Tried in order; the empty separator cuts between characters.
    pub separators: Vec<String>,
    pub strip_whitespace: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: ["\n\n", "\n", " ", ""].map(String::from).to_vec(),
            strip_whitespace: true,
        }
    }
}

impl ChunkingConfig {
    pub fn with_size(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.separators.is_empty() {
            return Err(IngestError::InvalidChunkConfig(
                "at least one separator is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// A window of the source text. `start..end` are byte offsets into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunk<'a> {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
}

impl TextChunk<'_> {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Recursive character splitter: splits on the coarsest separator present,
/// recurses into pieces that are still too long, then greedily merges
/// pieces back into windows of at most `chunk_size` characters.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
    patterns: Vec<Option<Regex>>,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;
        let patterns = config
            .separators
            .iter()
            .map(|separator| {
                if separator.is_empty() {
                    Ok(None)
                } else {
                    Regex::new(&regex::escape(separator)).map(Some)
                }
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self { config, patterns })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Byte ranges of every chunk of `text`, in order.
    pub fn boundaries(&self, text: &str) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        if !text.is_empty() {
            self.split_range(text, 0..text.len(), 0, &mut out);
        }
        out
    }

    pub fn chunks<'a>(&self, text: &'a str) -> TextChunks<'a> {
        TextChunks {
            text,
            ranges: self.boundaries(text),
            position: 0,
        }
    }

    fn split_range(&self, text: &str, range: Range<usize>, level: usize, out: &mut Vec<Range<usize>>) {
        let segment = &text[range.clone()];

        let mut chosen = self.patterns.len() - 1;
        let mut next_level = None;
        for (position, pattern) in self.patterns.iter().enumerate().skip(level) {
            match pattern {
                None => {
                    chosen = position;
                    break;
                }
                Some(re) if re.is_match(segment) => {
                    chosen = position;
                    if position + 1 < self.patterns.len() {
                        next_level = Some(position + 1);
                    }
                    break;
                }
                Some(_) => {}
            }
        }

        let pieces = split_keeping_separator(segment, self.patterns[chosen].as_ref())
            .into_iter()
            .map(|piece| (piece.start + range.start)..(piece.end + range.start));

        let mut fitting = Vec::new();
        for piece in pieces {
            if char_len(text, &piece) < self.config.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                self.merge(text, &fitting, out);
                fitting.clear();
            }

            match next_level {
                Some(level) => self.split_range(text, piece, level, out),
                None => out.push(piece),
            }
        }

        if !fitting.is_empty() {
            self.merge(text, &fitting, out);
        }
    }

    fn merge(&self, text: &str, pieces: &[Range<usize>], out: &mut Vec<Range<usize>>) {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut current: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(text, piece);

            if total + len > size && !current.is_empty() {
                self.emit(text, &current, out);

                while total > overlap || (total + len > size && total > 0) {
                    match current.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            current.push_back((piece.clone(), len));
            total += len;
        }

        self.emit(text, &current, out);
    }

    fn emit(&self, text: &str, current: &VecDeque<(Range<usize>, usize)>, out: &mut Vec<Range<usize>>) {
        let (Some((first, _)), Some((last, _))) = (current.front(), current.back()) else {
            return;
        };

        let mut range = first.start..last.end;
        if self.config.strip_whitespace {
            let slice = &text[range.clone()];
            let leading = slice.len() - slice.trim_start().len();
            let trailing = slice.len() - slice.trim_end().len();
            if leading == slice.len() {
                return;
            }
            range = (range.start + leading)..(range.end - trailing);
        }

        if !range.is_empty() {
            out.push(range);
        }
    }
}

/// Splits so that each separator stays attached to the start of the piece
/// that follows it; the pieces therefore tile `segment` exactly.
fn split_keeping_separator(segment: &str, pattern: Option<&Regex>) -> Vec<Range<usize>> {
    let cuts: Vec<usize> = match pattern {
        Some(re) => re.find_iter(segment).map(|found| found.start()).collect(),
        None => segment.char_indices().map(|(offset, _)| offset).collect(),
    };

    let mut pieces = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts.into_iter().chain(std::iter::once(segment.len())) {
        if cut > start {
            pieces.push(start..cut);
            start = cut;
        }
    }
    pieces
}

fn char_len(text: &str, range: &Range<usize>) -> usize {
    text[range.clone()].chars().count()
}

/// Lazily materializes chunks from precomputed boundaries. Clone it, or call
/// [`Chunker::chunks`] again, to restart from the first chunk.
#[derive(Debug, Clone)]
pub struct TextChunks<'a> {
    text: &'a str,
    ranges: Vec<Range<usize>>,
    position: usize,
}

impl<'a> Iterator for TextChunks<'a> {
    type Item = TextChunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let range = self.ranges.get(self.position)?.clone();
        let index = self.position;
        self.position += 1;

        Some(TextChunk {
            index,
            start: range.start,
            end: range.end,
            text: &self.text[range],
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.ranges.len() - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TextChunks<'_> {}

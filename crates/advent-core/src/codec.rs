//! Prompt framing for the game's stdout.
//!
//! The game never terminates its prompts with a newline, so output is split
//! on the prompt markers themselves. A token runs from the current read
//! position through the end of the first delimiter found; whatever is left
//! when the stream ends becomes a final partial token.
//! With a maximum length set, a run without any delimiter is cut into
//! pieces of that length instead of buffering without bound.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

/// Generic "awaiting input" prompt.
pub const PROMPT_DELIMITER: &[u8] = b"> ";

/// Prompt shown by the save dialog when it asks for a file name.
pub const FILE_NAME_DELIMITER: &[u8] = b"File name: ";

/// Splits a byte stream into tokens that each end in one of a fixed set of
/// delimiters.
#[derive(Debug, Clone)]
pub struct PromptCodec {
    delimiters: Vec<Vec<u8>>,
    /// Longest token emitted without a delimiter; `None` buffers forever.
    max_length: Option<usize>,
    /// Number of end positions in the buffer already checked for a match.
    scanned: usize,
}

impl PromptCodec {
    pub fn new<I, D>(delimiters: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<Vec<u8>>,
    {
        Self {
            delimiters: delimiters
                .into_iter()
                .map(Into::into)
                .filter(|d: &Vec<u8>| !d.is_empty())
                .collect(),
            max_length: None,
            scanned: 0,
        }
    }

    /// Cut a token after `max_length` bytes when no delimiter shows up.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length.max(1));
        self
    }

    /// Smallest `end` such that `data[..end]` finishes with a delimiter.
    fn find_token_end(&self, data: &[u8]) -> Option<usize> {
        (self.scanned + 1..=data.len()).find(|&end| {
            self.delimiters
                .iter()
                .any(|delim| ends_with_delimiter(&data[..end], delim))
        })
    }
}

impl Default for PromptCodec {
    fn default() -> Self {
        Self::new([PROMPT_DELIMITER, FILE_NAME_DELIMITER])
    }
}

impl Decoder for PromptCodec {
    type Item = Bytes;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        let limit = self.max_length.map_or(src.len(), |max| max.min(src.len()));
        if let Some(end) = self.find_token_end(&src[..limit]) {
            self.scanned = 0;
            return Ok(Some(src.split_to(end).freeze()));
        }
        match self.max_length {
            Some(max) if src.len() >= max => {
                self.scanned = 0;
                Ok(Some(src.split_to(max).freeze()))
            }
            _ => {
                self.scanned = limit;
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        if let Some(token) = self.decode(src)? {
            return Ok(Some(token));
        }
        if src.is_empty() {
            return Ok(None);
        }
        self.scanned = 0;
        let len = src.len();
        Ok(Some(src.split_to(len).freeze()))
    }
}

/// True when `data` ends with the complete `delimiter`.
///
/// A trailing fragment shorter than the delimiter never matches.
pub fn ends_with_delimiter(data: &[u8], delimiter: &[u8]) -> bool {
    data.len() >= delimiter.len() && data[data.len() - delimiter.len()..] == *delimiter
}

/// Characters stripped from both ends of a token.
const TRIM_CHARS: [char; 5] = [' ', '>', '\t', '\r', '\n'];

/// Turn a raw token into a logical output line: strip prompt markers and
/// whitespace from both ends.
pub fn clean_token(token: &[u8]) -> String {
    String::from_utf8_lossy(token)
        .trim_matches(TRIM_CHARS)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_all(codec: &mut PromptCodec, input: &[u8]) -> Vec<Bytes> {
        let mut buf = BytesMut::from(input);
        let mut tokens = Vec::new();
        while let Some(token) = codec.decode_eof(&mut buf).unwrap() {
            tokens.push(token);
        }
        tokens
    }

    #[test]
    fn splits_on_prompt() {
        let mut codec = PromptCodec::default();
        let tokens = frame_all(&mut codec, b"Welcome!\n\n> You are in a road.\n> ");
        assert_eq!(tokens, vec![&b"Welcome!\n\n> "[..], &b"You are in a road.\n> "[..]]);
    }

    #[test]
    fn splits_on_file_name_prompt() {
        let mut codec = PromptCodec::default();
        let tokens = frame_all(&mut codec, b"OK\n\nFile name: rest");
        assert_eq!(tokens, vec![&b"OK\n\nFile name: "[..], &b"rest"[..]]);
    }

    #[test]
    fn concatenated_tokens_reproduce_input() {
        let input: &[u8] = b"a> b> File name: c>d >  > tail";
        let mut codec = PromptCodec::default();
        let tokens = frame_all(&mut codec, input);
        assert_eq!(tokens.concat(), input);
        assert_eq!(tokens.len(), 6);
    }

    #[test]
    fn earliest_end_wins_for_overlapping_delimiters() {
        let mut codec = PromptCodec::new(["ab", "b"]);
        let tokens = frame_all(&mut codec, b"xabz");
        assert_eq!(tokens, vec![&b"xab"[..], &b"z"[..]]);

        let mut codec = PromptCodec::new(["bc", "abcd"]);
        let tokens = frame_all(&mut codec, b"abcd");
        assert_eq!(tokens, vec![&b"abc"[..], &b"d"[..]]);
    }

    #[test]
    fn partial_delimiter_waits_for_more_input() {
        let mut codec = PromptCodec::default();
        let mut buf = BytesMut::from(&b"Hello>"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b" more");
        let token = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&token[..], b"Hello> ");
        assert_eq!(&buf[..], b"more");
    }

    #[test]
    fn incremental_feed_matches_bulk() {
        let input: &[u8] = b"One> Two\nFile name: Three";
        let mut codec = PromptCodec::default();
        let mut buf = BytesMut::new();
        let mut tokens = Vec::new();
        for byte in input {
            buf.extend_from_slice(&[*byte]);
            while let Some(token) = codec.decode(&mut buf).unwrap() {
                tokens.push(token);
            }
        }
        while let Some(token) = codec.decode_eof(&mut buf).unwrap() {
            tokens.push(token);
        }
        assert_eq!(tokens, frame_all(&mut PromptCodec::default(), input));
    }

    #[test]
    fn eof_without_delimiter_emits_remainder() {
        let mut codec = PromptCodec::default();
        let tokens = frame_all(&mut codec, b"no prompt here");
        assert_eq!(tokens, vec![&b"no prompt here"[..]]);
        assert!(frame_all(&mut codec, b"").is_empty());
    }

    #[test]
    fn short_fragment_never_matches() {
        assert!(ends_with_delimiter(b"test> ", b"> "));
        assert!(!ends_with_delimiter(b">", b"> "));
        assert!(!ends_with_delimiter(b" ", b"> "));
        assert!(ends_with_delimiter(b"> ", b"> "));
    }

    #[test]
    fn clean_token_strips_marker_and_whitespace() {
        assert_eq!(clean_token(b"Welcome!> "), "Welcome!");
        assert_eq!(clean_token(b"\n  You are in a road.\n\n> "), "You are in a road.");
        assert_eq!(clean_token(b"OK\n\nFile name: "), "OK\n\nFile name:");
        assert_eq!(clean_token(b"> "), "");
        assert_eq!(clean_token(b"a -> b"), "a -> b");
    }

    #[test]
    fn clean_token_strips_stacked_markers_on_both_ends() {
        assert_eq!(clean_token(b"> > "), "");
        assert_eq!(clean_token(b">\n> Huh?\n\n> "), "Huh?");
        assert_eq!(clean_token(b"\t> There is a lamp here. >\r\n"), "There is a lamp here.");
    }

    #[test]
    fn max_length_cuts_runaway_tokens() {
        let mut codec = PromptCodec::new(["\n"]).with_max_length(4);
        let input: &[u8] = b"abcdefghij\nxy\n";
        let tokens = frame_all(&mut codec, input);
        assert_eq!(
            tokens,
            vec![&b"abcd"[..], &b"efgh"[..], &b"ij\n"[..], &b"xy\n"[..]]
        );
        assert_eq!(tokens.concat(), input);
    }

    #[test]
    fn delimiter_within_max_length_wins() {
        let mut codec = PromptCodec::default().with_max_length(8);
        let mut buf = BytesMut::from(&b"go> more text"[..]);
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"go> ");
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"more tex");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"t");
    }
}

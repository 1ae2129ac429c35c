//! Bencode values, as used by `.torrent` metainfo files
//!
//! Decoding is strict about structure (lengths, terminators, integer
//! syntax) but does not enforce sorted dictionary keys, since real-world
//! torrents occasionally violate that.

use std::collections::BTreeMap;

/// Maximum nesting depth accepted by the decoder
const MAX_DEPTH: usize = 64;

/// A bencoded value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    /// `i<n>e`
    Integer(i64),
    /// `<len>:<bytes>`
    Bytes(Vec<u8>),
    /// `l...e`
    List(Vec<BencodeValue>),
    /// `d...e`
    Dict(BTreeMap<Vec<u8>, BencodeValue>),
}

/// Decoding failure with the byte offset it was detected at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// Offset into the input
    pub offset: usize,
    /// What went wrong
    pub reason: &'static str,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at byte {}", self.reason, self.offset)
    }
}

impl std::error::Error for DecodeError {}

impl BencodeValue {
    /// Create a string value from a &str
    #[inline]
    pub fn string(s: &str) -> Self {
        Self::Bytes(s.as_bytes().to_vec())
    }

    /// Create an integer value
    #[inline]
    pub fn integer(i: i64) -> Self {
        Self::Integer(i)
    }

    /// Create an empty list
    #[inline]
    pub fn list() -> Self {
        Self::List(Vec::new())
    }

    /// Create an empty dict
    #[inline]
    pub fn dict() -> Self {
        Self::Dict(BTreeMap::new())
    }

    /// Add an item to a list (builder pattern)
    #[inline]
    pub fn push(mut self, value: BencodeValue) -> Self {
        if let Self::List(ref mut list) = self {
            list.push(value);
        }
        self
    }

    /// Insert a key-value pair into a dict (builder pattern)
    #[inline]
    pub fn insert(mut self, key: &str, value: BencodeValue) -> Self {
        if let Self::Dict(ref mut dict) = self {
            dict.insert(key.as_bytes().to_vec(), value);
        }
        self
    }

    /// Look up a key in a dict
    pub fn get(&self, key: &str) -> Option<&BencodeValue> {
        match self {
            Self::Dict(dict) => dict.get(key.as_bytes()),
            _ => None,
        }
    }

    /// Integer payload
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Byte-string payload
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// List payload
    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Encode to bencoded bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Encode into an existing buffer
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Integer(i) => {
                buf.push(b'i');
                buf.extend_from_slice(i.to_string().as_bytes());
                buf.push(b'e');
            }
            Self::Bytes(bytes) => {
                buf.extend_from_slice(bytes.len().to_string().as_bytes());
                buf.push(b':');
                buf.extend_from_slice(bytes);
            }
            Self::List(list) => {
                buf.push(b'l');
                for item in list {
                    item.encode_into(buf);
                }
                buf.push(b'e');
            }
            Self::Dict(dict) => {
                buf.push(b'd');
                // BTreeMap keeps keys sorted
                for (key, value) in dict {
                    buf.extend_from_slice(key.len().to_string().as_bytes());
                    buf.push(b':');
                    buf.extend_from_slice(key);
                    value.encode_into(buf);
                }
                buf.push(b'e');
            }
        }
    }

    /// Decode a complete bencoded document
    ///
    /// Trailing bytes after the first value are an error.
    pub fn decode(input: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder { input, pos: 0 };
        let value = decoder.value(0)?;
        if decoder.pos != input.len() {
            return Err(decoder.error("trailing data"));
        }
        Ok(value)
    }
}

struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Decoder<'_> {
    fn error(&self, reason: &'static str) -> DecodeError {
        DecodeError {
            offset: self.pos,
            reason,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn value(&mut self, depth: usize) -> Result<BencodeValue, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        match self.peek() {
            Some(b'i') => {
                self.pos += 1;
                let n = self.integer_until(b'e')?;
                Ok(BencodeValue::Integer(n))
            }
            Some(b'l') => {
                self.pos += 1;
                let mut items = Vec::new();
                while self.peek() != Some(b'e') {
                    if self.peek().is_none() {
                        return Err(self.error("unterminated list"));
                    }
                    items.push(self.value(depth + 1)?);
                }
                self.pos += 1;
                Ok(BencodeValue::List(items))
            }
            Some(b'd') => {
                self.pos += 1;
                let mut dict = BTreeMap::new();
                while self.peek() != Some(b'e') {
                    match self.peek() {
                        None => return Err(self.error("unterminated dict")),
                        Some(c) if c.is_ascii_digit() => {}
                        Some(_) => return Err(self.error("dict key must be a string")),
                    }
                    let key = self.bytes()?;
                    let value = self.value(depth + 1)?;
                    dict.insert(key, value);
                }
                self.pos += 1;
                Ok(BencodeValue::Dict(dict))
            }
            Some(c) if c.is_ascii_digit() => Ok(BencodeValue::Bytes(self.bytes()?)),
            Some(_) => Err(self.error("unexpected byte")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn integer_until(&mut self, terminator: u8) -> Result<i64, DecodeError> {
        let start = self.pos;
        let end = self.input[start..]
            .iter()
            .position(|&b| b == terminator)
            .map(|p| start + p)
            .ok_or_else(|| self.error("unterminated integer"))?;
        let digits = &self.input[start..end];

        let valid = match digits {
            [] | [b'-'] => false,
            [b'-', b'0', ..] => false,
            [b'0', _, ..] => false,
            [b'-', rest @ ..] => rest.iter().all(u8::is_ascii_digit),
            all => all.iter().all(u8::is_ascii_digit),
        };
        if !valid {
            return Err(self.error("malformed integer"));
        }

        let n = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| self.error("integer out of range"))?;
        self.pos = end + 1;
        Ok(n)
    }

    fn bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.integer_until(b':')?;
        let len = usize::try_from(len).map_err(|_| self.error("negative string length"))?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| self.error("string runs past end of input"))?;
        let bytes = self.input[self.pos..end].to_vec();
        self.pos = end;
        Ok(bytes)
    }
}

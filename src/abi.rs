//! Contract ABI types and the standard head/tail encoding.
//!
//! Only what calldata compression needs is here: parsing canonical signatures, computing
//! selectors, and encoding or decoding argument blocks as [`Token`]s. Every value narrower than
//! a word is kept as its raw 32-byte word; nothing is interpreted beyond the layout.

use regex::Regex;
use sha3::{Digest, Keccak256};

use crate::error::{Error, Result};

/// Size of an ABI word.
pub const WORD: usize = 32;

/// Parameter types of the contract ABI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Bool,
    /// Unsigned integer of the given bit width.
    Uint(usize),
    /// Signed integer of the given bit width.
    Int(usize),
    /// `bytes1` through `bytes32`.
    FixedBytes(usize),
    Bytes,
    String,
    /// `T[]`
    Array(Box<ParamType>),
    /// `T[k]`
    FixedArray(Box<ParamType>, usize),
    Tuple(Vec<ParamType>),
}

impl ParamType {
    /// Whether the value lives in the tail and is referenced from the head by an offset.
    pub fn is_dynamic(&self) -> bool {
        match self {
            ParamType::Bytes | ParamType::String | ParamType::Array(_) => true,
            ParamType::FixedArray(inner, _) => inner.is_dynamic(),
            ParamType::Tuple(items) => items.iter().any(|t| t.is_dynamic()),
            _ => false,
        }
    }

    /// Bytes the value takes up in the head of its enclosing tuple.
    pub fn head_size(&self) -> usize {
        if self.is_dynamic() {
            return WORD;
        }
        match self {
            ParamType::FixedArray(inner, len) => inner.head_size() * len,
            ParamType::Tuple(items) => items.iter().map(|t| t.head_size()).sum(),
            _ => WORD,
        }
    }

    /// Parse a canonical type name such as `uint256`, `bytes[]` or `(address,bytes)[2]`.
    pub fn parse(text: &str) -> Result<ParamType> {
        let mut parser = TypeParser { text, pos: 0 };
        let ty = parser.parse_type()?;
        if parser.pos != text.len() {
            return Err(Error::malformed(
                "type name",
                format!("unexpected text after type: {:?}", &text[parser.pos..]),
            ));
        }
        Ok(ty)
    }
}

/// A parsed function signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub inputs: Vec<ParamType>,
    pub selector: [u8; 4],
}

impl Function {
    /// Parse a canonical signature like `transfer(address,uint256)`. Whitespace is not allowed,
    /// as it would change the selector.
    pub fn parse(signature: &str) -> Result<Function> {
        let re = Regex::new(r"^([A-Za-z_$][A-Za-z0-9_$]*)\((.*)\)$")
            .map_err(|e| Error::malformed("function signature", e.to_string()))?;
        let caps = re.captures(signature).ok_or_else(|| {
            Error::malformed("function signature", format!("not a signature: {:?}", signature))
        })?;
        let name = caps[1].to_string();
        let inputs = match ParamType::parse(&format!("({})", &caps[2]))? {
            ParamType::Tuple(items) => items,
            other => {
                return Err(Error::malformed(
                    "function signature",
                    format!("argument list parsed as {:?}", other),
                ))
            }
        };
        Ok(Function {
            name,
            inputs,
            selector: selector(signature),
        })
    }
}

/// First four bytes of the Keccak-256 hash of a signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

struct TypeParser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn parse_type(&mut self) -> Result<ParamType> {
        let mut ty = if self.rest().starts_with('(') {
            self.pos += 1;
            let mut items = Vec::new();
            if self.rest().starts_with(')') {
                self.pos += 1;
            } else {
                loop {
                    items.push(self.parse_type()?);
                    match self.rest().as_bytes().first() {
                        Some(b',') => self.pos += 1,
                        Some(b')') => {
                            self.pos += 1;
                            break;
                        }
                        _ => return Err(self.fail("expected ',' or ')' in tuple")),
                    }
                }
            }
            ParamType::Tuple(items)
        } else {
            let len = self
                .rest()
                .find(|c: char| !c.is_ascii_alphanumeric())
                .unwrap_or(self.rest().len());
            let word = &self.rest()[..len];
            let ty = elementary(word).ok_or_else(|| self.fail("unknown elementary type"))?;
            self.pos += len;
            ty
        };

        while self.rest().starts_with('[') {
            let close = self
                .rest()
                .find(']')
                .ok_or_else(|| self.fail("unterminated array suffix"))?;
            let size = &self.rest()[1..close];
            ty = if size.is_empty() {
                ParamType::Array(Box::new(ty))
            } else {
                let len = size
                    .parse::<usize>()
                    .ok()
                    .filter(|len| *len > 0)
                    .ok_or_else(|| self.fail("bad fixed array length"))?;
                ParamType::FixedArray(Box::new(ty), len)
            };
            self.pos += close + 1;
        }
        Ok(ty)
    }

    fn fail(&self, reason: &str) -> Error {
        Error::malformed("type name", format!("{} at {:?}", reason, self.rest()))
    }
}

fn elementary(word: &str) -> Option<ParamType> {
    let sized = |prefix: &str| -> Option<Option<usize>> {
        let digits = word.strip_prefix(prefix)?;
        if digits.is_empty() {
            return Some(None);
        }
        if digits.starts_with('0') {
            return None;
        }
        digits.parse().ok().map(Some)
    };
    match word {
        "address" => return Some(ParamType::Address),
        "bool" => return Some(ParamType::Bool),
        "string" => return Some(ParamType::String),
        "bytes" => return Some(ParamType::Bytes),
        _ => (),
    }
    if let Some(bits) = sized("uint") {
        let bits = bits.unwrap_or(256);
        return (bits % 8 == 0 && (8..=256).contains(&bits)).then_some(ParamType::Uint(bits));
    }
    if let Some(bits) = sized("int") {
        let bits = bits.unwrap_or(256);
        return (bits % 8 == 0 && (8..=256).contains(&bits)).then_some(ParamType::Int(bits));
    }
    if let Some(Some(len)) = sized("bytes") {
        return (1..=32).contains(&len).then_some(ParamType::FixedBytes(len));
    }
    None
}

/// A decoded ABI value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    /// Any static elementary value, as its full word.
    Word([u8; 32]),
    /// The contents of `bytes` or `string`.
    Bytes(Vec<u8>),
    Array(Vec<Token>),
    FixedArray(Vec<Token>),
    Tuple(Vec<Token>),
}

impl Token {
    pub fn from_usize(value: usize) -> Token {
        Token::Word(word_from_usize(value))
    }

    /// Left-pad a value of up to 32 bytes into a word.
    pub fn from_padded(value: &[u8]) -> Token {
        let mut word = [0u8; 32];
        word[WORD - value.len()..].copy_from_slice(value);
        Token::Word(word)
    }

    fn is_dynamic(&self) -> bool {
        match self {
            Token::Word(_) => false,
            Token::Bytes(_) | Token::Array(_) => true,
            Token::FixedArray(items) | Token::Tuple(items) => items.iter().any(Token::is_dynamic),
        }
    }

    fn head_size(&self) -> usize {
        match self {
            Token::FixedArray(items) | Token::Tuple(items) if !self.is_dynamic() => {
                items.iter().map(Token::head_size).sum()
            }
            _ => WORD,
        }
    }
}

pub fn word_from_usize(value: usize) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[WORD - 8..].copy_from_slice(&(value as u64).to_be_bytes());
    word
}

/// Borrow the word at `pos`.
pub fn read_word<'a>(data: &'a [u8], pos: usize, field: &'static str) -> Result<&'a [u8]> {
    data.get(pos..pos.saturating_add(WORD))
        .ok_or_else(|| Error::truncated(field, data.len().saturating_sub(pos), WORD))
}

/// Read the word at `pos` as an offset or length. Values that don't fit in 32 bits can't point
/// anywhere inside real calldata and are rejected.
pub fn read_usize(data: &[u8], pos: usize, field: &'static str) -> Result<usize> {
    let word = read_word(data, pos, field)?;
    if word[..WORD - 4].iter().any(|b| *b != 0) {
        return Err(Error::malformed(field, "value does not fit in 32 bits"));
    }
    Ok(u32::from_be_bytes([word[28], word[29], word[30], word[31]]) as usize)
}

/// Encode a sequence of values as the argument block of a call.
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_sequence(tokens, &mut out);
    out
}

fn encode_sequence(tokens: &[Token], out: &mut Vec<u8>) {
    let head_len: usize = tokens.iter().map(Token::head_size).sum();
    let mut tail = Vec::new();
    for token in tokens {
        if token.is_dynamic() {
            out.extend_from_slice(&word_from_usize(head_len + tail.len()));
            encode_token(token, &mut tail);
        } else {
            encode_token(token, out);
        }
    }
    out.extend_from_slice(&tail);
}

fn encode_token(token: &Token, out: &mut Vec<u8>) {
    match token {
        Token::Word(word) => out.extend_from_slice(word),
        Token::Bytes(bytes) => {
            out.extend_from_slice(&word_from_usize(bytes.len()));
            out.extend_from_slice(bytes);
            out.resize(out.len() + padding(bytes.len()), 0);
        }
        Token::Array(items) => {
            out.extend_from_slice(&word_from_usize(items.len()));
            encode_sequence(items, out);
        }
        Token::FixedArray(items) | Token::Tuple(items) => encode_sequence(items, out),
    }
}

/// Zero bytes needed to bring `len` up to a whole number of words.
pub fn padding(len: usize) -> usize {
    (WORD - len % WORD) % WORD
}

/// Decode an argument block holding values of the given types.
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>> {
    let types: Vec<&ParamType> = types.iter().collect();
    decode_sequence(&types, data, 0)
}

fn decode_sequence(types: &[&ParamType], data: &[u8], base: usize) -> Result<Vec<Token>> {
    let mut pos = base;
    let mut out = Vec::with_capacity(types.len());
    for ty in types {
        if ty.is_dynamic() {
            let offset = read_usize(data, pos, "read tail offset")?;
            out.push(decode_dynamic(ty, data, base + offset)?);
            pos += WORD;
        } else {
            out.push(decode_static(ty, data, pos)?);
            pos += ty.head_size();
        }
    }
    Ok(out)
}

fn decode_static(ty: &ParamType, data: &[u8], pos: usize) -> Result<Token> {
    match ty {
        ParamType::FixedArray(inner, len) => {
            let items: Vec<&ParamType> = std::iter::repeat(inner.as_ref()).take(*len).collect();
            Ok(Token::FixedArray(decode_sequence(&items, data, pos)?))
        }
        ParamType::Tuple(items) => {
            let items: Vec<&ParamType> = items.iter().collect();
            Ok(Token::Tuple(decode_sequence(&items, data, pos)?))
        }
        _ => {
            let mut word = [0u8; 32];
            word.copy_from_slice(read_word(data, pos, "read word")?);
            Ok(Token::Word(word))
        }
    }
}

fn decode_dynamic(ty: &ParamType, data: &[u8], start: usize) -> Result<Token> {
    match ty {
        ParamType::Bytes | ParamType::String => {
            let len = read_usize(data, start, "read bytes length")?;
            let begin = start + WORD;
            let bytes = data.get(begin..begin + len).ok_or_else(|| {
                Error::truncated("read bytes", data.len().saturating_sub(begin), len)
            })?;
            Ok(Token::Bytes(bytes.to_vec()))
        }
        ParamType::Array(inner) => {
            let len = read_usize(data, start, "read array length")?;
            check_array_len(data, start + WORD, len)?;
            let items: Vec<&ParamType> = std::iter::repeat(inner.as_ref()).take(len).collect();
            Ok(Token::Array(decode_sequence(&items, data, start + WORD)?))
        }
        _ => decode_static(ty, data, start),
    }
}

/// Every array element takes at least a word of head, so a length claiming more elements than
/// there are words left is corrupt. Checking this up front keeps a bad length from turning into
/// a huge allocation.
pub(crate) fn check_array_len(data: &[u8], base: usize, len: usize) -> Result<()> {
    let room = data.len().saturating_sub(base) / WORD;
    if len > room {
        return Err(Error::truncated("read array elements", room * WORD, len * WORD));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_selectors() {
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(selector("approve(address,uint256)"), [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(selector("balanceOf(address)"), [0x70, 0xa0, 0x82, 0x31]);
    }

    #[test]
    fn parse_types() {
        assert_eq!(ParamType::parse("uint").unwrap(), ParamType::Uint(256));
        assert_eq!(ParamType::parse("int24").unwrap(), ParamType::Int(24));
        assert_eq!(ParamType::parse("bytes4").unwrap(), ParamType::FixedBytes(4));
        assert_eq!(
            ParamType::parse("(address,bytes[])[2]").unwrap(),
            ParamType::FixedArray(
                Box::new(ParamType::Tuple(vec![
                    ParamType::Address,
                    ParamType::Array(Box::new(ParamType::Bytes)),
                ])),
                2
            )
        );
        assert_eq!(
            ParamType::parse("uint8[][3]").unwrap(),
            ParamType::FixedArray(Box::new(ParamType::Array(Box::new(ParamType::Uint(8)))), 3)
        );
        for bad in ["uint7", "uint264", "bytes33", "bytes0", "foo", "(uint", "uint[0]", "uint08"] {
            assert!(ParamType::parse(bad).is_err(), "{} should not parse", bad);
        }
    }

    #[test]
    fn parse_functions() {
        let f = Function::parse("transferFrom(address,address,uint256)").unwrap();
        assert_eq!(f.name, "transferFrom");
        assert_eq!(f.inputs.len(), 3);
        assert_eq!(f.selector, [0x23, 0xb8, 0x72, 0xdd]);

        let f = Function::parse("totalSupply()").unwrap();
        assert!(f.inputs.is_empty());

        assert!(Function::parse("transfer(address, uint256)").is_err());
        assert!(Function::parse("9lives()").is_err());
    }

    #[test]
    fn sizes() {
        let t = ParamType::parse("(uint256,address[3])").unwrap();
        assert!(!t.is_dynamic());
        assert_eq!(t.head_size(), 4 * WORD);
        let t = ParamType::parse("(uint256,string)").unwrap();
        assert!(t.is_dynamic());
        assert_eq!(t.head_size(), WORD);
    }

    #[test]
    fn encode_layout() {
        // f(uint256,bytes) with 7 and "abc"
        let data = encode(&[Token::from_usize(7), Token::Bytes(b"abc".to_vec())]);
        assert_eq!(data.len(), 4 * WORD);
        assert_eq!(data[31], 7);
        assert_eq!(data[63], 0x40);
        assert_eq!(data[95], 3);
        assert_eq!(&data[96..99], b"abc");
        assert!(data[99..].iter().all(|b| *b == 0));
    }

    #[test]
    fn decode_matches_encode() {
        let types = vec![
            ParamType::parse("(address,bytes[],bytes)[]").unwrap(),
            ParamType::Uint(256),
            ParamType::parse("uint8[2]").unwrap(),
        ];
        let tokens = vec![
            Token::Array(vec![
                Token::Tuple(vec![
                    Token::from_padded(&[0xab; 20]),
                    Token::Array(vec![Token::Bytes(vec![1; 40]), Token::Bytes(Vec::new())]),
                    Token::Bytes(vec![9; 65]),
                ]),
                Token::Tuple(vec![
                    Token::from_padded(&[0xcd; 20]),
                    Token::Array(Vec::new()),
                    Token::Bytes(vec![3]),
                ]),
            ]),
            Token::from_usize(12345),
            Token::FixedArray(vec![Token::from_usize(1), Token::from_usize(2)]),
        ];
        let data = encode(&tokens);
        assert_eq!(decode(&types, &data).unwrap(), tokens);
    }

    #[test]
    fn decode_rejects_bad_offsets() {
        let types = vec![ParamType::Bytes];
        let mut data = encode(&[Token::Bytes(vec![1, 2, 3])]);
        data[31] = 0xff;
        assert!(matches!(
            decode(&types, &data),
            Err(Error::DecodeTruncated { .. })
        ));
        data[31] = 0x20;
        data[0] = 1;
        assert!(matches!(
            decode(&types, &data),
            Err(Error::DecodeMalformed { .. })
        ));
    }

    #[test]
    fn huge_array_length_is_rejected() {
        let types = vec![ParamType::parse("uint256[]").unwrap()];
        let mut data = encode(&[Token::Array(vec![Token::from_usize(1)])]);
        data[60..64].copy_from_slice(&[0xff; 4]);
        assert!(decode(&types, &data).is_err());
    }
}

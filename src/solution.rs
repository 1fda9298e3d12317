//! The solution model: a batch of signed intents and the order to execute their steps in.

use serde::{Deserialize, Serialize};

use crate::abi::{self, ParamType, Token, WORD};
use crate::error::{Error, Result};

/// Entry point that receives solutions on chain.
pub const HANDLE_INTENTS_SIGNATURE: &str =
    "handleIntents((uint256,(address,bytes[],bytes)[],uint256[]))";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    /// Seconds since the Unix epoch.
    pub timestamp: u32,
    pub intents: Vec<Intent>,
    /// Indices into the intents, one per execution step.
    pub execution_order: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub sender: [u8; 20],
    pub segments: Vec<Segment>,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

/// One piece of an intent, interpreted according to its standard.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub standard: [u8; 32],
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// The single argument of `handleIntents`.
fn handle_intents_param() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Uint(256),
        ParamType::Array(Box::new(ParamType::Tuple(vec![
            ParamType::Address,
            ParamType::Array(Box::new(ParamType::Bytes)),
            ParamType::Bytes,
        ]))),
        ParamType::Array(Box::new(ParamType::Uint(256))),
    ])
}

impl Solution {
    /// Encode the solution as a call to `handleIntents`. Each segment is passed on chain as its
    /// standard id followed by its data.
    pub fn to_calldata(&self) -> Vec<u8> {
        let intents = self
            .intents
            .iter()
            .map(|intent| {
                let segments = intent
                    .segments
                    .iter()
                    .map(|seg| {
                        let mut bytes = Vec::with_capacity(WORD + seg.data.len());
                        bytes.extend_from_slice(&seg.standard);
                        bytes.extend_from_slice(&seg.data);
                        Token::Bytes(bytes)
                    })
                    .collect();
                Token::Tuple(vec![
                    Token::from_padded(&intent.sender),
                    Token::Array(segments),
                    Token::Bytes(intent.signature.clone()),
                ])
            })
            .collect();
        let order = self
            .execution_order
            .iter()
            .map(|step| Token::from_usize(*step as usize))
            .collect();
        let arg = Token::Tuple(vec![
            Token::from_usize(self.timestamp as usize),
            Token::Array(intents),
            Token::Array(order),
        ]);
        let mut out = abi::selector(HANDLE_INTENTS_SIGNATURE).to_vec();
        out.extend(abi::encode(&[arg]));
        out
    }

    /// Decode a `handleIntents` call.
    ///
    /// The single argument's offset must be `0x20`, which is what every encoder produces and
    /// what the compressed form assumes.
    pub fn from_calldata(call: &[u8]) -> Result<Solution> {
        let selector = call
            .get(..4)
            .ok_or_else(|| Error::truncated("read selector", call.len(), 4))?;
        if selector != abi::selector(HANDLE_INTENTS_SIGNATURE) {
            return Err(Error::malformed(
                "selector",
                format!("0x{} is not handleIntents", hex::encode(selector)),
            ));
        }
        let args = &call[4..];
        if abi::read_usize(args, 0, "read head offset")? != WORD {
            return Err(Error::malformed("head offset", "argument offset must be 0x20"));
        }

        let mut tokens = abi::decode(&[handle_intents_param()], args)?;
        let [timestamp, intents, order] = match tokens.pop() {
            Some(Token::Tuple(fields)) => <[Token; 3]>::try_from(fields)
                .map_err(|_| Error::malformed("solution", "expected 3 fields"))?,
            _ => return Err(Error::malformed("solution", "expected a tuple")),
        };

        let timestamp = narrow(&timestamp, 4, "timestamp")?;
        let timestamp = u32::from_be_bytes([timestamp[0], timestamp[1], timestamp[2], timestamp[3]]);
        let intents = array(intents, "intents")?
            .into_iter()
            .map(intent_from_token)
            .collect::<Result<Vec<_>>>()?;
        let execution_order = array(order, "execution order")?
            .iter()
            .map(|step| narrow(step, 1, "execution order").map(|v| v[0]))
            .collect::<Result<Vec<_>>>()?;
        Ok(Solution {
            timestamp,
            intents,
            execution_order,
        })
    }
}

fn intent_from_token(token: Token) -> Result<Intent> {
    let [sender, segments, signature] = match token {
        Token::Tuple(fields) => <[Token; 3]>::try_from(fields)
            .map_err(|_| Error::malformed("intent", "expected 3 fields"))?,
        _ => return Err(Error::malformed("intent", "expected a tuple")),
    };
    let mut addr = [0u8; 20];
    addr.copy_from_slice(narrow(&sender, 20, "sender")?);
    let segments = array(segments, "segments")?
        .into_iter()
        .map(|seg| {
            let bytes = bytes(seg, "segment")?;
            if bytes.len() < WORD {
                return Err(Error::malformed(
                    "segment",
                    format!("{} bytes is too short to hold a standard id", bytes.len()),
                ));
            }
            let mut standard = [0u8; 32];
            standard.copy_from_slice(&bytes[..WORD]);
            Ok(Segment {
                standard,
                data: bytes[WORD..].to_vec(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Intent {
        sender: addr,
        segments,
        signature: bytes(signature, "signature")?,
    })
}

/// The low `width` bytes of a word, if the rest of it is zero.
fn narrow<'a>(token: &'a Token, width: usize, field: &'static str) -> Result<&'a [u8]> {
    match token {
        Token::Word(word) => {
            if word[..WORD - width].iter().any(|b| *b != 0) {
                return Err(Error::malformed(
                    field,
                    format!("value does not fit in {} bytes", width),
                ));
            }
            Ok(&word[WORD - width..])
        }
        _ => Err(Error::malformed(field, "expected a word")),
    }
}

fn array(token: Token, field: &'static str) -> Result<Vec<Token>> {
    match token {
        Token::Array(items) => Ok(items),
        _ => Err(Error::malformed(field, "expected an array")),
    }
}

fn bytes(token: Token, field: &'static str) -> Result<Vec<u8>> {
    match token {
        Token::Bytes(bytes) => Ok(bytes),
        _ => Err(Error::malformed(field, "expected bytes")),
    }
}

#[cfg(test)]
pub(crate) fn sample() -> Solution {
    Solution {
        timestamp: 1_700_000_000,
        intents: vec![Intent {
            sender: [
                0x5b, 0x38, 0xda, 0x6a, 0x70, 0x1c, 0x56, 0x85, 0x45, 0xdc, 0xfc, 0xb0, 0x3f,
                0xcb, 0x87, 0x5f, 0x56, 0xbe, 0xdd, 0xc4,
            ],
            segments: vec![Segment {
                standard: {
                    let mut id = [0u8; 32];
                    id[31] = 0x01;
                    id
                },
                data: {
                    let mut data = vec![0u8; 64];
                    data[12..32].copy_from_slice(&[0xab; 20]);
                    data[56..].copy_from_slice(&1_000_000_000_000_000_000u64.to_be_bytes());
                    data
                },
            }],
            signature: (0..65u8).collect(),
        }],
        execution_order: vec![0, 0, 0, 1, 0],
    }
}

use tracing::debug;

use crate::core::types::utils::shorten_pubkey;
use crate::core::DecodedEvent;
use crate::error::DecodeError;

use super::classifier::{identify_new_token, POOL_TOKEN_A_INDEX, POOL_TOKEN_B_INDEX};
use super::discriminators::{
    Discriminator, DiscriminatorTable, InstructionKind, StaticDiscriminators, DISCRIMINATOR_LEN,
};

/// Account position of the new mint in a pump.fun `create` instruction
pub const CREATE_MINT_INDEX: usize = 0;

/// Instruction payload decoded from bytes alone, before account binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionPayload {
    CreateToken {
        name: String,
        symbol: String,
        metadata_uri: String,
    },
    InitializePool,
    Buy,
    Sell,
    Unknown,
}

/// Decodes raw instruction data of tracked programs into typed events.
///
/// Decoding is pure: the same program id and bytes always produce the same
/// result, and nothing is read past the end of the payload.
pub struct InstructionDecoder {
    table: Box<dyn DiscriminatorTable>,
}

impl Default for InstructionDecoder {
    fn default() -> Self {
        Self::new(StaticDiscriminators)
    }
}

impl InstructionDecoder {
    pub fn new(table: impl DiscriminatorTable + 'static) -> Self {
        Self { table: Box::new(table) }
    }

    pub fn decode(&self, program_id: &str, data: &[u8]) -> Result<InstructionPayload, DecodeError> {
        let mut cursor = PayloadCursor::new(data);
        let discriminator = cursor.read_discriminator()?;

        let kind = match self.table.lookup(program_id, &discriminator) {
            Some(kind) => kind,
            None => return Ok(InstructionPayload::Unknown),
        };

        match kind {
            InstructionKind::CreateToken => {
                let name = cursor.read_string("name")?;
                let symbol = cursor.read_string("symbol")?;
                let metadata_uri = cursor.read_string("uri")?;
                Ok(InstructionPayload::CreateToken { name, symbol, metadata_uri })
            }
            InstructionKind::InitializePool => Ok(InstructionPayload::InitializePool),
            InstructionKind::Buy => Ok(InstructionPayload::Buy),
            InstructionKind::Sell => Ok(InstructionPayload::Sell),
        }
    }

    /// Decodes `data` and binds the payload to the instruction's resolved
    /// account addresses.
    pub fn decode_event(
        &self,
        program_id: &str,
        accounts: &[String],
        data: &[u8],
    ) -> Result<DecodedEvent, DecodeError> {
        match self.decode(program_id, data)? {
            InstructionPayload::CreateToken { name, symbol, metadata_uri } => {
                let mint = account_at(accounts, CREATE_MINT_INDEX, "mint")?;
                Ok(DecodedEvent::TokenCreated {
                    mint: mint.to_string(),
                    name,
                    symbol,
                    metadata_uri,
                })
            }
            InstructionPayload::InitializePool => {
                let token_a = account_at(accounts, POOL_TOKEN_A_INDEX, "pool token a")?;
                let token_b = account_at(accounts, POOL_TOKEN_B_INDEX, "pool token b")?;
                match identify_new_token(token_a, token_b) {
                    Some(new_token) => Ok(DecodedEvent::PoolInitialized {
                        token_a: token_a.to_string(),
                        token_b: token_b.to_string(),
                        new_token_mint: new_token.to_string(),
                    }),
                    None => {
                        debug!(
                            token_a = %shorten_pubkey(token_a),
                            token_b = %shorten_pubkey(token_b),
                            "Discarding pool initialization with ambiguous token pair"
                        );
                        Ok(DecodedEvent::Unknown)
                    }
                }
            }
            InstructionPayload::Buy => Ok(DecodedEvent::Buy),
            InstructionPayload::Sell => Ok(DecodedEvent::Sell),
            InstructionPayload::Unknown => Ok(DecodedEvent::Unknown),
        }
    }
}

fn account_at<'a>(accounts: &'a [String], index: usize, role: &'static str) -> Result<&'a str, DecodeError> {
    accounts
        .get(index)
        .map(String::as_str)
        .ok_or(DecodeError::MissingAccount { index, role })
}

/// Bounds-checked forward reader over an instruction payload
struct PayloadCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PayloadCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::Truncated {
                field,
                needed: len,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    fn read_discriminator(&mut self) -> Result<Discriminator, DecodeError> {
        let bytes = self.take("discriminator", DISCRIMINATOR_LEN)?;
        let mut discriminator = [0u8; DISCRIMINATOR_LEN];
        discriminator.copy_from_slice(bytes);
        Ok(discriminator)
    }

    fn read_u32_le(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        let bytes = self.take(field, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Borsh string: u32 LE length followed by the bytes. Invalid UTF-8 is
    /// replaced rather than rejected; surrounding whitespace is trimmed.
    fn read_string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let len = self.read_u32_le(field)? as usize;
        let bytes = self.take(field, len)?;
        Ok(String::from_utf8_lossy(bytes).trim().to_string())
    }
}

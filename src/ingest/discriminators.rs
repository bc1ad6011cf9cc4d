//! Instruction discriminator tables for tracked programs
//!
//! Tables are hard-coded and not verified against on-chain program upgrades,
//! so decoding only ever goes through the `DiscriminatorTable` lookup and a
//! table can be replaced without touching the decoder.

use crate::core::constants::{PUMP_FUN_PROGRAM, RAYDIUM_AMM_PROGRAM};

pub type Discriminator = [u8; 8];

pub const DISCRIMINATOR_LEN: usize = 8;

/// Semantic type of an instruction within one program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    CreateToken,
    InitializePool,
    Buy,
    Sell,
}

/// Anchor discriminators: first 8 bytes of sha256("global:<method_name>")
pub mod pump_fun {
    pub const CREATE: [u8; 8] = [24, 30, 200, 40, 5, 28, 7, 119];
    pub const BUY: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];
    pub const SELL: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];
}

pub mod raydium_amm {
    pub const INITIALIZE_POOL: [u8; 8] = [175, 175, 109, 31, 13, 152, 155, 237];
}

/// Program → {discriminator → kind} lookup
pub trait DiscriminatorTable: Send + Sync {
    fn lookup(&self, program_id: &str, discriminator: &Discriminator) -> Option<InstructionKind>;
}

/// Built-in table covering pump.fun and the Raydium AMM
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticDiscriminators;

impl DiscriminatorTable for StaticDiscriminators {
    fn lookup(&self, program_id: &str, discriminator: &Discriminator) -> Option<InstructionKind> {
        match program_id {
            PUMP_FUN_PROGRAM => match *discriminator {
                pump_fun::CREATE => Some(InstructionKind::CreateToken),
                pump_fun::BUY => Some(InstructionKind::Buy),
                pump_fun::SELL => Some(InstructionKind::Sell),
                _ => None,
            },
            RAYDIUM_AMM_PROGRAM => match *discriminator {
                raydium_amm::INITIALIZE_POOL => Some(InstructionKind::InitializePool),
                _ => None,
            },
            _ => None,
        }
    }
}

use tracing::debug;

use crate::core::constants::SOL_MINT;
use crate::core::{Instruction, RawTransaction};
use crate::error::LookupError;

/// Raydium pool initialization carries at least this many accounts. This is a
/// cheap pre-filter, not a guarantee: the discriminator still decides.
pub const MIN_POOL_INIT_ACCOUNTS: usize = 17;

pub const POOL_TOKEN_A_INDEX: usize = 8;
pub const POOL_TOKEN_B_INDEX: usize = 9;

/// Instruction invoking a tracked program, with its accounts resolved to
/// addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedInstruction {
    /// Position of the instruction in the transaction
    pub index: usize,
    pub program_id: String,
    pub accounts: Vec<String>,
    pub data: Vec<u8>,
}

/// Returns every instruction of `tx` that invokes `tracked_program_id`, in
/// transaction order. Instructions with unresolvable indices are skipped.
pub fn classify(tx: &RawTransaction, tracked_program_id: &str) -> Vec<ClassifiedInstruction> {
    let mut matched = Vec::new();

    for (index, instruction) in tx.instructions.iter().enumerate() {
        match resolve(tx, instruction, tracked_program_id) {
            Ok(Some(accounts)) => matched.push(ClassifiedInstruction {
                index,
                program_id: tracked_program_id.to_string(),
                accounts,
                data: instruction.data.clone(),
            }),
            Ok(None) => {}
            Err(e) => {
                debug!(
                    signature = %tx.signature,
                    instruction = index,
                    error = %e,
                    "Skipping instruction with unresolvable index"
                );
            }
        }
    }

    matched
}

/// Keeps instructions that carry enough accounts to be a pool initialization
pub fn pool_init_candidates(instructions: Vec<ClassifiedInstruction>) -> Vec<ClassifiedInstruction> {
    instructions
        .into_iter()
        .filter(|ix| ix.accounts.len() >= MIN_POOL_INIT_ACCOUNTS)
        .collect()
}

/// Picks the newly launched mint of a pool pair: the side that is not wrapped
/// SOL. Returns `None` when neither or both sides are wrapped SOL.
pub fn identify_new_token<'a>(token_a: &'a str, token_b: &'a str) -> Option<&'a str> {
    match (token_a == SOL_MINT, token_b == SOL_MINT) {
        (true, false) => Some(token_b),
        (false, true) => Some(token_a),
        _ => None,
    }
}

fn resolve(
    tx: &RawTransaction,
    instruction: &Instruction,
    tracked_program_id: &str,
) -> Result<Option<Vec<String>>, LookupError> {
    let len = tx.account_keys.len();
    let program_id = tx
        .account_key(instruction.program_index)
        .ok_or(LookupError::ProgramIndexOutOfRange { index: instruction.program_index, len })?;

    if program_id != tracked_program_id {
        return Ok(None);
    }

    instruction
        .account_indices
        .iter()
        .map(|&i| {
            tx.account_key(i)
                .map(str::to_string)
                .ok_or(LookupError::AccountIndexOutOfRange { index: i, len })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::{PUMP_FUN_PROGRAM, RAYDIUM_AMM_PROGRAM};

    fn tx_with(instructions: Vec<Instruction>) -> RawTransaction {
        RawTransaction {
            signature: "sig1".to_string(),
            slot: 42,
            block_time: Some(1_700_000_000),
            account_keys: vec![
                "Payer".to_string(),
                "Mint".to_string(),
                PUMP_FUN_PROGRAM.to_string(),
                RAYDIUM_AMM_PROGRAM.to_string(),
            ],
            instructions,
        }
    }

    fn ix(program_index: usize, account_indices: Vec<usize>, tag: u8) -> Instruction {
        Instruction { program_index, account_indices, data: vec![tag] }
    }

    #[test]
    fn test_untracked_program_yields_nothing() {
        let tx = tx_with(vec![ix(3, vec![0, 1], 1)]);
        assert!(classify(&tx, PUMP_FUN_PROGRAM).is_empty());
        assert!(classify(&tx, "SomeOtherProgram").is_empty());
    }

    #[test]
    fn test_resolves_accounts_in_order() {
        let tx = tx_with(vec![ix(2, vec![1, 0], 1), ix(3, vec![0], 2), ix(2, vec![0], 3)]);
        let matched = classify(&tx, PUMP_FUN_PROGRAM);

        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].index, 0);
        assert_eq!(matched[0].accounts, vec!["Mint".to_string(), "Payer".to_string()]);
        assert_eq!(matched[0].data, vec![1]);
        assert_eq!(matched[1].index, 2);
        assert_eq!(matched[1].data, vec![3]);
    }

    #[test]
    fn test_out_of_range_indices_are_skipped() {
        let tx = tx_with(vec![ix(99, vec![0], 1), ix(2, vec![0, 7], 2), ix(2, vec![1], 3)]);
        let matched = classify(&tx, PUMP_FUN_PROGRAM);

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].data, vec![3]);
    }

    #[test]
    fn test_pool_candidates_need_enough_accounts() {
        let small = ClassifiedInstruction {
            index: 0,
            program_id: RAYDIUM_AMM_PROGRAM.to_string(),
            accounts: vec!["a".to_string(); 16],
            data: vec![],
        };
        let large = ClassifiedInstruction { index: 1, accounts: vec!["a".to_string(); 17], ..small.clone() };

        let kept = pool_init_candidates(vec![small, large]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].index, 1);
    }

    #[test]
    fn test_identify_new_token() {
        assert_eq!(identify_new_token(SOL_MINT, "Meme"), Some("Meme"));
        assert_eq!(identify_new_token("Meme", SOL_MINT), Some("Meme"));
        assert_eq!(identify_new_token("A", "B"), None);
        assert_eq!(identify_new_token(SOL_MINT, SOL_MINT), None);
    }
}

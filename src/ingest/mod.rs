pub mod classifier;
pub mod decoder;
pub mod discriminators;
pub mod rpc;

pub use classifier::{classify, pool_init_candidates, ClassifiedInstruction};
pub use decoder::{InstructionDecoder, InstructionPayload};
pub use discriminators::{DiscriminatorTable, StaticDiscriminators};
pub use rpc::SolanaRpcClient;

// Git plumbing: subprocess worker, commit message synthesis, trust trailers, undo.

pub mod message;
pub mod signer;
pub mod undo;
pub mod worker;

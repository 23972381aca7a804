//! The relayer redeems signed token bridge transfers on their recipient
//! chains.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use eyre::Result;
use relayer::Relayer;
use relayer_base::agent_main;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    agent_main::<Relayer>().await
}

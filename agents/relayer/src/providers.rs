use std::{collections::HashMap, sync::Arc};

use eyre::Result;
use relayer_core::{is_evm_chain, ChainId, TokenBridgeReader};
use tracing::info;

use crate::{chains::build_readers, settings::ChainConf};

type Readers = HashMap<ChainId, Vec<Arc<dyn TokenBridgeReader>>>;

/// Read handles of every configured chain, grouped by chain family.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    evm: Readers,
    alephium: Readers,
}

impl ProviderRegistry {
    /// Build readers for every chain in `chains`.
    pub fn from_chains<'a>(chains: impl IntoIterator<Item = &'a ChainConf>) -> Result<Self> {
        let mut registry = Self::default();
        for conf in chains {
            let readers = build_readers(conf)?;
            info!(chain = %conf.chain, readers = readers.len(), "Built providers");
            registry.insert(conf.id(), readers);
        }
        Ok(registry)
    }

    /// Add the readers of `chain`.
    pub fn insert(&mut self, chain: ChainId, readers: Vec<Arc<dyn TokenBridgeReader>>) {
        self.family_mut(chain).insert(chain, readers);
    }

    fn family_mut(&mut self, chain: ChainId) -> &mut Readers {
        if is_evm_chain(chain) {
            &mut self.evm
        } else {
            &mut self.alephium
        }
    }

    /// Readers of `chain` in failover order, empty if it is not configured.
    pub fn of(&self, chain: ChainId) -> &[Arc<dyn TokenBridgeReader>] {
        let family = if is_evm_chain(chain) {
            &self.evm
        } else {
            &self.alephium
        };
        family.get(&chain).map(Vec::as_slice).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockTokenBridgeReader;

    fn reader(chain: ChainId) -> Arc<dyn TokenBridgeReader> {
        let mut reader = MockTokenBridgeReader::new();
        reader.expect__chain().return_const(chain);
        Arc::new(reader)
    }

    #[test]
    fn groups_by_family() {
        let mut registry = ProviderRegistry::default();
        registry.insert(2, vec![reader(2), reader(2)]);
        registry.insert(255, vec![reader(255)]);

        assert_eq!(registry.of(2).len(), 2);
        assert_eq!(registry.evm.len(), 1);
        assert_eq!(registry.alephium.len(), 1);
        assert_eq!(registry.of(255)[0].chain(), 255);
        assert!(registry.of(4).is_empty());
    }
}

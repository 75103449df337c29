//! Store name resolution.
//!
//! The resolved name is the only key into the per-name state, history and
//! channel registries. Two configurations with the same name are the same
//! logical store.

use crate::config::StoreConfig;

/// Key under which `config`'s state, history and channels are registered.
pub fn resolve_name(config: &StoreConfig) -> &str {
    &config.name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Persistence;

    #[test]
    fn name_ignores_every_other_setting() {
        let plain = StoreConfig::new("client-store");
        let tuned = StoreConfig::new("client-store")
            .with_persistence(Persistence::Session)
            .with_state_history(true)
            .with_label("ClientStore");
        assert_eq!(resolve_name(&plain), resolve_name(&tuned));
    }
}

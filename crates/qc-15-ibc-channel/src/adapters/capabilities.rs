//! In-memory capability keeper.

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::{CapabilityToken, ChannelError, ChannelId, PortId};
use crate::ports::CapabilityAdapter;

/// Capability keeper backed by two maps. Tokens are random UUIDs and are
/// never reassigned once issued.
#[derive(Debug, Default)]
pub struct InMemoryCapabilities {
    ports: BTreeMap<PortId, CapabilityToken>,
    channels: BTreeMap<(PortId, ChannelId), CapabilityToken>,
}

impl InMemoryCapabilities {
    /// Create an empty keeper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of channel capabilities issued.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl CapabilityAdapter for InMemoryCapabilities {
    fn bind_port(&mut self, port_id: &PortId) -> Result<CapabilityToken, ChannelError> {
        if self.ports.contains_key(port_id) {
            return Err(ChannelError::PortAlreadyBound(port_id.clone()));
        }
        let token = CapabilityToken::generate();
        self.ports.insert(port_id.clone(), token);
        debug!("[qc-15] Port capability issued for {}", port_id);
        Ok(token)
    }

    fn authenticate_port(&self, token: &CapabilityToken, port_id: &PortId) -> bool {
        self.ports.get(port_id) == Some(token)
    }

    fn bind_new(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<CapabilityToken, ChannelError> {
        let key = (port_id.clone(), channel_id.clone());
        if self.channels.contains_key(&key) {
            return Err(ChannelError::CapabilityAlreadyBound {
                port_id: port_id.clone(),
                channel_id: channel_id.clone(),
            });
        }
        let token = CapabilityToken::generate();
        self.channels.insert(key, token);
        debug!("[qc-15] Channel capability issued for {}/{}", port_id, channel_id);
        Ok(token)
    }

    fn authenticate(
        &self,
        token: &CapabilityToken,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> bool {
        self.channels.get(&(port_id.clone(), channel_id.clone())) == Some(token)
    }

    fn is_bound(&self, port_id: &PortId, channel_id: &ChannelId) -> bool {
        self.channels
            .contains_key(&(port_id.clone(), channel_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_capability_exclusive() {
        let mut caps = InMemoryCapabilities::new();
        let port = PortId::new("transfer");
        let chan = ChannelId::new(0);

        let token = caps.bind_new(&port, &chan).unwrap();
        assert!(caps.authenticate(&token, &port, &chan));
        assert!(!caps.authenticate(&CapabilityToken::generate(), &port, &chan));
        assert!(!caps.authenticate(&token, &port, &ChannelId::new(1)));

        assert!(matches!(
            caps.bind_new(&port, &chan),
            Err(ChannelError::CapabilityAlreadyBound { .. })
        ));
        assert_eq!(caps.channel_count(), 1);
    }

    #[test]
    fn test_port_capability() {
        let mut caps = InMemoryCapabilities::new();
        let port = PortId::new("transfer");
        let token = caps.bind_port(&port).unwrap();

        assert!(caps.authenticate_port(&token, &port));
        assert!(!caps.authenticate_port(&token, &PortId::new("mock")));
        assert!(matches!(
            caps.bind_port(&port),
            Err(ChannelError::PortAlreadyBound(_))
        ));
    }
}
